use std::sync::Arc;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::apis::{ArticleSource, SourceError};
use crate::article::Article;
use crate::dates::{format_arxiv_date, parse_date};
use crate::format::formatter;
use crate::mapping::{amap_async_with_outcomes, MapOptions};
use crate::translate::{translate, Translator};

pub const DEFAULT_START: &str = "1 day ago at midnight in UTC";
pub const DEFAULT_END: &str = "0 day ago at midnight in UTC";
pub const DEFAULT_MAX_RESULTS: u32 = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    #[default]
    Relevance,
    LastUpdatedDate,
    SubmittedDate,
}

impl SortBy {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            SortBy::Relevance => "relevance",
            SortBy::LastUpdatedDate => "lastUpdatedDate",
            SortBy::SubmittedDate => "submittedDate",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ascending",
            SortOrder::Descending => "descending",
        }
    }
}

/// Conditions of an arXiv search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    /// Date-like start of the submission window, e.g. `"2021-01-01 in UTC"`.
    pub start: String,
    pub end: String,
    pub max_results: u32,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            keywords: Vec::new(),
            start: DEFAULT_START.to_string(),
            end: DEFAULT_END.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl SearchQuery {
    /// Render the arXiv `search_query` string, resolving relative dates
    /// against `now`.
    pub fn build(&self, now: DateTime<Utc>) -> Result<String, SourceError> {
        let start = format_arxiv_date(&parse_date(&self.start, now)?);
        let end = format_arxiv_date(&parse_date(&self.end, now)?);
        let mut query = format!("submittedDate:[{} TO {}]", start, end);

        let categories: Vec<String> = self
            .categories
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|c| format!("cat:{}", c))
            .collect();
        if !categories.is_empty() {
            query.push_str(&format!(" AND ({})", categories.join(" OR ")));
        }

        let keywords: Vec<String> = self
            .keywords
            .iter()
            .map(|k| k.replace('"', "").trim().to_string())
            .filter(|k| !k.is_empty())
            .map(|k| format!("abs:\"{}\"", k))
            .collect();
        if !keywords.is_empty() {
            query.push_str(&format!(" AND ({})", keywords.join(" OR ")));
        }

        Ok(query)
    }
}

/// What to do with articles after they are fetched.
#[derive(Clone)]
pub struct Processing {
    pub format: bool,
    pub translator: Option<Arc<dyn Translator>>,
    pub options: MapOptions,
}

impl Default for Processing {
    fn default() -> Self {
        Self {
            format: true,
            translator: None,
            options: MapOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub source: String,
    pub found: usize,
    pub translated: usize,
    /// Articles whose translation failed or timed out and were kept as fetched.
    pub untranslated: usize,
    pub articles: Vec<Article>,
}

/// Fetch articles from `source`, then format and translate them as
/// `processing` asks.
pub async fn search_articles(
    source: &dyn ArticleSource,
    query: &SearchQuery,
    processing: &Processing,
) -> anyhow::Result<SearchReport> {
    processing.options.validate()?;

    let mut articles = source.search(query).await?;
    let found = articles.len();
    tracing::info!("{} returned {} articles", source.name(), found);

    if processing.format {
        articles = amap_async_with_outcomes(&formatter(), articles, processing.options)
            .await?
            .into_iter()
            .map(|m| m.item)
            .collect();
    }

    let (mut translated, mut untranslated) = (0, 0);
    if let Some(translator) = &processing.translator {
        let mapped = translate(articles, Arc::clone(translator), processing.options).await?;
        untranslated = mapped.iter().filter(|m| m.is_degraded()).count();
        translated = mapped.len() - untranslated;
        articles = mapped.into_iter().map(|m| m.item).collect();
    }

    Ok(SearchReport {
        source: source.name().to_string(),
        found,
        translated,
        untranslated,
        articles,
    })
}
