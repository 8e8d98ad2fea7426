pub mod arxiv;

use async_trait::async_trait;
use thiserror::Error;

use crate::article::Article;
use crate::dates::DateError;
use crate::search::SearchQuery;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Invalid date: {0}")]
    InvalidDate(#[from] DateError),
}

/// A remote catalogue that turns a search query into articles.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Article>, SourceError>;
}
