use std::time::Duration;

use super::{ArticleSource, SourceError};
use crate::article::Article;
use crate::format::normalize_whitespace;
use crate::search::SearchQuery;
use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://export.arxiv.org/api/query";

/// arXiv asks clients to leave three seconds between calls.
const REQUEST_INTERVAL: Duration = Duration::from_secs(3);

pub struct ArxivClient {
    client: reqwest::Client,
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl ArxivClient {
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("aixiv/", env!("CARGO_PKG_VERSION")))
                .build()?,
            interval: REQUEST_INTERVAL,
            last_request: Mutex::new(None),
        })
    }

    /// Minimum spacing between two requests from this client.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    async fn wait_for_slot(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready = previous + self.interval;
            if ready > Instant::now() {
                tracing::debug!("Waiting for arXiv rate limit");
                tokio::time::sleep_until(ready).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl ArticleSource for ArxivClient {
    fn name(&self) -> &str {
        "arxiv"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Article>, SourceError> {
        let search_query = query.build(chrono::Utc::now())?;
        tracing::debug!("Query for search: {:?}", search_query);

        let max_results = query.max_results.to_string();
        self.wait_for_slot().await;
        let resp = self
            .client
            .get(BASE_URL)
            .query(&[
                ("search_query", search_query.as_str()),
                ("start", "0"),
                ("max_results", max_results.as_str()),
                ("sortBy", query.sort_by.as_api_str()),
                ("sortOrder", query.sort_order.as_api_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let articles = parse_atom_feed(&resp)?;
        tracing::debug!("Number of articles found: {}", articles.len());
        Ok(articles)
    }
}

#[derive(Default)]
struct Entry {
    id: String,
    title: String,
    summary: String,
    authors: Vec<String>,
}

impl Entry {
    fn into_article(self) -> Result<Option<Article>, SourceError> {
        let id = self.id.trim().to_string();
        // arXiv reports query errors as a feed entry under /api/errors.
        if id.contains("/api/errors") {
            return Err(SourceError::Api(normalize_whitespace(&self.summary)));
        }
        if id.is_empty() || self.title.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(Article::new(
            normalize_whitespace(&self.title),
            self.authors,
            normalize_whitespace(&self.summary),
            id,
        )))
    }
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

/// Parse an arXiv Atom feed into articles, keeping feed order.
pub fn parse_atom_feed(xml: &str) -> Result<Vec<Article>, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut articles = Vec::new();
    let mut entry: Option<Entry> = None;
    let mut current_tag = String::new();
    let mut in_author = false;
    let mut author_name = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = tag_name(&e);
                match tag.as_str() {
                    "entry" => entry = Some(Entry::default()),
                    "author" if entry.is_some() => {
                        in_author = true;
                        author_name.clear();
                    }
                    _ => {}
                }
                current_tag = tag;
            }
            Ok(Event::Text(e)) => {
                if let Some(entry) = entry.as_mut() {
                    let text = e
                        .unescape()
                        .map_err(|e| SourceError::Parse(format!("XML text error: {}", e)))?;
                    match current_tag.as_str() {
                        "id" => entry.id.push_str(&text),
                        "title" => entry.title.push_str(&text),
                        "summary" => entry.summary.push_str(&text),
                        "name" if in_author => author_name.push_str(&text),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match tag.as_str() {
                    "entry" => {
                        if let Some(done) = entry.take() {
                            articles.extend(done.into_article()?);
                        }
                    }
                    "author" if in_author => {
                        in_author = false;
                        let name = author_name.trim();
                        if let (Some(entry), false) = (entry.as_mut(), name.is_empty()) {
                            entry.authors.push(name.to_string());
                        }
                    }
                    _ => {}
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SourceError::Parse(format!("XML parse error: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(articles)
}
