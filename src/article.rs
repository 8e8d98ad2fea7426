use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::mapping::Provenance;

/// Default width of the one-line rendering used in log messages.
const DISPLAY_WIDTH: usize = 50;
const PLACEHOLDER: &str = "[...]";

/// An arXiv article.
///
/// Transforms never edit an article in place; they build a new one whose
/// `origin` points at the article it was derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin: Option<Arc<Article>>,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        authors: Vec<String>,
        summary: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            authors,
            summary: summary.into(),
            url: url.into(),
            origin: None,
        }
    }

    /// The article this one was derived from, if any.
    pub fn origin(&self) -> Option<&Article> {
        self.origin.as_deref()
    }

    /// Copy of this article with a new title and summary. Authors, url and
    /// origin carry over.
    pub fn with_text(&self, title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            authors: self.authors.clone(),
            url: self.url.clone(),
            origin: self.origin.clone(),
        }
    }

    /// Structural equality that also walks the origin chains.
    pub fn same_provenance(&self, other: &Article) -> bool {
        if self != other {
            return false;
        }
        match (self.origin(), other.origin()) {
            (None, None) => true,
            (Some(a), Some(b)) => a.same_provenance(b),
            _ => false,
        }
    }

    /// Number of transforms between this article and the one search produced.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.origin();
        while let Some(article) = current {
            depth += 1;
            current = article.origin();
        }
        depth
    }
}

impl Provenance for Article {
    fn with_origin(self, origin: Self) -> Self {
        Self {
            origin: Some(Arc::new(origin)),
            ..self
        }
    }
}

// `origin` is bookkeeping, not content: two articles with the same fields are
// equal regardless of how they were produced.
impl PartialEq for Article {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.authors == other.authors
            && self.summary == other.summary
            && self.url == other.url
    }
}

impl Eq for Article {}

/// Truncated one-line rendering. The format width (`{:80}`) sets the maximum
/// number of characters, 50 by default.
impl fmt::Display for Article {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = format!(
            "Article(title={:?}, authors={:?}, summary={:?}, url={:?})",
            self.title, self.authors, self.summary, self.url
        );
        f.write_str(&shorten(&full, f.width().unwrap_or(DISPLAY_WIDTH)))
    }
}

/// Collapse whitespace and cut `text` at a word boundary so that the result,
/// including the trailing placeholder, fits in `width` characters.
pub fn shorten(text: &str, width: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let collapsed = words.join(" ");
    if collapsed.chars().count() <= width {
        return collapsed;
    }

    let budget = width.saturating_sub(PLACEHOLDER.len() + 1);
    let mut out = String::new();
    for word in words {
        let extra = if out.is_empty() { 0 } else { 1 } + word.chars().count();
        if out.chars().count() + extra > budget {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }

    if out.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        format!("{} {}", out, PLACEHOLDER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(tag: &str) -> Article {
        Article::new(
            format!("Title {}", tag),
            vec![format!("Author {}", tag)],
            format!("Summary {}", tag),
            format!("http://example.com/{}", tag.to_lowercase()),
        )
    }

    #[test]
    fn test_equality_ignores_origin() {
        let a = article("A");
        let derived = article("A").with_origin(article("B"));
        assert_eq!(a, derived);
        assert!(!a.same_provenance(&derived));
    }

    #[test]
    fn test_same_provenance_walks_chain() {
        let base = article("A");
        let once = article("A").with_origin(base.clone());
        let twice = once.clone().with_origin(once.clone());
        assert!(twice.same_provenance(&twice.clone()));
        assert_eq!(twice.depth(), 2);
        assert_eq!(twice.origin().unwrap().origin(), Some(&base));
    }

    #[test]
    fn test_with_text_keeps_metadata() {
        let a = article("A");
        let b = a.with_text("New", "Text");
        assert_eq!(b.title, "New");
        assert_eq!(b.summary, "Text");
        assert_eq!(b.authors, a.authors);
        assert_eq!(b.url, a.url);
        assert!(b.origin().is_none());
    }

    #[test]
    fn test_shorten() {
        assert_eq!(shorten("hello   world", 20), "hello world");
        assert_eq!(shorten("Hello world! How are you?", 18), "Hello world! [...]");
        assert_eq!(shorten("Supercalifragilistic", 8), "[...]");
    }

    #[test]
    fn test_display_is_bounded() {
        let a = article("A");
        let short = a.to_string();
        assert!(short.chars().count() <= 50);
        assert!(short.starts_with("Article(title=\"Title"));
        let wide = format!("{:200}", a);
        assert!(wide.contains("http://example.com/a"));
    }

    #[test]
    fn test_serialize_skips_missing_origin() {
        let a = article("A");
        let json = serde_json::to_value(&a).unwrap();
        assert!(json.get("origin").is_none());

        let derived = article("B").with_origin(a);
        let json = serde_json::to_value(&derived).unwrap();
        assert_eq!(json["origin"]["title"], "Title A");
    }
}
