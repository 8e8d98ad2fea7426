pub mod deepl;
pub mod gemini;
pub mod language;
pub mod openai;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::article::Article;
use crate::mapping::{amap_async_with_outcomes, MapError, MapOptions, Mapped, Transform};

const PROMPT_TRANSLATE: &str = "Strictly translate the following texts in {language}.";
const PROMPT_SUMMARIZE: &str = "Summarize the following texts in {language}.";

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {0}")]
    Api(String),
    #[error("Empty response from {0}")]
    EmptyResponse(String),
    #[error("Missing API key: {0}")]
    MissingKey(String),
    #[error("Unknown translator: {0} (expected one of: deepl, gemini, openai)")]
    UnknownTranslator(String),
}

/// Translates (or summarizes) the title and summary of an article.
///
/// Implementations return a new article and leave authors and url untouched.
#[async_trait]
pub trait Translator: Send + Sync {
    fn name(&self) -> &str;
    async fn translate(&self, article: &Article) -> Result<Article, TranslateError>;
}

/// Settings shared by every backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatorOptions {
    /// API key, or `$NAME` to read it from the environment variable `NAME`.
    pub api_key: String,
    /// Target language code, or `"auto"` for the process locale.
    pub language: String,
    pub summarize: bool,
    /// Model name for LLM backends; their default when `None`.
    pub model: Option<String>,
}

/// Registered translation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslatorKind {
    DeepL,
    Gemini,
    OpenAI,
}

impl TranslatorKind {
    pub const ALL: [TranslatorKind; 3] = [Self::DeepL, Self::Gemini, Self::OpenAI];

    pub fn name(&self) -> &'static str {
        match self {
            Self::DeepL => "deepl",
            Self::Gemini => "gemini",
            Self::OpenAI => "openai",
        }
    }

    /// Environment variable conventionally holding this backend's key.
    pub fn default_api_key(&self) -> &'static str {
        match self {
            Self::DeepL => "$DEEPL_API_KEY",
            Self::Gemini => "$GOOGLE_API_KEY",
            Self::OpenAI => "$OPENAI_API_KEY",
        }
    }
}

impl fmt::Display for TranslatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TranslatorKind {
    type Err = TranslateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deepl" => Ok(Self::DeepL),
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAI),
            _ => Err(TranslateError::UnknownTranslator(s.to_string())),
        }
    }
}

/// A literal key, or `$NAME` for the value of environment variable `NAME`.
pub fn resolve_api_key(value: &str) -> Result<String, TranslateError> {
    resolve_api_key_with(value, |var| std::env::var(var).ok())
}

pub fn resolve_api_key_with<F>(value: &str, lookup: F) -> Result<String, TranslateError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = value.trim();
    let key = match value.strip_prefix('$') {
        Some(var) => lookup(var)
            .ok_or_else(|| TranslateError::MissingKey(format!("{} is not set", var)))?,
        None => value.to_string(),
    };
    if key.trim().is_empty() {
        return Err(TranslateError::MissingKey("API key is empty".to_string()));
    }
    Ok(key)
}

/// Construct the backend registered under `kind`.
pub fn build_translator(
    kind: TranslatorKind,
    options: &TranslatorOptions,
) -> Result<Arc<dyn Translator>, TranslateError> {
    let api_key = resolve_api_key(&options.api_key)?;
    let language = language::resolve_language(&options.language);
    tracing::info!(
        "Using {} translator (language={}, summarize={})",
        kind,
        language,
        options.summarize
    );

    let translator: Arc<dyn Translator> = match kind {
        TranslatorKind::DeepL => {
            if options.model.is_some() {
                tracing::warn!("DeepL has no model choice, ignoring the configured model");
            }
            Arc::new(deepl::DeepL::new(api_key, &language, options.summarize)?)
        }
        TranslatorKind::Gemini => {
            let mut gemini = gemini::Gemini::new(api_key, &language, options.summarize)?;
            if let Some(model) = &options.model {
                gemini = gemini.with_model(model);
            }
            Arc::new(gemini)
        }
        TranslatorKind::OpenAI => {
            let mut openai = openai::OpenAI::new(api_key, &language, options.summarize)?;
            if let Some(model) = &options.model {
                openai = openai.with_model(model);
            }
            Arc::new(openai)
        }
    };
    Ok(translator)
}

/// Instruction placed before the text sent to an LLM backend.
pub fn prompt(language: &str, summarize: bool) -> String {
    let template = if summarize { PROMPT_SUMMARIZE } else { PROMPT_TRANSLATE };
    template.replace("{language}", &language::language_name(language))
}

/// Adapt a translator to an async `amap` transform.
pub fn translator_transform(translator: Arc<dyn Translator>) -> Transform<Article> {
    let name = translator.name().to_string();
    Transform::from_async(name, move |article: Article| {
        let translator = Arc::clone(&translator);
        async move {
            translator
                .translate(&article)
                .await
                .map_err(anyhow::Error::from)
        }
    })
}

/// Translate every article, bounded by `options`. Articles whose translation
/// fails or times out come back unchanged.
pub async fn translate(
    articles: Vec<Article>,
    translator: Arc<dyn Translator>,
    options: MapOptions,
) -> Result<Vec<Mapped<Article>>, MapError> {
    let transform = translator_transform(translator);
    amap_async_with_outcomes(&transform, articles, options).await
}

/// Turn a non-success response into [`TranslateError::Api`], keeping the body.
pub(crate) async fn check_status(
    resp: reqwest::Response,
) -> Result<reqwest::Response, TranslateError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(TranslateError::Api(format!("{}: {}", status, body.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{Outcome, Provenance};
    use std::time::Duration;

    struct Upper;

    #[async_trait]
    impl Translator for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        async fn translate(&self, article: &Article) -> Result<Article, TranslateError> {
            Ok(article.with_text(article.title.to_uppercase(), article.summary.to_uppercase()))
        }
    }

    struct Unavailable;

    #[async_trait]
    impl Translator for Unavailable {
        fn name(&self) -> &str {
            "unavailable"
        }

        async fn translate(&self, _article: &Article) -> Result<Article, TranslateError> {
            Err(TranslateError::Api("503 Service Unavailable".to_string()))
        }
    }

    fn articles() -> Vec<Article> {
        ["A", "B", "C"]
            .iter()
            .map(|tag| {
                Article::new(
                    format!("Title {}", tag),
                    vec![format!("Author {}", tag)],
                    format!("Summary {}", tag),
                    format!("http://example.com/{}", tag.to_lowercase()),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_translate_sets_provenance() {
        let mapped = translate(articles(), Arc::new(Upper), MapOptions::default())
            .await
            .unwrap();
        for (m, original) in mapped.iter().zip(articles()) {
            let expected = original
                .with_text(original.title.to_uppercase(), original.summary.to_uppercase())
                .with_origin(original.clone());
            assert_eq!(m.outcome, Outcome::Transformed);
            assert!(m.item.same_provenance(&expected));
        }
    }

    #[tokio::test]
    async fn test_failing_translator_returns_originals() {
        let options = MapOptions::default().with_timeout(Duration::from_secs(1));
        let mapped = translate(articles(), Arc::new(Unavailable), options)
            .await
            .unwrap();
        for (m, original) in mapped.iter().zip(articles()) {
            assert!(m.is_degraded());
            assert!(m.item.same_provenance(&original));
        }
    }

    #[test]
    fn test_translator_kind_registry() {
        assert_eq!("DeepL".parse::<TranslatorKind>().unwrap(), TranslatorKind::DeepL);
        assert_eq!("google".parse::<TranslatorKind>().unwrap(), TranslatorKind::Gemini);
        assert_eq!(" openai ".parse::<TranslatorKind>().unwrap(), TranslatorKind::OpenAI);
        assert!(matches!(
            "aixiv.translators.Gemini".parse::<TranslatorKind>(),
            Err(TranslateError::UnknownTranslator(_))
        ));
        for kind in TranslatorKind::ALL {
            assert_eq!(kind.name().parse::<TranslatorKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_resolve_api_key() {
        let lookup = |var: &str| (var == "GOOGLE_API_KEY").then(|| "secret".to_string());
        assert_eq!(resolve_api_key_with("$GOOGLE_API_KEY", lookup).unwrap(), "secret");
        assert_eq!(resolve_api_key_with("literal-key", lookup).unwrap(), "literal-key");
        assert!(matches!(
            resolve_api_key_with("$OPENAI_API_KEY", lookup),
            Err(TranslateError::MissingKey(_))
        ));
        assert!(matches!(
            resolve_api_key_with("  ", lookup),
            Err(TranslateError::MissingKey(_))
        ));
    }

    #[test]
    fn test_build_translator_requires_key() {
        let options = TranslatorOptions {
            api_key: "$AIXIV_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            language: "ja".to_string(),
            summarize: false,
            model: None,
        };
        assert!(matches!(
            build_translator(TranslatorKind::Gemini, &options),
            Err(TranslateError::MissingKey(_))
        ));
    }

    #[test]
    fn test_build_translator_with_literal_key() {
        let options = TranslatorOptions {
            api_key: "sk-test".to_string(),
            language: "ja".to_string(),
            summarize: true,
            model: Some("gpt-4o-mini".to_string()),
        };
        let translator = build_translator(TranslatorKind::OpenAI, &options).unwrap();
        assert_eq!(translator.name(), "openai");
    }

    #[test]
    fn test_prompt() {
        assert_eq!(
            prompt("ja", false),
            "Strictly translate the following texts in Japanese."
        );
        assert_eq!(prompt("de", true), "Summarize the following texts in German.");
    }
}
