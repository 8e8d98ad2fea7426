use std::time::Duration;

use super::{check_status, prompt, TranslateError, Translator};
use crate::article::Article;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub const DEFAULT_MODEL: &str = "gemini-pro";

/// Delay each task takes before every request it sends. Tasks wait
/// independently, so up to `concurrency` requests can still start together.
pub const DEFAULT_LATENCY: Duration = Duration::from_secs(1);

/// Translator backed by Google's Gemini models.
pub struct Gemini {
    client: reqwest::Client,
    api_key: String,
    model: String,
    prompt: String,
    latency: Duration,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl Gemini {
    pub fn new(api_key: String, language: &str, summarize: bool) -> Result<Self, TranslateError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("aixiv/", env!("CARGO_PKG_VERSION")))
                .build()?,
            api_key,
            model: DEFAULT_MODEL.to_string(),
            prompt: prompt(language, summarize),
            latency: DEFAULT_LATENCY,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn generate(&self, text: &str) -> Result<String, TranslateError> {
        tokio::time::sleep(self.latency).await;

        let input = format!("{}\n{}", self.prompt, text);
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: &input }],
            }],
        };
        let url = format!("{}/{}:generateContent", BASE_URL, self.model);
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let resp: GenerateResponse = check_status(resp).await?.json().await?;
        extract_text(resp).ok_or_else(|| TranslateError::EmptyResponse(self.model.clone()))
    }
}

/// Concatenated text parts of the first candidate.
fn extract_text(resp: GenerateResponse) -> Option<String> {
    let content = resp.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[async_trait]
impl Translator for Gemini {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn translate(&self, article: &Article) -> Result<Article, TranslateError> {
        let title = self.generate(&article.title).await?;
        let summary = self.generate(&article.summary).await?;
        Ok(article.with_text(title, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: "hello" }],
            }],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"contents": [{"parts": [{"text": "hello"}]}]})
        );
    }

    #[test]
    fn test_extract_text() {
        let resp: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "銀河の"}, {"text": "ガス運動\n"}], "role": "model"},
                "finishReason": "STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(resp).as_deref(), Some("銀河のガス運動"));
    }

    #[test]
    fn test_extract_text_blocked() {
        let resp: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        assert_eq!(extract_text(resp), None);

        let resp: GenerateResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        assert_eq!(extract_text(resp), None);
    }

    #[test]
    fn test_builder() {
        assert_eq!(Gemini::new("key".to_string(), "ja", false).unwrap().latency, DEFAULT_LATENCY);
        let gemini = Gemini::new("key".to_string(), "ja", true)
            .unwrap()
            .with_model("gemini-1.5-flash")
            .with_latency(Duration::ZERO);
        assert_eq!(gemini.model, "gemini-1.5-flash");
        assert_eq!(gemini.latency, Duration::ZERO);
        assert_eq!(gemini.prompt, "Summarize the following texts in Japanese.");
    }
}
