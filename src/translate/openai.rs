use std::time::Duration;

use super::{check_status, prompt, TranslateError, Translator};
use crate::article::Article;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Delay each task takes before every request it sends. Tasks wait
/// independently, so up to `concurrency` requests can still start together.
pub const DEFAULT_LATENCY: Duration = Duration::from_secs(1);

/// Translator backed by OpenAI chat completions.
pub struct OpenAI {
    client: reqwest::Client,
    api_key: String,
    model: String,
    prompt: String,
    latency: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAI {
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

    async fn complete(&self, text: &str) -> Result<String, TranslateError> {
        tokio::time::sleep(self.latency).await;

        let content = format!("{}\n{}", self.prompt, text);
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: &content,
            }],
        };
        let resp = self
            .client
            .post(CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let resp: ChatResponse = check_status(resp).await?.json().await?;
        first_message(resp).ok_or_else(|| TranslateError::EmptyResponse(self.model.clone()))
    }
}

fn first_message(resp: ChatResponse) -> Option<String> {
    let content = resp.choices.into_iter().next()?.message.content?;
    let content = content.trim();
    (!content.is_empty()).then(|| content.to_string())
}

#[async_trait]
impl Translator for OpenAI {
    fn name(&self) -> &str {
        "openai"
    }

    async fn translate(&self, article: &Article) -> Result<Article, TranslateError> {
        let title = self.complete(&article.title).await?;
        let summary = self.complete(&article.summary).await?;
        Ok(article.with_text(title, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let body = ChatRequest {
            model: DEFAULT_MODEL,
            messages: [ChatMessage {
                role: "user",
                content: "hi",
            }],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "model": "gpt-3.5-turbo",
                "messages": [{"role": "user", "content": "hi"}]
            })
        );
    }

    #[test]
    fn test_first_message() {
        let resp: ChatResponse = serde_json::from_str(
            r#"{"id": "chatcmpl-1", "object": "chat.completion",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": " Galaxien \n"},
                "finish_reason": "stop"}]}"#,
        )
        .unwrap();
        assert_eq!(first_message(resp).as_deref(), Some("Galaxien"));

        let resp: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert_eq!(first_message(resp), None);
    }

    #[test]
    fn test_builder() {
        assert_eq!(OpenAI::new("sk".to_string(), "de", false).unwrap().latency, DEFAULT_LATENCY);
        let openai = OpenAI::new("sk".to_string(), "de", false)
            .unwrap()
            .with_model("gpt-4o-mini")
            .with_latency(Duration::from_millis(10));
        assert_eq!(openai.model, "gpt-4o-mini");
        assert_eq!(openai.latency, Duration::from_millis(10));
        assert_eq!(
            openai.prompt,
            "Strictly translate the following texts in German."
        );
    }
}
