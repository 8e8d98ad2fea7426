use super::{check_status, TranslateError, Translator};
use crate::article::Article;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const FREE_URL: &str = "https://api-free.deepl.com/v2/translate";
const PRO_URL: &str = "https://api.deepl.com/v2/translate";

/// Translator backed by the DeepL REST API. Summarization is not supported.
pub struct DeepL {
    client: reqwest::Client,
    api_key: String,
    target_lang: String,
}

#[derive(Serialize)]
struct DeepLRequest<'a> {
    text: [&'a str; 2],
    target_lang: &'a str,
}

#[derive(Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Deserialize)]
struct DeepLTranslation {
    text: String,
}

impl DeepL {
    pub fn new(api_key: String, language: &str, summarize: bool) -> Result<Self, TranslateError> {
        if summarize {
            tracing::warn!("Summarization is not supported by DeepL, articles will only be translated");
        }
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("aixiv/", env!("CARGO_PKG_VERSION")))
                .build()?,
            api_key,
            target_lang: target_lang(language),
        })
    }

    /// Free-tier keys end in `:fx` and use a separate host.
    fn endpoint(&self) -> &'static str {
        if self.api_key.ends_with(":fx") {
            FREE_URL
        } else {
            PRO_URL
        }
    }
}

/// DeepL wants upper-case codes and a regional variant for English and
/// Portuguese targets.
fn target_lang(language: &str) -> String {
    match language.to_lowercase().as_str() {
        "en" => "EN-US".to_string(),
        "pt" => "PT-PT".to_string(),
        other => other.to_uppercase(),
    }
}

fn parse_response(resp: DeepLResponse) -> Result<(String, String), TranslateError> {
    let mut texts = resp.translations.into_iter().map(|t| t.text);
    match (texts.next(), texts.next()) {
        (Some(title), Some(summary)) => Ok((title, summary)),
        _ => Err(TranslateError::EmptyResponse("deepl".to_string())),
    }
}

#[async_trait]
impl Translator for DeepL {
    fn name(&self) -> &str {
        "deepl"
    }

    async fn translate(&self, article: &Article) -> Result<Article, TranslateError> {
        let body = DeepLRequest {
            text: [article.title.as_str(), article.summary.as_str()],
            target_lang: &self.target_lang,
        };
        let resp = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .json(&body)
            .send()
            .await?;
        let resp: DeepLResponse = check_status(resp).await?.json().await?;
        let (title, summary) = parse_response(resp)?;
        Ok(article.with_text(title, summary))
    }
}
