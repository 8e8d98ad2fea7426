use std::sync::Arc;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters,
    model::*, tool, tool_handler, tool_router,
    transport::stdio, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use aixiv::apis::{arxiv::ArxivClient, ArticleSource, SourceError};
use aixiv::config::Config;
use aixiv::search::{self, Processing, SortBy, SortOrder};
use aixiv::translate::{self, Translator, TranslatorKind, TranslatorOptions};

// ── Parameter structs ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchArticlesParams {
    #[schemars(description = "arXiv categories to include (e.g. [\"astro-ph.GA\"]), joined with OR")]
    categories: Option<Vec<String>>,
    #[schemars(description = "Keywords matched against abstracts, joined with OR")]
    keywords: Option<Vec<String>>,
    #[schemars(description = "Start of the submission window, e.g. \"2 days ago at midnight in UTC\" or \"2024-01-01\"")]
    start: Option<String>,
    #[schemars(description = "End of the submission window (default: today at midnight UTC)")]
    end: Option<String>,
    #[schemars(description = "Maximum articles to fetch (default from AIXIV_MAXIMUM, 1000)")]
    max_results: Option<u32>,
    #[schemars(description = "Sort criterion: relevance (default), lastUpdatedDate, submittedDate")]
    sort_by: Option<SortBy>,
    #[schemars(description = "Sort order: descending (default) or ascending")]
    sort_order: Option<SortOrder>,
    #[schemars(description = "Convert LaTeX markup and collapse whitespace (default true)")]
    format: Option<bool>,
    #[schemars(description = "Translate titles and summaries")]
    translate: Option<bool>,
    #[schemars(description = "Translation backend: deepl, gemini, openai")]
    translator: Option<String>,
    #[schemars(description = "Target language code, or 'auto' for the server locale")]
    language: Option<String>,
    #[schemars(description = "Summarize instead of translating (LLM backends only)")]
    summarize: Option<bool>,
}

// ── Server ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ArticleServer {
    tool_router: ToolRouter<Self>,
    config: Arc<Config>,
    source: Arc<dyn ArticleSource>,
}

#[tool_router]
impl ArticleServer {
    pub fn create() -> anyhow::Result<Self> {
        let config = Config::from_env()?;
        let source = ArxivClient::new()?;

        tracing::info!(
            "Initialized {} source, translator={}, concurrency={}, timeout={:?}",
            source.name(),
            config.translator,
            config.map_options.concurrency,
            config.map_options.timeout
        );

        Ok(Self {
            tool_router: Self::tool_router(),
            config: Arc::new(config),
            source: Arc::new(source),
        })
    }

    #[tool(description = "List translation backends, which one is the default, and whether its API key is available")]
    async fn list_translators(&self) -> Result<CallToolResult, McpError> {
        let statuses = self.config.translator_status();
        let json = serde_json::to_string_pretty(&statuses)
            .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Search arXiv by submission date, category and keyword. Optionally formats LaTeX and translates each article; articles that fail to translate are returned as fetched.")]
    async fn search_articles(
        &self,
        Parameters(params): Parameters<SearchArticlesParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut query = self.config.search_query();
        if let Some(categories) = params.categories {
            query.categories = categories;
        }
        if let Some(keywords) = params.keywords {
            query.keywords = keywords;
        }
        if let Some(start) = params.start {
            query.start = start;
        }
        if let Some(end) = params.end {
            query.end = end;
        }
        if let Some(max) = params.max_results {
            query.max_results = max;
        }
        query.sort_by = params.sort_by.unwrap_or_default();
        query.sort_order = params.sort_order.unwrap_or_default();

        let translator = if params.translate.unwrap_or(self.config.translate) {
            Some(self.translator(
                params.translator.as_deref(),
                params.language,
                params.summarize,
            )?)
        } else {
            None
        };

        let processing = Processing {
            format: params.format.unwrap_or(self.config.format),
            translator,
            options: self.config.map_options,
        };

        let report = search::search_articles(self.source.as_ref(), &query, &processing)
            .await
            .map_err(|e| match e.downcast_ref::<SourceError>() {
                Some(SourceError::InvalidDate(_)) => McpError::invalid_params(e.to_string(), None),
                _ => McpError::internal_error(format!("Search failed: {:#}", e), None),
            })?;

        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    /// Build a translator from the configured defaults and per-call overrides.
    fn translator(
        &self,
        name: Option<&str>,
        language: Option<String>,
        summarize: Option<bool>,
    ) -> Result<Arc<dyn Translator>, McpError> {
        let kind = match name {
            Some(name) => name
                .parse::<TranslatorKind>()
                .map_err(|e| McpError::invalid_params(e.to_string(), None))?,
            None => self.config.translator,
        };

        let options = self.config.translator_options_for(kind);
        let options = TranslatorOptions {
            language: language.unwrap_or(options.language),
            summarize: summarize.unwrap_or(options.summarize),
            ..options
        };

        translate::build_translator(kind, &options)
            .map_err(|e| McpError::invalid_params(format!("Translator unavailable: {}", e), None))
    }
}

#[tool_handler]
impl ServerHandler for ArticleServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Search recent arXiv submissions by date window, category and \
                 keyword. Titles and summaries can be converted from LaTeX to \
                 plain text and translated with DeepL, Gemini or OpenAI."
                    .into(),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting aixiv MCP server");

    let server = ArticleServer::create()?;
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}
