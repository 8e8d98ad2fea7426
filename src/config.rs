use thiserror::Error;

use crate::mapping::MapOptions;
use crate::search::{SearchQuery, DEFAULT_END, DEFAULT_MAX_RESULTS, DEFAULT_START};
use crate::translate::{self, language::LANG_AUTO, TranslatorKind, TranslatorOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub start: String,
    pub end: String,
    pub max_results: u32,
    pub format: bool,
    pub translate: bool,
    pub translator: TranslatorKind,
    pub translator_options: TranslatorOptions,
    pub map_options: MapOptions,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let translator = match get("AIXIV_TRANSLATOR") {
            Some(name) => name
                .parse::<TranslatorKind>()
                .map_err(|e| ConfigError::invalid("AIXIV_TRANSLATOR", &name, e))?,
            None => TranslatorKind::Gemini,
        };

        let translator_options = TranslatorOptions {
            api_key: get("AIXIV_API_KEY")
                .unwrap_or_else(|| translator.default_api_key().to_string()),
            language: get("AIXIV_LANGUAGE").unwrap_or_else(|| LANG_AUTO.to_string()),
            summarize: parse_bool("AIXIV_SUMMARIZE", get("AIXIV_SUMMARIZE"), false)?,
            model: get("AIXIV_MODEL"),
        };

        let mut map_options = MapOptions::default();
        if let Some(value) = get("AIXIV_CONCURRENCY") {
            let concurrency = value
                .trim()
                .parse::<usize>()
                .map_err(|e| ConfigError::invalid("AIXIV_CONCURRENCY", &value, e))?;
            map_options = map_options.with_concurrency(concurrency);
            map_options
                .validate()
                .map_err(|e| ConfigError::invalid("AIXIV_CONCURRENCY", &value, e))?;
        }
        if let Some(value) = get("AIXIV_TIMEOUT") {
            let secs = value
                .trim()
                .parse::<f64>()
                .map_err(|e| ConfigError::invalid("AIXIV_TIMEOUT", &value, e))?;
            map_options = map_options
                .with_timeout_secs(secs)
                .map_err(|e| ConfigError::invalid("AIXIV_TIMEOUT", &value, e))?;
        }

        let max_results = match get("AIXIV_MAXIMUM") {
            Some(value) => value
                .trim()
                .parse::<u32>()
                .map_err(|e| ConfigError::invalid("AIXIV_MAXIMUM", &value, e))?,
            None => DEFAULT_MAX_RESULTS,
        };

        Ok(Self {
            categories: split_list(get("AIXIV_CATEGORIES")),
            keywords: split_list(get("AIXIV_KEYWORDS")),
            start: get("AIXIV_START").unwrap_or_else(|| DEFAULT_START.to_string()),
            end: get("AIXIV_END").unwrap_or_else(|| DEFAULT_END.to_string()),
            max_results,
            format: parse_bool("AIXIV_FORMAT", get("AIXIV_FORMAT"), true)?,
            translate: parse_bool("AIXIV_TRANSLATE", get("AIXIV_TRANSLATE"), false)?,
            translator,
            translator_options,
            map_options,
        })
    }

    /// Search query from the configured defaults.
    pub fn search_query(&self) -> SearchQuery {
        SearchQuery {
            categories: self.categories.clone(),
            keywords: self.keywords.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
            max_results: self.max_results,
            ..SearchQuery::default()
        }
    }

    /// Translator options for `kind`. Backends other than the configured one
    /// read their conventional key variable and use their default model.
    pub fn translator_options_for(&self, kind: TranslatorKind) -> TranslatorOptions {
        if kind == self.translator {
            return self.translator_options.clone();
        }
        TranslatorOptions {
            api_key: kind.default_api_key().to_string(),
            model: None,
            ..self.translator_options.clone()
        }
    }

    /// Return a status entry for every registered translator.
    pub fn translator_status(&self) -> Vec<TranslatorStatus> {
        TranslatorKind::ALL
            .iter()
            .map(|&kind| {
                let api_key = self.translator_options_for(kind).api_key;
                let key_available = translate::resolve_api_key(&api_key).is_ok();
                let note = match (key_available, api_key.strip_prefix('$')) {
                    (true, _) => "API key set".to_string(),
                    (false, Some(var)) => format!("Disabled: {} not set", var),
                    (false, None) => "Disabled: API key is empty".to_string(),
                };
                TranslatorStatus {
                    name: kind,
                    default: kind == self.translator,
                    key_available,
                    note,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TranslatorStatus {
    pub name: TranslatorKind,
    pub default: bool,
    pub key_available: bool,
    pub note: String,
}

/// Comma-separated list, blanks dropped.
fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|s| {
            s.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_bool(var: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(var, &value, "expected true or false")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn config(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|var| env.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]).unwrap();
        assert!(c.categories.is_empty());
        assert_eq!(c.start, DEFAULT_START);
        assert_eq!(c.end, DEFAULT_END);
        assert_eq!(c.max_results, 1000);
        assert!(c.format);
        assert!(!c.translate);
        assert_eq!(c.translator, TranslatorKind::Gemini);
        assert_eq!(c.translator_options.api_key, "$GOOGLE_API_KEY");
        assert_eq!(c.translator_options.language, "auto");
        assert!(!c.translator_options.summarize);
        assert_eq!(c.map_options, MapOptions::default());
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("AIXIV_CATEGORIES", "astro-ph.GA, astro-ph.CO,,"),
            ("AIXIV_KEYWORDS", "galaxy"),
            ("AIXIV_MAXIMUM", "50"),
            ("AIXIV_FORMAT", "off"),
            ("AIXIV_TRANSLATOR", "DeepL"),
            ("AIXIV_LANGUAGE", "ja"),
            ("AIXIV_SUMMARIZE", "yes"),
            ("AIXIV_CONCURRENCY", "8"),
            ("AIXIV_TIMEOUT", "2.5"),
        ])
        .unwrap();
        assert_eq!(c.categories, vec!["astro-ph.GA", "astro-ph.CO"]);
        assert_eq!(c.keywords, vec!["galaxy"]);
        assert_eq!(c.max_results, 50);
        assert!(!c.format);
        assert_eq!(c.translator, TranslatorKind::DeepL);
        assert_eq!(c.translator_options.api_key, "$DEEPL_API_KEY");
        assert!(c.translator_options.summarize);
        assert_eq!(c.map_options.concurrency, 8);
        assert_eq!(c.map_options.timeout, Duration::from_millis(2500));

        let q = c.search_query();
        assert_eq!(q.categories, c.categories);
        assert_eq!(q.max_results, 50);
    }

    #[test]
    fn test_invalid_values_fail_fast() {
        for (var, value) in [
            ("AIXIV_CONCURRENCY", "0"),
            ("AIXIV_CONCURRENCY", "-1"),
            ("AIXIV_CONCURRENCY", "18446744073709551615"),
            ("AIXIV_TIMEOUT", "0"),
            ("AIXIV_TIMEOUT", "soon"),
            ("AIXIV_MAXIMUM", "lots"),
            ("AIXIV_SUMMARIZE", "maybe"),
            ("AIXIV_TRANSLATOR", "aixiv.translators.Gemini"),
        ] {
            assert!(config(&[(var, value)]).is_err(), "{}={}", var, value);
        }
    }

    #[test]
    fn test_translator_options_for_other_backend() {
        let c = config(&[
            ("AIXIV_API_KEY", "literal-key"),
            ("AIXIV_MODEL", "gemini-1.5-flash"),
            ("AIXIV_LANGUAGE", "ja"),
        ])
        .unwrap();

        let gemini = c.translator_options_for(TranslatorKind::Gemini);
        assert_eq!(gemini, c.translator_options);

        let openai = c.translator_options_for(TranslatorKind::OpenAI);
        assert_eq!(openai.api_key, "$OPENAI_API_KEY");
        assert_eq!(openai.model, None);
        assert_eq!(openai.language, "ja");
    }

    #[test]
    fn test_translator_status() {
        let c = config(&[("AIXIV_API_KEY", "literal-key")]).unwrap();
        let statuses = c.translator_status();
        assert_eq!(statuses.len(), 3);
        let gemini = statuses
            .iter()
            .find(|s| s.name == TranslatorKind::Gemini)
            .unwrap();
        assert!(gemini.default);
        assert!(gemini.key_available);
        assert_eq!(statuses.iter().filter(|s| s.default).count(), 1);
    }
}
