//! Language codes: resolving `"auto"` from the process locale and naming
//! languages in English for LLM prompts.

pub const LANG_AUTO: &str = "auto";
pub const LANG_EN: &str = "en";

const LOCALE_VARS: &[&str] = &["LC_ALL", "LC_MESSAGES", "LANG"];

/// Resolve `"auto"` from the environment's locale; other codes pass through
/// lowercased.
pub fn resolve_language(code: &str) -> String {
    resolve_language_with(code, |var| std::env::var(var).ok())
}

pub fn resolve_language_with<F>(code: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let code = code.trim();
    if !code.eq_ignore_ascii_case(LANG_AUTO) {
        return code.to_lowercase();
    }

    let detected = LOCALE_VARS
        .iter()
        .filter_map(|var| lookup(var))
        .find_map(|locale| language_from_locale(&locale));

    match detected {
        Some(lang) => {
            tracing::debug!("Resolved language {:?} from locale", lang);
            lang
        }
        None => {
            tracing::debug!("No usable locale, falling back to {:?}", LANG_EN);
            LANG_EN.to_string()
        }
    }
}

/// `ja_JP.UTF-8` -> `ja`. The `C` and `POSIX` locales carry no language.
fn language_from_locale(locale: &str) -> Option<String> {
    let lang = locale
        .split(['_', '.', '@', '-'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    if lang.is_empty() || lang == "c" || lang == "posix" {
        None
    } else {
        Some(lang)
    }
}

/// English name of a language code, used in LLM prompts. Unknown codes are
/// returned as given.
pub fn language_name(code: &str) -> String {
    let primary = code.split(['-', '_']).next().unwrap_or(code).to_lowercase();
    let name = match primary.as_str() {
        "ar" => "Arabic",
        "bg" => "Bulgarian",
        "cs" => "Czech",
        "da" => "Danish",
        "de" => "German",
        "el" => "Greek",
        "en" => "English",
        "es" => "Spanish",
        "fi" => "Finnish",
        "fr" => "French",
        "hi" => "Hindi",
        "hu" => "Hungarian",
        "id" => "Indonesian",
        "it" => "Italian",
        "ja" => "Japanese",
        "ko" => "Korean",
        "nl" => "Dutch",
        "pl" => "Polish",
        "pt" => "Portuguese",
        "ro" => "Romanian",
        "ru" => "Russian",
        "sv" => "Swedish",
        "th" => "Thai",
        "tr" => "Turkish",
        "uk" => "Ukrainian",
        "vi" => "Vietnamese",
        "zh" => "Chinese",
        _ => return code.to_string(),
    };
    name.to_string()
}
