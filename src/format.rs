//! Plain-text cleanup of titles and abstracts: LaTeX markup to Unicode and
//! whitespace normalization.

use std::iter::Peekable;
use std::str::Chars;
use std::sync::LazyLock;

use regex::Regex;

use crate::article::Article;
use crate::mapping::Transform;

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n+\s*|\n*\s+").expect("valid regex"));

/// Commands that only style their argument. The argument is kept, the
/// command is dropped.
const WRAPPERS: &[&str] = &[
    "emph", "text", "textbf", "textit", "textrm", "textsc", "textsf", "texttt", "mathbf",
    "mathcal", "mathit", "mathrm", "mathsf", "mathtt", "mathbb", "operatorname", "boldsymbol",
    "underline", "mbox",
];

/// Font switches, sizing and spacing macros that produce no text.
const SILENT: &[&str] = &[
    "rm", "it", "bf", "sf", "tt", "cal", "em", "sl", "sc", "up", "md", "normalfont",
    "left", "right", "middle", "big", "Big", "bigg", "Bigg", "bigl", "bigr", "Bigl", "Bigr",
    "biggl", "biggr", "Biggl", "Biggr", "displaystyle", "textstyle", "scriptstyle",
    "scriptscriptstyle", "limits", "nolimits", "quad", "qquad", "noindent", "smallskip",
    "medskip", "bigskip", "newline", "linebreak", "relax", "protect", "small", "footnotesize",
    "scriptsize", "tiny", "large", "Large", "LARGE", "huge", "Huge", "normalsize",
];

/// Replace every run of whitespace (including newlines) with a single space.
pub fn normalize_whitespace(text: &str) -> String {
    SEPARATORS.replace_all(text.trim(), " ").into_owned()
}

/// Convert a practical subset of LaTeX to Unicode text.
pub fn latex_to_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => convert_escape(&mut chars, &mut out),
            '$' | '{' | '}' => {}
            '~' => out.push(' '),
            '-' if chars.peek() == Some(&'-') => {
                chars.next();
                if chars.peek() == Some(&'-') {
                    chars.next();
                    out.push('—');
                } else {
                    out.push('–');
                }
            }
            '`' if chars.peek() == Some(&'`') => {
                chars.next();
                out.push('“');
            }
            '\'' if chars.peek() == Some(&'\'') => {
                chars.next();
                out.push('”');
            }
            _ => out.push(c),
        }
    }
    out
}

fn convert_escape(chars: &mut Peekable<Chars<'_>>, out: &mut String) {
    let Some(&next) = chars.peek() else {
        return;
    };

    if next.is_ascii_alphabetic() {
        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if !c.is_ascii_alphabetic() {
                break;
            }
            name.push(c);
            chars.next();
        }
        if let Some(symbol) = symbol(&name) {
            out.push_str(symbol);
        } else if SILENT.contains(&name.as_str()) {
            // TeX swallows the spaces that end a control word.
            while chars.peek().is_some_and(|c| *c == ' ') {
                chars.next();
            }
        } else if !WRAPPERS.contains(&name.as_str()) {
            out.push_str(&name);
        }
        return;
    }

    chars.next();
    match next {
        '%' | '&' | '_' | '$' | '#' | '{' | '}' => out.push(next),
        '\\' | ',' | ';' | ' ' => out.push(' '),
        '"' | '\'' | '`' | '^' | '~' => {
            let braced = chars.peek() == Some(&'{');
            if braced {
                chars.next();
            }
            if let Some(base) = chars.next() {
                out.push(base);
                out.push(combining_accent(next));
            }
            if braced && chars.peek() == Some(&'}') {
                chars.next();
            }
        }
        other => out.push(other),
    }
}

fn combining_accent(marker: char) -> char {
    match marker {
        '"' => '\u{0308}',
        '\'' => '\u{0301}',
        '`' => '\u{0300}',
        '^' => '\u{0302}',
        _ => '\u{0303}',
    }
}

fn symbol(name: &str) -> Option<&'static str> {
    let s = match name {
        "alpha" => "α",
        "beta" => "β",
        "gamma" => "γ",
        "delta" => "δ",
        "epsilon" => "ϵ",
        "varepsilon" => "ε",
        "zeta" => "ζ",
        "eta" => "η",
        "theta" => "θ",
        "vartheta" => "ϑ",
        "iota" => "ι",
        "kappa" => "κ",
        "lambda" => "λ",
        "mu" => "μ",
        "nu" => "ν",
        "xi" => "ξ",
        "pi" => "π",
        "rho" => "ρ",
        "sigma" => "σ",
        "tau" => "τ",
        "upsilon" => "υ",
        "phi" => "ϕ",
        "varphi" => "φ",
        "chi" => "χ",
        "psi" => "ψ",
        "omega" => "ω",
        "Gamma" => "Γ",
        "Delta" => "Δ",
        "Theta" => "Θ",
        "Lambda" => "Λ",
        "Xi" => "Ξ",
        "Pi" => "Π",
        "Sigma" => "Σ",
        "Upsilon" => "Υ",
        "Phi" => "Φ",
        "Psi" => "Ψ",
        "Omega" => "Ω",
        "ell" => "ℓ",
        "hbar" => "ℏ",
        "infty" => "∞",
        "pm" => "±",
        "mp" => "∓",
        "times" => "×",
        "cdot" => "⋅",
        "circ" => "∘",
        "sim" => "∼",
        "simeq" => "≃",
        "approx" => "≈",
        "propto" => "∝",
        "le" | "leq" => "≤",
        "ge" | "geq" => "≥",
        "ne" | "neq" => "≠",
        "lesssim" => "≲",
        "gtrsim" => "≳",
        "ll" => "≪",
        "gg" => "≫",
        "to" | "rightarrow" => "→",
        "leftarrow" => "←",
        "Rightarrow" => "⇒",
        "leftrightarrow" => "↔",
        "partial" => "∂",
        "nabla" => "∇",
        "sum" => "∑",
        "prod" => "∏",
        "int" => "∫",
        "sqrt" => "√",
        "odot" => "⊙",
        "oplus" => "⊕",
        "otimes" => "⊗",
        "in" => "∈",
        "subset" => "⊂",
        "cup" => "∪",
        "cap" => "∩",
        "forall" => "∀",
        "exists" => "∃",
        "dots" | "ldots" | "cdots" => "…",
        "AA" => "Å",
        "aa" => "å",
        "ss" => "ß",
        "ae" => "æ",
        "AE" => "Æ",
        "o" => "ø",
        "O" => "Ø",
        "textendash" => "–",
        "textemdash" => "—",
        "degree" => "°",
        _ => return None,
    };
    Some(s)
}

/// Convert LaTeX and normalize whitespace.
pub fn format_text(text: &str) -> String {
    normalize_whitespace(&latex_to_text(text))
}

/// New article with formatted title and summary.
pub fn format_article(article: &Article) -> anyhow::Result<Article> {
    Ok(article.with_text(format_text(&article.title), format_text(&article.summary)))
}

/// The formatter as a blocking transform for `amap`.
pub fn formatter() -> Transform<Article> {
    Transform::blocking("format_article", format_article)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{amap, MapOptions};

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("a\n  b\t\tc\n\nd "), "a b c d");
        assert_eq!(normalize_whitespace("  single  "), "single");
    }

    #[test]
    fn test_latex_symbols_and_math() {
        assert_eq!(latex_to_text(r"$\alpha$-particles"), "α-particles");
        assert_eq!(latex_to_text(r"$M \sim 10^{12} M_\odot$"), "M ∼ 10^12 M_⊙");
        assert_eq!(latex_to_text(r"$z\gtrsim 6$"), "z≳ 6");
        assert_eq!(latex_to_text(r"\Lambda CDM"), "Λ CDM");
    }

    #[test]
    fn test_latex_wrappers_and_escapes() {
        assert_eq!(latex_to_text(r"\textit{Gaia} DR3"), "Gaia DR3");
        assert_eq!(latex_to_text(r"\emph{very} bright"), "very bright");
        assert_eq!(latex_to_text(r"50\% of~stars \& gas"), "50% of stars & gas");
        assert_eq!(latex_to_text(r"pages 1--2 --- roughly"), "pages 1–2 — roughly");
        assert_eq!(latex_to_text(r"``quoted''"), "“quoted”");
        assert_eq!(latex_to_text(r"\unknown command"), "unknown command");
    }

    #[test]
    fn test_latex_font_switches_and_delimiters() {
        assert_eq!(latex_to_text(r"$M_{\rm sun}$"), "M_sun");
        assert_eq!(latex_to_text(r"{\it Gaia} data"), "Gaia data");
        assert_eq!(latex_to_text(r"{\bf bold}"), "bold");
        assert_eq!(latex_to_text(r"$\left( x \right)$"), "( x )");
        assert_eq!(latex_to_text(r"$\displaystyle \Bigl[ a \Bigr]$"), "[ a ]");
    }

    #[test]
    fn test_latex_accents() {
        assert_eq!(latex_to_text(r#"Schr\"odinger"#), "Schro\u{0308}dinger");
        assert_eq!(latex_to_text(r#"\AA ngstr\"{o}m"#), "Å ngstro\u{0308}m");
        assert_eq!(latex_to_text(r"Poincar\'{e}"), "Poincare\u{0301}");
    }

    #[test]
    fn test_format_article_runs_through_amap() {
        let article = Article::new(
            "The $\\Lambda$CDM\n  model",
            vec!["A. Author".to_string()],
            "We find   $z \\sim 2$.",
            "http://arxiv.org/abs/0000.00000v1",
        );
        let formatted = amap(&formatter(), vec![article.clone()], MapOptions::default()).unwrap();
        assert_eq!(formatted[0].title, "The ΛCDM model");
        assert_eq!(formatted[0].summary, "We find z ∼ 2.");
        assert_eq!(formatted[0].origin(), Some(&article));
    }
}
