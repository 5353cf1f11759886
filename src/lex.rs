use once_cell::sync::Lazy;
use regex::Regex;

/// Numeric token: optional sign, comma-grouped thousands, optional decimals.
pub static NUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d{1,3}(?:,\d{3})*(?:\.\d+)?").unwrap());

static COLUMN_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static TRAILING_DASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*-\s*$").unwrap());

/// Splits a line at every run of two or more whitespace characters. Embedded
/// single spaces stay inside a column; empty fragments are discarded.
pub fn split_columns(line: &str) -> Vec<String> {
    COLUMN_SPLIT_RE
        .split(line.trim_end())
        .map(|col| col.trim())
        .filter(|col| !col.is_empty())
        .map(|col| col.to_string())
        .collect()
}

/// Parses one amount fragment. Empty is null, a bare dash is an explicit
/// zero, parenthesized values are negative. Failures return None, never
/// panic.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if value == "-" || value == "\u{2013}" {
        return Some(0.0);
    }
    let value = value.replace(',', "").replace('(', "-").replace(')', "");
    let value: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if value.is_empty() || value == "-" {
        return None;
    }
    value.parse::<f64>().ok()
}

pub fn has_alpha(text: &str) -> bool {
    text.chars().any(|c| c.is_alphabetic())
}

/// Collapses inner whitespace and strips a trailing dash plus `.`/`:`
/// punctuation from a carried-over sector or objective label.
pub fn normalize_label(value: &str) -> String {
    let cleaned = WS_RE.replace_all(value.trim(), " ");
    let cleaned = TRAILING_DASH_RE.replace(&cleaned, "");
    cleaned.trim_matches(&[' ', '.', ':'][..]).to_string()
}

/// Joins a header window into one lowercase, whitespace-collapsed string for
/// label matching.
pub fn collapse_header(lines: &[String]) -> String {
    let joined = lines
        .iter()
        .map(|line| line.trim())
        .collect::<Vec<_>>()
        .join(" ");
    WS_RE.replace_all(&joined.to_lowercase(), " ").into_owned()
}
