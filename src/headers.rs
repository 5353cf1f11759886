use once_cell::sync::Lazy;
use regex::Regex;

use crate::lex::collapse_header;
use crate::schema::ColumnLabel;

static YEAR_BUDGET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(20\d{2})\s+(approved|proposed|revised|final|original)\s+budget").unwrap()
});
static YEAR_STATUS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(20\d{2})\s+(approved|proposed|revised|final|original)").unwrap());
static YEAR_PERFORMANCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(20\d{2})\s+performance").unwrap());
static PERIOD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"january\s+to\s+\w+").unwrap());
static CLIMATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(20\d{2})\s+climate\s+change\s+(mitigation|adaptation)\s+tagging").unwrap()
});

/// Canonical column order applied when a recognized revenue header carries
/// all four of these labels.
const REVENUE_ORDER: [&str; 4] = [
    "2024_approved_budget",
    "2024_final_budget",
    "2024_performance",
    "2025_approved_budget",
];

/// Infers the ordered period labels from a small window of header lines.
/// Labels are deduplicated preserving first occurrence and sorted by the
/// offset they matched at.
pub fn infer_period_labels(header_lines: &[String]) -> Vec<ColumnLabel> {
    let lower = collapse_header(header_lines);

    let mut matches: Vec<(usize, String)> = Vec::new();
    for caps in YEAR_BUDGET_RE.captures_iter(&lower) {
        let m = caps.get(0).unwrap();
        matches.push((m.start(), format!("{}_{}_budget", &caps[1], &caps[2])));
    }
    for caps in YEAR_STATUS_RE.captures_iter(&lower) {
        let m = caps.get(0).unwrap();
        matches.push((m.start(), format!("{}_{}_budget", &caps[1], &caps[2])));
    }
    for caps in YEAR_PERFORMANCE_RE.captures_iter(&lower) {
        let m = caps.get(0).unwrap();
        matches.push((m.start(), format!("{}_performance", &caps[1])));
    }
    for m in PERIOD_RE.find_iter(&lower) {
        matches.push((m.start(), m.as_str().replace(' ', "_")));
    }
    for caps in CLIMATE_RE.captures_iter(&lower) {
        let m = caps.get(0).unwrap();
        matches.push((m.start(), format!("{}_climate_{}", &caps[1], &caps[2])));
    }

    if matches.is_empty() {
        return Vec::new();
    }

    matches.sort_by_key(|(start, _)| *start);
    let mut labels: Vec<String> = Vec::new();
    for (_, label) in matches {
        if !labels.contains(&label) {
            labels.push(label);
        }
    }

    if REVENUE_ORDER.iter().all(|item| labels.iter().any(|l| l == item)) {
        let mut ordered: Vec<String> = REVENUE_ORDER.iter().map(|s| s.to_string()).collect();
        for label in labels {
            if !ordered.contains(&label) {
                ordered.push(label);
            }
        }
        return ordered.into_iter().map(ColumnLabel::Period).collect();
    }

    labels.into_iter().map(ColumnLabel::Period).collect()
}

/// Picks the column index for the target year: an approved budget first,
/// then a proposed one, then any budget label for that year.
pub fn select_target_label(labels: &[ColumnLabel], target_year: &str) -> Option<usize> {
    let year_prefix = format!("{}_", target_year);
    let keys: Vec<String> = labels.iter().map(|label| label.as_key()).collect();
    for (idx, key) in keys.iter().enumerate() {
        if key.starts_with(&year_prefix) && key.contains("approved") {
            return Some(idx);
        }
    }
    for (idx, key) in keys.iter().enumerate() {
        if key.starts_with(&year_prefix) && key.contains("proposed") {
            return Some(idx);
        }
    }
    for (idx, key) in keys.iter().enumerate() {
        if key.starts_with(&year_prefix) && key.contains("budget") {
            return Some(idx);
        }
    }
    None
}

/// Distinct years mentioned by the labels, ascending.
pub fn label_years(labels: &[ColumnLabel]) -> Vec<String> {
    let mut years: Vec<String> = Vec::new();
    for label in labels {
        let key = label.as_key();
        if key.len() >= 4 && key[..4].starts_with("20") && key[..4].chars().all(|c| c.is_ascii_digit())
        {
            let year = key[..4].to_string();
            if !years.contains(&year) {
                years.push(year);
            }
        }
    }
    years.sort();
    years
}
