use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d{6,}").unwrap());
static COLUMN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S\s{2,}\S").unwrap());

/// Per-page text shape indicators used by review tooling to tell table pages
/// from prose and near-empty pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMetrics {
    pub page: usize,
    pub char_count: usize,
    pub nonempty_lines: usize,
    pub empty_lines: usize,
    pub digit_ratio: f64,
    pub code_line_ratio: f64,
    pub column_line_ratio: f64,
    pub table_like: bool,
    pub low_text: bool,
    pub first_line: String,
    pub last_line: String,
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

pub fn compute_page_metrics(pages: &[String]) -> Vec<PageMetrics> {
    let mut metrics = Vec::with_capacity(pages.len());

    for (page_offset, page_text) in pages.iter().enumerate() {
        let lines: Vec<&str> = page_text.lines().collect();
        let nonempty_lines: Vec<&str> = lines
            .iter()
            .copied()
            .filter(|line| !line.trim().is_empty())
            .collect();
        let nonempty_count = nonempty_lines.len();
        let empty_count = lines.len() - nonempty_count;

        let first_line = nonempty_lines.first().map(|l| l.trim()).unwrap_or("");
        let last_line = nonempty_lines.last().map(|l| l.trim()).unwrap_or("");

        let char_count = page_text.trim().chars().count();
        let digit_count = page_text.chars().filter(|c| c.is_ascii_digit()).count();
        let letter_count = page_text.chars().filter(|c| c.is_alphabetic()).count();
        let digit_ratio = digit_count as f64 / (digit_count + letter_count).max(1) as f64;

        let code_line_count = nonempty_lines
            .iter()
            .filter(|line| CODE_RE.is_match(line))
            .count();
        let column_line_count = nonempty_lines
            .iter()
            .filter(|line| COLUMN_RE.is_match(line))
            .count();

        let code_line_ratio = code_line_count as f64 / nonempty_count.max(1) as f64;
        let column_line_ratio = column_line_count as f64 / nonempty_count.max(1) as f64;

        let table_like = digit_ratio > 0.35 || column_line_ratio > 0.25 || code_line_ratio > 0.2;
        let low_text = char_count < 80;

        metrics.push(PageMetrics {
            page: page_offset + 1,
            char_count,
            nonempty_lines: nonempty_count,
            empty_lines: empty_count,
            digit_ratio: round4(digit_ratio),
            code_line_ratio: round4(code_line_ratio),
            column_line_ratio: round4(column_line_ratio),
            table_like,
            low_text,
            first_line: first_line.to_string(),
            last_line: last_line.to_string(),
        });
    }

    metrics
}
