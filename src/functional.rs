use once_cell::sync::Lazy;
use regex::Regex;

use crate::headers::select_target_label;
use crate::lex::{parse_amount, split_columns};
use crate::schema::{ColumnLabel, ExtractedField, FunctionalRow, Provenance};

static HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Functional Classification").unwrap());
static CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{3,6})\s+(.+)$").unwrap());
static CODE_ONLY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{3,6})\s*$").unwrap());

static YEAR_LABEL_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"(20\d{2})\s+original\s+budget").unwrap(),
            "original_budget",
        ),
        (
            Regex::new(r"(20\d{2})\s+revised\s+budget").unwrap(),
            "revised_budget",
        ),
        (
            Regex::new(r"(20\d{2})\s+approved\s+budget").unwrap(),
            "approved_budget",
        ),
        (
            Regex::new(r"(20\d{2})\s+performance").unwrap(),
            "performance",
        ),
    ]
});

// Year-less header fallbacks observed in real documents; preserved as tuned
// behavior.
const YEARLESS_FALLBACKS: [(&str, &str, &str); 4] = [
    ("approved", "approved_budget", "2025_approved_budget"),
    ("revised", "revised_budget", "2024_revised_budget"),
    ("original", "original_budget", "2024_original_budget"),
    ("performance", "performance", "2024_performance"),
];

fn infer_labels(header_text: &str) -> Vec<ColumnLabel> {
    let lower = header_text.to_lowercase();
    let lower = lower.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut matches: Vec<(usize, String)> = Vec::new();
    for (pattern, label) in YEAR_LABEL_PATTERNS.iter() {
        for caps in pattern.captures_iter(&lower) {
            let m = caps.get(0).unwrap();
            matches.push((m.start(), format!("{}_{}", &caps[1], label)));
        }
    }
    for (keyword, suffix, fallback) in YEARLESS_FALLBACKS {
        if lower.contains(keyword) && !matches.iter().any(|(_, label)| label.contains(suffix)) {
            matches.push((lower.len(), fallback.to_string()));
        }
    }
    matches.sort_by_key(|(start, _)| *start);
    let mut labels: Vec<String> = Vec::new();
    for (_, label) in matches {
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels.into_iter().map(ColumnLabel::Period).collect()
}

/// Reads `code description amounts...` rows under a Functional
/// Classification heading. Only pages carrying the heading are scanned; the
/// header's labels persist until a later header replaces them.
pub fn extract_functional_classification(
    pages: &[String],
    target_year: &str,
) -> Vec<FunctionalRow> {
    let mut rows: Vec<FunctionalRow> = Vec::new();
    let mut labels: Vec<ColumnLabel> = Vec::new();
    let mut target_index: Option<usize> = None;
    let mut in_table = false;

    for (page_offset, page_text) in pages.iter().enumerate() {
        let page_index = page_offset + 1;
        let lines: Vec<&str> = page_text.lines().collect();
        if !lines.iter().any(|line| HEADER_RE.is_match(line)) {
            continue;
        }

        for (line_index, &line) in lines.iter().enumerate() {
            if HEADER_RE.is_match(line) {
                let mut header_lines: Vec<&str> = Vec::new();
                for offset in 1..=2 {
                    if let Some(&next_line) = lines.get(line_index + offset) {
                        header_lines.push(next_line);
                    }
                }
                labels = infer_labels(&header_lines.join(" "));
                target_index = select_target_label(&labels, target_year);
                in_table = true;
                continue;
            }

            if !in_table {
                continue;
            }
            let stripped = line.trim();
            if stripped.is_empty() || stripped.to_lowercase().starts_with("total") {
                continue;
            }

            let columns = split_columns(line);
            if columns.len() < 3 {
                continue;
            }
            let (code, desc, amount_cols): (String, String, Vec<String>) =
                if let Some(caps) = CODE_RE.captures(&columns[0]) {
                    (
                        caps[1].to_string(),
                        caps[2].trim().to_string(),
                        columns[1..].to_vec(),
                    )
                } else if let Some(caps) = CODE_ONLY_RE.captures(&columns[0]) {
                    (
                        caps[1].to_string(),
                        columns[1].trim().to_string(),
                        columns[2..].to_vec(),
                    )
                } else {
                    continue;
                };

            if labels.is_empty() {
                continue;
            }
            let Some(target) = target_index else {
                continue;
            };
            let amount_cols = if amount_cols.len() >= labels.len() {
                amount_cols[amount_cols.len() - labels.len()..].to_vec()
            } else {
                continue;
            };
            let Some(raw) = amount_cols.get(target) else {
                continue;
            };
            let Some(amount_value) = parse_amount(raw) else {
                continue;
            };

            rows.push(FunctionalRow {
                code,
                description: desc,
                amount: ExtractedField::with_provenance(
                    amount_value,
                    vec![Provenance::new(page_index, line)],
                ),
            });
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_functional_rows_extracted() {
        let pages = vec![[
            "Total Expenditure by Functional Classification",
            "2024 Revised Budget    2024 Performance    2025 Approved Budget",
            "701    General Public Services    1,000,000    900,000    1,100,000",
            "709    Education                  2,000,000    1,800,000    2,200,000",
        ]
        .join("\n")];
        let rows = extract_functional_classification(&pages, "2025");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].code, "701");
        assert_eq!(rows[0].description, "General Public Services");
        assert_eq!(rows[0].amount.get(), Some(1_100_000.0));
        assert_eq!(rows[1].amount.get(), Some(2_200_000.0));
    }

    #[test]
    fn test_code_in_its_own_column() {
        let pages = vec![[
            "Total Expenditure by Functional Classification",
            "2024 Revised Budget    2025 Approved Budget",
            "70911    Primary Education    1,000,000    1,100,000",
            "70912    Secondary Education  2,000,000    2,200,000",
        ]
        .join("\n")];
        let rows = extract_functional_classification(&pages, "2025");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].code, "70911");
    }

    #[test]
    fn test_pages_without_heading_are_skipped() {
        let pages = vec![
            "701    General Public Services    1,000,000    900,000    1,100,000".to_string(),
        ];
        let rows = extract_functional_classification(&pages, "2025");
        assert!(rows.is_empty());
    }

    #[test]
    fn test_total_lines_terminate_nothing_but_are_skipped() {
        let pages = vec![[
            "Total Expenditure by Functional Classification",
            "2024 Revised Budget    2025 Approved Budget",
            "701    General Public Services    1,000,000    1,100,000",
            "Total                             3,000,000    3,300,000",
            "709    Education                  2,000,000    2,200,000",
        ]
        .join("\n")];
        let rows = extract_functional_classification(&pages, "2025");
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_yearless_fallback_labels() {
        let labels = infer_labels("Original  Revised  Approved");
        let keys: Vec<String> = labels.iter().map(|l| l.as_key()).collect();
        assert_eq!(
            keys,
            vec![
                "2025_approved_budget",
                "2024_revised_budget",
                "2024_original_budget"
            ]
        );
    }

    #[test]
    fn test_extra_leading_columns_trimmed_to_label_count() {
        let pages = vec![[
            "Total Expenditure by Functional Classification",
            "2024 Revised Budget    2025 Approved Budget",
            "701    General Public Services    77    1,000,000    1,100,000",
        ]
        .join("\n")];
        let rows = extract_functional_classification(&pages, "2025");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount.get(), Some(1_100_000.0));
    }
}
