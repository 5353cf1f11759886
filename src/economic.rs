use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::headers::{infer_period_labels, select_target_label};
use crate::lex::{has_alpha, parse_amount, NUM_RE};
use crate::schema::{
    ColumnLabel, EconomicExpenditureRow, ExtractedField, NullReason, Provenance,
    RevenueClassification, RevenueRow,
};

static ECON_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d{1,8})\s+").unwrap());
static ROW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d{1,8})\s+(.*)$").unwrap());
static HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*Code\s+Economic\b").unwrap());
static REVENUE_HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Revenue by Economic Classification").unwrap());
static EXPENDITURE_HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Expenditure by Economic Classification").unwrap());

const HEADER_CONTEXT_KEYWORDS: [&str; 8] = [
    "approved budget",
    "final budget",
    "revised budget",
    "original budget",
    "performance",
    "january to",
    "climate change",
    "budget",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EconomicSection {
    Revenue,
    Expenditure,
}

impl EconomicSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EconomicSection::Revenue => "revenue",
            EconomicSection::Expenditure => "expenditure",
        }
    }
}

/// Two accepted rows in one section shared a code but disagreed on the
/// amount beyond tolerance. The first row is retained.
#[derive(Debug, Clone, PartialEq)]
pub struct EconomicConflict {
    pub section: EconomicSection,
    pub code: String,
    pub first_amount: f64,
    pub second_amount: f64,
}

#[derive(Debug, Clone)]
struct EconomicContext {
    section: EconomicSection,
    labels: Vec<ColumnLabel>,
}

#[derive(Debug, Default)]
pub struct EconomicExtraction {
    pub revenue_rows: Vec<RevenueRow>,
    pub expenditure_rows: Vec<EconomicExpenditureRow>,
    pub conflicts: Vec<EconomicConflict>,
}

const CONFLICT_TOLERANCE: f64 = 1.0;

fn is_header_context_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    HEADER_CONTEXT_KEYWORDS
        .iter()
        .any(|keyword| lower.contains(keyword))
}

/// Splits a row into (code, description, raw numeric tokens). The numeric
/// tail begins at the first token matching the amount lexeme.
fn parse_row(line: &str) -> Option<(String, String, Vec<String>)> {
    let caps = ROW_RE.captures(line)?;
    let code = caps[1].to_string();
    let rest = caps.get(2).unwrap().as_str();
    let first_num = NUM_RE.find(rest)?;
    let desc = rest[..first_num.start()].trim().to_string();
    let amounts = NUM_RE
        .find_iter(&rest[first_num.start()..])
        .map(|m| m.as_str().to_string())
        .collect();
    Some((code, desc, amounts))
}

/// Walks every page tracking the active section (revenue or expenditure by
/// economic classification). Section flags persist across pages through a
/// last-section fallback applied when the header re-appears; the header
/// context itself resets at each page boundary.
pub fn extract_economic_rows(pages: &[String], target_year: &str) -> EconomicExtraction {
    let mut extraction = EconomicExtraction::default();
    let mut current_section: Option<EconomicSection> = None;
    let mut last_section: Option<EconomicSection> = None;
    let mut first_amounts: HashMap<(EconomicSection, String), f64> = HashMap::new();

    for (page_offset, page_text) in pages.iter().enumerate() {
        let page_index = page_offset + 1;
        let lines: Vec<&str> = page_text.lines().collect();
        let mut context: Option<EconomicContext> = None;

        for (line_index, &line) in lines.iter().enumerate() {
            if REVENUE_HEADING_RE.is_match(line) {
                current_section = Some(EconomicSection::Revenue);
                last_section = current_section;
                context = None;
                continue;
            }
            if EXPENDITURE_HEADING_RE.is_match(line) {
                current_section = Some(EconomicSection::Expenditure);
                last_section = current_section;
                context = None;
                continue;
            }

            // a different table's title block ends the current section
            if line.contains("Approved Budget -") && !HEADER_RE.is_match(line) {
                current_section = None;
                context = None;
                continue;
            }

            if HEADER_RE.is_match(line) {
                if current_section.is_none() {
                    current_section = last_section;
                }
                let mut header_lines: Vec<String> = Vec::new();
                if line_index > 0 && is_header_context_line(lines[line_index - 1]) {
                    header_lines.push(lines[line_index - 1].to_string());
                }
                header_lines.push(line.to_string());
                for offset in 1..=2 {
                    if let Some(&next_line) = lines.get(line_index + offset) {
                        if is_header_context_line(next_line) {
                            header_lines.push(next_line.to_string());
                        }
                    }
                }
                let labels = infer_period_labels(&header_lines);
                if let Some(section) = current_section {
                    context = Some(EconomicContext { section, labels });
                }
                continue;
            }

            let Some(ctx) = context.as_ref() else {
                continue;
            };
            if current_section.is_none() || !ECON_CODE_RE.is_match(line) {
                continue;
            }
            let Some((code, desc, amount_columns)) = parse_row(line) else {
                continue;
            };
            if desc.is_empty() || !has_alpha(&desc) || ctx.labels.is_empty() {
                continue;
            }
            let Some(target_index) = select_target_label(&ctx.labels, target_year) else {
                continue;
            };
            let Some(raw) = amount_columns.get(target_index) else {
                continue;
            };
            let Some(amount_value) = parse_amount(raw) else {
                continue;
            };

            let key = (ctx.section, code.clone());
            if let Some(&first) = first_amounts.get(&key) {
                if (amount_value - first).abs() > CONFLICT_TOLERANCE {
                    extraction.conflicts.push(EconomicConflict {
                        section: ctx.section,
                        code,
                        first_amount: first,
                        second_amount: amount_value,
                    });
                    continue;
                }
            } else {
                first_amounts.insert(key, amount_value);
            }

            let provenance = vec![Provenance::new(page_index, line)];
            match ctx.section {
                EconomicSection::Revenue => extraction.revenue_rows.push(RevenueRow {
                    code: ExtractedField::with_value(code),
                    category: ExtractedField::with_value(desc),
                    subcategory: ExtractedField::null(NullReason::NotExtracted),
                    amount: ExtractedField::with_provenance(amount_value, provenance),
                    classification: RevenueClassification::Economic,
                    administrative_code: ExtractedField::null(NullReason::NotExtracted),
                    administrative_description: ExtractedField::null(NullReason::NotExtracted),
                    fund_code: ExtractedField::null(NullReason::NotExtracted),
                    fund_description: ExtractedField::null(NullReason::NotExtracted),
                    page: page_index,
                    line_text: line.trim().to_string(),
                }),
                EconomicSection::Expenditure => {
                    extraction.expenditure_rows.push(EconomicExpenditureRow {
                        code: ExtractedField::with_value(code),
                        category: ExtractedField::with_value(desc),
                        subcategory: ExtractedField::null(NullReason::NotExtracted),
                        amount: ExtractedField::with_provenance(amount_value, provenance),
                        page: page_index,
                        line_text: line.trim().to_string(),
                    })
                }
            }
        }
    }

    extraction
}

#[cfg(test)]
mod tests {
    use super::*;

    const ECON_HEADER: &str =
        "Code     Economic Description        2024 Approved Budget    2024 Performance    2025 Approved Budget";

    #[test]
    fn test_expenditure_rows_pick_target_column() {
        let pages = vec![[
            "Expenditure by Economic Classification",
            ECON_HEADER,
            "2          Expenditure                    9,000,000    8,100,000    10,000,000",
            "21         Personnel Cost                 4,000,000    3,600,000     4,500,000",
        ]
        .join("\n")];
        let extraction = extract_economic_rows(&pages, "2025");
        assert_eq!(extraction.expenditure_rows.len(), 2);
        assert_eq!(
            extraction.expenditure_rows[0].amount.get(),
            Some(10_000_000.0)
        );
        assert_eq!(
            extraction.expenditure_rows[1].category.value.as_deref(),
            Some("Personnel Cost")
        );
        assert!(extraction.conflicts.is_empty());
    }

    #[test]
    fn test_revenue_section_emits_revenue_rows() {
        let pages = vec![[
            "Revenue by Economic Classification",
            ECON_HEADER,
            "1          Revenue                        5,000,000    4,400,000     6,000,000",
        ]
        .join("\n")];
        let extraction = extract_economic_rows(&pages, "2025");
        assert_eq!(extraction.revenue_rows.len(), 1);
        assert!(extraction.expenditure_rows.is_empty());
        assert_eq!(
            extraction.revenue_rows[0].classification,
            RevenueClassification::Economic
        );
    }

    #[test]
    fn test_conflicting_code_keeps_first_row() {
        let pages = vec![[
            "Expenditure by Economic Classification",
            ECON_HEADER,
            "22         Other Recurrent Costs          9,000,000    8,000,000    10,000,000",
            "22         Other Recurrent Costs          9,000,000    8,000,000    10,500,000",
        ]
        .join("\n")];
        let extraction = extract_economic_rows(&pages, "2025");
        assert_eq!(extraction.expenditure_rows.len(), 1);
        assert_eq!(
            extraction.expenditure_rows[0].amount.get(),
            Some(10_000_000.0)
        );
        assert_eq!(extraction.conflicts.len(), 1);
        let conflict = &extraction.conflicts[0];
        assert_eq!(conflict.code, "22");
        assert_eq!(conflict.first_amount, 10_000_000.0);
        assert_eq!(conflict.second_amount, 10_500_000.0);
    }

    #[test]
    fn test_duplicate_within_tolerance_is_kept() {
        let pages = vec![[
            "Expenditure by Economic Classification",
            ECON_HEADER,
            "22         Other Recurrent Costs          9,000,000    8,000,000    10,000,000",
            "22         Other Recurrent Costs          9,000,000    8,000,000    10,000,000",
        ]
        .join("\n")];
        let extraction = extract_economic_rows(&pages, "2025");
        assert_eq!(extraction.expenditure_rows.len(), 2);
        assert!(extraction.conflicts.is_empty());
    }

    #[test]
    fn test_section_survives_page_break_via_last_section() {
        let pages = vec![
            [
                "Expenditure by Economic Classification",
                ECON_HEADER,
                "21         Personnel Cost              4,000,000    3,600,000     4,500,000",
            ]
            .join("\n"),
            // the heading does not re-appear, only the header does
            [
                ECON_HEADER,
                "22         Other Recurrent Costs       5,000,000    4,500,000     5,500,000",
            ]
            .join("\n"),
        ];
        let extraction = extract_economic_rows(&pages, "2025");
        assert_eq!(extraction.expenditure_rows.len(), 2);
    }

    #[test]
    fn test_foreign_title_block_clears_section() {
        let pages = vec![
            [
                "Expenditure by Economic Classification",
                ECON_HEADER,
                "21         Personnel Cost              4,000,000    3,600,000     4,500,000",
            ]
            .join("\n"),
            [
                "Approved Budget - Capital Expenditure by Project",
                "22         Other Recurrent Costs       5,000,000    4,500,000     5,500,000",
            ]
            .join("\n"),
        ];
        let extraction = extract_economic_rows(&pages, "2025");
        assert_eq!(extraction.expenditure_rows.len(), 1);
    }

    #[test]
    fn test_header_reappearance_restores_last_section() {
        let pages = vec![
            [
                "Expenditure by Economic Classification",
                ECON_HEADER,
                "21         Personnel Cost              4,000,000    3,600,000     4,500,000",
            ]
            .join("\n"),
            "Approved Budget - Some Other Table".to_string(),
            [
                ECON_HEADER,
                "22         Other Recurrent Costs       5,000,000    4,500,000     5,500,000",
            ]
            .join("\n"),
        ];
        let extraction = extract_economic_rows(&pages, "2025");
        assert_eq!(extraction.expenditure_rows.len(), 2);
        assert_eq!(
            extraction.expenditure_rows[1].code.value.as_deref(),
            Some("22")
        );
    }

    #[test]
    fn test_rows_without_description_rejected() {
        let pages = vec![[
            "Expenditure by Economic Classification",
            ECON_HEADER,
            "21         4,000,000    3,600,000    4,500,000",
        ]
        .join("\n")];
        let extraction = extract_economic_rows(&pages, "2025");
        assert!(extraction.expenditure_rows.is_empty());
    }

    #[test]
    fn test_missing_target_column_rejects_row() {
        let pages = vec![[
            "Expenditure by Economic Classification",
            ECON_HEADER,
            "21         Personnel Cost              4,000,000    3,600,000",
        ]
        .join("\n")];
        let extraction = extract_economic_rows(&pages, "2025");
        assert!(extraction.expenditure_rows.is_empty());
    }

    #[test]
    fn test_header_without_labels_emits_nothing() {
        let pages = vec![[
            "Expenditure by Economic Classification",
            "Code     Economic Description",
            "21         Personnel Cost              4,000,000    3,600,000    4,500,000",
        ]
        .join("\n")];
        let extraction = extract_economic_rows(&pages, "2025");
        assert!(extraction.expenditure_rows.is_empty());
    }
}
