use once_cell::sync::Lazy;
use regex::Regex;

use crate::headers::{infer_period_labels, label_years, select_target_label};
use crate::lex::{parse_amount, NUM_RE};
use crate::schema::{BudgetTotals, ExtractedField, Provenance};

static SUMMARY_HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Approved Budget Summary|Budget Summary").unwrap());
static CODE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+\s*-").unwrap());

static SUMMARY_ITEMS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "total_revenue",
            Regex::new(r"(?i)\bTotal\s+Revenue\b").unwrap(),
        ),
        (
            "total_expenditure",
            Regex::new(r"(?i)\bTotal\s+Expenditure\b").unwrap(),
        ),
        (
            "recurrent_expenditure",
            Regex::new(r"(?i)\bRecurrent\s+Expenditure\b").unwrap(),
        ),
        (
            "capital_expenditure",
            Regex::new(r"(?i)\bCapital\s+Expenditure\b").unwrap(),
        ),
        (
            "recurrent_revenue",
            Regex::new(r"(?i)\bRecurrent\s+Revenue\b").unwrap(),
        ),
    ]
});

/// How many leading pages are scanned for the budget summary table.
const SUMMARY_PAGE_WINDOW: usize = 50;

#[derive(Debug, Clone)]
pub struct SummaryExtraction {
    pub totals: BudgetTotals,
    /// `revenue_total` was filled from a Recurrent Revenue line because no
    /// Total Revenue line was present.
    pub recurrent_revenue_substituted: bool,
}

impl SummaryExtraction {
    fn not_extracted() -> Self {
        Self {
            totals: BudgetTotals::not_extracted(),
            recurrent_revenue_substituted: false,
        }
    }
}

/// Column choice for a summary line. A four-column line whose header names
/// two years takes the final column when the target is the later year; this
/// is a tuned heuristic observed in real documents, kept as-is.
fn pick_column(
    column_count: usize,
    target_index: Option<usize>,
    years: &[String],
    target_year: &str,
) -> Option<usize> {
    if column_count == 4 && years.len() == 2 && years.last().map(String::as_str) == Some(target_year)
    {
        return Some(3);
    }
    if let Some(idx) = target_index {
        if idx < column_count {
            return Some(idx);
        }
    }
    if column_count > 1 {
        return Some(1);
    }
    None
}

/// Locates the budget summary table on any of the first ~50 pages, picks the
/// target-year column and emits the budget totals with provenance.
pub fn extract_budget_summary(pages: &[String], target_year: &str) -> SummaryExtraction {
    let mut header_labels = Vec::new();
    let mut summary_heading: Option<String> = None;
    let mut summary_page = 0usize;

    for (page_offset, page_text) in pages.iter().take(SUMMARY_PAGE_WINDOW).enumerate() {
        let lines: Vec<&str> = page_text.lines().collect();
        for (line_index, &line) in lines.iter().enumerate() {
            if !SUMMARY_HEADING_RE.is_match(line) {
                continue;
            }
            let window: Vec<String> = lines
                .iter()
                .skip(line_index + 1)
                .take(5)
                .map(|l| l.to_string())
                .collect();
            let labels = infer_period_labels(&window);
            if labels.len() > header_labels.len() {
                header_labels = labels;
                summary_heading = Some(line.trim().to_string());
                summary_page = page_offset + 1;
            }
        }
    }

    if header_labels.is_empty() {
        return SummaryExtraction::not_extracted();
    }

    let years = label_years(&header_labels);
    let target_index = select_target_label(&header_labels, target_year);
    if target_index.is_none() && !years.iter().any(|year| year == target_year) {
        return SummaryExtraction::not_extracted();
    }

    let mut extraction = SummaryExtraction::not_extracted();
    let mut recurrent_revenue: Option<ExtractedField<f64>> = None;

    let page_text = &pages[summary_page - 1];
    for line in page_text.lines() {
        for (key, pattern) in SUMMARY_ITEMS.iter() {
            if !pattern.is_match(line) {
                continue;
            }
            let mut amount_columns: Vec<&str> =
                NUM_RE.find_iter(line).map(|m| m.as_str()).collect();
            if amount_columns.is_empty() {
                continue;
            }
            // a `NN -` code prefix is not an amount column
            if CODE_PREFIX_RE.is_match(line) {
                amount_columns.remove(0);
            }
            let Some(idx) = pick_column(amount_columns.len(), target_index, &years, target_year)
            else {
                continue;
            };
            let Some(raw) = amount_columns.get(idx) else {
                continue;
            };
            let Some(amount_value) = parse_amount(raw) else {
                continue;
            };

            let field = ExtractedField::with_provenance(
                amount_value,
                vec![Provenance::new(summary_page, line)],
            );
            match *key {
                "total_revenue" => extraction.totals.revenue_total = field,
                "total_expenditure" => extraction.totals.total_budget = field,
                "recurrent_expenditure" => {
                    extraction.totals.recurrent_expenditure_total = field
                }
                "capital_expenditure" => extraction.totals.capital_expenditure_total = field,
                "recurrent_revenue" => recurrent_revenue = Some(field),
                _ => {}
            }

            if extraction.totals.budget_summary_text.is_null() {
                if let Some(heading) = &summary_heading {
                    extraction.totals.budget_summary_text = ExtractedField::with_provenance(
                        heading.clone(),
                        vec![Provenance::new(summary_page, heading)],
                    );
                }
            }
        }
    }

    if extraction.totals.revenue_total.is_null() {
        if let Some(field) = recurrent_revenue {
            extraction.totals.revenue_total = field;
            extraction.recurrent_revenue_substituted = true;
        }
    }

    extraction
}
