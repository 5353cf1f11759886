use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Section heading patterns in document order of interest. The key is a
/// stable identifier used by the app output.
static SECTION_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    let patterns: Vec<(&str, &str)> = vec![
        ("summary", r"Approved Budget Summary|Budget Summary"),
        ("revenue_by_mda", r"Revenue by MDA"),
        ("revenue_by_economic", r"Revenue by Economic Classification"),
        ("capital_receipts", r"Capital Receipts"),
        ("expenditure_by_mda", r"Expenditure by MDA"),
        (
            "total_expenditure_admin",
            r"Total Expenditure by Administrative Classification",
        ),
        (
            "personnel_expenditure_admin",
            r"Personnel Expenditure by Administrative Classification",
        ),
        (
            "other_recurrent_admin",
            r"Other Non-Debt Recurrent Expenditure by Administrative Classification",
        ),
        (
            "debt_service_admin",
            r"Debt Service Expenditure by Administrative Classification",
        ),
        (
            "capital_expenditure_admin",
            r"Capital Expenditure by Administrative Classification",
        ),
        (
            "expenditure_by_economic",
            r"Expenditure by Economic Classification",
        ),
        (
            "total_expenditure_functional",
            r"Total Expenditure by Functional Classification",
        ),
        (
            "personnel_expenditure_functional",
            r"Personnel Expenditure by Functional Classification",
        ),
        (
            "other_recurrent_functional",
            r"Other Non-Debt Recurrent Expenditure by Functional Classification",
        ),
        (
            "debt_service_functional",
            r"Debt Service Expenditure by Functional Classification",
        ),
        (
            "capital_expenditure_functional",
            r"Capital Expenditure by Functional Classification",
        ),
        ("expenditure_by_location", r"Total Expenditure by Location"),
        (
            "expenditure_by_programme",
            r"Total Expenditure by Programme \(Sector, Objective and Programme\)",
        ),
        (
            "basic_education_admin",
            r"Basic Education Expenditure by Administrative Classification",
        ),
        (
            "basic_education_economic",
            r"Basic Education Expenditure by Economic Classification",
        ),
        (
            "primary_health_admin",
            r"Primary Health Expenditure by Administrative Classification",
        ),
        (
            "primary_health_economic",
            r"Primary Health Expenditure by Economic Classification",
        ),
        ("capital_project", r"Capital Expenditure by Project"),
        ("revenue_expenditure_fund", r"Revenue and Expenditure by Fund"),
    ];
    patterns
        .into_iter()
        .map(|(key, pattern)| (key, Regex::new(&format!("(?i){}", pattern)).unwrap()))
        .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionHit {
    pub key: String,
    pub title: String,
    pub page: usize,
}

/// Finds every recognized section heading, one hit per matching line (the
/// first pattern wins per line).
pub fn detect_sections(pages: &[String]) -> Vec<SectionHit> {
    let mut hits: Vec<SectionHit> = Vec::new();
    for (page_offset, page_text) in pages.iter().enumerate() {
        for line in page_text.lines() {
            let stripped = line.trim();
            if stripped.is_empty() {
                continue;
            }
            for (key, pattern) in SECTION_PATTERNS.iter() {
                if pattern.is_match(stripped) {
                    hits.push(SectionHit {
                        key: key.to_string(),
                        title: stripped.to_string(),
                        page: page_offset + 1,
                    });
                    break;
                }
            }
        }
    }
    hits
}

/// Section keys in order of first appearance (page-major, key-minor).
pub fn section_order(hits: &[SectionHit]) -> Vec<String> {
    let mut sorted: Vec<&SectionHit> = hits.iter().collect();
    sorted.sort_by(|a, b| (a.page, &a.key).cmp(&(b.page, &b.key)));
    let mut ordered: Vec<String> = Vec::new();
    for hit in sorted {
        if !ordered.contains(&hit.key) {
            ordered.push(hit.key.clone());
        }
    }
    ordered
}

/// Which classification schemes the document's sections cover.
pub fn classification_scheme(hits: &[SectionHit]) -> Vec<String> {
    let mut scheme: Vec<String> = Vec::new();
    let mut push_if = |cond: bool, name: &str| {
        if cond {
            scheme.push(name.to_string());
        }
    };
    push_if(
        hits.iter()
            .any(|h| h.key.ends_with("_by_mda") || h.key.ends_with("_admin")),
        "administrative",
    );
    push_if(hits.iter().any(|h| h.key.contains("economic")), "economic");
    push_if(
        hits.iter().any(|h| h.key.contains("functional")),
        "functional",
    );
    push_if(hits.iter().any(|h| h.key.contains("location")), "location");
    push_if(
        hits.iter().any(|h| h.key.contains("programme")),
        "programme",
    );
    push_if(hits.iter().any(|h| h.key.contains("project")), "project");
    push_if(hits.iter().any(|h| h.key.contains("fund")), "fund");
    scheme
}
