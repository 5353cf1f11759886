use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::schema::{DocumentMetadata, ExtractedField, NullReason, Provenance};

static TITLE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)Approved\s+Budget").unwrap(),
        Regex::new(r"(?i)Budget\s+Document").unwrap(),
        Regex::new(r"(?i)Appropriation").unwrap(),
    ]
});

static TITLE_EXCLUDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)Revenue by|Expenditure by|Economic Classification|Programme|Programmes|Projects|Administrative|Full Year Actuals",
    )
    .unwrap()
});

static STATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)([A-Z][A-Z &.\-]+)\s+STATE").unwrap());
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(20\d{2})").unwrap());
static STATE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)State\s+Code\s*[:\-]\s*([A-Z]{2,4})").unwrap());

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fields recovered by the one-shot first-pages scan.
#[derive(Debug, Clone)]
pub struct MetadataFields {
    pub state_name: ExtractedField<String>,
    pub state_code: ExtractedField<String>,
    pub budget_year: ExtractedField<String>,
    pub document_title: ExtractedField<String>,
    pub currency: ExtractedField<String>,
}

/// File-name helpers shared with the validator.
pub fn filename_year(file_name: &str) -> Option<String> {
    YEAR_RE
        .captures(file_name)
        .map(|caps| caps[1].to_string())
}

pub fn filename_state_prefix(file_name: &str) -> Option<String> {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    let (prefix, _) = stem.split_once('_')?;
    let prefix = prefix.trim();
    if prefix.is_empty() {
        None
    } else {
        Some(prefix.to_string())
    }
}

/// Scans the leading pages for the document title, state name and code, the
/// budget year and the currency. File-name fallbacks fill what the document
/// does not state, tagged `from_filename`.
pub fn extract_metadata(file_name: &str, pages: &[String]) -> MetadataFields {
    let mut state_name = ExtractedField::null(NullReason::NotExtracted);
    let mut state_code = ExtractedField::null(NullReason::NotExtracted);
    let mut budget_year = ExtractedField::null(NullReason::NotExtracted);
    let mut document_title = ExtractedField::null(NullReason::NotExtracted);
    let mut currency = ExtractedField::null(NullReason::NotExtracted);

    let mut title_line: Option<(usize, String)> = None;
    'title: for (page_offset, page_text) in pages.iter().take(2).enumerate() {
        for line in page_text.lines() {
            let stripped = line.trim();
            if stripped.is_empty() || TITLE_EXCLUDE.is_match(stripped) {
                continue;
            }
            if TITLE_PATTERNS.iter().any(|pattern| pattern.is_match(stripped)) {
                title_line = Some((page_offset + 1, stripped.to_string()));
                break 'title;
            }
        }
    }

    if let Some((title_page, title)) = &title_line {
        document_title = ExtractedField::with_provenance(
            title.clone(),
            vec![Provenance::new(*title_page, title)],
        );
        if let Some(caps) = STATE_RE.captures(&title.to_uppercase()) {
            state_name = ExtractedField::with_provenance(
                title_case(caps[1].trim()),
                vec![Provenance::new(*title_page, title)],
            );
        }
        if let Some(caps) = YEAR_RE.captures(title) {
            budget_year = ExtractedField::with_provenance(
                caps[1].to_string(),
                vec![Provenance::new(*title_page, title)],
            );
        }
    }

    'currency: for (page_offset, page_text) in pages.iter().take(3).enumerate() {
        for line in page_text.lines() {
            let stripped = line.trim();
            if stripped.is_empty() {
                continue;
            }
            if stripped.contains("NGN")
                || stripped.to_uppercase().contains("NAIRA")
                || stripped.contains('\u{20A6}')
            {
                currency = ExtractedField::with_provenance(
                    "NGN".to_string(),
                    vec![Provenance::new(page_offset + 1, stripped)],
                );
                break 'currency;
            }
        }
    }

    'code: for (page_offset, page_text) in pages.iter().take(2).enumerate() {
        for line in page_text.lines() {
            if let Some(caps) = STATE_CODE_RE.captures(line) {
                state_code = ExtractedField::with_provenance(
                    caps[1].to_string(),
                    vec![Provenance::new(page_offset + 1, line)],
                );
                break 'code;
            }
        }
    }

    if budget_year.is_null() {
        if let Some(year) = filename_year(file_name) {
            budget_year = ExtractedField::from_filename(year);
        }
    }
    if state_name.is_null() {
        if let Some(prefix) = filename_state_prefix(file_name) {
            state_name = ExtractedField::from_filename(prefix);
        }
    }

    MetadataFields {
        state_name,
        state_code,
        budget_year,
        document_title,
        currency,
    }
}

pub fn into_document_metadata(
    fields: MetadataFields,
    file_name: &str,
    page_count: usize,
    extraction_timestamp: String,
    engine_version: &str,
) -> DocumentMetadata {
    DocumentMetadata {
        state_name: fields.state_name,
        state_code: fields.state_code,
        budget_year: fields.budget_year,
        document_title: fields.document_title,
        source_file_name: file_name.to_string(),
        page_count,
        currency: fields.currency,
        extraction_timestamp,
        engine_version: engine_version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_and_state_from_first_page() {
        let pages = vec![
            "ADAMAWA STATE GOVERNMENT\n2025 Approved Budget\nSome other line".to_string(),
        ];
        let fields = extract_metadata("Adamawa_2025.pdf", &pages);
        assert_eq!(
            fields.document_title.value.as_deref(),
            Some("2025 Approved Budget")
        );
        assert_eq!(fields.budget_year.value.as_deref(), Some("2025"));
        assert!(fields.budget_year.reason.is_none());
    }

    #[test]
    fn test_state_name_from_title_line() {
        let pages = vec!["ADAMAWA STATE 2025 Approved Budget".to_string()];
        let fields = extract_metadata("Adamawa_2025.pdf", &pages);
        assert_eq!(fields.state_name.value.as_deref(), Some("Adamawa"));
    }

    #[test]
    fn test_excluded_titles_are_skipped() {
        let pages = vec![
            "Expenditure by Economic Classification - Approved Budget\nKANO STATE 2025 Approved Budget"
                .to_string(),
        ];
        let fields = extract_metadata("Kano_2025.pdf", &pages);
        assert_eq!(
            fields.document_title.value.as_deref(),
            Some("KANO STATE 2025 Approved Budget")
        );
    }

    #[test]
    fn test_currency_detection() {
        let pages = vec!["Budget Document\nAll figures in Naira".to_string()];
        let fields = extract_metadata("Kano_2025.pdf", &pages);
        assert_eq!(fields.currency.value.as_deref(), Some("NGN"));
    }

    #[test]
    fn test_state_code_detection() {
        let pages = vec!["Approved Budget\nState Code: AD".to_string()];
        let fields = extract_metadata("Adamawa_2025.pdf", &pages);
        assert_eq!(fields.state_code.value.as_deref(), Some("AD"));
    }

    #[test]
    fn test_filename_fallbacks() {
        let pages = vec!["no recognizable title here".to_string()];
        let fields = extract_metadata("Adamawa_2025_Budget.pdf", &pages);
        assert_eq!(fields.budget_year.value.as_deref(), Some("2025"));
        assert_eq!(fields.budget_year.reason, Some(NullReason::FromFilename));
        assert_eq!(fields.state_name.value.as_deref(), Some("Adamawa"));
        assert_eq!(fields.state_name.reason, Some(NullReason::FromFilename));
    }

    #[test]
    fn test_filename_helpers() {
        assert_eq!(filename_year("Adamawa_2025.pdf"), Some("2025".to_string()));
        assert_eq!(filename_year("budget.pdf"), None);
        assert_eq!(
            filename_state_prefix("Adamawa_2025.pdf"),
            Some("Adamawa".to_string())
        );
        assert_eq!(filename_state_prefix("budget.pdf"), None);
    }
}
