use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::lex::{collapse_header, parse_amount, split_columns};
use crate::schema::{
    AdministrativeUnit, AmountItem, CanonicalLabel, ColumnLabel, ExtractedField, NullReason,
    ParentRow, Provenance, TableType,
};

static ADMIN_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d{6,})").unwrap());
static PARENT_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{6,}0{4,}$").unwrap());

const HEADER_KEYWORDS: [&str; 3] = [
    "administrative unit",
    "admin description",
    "adminstrative unit",
];

const HEADER_CONTEXT_KEYWORDS: [&str; 14] = [
    "personnel",
    "overhead",
    "total recurrent",
    "capital",
    "total expenditure",
    "recurrent",
    "development",
    "other",
    "federation account",
    "independent revenue",
    "aids and grants",
    "fund receipts",
    "total revenue",
    "igr",
];

#[derive(Debug, Clone)]
pub struct HeaderContext {
    pub labels: Vec<ColumnLabel>,
    pub table_type: TableType,
}

/// Both the leaf units and the parent rows recovered from the
/// administrative tables of a document.
#[derive(Debug, Default)]
pub struct AdminExtraction {
    pub units: Vec<AdministrativeUnit>,
    pub parent_rows: Vec<ParentRow>,
}

pub fn is_header_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    if !lower.contains("code") {
        return false;
    }
    HEADER_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

fn is_header_context_line(line: &str) -> bool {
    if ADMIN_CODE_RE.is_match(line) {
        return false;
    }
    let lower = line.to_lowercase();
    HEADER_CONTEXT_KEYWORDS
        .iter()
        .any(|keyword| lower.contains(keyword))
}

/// Derives the table type and its canonical label sequence from the header
/// window. Headers whose phrase signature is not recognized yield None and
/// the extractor stays out of table mode.
pub fn infer_header_context(header_lines: &[String]) -> Option<HeaderContext> {
    let lower = collapse_header(header_lines);

    let mda_labels = || {
        vec![
            ColumnLabel::Canonical(CanonicalLabel::Personnel),
            ColumnLabel::Canonical(CanonicalLabel::Overhead),
            ColumnLabel::Canonical(CanonicalLabel::TotalRecurrent),
            ColumnLabel::Canonical(CanonicalLabel::Capital),
            ColumnLabel::Canonical(CanonicalLabel::TotalExpenditure),
        ]
    };

    if lower.contains("personnel")
        && lower.contains("overhead")
        && lower.contains("total recurrent")
        && lower.contains("capital")
        && lower.contains("total expenditure")
    {
        return Some(HeaderContext {
            labels: mda_labels(),
            table_type: TableType::ExpenditureMda,
        });
    }

    if lower.contains("personnel expenditure")
        && lower.contains("capital expenditure")
        && lower.contains("total expenditure")
    {
        return Some(HeaderContext {
            labels: mda_labels(),
            table_type: TableType::ExpenditureMda,
        });
    }

    if lower.contains("recurrent") && lower.contains("development") && lower.contains("other") {
        return Some(HeaderContext {
            labels: vec![
                ColumnLabel::Canonical(CanonicalLabel::Recurrent),
                ColumnLabel::Canonical(CanonicalLabel::Development),
                ColumnLabel::Canonical(CanonicalLabel::Other),
            ],
            table_type: TableType::ExpenditureAdmin,
        });
    }

    if lower.contains("federation account")
        && lower.contains("independent revenue")
        && lower.contains("aids and grants")
        && lower.contains("fund receipts")
        && lower.contains("total revenue")
    {
        return Some(HeaderContext {
            labels: vec![
                ColumnLabel::Canonical(CanonicalLabel::FederationAccountRevenues),
                ColumnLabel::Canonical(CanonicalLabel::IndependentRevenue),
                ColumnLabel::Canonical(CanonicalLabel::AidsAndGrants),
                ColumnLabel::Canonical(CanonicalLabel::CapitalDevelopmentFundReceipts),
                ColumnLabel::Canonical(CanonicalLabel::TotalRevenue),
            ],
            table_type: TableType::RevenueMda,
        });
    }

    None
}

pub fn is_parent_code(code: &str) -> bool {
    PARENT_CODE_RE.is_match(code)
}

/// Longest stripped-right-zero prefix match among the accumulated parents.
/// Ties resolve to the parent seen first in the document.
pub fn find_parent_code<'a>(unit_code: &str, parents: &'a [(String, String)]) -> Option<&'a str> {
    let mut best: Option<(usize, &str)> = None;
    for (parent, _) in parents {
        let prefix = parent.trim_end_matches('0');
        if prefix.is_empty() || !unit_code.starts_with(prefix) {
            continue;
        }
        if best.map_or(true, |(len, _)| prefix.len() > len) {
            best = Some((prefix.len(), parent));
        }
    }
    best.map(|(_, parent)| parent)
}

/// Splits a candidate row into (code, name, amount columns). The name is the
/// remainder of the first column, falling back to the second column when the
/// code exhausts it.
fn parse_row(line: &str) -> Option<(String, String, Vec<String>)> {
    let columns = split_columns(line);
    if columns.is_empty() {
        return None;
    }
    let caps = ADMIN_CODE_RE.captures(&columns[0])?;
    let code = caps[1].to_string();
    let mut name = columns[0][caps.get(1).unwrap().end()..].trim().to_string();
    let mut amount_columns: Vec<String> = columns[1..].to_vec();
    if name.is_empty() && columns.len() > 1 {
        name = columns[1].clone();
        amount_columns = columns[2..].to_vec();
    }
    Some((code, name, amount_columns))
}

fn build_amounts(
    labels: &[ColumnLabel],
    amount_columns: &[String],
    page: usize,
    line: &str,
) -> Vec<AmountItem> {
    let max_len = labels.len().max(amount_columns.len());
    let mut amounts = Vec::with_capacity(max_len);
    for idx in 0..max_len {
        let label = labels
            .get(idx)
            .cloned()
            .unwrap_or_else(|| ColumnLabel::synthesized(idx as u32 + 1));
        let raw = amount_columns.get(idx).map(String::as_str).unwrap_or("");
        let amount = match parse_amount(raw) {
            Some(value) => {
                ExtractedField::with_provenance(value, vec![Provenance::new(page, line)])
            }
            None => ExtractedField::null(NullReason::MissingAmount),
        };
        amounts.push(AmountItem::new(label, amount));
    }
    amounts
}

/// Walks every page, entering table mode when a recognized administrative
/// header appears, and collects leaf units and parent rows. Leaf rows with
/// any unparseable amount column are layout artifacts and are dropped
/// silently; units are deduplicated by (table_type, unit_code).
pub fn extract_admin_units(pages: &[String]) -> AdminExtraction {
    let mut extraction = AdminExtraction::default();
    let mut parents: Vec<(String, String)> = Vec::new();
    let mut seen_units: HashSet<(TableType, String)> = HashSet::new();
    let mut seen_parents: HashSet<(TableType, String)> = HashSet::new();

    for (page_offset, page_text) in pages.iter().enumerate() {
        let page_index = page_offset + 1;
        let lines: Vec<&str> = page_text.lines().collect();
        let mut header_context: Option<HeaderContext> = None;

        for (line_index, &line) in lines.iter().enumerate() {
            let stripped = line.trim();
            if stripped.is_empty() {
                continue;
            }
            // standalone page numbers
            if stripped.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }

            if is_header_line(line) {
                let mut header_buffer: Vec<String> = Vec::new();
                if line_index > 0 && is_header_context_line(lines[line_index - 1]) {
                    header_buffer.push(lines[line_index - 1].to_string());
                }
                header_buffer.push(line.to_string());
                for offset in 1..=2 {
                    if let Some(&next_line) = lines.get(line_index + offset) {
                        if is_header_context_line(next_line) {
                            header_buffer.push(next_line.to_string());
                        }
                    }
                }
                header_context = infer_header_context(&header_buffer);
                continue;
            }

            if !ADMIN_CODE_RE.is_match(line) {
                continue;
            }
            let Some(context) = header_context.as_ref() else {
                continue;
            };
            let Some((code, name, amount_columns)) = parse_row(line) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }

            if is_parent_code(&code) {
                if let Some(entry) = parents.iter_mut().find(|(c, _)| c == &code) {
                    entry.1 = name.clone();
                } else {
                    parents.push((code.clone(), name.clone()));
                }
                let parent_key = (context.table_type, code.clone());
                if seen_parents.insert(parent_key) {
                    extraction.parent_rows.push(ParentRow {
                        amounts: build_amounts(&context.labels, &amount_columns, page_index, line),
                        code,
                        name,
                        page: page_index,
                        line_text: stripped.to_string(),
                        table_type: context.table_type,
                    });
                }
                continue;
            }

            let amounts = build_amounts(&context.labels, &amount_columns, page_index, line);
            if amounts.is_empty() || amounts.iter().any(|item| item.amount.is_null()) {
                continue;
            }

            let (parent_code, parent_name) = match find_parent_code(&code, &parents) {
                Some(parent) => {
                    let parent_name = parents
                        .iter()
                        .find(|(c, _)| c == parent)
                        .map(|(_, n)| n.clone())
                        .unwrap_or_default();
                    (
                        ExtractedField::with_value(parent.to_string()),
                        ExtractedField::with_value(parent_name),
                    )
                }
                None => (
                    ExtractedField::null(NullReason::ParentNotFound),
                    ExtractedField::null(NullReason::ParentNotFound),
                ),
            };

            let unit_key = (context.table_type, code.clone());
            if seen_units.insert(unit_key) {
                extraction.units.push(AdministrativeUnit {
                    parent_code,
                    parent_name,
                    unit_code: ExtractedField::with_value(code),
                    unit_name: ExtractedField::with_value(name),
                    amounts,
                    page: page_index,
                    line_text: stripped.to_string(),
                    table_type: context.table_type,
                });
            }
        }
    }

    extraction
}

#[cfg(test)]
mod tests {
    use super::*;

    const MDA_HEADER: &str =
        "Code         Administrative Unit              Personnel      Overhead   Total Recurrent     Capital   Total Expenditure";

    fn page(lines: &[&str]) -> Vec<String> {
        vec![lines.join("\n")]
    }

    #[test]
    fn test_expenditure_mda_row() {
        let pages = page(&[
            MDA_HEADER,
            "021500100  Ministry of Education         1,000,000   250,000   1,250,000   500,000   1,750,000",
        ]);
        let extraction = extract_admin_units(&pages);
        assert_eq!(extraction.units.len(), 1);

        let unit = &extraction.units[0];
        assert_eq!(unit.table_type, TableType::ExpenditureMda);
        assert_eq!(unit.unit_code.value.as_deref(), Some("021500100"));
        assert_eq!(unit.unit_name.value.as_deref(), Some("Ministry of Education"));

        let expected = [
            ("personnel", 1_000_000.0),
            ("overhead", 250_000.0),
            ("total_recurrent", 1_250_000.0),
            ("capital", 500_000.0),
            ("total_expenditure", 1_750_000.0),
        ];
        for (item, (label, value)) in unit.amounts.iter().zip(expected) {
            assert_eq!(item.label.as_key(), label);
            assert_eq!(item.amount.get(), Some(value));
        }
        assert_eq!(unit.amounts[0].amount.provenance[0].page, 1);
    }

    #[test]
    fn test_parent_row_registers_without_unit() {
        let pages = page(&[
            MDA_HEADER,
            "021500000000  Education Sector    5,000,000   1,000,000   6,000,000   2,000,000   8,000,000",
            "021500100  Ministry of Education   1,000,000   250,000   1,250,000   500,000   1,750,000",
        ]);
        let extraction = extract_admin_units(&pages);
        assert_eq!(extraction.parent_rows.len(), 1);
        assert_eq!(extraction.parent_rows[0].code, "021500000000");
        assert_eq!(extraction.units.len(), 1);
        assert_eq!(
            extraction.units[0].parent_code.value.as_deref(),
            Some("021500000000")
        );
        assert_eq!(
            extraction.units[0].parent_name.value.as_deref(),
            Some("Education Sector")
        );
    }

    #[test]
    fn test_leaf_without_parent_gets_null_reason() {
        let pages = page(&[
            MDA_HEADER,
            "099900100  Stray Unit   1,000   2,000   3,000   4,000   7,000",
        ]);
        let extraction = extract_admin_units(&pages);
        assert_eq!(extraction.units.len(), 1);
        let unit = &extraction.units[0];
        assert!(unit.parent_code.is_null());
        assert_eq!(unit.parent_code.reason, Some(NullReason::ParentNotFound));
    }

    #[test]
    fn test_row_with_missing_amount_is_dropped() {
        let pages = page(&[
            MDA_HEADER,
            "021500100  Ministry of Education   1,000,000   250,000   1,250,000   500,000",
        ]);
        let extraction = extract_admin_units(&pages);
        assert!(extraction.units.is_empty());
    }

    #[test]
    fn test_rows_outside_header_context_are_skipped() {
        let pages = page(&[
            "Some narrative page",
            "021500100  Ministry of Education   1,000,000   250,000   1,250,000   500,000   1,750,000",
        ]);
        let extraction = extract_admin_units(&pages);
        assert!(extraction.units.is_empty());
    }

    #[test]
    fn test_duplicate_unit_codes_deduplicated() {
        let pages = vec![
            [
                MDA_HEADER,
                "021500100  Ministry of Education   1,000,000   250,000   1,250,000   500,000   1,750,000",
            ]
            .join("\n"),
            [
                MDA_HEADER,
                "021500100  Ministry of Education   1,000,000   250,000   1,250,000   500,000   1,750,000",
            ]
            .join("\n"),
        ];
        let extraction = extract_admin_units(&pages);
        assert_eq!(extraction.units.len(), 1);
    }

    #[test]
    fn test_revenue_mda_header() {
        let header = "Code   Administrative Unit   Federation Account   Independent Revenue   Aids and Grants   Fund Receipts   Total Revenue";
        let pages = page(&[
            header,
            "011100100  Office of the Governor   100   200   300   400   1,000",
        ]);
        let extraction = extract_admin_units(&pages);
        assert_eq!(extraction.units.len(), 1);
        assert_eq!(extraction.units[0].table_type, TableType::RevenueMda);
        assert_eq!(
            extraction.units[0].amounts[4].label.as_key(),
            "total_revenue"
        );
    }

    #[test]
    fn test_find_parent_code_longest_prefix_wins() {
        let parents = vec![
            ("021500000000".to_string(), "Education Sector".to_string()),
            ("021510000000".to_string(), "Schools Board".to_string()),
        ];
        assert_eq!(
            find_parent_code("021510000123", &parents),
            Some("021510000000")
        );
        assert_eq!(
            find_parent_code("021500000123", &parents),
            Some("021500000000")
        );
        assert_eq!(find_parent_code("031500000123", &parents), None);
    }

    #[test]
    fn test_is_parent_code() {
        assert!(is_parent_code("021500000000"));
        assert!(is_parent_code("0215000000"));
        assert!(!is_parent_code("021500100"));
        assert!(!is_parent_code("02150"));
    }

    #[test]
    fn test_page_number_lines_skipped() {
        let pages = page(&[MDA_HEADER, "42"]);
        let extraction = extract_admin_units(&pages);
        assert!(extraction.units.is_empty());
        assert!(extraction.parent_rows.is_empty());
    }
}
