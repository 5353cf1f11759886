use once_cell::sync::Lazy;
use regex::Regex;

use crate::lex::{parse_amount, split_columns};
use crate::schema::{
    ColumnLabel, ExtractedField, NullReason, Provenance, RevenueClassification, RevenueRow,
};

static RECEIPT_HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Receipt Description").unwrap());

/// A maximal digit run followed by `- description`. Run lengths distinguish
/// administrative (10-14), economic (6-8) and fund (2-6) codes.
static CODE_DESC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*-\s*([^\d]{2,80})").unwrap());

/// Receipt amounts must carry grouping commas or decimals, so bare codes are
/// never mistaken for amounts.
static AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+\.\d+").unwrap());

static DIGIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d").unwrap());

static LABEL_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"(20\d{2})\s+approved(?:\s+budget)?").unwrap(),
            "approved_budget",
        ),
        (
            Regex::new(r"(20\d{2})\s+revised(?:\s+budget)?").unwrap(),
            "revised_budget",
        ),
        (
            Regex::new(r"(20\d{2})\s+original(?:\s+budget)?").unwrap(),
            "original_budget",
        ),
        (
            Regex::new(r"(20\d{2})\s+final(?:\s+budget)?").unwrap(),
            "final_budget",
        ),
        (
            Regex::new(r"(20\d{2})\s+performance").unwrap(),
            "performance",
        ),
    ]
});

#[derive(Debug, Clone)]
struct CodeMatch {
    start: usize,
    end: usize,
    code: String,
    desc: String,
}

#[derive(Debug)]
struct ReceiptBlock {
    desc: String,
    admin: Option<CodeMatch>,
    econ: CodeMatch,
    fund: CodeMatch,
    amounts: Vec<String>,
}

fn code_matches(text: &str) -> Vec<CodeMatch> {
    CODE_DESC_RE
        .captures_iter(text)
        .map(|caps| {
            let full = caps.get(0).unwrap();
            CodeMatch {
                start: full.start(),
                end: full.end(),
                code: caps[1].to_string(),
                desc: caps[2].to_string(),
            }
        })
        .collect()
}

/// Reconstructs one receipt row from up to three physical lines joined into
/// a single block. The economic code anchors the row: the description is
/// everything before it, the fund code follows it, and the amounts trail the
/// fund code.
fn parse_receipt_block(text: &str) -> Option<ReceiptBlock> {
    let matches = code_matches(text);
    let econ_matches: Vec<&CodeMatch> = matches
        .iter()
        .filter(|m| (6..=8).contains(&m.code.len()))
        .collect();
    let fund_matches: Vec<&CodeMatch> = matches
        .iter()
        .filter(|m| (2..=6).contains(&m.code.len()))
        .collect();
    let admin_matches: Vec<&CodeMatch> = matches
        .iter()
        .filter(|m| (10..=14).contains(&m.code.len()))
        .collect();
    if econ_matches.is_empty() || fund_matches.is_empty() {
        return None;
    }

    let econ = econ_matches
        .iter()
        .min_by_key(|m| m.start)
        .copied()
        .unwrap();
    let fund = fund_matches
        .iter()
        .filter(|m| m.start > econ.end)
        .min_by_key(|m| m.start)
        .copied()
        .unwrap_or_else(|| *fund_matches.last().unwrap());
    // longest administrative code wins; earliest on ties
    let mut admin: Option<&CodeMatch> = None;
    for m in &admin_matches {
        if admin.map_or(true, |best| m.code.len() > best.code.len()) {
            admin = Some(*m);
        }
    }
    let admin = admin.cloned();

    let desc = text[..econ.start].trim().to_string();
    if desc.len() < 6 || DIGIT_RE.is_match(&desc) {
        return None;
    }

    let amounts: Vec<String> = AMOUNT_RE
        .find_iter(&text[fund.end..])
        .map(|m| m.as_str().to_string())
        .collect();
    if amounts.is_empty() {
        return None;
    }

    Some(ReceiptBlock {
        desc,
        admin,
        econ: econ.clone(),
        fund: fund.clone(),
        amounts,
    })
}

fn infer_receipt_labels(header_text: &str) -> Vec<ColumnLabel> {
    let lower = header_text.to_lowercase();
    let lower = lower.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut matches: Vec<(usize, String)> = Vec::new();
    for (pattern, label) in LABEL_PATTERNS.iter() {
        for caps in pattern.captures_iter(&lower) {
            let m = caps.get(0).unwrap();
            matches.push((m.start(), format!("{}_{}", &caps[1], label)));
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

fn select_label_index(labels: &[ColumnLabel], target_year: &str) -> Option<usize> {
    let keys: Vec<String> = labels.iter().map(|label| label.as_key()).collect();
    for (idx, key) in keys.iter().enumerate() {
        if key.starts_with(target_year) && key.contains("approved") {
            return Some(idx);
        }
    }
    keys.iter().position(|key| key.starts_with(target_year))
}

fn clean_desc(text: &str) -> String {
    split_columns(text).into_iter().next().unwrap_or_default()
}

pub fn extract_receipts(pages: &[String], target_year: &str) -> Vec<RevenueRow> {
    let mut rows: Vec<RevenueRow> = Vec::new();
    let mut labels: Vec<ColumnLabel> = Vec::new();
    let mut target_index: Option<usize> = None;

    for (page_offset, page_text) in pages.iter().enumerate() {
        let page_index = page_offset + 1;
        let lines: Vec<&str> = page_text.lines().collect();
        let mut in_receipt_table = false;

        for (line_index, &line) in lines.iter().enumerate() {
            if RECEIPT_HEADER_RE.is_match(line) {
                let mut header_lines: Vec<&str> = Vec::new();
                if line_index > 0 {
                    header_lines.push(lines[line_index - 1]);
                }
                header_lines.push(line);
                for offset in 1..=2 {
                    if let Some(&next_line) = lines.get(line_index + offset) {
                        header_lines.push(next_line);
                    }
                }
                labels = infer_receipt_labels(&header_lines.join(" "));
                target_index = select_label_index(&labels, target_year);
                in_receipt_table = true;
                continue;
            }

            if !in_receipt_table || line.trim().is_empty() {
                continue;
            }
            if line.trim().to_lowercase().starts_with("total") {
                continue;
            }
            let Some(target) = target_index else {
                continue;
            };
            if labels.is_empty() {
                continue;
            }

            let mut combined_lines = vec![line];
            for offset in 1..=2 {
                if let Some(&next_line) = lines.get(line_index + offset) {
                    combined_lines.push(next_line);
                }
            }
            let Some(block) = parse_receipt_block(&combined_lines.join(" ")) else {
                continue;
            };

            if block.amounts.len() < labels.len() {
                continue;
            }
            let amount_cols = &block.amounts[block.amounts.len() - labels.len()..];
            let Some(raw) = amount_cols.get(target) else {
                continue;
            };
            let Some(amount_value) = parse_amount(raw) else {
                continue;
            };

            rows.push(RevenueRow {
                code: ExtractedField::with_value(block.econ.code.clone()),
                category: ExtractedField::with_value(block.desc.clone()),
                subcategory: ExtractedField::null(NullReason::NotExtracted),
                amount: ExtractedField::with_provenance(
                    amount_value,
                    vec![Provenance::new(page_index, line)],
                ),
                classification: RevenueClassification::Receipt,
                administrative_code: match &block.admin {
                    Some(admin) => ExtractedField::with_value(admin.code.clone()),
                    None => ExtractedField::null(NullReason::NotExtracted),
                },
                administrative_description: match &block.admin {
                    Some(admin) => ExtractedField::with_value(clean_desc(&admin.desc)),
                    None => ExtractedField::null(NullReason::NotExtracted),
                },
                fund_code: ExtractedField::with_value(block.fund.code.clone()),
                fund_description: ExtractedField::with_value(clean_desc(&block.fund.desc)),
                page: page_index,
                line_text: line.trim().to_string(),
            });
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECEIPT_HEADER: &str =
        "Receipt Description                       2024 Approved Budget    2025 Approved Budget";

    #[test]
    fn test_receipt_row_single_line() {
        let pages = vec![[
            RECEIPT_HEADER,
            "Statutory Allocation    12345678 - Shared Revenue    021 - Federation Account    1,000,000.00    1,200,000.00",
        ]
        .join("\n")];
        let rows = extract_receipts(&pages, "2025");
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.code.value.as_deref(), Some("12345678"));
        assert_eq!(row.category.value.as_deref(), Some("Statutory Allocation"));
        assert_eq!(row.classification, RevenueClassification::Receipt);
        assert_eq!(row.fund_code.value.as_deref(), Some("021"));
        assert_eq!(row.fund_description.value.as_deref(), Some("Federation Account"));
        assert_eq!(row.amount.get(), Some(1_200_000.0));
    }

    #[test]
    fn test_receipt_row_with_administrative_code() {
        let pages = vec![[
            RECEIPT_HEADER,
            "Grants from Federal Agencies    1234567 - Grant Income    02 - Treasury Fund",
            "01100100100 - Office of the Accountant General    2,500,000.00    3,000,000.00",
        ]
        .join("\n")];
        let rows = extract_receipts(&pages, "2025");
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].administrative_code.value.as_deref(),
            Some("01100100100")
        );
        assert_eq!(
            rows[0].administrative_description.value.as_deref(),
            Some("Office of the Accountant General")
        );
        assert_eq!(rows[0].amount.get(), Some(3_000_000.0));
    }

    #[test]
    fn test_description_with_digits_rejected() {
        let pages = vec![[
            RECEIPT_HEADER,
            "12 Statutory Lines    1234567 - Shared Revenue    021 - Federation Account    1,000,000.00    1,200,000.00",
        ]
        .join("\n")];
        let rows = extract_receipts(&pages, "2025");
        assert!(rows.is_empty());
    }

    #[test]
    fn test_total_lines_skipped() {
        let pages = vec![[
            RECEIPT_HEADER,
            "Total Receipts    1234567 - Shared Revenue    021 - Federation Account    9,000,000.00    9,900,000.00",
        ]
        .join("\n")];
        let rows = extract_receipts(&pages, "2025");
        assert!(rows.is_empty());
    }

    #[test]
    fn test_fewer_amounts_than_labels_rejected() {
        let pages = vec![[
            RECEIPT_HEADER,
            "Statutory Allocation    1234567 - Shared Revenue    021 - Federation Account    1,200,000.00",
        ]
        .join("\n")];
        let rows = extract_receipts(&pages, "2025");
        assert!(rows.is_empty());
    }

    #[test]
    fn test_infer_receipt_labels_with_final() {
        let labels = infer_receipt_labels("2024 Final Budget  2024 Performance  2025 Approved");
        let keys: Vec<String> = labels.iter().map(|l| l.as_key()).collect();
        assert_eq!(
            keys,
            vec!["2024_final_budget", "2024_performance", "2025_approved_budget"]
        );
    }

    #[test]
    fn test_parse_receipt_block_positional_constraints() {
        // economic precedes fund; the fund match after the economic wins
        let block = parse_receipt_block(
            "Independent Revenue Sources    1234567 - Licences    03 - State Fund    12,345.00",
        )
        .unwrap();
        assert_eq!(block.econ.code, "1234567");
        assert_eq!(block.fund.code, "03");
        assert_eq!(block.amounts, vec!["12,345.00"]);
    }

    #[test]
    fn test_parse_receipt_block_requires_amounts() {
        assert!(parse_receipt_block(
            "Independent Revenue Sources    1234567 - Licences    03 - State Fund"
        )
        .is_none());
    }
}
