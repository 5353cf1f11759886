use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::headers::select_target_label;
use crate::lex::{collapse_header, parse_amount, split_columns};
use crate::schema::{
    AmountItem, ColumnLabel, ExtractedField, NullReason, ProgrammeRow, Provenance,
};

static PROGRAM_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Programme Code and Programme Description").unwrap());
static PROJECT_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Project Description").unwrap());

static PROGRAM_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{11,14})\s*-\s*(.+)$").unwrap());
static ECON_COL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d{8})\s*-\s*(.+)$").unwrap());
static FUNC_COL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d{5})\s*-\s*(.+)$").unwrap());
static FUND_COL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d{2,8})\s*-\s*(.+)$").unwrap());
static LOC_COL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d{8})\s*-\s*(.+)$").unwrap());

static FUND_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Fund Code|Funding Source").unwrap());
static SECTOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bsector\b").unwrap());
static OBJECTIVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bobjective\b").unwrap());
static OBJECTIVE_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z].{0,80}\s-\s[A-Za-z].*$").unwrap());
static DIGIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d").unwrap());
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static YEAR_LABEL_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"(20\d{2})\s+full year actuals").unwrap(),
            "full_year_actuals",
        ),
        (
            Regex::new(r"(20\d{2})\s+revised budget").unwrap(),
            "revised_budget",
        ),
        (
            Regex::new(r"(20\d{2})\s+approved budget").unwrap(),
            "approved_budget",
        ),
        (
            Regex::new(r"(20\d{2})\s+adjustments").unwrap(),
            "adjustments",
        ),
        (
            Regex::new(r"(20\d{2})\s+out-year estimate").unwrap(),
            "out_year_estimate",
        ),
    ]
});

const HEADER_CONTEXT_KEYWORDS: [&str; 8] = [
    "full year actuals",
    "revised budget",
    "draft budget",
    "approved budget",
    "adjustments",
    "out-year estimate",
    "performance",
    "january to",
];

fn is_header_context_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    HEADER_CONTEXT_KEYWORDS
        .iter()
        .any(|keyword| lower.contains(keyword))
}

fn infer_programme_labels(header_lines: &[String]) -> Vec<ColumnLabel> {
    let lower = collapse_header(header_lines);
    let mut matches: Vec<(usize, String)> = Vec::new();
    for (pattern, label) in YEAR_LABEL_PATTERNS.iter() {
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

fn parse_code_desc(value: &str, pattern: &Regex) -> Option<(String, String)> {
    let caps = pattern.captures(value)?;
    Some((caps[1].to_string(), caps[2].trim().to_string()))
}

fn parse_program_line(line: &str) -> Option<(String, String)> {
    parse_code_desc(line, &PROGRAM_CODE_RE)
}

/// A sector/objective heading: a short digit-free label, at most six words
/// and sixty characters, that is not itself programme or project text.
fn is_short_label(line: &str) -> bool {
    let cleaned = WS_RE.replace_all(line.trim(), " ");
    if cleaned.is_empty() {
        return false;
    }
    let lower = cleaned.to_lowercase();
    if lower.contains("programme") || lower.contains("project") {
        return false;
    }
    if cleaned.len() > 60 {
        return false;
    }
    let words = cleaned.split(' ').count();
    (1..=6).contains(&words)
}

fn trim_label(line: &str) -> String {
    split_columns(line)
        .into_iter()
        .next()
        .unwrap_or_default()
}

/// Whether a line's text sits in the wrapped project-description column: the
/// first visual column is empty, signalled by leading whitespace.
fn starts_indented(line: &str) -> bool {
    line.chars().take_while(|c| c.is_whitespace()).count() >= 2
}

/// Line-by-line state machine over the programme/project tables. Programme
/// code and description carry across continuation lines until a complete
/// project row with economic, function, optional fund, and location columns
/// plus a full set of amounts is seen.
pub fn extract_programme_projects(pages: &[String], target_year: &str) -> Vec<ProgrammeRow> {
    let mut rows: Vec<ProgrammeRow> = Vec::new();

    let mut current_program_code: Option<String> = None;
    let mut current_program_desc = String::new();
    let mut program_continuation: Vec<String> = Vec::new();
    let mut project_buffer: Vec<String> = Vec::new();
    let mut labels: Vec<ColumnLabel> = Vec::new();
    let mut target_index: Option<usize> = None;
    let mut has_fund_column = false;
    let mut current_sector: Option<String> = None;
    let mut current_objective: Option<String> = None;

    for (page_offset, page_text) in pages.iter().enumerate() {
        let page_index = page_offset + 1;
        let lines: Vec<&str> = page_text.lines().collect();

        for (line_index, &line) in lines.iter().enumerate() {
            if PROGRAM_HEADER_RE.is_match(line) && PROJECT_HEADER_RE.is_match(line) {
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
                labels = infer_programme_labels(&header_lines);
                target_index = select_target_label(&labels, target_year);
                has_fund_column = split_columns(line)
                    .iter()
                    .any(|col| FUND_HEADER_RE.is_match(col));
                current_program_code = None;
                current_program_desc.clear();
                program_continuation.clear();
                project_buffer.clear();
                current_sector = None;
                current_objective = None;
                continue;
            }

            if labels.is_empty() || target_index.is_none() {
                continue;
            }

            let stripped = line.trim();
            if stripped.is_empty() || stripped.to_lowercase() == "total" {
                continue;
            }

            if !PROGRAM_CODE_RE.is_match(line) && !ECON_COL_RE.is_match(line) {
                let no_digits = !DIGIT_RE.is_match(line);
                if SECTOR_RE.is_match(line) && no_digits && is_short_label(line) {
                    current_sector = Some(trim_label(line));
                    continue;
                }
                if OBJECTIVE_RE.is_match(line) && no_digits && is_short_label(line) {
                    current_objective = Some(trim_label(line));
                    continue;
                }
                if OBJECTIVE_LINE_RE.is_match(line) && no_digits && is_short_label(line) {
                    current_objective = Some(trim_label(line));
                    continue;
                }
            }

            let program_line = parse_program_line(line);
            let columns = split_columns(line);
            let econ_index = columns.iter().position(|col| ECON_COL_RE.is_match(col));

            if let Some(whole_line) = program_line {
                let parsed = columns
                    .first()
                    .and_then(|first| parse_program_line(first))
                    .unwrap_or(whole_line);
                current_program_code = Some(parsed.0);
                current_program_desc = parsed.1;
                program_continuation.clear();
                project_buffer.clear();

                if columns.len() > 1 {
                    match econ_index {
                        None => project_buffer.push(columns[1].clone()),
                        Some(econ) => project_buffer.extend(columns[1..econ].iter().cloned()),
                    }
                }

                if econ_index.is_none() {
                    continue;
                }
            } else if econ_index.is_none() {
                if current_program_code.is_some() {
                    if columns.len() >= 2 {
                        program_continuation.push(columns[0].clone());
                        project_buffer.push(columns[1].clone());
                    } else if let Some(only) = columns.first() {
                        if starts_indented(line) {
                            project_buffer.push(only.clone());
                        } else {
                            program_continuation.push(only.clone());
                        }
                    }
                    if let Some(first) = columns.first() {
                        if OBJECTIVE_RE.is_match(first)
                            && !DIGIT_RE.is_match(first)
                            && is_short_label(first)
                        {
                            current_objective = Some(trim_label(first));
                        }
                    }
                }
                continue;
            }

            let Some(econ) = econ_index else {
                continue;
            };
            if current_program_code.is_none() {
                continue;
            }

            let column_at = |idx: usize| columns.get(idx).map(String::as_str).unwrap_or("");
            let econ_col = column_at(econ);
            let func_col = column_at(econ + 1);
            let (fund_col, loc_col, amount_start) = if has_fund_column {
                (column_at(econ + 2), column_at(econ + 3), econ + 4)
            } else {
                ("", column_at(econ + 2), econ + 3)
            };
            let amount_cols: Vec<&str> = columns
                .iter()
                .skip(amount_start)
                .map(String::as_str)
                .collect();

            let econ_parsed = parse_code_desc(econ_col, &ECON_COL_RE);
            let func_parsed = parse_code_desc(func_col, &FUNC_COL_RE);
            let loc_parsed = parse_code_desc(loc_col, &LOC_COL_RE);
            let fund_parsed = if has_fund_column {
                parse_code_desc(fund_col, &FUND_COL_RE)
            } else {
                None
            };

            let (Some(econ_parsed), Some(func_parsed), Some(loc_parsed)) =
                (econ_parsed, func_parsed, loc_parsed)
            else {
                continue;
            };
            if has_fund_column && fund_parsed.is_none() {
                continue;
            }

            let mut labels_for_row = labels.clone();
            let mut use_target = true;
            if amount_cols.len() != labels.len() {
                labels_for_row = (0..amount_cols.len())
                    .map(|i| ColumnLabel::synthesized(i as u32 + 1))
                    .collect();
                use_target = false;
            }

            let mut amounts: Vec<AmountItem> = Vec::with_capacity(labels_for_row.len());
            let mut amount_value: Option<f64> = None;
            let mut valid = true;
            for (idx, label) in labels_for_row.iter().enumerate() {
                let raw = amount_cols.get(idx).copied().unwrap_or("");
                let Some(parsed_value) = parse_amount(raw) else {
                    valid = false;
                    break;
                };
                amounts.push(AmountItem::new(
                    label.clone(),
                    ExtractedField::with_provenance(
                        parsed_value,
                        vec![Provenance::new(page_index, line)],
                    ),
                ));
                if use_target && target_index == Some(idx) {
                    amount_value = Some(parsed_value);
                }
            }
            if !valid {
                continue;
            }

            let mut program_desc_parts = vec![current_program_desc.clone()];
            program_desc_parts.extend(program_continuation.iter().cloned());
            let program_desc = WS_RE
                .replace_all(program_desc_parts.join(" ").trim(), " ")
                .into_owned();
            let project_desc = project_buffer.join(" ").trim().to_string();

            if program_desc.is_empty() || project_desc.is_empty() {
                continue;
            }

            let provenance = || vec![Provenance::new(page_index, line)];
            let (econ_code, econ_desc) = econ_parsed;
            let (func_code, func_desc) = func_parsed;
            let (loc_code, loc_desc) = loc_parsed;

            rows.push(ProgrammeRow {
                sector: match &current_sector {
                    Some(sector) => ExtractedField::with_provenance(sector.clone(), provenance()),
                    None => ExtractedField::null(NullReason::NotExtracted),
                },
                objective: match &current_objective {
                    Some(objective) => {
                        ExtractedField::with_provenance(objective.clone(), provenance())
                    }
                    None => ExtractedField::null(NullReason::NotExtracted),
                },
                programme_code: ExtractedField::with_value(
                    current_program_code.clone().unwrap_or_default(),
                ),
                programme: ExtractedField::with_value(program_desc),
                project_name: ExtractedField::with_value(project_desc),
                economic_code: ExtractedField::with_value(econ_code),
                economic_description: ExtractedField::with_value(econ_desc),
                function_code: ExtractedField::with_value(func_code),
                function_description: ExtractedField::with_value(func_desc),
                location_code: ExtractedField::with_value(loc_code),
                location_description: ExtractedField::with_value(loc_desc),
                amounts,
                amount_labels: labels_for_row,
                amount: match amount_value {
                    Some(value) => ExtractedField::with_provenance(value, provenance()),
                    None => ExtractedField::null(NullReason::NotExtracted),
                },
                funding_source: match &fund_parsed {
                    Some((fund_code, fund_desc)) => ExtractedField::with_provenance(
                        format!("{} - {}", fund_code, fund_desc),
                        provenance(),
                    ),
                    None => ExtractedField::null(NullReason::NotExtracted),
                },
                page: page_index,
                line_text: stripped.to_string(),
            });

            current_program_code = None;
            current_program_desc.clear();
            program_continuation.clear();
            project_buffer.clear();
        }
    }

    rows
}

/// Target-year amounts grouped by programme code, for rollup checks.
pub fn amounts_by_programme(rows: &[ProgrammeRow]) -> HashMap<String, f64> {
    let mut totals: HashMap<String, f64> = HashMap::new();
    for row in rows {
        let (Some(code), Some(amount)) = (row.programme_code.value(), row.amount.get()) else {
            continue;
        };
        *totals.entry(code.clone()).or_insert(0.0) += amount;
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAMME_HEADER: &str = "Programme Code and Programme Description    Project Description    Economic    Function    Fund Code    Location    2024 Revised Budget    2025 Approved Budget";

    #[test]
    fn test_programme_row_with_indented_project_continuation() {
        let pages = vec![[
            PROGRAMME_HEADER,
            "05110100001 - Basic Education Support",
            "                Construction of 10 classrooms",
            "23020101 - Construction    70911 - Primary Education    11 - State Government    02010201 - Yola North    500,000   600,000",
        ]
        .join("\n")];
        let rows = extract_programme_projects(&pages, "2025");
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.programme_code.value.as_deref(), Some("05110100001"));
        assert_eq!(
            row.programme.value.as_deref(),
            Some("Basic Education Support")
        );
        assert_eq!(
            row.project_name.value.as_deref(),
            Some("Construction of 10 classrooms")
        );
        assert_eq!(row.economic_code.value.as_deref(), Some("23020101"));
        assert_eq!(row.function_code.value.as_deref(), Some("70911"));
        assert_eq!(row.location_code.value.as_deref(), Some("02010201"));
        assert_eq!(
            row.funding_source.value.as_deref(),
            Some("11 - State Government")
        );
        assert_eq!(row.amount.get(), Some(600_000.0));
        assert_eq!(row.amounts[0].label.as_key(), "2024_revised_budget");
        assert_eq!(row.amounts[0].amount.get(), Some(500_000.0));
        assert_eq!(row.amounts[1].label.as_key(), "2025_approved_budget");
    }

    #[test]
    fn test_project_on_same_line_as_programme() {
        let pages = vec![[
            PROGRAMME_HEADER,
            "05110100001 - Basic Education Support    Renovation of science labs    23020101 - Construction    70911 - Primary Education    11 - State Government    02010201 - Yola North    200,000   300,000",
        ]
        .join("\n")];
        let rows = extract_programme_projects(&pages, "2025");
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].project_name.value.as_deref(),
            Some("Renovation of science labs")
        );
        assert_eq!(rows[0].amount.get(), Some(300_000.0));
    }

    #[test]
    fn test_sector_and_objective_carry_into_rows() {
        let pages = vec![[
            PROGRAMME_HEADER,
            "Economic Sector",
            "Improve Literacy - Objective",
            "05110100001 - Basic Education Support",
            "                Construction of 10 classrooms",
            "23020101 - Construction    70911 - Primary Education    11 - State Government    02010201 - Yola North    500,000   600,000",
        ]
        .join("\n")];
        let rows = extract_programme_projects(&pages, "2025");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sector.value.as_deref(), Some("Economic Sector"));
        assert_eq!(
            rows[0].objective.value.as_deref(),
            Some("Improve Literacy - Objective")
        );
    }

    #[test]
    fn test_row_with_unparseable_amount_is_dropped() {
        let pages = vec![[
            PROGRAMME_HEADER,
            "05110100001 - Basic Education Support",
            "                Construction of 10 classrooms",
            "23020101 - Construction    70911 - Primary Education    11 - State Government    02010201 - Yola North    n/a   600,000",
        ]
        .join("\n")];
        let rows = extract_programme_projects(&pages, "2025");
        assert!(rows.is_empty());
    }

    #[test]
    fn test_column_count_mismatch_falls_back_to_synthesized_labels() {
        let pages = vec![[
            PROGRAMME_HEADER,
            "05110100001 - Basic Education Support",
            "                Construction of 10 classrooms",
            "23020101 - Construction    70911 - Primary Education    11 - State Government    02010201 - Yola North    400,000   500,000   600,000",
        ]
        .join("\n")];
        let rows = extract_programme_projects(&pages, "2025");
        assert_eq!(rows.len(), 1);
        assert!(rows[0].amount.is_null());
        assert_eq!(
            rows[0]
                .amount_labels
                .iter()
                .map(|l| l.as_key())
                .collect::<Vec<_>>(),
            vec!["amount_1", "amount_2", "amount_3"]
        );
    }

    #[test]
    fn test_program_state_clears_after_emission() {
        let pages = vec![[
            PROGRAMME_HEADER,
            "05110100001 - Basic Education Support",
            "                Construction of 10 classrooms",
            "23020101 - Construction    70911 - Primary Education    11 - State Government    02010201 - Yola North    500,000   600,000",
            // an orphan project line with no fresh program header
            "23020102 - Rehabilitation    70912 - Secondary Education    11 - State Government    02010202 - Yola South    100,000   200,000",
        ]
        .join("\n")];
        let rows = extract_programme_projects(&pages, "2025");
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_no_header_means_no_rows() {
        let pages = vec![[
            "05110100001 - Basic Education Support",
            "23020101 - Construction    70911 - Primary Education    11 - State Government    02010201 - Yola North    500,000   600,000",
        ]
        .join("\n")];
        let rows = extract_programme_projects(&pages, "2025");
        assert!(rows.is_empty());
    }

    #[test]
    fn test_header_without_fund_column() {
        let header = "Programme Code and Programme Description    Project Description    Economic    Function    Location    2024 Revised Budget    2025 Approved Budget";
        let pages = vec![[
            header,
            "05110100001 - Basic Education Support",
            "                Construction of 10 classrooms",
            "23020101 - Construction    70911 - Primary Education    02010201 - Yola North    500,000   600,000",
        ]
        .join("\n")];
        let rows = extract_programme_projects(&pages, "2025");
        assert_eq!(rows.len(), 1);
        assert!(rows[0].funding_source.is_null());
        assert_eq!(rows[0].amount.get(), Some(600_000.0));
    }

    #[test]
    fn test_is_short_label() {
        assert!(is_short_label("Economic Sector"));
        assert!(!is_short_label("Sector programme overview"));
        assert!(!is_short_label(
            "A very long sector description that keeps going well past the size cut"
        ));
        assert!(!is_short_label("one two three four five six seven"));
    }

    #[test]
    fn test_amounts_by_programme() {
        let pages = vec![[
            PROGRAMME_HEADER,
            "05110100001 - Basic Education Support",
            "                Construction of 10 classrooms",
            "23020101 - Construction    70911 - Primary Education    11 - State Government    02010201 - Yola North    500,000   600,000",
            "05110100001 - Basic Education Support",
            "                Furniture for 10 classrooms",
            "23020102 - Rehabilitation    70911 - Primary Education    11 - State Government    02010201 - Yola North    100,000   150,000",
        ]
        .join("\n")];
        let rows = extract_programme_projects(&pages, "2025");
        let totals = amounts_by_programme(&rows);
        assert_eq!(totals.get("05110100001"), Some(&750_000.0));
    }
}
