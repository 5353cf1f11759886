use std::collections::{BTreeMap, HashMap, HashSet};

use crate::economic::EconomicConflict;
use crate::metadata::{filename_state_prefix, filename_year};
use crate::schema::{
    AdministrativeUnit, BudgetTotals, ColumnLabel, DocumentMetadata, EconomicExpenditureRow,
    ExtractionError, MdaExpenditureRow, ParentRow, ProgrammeRow, RevenueRow, TableType,
};

/// Absolute monetary tolerance: values within 1.0 are equal for
/// reconciliation.
pub const TOLERANCE: f64 = 1.0;

/// A semantic violation found after extraction. Never mutates rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub code: String,
    pub message: String,
}

impl ValidationError {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<ValidationError> for ExtractionError {
    fn from(err: ValidationError) -> Self {
        ExtractionError {
            code: err.code,
            message: err.message,
        }
    }
}

pub fn validate_page_count(expected: usize, extracted: usize) -> Vec<ValidationError> {
    if expected == 0 {
        return vec![ValidationError::new(
            "pdfinfo_failed",
            "page count unavailable",
        )];
    }
    if extracted == 0 {
        return vec![ValidationError::new(
            "text_extraction_failed",
            "no pages extracted",
        )];
    }
    if expected.abs_diff(extracted) > 2 {
        return vec![ValidationError::new(
            "page_count_mismatch",
            format!("expected {}, extracted {}", expected, extracted),
        )];
    }
    Vec::new()
}

pub fn validate_admin_unit_codes(units: &[AdministrativeUnit]) -> Vec<ValidationError> {
    let mut seen: HashSet<(TableType, &str)> = HashSet::new();
    let mut duplicates: Vec<&str> = Vec::new();
    for unit in units {
        let Some(code) = unit.unit_code.value() else {
            continue;
        };
        if !seen.insert((unit.table_type, code)) {
            duplicates.push(code);
        }
    }
    if duplicates.is_empty() {
        return Vec::new();
    }
    duplicates.sort_unstable();
    duplicates.dedup();
    vec![ValidationError::new(
        "duplicate_admin_unit",
        format!("duplicate admin unit codes: {:?}", duplicates),
    )]
}

/// Parent totals vs the per-label sums of the children attached under them,
/// per MDA expenditure parent.
pub fn validate_mda_reconciliation(
    parent_rows: &[ParentRow],
    units: &[AdministrativeUnit],
) -> Vec<ValidationError> {
    let mut unit_sums: HashMap<&str, HashMap<ColumnLabel, f64>> = HashMap::new();
    for unit in units {
        if unit.table_type != TableType::ExpenditureMda {
            continue;
        }
        let Some(parent_code) = unit.parent_code.value() else {
            continue;
        };
        let sums = unit_sums.entry(parent_code).or_default();
        for item in &unit.amounts {
            if let Some(value) = item.amount.get() {
                *sums.entry(item.label.clone()).or_insert(0.0) += value;
            }
        }
    }

    let mut errors = Vec::new();
    for parent in parent_rows {
        if parent.table_type != TableType::ExpenditureMda {
            continue;
        }
        let Some(sums) = unit_sums.get(parent.code.as_str()) else {
            continue;
        };
        for item in &parent.amounts {
            let Some(expected) = item.amount.get() else {
                continue;
            };
            let Some(&actual) = sums.get(&item.label) else {
                continue;
            };
            if (expected - actual).abs() > TOLERANCE {
                errors.push(ValidationError::new(
                    "mda_reconciliation_failed",
                    format!(
                        "parent {} {} expected {} got {:.2}",
                        parent.code,
                        item.label.as_key(),
                        expected,
                        actual
                    ),
                ));
            }
        }
    }
    errors
}

pub fn validate_economic_rows(
    revenue_rows: &[RevenueRow],
    expenditure_rows: &[EconomicExpenditureRow],
) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for row in revenue_rows {
        if row.amount.is_null() {
            errors.push(ValidationError::new(
                "economic_amount_missing",
                format!("revenue row missing amount: {}", row.line_text),
            ));
        }
    }
    for row in expenditure_rows {
        if row.amount.is_null() {
            errors.push(ValidationError::new(
                "economic_amount_missing",
                format!("expenditure row missing amount: {}", row.line_text),
            ));
        }
    }
    errors
}

pub fn validate_economic_duplicates(
    revenue_rows: &[RevenueRow],
    expenditure_rows: &[EconomicExpenditureRow],
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut check = |label: &str, codes: Vec<&String>| {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for code in codes {
            *counts.entry(code.as_str()).or_insert(0) += 1;
        }
        let dupes: Vec<&str> = counts
            .iter()
            .filter(|(_, &count)| count > 1)
            .map(|(&code, _)| code)
            .collect();
        if !dupes.is_empty() {
            errors.push(ValidationError::new(
                "economic_duplicate_code",
                format!("{} duplicate codes: {:?}", label, dupes),
            ));
        }
    };

    check(
        "revenue",
        revenue_rows.iter().filter_map(|r| r.code.value()).collect(),
    );
    check(
        "expenditure",
        expenditure_rows
            .iter()
            .filter_map(|r| r.code.value())
            .collect(),
    );
    errors
}

pub fn validate_economic_conflicts(conflicts: &[EconomicConflict]) -> Vec<ValidationError> {
    conflicts
        .iter()
        .map(|conflict| {
            ValidationError::new(
                "economic_conflicting_code",
                format!(
                    "{} code {} amounts {} vs {}",
                    conflict.section.as_str(),
                    conflict.code,
                    conflict.first_amount,
                    conflict.second_amount
                ),
            )
        })
        .collect()
}

fn first_amount_map<'a, I>(rows: I) -> BTreeMap<&'a str, f64>
where
    I: IntoIterator<Item = (Option<&'a String>, Option<f64>)>,
{
    let mut mapping: BTreeMap<&str, f64> = BTreeMap::new();
    for (code, amount) in rows {
        let (Some(code), Some(amount)) = (code, amount) else {
            continue;
        };
        mapping.entry(code.as_str()).or_insert(amount);
    }
    mapping
}

fn reconcile_hierarchy(label: &str, mapping: &BTreeMap<&str, f64>) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut codes: Vec<&str> = mapping.keys().copied().collect();
    codes.sort_by_key(|code| (code.len(), code.to_string()));

    for code in codes {
        if code.len() > 2 {
            continue;
        }
        let children: Vec<&str> = mapping
            .keys()
            .copied()
            .filter(|child| child.starts_with(code) && child.len() > code.len())
            .collect();
        if children.is_empty() {
            continue;
        }
        let min_len = children.iter().map(|child| child.len()).min().unwrap();
        let direct: Vec<&str> = children
            .into_iter()
            .filter(|child| child.len() == min_len)
            .collect();
        if direct.len() < 2 {
            continue;
        }
        let child_sum: f64 = direct.iter().map(|child| mapping[child]).sum();
        if (mapping[code] - child_sum).abs() > TOLERANCE {
            errors.push(ValidationError::new(
                "economic_reconciliation_failed",
                format!(
                    "{} code {} expected {} got {:.2}",
                    label, code, mapping[code], child_sum
                ),
            ));
        }
    }
    errors
}

/// Prefix-hierarchy reconciliation: a short code's amount must equal the sum
/// of its direct children (children of equal minimal extension length).
pub fn validate_economic_hierarchy(
    revenue_rows: &[RevenueRow],
    expenditure_rows: &[EconomicExpenditureRow],
) -> Vec<ValidationError> {
    let revenue_map = first_amount_map(
        revenue_rows
            .iter()
            .map(|r| (r.code.value(), r.amount.get())),
    );
    let expenditure_map = first_amount_map(
        expenditure_rows
            .iter()
            .map(|r| (r.code.value(), r.amount.get())),
    );
    let mut errors = reconcile_hierarchy("revenue", &revenue_map);
    errors.extend(reconcile_hierarchy("expenditure", &expenditure_map));
    errors
}

pub fn validate_programme_rows(rows: &[ProgrammeRow]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for row in rows {
        if row.amounts.iter().any(|item| item.amount.is_null()) {
            errors.push(ValidationError::new(
                "programme_amount_missing",
                format!("programme row missing amount: {}", row.line_text),
            ));
        }
    }
    errors
}

pub fn validate_budget_components(budget_totals: &BudgetTotals) -> Vec<ValidationError> {
    let (Some(total), Some(capital), Some(recurrent)) = (
        budget_totals.total_budget.get(),
        budget_totals.capital_expenditure_total.get(),
        budget_totals.recurrent_expenditure_total.get(),
    ) else {
        return Vec::new();
    };
    if (total - (capital + recurrent)).abs() > TOLERANCE {
        return vec![ValidationError::new(
            "budget_totals_mismatch",
            format!(
                "total budget {} != capital {} + recurrent {}",
                total, capital, recurrent
            ),
        )];
    }
    Vec::new()
}

/// Leaf-sum: from the set of coded amounts, sum those codes no other code
/// strictly extends.
fn leaf_sum(mapping: &BTreeMap<&str, f64>) -> Option<f64> {
    if mapping.is_empty() {
        return None;
    }
    let leaves: Vec<&str> = mapping
        .keys()
        .copied()
        .filter(|code| {
            !mapping
                .keys()
                .any(|other| other.starts_with(code) && other.len() > code.len())
        })
        .collect();
    if leaves.is_empty() {
        return None;
    }
    Some(leaves.iter().map(|code| mapping[code]).sum())
}

/// Cross-checks the summary totals against the leaf sums of the economic
/// tables, the MDA rollup and the programme rollup.
pub fn validate_global_reconciliation(
    budget_totals: &BudgetTotals,
    revenue_rows: &[RevenueRow],
    expenditure_rows: &[EconomicExpenditureRow],
    mda_rows: &[MdaExpenditureRow],
    programme_rows: &[ProgrammeRow],
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(total_budget) = budget_totals.total_budget.get() {
        let expenditure_map = first_amount_map(
            expenditure_rows
                .iter()
                .map(|r| (r.code.value(), r.amount.get())),
        );
        if let Some(exp_sum) = leaf_sum(&expenditure_map) {
            if (total_budget - exp_sum).abs() > TOLERANCE {
                errors.push(ValidationError::new(
                    "global_expenditure_mismatch",
                    format!(
                        "total budget {} != economic expenditure {:.2}",
                        total_budget, exp_sum
                    ),
                ));
            }
        }

        let mda_totals: Vec<f64> = mda_rows
            .iter()
            .filter_map(|row| row.total_amount.get())
            .collect();
        if !mda_totals.is_empty() && mda_totals.len() == mda_rows.len() {
            let mda_sum: f64 = mda_totals.iter().sum();
            if (total_budget - mda_sum).abs() > TOLERANCE {
                errors.push(ValidationError::new(
                    "global_mda_mismatch",
                    format!("total budget {} != mda total {:.2}", total_budget, mda_sum),
                ));
            }
        }

        let programme_values: Vec<f64> = programme_rows
            .iter()
            .filter_map(|row| row.amount.get())
            .collect();
        if !programme_values.is_empty() && programme_values.len() == programme_rows.len() {
            let programme_sum: f64 = programme_values.iter().sum();
            if (total_budget - programme_sum).abs() > TOLERANCE {
                errors.push(ValidationError::new(
                    "global_programme_mismatch",
                    format!(
                        "total budget {} != programme total {:.2}",
                        total_budget, programme_sum
                    ),
                ));
            }
        }
    }

    if let Some(revenue_total) = budget_totals.revenue_total.get() {
        let revenue_map = first_amount_map(
            revenue_rows
                .iter()
                .map(|r| (r.code.value(), r.amount.get())),
        );
        if let Some(rev_sum) = leaf_sum(&revenue_map) {
            if (revenue_total - rev_sum).abs() > TOLERANCE {
                errors.push(ValidationError::new(
                    "global_revenue_mismatch",
                    format!(
                        "total revenue {} != economic revenue {:.2}",
                        revenue_total, rev_sum
                    ),
                ));
            }
        }
    }

    errors
}

/// The file name's year and state prefix must agree with the extracted
/// metadata (substring match either direction for the state).
pub fn validate_metadata_consistency(
    metadata: &DocumentMetadata,
    file_name: &str,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let (Some(file_year), Some(extracted_year)) =
        (filename_year(file_name), metadata.budget_year.value())
    {
        if &file_year != extracted_year {
            errors.push(ValidationError::new(
                "metadata_year_mismatch",
                format!(
                    "filename year {} != extracted year {}",
                    file_year, extracted_year
                ),
            ));
        }
    }

    if let (Some(file_state), Some(extracted)) =
        (filename_state_prefix(file_name), metadata.state_name.value())
    {
        let file_state = file_state.to_lowercase();
        let extracted_state = extracted.to_lowercase();
        if !extracted_state.contains(&file_state) && !file_state.contains(&extracted_state) {
            errors.push(ValidationError::new(
                "metadata_state_mismatch",
                format!(
                    "filename state {} != extracted state {}",
                    file_state, extracted_state
                ),
            ));
        }
    }

    errors
}
