use chrono::{SecondsFormat, Utc};
use log::info;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::admin_units::extract_admin_units;
use crate::app_output::build_app_output;
use crate::economic::extract_economic_rows;
use crate::error::{EngineError, Result};
use crate::functional::extract_functional_classification;
use crate::lex::normalize_label;
use crate::metadata::{extract_metadata, filename_year, into_document_metadata};
use crate::metrics::compute_page_metrics;
use crate::programme::extract_programme_projects;
use crate::receipts::extract_receipts;
use crate::review::build_review_report;
use crate::schema::{
    AdministrativeUnit, AppropriationLaw, BudgetTotals, CanonicalLabel, ColumnLabel,
    DocumentMetadata, ExtractedField, ExtractionError, ExtractionResult, ExtractionStatus,
    FunctionalRow, MdaExpenditureRow, NullReason, ParentRow, TableType,
};
use crate::sections::{detect_sections, SectionHit};
use crate::summary::extract_budget_summary;
use crate::text::{extract_fulltext, get_page_count, split_pages};
use crate::validate::{
    validate_admin_unit_codes, validate_budget_components, validate_economic_conflicts,
    validate_economic_duplicates, validate_economic_hierarchy, validate_economic_rows,
    validate_global_reconciliation, validate_mda_reconciliation, validate_metadata_consistency,
    validate_page_count, validate_programme_rows,
};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The extraction result plus the side tables only the app output consumes.
#[derive(Debug, Clone)]
pub struct DocumentExtraction {
    pub result: ExtractionResult,
    pub functional_rows: Vec<FunctionalRow>,
    pub sections: Vec<SectionHit>,
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn null_metadata(file_name: &str, page_count: usize) -> DocumentMetadata {
    DocumentMetadata {
        state_name: ExtractedField::null(NullReason::NotExtracted),
        state_code: ExtractedField::null(NullReason::NotExtracted),
        budget_year: ExtractedField::null(NullReason::NotExtracted),
        document_title: ExtractedField::null(NullReason::NotExtracted),
        source_file_name: file_name.to_string(),
        page_count,
        currency: ExtractedField::null(NullReason::NotExtracted),
        extraction_timestamp: timestamp(),
        engine_version: ENGINE_VERSION.to_string(),
    }
}

/// An empty result carrying only the accumulated errors; used when text
/// extraction never produced pages to walk.
pub fn build_default_result(
    file_name: &str,
    page_count: usize,
    errors: Vec<ExtractionError>,
) -> ExtractionResult {
    let status = if errors.is_empty() {
        ExtractionStatus::Ok
    } else {
        ExtractionStatus::Failed
    };
    ExtractionResult {
        status,
        errors,
        metadata: null_metadata(file_name, page_count),
        budget_totals: BudgetTotals::not_extracted(),
        revenue_breakdown: Vec::new(),
        expenditure_economic: Vec::new(),
        expenditure_mda: Vec::new(),
        administrative_units: Vec::new(),
        programme_projects: Vec::new(),
        appropriation_law: AppropriationLaw::not_extracted(),
        assumptions: Vec::new(),
    }
}

fn parent_amount(parent: &ParentRow, label: CanonicalLabel) -> ExtractedField<f64> {
    parent
        .amounts
        .iter()
        .find(|item| item.label == ColumnLabel::Canonical(label))
        .map(|item| item.amount.clone())
        .unwrap_or_else(|| ExtractedField::null(NullReason::NotExtracted))
}

/// Groups administrative units under their MDA parents, synthesizing a
/// parent entry when a unit names a parent no parent row declared. The
/// forest is keyed by code strings, not by links between entities.
pub fn build_mda_groups(
    admin_units: &[AdministrativeUnit],
    parent_rows: &[ParentRow],
) -> Vec<MdaExpenditureRow> {
    let mut parents: BTreeMap<String, MdaExpenditureRow> = BTreeMap::new();

    for parent in parent_rows {
        if parent.table_type != TableType::ExpenditureMda {
            continue;
        }
        parents.insert(
            parent.code.clone(),
            MdaExpenditureRow {
                mda_code: ExtractedField::with_value(parent.code.clone()),
                mda_name: ExtractedField::with_value(parent.name.clone()),
                recurrent_amount: parent_amount(parent, CanonicalLabel::TotalRecurrent),
                capital_amount: parent_amount(parent, CanonicalLabel::Capital),
                total_amount: parent_amount(parent, CanonicalLabel::TotalExpenditure),
                administrative_units: Vec::new(),
                page: Some(parent.page),
                line_text: Some(parent.line_text.clone()),
            },
        );
    }

    for unit in admin_units {
        let (Some(parent_code), Some(parent_name)) =
            (unit.parent_code.value(), unit.parent_name.value())
        else {
            continue;
        };
        if parent_name.is_empty() {
            continue;
        }
        let entry = parents
            .entry(parent_code.clone())
            .or_insert_with(|| MdaExpenditureRow {
                mda_code: ExtractedField::with_value(parent_code.clone()),
                mda_name: ExtractedField::with_value(parent_name.clone()),
                recurrent_amount: ExtractedField::null(NullReason::NotExtracted),
                capital_amount: ExtractedField::null(NullReason::NotExtracted),
                total_amount: ExtractedField::null(NullReason::NotExtracted),
                administrative_units: Vec::new(),
                page: None,
                line_text: None,
            });
        entry.administrative_units.push(unit.clone());
    }

    parents.into_values().collect()
}

/// Runs every extraction stage over the page-split text and composes the
/// typed result. Stages are pure functions of (pages, target year); the
/// error list is the only accumulator.
pub fn extract_document(
    pages: &[String],
    file_name: &str,
    page_count: usize,
) -> DocumentExtraction {
    let mut errors: Vec<ExtractionError> = Vec::new();
    let target_year = filename_year(file_name);

    errors.extend(
        validate_page_count(page_count, pages.len())
            .into_iter()
            .map(ExtractionError::from),
    );
    info!("Page validation complete");

    let metadata_fields = extract_metadata(file_name, pages);
    info!("Metadata extraction complete");

    let admin = extract_admin_units(pages);
    errors.extend(
        validate_admin_unit_codes(&admin.units)
            .into_iter()
            .map(ExtractionError::from),
    );
    errors.extend(
        validate_mda_reconciliation(&admin.parent_rows, &admin.units)
            .into_iter()
            .map(ExtractionError::from),
    );
    let mda_rows = build_mda_groups(&admin.units, &admin.parent_rows);
    info!("Administrative units extraction complete");

    let mut revenue_rows = Vec::new();
    let mut expenditure_rows = Vec::new();
    let mut programme_rows = Vec::new();
    let mut receipt_rows = Vec::new();
    let mut functional_rows = Vec::new();
    let mut budget_totals: Option<BudgetTotals> = None;

    if let Some(target_year) = target_year.as_deref() {
        let economic = extract_economic_rows(pages, target_year);
        revenue_rows = economic.revenue_rows;
        expenditure_rows = economic.expenditure_rows;
        errors.extend(
            validate_economic_rows(&revenue_rows, &expenditure_rows)
                .into_iter()
                .map(ExtractionError::from),
        );
        errors.extend(
            validate_economic_duplicates(&revenue_rows, &expenditure_rows)
                .into_iter()
                .map(ExtractionError::from),
        );
        errors.extend(
            validate_economic_conflicts(&economic.conflicts)
                .into_iter()
                .map(ExtractionError::from),
        );
        errors.extend(
            validate_economic_hierarchy(&revenue_rows, &expenditure_rows)
                .into_iter()
                .map(ExtractionError::from),
        );

        let summary = extract_budget_summary(pages, target_year);
        programme_rows = extract_programme_projects(pages, target_year);
        receipt_rows = extract_receipts(pages, target_year);
        functional_rows = extract_functional_classification(pages, target_year);
        info!("Economic, programme, and receipt extraction complete");

        errors.extend(
            validate_programme_rows(&programme_rows)
                .into_iter()
                .map(ExtractionError::from),
        );

        for row in &mut programme_rows {
            if let Some(sector) = row.sector.value.take() {
                row.sector.value = Some(normalize_label(&sector));
            }
            if let Some(objective) = row.objective.value.take() {
                row.objective.value = Some(normalize_label(&objective));
            }
        }

        errors.extend(
            validate_budget_components(&summary.totals)
                .into_iter()
                .map(ExtractionError::from),
        );
        errors.extend(
            validate_global_reconciliation(
                &summary.totals,
                &revenue_rows,
                &expenditure_rows,
                &mda_rows,
                &programme_rows,
            )
            .into_iter()
            .map(ExtractionError::from),
        );
        budget_totals = Some(summary.totals);
    }

    let metadata = into_document_metadata(
        metadata_fields,
        file_name,
        page_count,
        timestamp(),
        ENGINE_VERSION,
    );
    errors.extend(
        validate_metadata_consistency(&metadata, file_name)
            .into_iter()
            .map(ExtractionError::from),
    );

    let sections = detect_sections(pages);

    revenue_rows.extend(receipt_rows);

    let status = if errors.is_empty() {
        ExtractionStatus::Ok
    } else {
        ExtractionStatus::Failed
    };

    let result = ExtractionResult {
        status,
        errors,
        metadata,
        budget_totals: budget_totals.unwrap_or_else(BudgetTotals::not_extracted),
        revenue_breakdown: revenue_rows,
        expenditure_economic: expenditure_rows,
        expenditure_mda: mda_rows,
        administrative_units: admin.units,
        programme_projects: programme_rows,
        appropriation_law: AppropriationLaw::not_extracted(),
        assumptions: Vec::new(),
    };

    DocumentExtraction {
        result,
        functional_rows,
        sections,
    }
}

/// Filesystem driver: converts the PDF, runs the extraction, and writes
/// `output.json`, `app_output.json`, `review.json` and `page_metrics.json`
/// into the output directory. An existing non-empty `text.txt` is reused.
pub fn run_pipeline(pdf_path: &Path, output_dir: &Path, overwrite: bool) -> Result<PathBuf> {
    if !pdf_path.exists() {
        return Err(EngineError::InputNotFound(pdf_path.to_path_buf()));
    }
    if output_dir.exists() && output_dir.read_dir()?.next().is_some() && !overwrite {
        return Err(EngineError::OutputDirNotEmpty(output_dir.to_path_buf()));
    }
    fs::create_dir_all(output_dir)?;

    let file_name = pdf_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();
    let text_path = output_dir.join("text.txt");
    let metrics_path = output_dir.join("page_metrics.json");
    let output_path = output_dir.join("output.json");
    let review_path = output_dir.join("review.json");
    let app_output_path = output_dir.join("app_output.json");

    let mut errors: Vec<ExtractionError> = Vec::new();

    info!("Starting extraction pipeline");
    let page_count = match get_page_count(pdf_path) {
        Ok(count) => {
            info!("Detected page count: {}", count);
            count
        }
        Err(err) => {
            errors.push(ExtractionError::new("pdfinfo_failed", err.to_string()));
            0
        }
    };

    if errors.is_empty() {
        let reuse = text_path
            .metadata()
            .map(|meta| meta.len() > 0)
            .unwrap_or(false);
        if reuse {
            info!("Using existing text.txt");
        } else {
            info!("Extracting text with pdftotext");
            if let Err(err) = extract_fulltext(pdf_path, &text_path) {
                errors.push(ExtractionError::new("pdftotext_failed", err.to_string()));
            }
        }
    }

    let extraction = if errors.is_empty() && text_path.exists() {
        let bytes = fs::read(&text_path)?;
        let text = String::from_utf8_lossy(&bytes);
        let pages = split_pages(&text);

        if metrics_path.exists() {
            info!("Using existing page_metrics.json");
        } else {
            info!("Computing page metrics");
            let metrics = compute_page_metrics(&pages);
            let metrics_doc = serde_json::json!({
                "file": file_name,
                "pages_expected": page_count,
                "pages_extracted": pages.len(),
                "per_page": metrics,
            });
            fs::write(&metrics_path, serde_json::to_string_pretty(&metrics_doc)?)?;
        }

        extract_document(&pages, &file_name, page_count)
    } else {
        DocumentExtraction {
            result: build_default_result(&file_name, page_count, errors),
            functional_rows: Vec::new(),
            sections: Vec::new(),
        }
    };

    let app_output = build_app_output(
        &extraction.result,
        &extraction.functional_rows,
        &extraction.sections,
    );
    fs::write(&app_output_path, serde_json::to_string_pretty(&app_output)?)?;
    fs::write(
        &output_path,
        serde_json::to_string_pretty(&extraction.result)?,
    )?;
    fs::write(
        &review_path,
        serde_json::to_string_pretty(&build_review_report(&extraction.result.errors))?,
    )?;
    info!("Wrote output.json, app_output.json, and review.json");

    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AmountItem;

    fn parent_row(code: &str, amounts: &[(CanonicalLabel, f64)]) -> ParentRow {
        ParentRow {
            code: code.to_string(),
            name: format!("Parent {}", code),
            amounts: amounts
                .iter()
                .map(|(label, value)| {
                    AmountItem::new(
                        ColumnLabel::Canonical(*label),
                        ExtractedField::with_value(*value),
                    )
                })
                .collect(),
            page: 3,
            line_text: "parent line".to_string(),
            table_type: TableType::ExpenditureMda,
        }
    }

    fn admin_unit(code: &str, parent: &str) -> AdministrativeUnit {
        AdministrativeUnit {
            parent_code: ExtractedField::with_value(parent.to_string()),
            parent_name: ExtractedField::with_value(format!("Parent {}", parent)),
            unit_code: ExtractedField::with_value(code.to_string()),
            unit_name: ExtractedField::with_value(format!("Unit {}", code)),
            amounts: Vec::new(),
            page: 3,
            line_text: String::new(),
            table_type: TableType::ExpenditureMda,
        }
    }

    #[test]
    fn test_build_mda_groups_maps_parent_amounts() {
        let parents = vec![parent_row(
            "021500000000",
            &[
                (CanonicalLabel::TotalRecurrent, 1_250_000.0),
                (CanonicalLabel::Capital, 500_000.0),
                (CanonicalLabel::TotalExpenditure, 1_750_000.0),
            ],
        )];
        let units = vec![admin_unit("021500100", "021500000000")];

        let groups = build_mda_groups(&units, &parents);
        assert_eq!(groups.len(), 1);
        let mda = &groups[0];
        assert_eq!(mda.recurrent_amount.get(), Some(1_250_000.0));
        assert_eq!(mda.capital_amount.get(), Some(500_000.0));
        assert_eq!(mda.total_amount.get(), Some(1_750_000.0));
        assert_eq!(mda.administrative_units.len(), 1);
    }

    #[test]
    fn test_build_mda_groups_synthesizes_missing_parent() {
        let units = vec![admin_unit("021700100", "021700000000")];
        let groups = build_mda_groups(&units, &[]);
        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups[0].mda_code.value.as_deref(),
            Some("021700000000")
        );
        assert!(groups[0].total_amount.is_null());
        assert!(groups[0].page.is_none());
    }

    #[test]
    fn test_build_mda_groups_sorted_by_code() {
        let units = vec![
            admin_unit("031700100", "031700000000"),
            admin_unit("021500100", "021500000000"),
        ];
        let groups = build_mda_groups(&units, &[]);
        let codes: Vec<&str> = groups
            .iter()
            .filter_map(|g| g.mda_code.value.as_deref())
            .collect();
        assert_eq!(codes, vec!["021500000000", "031700000000"]);
    }

    #[test]
    fn test_extract_document_status_reflects_errors() {
        // page count disagrees with the extracted page total by more than 2
        let pages = vec!["nothing of note".to_string()];
        let extraction = extract_document(&pages, "Adamawa_2025.pdf", 10);
        assert_eq!(extraction.result.status, ExtractionStatus::Failed);
        assert!(extraction
            .result
            .errors
            .iter()
            .any(|e| e.code == "page_count_mismatch"));
    }

    #[test]
    fn test_extract_document_ok_when_clean() {
        let pages = vec!["nothing of note".to_string()];
        let extraction = extract_document(&pages, "Adamawa_2025.pdf", 1);
        assert_eq!(extraction.result.status, ExtractionStatus::Ok);
        assert!(extraction.result.errors.is_empty());
        assert_eq!(extraction.result.metadata.page_count, 1);
        assert_eq!(
            extraction.result.metadata.budget_year.value.as_deref(),
            Some("2025")
        );
    }
}
