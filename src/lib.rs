//! # Budget Table Engine
//!
//! A library for recovering structured budget tables from the text-layout
//! rendering of Nigerian state budget PDFs (one page per form-feed, columns
//! separated by runs of two or more spaces) and cross-checking every total
//! they contain.
//!
//! ## Core Concepts
//!
//! - **Pages**: the layout-preserved text, split on form-feed separators
//! - **Header context**: the labels a table's multi-line header declares for
//!   its amount columns, and which column belongs to the target year
//! - **Extracted field**: every parsed value carries its provenance (page and
//!   verbatim line) or a machine-readable null reason
//! - **Reconciliation**: parent codes must equal the sum of their children,
//!   and the summary totals must equal the leaf sums of the detail tables,
//!   within an absolute tolerance of 1.0
//!
//! ## Example
//!
//! ```rust
//! use budget_table_engine::*;
//!
//! let text = "Approved Budget Summary\n\
//!             Item    2024 Approved Budget    2025 Approved Budget\n\
//!             Total Expenditure    90,000,000    100,000,000\n\
//!             Recurrent Expenditure    50,000,000    60,000,000\n\
//!             Capital Expenditure    40,000,000    40,000,000\n";
//! let pages = split_pages(text);
//!
//! let extraction = extract_budget_document(&pages, "Adamawa_2025.pdf", 1);
//! assert_eq!(
//!     extraction.result.budget_totals.total_budget.get(),
//!     Some(100_000_000.0)
//! );
//! ```

pub mod admin_units;
pub mod app_output;
pub mod economic;
pub mod error;
pub mod functional;
pub mod headers;
pub mod lex;
pub mod metadata;
pub mod metrics;
pub mod pipeline;
pub mod programme;
pub mod receipts;
pub mod review;
pub mod schema;
pub mod sections;
pub mod summary;
pub mod text;
pub mod validate;

pub use admin_units::{extract_admin_units, AdminExtraction};
pub use app_output::build_app_output;
pub use economic::{extract_economic_rows, EconomicConflict, EconomicExtraction, EconomicSection};
pub use error::{EngineError, Result};
pub use functional::extract_functional_classification;
pub use headers::{infer_period_labels, select_target_label};
pub use lex::{has_alpha, parse_amount, split_columns};
pub use metadata::extract_metadata;
pub use metrics::{compute_page_metrics, PageMetrics};
pub use pipeline::{
    build_mda_groups, extract_document, run_pipeline, DocumentExtraction, ENGINE_VERSION,
};
pub use programme::{amounts_by_programme, extract_programme_projects};
pub use receipts::extract_receipts;
pub use review::build_review_report;
pub use schema::*;
pub use sections::{detect_sections, SectionHit};
pub use summary::{extract_budget_summary, SummaryExtraction};
pub use text::split_pages;
pub use validate::{ValidationError, TOLERANCE};

use std::path::{Path, PathBuf};

pub struct BudgetExtractor;

impl BudgetExtractor {
    /// Runs every extraction stage over page-split text and returns the
    /// composed result with its side tables.
    pub fn extract(pages: &[String], file_name: &str, page_count: usize) -> DocumentExtraction {
        pipeline::extract_document(pages, file_name, page_count)
    }

    /// Converts a PDF, extracts it, and writes the artifact set into the
    /// output directory.
    pub fn run(pdf_path: &Path, output_dir: &Path, overwrite: bool) -> Result<PathBuf> {
        pipeline::run_pipeline(pdf_path, output_dir, overwrite)
    }
}

pub fn extract_budget_document(
    pages: &[String],
    file_name: &str,
    page_count: usize,
) -> DocumentExtraction {
    BudgetExtractor::extract(pages, file_name, page_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_to_end_extraction() {
        let text = [
            // page 1: summary
            "ADAMAWA STATE 2025 Approved Budget\n\
             Approved Budget Summary\n\
             Item    2024 Approved Budget    2025 Approved Budget\n\
             Total Revenue           90,000,000    100,000,000\n\
             Total Expenditure       90,000,000    100,000,000\n\
             Recurrent Expenditure   50,000,000     60,000,000\n\
             Capital Expenditure     40,000,000     40,000,000",
            // page 2: expenditure by MDA; the single MDA carries the whole
            // budget so the global rollup reconciles
            "Expenditure by MDA\n\
             Code         Administrative Unit              Personnel      Overhead   Total Recurrent     Capital   Total Expenditure\n\
             021500000000  Education Sector   50,000,000   10,000,000   60,000,000   40,000,000   100,000,000\n\
             021500100  Ministry of Education   50,000,000   10,000,000   60,000,000   40,000,000   100,000,000",
            // page 3: economic expenditure
            "Expenditure by Economic Classification\n\
             Code     Economic Description        2024 Approved Budget    2025 Approved Budget\n\
             2          Total Expenditure              90,000,000    100,000,000\n\
             21         Personnel Cost                 50,000,000     60,000,000\n\
             22         Other Recurrent Costs          40,000,000     40,000,000",
        ]
        .join("\u{000C}");

        let pages = split_pages(&text);
        assert_eq!(pages.len(), 3);

        let extraction = extract_budget_document(&pages, "Adamawa_2025.pdf", 3);
        let result = &extraction.result;

        assert_eq!(result.status, ExtractionStatus::Ok);
        assert!(result.errors.is_empty(), "errors: {:?}", result.errors);

        assert_eq!(result.budget_totals.total_budget.get(), Some(100_000_000.0));
        assert_eq!(
            result.metadata.state_name.value.as_deref(),
            Some("Adamawa")
        );
        assert_eq!(result.metadata.budget_year.value.as_deref(), Some("2025"));

        assert_eq!(result.administrative_units.len(), 1);
        assert_eq!(result.expenditure_mda.len(), 1);
        assert_eq!(
            result.expenditure_mda[0].total_amount.get(),
            Some(100_000_000.0)
        );

        // leaf sum 21 + 22 = 100,000,000 matches the summary total
        assert_eq!(result.expenditure_economic.len(), 3);
    }

    #[test]
    fn test_end_to_end_reports_reconciliation_failures() {
        let text = [
            "Approved Budget Summary\n\
             Item    2024 Approved Budget    2025 Approved Budget\n\
             Total Expenditure       90,000,000    100,000,000\n\
             Recurrent Expenditure   50,000,000     60,000,000\n\
             Capital Expenditure     40,000,000     45,000,000",
        ]
        .join("\u{000C}");

        let pages = split_pages(&text);
        let extraction = extract_budget_document(&pages, "Adamawa_2025.pdf", 1);
        let result = &extraction.result;

        assert_eq!(result.status, ExtractionStatus::Failed);
        assert!(result
            .errors
            .iter()
            .any(|e| e.code == "budget_totals_mismatch"));
    }
}
