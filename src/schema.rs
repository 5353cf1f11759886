use serde::{Deserialize, Serialize};
use std::fmt;

/// Page number and verbatim line a value was parsed from. Immutable once
/// attached to a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub page: usize,
    pub line_text: String,
}

impl Provenance {
    pub fn new(page: usize, line_text: &str) -> Self {
        Self {
            page,
            line_text: line_text.trim().to_string(),
        }
    }
}

/// Why a field carries no document-derived value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullReason {
    NotExtracted,
    MissingAmount,
    ParentNotFound,
    /// The value was derived from the source file name, not the document.
    FromFilename,
}

/// Uniform carrier for every extracted value: either a populated value with
/// provenance, or a null with a machine-readable reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField<T> {
    pub value: Option<T>,
    pub reason: Option<NullReason>,
    pub provenance: Vec<Provenance>,
}

impl<T> ExtractedField<T> {
    pub fn with_value(value: T) -> Self {
        Self {
            value: Some(value),
            reason: None,
            provenance: Vec::new(),
        }
    }

    pub fn with_provenance(value: T, provenance: Vec<Provenance>) -> Self {
        Self {
            value: Some(value),
            reason: None,
            provenance,
        }
    }

    pub fn null(reason: NullReason) -> Self {
        Self {
            value: None,
            reason: Some(reason),
            provenance: Vec::new(),
        }
    }

    /// A populated value sourced from the file name; carries no provenance.
    pub fn from_filename(value: T) -> Self {
        Self {
            value: Some(value),
            reason: Some(NullReason::FromFilename),
            provenance: Vec::new(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }
}

impl<T: Copy> ExtractedField<T> {
    pub fn get(&self) -> Option<T> {
        self.value
    }
}

/// Closed administrative column vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalLabel {
    Personnel,
    Overhead,
    TotalRecurrent,
    Capital,
    TotalExpenditure,
    Recurrent,
    Development,
    Other,
    FederationAccountRevenues,
    IndependentRevenue,
    AidsAndGrants,
    CapitalDevelopmentFundReceipts,
    TotalRevenue,
}

impl CanonicalLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalLabel::Personnel => "personnel",
            CanonicalLabel::Overhead => "overhead",
            CanonicalLabel::TotalRecurrent => "total_recurrent",
            CanonicalLabel::Capital => "capital",
            CanonicalLabel::TotalExpenditure => "total_expenditure",
            CanonicalLabel::Recurrent => "recurrent",
            CanonicalLabel::Development => "development",
            CanonicalLabel::Other => "other",
            CanonicalLabel::FederationAccountRevenues => "federation_account_revenues",
            CanonicalLabel::IndependentRevenue => "independent_revenue",
            CanonicalLabel::AidsAndGrants => "aids_and_grants",
            CanonicalLabel::CapitalDevelopmentFundReceipts => "capital_development_fund_receipts",
            CanonicalLabel::TotalRevenue => "total_revenue",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "personnel" => CanonicalLabel::Personnel,
            "overhead" => CanonicalLabel::Overhead,
            "total_recurrent" => CanonicalLabel::TotalRecurrent,
            "capital" => CanonicalLabel::Capital,
            "total_expenditure" => CanonicalLabel::TotalExpenditure,
            "recurrent" => CanonicalLabel::Recurrent,
            "development" => CanonicalLabel::Development,
            "other" => CanonicalLabel::Other,
            "federation_account_revenues" => CanonicalLabel::FederationAccountRevenues,
            "independent_revenue" => CanonicalLabel::IndependentRevenue,
            "aids_and_grants" => CanonicalLabel::AidsAndGrants,
            "capital_development_fund_receipts" => {
                CanonicalLabel::CapitalDevelopmentFundReceipts
            }
            "total_revenue" => CanonicalLabel::TotalRevenue,
            _ => return None,
        })
    }
}

/// Column label: either drawn from the closed vocabulary, a year-bearing
/// period label synthesized from a recognized header (`2025_approved_budget`,
/// `january_to_june`), or a positional `amount_N` fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnLabel {
    Canonical(CanonicalLabel),
    Period(String),
    Synthesized(u32),
}

impl ColumnLabel {
    pub fn period(label: impl Into<String>) -> Self {
        ColumnLabel::Period(label.into())
    }

    pub fn synthesized(n: u32) -> Self {
        ColumnLabel::Synthesized(n)
    }

    /// Stable string form, used both for serialization and keyed lookups.
    pub fn as_key(&self) -> String {
        match self {
            ColumnLabel::Canonical(label) => label.as_str().to_string(),
            ColumnLabel::Period(label) => label.clone(),
            ColumnLabel::Synthesized(n) => format!("amount_{}", n),
        }
    }

    pub fn parse(key: &str) -> Self {
        if let Some(canonical) = CanonicalLabel::from_key(key) {
            return ColumnLabel::Canonical(canonical);
        }
        if let Some(rest) = key.strip_prefix("amount_") {
            if let Ok(n) = rest.parse::<u32>() {
                return ColumnLabel::Synthesized(n);
            }
        }
        ColumnLabel::Period(key.to_string())
    }
}

impl fmt::Display for ColumnLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnLabel::Canonical(label) => f.write_str(label.as_str()),
            ColumnLabel::Period(label) => f.write_str(label),
            ColumnLabel::Synthesized(n) => write!(f, "amount_{}", n),
        }
    }
}

impl Serialize for ColumnLabel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ColumnLabel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        Ok(ColumnLabel::parse(&key))
    }
}

/// Which administrative table a row was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    ExpenditureMda,
    RevenueMda,
    ExpenditureAdmin,
}

impl TableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableType::ExpenditureMda => "expenditure_mda",
            TableType::RevenueMda => "revenue_mda",
            TableType::ExpenditureAdmin => "expenditure_admin",
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountItem {
    pub label: ColumnLabel,
    pub amount: ExtractedField<f64>,
}

impl AmountItem {
    pub fn new(label: ColumnLabel, amount: ExtractedField<f64>) -> Self {
        Self { label, amount }
    }
}

/// Leaf MDA or sub-unit, keyed by (table_type, unit_code).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdministrativeUnit {
    pub parent_code: ExtractedField<String>,
    pub parent_name: ExtractedField<String>,
    pub unit_code: ExtractedField<String>,
    pub unit_name: ExtractedField<String>,
    pub amounts: Vec<AmountItem>,
    pub page: usize,
    pub line_text: String,
    pub table_type: TableType,
}

/// Aggregating row whose code ends in four or more zeros. Parent rows keep
/// null amount items; only leaf rows are dropped on a missing amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentRow {
    pub code: String,
    pub name: String,
    pub amounts: Vec<AmountItem>,
    pub page: usize,
    pub line_text: String,
    pub table_type: TableType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevenueClassification {
    Economic,
    Receipt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueRow {
    pub code: ExtractedField<String>,
    pub category: ExtractedField<String>,
    pub subcategory: ExtractedField<String>,
    pub amount: ExtractedField<f64>,
    pub classification: RevenueClassification,
    pub administrative_code: ExtractedField<String>,
    pub administrative_description: ExtractedField<String>,
    pub fund_code: ExtractedField<String>,
    pub fund_description: ExtractedField<String>,
    pub page: usize,
    pub line_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomicExpenditureRow {
    pub code: ExtractedField<String>,
    pub category: ExtractedField<String>,
    pub subcategory: ExtractedField<String>,
    pub amount: ExtractedField<f64>,
    pub page: usize,
    pub line_text: String,
}

/// MDA rollup: one parent with the administrative units attached under it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdaExpenditureRow {
    pub mda_code: ExtractedField<String>,
    pub mda_name: ExtractedField<String>,
    pub recurrent_amount: ExtractedField<f64>,
    pub capital_amount: ExtractedField<f64>,
    pub total_amount: ExtractedField<f64>,
    pub administrative_units: Vec<AdministrativeUnit>,
    pub page: Option<usize>,
    pub line_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgrammeRow {
    pub sector: ExtractedField<String>,
    pub objective: ExtractedField<String>,
    pub programme_code: ExtractedField<String>,
    pub programme: ExtractedField<String>,
    pub project_name: ExtractedField<String>,
    pub economic_code: ExtractedField<String>,
    pub economic_description: ExtractedField<String>,
    pub function_code: ExtractedField<String>,
    pub function_description: ExtractedField<String>,
    pub location_code: ExtractedField<String>,
    pub location_description: ExtractedField<String>,
    pub amounts: Vec<AmountItem>,
    pub amount_labels: Vec<ColumnLabel>,
    /// The target-year column's value, when the header named one.
    pub amount: ExtractedField<f64>,
    pub funding_source: ExtractedField<String>,
    pub page: usize,
    pub line_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionalRow {
    pub code: String,
    pub description: String,
    pub amount: ExtractedField<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetTotals {
    pub total_budget: ExtractedField<f64>,
    pub capital_expenditure_total: ExtractedField<f64>,
    pub recurrent_expenditure_total: ExtractedField<f64>,
    pub revenue_total: ExtractedField<f64>,
    pub financing_total: ExtractedField<f64>,
    pub budget_summary_text: ExtractedField<String>,
}

impl BudgetTotals {
    pub fn not_extracted() -> Self {
        Self {
            total_budget: ExtractedField::null(NullReason::NotExtracted),
            capital_expenditure_total: ExtractedField::null(NullReason::NotExtracted),
            recurrent_expenditure_total: ExtractedField::null(NullReason::NotExtracted),
            revenue_total: ExtractedField::null(NullReason::NotExtracted),
            financing_total: ExtractedField::null(NullReason::NotExtracted),
            budget_summary_text: ExtractedField::null(NullReason::NotExtracted),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub state_name: ExtractedField<String>,
    pub state_code: ExtractedField<String>,
    pub budget_year: ExtractedField<String>,
    pub document_title: ExtractedField<String>,
    pub source_file_name: String,
    pub page_count: usize,
    pub currency: ExtractedField<String>,
    pub extraction_timestamp: String,
    pub engine_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppropriationLaw {
    pub law_text: ExtractedField<String>,
    pub page_range: ExtractedField<String>,
    pub total_amount: ExtractedField<f64>,
}

impl AppropriationLaw {
    pub fn not_extracted() -> Self {
        Self {
            law_text: ExtractedField::null(NullReason::NotExtracted),
            page_range: ExtractedField::null(NullReason::NotExtracted),
            total_amount: ExtractedField::null(NullReason::NotExtracted),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssumptionRow {
    pub assumption_name: ExtractedField<String>,
    pub value: ExtractedField<String>,
    pub unit: ExtractedField<String>,
    pub page: usize,
    pub line_text: String,
}

/// A reported semantic violation. Layout rejections are silent; these are not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionError {
    pub code: String,
    pub message: String,
}

impl ExtractionError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Ok,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub status: ExtractionStatus,
    pub errors: Vec<ExtractionError>,
    pub metadata: DocumentMetadata,
    pub budget_totals: BudgetTotals,
    pub revenue_breakdown: Vec<RevenueRow>,
    pub expenditure_economic: Vec<EconomicExpenditureRow>,
    pub expenditure_mda: Vec<MdaExpenditureRow>,
    pub administrative_units: Vec<AdministrativeUnit>,
    pub programme_projects: Vec<ProgrammeRow>,
    pub appropriation_law: AppropriationLaw,
    pub assumptions: Vec<AssumptionRow>,
}
