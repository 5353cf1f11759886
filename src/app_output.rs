use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::schema::{
    AdministrativeUnit, AmountItem, EconomicExpenditureRow, ExtractedField, ExtractionResult,
    FunctionalRow, MdaExpenditureRow, ProgrammeRow, RevenueRow,
};
use crate::sections::{classification_scheme, section_order, SectionHit};

/// Flattened, dashboard-facing projection of the extraction result. Fields
/// lose their provenance wrappers; amounts become plain label→value maps.
pub fn build_app_output(
    result: &ExtractionResult,
    functional_rows: &[FunctionalRow],
    sections: &[SectionHit],
) -> Value {
    json!({
        "metadata": flatten_metadata(result),
        "budget_totals": flatten_budget_totals(result),
        "counters": build_counters(result),
        "revenue_breakdown": result.revenue_breakdown.iter().map(flatten_revenue).collect::<Vec<_>>(),
        "expenditure_economic": result.expenditure_economic.iter().map(flatten_economic).collect::<Vec<_>>(),
        "mda": result.expenditure_mda.iter().map(flatten_mda).collect::<Vec<_>>(),
        "administrative_units": result.administrative_units.iter().map(flatten_admin_unit).collect::<Vec<_>>(),
        "programme_projects": result.programme_projects.iter().map(flatten_programme).collect::<Vec<_>>(),
        "sectors": build_sectors(result, functional_rows),
        "sections": {
            "order": section_order(sections),
            "scheme": classification_scheme(sections),
        },
        "errors": result.errors.iter().map(|error| json!({
            "code": error.code,
            "message": error.message,
        })).collect::<Vec<_>>(),
    })
}

fn field_value<T: Serialize>(field: &ExtractedField<T>) -> Value {
    match &field.value {
        Some(value) => json!(value),
        None => Value::Null,
    }
}

fn flatten_metadata(result: &ExtractionResult) -> Value {
    let metadata = &result.metadata;
    json!({
        "state_name": field_value(&metadata.state_name),
        "state_code": field_value(&metadata.state_code),
        "budget_year": field_value(&metadata.budget_year),
        "document_title": field_value(&metadata.document_title),
        "source_file_name": metadata.source_file_name,
        "page_count": metadata.page_count,
        "currency": field_value(&metadata.currency),
        "extraction_timestamp": metadata.extraction_timestamp,
        "engine_version": metadata.engine_version,
    })
}

fn flatten_budget_totals(result: &ExtractionResult) -> Value {
    let totals = &result.budget_totals;
    json!({
        "total_budget": field_value(&totals.total_budget),
        "capital_expenditure_total": field_value(&totals.capital_expenditure_total),
        "recurrent_expenditure_total": field_value(&totals.recurrent_expenditure_total),
        "revenue_total": field_value(&totals.revenue_total),
        "financing_total": field_value(&totals.financing_total),
        "budget_summary_text": field_value(&totals.budget_summary_text),
    })
}

fn flatten_amounts(items: &[AmountItem]) -> Value {
    let mut map = Map::new();
    for item in items {
        map.insert(item.label.as_key(), field_value(&item.amount));
    }
    Value::Object(map)
}

fn flatten_admin_unit(unit: &AdministrativeUnit) -> Value {
    json!({
        "parent_code": field_value(&unit.parent_code),
        "parent_name": field_value(&unit.parent_name),
        "unit_code": field_value(&unit.unit_code),
        "unit_name": field_value(&unit.unit_name),
        "amounts": flatten_amounts(&unit.amounts),
        "page": unit.page,
        "line_text": unit.line_text,
        "table_type": unit.table_type,
    })
}

fn flatten_mda(mda: &MdaExpenditureRow) -> Value {
    json!({
        "mda_code": field_value(&mda.mda_code),
        "mda_name": field_value(&mda.mda_name),
        "recurrent_amount": field_value(&mda.recurrent_amount),
        "capital_amount": field_value(&mda.capital_amount),
        "total_amount": field_value(&mda.total_amount),
        "administrative_units": mda.administrative_units.iter().map(flatten_admin_unit).collect::<Vec<_>>(),
        "page": mda.page,
        "line_text": mda.line_text,
    })
}

fn flatten_revenue(row: &RevenueRow) -> Value {
    json!({
        "code": field_value(&row.code),
        "category": field_value(&row.category),
        "subcategory": field_value(&row.subcategory),
        "amount": field_value(&row.amount),
        "classification": row.classification,
        "administrative_code": field_value(&row.administrative_code),
        "administrative_description": field_value(&row.administrative_description),
        "fund_code": field_value(&row.fund_code),
        "fund_description": field_value(&row.fund_description),
        "page": row.page,
        "line_text": row.line_text,
    })
}

fn flatten_economic(row: &EconomicExpenditureRow) -> Value {
    json!({
        "code": field_value(&row.code),
        "category": field_value(&row.category),
        "subcategory": field_value(&row.subcategory),
        "amount": field_value(&row.amount),
        "page": row.page,
        "line_text": row.line_text,
    })
}

fn flatten_programme(row: &ProgrammeRow) -> Value {
    json!({
        "sector": field_value(&row.sector),
        "objective": field_value(&row.objective),
        "programme_code": field_value(&row.programme_code),
        "programme": field_value(&row.programme),
        "project_name": field_value(&row.project_name),
        "economic_code": field_value(&row.economic_code),
        "economic_description": field_value(&row.economic_description),
        "function_code": field_value(&row.function_code),
        "function_description": field_value(&row.function_description),
        "location_code": field_value(&row.location_code),
        "location_description": field_value(&row.location_description),
        "amount": field_value(&row.amount),
        "amounts": flatten_amounts(&row.amounts),
        "amount_labels": row.amount_labels,
        "funding_source": field_value(&row.funding_source),
        "page": row.page,
        "line_text": row.line_text,
    })
}

fn build_counters(result: &ExtractionResult) -> Value {
    let totals = &result.budget_totals;
    json!({
        "total_budget": field_value(&totals.total_budget),
        "capital_expenditure_total": field_value(&totals.capital_expenditure_total),
        "recurrent_expenditure_total": field_value(&totals.recurrent_expenditure_total),
        "revenue_total": field_value(&totals.revenue_total),
        "financing_total": field_value(&totals.financing_total),
        "igr_total": match compute_igr(result) {
            Some(total) => json!(total),
            None => Value::Null,
        },
    })
}

/// Internally generated revenue: revenue rows whose category or subcategory
/// names IGR, independent or internally generated sources.
fn compute_igr(result: &ExtractionResult) -> Option<f64> {
    let mut candidates: Vec<f64> = Vec::new();
    for row in &result.revenue_breakdown {
        let name = format!(
            "{} {}",
            row.category.value().map(String::as_str).unwrap_or(""),
            row.subcategory.value().map(String::as_str).unwrap_or("")
        )
        .to_lowercase();
        if name.contains("igr") || name.contains("independent") || name.contains("internally") {
            if let Some(amount) = row.amount.get() {
                candidates.push(amount);
            }
        }
    }
    if candidates.is_empty() {
        None
    } else {
        Some(candidates.iter().sum())
    }
}

fn build_sectors(result: &ExtractionResult, functional_rows: &[FunctionalRow]) -> Value {
    if !functional_rows.is_empty() {
        let sectors: Vec<Value> = functional_rows
            .iter()
            .filter_map(|row| {
                row.amount.get().map(|amount| {
                    json!({
                        "name": row.description,
                        "amount": amount,
                        "row_count": 1,
                        "source": "functional_classification",
                    })
                })
            })
            .collect();
        return Value::Array(sectors);
    }

    let mut sector_totals: BTreeMap<String, f64> = BTreeMap::new();
    let mut row_counts: BTreeMap<String, usize> = BTreeMap::new();
    for row in &result.programme_projects {
        let Some(amount) = row.amount.get() else {
            continue;
        };
        let sector_name = sector_from_function(
            row.function_code.value().map(String::as_str),
            row.function_description.value().map(String::as_str),
        );
        *sector_totals.entry(sector_name.clone()).or_insert(0.0) += amount;
        *row_counts.entry(sector_name).or_insert(0) += 1;
    }

    let sectors: Vec<Value> = sector_totals
        .iter()
        .map(|(name, total)| {
            json!({
                "name": name,
                "amount": total,
                "row_count": row_counts[name],
                "source": "programme_function",
            })
        })
        .collect();
    Value::Array(sectors)
}

/// COFOG-style two-digit prefixes, with a keyword fallback on the function
/// description.
fn sector_from_function(function_code: Option<&str>, function_desc: Option<&str>) -> String {
    if let Some(code) = function_code {
        let sector = match code.get(..2) {
            Some("70") => Some("General Public Services"),
            Some("71") => Some("Defense/Public Order"),
            Some("72") => Some("Economic Affairs"),
            Some("73") => Some("Environment"),
            Some("74") => Some("Housing/Community Amenities"),
            Some("75") => Some("Health"),
            Some("76") => Some("Recreation/Culture/Religion"),
            Some("77") => Some("Education"),
            Some("78") => Some("Social Protection"),
            _ => None,
        };
        if let Some(sector) = sector {
            return sector.to_string();
        }
    }

    let Some(desc) = function_desc else {
        return "Other".to_string();
    };
    let text = desc.to_lowercase();
    let mapping: [(&str, &[&str]); 13] = [
        ("Education", &["education", "school", "secondary", "primary"]),
        ("Health", &["health", "hospital", "medical"]),
        ("Agriculture", &["agriculture", "fisher", "livestock"]),
        ("Water", &["water", "sanitation"]),
        ("Transport", &["transport", "road", "rail", "aviation"]),
        ("Energy", &["energy", "power", "electric"]),
        ("Environment", &["environment", "climate", "waste"]),
        ("Housing", &["housing", "community amenities"]),
        (
            "Social Protection",
            &["social protection", "welfare", "poverty"],
        ),
        (
            "Defense/Public Order",
            &["security", "public order", "safety", "defence"],
        ),
        (
            "Economic Affairs",
            &["economic affairs", "commerce", "industry", "labour"],
        ),
        (
            "General Public Services",
            &["general services", "administration", "legislature"],
        ),
        ("Recreation/Culture", &["recreation", "culture", "religion"]),
    ];
    for (sector, keywords) in mapping {
        if keywords.iter().any(|keyword| text.contains(keyword)) {
            return sector.to_string();
        }
    }
    "Other".to_string()
}
