//! Declarative function catalog offered to the function-calling resolver.

use once_cell::sync::Lazy;
use residencias_llm::FunctionSpec;
use serde_json::{json, Value};

pub static CATALOG: Lazy<Vec<FunctionSpec>> = Lazy::new(build_catalog);

pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    CATALOG.iter().find(|spec| spec.name == name)
}

fn spec(name: &str, description: &str, parameters: Value) -> FunctionSpec {
    FunctionSpec {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    }
}

fn object(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn year_prop() -> Value {
    json!({ "type": "integer", "description": "Calendar year, e.g. 2024. Omit for all years." })
}

fn date_prop(what: &str) -> Value {
    json!({ "type": "string", "description": format!("{what} date as dd/mm/yyyy or yyyy-mm-dd") })
}

fn build_catalog() -> Vec<FunctionSpec> {
    vec![
        spec(
            "invoices_above_amount",
            "List invoices whose total is strictly greater than an amount, with their count and sum.",
            object(
                json!({ "amount": { "type": "string", "description": "Threshold amount, e.g. 1000 or 1.000,50" } }),
                &["amount"],
            ),
        ),
        spec(
            "provider_with_most_contracts",
            "Rank providers by number of contracts and name the one with the most.",
            object(json!({}), &[]),
        ),
        spec(
            "most_recent_invoice",
            "Show the invoice with the latest date.",
            object(json!({}), &[]),
        ),
        spec(
            "spend_in_range",
            "Total spend of invoices dated between two dates, both inclusive.",
            object(
                json!({ "start": date_prop("First"), "end": date_prop("Last") }),
                &["start", "end"],
            ),
        ),
        spec(
            "contracts_expiring_before",
            "List contracts whose expiration date is before a cutoff date.",
            object(json!({ "cutoff": date_prop("Cutoff") }), &["cutoff"]),
        ),
        spec(
            "facility_spend_ranking",
            "Rank residences (facilities) by invoiced spend.",
            object(json!({ "year": year_prop() }), &[]),
        ),
        spec(
            "largest_invoice",
            "Show the invoice with the highest total.",
            object(json!({ "year": year_prop() }), &[]),
        ),
        spec(
            "provider_spend_ranking",
            "Rank providers by invoiced spend, optionally at one facility.",
            object(
                json!({
                    "facility": { "type": "string", "description": "Facility name, e.g. Residencia 1" },
                    "year": year_prop()
                }),
                &[],
            ),
        ),
        spec(
            "facility_summary",
            "Summarize one facility: its contracts, invoices and total spend.",
            object(
                json!({
                    "facility": { "type": "string", "description": "Facility name, e.g. Residencia 1" },
                    "year": year_prop()
                }),
                &["facility"],
            ),
        ),
        spec(
            "spend_with_provider",
            "Total spend with every provider whose name contains the given text.",
            object(
                json!({
                    "provider": { "type": "string", "description": "Provider name or part of it" },
                    "year": year_prop()
                }),
                &["provider"],
            ),
        ),
        spec(
            "provider_contracts",
            "List contracts held by providers whose name contains the given text.",
            object(
                json!({ "provider": { "type": "string", "description": "Provider name or part of it" } }),
                &["provider"],
            ),
        ),
        spec(
            "top_invoices",
            "List the invoices with the highest totals.",
            object(
                json!({
                    "limit": { "type": "integer", "description": "How many invoices to list (default 5)" },
                    "year": year_prop()
                }),
                &[],
            ),
        ),
        spec(
            "concept_ranking",
            "Rank invoice concepts (what was billed) by spend.",
            object(json!({ "year": year_prop() }), &[]),
        ),
        spec(
            "monthly_spend",
            "Spend per calendar month, in chronological order.",
            object(json!({ "year": year_prop() }), &[]),
        ),
        spec(
            "total_for_year",
            "Total spend and number of invoices in one year.",
            object(json!({ "year": year_prop() }), &["year"]),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{Intent, INTENT_NAMES};

    #[test]
    fn catalog_covers_every_intent_once() {
        let names: Vec<&str> = CATALOG.iter().map(|spec| spec.name.as_str()).collect();
        assert_eq!(names, INTENT_NAMES.to_vec());
        for spec in CATALOG.iter() {
            assert!(Intent::from_call(&spec.name, &json!({})).is_ok());
            assert_eq!(spec.parameters["type"], "object");
        }
    }

    #[test]
    fn required_parameters_are_declared() {
        let spec = lookup("spend_in_range").unwrap();
        assert_eq!(spec.parameters["required"], json!(["start", "end"]));
        assert!(lookup("unknown").is_none());
    }
}
