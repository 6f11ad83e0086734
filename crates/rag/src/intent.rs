use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A recognized question. User-typed values stay raw so the report layer can tell a malformed
/// filter from an empty result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    InvoicesAboveAmount {
        amount: Option<String>,
    },
    ProviderWithMostContracts,
    MostRecentInvoice,
    SpendInRange {
        start: Option<String>,
        end: Option<String>,
    },
    ContractsExpiringBefore {
        cutoff: Option<String>,
    },
    FacilitySpendRanking {
        year: Option<i32>,
    },
    LargestInvoice {
        year: Option<i32>,
    },
    ProviderSpendRanking {
        facility: Option<String>,
        year: Option<i32>,
    },
    FacilitySummary {
        facility: Option<String>,
        year: Option<i32>,
    },
    SpendWithProvider {
        provider: Option<String>,
        year: Option<i32>,
    },
    ProviderContracts {
        provider: Option<String>,
    },
    TopInvoices {
        limit: Option<usize>,
        year: Option<i32>,
    },
    ConceptRanking {
        year: Option<i32>,
    },
    MonthlySpend {
        year: Option<i32>,
    },
    TotalForYear {
        year: Option<i32>,
    },
}

#[derive(Debug, Error)]
pub enum IntentError {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("invalid arguments for {name}: {source}")]
    InvalidArguments {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

pub const INTENT_NAMES: [&str; 15] = [
    "invoices_above_amount",
    "provider_with_most_contracts",
    "most_recent_invoice",
    "spend_in_range",
    "contracts_expiring_before",
    "facility_spend_ranking",
    "largest_invoice",
    "provider_spend_ranking",
    "facility_summary",
    "spend_with_provider",
    "provider_contracts",
    "top_invoices",
    "concept_ranking",
    "monthly_spend",
    "total_for_year",
];

const TEXT_ARGS: [&str; 6] = ["amount", "start", "end", "cutoff", "facility", "provider"];
const NUMBER_ARGS: [&str; 2] = ["year", "limit"];

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::InvoicesAboveAmount { .. } => "invoices_above_amount",
            Intent::ProviderWithMostContracts => "provider_with_most_contracts",
            Intent::MostRecentInvoice => "most_recent_invoice",
            Intent::SpendInRange { .. } => "spend_in_range",
            Intent::ContractsExpiringBefore { .. } => "contracts_expiring_before",
            Intent::FacilitySpendRanking { .. } => "facility_spend_ranking",
            Intent::LargestInvoice { .. } => "largest_invoice",
            Intent::ProviderSpendRanking { .. } => "provider_spend_ranking",
            Intent::FacilitySummary { .. } => "facility_summary",
            Intent::SpendWithProvider { .. } => "spend_with_provider",
            Intent::ProviderContracts { .. } => "provider_contracts",
            Intent::TopInvoices { .. } => "top_invoices",
            Intent::ConceptRanking { .. } => "concept_ranking",
            Intent::MonthlySpend { .. } => "monthly_spend",
            Intent::TotalForYear { .. } => "total_for_year",
        }
    }

    /// Decodes a function name plus JSON arguments, as chosen by a function-calling model.
    /// Numbers sent for text parameters and numeric strings sent for `year`/`limit` are coerced;
    /// null or absent parameters become `None`.
    pub fn from_call(name: &str, arguments: &Value) -> Result<Intent, IntentError> {
        if !INTENT_NAMES.contains(&name) {
            return Err(IntentError::UnknownFunction(name.to_string()));
        }
        let mut object = Map::new();
        if let Value::Object(args) = arguments {
            for (key, value) in args {
                object.insert(key.clone(), coerce_argument(key, value));
            }
        }
        object.insert("intent".to_string(), Value::String(name.to_string()));
        serde_json::from_value(Value::Object(object)).map_err(|source| {
            IntentError::InvalidArguments {
                name: name.to_string(),
                source,
            }
        })
    }
}

fn coerce_argument(key: &str, value: &Value) -> Value {
    match value {
        Value::Number(number) if TEXT_ARGS.contains(&key) => Value::String(number.to_string()),
        Value::String(text) if NUMBER_ARGS.contains(&key) => match text.trim().parse::<i64>() {
            Ok(parsed) => Value::from(parsed),
            Err(_) if text.trim().is_empty() => Value::Null,
            Err(_) => value.clone(),
        },
        Value::String(text) if text.trim().is_empty() => Value::Null,
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_round_trip_through_from_call() {
        for name in INTENT_NAMES {
            let intent = Intent::from_call(name, &json!({})).unwrap();
            assert_eq!(intent.name(), name);
        }
    }

    #[test]
    fn arguments_are_coerced() {
        let intent = Intent::from_call("invoices_above_amount", &json!({"amount": 1000})).unwrap();
        assert_eq!(
            intent,
            Intent::InvoicesAboveAmount {
                amount: Some("1000".to_string())
            }
        );
        let intent =
            Intent::from_call("top_invoices", &json!({"limit": "3", "year": 2024})).unwrap();
        assert_eq!(
            intent,
            Intent::TopInvoices {
                limit: Some(3),
                year: Some(2024)
            }
        );
        let intent = Intent::from_call("total_for_year", &json!({"year": ""})).unwrap();
        assert_eq!(intent, Intent::TotalForYear { year: None });
    }

    #[test]
    fn unknown_and_malformed_calls_fail() {
        assert!(matches!(
            Intent::from_call("delete_everything", &json!({})),
            Err(IntentError::UnknownFunction(_))
        ));
        assert!(matches!(
            Intent::from_call("total_for_year", &json!({"year": "last"})),
            Err(IntentError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn serializes_with_tag() {
        let value = serde_json::to_value(Intent::ProviderSpendRanking {
            facility: None,
            year: Some(2024),
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"intent": "provider_spend_ranking", "facility": null, "year": 2024})
        );
    }
}
