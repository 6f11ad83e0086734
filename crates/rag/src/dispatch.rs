use residencias_core::report::{self, Report};
use residencias_core::Dataset;
use serde_json::Value;
use tracing::debug;

use crate::intent::{Intent, IntentError};

pub fn dispatch(intent: &Intent, ds: &Dataset) -> Report {
    debug!(intent = intent.name(), "dispatching");
    match intent {
        Intent::InvoicesAboveAmount { amount } => {
            report::invoices_above_amount(ds, amount.as_deref())
        }
        Intent::ProviderWithMostContracts => report::provider_with_most_contracts(ds),
        Intent::MostRecentInvoice => report::most_recent_invoice(ds),
        Intent::SpendInRange { start, end } => {
            report::spend_in_range(ds, start.as_deref(), end.as_deref())
        }
        Intent::ContractsExpiringBefore { cutoff } => {
            report::contracts_expiring_before(ds, cutoff.as_deref())
        }
        Intent::FacilitySpendRanking { year } => report::facility_spend_ranking(ds, *year),
        Intent::LargestInvoice { year } => report::largest_invoice(ds, *year),
        Intent::ProviderSpendRanking { facility, year } => {
            report::provider_spend_ranking(ds, facility.as_deref(), *year)
        }
        Intent::FacilitySummary { facility, year } => {
            report::facility_summary(ds, facility.as_deref(), *year)
        }
        Intent::SpendWithProvider { provider, year } => {
            report::spend_with_provider(ds, provider.as_deref(), *year)
        }
        Intent::ProviderContracts { provider } => {
            report::provider_contracts(ds, provider.as_deref())
        }
        Intent::TopInvoices { limit, year } => report::top_invoices(ds, *limit, *year),
        Intent::ConceptRanking { year } => report::concept_ranking(ds, *year),
        Intent::MonthlySpend { year } => report::monthly_spend(ds, *year),
        Intent::TotalForYear { year } => report::total_for_year(ds, *year),
    }
}

/// Entry point for a function name plus JSON parameters. Unknown names get the fixed apology.
pub fn dispatch_named(name: &str, params: &Value, ds: &Dataset) -> Report {
    match Intent::from_call(name, params) {
        Ok(intent) => dispatch(&intent, ds),
        Err(IntentError::UnknownFunction(_)) => Report::unrecognized(),
        Err(err) => Report::invalid_input(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use residencias_core::{MemoryBackend, ReportKind, Table};
    use serde_json::json;

    fn dataset() -> Dataset {
        let backend = MemoryBackend::new()
            .with_table(
                Table::Providers,
                vec![json!({"id": 1, "nombre_proveedor": "Acme"})],
            )
            .with_table(
                Table::Contracts,
                vec![json!({"id": 10, "proveedor_id": 1, "centro": "Residencia 1"})],
            )
            .with_table(
                Table::Invoices,
                vec![json!({
                    "id": 100,
                    "contrato_id": 10,
                    "total": "150.50",
                    "fecha_factura": "2024-03-15"
                })],
            );
        Dataset::load(&backend)
    }

    #[test]
    fn facility_ranking_scenario() {
        let ds = dataset();
        let report = dispatch(&Intent::FacilitySpendRanking { year: Some(2024) }, &ds);
        assert_eq!(report.kind, ReportKind::Answer);
        assert!(report.text.contains("1. Residencia 1: 150.50"), "{}", report.text);
    }

    #[test]
    fn range_without_matches_is_no_data() {
        let ds = dataset();
        let report = dispatch(
            &Intent::SpendInRange {
                start: Some("01/01/2023".to_string()),
                end: Some("31/12/2023".to_string()),
            },
            &ds,
        );
        assert_eq!(report.kind, ReportKind::NoData);
        assert!(report.text.contains("No invoices in range"));
        assert!(report.text.contains("0.00"));
    }

    #[test]
    fn threshold_above_everything() {
        let ds = dataset();
        let report = dispatch_named("invoices_above_amount", &json!({"amount": 1000}), &ds);
        assert_eq!(report.kind, ReportKind::NoData);
        assert!(report.text.contains("No invoices found"));
    }

    #[test]
    fn named_dispatch_edge_cases() {
        let ds = dataset();
        assert_eq!(
            dispatch_named("drop_tables", &json!({}), &ds).kind,
            ReportKind::Unrecognized
        );
        assert_eq!(
            dispatch_named("total_for_year", &json!({"year": "soon"}), &ds).kind,
            ReportKind::InvalidInput
        );
        assert_eq!(
            dispatch_named("total_for_year", &json!({}), &ds).kind,
            ReportKind::MissingParameter
        );
        let params = json!({"start": "yesterday", "end": "31/12/2024"});
        assert_eq!(
            dispatch_named("spend_in_range", &params, &ds).kind,
            ReportKind::InvalidInput
        );
    }
}
