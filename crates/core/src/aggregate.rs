//! Typed aggregations over an in-memory [`Dataset`].
//!
//! Rankings group with an ordered map and then sort by total with a stable sort, so ties keep
//! key order and repeated calls return identical output.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::model::{Contract, Dataset, Invoice, Provider};
use crate::parse::normalize_key;

pub const DEFAULT_TOP_N: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankEntry {
    pub key: String,
    pub total: Decimal,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpendTotal {
    pub total: Decimal,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSpend {
    pub providers: Vec<String>,
    pub total: Decimal,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct FacilitySummary<'a> {
    pub contracts: Vec<&'a Contract>,
    pub invoices: Vec<&'a Invoice>,
    pub total: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub providers: usize,
    pub contracts: usize,
    pub invoices: usize,
    pub total_invoiced: Decimal,
    pub total_contracted: Decimal,
}

pub fn in_year(invoice: &Invoice, year: Option<i32>) -> bool {
    match year {
        None => true,
        Some(year) => invoice.date.map(|date| date.year() == year).unwrap_or(false),
    }
}

fn label(value: &str, empty: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        empty.to_string()
    } else {
        trimmed.to_string()
    }
}

fn group_totals<'a, I, F>(invoices: I, key: F) -> BTreeMap<String, SpendTotal>
where
    I: IntoIterator<Item = &'a Invoice>,
    F: Fn(&'a Invoice) -> Option<String>,
{
    let mut groups: BTreeMap<String, SpendTotal> = BTreeMap::new();
    for invoice in invoices {
        if let Some(group) = key(invoice) {
            let entry = groups.entry(group).or_default();
            entry.total += invoice.total;
            entry.count += 1;
        }
    }
    groups
}

fn into_entries(groups: BTreeMap<String, SpendTotal>) -> Vec<RankEntry> {
    groups
        .into_iter()
        .map(|(key, spend)| RankEntry {
            key,
            total: spend.total,
            count: spend.count,
        })
        .collect()
}

fn ranked(groups: BTreeMap<String, SpendTotal>) -> Vec<RankEntry> {
    let mut entries = into_entries(groups);
    entries.sort_by(|a, b| b.total.cmp(&a.total));
    entries
}

pub fn spend_by_facility(ds: &Dataset, year: Option<i32>) -> Vec<RankEntry> {
    let invoices = ds.invoices.iter().filter(|inv| in_year(inv, year));
    ranked(group_totals(invoices, |inv| {
        ds.contract_of(inv)
            .map(|contract| label(&contract.facility, "(no facility)"))
    }))
}

pub fn spend_by_provider(
    ds: &Dataset,
    facility: Option<&str>,
    year: Option<i32>,
) -> Vec<RankEntry> {
    let wanted = facility.map(normalize_key);
    let invoices = ds.invoices.iter().filter(|inv| in_year(inv, year));
    ranked(group_totals(invoices, |inv| {
        let contract = ds.contract_of(inv)?;
        if let Some(wanted) = &wanted {
            if normalize_key(&contract.facility) != *wanted {
                return None;
            }
        }
        ds.provider_of(contract)
            .map(|provider| label(&provider.name, "(unnamed provider)"))
    }))
}

pub fn spend_by_concept(ds: &Dataset, year: Option<i32>) -> Vec<RankEntry> {
    let invoices = ds.invoices.iter().filter(|inv| in_year(inv, year));
    ranked(group_totals(invoices, |inv| {
        Some(label(&inv.concept, "(no concept)"))
    }))
}

pub fn spend_by_contract(ds: &Dataset) -> Vec<RankEntry> {
    ranked(group_totals(&ds.invoices, |inv| {
        inv.contract_id.map(|id| format!("contract {id}"))
    }))
}

/// Chronological `YYYY-MM` buckets; undated invoices are left out.
pub fn spend_by_month(ds: &Dataset, year: Option<i32>) -> Vec<RankEntry> {
    let invoices = ds.invoices.iter().filter(|inv| in_year(inv, year));
    into_entries(group_totals(invoices, |inv| {
        inv.date.map(|date| date.format("%Y-%m").to_string())
    }))
}

/// Providers ranked by number of contracts; `total` carries the summed contract amounts.
pub fn contracts_per_provider(ds: &Dataset) -> Vec<RankEntry> {
    let mut groups: BTreeMap<String, SpendTotal> = BTreeMap::new();
    for contract in &ds.contracts {
        if let Some(provider) = ds.provider_of(contract) {
            let entry = groups
                .entry(label(&provider.name, "(unnamed provider)"))
                .or_default();
            entry.total += contract.amount;
            entry.count += 1;
        }
    }
    let mut entries = into_entries(groups);
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    entries
}

fn by_total_desc<'a>(mut invoices: Vec<&'a Invoice>) -> Vec<&'a Invoice> {
    invoices.sort_by(|a, b| b.total.cmp(&a.total));
    invoices
}

pub fn invoices_above(ds: &Dataset, threshold: Decimal) -> Vec<&Invoice> {
    by_total_desc(
        ds.invoices
            .iter()
            .filter(|inv| inv.total > threshold)
            .collect(),
    )
}

pub fn top_invoices(ds: &Dataset, limit: usize, year: Option<i32>) -> Vec<&Invoice> {
    let mut invoices = by_total_desc(ds.invoices.iter().filter(|inv| in_year(inv, year)).collect());
    invoices.truncate(limit);
    invoices
}

/// First invoice holding the maximum total.
pub fn largest_invoice(ds: &Dataset, year: Option<i32>) -> Option<&Invoice> {
    ds.invoices
        .iter()
        .filter(|inv| in_year(inv, year))
        .fold(None, |best: Option<&Invoice>, inv| match best {
            Some(current) if current.total >= inv.total => Some(current),
            _ => Some(inv),
        })
}

/// First invoice holding the latest valid date.
pub fn most_recent_invoice(ds: &Dataset) -> Option<&Invoice> {
    ds.invoices
        .iter()
        .filter(|inv| inv.date.is_some())
        .fold(None, |best: Option<&Invoice>, inv| match best {
            Some(current) if current.date >= inv.date => Some(current),
            _ => Some(inv),
        })
}

/// Invoices dated within `[start, end]`, both ends included.
pub fn spend_between(ds: &Dataset, start: NaiveDate, end: NaiveDate) -> SpendTotal {
    ds.invoices
        .iter()
        .filter(|inv| inv.date.map(|d| d >= start && d <= end).unwrap_or(false))
        .fold(SpendTotal::default(), |mut acc, inv| {
            acc.total += inv.total;
            acc.count += 1;
            acc
        })
}

pub fn spend_in_year(ds: &Dataset, year: i32) -> SpendTotal {
    ds.invoices
        .iter()
        .filter(|inv| in_year(inv, Some(year)))
        .fold(SpendTotal::default(), |mut acc, inv| {
            acc.total += inv.total;
            acc.count += 1;
            acc
        })
}

/// Contracts expiring strictly before `cutoff`, soonest first. Undated contracts never match.
pub fn contracts_expiring_before(ds: &Dataset, cutoff: NaiveDate) -> Vec<&Contract> {
    let mut contracts: Vec<&Contract> = ds
        .contracts
        .iter()
        .filter(|c| c.expiration_date.map(|d| d < cutoff).unwrap_or(false))
        .collect();
    contracts.sort_by_key(|c| c.expiration_date);
    contracts
}

/// Every provider whose name contains `needle`, ignoring case, accents and spacing.
pub fn matching_providers<'a>(ds: &'a Dataset, needle: &str) -> Vec<&'a Provider> {
    let needle = normalize_key(needle);
    if needle.is_empty() {
        return Vec::new();
    }
    ds.providers
        .iter()
        .filter(|provider| normalize_key(&provider.name).contains(&needle))
        .collect()
}

pub fn spend_with_providers(ds: &Dataset, needle: &str, year: Option<i32>) -> ProviderSpend {
    let providers = matching_providers(ds, needle);
    let ids: Vec<Option<i64>> = providers.iter().map(|p| p.id).collect();
    let mut spend = SpendTotal::default();
    for invoice in ds.invoices.iter().filter(|inv| in_year(inv, year)) {
        let owned = ds
            .contract_of(invoice)
            .map(|contract| contract.provider_id.is_some() && ids.contains(&contract.provider_id))
            .unwrap_or(false);
        if owned {
            spend.total += invoice.total;
            spend.count += 1;
        }
    }
    ProviderSpend {
        providers: providers.iter().map(|p| p.name.clone()).collect(),
        total: spend.total,
        count: spend.count,
    }
}

pub fn contracts_of_providers<'a>(
    ds: &'a Dataset,
    needle: &str,
) -> Vec<(&'a Provider, &'a Contract)> {
    let providers = matching_providers(ds, needle);
    let mut out = Vec::new();
    for provider in providers {
        for contract in &ds.contracts {
            if provider.id.is_some() && contract.provider_id == provider.id {
                out.push((provider, contract));
            }
        }
    }
    out
}

pub fn facility_contracts<'a>(ds: &'a Dataset, facility: &str) -> Vec<&'a Contract> {
    let wanted = normalize_key(facility);
    ds.contracts
        .iter()
        .filter(|contract| normalize_key(&contract.facility) == wanted)
        .collect()
}

/// `None` when the facility has no contracts.
pub fn facility_summary<'a>(
    ds: &'a Dataset,
    facility: &str,
    year: Option<i32>,
) -> Option<FacilitySummary<'a>> {
    let contracts = facility_contracts(ds, facility);
    if contracts.is_empty() {
        return None;
    }
    let ids: Vec<i64> = contracts.iter().filter_map(|c| c.id).collect();
    let invoices: Vec<&Invoice> = ds
        .invoices
        .iter()
        .filter(|inv| inv.contract_id.map(|id| ids.contains(&id)).unwrap_or(false))
        .filter(|inv| in_year(inv, year))
        .collect();
    let total = invoices.iter().map(|inv| inv.total).sum();
    Some(FacilitySummary {
        contracts,
        invoices,
        total,
    })
}

pub fn overview(ds: &Dataset) -> Overview {
    Overview {
        providers: ds.providers.len(),
        contracts: ds.contracts.len(),
        invoices: ds.invoices.len(),
        total_invoiced: ds.invoices.iter().map(|inv| inv.total).sum(),
        total_contracted: ds.contracts.iter().map(|c| c.amount).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn provider(id: i64, name: &str) -> Provider {
        Provider {
            id: Some(id),
            name: name.to_string(),
            ..Provider::default()
        }
    }

    fn contract(id: i64, provider_id: i64, facility: &str, expires: Option<NaiveDate>) -> Contract {
        Contract {
            id: Some(id),
            provider_id: Some(provider_id),
            facility: facility.to_string(),
            expiration_date: expires,
            amount: Decimal::new(1000, 0),
            ..Contract::default()
        }
    }

    fn invoice(
        id: i64,
        contract_id: i64,
        total: i64,
        when: Option<NaiveDate>,
        concept: &str,
    ) -> Invoice {
        Invoice {
            id: Some(id),
            contract_id: Some(contract_id),
            number: format!("F-{id}"),
            total: Decimal::new(total, 2),
            date: when,
            concept: concept.to_string(),
            ..Invoice::default()
        }
    }

    fn sample() -> Dataset {
        Dataset::new(
            vec![
                provider(1, "Acme Limpiezas"),
                provider(2, "Beta Catering"),
                provider(3, "Acme Seguridad"),
            ],
            vec![
                contract(10, 1, "Residencia 1", date(2024, 6, 30)),
                contract(11, 2, "Residencia 2", date(2025, 12, 31)),
                contract(12, 3, "Residencia 1", None),
                contract(13, 2, "Fundación X", date(2023, 1, 1)),
            ],
            vec![
                invoice(100, 10, 15050, date(2024, 3, 15), "Limpieza"),
                invoice(101, 11, 50000, date(2024, 5, 1), "Comidas"),
                invoice(102, 12, 20000, date(2023, 11, 2), "Vigilancia"),
                invoice(103, 13, 50000, date(2024, 5, 20), "Comidas"),
                invoice(104, 99, 7000, date(2024, 1, 1), ""),
                invoice(105, 10, 100, None, "Limpieza"),
            ],
        )
    }

    #[test]
    fn facility_ranking_joins_and_filters_year() {
        let ds = sample();
        let ranking = spend_by_facility(&ds, Some(2024));
        let keys: Vec<&str> = ranking.iter().map(|e| e.key.as_str()).collect();
        // equal totals keep key order
        assert_eq!(keys, vec!["Fundación X", "Residencia 2", "Residencia 1"]);
        assert_eq!(ranking[2].total, Decimal::new(15050, 2));
        assert_eq!(ranking[2].count, 1);
    }

    #[test]
    fn provider_ranking_respects_facility_filter() {
        let ds = sample();
        let ranking = spend_by_provider(&ds, Some("residencia1"), None);
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].key, "Acme Seguridad");
        assert_eq!(ranking[1].key, "Acme Limpiezas");
        assert_eq!(ranking[1].total, Decimal::new(15150, 2));
    }

    #[test]
    fn concept_and_month_groupings() {
        let ds = sample();
        let concepts = spend_by_concept(&ds, None);
        assert_eq!(concepts[0].key, "Comidas");
        assert_eq!(concepts[0].total, Decimal::new(100000, 2));
        assert!(concepts.iter().any(|e| e.key == "(no concept)"));
        let months = spend_by_month(&ds, Some(2024));
        let keys: Vec<&str> = months.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["2024-01", "2024-03", "2024-05"]);
    }

    #[test]
    fn extremal_rows() {
        let ds = sample();
        assert_eq!(largest_invoice(&ds, None).unwrap().id, Some(101));
        assert_eq!(largest_invoice(&ds, Some(2023)).unwrap().id, Some(102));
        assert!(largest_invoice(&ds, Some(2020)).is_none());
        assert_eq!(most_recent_invoice(&ds).unwrap().id, Some(103));
        let top = top_invoices(&ds, 2, None);
        assert_eq!(top.iter().map(|i| i.id).collect::<Vec<_>>(), vec![Some(101), Some(103)]);
    }

    #[test]
    fn range_and_year_totals() {
        let ds = sample();
        let spend = spend_between(&ds, date(2024, 3, 15).unwrap(), date(2024, 5, 1).unwrap());
        assert_eq!(spend.count, 2);
        assert_eq!(spend.total, Decimal::new(65050, 2));
        assert_eq!(spend_in_year(&ds, 2023).count, 1);
        assert_eq!(spend_in_year(&ds, 2022), SpendTotal::default());
    }

    #[test]
    fn expiring_contracts_exclude_undated() {
        let ds = sample();
        let expiring = contracts_expiring_before(&ds, date(2025, 1, 1).unwrap());
        let ids: Vec<Option<i64>> = expiring.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![Some(13), Some(10)]);
        // strictly before
        assert!(contracts_expiring_before(&ds, date(2023, 1, 1).unwrap()).is_empty());
    }

    #[test]
    fn provider_substring_unions_matches() {
        let ds = sample();
        let spend = spend_with_providers(&ds, "ACME", None);
        assert_eq!(spend.providers, vec!["Acme Limpiezas", "Acme Seguridad"]);
        assert_eq!(spend.count, 3);
        assert_eq!(spend.total, Decimal::new(35150, 2));
        assert!(matching_providers(&ds, "  ").is_empty());
        assert_eq!(contracts_of_providers(&ds, "beta").len(), 2);
    }

    #[test]
    fn contract_counts_and_overview() {
        let ds = sample();
        let counts = contracts_per_provider(&ds);
        assert_eq!(counts[0].key, "Beta Catering");
        assert_eq!(counts[0].count, 2);
        let view = overview(&ds);
        assert_eq!(view.invoices, 6);
        assert_eq!(view.total_contracted, Decimal::new(4000, 0));
    }

    #[test]
    fn facility_summary_collects_invoices() {
        let ds = sample();
        let summary = facility_summary(&ds, "RESIDENCIA 1", Some(2024)).unwrap();
        assert_eq!(summary.contracts.len(), 2);
        assert_eq!(summary.invoices.len(), 1);
        assert_eq!(summary.total, Decimal::new(15050, 2));
        assert!(facility_summary(&ds, "Residencia 9", None).is_none());
    }
}
