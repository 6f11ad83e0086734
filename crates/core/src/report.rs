//! Text summaries over the typed aggregations. Each function validates its user-supplied filters
//! first, then checks for missing data, and only then formats an answer; the three outcomes carry
//! different [`ReportKind`]s so an empty result never reads like bad input.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::{self, RankEntry, DEFAULT_TOP_N};
use crate::model::{Contract, Dataset, Invoice};
use crate::parse::{parse_user_amount, parse_user_date};

pub const MAX_LISTED: usize = 10;
pub const NO_INVOICES: &str = "There are no invoices in the database.";
pub const NO_CONTRACTS: &str = "There are no contracts in the database.";
pub const UNRECOGNIZED: &str =
    "Sorry, I could not match your question to any of the queries I know how to answer.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Answer,
    NoData,
    InvalidInput,
    MissingParameter,
    Unrecognized,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Answer => "answer",
            ReportKind::NoData => "no_data",
            ReportKind::InvalidInput => "invalid_input",
            ReportKind::MissingParameter => "missing_parameter",
            ReportKind::Unrecognized => "unrecognized",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub kind: ReportKind,
    pub text: String,
}

impl Report {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            kind: ReportKind::Answer,
            text: text.into(),
        }
    }

    pub fn no_data(text: impl Into<String>) -> Self {
        Self {
            kind: ReportKind::NoData,
            text: text.into(),
        }
    }

    pub fn invalid_input(text: impl Into<String>) -> Self {
        Self {
            kind: ReportKind::InvalidInput,
            text: text.into(),
        }
    }

    pub fn missing(what: &str) -> Self {
        Self {
            kind: ReportKind::MissingParameter,
            text: format!("I could not find the {what} in the question."),
        }
    }

    pub fn unrecognized() -> Self {
        Self {
            kind: ReportKind::Unrecognized,
            text: UNRECOGNIZED.to_string(),
        }
    }

    pub fn is_answer(&self) -> bool {
        self.kind == ReportKind::Answer
    }
}

pub fn money(value: Decimal) -> String {
    format!("{value:.2}")
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

fn year_suffix(year: Option<i32>) -> String {
    year.map(|year| format!(" in {year}")).unwrap_or_default()
}

fn invoice_line(invoice: &Invoice) -> String {
    let number = if invoice.number.trim().is_empty() {
        invoice
            .id
            .map(|id| format!("#{id}"))
            .unwrap_or_else(|| "(unnumbered)".to_string())
    } else {
        invoice.number.trim().to_string()
    };
    let date = invoice
        .date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown date".to_string());
    format!("'{number}' dated {date} with total {}", money(invoice.total))
}

fn contract_line(contract: &Contract) -> String {
    let id = contract
        .id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "?".to_string());
    let expires = contract
        .expiration_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "no expiration date".to_string());
    format!(
        "contract {id} at {}, expires {expires}, amount {}",
        contract.facility.trim(),
        money(contract.amount)
    )
}

fn ranking_text(title: &str, entries: &[RankEntry]) -> String {
    let mut out = format!("{title}:");
    for (pos, entry) in entries.iter().take(MAX_LISTED).enumerate() {
        out.push_str(&format!(
            "\n{}. {}: {} ({})",
            pos + 1,
            entry.key,
            money(entry.total),
            plural(entry.count, "invoice")
        ));
    }
    if entries.len() > MAX_LISTED {
        out.push_str(&format!("\n... and {} more", entries.len() - MAX_LISTED));
    }
    out
}

fn listed<T>(items: &[T], line: impl Fn(&T) -> String) -> String {
    let mut out = String::new();
    for item in items.iter().take(MAX_LISTED) {
        out.push_str("\n- ");
        out.push_str(&line(item));
    }
    if items.len() > MAX_LISTED {
        out.push_str(&format!("\n... and {} more", items.len() - MAX_LISTED));
    }
    out
}

pub fn invoices_above_amount(ds: &Dataset, amount: Option<&str>) -> Report {
    let Some(raw) = amount else {
        return Report::missing("amount");
    };
    let threshold = match parse_user_amount(raw) {
        Ok(value) => value,
        Err(err) => return Report::invalid_input(err.to_string()),
    };
    if ds.invoices.is_empty() {
        return Report::no_data(NO_INVOICES);
    }
    let matches = aggregate::invoices_above(ds, threshold);
    if matches.is_empty() {
        return Report::no_data(format!(
            "No invoices found with a total greater than {}.",
            money(threshold)
        ));
    }
    let sum: Decimal = matches.iter().map(|inv| inv.total).sum();
    Report::answer(format!(
        "Found {} with a total greater than {}.\nSum of those invoices = {}.{}",
        plural(matches.len(), "invoice"),
        money(threshold),
        money(sum),
        listed(&matches, |inv| invoice_line(inv))
    ))
}

pub fn provider_with_most_contracts(ds: &Dataset) -> Report {
    if ds.contracts.is_empty() || ds.providers.is_empty() {
        return Report::no_data("There are no contracts or providers in the database.");
    }
    let ranking = aggregate::contracts_per_provider(ds);
    let Some(top) = ranking.first() else {
        return Report::no_data("No contract could be matched to a provider.");
    };
    let mut out = String::from("Providers ranked by number of contracts:");
    for entry in ranking.iter().take(MAX_LISTED) {
        out.push_str(&format!("\n- {}: {}", entry.key, plural(entry.count, "contract")));
    }
    out.push_str(&format!(
        "\n\nThe provider with the most contracts is {} with {}.",
        top.key, top.count
    ));
    Report::answer(out)
}

pub fn most_recent_invoice(ds: &Dataset) -> Report {
    if ds.invoices.is_empty() {
        return Report::no_data(NO_INVOICES);
    }
    match aggregate::most_recent_invoice(ds) {
        Some(invoice) => Report::answer(format!(
            "The most recent invoice is {}.",
            invoice_line(invoice)
        )),
        None => Report::no_data("No invoice has a valid date."),
    }
}

pub fn spend_in_range(ds: &Dataset, start: Option<&str>, end: Option<&str>) -> Report {
    let (Some(raw_start), Some(raw_end)) = (start, end) else {
        return Report::missing("start and end dates");
    };
    let start = match parse_user_date(raw_start) {
        Ok(date) => date,
        Err(err) => return Report::invalid_input(err.to_string()),
    };
    let end = match parse_user_date(raw_end) {
        Ok(date) => date,
        Err(err) => return Report::invalid_input(err.to_string()),
    };
    if start > end {
        return Report::invalid_input(format!(
            "The start date {raw_start} is after the end date {raw_end}."
        ));
    }
    if ds.invoices.is_empty() {
        return Report::no_data(NO_INVOICES);
    }
    let spend = aggregate::spend_between(ds, start, end);
    if spend.count == 0 {
        return Report::no_data(format!(
            "No invoices in range {raw_start} to {raw_end}; total spend is {}.",
            money(Decimal::ZERO)
        ));
    }
    Report::answer(format!(
        "Total spend between {raw_start} and {raw_end} is {} across {}.",
        money(spend.total),
        plural(spend.count, "invoice")
    ))
}

pub fn contracts_expiring_before(ds: &Dataset, cutoff: Option<&str>) -> Report {
    let Some(raw) = cutoff else {
        return Report::missing("expiration date");
    };
    let cutoff = match parse_user_date(raw) {
        Ok(date) => date,
        Err(err) => return Report::invalid_input(err.to_string()),
    };
    if ds.contracts.is_empty() {
        return Report::no_data(NO_CONTRACTS);
    }
    let contracts = aggregate::contracts_expiring_before(ds, cutoff);
    if contracts.is_empty() {
        return Report::no_data(format!("No contracts expire before {raw}."));
    }
    Report::answer(format!(
        "Contracts expiring before {raw}: {}.{}",
        contracts.len(),
        listed(&contracts, |c| contract_line(c))
    ))
}

pub fn facility_spend_ranking(ds: &Dataset, year: Option<i32>) -> Report {
    if ds.invoices.is_empty() {
        return Report::no_data(NO_INVOICES);
    }
    let ranking = aggregate::spend_by_facility(ds, year);
    if ranking.is_empty() {
        return Report::no_data(format!(
            "No facility has invoices{}.",
            year_suffix(year)
        ));
    }
    Report::answer(ranking_text(
        &format!("Spend by facility{}", year_suffix(year)),
        &ranking,
    ))
}

pub fn largest_invoice(ds: &Dataset, year: Option<i32>) -> Report {
    if ds.invoices.is_empty() {
        return Report::no_data(NO_INVOICES);
    }
    match aggregate::largest_invoice(ds, year) {
        Some(invoice) => Report::answer(format!(
            "The largest invoice{} is {}.",
            year_suffix(year),
            invoice_line(invoice)
        )),
        None => Report::no_data(format!("No invoices found{}.", year_suffix(year))),
    }
}

pub fn provider_spend_ranking(ds: &Dataset, facility: Option<&str>, year: Option<i32>) -> Report {
    if ds.invoices.is_empty() {
        return Report::no_data(NO_INVOICES);
    }
    let ranking = aggregate::spend_by_provider(ds, facility, year);
    let scope = match facility {
        Some(name) => format!(" at {name}{}", year_suffix(year)),
        None => year_suffix(year),
    };
    if ranking.is_empty() {
        return Report::no_data(format!("No provider has invoices{scope}."));
    }
    Report::answer(ranking_text(&format!("Spend by provider{scope}"), &ranking))
}

pub fn facility_summary(ds: &Dataset, facility: Option<&str>, year: Option<i32>) -> Report {
    let Some(name) = facility else {
        return Report::missing("facility");
    };
    if ds.contracts.is_empty() {
        return Report::no_data(NO_CONTRACTS);
    }
    if ds.invoices.is_empty() {
        return Report::no_data(NO_INVOICES);
    }
    let Some(summary) = aggregate::facility_summary(ds, name, year) else {
        return Report::no_data(format!("No contracts found for {name}."));
    };
    if summary.invoices.is_empty() {
        return Report::no_data(format!(
            "No invoices found for {name}{}; {} on record.",
            year_suffix(year),
            plural(summary.contracts.len(), "contract")
        ));
    }
    let mut out = format!(
        "Summary for {name}{}: {}, {}, total spend {}.",
        year_suffix(year),
        plural(summary.contracts.len(), "contract"),
        plural(summary.invoices.len(), "invoice"),
        money(summary.total)
    );
    out.push_str(&listed(&summary.contracts, |c| {
        let provider = ds
            .provider_of(c)
            .map(|p| p.name.trim().to_string())
            .unwrap_or_else(|| "unknown provider".to_string());
        format!("{} ({provider})", contract_line(c))
    }));
    Report::answer(out)
}

pub fn spend_with_provider(ds: &Dataset, provider: Option<&str>, year: Option<i32>) -> Report {
    let Some(needle) = provider else {
        return Report::missing("provider name");
    };
    if ds.invoices.is_empty() {
        return Report::no_data(NO_INVOICES);
    }
    let spend = aggregate::spend_with_providers(ds, needle, year);
    if spend.providers.is_empty() {
        return Report::no_data(format!("No provider name contains '{}'.", needle.trim()));
    }
    if spend.count == 0 {
        return Report::no_data(format!(
            "No invoices found for {}{}.",
            spend.providers.join(", "),
            year_suffix(year)
        ));
    }
    Report::answer(format!(
        "Spend with {}{} is {} across {}.",
        spend.providers.join(", "),
        year_suffix(year),
        money(spend.total),
        plural(spend.count, "invoice")
    ))
}

pub fn provider_contracts(ds: &Dataset, provider: Option<&str>) -> Report {
    let Some(needle) = provider else {
        return Report::missing("provider name");
    };
    if ds.contracts.is_empty() {
        return Report::no_data(NO_CONTRACTS);
    }
    let pairs = aggregate::contracts_of_providers(ds, needle);
    if pairs.is_empty() {
        return Report::no_data(format!(
            "No contracts found for providers matching '{}'.",
            needle.trim()
        ));
    }
    Report::answer(format!(
        "Contracts held by providers matching '{}': {}.{}",
        needle.trim(),
        pairs.len(),
        listed(&pairs, |(provider, contract)| format!(
            "{}: {}",
            provider.name.trim(),
            contract_line(contract)
        ))
    ))
}

pub fn top_invoices(ds: &Dataset, limit: Option<usize>, year: Option<i32>) -> Report {
    let limit = limit.unwrap_or(DEFAULT_TOP_N);
    if limit == 0 {
        return Report::invalid_input("The number of invoices to list must be at least 1.");
    }
    if ds.invoices.is_empty() {
        return Report::no_data(NO_INVOICES);
    }
    let invoices = aggregate::top_invoices(ds, limit, year);
    if invoices.is_empty() {
        return Report::no_data(format!("No invoices found{}.", year_suffix(year)));
    }
    let mut out = format!(
        "Top {} by total{}:",
        plural(invoices.len(), "invoice"),
        year_suffix(year)
    );
    for (pos, invoice) in invoices.iter().enumerate() {
        out.push_str(&format!("\n{}. {}", pos + 1, invoice_line(invoice)));
    }
    Report::answer(out)
}

pub fn concept_ranking(ds: &Dataset, year: Option<i32>) -> Report {
    if ds.invoices.is_empty() {
        return Report::no_data(NO_INVOICES);
    }
    let ranking = aggregate::spend_by_concept(ds, year);
    if ranking.is_empty() {
        return Report::no_data(format!("No invoices found{}.", year_suffix(year)));
    }
    Report::answer(ranking_text(
        &format!("Spend by concept{}", year_suffix(year)),
        &ranking,
    ))
}

pub fn monthly_spend(ds: &Dataset, year: Option<i32>) -> Report {
    if ds.invoices.is_empty() {
        return Report::no_data(NO_INVOICES);
    }
    let months = aggregate::spend_by_month(ds, year);
    if months.is_empty() {
        return Report::no_data(format!("No dated invoices found{}.", year_suffix(year)));
    }
    let mut out = format!("Monthly spend{}:", year_suffix(year));
    for entry in &months {
        out.push_str(&format!(
            "\n- {}: {} ({})",
            entry.key,
            money(entry.total),
            plural(entry.count, "invoice")
        ));
    }
    Report::answer(out)
}

pub fn total_for_year(ds: &Dataset, year: Option<i32>) -> Report {
    let Some(year) = year else {
        return Report::missing("year");
    };
    if ds.invoices.is_empty() {
        return Report::no_data(NO_INVOICES);
    }
    let spend = aggregate::spend_in_year(ds, year);
    if spend.count == 0 {
        return Report::no_data(format!(
            "No invoices found in {year}; total spend is {}.",
            money(Decimal::ZERO)
        ));
    }
    Report::answer(format!(
        "Total spend in {year} is {} across {}.",
        money(spend.total),
        plural(spend.count, "invoice")
    ))
}
