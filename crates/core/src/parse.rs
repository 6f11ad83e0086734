//! Parsing helpers shared by the row decoder and the query filters.
//!
//! Two families live here and must not be mixed up:
//!
//! * parse-or-default (`amount_or_zero`, `stored_date`, `text_or_empty`) for values read back from
//!   the backend, where a bad cell degrades to zero / absent;
//! * parse-or-signal (`parse_user_date`, `parse_user_amount`) for filters typed by a user, where a
//!   bad value is reported as an error so it never looks like an empty result.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::{ResidenciasError, Result};

const USER_DATE_FORMATS: [&str; 3] = ["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];

pub fn amount_or_zero(value: &Value) -> Decimal {
    match value {
        Value::Number(number) => Decimal::from_str(&number.to_string())
            .ok()
            .or_else(|| number.as_f64().and_then(Decimal::from_f64))
            .unwrap_or(Decimal::ZERO),
        Value::String(text) => {
            let trimmed = text.trim();
            Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .unwrap_or(Decimal::ZERO)
        }
        _ => Decimal::ZERO,
    }
}

/// Accepts `YYYY-MM-DD` and anything that starts with it (timestamps).
pub fn stored_date(value: &Value) -> Option<NaiveDate> {
    let raw = value.as_str()?.trim();
    let head = raw.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

pub fn text_or_empty(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn id_or_none(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

pub fn parse_user_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    USER_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| ResidenciasError::InvalidDate(trimmed.to_string()))
}

/// Accepts `1000`, `1000.50`, `1000,50`, `1.000`, `1.000,50` and `1,000.50`, with an optional
/// currency sign. Negative thresholds are rejected.
pub fn parse_user_amount(raw: &str) -> Result<Decimal> {
    let trimmed = raw
        .trim()
        .trim_end_matches(['€', '$'])
        .trim_start_matches(['€', '$'])
        .trim();
    let normalized = match (trimmed.rfind('.'), trimmed.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => trimmed.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => trimmed.replace(',', ""),
        (Some(_), None) => single_separator(trimmed, '.'),
        (None, Some(_)) => single_separator(trimmed, ','),
        (None, None) => trimmed.to_string(),
    };
    let value = Decimal::from_str(&normalized)
        .map_err(|_| ResidenciasError::InvalidAmount(raw.trim().to_string()))?;
    if value.is_sign_negative() {
        return Err(ResidenciasError::InvalidAmount(raw.trim().to_string()));
    }
    Ok(value)
}

/// Only one kind of separator: it groups thousands when every group after it has exactly three
/// digits, otherwise it is the decimal point.
fn single_separator(text: &str, sep: char) -> String {
    let grouped = text
        .split(sep)
        .skip(1)
        .all(|group| group.len() == 3 && group.chars().all(|c| c.is_ascii_digit()));
    if grouped {
        text.replace(sep, "")
    } else {
        text.replace(sep, ".")
    }
}

/// Converts the `dd/mm/yyyy` dates found in source files to ISO form.
pub fn dmy_to_iso(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, "%d/%m/%Y")
        .ok()
        .map(|date| date.format("%Y-%m-%d").to_string())
}

/// Lower-cases and strips diacritics, so composed and decomposed input fold to the same text.
pub fn fold_text(raw: &str) -> String {
    raw.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Comparison key for facility and provider names: folded text without whitespace.
pub fn normalize_key(raw: &str) -> String {
    fold_text(raw).chars().filter(|c| !c.is_whitespace()).collect()
}

pub(crate) fn de_amount<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(amount_or_zero).unwrap_or(Decimal::ZERO))
}

pub(crate) fn de_date<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(stored_date))
}

pub(crate) fn de_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(text_or_empty).unwrap_or_default())
}

pub(crate) fn de_id<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(id_or_none))
}
