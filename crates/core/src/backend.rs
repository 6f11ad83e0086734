use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use parking_lot::Mutex;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{ResidenciasError, Result};
use crate::model::{Contract, Dataset, Invoice, Provider, Table};
use crate::parse::{id_or_none, text_or_empty};

/// Row-level access to the hosted tables. Filtering beyond equality lookups happens client-side.
pub trait TableBackend {
    fn select_all(&self, table: Table) -> Result<Vec<Value>>;
    fn select_eq(&self, table: Table, filters: &[(&str, &str)]) -> Result<Vec<Value>>;
    /// Inserts one row and returns it as stored (with its id).
    fn insert(&self, table: Table, row: &Value) -> Result<Value>;
}

/// PostgREST endpoint of a Supabase project.
#[derive(Clone)]
pub struct SupabaseBackend {
    http: Client,
    base_url: String,
    api_key: String,
}

impl SupabaseBackend {
    pub fn new(url: &str, api_key: &str) -> Result<Self> {
        if url.trim().is_empty() {
            return Err(ResidenciasError::MissingConfig("SUPABASE_URL"));
        }
        if api_key.trim().is_empty() {
            return Err(ResidenciasError::MissingConfig("SUPABASE_KEY"));
        }
        Ok(Self {
            http: Client::new(),
            base_url: url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("apikey"),
            header_value(&self.api_key)?,
        );
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("Bearer {}", self.api_key))?,
        );
        Ok(headers)
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    fn decode_rows(&self, table: Table, response: Response) -> Result<Vec<Value>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ResidenciasError::Backend {
                table: table.as_str().to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<Vec<Value>>()?)
    }
}

impl TableBackend for SupabaseBackend {
    fn select_all(&self, table: Table) -> Result<Vec<Value>> {
        let response = self
            .http
            .get(self.table_url(table))
            .headers(self.headers()?)
            .query(&[("select", "*")])
            .send()?;
        self.decode_rows(table, response)
    }

    fn select_eq(&self, table: Table, filters: &[(&str, &str)]) -> Result<Vec<Value>> {
        let mut query = vec![("select".to_string(), "*".to_string())];
        for (column, value) in filters {
            query.push((column.to_string(), format!("eq.{value}")));
        }
        let response = self
            .http
            .get(self.table_url(table))
            .headers(self.headers()?)
            .query(&query)
            .send()?;
        self.decode_rows(table, response)
    }

    fn insert(&self, table: Table, row: &Value) -> Result<Value> {
        let response = self
            .http
            .post(self.table_url(table))
            .headers(self.headers()?)
            .header("Prefer", "return=representation")
            .json(row)
            .send()?;
        self.decode_rows(table, response)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                ResidenciasError::Other(format!("insert into {} returned no rows", table.as_str()))
            })
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| ResidenciasError::Other("api key contains invalid header characters".into()))
}

/// In-process tables with auto-increment ids. Backs tests and offline snapshot runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: Mutex<BTreeMap<Table, Vec<Value>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: Table, rows: Vec<Value>) -> Self {
        self.tables.get_mut().insert(table, rows);
        self
    }

    /// Builds a backend from `{"proveedores": [...], "contratos": [...], ...}`.
    pub fn from_snapshot(snapshot: &Value) -> Result<Self> {
        let object = snapshot.as_object().ok_or_else(|| {
            ResidenciasError::Other("snapshot must be a JSON object keyed by table".into())
        })?;
        let mut backend = Self::new();
        for (name, rows) in object {
            let Some(table) = Table::from_str(name) else {
                warn!(table = %name, "ignoring unknown table in snapshot");
                continue;
            };
            let rows = rows.as_array().cloned().unwrap_or_default();
            backend = backend.with_table(table, rows);
        }
        Ok(backend)
    }

    pub fn load_snapshot(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&contents)?;
        Self::from_snapshot(&value)
    }

    pub fn snapshot(&self) -> Value {
        let tables = self.tables.lock();
        let mut out = serde_json::Map::new();
        for table in Table::ALL {
            let rows = tables.get(&table).cloned().unwrap_or_default();
            out.insert(table.as_str().to_string(), Value::Array(rows));
        }
        Value::Object(out)
    }

    pub fn row_count(&self, table: Table) -> usize {
        self.tables.lock().get(&table).map(Vec::len).unwrap_or(0)
    }
}

impl TableBackend for MemoryBackend {
    fn select_all(&self, table: Table) -> Result<Vec<Value>> {
        Ok(self.tables.lock().get(&table).cloned().unwrap_or_default())
    }

    fn select_eq(&self, table: Table, filters: &[(&str, &str)]) -> Result<Vec<Value>> {
        let tables = self.tables.lock();
        let rows = tables.get(&table).map(Vec::as_slice).unwrap_or_default();
        Ok(rows
            .iter()
            .filter(|row| {
                filters.iter().all(|(column, expected)| {
                    row.get(*column)
                        .map(|value| text_or_empty(value) == *expected)
                        .unwrap_or(false)
                })
            })
            .cloned()
            .collect())
    }

    fn insert(&self, table: Table, row: &Value) -> Result<Value> {
        let mut tables = self.tables.lock();
        let rows = tables.entry(table).or_default();
        let mut stored = row.clone();
        let object = stored.as_object_mut().ok_or_else(|| {
            ResidenciasError::Other(format!("row for {} must be an object", table.as_str()))
        })?;
        if object.get("id").and_then(id_or_none).is_none() {
            let next_id = rows
                .iter()
                .filter_map(|existing| existing.get("id").and_then(id_or_none))
                .max()
                .unwrap_or(0)
                + 1;
            object.insert("id".to_string(), json!(next_id));
        }
        rows.push(stored.clone());
        Ok(stored)
    }
}

/// Full table contents. A failing or empty backend yields an empty table, never an error.
pub fn fetch(backend: &dyn TableBackend, table: Table) -> Vec<Value> {
    match backend.select_all(table) {
        Ok(rows) => {
            if rows.is_empty() {
                debug!(table = table.as_str(), "table is empty");
            }
            rows
        }
        Err(err) => {
            warn!(table = table.as_str(), error = %err, "fetch failed; using an empty table");
            Vec::new()
        }
    }
}

pub fn fetch_rows<T: DeserializeOwned>(backend: &dyn TableBackend, table: Table) -> Vec<T> {
    fetch(backend, table)
        .into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(table = table.as_str(), error = %err, "skipping undecodable row");
                None
            }
        })
        .collect()
}

impl Dataset {
    pub fn load(backend: &dyn TableBackend) -> Self {
        let providers: Vec<Provider> = fetch_rows(backend, Table::Providers);
        let contracts: Vec<Contract> = fetch_rows(backend, Table::Contracts);
        let invoices: Vec<Invoice> = fetch_rows(backend, Table::Invoices);
        debug!(
            providers = providers.len(),
            contracts = contracts.len(),
            invoices = invoices.len(),
            "dataset loaded"
        );
        Dataset::new(providers, contracts, invoices)
    }
}
