//! One-off load of the nested provider/contract/invoice JSON export into the backend tables.

use std::fs;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::backend::TableBackend;
use crate::error::{ResidenciasError, Result};
use crate::model::Table;
use crate::parse::{de_amount, de_text, dmy_to_iso, id_or_none};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceDocument {
    #[serde(rename = "fichero", default, deserialize_with = "de_text")]
    pub file: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceInvoice {
    #[serde(rename = "numero", default, deserialize_with = "de_text")]
    pub number: String,
    #[serde(rename = "fecha", default, deserialize_with = "de_text")]
    pub date: String,
    #[serde(rename = "concepto", default, deserialize_with = "de_text")]
    pub concept: String,
    #[serde(rename = "base exenta", default, deserialize_with = "de_amount")]
    pub exempt_base: Decimal,
    #[serde(rename = "base general", default, deserialize_with = "de_amount")]
    pub general_base: Decimal,
    #[serde(rename = "iva general", default, deserialize_with = "de_amount")]
    pub tax: Decimal,
    #[serde(default, deserialize_with = "de_amount")]
    pub total: Decimal,
    #[serde(rename = "inicio periodo", default, deserialize_with = "de_text")]
    pub period_start: String,
    #[serde(rename = "fin periodo", default, deserialize_with = "de_text")]
    pub period_end: String,
    #[serde(rename = "Documentos", default)]
    pub documents: Option<Vec<SourceDocument>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceRecord {
    #[serde(default, deserialize_with = "de_text")]
    pub cif_proveedor: String,
    #[serde(rename = "nombre proveedor", default, deserialize_with = "de_text")]
    pub provider_name: String,
    #[serde(rename = "tipo", default, deserialize_with = "de_text")]
    pub service_type: String,
    #[serde(rename = "centro", default, deserialize_with = "de_text")]
    pub facility: String,
    #[serde(rename = "fecha contrato", default, deserialize_with = "de_text")]
    pub start_date: String,
    #[serde(rename = "fecha vencimiento", default, deserialize_with = "de_text")]
    pub expiration_date: String,
    #[serde(rename = "importe", default, deserialize_with = "de_amount")]
    pub amount: Decimal,
    #[serde(rename = "Documentos", default)]
    pub documents: Option<Vec<SourceDocument>>,
    #[serde(rename = "facturas", default)]
    pub invoices: Option<Vec<SourceInvoice>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderInsert {
    #[serde(rename = "cif_proveedor")]
    pub tax_id: String,
    #[serde(rename = "nombre_proveedor")]
    pub name: String,
    #[serde(rename = "tipo_servicio")]
    pub service_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContractInsert {
    #[serde(rename = "proveedor_id")]
    pub provider_id: i64,
    #[serde(rename = "centro")]
    pub facility: String,
    #[serde(rename = "fecha_contrato")]
    pub start_date: Option<String>,
    #[serde(rename = "fecha_vencimiento")]
    pub expiration_date: Option<String>,
    #[serde(rename = "importe", with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceInsert {
    #[serde(rename = "contrato_id")]
    pub contract_id: i64,
    #[serde(rename = "numero_factura")]
    pub number: String,
    #[serde(rename = "fecha_factura")]
    pub date: Option<String>,
    #[serde(rename = "concepto")]
    pub concept: String,
    #[serde(rename = "base_exenta", with = "rust_decimal::serde::float")]
    pub exempt_base: Decimal,
    #[serde(rename = "base_general", with = "rust_decimal::serde::float")]
    pub general_base: Decimal,
    #[serde(rename = "iva_general", with = "rust_decimal::serde::float")]
    pub tax: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    #[serde(rename = "inicio_periodo")]
    pub period_start: Option<String>,
    #[serde(rename = "fin_periodo")]
    pub period_end: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentInsert {
    #[serde(rename = "contrato_id")]
    pub contract_id: Option<i64>,
    #[serde(rename = "factura_id")]
    pub invoice_id: Option<i64>,
    #[serde(rename = "nombre_archivo")]
    pub filename: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub providers_created: usize,
    pub providers_reused: usize,
    pub contracts: usize,
    pub invoices: usize,
    pub documents: usize,
}

pub fn load_source(path: &Path) -> Result<Vec<SourceRecord>> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

pub fn ingest_records(
    backend: &dyn TableBackend,
    records: &[SourceRecord],
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();
    for (pos, record) in records.iter().enumerate() {
        let provider_id = provider_id_for(backend, record, &mut summary)?;
        let contract_id = insert_row(
            backend,
            Table::Contracts,
            &ContractInsert {
                provider_id,
                facility: record.facility.clone(),
                start_date: dmy_to_iso(&record.start_date),
                expiration_date: dmy_to_iso(&record.expiration_date),
                amount: record.amount,
            },
        )?;
        summary.contracts += 1;
        summary.documents +=
            insert_documents(backend, record.documents.as_deref(), Some(contract_id), None)?;

        for item in record.invoices.as_deref().unwrap_or_default() {
            let invoice_id = insert_row(
                backend,
                Table::Invoices,
                &InvoiceInsert {
                    contract_id,
                    number: item.number.clone(),
                    date: dmy_to_iso(&item.date),
                    concept: item.concept.clone(),
                    exempt_base: item.exempt_base,
                    general_base: item.general_base,
                    tax: item.tax,
                    total: item.total,
                    period_start: dmy_to_iso(&item.period_start),
                    period_end: dmy_to_iso(&item.period_end),
                },
            )?;
            summary.invoices += 1;
            summary.documents +=
                insert_documents(backend, item.documents.as_deref(), None, Some(invoice_id))?;
        }
        debug!(record = pos, contract_id, "record ingested");
    }
    info!(
        providers_created = summary.providers_created,
        contracts = summary.contracts,
        invoices = summary.invoices,
        documents = summary.documents,
        "ingestion finished"
    );
    Ok(summary)
}

/// Providers are shared across records with the same tax id and name.
fn provider_id_for(
    backend: &dyn TableBackend,
    record: &SourceRecord,
    summary: &mut IngestSummary,
) -> Result<i64> {
    let existing = backend.select_eq(
        Table::Providers,
        &[
            ("cif_proveedor", record.cif_proveedor.as_str()),
            ("nombre_proveedor", record.provider_name.as_str()),
        ],
    )?;
    if let Some(id) = existing.first().and_then(|row| row_id(row)) {
        summary.providers_reused += 1;
        return Ok(id);
    }
    let id = insert_row(
        backend,
        Table::Providers,
        &ProviderInsert {
            tax_id: record.cif_proveedor.clone(),
            name: record.provider_name.clone(),
            service_type: record.service_type.clone(),
        },
    )?;
    summary.providers_created += 1;
    Ok(id)
}

fn insert_documents(
    backend: &dyn TableBackend,
    documents: Option<&[SourceDocument]>,
    contract_id: Option<i64>,
    invoice_id: Option<i64>,
) -> Result<usize> {
    let mut inserted = 0;
    for document in documents.unwrap_or_default() {
        if document.file.trim().is_empty() {
            continue;
        }
        insert_row(
            backend,
            Table::Documents,
            &DocumentInsert {
                contract_id,
                invoice_id,
                filename: document.file.clone(),
            },
        )?;
        inserted += 1;
    }
    Ok(inserted)
}

fn insert_row<T: Serialize>(backend: &dyn TableBackend, table: Table, row: &T) -> Result<i64> {
    let stored = backend.insert(table, &serde_json::to_value(row)?)?;
    row_id(&stored).ok_or_else(|| {
        ResidenciasError::Other(format!("insert into {} returned no id", table.as_str()))
    })
}

fn row_id(row: &Value) -> Option<i64> {
    row.get("id").and_then(id_or_none)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use serde_json::json;

    fn source() -> Vec<SourceRecord> {
        serde_json::from_value(json!([
            {
                "cif_proveedor": "B123",
                "nombre proveedor": "Acme",
                "tipo": "Limpieza",
                "centro": "Residencia 1",
                "fecha contrato": "01/01/2024",
                "fecha vencimiento": "31/12/2025",
                "importe": "12000",
                "Documentos": [{"fichero": "contrato.pdf"}, {"fichero": ""}],
                "facturas": [
                    {
                        "numero": "F-1",
                        "fecha": "15/03/2024",
                        "concepto": "Limpieza marzo",
                        "total": 150.5,
                        "inicio periodo": "01/03/2024",
                        "fin periodo": "not a date",
                        "Documentos": [{"fichero": "f1.pdf"}]
                    }
                ]
            },
            {
                "cif_proveedor": "B123",
                "nombre proveedor": "Acme",
                "centro": "Residencia 2",
                "importe": null,
                "facturas": null
            }
        ]))
        .unwrap()
    }

    #[test]
    fn ingestion_reuses_providers_and_converts_dates() {
        let backend = MemoryBackend::new();
        let summary = ingest_records(&backend, &source()).unwrap();
        assert_eq!(
            summary,
            IngestSummary {
                providers_created: 1,
                providers_reused: 1,
                contracts: 2,
                invoices: 1,
                documents: 2,
            }
        );
        let invoices = backend.select_all(Table::Invoices).unwrap();
        assert_eq!(invoices[0]["fecha_factura"], json!("2024-03-15"));
        assert_eq!(invoices[0]["inicio_periodo"], json!("2024-03-01"));
        assert_eq!(invoices[0]["fin_periodo"], Value::Null);
        assert_eq!(invoices[0]["total"], json!(150.5));
        let contracts = backend.select_all(Table::Contracts).unwrap();
        assert_eq!(contracts[1]["importe"], json!(0.0));
        assert_eq!(contracts[1]["fecha_contrato"], Value::Null);
    }
}
