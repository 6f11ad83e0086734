use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::parse::{de_amount, de_date, de_id, de_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Providers,
    Contracts,
    Invoices,
    Documents,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Providers,
        Table::Contracts,
        Table::Invoices,
        Table::Documents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Providers => "proveedores",
            Table::Contracts => "contratos",
            Table::Invoices => "facturas",
            Table::Documents => "documentos",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Table::ALL
            .into_iter()
            .find(|table| table.as_str() == value.trim().to_lowercase())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    #[serde(default, deserialize_with = "de_id")]
    pub id: Option<i64>,
    #[serde(rename = "cif_proveedor", default, deserialize_with = "de_text")]
    pub tax_id: String,
    #[serde(rename = "nombre_proveedor", default, deserialize_with = "de_text")]
    pub name: String,
    #[serde(rename = "tipo_servicio", default, deserialize_with = "de_text")]
    pub service_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    #[serde(default, deserialize_with = "de_id")]
    pub id: Option<i64>,
    #[serde(rename = "proveedor_id", default, deserialize_with = "de_id")]
    pub provider_id: Option<i64>,
    #[serde(rename = "centro", default, deserialize_with = "de_text")]
    pub facility: String,
    #[serde(rename = "fecha_contrato", default, deserialize_with = "de_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(rename = "fecha_vencimiento", default, deserialize_with = "de_date")]
    pub expiration_date: Option<NaiveDate>,
    #[serde(rename = "importe", default, deserialize_with = "de_amount")]
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(default, deserialize_with = "de_id")]
    pub id: Option<i64>,
    #[serde(rename = "contrato_id", default, deserialize_with = "de_id")]
    pub contract_id: Option<i64>,
    #[serde(rename = "numero_factura", default, deserialize_with = "de_text")]
    pub number: String,
    #[serde(rename = "fecha_factura", default, deserialize_with = "de_date")]
    pub date: Option<NaiveDate>,
    #[serde(rename = "concepto", default, deserialize_with = "de_text")]
    pub concept: String,
    #[serde(rename = "base_exenta", default, deserialize_with = "de_amount")]
    pub exempt_base: Decimal,
    #[serde(rename = "base_general", default, deserialize_with = "de_amount")]
    pub general_base: Decimal,
    #[serde(rename = "iva_general", default, deserialize_with = "de_amount")]
    pub tax: Decimal,
    #[serde(default, deserialize_with = "de_amount")]
    pub total: Decimal,
    #[serde(rename = "inicio_periodo", default, deserialize_with = "de_date")]
    pub period_start: Option<NaiveDate>,
    #[serde(rename = "fin_periodo", default, deserialize_with = "de_date")]
    pub period_end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, deserialize_with = "de_id")]
    pub id: Option<i64>,
    #[serde(rename = "contrato_id", default, deserialize_with = "de_id")]
    pub contract_id: Option<i64>,
    #[serde(rename = "factura_id", default, deserialize_with = "de_id")]
    pub invoice_id: Option<i64>,
    #[serde(rename = "nombre_archivo", default, deserialize_with = "de_text")]
    pub filename: String,
}

/// The three tables the query layer reads, with id indexes for the invoice → contract →
/// provider joins.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub providers: Vec<Provider>,
    pub contracts: Vec<Contract>,
    pub invoices: Vec<Invoice>,
    provider_index: HashMap<i64, usize>,
    contract_index: HashMap<i64, usize>,
}

impl Dataset {
    pub fn new(providers: Vec<Provider>, contracts: Vec<Contract>, invoices: Vec<Invoice>) -> Self {
        let provider_index = providers
            .iter()
            .enumerate()
            .filter_map(|(pos, provider)| provider.id.map(|id| (id, pos)))
            .collect();
        let contract_index = contracts
            .iter()
            .enumerate()
            .filter_map(|(pos, contract)| contract.id.map(|id| (id, pos)))
            .collect();
        Self {
            providers,
            contracts,
            invoices,
            provider_index,
            contract_index,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty() && self.contracts.is_empty() && self.invoices.is_empty()
    }

    pub fn provider(&self, id: Option<i64>) -> Option<&Provider> {
        id.and_then(|id| self.provider_index.get(&id))
            .map(|pos| &self.providers[*pos])
    }

    pub fn contract(&self, id: Option<i64>) -> Option<&Contract> {
        id.and_then(|id| self.contract_index.get(&id))
            .map(|pos| &self.contracts[*pos])
    }

    pub fn contract_of(&self, invoice: &Invoice) -> Option<&Contract> {
        self.contract(invoice.contract_id)
    }

    pub fn provider_of(&self, contract: &Contract) -> Option<&Provider> {
        self.provider(contract.provider_id)
    }
}
