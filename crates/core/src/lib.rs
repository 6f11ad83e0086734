pub mod aggregate;
mod backend;
mod error;
mod ingest;
mod model;
pub mod parse;
pub mod report;

pub use aggregate::{Overview, ProviderSpend, RankEntry, SpendTotal, DEFAULT_TOP_N};
pub use backend::{fetch, fetch_rows, MemoryBackend, SupabaseBackend, TableBackend};
pub use error::{ResidenciasError, Result};
pub use ingest::{
    ingest_records, load_source, ContractInsert, DocumentInsert, IngestSummary, InvoiceInsert,
    ProviderInsert, SourceDocument, SourceInvoice, SourceRecord,
};
pub use model::{Contract, Dataset, Document, Invoice, Provider, Table};
pub use report::{Report, ReportKind};
