//! Clients (clientes) of the firm and their yearly fee records.

pub mod autosave;
pub mod domain;
pub mod fees;
pub mod importer;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use autosave::{AutosaveError, AutosaveField, AutosaveState, FieldSink};
pub use domain::{
    normalize_tax_id, Client, ClientId, ClientProfile, ClientValidationError, TaxId, TaxIdError,
    TaxIdKind, TaxRegime,
};
pub use fees::{ClientFeeRecord, FeeFlag};
pub use importer::{ClientImportError, ClientRosterImporter, ImportReport, SkippedRow};
pub use repository::{ClientRepository, FeeRecordRepository};
pub use router::client_router;
pub use service::{ClientService, ClientServiceError, ProtocolSink};
