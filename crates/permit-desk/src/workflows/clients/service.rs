use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use super::autosave::{AutosaveError, FieldSink};
use super::domain::{Client, ClientId, ClientProfile, ClientValidationError, TaxId};
use super::fees::{ClientFeeRecord, FeeFlag};
use super::importer::{ClientImportError, ClientRosterImporter, ImportReport, SkippedRow};
use super::repository::{ClientRepository, FeeRecordRepository, RepositoryError};

/// Client registry plus the yearly fee records attached to each client.
pub struct ClientService<R, F> {
    clients: Arc<R>,
    fees: Arc<F>,
    sequence: AtomicU64,
}

impl<R, F> ClientService<R, F>
where
    R: ClientRepository + 'static,
    F: FeeRecordRepository + 'static,
{
    pub fn new(clients: Arc<R>, fees: Arc<F>) -> Self {
        Self {
            clients,
            fees,
            sequence: AtomicU64::new(1),
        }
    }

    fn next_client_id(&self) -> ClientId {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        ClientId(format!("cli-{id:06}"))
    }

    fn ensure_unique_tax_id(
        &self,
        tax_id: &TaxId,
        owner: Option<&ClientId>,
    ) -> Result<(), ClientServiceError> {
        match self.clients.find_by_tax_id(tax_id)? {
            Some(existing) if Some(&existing.id) != owner => {
                Err(ClientServiceError::DuplicateTaxId(tax_id.clone()))
            }
            _ => Ok(()),
        }
    }

    pub fn create(&self, profile: ClientProfile) -> Result<Client, ClientServiceError> {
        self.ensure_unique_tax_id(&profile.tax_id, None)?;
        let client = Client::from_profile(self.next_client_id(), profile)?;
        let stored = self.clients.insert(client)?;
        info!(client_id = %stored.id, tax_id = %stored.tax_id, "client created");
        Ok(stored)
    }

    pub fn get(&self, id: &ClientId) -> Result<Client, ClientServiceError> {
        self.clients
            .fetch(id)?
            .ok_or_else(|| ClientServiceError::NotFound(id.clone()))
    }

    pub fn list(&self) -> Result<Vec<Client>, ClientServiceError> {
        let mut clients = self.clients.list()?;
        clients.sort_by(|a, b| a.legal_name.to_lowercase().cmp(&b.legal_name.to_lowercase()));
        Ok(clients)
    }

    pub fn update(&self, id: &ClientId, profile: ClientProfile) -> Result<Client, ClientServiceError> {
        self.get(id)?;
        self.ensure_unique_tax_id(&profile.tax_id, Some(id))?;
        let client = Client::from_profile(id.clone(), profile)?;
        let stored = self.clients.update(client)?;
        info!(client_id = %stored.id, "client updated");
        Ok(stored)
    }

    pub fn delete(&self, id: &ClientId) -> Result<(), ClientServiceError> {
        self.clients.delete(id).map_err(|err| match err {
            RepositoryError::NotFound => ClientServiceError::NotFound(id.clone()),
            other => other.into(),
        })?;
        info!(client_id = %id, "client deleted");
        Ok(())
    }

    /// Stored record or an all-false one; reading never creates a record.
    pub fn fee(&self, client_id: &ClientId, year: i32) -> Result<ClientFeeRecord, ClientServiceError> {
        self.get(client_id)?;
        Ok(self
            .fees
            .fetch(client_id, year)?
            .unwrap_or_else(|| ClientFeeRecord::empty(client_id.clone(), year)))
    }

    pub fn toggle_fee(
        &self,
        client_id: &ClientId,
        year: i32,
        flag: FeeFlag,
    ) -> Result<ClientFeeRecord, ClientServiceError> {
        let mut record = self.fee(client_id, year)?;
        let value = record.toggle(flag);
        let stored = self.fees.upsert(record)?;
        info!(client_id = %client_id, year, flag = flag.label(), value, "fee flag toggled");
        Ok(stored)
    }

    pub fn set_protocol(
        &self,
        client_id: &ClientId,
        year: i32,
        protocol: &str,
    ) -> Result<ClientFeeRecord, ClientServiceError> {
        let mut record = self.fee(client_id, year)?;
        record.protocol = protocol.trim().to_string();
        Ok(self.fees.upsert(record)?)
    }

    /// Imports a roster CSV. Clients whose tax id is already registered are skipped.
    pub fn import_roster<Rd: Read>(&self, reader: Rd) -> Result<ImportReport, ClientServiceError> {
        let parse = ClientRosterImporter::from_reader(reader)?;
        let mut report = ImportReport {
            imported: Vec::new(),
            skipped: parse.skipped,
        };

        for (line, profile) in parse.profiles {
            let tax_id = profile.tax_id.to_string();
            match self.create(profile) {
                Ok(client) => report.imported.push(client.id),
                Err(ClientServiceError::DuplicateTaxId(_)) => report.skipped.push(SkippedRow {
                    line,
                    tax_id: Some(tax_id),
                    reason: "client already registered".to_string(),
                }),
                Err(err) => return Err(err),
            }
        }

        report.skipped.sort_by_key(|row| row.line);
        if !report.skipped.is_empty() {
            warn!(skipped = report.skipped.len(), "client roster rows skipped");
        }
        info!(imported = report.imported.len(), "client roster imported");
        Ok(report)
    }
}

/// Autosave target for the `protocolo` field of one fee record.
pub struct ProtocolSink<R, F> {
    service: Arc<ClientService<R, F>>,
    client_id: ClientId,
    year: i32,
}

impl<R, F> ProtocolSink<R, F> {
    pub fn new(service: Arc<ClientService<R, F>>, client_id: ClientId, year: i32) -> Self {
        Self {
            service,
            client_id,
            year,
        }
    }
}

impl<R, F> FieldSink for ProtocolSink<R, F>
where
    R: ClientRepository + 'static,
    F: FeeRecordRepository + 'static,
{
    fn persist(&self, value: &str) -> Result<String, AutosaveError> {
        self.service
            .set_protocol(&self.client_id, self.year, value)
            .map(|record| record.protocol)
            .map_err(|err| AutosaveError::Save(err.to_string()))
    }
}

/// Error raised by the client service.
#[derive(Debug, thiserror::Error)]
pub enum ClientServiceError {
    #[error(transparent)]
    Validation(#[from] ClientValidationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Import(#[from] ClientImportError),
    #[error("client {0} not found")]
    NotFound(ClientId),
    #[error("tax id {0} is already registered")]
    DuplicateTaxId(TaxId),
}
