use super::domain::{Client, ClientId, TaxId};
use super::fees::ClientFeeRecord;

pub use crate::workflows::permits::repository::RepositoryError;

/// Storage abstraction for clients.
pub trait ClientRepository: Send + Sync {
    fn insert(&self, client: Client) -> Result<Client, RepositoryError>;
    fn update(&self, client: Client) -> Result<Client, RepositoryError>;
    fn fetch(&self, id: &ClientId) -> Result<Option<Client>, RepositoryError>;
    fn find_by_tax_id(&self, tax_id: &TaxId) -> Result<Option<Client>, RepositoryError>;
    fn list(&self) -> Result<Vec<Client>, RepositoryError>;
    fn delete(&self, id: &ClientId) -> Result<(), RepositoryError>;
}

/// Storage for yearly fee records keyed by `(client, year)`.
pub trait FeeRecordRepository: Send + Sync {
    fn fetch(&self, client_id: &ClientId, year: i32) -> Result<Option<ClientFeeRecord>, RepositoryError>;
    /// Inserts or replaces the record for its `(client, year)` pair.
    fn upsert(&self, record: ClientFeeRecord) -> Result<ClientFeeRecord, RepositoryError>;
}
