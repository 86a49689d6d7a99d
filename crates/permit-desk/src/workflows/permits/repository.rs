use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::domain::{ClientId, Permit, PermitId, StagedDocument};

/// Storage abstraction for permits; the backend owns the canonical record.
pub trait PermitRepository: Send + Sync {
    fn insert(&self, permit: Permit) -> Result<Permit, RepositoryError>;
    fn update(&self, permit: Permit) -> Result<Permit, RepositoryError>;
    fn fetch(&self, id: &PermitId) -> Result<Option<Permit>, RepositoryError>;
    fn list(&self) -> Result<Vec<Permit>, RepositoryError>;
    fn list_by_client(&self, client_id: &ClientId) -> Result<Vec<Permit>, RepositoryError>;
    fn delete(&self, id: &PermitId) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata sent along with each upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub author: String,
    pub uploaded_at: NaiveDateTime,
}

/// Listing entry returned by the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub id: DocumentId,
    pub owner_id: PermitId,
    pub file_name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub uploaded_at: NaiveDateTime,
}

/// Time-limited download URL. Fetched again for every view, never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLink {
    pub document_id: DocumentId,
    pub url: String,
    pub expires_at: NaiveDateTime,
}

/// File storage collaborator: send bytes, get an identifier back.
pub trait DocumentStore: Send + Sync {
    fn upload(
        &self,
        owner: &PermitId,
        document: &StagedDocument,
        metadata: &UploadMetadata,
    ) -> Result<DocumentId, DocumentStoreError>;
    fn list_by_owner(&self, owner: &PermitId) -> Result<Vec<StoredDocument>, DocumentStoreError>;
    fn download_link(&self, id: &DocumentId) -> Result<DocumentLink, DocumentStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentStoreError {
    #[error("document not found")]
    NotFound,
    #[error("document rejected: {0}")]
    Rejected(String),
    #[error("document store unavailable: {0}")]
    Unavailable(String),
}
