use chrono::{Duration, Local, NaiveDate};
use metrics_exporter_prometheus::PrometheusHandle;
use permit_desk::workflows::clients::{
    Client, ClientFeeRecord, ClientId, ClientRepository, FeeRecordRepository, TaxId,
};
use permit_desk::workflows::permits::{
    parse_date_from_input, DocumentId, DocumentLink, DocumentStore, DocumentStoreError,
    ExtractedPermitData, ExtractionError, Permit, PermitExtractor, PermitId, PermitRepository,
    RepositoryError, StagedDocument, StoredDocument, UploadMetadata,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

const LINK_TTL_MINUTES: i64 = 15;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryPermitRepository {
    records: Arc<Mutex<BTreeMap<PermitId, Permit>>>,
}

impl PermitRepository for InMemoryPermitRepository {
    fn insert(&self, permit: Permit) -> Result<Permit, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&permit.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(permit.id.clone(), permit.clone());
        Ok(permit)
    }

    fn update(&self, permit: Permit) -> Result<Permit, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&permit.id) {
            guard.insert(permit.id.clone(), permit.clone());
            Ok(permit)
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &PermitId) -> Result<Option<Permit>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Permit>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    fn list_by_client(&self, client_id: &ClientId) -> Result<Vec<Permit>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|permit| permit.client_id == *client_id)
            .cloned()
            .collect())
    }

    fn delete(&self, id: &PermitId) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.remove(id).map(|_| ()).ok_or(RepositoryError::NotFound)
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryClientRepository {
    records: Arc<Mutex<BTreeMap<ClientId, Client>>>,
}

impl ClientRepository for InMemoryClientRepository {
    fn insert(&self, client: Client) -> Result<Client, RepositoryError> {
        let mut guard = self.records.lock().expect("client mutex poisoned");
        if guard.contains_key(&client.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(client.id.clone(), client.clone());
        Ok(client)
    }

    fn update(&self, client: Client) -> Result<Client, RepositoryError> {
        let mut guard = self.records.lock().expect("client mutex poisoned");
        if guard.contains_key(&client.id) {
            guard.insert(client.id.clone(), client.clone());
            Ok(client)
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &ClientId) -> Result<Option<Client>, RepositoryError> {
        let guard = self.records.lock().expect("client mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_by_tax_id(&self, tax_id: &TaxId) -> Result<Option<Client>, RepositoryError> {
        let guard = self.records.lock().expect("client mutex poisoned");
        Ok(guard.values().find(|client| client.tax_id == *tax_id).cloned())
    }

    fn list(&self) -> Result<Vec<Client>, RepositoryError> {
        let guard = self.records.lock().expect("client mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    fn delete(&self, id: &ClientId) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("client mutex poisoned");
        guard.remove(id).map(|_| ()).ok_or(RepositoryError::NotFound)
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryFeeRecordRepository {
    records: Arc<Mutex<HashMap<(ClientId, i32), ClientFeeRecord>>>,
}

impl FeeRecordRepository for InMemoryFeeRecordRepository {
    fn fetch(
        &self,
        client_id: &ClientId,
        year: i32,
    ) -> Result<Option<ClientFeeRecord>, RepositoryError> {
        let guard = self.records.lock().expect("fee mutex poisoned");
        Ok(guard.get(&(client_id.clone(), year)).cloned())
    }

    fn upsert(&self, record: ClientFeeRecord) -> Result<ClientFeeRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("fee mutex poisoned");
        guard.insert((record.client_id.clone(), record.year), record.clone());
        Ok(record)
    }
}

struct StoredBlob {
    meta: StoredDocument,
    size: usize,
}

/// Keeps uploaded files in memory and hands out short-lived links to them.
#[derive(Default, Clone)]
pub(crate) struct InMemoryDocumentStore {
    blobs: Arc<Mutex<Vec<StoredBlob>>>,
}

impl InMemoryDocumentStore {
    pub(crate) fn total_bytes(&self) -> usize {
        let guard = self.blobs.lock().expect("document mutex poisoned");
        guard.iter().map(|blob| blob.size).sum()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn upload(
        &self,
        owner: &PermitId,
        document: &StagedDocument,
        metadata: &UploadMetadata,
    ) -> Result<DocumentId, DocumentStoreError> {
        if document.content.is_empty() {
            return Err(DocumentStoreError::Rejected(format!(
                "{} is empty",
                document.file_name
            )));
        }

        let mut guard = self.blobs.lock().expect("document mutex poisoned");
        let id = DocumentId(format!("doc-{:06}", guard.len() + 1));
        guard.push(StoredBlob {
            meta: StoredDocument {
                id: id.clone(),
                owner_id: owner.clone(),
                file_name: document.file_name.clone(),
                content_type: document.mime_type().to_string(),
                uploaded_at: metadata.uploaded_at,
            },
            size: document.content.len(),
        });
        Ok(id)
    }

    fn list_by_owner(&self, owner: &PermitId) -> Result<Vec<StoredDocument>, DocumentStoreError> {
        let guard = self.blobs.lock().expect("document mutex poisoned");
        Ok(guard
            .iter()
            .filter(|blob| blob.meta.owner_id == *owner)
            .map(|blob| blob.meta.clone())
            .collect())
    }

    fn download_link(&self, id: &DocumentId) -> Result<DocumentLink, DocumentStoreError> {
        let guard = self.blobs.lock().expect("document mutex poisoned");
        let blob = guard
            .iter()
            .find(|blob| blob.meta.id == *id)
            .ok_or(DocumentStoreError::NotFound)?;

        let expires_at = Local::now().naive_local() + Duration::minutes(LINK_TTL_MINUTES);
        Ok(DocumentLink {
            document_id: blob.meta.id.clone(),
            url: format!(
                "memory://documents/{}?expires={}",
                blob.meta.id,
                expires_at.and_utc().timestamp()
            ),
            expires_at,
        })
    }
}

/// Stand-in used when no extraction backend is configured.
#[derive(Default, Clone, Copy)]
pub(crate) struct DisabledExtractor;

impl PermitExtractor for DisabledExtractor {
    fn extract(&self, _document: &StagedDocument) -> Result<ExtractedPermitData, ExtractionError> {
        Err(ExtractionError::Unavailable(
            "no extraction backend configured".to_string(),
        ))
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    parse_date_from_input(raw).ok_or_else(|| format!("failed to parse '{raw}' as YYYY-MM-DD"))
}
