use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::workflows::clients::domain::{Client, ClientProfile, TaxId};
use crate::workflows::clients::repository::ClientRepository;
use crate::workflows::permits::domain::{
    ClientId, FixedClock, Permit, PermitId, PermitType, ProcessingStatus, StagedDocument,
};
use crate::workflows::permits::extraction::{ExtractedPermitData, ExtractionError, PermitExtractor};
use crate::workflows::permits::fees::FeeLedger;
use crate::workflows::permits::history::NoteHistory;
use crate::workflows::permits::repository::{
    DocumentId, DocumentLink, DocumentStore, DocumentStoreError, PermitRepository,
    RepositoryError, StoredDocument, UploadMetadata,
};
use crate::workflows::permits::service::PermitService;
use crate::workflows::permits::transitions::ActionContext;

pub(crate) const CLIENT_CNPJ: &str = "11.222.333/0001-81";

pub(crate) fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 5, 20)
        .and_then(|date| date.and_hms_opt(10, 0, 0))
        .expect("valid timestamp")
}

pub(crate) fn today() -> NaiveDate {
    now().date()
}

pub(crate) fn context() -> ActionContext {
    ActionContext::new("ana", now())
}

/// Permit in opening for client `cli-1`.
pub(crate) fn permit(id: &str) -> Permit {
    Permit {
        id: PermitId(id.to_string()),
        client_id: ClientId("cli-1".to_string()),
        permit_type: PermitType::Functioning,
        request_date: NaiveDate::from_ymd_opt(2025, 1, 6).expect("valid date"),
        issue_date: None,
        expiration_date: None,
        processing_status: ProcessingStatus::Started,
        exempt: false,
        no_fixed_location: false,
        notes: NoteHistory::default(),
        fees: FeeLedger::default(),
    }
}

/// Issued permit, valid until 2026-01-10.
pub(crate) fn active_permit(id: &str) -> Permit {
    let mut record = permit(id);
    record.issue_date = NaiveDate::from_ymd_opt(2025, 1, 10);
    record.expiration_date = NaiveDate::from_ymd_opt(2026, 1, 10);
    record
}

pub(crate) fn pdf(name: &str) -> StagedDocument {
    StagedDocument::new(name, b"%PDF-1.7".to_vec())
}

pub(crate) fn client(id: &str) -> Client {
    let tax_id = TaxId::parse(CLIENT_CNPJ).expect("valid cnpj");
    Client::from_profile(
        ClientId(id.to_string()),
        ClientProfile::new(tax_id, "Padaria Central LTDA"),
    )
    .expect("valid client")
}

pub(crate) type TestService = PermitService<MemoryPermitRepository, MemoryClientRepository>;

pub(crate) struct Harness {
    pub(crate) service: Arc<TestService>,
    pub(crate) repository: Arc<MemoryPermitRepository>,
    pub(crate) clients: Arc<MemoryClientRepository>,
    pub(crate) documents: Arc<MemoryDocumentStore>,
}

pub(crate) fn harness() -> Harness {
    harness_with(Arc::new(MemoryDocumentStore::default()))
}

pub(crate) fn harness_with(documents: Arc<MemoryDocumentStore>) -> Harness {
    let repository = Arc::new(MemoryPermitRepository::default());
    let clients = Arc::new(MemoryClientRepository::default());
    clients.insert(client("cli-1")).expect("seed client");

    let service = PermitService::new(
        repository.clone(),
        clients.clone(),
        documents.clone(),
        Arc::new(StubExtractor::default()),
    )
    .with_clock(Arc::new(FixedClock(now())));

    Harness {
        service: Arc::new(service),
        repository,
        clients,
        documents,
    }
}

#[derive(Default, Clone)]
pub(crate) struct MemoryPermitRepository {
    pub(crate) records: Arc<Mutex<BTreeMap<PermitId, Permit>>>,
}

impl MemoryPermitRepository {
    pub(crate) fn stored(&self, id: &str) -> Permit {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .get(&PermitId(id.to_string()))
            .cloned()
            .expect("permit stored")
    }
}

impl PermitRepository for MemoryPermitRepository {
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
        if !guard.contains_key(&permit.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(permit.id.clone(), permit.clone());
        Ok(permit)
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
pub(crate) struct MemoryClientRepository {
    records: Arc<Mutex<BTreeMap<ClientId, Client>>>,
}

impl ClientRepository for MemoryClientRepository {
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
        if !guard.contains_key(&client.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(client.id.clone(), client.clone());
        Ok(client)
    }

    fn fetch(&self, id: &ClientId) -> Result<Option<Client>, RepositoryError> {
        Ok(self.records.lock().expect("client mutex poisoned").get(id).cloned())
    }

    fn find_by_tax_id(&self, tax_id: &TaxId) -> Result<Option<Client>, RepositoryError> {
        let guard = self.records.lock().expect("client mutex poisoned");
        Ok(guard.values().find(|client| client.tax_id == *tax_id).cloned())
    }

    fn list(&self) -> Result<Vec<Client>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("client mutex poisoned")
            .values()
            .cloned()
            .collect())
    }

    fn delete(&self, id: &ClientId) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("client mutex poisoned");
        guard.remove(id).map(|_| ()).ok_or(RepositoryError::NotFound)
    }
}

/// Document store that rejects uploads for the configured file names.
#[derive(Default)]
pub(crate) struct MemoryDocumentStore {
    failing: Mutex<HashSet<String>>,
    stored: Mutex<Vec<StoredDocument>>,
}

impl MemoryDocumentStore {
    pub(crate) fn failing_on(names: &[&str]) -> Self {
        let store = Self::default();
        store
            .failing
            .lock()
            .expect("store mutex poisoned")
            .extend(names.iter().map(|name| name.to_string()));
        store
    }

    pub(crate) fn recover(&self) {
        self.failing.lock().expect("store mutex poisoned").clear();
    }

    pub(crate) fn stored(&self) -> Vec<StoredDocument> {
        self.stored.lock().expect("store mutex poisoned").clone()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn upload(
        &self,
        owner: &PermitId,
        document: &StagedDocument,
        metadata: &UploadMetadata,
    ) -> Result<DocumentId, DocumentStoreError> {
        if self
            .failing
            .lock()
            .expect("store mutex poisoned")
            .contains(&document.file_name)
        {
            return Err(DocumentStoreError::Unavailable("upload timed out".to_string()));
        }

        let mut stored = self.stored.lock().expect("store mutex poisoned");
        let id = DocumentId(format!("doc-{}", stored.len() + 1));
        stored.push(StoredDocument {
            id: id.clone(),
            owner_id: owner.clone(),
            file_name: document.file_name.clone(),
            content_type: document.mime_type().to_string(),
            uploaded_at: metadata.uploaded_at,
        });
        Ok(id)
    }

    fn list_by_owner(&self, owner: &PermitId) -> Result<Vec<StoredDocument>, DocumentStoreError> {
        Ok(self
            .stored()
            .into_iter()
            .filter(|document| document.owner_id == *owner)
            .collect())
    }

    fn download_link(&self, id: &DocumentId) -> Result<DocumentLink, DocumentStoreError> {
        self.stored()
            .into_iter()
            .find(|document| document.id == *id)
            .map(|document| DocumentLink {
                url: format!("memory://{}/{}", document.owner_id, document.file_name),
                document_id: document.id,
                expires_at: now() + chrono::Duration::minutes(15),
            })
            .ok_or(DocumentStoreError::NotFound)
    }
}

#[derive(Default)]
pub(crate) struct StubExtractor;

impl PermitExtractor for StubExtractor {
    fn extract(&self, document: &StagedDocument) -> Result<ExtractedPermitData, ExtractionError> {
        if document.content.is_empty() {
            return Err(ExtractionError::Failed("empty document".to_string()));
        }

        Ok(ExtractedPermitData {
            permit_type: Some("Alvará Sanitário".to_string()),
            tax_id: Some("11222333000181".to_string()),
            legal_name: Some("PADARIA CENTRAL LTDA".to_string()),
            issue_date: NaiveDate::from_ymd_opt(2025, 2, 1),
            expiration_date: NaiveDate::from_ymd_opt(2026, 2, 1),
            permit_number: Some("SAN-778/2025".to_string()),
            confidence: 91,
        })
    }
}

pub(crate) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
