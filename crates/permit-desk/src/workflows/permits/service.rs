use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{Clock, Permit, PermitId, PermitType, StagedDocument, SystemClock};
use super::extraction::{
    ExtractionConfirmation, ExtractionDraft, ExtractionError, PermitExtractor,
};
use super::fees::{AnnualFee, FeePatch};
use super::history::NoteEntry;
use super::lifecycle::LifecycleState;
use super::report::PermitReport;
use super::repository::{
    DocumentId, DocumentLink, DocumentStore, DocumentStoreError, PermitRepository,
    RepositoryError, StoredDocument, UploadMetadata,
};
use super::status::{
    days_until_expiration, remaining_time_label, PermitStatus, StatusBadge, StatusPolicy,
};
use super::transitions::{
    self, ActionContext, FinalizeInput, NewPermit, PermitEdit, RenewalForm, TransitionPlan,
    WorkflowError,
};
use crate::workflows::clients::domain::ClientId;
use crate::workflows::clients::repository::ClientRepository;

/// Permit record together with everything derived from it for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitView {
    #[serde(flatten)]
    pub permit: Permit,
    pub lifecycle: LifecycleState,
    pub status: PermitStatus,
    pub badges: Vec<StatusBadge>,
    pub days_until_expiration: Option<i64>,
    pub remaining_time: String,
}

impl PermitView {
    pub fn new(permit: Permit, policy: &StatusPolicy, today: NaiveDate) -> Self {
        let days = days_until_expiration(permit.expiration_date, today);
        Self {
            lifecycle: LifecycleState::of(&permit),
            status: policy.compute_status(&permit, today),
            badges: policy.display_badges(&permit, today),
            days_until_expiration: days,
            remaining_time: remaining_time_label(days),
            permit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedDocument {
    pub document_id: DocumentId,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedUpload {
    pub file_name: String,
    pub reason: String,
}

/// Result of a transition that was persisted.
///
/// Upload failures do not undo the persisted record; they are listed here so the
/// caller can retry just the upload through `attach_documents`. When the files were
/// stored but their attachment note was not, `note_failure` is set and the note can
/// be recorded alone through `record_attachment_note`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub permit: PermitView,
    pub uploaded: Vec<UploadedDocument>,
    pub failed_uploads: Vec<FailedUpload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_failure: Option<String>,
}

impl TransitionOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed_uploads.is_empty() && self.note_failure.is_none()
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        self.uploaded
            .iter()
            .map(|document| document.file_name.clone())
            .collect()
    }
}

/// Listing entry for stored documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitDocument {
    #[serde(flatten)]
    pub document: StoredDocument,
    /// Advisory: some note seems to mention this file.
    pub mentioned_in_notes: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitFilter {
    #[serde(default)]
    pub client_id: Option<ClientId>,
    #[serde(default)]
    pub status: Option<PermitStatus>,
}

/// Action boundary for permits: runs workflow plans against the collaborators.
pub struct PermitService<R, C> {
    repository: Arc<R>,
    clients: Arc<C>,
    documents: Arc<dyn DocumentStore>,
    extractor: Arc<dyn PermitExtractor>,
    clock: Arc<dyn Clock>,
    policy: StatusPolicy,
    sequence: AtomicU64,
    in_flight: Mutex<HashSet<PermitId>>,
}

/// Marks a permit as busy until dropped.
struct SubmissionGuard<'a> {
    in_flight: &'a Mutex<HashSet<PermitId>>,
    id: PermitId,
}

impl Drop for SubmissionGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl<R, C> PermitService<R, C>
where
    R: PermitRepository + 'static,
    C: ClientRepository + 'static,
{
    pub fn new(
        repository: Arc<R>,
        clients: Arc<C>,
        documents: Arc<dyn DocumentStore>,
        extractor: Arc<dyn PermitExtractor>,
    ) -> Self {
        Self {
            repository,
            clients,
            documents,
            extractor,
            clock: Arc::new(SystemClock),
            policy: StatusPolicy::default(),
            sequence: AtomicU64::new(1),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: StatusPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &StatusPolicy {
        &self.policy
    }

    fn next_permit_id(&self) -> PermitId {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        PermitId(format!("alv-{id:06}"))
    }

    fn context(&self, author: &str) -> ActionContext {
        ActionContext::new(author, self.clock.now())
    }

    fn view(&self, permit: Permit) -> PermitView {
        PermitView::new(permit, &self.policy, self.clock.today())
    }

    fn begin(&self, id: &PermitId) -> Result<SubmissionGuard<'_>, PermitServiceError> {
        let mut busy = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !busy.insert(id.clone()) {
            return Err(PermitServiceError::SubmissionInFlight(id.clone()));
        }

        Ok(SubmissionGuard {
            in_flight: &self.in_flight,
            id: id.clone(),
        })
    }

    fn load(&self, id: &PermitId) -> Result<Permit, PermitServiceError> {
        self.repository
            .fetch(id)?
            .ok_or_else(|| PermitServiceError::NotFound(id.clone()))
    }

    fn check_client(
        &self,
        client_id: &ClientId,
        permit_type: PermitType,
    ) -> Result<(), PermitServiceError> {
        let client = self
            .clients
            .fetch(client_id)?
            .ok_or_else(|| PermitServiceError::UnknownClient(client_id.clone()))?;

        if client.allows(permit_type) {
            Ok(())
        } else {
            Err(PermitServiceError::TypeNotAllowed {
                client_id: client_id.clone(),
                permit_type: permit_type.label(),
            })
        }
    }

    /// Appends the attachment note for files that are already stored.
    fn append_attachment_note(
        &self,
        permit: Permit,
        names: &[String],
        ctx: &ActionContext,
    ) -> Result<Permit, RepositoryError> {
        match NoteEntry::attachment(names, &ctx.author, ctx.now) {
            Some(entry) => {
                let mut next = permit;
                next.notes.append(entry);
                self.repository.update(next)
            }
            None => Ok(permit),
        }
    }

    /// Persists the planned record, then uploads. A failed upload is reported in the
    /// outcome and never rolls the record back.
    fn execute(
        &self,
        plan: TransitionPlan,
        ctx: &ActionContext,
    ) -> Result<TransitionOutcome, PermitServiceError> {
        let TransitionPlan {
            transition,
            from,
            to,
            next,
            uploads,
        } = plan;

        let mut permit = if transition == transitions::Transition::AttachDocuments {
            next
        } else {
            self.repository.update(next)?
        };

        let metadata = UploadMetadata {
            author: ctx.author.clone(),
            uploaded_at: ctx.now,
        };
        let mut uploaded = Vec::new();
        let mut failed_uploads = Vec::new();
        for document in &uploads {
            match self.documents.upload(&permit.id, document, &metadata) {
                Ok(document_id) => uploaded.push(UploadedDocument {
                    document_id,
                    file_name: document.file_name.clone(),
                }),
                Err(err) => {
                    warn!(
                        permit_id = %permit.id,
                        file_name = %document.file_name,
                        error = %err,
                        "document upload failed"
                    );
                    failed_uploads.push(FailedUpload {
                        file_name: document.file_name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let names: Vec<String> = uploaded.iter().map(|doc| doc.file_name.clone()).collect();
        let mut note_failure = None;
        match self.append_attachment_note(permit.clone(), &names, ctx) {
            Ok(stored) => permit = stored,
            Err(err) => {
                warn!(
                    permit_id = %permit.id,
                    files = names.len(),
                    error = %err,
                    "attachment note not recorded"
                );
                note_failure = Some(err.to_string());
            }
        }

        info!(
            permit_id = %permit.id,
            %transition,
            %from,
            %to,
            uploaded = uploaded.len(),
            failed = failed_uploads.len(),
            note_recorded = note_failure.is_none(),
            "permit transition committed"
        );

        Ok(TransitionOutcome {
            permit: self.view(permit),
            uploaded,
            failed_uploads,
            note_failure,
        })
    }

    /// Opens a new permit for an existing client.
    pub fn create(&self, input: NewPermit, author: &str) -> Result<PermitView, PermitServiceError> {
        self.check_client(&input.client_id, input.permit_type)?;
        let ctx = self.context(author);
        let permit = transitions::create(input, self.next_permit_id(), &ctx)?;
        let stored = self.repository.insert(permit)?;
        info!(permit_id = %stored.id, client_id = %stored.client_id, "permit created");
        Ok(self.view(stored))
    }

    pub fn get(&self, id: &PermitId) -> Result<PermitView, PermitServiceError> {
        Ok(self.view(self.load(id)?))
    }

    pub fn list(&self, filter: &PermitFilter) -> Result<Vec<PermitView>, PermitServiceError> {
        let permits = match &filter.client_id {
            Some(client_id) => self.repository.list_by_client(client_id)?,
            None => self.repository.list()?,
        };

        Ok(permits
            .into_iter()
            .map(|permit| self.view(permit))
            .filter(|view| filter.status.map_or(true, |status| view.status == status))
            .collect())
    }

    pub fn report(&self) -> Result<PermitReport, PermitServiceError> {
        let permits = self.repository.list()?;
        Ok(PermitReport::build(
            &permits,
            self.clock.today(),
            &self.policy,
        ))
    }

    pub fn edit(
        &self,
        id: &PermitId,
        changes: PermitEdit,
        author: &str,
    ) -> Result<PermitView, PermitServiceError> {
        let _guard = self.begin(id)?;
        let current = self.load(id)?;
        let next = transitions::edit(&current, changes, &self.context(author))?;
        if next.client_id != current.client_id || next.permit_type != current.permit_type {
            self.check_client(&next.client_id, next.permit_type)?;
        }
        let stored = self.repository.update(next)?;
        info!(permit_id = %stored.id, "permit edited");
        Ok(self.view(stored))
    }

    pub fn finalize(
        &self,
        id: &PermitId,
        input: FinalizeInput,
        author: &str,
    ) -> Result<TransitionOutcome, PermitServiceError> {
        let _guard = self.begin(id)?;
        let ctx = self.context(author);
        let plan = transitions::finalize(&self.load(id)?, input, &ctx)?;
        self.execute(plan, &ctx)
    }

    pub fn enter_renewal(
        &self,
        id: &PermitId,
        note: Option<&str>,
        author: &str,
    ) -> Result<TransitionOutcome, PermitServiceError> {
        let _guard = self.begin(id)?;
        let ctx = self.context(author);
        let plan = transitions::enter_renewal(&self.load(id)?, note, &ctx)?;
        self.execute(plan, &ctx)
    }

    /// On success the form keeps only the files whose upload failed.
    pub fn update_renewal(
        &self,
        id: &PermitId,
        form: &mut RenewalForm,
        author: &str,
    ) -> Result<TransitionOutcome, PermitServiceError> {
        let _guard = self.begin(id)?;
        let ctx = self.context(author);
        let plan = transitions::update_renewal(&self.load(id)?, form, &ctx)?;
        let outcome = self.execute(plan, &ctx)?;
        reset_renewal_form(form, &outcome);
        Ok(outcome)
    }

    pub fn finalize_renewal(
        &self,
        id: &PermitId,
        form: &mut RenewalForm,
        author: &str,
    ) -> Result<TransitionOutcome, PermitServiceError> {
        let _guard = self.begin(id)?;
        let ctx = self.context(author);
        let plan = transitions::finalize_renewal(&self.load(id)?, form, &ctx)?;
        let outcome = self.execute(plan, &ctx)?;
        reset_renewal_form(form, &outcome);
        Ok(outcome)
    }

    /// Uploads documents for any permit; used to retry a failed upload step.
    pub fn attach_documents(
        &self,
        id: &PermitId,
        documents: Vec<StagedDocument>,
        author: &str,
    ) -> Result<TransitionOutcome, PermitServiceError> {
        let _guard = self.begin(id)?;
        let ctx = self.context(author);
        let plan = transitions::attach_documents(&self.load(id)?, documents)?;
        self.execute(plan, &ctx)
    }

    /// Records the attachment note for files whose upload already succeeded.
    pub fn record_attachment_note(
        &self,
        id: &PermitId,
        file_names: &[String],
        author: &str,
    ) -> Result<PermitView, PermitServiceError> {
        if file_names.is_empty() {
            return Err(WorkflowError::EmptyUpdate.into());
        }

        let _guard = self.begin(id)?;
        let ctx = self.context(author);
        let stored = self.append_attachment_note(self.load(id)?, file_names, &ctx)?;
        info!(permit_id = %stored.id, files = file_names.len(), "attachment note recorded");
        Ok(self.view(stored))
    }

    pub fn fee(&self, id: &PermitId, year: i32) -> Result<AnnualFee, PermitServiceError> {
        Ok(self.load(id)?.fees.get_or_default(year))
    }

    pub fn upsert_fee(
        &self,
        id: &PermitId,
        year: i32,
        patch: &FeePatch,
    ) -> Result<AnnualFee, PermitServiceError> {
        let _guard = self.begin(id)?;
        let mut permit = self.load(id)?;
        permit.fees.upsert(year, patch);
        let stored = self.repository.update(permit)?;
        Ok(stored.fees.get_or_default(year))
    }

    pub fn delete(&self, id: &PermitId, confirmed: bool) -> Result<(), PermitServiceError> {
        transitions::confirm_delete(confirmed)?;
        let _guard = self.begin(id)?;
        self.repository.delete(id).map_err(|err| match err {
            RepositoryError::NotFound => PermitServiceError::NotFound(id.clone()),
            other => other.into(),
        })?;
        info!(permit_id = %id, "permit deleted");
        Ok(())
    }

    pub fn documents(&self, id: &PermitId) -> Result<Vec<PermitDocument>, PermitServiceError> {
        let permit = self.load(id)?;
        let stored = self.documents.list_by_owner(id)?;
        Ok(stored
            .into_iter()
            .map(|document| PermitDocument {
                mentioned_in_notes: permit
                    .notes
                    .attachment_notes()
                    .any(|note| note.mentions_file(&document.file_name)),
                document,
            })
            .collect())
    }

    /// Fresh signed link; links are never cached.
    pub fn download_link(&self, id: &DocumentId) -> Result<DocumentLink, PermitServiceError> {
        Ok(self.documents.download_link(id)?)
    }

    /// Reads a PDF and prepares the fields for review. Nothing is persisted.
    pub fn extract(&self, document: &StagedDocument) -> Result<ExtractionDraft, PermitServiceError> {
        if !document.is_pdf() {
            return Err(ExtractionError::NotPdf(document.file_name.clone()).into());
        }

        let extracted = self.extractor.extract(document)?;
        let clients = self.clients.list()?;
        let draft = ExtractionDraft::build(&document.file_name, extracted, &clients);
        info!(
            file_name = %document.file_name,
            confidence = draft.confidence,
            client_matched = draft.client.is_some(),
            "permit document extracted"
        );
        Ok(draft)
    }

    /// Creates a permit from reviewed extraction data and stores the source PDF.
    ///
    /// Every validation runs before the first write.
    pub fn import_extracted(
        &self,
        confirmation: ExtractionConfirmation,
        document: StagedDocument,
        author: &str,
    ) -> Result<TransitionOutcome, PermitServiceError> {
        if !document.is_pdf() {
            return Err(ExtractionError::NotPdf(document.file_name.clone()).into());
        }

        let ctx = self.context(author);
        let import = confirmation.into_import(document, ctx.today())?;
        self.check_client(&import.new_permit.client_id, import.new_permit.permit_type)?;

        let created = transitions::create(import.new_permit, self.next_permit_id(), &ctx)?;
        let plan = match import.finalize {
            Some(input) => transitions::finalize(&created, input, &ctx)?,
            None => transitions::attach_documents(&created, vec![import.document])?,
        };

        let stored = self.repository.insert(created)?;
        let _guard = self.begin(&stored.id)?;
        info!(permit_id = %stored.id, "permit imported from extraction");
        self.execute(plan, &ctx)
    }
}

fn reset_renewal_form(form: &mut RenewalForm, outcome: &TransitionOutcome) {
    form.note_buffer.clear();
    form.expiration_date = None;
    form.staged.retain(|document| {
        outcome
            .failed_uploads
            .iter()
            .any(|failed| failed.file_name == document.file_name)
    });
}

/// Error raised by the permit service.
#[derive(Debug, thiserror::Error)]
pub enum PermitServiceError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Documents(#[from] DocumentStoreError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("permit {0} not found")]
    NotFound(PermitId),
    #[error("client {0} not found")]
    UnknownClient(ClientId),
    #[error("client {client_id} may not request {permit_type}")]
    TypeNotAllowed {
        client_id: ClientId,
        permit_type: &'static str,
    },
    #[error("another submission for permit {0} is still running")]
    SubmissionInFlight(PermitId),
}
