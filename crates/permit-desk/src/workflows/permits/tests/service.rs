use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::NaiveDate;

use super::common::*;
use crate::workflows::clients::domain::{Client, ClientId, ClientProfile, TaxId};
use crate::workflows::clients::repository::ClientRepository;
use crate::workflows::permits::domain::{
    FixedClock, Permit, PermitId, PermitType, ProcessingStatus, StagedDocument,
};
use crate::workflows::permits::extraction::{ExtractionConfirmation, ExtractionError};
use crate::workflows::permits::fees::FeePatch;
use crate::workflows::permits::history::NoteKind;
use crate::workflows::permits::lifecycle::LifecycleState;
use crate::workflows::permits::repository::{
    DocumentId, DocumentLink, DocumentStore, DocumentStoreError, PermitRepository,
    RepositoryError, StoredDocument, UploadMetadata,
};
use crate::workflows::permits::service::{PermitFilter, PermitService, PermitServiceError};
use crate::workflows::permits::status::PermitStatus;
use crate::workflows::permits::transitions::{
    FinalizeInput, NewPermit, PermitEdit, RenewalForm, Requirement, WorkflowError,
};

fn new_permit(permit_type: PermitType) -> NewPermit {
    NewPermit::new(
        ClientId("cli-1".to_string()),
        permit_type,
        NaiveDate::from_ymd_opt(2025, 4, 1).expect("valid date"),
    )
}

#[test]
fn functioning_permit_scenario_requires_document_then_activates() {
    let harness = harness();
    let created = harness
        .service
        .create(new_permit(PermitType::Functioning), "ana")
        .expect("permit created");
    let id = created.permit.id.clone();
    assert_eq!(id, PermitId("alv-000001".to_string()));
    assert!(created.lifecycle.is_opening());

    let attempt = harness.service.finalize(
        &id,
        FinalizeInput {
            expiration_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            ..FinalizeInput::default()
        },
        "ana",
    );
    match attempt {
        Err(PermitServiceError::Workflow(WorkflowError::MissingRequirements(missing))) => {
            assert_eq!(missing, vec![Requirement::Document]);
        }
        other => panic!("expected document requirement, got {other:?}"),
    }
    assert_eq!(harness.repository.stored(&id.0), created.permit);

    let outcome = harness
        .service
        .finalize(
            &id,
            FinalizeInput {
                expiration_date: NaiveDate::from_ymd_opt(2025, 6, 1),
                documents: vec![pdf("alvara.pdf")],
                ..FinalizeInput::default()
            },
            "ana",
        )
        .expect("finalized");

    assert!(outcome.is_complete());
    assert_eq!(outcome.permit.lifecycle, LifecycleState::Active);
    assert_eq!(outcome.permit.permit.issue_date, Some(today()));
    assert_eq!(outcome.permit.status, PermitStatus::Expiring);
    assert_eq!(outcome.permit.days_until_expiration, Some(12));

    let stored = harness.repository.stored(&id.0);
    let notes = stored.notes.entries();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, NoteKind::Attachment);
    assert_eq!(notes[0].text, "Documento anexado: alvara.pdf");
    assert_eq!(harness.documents.stored().len(), 1);
}

#[test]
fn create_checks_client_and_allowed_types() {
    let harness = harness();

    let mut unknown = new_permit(PermitType::Sanitary);
    unknown.client_id = ClientId("cli-404".to_string());
    assert!(matches!(
        harness.service.create(unknown, "ana"),
        Err(PermitServiceError::UnknownClient(_))
    ));

    let tax_id = TaxId::parse("529.982.247-25").expect("valid cpf");
    let mut profile = ClientProfile::new(tax_id, "João Ambulante");
    profile.allowed_permit_types = vec![PermitType::Sanitary];
    harness
        .clients
        .insert(Client::from_profile(ClientId("cli-2".to_string()), profile).expect("valid"))
        .expect("client stored");

    let mut restricted = new_permit(PermitType::FireDepartment);
    restricted.client_id = ClientId("cli-2".to_string());
    assert!(matches!(
        harness.service.create(restricted, "ana"),
        Err(PermitServiceError::TypeNotAllowed { .. })
    ));
    assert!(harness.repository.list().expect("list").is_empty());
}

#[test]
fn failed_upload_keeps_finalized_dates() {
    let harness = harness_with(Arc::new(MemoryDocumentStore::failing_on(&["alvara.pdf"])));
    let id = harness
        .service
        .create(new_permit(PermitType::Sanitary), "ana")
        .expect("created")
        .permit
        .id;

    let outcome = harness
        .service
        .finalize(
            &id,
            FinalizeInput {
                expiration_date: NaiveDate::from_ymd_opt(2026, 5, 1),
                documents: vec![pdf("alvara.pdf")],
                ..FinalizeInput::default()
            },
            "ana",
        )
        .expect("dates persisted despite upload failure");

    assert!(!outcome.is_complete());
    assert_eq!(outcome.failed_uploads[0].file_name, "alvara.pdf");
    let stored = harness.repository.stored(&id.0);
    assert_eq!(stored.issue_date, Some(today()));
    assert!(stored.notes.is_empty());

    harness.documents.recover();
    let retry = harness
        .service
        .attach_documents(&id, vec![pdf("alvara.pdf")], "ana")
        .expect("retry succeeds");
    assert!(retry.is_complete());
    assert_eq!(harness.repository.stored(&id.0).notes.len(), 1);
}

fn renewing_permit(harness: &Harness) -> PermitId {
    let mut record = active_permit("alv-900");
    record.processing_status = ProcessingStatus::Renewal;
    harness.repository.insert(record).expect("seeded").id
}

#[test]
fn partial_renewal_upload_keeps_notes_and_successful_files() {
    let harness = harness_with(Arc::new(MemoryDocumentStore::failing_on(&["b.pdf"])));
    let id = renewing_permit(&harness);

    let mut form = RenewalForm {
        note_buffer: "Guia paga, aguardando vistoria".to_string(),
        ..RenewalForm::default()
    };
    form.stage(pdf("a.pdf"));
    form.stage(pdf("b.pdf"));

    let outcome = harness
        .service
        .update_renewal(&id, &mut form, "bruno")
        .expect("partial success");

    assert_eq!(outcome.uploaded.len(), 1);
    assert_eq!(outcome.failed_uploads.len(), 1);
    assert_eq!(outcome.permit.lifecycle, LifecycleState::Renewing);

    let stored = harness.repository.stored(&id.0);
    let notes = stored.notes.entries();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0].text, "Guia paga, aguardando vistoria");
    assert_eq!(notes[1].attachments, vec!["a.pdf".to_string()]);

    assert!(form.note_buffer.is_empty());
    assert_eq!(form.staged.len(), 1);
    assert_eq!(form.staged[0].file_name, "b.pdf");
}

#[test]
fn rejected_renewal_finalization_keeps_form() {
    let harness = harness();
    let id = renewing_permit(&harness);

    let mut form = RenewalForm {
        note_buffer: "Renovado".to_string(),
        ..RenewalForm::default()
    };
    form.stage(pdf("alvara-2026.pdf"));

    let err = harness
        .service
        .finalize_renewal(&id, &mut form, "ana")
        .expect_err("missing expiration date");
    assert!(matches!(err, PermitServiceError::Workflow(_)));
    assert_eq!(form.note_buffer, "Renovado");
    assert_eq!(form.staged.len(), 1);

    form.expiration_date = NaiveDate::from_ymd_opt(2026, 5, 20);
    let outcome = harness
        .service
        .finalize_renewal(&id, &mut form, "ana")
        .expect("finalized");
    assert_eq!(outcome.permit.lifecycle, LifecycleState::Active);
    assert_eq!(outcome.permit.permit.processing_status, ProcessingStatus::Started);
    assert!(form.is_empty());
}

#[test]
fn renewal_blocks_client_changes_through_service() {
    let harness = harness();
    let id = renewing_permit(&harness);

    let result = harness.service.edit(
        &id,
        PermitEdit {
            permit_type: Some(PermitType::Sanitary),
            ..PermitEdit::default()
        },
        "ana",
    );
    assert!(matches!(result, Err(PermitServiceError::Workflow(_))));
    assert_eq!(
        harness.repository.stored(&id.0).permit_type,
        PermitType::Functioning
    );
}

#[test]
fn edit_checks_new_client_and_type_on_active_permit() {
    let harness = harness();
    let id = harness
        .repository
        .insert(active_permit("alv-1"))
        .expect("seeded")
        .id;

    let unknown = harness.service.edit(
        &id,
        PermitEdit {
            client_id: Some(ClientId("cli-does-not-exist".to_string())),
            ..PermitEdit::default()
        },
        "ana",
    );
    assert!(matches!(unknown, Err(PermitServiceError::UnknownClient(_))));

    let tax_id = TaxId::parse("529.982.247-25").expect("valid cpf");
    let mut profile = ClientProfile::new(tax_id, "João Ambulante");
    profile.allowed_permit_types = vec![PermitType::Sanitary];
    harness
        .clients
        .insert(Client::from_profile(ClientId("cli-2".to_string()), profile).expect("valid"))
        .expect("client stored");

    let forbidden = harness.service.edit(
        &id,
        PermitEdit {
            client_id: Some(ClientId("cli-2".to_string())),
            ..PermitEdit::default()
        },
        "ana",
    );
    assert!(matches!(
        forbidden,
        Err(PermitServiceError::TypeNotAllowed { .. })
    ));

    let stored = harness.repository.stored(&id.0);
    assert_eq!(stored.client_id, ClientId("cli-1".to_string()));
    assert_eq!(stored.permit_type, PermitType::Functioning);

    let moved = harness
        .service
        .edit(
            &id,
            PermitEdit {
                client_id: Some(ClientId("cli-2".to_string())),
                permit_type: Some(PermitType::Sanitary),
                ..PermitEdit::default()
            },
            "ana",
        )
        .expect("allowed type for the new client");
    assert_eq!(moved.permit.client_id, ClientId("cli-2".to_string()));
}

/// Permit repository whose `update` fails once the given call is reached.
struct FailingUpdateRepository {
    inner: MemoryPermitRepository,
    updates: AtomicUsize,
    fail_from: usize,
}

impl PermitRepository for FailingUpdateRepository {
    fn insert(&self, permit: Permit) -> Result<Permit, RepositoryError> {
        self.inner.insert(permit)
    }

    fn update(&self, permit: Permit) -> Result<Permit, RepositoryError> {
        let call = self.updates.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.fail_from {
            return Err(RepositoryError::Unavailable("timeout".to_string()));
        }
        self.inner.update(permit)
    }

    fn fetch(&self, id: &PermitId) -> Result<Option<Permit>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn list(&self) -> Result<Vec<Permit>, RepositoryError> {
        self.inner.list()
    }

    fn list_by_client(&self, client_id: &ClientId) -> Result<Vec<Permit>, RepositoryError> {
        self.inner.list_by_client(client_id)
    }

    fn delete(&self, id: &PermitId) -> Result<(), RepositoryError> {
        self.inner.delete(id)
    }
}

#[test]
fn failed_attachment_note_is_reported_without_resubmitting_the_update() {
    let inner = MemoryPermitRepository::default();
    let mut record = active_permit("alv-900");
    record.processing_status = ProcessingStatus::Renewal;
    let id = inner.insert(record).expect("seeded").id;

    let repository = Arc::new(FailingUpdateRepository {
        inner: inner.clone(),
        updates: AtomicUsize::new(0),
        fail_from: 2,
    });
    let clients = Arc::new(MemoryClientRepository::default());
    clients.insert(client("cli-1")).expect("seed client");
    let documents = Arc::new(MemoryDocumentStore::default());
    let service = PermitService::new(
        repository.clone(),
        clients,
        documents.clone(),
        Arc::new(StubExtractor),
    )
    .with_clock(Arc::new(FixedClock(now())));

    let mut form = RenewalForm {
        note_buffer: "Guia paga".to_string(),
        ..RenewalForm::default()
    };
    form.stage(pdf("a.pdf"));

    let outcome = service
        .update_renewal(&id, &mut form, "bruno")
        .expect("update and upload committed");

    assert!(!outcome.is_complete());
    assert!(outcome.failed_uploads.is_empty());
    assert_eq!(outcome.uploaded_names(), vec!["a.pdf".to_string()]);
    assert_eq!(
        outcome.note_failure.as_deref(),
        Some("repository unavailable: timeout")
    );
    assert_eq!(documents.stored().len(), 1);

    let stored = inner.stored(&id.0);
    assert_eq!(stored.notes.len(), 1);
    assert_eq!(stored.notes.entries()[0].text, "Guia paga");

    assert!(form.note_buffer.is_empty());
    assert!(form.staged.is_empty());

    let retry = PermitService::new(
        Arc::new(inner.clone()),
        Arc::new(MemoryClientRepository::default()),
        documents.clone(),
        Arc::new(StubExtractor),
    )
    .with_clock(Arc::new(FixedClock(now())))
    .record_attachment_note(&id, &outcome.uploaded_names(), "bruno")
    .expect("note recorded");
    assert_eq!(retry.permit.notes.len(), 2);
    assert_eq!(documents.stored().len(), 1);
}

#[test]
fn delete_requires_confirmation_then_removes() {
    let harness = harness();
    let id = harness
        .service
        .create(new_permit(PermitType::Sanitary), "ana")
        .expect("created")
        .permit
        .id;

    assert!(matches!(
        harness.service.delete(&id, false),
        Err(PermitServiceError::Workflow(WorkflowError::UnconfirmedDelete))
    ));
    harness.service.delete(&id, true).expect("deleted");
    assert!(matches!(
        harness.service.delete(&id, true),
        Err(PermitServiceError::NotFound(_))
    ));
}

#[test]
fn fee_upsert_keeps_one_record_per_year() {
    let harness = harness();
    let id = harness
        .repository
        .insert(active_permit("alv-10"))
        .expect("seeded")
        .id;

    assert!(!harness.service.fee(&id, 2025).expect("default").fee_paid);

    harness
        .service
        .upsert_fee(
            &id,
            2025,
            &FeePatch {
                fee_paid: Some(true),
                ..FeePatch::default()
            },
        )
        .expect("upserted");
    let fee = harness
        .service
        .upsert_fee(
            &id,
            2025,
            &FeePatch {
                fee_sent: Some(true),
                ..FeePatch::default()
            },
        )
        .expect("upserted");

    assert!(fee.fee_sent && fee.fee_paid);
    assert_eq!(harness.repository.stored("alv-10").fees.len(), 1);
}

#[test]
fn list_filters_by_status_and_client() {
    let harness = harness();
    harness.repository.insert(permit("alv-1")).expect("seeded");
    let mut expired = active_permit("alv-2");
    expired.expiration_date = NaiveDate::from_ymd_opt(2025, 1, 1);
    harness.repository.insert(expired).expect("seeded");
    let mut other_client = active_permit("alv-3");
    other_client.client_id = ClientId("cli-9".to_string());
    harness.repository.insert(other_client).expect("seeded");

    let expired = harness
        .service
        .list(&PermitFilter {
            status: Some(PermitStatus::Expired),
            ..PermitFilter::default()
        })
        .expect("listed");
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].remaining_time, "Vencido há 139 dias");

    let for_client = harness
        .service
        .list(&PermitFilter {
            client_id: Some(ClientId("cli-1".to_string())),
            ..PermitFilter::default()
        })
        .expect("listed");
    assert_eq!(for_client.len(), 2);
}

#[test]
fn extraction_rejects_non_pdf_and_never_persists() {
    let harness = harness();

    let image = StagedDocument::new("foto.jpg", vec![1, 2, 3]);
    assert!(matches!(
        harness.service.extract(&image),
        Err(PermitServiceError::Extraction(ExtractionError::NotPdf(_)))
    ));

    let draft = harness.service.extract(&pdf("sanitario.pdf")).expect("draft");
    assert_eq!(draft.permit_type, Some(PermitType::Sanitary));
    assert_eq!(
        draft.client.map(|matched| matched.client_id),
        Some(ClientId("cli-1".to_string()))
    );
    assert!(harness.repository.list().expect("list").is_empty());
}

#[test]
fn import_requires_confirmation() {
    let harness = harness();
    let confirmation = ExtractionConfirmation {
        client_id: ClientId("cli-1".to_string()),
        permit_type: PermitType::Sanitary,
        request_date: None,
        issue_date: NaiveDate::from_ymd_opt(2025, 2, 1),
        expiration_date: NaiveDate::from_ymd_opt(2026, 2, 1),
        exempt: false,
        no_fixed_location: false,
        permit_number: Some("SAN-778/2025".to_string()),
        confirmed: false,
    };

    assert!(matches!(
        harness
            .service
            .import_extracted(confirmation.clone(), pdf("sanitario.pdf"), "ana"),
        Err(PermitServiceError::Extraction(ExtractionError::Unconfirmed))
    ));
    assert!(harness.repository.list().expect("list").is_empty());

    let outcome = harness
        .service
        .import_extracted(
            ExtractionConfirmation {
                confirmed: true,
                ..confirmation
            },
            pdf("sanitario.pdf"),
            "ana",
        )
        .expect("imported");
    assert_eq!(outcome.permit.lifecycle, LifecycleState::Active);
    assert_eq!(
        outcome.permit.permit.issue_date,
        NaiveDate::from_ymd_opt(2025, 2, 1)
    );

    let documents = harness
        .service
        .documents(&outcome.permit.permit.id)
        .expect("documents");
    assert_eq!(documents.len(), 1);
    assert!(documents[0].mentioned_in_notes);

    let link = harness
        .service
        .download_link(&documents[0].document.id)
        .expect("fresh link");
    assert!(link.url.ends_with("sanitario.pdf"));
}

/// Holds every upload until the test releases it.
struct GatedStore {
    entered: Barrier,
    release: Barrier,
}

impl DocumentStore for GatedStore {
    fn upload(
        &self,
        _owner: &PermitId,
        document: &StagedDocument,
        _metadata: &UploadMetadata,
    ) -> Result<DocumentId, DocumentStoreError> {
        self.entered.wait();
        self.release.wait();
        Ok(DocumentId(format!("doc-{}", document.file_name)))
    }

    fn list_by_owner(&self, _owner: &PermitId) -> Result<Vec<StoredDocument>, DocumentStoreError> {
        Ok(Vec::new())
    }

    fn download_link(&self, _id: &DocumentId) -> Result<DocumentLink, DocumentStoreError> {
        Err(DocumentStoreError::NotFound)
    }
}

#[test]
fn second_submission_for_same_permit_is_rejected_while_first_runs() {
    let repository = Arc::new(MemoryPermitRepository::default());
    let clients = Arc::new(MemoryClientRepository::default());
    let store = Arc::new(GatedStore {
        entered: Barrier::new(2),
        release: Barrier::new(2),
    });
    let service = PermitService::new(
        repository.clone(),
        clients,
        store.clone(),
        Arc::new(StubExtractor),
    )
    .with_clock(Arc::new(FixedClock(now())));
    let id = repository.insert(permit("alv-1")).expect("seeded").id;

    thread::scope(|scope| {
        let first = scope.spawn(|| {
            service.finalize(
                &id,
                FinalizeInput {
                    expiration_date: NaiveDate::from_ymd_opt(2026, 1, 1),
                    documents: vec![pdf("alvara.pdf")],
                    ..FinalizeInput::default()
                },
                "ana",
            )
        });

        store.entered.wait();
        let second = service.edit(&id, PermitEdit::default(), "bruno");
        assert!(matches!(
            second,
            Err(PermitServiceError::SubmissionInFlight(_))
        ));
        store.release.wait();

        let first = first.join().expect("thread finished");
        assert!(first.expect("first submission wins").is_complete());
    });

    let edited = service.edit(&id, PermitEdit::default(), "bruno");
    assert!(edited.is_ok(), "guard released after completion");
}
