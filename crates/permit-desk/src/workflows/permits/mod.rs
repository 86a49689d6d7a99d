//! Permit (alvará) tracking: date-derived status, the lifecycle workflow and the
//! service/HTTP layers that run it against external collaborators.

pub mod domain;
pub mod extraction;
pub mod fees;
pub mod history;
pub mod lifecycle;
pub mod report;
pub mod repository;
pub mod router;
pub mod service;
pub mod status;
pub mod transitions;

#[cfg(test)]
pub(crate) mod tests;

pub use domain::{
    ClientId, Clock, FixedClock, Permit, PermitId, PermitType, ProcessingStatus, StagedDocument,
    SystemClock,
};
pub use extraction::{
    ClientMatch, ExtractedPermitData, ExtractionConfirmation, ExtractionDraft, ExtractionError,
    PermitExtractor,
};
pub use fees::{AnnualFee, FeeLedger, FeePatch};
pub use history::{NoteEntry, NoteHistory, NoteKind};
pub use lifecycle::LifecycleState;
pub use report::PermitReport;
pub use repository::{
    DocumentId, DocumentLink, DocumentStore, DocumentStoreError, PermitRepository,
    RepositoryError, StoredDocument, UploadMetadata,
};
pub use router::permit_router;
pub use service::{
    FailedUpload, PermitDocument, PermitFilter, PermitService, PermitServiceError, PermitView,
    TransitionOutcome, UploadedDocument,
};
pub use status::{
    compute_status, days_until_expiration, format_date_for_input, format_date_safe,
    parse_date_from_input, remaining_time_label, PermitStatus, StatusBadge, StatusPolicy,
};
pub use transitions::{
    ActionContext, FinalizeInput, NewPermit, PermitEdit, RenewalForm, Requirement, Transition,
    TransitionPlan, WorkflowError,
};
