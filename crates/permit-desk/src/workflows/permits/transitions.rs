//! Permit lifecycle transitions.
//!
//! Each transition is a pure function: it validates its preconditions against the
//! current record and returns the next record plus the uploads it requires. Nothing
//! here talks to collaborators; `PermitService` executes the returned plans.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::domain::{ClientId, Permit, PermitId, PermitType, ProcessingStatus, StagedDocument};
use super::fees::FeeLedger;
use super::history::{NoteEntry, NoteHistory};
use super::lifecycle::LifecycleState;

/// Who acts and when; supplied by the caller so transitions stay deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionContext {
    pub author: String,
    pub now: NaiveDateTime,
}

impl ActionContext {
    pub fn new(author: impl Into<String>, now: NaiveDateTime) -> Self {
        Self {
            author: author.into(),
            now,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date()
    }

    fn note(&self, text: &str) -> Option<NoteEntry> {
        NoteEntry::text(text, &self.author, self.now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Create,
    Finalize,
    EnterRenewal,
    UpdateRenewal,
    FinalizeRenewal,
    Edit,
    AttachDocuments,
    Delete,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Create => "create",
            Self::Finalize => "finalize",
            Self::EnterRenewal => "enter renewal",
            Self::UpdateRenewal => "update renewal",
            Self::FinalizeRenewal => "finalize renewal",
            Self::Edit => "edit",
            Self::AttachDocuments => "attach documents",
            Self::Delete => "delete",
        };
        f.write_str(label)
    }
}

/// Field a transition could not proceed without.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    ExpirationDate,
    Document,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExpirationDate => f.write_str("expiration date required"),
            Self::Document => f.write_str("document required"),
        }
    }
}

fn join_requirements(requirements: &[Requirement]) -> String {
    requirements
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validation failures. None of them leave side effects behind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("{}", join_requirements(.0))]
    MissingRequirements(Vec<Requirement>),
    #[error("cannot {transition} a permit that is {state}")]
    InvalidTransition {
        transition: Transition,
        state: LifecycleState,
    },
    #[error("{field} cannot change while the permit is {state}")]
    ImmutableField {
        field: &'static str,
        state: LifecycleState,
    },
    #[error("edit would move the permit from {from} to {to}")]
    LifecycleChange {
        from: LifecycleState,
        to: LifecycleState,
    },
    #[error("new permits cannot start in renewal")]
    RenewalOnCreate,
    #[error("nothing to record: note is empty and no documents were staged")]
    EmptyUpdate,
    #[error("delete requires confirmation")]
    UnconfirmedDelete,
}

/// Result of a validated transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    pub transition: Transition,
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub next: Permit,
    pub uploads: Vec<StagedDocument>,
}

impl TransitionPlan {
    fn new(
        transition: Transition,
        current: &Permit,
        next: Permit,
        uploads: Vec<StagedDocument>,
    ) -> Self {
        Self {
            transition,
            from: LifecycleState::of(current),
            to: LifecycleState::of(&next),
            next,
            uploads,
        }
    }
}

/// Payload of the create transition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPermit {
    pub client_id: ClientId,
    #[serde(rename = "type")]
    pub permit_type: PermitType,
    pub request_date: NaiveDate,
    #[serde(default)]
    pub processing_status: Option<ProcessingStatus>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
    #[serde(default, rename = "isento")]
    pub exempt: bool,
    #[serde(default, rename = "semPontoFixo")]
    pub no_fixed_location: bool,
    #[serde(default)]
    pub note: Option<String>,
}

impl NewPermit {
    pub fn new(client_id: ClientId, permit_type: PermitType, request_date: NaiveDate) -> Self {
        Self {
            client_id,
            permit_type,
            request_date,
            processing_status: None,
            expiration_date: None,
            exempt: false,
            no_fixed_location: false,
            note: None,
        }
    }
}

/// New permit in opening.
pub fn create(input: NewPermit, id: PermitId, ctx: &ActionContext) -> Result<Permit, WorkflowError> {
    let processing_status = input.processing_status.unwrap_or_default();
    if processing_status == ProcessingStatus::Renewal {
        return Err(WorkflowError::RenewalOnCreate);
    }

    let mut notes = NoteHistory::default();
    if let Some(entry) = input.note.as_deref().and_then(|text| ctx.note(text)) {
        notes.append(entry);
    }

    Ok(Permit {
        id,
        client_id: input.client_id,
        permit_type: input.permit_type,
        request_date: input.request_date,
        issue_date: None,
        expiration_date: input.expiration_date,
        processing_status,
        exempt: input.exempt,
        no_fixed_location: input.no_fixed_location,
        notes,
        fees: FeeLedger::default(),
    })
}

/// Payload of the finalize transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeInput {
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
    /// Issue date when it is already known; defaults to today.
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    #[serde(default)]
    pub documents: Vec<StagedDocument>,
    #[serde(default)]
    pub note: Option<String>,
}

fn check_requirements(
    permit: &Permit,
    expiration_date: Option<NaiveDate>,
    documents: &[StagedDocument],
) -> Result<(), WorkflowError> {
    if permit.is_waived() {
        return Ok(());
    }

    let mut missing = Vec::new();
    if expiration_date.is_none() {
        missing.push(Requirement::ExpirationDate);
    }
    if documents.is_empty() {
        missing.push(Requirement::Document);
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::MissingRequirements(missing))
    }
}

fn require_state(
    permit: &Permit,
    transition: Transition,
    allowed: impl Fn(LifecycleState) -> bool,
) -> Result<LifecycleState, WorkflowError> {
    let state = LifecycleState::of(permit);
    if allowed(state) {
        Ok(state)
    } else {
        Err(WorkflowError::InvalidTransition { transition, state })
    }
}

/// OPENING -> ACTIVE.
pub fn finalize(
    permit: &Permit,
    input: FinalizeInput,
    ctx: &ActionContext,
) -> Result<TransitionPlan, WorkflowError> {
    require_state(permit, Transition::Finalize, LifecycleState::is_opening)?;

    let expiration_date = input.expiration_date.or(permit.expiration_date);
    check_requirements(permit, expiration_date, &input.documents)?;

    let mut next = permit.clone();
    next.issue_date = Some(input.issue_date.unwrap_or_else(|| ctx.today()));
    next.expiration_date = expiration_date;
    if let Some(entry) = input.note.as_deref().and_then(|text| ctx.note(text)) {
        next.notes.append(entry);
    }

    Ok(TransitionPlan::new(
        Transition::Finalize,
        permit,
        next,
        input.documents,
    ))
}

/// ACTIVE -> RENEWING.
pub fn enter_renewal(
    permit: &Permit,
    note: Option<&str>,
    ctx: &ActionContext,
) -> Result<TransitionPlan, WorkflowError> {
    require_state(permit, Transition::EnterRenewal, |state| {
        state == LifecycleState::Active
    })?;

    let mut next = permit.clone();
    next.processing_status = ProcessingStatus::Renewal;
    if let Some(entry) = note.and_then(|text| ctx.note(text)) {
        next.notes.append(entry);
    }

    Ok(TransitionPlan::new(
        Transition::EnterRenewal,
        permit,
        next,
        Vec::new(),
    ))
}

/// Transient inputs of the renewal dialog.
///
/// The service clears it only after a renewal update or finalization succeeds, so a
/// failed submission keeps the typed note and staged files for another attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalForm {
    #[serde(default)]
    pub note_buffer: String,
    #[serde(default)]
    pub staged: Vec<StagedDocument>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
}

impl RenewalForm {
    pub fn stage(&mut self, document: StagedDocument) {
        self.staged.push(document);
    }

    pub fn is_empty(&self) -> bool {
        self.note_buffer.trim().is_empty() && self.staged.is_empty() && self.expiration_date.is_none()
    }

    pub fn clear(&mut self) {
        self.note_buffer.clear();
        self.staged.clear();
        self.expiration_date = None;
    }
}

/// RENEWING -> RENEWING. Appends the buffered note and schedules staged uploads.
pub fn update_renewal(
    permit: &Permit,
    form: &RenewalForm,
    ctx: &ActionContext,
) -> Result<TransitionPlan, WorkflowError> {
    require_state(permit, Transition::UpdateRenewal, |state| {
        state == LifecycleState::Renewing
    })?;

    let note = ctx.note(&form.note_buffer);
    if note.is_none() && form.staged.is_empty() {
        return Err(WorkflowError::EmptyUpdate);
    }

    let mut next = permit.clone();
    if let Some(entry) = note {
        next.notes.append(entry);
    }

    Ok(TransitionPlan::new(
        Transition::UpdateRenewal,
        permit,
        next,
        form.staged.clone(),
    ))
}

/// RENEWING -> ACTIVE. The renewed permit is re-issued today.
pub fn finalize_renewal(
    permit: &Permit,
    form: &RenewalForm,
    ctx: &ActionContext,
) -> Result<TransitionPlan, WorkflowError> {
    require_state(permit, Transition::FinalizeRenewal, |state| {
        state == LifecycleState::Renewing
    })?;

    check_requirements(permit, form.expiration_date, &form.staged)?;

    let mut next = permit.clone();
    next.issue_date = Some(ctx.today());
    next.expiration_date = form.expiration_date.or(permit.expiration_date);
    next.processing_status = ProcessingStatus::Started;
    if let Some(entry) = ctx.note(&form.note_buffer) {
        next.notes.append(entry);
    }

    Ok(TransitionPlan::new(
        Transition::FinalizeRenewal,
        permit,
        next,
        form.staged.clone(),
    ))
}

/// Field edits that keep the permit in its current lifecycle state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitEdit {
    #[serde(default)]
    pub client_id: Option<ClientId>,
    #[serde(default, rename = "type")]
    pub permit_type: Option<PermitType>,
    #[serde(default)]
    pub request_date: Option<NaiveDate>,
    /// `null` clears the stored date; a missing field keeps it.
    #[serde(default, deserialize_with = "nullable")]
    pub issue_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub expiration_date: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub processing_status: Option<ProcessingStatus>,
    #[serde(default, rename = "isento")]
    pub exempt: Option<bool>,
    #[serde(default, rename = "semPontoFixo")]
    pub no_fixed_location: Option<bool>,
    #[serde(default)]
    pub note: Option<String>,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// OPENING -> OPENING or ACTIVE -> ACTIVE.
///
/// Client and type are read-only while the permit is in opening; resubmitting the
/// stored value is accepted.
pub fn edit(permit: &Permit, changes: PermitEdit, ctx: &ActionContext) -> Result<Permit, WorkflowError> {
    let state = require_state(permit, Transition::Edit, |state| {
        state != LifecycleState::Renewing
    })?;

    if state.is_opening() {
        if changes
            .client_id
            .as_ref()
            .is_some_and(|client_id| *client_id != permit.client_id)
        {
            return Err(WorkflowError::ImmutableField {
                field: "clientId",
                state,
            });
        }
        if changes
            .permit_type
            .is_some_and(|permit_type| permit_type != permit.permit_type)
        {
            return Err(WorkflowError::ImmutableField {
                field: "type",
                state,
            });
        }
    }

    let mut next = permit.clone();
    if let Some(client_id) = changes.client_id {
        next.client_id = client_id;
    }
    if let Some(permit_type) = changes.permit_type {
        next.permit_type = permit_type;
    }
    if let Some(request_date) = changes.request_date {
        next.request_date = request_date;
    }
    if let Some(issue_date) = changes.issue_date {
        next.issue_date = issue_date;
    }
    if let Some(expiration_date) = changes.expiration_date {
        next.expiration_date = expiration_date;
    }
    if let Some(processing_status) = changes.processing_status {
        next.processing_status = processing_status;
    }
    if let Some(exempt) = changes.exempt {
        next.exempt = exempt;
    }
    if let Some(no_fixed_location) = changes.no_fixed_location {
        next.no_fixed_location = no_fixed_location;
    }

    let to = LifecycleState::of(&next);
    if to.is_opening() != state.is_opening() || to == LifecycleState::Renewing {
        return Err(WorkflowError::LifecycleChange { from: state, to });
    }

    if let Some(entry) = changes.note.as_deref().and_then(|text| ctx.note(text)) {
        next.notes.append(entry);
    }

    Ok(next)
}

/// Uploads for a permit in any state, typically a retry after a failed upload step.
pub fn attach_documents(
    permit: &Permit,
    documents: Vec<StagedDocument>,
) -> Result<TransitionPlan, WorkflowError> {
    if documents.is_empty() {
        return Err(WorkflowError::EmptyUpdate);
    }

    Ok(TransitionPlan::new(
        Transition::AttachDocuments,
        permit,
        permit.clone(),
        documents,
    ))
}

pub fn confirm_delete(confirmed: bool) -> Result<(), WorkflowError> {
    if confirmed {
        Ok(())
    } else {
        Err(WorkflowError::UnconfirmedDelete)
    }
}
