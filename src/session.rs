//! Editor Session - The Editor State Machine
//!
//! All editor state lives in one [`EditorSession`] value: the active mode,
//! the composite being edited, the reset epoch, the last draft snapshot and
//! the in-flight submission guard.
//!
//! Submissions are ticketed. [`EditorSession::begin_submission`] freezes the
//! composite into a form, the caller awaits the backend, and
//! [`EditorSession::finish_save`] / [`EditorSession::finish_publish`] apply
//! the outcome only if the session is still on the same epoch.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset::{Asset2D, Asset3D, HandleRegistry};
use crate::composite::{ArtifactComposite, CompositeError, TransferForm};
use crate::gateway::{ArtifactBackend, Draft, DraftId, PublishReceipt, TransportError, TransportResult};
use crate::normalize::{ModelNormalizer, NormalizedScene, Placement, SceneLoadError};
use crate::validation::{AssetValidator, CandidateFile, LayerSlot, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Compose,
    BrowseDrafts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    SaveDraft,
    Publish,
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionKind::SaveDraft => f.write_str("save"),
            SubmissionKind::Publish => f.write_str("publish"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Composite(#[from] CompositeError),

    #[error("Failed to load model: {0}")]
    SceneLoad(#[from] SceneLoadError),

    #[error("Backend request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("{action} is only available in {required:?} mode")]
    WrongMode { action: &'static str, required: Mode },

    #[error("A {kind} request for this composite is already in flight")]
    SubmissionInFlight { kind: SubmissionKind },

    #[error("Ticket for {kind} does not match the expected submission")]
    TicketMismatch { kind: SubmissionKind },

    #[error("Draft {0} is not in the current draft list")]
    DraftNotFound(DraftId),
}

impl EditorError {
    /// Message for a blocking alert.
    pub fn user_message(&self) -> String {
        match self {
            EditorError::Validation(e) => e.user_message().to_string(),
            EditorError::Composite(e) => e.user_message().to_string(),
            EditorError::SceneLoad(_) => "The 3D model could not be loaded".to_string(),
            EditorError::Transport(_) => "Could not reach the artifact server, please try again".to_string(),
            EditorError::SubmissionInFlight { .. } => "Please wait for the current upload to finish".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the user has to change their input (as opposed to retrying).
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            EditorError::Validation(_) | EditorError::Composite(CompositeError::Incomplete { .. }) | EditorError::SceneLoad(_)
        )
    }
}

/// Outcome of a submission, relative to the session that issued it.
#[derive(Debug)]
pub enum Completion<T> {
    /// The session was still on the submitted composite; the outcome was applied.
    Applied(T),
    /// The session moved on before the backend answered. Nothing was applied.
    Stale {
        kind: SubmissionKind,
        epoch: u64,
        outcome: TransportResult<T>,
    },
}

impl<T> Completion<T> {
    pub fn is_stale(&self) -> bool {
        matches!(self, Completion::Stale { .. })
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Completion::Applied(value) => Some(value),
            Completion::Stale { .. } => None,
        }
    }
}

/// A frozen composite on its way to the backend.
///
/// Dropping a ticket without finishing it (an early return, a timed-out or
/// cancelled await) releases the in-flight guard.
#[derive(Debug)]
pub struct SubmissionTicket {
    id: u64,
    kind: SubmissionKind,
    epoch: u64,
    form: TransferForm,
    pending: Arc<Mutex<Option<PendingSubmission>>>,
}

impl SubmissionTicket {
    pub fn kind(&self) -> SubmissionKind {
        self.kind
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn form(&self) -> &TransferForm {
        &self.form
    }
}

impl Drop for SubmissionTicket {
    fn drop(&mut self) {
        let mut pending = lock_pending(&self.pending);
        if pending.as_ref().map_or(false, |p| p.id == self.id) {
            log::warn!(
                "event=submission_abandoned kind={} epoch={} fingerprint={}",
                self.kind,
                self.epoch,
                self.form.fingerprint
            );
            *pending = None;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingSubmission {
    id: u64,
    kind: SubmissionKind,
    epoch: u64,
}

fn lock_pending(pending: &Mutex<Option<PendingSubmission>>) -> MutexGuard<'_, Option<PendingSubmission>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// What the live canvas needs to draw the composite being edited.
#[derive(Debug, Clone, PartialEq)]
pub struct LivePreview<'a> {
    /// Changes on every reset; views keyed on it start fresh.
    pub session_key: u64,
    pub trigger_url: Option<&'a str>,
    pub model_url: Option<&'a str>,
    pub placement: Option<Placement>,
}

/// Read-only view of a saved draft with its model normalized like a live one.
#[derive(Debug, Clone)]
pub struct DraftPreview {
    pub draft: Draft,
    pub scene: NormalizedScene,
}

pub struct EditorSession {
    mode: Mode,
    composite: ArtifactComposite,
    epoch: u64,
    drafts: Vec<Draft>,
    pending: Arc<Mutex<Option<PendingSubmission>>>,
    next_submission: u64,
    validator: AssetValidator,
    normalizer: ModelNormalizer,
}

impl EditorSession {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(HandleRegistry::new()))
    }

    pub fn with_registry(registry: Arc<HandleRegistry>) -> Self {
        Self {
            mode: Mode::Compose,
            composite: ArtifactComposite::new(),
            epoch: 0,
            drafts: Vec::new(),
            pending: Arc::new(Mutex::new(None)),
            next_submission: 0,
            validator: AssetValidator::new(registry),
            normalizer: ModelNormalizer::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn composite(&self) -> &ArtifactComposite {
        &self.composite
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Last draft snapshot fetched on entering `BrowseDrafts`.
    pub fn drafts(&self) -> &[Draft] {
        &self.drafts
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        self.validator.registry()
    }

    /// True while a save or publish of the current composite is in flight.
    /// The save and publish controls are disabled for as long as this holds.
    pub fn is_submitting(&self) -> bool {
        lock_pending(&self.pending).as_ref().map_or(false, |p| p.epoch == self.epoch)
    }

    pub fn preview(&self) -> LivePreview<'_> {
        LivePreview {
            session_key: self.epoch,
            trigger_url: self.composite.layer_2d().map(|a| a.asset().display().url()),
            model_url: self.composite.layer_3d().map(|a| a.asset().display().url()),
            placement: self.composite.scene().map(NormalizedScene::placement),
        }
    }

    fn require_compose(&self, action: &'static str) -> Result<(), EditorError> {
        if self.mode != Mode::Compose {
            return Err(EditorError::WrongMode { action, required: Mode::Compose });
        }
        Ok(())
    }

    // --- Transitions ---

    /// Enter `Compose`. The composite in progress is kept.
    pub fn select_create(&mut self) {
        if self.mode != Mode::Compose {
            log::info!("event=mode_changed from={:?} to={:?}", self.mode, Mode::Compose);
        }
        self.mode = Mode::Compose;
    }

    /// Enter `BrowseDrafts` and refresh the draft list.
    ///
    /// The mode changes even if the refresh fails; the previous snapshot is
    /// then kept and the error returned.
    pub async fn select_drafts(&mut self, backend: &dyn ArtifactBackend) -> Result<&[Draft], EditorError> {
        if self.mode != Mode::BrowseDrafts {
            log::info!("event=mode_changed from={:?} to={:?}", self.mode, Mode::BrowseDrafts);
        }
        self.mode = Mode::BrowseDrafts;

        match backend.list_drafts().await {
            Ok(drafts) => {
                log::info!("event=drafts_listed count={}", drafts.len());
                self.drafts = drafts;
                Ok(&self.drafts)
            }
            Err(e) => {
                log::warn!("event=drafts_list_failed error={}", e);
                Err(e.into())
            }
        }
    }

    /// Discard the composite in progress and start a new epoch. `Compose` only.
    pub fn reset(&mut self) -> Result<u64, EditorError> {
        self.require_compose("Reset")?;
        Ok(self.discard_composite())
    }

    fn discard_composite(&mut self) -> u64 {
        self.composite = ArtifactComposite::new();
        self.epoch += 1;
        log::info!("event=session_reset epoch={}", self.epoch);
        self.epoch
    }

    // --- Layer uploads ---

    /// Put a picked image into the trigger slot. `None` (picker cancelled) is a no-op.
    ///
    /// Returns whether the slot changed. A rejected file leaves the slot as it was.
    pub fn upload_2d(&mut self, file: Option<CandidateFile>) -> Result<bool, EditorError> {
        self.require_compose("Uploading a layer")?;
        let Some(file) = file else {
            return Ok(false);
        };

        let validated = self.validator.validate(file, LayerSlot::TwoD)?;
        self.composite.set_layer_2d(Asset2D(validated));
        Ok(true)
    }

    /// Put a picked model into the 3D slot. `None` (picker cancelled) is a no-op.
    ///
    /// A rejected extension leaves the slot as it was. A model that passes
    /// validation but fails to load clears the slot.
    pub fn upload_3d(&mut self, file: Option<CandidateFile>) -> Result<bool, EditorError> {
        self.require_compose("Uploading a layer")?;
        let Some(file) = file else {
            return Ok(false);
        };

        let validated = self.validator.validate(file, LayerSlot::ThreeD)?;
        let scene = match self.normalizer.load(validated.bytes()) {
            Ok(scene) => scene,
            Err(e) => {
                log::warn!("event=scene_load_failed file={} error={}", validated.file_name(), e);
                self.composite.clear_layer_3d();
                return Err(e.into());
            }
        };

        self.composite.set_layer_3d(Asset3D { asset: validated, scene });
        Ok(true)
    }

    // --- Submissions ---

    /// Freeze the current composite for `kind`.
    ///
    /// Fails without touching the backend when the composite is incomplete or
    /// a submission of this composite is already in flight.
    pub fn begin_submission(&mut self, kind: SubmissionKind) -> Result<SubmissionTicket, EditorError> {
        let mut pending = lock_pending(&self.pending);
        if let Some(current) = pending.as_ref().filter(|p| p.epoch == self.epoch) {
            return Err(EditorError::SubmissionInFlight { kind: current.kind });
        }

        let form = self.composite.to_transfer_form().map_err(|e| {
            log::warn!("event=submission_blocked kind={} error={}", kind, e);
            e
        })?;

        self.next_submission += 1;
        let id = self.next_submission;
        *pending = Some(PendingSubmission { id, kind, epoch: self.epoch });
        log::info!("event=submission_started kind={} epoch={} fingerprint={}", kind, self.epoch, form.fingerprint);

        Ok(SubmissionTicket {
            id,
            kind,
            epoch: self.epoch,
            form,
            pending: Arc::clone(&self.pending),
        })
    }

    /// Settle a ticket. Returns `None` when the session moved on since it was issued.
    fn settle(&mut self, ticket: &SubmissionTicket, expected: SubmissionKind) -> Result<Option<()>, EditorError> {
        if ticket.kind != expected {
            return Err(EditorError::TicketMismatch { kind: ticket.kind });
        }

        {
            let mut pending = lock_pending(&self.pending);
            if pending.as_ref().map_or(false, |p| p.id == ticket.id) {
                *pending = None;
            }
        }

        if ticket.epoch != self.epoch {
            log::warn!(
                "event=stale_completion kind={} ticket_epoch={} epoch={} fingerprint={}",
                ticket.kind,
                ticket.epoch,
                self.epoch,
                ticket.form.fingerprint
            );
            return Ok(None);
        }
        Ok(Some(()))
    }

    pub fn finish_save(
        &mut self,
        ticket: SubmissionTicket,
        outcome: TransportResult<()>,
    ) -> Result<Completion<()>, EditorError> {
        if self.settle(&ticket, SubmissionKind::SaveDraft)?.is_none() {
            return Ok(Completion::Stale { kind: ticket.kind, epoch: ticket.epoch, outcome });
        }

        outcome?;
        log::info!("event=draft_saved epoch={} fingerprint={}", ticket.epoch, ticket.form.fingerprint);
        Ok(Completion::Applied(()))
    }

    /// On success the session returns to an empty `Compose` state.
    pub fn finish_publish(
        &mut self,
        ticket: SubmissionTicket,
        outcome: TransportResult<PublishReceipt>,
    ) -> Result<Completion<PublishReceipt>, EditorError> {
        if self.settle(&ticket, SubmissionKind::Publish)?.is_none() {
            return Ok(Completion::Stale { kind: ticket.kind, epoch: ticket.epoch, outcome });
        }

        let receipt = outcome?;
        log::info!("event=artifact_published epoch={} json_url={}", ticket.epoch, receipt.json_url);

        self.mode = Mode::Compose;
        self.discard_composite();
        Ok(Completion::Applied(receipt))
    }

    /// Save the current composite as a draft and wait for the acknowledgement.
    pub async fn save_draft(&mut self, backend: &dyn ArtifactBackend) -> Result<Completion<()>, EditorError> {
        let ticket = self.begin_submission(SubmissionKind::SaveDraft)?;
        let outcome = backend.save_draft(ticket.form()).await;
        self.finish_save(ticket, outcome)
    }

    /// Publish the current composite and wait for its public reference.
    pub async fn publish(&mut self, backend: &dyn ArtifactBackend) -> Result<Completion<PublishReceipt>, EditorError> {
        let ticket = self.begin_submission(SubmissionKind::Publish)?;
        let outcome = backend.publish(ticket.form()).await;
        self.finish_publish(ticket, outcome)
    }

    // --- Drafts ---

    /// Fetch a listed draft's model and normalize it for a read-only preview.
    pub async fn open_draft(&self, id: &DraftId, backend: &dyn ArtifactBackend) -> Result<DraftPreview, EditorError> {
        let draft = self
            .drafts
            .iter()
            .find(|d| &d.id == id)
            .cloned()
            .ok_or_else(|| EditorError::DraftNotFound(id.clone()))?;

        let bytes = backend.fetch_asset(&draft.model_url).await?;
        let scene = self.normalizer.load(&bytes)?;
        Ok(DraftPreview { draft, scene })
    }
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new()
    }
}
