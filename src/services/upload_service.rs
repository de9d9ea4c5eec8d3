use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::upload::{
    Attempt, UploadConflict, UploadFile, UploadOutcome, UploadResponse, UploadState,
};
use crate::services::api_client::CatalogApi;
use crate::services::catalog_service::CatalogStore;
use crate::services::dashboard_service::DashboardCache;

/// One request the negotiator wants sent. The caller performs the upload and
/// hands the reply back through [`UploadNegotiator::complete`].
#[derive(Debug, Clone)]
pub struct UploadTicket {
    epoch: u64,
    session_id: Uuid,
    attempt: Attempt,
    file: Arc<UploadFile>,
}

impl UploadTicket {
    pub fn attempt(&self) -> Attempt {
        self.attempt
    }

    pub fn force(&self) -> bool {
        self.attempt.force()
    }

    pub fn file(&self) -> &UploadFile {
        &self.file
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}

#[derive(Debug)]
struct UploadSession {
    id: Uuid,
    file: Arc<UploadFile>,
}

/// Drives the accept-or-confirm upload handshake.
///
/// At most one session is live at a time. A near-duplicate reply to the
/// initial attempt parks the session in `ConflictPending`; confirming sends
/// the same payload once more with the force flag. The forced attempt cannot
/// produce another prompt: a second conflict is a protocol error.
#[derive(Debug, Default)]
pub struct UploadNegotiator {
    selected: Option<Arc<UploadFile>>,
    state: UploadState,
    session: Option<UploadSession>,
    epoch: u64,
}

impl UploadNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn selected_file(&self) -> Option<&UploadFile> {
        self.selected.as_deref()
    }

    pub fn conflict(&self) -> Option<&UploadConflict> {
        match &self.state {
            UploadState::ConflictPending(conflict) => Some(conflict),
            _ => None,
        }
    }

    pub fn select_file(&mut self, file: UploadFile) -> Result<(), AppError> {
        if self.state.is_live() {
            return Err(AppError::UploadInProgress);
        }
        self.selected = Some(Arc::new(file));
        self.state = UploadState::Idle;
        Ok(())
    }

    pub fn clear_selection(&mut self) -> Result<(), AppError> {
        if self.state.is_live() {
            return Err(AppError::UploadInProgress);
        }
        self.selected = None;
        self.state = UploadState::Idle;
        Ok(())
    }

    /// `Idle -> Sending`. Rejected while another session is live.
    pub fn begin_submit(&mut self) -> Result<UploadTicket, AppError> {
        if self.state.is_live() {
            return Err(AppError::UploadInProgress);
        }
        let file = self
            .selected
            .clone()
            .ok_or_else(|| AppError::InvalidState("no file selected".to_string()))?;

        let session = UploadSession {
            id: Uuid::new_v4(),
            file,
        };
        info!(session = %session.id, filename = %session.file.filename, "upload started");
        self.epoch += 1;
        self.state = UploadState::Sending(Attempt::Initial);
        let ticket = self.ticket(&session, Attempt::Initial);
        self.session = Some(session);
        Ok(ticket)
    }

    /// Answers a pending conflict. Declining returns to `Idle` with the file
    /// still selected; confirming yields the forced retry.
    pub fn resolve(&mut self, confirm_override: bool) -> Result<Option<UploadTicket>, AppError> {
        if !matches!(self.state, UploadState::ConflictPending(_)) {
            return Err(AppError::InvalidState(format!(
                "no conflict to resolve while {}",
                self.state.as_str()
            )));
        }
        self.epoch += 1;

        if !confirm_override {
            if let Some(session) = self.session.take() {
                info!(session = %session.id, "override declined");
            }
            self.state = UploadState::Idle;
            return Ok(None);
        }

        let Some(session) = self.session.as_ref() else {
            self.state = UploadState::Idle;
            return Err(AppError::InvalidState("conflict without a session".to_string()));
        };
        info!(session = %session.id, "override confirmed; resending with force");
        let ticket = self.ticket(session, Attempt::Forced);
        self.state = UploadState::Sending(Attempt::Forced);
        Ok(Some(ticket))
    }

    /// Applies the server's reply to a ticket. Replies for a session that was
    /// abandoned or has moved on are dropped without touching any state.
    pub fn complete(
        &mut self,
        ticket: UploadTicket,
        reply: Result<UploadResponse, AppError>,
        catalog: &mut CatalogStore,
        dashboard: &DashboardCache,
    ) -> Result<UploadOutcome, AppError> {
        if ticket.epoch != self.epoch || !matches!(self.state, UploadState::Sending(_)) {
            debug!(session = %ticket.session_id, "ignoring reply for a stale upload session");
            return Ok(UploadOutcome::Ignored);
        }

        match reply {
            Err(e) => {
                warn!(session = %ticket.session_id, error = %e, "upload failed");
                self.reset_to_idle();
                Err(e)
            }
            Ok(UploadResponse::Accepted(record)) => {
                self.session = None;
                self.selected = None;
                self.state = UploadState::Succeeded;
                dashboard.invalidate();
                let admitted = match record {
                    Some(record) => Some(catalog.admit(record)),
                    None => {
                        catalog.mark_needs_reload();
                        None
                    }
                };
                info!(
                    session = %ticket.session_id,
                    forced = ticket.force(),
                    id = ?admitted.as_ref().map(|r| r.id),
                    "upload accepted"
                );
                Ok(UploadOutcome::Succeeded(admitted))
            }
            Ok(UploadResponse::NearDuplicate(conflict)) => match ticket.attempt {
                Attempt::Initial => {
                    info!(
                        session = %ticket.session_id,
                        similar_to = %conflict.similar_to,
                        score = conflict.score,
                        "near-duplicate reported"
                    );
                    self.state = UploadState::ConflictPending(conflict.clone());
                    Ok(UploadOutcome::ConflictDetected(conflict))
                }
                Attempt::Forced => {
                    warn!(session = %ticket.session_id, "near-duplicate reported on a forced upload");
                    self.reset_to_idle();
                    Err(AppError::protocol(format!(
                        "server reported a near-duplicate of '{}' on a forced upload",
                        conflict.similar_to
                    )))
                }
            },
        }
    }

    /// Drops interest in the live session. Its eventual reply is ignored.
    pub fn abandon(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(session = %session.id, "upload session abandoned");
        }
        if self.state.is_live() {
            self.state = UploadState::Idle;
        }
        self.epoch += 1;
    }

    pub async fn submit(
        &mut self,
        api: &dyn CatalogApi,
        catalog: &mut CatalogStore,
        dashboard: &DashboardCache,
    ) -> Result<UploadOutcome, AppError> {
        let ticket = self.begin_submit()?;
        let reply = api.upload(ticket.file(), ticket.force()).await;
        self.complete(ticket, reply, catalog, dashboard)
    }

    pub async fn resolve_and_send(
        &mut self,
        confirm_override: bool,
        api: &dyn CatalogApi,
        catalog: &mut CatalogStore,
        dashboard: &DashboardCache,
    ) -> Result<UploadOutcome, AppError> {
        let Some(ticket) = self.resolve(confirm_override)? else {
            return Ok(UploadOutcome::Cancelled);
        };
        let reply = api.upload(ticket.file(), ticket.force()).await;
        self.complete(ticket, reply, catalog, dashboard)
    }

    fn ticket(&self, session: &UploadSession, attempt: Attempt) -> UploadTicket {
        UploadTicket {
            epoch: self.epoch,
            session_id: session.id,
            attempt,
            file: Arc::clone(&session.file),
        }
    }

    fn reset_to_idle(&mut self) {
        self.session = None;
        self.state = UploadState::Idle;
    }
}
