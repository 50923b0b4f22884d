//! Result collection after a successful claim.
//!
//! A claim opens a [`ClaimSession`] in `AwaitingResult`. The claimant's next
//! free-text message completes it; `/cancel` abandons it. Both are terminal:
//! the session is dropped from the store and cannot be resumed.
//!
//! ```text
//! AwaitingResult ──submit_result──▶ Completed
//!        │
//!        └───────cancel──────────▶ Cancelled
//! ```

use crate::lead::{ClaimantId, LeadId};
use crate::notifier::{MessageUpdate, Notifier, update_all};
use crate::render::resolved_text;
use crate::store::LeadStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    AwaitingResult,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationEvent {
    SubmitResult,
    Cancel,
}

impl ConversationState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::AwaitingResult)
    }

    /// Apply one event. Only `AwaitingResult` accepts events.
    pub fn apply(self, event: ConversationEvent) -> Result<Self, ConversationError> {
        match (self, event) {
            (Self::AwaitingResult, ConversationEvent::SubmitResult) => Ok(Self::Completed),
            (Self::AwaitingResult, ConversationEvent::Cancel) => Ok(Self::Cancelled),
            (from, event) => Err(ConversationError::InvalidState { from, event }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingResult => "awaiting_result",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for ConversationState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Display for ConversationEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubmitResult => f.write_str("submit_result"),
            Self::Cancel => f.write_str("cancel"),
        }
    }
}

/// Binds a claimant to the lead they are resolving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSession {
    pub claimant: ClaimantId,
    pub lead_id: LeadId,
    pub opened_at: DateTime<Utc>,
    pub state: ConversationState,
}

impl ClaimSession {
    pub(crate) fn open(claimant: ClaimantId, lead_id: LeadId, now: DateTime<Utc>) -> Self {
        Self {
            claimant,
            lead_id,
            opened_at: now,
            state: ConversationState::AwaitingResult,
        }
    }

    pub(crate) fn with_state(&self, state: ConversationState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversationError {
    #[error("session is {from}; cannot apply {event}")]
    InvalidState {
        from: ConversationState,
        event: ConversationEvent,
    },

    #[error("no open session for claimant {0}")]
    NoActiveSession(ClaimantId),

    #[error("lead not found: {0}")]
    NotFound(LeadId),
}

/// Drives sessions to a terminal state and propagates the final text.
#[derive(Clone)]
pub struct ResultConversation {
    store: Arc<LeadStore>,
    notifier: Arc<dyn Notifier>,
}

impl ResultConversation {
    pub fn new(store: Arc<LeadStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Save `text` as the lead's result and rewrite every channel's copy.
    ///
    /// A stale or replayed session yields `InvalidState` and leaves the lead
    /// untouched.
    pub async fn submit_result(
        &self,
        session: &ClaimSession,
        text: impl Into<String>,
    ) -> Result<ClaimSession, ConversationError> {
        let resolution = self
            .store
            .resolve(session, text.into(), Utc::now())
            .inspect_err(|err| {
                debug!(lead_id = session.lead_id, claimant = %session.claimant, %err, "result ignored");
            })?;

        let lead = &resolution.lead;
        info!(lead_id = lead.id, claimant = %session.claimant, "lead resolved");

        let report = update_all(
            &self.notifier,
            lead.handles.iter(),
            MessageUpdate::ReplaceText(resolved_text(lead)),
        )
        .await;
        report.log_failures(lead.id, "publish result");

        Ok(resolution.session)
    }

    /// Complete whichever session `claimant` currently has open.
    pub async fn submit_result_for(
        &self,
        claimant: ClaimantId,
        text: impl Into<String>,
    ) -> Result<ClaimSession, ConversationError> {
        let session = self
            .store
            .active_session(claimant)
            .ok_or(ConversationError::NoActiveSession(claimant))?;
        self.submit_result(&session, text).await
    }

    /// Abandon the session. The lead stays claimed, with no result.
    pub fn cancel(&self, session: &ClaimSession) -> Result<ClaimSession, ConversationError> {
        let cancelled = self.store.cancel(session).inspect_err(|err| {
            debug!(lead_id = session.lead_id, claimant = %session.claimant, %err, "cancel ignored");
        })?;
        info!(lead_id = session.lead_id, claimant = %session.claimant, "session cancelled");
        Ok(cancelled)
    }

    pub fn cancel_for(&self, claimant: ClaimantId) -> Result<ClaimSession, ConversationError> {
        let session = self
            .store
            .active_session(claimant)
            .ok_or(ConversationError::NoActiveSession(claimant))?;
        self.cancel(&session)
    }
}
