//! Canonical in-memory lead state.
//!
//! This is the state boundary for `leadcall-core`:
//! - lead records and their per-channel message handles
//! - open claim sessions, one per claimant
//! - no I/O; callers talk to the notifier after the store has decided
//!
//! Every lead sits behind its own mutex, so work on one lead never waits on
//! another. When both are needed the lead lock is taken before the session
//! table.

use crate::claim::ClaimError;
use crate::conversation::{ClaimSession, ConversationError, ConversationEvent, ConversationState};
use crate::lead::{ChannelId, ClaimantId, Lead, LeadId, MessageHandle, MessageHandleSet};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of a successful check-and-set on `taken_by`.
#[derive(Debug, Clone)]
pub struct ClaimGrant {
    pub session: ClaimSession,
    /// Handles known at the moment of the claim; each gets its claim button disabled.
    pub handles: MessageHandleSet,
}

/// Outcome of a successful result submission.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub session: ClaimSession,
    /// Lead snapshot taken under the lead lock, result included.
    pub lead: Lead,
}

#[derive(Debug, Default)]
pub struct LeadStore {
    next_id: AtomicU64,
    leads: RwLock<BTreeMap<LeadId, Arc<Mutex<Lead>>>>,
    sessions: Mutex<BTreeMap<ClaimantId, ClaimSession>>,
}

impl LeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id and insert an unclaimed lead.
    ///
    /// Returns a snapshot of the new record.
    pub fn create_lead(&self, name: impl Into<String>, phone: impl Into<String>) -> Lead {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let lead = Lead::new(id, name, phone);
        self.leads
            .write()
            .insert(id, Arc::new(Mutex::new(lead.clone())));
        lead
    }

    fn entry(&self, id: LeadId) -> Option<Arc<Mutex<Lead>>> {
        self.leads.read().get(&id).cloned()
    }

    /// Snapshot of one lead.
    pub fn lead(&self, id: LeadId) -> Option<Lead> {
        self.entry(id).map(|entry| entry.lock().clone())
    }

    pub fn len(&self) -> usize {
        self.leads.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.read().is_empty()
    }

    /// Record where `channel`'s copy of the notification lives.
    ///
    /// Returns the lead as it stands right after recording, so the caller can
    /// catch up a handle that arrived after the lead was claimed or resolved.
    /// Returns `None` for an unknown lead.
    pub fn record_handle(
        &self,
        id: LeadId,
        channel: ChannelId,
        handle: MessageHandle,
    ) -> Option<Lead> {
        let entry = self.entry(id)?;
        let mut lead = entry.lock();
        lead.handles.insert(channel, handle);
        Some(lead.clone())
    }

    /// Atomically claim `id` for `claimant`.
    ///
    /// The read of `taken_by` and the write that sets it happen under one
    /// hold of the lead's lock. A claimant with an open session cannot claim
    /// again until that session ends.
    pub fn try_claim(
        &self,
        id: LeadId,
        claimant: ClaimantId,
        display_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<ClaimGrant, ClaimError> {
        let entry = self.entry(id).ok_or(ClaimError::NotFound(id))?;
        let mut lead = entry.lock();
        if lead.is_taken() {
            return Err(ClaimError::AlreadyTaken(id));
        }

        let mut sessions = self.sessions.lock();
        if let Some(open) = sessions.get(&claimant) {
            return Err(ClaimError::SessionActive {
                claimant,
                lead_id: open.lead_id,
            });
        }

        lead.mark_taken(claimant, display_name.into(), now);
        let session = ClaimSession::open(claimant, id, now);
        sessions.insert(claimant, session.clone());

        Ok(ClaimGrant {
            session,
            handles: lead.handles.clone(),
        })
    }

    /// The session `claimant` currently has open, if any.
    pub fn active_session(&self, claimant: ClaimantId) -> Option<ClaimSession> {
        self.sessions.lock().get(&claimant).cloned()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Store `result` on the session's lead and close the session.
    pub fn resolve(
        &self,
        session: &ClaimSession,
        result: String,
        now: DateTime<Utc>,
    ) -> Result<Resolution, ConversationError> {
        let entry = self
            .entry(session.lead_id)
            .ok_or(ConversationError::NotFound(session.lead_id))?;
        let mut lead = entry.lock();
        let mut sessions = self.sessions.lock();

        let current = match sessions.get(&session.claimant) {
            Some(open) if open.lead_id == session.lead_id => open.state,
            _ => terminal_state(&lead),
        };
        let next = current.apply(ConversationEvent::SubmitResult)?;
        if lead.result.is_some() || lead.taken_by != Some(session.claimant) {
            return Err(ConversationError::InvalidState {
                from: terminal_state(&lead),
                event: ConversationEvent::SubmitResult,
            });
        }

        lead.mark_resolved(result, now);
        let closed = sessions
            .remove(&session.claimant)
            .map(|open| open.with_state(next))
            .unwrap_or_else(|| session.with_state(next));

        Ok(Resolution {
            session: closed,
            lead: lead.clone(),
        })
    }

    /// Close the session without touching the lead.
    pub fn cancel(&self, session: &ClaimSession) -> Result<ClaimSession, ConversationError> {
        let entry = self
            .entry(session.lead_id)
            .ok_or(ConversationError::NotFound(session.lead_id))?;
        let lead = entry.lock();
        let mut sessions = self.sessions.lock();

        let current = match sessions.get(&session.claimant) {
            Some(open) if open.lead_id == session.lead_id => open.state,
            _ => terminal_state(&lead),
        };
        let next = current.apply(ConversationEvent::Cancel)?;

        let closed = sessions
            .remove(&session.claimant)
            .map(|open| open.with_state(next))
            .unwrap_or_else(|| session.with_state(next));
        Ok(closed)
    }
}

/// State of a session that is no longer in the table, read off its lead.
fn terminal_state(lead: &Lead) -> ConversationState {
    if lead.result.is_some() {
        ConversationState::Completed
    } else {
        ConversationState::Cancelled
    }
}
