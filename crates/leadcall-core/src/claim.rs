//! Claim arbitration: exactly one claimant wins each lead.
//!
//! The decision is made by [`LeadStore::try_claim`] under the lead's lock.
//! Only after the lock is released does the arbiter strip the claim button
//! from every channel's copy, so slow channels never hold up claims on
//! other leads.

use crate::conversation::ClaimSession;
use crate::lead::{ClaimantId, LeadId};
use crate::notifier::{MessageUpdate, Notifier, update_all};
use crate::store::LeadStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimError {
    #[error("lead not found: {0}")]
    NotFound(LeadId),

    #[error("lead {0} is already taken")]
    AlreadyTaken(LeadId),

    #[error("claimant {claimant} must finish lead {lead_id} first")]
    SessionActive { claimant: ClaimantId, lead_id: LeadId },
}

#[derive(Clone)]
pub struct ClaimArbiter {
    store: Arc<LeadStore>,
    notifier: Arc<dyn Notifier>,
}

impl ClaimArbiter {
    pub fn new(store: Arc<LeadStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Claim `lead_id` for `claimant`.
    ///
    /// On success the claim button is gone from every known copy before this
    /// returns; delivery failures are logged and do not undo the claim.
    pub async fn claim(
        &self,
        lead_id: LeadId,
        claimant: ClaimantId,
        display_name: impl Into<String>,
    ) -> Result<ClaimSession, ClaimError> {
        let grant = self
            .store
            .try_claim(lead_id, claimant, display_name, Utc::now())
            .inspect_err(|err| debug!(lead_id, claimant = %claimant, %err, "claim refused"))?;
        info!(lead_id, claimant = %claimant, "lead claimed");

        let report = update_all(
            &self.notifier,
            grant.handles.iter(),
            MessageUpdate::DisableClaim,
        )
        .await;
        report.log_failures(lead_id, "disable claim");

        Ok(grant.session)
    }
}
