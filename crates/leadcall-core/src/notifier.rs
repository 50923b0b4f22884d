//! Outbound delivery contract and per-channel fanout.
//!
//! The core never talks to a transport directly. It hands each channel's
//! send/update to a [`Notifier`] and collects what happened into a
//! [`DeliveryReport`]. A failing channel is recorded and logged; it never
//! stops the others.

use crate::lead::{ChannelId, LeadId, MessageHandle};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::warn;

/// Whether a freshly sent notification offers a claim action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimAffordance {
    Offer(LeadId),
    None,
}

/// Edit applied to a previously sent notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageUpdate {
    /// Remove the claim action, keep the text.
    DisableClaim,
    /// Replace the text. Any claim action goes with it.
    ReplaceText(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("rejected by transport ({}): {description}", code_label(.code))]
    Rejected {
        code: Option<i64>,
        description: String,
    },

    #[error("transport returned no message handle")]
    MissingHandle,

    #[error("delivery task failed: {0}")]
    TaskFailed(String),
}

fn code_label(code: &Option<i64>) -> String {
    code.map_or_else(|| "no code".to_string(), |c| c.to_string())
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        channel: ChannelId,
        text: &str,
        affordance: ClaimAffordance,
    ) -> Result<MessageHandle, DeliveryError>;

    async fn update(
        &self,
        channel: ChannelId,
        handle: MessageHandle,
        update: MessageUpdate,
    ) -> Result<(), DeliveryError>;
}

/// Per-channel outcome of one fanout or update batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<ChannelId>,
    pub failed: Vec<(ChannelId, DeliveryError)>,
}

impl DeliveryReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub(crate) fn record<T>(&mut self, channel: ChannelId, outcome: &Result<T, DeliveryError>) {
        match outcome {
            Ok(_) => self.delivered.push(channel),
            Err(err) => self.failed.push((channel, err.clone())),
        }
    }

    pub(crate) fn sort(&mut self) {
        self.delivered.sort();
        self.failed.sort_by_key(|(channel, _)| *channel);
    }

    pub(crate) fn log_failures(&self, lead_id: LeadId, stage: &str) {
        for (channel, err) in &self.failed {
            warn!(lead_id, channel = %channel, stage, %err, "delivery failed");
        }
    }
}

/// Run `op` once per channel, concurrently, and wait for every one of them.
///
/// Results come back in channel order. A task that panics is reported as
/// `TaskFailed` for its channel.
pub(crate) async fn per_channel<T, F, Fut>(
    channels: impl IntoIterator<Item = ChannelId>,
    op: F,
) -> Vec<(ChannelId, Result<T, DeliveryError>)>
where
    T: Send + 'static,
    F: Fn(ChannelId) -> Fut,
    Fut: Future<Output = Result<T, DeliveryError>> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    let mut pending = BTreeMap::new();
    for channel in channels {
        let handle = tasks.spawn(op(channel));
        pending.insert(handle.id(), channel);
    }

    let mut outcomes = Vec::with_capacity(pending.len());
    while let Some(joined) = tasks.join_next_with_id().await {
        let (task_id, outcome) = match joined {
            Ok((task_id, outcome)) => (task_id, outcome),
            Err(err) => (err.id(), Err(DeliveryError::TaskFailed(err.to_string()))),
        };
        if let Some(channel) = pending.remove(&task_id) {
            outcomes.push((channel, outcome));
        }
    }
    outcomes.sort_by_key(|(channel, _)| *channel);
    outcomes
}

/// Apply `update` to every `(channel, handle)` pair.
pub(crate) async fn update_all(
    notifier: &Arc<dyn Notifier>,
    handles: impl IntoIterator<Item = (ChannelId, MessageHandle)>,
    update: MessageUpdate,
) -> DeliveryReport {
    let handles: BTreeMap<ChannelId, MessageHandle> = handles.into_iter().collect();
    let outcomes = per_channel(handles.keys().copied().collect::<Vec<_>>(), |channel| {
        let notifier = Arc::clone(notifier);
        let update = update.clone();
        let handle = handles.get(&channel).copied();
        async move {
            let handle = handle.ok_or(DeliveryError::MissingHandle)?;
            notifier.update(channel, handle, update).await
        }
    })
    .await;

    let mut report = DeliveryReport::default();
    for (channel, outcome) in &outcomes {
        report.record(*channel, outcome);
    }
    report.sort();
    report
}
