//! Testing utilities: an in-memory [`Notifier`] that records every call.

use crate::lead::{ChannelId, MessageHandle};
use crate::notifier::{ClaimAffordance, DeliveryError, MessageUpdate, Notifier};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// One call observed by [`MockNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierCall {
    Send {
        channel: ChannelId,
        text: String,
        affordance: ClaimAffordance,
    },
    Update {
        channel: ChannelId,
        handle: MessageHandle,
        update: MessageUpdate,
    },
}

/// Records calls, hands out sequential handles, and fails on demand.
///
/// Failing channels still have their calls recorded, so tests can assert
/// that a failure did not stop the rest of the batch.
#[derive(Debug)]
pub struct MockNotifier {
    next_handle: AtomicI64,
    calls: Mutex<Vec<NotifierCall>>,
    failing: Mutex<BTreeSet<ChannelId>>,
    latency: Mutex<Option<Duration>>,
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicI64::new(1),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(BTreeSet::new()),
            latency: Mutex::new(None),
        }
    }

    /// Make every call for `channel` fail with a transport error.
    pub fn fail_channel(&self, channel: ChannelId) {
        self.failing.lock().insert(channel);
    }

    /// Delay every call, widening race windows in concurrency tests.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn calls(&self) -> Vec<NotifierCall> {
        self.calls.lock().clone()
    }

    pub fn sends(&self) -> Vec<NotifierCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, NotifierCall::Send { .. }))
            .collect()
    }

    pub fn updates(&self) -> Vec<NotifierCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, NotifierCall::Update { .. }))
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    async fn simulate(&self, channel: ChannelId, call: NotifierCall) -> Result<(), DeliveryError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.calls.lock().push(call);
        if self.failing.lock().contains(&channel) {
            return Err(DeliveryError::Transport(format!(
                "channel {channel} unreachable"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(
        &self,
        channel: ChannelId,
        text: &str,
        affordance: ClaimAffordance,
    ) -> Result<MessageHandle, DeliveryError> {
        self.simulate(
            channel,
            NotifierCall::Send {
                channel,
                text: text.to_string(),
                affordance,
            },
        )
        .await?;
        Ok(MessageHandle(
            self.next_handle.fetch_add(1, Ordering::SeqCst),
        ))
    }

    async fn update(
        &self,
        channel: ChannelId,
        handle: MessageHandle,
        update: MessageUpdate,
    ) -> Result<(), DeliveryError> {
        self.simulate(
            channel,
            NotifierCall::Update {
                channel,
                handle,
                update,
            },
        )
        .await
    }
}
