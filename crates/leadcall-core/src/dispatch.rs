//! Lead intake: create the record, then notify every registered channel.

use crate::lead::{ChannelId, LeadId, LeadStatus, MessageHandle};
use crate::notifier::{ClaimAffordance, DeliveryReport, MessageUpdate, Notifier, per_channel};
use crate::render::{offer_text, resolved_text};
use crate::store::LeadStore;
use crate::subscribers::SubscriberRegistry;
use std::sync::Arc;
use tracing::{info, warn};

/// A dispatched lead and how its fanout went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub lead_id: LeadId,
    pub report: DeliveryReport,
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<LeadStore>,
    registry: Arc<SubscriberRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<LeadStore>,
        registry: Arc<SubscriberRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            registry,
            notifier,
        }
    }

    /// Create a lead and fan it out. Returns its id once every channel has
    /// either accepted the notification or failed.
    pub async fn submit(&self, name: impl Into<String>, phone: impl Into<String>) -> LeadId {
        self.dispatch(name, phone).await.lead_id
    }

    /// Like [`Dispatcher::submit`], also returning the per-channel report.
    pub async fn dispatch(
        &self,
        name: impl Into<String>,
        phone: impl Into<String>,
    ) -> Dispatched {
        let lead = self.store.create_lead(name, phone);
        let lead_id = lead.id;
        let channels = self.registry.snapshot();
        info!(lead_id, channels = channels.len(), "lead created");

        let text = offer_text(&lead);
        let outcomes = per_channel(channels, |channel| {
            let notifier = Arc::clone(&self.notifier);
            let text = text.clone();
            async move {
                notifier
                    .send(channel, &text, ClaimAffordance::Offer(lead_id))
                    .await
            }
        })
        .await;

        let mut report = DeliveryReport::default();
        let mut catch_up = Vec::new();
        for (channel, outcome) in &outcomes {
            report.record(*channel, outcome);
            let Ok(handle) = outcome else {
                continue;
            };
            match self.store.record_handle(lead_id, *channel, *handle) {
                Some(snapshot) => match snapshot.status() {
                    LeadStatus::Open => {}
                    LeadStatus::Claimed => {
                        catch_up.push((*channel, *handle, MessageUpdate::DisableClaim));
                    }
                    LeadStatus::Resolved => catch_up.push((
                        *channel,
                        *handle,
                        MessageUpdate::ReplaceText(resolved_text(&snapshot)),
                    )),
                },
                None => warn!(lead_id, channel = %channel, "lead vanished during fanout"),
            }
        }
        report.log_failures(lead_id, "send");

        self.catch_up(lead_id, catch_up).await;
        report.sort();
        Dispatched { lead_id, report }
    }

    /// Bring copies that arrived after a claim in line with the lead.
    async fn catch_up(
        &self,
        lead_id: LeadId,
        updates: Vec<(ChannelId, MessageHandle, MessageUpdate)>,
    ) {
        for (channel, handle, update) in updates {
            if let Err(err) = self.notifier.update(channel, handle, update).await {
                warn!(lead_id, channel = %channel, stage = "catch up", %err, "delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lead::ClaimantId;
    use crate::subscribers::SharedSecret;
    use crate::testing::{MockNotifier, NotifierCall};
    use chrono::Utc;
    use std::time::Duration;

    fn dispatcher(
        mock: &Arc<MockNotifier>,
        channels: &[i64],
    ) -> (Dispatcher, Arc<LeadStore>, Arc<SubscriberRegistry>) {
        let store = Arc::new(LeadStore::new());
        let registry = Arc::new(SubscriberRegistry::with_channels(
            SharedSecret::new("secret"),
            channels.iter().copied().map(ChannelId),
        ));
        let notifier: Arc<dyn Notifier> = mock.clone();
        (
            Dispatcher::new(Arc::clone(&store), Arc::clone(&registry), notifier),
            store,
            registry,
        )
    }

    #[tokio::test]
    async fn submit_records_one_handle_per_channel() {
        let mock = Arc::new(MockNotifier::new());
        let (dispatcher, store, _) = dispatcher(&mock, &[10, 20]);

        let lead_id = dispatcher.submit("Alice", "+1-555-0100").await;
        assert_eq!(lead_id, 0);

        let lead = store.lead(lead_id).expect("lead exists");
        assert_eq!(
            lead.handles.channels().collect::<Vec<_>>(),
            vec![ChannelId(10), ChannelId(20)]
        );
        assert_eq!(lead.taken_by, None);

        for call in mock.sends() {
            let NotifierCall::Send {
                text, affordance, ..
            } = call
            else {
                unreachable!("sends() only returns sends");
            };
            assert!(text.contains("Alice"));
            assert_eq!(affordance, ClaimAffordance::Offer(lead_id));
        }
        assert_eq!(mock.sends().len(), 2);
    }

    #[tokio::test]
    async fn failing_channel_is_absent_but_others_are_recorded() {
        let mock = Arc::new(MockNotifier::new());
        mock.fail_channel(ChannelId(20));
        let (dispatcher, store, _) = dispatcher(&mock, &[10, 20, 30]);

        let dispatched = dispatcher.dispatch("Bob", "42").await;
        assert_eq!(
            dispatched.report.delivered,
            vec![ChannelId(10), ChannelId(30)]
        );
        assert_eq!(dispatched.report.failed.len(), 1);
        assert_eq!(dispatched.report.failed[0].0, ChannelId(20));

        let lead = store.lead(dispatched.lead_id).expect("lead exists");
        assert_eq!(lead.handles.len(), 2);
        assert_eq!(lead.handles.get(ChannelId(20)), None);
    }

    #[tokio::test]
    async fn no_subscribers_still_creates_lead() {
        let mock = Arc::new(MockNotifier::new());
        let (dispatcher, store, _) = dispatcher(&mock, &[]);

        let first = dispatcher.submit("", "").await;
        let second = dispatcher.submit("x", "y").await;
        assert_eq!((first, second), (0, 1));
        assert!(store.lead(first).expect("lead exists").handles.is_empty());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn later_registrations_do_not_join_earlier_leads() {
        let mock = Arc::new(MockNotifier::new());
        let (dispatcher, store, registry) = dispatcher(&mock, &[1]);

        let lead_id = dispatcher.submit("A", "1").await;
        registry
            .authorize(ChannelId(2), "secret")
            .expect("secret matches");

        let lead = store.lead(lead_id).expect("lead exists");
        assert_eq!(
            lead.handles.channels().collect::<Vec<_>>(),
            vec![ChannelId(1)]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn copy_recorded_after_claim_is_disabled_immediately() {
        let mock = Arc::new(MockNotifier::new());
        mock.set_latency(Duration::from_millis(50));
        let (dispatcher, store, _) = dispatcher(&mock, &[1, 2]);

        let fanout = tokio::spawn(async move { dispatcher.dispatch("Early", "0").await });
        while store.is_empty() {
            tokio::task::yield_now().await;
        }
        store
            .try_claim(0, ClaimantId(5), "Eve", Utc::now())
            .expect("claim wins before any copy is recorded");

        let dispatched = fanout.await.expect("dispatch should join");
        assert!(dispatched.report.is_complete());

        let mut disabled: Vec<ChannelId> = mock
            .updates()
            .into_iter()
            .filter_map(|call| match call {
                NotifierCall::Update {
                    channel,
                    update: MessageUpdate::DisableClaim,
                    ..
                } => Some(channel),
                _ => None,
            })
            .collect();
        disabled.sort();
        assert_eq!(disabled, vec![ChannelId(1), ChannelId(2)]);
    }
}
