//! Long-poll loop: fetch updates, route them, deliver the replies.

use crate::api::BotApi;
use crate::notifier::TelegramNotifier;
use crate::router::{Outbound, UpdateRouter};
use crate::types::Update;
use leadcall_core::{ClaimAffordance, Notifier};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub const ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub timeout_secs: u64,
    pub error_backoff: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            error_backoff: ERROR_BACKOFF,
        }
    }
}

pub struct Poller {
    api: BotApi,
    replies: TelegramNotifier,
    router: UpdateRouter,
    config: PollerConfig,
}

impl Poller {
    pub fn new(api: BotApi, router: UpdateRouter, config: PollerConfig) -> Self {
        Self {
            replies: TelegramNotifier::new(api.clone()),
            api,
            router,
            config,
        }
    }

    /// Poll until `shutdown` resolves. An in-flight batch is finished first.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut offset: Option<i64> = None;
        info!(timeout_secs = self.config.timeout_secs, "update poller started");

        loop {
            let fetched = tokio::select! {
                _ = &mut shutdown => break,
                fetched = self.api.get_updates(offset, self.config.timeout_secs) => fetched,
            };

            let batch = match fetched {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(%err, "getUpdates failed");
                    let stop = tokio::select! {
                        _ = &mut shutdown => true,
                        _ = tokio::time::sleep(self.config.error_backoff) => false,
                    };
                    if stop {
                        break;
                    }
                    continue;
                }
            };

            if let Some(next) = batch.next_offset() {
                offset = Some(next);
            }
            if !batch.updates.is_empty() {
                debug!(count = batch.updates.len(), "processing updates");
                self.process(batch.updates).await;
            }
        }

        info!("update poller stopped");
    }

    /// Updates from one sender run in order; different senders run concurrently.
    async fn process(&self, updates: Vec<Update>) {
        let mut tasks = JoinSet::new();
        for batch in group_by_sender(updates) {
            let router = self.router.clone();
            let replies = self.replies.clone();
            tasks.spawn(async move {
                for update in batch {
                    let actions = router.route(&update).await;
                    deliver(&replies, actions).await;
                }
            });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(%err, "update task failed");
            }
        }
    }
}

fn group_by_sender(updates: Vec<Update>) -> Vec<Vec<Update>> {
    let mut by_sender: BTreeMap<Option<i64>, Vec<Update>> = BTreeMap::new();
    for update in updates {
        let sender = update.sender().map(|user| user.id);
        by_sender.entry(sender).or_default().push(update);
    }
    by_sender.into_values().collect()
}

/// Send each reply. Failures are logged and skipped.
pub async fn deliver(replies: &TelegramNotifier, actions: Vec<Outbound>) {
    for action in actions {
        let outcome = match &action {
            Outbound::Reply { chat, text } => replies
                .send(*chat, text, ClaimAffordance::None)
                .await
                .map(drop)
                .map_err(|err| err.to_string()),
            Outbound::AnswerCallback {
                callback_id,
                text,
                alert,
            } => replies
                .api()
                .answer_callback_query(callback_id, text.as_deref(), *alert)
                .await
                .map_err(|err| err.to_string()),
        };
        if let Err(err) = outcome {
            warn!(%err, ?action, "reply not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(update_id: i64, user: i64) -> Update {
        serde_json::from_value(json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "chat": { "id": user, "type": "private" },
                "from": { "id": user, "first_name": "U" },
                "text": format!("msg {update_id}")
            }
        }))
        .expect("update should parse")
    }

    #[test]
    fn grouping_keeps_per_sender_order() {
        let groups = group_by_sender(vec![
            update(1, 7),
            update(2, 8),
            update(3, 7),
            update(4, 8),
            update(5, 7),
        ]);
        let ids: Vec<Vec<i64>> = groups
            .iter()
            .map(|group| group.iter().map(|update| update.update_id).collect())
            .collect();
        assert_eq!(ids, vec![vec![1, 3, 5], vec![2, 4]]);
    }

    #[tokio::test]
    async fn shutdown_stops_loop_during_backoff() {
        use leadcall_core::testing::MockNotifier;
        use leadcall_core::{LeadService, Notifier, SharedSecret, SubscriberRegistry};
        use std::sync::Arc;

        let notifier: Arc<dyn Notifier> = Arc::new(MockNotifier::new());
        let service = LeadService::new(SubscriberRegistry::new(SharedSecret::new("pw")), notifier);
        // Nothing listens on port 9, so every poll fails fast.
        let api = BotApi::new("http://127.0.0.1:9", "0:test").expect("client builds");
        let poller = Poller::new(
            api,
            UpdateRouter::new(service),
            PollerConfig {
                timeout_secs: 0,
                error_backoff: Duration::from_secs(60),
            },
        );

        let stopped = tokio::time::timeout(
            Duration::from_secs(10),
            poller.run(tokio::time::sleep(Duration::from_millis(200))),
        )
        .await;
        assert!(stopped.is_ok(), "poller should stop once shutdown fires");
    }
}
