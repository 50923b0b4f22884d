//! Inbound update routing.
//!
//! Turns raw updates into [`InboundEvent`]s, runs them against the
//! [`LeadService`], and returns the replies to send. No network calls happen
//! here; the poller delivers the returned [`Outbound`] actions.

use crate::types::{InlineKeyboardButton, InlineKeyboardMarkup, Update};
use leadcall_core::{
    ChannelId, ClaimError, ClaimantId, ConversationError, LeadId, LeadService, Registration,
    RegistryError,
};
use tracing::{debug, info};

pub const TAKE_CALLBACK_PREFIX: &str = "take|";

const TAKE_BUTTON_TEXT: &str = "✅ Take";
const GREETING: &str = "👋 Hi! To receive leads here, send:\n/auth <password>";
const AUTH_REJECTED: &str = "❌ Wrong password.";
const AUTH_ALREADY: &str = "✅ This chat is already authorized.";
const AUTH_OK: &str = "✅ Authorized! New leads will arrive here.";
const ALREADY_TAKEN: &str = "🚫 Already taken.";
const LEAD_MISSING: &str = "Lead not found.";
const RESULT_SAVED: &str = "✅ Result saved.";
const CANCELLED: &str = "❌ Cancelled. The lead stays assigned to you without a result.";
const NOTHING_TO_CANCEL: &str = "Nothing to cancel.";

/// Chat that carries `user`'s result conversation: the private chat the
/// claim prompt is sent to. In a private chat the chat id equals the user id.
pub fn conversation_chat(user: ClaimantId) -> ChannelId {
    ChannelId(user.0)
}

/// Keyboard attached to every lead offer.
pub fn take_keyboard(lead_id: LeadId) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![vec![InlineKeyboardButton {
            text: TAKE_BUTTON_TEXT.to_string(),
            callback_data: format!("{TAKE_CALLBACK_PREFIX}{lead_id}"),
        }]],
    }
}

/// Parse `take|<digits>`. Anything else is not a claim.
pub fn parse_take(data: &str) -> Option<LeadId> {
    let digits = data.strip_prefix(TAKE_CALLBACK_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Start {
        chat: ChannelId,
    },
    Auth {
        chat: ChannelId,
        args: Vec<String>,
    },
    Cancel {
        chat: ChannelId,
        user: ClaimantId,
    },
    Take {
        callback_id: String,
        lead_id: LeadId,
        user: ClaimantId,
        display_name: String,
    },
    Text {
        chat: ChannelId,
        user: ClaimantId,
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Reply {
        chat: ChannelId,
        text: String,
    },
    AnswerCallback {
        callback_id: String,
        text: Option<String>,
        alert: bool,
    },
}

impl Outbound {
    fn reply(chat: ChannelId, text: impl Into<String>) -> Self {
        Self::Reply {
            chat,
            text: text.into(),
        }
    }

    fn answer(callback_id: &str, text: Option<&str>, alert: bool) -> Self {
        Self::AnswerCallback {
            callback_id: callback_id.to_string(),
            text: text.map(str::to_string),
            alert,
        }
    }
}

/// Classify one update. Unknown commands and unrelated updates yield `None`.
pub fn classify(update: &Update) -> Option<InboundEvent> {
    if let Some(query) = &update.callback_query {
        let data = query.data.as_deref().unwrap_or_default();
        let Some(lead_id) = parse_take(data) else {
            debug!(update_id = update.update_id, data, "ignoring callback");
            return None;
        };
        return Some(InboundEvent::Take {
            callback_id: query.id.clone(),
            lead_id,
            user: ClaimantId(query.from.id),
            display_name: query.from.full_name(),
        });
    }

    let message = update.message.as_ref()?;
    let text = message.text.as_deref()?;
    let chat = ChannelId(message.chat.id);

    if let Some(command_line) = text.strip_prefix('/') {
        let mut parts = command_line.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let command = command.split('@').next().unwrap_or_default();
        return match command {
            "start" => Some(InboundEvent::Start { chat }),
            "auth" => Some(InboundEvent::Auth {
                chat,
                args: parts.map(str::to_string).collect(),
            }),
            "cancel" => {
                let user = message.from.as_ref()?;
                Some(InboundEvent::Cancel {
                    chat,
                    user: ClaimantId(user.id),
                })
            }
            _ => None,
        };
    }

    let user = message.from.as_ref()?;
    Some(InboundEvent::Text {
        chat,
        user: ClaimantId(user.id),
        text: text.to_string(),
    })
}

#[derive(Clone)]
pub struct UpdateRouter {
    service: LeadService,
}

impl UpdateRouter {
    pub fn new(service: LeadService) -> Self {
        Self { service }
    }

    pub async fn route(&self, update: &Update) -> Vec<Outbound> {
        match classify(update) {
            Some(event) => self.handle(event).await,
            None => Vec::new(),
        }
    }

    pub async fn handle(&self, event: InboundEvent) -> Vec<Outbound> {
        match event {
            InboundEvent::Start { chat } => vec![Outbound::reply(chat, GREETING)],
            InboundEvent::Auth { chat, args } => vec![self.auth(chat, &args)],
            InboundEvent::Take {
                callback_id,
                lead_id,
                user,
                display_name,
            } => self.take(&callback_id, lead_id, user, display_name).await,
            InboundEvent::Text { chat, user, text } => self.result_text(chat, user, text).await,
            InboundEvent::Cancel { chat, user } => vec![self.cancel(chat, user)],
        }
    }

    fn auth(&self, chat: ChannelId, args: &[String]) -> Outbound {
        let [secret] = args else {
            return Outbound::reply(chat, AUTH_REJECTED);
        };
        match self.service.registry().authorize(chat, secret) {
            Ok(Registration::Registered) => {
                info!(
                    channel = %chat,
                    channels = self.service.registry().len(),
                    "channel registered"
                );
                Outbound::reply(chat, AUTH_OK)
            }
            Ok(Registration::AlreadyRegistered) => Outbound::reply(chat, AUTH_ALREADY),
            Err(RegistryError::InvalidSecret) => {
                info!(channel = %chat, "registration refused");
                Outbound::reply(chat, AUTH_REJECTED)
            }
        }
    }

    async fn take(
        &self,
        callback_id: &str,
        lead_id: LeadId,
        user: ClaimantId,
        display_name: String,
    ) -> Vec<Outbound> {
        match self.service.arbiter().claim(lead_id, user, display_name).await {
            Ok(_) => {
                let prompt = match self.service.store().lead(lead_id) {
                    Some(lead) => format!(
                        "✏️ You took lead #{} ({}, {}). Send the call result as a message, or /cancel.",
                        lead.id, lead.name, lead.phone
                    ),
                    None => "✏️ You took the lead. Send the call result as a message, or /cancel."
                        .to_string(),
                };
                vec![
                    Outbound::answer(callback_id, None, false),
                    Outbound::reply(conversation_chat(user), prompt),
                ]
            }
            Err(ClaimError::AlreadyTaken(_)) => {
                vec![Outbound::answer(callback_id, Some(ALREADY_TAKEN), true)]
            }
            Err(ClaimError::SessionActive { lead_id, .. }) => {
                let text = format!("Finish lead #{lead_id} first: send its result or /cancel.");
                vec![Outbound::answer(callback_id, Some(text.as_str()), true)]
            }
            Err(ClaimError::NotFound(_)) => {
                vec![Outbound::answer(callback_id, Some(LEAD_MISSING), true)]
            }
        }
    }

    async fn result_text(&self, chat: ChannelId, user: ClaimantId, text: String) -> Vec<Outbound> {
        if chat != conversation_chat(user) {
            return Vec::new();
        }
        match self.service.conversation().submit_result_for(user, text).await {
            Ok(_) => vec![Outbound::reply(chat, RESULT_SAVED)],
            Err(ConversationError::NoActiveSession(_)) => Vec::new(),
            Err(err) => {
                debug!(channel = %chat, claimant = %user, %err, "result text ignored");
                Vec::new()
            }
        }
    }

    fn cancel(&self, chat: ChannelId, user: ClaimantId) -> Outbound {
        if chat != conversation_chat(user) {
            return Outbound::reply(chat, NOTHING_TO_CANCEL);
        }
        match self.service.conversation().cancel_for(user) {
            Ok(_) => Outbound::reply(chat, CANCELLED),
            Err(_) => Outbound::reply(chat, NOTHING_TO_CANCEL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadcall_core::testing::MockNotifier;
    use leadcall_core::{LeadStatus, Notifier, SharedSecret, SubscriberRegistry};
    use serde_json::json;
    use std::sync::Arc;

    const GROUP: i64 = -100_500;

    fn router() -> (UpdateRouter, LeadService, Arc<MockNotifier>) {
        let mock = Arc::new(MockNotifier::new());
        let notifier: Arc<dyn Notifier> = mock.clone();
        let service = LeadService::new(
            SubscriberRegistry::new(SharedSecret::new("letmein")),
            notifier,
        );
        (UpdateRouter::new(service.clone()), service, mock)
    }

    fn message(update_id: i64, chat: i64, user: i64, text: &str) -> Update {
        serde_json::from_value(json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "chat": { "id": chat, "type": if chat < 0 { "group" } else { "private" } },
                "from": { "id": user, "is_bot": false, "first_name": format!("User{user}") },
                "text": text
            }
        }))
        .expect("message update should parse")
    }

    fn callback(update_id: i64, user: i64, data: &str) -> Update {
        serde_json::from_value(json!({
            "update_id": update_id,
            "callback_query": {
                "id": format!("cb-{update_id}"),
                "from": { "id": user, "is_bot": false, "first_name": "Olga", "last_name": "K" },
                "message": {
                    "message_id": 1,
                    "chat": { "id": GROUP, "type": "group" }
                },
                "data": data
            }
        }))
        .expect("callback update should parse")
    }

    #[test]
    fn take_data_must_be_prefix_and_digits() {
        assert_eq!(parse_take("take|0"), Some(0));
        assert_eq!(parse_take("take|123"), Some(123));
        assert_eq!(parse_take("take|"), None);
        assert_eq!(parse_take("take|-1"), None);
        assert_eq!(parse_take("take|1x"), None);
        assert_eq!(parse_take("drop|1"), None);
        assert_eq!(
            take_keyboard(7).inline_keyboard[0][0].callback_data,
            "take|7"
        );
    }

    #[test]
    fn commands_are_classified() {
        assert_eq!(
            classify(&message(1, GROUP, 5, "/start")),
            Some(InboundEvent::Start {
                chat: ChannelId(GROUP)
            })
        );
        assert_eq!(
            classify(&message(2, GROUP, 5, "/auth@leadcall_bot  s3cret ")),
            Some(InboundEvent::Auth {
                chat: ChannelId(GROUP),
                args: vec!["s3cret".to_string()],
            })
        );
        assert_eq!(classify(&message(3, GROUP, 5, "/unknown")), None);
        assert_eq!(
            classify(&message(4, 5, 5, "no answer")),
            Some(InboundEvent::Text {
                chat: ChannelId(5),
                user: ClaimantId(5),
                text: "no answer".to_string(),
            })
        );
        assert_eq!(classify(&callback(5, 5, "bogus")), None);
    }

    #[tokio::test]
    async fn auth_registers_chat_with_right_password_only() {
        let (router, service, _) = router();

        let replies = router.route(&message(1, GROUP, 5, "/auth nope")).await;
        assert_eq!(replies, vec![Outbound::reply(ChannelId(GROUP), AUTH_REJECTED)]);
        let replies = router.route(&message(2, GROUP, 5, "/auth")).await;
        assert_eq!(replies, vec![Outbound::reply(ChannelId(GROUP), AUTH_REJECTED)]);
        assert!(service.registry().is_empty());

        let replies = router.route(&message(3, GROUP, 5, "/auth letmein")).await;
        assert_eq!(replies, vec![Outbound::reply(ChannelId(GROUP), AUTH_OK)]);
        let replies = router.route(&message(4, GROUP, 6, "/auth letmein")).await;
        assert_eq!(replies, vec![Outbound::reply(ChannelId(GROUP), AUTH_ALREADY)]);
        assert_eq!(service.registry().snapshot(), vec![ChannelId(GROUP)]);
    }

    #[tokio::test]
    async fn take_then_text_resolves_lead() {
        let (router, service, mock) = router();
        router.route(&message(1, GROUP, 5, "/auth letmein")).await;
        let lead_id = service.dispatcher().submit("Alice", "+1-555-0100").await;
        assert_eq!(mock.sends().len(), 1);

        let replies = router.route(&callback(2, 77, &format!("take|{lead_id}"))).await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], Outbound::answer("cb-2", None, false));
        let Outbound::Reply { chat, text } = &replies[1] else {
            panic!("expected a direct message, got {:?}", replies[1]);
        };
        assert_eq!(*chat, ChannelId(77));
        assert!(text.contains("Alice"));

        let replies = router.route(&callback(3, 88, &format!("take|{lead_id}"))).await;
        assert_eq!(
            replies,
            vec![Outbound::answer("cb-3", Some(ALREADY_TAKEN), true)]
        );

        let replies = router.route(&message(4, 88, 88, "I want it too")).await;
        assert!(replies.is_empty());

        let replies = router.route(&message(5, 77, 77, "Called back, interested")).await;
        assert_eq!(replies, vec![Outbound::reply(ChannelId(77), RESULT_SAVED)]);

        let lead = service.store().lead(lead_id).expect("lead exists");
        assert_eq!(lead.status(), LeadStatus::Resolved);
        assert_eq!(lead.taker_display_name.as_deref(), Some("Olga K"));
        assert_eq!(lead.result.as_deref(), Some("Called back, interested"));
    }

    #[tokio::test]
    async fn busy_claimant_and_missing_lead_get_alerts() {
        let (router, service, _) = router();
        let first = service.dispatcher().submit("A", "1").await;
        let second = service.dispatcher().submit("B", "2").await;

        router.route(&callback(1, 77, &format!("take|{first}"))).await;
        let replies = router.route(&callback(2, 77, &format!("take|{second}"))).await;
        let [Outbound::AnswerCallback { text, alert, .. }] = replies.as_slice() else {
            panic!("expected one alert, got {replies:?}");
        };
        assert!(*alert);
        assert!(text.as_deref().unwrap_or_default().contains(&format!("#{first}")));

        let replies = router.route(&callback(3, 77, "take|999")).await;
        assert_eq!(
            replies,
            vec![Outbound::answer("cb-3", Some(LEAD_MISSING), true)]
        );
    }

    #[tokio::test]
    async fn cancel_ends_session_once() {
        let (router, service, _) = router();
        let lead_id = service.dispatcher().submit("A", "1").await;
        router.route(&callback(1, 77, &format!("take|{lead_id}"))).await;

        let replies = router.route(&message(2, 77, 77, "/cancel")).await;
        assert_eq!(replies, vec![Outbound::reply(ChannelId(77), CANCELLED)]);
        let replies = router.route(&message(3, 77, 77, "/cancel")).await;
        assert_eq!(replies, vec![Outbound::reply(ChannelId(77), NOTHING_TO_CANCEL)]);

        let replies = router.route(&message(4, 77, 77, "late result")).await;
        assert!(replies.is_empty());
        let lead = service.store().lead(lead_id).expect("lead exists");
        assert_eq!(lead.status(), LeadStatus::Claimed);
    }

    #[tokio::test]
    async fn group_chatter_does_not_touch_open_session() {
        let (router, service, mock) = router();
        router.route(&message(1, GROUP, 5, "/auth letmein")).await;
        let lead_id = service.dispatcher().submit("Alice", "+1-555-0100").await;
        router.route(&callback(2, 77, &format!("take|{lead_id}"))).await;
        mock.clear();

        let replies = router.route(&message(3, GROUP, 77, "lunch anyone?")).await;
        assert!(replies.is_empty());
        let replies = router.route(&message(4, GROUP, 77, "/cancel")).await;
        assert_eq!(
            replies,
            vec![Outbound::reply(ChannelId(GROUP), NOTHING_TO_CANCEL)]
        );

        let lead = service.store().lead(lead_id).expect("lead exists");
        assert_eq!(lead.result, None);
        assert_eq!(lead.status(), LeadStatus::Claimed);
        assert!(mock.updates().is_empty());
        assert!(service.store().active_session(ClaimantId(77)).is_some());

        let replies = router.route(&message(5, 77, 77, "Called, not interested")).await;
        assert_eq!(replies, vec![Outbound::reply(ChannelId(77), RESULT_SAVED)]);
        let lead = service.store().lead(lead_id).expect("lead exists");
        assert_eq!(lead.result.as_deref(), Some("Called, not interested"));
    }
}
