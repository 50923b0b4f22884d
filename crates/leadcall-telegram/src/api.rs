//! Thin Bot API client over `reqwest`.

use crate::types::{
    AnswerCallbackQuery, ApiResponse, EditMessageReplyMarkup, EditMessageText, GetUpdates,
    InlineKeyboardMarkup, Message, SendMessage, Update,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::{Debug, Formatter};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const ALLOWED_UPDATES: &[&str] = &["message", "callback_query"];

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("{method}: http error: {source}")]
    Http {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method}: rejected ({}): {description}", code_label(.code))]
    Rejected {
        method: &'static str,
        code: Option<i64>,
        description: String,
    },

    #[error("{method}: ok response carried no result")]
    EmptyResult { method: &'static str },
}

fn code_label(code: &Option<i64>) -> String {
    code.map_or_else(|| "no code".to_string(), |c| c.to_string())
}

impl ApiError {
    /// Telegram refuses edits that would leave a message unchanged.
    pub fn is_not_modified(&self) -> bool {
        matches!(
            self,
            Self::Rejected { description, .. } if description.contains("message is not modified")
        )
    }
}

/// One `getUpdates` response.
///
/// Entries that do not decode are dropped but still count towards the next
/// offset, so a bad entry is acknowledged instead of being fetched forever.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateBatch {
    pub updates: Vec<Update>,
    pub skipped: usize,
    last_update_id: Option<i64>,
}

impl UpdateBatch {
    pub fn decode(raw: Vec<Value>) -> Self {
        let mut batch = Self::default();
        for entry in raw {
            let update_id = entry.get("update_id").and_then(Value::as_i64);
            if let Some(id) = update_id {
                batch.last_update_id = Some(batch.last_update_id.map_or(id, |last| last.max(id)));
            }
            match serde_json::from_value::<Update>(entry) {
                Ok(update) => batch.updates.push(update),
                Err(err) => {
                    warn!(?update_id, %err, "skipping undecodable update");
                    batch.skipped += 1;
                }
            }
        }
        batch
    }

    /// Offset that acknowledges every entry, decoded or not.
    pub fn next_offset(&self) -> Option<i64> {
        self.last_update_id.map(|id| id + 1)
    }
}

#[derive(Clone)]
pub struct BotApi {
    client: reqwest::Client,
    endpoint: String,
}

impl Debug for BotApi {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotApi")
            .field("endpoint", &"<redacted>")
            .finish()
    }
}

impl BotApi {
    pub fn new(api_base: &str, token: &str) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(ApiError::Client)?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{token}", api_base.trim_end_matches('/')),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.endpoint)
    }

    async fn call<B, T>(
        &self,
        method: &'static str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| ApiError::Http { method, source })?;
        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|source| ApiError::Http { method, source })?;
        unwrap_envelope(method, envelope)
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, ApiError> {
        let body = SendMessage {
            chat_id,
            text,
            reply_markup,
        };
        self.call("sendMessage", &body, REQUEST_TIMEOUT).await
    }

    /// Replace (or with `None`, remove) a message's inline keyboard.
    pub async fn edit_message_reply_markup(
        &self,
        chat_id: i64,
        message_id: i64,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), ApiError> {
        let body = EditMessageReplyMarkup {
            chat_id,
            message_id,
            reply_markup,
        };
        self.call::<_, serde_json::Value>("editMessageReplyMarkup", &body, REQUEST_TIMEOUT)
            .await
            .map(drop)
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), ApiError> {
        let body = EditMessageText {
            chat_id,
            message_id,
            text,
        };
        self.call::<_, serde_json::Value>("editMessageText", &body, REQUEST_TIMEOUT)
            .await
            .map(drop)
    }

    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), ApiError> {
        let body = AnswerCallbackQuery {
            callback_query_id,
            text,
            show_alert,
        };
        self.call::<_, bool>("answerCallbackQuery", &body, REQUEST_TIMEOUT)
            .await
            .map(drop)
    }

    /// Long-poll for updates. The request outlives the server-side wait.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<UpdateBatch, ApiError> {
        let body = GetUpdates {
            offset,
            timeout: timeout_secs,
            allowed_updates: ALLOWED_UPDATES,
        };
        let timeout = Duration::from_secs(timeout_secs) + REQUEST_TIMEOUT;
        let raw: Vec<Value> = self.call("getUpdates", &body, timeout).await?;
        Ok(UpdateBatch::decode(raw))
    }
}

fn unwrap_envelope<T>(method: &'static str, envelope: ApiResponse<T>) -> Result<T, ApiError> {
    if !envelope.ok {
        return Err(ApiError::Rejected {
            method,
            code: envelope.error_code,
            description: envelope
                .description
                .unwrap_or_else(|| "no description".to_string()),
        });
    }
    envelope.result.ok_or(ApiError::EmptyResult { method })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_and_token() {
        let api = BotApi::new("https://example.test/", "123:abc").expect("client builds");
        assert_eq!(
            api.method_url("sendMessage"),
            "https://example.test/bot123:abc/sendMessage"
        );
        assert!(!format!("{api:?}").contains("123:abc"));
    }

    #[test]
    fn rejected_envelope_maps_to_error() {
        let envelope: ApiResponse<bool> = ApiResponse {
            ok: false,
            result: None,
            description: Some("Bad Request: message is not modified".to_string()),
            error_code: Some(400),
        };
        let err = unwrap_envelope("editMessageReplyMarkup", envelope).expect_err("not ok");
        assert!(err.is_not_modified());
        assert_eq!(
            err.to_string(),
            "editMessageReplyMarkup: rejected (400): Bad Request: message is not modified"
        );
    }

    #[test]
    fn undecodable_update_is_skipped_but_acknowledged() {
        let batch = UpdateBatch::decode(vec![
            serde_json::json!({
                "update_id": 10,
                "message": {
                    "message_id": 1,
                    "chat": { "id": 5, "type": "private" },
                    "text": "hi"
                }
            }),
            serde_json::json!({ "update_id": 12, "message": { "message_id": "not a number" } }),
            serde_json::json!({ "update_id": 11 }),
            serde_json::json!({ "no_id": true }),
        ]);
        assert_eq!(
            batch.updates.iter().map(|u| u.update_id).collect::<Vec<_>>(),
            vec![10, 11]
        );
        assert_eq!(batch.skipped, 2);
        assert_eq!(batch.next_offset(), Some(13));
        assert_eq!(UpdateBatch::decode(Vec::new()).next_offset(), None);
    }

    #[test]
    fn ok_without_result_is_an_error() {
        let envelope: ApiResponse<Message> = ApiResponse {
            ok: true,
            result: None,
            description: None,
            error_code: None,
        };
        assert!(matches!(
            unwrap_envelope("sendMessage", envelope),
            Err(ApiError::EmptyResult {
                method: "sendMessage"
            })
        ));
    }
}
