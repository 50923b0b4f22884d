//! `Notifier` over the Bot API: one chat per channel, one message per handle.

use crate::api::{ApiError, BotApi};
use crate::router::take_keyboard;
use async_trait::async_trait;
use leadcall_core::{
    ChannelId, ClaimAffordance, DeliveryError, MessageHandle, MessageUpdate, Notifier,
};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    api: BotApi,
}

impl TelegramNotifier {
    pub fn new(api: BotApi) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &BotApi {
        &self.api
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(
        &self,
        channel: ChannelId,
        text: &str,
        affordance: ClaimAffordance,
    ) -> Result<MessageHandle, DeliveryError> {
        let keyboard = match affordance {
            ClaimAffordance::Offer(lead_id) => Some(take_keyboard(lead_id)),
            ClaimAffordance::None => None,
        };
        let message = self
            .api
            .send_message(channel.0, text, keyboard.as_ref())
            .await
            .map_err(delivery_error)?;
        Ok(MessageHandle(message.message_id))
    }

    async fn update(
        &self,
        channel: ChannelId,
        handle: MessageHandle,
        update: MessageUpdate,
    ) -> Result<(), DeliveryError> {
        let outcome = match &update {
            MessageUpdate::DisableClaim => {
                self.api
                    .edit_message_reply_markup(channel.0, handle.0, None)
                    .await
            }
            MessageUpdate::ReplaceText(text) => {
                self.api
                    .edit_message_text(channel.0, handle.0, text)
                    .await
            }
        };
        match outcome {
            Err(err) if err.is_not_modified() => {
                debug!(channel = %channel, handle = %handle, "message already up to date");
                Ok(())
            }
            other => other.map_err(delivery_error),
        }
    }
}

fn delivery_error(err: ApiError) -> DeliveryError {
    match err {
        ApiError::Rejected {
            code, description, ..
        } => DeliveryError::Rejected { code, description },
        ApiError::EmptyResult { .. } => DeliveryError::MissingHandle,
        other => DeliveryError::Transport(other.to_string()),
    }
}
