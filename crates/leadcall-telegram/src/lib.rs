//! Telegram Bot API adapter for leadcall.
//!
//! - `api`: the HTTP client for the handful of Bot API methods used
//! - `notifier`: `Notifier` implementation (offers carry a "take" button)
//! - `router`: maps inbound updates to service calls and replies
//! - `poller`: the `getUpdates` loop that drives the router

pub mod api;
pub mod notifier;
pub mod poller;
pub mod router;
pub mod types;

pub use api::{ApiError, BotApi, DEFAULT_API_BASE, UpdateBatch};
pub use notifier::TelegramNotifier;
pub use poller::{Poller, PollerConfig, deliver};
pub use router::{InboundEvent, Outbound, UpdateRouter, classify, parse_take, take_keyboard};
pub use types::{
    CallbackQuery, Chat, InlineKeyboardButton, InlineKeyboardMarkup, Message, Update, User,
};
