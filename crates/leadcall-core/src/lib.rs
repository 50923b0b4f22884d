//! # leadcall-core
//!
//! Lead state and the rules for claiming leads.
//!
//! This crate provides:
//! - `Lead` and `MessageHandleSet` (the records and where their copies live)
//! - `LeadStore` (lock-guarded in-memory state, one mutex per lead)
//! - `SubscriberRegistry` (channels that receive fanout)
//! - `Dispatcher`, `ClaimArbiter`, `ResultConversation` (the three event handlers)
//! - the `Notifier` trait every transport implements
//!
//! It intentionally does no I/O of its own. Transports live in adapter
//! crates (`leadcall-telegram`, `leadcall-http`).
//!
//! ## Event flow
//!
//! ```text
//! submit ──▶ Dispatcher ──send──▶ every channel
//!                │
//! claim  ──▶ ClaimArbiter ──disable claim──▶ every copy
//!                │
//! text   ──▶ ResultConversation ──final text──▶ every copy
//! ```

pub mod claim;
pub mod conversation;
pub mod dispatch;
pub mod lead;
pub mod notifier;
pub mod render;
pub mod service;
pub mod store;
pub mod subscribers;
pub mod testing;

pub use claim::{ClaimArbiter, ClaimError};
pub use conversation::{
    ClaimSession, ConversationError, ConversationEvent, ConversationState, ResultConversation,
};
pub use dispatch::{Dispatched, Dispatcher};
pub use lead::{ChannelId, ClaimantId, Lead, LeadId, LeadStatus, MessageHandle, MessageHandleSet};
pub use notifier::{ClaimAffordance, DeliveryError, DeliveryReport, MessageUpdate, Notifier};
pub use render::{offer_text, resolved_text};
pub use service::LeadService;
pub use store::{ClaimGrant, LeadStore, Resolution};
pub use subscribers::{Registration, RegistryError, SharedSecret, SubscriberRegistry};
