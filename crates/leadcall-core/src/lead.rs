//! Lead type: the record every channel is notified about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Sequential lead identifier. Allocated once, never reused.
pub type LeadId = u64;

/// A channel that receives lead notifications (a chat, in the Telegram adapter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

/// The identity of someone who can claim a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimantId(pub i64);

/// Transport reference to one rendered notification, used to edit it in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHandle(pub i64);

impl Display for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for ClaimantId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for MessageHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where each channel's copy of a lead notification lives.
///
/// One entry per channel that accepted the fanout. Entries are added once and
/// never replaced or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHandleSet {
    handles: BTreeMap<ChannelId, MessageHandle>,
}

impl MessageHandleSet {
    /// Record the handle for `channel`.
    ///
    /// Returns `false` (and keeps the existing entry) if the channel already
    /// has one.
    pub fn insert(&mut self, channel: ChannelId, handle: MessageHandle) -> bool {
        if self.handles.contains_key(&channel) {
            return false;
        }
        self.handles.insert(channel, handle);
        true
    }

    pub fn get(&self, channel: ChannelId) -> Option<MessageHandle> {
        self.handles.get(&channel).copied()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Iterate entries in channel order.
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, MessageHandle)> + '_ {
        self.handles.iter().map(|(channel, handle)| (*channel, *handle))
    }

    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.handles.keys().copied()
    }
}

/// Lifecycle position of a lead, derived from its optional fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Open,
    Claimed,
    Resolved,
}

impl LeadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Claimed => "claimed",
            Self::Resolved => "resolved",
        }
    }
}

/// A submitted contact awaiting a call back.
///
/// `taken_by` is set at most once and never cleared. `result` is only ever
/// set on a claimed lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub name: String,
    pub phone: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_by: Option<ClaimantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taker_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "MessageHandleSet::is_empty")]
    pub handles: MessageHandleSet,
}

impl Lead {
    /// Create an unclaimed lead with no handles.
    pub fn new(id: LeadId, name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            phone: phone.into(),
            taken_by: None,
            taker_display_name: None,
            result: None,
            created_at: Utc::now(),
            taken_at: None,
            resolved_at: None,
            handles: MessageHandleSet::default(),
        }
    }

    pub fn status(&self) -> LeadStatus {
        match (&self.taken_by, &self.result) {
            (None, _) => LeadStatus::Open,
            (Some(_), None) => LeadStatus::Claimed,
            (Some(_), Some(_)) => LeadStatus::Resolved,
        }
    }

    pub fn is_taken(&self) -> bool {
        self.taken_by.is_some()
    }

    /// Mark the lead as taken. Caller must hold the lead's lock and have
    /// checked `is_taken()` under that same lock.
    pub(crate) fn mark_taken(
        &mut self,
        claimant: ClaimantId,
        display_name: String,
        now: DateTime<Utc>,
    ) {
        debug_assert!(self.taken_by.is_none());
        self.taken_by = Some(claimant);
        self.taker_display_name = Some(display_name);
        self.taken_at = Some(now);
    }

    pub(crate) fn mark_resolved(&mut self, result: String, now: DateTime<Utc>) {
        debug_assert!(self.taken_by.is_some() && self.result.is_none());
        self.result = Some(result);
        self.resolved_at = Some(now);
    }
}
