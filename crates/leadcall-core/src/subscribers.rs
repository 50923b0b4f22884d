//! Channels eligible for lead fanout, gated by one shared secret.

use crate::lead::ChannelId;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter};

/// The registration secret, kept only as a SHA-256 digest.
#[derive(Clone)]
pub struct SharedSecret {
    digest: [u8; 32],
}

impl SharedSecret {
    pub fn new(secret: &str) -> Self {
        Self {
            digest: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    /// Compare without short-circuiting on the first differing byte.
    pub fn verify(&self, candidate: &str) -> bool {
        let candidate: [u8; 32] = Sha256::digest(candidate.as_bytes()).into();
        self.digest
            .iter()
            .zip(candidate.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Debug for SharedSecret {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered,
    AlreadyRegistered,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid registration secret")]
    InvalidSecret,
}

#[derive(Debug)]
pub struct SubscriberRegistry {
    secret: SharedSecret,
    channels: RwLock<BTreeSet<ChannelId>>,
}

impl SubscriberRegistry {
    pub fn new(secret: SharedSecret) -> Self {
        Self {
            secret,
            channels: RwLock::new(BTreeSet::new()),
        }
    }

    /// Registry pre-populated with `channels`.
    pub fn with_channels(
        secret: SharedSecret,
        channels: impl IntoIterator<Item = ChannelId>,
    ) -> Self {
        Self {
            secret,
            channels: RwLock::new(channels.into_iter().collect()),
        }
    }

    /// Add `channel` if `candidate` matches the shared secret.
    ///
    /// The secret is checked first, so a wrong secret never reveals whether
    /// the channel is already registered.
    pub fn authorize(
        &self,
        channel: ChannelId,
        candidate: &str,
    ) -> Result<Registration, RegistryError> {
        if !self.secret.verify(candidate) {
            return Err(RegistryError::InvalidSecret);
        }
        if self.channels.write().insert(channel) {
            Ok(Registration::Registered)
        } else {
            Ok(Registration::AlreadyRegistered)
        }
    }

    /// Members at this instant, in channel order.
    pub fn snapshot(&self) -> Vec<ChannelId> {
        self.channels.read().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }
}
