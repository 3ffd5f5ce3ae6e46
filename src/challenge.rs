//! Citizenship Challenge Store
//!
//! Ephemeral, in-memory table of outstanding citizenship challenges.
//!
//! - Keyed by challenge UUID
//! - At most one live challenge per npub
//! - Expired entries are pruned lazily at the start of every workflow call;
//!   there is no background sweeper
//! - Nothing survives a restart; applicants simply request a new challenge

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Random bytes per nonce (hex-encoded to 64 characters)
pub const NONCE_BYTES: usize = 32;

/// An outstanding proof-of-key request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: Uuid,
    pub npub: String,
    pub display_name: String,
    pub nonce: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Challenge {
    /// Mint a fresh challenge with a random nonce
    pub fn issue(npub: &str, display_name: &str, ttl: Duration) -> Self {
        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        Self {
            challenge_id: Uuid::new_v4(),
            npub: npub.to_string(),
            display_name: display_name.to_string(),
            nonce: generate_nonce(),
            created_at,
            expires_at: created_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whole seconds left before expiry
    pub fn expires_in_seconds(&self, now: DateTime<Utc>) -> u64 {
        (self.expires_at - now).num_seconds().max(0) as u64
    }
}

pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Thread-safe table of pending challenges
#[derive(Debug, Default)]
pub struct ChallengeStore {
    challenges: Mutex<HashMap<Uuid, Challenge>>,
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every challenge that expired before `now`. Returns the count.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut challenges = self.challenges.lock();
        let before = challenges.len();
        challenges.retain(|_, c| !c.is_expired_at(now));
        before - challenges.len()
    }

    pub fn insert(&self, challenge: Challenge) {
        self.challenges
            .lock()
            .insert(challenge.challenge_id, challenge);
    }

    /// Insert unless a challenge for the same npub is already held.
    ///
    /// The check and the insert share one lock acquisition. Returns the
    /// existing challenge on conflict.
    pub fn issue_if_absent(&self, challenge: Challenge) -> Result<(), Challenge> {
        let mut challenges = self.challenges.lock();
        if let Some(existing) = challenges.values().find(|c| c.npub == challenge.npub) {
            return Err(existing.clone());
        }
        challenges.insert(challenge.challenge_id, challenge);
        Ok(())
    }

    pub fn get(&self, challenge_id: &Uuid) -> Option<Challenge> {
        self.challenges.lock().get(challenge_id).cloned()
    }

    pub fn find_for_npub(&self, npub: &str) -> Vec<Challenge> {
        self.challenges
            .lock()
            .values()
            .filter(|c| c.npub == npub)
            .cloned()
            .collect()
    }

    pub fn remove(&self, challenge_id: &Uuid) -> Option<Challenge> {
        self.challenges.lock().remove(challenge_id)
    }

    pub fn len(&self) -> usize {
        self.challenges.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move a challenge's expiry into the past
    #[cfg(test)]
    pub(crate) fn force_expire(&self, challenge_id: &Uuid) {
        if let Some(c) = self.challenges.lock().get_mut(challenge_id) {
            c.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }
}
