//! Handoff registry
//!
//! Reports waiting for a reviewer decision, keyed by a token minted at
//! submission. The originator's session is already gone by then; the token in
//! the review request's buttons is the only link between the decision and the
//! originator.
//!
//! Memory resident. Entries leave the table exactly once: through a
//! decision, a withdrawal after a failed delivery, or expiry.

use crate::identity::Identity;
use crate::state_machine::TargetId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

/// Opaque key correlating a review request with its decision
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandoffToken(String);

impl HandoffToken {
    fn mint() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    #[allow(dead_code)] // Used in tests
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandoffToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A submitted report awaiting review
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingHandoff {
    pub target_id: TargetId,
    pub originator: Identity,
    pub submitted_at: DateTime<Utc>,
}

/// Reviewer decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    Declined,
}

/// A decision that consumed its entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub entry: PendingHandoff,
    pub outcome: Outcome,
    pub reviewer: Identity,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandoffError {
    /// Already decided, withdrawn, or never issued
    #[error("report is no longer pending")]
    Stale,
    /// Outlived the TTL before anyone decided; the entry is removed and
    /// handed back so its originator can still be told.
    #[error("report expired before a decision")]
    Expired(PendingHandoff),
}

/// Process-wide table of pending handoffs
pub struct HandoffRegistry {
    ttl: chrono::Duration,
    entries: Mutex<HashMap<HandoffToken, PendingHandoff>>,
}

impl HandoffRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn submit(&self, target_id: TargetId, originator: Identity) -> HandoffToken {
        self.submit_at(target_id, originator, Utc::now())
    }

    pub fn submit_at(
        &self,
        target_id: TargetId,
        originator: Identity,
        now: DateTime<Utc>,
    ) -> HandoffToken {
        let mut entries = self.lock();
        let mut token = HandoffToken::mint();
        while entries.contains_key(&token) {
            token = HandoffToken::mint();
        }
        tracing::info!(token = %token, target_id = %target_id, originator = %originator, "Report submitted for review");
        entries.insert(
            token.clone(),
            PendingHandoff {
                target_id,
                originator,
                submitted_at: now,
            },
        );
        token
    }

    pub fn resolve(
        &self,
        token: &str,
        outcome: Outcome,
        reviewer: Identity,
    ) -> Result<Resolution, HandoffError> {
        self.resolve_at(token, outcome, reviewer, Utc::now())
    }

    /// Remove and return the entry for `token`.
    ///
    /// Remove-and-return under one lock is the single serialization point: of
    /// any number of racing decisions on one token, exactly one succeeds. An
    /// expired entry is removed and returned in [`HandoffError::Expired`].
    pub fn resolve_at(
        &self,
        token: &str,
        outcome: Outcome,
        reviewer: Identity,
        now: DateTime<Utc>,
    ) -> Result<Resolution, HandoffError> {
        let entry = self
            .lock()
            .remove(&HandoffToken(token.to_string()))
            .ok_or(HandoffError::Stale)?;

        if self.is_expired(&entry, now) {
            tracing::info!(token = %token, target_id = %entry.target_id, "Decision on expired report");
            return Err(HandoffError::Expired(entry));
        }

        tracing::info!(token = %token, ?outcome, reviewer = %reviewer, target_id = %entry.target_id, "Report resolved");
        Ok(Resolution {
            entry,
            outcome,
            reviewer,
        })
    }

    /// Take back an entry whose review request never reached the reviewers
    pub fn withdraw(&self, token: &HandoffToken) -> Option<PendingHandoff> {
        self.lock().remove(token)
    }

    /// Evict entries older than the TTL
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<(HandoffToken, PendingHandoff)> {
        let mut entries = self.lock();
        let expired: Vec<HandoffToken> = entries
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now))
            .map(|(token, _)| token.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|token| entries.remove(&token).map(|entry| (token, entry)))
            .collect()
    }

    #[allow(dead_code)] // Used in tests
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn is_expired(&self, entry: &PendingHandoff, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.submitted_at) >= self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<HandoffToken, PendingHandoff>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
