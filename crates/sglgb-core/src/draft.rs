//! # Indicator Drafts
//!
//! A draft is one MLGOO's work-in-progress indicator tree for a governance
//! area. Only the lock holder may save; saves carry the version they were
//! based on so concurrent edits surface as `VersionConflict` instead of
//! silently overwriting each other.
//!
//! Locks expire. An expired lock is treated as free, which covers the
//! "browser closed without releasing" case.

use crate::tree::{IndicatorTree, NodeStatus};
use crate::{DraftId, GovernanceAreaId, PortalError, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    InProgress,
    ReadyForReview,
    Completed,
}

impl DraftStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::InProgress => "in_progress",
            DraftStatus::ReadyForReview => "ready_for_review",
            DraftStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftLock {
    pub holder: UserId,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DraftLock {
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorDraft {
    pub id: DraftId,
    pub governance_area_id: GovernanceAreaId,
    pub title: String,
    pub owner: UserId,
    /// Wizard step the author last saved on.
    pub current_step: u8,
    pub status: DraftStatus,
    pub tree: IndicatorTree,
    /// Incremented by every successful save.
    pub version: u64,
    pub lock: Option<DraftLock>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IndicatorDraft {
    #[must_use]
    pub fn new(
        id: DraftId,
        governance_area_id: GovernanceAreaId,
        title: impl Into<String>,
        owner: UserId,
        tree: IndicatorTree,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            governance_area_id,
            title: title.into(),
            owner,
            current_step: 0,
            status: DraftStatus::InProgress,
            tree,
            version: 1,
            lock: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The lock, if one is held and unexpired at `now`.
    #[must_use]
    pub fn active_lock(&self, now: DateTime<Utc>) -> Option<&DraftLock> {
        self.lock.as_ref().filter(|l| l.is_active(now))
    }

    // =========================================================================
    // LOCKING
    // =========================================================================

    /// Take or refresh the edit lock.
    ///
    /// Granted when the draft is unlocked, the previous lock expired, or
    /// `user` already holds it. A refresh keeps the original `acquired_at`.
    pub fn acquire_lock(
        &mut self,
        user: UserId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<DraftLock, PortalError> {
        if self.status == DraftStatus::Completed {
            return Err(PortalError::InvalidTransition {
                from: self.status.as_str().to_string(),
                action: "lock".to_string(),
            });
        }
        let acquired_at = match self.active_lock(now) {
            Some(lock) if lock.holder != user => {
                return Err(PortalError::DraftLocked {
                    holder: lock.holder,
                });
            }
            Some(lock) => lock.acquired_at,
            None => now,
        };
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| PortalError::InvalidSchema("lock ttl out of range".to_string()))?;
        let lock = DraftLock {
            holder: user,
            acquired_at,
            expires_at,
        };
        self.lock = Some(lock);
        Ok(lock)
    }

    /// Drop the lock. Returns whether an active lock was released.
    ///
    /// Releasing an unlocked (or expired) draft is a no-op. Someone else's
    /// active lock can only be released with `force`.
    pub fn release_lock(
        &mut self,
        user: UserId,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, PortalError> {
        match self.active_lock(now) {
            None => {
                self.lock = None;
                Ok(false)
            }
            Some(lock) if lock.holder == user || force => {
                self.lock = None;
                Ok(true)
            }
            Some(_) => Err(PortalError::LockNotHeld),
        }
    }

    /// Fail unless `user` holds an unexpired lock.
    pub fn require_lock(&self, user: UserId, now: DateTime<Utc>) -> Result<(), PortalError> {
        match self.active_lock(now) {
            Some(lock) if lock.holder == user => Ok(()),
            Some(lock) => Err(PortalError::DraftLocked {
                holder: lock.holder,
            }),
            None => Err(PortalError::LockNotHeld),
        }
    }

    // =========================================================================
    // EDITING
    // =========================================================================

    /// Replace the tree. Requires the caller's active lock and the version the
    /// edit was based on. Returns the new version.
    ///
    /// Codes are reassigned from node positions under the draft's area, so
    /// whatever codes the client sent are discarded.
    pub fn save(
        &mut self,
        user: UserId,
        expected_version: u64,
        mut tree: IndicatorTree,
        current_step: Option<u8>,
        now: DateTime<Utc>,
    ) -> Result<u64, PortalError> {
        if self.status == DraftStatus::Completed {
            return Err(PortalError::InvalidTransition {
                from: self.status.as_str().to_string(),
                action: "save".to_string(),
            });
        }
        self.require_lock(user, now)?;
        if expected_version != self.version {
            return Err(PortalError::VersionConflict {
                expected: expected_version,
                actual: self.version,
            });
        }
        tree.check_integrity()?;
        tree.code_prefix = self.governance_area_id.to_string();
        tree.recalculate_codes();

        self.tree = tree;
        if let Some(step) = current_step {
            self.current_step = step;
        }
        // Edits invalidate a previous readiness check.
        self.status = DraftStatus::InProgress;
        self.version += 1;
        self.updated_at = now;
        Ok(self.version)
    }

    /// Codes (or keys, for uncoded nodes) of nodes that are not `Complete`.
    #[must_use]
    pub fn incomplete_nodes(&self) -> Vec<String> {
        let statuses = self.tree.statuses();
        self.tree
            .preorder()
            .into_iter()
            .filter(|k| statuses.get(k) != Some(&NodeStatus::Complete))
            .filter_map(|k| self.tree.get(&k))
            .map(|n| {
                if n.code.is_empty() {
                    n.key.to_string()
                } else {
                    n.code.clone()
                }
            })
            .collect()
    }

    /// Flag the draft for publishing. Every node must be `Complete`.
    pub fn mark_ready(&mut self, user: UserId, now: DateTime<Utc>) -> Result<(), PortalError> {
        if self.status != DraftStatus::InProgress {
            return Err(PortalError::InvalidTransition {
                from: self.status.as_str().to_string(),
                action: "mark ready".to_string(),
            });
        }
        self.require_lock(user, now)?;
        if self.tree.is_empty() {
            return Err(PortalError::Incomplete(vec!["tree has no nodes".to_string()]));
        }
        let incomplete = self.incomplete_nodes();
        if !incomplete.is_empty() {
            return Err(PortalError::Incomplete(incomplete));
        }
        self.status = DraftStatus::ReadyForReview;
        self.updated_at = now;
        Ok(())
    }

    /// Close the draft after publishing. Requires the caller's active lock,
    /// which is dropped.
    pub fn mark_completed(&mut self, user: UserId, now: DateTime<Utc>) -> Result<(), PortalError> {
        if self.status != DraftStatus::ReadyForReview {
            return Err(PortalError::InvalidTransition {
                from: self.status.as_str().to_string(),
                action: "publish".to_string(),
            });
        }
        self.require_lock(user, now)?;
        self.status = DraftStatus::Completed;
        self.lock = None;
        self.updated_at = now;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
