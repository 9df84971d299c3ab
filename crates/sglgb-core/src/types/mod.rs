//! # Core Type Definitions
//!
//! This module contains the shared types of the SGLGB assessment engine:
//! - Entity identifiers (`IndicatorId`, `AssessmentId`, `DraftId`, ...)
//! - Actors and roles (`Actor`, `Role`)
//! - Review verdicts (`ValidationStatus`)
//! - Error types (`PortalError`)
//!
//! ## Determinism Guarantees
//!
//! All identifiers implement `Ord` so they can key `BTreeMap`/`BTreeSet`
//! and every listing produced by the engine has a stable order.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::form_schema::FieldError;

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a published indicator.
    IndicatorId
);
numeric_id!(
    /// Identifier of a BLGU assessment.
    AssessmentId
);
numeric_id!(
    /// Identifier of an indicator draft in the builder.
    DraftId
);
numeric_id!(
    /// Identifier of an uploaded MOV (means of verification) record.
    MovId
);
numeric_id!(
    /// Identifier of a portal user. Issued by the external identity provider.
    UserId
);
numeric_id!(
    /// Identifier of a governance area (1-based, doubles as code prefix).
    GovernanceAreaId
);

/// Key of a node inside the tree builder.
///
/// New nodes get a UUID v4 string; nodes loaded from published indicators
/// keep whatever key the caller assigned.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(pub String);

impl NodeKey {
    /// Create a key from any string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Generate a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// ACTORS
// =============================================================================

/// Portal roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Barangay submitter; owns assessments.
    BlguUser,
    /// Reviews submissions and may request rework.
    Assessor,
    /// Issues the final per-indicator verdict.
    Validator,
    /// Administrator; authors indicators.
    MlgooDilg,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::BlguUser => "blgu_user",
            Role::Assessor => "assessor",
            Role::Validator => "validator",
            Role::MlgooDilg => "mlgoo_dilg",
        }
    }

    /// Parse the wire form produced by [`Role::as_str`].
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blgu_user" => Some(Role::BlguUser),
            "assessor" => Some(Role::Assessor),
            "validator" => Some(Role::Validator),
            "mlgoo_dilg" => Some(Role::MlgooDilg),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller of a mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    #[must_use]
    pub const fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Fail with `Forbidden` unless the actor has one of `roles`.
    pub fn require(&self, roles: &[Role], action: &str) -> Result<(), PortalError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(PortalError::Forbidden(format!(
                "role {} may not {}",
                self.role, action
            )))
        }
    }
}

// =============================================================================
// VERDICTS
// =============================================================================

/// Verdict attached to an indicator response by calculation, assessor or validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pass,
    Fail,
    /// Passed with conditions (e.g. within a grace period).
    Conditional,
}

impl ValidationStatus {
    /// Pass and Conditional both count toward an area passing.
    #[must_use]
    pub fn is_passing(self) -> bool {
        !matches!(self, ValidationStatus::Fail)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the portal engine.
///
/// - No silent failures
/// - Use `Result<T, PortalError>` for fallible operations
/// - The engine should never panic; all errors must be recoverable
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("Indicator not found: {0}")]
    IndicatorNotFound(IndicatorId),

    #[error("Assessment not found: {0}")]
    AssessmentNotFound(AssessmentId),

    #[error("Draft not found: {0}")]
    DraftNotFound(DraftId),

    #[error("Governance area not found: {0}")]
    AreaNotFound(GovernanceAreaId),

    #[error("MOV not found: {0}")]
    MovNotFound(MovId),

    /// A tree builder node key does not exist.
    #[error("Tree node not found: {0}")]
    NodeNotFound(NodeKey),

    /// A form or calculation schema is malformed.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Submitted values do not satisfy the form schema.
    #[error("Invalid response: {} field error(s)", .0.len())]
    InvalidResponse(Vec<FieldError>),

    /// The draft is checked out by another user.
    #[error("Draft is locked by user {holder}")]
    DraftLocked { holder: UserId },

    /// The caller does not hold the draft lock.
    #[error("Draft lock not held by caller")]
    LockNotHeld,

    /// Optimistic concurrency check failed.
    #[error("Version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    /// A workflow action is not allowed from the current status.
    #[error("Cannot {action} while {from}")]
    InvalidTransition { from: String, action: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The single rework cycle has already been used.
    #[error("Rework limit reached")]
    ReworkLimitReached,

    /// Required work is missing; carries indicator codes or field ids.
    #[error("Incomplete: {}", .0.join(", "))]
    Incomplete(Vec<String>),

    /// A tree move would place a node under its own descendant.
    #[error("Moving {0} would create a cycle")]
    CycleDetected(NodeKey),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
