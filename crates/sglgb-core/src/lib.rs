//! # sglgb-core
//!
//! The deterministic assessment engine for the SGLGB portal.
//!
//! This crate holds everything that decides an outcome:
//! - `tree` / `draft`: the hierarchical indicator builder with locking and
//!   optimistic versioning
//! - `form_schema` / `calculation`: dynamic forms and the rule engine that
//!   turns answers into Pass / Fail / Conditional
//! - `assessment` / `scoring`: the BLGU submission workflow and the
//!   "3+1" area rollup
//! - `portal` / `storage`: the service facade over memory or redb storage
//!
//! ## Architectural Constraints
//!
//! - No async, no network dependencies
//! - `BTreeMap` everywhere a listing order is observable
//! - Time is passed in by the caller, never read from the clock
//! - Integer arithmetic for scores and percentages

// =============================================================================
// MODULES
// =============================================================================

pub mod assessment;
pub mod calculation;
pub mod draft;
pub mod form_schema;
pub mod formats;
pub mod indicator;
pub mod mov;
pub mod portal;
pub mod primitives;
pub mod scoring;
pub mod storage;
pub mod tree;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Actor, AssessmentId, DraftId, GovernanceAreaId, IndicatorId, MovId, NodeKey, PortalError,
    Role, UserId, ValidationStatus,
};

// =============================================================================
// RE-EXPORTS: Builder and Rules
// =============================================================================

pub use calculation::{CalculationRule, CalculationSchema, ComparisonOperator, Evaluation};
pub use draft::{DraftLock, DraftStatus, IndicatorDraft};
pub use form_schema::{FieldError, FormField, FormSchema, ResponseData};
pub use indicator::{AreaType, GovernanceArea, Indicator, IndicatorRevision};
pub use tree::{IndicatorTree, NodeStatus, NodeUpdate, TreeNode, TreeViewState};

// =============================================================================
// RE-EXPORTS: Workflow and Service
// =============================================================================

pub use assessment::{Assessment, AssessmentStatus, FinalVerdict};
pub use mov::{MovFile, NewMov};
pub use portal::{
    AssessmentReport, Portal, PortalSettings, PortalStats, PublishReport, StorageBackend,
};
pub use scoring::{AreaResult, AssessmentResult};
pub use storage::{MemoryStore, PortalStore, RedbStore};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{
    BundleHeader, IndicatorBundle, MAX_BUNDLE_SIZE, bundle_from_bytes, bundle_to_bytes,
};
