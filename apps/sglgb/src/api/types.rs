//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API and the
//! mapping from [`PortalError`] to HTTP status codes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use sglgb_core::tree::CompletionSummary;
use sglgb_core::{
    CalculationSchema, FieldError, FinalVerdict, FormSchema, GovernanceAreaId, IndicatorId,
    IndicatorTree, PortalError, PortalStats, ResponseData, ValidationStatus,
};
use std::collections::BTreeMap;

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Record counts and storage mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub persistent: bool,
    #[serde(flatten)]
    pub stats: PortalStats,
}

// =============================================================================
// QUERY PARAMETERS
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AreaQuery {
    pub area: Option<GovernanceAreaId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnlockQuery {
    #[serde(default)]
    pub force: bool,
}

// =============================================================================
// SCHEMAS
// =============================================================================

/// Lint a form schema and, optionally, a calculation schema against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateSchemaRequest {
    pub form_schema: FormSchema,
    #[serde(default)]
    pub calculation_schema: Option<CalculationSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateSchemaResponse {
    pub valid: bool,
    pub issues: Vec<String>,
}

impl ValidateSchemaResponse {
    #[must_use]
    pub fn from_issues(issues: Vec<String>) -> Self {
        Self {
            valid: issues.is_empty(),
            issues,
        }
    }
}

/// Dry-run a calculation schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    pub calculation_schema: CalculationSchema,
    /// When present, values are validated and the rules linted against it first.
    #[serde(default)]
    pub form_schema: Option<FormSchema>,
    #[serde(default)]
    pub values: ResponseData,
}

/// Published tree of one area with its completion summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeResponse {
    pub tree: IndicatorTree,
    pub summary: CompletionSummary,
}

// =============================================================================
// DRAFTS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDraftRequest {
    pub governance_area_id: GovernanceAreaId,
    pub title: String,
    /// Seed the tree from the area's published indicators.
    #[serde(default)]
    pub from_published: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveDraftRequest {
    pub expected_version: u64,
    pub tree: IndicatorTree,
    #[serde(default)]
    pub current_step: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveDraftResponse {
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockResponse {
    pub released: bool,
}

// =============================================================================
// ASSESSMENTS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAssessmentRequest {
    pub barangay: String,
    pub assessment_year: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveResponseRequest {
    pub values: ResponseData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessResponseRequest {
    pub status: ValidationStatus,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub needs_rework: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    #[serde(default)]
    pub indicator_id: Option<IndicatorId>,
    pub comment: String,
    #[serde(default)]
    pub is_internal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReworkRequest {
    pub comments: String,
}

/// One validator override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictOverride {
    pub indicator_id: IndicatorId,
    pub status: ValidationStatus,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinalizeRequest {
    #[serde(default)]
    pub overrides: Vec<VerdictOverride>,
}

impl FinalizeRequest {
    /// Overrides keyed by indicator. A later entry for the same indicator wins.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<IndicatorId, FinalVerdict> {
        self.overrides
            .iter()
            .map(|o| {
                (
                    o.indicator_id,
                    FinalVerdict {
                        status: o.status,
                        remarks: o.remarks.clone(),
                    },
                )
            })
            .collect()
    }
}

// =============================================================================
// EXPORT
// =============================================================================

/// Indicator bundle export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    pub areas: usize,
    pub indicators: usize,
    /// FNV-1a checksum of the bundle body, hex.
    pub checksum: String,
    /// BLAKE3 hash of the bundle body, hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blake3: Option<String>,
    /// Bundle bytes, base64 encoded.
    pub data: String,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_errors: Vec<FieldError>,
    /// Indicator codes or node codes still missing work.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
}

/// Failure of an API call.
#[derive(Debug)]
pub enum ApiError {
    Portal(PortalError),
    /// Missing or malformed identity headers.
    Unauthenticated(String),
    BadRequest(String),
}

impl From<PortalError> for ApiError {
    fn from(e: PortalError) -> Self {
        ApiError::Portal(e)
    }
}

impl ApiError {
    /// Status code and machine-readable code.
    #[must_use]
    pub fn status(&self) -> (StatusCode, &'static str) {
        let e = match self {
            ApiError::Unauthenticated(_) => return (StatusCode::UNAUTHORIZED, "unauthenticated"),
            ApiError::BadRequest(_) => return (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Portal(e) => e,
        };
        match e {
            PortalError::IndicatorNotFound(_)
            | PortalError::AssessmentNotFound(_)
            | PortalError::DraftNotFound(_)
            | PortalError::AreaNotFound(_)
            | PortalError::MovNotFound(_)
            | PortalError::NodeNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            PortalError::InvalidSchema(_) => (StatusCode::BAD_REQUEST, "invalid_schema"),
            PortalError::CycleDetected(_) => (StatusCode::BAD_REQUEST, "cycle_detected"),
            PortalError::SerializationError(_) => (StatusCode::BAD_REQUEST, "invalid_payload"),
            PortalError::InvalidResponse(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_response")
            }
            PortalError::Incomplete(_) => (StatusCode::UNPROCESSABLE_ENTITY, "incomplete"),
            PortalError::DraftLocked { .. } => (StatusCode::LOCKED, "draft_locked"),
            PortalError::LockNotHeld => (StatusCode::CONFLICT, "lock_not_held"),
            PortalError::VersionConflict { .. } => (StatusCode::CONFLICT, "version_conflict"),
            PortalError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            PortalError::ReworkLimitReached => (StatusCode::CONFLICT, "rework_limit_reached"),
            PortalError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            PortalError::IoError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
        }
    }

    #[must_use]
    pub fn to_body(&self) -> ErrorResponse {
        let (_, code) = self.status();
        let (error, field_errors, missing) = match self {
            ApiError::Unauthenticated(msg) | ApiError::BadRequest(msg) => {
                (msg.clone(), Vec::new(), Vec::new())
            }
            ApiError::Portal(e) => {
                let field_errors = match e {
                    PortalError::InvalidResponse(errors) => errors.clone(),
                    _ => Vec::new(),
                };
                let missing = match e {
                    PortalError::Incomplete(codes) => codes.clone(),
                    _ => Vec::new(),
                };
                (e.to_string(), field_errors, missing)
            }
        };
        ErrorResponse {
            error,
            code: code.to_string(),
            field_errors,
            missing,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        if status.is_server_error() {
            tracing::error!(code, error = ?self, "Request failed");
        } else {
            tracing::debug!(code, error = ?self, "Request rejected");
        }
        (status, Json(self.to_body())).into_response()
    }
}
