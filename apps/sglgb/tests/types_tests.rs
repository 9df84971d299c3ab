//! Unit tests for API types serialization and error mapping.

#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::StatusCode;
use sglgb::api::{
    ApiError, AssessResponseRequest, CreateDraftRequest, ErrorResponse, FeedbackRequest,
    FinalizeRequest, HealthResponse, ValidateSchemaResponse,
};
use sglgb_core::form_schema::FieldErrorCode;
use sglgb_core::{
    DraftId, FieldError, GovernanceAreaId, IndicatorId, PortalError, UserId, ValidationStatus,
};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

#[test]
fn test_health_response_default() {
    let health = HealthResponse::default();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

#[test]
fn test_health_response_serialization() {
    let health = HealthResponse {
        status: "ok".to_string(),
        version: "0.3.0".to_string(),
    };

    let json = serde_json::to_string(&health).unwrap();
    assert!(json.contains("\"status\":\"ok\""));
    assert!(json.contains("\"version\":\"0.3.0\""));
}

// =============================================================================
// REQUESTS
// =============================================================================

#[test]
fn test_create_draft_defaults_to_empty_tree() {
    let req: CreateDraftRequest =
        serde_json::from_str(r#"{"governance_area_id":3,"title":"Safety"}"#).unwrap();
    assert_eq!(req.governance_area_id, GovernanceAreaId(3));
    assert!(!req.from_published);
}

#[test]
fn test_assess_request_optional_fields() {
    let req: AssessResponseRequest = serde_json::from_str(r#"{"status":"conditional"}"#).unwrap();
    assert_eq!(req.status, ValidationStatus::Conditional);
    assert!(req.remarks.is_none());
    assert!(!req.needs_rework);

    assert!(serde_json::from_str::<AssessResponseRequest>(r#"{"status":"maybe"}"#).is_err());
}

#[test]
fn test_feedback_request_defaults_to_public() {
    let req: FeedbackRequest = serde_json::from_str(r#"{"comment":"Attach the signed copy"}"#).unwrap();
    assert!(req.indicator_id.is_none());
    assert!(!req.is_internal);
}

#[test]
fn test_finalize_overrides_last_entry_wins() {
    let req: FinalizeRequest = serde_json::from_str(
        r#"{"overrides":[
            {"indicator_id":7,"status":"fail"},
            {"indicator_id":8,"status":"pass","remarks":"ok"},
            {"indicator_id":7,"status":"conditional"}
        ]}"#,
    )
    .unwrap();

    let map = req.to_map();
    assert_eq!(map.len(), 2);
    assert_eq!(map[&IndicatorId(7)].status, ValidationStatus::Conditional);
    assert_eq!(map[&IndicatorId(8)].remarks.as_deref(), Some("ok"));
}

#[test]
fn test_finalize_request_may_be_empty() {
    let req: FinalizeRequest = serde_json::from_str("{}").unwrap();
    assert!(req.to_map().is_empty());
}

#[test]
fn test_validate_schema_response_from_issues() {
    assert!(ValidateSchemaResponse::from_issues(Vec::new()).valid);
    let bad = ValidateSchemaResponse::from_issues(vec!["duplicate field id".into()]);
    assert!(!bad.valid);
    assert_eq!(bad.issues.len(), 1);
}

// =============================================================================
// ERROR MAPPING
// =============================================================================

#[test]
fn test_error_status_codes() {
    let cases = [
        (PortalError::DraftNotFound(DraftId(1)), StatusCode::NOT_FOUND),
        (
            PortalError::DraftLocked { holder: UserId(2) },
            StatusCode::LOCKED,
        ),
        (PortalError::LockNotHeld, StatusCode::CONFLICT),
        (
            PortalError::VersionConflict {
                expected: 1,
                actual: 2,
            },
            StatusCode::CONFLICT,
        ),
        (PortalError::ReworkLimitReached, StatusCode::CONFLICT),
        (
            PortalError::Forbidden("no".into()),
            StatusCode::FORBIDDEN,
        ),
        (
            PortalError::Incomplete(vec!["1.1".into()]),
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        (
            PortalError::InvalidSchema("bad".into()),
            StatusCode::BAD_REQUEST,
        ),
        (
            PortalError::IoError("disk".into()),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];
    for (error, expected) in cases {
        assert_eq!(ApiError::from(error).status().0, expected);
    }
    assert_eq!(
        ApiError::Unauthenticated("x".into()).status().0,
        StatusCode::UNAUTHORIZED
    );
}

#[test]
fn test_error_body_carries_details() {
    let body = ApiError::from(PortalError::InvalidResponse(vec![FieldError::new(
        "pct",
        FieldErrorCode::AboveMaximum,
        "must be at most 100",
    )]))
    .to_body();
    assert_eq!(body.code, "invalid_response");
    assert_eq!(body.field_errors.len(), 1);
    assert!(body.missing.is_empty());

    let body = ApiError::from(PortalError::Incomplete(vec!["2.1".into(), "2.3".into()])).to_body();
    assert_eq!(body.missing, vec!["2.1", "2.3"]);

    let json = serde_json::to_string(&ApiError::from(PortalError::LockNotHeld).to_body()).unwrap();
    assert!(!json.contains("field_errors"));
    let parsed: ErrorResponse = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.code, "lock_not_held");
}
