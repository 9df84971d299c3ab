//! # API Endpoint Handlers
//!
//! Every handler takes the portal lock, calls one `Portal` operation with
//! the current time and maps the result. Handlers acting for a user
//! extract a [`Caller`].

use super::{
    AppState,
    auth::Caller,
    types::{
        ApiError, AreaQuery, AssessResponseRequest, CreateAssessmentRequest, CreateDraftRequest,
        EvaluateRequest, ExportResponse, FeedbackRequest, FinalizeRequest, HealthResponse,
        ReworkRequest, SaveDraftRequest, SaveDraftResponse, SaveResponseRequest, StatusResponse,
        TreeResponse, UnlockQuery, UnlockResponse, ValidateSchemaRequest, ValidateSchemaResponse,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use chrono::Utc;
use sglgb_core::{
    Assessment, AssessmentId, AssessmentReport, BundleHeader, DraftId, DraftLock, Evaluation,
    GovernanceArea, GovernanceAreaId, Indicator, IndicatorDraft, IndicatorId, IndicatorRevision,
    MovFile, MovId, NewMov, PublishReport, bundle_to_bytes,
};

type ApiResult<T> = Result<Json<T>, ApiError>;

fn require_area(query: &AreaQuery) -> Result<GovernanceAreaId, ApiError> {
    query
        .area
        .ok_or_else(|| ApiError::BadRequest("Query parameter 'area' is required".to_string()))
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

pub async fn status_handler(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    let portal = state.portal.read().await;
    Ok(Json(StatusResponse {
        persistent: portal.is_persistent(),
        stats: portal.stats()?,
    }))
}

// =============================================================================
// GOVERNANCE AREAS
// =============================================================================

pub async fn list_areas_handler(State(state): State<AppState>) -> ApiResult<Vec<GovernanceArea>> {
    Ok(Json(state.portal.read().await.areas()?))
}

pub async fn put_area_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(area): Json<GovernanceArea>,
) -> ApiResult<GovernanceArea> {
    let mut portal = state.portal.write().await;
    portal.put_area(&actor, area.clone())?;
    tracing::info!(event = "area_saved", area = %area.id, user = %actor.user_id);
    Ok(Json(area))
}

// =============================================================================
// INDICATORS
// =============================================================================

pub async fn list_indicators_handler(
    State(state): State<AppState>,
    Query(query): Query<AreaQuery>,
) -> ApiResult<Vec<Indicator>> {
    Ok(Json(state.portal.read().await.indicators(query.area)?))
}

pub async fn get_indicator_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Indicator> {
    Ok(Json(state.portal.read().await.indicator(IndicatorId(id))?))
}

pub async fn indicator_history_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Vec<IndicatorRevision>> {
    Ok(Json(
        state.portal.read().await.indicator_history(IndicatorId(id))?,
    ))
}

/// Published tree of an area with derived node statuses.
pub async fn indicator_tree_handler(
    State(state): State<AppState>,
    Query(query): Query<AreaQuery>,
) -> ApiResult<TreeResponse> {
    let area = require_area(&query)?;
    let tree = state.portal.read().await.indicator_tree(area)?;
    let summary = tree.completion_summary();
    Ok(Json(TreeResponse { tree, summary }))
}

// =============================================================================
// SCHEMAS
// =============================================================================

/// Lint a form schema and optional calculation schema. Always 200; the
/// body says whether the schemas are usable.
pub async fn validate_schema_handler(
    Json(req): Json<ValidateSchemaRequest>,
) -> Json<ValidateSchemaResponse> {
    let mut issues: Vec<String> = req
        .form_schema
        .lint()
        .iter()
        .map(ToString::to_string)
        .collect();
    if let Some(calc) = &req.calculation_schema {
        issues.extend(calc.lint_against(&req.form_schema));
    }
    Json(ValidateSchemaResponse::from_issues(issues))
}

/// Evaluate a calculation schema against sample values.
pub async fn evaluate_handler(Json(req): Json<EvaluateRequest>) -> ApiResult<Evaluation> {
    if let Some(form) = &req.form_schema {
        req.calculation_schema.validate_against(form)?;
    }
    Ok(Json(req.calculation_schema.evaluate(&req.values)))
}

// =============================================================================
// DRAFTS
// =============================================================================

pub async fn create_draft_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<CreateDraftRequest>,
) -> Result<(StatusCode, Json<IndicatorDraft>), ApiError> {
    let mut portal = state.portal.write().await;
    let draft = portal.create_draft(
        &actor,
        req.governance_area_id,
        req.title,
        req.from_published,
        Utc::now(),
    )?;
    tracing::info!(event = "draft_created", draft = %draft.id, area = %draft.governance_area_id, user = %actor.user_id);
    Ok((StatusCode::CREATED, Json(draft)))
}

pub async fn list_drafts_handler(
    State(state): State<AppState>,
    Query(query): Query<AreaQuery>,
) -> ApiResult<Vec<IndicatorDraft>> {
    Ok(Json(state.portal.read().await.drafts(query.area)?))
}

pub async fn get_draft_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<IndicatorDraft> {
    Ok(Json(state.portal.read().await.draft(DraftId(id))?))
}

pub async fn save_draft_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<u64>,
    Json(req): Json<SaveDraftRequest>,
) -> ApiResult<SaveDraftResponse> {
    let mut portal = state.portal.write().await;
    let version = portal.save_draft(
        &actor,
        DraftId(id),
        req.expected_version,
        req.tree,
        req.current_step,
        Utc::now(),
    )?;
    tracing::debug!(event = "draft_saved", draft = id, version);
    Ok(Json(SaveDraftResponse { version }))
}

pub async fn delete_draft_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let mut portal = state.portal.write().await;
    portal.delete_draft(&actor, DraftId(id), Utc::now())?;
    tracing::info!(event = "draft_deleted", draft = id, user = %actor.user_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn lock_draft_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<u64>,
) -> ApiResult<DraftLock> {
    let mut portal = state.portal.write().await;
    Ok(Json(portal.lock_draft(&actor, DraftId(id), Utc::now())?))
}

/// Release the caller's lock, or any lock with `?force=true`.
pub async fn unlock_draft_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<u64>,
    Query(query): Query<UnlockQuery>,
) -> ApiResult<UnlockResponse> {
    let mut portal = state.portal.write().await;
    let released = portal.unlock_draft(&actor, DraftId(id), query.force, Utc::now())?;
    if query.force && released {
        tracing::warn!(event = "draft_lock_forced", draft = id, user = %actor.user_id);
    }
    Ok(Json(UnlockResponse { released }))
}

pub async fn ready_draft_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<u64>,
) -> ApiResult<IndicatorDraft> {
    let mut portal = state.portal.write().await;
    portal.mark_draft_ready(&actor, DraftId(id), Utc::now())?;
    Ok(Json(portal.draft(DraftId(id))?))
}

pub async fn publish_draft_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<u64>,
) -> ApiResult<PublishReport> {
    let mut portal = state.portal.write().await;
    let report = portal.publish_draft(&actor, DraftId(id), Utc::now())?;
    tracing::info!(
        event = "draft_published",
        draft = id,
        created = report.created.len(),
        updated = report.updated.len(),
        deactivated = report.deactivated.len()
    );
    Ok(Json(report))
}

// =============================================================================
// ASSESSMENTS
// =============================================================================

pub async fn create_assessment_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<CreateAssessmentRequest>,
) -> Result<(StatusCode, Json<Assessment>), ApiError> {
    let mut portal = state.portal.write().await;
    let assessment =
        portal.create_assessment(&actor, req.barangay, req.assessment_year, Utc::now())?;
    tracing::info!(event = "assessment_created", assessment = %assessment.id, user = %actor.user_id);
    Ok((StatusCode::CREATED, Json(assessment)))
}

pub async fn list_assessments_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<Vec<Assessment>> {
    Ok(Json(state.portal.read().await.assessments(&actor)?))
}

pub async fn get_assessment_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<u64>,
) -> ApiResult<Assessment> {
    Ok(Json(
        state
            .portal
            .read()
            .await
            .assessment(&actor, AssessmentId(id))?,
    ))
}

pub async fn save_response_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path((id, indicator_id)): Path<(u64, u64)>,
    Json(req): Json<SaveResponseRequest>,
) -> ApiResult<Assessment> {
    let mut portal = state.portal.write().await;
    portal.save_response(
        &actor,
        AssessmentId(id),
        IndicatorId(indicator_id),
        req.values,
        Utc::now(),
    )?;
    Ok(Json(portal.assessment(&actor, AssessmentId(id))?))
}

pub async fn attach_mov_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<u64>,
    Json(upload): Json<NewMov>,
) -> Result<(StatusCode, Json<MovFile>), ApiError> {
    let mut portal = state.portal.write().await;
    let mov = portal.attach_mov(&actor, AssessmentId(id), upload, Utc::now())?;
    tracing::info!(event = "mov_attached", assessment = id, mov = %mov.id, bytes = mov.size_bytes);
    Ok((StatusCode::CREATED, Json(mov)))
}

pub async fn remove_mov_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path((id, mov_id)): Path<(u64, u64)>,
) -> ApiResult<MovFile> {
    let mut portal = state.portal.write().await;
    Ok(Json(portal.remove_mov(
        &actor,
        AssessmentId(id),
        MovId(mov_id),
        Utc::now(),
    )?))
}

// -----------------------------------------------------------------------------
// Workflow transitions
// -----------------------------------------------------------------------------

pub async fn submit_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<u64>,
) -> ApiResult<Assessment> {
    let mut portal = state.portal.write().await;
    portal.submit(&actor, AssessmentId(id), Utc::now())?;
    tracing::info!(event = "assessment_submitted", assessment = id, user = %actor.user_id);
    Ok(Json(portal.assessment(&actor, AssessmentId(id))?))
}

pub async fn resubmit_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<u64>,
) -> ApiResult<Assessment> {
    let mut portal = state.portal.write().await;
    portal.resubmit(&actor, AssessmentId(id), Utc::now())?;
    tracing::info!(event = "assessment_resubmitted", assessment = id, user = %actor.user_id);
    Ok(Json(portal.assessment(&actor, AssessmentId(id))?))
}

pub async fn review_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<u64>,
) -> ApiResult<Assessment> {
    let mut portal = state.portal.write().await;
    portal.start_review(&actor, AssessmentId(id), Utc::now())?;
    Ok(Json(portal.assessment(&actor, AssessmentId(id))?))
}

pub async fn assess_response_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path((id, indicator_id)): Path<(u64, u64)>,
    Json(req): Json<AssessResponseRequest>,
) -> ApiResult<Assessment> {
    let mut portal = state.portal.write().await;
    portal.assess_response(
        &actor,
        AssessmentId(id),
        IndicatorId(indicator_id),
        req.status,
        req.remarks,
        req.needs_rework,
        Utc::now(),
    )?;
    Ok(Json(portal.assessment(&actor, AssessmentId(id))?))
}

pub async fn feedback_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<u64>,
    Json(req): Json<FeedbackRequest>,
) -> Result<(StatusCode, Json<Assessment>), ApiError> {
    let mut portal = state.portal.write().await;
    portal.add_feedback(
        &actor,
        AssessmentId(id),
        req.indicator_id,
        req.comment,
        req.is_internal,
        Utc::now(),
    )?;
    Ok((
        StatusCode::CREATED,
        Json(portal.assessment(&actor, AssessmentId(id))?),
    ))
}

pub async fn rework_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<u64>,
    Json(req): Json<ReworkRequest>,
) -> ApiResult<Assessment> {
    let mut portal = state.portal.write().await;
    portal.request_rework(&actor, AssessmentId(id), req.comments, Utc::now())?;
    tracing::info!(event = "rework_requested", assessment = id, user = %actor.user_id);
    Ok(Json(portal.assessment(&actor, AssessmentId(id))?))
}

pub async fn forward_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<u64>,
) -> ApiResult<Assessment> {
    let mut portal = state.portal.write().await;
    portal.forward_to_validation(&actor, AssessmentId(id), Utc::now())?;
    tracing::info!(event = "assessment_forwarded", assessment = id, user = %actor.user_id);
    Ok(Json(portal.assessment(&actor, AssessmentId(id))?))
}

pub async fn finalize_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<u64>,
    Json(req): Json<FinalizeRequest>,
) -> ApiResult<AssessmentReport> {
    let mut portal = state.portal.write().await;
    portal.finalize(&actor, AssessmentId(id), &req.to_map(), Utc::now())?;
    let report = portal.assessment_report(&actor, AssessmentId(id))?;
    tracing::info!(
        event = "assessment_finalized",
        assessment = id,
        passed = report.result.passed
    );
    Ok(Json(report))
}

pub async fn result_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<u64>,
) -> ApiResult<AssessmentReport> {
    Ok(Json(
        state
            .portal
            .read()
            .await
            .assessment_report(&actor, AssessmentId(id))?,
    ))
}

// =============================================================================
// EXPORT
// =============================================================================

/// Export every area and indicator as a base64 bundle.
pub async fn export_handler(State(state): State<AppState>) -> ApiResult<ExportResponse> {
    let bundle = state.portal.read().await.export_bundle(Utc::now())?;
    let bytes = bundle_to_bytes(&bundle)?;
    let header = BundleHeader::from_bytes(&bytes)?;
    Ok(Json(ExportResponse {
        success: true,
        areas: bundle.areas.len(),
        indicators: bundle.indicators.len(),
        checksum: format!("{:016x}", header.checksum),
        blake3: header.blake3_hex(),
        data: base64::engine::general_purpose::STANDARD.encode(&bytes),
    }))
}
