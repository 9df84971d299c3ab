//! # Assessment Lifecycle
//!
//! One barangay's submission against the published indicators, moving
//! through review, at most one rework cycle, and final validation.
//!
//! ```text
//! Draft --submit--> Submitted --start_review--> InReview
//! InReview --request_rework--> Rework --resubmit--> Submitted
//! InReview --forward_to_validation--> AwaitingFinalValidation --finalize--> Completed
//! ```
//!
//! Every transition appends a [`StatusChange`]. Operations that need the
//! indicator definitions take them as arguments; the assessment itself only
//! stores answers, files, verdicts and history.

use crate::form_schema::{FieldErrorCode, ResponseData};
use crate::indicator::{Indicator, answerable_leaves};
use crate::mov::{MovFile, NewMov};
use crate::primitives::MAX_REWORK_CYCLES;
use crate::{Actor, AssessmentId, IndicatorId, MovId, PortalError, Role, UserId, ValidationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// STATUS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Draft,
    Submitted,
    InReview,
    Rework,
    AwaitingFinalValidation,
    Completed,
}

impl AssessmentStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentStatus::Draft => "draft",
            AssessmentStatus::Submitted => "submitted",
            AssessmentStatus::InReview => "in_review",
            AssessmentStatus::Rework => "rework",
            AssessmentStatus::AwaitingFinalValidation => "awaiting_final_validation",
            AssessmentStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for AssessmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: AssessmentStatus,
    pub to: AssessmentStatus,
    pub actor: UserId,
    pub role: Role,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

// =============================================================================
// RESPONSES & FEEDBACK
// =============================================================================

/// Answers and verdicts for one leaf indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorResponse {
    pub indicator_id: IndicatorId,
    #[serde(default)]
    pub values: ResponseData,
    /// Every required field (and upload) is present and valid.
    pub is_complete: bool,
    /// Derived from the calculation schema at submission.
    pub auto_status: Option<ValidationStatus>,
    pub auto_score_percent: Option<u8>,
    pub assessor_status: Option<ValidationStatus>,
    pub assessor_remarks: Option<String>,
    /// Flagged by the assessor; only these may be edited during rework.
    pub requires_rework: bool,
    pub final_status: Option<ValidationStatus>,
    pub validator_remarks: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl IndicatorResponse {
    fn empty(indicator_id: IndicatorId, now: DateTime<Utc>) -> Self {
        Self {
            indicator_id,
            values: ResponseData::new(),
            is_complete: false,
            auto_status: None,
            auto_score_percent: None,
            assessor_status: None,
            assessor_remarks: None,
            requires_rework: false,
            final_status: None,
            validator_remarks: None,
            updated_at: now,
        }
    }

    /// Best verdict available: validator, then assessor, then calculation.
    #[must_use]
    pub fn effective_status(&self) -> Option<ValidationStatus> {
        self.final_status.or(self.assessor_status).or(self.auto_status)
    }
}

/// Reviewer comment. Internal comments are hidden from the BLGU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub indicator_id: Option<IndicatorId>,
    pub author: UserId,
    pub role: Role,
    pub comment: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

/// Validator override for one indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalVerdict {
    pub status: ValidationStatus,
    #[serde(default)]
    pub remarks: Option<String>,
}

// =============================================================================
// ASSESSMENT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: AssessmentId,
    /// BLGU user who owns the submission.
    pub owner: UserId,
    pub barangay: String,
    pub assessment_year: i32,
    pub status: AssessmentStatus,
    #[serde(default)]
    pub responses: BTreeMap<IndicatorId, IndicatorResponse>,
    #[serde(default)]
    pub movs: Vec<MovFile>,
    #[serde(default)]
    pub feedback: Vec<Feedback>,
    pub rework_count: u8,
    pub rework_comments: Option<String>,
    pub reviewer: Option<UserId>,
    pub validator: Option<UserId>,
    #[serde(default)]
    pub history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

fn code_of(indicators: &[Indicator], id: IndicatorId) -> String {
    indicators
        .iter()
        .find(|i| i.id == id)
        .map_or_else(|| id.to_string(), |i| i.code.clone())
}

impl Assessment {
    #[must_use]
    pub fn new(
        id: AssessmentId,
        owner: UserId,
        barangay: impl Into<String>,
        assessment_year: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner,
            barangay: barangay.into(),
            assessment_year,
            status: AssessmentStatus::Draft,
            responses: BTreeMap::new(),
            movs: Vec::new(),
            feedback: Vec::new(),
            rework_count: 0,
            rework_comments: None,
            reviewer: None,
            validator: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
            submitted_at: None,
            completed_at: None,
        }
    }

    // -------------------------------------------------------------------------
    // Guards
    // -------------------------------------------------------------------------

    fn expect_status(&self, allowed: &[AssessmentStatus], action: &str) -> Result<(), PortalError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(PortalError::InvalidTransition {
                from: self.status.to_string(),
                action: action.to_string(),
            })
        }
    }

    fn require_owner(&self, actor: &Actor, action: &str) -> Result<(), PortalError> {
        actor.require(&[Role::BlguUser], action)?;
        if actor.user_id != self.owner {
            return Err(PortalError::Forbidden(format!(
                "user {} does not own assessment {}",
                actor.user_id, self.id
            )));
        }
        Ok(())
    }

    /// Whether `actor` may read this assessment.
    #[must_use]
    pub fn visible_to(&self, actor: &Actor) -> bool {
        actor.role != Role::BlguUser || actor.user_id == self.owner
    }

    /// Whether answers for `indicator_id` may be changed now.
    #[must_use]
    pub fn is_editable(&self, indicator_id: IndicatorId) -> bool {
        match self.status {
            AssessmentStatus::Draft => true,
            AssessmentStatus::Rework => self
                .responses
                .get(&indicator_id)
                .is_some_and(|r| r.requires_rework),
            _ => false,
        }
    }

    fn require_editable(&self, indicator_id: IndicatorId, action: &str) -> Result<(), PortalError> {
        if self.is_editable(indicator_id) {
            Ok(())
        } else {
            Err(PortalError::InvalidTransition {
                from: self.status.to_string(),
                action: format!("{} for indicator {}", action, indicator_id),
            })
        }
    }

    fn transition(
        &mut self,
        to: AssessmentStatus,
        actor: &Actor,
        now: DateTime<Utc>,
        note: Option<String>,
    ) {
        self.history.push(StatusChange {
            from: self.status,
            to,
            actor: actor.user_id,
            role: actor.role,
            at: now,
            note,
        });
        self.status = to;
        self.updated_at = now;
    }

    #[must_use]
    pub fn movs_for(&self, indicator_id: IndicatorId) -> Vec<MovFile> {
        self.movs
            .iter()
            .filter(|m| m.indicator_id == indicator_id)
            .cloned()
            .collect()
    }

    fn refresh_completion(&mut self, indicator: &Indicator, now: DateTime<Utc>) {
        let movs = self.movs_for(indicator.id);
        let complete = indicator
            .form_schema
            .as_ref()
            .is_none_or(|form| form.validate_response(self.response_values(indicator.id), &movs).is_empty());
        let response = self
            .responses
            .entry(indicator.id)
            .or_insert_with(|| IndicatorResponse::empty(indicator.id, now));
        response.is_complete = complete;
        response.updated_at = now;
    }

    fn response_values(&self, indicator_id: IndicatorId) -> &ResponseData {
        static EMPTY: ResponseData = ResponseData::new();
        self.responses
            .get(&indicator_id)
            .map_or(&EMPTY, |r| &r.values)
    }

    // -------------------------------------------------------------------------
    // BLGU
    // -------------------------------------------------------------------------

    /// Store answers for one indicator. Partial answers are accepted;
    /// values that are present must satisfy the form.
    pub fn save_response(
        &mut self,
        actor: &Actor,
        indicator: &Indicator,
        values: ResponseData,
        now: DateTime<Utc>,
    ) -> Result<(), PortalError> {
        self.require_owner(actor, "save responses")?;
        self.require_editable(indicator.id, "save response")?;
        let form = indicator.form_schema.as_ref().ok_or_else(|| {
            PortalError::InvalidSchema(format!("indicator {} has no form", indicator.code))
        })?;

        let movs = self.movs_for(indicator.id);
        let errors: Vec<_> = form
            .validate_response(&values, &movs)
            .into_iter()
            .filter(|e| e.code != FieldErrorCode::Required)
            .collect();
        if !errors.is_empty() {
            return Err(PortalError::InvalidResponse(errors));
        }

        self.responses
            .entry(indicator.id)
            .or_insert_with(|| IndicatorResponse::empty(indicator.id, now))
            .values = values;
        self.refresh_completion(indicator, now);
        self.updated_at = now;
        Ok(())
    }

    /// Record an uploaded file against one of the indicator's upload fields.
    /// Everything `attach_mov` checks, without touching the assessment. Lets
    /// callers reject an upload before allocating its id.
    pub fn check_mov(
        &self,
        actor: &Actor,
        indicator: &Indicator,
        upload: &NewMov,
        max_bytes: u64,
    ) -> Result<(), PortalError> {
        self.require_owner(actor, "upload files")?;
        if upload.indicator_id != indicator.id {
            return Err(PortalError::InvalidSchema(format!(
                "upload targets indicator {}, not {}",
                upload.indicator_id, indicator.id
            )));
        }
        self.require_editable(indicator.id, "upload file")?;
        let form = indicator.form_schema.as_ref().ok_or_else(|| {
            PortalError::InvalidSchema(format!("indicator {} has no form", indicator.code))
        })?;
        upload.check(form, max_bytes)?;

        // The candidate's id plays no part in the file-count check
        let mut movs = self.movs_for(indicator.id);
        movs.push(upload.clone().into_file(MovId(0), actor.user_id, self.updated_at));
        let too_many: Vec<_> = form
            .validate_response(self.response_values(indicator.id), &movs)
            .into_iter()
            .filter(|e| e.field_id == upload.field_id && e.code == FieldErrorCode::TooManyFiles)
            .collect();
        if !too_many.is_empty() {
            return Err(PortalError::InvalidResponse(too_many));
        }
        Ok(())
    }

    pub fn attach_mov(
        &mut self,
        actor: &Actor,
        indicator: &Indicator,
        upload: NewMov,
        mov_id: MovId,
        max_bytes: u64,
        now: DateTime<Utc>,
    ) -> Result<MovFile, PortalError> {
        self.check_mov(actor, indicator, &upload, max_bytes)?;
        let file = upload.into_file(mov_id, actor.user_id, now);
        self.movs.push(file.clone());
        self.refresh_completion(indicator, now);
        self.updated_at = now;
        Ok(file)
    }

    pub fn remove_mov(
        &mut self,
        actor: &Actor,
        mov_id: MovId,
        indicators: &[Indicator],
        now: DateTime<Utc>,
    ) -> Result<MovFile, PortalError> {
        self.require_owner(actor, "remove files")?;
        let index = self
            .movs
            .iter()
            .position(|m| m.id == mov_id)
            .ok_or(PortalError::MovNotFound(mov_id))?;
        let indicator_id = self.movs[index].indicator_id;
        self.require_editable(indicator_id, "remove file")?;

        let removed = self.movs.remove(index);
        if let Some(indicator) = indicators.iter().find(|i| i.id == indicator_id) {
            self.refresh_completion(indicator, now);
        }
        self.updated_at = now;
        Ok(removed)
    }

    /// Codes of answerable indicators whose answers are not complete.
    #[must_use]
    pub fn incomplete_indicators(&self, indicators: &[Indicator]) -> Vec<String> {
        answerable_leaves(indicators)
            .into_iter()
            .filter(|ind| {
                let movs = self.movs_for(ind.id);
                ind.form_schema.as_ref().is_some_and(|form| {
                    !form
                        .validate_response(self.response_values(ind.id), &movs)
                        .is_empty()
                })
            })
            .map(|ind| ind.code.clone())
            .collect()
    }

    /// Completeness check plus auto-calculation over every answerable leaf.
    fn seal_answers(&mut self, indicators: &[Indicator], now: DateTime<Utc>) -> Result<(), PortalError> {
        let incomplete = self.incomplete_indicators(indicators);
        if !incomplete.is_empty() {
            return Err(PortalError::Incomplete(incomplete));
        }
        for ind in answerable_leaves(indicators) {
            let evaluation = ind
                .calculation_schema
                .as_ref()
                .map(|calc| calc.evaluate(self.response_values(ind.id)));
            let response = self
                .responses
                .entry(ind.id)
                .or_insert_with(|| IndicatorResponse::empty(ind.id, now));
            response.is_complete = true;
            response.auto_status = evaluation.as_ref().map(|e| e.status);
            response.auto_score_percent = evaluation.as_ref().map(|e| e.score_percent());
        }
        Ok(())
    }

    pub fn submit(
        &mut self,
        actor: &Actor,
        indicators: &[Indicator],
        now: DateTime<Utc>,
    ) -> Result<(), PortalError> {
        self.require_owner(actor, "submit")?;
        self.expect_status(&[AssessmentStatus::Draft], "submit")?;
        self.seal_answers(indicators, now)?;
        self.submitted_at = Some(now);
        self.transition(AssessmentStatus::Submitted, actor, now, None);
        Ok(())
    }

    /// Return a reworked submission. Flags are cleared and reworked
    /// indicators go back to unassessed.
    pub fn resubmit(
        &mut self,
        actor: &Actor,
        indicators: &[Indicator],
        now: DateTime<Utc>,
    ) -> Result<(), PortalError> {
        self.require_owner(actor, "resubmit")?;
        self.expect_status(&[AssessmentStatus::Rework], "resubmit")?;
        self.seal_answers(indicators, now)?;
        for response in self.responses.values_mut().filter(|r| r.requires_rework) {
            response.requires_rework = false;
            response.assessor_status = None;
        }
        self.submitted_at = Some(now);
        self.transition(AssessmentStatus::Submitted, actor, now, None);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Assessor
    // -------------------------------------------------------------------------

    pub fn start_review(&mut self, actor: &Actor, now: DateTime<Utc>) -> Result<(), PortalError> {
        actor.require(&[Role::Assessor], "start a review")?;
        self.expect_status(&[AssessmentStatus::Submitted], "start review")?;
        self.reviewer = Some(actor.user_id);
        self.transition(AssessmentStatus::InReview, actor, now, None);
        Ok(())
    }

    /// Record the assessor's verdict on one indicator, optionally flagging
    /// it for rework.
    pub fn assess_response(
        &mut self,
        actor: &Actor,
        indicator_id: IndicatorId,
        status: ValidationStatus,
        remarks: Option<String>,
        needs_rework: bool,
        now: DateTime<Utc>,
    ) -> Result<(), PortalError> {
        actor.require(&[Role::Assessor], "assess responses")?;
        self.expect_status(&[AssessmentStatus::InReview], "assess")?;
        if needs_rework && self.rework_count >= MAX_REWORK_CYCLES {
            return Err(PortalError::ReworkLimitReached);
        }
        let response = self
            .responses
            .get_mut(&indicator_id)
            .ok_or(PortalError::IndicatorNotFound(indicator_id))?;
        response.assessor_status = Some(status);
        response.assessor_remarks = remarks;
        response.requires_rework = needs_rework;
        response.updated_at = now;
        self.updated_at = now;
        Ok(())
    }

    pub fn add_feedback(
        &mut self,
        actor: &Actor,
        indicator_id: Option<IndicatorId>,
        comment: impl Into<String>,
        is_internal: bool,
        now: DateTime<Utc>,
    ) -> Result<(), PortalError> {
        actor.require(&[Role::Assessor, Role::Validator], "leave feedback")?;
        self.expect_status(
            &[
                AssessmentStatus::InReview,
                AssessmentStatus::AwaitingFinalValidation,
            ],
            "add feedback",
        )?;
        let comment = comment.into();
        if comment.trim().is_empty() {
            return Err(PortalError::InvalidSchema("feedback comment is empty".to_string()));
        }
        if let Some(id) = indicator_id {
            if !self.responses.contains_key(&id) {
                return Err(PortalError::IndicatorNotFound(id));
            }
        }
        self.feedback.push(Feedback {
            indicator_id,
            author: actor.user_id,
            role: actor.role,
            comment,
            is_internal,
            created_at: now,
        });
        self.updated_at = now;
        Ok(())
    }

    /// Feedback the actor may see; the BLGU never sees internal notes.
    #[must_use]
    pub fn visible_feedback(&self, actor: &Actor) -> Vec<&Feedback> {
        self.feedback
            .iter()
            .filter(|f| actor.role != Role::BlguUser || !f.is_internal)
            .collect()
    }

    /// Send flagged indicators back to the BLGU. Allowed once.
    pub fn request_rework(
        &mut self,
        actor: &Actor,
        comments: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), PortalError> {
        actor.require(&[Role::Assessor], "request rework")?;
        self.expect_status(&[AssessmentStatus::InReview], "request rework")?;
        if self.rework_count >= MAX_REWORK_CYCLES {
            return Err(PortalError::ReworkLimitReached);
        }
        if !self.responses.values().any(|r| r.requires_rework) {
            return Err(PortalError::Incomplete(vec![
                "no indicator is flagged for rework".to_string(),
            ]));
        }
        let comments = comments.into();
        self.rework_count += 1;
        self.rework_comments = Some(comments.clone());
        self.transition(AssessmentStatus::Rework, actor, now, Some(comments));
        Ok(())
    }

    /// Hand over to the validator once every indicator has a verdict and
    /// nothing is waiting on rework.
    pub fn forward_to_validation(
        &mut self,
        actor: &Actor,
        indicators: &[Indicator],
        now: DateTime<Utc>,
    ) -> Result<(), PortalError> {
        actor.require(&[Role::Assessor], "forward to validation")?;
        self.expect_status(&[AssessmentStatus::InReview], "forward to validation")?;
        let pending: Vec<String> = self
            .responses
            .values()
            .filter(|r| r.assessor_status.is_none() || r.requires_rework)
            .map(|r| code_of(indicators, r.indicator_id))
            .collect();
        if !pending.is_empty() {
            return Err(PortalError::Incomplete(pending));
        }
        self.transition(AssessmentStatus::AwaitingFinalValidation, actor, now, None);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Validator
    // -------------------------------------------------------------------------

    /// Issue final verdicts. Indicators without an override keep the
    /// assessor's status.
    pub fn finalize(
        &mut self,
        actor: &Actor,
        overrides: &BTreeMap<IndicatorId, FinalVerdict>,
        now: DateTime<Utc>,
    ) -> Result<(), PortalError> {
        actor.require(&[Role::Validator], "finalize")?;
        self.expect_status(&[AssessmentStatus::AwaitingFinalValidation], "finalize")?;
        if let Some(unknown) = overrides.keys().find(|id| !self.responses.contains_key(id)) {
            return Err(PortalError::IndicatorNotFound(*unknown));
        }

        for (id, response) in &mut self.responses {
            match overrides.get(id) {
                Some(verdict) => {
                    response.final_status = Some(verdict.status);
                    response.validator_remarks.clone_from(&verdict.remarks);
                }
                None => response.final_status = response.assessor_status,
            }
            response.updated_at = now;
        }
        self.validator = Some(actor.user_id);
        self.completed_at = Some(now);
        self.transition(AssessmentStatus::Completed, actor, now, None);
        Ok(())
    }

    /// Effective verdict per indicator.
    #[must_use]
    pub fn verdicts(&self) -> BTreeMap<IndicatorId, ValidationStatus> {
        self.responses
            .iter()
            .filter_map(|(id, r)| r.effective_status().map(|s| (*id, s)))
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GovernanceAreaId;
    use crate::calculation::{CalculationRule, CalculationSchema, ComparisonOperator, LogicalOperator};
    use crate::form_schema::{FileField, FormField, FormSchema, NumberField};
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).single().expect("valid time")
    }

    const BLGU: Actor = Actor::new(UserId(1), Role::BlguUser);
    const ASSESSOR: Actor = Actor::new(UserId(2), Role::Assessor);
    const VALIDATOR: Actor = Actor::new(UserId(3), Role::Validator);

    fn indicators() -> Vec<Indicator> {
        let form = FormSchema::with_fields(vec![
            FormField::NumberInput(NumberField {
                field_id: "pct".into(),
                label: "Utilization".into(),
                required: true,
                help_text: None,
                min_value: Some(0.0),
                max_value: Some(100.0),
                allow_decimal: false,
            }),
            FormField::FileUpload(FileField {
                field_id: "proof".into(),
                label: "Proof".into(),
                required: true,
                help_text: None,
                allowed_file_types: vec!["pdf".into()],
                max_file_size_bytes: None,
                max_files: Some(1),
            }),
        ]);
        let mut calc = CalculationSchema::new();
        let g = calc.add_group(LogicalOperator::And);
        calc.add_rule(
            g,
            CalculationRule::PercentageThreshold {
                field_id: "pct".into(),
                operator: ComparisonOperator::GreaterOrEqual,
                threshold: 50,
            },
        )
        .expect("rule");

        vec![Indicator {
            id: IndicatorId(1),
            governance_area_id: GovernanceAreaId(1),
            code: "1.1".into(),
            name: "Budget utilization".into(),
            description: String::new(),
            parent_id: None,
            order: 0,
            form_schema: Some(form),
            calculation_schema: Some(calc),
            is_active: true,
            version: 1,
            updated_at: now(),
        }]
    }

    fn upload(name: &str) -> NewMov {
        NewMov {
            indicator_id: IndicatorId(1),
            field_id: "proof".into(),
            file_name: name.into(),
            content_type: "application/pdf".into(),
            size_bytes: 100,
            storage_key: format!("movs/{}", name),
        }
    }

    fn answered() -> (Assessment, Vec<Indicator>) {
        let inds = indicators();
        let mut a = Assessment::new(AssessmentId(1), UserId(1), "San Isidro", 2025, now());
        let values: ResponseData = [("pct".to_string(), json!(80))].into_iter().collect();
        a.save_response(&BLGU, &inds[0], values, now()).expect("save");
        a.attach_mov(&BLGU, &inds[0], upload("a.pdf"), MovId(1), 1_000, now())
            .expect("attach");
        (a, inds)
    }

    #[test]
    fn submit_requires_complete_answers() {
        let inds = indicators();
        let mut a = Assessment::new(AssessmentId(1), UserId(1), "San Isidro", 2025, now());
        let err = a.submit(&BLGU, &inds, now()).expect_err("empty");
        assert!(matches!(err, PortalError::Incomplete(codes) if codes == vec!["1.1".to_string()]));

        let (mut a, inds) = answered();
        a.submit(&BLGU, &inds, now()).expect("submit");
        assert_eq!(a.status, AssessmentStatus::Submitted);
        let r = &a.responses[&IndicatorId(1)];
        assert_eq!(r.auto_status, Some(ValidationStatus::Pass));
        assert_eq!(r.auto_score_percent, Some(100));
        assert_eq!(a.history.len(), 1);
    }

    #[test]
    fn partial_save_accepted_but_bad_values_rejected() {
        let inds = indicators();
        let mut a = Assessment::new(AssessmentId(1), UserId(1), "San Isidro", 2025, now());
        a.save_response(&BLGU, &inds[0], ResponseData::new(), now())
            .expect("partial");
        assert!(!a.responses[&IndicatorId(1)].is_complete);

        let bad: ResponseData = [("pct".to_string(), json!(150))].into_iter().collect();
        assert!(matches!(
            a.save_response(&BLGU, &inds[0], bad, now()),
            Err(PortalError::InvalidResponse(_))
        ));
    }

    #[test]
    fn second_upload_exceeds_max_files() {
        let (mut a, inds) = answered();
        assert!(a.responses[&IndicatorId(1)].is_complete);
        let err = a
            .attach_mov(&BLGU, &inds[0], upload("b.pdf"), MovId(2), 1_000, now())
            .expect_err("max files");
        assert!(matches!(err, PortalError::InvalidResponse(_)));

        a.remove_mov(&BLGU, MovId(1), &inds, now()).expect("remove");
        assert!(!a.responses[&IndicatorId(1)].is_complete);
    }

    #[test]
    fn only_owner_edits() {
        let (mut a, inds) = answered();
        let other = Actor::new(UserId(99), Role::BlguUser);
        assert!(matches!(
            a.submit(&other, &inds, now()),
            Err(PortalError::Forbidden(_))
        ));
        assert!(!a.visible_to(&other));
        assert!(a.visible_to(&ASSESSOR));
    }

    #[test]
    fn single_rework_cycle_then_validation() {
        let (mut a, inds) = answered();
        a.submit(&BLGU, &inds, now()).expect("submit");
        a.start_review(&ASSESSOR, now()).expect("review");
        a.assess_response(&ASSESSOR, IndicatorId(1), ValidationStatus::Fail, None, true, now())
            .expect("assess");
        a.add_feedback(&ASSESSOR, Some(IndicatorId(1)), "Upload the signed copy", false, now())
            .expect("feedback");
        a.add_feedback(&ASSESSOR, None, "check with validator", true, now())
            .expect("internal");
        a.request_rework(&ASSESSOR, "See notes", now()).expect("rework");
        assert_eq!(a.status, AssessmentStatus::Rework);
        assert_eq!(a.visible_feedback(&BLGU).len(), 1);

        a.remove_mov(&BLGU, MovId(1), &inds, now()).expect("remove in rework");
        a.attach_mov(&BLGU, &inds[0], upload("signed.pdf"), MovId(2), 1_000, now())
            .expect("re-upload");
        a.resubmit(&BLGU, &inds, now()).expect("resubmit");
        assert_eq!(a.responses[&IndicatorId(1)].assessor_status, None);

        a.start_review(&ASSESSOR, now()).expect("review again");
        assert!(matches!(
            a.assess_response(&ASSESSOR, IndicatorId(1), ValidationStatus::Fail, None, true, now()),
            Err(PortalError::ReworkLimitReached)
        ));
        a.assess_response(&ASSESSOR, IndicatorId(1), ValidationStatus::Pass, None, false, now())
            .expect("assess");
        a.forward_to_validation(&ASSESSOR, &inds, now()).expect("forward");

        let overrides: BTreeMap<_, _> = [(
            IndicatorId(1),
            FinalVerdict {
                status: ValidationStatus::Conditional,
                remarks: Some("late posting".into()),
            },
        )]
        .into_iter()
        .collect();
        a.finalize(&VALIDATOR, &overrides, now()).expect("finalize");
        assert_eq!(a.status, AssessmentStatus::Completed);
        assert_eq!(a.verdicts()[&IndicatorId(1)], ValidationStatus::Conditional);

        let path: Vec<_> = a.history.iter().map(|h| h.to).collect();
        assert_eq!(
            path,
            vec![
                AssessmentStatus::Submitted,
                AssessmentStatus::InReview,
                AssessmentStatus::Rework,
                AssessmentStatus::Submitted,
                AssessmentStatus::InReview,
                AssessmentStatus::AwaitingFinalValidation,
                AssessmentStatus::Completed,
            ]
        );
    }

    #[test]
    fn forward_blocked_until_all_assessed() {
        let (mut a, inds) = answered();
        a.submit(&BLGU, &inds, now()).expect("submit");
        a.start_review(&ASSESSOR, now()).expect("review");
        assert!(matches!(
            a.forward_to_validation(&ASSESSOR, &inds, now()),
            Err(PortalError::Incomplete(_))
        ));
        assert!(matches!(
            a.request_rework(&ASSESSOR, "nothing flagged", now()),
            Err(PortalError::Incomplete(_))
        ));
    }

    #[test]
    fn wrong_role_and_wrong_state() {
        let (mut a, inds) = answered();
        assert!(matches!(
            a.start_review(&ASSESSOR, now()),
            Err(PortalError::InvalidTransition { .. })
        ));
        a.submit(&BLGU, &inds, now()).expect("submit");
        assert!(matches!(
            a.start_review(&VALIDATOR, now()),
            Err(PortalError::Forbidden(_))
        ));
        let values: ResponseData = [("pct".to_string(), json!(10))].into_iter().collect();
        assert!(matches!(
            a.save_response(&BLGU, &inds[0], values, now()),
            Err(PortalError::InvalidTransition { .. })
        ));
    }
}
