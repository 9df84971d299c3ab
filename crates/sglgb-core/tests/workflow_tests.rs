//! # Workflow Tests
//!
//! End-to-end runs through [`Portal`]: indicator authoring, BLGU
//! submission, assessor review with one rework cycle, validator
//! finalization and the "3+1" result.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use sglgb_core::calculation::{ConditionGroup, LogicalOperator};
use sglgb_core::form_schema::{FileField, NumberField};
use sglgb_core::{
    Actor, AssessmentStatus, CalculationRule, CalculationSchema, ComparisonOperator, FinalVerdict,
    FormField, FormSchema, GovernanceAreaId, IndicatorId, MovId, NewMov, NodeUpdate, Portal,
    PortalError, ResponseData, Role, UserId, ValidationStatus,
};
use std::collections::BTreeMap;

const MLGOO: Actor = Actor::new(UserId(1), Role::MlgooDilg);
const BLGU: Actor = Actor::new(UserId(10), Role::BlguUser);
const ASSESSOR: Actor = Actor::new(UserId(20), Role::Assessor);
const VALIDATOR: Actor = Actor::new(UserId(30), Role::Validator);

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0)
        .single()
        .expect("valid time")
}

fn utilization_form(with_upload: bool) -> FormSchema {
    let mut fields = vec![FormField::NumberInput(NumberField {
        field_id: "pct".into(),
        label: "Utilization (%)".into(),
        required: true,
        help_text: None,
        min_value: Some(0.0),
        max_value: Some(100.0),
        allow_decimal: false,
    })];
    if with_upload {
        fields.push(FormField::FileUpload(FileField {
            field_id: "report".into(),
            label: "Signed report".into(),
            required: true,
            help_text: None,
            allowed_file_types: vec!["pdf".into()],
            max_file_size_bytes: None,
            max_files: Some(2),
        }));
    }
    FormSchema::with_fields(fields)
}

fn at_least_half() -> CalculationSchema {
    CalculationSchema {
        condition_groups: vec![ConditionGroup {
            operator: LogicalOperator::And,
            rules: vec![CalculationRule::PercentageThreshold {
                field_id: "pct".into(),
                operator: ComparisonOperator::GreaterOrEqual,
                threshold: 50,
            }],
        }],
        ..CalculationSchema::default()
    }
}

/// Publish one auto-scored leaf per default area. Area 1 also requires an
/// upload. Returns leaf ids in area order.
fn publish_leaves(portal: &mut Portal) -> Vec<IndicatorId> {
    portal.seed_default_areas().expect("seed");
    let mut ids = Vec::new();
    for area in 1..=6u64 {
        let draft = portal
            .create_draft(&MLGOO, GovernanceAreaId(area), "Indicators", false, t0())
            .expect("draft");
        let mut tree = draft.tree.clone();
        let parent = tree.add_node(None, "Compliance").expect("parent");
        let leaf = tree.add_node(Some(&parent), "Utilization").expect("leaf");
        tree.update_node(
            &leaf,
            NodeUpdate {
                form_schema: Some(utilization_form(area == 1)),
                calculation_schema: Some(at_least_half()),
                ..NodeUpdate::default()
            },
        )
        .expect("update");
        assert!(tree.is_complete());
        portal
            .save_draft(&MLGOO, draft.id, draft.version, tree, Some(3), t0())
            .expect("save");
        let report = portal.publish_draft(&MLGOO, draft.id, t0()).expect("publish");
        assert_eq!(report.created.len(), 2);

        let rows = portal.indicators(Some(GovernanceAreaId(area))).expect("rows");
        assert_eq!(rows[0].code, format!("{}.1", area));
        assert_eq!(rows[1].code, format!("{}.1.1", area));
        ids.push(rows[1].id);
    }
    ids
}

fn pct(value: u64) -> ResponseData {
    let mut values = ResponseData::new();
    values.insert("pct".into(), json!(value));
    values
}

fn upload(indicator_id: IndicatorId, name: &str) -> NewMov {
    NewMov {
        indicator_id,
        field_id: "report".into(),
        file_name: name.into(),
        content_type: "application/pdf".into(),
        size_bytes: 2048,
        storage_key: format!("movs/{}", name),
    }
}

// =============================================================================
// FULL LIFECYCLE
// =============================================================================

mod lifecycle {
    use super::*;

    #[test]
    fn submission_review_rework_and_validation() {
        let mut portal = Portal::new();
        let leaves = publish_leaves(&mut portal);
        let a = portal
            .create_assessment(&BLGU, "Poblacion", 2025, t0())
            .expect("create")
            .id;

        for (i, leaf) in leaves.iter().enumerate() {
            let value = if i == 3 { 20 } else { 80 };
            portal
                .save_response(&BLGU, a, *leaf, pct(value), t0())
                .expect("save");
        }

        // Area 1 still lacks its upload.
        let err = portal.submit(&BLGU, a, t0()).expect_err("missing upload");
        assert!(matches!(err, PortalError::Incomplete(ref codes) if codes == &vec!["1.1.1".to_string()]));

        portal
            .attach_mov(&BLGU, a, upload(leaves[0], "report.pdf"), t0())
            .expect("upload");
        portal.submit(&BLGU, a, t0()).expect("submit");

        let submitted = portal.assessment(&ASSESSOR, a).expect("load");
        assert_eq!(submitted.status, AssessmentStatus::Submitted);
        let auto: Vec<Option<ValidationStatus>> = leaves
            .iter()
            .map(|id| submitted.responses.get(id).and_then(|r| r.auto_status))
            .collect();
        assert_eq!(auto[3], Some(ValidationStatus::Fail));
        assert_eq!(auto[0], Some(ValidationStatus::Pass));

        // Assessor flags area 4 for rework.
        let later = t0() + Duration::days(2);
        portal.start_review(&ASSESSOR, a, later).expect("review");
        for (i, leaf) in leaves.iter().enumerate() {
            let (status, rework) = if i == 3 {
                (ValidationStatus::Fail, true)
            } else {
                (ValidationStatus::Pass, false)
            };
            portal
                .assess_response(&ASSESSOR, a, *leaf, status, None, rework, later)
                .expect("assess");
        }
        portal
            .add_feedback(&ASSESSOR, a, Some(leaves[3]), "Attach updated figures".into(), false, later)
            .expect("feedback");
        portal
            .add_feedback(&ASSESSOR, a, None, "Check with DBM".into(), true, later)
            .expect("internal note");
        portal
            .request_rework(&ASSESSOR, a, "See area 4".into(), later)
            .expect("rework");

        // BLGU sees public feedback only and may edit flagged indicators only.
        let seen = portal.assessment(&BLGU, a).expect("load");
        assert_eq!(seen.status, AssessmentStatus::Rework);
        assert_eq!(seen.feedback.len(), 1);
        assert!(matches!(
            portal.save_response(&BLGU, a, leaves[0], pct(90), later),
            Err(PortalError::InvalidTransition { .. })
        ));
        portal
            .save_response(&BLGU, a, leaves[3], pct(75), later)
            .expect("rework edit");
        portal.resubmit(&BLGU, a, later).expect("resubmit");

        // Second round: the cycle is spent.
        let third = later + Duration::days(1);
        portal.start_review(&ASSESSOR, a, third).expect("review again");
        assert!(matches!(
            portal.assess_response(&ASSESSOR, a, leaves[3], ValidationStatus::Fail, None, true, third),
            Err(PortalError::ReworkLimitReached)
        ));
        assert!(matches!(
            portal.forward_to_validation(&ASSESSOR, a, third),
            Err(PortalError::Incomplete(_))
        ));
        portal
            .assess_response(&ASSESSOR, a, leaves[3], ValidationStatus::Pass, None, false, third)
            .expect("assess");
        portal
            .forward_to_validation(&ASSESSOR, a, third)
            .expect("forward");

        // Validator fails one essential area; 3+1 still holds.
        let mut overrides = BTreeMap::new();
        overrides.insert(
            leaves[5],
            FinalVerdict {
                status: ValidationStatus::Fail,
                remarks: Some("No ordinance on file".into()),
            },
        );
        portal
            .finalize(&VALIDATOR, a, &overrides, third)
            .expect("finalize");

        let report = portal.assessment_report(&VALIDATOR, a).expect("report");
        assert_eq!(report.status, AssessmentStatus::Completed);
        assert_eq!(report.result.core_passed, 3);
        assert_eq!(report.result.essential_passed, 2);
        assert!(report.result.passed);
        assert_eq!(report.result.areas[5].failing, vec!["6.1.1".to_string()]);

        let done = portal.assessment(&VALIDATOR, a).expect("load");
        let path: Vec<AssessmentStatus> = done.history.iter().map(|h| h.to).collect();
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
    fn roles_are_enforced_across_the_workflow() {
        let mut portal = Portal::new();
        let leaves = publish_leaves(&mut portal);
        let a = portal
            .create_assessment(&BLGU, "San Isidro", 2025, t0())
            .expect("create")
            .id;
        assert!(matches!(
            portal.save_response(&ASSESSOR, a, leaves[1], pct(60), t0()),
            Err(PortalError::Forbidden(_))
        ));
        assert!(matches!(
            portal.start_review(&ASSESSOR, a, t0()),
            Err(PortalError::InvalidTransition { .. })
        ));
        assert!(matches!(
            portal.create_assessment(&VALIDATOR, "X", 2025, t0()),
            Err(PortalError::Forbidden(_))
        ));
    }

    #[test]
    fn rejected_upload_type_leaves_assessment_unchanged() {
        let mut portal = Portal::new();
        let leaves = publish_leaves(&mut portal);
        let a = portal
            .create_assessment(&BLGU, "Bagong Silang", 2025, t0())
            .expect("create")
            .id;
        assert!(
            portal
                .attach_mov(&BLGU, a, upload(leaves[0], "photo.exe"), t0())
                .is_err()
        );
        assert!(portal.assessment(&BLGU, a).expect("load").movs.is_empty());

        // The rejected upload did not burn an id
        let accepted = portal
            .attach_mov(&BLGU, a, upload(leaves[0], "report.pdf"), t0())
            .expect("attach");
        assert_eq!(accepted.id, MovId(1));
    }
}

// =============================================================================
// DRAFT CONCURRENCY
// =============================================================================

mod drafts {
    use super::*;

    #[test]
    fn second_editor_is_locked_out_until_expiry() {
        let mut portal = Portal::new();
        portal.seed_default_areas().expect("seed");
        let other = Actor::new(UserId(2), Role::MlgooDilg);
        let draft = portal
            .create_draft(&MLGOO, GovernanceAreaId(1), "FAS", false, t0())
            .expect("draft");

        let tree = draft.tree.clone();
        assert!(matches!(
            portal.save_draft(&other, draft.id, draft.version, tree.clone(), None, t0()),
            Err(PortalError::DraftLocked { .. })
        ));

        let expired = t0() + Duration::minutes(31);
        portal.lock_draft(&other, draft.id, expired).expect("take over");
        let version = portal
            .save_draft(&other, draft.id, draft.version, tree.clone(), None, expired)
            .expect("save");
        assert_eq!(version, draft.version + 1);

        // A stale version is rejected even for the lock holder.
        assert!(matches!(
            portal.save_draft(&other, draft.id, draft.version, tree, None, expired),
            Err(PortalError::VersionConflict { .. })
        ));
    }

    #[test]
    fn publish_refuses_incomplete_tree() {
        let mut portal = Portal::new();
        portal.seed_default_areas().expect("seed");
        let draft = portal
            .create_draft(&MLGOO, GovernanceAreaId(2), "DP", false, t0())
            .expect("draft");
        let mut tree = draft.tree.clone();
        tree.add_node(None, "No form yet").expect("add");
        portal
            .save_draft(&MLGOO, draft.id, draft.version, tree, None, t0())
            .expect("save");
        assert!(matches!(
            portal.publish_draft(&MLGOO, draft.id, t0()),
            Err(PortalError::Incomplete(_))
        ));
        assert!(portal.indicators(None).expect("rows").is_empty());
    }
}

// =============================================================================
// PERSISTENCE
// =============================================================================

mod persistence {
    use super::*;

    #[test]
    fn redb_portal_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("portal.redb");

        let (leaf, assessment_id) = {
            let mut portal = Portal::with_redb(&path).expect("open");
            assert!(portal.is_persistent());
            let leaves = publish_leaves(&mut portal);
            let a = portal
                .create_assessment(&BLGU, "Poblacion", 2025, t0())
                .expect("create");
            portal
                .save_response(&BLGU, a.id, leaves[2], pct(55), t0())
                .expect("save");
            (leaves[2], a.id)
        };

        let portal = Portal::with_redb(&path).expect("reopen");
        let stats = portal.stats().expect("stats");
        assert_eq!(stats.areas, 6);
        assert_eq!(stats.indicators, 12);
        assert_eq!(stats.assessments, 1);
        let a = portal.assessment(&BLGU, assessment_id).expect("load");
        assert_eq!(
            a.responses.get(&leaf).and_then(|r| r.values.get("pct")),
            Some(&json!(55))
        );
    }

    #[test]
    fn redb_ids_continue_after_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("portal.redb");
        let first = {
            let mut portal = Portal::with_redb(&path).expect("open");
            portal
                .create_assessment(&BLGU, "A", 2025, t0())
                .expect("create")
                .id
        };
        let mut portal = Portal::with_redb(&path).expect("reopen");
        let second = portal
            .create_assessment(&BLGU, "B", 2025, t0())
            .expect("create")
            .id;
        assert!(second.0 > first.0);
    }
}
