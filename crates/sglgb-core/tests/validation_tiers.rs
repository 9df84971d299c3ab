//! # Validation Tiers
//!
//! A response is checked three times: the schema when it is authored, each
//! value when it is saved, and completeness when the assessment is
//! submitted. Auto-calculation only runs on the last.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use sglgb_core::calculation::{ConditionGroup, LogicalOperator};
use sglgb_core::form_schema::{FieldErrorCode, NumberField, TextField};
use sglgb_core::{
    Actor, AssessmentId, CalculationRule, CalculationSchema, ComparisonOperator, FormField,
    FormSchema, GovernanceAreaId, IndicatorId, NodeUpdate, Portal, PortalError, ResponseData,
    Role, UserId, ValidationStatus,
};

const MLGOO: Actor = Actor::new(UserId(1), Role::MlgooDilg);
const BLGU: Actor = Actor::new(UserId(10), Role::BlguUser);

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 2, 9, 0, 0)
        .single()
        .expect("valid time")
}

fn form() -> FormSchema {
    FormSchema::with_fields(vec![
        FormField::NumberInput(NumberField {
            field_id: "pct".into(),
            label: "Utilization (%)".into(),
            required: true,
            help_text: None,
            min_value: Some(0.0),
            max_value: Some(100.0),
            allow_decimal: false,
        }),
        FormField::TextInput(TextField {
            field_id: "remarks".into(),
            label: "Remarks".into(),
            required: true,
            help_text: None,
            min_length: None,
            max_length: Some(20),
            placeholder: None,
        }),
    ])
}

fn calc(field: &str) -> CalculationSchema {
    CalculationSchema {
        condition_groups: vec![ConditionGroup {
            operator: LogicalOperator::And,
            rules: vec![CalculationRule::PercentageThreshold {
                field_id: field.into(),
                operator: ComparisonOperator::GreaterOrEqual,
                threshold: 75,
            }],
        }],
        ..CalculationSchema::default()
    }
}

fn values(pairs: &[(&str, serde_json::Value)]) -> ResponseData {
    let mut values = ResponseData::new();
    for (k, v) in pairs {
        values.insert((*k).to_string(), v.clone());
    }
    values
}

/// One published leaf in area 1 and a fresh assessment.
fn setup() -> (Portal, IndicatorId, AssessmentId) {
    let mut portal = Portal::new();
    portal.seed_default_areas().expect("seed");
    let draft = portal
        .create_draft(&MLGOO, GovernanceAreaId(1), "FAS", false, t0())
        .expect("draft");
    let mut tree = draft.tree.clone();
    let leaf = tree.add_node(None, "Budget utilization").expect("add");
    tree.update_node(
        &leaf,
        NodeUpdate {
            form_schema: Some(form()),
            calculation_schema: Some(calc("pct")),
            ..NodeUpdate::default()
        },
    )
    .expect("update");
    portal
        .save_draft(&MLGOO, draft.id, draft.version, tree, None, t0())
        .expect("save");
    portal.publish_draft(&MLGOO, draft.id, t0()).expect("publish");

    let indicator = portal.indicators(Some(GovernanceAreaId(1))).expect("rows")[0].id;
    let assessment = portal
        .create_assessment(&BLGU, "Poblacion", 2025, t0())
        .expect("assessment")
        .id;
    (portal, indicator, assessment)
}

// =============================================================================
// AUTHORING
// =============================================================================

#[test]
fn authoring_rejects_malformed_schemas() {
    let mut bad = form();
    bad.fields.push(FormField::TextInput(TextField {
        field_id: "Pct Value".into(),
        label: String::new(),
        required: false,
        help_text: None,
        min_length: None,
        max_length: None,
        placeholder: None,
    }));
    assert!(matches!(bad.validate(), Err(PortalError::InvalidSchema(_))));
    assert!(form().validate().is_ok());

    assert!(calc("pct").validate_against(&form()).is_ok());
    assert!(matches!(
        calc("missing").validate_against(&form()),
        Err(PortalError::InvalidSchema(_))
    ));
}

// =============================================================================
// SAVING
// =============================================================================

#[test]
fn partial_save_skips_required_but_checks_values() {
    let (mut portal, indicator, a) = setup();

    // Only one of two required fields answered
    portal
        .save_response(&BLGU, a, indicator, values(&[("pct", json!(60))]), t0())
        .expect("partial save");

    let err = portal
        .save_response(&BLGU, a, indicator, values(&[("pct", json!(140))]), t0())
        .expect_err("out of range");
    match err {
        PortalError::InvalidResponse(errors) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].field_id, "pct");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let err = portal
        .save_response(
            &BLGU,
            a,
            indicator,
            values(&[("pct", json!(60)), ("surprise", json!("x"))]),
            t0(),
        )
        .expect_err("unknown field");
    match err {
        PortalError::InvalidResponse(errors) => {
            assert_eq!(errors[0].code, FieldErrorCode::UnknownField);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // The rejected saves left the first answer in place
    let stored = portal.assessment(&BLGU, a).expect("load");
    assert_eq!(stored.responses[&indicator].values.get("pct"), Some(&json!(60)));
}

// =============================================================================
// SUBMITTING
// =============================================================================

#[test]
fn submit_requires_every_required_field() {
    let (mut portal, indicator, a) = setup();
    portal
        .save_response(&BLGU, a, indicator, values(&[("pct", json!(60))]), t0())
        .expect("save");

    match portal.submit(&BLGU, a, t0()) {
        Err(PortalError::Incomplete(codes)) => assert_eq!(codes, vec!["1.1".to_string()]),
        other => panic!("expected Incomplete, got {:?}", other),
    }

    portal
        .save_response(
            &BLGU,
            a,
            indicator,
            values(&[("pct", json!(60)), ("remarks", json!("posted"))]),
            t0(),
        )
        .expect("save");
    portal.submit(&BLGU, a, t0()).expect("submit");
}

#[test]
fn submission_runs_auto_calculation() {
    let (mut portal, indicator, a) = setup();
    portal
        .save_response(
            &BLGU,
            a,
            indicator,
            values(&[("pct", json!(60)), ("remarks", json!("below target"))]),
            t0(),
        )
        .expect("save");

    let before = portal.assessment(&BLGU, a).expect("load");
    assert!(before.responses[&indicator].auto_status.is_none());

    portal.submit(&BLGU, a, t0()).expect("submit");
    let after = portal.assessment(&BLGU, a).expect("load");
    let response = &after.responses[&indicator];
    assert!(response.is_complete);
    assert_eq!(response.auto_status, Some(ValidationStatus::Fail));
    assert_eq!(response.auto_score_percent, Some(0));
}
