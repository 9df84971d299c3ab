//! # Calculation Benchmarks
//!
//! Rule evaluation, tree status derivation and area scoring.
//!
//! Run with: `cargo bench -p sglgb-core`

use chrono::{DateTime, NaiveDate, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::json;
use sglgb_core::calculation::{ConditionGroup, LogicalOperator};
use sglgb_core::form_schema::{FormField, NumberField};
use sglgb_core::scoring::score_assessment;
use sglgb_core::{
    CalculationRule, CalculationSchema, ComparisonOperator, FormSchema, GovernanceArea,
    GovernanceAreaId, Indicator, IndicatorId, IndicatorTree, NodeUpdate, ResponseData,
    ValidationStatus,
};
use std::collections::BTreeMap;
use std::hint::black_box;

/// `groups` OR-ed groups of three AND-ed rules each.
fn schema(groups: usize) -> CalculationSchema {
    let deadline = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap_or_default();
    CalculationSchema {
        condition_groups: (0..groups)
            .map(|g| ConditionGroup {
                operator: LogicalOperator::And,
                rules: vec![
                    CalculationRule::PercentageThreshold {
                        field_id: format!("pct_{}", g),
                        operator: ComparisonOperator::GreaterOrEqual,
                        threshold: 75,
                    },
                    CalculationRule::CountThreshold {
                        field_id: "checks".into(),
                        operator: ComparisonOperator::GreaterOrEqual,
                        threshold: 2,
                    },
                    CalculationRule::DateGracePeriod {
                        field_id: "posted".into(),
                        deadline,
                        grace_period_days: 15,
                    },
                ],
            })
            .collect(),
        group_operator: LogicalOperator::Or,
        ..CalculationSchema::default()
    }
}

fn values(groups: usize) -> ResponseData {
    let mut values = ResponseData::new();
    for g in 0..groups {
        values.insert(format!("pct_{}", g), json!(50 + g % 50));
    }
    values.insert("checks".into(), json!(["a", "b", "c"]));
    values.insert("posted".into(), json!("2025-04-10"));
    values
}

/// Balanced tree with `fanout` children per node, three levels deep.
fn tree(fanout: usize) -> IndicatorTree {
    let form = FormSchema::with_fields(vec![FormField::NumberInput(NumberField {
        field_id: "pct".into(),
        label: "Percent".into(),
        required: true,
        help_text: None,
        min_value: Some(0.0),
        max_value: Some(100.0),
        allow_decimal: false,
    })]);
    let mut tree = IndicatorTree::new("1");
    for i in 0..fanout {
        let a = tree.add_node(None, format!("A{}", i)).expect("add");
        for j in 0..fanout {
            let b = tree.add_node(Some(&a), format!("B{}", j)).expect("add");
            for k in 0..fanout {
                let c = tree.add_node(Some(&b), format!("C{}", k)).expect("add");
                tree.update_node(
                    &c,
                    NodeUpdate {
                        form_schema: Some(form.clone()),
                        ..NodeUpdate::default()
                    },
                )
                .expect("update");
            }
        }
    }
    tree
}

fn flat_indicators(per_area: u64) -> Vec<Indicator> {
    let mut rows = Vec::new();
    for area in 1..=6u64 {
        for i in 0..per_area {
            rows.push(Indicator {
                id: IndicatorId(area * 10_000 + i),
                governance_area_id: GovernanceAreaId(area),
                code: format!("{}.{}", area, i + 1),
                name: format!("Indicator {}", i),
                description: String::new(),
                parent_id: None,
                order: i as u32,
                form_schema: None,
                calculation_schema: None,
                is_active: true,
                version: 1,
                updated_at: DateTime::<Utc>::UNIX_EPOCH,
            });
        }
    }
    rows
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");

    for groups in [1, 10, 50].iter() {
        let schema = schema(*groups);
        let values = values(*groups);
        group.bench_with_input(BenchmarkId::from_parameter(groups), groups, |b, _| {
            b.iter(|| black_box(schema.evaluate(&values)));
        });
    }

    group.finish();
}

fn bench_tree_statuses(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_statuses");

    for fanout in [3, 6, 10].iter() {
        let tree = tree(*fanout);
        group.bench_with_input(BenchmarkId::from_parameter(fanout), fanout, |b, _| {
            b.iter(|| black_box(tree.completion_summary()));
        });
    }

    group.finish();
}

fn bench_score_assessment(c: &mut Criterion) {
    let mut group = c.benchmark_group("score_assessment");
    let areas = GovernanceArea::sglgb_defaults();

    for per_area in [10, 100, 500].iter() {
        let rows = flat_indicators(*per_area);
        let verdicts: BTreeMap<IndicatorId, ValidationStatus> = rows
            .iter()
            .map(|r| (r.id, ValidationStatus::Pass))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(per_area), per_area, |b, _| {
            b.iter(|| black_box(score_assessment(&areas, &rows, &verdicts)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_evaluate,
    bench_tree_statuses,
    bench_score_assessment,
);
criterion_main!(benches);
