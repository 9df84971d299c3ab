//! # Property-Based Tests
//!
//! Invariants of the indicator tree, the rule engine and scoring that must
//! hold for any input.

use proptest::collection::vec;
use proptest::prelude::*;
use serde_json::json;
use sglgb_core::calculation::{ConditionGroup, LogicalOperator, RuleOutcome};
use sglgb_core::scoring::aggregate;
use sglgb_core::{
    CalculationRule, CalculationSchema, ComparisonOperator, IndicatorTree, NodeKey, ResponseData,
    ValidationStatus,
};
use std::collections::BTreeSet;

/// Each entry adds one node: under an earlier node picked by index, or as
/// a root. Parents at the depth limit are skipped.
fn build_tree(shape: &[Option<usize>]) -> (IndicatorTree, Vec<NodeKey>) {
    let mut tree = IndicatorTree::new("1");
    let mut keys: Vec<NodeKey> = Vec::new();
    for (i, parent) in shape.iter().enumerate() {
        let parent_key = parent
            .and_then(|p| keys.get(p % keys.len().max(1)).cloned())
            .filter(|k| tree.depth(k) + 1 < sglgb_core::primitives::MAX_TREE_DEPTH);
        let key = tree
            .add_node(parent_key.as_ref(), format!("Node {}", i))
            .expect("add");
        keys.push(key);
    }
    (tree, keys)
}

fn status_strategy() -> impl Strategy<Value = ValidationStatus> {
    prop_oneof![
        Just(ValidationStatus::Pass),
        Just(ValidationStatus::Fail),
        Just(ValidationStatus::Conditional),
    ]
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Preorder visits every node exactly once and codes are unique.
    #[test]
    fn preorder_covers_tree_with_unique_codes(shape in vec(proptest::option::of(0usize..50), 1..40)) {
        let (tree, keys) = build_tree(&shape);
        let order = tree.preorder();
        prop_assert_eq!(order.len(), keys.len());
        let unique: BTreeSet<&NodeKey> = order.iter().collect();
        prop_assert_eq!(unique.len(), keys.len());

        let codes: BTreeSet<String> = order
            .iter()
            .map(|k| tree.node(k).expect("node").code.clone())
            .collect();
        prop_assert_eq!(codes.len(), keys.len());
        prop_assert!(tree.check_integrity().is_ok());
    }

    /// A child's code extends its parent's code by one segment.
    #[test]
    fn child_codes_extend_parent(shape in vec(proptest::option::of(0usize..50), 1..40)) {
        let (tree, keys) = build_tree(&shape);
        for key in &keys {
            let node = tree.node(key).expect("node");
            if let Some(parent) = &node.parent {
                let parent_code = &tree.node(parent).expect("parent").code;
                let prefix = format!("{}.", parent_code);
                prop_assert!(node.code.starts_with(&prefix));
                prop_assert!(!node.code[prefix.len()..].contains('.'));
            }
        }
    }

    /// Deleting a node removes exactly its subtree.
    #[test]
    fn delete_removes_subtree(
        shape in vec(proptest::option::of(0usize..50), 1..30),
        pick in 0usize..30,
    ) {
        let (mut tree, keys) = build_tree(&shape);
        let victim = keys[pick % keys.len()].clone();
        let subtree: BTreeSet<NodeKey> = tree.subtree(&victim).into_iter().collect();
        let removed = tree.delete_node(&victim).expect("delete");
        prop_assert_eq!(removed.len(), subtree.len());
        prop_assert_eq!(tree.len(), keys.len() - subtree.len());
        for key in &subtree {
            prop_assert!(tree.get(key).is_none());
        }
        prop_assert!(tree.check_integrity().is_ok());
    }

    /// Moving a node under its own subtree is always refused.
    #[test]
    fn move_into_own_subtree_refused(
        shape in vec(proptest::option::of(0usize..50), 2..30),
        pick in 0usize..30,
    ) {
        let (mut tree, keys) = build_tree(&shape);
        let node = keys[pick % keys.len()].clone();
        for target in tree.subtree(&node) {
            prop_assert!(tree.move_node(&node, Some(&target), 0).is_err());
        }
        prop_assert!(tree.check_integrity().is_ok());
    }

    /// Fail dominates aggregation; no Fail and some Conditional gives Conditional.
    #[test]
    fn aggregate_precedence(statuses in vec(status_strategy(), 1..20)) {
        let result = aggregate(statuses.iter().copied()).expect("non-empty");
        if statuses.contains(&ValidationStatus::Fail) {
            prop_assert_eq!(result, ValidationStatus::Fail);
        } else if statuses.contains(&ValidationStatus::Conditional) {
            prop_assert_eq!(result, ValidationStatus::Conditional);
        } else {
            prop_assert_eq!(result, ValidationStatus::Pass);
        }
    }

    /// A percentage threshold passes exactly when the value reaches it.
    #[test]
    fn percentage_threshold_matches_comparison(value in 0u64..=100, threshold in 0u8..=100) {
        let schema = CalculationSchema {
            condition_groups: vec![ConditionGroup {
                operator: LogicalOperator::And,
                rules: vec![CalculationRule::PercentageThreshold {
                    field_id: "pct".into(),
                    operator: ComparisonOperator::GreaterOrEqual,
                    threshold,
                }],
            }],
            ..CalculationSchema::default()
        };
        let mut values = ResponseData::new();
        values.insert("pct".into(), json!(value));
        let evaluation = schema.evaluate(&values);
        let expected = if value >= u64::from(threshold) {
            RuleOutcome::Pass
        } else {
            RuleOutcome::Fail
        };
        prop_assert_eq!(evaluation.outcome, expected);
        prop_assert!(evaluation.score_percent() <= 100);
    }

    /// Evaluation is deterministic.
    #[test]
    fn evaluation_is_deterministic(value in 0u64..=100, threshold in 0u8..=100) {
        let schema = CalculationSchema {
            condition_groups: vec![ConditionGroup {
                operator: LogicalOperator::Or,
                rules: vec![
                    CalculationRule::PercentageThreshold {
                        field_id: "pct".into(),
                        operator: ComparisonOperator::Less,
                        threshold,
                    },
                    CalculationRule::FieldComparison {
                        field_id: "pct".into(),
                        operator: ComparisonOperator::Equal,
                        value: json!(value),
                    },
                ],
            }],
            ..CalculationSchema::default()
        };
        let mut values = ResponseData::new();
        values.insert("pct".into(), json!(value));
        prop_assert_eq!(schema.evaluate(&values), schema.evaluate(&values));
    }
}
