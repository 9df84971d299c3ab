//! # Calculation Rules
//!
//! Auto-derivation of an indicator's status from submitted values.
//!
//! A [`CalculationSchema`] is a list of condition groups combined with
//! `group_operator`; each group combines its rules with its own operator.
//! Rules evaluate to a tri-state [`RuleOutcome`]:
//!
//! | Outcome      | Meaning                                   |
//! |--------------|-------------------------------------------|
//! | `Pass`       | condition met                             |
//! | `Considered` | met within an allowance (grace period)    |
//! | `Fail`       | condition not met, or field not answered  |
//!
//! The outcomes are ordered `Fail < Considered < Pass`, so AND is the
//! minimum and OR is the maximum. The final outcome maps to a
//! [`ValidationStatus`]: Pass to `output_status_on_pass`, Considered to
//! `Conditional`, Fail to `output_status_on_fail`.

use crate::form_schema::{FieldKind, FormSchema, ResponseData, is_blank, parse_date};
use crate::primitives::MAX_RULE_DEPTH;
use crate::{PortalError, ValidationStatus};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeSet;

// =============================================================================
// OPERATORS
// =============================================================================

/// Comparison applied between a field value and a rule operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "not_contains")]
    NotContains,
    #[serde(rename = "is_empty")]
    IsEmpty,
    #[serde(rename = "is_not_empty")]
    IsNotEmpty,
}

impl ComparisonOperator {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOperator::GreaterOrEqual => ">=",
            ComparisonOperator::Greater => ">",
            ComparisonOperator::LessOrEqual => "<=",
            ComparisonOperator::Less => "<",
            ComparisonOperator::Equal => "==",
            ComparisonOperator::NotEqual => "!=",
            ComparisonOperator::Contains => "contains",
            ComparisonOperator::NotContains => "not_contains",
            ComparisonOperator::IsEmpty => "is_empty",
            ComparisonOperator::IsNotEmpty => "is_not_empty",
        }
    }

    /// Operators that compare magnitudes (or equality of magnitudes).
    #[must_use]
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            ComparisonOperator::GreaterOrEqual
                | ComparisonOperator::Greater
                | ComparisonOperator::LessOrEqual
                | ComparisonOperator::Less
                | ComparisonOperator::Equal
                | ComparisonOperator::NotEqual
        )
    }

    /// Operators that take no operand.
    #[must_use]
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            ComparisonOperator::IsEmpty | ComparisonOperator::IsNotEmpty
        )
    }

    /// Apply to an ordering of `field` relative to `operand`.
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            ComparisonOperator::GreaterOrEqual => ordering != Ordering::Less,
            ComparisonOperator::Greater => ordering == Ordering::Greater,
            ComparisonOperator::LessOrEqual => ordering != Ordering::Greater,
            ComparisonOperator::Less => ordering == Ordering::Less,
            ComparisonOperator::Equal => ordering == Ordering::Equal,
            ComparisonOperator::NotEqual => ordering != Ordering::Equal,
            _ => false,
        }
    }
}

/// How a list of outcomes is combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// Tri-state result of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    Fail,
    Considered,
    Pass,
}

impl RuleOutcome {
    fn from_bool(b: bool) -> Self {
        if b { RuleOutcome::Pass } else { RuleOutcome::Fail }
    }

    /// Fold outcomes with `op`. An empty list fails.
    fn combine(op: LogicalOperator, outcomes: impl IntoIterator<Item = RuleOutcome>) -> Self {
        let mut iter = outcomes.into_iter();
        let Some(first) = iter.next() else {
            return RuleOutcome::Fail;
        };
        iter.fold(first, |acc, o| match op {
            LogicalOperator::And => acc.min(o),
            LogicalOperator::Or => acc.max(o),
        })
    }
}

// =============================================================================
// RULES
// =============================================================================

/// One calculation rule, tagged by `rule_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule_type", rename_all = "snake_case")]
pub enum CalculationRule {
    /// Compare a field value with a literal.
    FieldComparison {
        field_id: String,
        operator: ComparisonOperator,
        #[serde(default)]
        value: Value,
    },
    /// Compare a 0-100 number field with a percentage.
    PercentageThreshold {
        field_id: String,
        operator: ComparisonOperator,
        threshold: u8,
    },
    /// Compare the number of checked options with a count.
    CountThreshold {
        field_id: String,
        operator: ComparisonOperator,
        threshold: u32,
    },
    /// On time by `deadline` passes; within `grace_period_days` after it is considered.
    DateGracePeriod {
        field_id: String,
        deadline: NaiveDate,
        #[serde(default)]
        grace_period_days: u32,
    },
    AndAll { rules: Vec<CalculationRule> },
    OrAny { rules: Vec<CalculationRule> },
}

impl std::fmt::Display for CalculationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalculationRule::FieldComparison {
                field_id,
                operator,
                value,
            } => {
                if operator.is_unary() {
                    write!(f, "{} {}", field_id, operator.symbol())
                } else {
                    write!(f, "{} {} {}", field_id, operator.symbol(), value)
                }
            }
            CalculationRule::PercentageThreshold {
                field_id,
                operator,
                threshold,
            } => write!(f, "{} {} {}%", field_id, operator.symbol(), threshold),
            CalculationRule::CountThreshold {
                field_id,
                operator,
                threshold,
            } => write!(f, "count({}) {} {}", field_id, operator.symbol(), threshold),
            CalculationRule::DateGracePeriod {
                field_id,
                deadline,
                grace_period_days,
            } => write!(
                f,
                "{} on or before {} (+{} days grace)",
                field_id, deadline, grace_period_days
            ),
            CalculationRule::AndAll { rules } => write!(f, "all of {} rules", rules.len()),
            CalculationRule::OrAny { rules } => write!(f, "any of {} rules", rules.len()),
        }
    }
}

impl CalculationRule {
    fn collect_fields<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            CalculationRule::FieldComparison { field_id, .. }
            | CalculationRule::PercentageThreshold { field_id, .. }
            | CalculationRule::CountThreshold { field_id, .. }
            | CalculationRule::DateGracePeriod { field_id, .. } => {
                out.insert(field_id.as_str());
            }
            CalculationRule::AndAll { rules } | CalculationRule::OrAny { rules } => {
                for rule in rules {
                    rule.collect_fields(out);
                }
            }
        }
    }

    fn evaluate(
        &self,
        values: &ResponseData,
        path: &str,
        depth: usize,
        counts: &mut Counts,
        trace: &mut Vec<RuleTrace>,
    ) -> RuleOutcome {
        let outcome = match self {
            CalculationRule::AndAll { rules } | CalculationRule::OrAny { rules } => {
                if depth >= MAX_RULE_DEPTH {
                    RuleOutcome::Fail
                } else {
                    let op = if matches!(self, CalculationRule::AndAll { .. }) {
                        LogicalOperator::And
                    } else {
                        LogicalOperator::Or
                    };
                    let outcomes: Vec<_> = rules
                        .iter()
                        .enumerate()
                        .map(|(i, r)| {
                            r.evaluate(values, &format!("{}.{}", path, i), depth + 1, counts, trace)
                        })
                        .collect();
                    RuleOutcome::combine(op, outcomes)
                }
            }
            leaf => {
                let outcome = leaf.evaluate_leaf(values);
                counts.record(outcome);
                outcome
            }
        };
        trace.push(RuleTrace {
            path: path.to_string(),
            description: self.to_string(),
            outcome,
        });
        outcome
    }

    fn evaluate_leaf(&self, values: &ResponseData) -> RuleOutcome {
        match self {
            CalculationRule::FieldComparison {
                field_id,
                operator,
                value,
            } => {
                let field_value = values.get(field_id).filter(|v| !is_blank(v));
                match (operator, field_value) {
                    (ComparisonOperator::IsEmpty, v) => RuleOutcome::from_bool(v.is_none()),
                    (ComparisonOperator::IsNotEmpty, v) => RuleOutcome::from_bool(v.is_some()),
                    (_, None) => RuleOutcome::Fail,
                    (op, Some(actual)) => RuleOutcome::from_bool(compare(*op, actual, value)),
                }
            }
            CalculationRule::PercentageThreshold {
                field_id,
                operator,
                threshold,
            } => {
                let actual = values.get(field_id).and_then(as_number);
                let ordering =
                    actual.and_then(|a| a.partial_cmp(&f64::from(*threshold)));
                RuleOutcome::from_bool(ordering.is_some_and(|o| operator.holds(o)))
            }
            CalculationRule::CountThreshold {
                field_id,
                operator,
                threshold,
            } => {
                let count = values.get(field_id).and_then(Value::as_array).map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<BTreeSet<_>>()
                        .len()
                });
                let ordering = count.map(|c| (c as u64).cmp(&u64::from(*threshold)));
                RuleOutcome::from_bool(ordering.is_some_and(|o| operator.holds(o)))
            }
            CalculationRule::DateGracePeriod {
                field_id,
                deadline,
                grace_period_days,
            } => {
                let Some(date) = values.get(field_id).and_then(parse_date) else {
                    return RuleOutcome::Fail;
                };
                if date <= *deadline {
                    return RuleOutcome::Pass;
                }
                let within_grace = deadline
                    .checked_add_days(Days::new(u64::from(*grace_period_days)))
                    .is_none_or(|end| date <= end);
                if within_grace {
                    RuleOutcome::Considered
                } else {
                    RuleOutcome::Fail
                }
            }
            CalculationRule::AndAll { .. } | CalculationRule::OrAny { .. } => RuleOutcome::Fail,
        }
    }

    fn lint(&self, form: &FormSchema, path: &str, depth: usize, issues: &mut Vec<String>) {
        let check_field = |field_id: &str, allowed: &[FieldKind], issues: &mut Vec<String>| {
            match form.field(field_id) {
                None => issues.push(format!("{}: unknown field '{}'", path, field_id)),
                Some(field) if !allowed.contains(&field.kind()) => issues.push(format!(
                    "{}: field '{}' ({}) cannot be used here",
                    path,
                    field_id,
                    field.type_name()
                )),
                Some(_) => {}
            }
        };

        match self {
            CalculationRule::FieldComparison {
                field_id,
                operator,
                value,
            } => {
                let allowed: &[FieldKind] = match operator {
                    ComparisonOperator::IsEmpty | ComparisonOperator::IsNotEmpty => &[
                        FieldKind::Text,
                        FieldKind::Number,
                        FieldKind::MultiChoice,
                        FieldKind::SingleChoice,
                        FieldKind::Date,
                    ],
                    ComparisonOperator::Contains | ComparisonOperator::NotContains => {
                        &[FieldKind::Text, FieldKind::MultiChoice]
                    }
                    ComparisonOperator::Equal | ComparisonOperator::NotEqual => &[
                        FieldKind::Text,
                        FieldKind::Number,
                        FieldKind::SingleChoice,
                        FieldKind::Date,
                    ],
                    _ => &[FieldKind::Number, FieldKind::Date],
                };
                check_field(field_id, allowed, issues);
                if !operator.is_unary() && value.is_null() {
                    issues.push(format!("{}: operator {} needs a value", path, operator.symbol()));
                }
            }
            CalculationRule::PercentageThreshold {
                field_id,
                operator,
                threshold,
            } => {
                check_field(field_id, &[FieldKind::Number], issues);
                if *threshold > 100 {
                    issues.push(format!("{}: percentage {} exceeds 100", path, threshold));
                }
                if !operator.is_ordering() {
                    issues.push(format!("{}: {} is not a numeric operator", path, operator.symbol()));
                }
            }
            CalculationRule::CountThreshold {
                field_id, operator, ..
            } => {
                check_field(field_id, &[FieldKind::MultiChoice], issues);
                if !operator.is_ordering() {
                    issues.push(format!("{}: {} is not a numeric operator", path, operator.symbol()));
                }
            }
            CalculationRule::DateGracePeriod { field_id, .. } => {
                check_field(field_id, &[FieldKind::Date], issues);
            }
            CalculationRule::AndAll { rules } | CalculationRule::OrAny { rules } => {
                if depth >= MAX_RULE_DEPTH {
                    issues.push(format!("{}: rules nested deeper than {}", path, MAX_RULE_DEPTH));
                    return;
                }
                if rules.is_empty() {
                    issues.push(format!("{}: nested rule list is empty", path));
                }
                for (i, rule) in rules.iter().enumerate() {
                    rule.lint(form, &format!("{}.{}", path, i), depth + 1, issues);
                }
            }
        }
    }
}

/// Only JSON numbers count; `number_input` rejects numeric strings on save.
fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn compare(op: ComparisonOperator, actual: &Value, operand: &Value) -> bool {
    match op {
        ComparisonOperator::Contains => contains(actual, operand),
        ComparisonOperator::NotContains => !contains(actual, operand),
        ComparisonOperator::IsEmpty | ComparisonOperator::IsNotEmpty => false,
        _ => {
            if let (Some(a), Some(b)) = (as_number(actual), as_number(operand)) {
                return a.partial_cmp(&b).is_some_and(|o| op.holds(o));
            }
            if let (Some(a), Some(b)) = (parse_date(actual), parse_date(operand)) {
                return op.holds(a.cmp(&b));
            }
            match op {
                ComparisonOperator::Equal => loose_eq(actual, operand),
                ComparisonOperator::NotEqual => !loose_eq(actual, operand),
                _ => false,
            }
        }
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a.as_str(), b.as_str()) {
        (Some(x), Some(y)) => x.trim() == y.trim(),
        _ => a == b,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        Value::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        _ => false,
    }
}

// =============================================================================
// SCHEMA
// =============================================================================

/// Rules combined with one logical operator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionGroup {
    #[serde(default)]
    pub operator: LogicalOperator,
    #[serde(default)]
    pub rules: Vec<CalculationRule>,
}

fn default_pass() -> ValidationStatus {
    ValidationStatus::Pass
}

fn default_fail() -> ValidationStatus {
    ValidationStatus::Fail
}

/// Calculation schema attached to an indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationSchema {
    #[serde(default)]
    pub condition_groups: Vec<ConditionGroup>,
    #[serde(default)]
    pub group_operator: LogicalOperator,
    #[serde(default = "default_pass")]
    pub output_status_on_pass: ValidationStatus,
    #[serde(default = "default_fail")]
    pub output_status_on_fail: ValidationStatus,
}

impl Default for CalculationSchema {
    fn default() -> Self {
        Self {
            condition_groups: Vec::new(),
            group_operator: LogicalOperator::And,
            output_status_on_pass: ValidationStatus::Pass,
            output_status_on_fail: ValidationStatus::Fail,
        }
    }
}

/// One evaluated rule, for explaining a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTrace {
    /// `group.rule[.nested...]` position, e.g. `0.2.1`.
    pub path: String,
    pub description: String,
    pub outcome: RuleOutcome,
}

/// Result of evaluating a calculation schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub status: ValidationStatus,
    pub outcome: RuleOutcome,
    /// Leaf rules that passed outright.
    pub rules_passed: usize,
    /// Leaf rules that were only considered.
    pub rules_considered: usize,
    pub rules_total: usize,
    pub trace: Vec<RuleTrace>,
}

impl Evaluation {
    /// Share of leaf rules passed, in whole percent.
    #[must_use]
    pub fn score_percent(&self) -> u8 {
        if self.rules_total == 0 {
            return 0;
        }
        (self.rules_passed.saturating_mul(100) / self.rules_total) as u8
    }
}

#[derive(Default)]
struct Counts {
    passed: usize,
    considered: usize,
    total: usize,
}

impl Counts {
    fn record(&mut self, outcome: RuleOutcome) {
        self.total += 1;
        match outcome {
            RuleOutcome::Pass => self.passed += 1,
            RuleOutcome::Considered => self.considered += 1,
            RuleOutcome::Fail => {}
        }
    }
}

impl CalculationSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Builder
    // -------------------------------------------------------------------------

    /// Append an empty group and return its index.
    pub fn add_group(&mut self, operator: LogicalOperator) -> usize {
        self.condition_groups.push(ConditionGroup {
            operator,
            rules: Vec::new(),
        });
        self.condition_groups.len() - 1
    }

    pub fn remove_group(&mut self, group: usize) -> Result<ConditionGroup, PortalError> {
        if group >= self.condition_groups.len() {
            return Err(PortalError::InvalidSchema(format!("no condition group {}", group)));
        }
        Ok(self.condition_groups.remove(group))
    }

    pub fn add_rule(&mut self, group: usize, rule: CalculationRule) -> Result<(), PortalError> {
        self.condition_groups
            .get_mut(group)
            .ok_or_else(|| PortalError::InvalidSchema(format!("no condition group {}", group)))?
            .rules
            .push(rule);
        Ok(())
    }

    pub fn remove_rule(
        &mut self,
        group: usize,
        index: usize,
    ) -> Result<CalculationRule, PortalError> {
        let rules = &mut self
            .condition_groups
            .get_mut(group)
            .ok_or_else(|| PortalError::InvalidSchema(format!("no condition group {}", group)))?
            .rules;
        if index >= rules.len() {
            return Err(PortalError::InvalidSchema(format!(
                "no rule {} in group {}",
                index, group
            )));
        }
        Ok(rules.remove(index))
    }

    /// Every field id the schema reads.
    #[must_use]
    pub fn referenced_fields(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        for group in &self.condition_groups {
            for rule in &group.rules {
                rule.collect_fields(&mut out);
            }
        }
        out
    }

    // -------------------------------------------------------------------------
    // Lint
    // -------------------------------------------------------------------------

    /// Problems with this schema relative to the form it reads from.
    #[must_use]
    pub fn lint_against(&self, form: &FormSchema) -> Vec<String> {
        let mut issues = Vec::new();
        if self.condition_groups.is_empty() {
            issues.push("at least one condition group is required".to_string());
        }
        for (g, group) in self.condition_groups.iter().enumerate() {
            if group.rules.is_empty() {
                issues.push(format!("{}: condition group is empty", g));
            }
            for (r, rule) in group.rules.iter().enumerate() {
                rule.lint(form, &format!("{}.{}", g, r), 1, &mut issues);
            }
        }
        issues
    }

    pub fn validate_against(&self, form: &FormSchema) -> Result<(), PortalError> {
        let issues = self.lint_against(form);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(PortalError::InvalidSchema(issues.join("; ")))
        }
    }

    // -------------------------------------------------------------------------
    // Evaluation
    // -------------------------------------------------------------------------

    /// Evaluate against submitted values.
    #[must_use]
    pub fn evaluate(&self, values: &ResponseData) -> Evaluation {
        let mut counts = Counts::default();
        let mut trace = Vec::new();

        let group_outcomes: Vec<RuleOutcome> = self
            .condition_groups
            .iter()
            .enumerate()
            .map(|(g, group)| {
                let outcomes: Vec<RuleOutcome> = group
                    .rules
                    .iter()
                    .enumerate()
                    .map(|(r, rule)| {
                        rule.evaluate(values, &format!("{}.{}", g, r), 1, &mut counts, &mut trace)
                    })
                    .collect();
                RuleOutcome::combine(group.operator, outcomes)
            })
            .collect();

        let outcome = RuleOutcome::combine(self.group_operator, group_outcomes);
        let status = match outcome {
            RuleOutcome::Pass => self.output_status_on_pass,
            RuleOutcome::Considered => ValidationStatus::Conditional,
            RuleOutcome::Fail => self.output_status_on_fail,
        };

        Evaluation {
            status,
            outcome,
            rules_passed: counts.passed,
            rules_considered: counts.considered,
            rules_total: counts.total,
            trace,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
