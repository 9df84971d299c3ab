//! # SGLGB Scoring
//!
//! Rolls per-indicator verdicts up to parent indicators, governance areas
//! and the overall "3+1" result: a barangay passes when it passes every
//! core area and at least one essential area.

use crate::indicator::{AreaType, GovernanceArea, Indicator, answerable_leaves, compare_codes};
use crate::{GovernanceAreaId, IndicatorId, ValidationStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Combine child verdicts: any Fail fails, else any Conditional is
/// Conditional, else Pass. `None` when there is nothing to combine.
#[must_use]
pub fn aggregate(statuses: impl IntoIterator<Item = ValidationStatus>) -> Option<ValidationStatus> {
    let mut seen = false;
    let mut conditional = false;
    for status in statuses {
        seen = true;
        match status {
            ValidationStatus::Fail => return Some(ValidationStatus::Fail),
            ValidationStatus::Conditional => conditional = true,
            ValidationStatus::Pass => {}
        }
    }
    match (seen, conditional) {
        (false, _) => None,
        (true, true) => Some(ValidationStatus::Conditional),
        (true, false) => Some(ValidationStatus::Pass),
    }
}

/// Verdict of every indicator: leaves from `verdicts`, parents aggregated
/// from their active children. Leaves without a verdict stay absent and
/// make their ancestors absent too.
#[must_use]
pub fn rollup(
    indicators: &[Indicator],
    verdicts: &BTreeMap<IndicatorId, ValidationStatus>,
) -> BTreeMap<IndicatorId, ValidationStatus> {
    let mut children: BTreeMap<IndicatorId, Vec<IndicatorId>> = BTreeMap::new();
    for ind in indicators.iter().filter(|i| i.is_active) {
        if let Some(parent) = ind.parent_id {
            children.entry(parent).or_default().push(ind.id);
        }
    }

    fn resolve(
        id: IndicatorId,
        children: &BTreeMap<IndicatorId, Vec<IndicatorId>>,
        verdicts: &BTreeMap<IndicatorId, ValidationStatus>,
        out: &mut BTreeMap<IndicatorId, Option<ValidationStatus>>,
        depth: usize,
    ) -> Option<ValidationStatus> {
        if let Some(done) = out.get(&id) {
            return *done;
        }
        let status = match children.get(&id) {
            None => verdicts.get(&id).copied(),
            Some(_) if depth > crate::primitives::MAX_TREE_DEPTH => None,
            Some(kids) => {
                let resolved: Option<Vec<ValidationStatus>> = kids
                    .iter()
                    .map(|k| resolve(*k, children, verdicts, out, depth + 1))
                    .collect();
                resolved.and_then(aggregate)
            }
        };
        out.insert(id, status);
        status
    }

    let mut out = BTreeMap::new();
    for ind in indicators.iter().filter(|i| i.is_active) {
        resolve(ind.id, &children, verdicts, &mut out, 0);
    }
    out.into_iter()
        .filter_map(|(id, s)| s.map(|s| (id, s)))
        .collect()
}

// =============================================================================
// RESULTS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaResult {
    pub governance_area_id: GovernanceAreaId,
    pub code: String,
    pub name: String,
    pub area_type: AreaType,
    pub passed: bool,
    pub leaves_total: usize,
    pub leaves_passing: usize,
    /// Leaves with a Fail verdict.
    pub failing: Vec<String>,
    /// Leaves with no verdict yet.
    pub unassessed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub areas: Vec<AreaResult>,
    pub core_passed: usize,
    pub core_total: usize,
    pub essential_passed: usize,
    pub essential_total: usize,
    /// All core areas and at least one essential area passed.
    pub passed: bool,
}

/// Score one area. An area with no answerable indicators does not pass.
#[must_use]
pub fn score_area(
    area: &GovernanceArea,
    indicators: &[Indicator],
    verdicts: &BTreeMap<IndicatorId, ValidationStatus>,
) -> AreaResult {
    let in_area: Vec<Indicator> = indicators
        .iter()
        .filter(|i| i.governance_area_id == area.id)
        .cloned()
        .collect();
    let leaves = answerable_leaves(&in_area);

    let mut failing = Vec::new();
    let mut unassessed = Vec::new();
    let mut passing = 0usize;
    for leaf in &leaves {
        match verdicts.get(&leaf.id) {
            Some(s) if s.is_passing() => passing += 1,
            Some(_) => failing.push(leaf.code.clone()),
            None => unassessed.push(leaf.code.clone()),
        }
    }

    AreaResult {
        governance_area_id: area.id,
        code: area.code.clone(),
        name: area.name.clone(),
        area_type: area.area_type,
        passed: !leaves.is_empty() && passing == leaves.len(),
        leaves_total: leaves.len(),
        leaves_passing: passing,
        failing,
        unassessed,
    }
}

/// Apply the "3+1" rule across all areas.
#[must_use]
pub fn score_assessment(
    areas: &[GovernanceArea],
    indicators: &[Indicator],
    verdicts: &BTreeMap<IndicatorId, ValidationStatus>,
) -> AssessmentResult {
    let mut results: Vec<AreaResult> = areas
        .iter()
        .map(|a| score_area(a, indicators, verdicts))
        .collect();
    results.sort_by(|a, b| {
        a.governance_area_id
            .cmp(&b.governance_area_id)
            .then_with(|| compare_codes(&a.code, &b.code))
    });

    let count = |t: AreaType, only_passed: bool| {
        results
            .iter()
            .filter(|r| r.area_type == t && (!only_passed || r.passed))
            .count()
    };
    let core_total = count(AreaType::Core, false);
    let core_passed = count(AreaType::Core, true);
    let essential_total = count(AreaType::Essential, false);
    let essential_passed = count(AreaType::Essential, true);

    AssessmentResult {
        passed: core_passed == core_total && essential_passed >= 1,
        areas: results,
        core_passed,
        core_total,
        essential_passed,
        essential_total,
    }
}
