//! # Published Indicators
//!
//! The flat, versioned form of an indicator hierarchy as assessments see it.
//! Drafts are edited as trees (see [`crate::tree`]) and published into
//! these rows; every content change bumps `version` and archives the
//! previous row as an [`IndicatorRevision`].

use crate::calculation::CalculationSchema;
use crate::form_schema::FormSchema;
use crate::{GovernanceAreaId, IndicatorId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// GOVERNANCE AREAS
// =============================================================================

/// Whether an area is mandatory under the "3+1" rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaType {
    Core,
    Essential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceArea {
    pub id: GovernanceAreaId,
    pub code: String,
    pub name: String,
    pub area_type: AreaType,
}

impl GovernanceArea {
    #[must_use]
    pub fn new(id: u64, code: &str, name: &str, area_type: AreaType) -> Self {
        Self {
            id: GovernanceAreaId(id),
            code: code.to_string(),
            name: name.to_string(),
            area_type,
        }
    }

    /// The six SGLGB governance areas: three core, three essential.
    #[must_use]
    pub fn sglgb_defaults() -> Vec<Self> {
        vec![
            Self::new(1, "FAS", "Financial Administration and Sustainability", AreaType::Core),
            Self::new(2, "DP", "Disaster Preparedness", AreaType::Core),
            Self::new(3, "SPO", "Safety, Peace and Order", AreaType::Core),
            Self::new(4, "SPS", "Social Protection and Sensitivity", AreaType::Essential),
            Self::new(5, "BFC", "Business-Friendliness and Competitiveness", AreaType::Essential),
            Self::new(6, "EM", "Environmental Management", AreaType::Essential),
        ]
    }
}

// =============================================================================
// INDICATORS
// =============================================================================

/// One published indicator row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub id: IndicatorId,
    pub governance_area_id: GovernanceAreaId,
    /// Hierarchical code such as `1.2.3`.
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parent_id: Option<IndicatorId>,
    /// Position among siblings.
    pub order: u32,
    pub form_schema: Option<FormSchema>,
    pub calculation_schema: Option<CalculationSchema>,
    pub is_active: bool,
    pub version: u32,
    pub updated_at: DateTime<Utc>,
}

impl Indicator {
    /// Whether anything other than identity and bookkeeping differs.
    #[must_use]
    pub fn content_differs(&self, other: &Indicator) -> bool {
        self.governance_area_id != other.governance_area_id
            || self.code != other.code
            || self.name != other.name
            || self.description != other.description
            || self.parent_id != other.parent_id
            || self.order != other.order
            || self.form_schema != other.form_schema
            || self.calculation_schema != other.calculation_schema
            || self.is_active != other.is_active
    }
}

/// An archived indicator version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRevision {
    pub indicator_id: IndicatorId,
    pub version: u32,
    pub snapshot: Indicator,
    pub archived_by: UserId,
    pub archived_at: DateTime<Utc>,
}

/// Active indicators that have no active children, in code order.
///
/// These are the indicators a BLGU answers and a reviewer assesses.
#[must_use]
pub fn answerable_leaves(indicators: &[Indicator]) -> Vec<&Indicator> {
    let parents: BTreeSet<IndicatorId> = indicators
        .iter()
        .filter(|i| i.is_active)
        .filter_map(|i| i.parent_id)
        .collect();
    let mut leaves: Vec<&Indicator> = indicators
        .iter()
        .filter(|i| i.is_active && !parents.contains(&i.id))
        .collect();
    leaves.sort_by(|a, b| compare_codes(&a.code, &b.code));
    leaves
}

/// Order `1.10` after `1.9`.
#[must_use]
pub fn compare_codes(a: &str, b: &str) -> std::cmp::Ordering {
    let parse = |s: &str| -> Vec<u64> { s.split('.').map(|p| p.parse().unwrap_or(u64::MAX)).collect() };
    parse(a).cmp(&parse(b)).then_with(|| a.cmp(b))
}
