//! # Storage
//!
//! The [`PortalStore`] trait is the seam between the portal service and its
//! persistence. Two backends implement it:
//! - [`MemoryStore`]: `BTreeMap`s, volatile, used by tests and `--memory`.
//! - [`RedbStore`]: redb database, ACID, records stored as JSON bytes.
//!
//! Stores are dumb: they load and save whole records. All rules live in the
//! domain modules and in [`crate::Portal`].

mod redb_store;

pub use redb_store::RedbStore;

use crate::assessment::Assessment;
use crate::draft::IndicatorDraft;
use crate::indicator::{GovernanceArea, Indicator, IndicatorRevision};
use crate::{AssessmentId, DraftId, GovernanceAreaId, IndicatorId, PortalError};
use std::collections::BTreeMap;

/// Monotonic id sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IdSequence {
    Indicator,
    Draft,
    Assessment,
    Mov,
}

impl IdSequence {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            IdSequence::Indicator => "next_indicator_id",
            IdSequence::Draft => "next_draft_id",
            IdSequence::Assessment => "next_assessment_id",
            IdSequence::Mov => "next_mov_id",
        }
    }
}

/// Everything a publish writes, committed together.
#[derive(Debug, Clone)]
pub struct PublishBatch {
    pub indicators: Vec<Indicator>,
    pub revisions: Vec<IndicatorRevision>,
    pub draft: IndicatorDraft,
}

/// Imported areas and indicators, committed together with the indicator
/// sequence bump.
#[derive(Debug, Clone, Default)]
pub struct ImportBatch {
    pub areas: Vec<GovernanceArea>,
    pub indicators: Vec<Indicator>,
}

impl ImportBatch {
    /// Highest indicator id in the batch, or 0.
    #[must_use]
    pub fn max_indicator_id(&self) -> u64 {
        self.indicators.iter().map(|i| i.id.0).max().unwrap_or(0)
    }
}

fn sequence_exhausted(seq: IdSequence) -> PortalError {
    PortalError::IoError(format!("{} exhausted", seq.as_str()))
}

/// Record storage for the portal.
///
/// Listing methods return records in id order.
pub trait PortalStore {
    fn get_area(&self, id: GovernanceAreaId) -> Result<Option<GovernanceArea>, PortalError>;
    fn put_area(&mut self, area: &GovernanceArea) -> Result<(), PortalError>;
    fn areas(&self) -> Result<Vec<GovernanceArea>, PortalError>;

    fn get_indicator(&self, id: IndicatorId) -> Result<Option<Indicator>, PortalError>;
    fn put_indicator(&mut self, indicator: &Indicator) -> Result<(), PortalError>;
    fn indicators(&self) -> Result<Vec<Indicator>, PortalError>;
    /// Archived versions of one indicator, oldest first.
    fn revisions(&self, id: IndicatorId) -> Result<Vec<IndicatorRevision>, PortalError>;

    fn get_draft(&self, id: DraftId) -> Result<Option<IndicatorDraft>, PortalError>;
    fn put_draft(&mut self, draft: &IndicatorDraft) -> Result<(), PortalError>;
    /// Returns whether a draft was removed.
    fn delete_draft(&mut self, id: DraftId) -> Result<bool, PortalError>;
    fn drafts(&self) -> Result<Vec<IndicatorDraft>, PortalError>;

    fn get_assessment(&self, id: AssessmentId) -> Result<Option<Assessment>, PortalError>;
    fn put_assessment(&mut self, assessment: &Assessment) -> Result<(), PortalError>;
    fn assessments(&self) -> Result<Vec<Assessment>, PortalError>;

    /// Allocate the next id of a sequence. Ids start at 1.
    fn next_id(&mut self, seq: IdSequence) -> Result<u64, PortalError>;

    /// Make sure the next id issued is above `last`. Never moves a
    /// sequence backwards.
    fn advance_sequence(&mut self, seq: IdSequence, last: u64) -> Result<(), PortalError>;

    /// Write a publish atomically.
    fn commit_publish(&mut self, batch: &PublishBatch) -> Result<(), PortalError>;

    /// Write an import atomically, advancing the indicator sequence past
    /// every imported id.
    fn commit_import(&mut self, batch: &ImportBatch) -> Result<(), PortalError>;
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// Volatile store backed by `BTreeMap`s.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    areas: BTreeMap<GovernanceAreaId, GovernanceArea>,
    indicators: BTreeMap<IndicatorId, Indicator>,
    revisions: BTreeMap<(IndicatorId, u32), IndicatorRevision>,
    drafts: BTreeMap<DraftId, IndicatorDraft>,
    assessments: BTreeMap<AssessmentId, Assessment>,
    sequences: BTreeMap<IdSequence, u64>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PortalStore for MemoryStore {
    fn get_area(&self, id: GovernanceAreaId) -> Result<Option<GovernanceArea>, PortalError> {
        Ok(self.areas.get(&id).cloned())
    }

    fn put_area(&mut self, area: &GovernanceArea) -> Result<(), PortalError> {
        self.areas.insert(area.id, area.clone());
        Ok(())
    }

    fn areas(&self) -> Result<Vec<GovernanceArea>, PortalError> {
        Ok(self.areas.values().cloned().collect())
    }

    fn get_indicator(&self, id: IndicatorId) -> Result<Option<Indicator>, PortalError> {
        Ok(self.indicators.get(&id).cloned())
    }

    fn put_indicator(&mut self, indicator: &Indicator) -> Result<(), PortalError> {
        self.indicators.insert(indicator.id, indicator.clone());
        Ok(())
    }

    fn indicators(&self) -> Result<Vec<Indicator>, PortalError> {
        Ok(self.indicators.values().cloned().collect())
    }

    fn revisions(&self, id: IndicatorId) -> Result<Vec<IndicatorRevision>, PortalError> {
        Ok(self
            .revisions
            .range((id, 0)..=(id, u32::MAX))
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn get_draft(&self, id: DraftId) -> Result<Option<IndicatorDraft>, PortalError> {
        Ok(self.drafts.get(&id).cloned())
    }

    fn put_draft(&mut self, draft: &IndicatorDraft) -> Result<(), PortalError> {
        self.drafts.insert(draft.id, draft.clone());
        Ok(())
    }

    fn delete_draft(&mut self, id: DraftId) -> Result<bool, PortalError> {
        Ok(self.drafts.remove(&id).is_some())
    }

    fn drafts(&self) -> Result<Vec<IndicatorDraft>, PortalError> {
        Ok(self.drafts.values().cloned().collect())
    }

    fn get_assessment(&self, id: AssessmentId) -> Result<Option<Assessment>, PortalError> {
        Ok(self.assessments.get(&id).cloned())
    }

    fn put_assessment(&mut self, assessment: &Assessment) -> Result<(), PortalError> {
        self.assessments.insert(assessment.id, assessment.clone());
        Ok(())
    }

    fn assessments(&self) -> Result<Vec<Assessment>, PortalError> {
        Ok(self.assessments.values().cloned().collect())
    }

    fn next_id(&mut self, seq: IdSequence) -> Result<u64, PortalError> {
        let counter = self.sequences.entry(seq).or_insert(0);
        *counter = counter.checked_add(1).ok_or_else(|| sequence_exhausted(seq))?;
        Ok(*counter)
    }

    fn advance_sequence(&mut self, seq: IdSequence, last: u64) -> Result<(), PortalError> {
        let counter = self.sequences.entry(seq).or_insert(0);
        *counter = (*counter).max(last);
        Ok(())
    }

    fn commit_publish(&mut self, batch: &PublishBatch) -> Result<(), PortalError> {
        for revision in &batch.revisions {
            self.revisions.insert(
                (revision.indicator_id, revision.version),
                revision.clone(),
            );
        }
        for indicator in &batch.indicators {
            self.indicators.insert(indicator.id, indicator.clone());
        }
        self.drafts.insert(batch.draft.id, batch.draft.clone());
        Ok(())
    }

    fn commit_import(&mut self, batch: &ImportBatch) -> Result<(), PortalError> {
        for area in &batch.areas {
            self.areas.insert(area.id, area.clone());
        }
        for indicator in &batch.indicators {
            self.indicators.insert(indicator.id, indicator.clone());
        }
        self.advance_sequence(IdSequence::Indicator, batch.max_indicator_id())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_are_independent() {
        let mut store = MemoryStore::new();
        assert_eq!(store.next_id(IdSequence::Draft).expect("id"), 1);
        assert_eq!(store.next_id(IdSequence::Draft).expect("id"), 2);
        assert_eq!(store.next_id(IdSequence::Assessment).expect("id"), 1);
    }

    #[test]
    fn advance_never_moves_backwards() {
        let mut store = MemoryStore::new();
        store.advance_sequence(IdSequence::Mov, 40).expect("advance");
        store.advance_sequence(IdSequence::Mov, 7).expect("advance");
        assert_eq!(store.next_id(IdSequence::Mov).expect("id"), 41);
    }

    #[test]
    fn exhausted_sequence_is_an_error() {
        let mut store = MemoryStore::new();
        store
            .advance_sequence(IdSequence::Indicator, u64::MAX)
            .expect("advance");
        assert!(matches!(
            store.next_id(IdSequence::Indicator),
            Err(PortalError::IoError(_))
        ));
    }

    #[test]
    fn areas_listed_in_id_order() {
        let mut store = MemoryStore::new();
        for area in GovernanceArea::sglgb_defaults().into_iter().rev() {
            store.put_area(&area).expect("put");
        }
        let ids: Vec<u64> = store.areas().expect("areas").iter().map(|a| a.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    }
}
