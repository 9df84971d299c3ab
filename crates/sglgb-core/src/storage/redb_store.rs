//! # redb-backed Portal Storage
//!
//! A disk-backed [`PortalStore`] using the redb embedded database:
//! - ACID transactions (a publish lands completely or not at all)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Records are stored as JSON bytes. Form fields and calculation rules are
//! internally tagged enums carrying free-form JSON values, which only a
//! self-describing format can read back.

use super::{IdSequence, ImportBatch, PortalStore, PublishBatch, sequence_exhausted};
use crate::assessment::Assessment;
use crate::draft::IndicatorDraft;
use crate::indicator::{GovernanceArea, Indicator, IndicatorRevision};
use crate::{AssessmentId, DraftId, GovernanceAreaId, IndicatorId, PortalError};
use redb::{Database, ReadableDatabase, ReadableTable, Table, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

type RecordTable = TableDefinition<'static, u64, &'static [u8]>;

/// Table for governance areas: GovernanceAreaId(u64) -> JSON
const AREAS: RecordTable = TableDefinition::new("areas");

/// Table for published indicators: IndicatorId(u64) -> JSON
const INDICATORS: RecordTable = TableDefinition::new("indicators");

/// Table for archived indicator versions: (IndicatorId, version) -> JSON
const REVISIONS: TableDefinition<(u64, u32), &[u8]> = TableDefinition::new("indicator_revisions");

/// Table for drafts: DraftId(u64) -> JSON
const DRAFTS: RecordTable = TableDefinition::new("drafts");

/// Table for assessments: AssessmentId(u64) -> JSON
const ASSESSMENTS: RecordTable = TableDefinition::new("assessments");

/// Table for id sequences: name -> last issued id
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, PortalError> {
    serde_json::to_vec(value).map_err(|e| PortalError::SerializationError(e.to_string()))
}

/// Raise a sequence to at least `last` inside an open write transaction.
fn raise_sequence(
    table: &mut Table<'_, &'static str, u64>,
    seq: IdSequence,
    last: u64,
) -> Result<(), PortalError> {
    let current = table
        .get(seq.as_str())
        .map_err(|e| PortalError::IoError(e.to_string()))?
        .map(|v| v.value())
        .unwrap_or(0);
    if last > current {
        table
            .insert(seq.as_str(), last)
            .map_err(|e| PortalError::IoError(e.to_string()))?;
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PortalError> {
    serde_json::from_slice(bytes).map_err(|e| PortalError::SerializationError(e.to_string()))
}

/// A disk-backed portal store using redb.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a portal database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PortalError> {
        let db =
            Database::create(path.as_ref()).map_err(|e| PortalError::IoError(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| PortalError::IoError(e.to_string()))?;
            for def in [AREAS, INDICATORS, DRAFTS, ASSESSMENTS] {
                let _ = write_txn
                    .open_table(def)
                    .map_err(|e| PortalError::IoError(e.to_string()))?;
            }
            let _ = write_txn
                .open_table(REVISIONS)
                .map_err(|e| PortalError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(SEQUENCES)
                .map_err(|e| PortalError::IoError(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| PortalError::IoError(e.to_string()))?;
        }

        Ok(Self { db })
    }

    fn get_record<T: DeserializeOwned>(
        &self,
        def: RecordTable,
        id: u64,
    ) -> Result<Option<T>, PortalError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| PortalError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(def)
            .map_err(|e| PortalError::IoError(e.to_string()))?;

        match table
            .get(id)
            .map_err(|e| PortalError::IoError(e.to_string()))?
        {
            Some(data) => decode(data.value()).map(Some),
            None => Ok(None),
        }
    }

    fn put_record<T: Serialize>(
        &mut self,
        def: RecordTable,
        id: u64,
        value: &T,
    ) -> Result<(), PortalError> {
        let bytes = encode(value)?;
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| PortalError::IoError(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(def)
                .map_err(|e| PortalError::IoError(e.to_string()))?;
            table
                .insert(id, bytes.as_slice())
                .map_err(|e| PortalError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| PortalError::IoError(e.to_string()))?;
        Ok(())
    }

    /// All records of a table in key order.
    fn all_records<T: DeserializeOwned>(&self, def: RecordTable) -> Result<Vec<T>, PortalError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| PortalError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(def)
            .map_err(|e| PortalError::IoError(e.to_string()))?;

        let mut out = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| PortalError::IoError(e.to_string()))?
        {
            let (_, value) = entry.map_err(|e| PortalError::IoError(e.to_string()))?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }
}

impl PortalStore for RedbStore {
    fn get_area(&self, id: GovernanceAreaId) -> Result<Option<GovernanceArea>, PortalError> {
        self.get_record(AREAS, id.0)
    }

    fn put_area(&mut self, area: &GovernanceArea) -> Result<(), PortalError> {
        self.put_record(AREAS, area.id.0, area)
    }

    fn areas(&self) -> Result<Vec<GovernanceArea>, PortalError> {
        self.all_records(AREAS)
    }

    fn get_indicator(&self, id: IndicatorId) -> Result<Option<Indicator>, PortalError> {
        self.get_record(INDICATORS, id.0)
    }

    fn put_indicator(&mut self, indicator: &Indicator) -> Result<(), PortalError> {
        self.put_record(INDICATORS, indicator.id.0, indicator)
    }

    fn indicators(&self) -> Result<Vec<Indicator>, PortalError> {
        self.all_records(INDICATORS)
    }

    fn revisions(&self, id: IndicatorId) -> Result<Vec<IndicatorRevision>, PortalError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| PortalError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(REVISIONS)
            .map_err(|e| PortalError::IoError(e.to_string()))?;

        let mut out = Vec::new();
        for entry in table
            .range((id.0, 0u32)..=(id.0, u32::MAX))
            .map_err(|e| PortalError::IoError(e.to_string()))?
        {
            let (_, value) = entry.map_err(|e| PortalError::IoError(e.to_string()))?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }

    fn get_draft(&self, id: DraftId) -> Result<Option<IndicatorDraft>, PortalError> {
        self.get_record(DRAFTS, id.0)
    }

    fn put_draft(&mut self, draft: &IndicatorDraft) -> Result<(), PortalError> {
        self.put_record(DRAFTS, draft.id.0, draft)
    }

    fn delete_draft(&mut self, id: DraftId) -> Result<bool, PortalError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| PortalError::IoError(e.to_string()))?;
        let removed = {
            let mut table = write_txn
                .open_table(DRAFTS)
                .map_err(|e| PortalError::IoError(e.to_string()))?;
            table
                .remove(id.0)
                .map_err(|e| PortalError::IoError(e.to_string()))?
                .is_some()
        };
        write_txn
            .commit()
            .map_err(|e| PortalError::IoError(e.to_string()))?;
        Ok(removed)
    }

    fn drafts(&self) -> Result<Vec<IndicatorDraft>, PortalError> {
        self.all_records(DRAFTS)
    }

    fn get_assessment(&self, id: AssessmentId) -> Result<Option<Assessment>, PortalError> {
        self.get_record(ASSESSMENTS, id.0)
    }

    fn put_assessment(&mut self, assessment: &Assessment) -> Result<(), PortalError> {
        self.put_record(ASSESSMENTS, assessment.id.0, assessment)
    }

    fn assessments(&self) -> Result<Vec<Assessment>, PortalError> {
        self.all_records(ASSESSMENTS)
    }

    fn next_id(&mut self, seq: IdSequence) -> Result<u64, PortalError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| PortalError::IoError(e.to_string()))?;
        let next = {
            let mut table = write_txn
                .open_table(SEQUENCES)
                .map_err(|e| PortalError::IoError(e.to_string()))?;
            let current = table
                .get(seq.as_str())
                .map_err(|e| PortalError::IoError(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(0);
            let next = current.checked_add(1).ok_or_else(|| sequence_exhausted(seq))?;
            table
                .insert(seq.as_str(), next)
                .map_err(|e| PortalError::IoError(e.to_string()))?;
            next
        };
        write_txn
            .commit()
            .map_err(|e| PortalError::IoError(e.to_string()))?;
        Ok(next)
    }

    fn advance_sequence(&mut self, seq: IdSequence, last: u64) -> Result<(), PortalError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| PortalError::IoError(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(SEQUENCES)
                .map_err(|e| PortalError::IoError(e.to_string()))?;
            raise_sequence(&mut table, seq, last)?;
        }
        write_txn
            .commit()
            .map_err(|e| PortalError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Revisions, indicator rows and the closed draft in one transaction.
    fn commit_publish(&mut self, batch: &PublishBatch) -> Result<(), PortalError> {
        // Encode everything before opening the transaction.
        let revisions: Vec<((u64, u32), Vec<u8>)> = batch
            .revisions
            .iter()
            .map(|r| Ok(((r.indicator_id.0, r.version), encode(r)?)))
            .collect::<Result<_, PortalError>>()?;
        let indicators: Vec<(u64, Vec<u8>)> = batch
            .indicators
            .iter()
            .map(|i| Ok((i.id.0, encode(i)?)))
            .collect::<Result<_, PortalError>>()?;
        let draft = encode(&batch.draft)?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| PortalError::IoError(e.to_string()))?;
        {
            let mut rev_table = write_txn
                .open_table(REVISIONS)
                .map_err(|e| PortalError::IoError(e.to_string()))?;
            for (key, bytes) in &revisions {
                rev_table
                    .insert(*key, bytes.as_slice())
                    .map_err(|e| PortalError::IoError(e.to_string()))?;
            }

            let mut ind_table = write_txn
                .open_table(INDICATORS)
                .map_err(|e| PortalError::IoError(e.to_string()))?;
            for (id, bytes) in &indicators {
                ind_table
                    .insert(*id, bytes.as_slice())
                    .map_err(|e| PortalError::IoError(e.to_string()))?;
            }

            let mut draft_table = write_txn
                .open_table(DRAFTS)
                .map_err(|e| PortalError::IoError(e.to_string()))?;
            draft_table
                .insert(batch.draft.id.0, draft.as_slice())
                .map_err(|e| PortalError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| PortalError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Areas, indicator rows and the sequence bump in one transaction.
    fn commit_import(&mut self, batch: &ImportBatch) -> Result<(), PortalError> {
        let areas: Vec<(u64, Vec<u8>)> = batch
            .areas
            .iter()
            .map(|a| Ok((a.id.0, encode(a)?)))
            .collect::<Result<_, PortalError>>()?;
        let indicators: Vec<(u64, Vec<u8>)> = batch
            .indicators
            .iter()
            .map(|i| Ok((i.id.0, encode(i)?)))
            .collect::<Result<_, PortalError>>()?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| PortalError::IoError(e.to_string()))?;
        {
            for (def, rows) in [(AREAS, &areas), (INDICATORS, &indicators)] {
                let mut table = write_txn
                    .open_table(def)
                    .map_err(|e| PortalError::IoError(e.to_string()))?;
                for (id, bytes) in rows {
                    table
                        .insert(*id, bytes.as_slice())
                        .map_err(|e| PortalError::IoError(e.to_string()))?;
                }
            }
            let mut seq_table = write_txn
                .open_table(SEQUENCES)
                .map_err(|e| PortalError::IoError(e.to_string()))?;
            raise_sequence(&mut seq_table, IdSequence::Indicator, batch.max_indicator_id())?;
        }
        write_txn
            .commit()
            .map_err(|e| PortalError::IoError(e.to_string()))?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
