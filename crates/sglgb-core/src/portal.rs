//! # Portal Service
//!
//! The [`Portal`] is the single entry point the app layer talks to. Each
//! operation loads records from the store, applies a domain method, and
//! writes the result back. Authorization by role happens here or in the
//! domain method it delegates to.
//!
//! ## Storage Backends
//!
//! - `InMemory`: [`MemoryStore`] (fast, volatile)
//! - `Persistent`: [`RedbStore`] (disk-backed, ACID)
//!
//! Time is always passed in, which keeps every operation reproducible in
//! tests.

use crate::assessment::{Assessment, AssessmentStatus, FinalVerdict};
use crate::draft::{DraftLock, DraftStatus, IndicatorDraft};
use crate::form_schema::ResponseData;
use crate::formats::IndicatorBundle;
use crate::indicator::{GovernanceArea, Indicator, IndicatorRevision, answerable_leaves, compare_codes};
use crate::mov::{MovFile, NewMov};
use crate::primitives::{DEFAULT_LOCK_TTL_MINUTES, DEFAULT_MAX_MOV_BYTES};
use crate::scoring::{AssessmentResult, rollup, score_assessment};
use crate::storage::{IdSequence, ImportBatch, MemoryStore, PortalStore, PublishBatch, RedbStore};
use crate::tree::IndicatorTree;
use crate::{
    Actor, AssessmentId, DraftId, GovernanceAreaId, IndicatorId, MovId, NodeKey, PortalError, Role,
    ValidationStatus,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Storage backend for a Portal.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory maps (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

/// Runtime limits the portal enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortalSettings {
    pub lock_ttl: Duration,
    pub max_mov_bytes: u64,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::minutes(DEFAULT_LOCK_TTL_MINUTES),
            max_mov_bytes: DEFAULT_MAX_MOV_BYTES,
        }
    }
}

/// What a publish did to the indicator table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReport {
    pub created: Vec<IndicatorId>,
    pub updated: Vec<IndicatorId>,
    pub unchanged: Vec<IndicatorId>,
    /// Previously published indicators missing from the draft.
    pub deactivated: Vec<IndicatorId>,
}

/// Scored view of an assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentReport {
    pub assessment_id: AssessmentId,
    pub status: AssessmentStatus,
    /// Verdict of every indicator, parents included.
    pub indicators: BTreeMap<IndicatorId, ValidationStatus>,
    pub result: AssessmentResult,
}

/// Record counts, for status output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalStats {
    pub areas: usize,
    pub indicators: usize,
    pub active_indicators: usize,
    pub drafts: usize,
    pub assessments: usize,
}

/// The assessment portal service.
#[derive(Debug, Default)]
pub struct Portal {
    backend: StorageBackend,
    settings: PortalSettings,
}

impl Portal {
    /// Create a portal with in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a portal with persistent redb storage at `path`.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, PortalError> {
        Ok(Self {
            backend: StorageBackend::Persistent(RedbStore::open(path)?),
            settings: PortalSettings::default(),
        })
    }

    #[must_use]
    pub fn with_settings(mut self, settings: PortalSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn settings(&self) -> PortalSettings {
        self.settings
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    fn store(&self) -> &dyn PortalStore {
        match &self.backend {
            StorageBackend::InMemory(s) => s,
            StorageBackend::Persistent(s) => s,
        }
    }

    fn store_mut(&mut self) -> &mut dyn PortalStore {
        match &mut self.backend {
            StorageBackend::InMemory(s) => s,
            StorageBackend::Persistent(s) => s,
        }
    }

    pub fn stats(&self) -> Result<PortalStats, PortalError> {
        let indicators = self.store().indicators()?;
        Ok(PortalStats {
            areas: self.store().areas()?.len(),
            active_indicators: indicators.iter().filter(|i| i.is_active).count(),
            indicators: indicators.len(),
            drafts: self.store().drafts()?.len(),
            assessments: self.store().assessments()?.len(),
        })
    }

    // =========================================================================
    // GOVERNANCE AREAS
    // =========================================================================

    /// Insert the six SGLGB areas when no area exists yet. Returns how many
    /// were inserted.
    pub fn seed_default_areas(&mut self) -> Result<usize, PortalError> {
        if !self.store().areas()?.is_empty() {
            return Ok(0);
        }
        let defaults = GovernanceArea::sglgb_defaults();
        for area in &defaults {
            self.store_mut().put_area(area)?;
        }
        Ok(defaults.len())
    }

    pub fn areas(&self) -> Result<Vec<GovernanceArea>, PortalError> {
        self.store().areas()
    }

    pub fn area(&self, id: GovernanceAreaId) -> Result<GovernanceArea, PortalError> {
        self.store().get_area(id)?.ok_or(PortalError::AreaNotFound(id))
    }

    /// Create or replace an area.
    pub fn put_area(&mut self, actor: &Actor, area: GovernanceArea) -> Result<(), PortalError> {
        actor.require(&[Role::MlgooDilg], "manage governance areas")?;
        if area.code.trim().is_empty() || area.name.trim().is_empty() {
            return Err(PortalError::InvalidSchema(
                "area code and name are required".to_string(),
            ));
        }
        self.store_mut().put_area(&area)
    }

    // =========================================================================
    // INDICATORS
    // =========================================================================

    /// Published indicators in code order, optionally for one area.
    pub fn indicators(
        &self,
        area: Option<GovernanceAreaId>,
    ) -> Result<Vec<Indicator>, PortalError> {
        let mut rows: Vec<Indicator> = self
            .store()
            .indicators()?
            .into_iter()
            .filter(|i| area.is_none_or(|a| i.governance_area_id == a))
            .collect();
        rows.sort_by(|a, b| {
            a.governance_area_id
                .cmp(&b.governance_area_id)
                .then_with(|| compare_codes(&a.code, &b.code))
        });
        Ok(rows)
    }

    pub fn indicator(&self, id: IndicatorId) -> Result<Indicator, PortalError> {
        self.store()
            .get_indicator(id)?
            .ok_or(PortalError::IndicatorNotFound(id))
    }

    pub fn indicator_history(&self, id: IndicatorId) -> Result<Vec<IndicatorRevision>, PortalError> {
        self.indicator(id)?;
        self.store().revisions(id)
    }

    /// Published indicators of an area rebuilt as a tree.
    pub fn indicator_tree(&self, area: GovernanceAreaId) -> Result<IndicatorTree, PortalError> {
        self.area(area)?;
        IndicatorTree::from_indicators(area.to_string(), &self.indicators(Some(area))?)
    }

    // =========================================================================
    // DRAFTS
    // =========================================================================

    fn load_draft(&self, id: DraftId) -> Result<IndicatorDraft, PortalError> {
        self.store()
            .get_draft(id)?
            .ok_or(PortalError::DraftNotFound(id))
    }

    fn update_draft<T>(
        &mut self,
        actor: &Actor,
        id: DraftId,
        f: impl FnOnce(&mut IndicatorDraft) -> Result<T, PortalError>,
    ) -> Result<T, PortalError> {
        actor.require(&[Role::MlgooDilg], "edit indicator drafts")?;
        let mut draft = self.load_draft(id)?;
        let out = f(&mut draft)?;
        self.store_mut().put_draft(&draft)?;
        Ok(out)
    }

    /// Start a draft for an area, optionally seeded from its published
    /// indicators. The creator holds the lock.
    pub fn create_draft(
        &mut self,
        actor: &Actor,
        area: GovernanceAreaId,
        title: impl Into<String>,
        from_published: bool,
        now: DateTime<Utc>,
    ) -> Result<IndicatorDraft, PortalError> {
        actor.require(&[Role::MlgooDilg], "create indicator drafts")?;
        self.area(area)?;
        let tree = if from_published {
            self.indicator_tree(area)?
        } else {
            IndicatorTree::new(area.to_string())
        };
        let id = DraftId(self.store_mut().next_id(IdSequence::Draft)?);
        let mut draft = IndicatorDraft::new(id, area, title, actor.user_id, tree, now);
        draft.acquire_lock(actor.user_id, now, self.settings.lock_ttl)?;
        self.store_mut().put_draft(&draft)?;
        Ok(draft)
    }

    pub fn draft(&self, id: DraftId) -> Result<IndicatorDraft, PortalError> {
        self.load_draft(id)
    }

    pub fn drafts(&self, area: Option<GovernanceAreaId>) -> Result<Vec<IndicatorDraft>, PortalError> {
        Ok(self
            .store()
            .drafts()?
            .into_iter()
            .filter(|d| area.is_none_or(|a| d.governance_area_id == a))
            .collect())
    }

    pub fn lock_draft(
        &mut self,
        actor: &Actor,
        id: DraftId,
        now: DateTime<Utc>,
    ) -> Result<DraftLock, PortalError> {
        let ttl = self.settings.lock_ttl;
        self.update_draft(actor, id, |d| d.acquire_lock(actor.user_id, now, ttl))
    }

    pub fn unlock_draft(
        &mut self,
        actor: &Actor,
        id: DraftId,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, PortalError> {
        self.update_draft(actor, id, |d| d.release_lock(actor.user_id, force, now))
    }

    pub fn save_draft(
        &mut self,
        actor: &Actor,
        id: DraftId,
        expected_version: u64,
        tree: IndicatorTree,
        current_step: Option<u8>,
        now: DateTime<Utc>,
    ) -> Result<u64, PortalError> {
        self.update_draft(actor, id, |d| {
            d.save(actor.user_id, expected_version, tree, current_step, now)
        })
    }

    pub fn mark_draft_ready(
        &mut self,
        actor: &Actor,
        id: DraftId,
        now: DateTime<Utc>,
    ) -> Result<(), PortalError> {
        self.update_draft(actor, id, |d| d.mark_ready(actor.user_id, now))
    }

    /// Delete a draft. Someone else's active lock blocks deletion.
    pub fn delete_draft(
        &mut self,
        actor: &Actor,
        id: DraftId,
        now: DateTime<Utc>,
    ) -> Result<(), PortalError> {
        actor.require(&[Role::MlgooDilg], "delete indicator drafts")?;
        let draft = self.load_draft(id)?;
        if let Some(lock) = draft.active_lock(now) {
            if lock.holder != actor.user_id {
                return Err(PortalError::DraftLocked {
                    holder: lock.holder,
                });
            }
        }
        self.store_mut().delete_draft(id)?;
        Ok(())
    }

    /// Turn a draft into published indicator rows.
    ///
    /// Nodes without a `server_id` become new indicators. Existing ones are
    /// rewritten, and when their content changed the old row is archived
    /// and `version` goes up. Published indicators of the area that are no
    /// longer in the tree are deactivated, never deleted. Like every other
    /// draft mutation, publishing requires the caller's lock.
    pub fn publish_draft(
        &mut self,
        actor: &Actor,
        id: DraftId,
        now: DateTime<Utc>,
    ) -> Result<PublishReport, PortalError> {
        actor.require(&[Role::MlgooDilg], "publish indicators")?;
        let mut draft = self.load_draft(id)?;
        match draft.status {
            DraftStatus::InProgress => draft.mark_ready(actor.user_id, now)?,
            DraftStatus::ReadyForReview => draft.require_lock(actor.user_id, now)?,
            DraftStatus::Completed => {
                return Err(PortalError::InvalidTransition {
                    from: DraftStatus::Completed.as_str().to_string(),
                    action: "publish".to_string(),
                });
            }
        }

        let area = draft.governance_area_id;
        let existing: BTreeMap<IndicatorId, Indicator> = self
            .store()
            .indicators()?
            .into_iter()
            .map(|i| (i.id, i))
            .collect();

        // Resolve an id for every node first so parents can be referenced.
        let order = draft.tree.preorder();
        let mut ids: BTreeMap<NodeKey, IndicatorId> = BTreeMap::new();
        for key in &order {
            let node = draft.tree.node(key)?;
            let id = match node.server_id {
                Some(sid) => {
                    match existing.get(&sid) {
                        Some(row) if row.governance_area_id == area => {}
                        Some(_) => {
                            return Err(PortalError::InvalidSchema(format!(
                                "indicator {} belongs to another area",
                                sid
                            )));
                        }
                        None => return Err(PortalError::IndicatorNotFound(sid)),
                    }
                    sid
                }
                None => IndicatorId(self.store_mut().next_id(IdSequence::Indicator)?),
            };
            ids.insert(key.clone(), id);
        }

        let mut report = PublishReport::default();
        let mut rows = Vec::with_capacity(order.len());
        let mut revisions = Vec::new();
        let archive = |row: &Indicator| IndicatorRevision {
            indicator_id: row.id,
            version: row.version,
            snapshot: row.clone(),
            archived_by: actor.user_id,
            archived_at: now,
        };

        for key in &order {
            let node = draft.tree.node(key)?;
            let id = ids.get(key).copied().ok_or_else(|| PortalError::NodeNotFound(key.clone()))?;
            let parent_id = node.parent.as_ref().and_then(|p| ids.get(p).copied());
            let siblings = match &node.parent {
                Some(p) => &draft.tree.node(p)?.children,
                None => &draft.tree.roots,
            };
            let position = siblings.iter().position(|k| k == key).unwrap_or(0);

            let mut row = Indicator {
                id,
                governance_area_id: area,
                code: node.code.clone(),
                name: node.name.clone(),
                description: node.description.clone(),
                parent_id,
                order: position as u32,
                form_schema: node.form_schema.clone(),
                calculation_schema: node.calculation_schema.clone(),
                is_active: node.is_active,
                version: 1,
                updated_at: now,
            };

            match existing.get(&id) {
                None => report.created.push(id),
                Some(old) if old.content_differs(&row) => {
                    revisions.push(archive(old));
                    row.version = old.version + 1;
                    report.updated.push(id);
                }
                Some(old) => {
                    row = old.clone();
                    report.unchanged.push(id);
                }
            }
            rows.push(row);
        }

        let kept: BTreeSet<IndicatorId> = ids.values().copied().collect();
        for old in existing
            .values()
            .filter(|i| i.governance_area_id == area && i.is_active && !kept.contains(&i.id))
        {
            revisions.push(archive(old));
            let mut row = old.clone();
            row.is_active = false;
            row.version = old.version + 1;
            row.updated_at = now;
            report.deactivated.push(row.id);
            rows.push(row);
        }

        for (key, id) in &ids {
            if let Some(node) = draft.tree.nodes.get_mut(key) {
                node.server_id = Some(*id);
            }
        }
        draft.mark_completed(actor.user_id, now)?;

        self.store_mut().commit_publish(&PublishBatch {
            indicators: rows,
            revisions,
            draft,
        })?;
        Ok(report)
    }

    // =========================================================================
    // ASSESSMENTS
    // =========================================================================

    fn load_assessment(&self, id: AssessmentId) -> Result<Assessment, PortalError> {
        self.store()
            .get_assessment(id)?
            .ok_or(PortalError::AssessmentNotFound(id))
    }

    fn update_assessment<T>(
        &mut self,
        actor: &Actor,
        id: AssessmentId,
        f: impl FnOnce(&mut Assessment, &[Indicator]) -> Result<T, PortalError>,
    ) -> Result<T, PortalError> {
        let mut assessment = self.load_assessment(id)?;
        if !assessment.visible_to(actor) {
            return Err(PortalError::AssessmentNotFound(id));
        }
        let indicators = self.store().indicators()?;
        let out = f(&mut assessment, &indicators)?;
        self.store_mut().put_assessment(&assessment)?;
        Ok(out)
    }

    /// An answerable (active leaf) indicator.
    fn answerable(indicators: &[Indicator], id: IndicatorId) -> Result<&Indicator, PortalError> {
        answerable_leaves(indicators)
            .into_iter()
            .find(|i| i.id == id)
            .ok_or(PortalError::IndicatorNotFound(id))
    }

    pub fn create_assessment(
        &mut self,
        actor: &Actor,
        barangay: impl Into<String>,
        assessment_year: i32,
        now: DateTime<Utc>,
    ) -> Result<Assessment, PortalError> {
        actor.require(&[Role::BlguUser], "start an assessment")?;
        let barangay = barangay.into();
        if barangay.trim().is_empty() {
            return Err(PortalError::InvalidSchema("barangay is required".to_string()));
        }
        let id = AssessmentId(self.store_mut().next_id(IdSequence::Assessment)?);
        let assessment = Assessment::new(id, actor.user_id, barangay, assessment_year, now);
        self.store_mut().put_assessment(&assessment)?;
        Ok(assessment)
    }

    /// Load an assessment the actor may see. BLGU users see only their own;
    /// they never see internal feedback.
    pub fn assessment(&self, actor: &Actor, id: AssessmentId) -> Result<Assessment, PortalError> {
        let mut assessment = self.load_assessment(id)?;
        if !assessment.visible_to(actor) {
            return Err(PortalError::AssessmentNotFound(id));
        }
        if actor.role == Role::BlguUser {
            assessment.feedback.retain(|f| !f.is_internal);
        }
        Ok(assessment)
    }

    pub fn assessments(&self, actor: &Actor) -> Result<Vec<Assessment>, PortalError> {
        Ok(self
            .store()
            .assessments()?
            .into_iter()
            .filter(|a| a.visible_to(actor))
            .collect())
    }

    pub fn save_response(
        &mut self,
        actor: &Actor,
        id: AssessmentId,
        indicator_id: IndicatorId,
        values: ResponseData,
        now: DateTime<Utc>,
    ) -> Result<(), PortalError> {
        self.update_assessment(actor, id, |a, inds| {
            a.save_response(actor, Self::answerable(inds, indicator_id)?, values, now)
        })
    }

    pub fn attach_mov(
        &mut self,
        actor: &Actor,
        id: AssessmentId,
        upload: NewMov,
        now: DateTime<Utc>,
    ) -> Result<MovFile, PortalError> {
        let mut assessment = self.load_assessment(id)?;
        if !assessment.visible_to(actor) {
            return Err(PortalError::AssessmentNotFound(id));
        }
        let indicators = self.store().indicators()?;
        let indicator = Self::answerable(&indicators, upload.indicator_id)?;
        let max_bytes = self.settings.max_mov_bytes;
        assessment.check_mov(actor, indicator, &upload, max_bytes)?;

        let mov_id = MovId(self.store_mut().next_id(IdSequence::Mov)?);
        let file = assessment.attach_mov(actor, indicator, upload, mov_id, max_bytes, now)?;
        self.store_mut().put_assessment(&assessment)?;
        Ok(file)
    }

    pub fn remove_mov(
        &mut self,
        actor: &Actor,
        id: AssessmentId,
        mov_id: MovId,
        now: DateTime<Utc>,
    ) -> Result<MovFile, PortalError> {
        self.update_assessment(actor, id, |a, inds| a.remove_mov(actor, mov_id, inds, now))
    }

    pub fn submit(&mut self, actor: &Actor, id: AssessmentId, now: DateTime<Utc>) -> Result<(), PortalError> {
        self.update_assessment(actor, id, |a, inds| a.submit(actor, inds, now))
    }

    pub fn resubmit(&mut self, actor: &Actor, id: AssessmentId, now: DateTime<Utc>) -> Result<(), PortalError> {
        self.update_assessment(actor, id, |a, inds| a.resubmit(actor, inds, now))
    }

    pub fn start_review(&mut self, actor: &Actor, id: AssessmentId, now: DateTime<Utc>) -> Result<(), PortalError> {
        self.update_assessment(actor, id, |a, _| a.start_review(actor, now))
    }

    pub fn assess_response(
        &mut self,
        actor: &Actor,
        id: AssessmentId,
        indicator_id: IndicatorId,
        status: ValidationStatus,
        remarks: Option<String>,
        needs_rework: bool,
        now: DateTime<Utc>,
    ) -> Result<(), PortalError> {
        self.update_assessment(actor, id, |a, _| {
            a.assess_response(actor, indicator_id, status, remarks, needs_rework, now)
        })
    }

    pub fn add_feedback(
        &mut self,
        actor: &Actor,
        id: AssessmentId,
        indicator_id: Option<IndicatorId>,
        comment: String,
        is_internal: bool,
        now: DateTime<Utc>,
    ) -> Result<(), PortalError> {
        self.update_assessment(actor, id, |a, _| {
            a.add_feedback(actor, indicator_id, comment, is_internal, now)
        })
    }

    pub fn request_rework(
        &mut self,
        actor: &Actor,
        id: AssessmentId,
        comments: String,
        now: DateTime<Utc>,
    ) -> Result<(), PortalError> {
        self.update_assessment(actor, id, |a, _| a.request_rework(actor, comments, now))
    }

    pub fn forward_to_validation(
        &mut self,
        actor: &Actor,
        id: AssessmentId,
        now: DateTime<Utc>,
    ) -> Result<(), PortalError> {
        self.update_assessment(actor, id, |a, inds| a.forward_to_validation(actor, inds, now))
    }

    pub fn finalize(
        &mut self,
        actor: &Actor,
        id: AssessmentId,
        overrides: &BTreeMap<IndicatorId, FinalVerdict>,
        now: DateTime<Utc>,
    ) -> Result<(), PortalError> {
        self.update_assessment(actor, id, |a, _| a.finalize(actor, overrides, now))
    }

    /// Score an assessment with the verdicts it has so far.
    pub fn assessment_report(
        &self,
        actor: &Actor,
        id: AssessmentId,
    ) -> Result<AssessmentReport, PortalError> {
        let assessment = self.assessment(actor, id)?;
        let indicators = self.store().indicators()?;
        let verdicts = assessment.verdicts();
        Ok(AssessmentReport {
            assessment_id: id,
            status: assessment.status,
            indicators: rollup(&indicators, &verdicts),
            result: score_assessment(&self.store().areas()?, &indicators, &verdicts),
        })
    }

    // =========================================================================
    // BULK
    // =========================================================================

    /// Write areas and indicators as-is, e.g. from an imported bundle.
    /// Existing rows with the same ids are replaced. Everything lands in
    /// one commit, and the indicator sequence moves past the largest
    /// imported id. Returns the number of indicators written.
    pub fn import_records(
        &mut self,
        actor: &Actor,
        areas: &[GovernanceArea],
        indicators: &[Indicator],
    ) -> Result<usize, PortalError> {
        actor.require(&[Role::MlgooDilg], "import indicators")?;
        self.store_mut().commit_import(&ImportBatch {
            areas: areas.to_vec(),
            indicators: indicators.to_vec(),
        })?;
        Ok(indicators.len())
    }

    /// Snapshot every area and indicator into a bundle.
    pub fn export_bundle(&self, now: DateTime<Utc>) -> Result<IndicatorBundle, PortalError> {
        Ok(IndicatorBundle::new(
            self.areas()?,
            self.indicators(None)?,
            now,
        ))
    }

    /// Import a checked bundle.
    pub fn import_bundle(
        &mut self,
        actor: &Actor,
        bundle: &IndicatorBundle,
    ) -> Result<usize, PortalError> {
        bundle.check()?;
        self.import_records(actor, &bundle.areas, &bundle.indicators)
    }
}

// =============================================================================
// TESTS
// =============================================================================
