//! # Indicator Tree Builder
//!
//! In-memory hierarchy edited by the MLGOO while drafting indicators.
//!
//! ## Structure
//!
//! Nodes live in a `BTreeMap` keyed by [`NodeKey`]; order is carried by the
//! `roots` list and each node's `children` list. Every mutation keeps the
//! parent/child links consistent and refreshes hierarchical codes.
//!
//! ## Status
//!
//! Status is derived, never stored:
//! - leaf: `Complete` when named with a valid, non-empty form (and a
//!   calculation schema valid against it, when present); `Error` when a
//!   schema is invalid; `Incomplete` otherwise.
//! - parent: `Error` if any child is `Error`; `Complete` if named and every
//!   child is `Complete`; `Incomplete` otherwise.

use crate::calculation::CalculationSchema;
use crate::form_schema::FormSchema;
use crate::indicator::{Indicator, compare_codes};
use crate::primitives::{MAX_NAME_LENGTH, MAX_TREE_DEPTH, MAX_TREE_NODES};
use crate::{IndicatorId, NodeKey, PortalError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// NODES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub key: NodeKey,
    /// Published indicator this node was loaded from or published as.
    pub server_id: Option<IndicatorId>,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parent: Option<NodeKey>,
    #[serde(default)]
    pub children: Vec<NodeKey>,
    pub form_schema: Option<FormSchema>,
    pub calculation_schema: Option<CalculationSchema>,
    pub is_active: bool,
}

impl TreeNode {
    fn new(key: NodeKey, name: String, parent: Option<NodeKey>) -> Self {
        Self {
            key,
            server_id: None,
            code: String::new(),
            name,
            description: String::new(),
            parent,
            children: Vec::new(),
            form_schema: None,
            calculation_schema: None,
            is_active: true,
        }
    }
}

/// Partial update of a node's content. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub form_schema: Option<FormSchema>,
    pub calculation_schema: Option<CalculationSchema>,
    /// Drop the calculation schema (manual review only).
    pub clear_calculation_schema: bool,
    pub is_active: Option<bool>,
}

/// Derived build status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Incomplete,
    Complete,
    Error,
}

/// Leaf completion across the whole tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub total_leaves: usize,
    pub complete_leaves: usize,
    pub error_nodes: usize,
    /// Whole percent of complete leaves; 0 for an empty tree.
    pub percent: u8,
}

// =============================================================================
// TREE
// =============================================================================

/// Ordered forest of indicator nodes for one governance area.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorTree {
    /// Leading code segment, normally the governance area number.
    #[serde(default)]
    pub code_prefix: String,
    #[serde(default)]
    pub roots: Vec<NodeKey>,
    #[serde(default)]
    pub nodes: BTreeMap<NodeKey, TreeNode>,
}

impl IndicatorTree {
    #[must_use]
    pub fn new(code_prefix: impl Into<String>) -> Self {
        Self {
            code_prefix: code_prefix.into(),
            roots: Vec::new(),
            nodes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &NodeKey) -> Option<&TreeNode> {
        self.nodes.get(key)
    }

    pub fn node(&self, key: &NodeKey) -> Result<&TreeNode, PortalError> {
        self.nodes
            .get(key)
            .ok_or_else(|| PortalError::NodeNotFound(key.clone()))
    }

    fn node_mut(&mut self, key: &NodeKey) -> Result<&mut TreeNode, PortalError> {
        self.nodes
            .get_mut(key)
            .ok_or_else(|| PortalError::NodeNotFound(key.clone()))
    }

    fn siblings_mut(&mut self, parent: Option<&NodeKey>) -> Result<&mut Vec<NodeKey>, PortalError> {
        match parent {
            None => Ok(&mut self.roots),
            Some(p) => Ok(&mut self.node_mut(p)?.children),
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn is_leaf(&self, key: &NodeKey) -> bool {
        self.nodes.get(key).is_some_and(|n| n.children.is_empty())
    }

    /// Depth of a node, roots at 1. Zero for unknown keys.
    #[must_use]
    pub fn depth(&self, key: &NodeKey) -> usize {
        if self.nodes.contains_key(key) {
            self.ancestors(key).len() + 1
        } else {
            0
        }
    }

    /// Ancestors of `key`, root first.
    #[must_use]
    pub fn ancestors(&self, key: &NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut current = self.nodes.get(key).and_then(|n| n.parent.clone());
        while let Some(k) = current {
            // Guard against corrupted links.
            if out.contains(&k) || out.len() > MAX_TREE_NODES {
                break;
            }
            current = self.nodes.get(&k).and_then(|n| n.parent.clone());
            out.push(k);
        }
        out.reverse();
        out
    }

    /// Every node in depth-first order.
    #[must_use]
    pub fn preorder(&self) -> Vec<NodeKey> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for root in &self.roots {
            self.collect_preorder(root, &mut out);
        }
        out
    }

    fn collect_preorder(&self, key: &NodeKey, out: &mut Vec<NodeKey>) {
        if out.len() > MAX_TREE_NODES {
            return;
        }
        if let Some(node) = self.nodes.get(key) {
            out.push(key.clone());
            for child in &node.children {
                self.collect_preorder(child, out);
            }
        }
    }

    /// `key` and everything below it, in preorder.
    #[must_use]
    pub fn subtree(&self, key: &NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        self.collect_preorder(key, &mut out);
        out
    }

    fn height(&self, key: &NodeKey) -> usize {
        self.nodes.get(key).map_or(0, |n| {
            1 + n.children.iter().map(|c| self.height(c)).max().unwrap_or(0)
        })
    }

    /// Verify links of a tree received from a client: every listed child
    /// exists and points back at its parent, every node is reachable once,
    /// and size and depth limits hold.
    pub fn check_integrity(&self) -> Result<(), PortalError> {
        if self.nodes.len() > MAX_TREE_NODES {
            return Err(PortalError::InvalidSchema(format!(
                "tree exceeds {} nodes",
                MAX_TREE_NODES
            )));
        }
        for (key, node) in &self.nodes {
            if &node.key != key {
                return Err(PortalError::InvalidSchema(format!(
                    "node {} stored under key {}",
                    node.key, key
                )));
            }
            check_name(&node.name)?;
            for child in &node.children {
                let linked = self.nodes.get(child).is_some_and(|c| c.parent.as_ref() == Some(key));
                if !linked {
                    return Err(PortalError::InvalidSchema(format!(
                        "child {} of {} is missing or points elsewhere",
                        child, key
                    )));
                }
            }
        }
        for root in &self.roots {
            if self.nodes.get(root).is_none_or(|n| n.parent.is_some()) {
                return Err(PortalError::InvalidSchema(format!("bad root {}", root)));
            }
        }

        let order = self.preorder();
        let unique: BTreeSet<&NodeKey> = order.iter().collect();
        if order.len() != self.nodes.len() || unique.len() != order.len() {
            let stray = self
                .nodes
                .keys()
                .find(|k| !unique.contains(k))
                .cloned()
                .unwrap_or_else(|| NodeKey::new("?"));
            return Err(PortalError::CycleDetected(stray));
        }
        if order.iter().any(|k| self.depth(k) > MAX_TREE_DEPTH) {
            return Err(PortalError::InvalidSchema(format!(
                "tree exceeds depth {}",
                MAX_TREE_DEPTH
            )));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Editing
    // -------------------------------------------------------------------------

    /// Append a new node under `parent` (or as a root) and return its key.
    pub fn add_node(
        &mut self,
        parent: Option<&NodeKey>,
        name: impl Into<String>,
    ) -> Result<NodeKey, PortalError> {
        self.add_node_with_key(NodeKey::generate(), parent, name)
    }

    /// As [`IndicatorTree::add_node`], with a caller-chosen key.
    pub fn add_node_with_key(
        &mut self,
        key: NodeKey,
        parent: Option<&NodeKey>,
        name: impl Into<String>,
    ) -> Result<NodeKey, PortalError> {
        let name = name.into();
        check_name(&name)?;
        if self.nodes.contains_key(&key) {
            return Err(PortalError::InvalidSchema(format!("duplicate node key {}", key)));
        }
        if self.nodes.len() >= MAX_TREE_NODES {
            return Err(PortalError::InvalidSchema(format!(
                "tree exceeds {} nodes",
                MAX_TREE_NODES
            )));
        }
        if let Some(p) = parent {
            self.node(p)?;
            if self.depth(p) >= MAX_TREE_DEPTH {
                return Err(PortalError::InvalidSchema(format!(
                    "tree exceeds depth {}",
                    MAX_TREE_DEPTH
                )));
            }
        }

        self.siblings_mut(parent)?.push(key.clone());
        self.nodes
            .insert(key.clone(), TreeNode::new(key.clone(), name, parent.cloned()));
        self.recalculate_codes();
        Ok(key)
    }

    /// Apply a partial content update.
    pub fn update_node(&mut self, key: &NodeKey, update: NodeUpdate) -> Result<(), PortalError> {
        if let Some(name) = &update.name {
            check_name(name)?;
        }
        let node = self.node_mut(key)?;
        if let Some(name) = update.name {
            node.name = name;
        }
        if let Some(description) = update.description {
            node.description = description;
        }
        if let Some(form) = update.form_schema {
            node.form_schema = Some(form);
        }
        if update.clear_calculation_schema {
            node.calculation_schema = None;
        } else if let Some(calc) = update.calculation_schema {
            node.calculation_schema = Some(calc);
        }
        if let Some(active) = update.is_active {
            node.is_active = active;
        }
        Ok(())
    }

    /// Remove a node and its whole subtree. Returns the removed nodes in preorder.
    pub fn delete_node(&mut self, key: &NodeKey) -> Result<Vec<TreeNode>, PortalError> {
        let parent = self.node(key)?.parent.clone();
        let doomed = self.subtree(key);
        self.siblings_mut(parent.as_ref())?.retain(|k| k != key);
        let removed = doomed
            .iter()
            .filter_map(|k| self.nodes.remove(k))
            .collect();
        self.recalculate_codes();
        Ok(removed)
    }

    /// Move `key` under `new_parent` (or to the roots) at position `index`
    /// among its new siblings. `index` past the end appends.
    pub fn move_node(
        &mut self,
        key: &NodeKey,
        new_parent: Option<&NodeKey>,
        index: usize,
    ) -> Result<(), PortalError> {
        let old_parent = self.node(key)?.parent.clone();
        if let Some(p) = new_parent {
            self.node(p)?;
            if p == key || self.ancestors(p).contains(key) {
                return Err(PortalError::CycleDetected(key.clone()));
            }
            if self.depth(p) + self.height(key) > MAX_TREE_DEPTH {
                return Err(PortalError::InvalidSchema(format!(
                    "tree exceeds depth {}",
                    MAX_TREE_DEPTH
                )));
            }
        }

        self.siblings_mut(old_parent.as_ref())?.retain(|k| k != key);
        let siblings = self.siblings_mut(new_parent)?;
        let at = index.min(siblings.len());
        siblings.insert(at, key.clone());
        self.node_mut(key)?.parent = new_parent.cloned();
        self.recalculate_codes();
        Ok(())
    }

    /// Deep-copy a subtree with fresh keys, inserted right after the
    /// original. Copies are unpublished. Returns the new root key.
    pub fn duplicate_node(&mut self, key: &NodeKey) -> Result<NodeKey, PortalError> {
        let source = self.subtree(key);
        if source.is_empty() {
            return Err(PortalError::NodeNotFound(key.clone()));
        }
        if self.nodes.len() + source.len() > MAX_TREE_NODES {
            return Err(PortalError::InvalidSchema(format!(
                "tree exceeds {} nodes",
                MAX_TREE_NODES
            )));
        }

        let fresh: BTreeMap<NodeKey, NodeKey> = source
            .iter()
            .map(|k| (k.clone(), NodeKey::generate()))
            .collect();
        let parent = self.node(key)?.parent.clone();

        let mut copies = Vec::with_capacity(source.len());
        for old in &source {
            let original = self.node(old)?;
            let mut copy = original.clone();
            copy.key = fresh.get(old).cloned().unwrap_or_else(NodeKey::generate);
            copy.server_id = None;
            copy.parent = if old == key {
                parent.clone()
            } else {
                original.parent.as_ref().and_then(|p| fresh.get(p).cloned())
            };
            copy.children = original
                .children
                .iter()
                .filter_map(|c| fresh.get(c).cloned())
                .collect();
            copies.push(copy);
        }

        let Some(root) = copies.first_mut() else {
            return Err(PortalError::NodeNotFound(key.clone()));
        };
        root.name = format!("{} (copy)", root.name);
        let new_root = root.key.clone();
        for copy in copies {
            self.nodes.insert(copy.key.clone(), copy);
        }

        let siblings = self.siblings_mut(parent.as_ref())?;
        let at = siblings
            .iter()
            .position(|k| k == key)
            .map_or(siblings.len(), |i| i + 1);
        siblings.insert(at, new_root.clone());
        self.recalculate_codes();
        Ok(new_root)
    }

    /// Assign `{prefix}.{i}.{j}...` codes from sibling positions (1-based).
    pub fn recalculate_codes(&mut self) {
        let roots = self.roots.clone();
        for (i, root) in roots.iter().enumerate() {
            let code = if self.code_prefix.is_empty() {
                (i + 1).to_string()
            } else {
                format!("{}.{}", self.code_prefix, i + 1)
            };
            self.assign_code(root, code, 0);
        }
    }

    fn assign_code(&mut self, key: &NodeKey, code: String, depth: usize) {
        if depth > MAX_TREE_DEPTH {
            return;
        }
        let children = match self.nodes.get_mut(key) {
            Some(node) => {
                node.code.clone_from(&code);
                node.children.clone()
            }
            None => return,
        };
        for (j, child) in children.iter().enumerate() {
            self.assign_code(child, format!("{}.{}", code, j + 1), depth + 1);
        }
    }

    // -------------------------------------------------------------------------
    // Status
    // -------------------------------------------------------------------------

    /// Problems that make a leaf `Error` or keep it `Incomplete`.
    #[must_use]
    pub fn node_issues(&self, key: &NodeKey) -> Vec<String> {
        let Some(node) = self.nodes.get(key) else {
            return vec![format!("unknown node {}", key)];
        };
        let mut issues = Vec::new();
        if node.name.trim().is_empty() {
            issues.push("name is empty".to_string());
        }
        if !node.children.is_empty() {
            return issues;
        }
        match &node.form_schema {
            None => issues.push("form schema is missing".to_string()),
            Some(form) if form.is_empty() => issues.push("form schema has no fields".to_string()),
            Some(form) => issues.extend(form.lint().iter().map(ToString::to_string)),
        }
        if let Some(calc) = &node.calculation_schema {
            let empty = FormSchema::new();
            let form = node.form_schema.as_ref().unwrap_or(&empty);
            issues.extend(calc.lint_against(form));
        }
        issues
    }

    fn leaf_status(node: &TreeNode) -> NodeStatus {
        let form_ok = match &node.form_schema {
            None => None,
            Some(form) if form.is_empty() => None,
            Some(form) => Some(form.lint().is_empty()),
        };
        let calc_ok = node.calculation_schema.as_ref().map(|calc| {
            let empty = FormSchema::new();
            calc.lint_against(node.form_schema.as_ref().unwrap_or(&empty))
                .is_empty()
        });

        if form_ok == Some(false) || calc_ok == Some(false) {
            NodeStatus::Error
        } else if form_ok == Some(true) && !node.name.trim().is_empty() {
            NodeStatus::Complete
        } else {
            NodeStatus::Incomplete
        }
    }

    /// Status of every node, computed bottom-up in one pass.
    #[must_use]
    pub fn statuses(&self) -> BTreeMap<NodeKey, NodeStatus> {
        let mut out = BTreeMap::new();
        for key in self.preorder().iter().rev() {
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            let status = if node.children.is_empty() {
                Self::leaf_status(node)
            } else {
                let child = |s: NodeStatus| {
                    node.children
                        .iter()
                        .any(|c| out.get(c).copied() == Some(s))
                };
                if child(NodeStatus::Error) {
                    NodeStatus::Error
                } else if !node.name.trim().is_empty()
                    && node
                        .children
                        .iter()
                        .all(|c| out.get(c).copied() == Some(NodeStatus::Complete))
                {
                    NodeStatus::Complete
                } else {
                    NodeStatus::Incomplete
                }
            };
            out.insert(key.clone(), status);
        }
        out
    }

    #[must_use]
    pub fn status(&self, key: &NodeKey) -> Option<NodeStatus> {
        if !self.nodes.contains_key(key) {
            return None;
        }
        self.statuses().get(key).copied()
    }

    #[must_use]
    pub fn completion_summary(&self) -> CompletionSummary {
        let statuses = self.statuses();
        let leaves: Vec<&NodeKey> = self
            .nodes
            .values()
            .filter(|n| n.children.is_empty())
            .map(|n| &n.key)
            .collect();
        let complete = leaves
            .iter()
            .filter(|k| statuses.get(**k) == Some(&NodeStatus::Complete))
            .count();
        let error_nodes = statuses
            .values()
            .filter(|s| **s == NodeStatus::Error)
            .count();
        let percent = if leaves.is_empty() {
            0
        } else {
            (complete * 100 / leaves.len()) as u8
        };
        CompletionSummary {
            total_leaves: leaves.len(),
            complete_leaves: complete,
            error_nodes,
            percent,
        }
    }

    /// Every node is `Complete` (and there is at least one).
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.is_empty()
            && self
                .statuses()
                .values()
                .all(|s| *s == NodeStatus::Complete)
    }

    // -------------------------------------------------------------------------
    // Navigation
    // -------------------------------------------------------------------------

    /// Node after `key` in preorder.
    #[must_use]
    pub fn next_node(&self, key: &NodeKey) -> Option<NodeKey> {
        let order = self.preorder();
        let i = order.iter().position(|k| k == key)?;
        order.get(i + 1).cloned()
    }

    /// Node before `key` in preorder.
    #[must_use]
    pub fn previous_node(&self, key: &NodeKey) -> Option<NodeKey> {
        let order = self.preorder();
        let i = order.iter().position(|k| k == key)?;
        i.checked_sub(1).and_then(|j| order.get(j).cloned())
    }

    /// First leaf after `from` (wrapping around) that is not `Complete`.
    /// With `from = None` the search starts at the top.
    #[must_use]
    pub fn next_incomplete(&self, from: Option<&NodeKey>) -> Option<NodeKey> {
        let statuses = self.statuses();
        let order = self.preorder();
        let start = from
            .and_then(|f| order.iter().position(|k| k == f))
            .map_or(0, |i| i + 1);
        let n = order.len();
        (0..n)
            .map(|offset| &order[(start + offset) % n])
            .find(|k| {
                self.is_leaf(k) && statuses.get(*k).copied() != Some(NodeStatus::Complete)
            })
            .cloned()
    }

    // -------------------------------------------------------------------------
    // Conversion
    // -------------------------------------------------------------------------

    /// Rebuild a tree from published rows of one area. Node keys are
    /// `ind-{id}`; siblings are ordered by `order`, then code.
    pub fn from_indicators(
        code_prefix: impl Into<String>,
        indicators: &[Indicator],
    ) -> Result<Self, PortalError> {
        let mut tree = Self::new(code_prefix);
        let ids: BTreeSet<IndicatorId> = indicators.iter().map(|i| i.id).collect();
        let key_of = |id: IndicatorId| NodeKey::new(format!("ind-{}", id));

        let mut sorted: Vec<&Indicator> = indicators.iter().collect();
        sorted.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then_with(|| compare_codes(&a.code, &b.code))
        });

        for ind in &sorted {
            let parent = ind.parent_id.filter(|p| ids.contains(p)).map(key_of);
            let node = TreeNode {
                key: key_of(ind.id),
                server_id: Some(ind.id),
                code: ind.code.clone(),
                name: ind.name.clone(),
                description: ind.description.clone(),
                parent,
                children: Vec::new(),
                form_schema: ind.form_schema.clone(),
                calculation_schema: ind.calculation_schema.clone(),
                is_active: ind.is_active,
            };
            tree.nodes.insert(node.key.clone(), node);
        }

        for ind in &sorted {
            let key = key_of(ind.id);
            match ind.parent_id.filter(|p| ids.contains(p)) {
                Some(p) => tree.node_mut(&key_of(p))?.children.push(key),
                None => tree.roots.push(key),
            }
        }

        // A parent cycle in the rows leaves nodes unreachable from the roots.
        let reachable: BTreeSet<NodeKey> = tree.preorder().into_iter().collect();
        if reachable.len() != tree.nodes.len() {
            let orphan = tree
                .nodes
                .keys()
                .find(|k| !reachable.contains(*k))
                .cloned()
                .unwrap_or_else(|| NodeKey::new("?"));
            return Err(PortalError::CycleDetected(orphan));
        }
        Ok(tree)
    }
}

fn check_name(name: &str) -> Result<(), PortalError> {
    if name.len() > MAX_NAME_LENGTH {
        return Err(PortalError::InvalidSchema(format!(
            "name exceeds {} bytes",
            MAX_NAME_LENGTH
        )));
    }
    Ok(())
}

// =============================================================================
// VIEW STATE
// =============================================================================

/// A node as shown in the collapsible tree view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleNode {
    pub key: NodeKey,
    pub depth: usize,
    pub has_children: bool,
    pub expanded: bool,
}

/// Expand/collapse state of the tree view. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeViewState {
    pub expanded: BTreeSet<NodeKey>,
}

impl TreeViewState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_expanded(&self, key: &NodeKey) -> bool {
        self.expanded.contains(key)
    }

    /// Flip one node; returns whether it is now expanded.
    pub fn toggle(&mut self, key: &NodeKey) -> bool {
        if self.expanded.remove(key) {
            false
        } else {
            self.expanded.insert(key.clone());
            true
        }
    }

    /// Expand every node that has children.
    pub fn expand_all(&mut self, tree: &IndicatorTree) {
        self.expanded = tree
            .nodes
            .values()
            .filter(|n| !n.children.is_empty())
            .map(|n| n.key.clone())
            .collect();
    }

    pub fn collapse_all(&mut self) {
        self.expanded.clear();
    }

    /// Expand the ancestors of `key` so it becomes visible.
    pub fn reveal(&mut self, tree: &IndicatorTree, key: &NodeKey) {
        self.expanded.extend(tree.ancestors(key));
    }

    /// Forget keys that no longer exist in `tree`.
    pub fn retain_existing(&mut self, tree: &IndicatorTree) {
        self.expanded.retain(|k| tree.nodes.contains_key(k));
    }

    /// Rows to render, in preorder, skipping children of collapsed nodes.
    #[must_use]
    pub fn visible(&self, tree: &IndicatorTree) -> Vec<VisibleNode> {
        let mut out = Vec::new();
        for root in &tree.roots {
            self.collect_visible(tree, root, 1, &mut out);
        }
        out
    }

    fn collect_visible(
        &self,
        tree: &IndicatorTree,
        key: &NodeKey,
        depth: usize,
        out: &mut Vec<VisibleNode>,
    ) {
        let Some(node) = tree.nodes.get(key) else {
            return;
        };
        if depth > MAX_TREE_DEPTH + 1 {
            return;
        }
        let expanded = self.is_expanded(key);
        out.push(VisibleNode {
            key: key.clone(),
            depth,
            has_children: !node.children.is_empty(),
            expanded,
        });
        if expanded {
            for child in &node.children {
                self.collect_visible(tree, child, depth + 1, out);
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
