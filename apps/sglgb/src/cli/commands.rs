//! # CLI Command Implementations
//!
//! Administrative commands run as a built-in MLGOO actor against the
//! configured database.

use crate::api;
use crate::config::PortalConfig;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sglgb_core::{
    Actor, CalculationSchema, FormSchema, GovernanceAreaId, IndicatorTree, NodeKey, NodeUpdate,
    Portal, PortalError, ResponseData, Role, UserId, bundle_from_bytes, bundle_to_bytes,
    formats::BundleHeader,
};
use std::path::{Path, PathBuf};

/// Identity used for CLI-initiated writes.
pub const CLI_ACTOR: Actor = Actor::new(UserId(0), Role::MlgooDilg);

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a JSON input file (10 MB).
const MAX_JSON_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), PortalError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| PortalError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(PortalError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, PortalError> {
    let canonical = path.canonicalize().map_err(|e| {
        PortalError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(PortalError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent of an output path, which must be an existing
/// directory.
fn validate_output_path(path: &Path) -> Result<PathBuf, PortalError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        PortalError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(PortalError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| PortalError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Read a size-checked file.
fn read_input(path: &Path, max_size: u64) -> Result<Vec<u8>, PortalError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, max_size)?;
    std::fs::read(&validated)
        .map_err(|e| PortalError::IoError(format!("Read '{}': {}", path.display(), e)))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PortalError> {
    let data = read_input(path, MAX_JSON_FILE_SIZE)?;
    serde_json::from_slice(&data).map_err(|e| {
        PortalError::SerializationError(format!("Parse '{}': {}", path.display(), e))
    })
}

fn print_json<T: Serialize>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

/// Open the configured database.
pub fn open_portal(config: &PortalConfig) -> Result<Portal, PortalError> {
    Ok(Portal::with_redb(&config.database)?.with_settings(config.settings()?))
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

pub async fn cmd_server(config: PortalConfig) -> Result<(), PortalError> {
    let portal = open_portal(&config)?;

    println!("SGLGB Portal Starting...");
    println!();
    println!("Configuration:");
    println!("  Address:  {}", config.addr());
    println!("  Database: {:?}", config.database);
    println!("  Auth:     {}", if config.api_key.is_some() { "api key" } else { "disabled" });
    println!(
        "  Rate:     {}",
        if config.rate_limit > 0 {
            format!("{} req/s", config.rate_limit)
        } else {
            "unlimited".to_string()
        }
    );
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(portal, config).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

pub fn cmd_status(config: &PortalConfig, json_mode: bool) -> Result<(), PortalError> {
    let portal = open_portal(config)?;
    let stats = portal.stats()?;

    if json_mode {
        print_json(&serde_json::json!({
            "database": config.database.to_string_lossy(),
            "areas": stats.areas,
            "indicators": stats.indicators,
            "active_indicators": stats.active_indicators,
            "drafts": stats.drafts,
            "assessments": stats.assessments,
        }));
        return Ok(());
    }

    println!("SGLGB Portal Status");
    println!("===================");
    println!("Database:    {:?}", config.database);
    println!();
    println!("Areas:       {}", stats.areas);
    println!(
        "Indicators:  {} ({} active)",
        stats.indicators, stats.active_indicators
    );
    println!("Drafts:      {}", stats.drafts);
    println!("Assessments: {}", stats.assessments);

    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

pub fn cmd_init(config: &PortalConfig, force: bool) -> Result<(), PortalError> {
    let db_path = &config.database;
    if db_path.exists() {
        if !force {
            return Err(PortalError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| PortalError::IoError(format!("Remove database: {}", e)))?;
        tracing::warn!(database = %db_path.display(), "Existing database removed");
    }

    let mut portal = open_portal(config)?;
    let seeded = portal.seed_default_areas()?;
    println!(
        "Initialized database at {:?} with {} governance areas",
        db_path, seeded
    );
    Ok(())
}

// =============================================================================
// IMPORT COMMAND
// =============================================================================

/// One node of an indicator outline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutlineNode {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub form_schema: Option<FormSchema>,
    #[serde(default)]
    pub calculation_schema: Option<CalculationSchema>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub children: Vec<OutlineNode>,
}

/// Nested indicator outline, the import format for hand-written trees.
///
/// ```json
/// { "title": "FAS 2025", "nodes": [ { "name": "Budget", "children": [] } ] }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeOutline {
    #[serde(default)]
    pub title: Option<String>,
    pub nodes: Vec<OutlineNode>,
}

impl TreeOutline {
    /// Build a tree for `area`. Codes are assigned from outline order.
    pub fn build(&self, area: GovernanceAreaId) -> Result<IndicatorTree, PortalError> {
        let mut tree = IndicatorTree::new(area.to_string());
        for node in &self.nodes {
            add_outline_node(&mut tree, None, node)?;
        }
        Ok(tree)
    }
}

fn add_outline_node(
    tree: &mut IndicatorTree,
    parent: Option<&NodeKey>,
    node: &OutlineNode,
) -> Result<(), PortalError> {
    let key = tree.add_node(parent, node.name.clone())?;
    tree.update_node(
        &key,
        NodeUpdate {
            description: node.description.clone(),
            form_schema: node.form_schema.clone(),
            calculation_schema: node.calculation_schema.clone(),
            is_active: node.is_active,
            ..NodeUpdate::default()
        },
    )?;
    for child in &node.children {
        add_outline_node(tree, Some(&key), child)?;
    }
    Ok(())
}

/// Publish an outline into `area`, replacing its published tree, or load
/// an exported bundle.
pub fn cmd_import(
    config: &PortalConfig,
    input: &Path,
    area: Option<u64>,
    bundle: bool,
    json_mode: bool,
) -> Result<(), PortalError> {
    let mut portal = open_portal(config)?;

    if bundle {
        let data = read_input(input, sglgb_core::MAX_BUNDLE_SIZE as u64)?;
        let (header, bundle) = bundle_from_bytes(&data)?;
        let count = portal.import_bundle(&CLI_ACTOR, &bundle)?;
        tracing::info!(event = "bundle_imported", indicators = count, version = header.version);
        if json_mode {
            print_json(&serde_json::json!({
                "areas": bundle.areas.len(),
                "indicators": count,
                "blake3": header.blake3_hex(),
            }));
        } else {
            println!(
                "Imported bundle: {} areas, {} indicators",
                bundle.areas.len(),
                count
            );
        }
        return Ok(());
    }

    let area = GovernanceAreaId(area.ok_or_else(|| {
        PortalError::InvalidSchema("--area is required for outline import".to_string())
    })?);
    let outline: TreeOutline = read_json(input)?;
    let tree = outline.build(area)?;

    let now = Utc::now();
    let title = outline
        .title
        .clone()
        .unwrap_or_else(|| format!("Import from {}", input.display()));
    let draft = portal.create_draft(&CLI_ACTOR, area, title, false, now)?;
    portal.save_draft(&CLI_ACTOR, draft.id, draft.version, tree, None, now)?;
    let report = portal.publish_draft(&CLI_ACTOR, draft.id, now)?;

    if json_mode {
        print_json(&report);
    } else {
        println!("Published draft {} into area {}", draft.id, area);
        println!("  Created:     {}", report.created.len());
        println!("  Updated:     {}", report.updated.len());
        println!("  Unchanged:   {}", report.unchanged.len());
        println!("  Deactivated: {}", report.deactivated.len());
    }
    Ok(())
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

pub fn cmd_export(config: &PortalConfig, output: &Path) -> Result<(), PortalError> {
    let validated_output = validate_output_path(output)?;
    let portal = open_portal(config)?;

    let bundle = portal.export_bundle(Utc::now())?;
    let data = bundle_to_bytes(&bundle)?;
    let header = BundleHeader::from_bytes(&data)?;

    std::fs::write(&validated_output, &data)
        .map_err(|e| PortalError::IoError(format!("Write file: {}", e)))?;

    println!("Checksum: {:016x}", header.checksum);
    if let Some(hash) = header.blake3_hex() {
        println!("BLAKE3:   {}", hash);
    }
    println!(
        "Exported {} indicators ({} bytes) to {:?}",
        bundle.indicators.len(),
        data.len(),
        validated_output
    );
    Ok(())
}

// =============================================================================
// SCHEMA COMMANDS
// =============================================================================

/// Lint a form schema. Fails when any issue is found.
pub fn cmd_validate_schema(
    file: &Path,
    calculation: Option<&Path>,
    json_mode: bool,
) -> Result<(), PortalError> {
    let form: FormSchema = read_json(file)?;
    let mut issues: Vec<String> = form.lint().iter().map(ToString::to_string).collect();
    if let Some(path) = calculation {
        let calc: CalculationSchema = read_json(path)?;
        issues.extend(calc.lint_against(&form));
    }

    if json_mode {
        print_json(&api::ValidateSchemaResponse::from_issues(issues.clone()));
    } else if issues.is_empty() {
        println!("OK: {} field(s), no issues", form.fields.len());
    } else {
        for issue in &issues {
            println!("  - {}", issue);
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(PortalError::InvalidSchema(format!(
            "{} issue(s) found",
            issues.len()
        )))
    }
}

/// Evaluate a calculation schema and print the verdict with its trace.
pub fn cmd_evaluate(
    schema: &Path,
    form: Option<&Path>,
    values: &Path,
    json_mode: bool,
) -> Result<(), PortalError> {
    let calc: CalculationSchema = read_json(schema)?;
    if let Some(path) = form {
        let form: FormSchema = read_json(path)?;
        calc.validate_against(&form)?;
    }
    let values: ResponseData = read_json(values)?;
    let evaluation = calc.evaluate(&values);

    if json_mode {
        print_json(&evaluation);
        return Ok(());
    }

    println!("Status:  {:?}", evaluation.status);
    println!("Outcome: {:?}", evaluation.outcome);
    println!(
        "Rules:   {} passed, {} considered, {} total ({}%)",
        evaluation.rules_passed,
        evaluation.rules_considered,
        evaluation.rules_total,
        evaluation.score_percent()
    );
    for step in &evaluation.trace {
        println!("  [{}] {:?} {}", step.path, step.outcome, step.description);
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &tempfile::TempDir) -> PortalConfig {
        PortalConfig {
            database: dir.path().join("portal.redb"),
            ..PortalConfig::default()
        }
    }

    fn outline() -> TreeOutline {
        serde_json::from_value(serde_json::json!({
            "title": "FAS",
            "nodes": [
                {
                    "name": "Budget",
                    "children": [
                        { "name": "Posting", "form_schema": { "fields": [
                            { "field_type": "text_input", "field_id": "note", "label": "Note", "required": true }
                        ] } },
                        { "name": "Approval" }
                    ]
                },
                { "name": "Council" }
            ]
        }))
        .expect("outline")
    }

    #[test]
    fn outline_builds_coded_tree() {
        let tree = outline().build(GovernanceAreaId(1)).expect("build");
        assert_eq!(tree.len(), 4);
        let codes: Vec<String> = tree
            .preorder()
            .iter()
            .map(|k| tree.node(k).expect("node").code.clone())
            .collect();
        assert_eq!(codes, vec!["1.1", "1.1.1", "1.1.2", "1.2"]);
    }

    #[test]
    fn outline_rejects_unknown_keys() {
        let parsed: Result<TreeOutline, _> =
            serde_json::from_value(serde_json::json!({ "nodes": [], "extra": 1 }));
        assert!(parsed.is_err());
    }

    #[test]
    fn init_refuses_existing_database_without_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(&dir);
        cmd_init(&config, false).expect("init");
        assert!(cmd_init(&config, false).is_err());
        cmd_init(&config, true).expect("force init");
        assert_eq!(open_portal(&config).expect("open").areas().expect("areas").len(), 6);
    }

    #[test]
    fn export_then_import_bundle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = config(&dir);
        cmd_init(&source, false).expect("init");
        let mut portal = open_portal(&source).expect("open");
        let now = Utc::now();
        let draft = portal
            .create_draft(&CLI_ACTOR, GovernanceAreaId(2), "DP", false, now)
            .expect("draft");
        let mut tree = draft.tree.clone();
        let key = tree.add_node(None, "Plan").expect("add");
        tree.update_node(
            &key,
            NodeUpdate {
                form_schema: serde_json::from_value(serde_json::json!({ "fields": [
                    { "field_type": "text_input", "field_id": "plan", "label": "Plan", "required": true }
                ] }))
                .ok(),
                ..NodeUpdate::default()
            },
        )
        .expect("update");
        portal
            .save_draft(&CLI_ACTOR, draft.id, draft.version, tree, None, now)
            .expect("save");
        portal.publish_draft(&CLI_ACTOR, draft.id, now).expect("publish");
        drop(portal);

        let bundle_path = dir.path().join("out.sglb");
        cmd_export(&source, &bundle_path).expect("export");

        let target = PortalConfig {
            database: dir.path().join("copy.redb"),
            ..PortalConfig::default()
        };
        cmd_import(&target, &bundle_path, None, true, false).expect("import");
        let copy = open_portal(&target).expect("open copy");
        let indicators = copy.indicators(Some(GovernanceAreaId(2))).expect("indicators");
        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].code, "2.1");
    }

    #[test]
    fn output_path_requires_existing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(validate_output_path(&dir.path().join("missing").join("x.sglb")).is_err());
        assert!(validate_output_path(&dir.path().join("x.sglb")).is_ok());
    }
}
