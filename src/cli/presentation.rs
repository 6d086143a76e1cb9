//! CLI presentation: text tables and json for each command's result.

use crate::artifact::{ResolvedArtifact, UniqueArtifact};
use crate::cli::parse::OutputFormat;
use crate::error::ApiError;
use crate::platform::StartReport;
use crate::progress::{ProgressEvent, RunRecord};
use crate::store::ApplicationRecord;
use crate::types::ExtensionNode;
use comfy_table::Table;
use serde::Serialize;

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::ConfigError(format!("Failed to serialize output: {}", e)))
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(header);
    table
}

/// One row per extension, indented by depth.
pub fn format_tree(tree: &ExtensionNode, format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(tree);
    }
    let mut table = table(vec!["Extension", "Id", "State", "Sealed", "Messages"]);
    add_tree_rows(&mut table, tree, 0);
    Ok(table.to_string())
}

fn add_tree_rows(table: &mut Table, node: &ExtensionNode, depth: usize) {
    let sealed = if node.sealed { "yes" } else { "" };
    table.add_row(vec![
        format!("{}{}", "  ".repeat(depth), node.coordinate),
        node.id.to_string(),
        node.load_state.to_string(),
        sealed.to_string(),
        node.messages.join("\n"),
    ]);
    for child in &node.children {
        add_tree_rows(table, child, depth + 1);
    }
}

pub fn format_start(report: &StartReport, format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(report);
    }
    let mut out = format!(
        "Started {} ({}): {} loaded, {} running\n",
        report.application, report.policy, report.loaded, report.running
    );
    out.push_str(&format_tree(&report.tree, format)?);
    Ok(out)
}

pub fn format_applications(
    records: &[ApplicationRecord],
    format: OutputFormat,
) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(records);
    }
    if records.is_empty() {
        return Ok("No applications stored.".to_string());
    }
    let mut table = table(vec!["Application", "Extensions", "Saved At"]);
    for record in records {
        table.add_row(vec![
            record.application_id.to_string(),
            record.extension_count.to_string(),
            record.saved_at.to_rfc3339(),
        ]);
    }
    Ok(table.to_string())
}

pub fn format_versions(
    versions: &[UniqueArtifact],
    format: OutputFormat,
) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(versions);
    }
    if versions.is_empty() {
        return Ok("No versions found.".to_string());
    }
    let mut table = table(vec!["Artifact", "Version", "Repository"]);
    for unique in versions {
        table.add_row(vec![
            unique.artifact.to_string(),
            unique.version.to_string(),
            unique.repository.clone(),
        ]);
    }
    Ok(table.to_string())
}

pub fn format_resolved(
    resolved: &ResolvedArtifact,
    format: OutputFormat,
) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        let dependencies: Vec<serde_json::Value> = resolved
            .dependencies
            .iter()
            .map(|d| {
                serde_json::json!({
                    "artifact": d.unique,
                    "path": d.path,
                })
            })
            .collect();
        return to_json(&serde_json::json!({
            "artifact": resolved.unique,
            "path": resolved.path,
            "dependencies": dependencies,
            "symbols": resolved.symbols,
        }));
    }
    let mut table = table(vec!["Artifact", "Version", "Repository", "Path"]);
    table.add_row(vec![
        resolved.unique.artifact.to_string(),
        resolved.unique.version.to_string(),
        resolved.unique.repository.clone(),
        resolved.path.display().to_string(),
    ]);
    for dependency in &resolved.dependencies {
        table.add_row(vec![
            format!("  {}", dependency.unique.artifact),
            dependency.unique.version.to_string(),
            dependency.unique.repository.clone(),
            dependency.path.display().to_string(),
        ]);
    }
    Ok(table.to_string())
}

pub fn format_runs(runs: &[RunRecord], format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(runs);
    }
    if runs.is_empty() {
        return Ok("No runs recorded.".to_string());
    }
    let mut table = table(vec![
        "Run", "Application", "Command", "Policy", "Started", "Status", "Error",
    ]);
    for run in runs {
        table.add_row(vec![
            run.run_id.clone(),
            run.application.to_string(),
            run.command.clone(),
            run.policy.clone().unwrap_or_else(|| "-".to_string()),
            run.started_at.to_rfc3339(),
            run.status.as_str().to_string(),
            run.error.clone().unwrap_or_default(),
        ]);
    }
    Ok(table.to_string())
}

pub fn format_events(events: &[ProgressEvent], format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(events);
    }
    let mut table = table(vec!["Seq", "Time", "Phase", "Event", "Data"]);
    for event in events {
        table.add_row(vec![
            event.seq.to_string(),
            event.ts.to_rfc3339(),
            event.phase.to_string(),
            event.event_type.clone(),
            event.data.to_string(),
        ]);
    }
    Ok(table.to_string())
}
