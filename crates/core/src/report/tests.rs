use std::fs;
use std::io;

use super::*;
use crate::plan::save_plan;
use crate::rewrite::save_results;
use crate::types::{Action, Benefit, Dialect, EntryState};

fn plan_entry(group_id: usize, name: &str, score: f64, action: Action) -> PlanEntry {
    PlanEntry {
        group_id,
        scripts: vec!["Scripts/a.py".to_string(), "Scripts/b.py".to_string()],
        shared_functions: vec!["load".to_string(), "save".to_string()],
        primary_dialect: Dialect::Python,
        similarity_score: score,
        target_name: name.to_string(),
        target_path: format!("Scripts/lib/{name}.py"),
        action,
        estimated_benefit: Benefit::Medium,
    }
}

fn io_err(err: Error) -> io::Error {
    io::Error::other(err.to_string())
}

#[test]
fn entries_without_results_are_pending() {
    let plan = vec![
        plan_entry(0, "load_save", 0.876, Action::Merge),
        plan_entry(2, "data_tools", 0.41, Action::Extract),
    ];
    let results = vec![ExecutionResult {
        group_id: 0,
        state: EntryState::Merged,
        success: true,
        message: "Consolidated 2 scripts into Scripts/lib/load_save.py".to_string(),
        artifact_path: Some("Scripts/lib/load_save.py".to_string()),
        modified_scripts: vec!["Scripts/a.py".to_string()],
        dry_run: false,
    }];

    let text = render_report(&plan, &results, "2026-01-02");

    assert!(text.starts_with("---\ntitle: Script Consolidation Report\ndate: 2026-01-02\n"));
    assert!(text.contains("- Total candidate groups: 2\n- Consolidated scripts: 1\n- Failed consolidations: 0"));
    assert!(text.contains("### Group 0: load_save\n\n- **Similarity Score**: 0.88\n- **Action**: merge"));
    assert!(text.contains("- **Consolidated Path**: `Scripts/lib/load_save.py`"));
    assert!(text.contains("### Group 2: data_tools\n\n- **Similarity Score**: 0.41\n- **Action**: extract"));

    let group_two = text.split("### Group 2").nth(1).unwrap_or_default();
    assert!(group_two.contains("- **Status**: ⏳ Pending"));
    assert!(group_two.contains("  - `load`\n  - `save`"));
}

#[test]
fn failed_results_show_message_without_path() {
    let plan = vec![plan_entry(1, "x_tools", 0.6, Action::Merge)];
    let results = vec![ExecutionResult {
        group_id: 1,
        state: EntryState::Failed,
        success: false,
        message: "Failed to consolidate scripts: disk full".to_string(),
        artifact_path: None,
        modified_scripts: Vec::new(),
        dry_run: false,
    }];

    let text = render_report(&plan, &results, "2026-01-02");
    assert!(text.contains("- **Status**: ❌ Failed\n- **Message**: Failed to consolidate scripts: disk full"));
    assert!(!text.contains("Consolidated Path"));
    assert!(text.contains("- Failed consolidations: 1"));
}

#[test]
fn generate_report_reads_artifacts_and_writes_markdown() -> io::Result<()> {
    let dir = tempfile::tempdir()?;
    let options = ConsolidateOptions::with_root(dir.path());
    let plan = vec![plan_entry(0, "load_save", 0.9, Action::Merge)];
    save_plan(&options.resolve(&options.plan_path), &plan).map_err(io_err)?;

    let path = generate_report(&options).map_err(io_err)?;
    assert_eq!(path, dir.path().join("Dashboards/System/script_consolidation_report.md"));
    let text = fs::read_to_string(&path)?;
    assert!(text.contains("⏳ Pending"));

    save_results(
        &options.resolve(&options.results_path),
        &[ExecutionResult {
            group_id: 0,
            state: EntryState::Merged,
            success: true,
            message: "ok".to_string(),
            artifact_path: Some("Scripts/lib/load_save.py".to_string()),
            modified_scripts: Vec::new(),
            dry_run: false,
        }],
    )
    .map_err(io_err)?;
    generate_report(&options).map_err(io_err)?;
    let text = fs::read_to_string(&path)?;
    assert!(text.contains("✅ Success"));
    Ok(())
}

#[test]
fn missing_plan_aborts_reporting() -> io::Result<()> {
    let dir = tempfile::tempdir()?;
    let options = ConsolidateOptions::with_root(dir.path());
    assert!(matches!(generate_report(&options), Err(Error::Read { .. })));
    assert!(!dir.path().join("Dashboards").exists());
    Ok(())
}
