#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::error::{Error, Result};
use crate::plan::load_plan;
use crate::rewrite::load_results;
use crate::types::{ConsolidateOptions, ExecutionResult, PlanEntry};

fn status_lines(result: Option<&ExecutionResult>) -> Vec<String> {
    let Some(result) = result else {
        return vec!["- **Status**: ⏳ Pending".to_string()];
    };
    let mut out = Vec::new();
    let status = if result.success {
        "✅ Success"
    } else {
        "❌ Failed"
    };
    out.push(format!("- **Status**: {status}"));
    out.push(format!("- **Message**: {}", result.message));
    if result.success
        && let Some(path) = &result.artifact_path
    {
        out.push(format!("- **Consolidated Path**: `{path}`"));
    }
    out
}

/// Renders the Markdown report. Results are matched to entries by group id;
/// entries without a result are shown as pending.
pub fn render_report(plan: &[PlanEntry], results: &[ExecutionResult], date: &str) -> String {
    let by_group: HashMap<usize, &ExecutionResult> =
        results.iter().map(|r| (r.group_id, r)).collect();
    let succeeded = results.iter().filter(|r| r.success).count();
    let failed = results.len() - succeeded;

    let mut out = vec![
        "---".to_string(),
        "title: Script Consolidation Report".to_string(),
        format!("date: {date}"),
        "tags: [system, scripts, consolidation, report]".to_string(),
        "---".to_string(),
        String::new(),
        "# Script Consolidation Report".to_string(),
        String::new(),
        "## Summary".to_string(),
        String::new(),
        format!("- Total candidate groups: {}", plan.len()),
        format!("- Consolidated scripts: {succeeded}"),
        format!("- Failed consolidations: {failed}"),
        String::new(),
        "## Consolidation Groups".to_string(),
        String::new(),
    ];

    for entry in plan {
        out.push(format!("### Group {}: {}", entry.group_id, entry.target_name));
        out.push(String::new());
        out.push(format!(
            "- **Similarity Score**: {:.2}",
            entry.similarity_score
        ));
        out.push(format!("- **Action**: {}", entry.action));
        out.push(format!("- **Estimated Benefit**: {}", entry.estimated_benefit));
        out.push(format!("- **Target**: `{}`", entry.target_path));
        out.push("- **Scripts**:".to_string());
        out.extend(entry.scripts.iter().map(|s| format!("  - `{s}`")));
        out.push("- **Shared Functions**:".to_string());
        out.extend(entry.shared_functions.iter().map(|f| format!("  - `{f}`")));
        out.extend(status_lines(by_group.get(&entry.group_id).copied()));
        out.push(String::new());
    }

    out.join("\n")
}

/// Loads the plan and results artifacts and writes the report; returns the
/// report path.
pub fn generate_report(options: &ConsolidateOptions) -> Result<PathBuf> {
    let plan = load_plan(&options.resolve(&options.plan_path))?;
    let results = load_results(&options.resolve(&options.results_path))?;
    let date = chrono::Local::now().format("%Y-%m-%d").to_string();
    let text = render_report(&plan, &results, &date);

    let report_path = options.resolve(&options.report_path);
    if let Some(parent) = report_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::write(parent, e))?;
    }
    fs::write(&report_path, text).map_err(|e| Error::write(&report_path, e))?;
    info!(
        path = %report_path.display(),
        entries = plan.len(),
        results = results.len(),
        "report written"
    );
    Ok(report_path)
}
