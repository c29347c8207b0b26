use script_consolidate_core::{Analysis, AnalysisStats, ExecutionResult, PlanEntry};

pub(crate) fn format_stats(stats: &AnalysisStats) -> String {
    let mut out = String::new();
    out.push_str("== analysis stats ==\n");
    out.push_str(&format!(
        "scripts={} bytes={} functions={} duplicated={} groups={}\n",
        stats.scanned_scripts,
        stats.scanned_bytes,
        stats.indexed_functions,
        stats.duplicated_functions,
        stats.candidate_groups
    ));

    let mut skips: Vec<(&str, u64)> = vec![
        ("malformed_rows", stats.skipped_malformed_rows),
        ("unknown_dialect", stats.skipped_unknown_dialect),
        ("not_found", stats.skipped_not_found),
        ("permission_denied", stats.skipped_permission_denied),
        ("too_large", stats.skipped_too_large),
        ("binary", stats.skipped_binary),
        ("read_errors", stats.skipped_read_errors),
        ("walk_errors", stats.skipped_walk_errors),
    ];
    skips.retain(|(_, v)| *v > 0);
    if !skips.is_empty() {
        out.push_str("skipped:\n");
        for (k, v) in skips {
            out.push_str(&format!("- {k}={v}\n"));
        }
    }
    out.push('\n');
    out
}

pub(crate) fn format_analysis(analysis: &Analysis) -> String {
    let mut out = format_stats(&analysis.stats);
    out.push_str(&format!("candidate groups: {}\n", analysis.groups.len()));

    for (rank, group) in analysis.groups.iter().enumerate() {
        out.push('\n');
        out.push_str(&format!(
            "#{rank} combined={:.2} structural={:.2} textual={:.2}\n",
            group.combined_score, group.structural_score, group.textual_score
        ));
        out.push_str(&format!("shared: {}\n", group.shared_functions.join(", ")));
        for script in &group.scripts {
            out.push_str(&format!("- {script}\n"));
        }
    }

    out.push('\n');
    out
}

pub(crate) fn format_plan(plan: &[PlanEntry]) -> String {
    let mut out = String::new();
    out.push_str(&format!("plan entries: {}\n", plan.len()));

    for entry in plan {
        out.push('\n');
        out.push_str(&format!(
            "[{}] {} -> {} score={:.2} benefit={}\n",
            entry.group_id,
            entry.action,
            entry.target_path,
            entry.similarity_score,
            entry.estimated_benefit
        ));
        for script in &entry.scripts {
            out.push_str(&format!("- {script}\n"));
        }
    }

    out.push('\n');
    out
}

pub(crate) fn format_results(results: &[ExecutionResult]) -> String {
    let succeeded = results.iter().filter(|r| r.success).count();
    let mut out = String::new();
    out.push_str(&format!(
        "executed entries: {} succeeded={succeeded} failed={}\n",
        results.len(),
        results.len() - succeeded
    ));

    for result in results {
        out.push_str(&format!(
            "[{}] {:?}: {}\n",
            result.group_id, result.state, result.message
        ));
        for script in &result.modified_scripts {
            out.push_str(&format!("  ~ {script}\n"));
        }
    }

    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use script_consolidate_core::{Action, Benefit, Dialect, EntryState};

    use super::*;

    #[test]
    fn stats_only_list_nonzero_skips() {
        let stats = AnalysisStats {
            scanned_scripts: 4,
            skipped_binary: 2,
            ..AnalysisStats::default()
        };
        let text = format_stats(&stats);
        assert!(text.contains("scripts=4 "));
        assert!(text.contains("skipped:\n- binary=2\n"));
        assert!(!text.contains("not_found"));
    }

    #[test]
    fn plan_lines_show_action_and_target() {
        let plan = vec![PlanEntry {
            group_id: 3,
            scripts: vec!["Scripts/a.sh".to_string(), "Scripts/b.sh".to_string()],
            shared_functions: vec!["log".to_string(), "die".to_string()],
            primary_dialect: Dialect::Shell,
            similarity_score: 0.456,
            target_name: "log_helpers".to_string(),
            target_path: "Scripts/lib/log_helpers.sh".to_string(),
            action: Action::Extract,
            estimated_benefit: Benefit::Medium,
        }];
        let text = format_plan(&plan);
        assert!(text.starts_with("plan entries: 1\n"));
        assert!(
            text.contains("[3] extract -> Scripts/lib/log_helpers.sh score=0.46 benefit=medium\n")
        );
    }

    #[test]
    fn results_count_failures() {
        let results = vec![
            ExecutionResult {
                group_id: 0,
                state: EntryState::Merged,
                success: true,
                message: "Consolidated 2 scripts into Scripts/lib/x.py".to_string(),
                artifact_path: Some("Scripts/lib/x.py".to_string()),
                modified_scripts: vec!["Scripts/a.py".to_string()],
                dry_run: false,
            },
            ExecutionResult {
                group_id: 1,
                state: EntryState::Failed,
                success: false,
                message: "Failed to extract common functions: boom".to_string(),
                artifact_path: None,
                modified_scripts: Vec::new(),
                dry_run: false,
            },
        ];
        let text = format_results(&results);
        assert!(text.starts_with("executed entries: 2 succeeded=1 failed=1\n"));
        assert!(text.contains("[1] Failed: Failed to extract common functions: boom\n"));
        assert!(text.contains("  ~ Scripts/a.py\n"));
    }
}
