mod blocks;
mod library;
mod merge;

#[cfg(test)]
mod tests;

use std::fs;
use std::io;
use std::path::Path;

use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::plan::write_json;
use crate::scan::ScriptFiles;
use crate::types::{Action, ConsolidateOptions, Dialect, EntryState, ExecutionResult, PlanEntry};
use crate::util::{relative_path, to_slash};

/// What a transformation touched on disk.
#[derive(Debug, Default)]
struct Applied {
    modified: Vec<String>,
    skipped: usize,
}

/// A member script that could be read and belongs to the entry's dialect.
#[derive(Debug)]
struct Member {
    path: String,
    text: String,
}

/// Applies plan entries to the files under the configured root.
#[derive(Debug)]
pub struct Rewriter<'a> {
    files: &'a ScriptFiles,
    options: &'a ConsolidateOptions,
}

impl<'a> Rewriter<'a> {
    pub fn new(files: &'a ScriptFiles, options: &'a ConsolidateOptions) -> Self {
        Self { files, options }
    }

    /// Runs every entry in order. A failing entry yields a failed result and
    /// the loop moves on.
    pub fn execute(&self, plan: &[&PlanEntry], dry_run: bool) -> Vec<ExecutionResult> {
        let results: Vec<ExecutionResult> = plan
            .iter()
            .map(|entry| self.execute_entry(entry, dry_run))
            .collect();
        let failed = results.iter().filter(|r| !r.success).count();
        info!(
            entries = results.len(),
            failed,
            dry_run,
            "plan execution finished"
        );
        results
    }

    pub fn execute_entry(&self, entry: &PlanEntry, dry_run: bool) -> ExecutionResult {
        let mut result = ExecutionResult {
            group_id: entry.group_id,
            state: EntryState::Pending,
            success: false,
            message: String::new(),
            artifact_path: Some(entry.target_path.clone()),
            modified_scripts: Vec::new(),
            dry_run,
        };
        let done_state = match entry.action {
            Action::Merge => EntryState::Merged,
            Action::Extract => EntryState::Extracted,
        };

        if dry_run {
            result.state = done_state;
            result.success = true;
            result.modified_scripts = entry.scripts.clone();
            result.message = match entry.action {
                Action::Merge => format!(
                    "[dry-run] Would consolidate {} scripts into {}",
                    entry.scripts.len(),
                    entry.target_path
                ),
                Action::Extract => format!(
                    "[dry-run] Would extract {} shared functions to {}",
                    entry.shared_functions.len(),
                    entry.target_path
                ),
            };
            info!(group_id = entry.group_id, action = %entry.action, "dry run");
            return result;
        }

        let applied = match entry.action {
            Action::Merge => merge::merge_group(self.files, entry),
            Action::Extract => library::extract_group(self.files, self.options, entry),
        };

        match applied {
            Ok(applied) => {
                result.state = done_state;
                result.success = true;
                result.message = match entry.action {
                    Action::Merge => format!(
                        "Consolidated {} scripts into {}",
                        applied.modified.len(),
                        entry.target_path
                    ),
                    Action::Extract => format!(
                        "Extracted {} shared functions to {}",
                        entry.shared_functions.len(),
                        entry.target_path
                    ),
                };
                if applied.skipped > 0 {
                    result
                        .message
                        .push_str(&format!(" ({} scripts skipped)", applied.skipped));
                }
                result.modified_scripts = applied.modified;
                info!(
                    group_id = entry.group_id,
                    state = ?result.state,
                    target = %entry.target_path,
                    "entry applied"
                );
            }
            Err(err) => {
                result.state = EntryState::Failed;
                result.artifact_path = None;
                result.message = match entry.action {
                    Action::Merge => format!("Failed to consolidate scripts: {err}"),
                    Action::Extract => format!("Failed to extract common functions: {err}"),
                };
                error!(group_id = entry.group_id, error = %err, "entry failed");
            }
        }
        result
    }
}

/// Entries whose group id is listed, in plan order; `None` selects all.
pub fn select_entries<'p>(plan: &'p [PlanEntry], group_ids: Option<&[usize]>) -> Vec<&'p PlanEntry> {
    match group_ids {
        None => plan.iter().collect(),
        Some(ids) => {
            for id in ids {
                if !plan.iter().any(|e| e.group_id == *id) {
                    warn!(group_id = *id, "group id not in plan");
                }
            }
            plan.iter().filter(|e| ids.contains(&e.group_id)).collect()
        }
    }
}

pub fn save_results(path: &Path, results: &[ExecutionResult]) -> Result<()> {
    write_json(path, results)
}

/// A missing results file means nothing has been executed yet.
pub fn load_results(path: &Path) -> Result<Vec<ExecutionResult>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(Error::read(path, err)),
    };
    serde_json::from_str(&raw).map_err(|e| Error::json(path, e))
}

/// Reads the entry's members, dropping unreadable ones and ones written in
/// another dialect.
fn read_members(files: &ScriptFiles, entry: &PlanEntry, applied: &mut Applied) -> Vec<Member> {
    let mut members = Vec::new();
    for path in &entry.scripts {
        let dialect = Dialect::from_path(Path::new(path));
        if dialect.is_some_and(|d| d != entry.primary_dialect) {
            warn!(
                path = %path,
                dialect = %entry.primary_dialect,
                "script is not in the entry's dialect, skipping"
            );
            applied.skipped += 1;
            continue;
        }
        match files.read(path) {
            Some(text) => members.push(Member {
                path: path.clone(),
                text,
            }),
            None => applied.skipped += 1,
        }
    }
    members
}

fn script_dir(path: &str) -> &Path {
    Path::new(path).parent().unwrap_or(Path::new(""))
}

/// `target` as seen from the directory holding `member`, slash separated.
fn path_from_member(member: &str, target: &str) -> String {
    to_slash(&relative_path(script_dir(member), Path::new(target)))
}

fn dir_from_member(member: &str, target: &str) -> String {
    to_slash(&relative_path(script_dir(member), script_dir(target)))
}

fn shebang(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Python => "#!/usr/bin/env python3",
        Dialect::Shell => "#!/usr/bin/env bash",
        Dialect::JavaScript => "#!/usr/bin/env node",
    }
}

/// Double-quoted literal that is valid in all three dialects.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn created_stamp() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}
