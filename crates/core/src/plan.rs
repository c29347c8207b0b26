use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{Action, Benefit, CandidateGroup, ConsolidateOptions, Dialect, PlanEntry};
use crate::util::{file_stem, to_slash};

fn word_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("[a-z]+").expect("valid regex literal"))
}

/// Most common member dialect; ties go to the dialect seen first.
pub fn primary_dialect(group: &CandidateGroup) -> Option<Dialect> {
    let mut counts: Vec<(Dialect, usize)> = Vec::new();
    for path in &group.scripts {
        let Some(dialect) = group.dialects.get(path) else {
            continue;
        };
        match counts.iter_mut().find(|(d, _)| d == dialect) {
            Some((_, n)) => *n += 1,
            None => counts.push((*dialect, 1)),
        }
    }

    let mut best: Option<(Dialect, usize)> = None;
    for (dialect, n) in counts {
        if best.is_none_or(|(_, top)| n > top) {
            best = Some((dialect, n));
        }
    }
    best.map(|(dialect, _)| dialect)
}

/// Ordered word -> count table; insertion order breaks ties later.
#[derive(Debug, Default)]
struct WordCounts(Vec<(String, usize)>);

impl WordCounts {
    fn bump(&mut self, word: &str) {
        match self.0.iter_mut().find(|(w, _)| w == word) {
            Some((_, n)) => *n += 1,
            None => self.0.push((word.to_string(), 1)),
        }
    }

    /// Entries of `other` replace the count of an existing word in place and
    /// append new words at the end.
    fn overlay(&mut self, other: WordCounts) {
        for (word, n) in other.0 {
            match self.0.iter_mut().find(|(w, _)| *w == word) {
                Some((_, slot)) => *slot = n,
                None => self.0.push((word, n)),
            }
        }
    }

    fn top(mut self, k: usize) -> Vec<String> {
        self.0.sort_by(|a, b| b.1.cmp(&a.1));
        self.0.into_iter().take(k).map(|(w, _)| w).collect()
    }
}

/// Builds a library name from the member file stems and the shared function
/// names, e.g. `report_daily.py` + `report_weekly.py` sharing
/// `format_report` becomes `format_report_daily`.
pub fn suggest_target_name(group_id: usize, group: &CandidateGroup) -> String {
    let mut stem_words = WordCounts::default();
    for path in &group.scripts {
        for part in file_stem(path).split('_') {
            if part.chars().count() > 3 {
                stem_words.bump(part);
            }
        }
    }

    let mut function_words = WordCounts::default();
    for name in &group.shared_functions {
        for run in word_runs().find_iter(name) {
            if run.as_str().len() > 3 {
                function_words.bump(run.as_str());
            }
        }
    }

    stem_words.overlay(function_words);
    let top = stem_words.top(3);
    let mut name = top.join("_");
    if name.is_empty() {
        return format!("group_{group_id}_shared");
    }

    if !name.contains("util") && top.iter().any(|w| w.contains("util")) {
        name.push_str("_utils");
    } else if !name.contains("helper") && top.iter().any(|w| w.contains("help")) {
        name.push_str("_helpers");
    }
    name
}

pub fn target_path(options: &ConsolidateOptions, name: &str, dialect: Dialect) -> String {
    to_slash(&options.lib_dir.join(format!("{name}.{}", dialect.extension())))
}

/// Turns scored groups into plan entries. `group_id` is the position in the
/// incoming (score-sorted) sequence, so ids of dropped groups leave gaps.
pub fn synthesize_plan(groups: &[CandidateGroup], options: &ConsolidateOptions) -> Vec<PlanEntry> {
    let mut plan = Vec::new();
    for (group_id, group) in groups.iter().enumerate() {
        if group.combined_score < options.min_combined_score {
            debug!(
                group_id,
                score = group.combined_score,
                "group below score floor"
            );
            continue;
        }
        let Some(dialect) = primary_dialect(group) else {
            debug!(group_id, "group has no known dialect");
            continue;
        };

        let target_name = suggest_target_name(group_id, group);
        let action = if group.combined_score > options.merge_threshold {
            Action::Merge
        } else {
            Action::Extract
        };
        let estimated_benefit = if group.combined_score > options.high_benefit_threshold {
            Benefit::High
        } else {
            Benefit::Medium
        };

        plan.push(PlanEntry {
            group_id,
            scripts: group.scripts.clone(),
            shared_functions: group.shared_functions.clone(),
            primary_dialect: dialect,
            similarity_score: group.combined_score,
            target_path: target_path(options, &target_name, dialect),
            target_name,
            action,
            estimated_benefit,
        });
    }

    plan.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
    info!(entries = plan.len(), groups = groups.len(), "plan synthesized");
    plan
}

pub fn save_plan(path: &Path, plan: &[PlanEntry]) -> Result<()> {
    write_json(path, plan)
}

pub fn load_plan(path: &Path) -> Result<Vec<PlanEntry>> {
    let raw = fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
    let plan: Vec<PlanEntry> = serde_json::from_str(&raw).map_err(|e| Error::json(path, e))?;
    for entry in &plan {
        if entry.scripts.is_empty() {
            return Err(Error::Plan(format!(
                "entry {} has no scripts",
                entry.group_id
            )));
        }
    }
    Ok(plan)
}

pub(crate) fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::write(parent, e))?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|e| Error::json(path, e))?;
    fs::write(path, json).map_err(|e| Error::write(path, e))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn group(scripts: &[(&str, Dialect)], shared: &[&str], score: f64) -> CandidateGroup {
        CandidateGroup {
            scripts: scripts.iter().map(|(p, _)| (*p).to_string()).collect(),
            shared_functions: shared.iter().map(|s| (*s).to_string()).collect(),
            dialects: scripts
                .iter()
                .map(|(p, d)| ((*p).to_string(), *d))
                .collect::<BTreeMap<_, _>>(),
            structural_score: score,
            textual_score: score,
            combined_score: score,
        }
    }

    #[test]
    fn name_prefers_function_words_then_stems() {
        let g = group(
            &[
                ("Scripts/report_daily.py", Dialect::Python),
                ("Scripts/report_weekly.py", Dialect::Python),
            ],
            &["format_report", "format_header"],
            0.8,
        );
        assert_eq!(suggest_target_name(0, &g), "format_report_daily");
    }

    #[test]
    fn suffix_only_added_when_not_already_in_name() {
        let g = group(
            &[("a/file_utils.py", Dialect::Python), ("b/file_utils.py", Dialect::Python)],
            &["get_file", "put_file"],
            0.8,
        );
        assert_eq!(suggest_target_name(0, &g), "file_utils");

        let g = group(
            &[("a/string_util.py", Dialect::Python), ("b/string_util.py", Dialect::Python)],
            &["trim_str", "pad_str"],
            0.8,
        );
        assert_eq!(suggest_target_name(0, &g), "string_util_trim");

        let g = group(
            &[("x/log_helper.sh", Dialect::Shell), ("y/log_helper.sh", Dialect::Shell)],
            &["log_info", "log_warn"],
            0.8,
        );
        assert_eq!(suggest_target_name(0, &g), "helper_info_warn");

        let g = group(
            &[("a/helpdesk_sync.py", Dialect::Python), ("b/helpdesk_sync.py", Dialect::Python)],
            &["open_ticket", "close_ticket"],
            0.8,
        );
        assert_eq!(suggest_target_name(0, &g), "helpdesk_sync_ticket_helpers");
    }

    #[test]
    fn name_falls_back_when_no_word_is_long_enough() {
        let g = group(
            &[("a/x.py", Dialect::Python), ("b/y.py", Dialect::Python)],
            &["f", "g"],
            0.8,
        );
        assert_eq!(suggest_target_name(4, &g), "group_4_shared");
    }

    #[test]
    fn primary_dialect_ties_go_to_first_seen() {
        let g = group(
            &[("a.sh", Dialect::Shell), ("b.py", Dialect::Python)],
            &["x", "y"],
            0.8,
        );
        assert_eq!(primary_dialect(&g), Some(Dialect::Shell));

        let g = group(
            &[("a.sh", Dialect::Shell), ("b.py", Dialect::Python), ("c.py", Dialect::Python)],
            &["x", "y"],
            0.8,
        );
        assert_eq!(primary_dialect(&g), Some(Dialect::Python));
    }

    #[test]
    fn thresholds_drive_action_benefit_and_inclusion() {
        let options = ConsolidateOptions::default();
        let members = [("s/alpha_tool.py", Dialect::Python), ("s/beta_tool.py", Dialect::Python)];
        let groups = vec![
            group(&members, &["load_data", "save_data"], 0.9),
            group(&members, &["load_data", "save_data"], 0.6),
            group(&members, &["load_data", "save_data"], 0.4),
            group(&members, &["load_data", "save_data"], 0.29),
        ];
        let plan = synthesize_plan(&groups, &options);

        assert_eq!(plan.len(), 3);
        let ids: Vec<usize> = plan.iter().map(|e| e.group_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!((plan[0].action, plan[0].estimated_benefit), (Action::Merge, Benefit::High));
        assert_eq!((plan[1].action, plan[1].estimated_benefit), (Action::Merge, Benefit::Medium));
        assert_eq!((plan[2].action, plan[2].estimated_benefit), (Action::Extract, Benefit::Medium));
        assert!(plan.iter().all(|e| e.similarity_score >= 0.3));
        assert_eq!(plan[0].target_path, format!("Scripts/lib/{}.py", plan[0].target_name));
    }

    #[test]
    fn plan_artifact_round_trips_through_disk() -> Result<()> {
        let dir = tempfile::tempdir().map_err(|e| Error::write("tempdir", e))?;
        let path = dir.path().join("cfg/plan.json");
        let groups = vec![group(
            &[("a/load_tool.py", Dialect::Python), ("b/load_tool.py", Dialect::Python)],
            &["load_data", "save_data"],
            0.625,
        )];
        let plan = synthesize_plan(&groups, &ConsolidateOptions::default());

        save_plan(&path, &plan)?;
        let raw = fs::read_to_string(&path).map_err(|e| Error::read(&path, e))?;
        assert!(raw.contains("\"groupId\": 0"));
        assert!(raw.contains("\"primaryDialect\": \"py\""));
        assert_eq!(load_plan(&path)?, plan);
        Ok(())
    }
}
