use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::types::{CandidateGroup, ScriptRecord};

/// Function name -> every script that defines it. A script defining the
/// same name twice is listed once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionIndex {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl FunctionIndex {
    pub fn build(records: &[ScriptRecord]) -> Self {
        let mut entries: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for record in records {
            for name in &record.functions {
                entries
                    .entry(name.clone())
                    .or_default()
                    .insert(record.path.clone());
            }
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn scripts_defining(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Names defined by more than one script, alphabetically.
    pub fn duplicated(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.iter().filter(|(_, scripts)| scripts.len() > 1)
    }
}

/// Groups scripts by the exact set of scripts defining each duplicated name.
/// A defining set becomes a candidate group once it shares at least
/// `min_shared` names. Scores are left at zero for the similarity pass.
pub fn group_candidates(
    index: &FunctionIndex,
    records: &[ScriptRecord],
    min_shared: usize,
) -> Vec<CandidateGroup> {
    let mut by_scripts: BTreeMap<Vec<&str>, Vec<&str>> = BTreeMap::new();
    for (name, scripts) in index.duplicated() {
        let key: Vec<&str> = scripts.iter().map(String::as_str).collect();
        by_scripts.entry(key).or_default().push(name);
    }

    let dialect_of: BTreeMap<&str, _> = records
        .iter()
        .map(|r| (r.path.as_str(), r.dialect))
        .collect();

    let mut out = Vec::new();
    for (scripts, names) in by_scripts {
        if names.len() < min_shared.max(1) {
            continue;
        }
        let dialects = scripts
            .iter()
            .filter_map(|path| {
                dialect_of
                    .get(path)
                    .map(|dialect| ((*path).to_string(), *dialect))
            })
            .collect();
        out.push(CandidateGroup {
            scripts: scripts.iter().map(|s| (*s).to_string()).collect(),
            shared_functions: names.iter().map(|s| (*s).to_string()).collect(),
            dialects,
            structural_score: 0.0,
            textual_score: 0.0,
            combined_score: 0.0,
        });
    }
    out
}
