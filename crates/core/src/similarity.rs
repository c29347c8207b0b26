use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use tracing::debug;

use crate::types::{CandidateGroup, ScriptRecord};
use crate::util::token_set;

fn jaccard<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Mean pairwise Jaccard over function-name sets. Pairs where either side
/// defines nothing are not scored.
pub fn structural_similarity(sets: &[BTreeSet<&str>]) -> f64 {
    let hashed: Vec<HashSet<&str>> = sets.iter().map(|s| s.iter().copied().collect()).collect();
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..hashed.len() {
        for j in (i + 1)..hashed.len() {
            if hashed[i].is_empty() || hashed[j].is_empty() {
                continue;
            }
            total += jaccard(&hashed[i], &hashed[j]);
            pairs += 1;
        }
    }
    if pairs == 0 { 0.0 } else { total / pairs as f64 }
}

/// Mean pairwise Jaccard over lowercased whitespace tokens. `None` marks an
/// unreadable script: its pairs are skipped. Two empty texts count as a
/// scored pair with similarity 0.
pub fn textual_similarity(texts: &[Option<&str>]) -> f64 {
    let tokens: Vec<Option<HashSet<String>>> =
        texts.iter().map(|t| t.map(token_set)).collect();
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..tokens.len() {
        for j in (i + 1)..tokens.len() {
            let (Some(a), Some(b)) = (&tokens[i], &tokens[j]) else {
                continue;
            };
            total += jaccard(a, b);
            pairs += 1;
        }
    }
    if pairs == 0 { 0.0 } else { total / pairs as f64 }
}

pub fn combined_score(structural: f64, textual: f64) -> f64 {
    ((structural + textual) / 2.0).clamp(0.0, 1.0)
}

/// Fills the three scores of every group and re-sorts descending by the
/// combined score, keeping the incoming order among ties.
pub fn score_groups(
    groups: &mut [CandidateGroup],
    records: &[ScriptRecord],
    texts: &HashMap<String, String>,
) {
    let by_path: HashMap<&str, &ScriptRecord> =
        records.iter().map(|r| (r.path.as_str(), r)).collect();

    for group in groups.iter_mut() {
        let sets: Vec<BTreeSet<&str>> = group
            .scripts
            .iter()
            .map(|path| {
                by_path
                    .get(path.as_str())
                    .map(|r| r.function_set())
                    .unwrap_or_default()
            })
            .collect();
        let bodies: Vec<Option<&str>> = group
            .scripts
            .iter()
            .map(|path| texts.get(path).map(String::as_str))
            .collect();

        group.structural_score = structural_similarity(&sets).clamp(0.0, 1.0);
        group.textual_score = textual_similarity(&bodies).clamp(0.0, 1.0);
        group.combined_score = combined_score(group.structural_score, group.textual_score);
        debug!(
            scripts = group.scripts.len(),
            structural = group.structural_score,
            textual = group.textual_score,
            combined = group.combined_score,
            "scored group"
        );
    }

    groups.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
}
