use std::io::{self, Write};

use script_consolidate_core::{Analysis, AnalysisStats, CandidateGroup, ExecutionResult, PlanEntry};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JsonCandidateGroup<'a> {
    pub(crate) rank: usize,
    pub(crate) scripts: &'a [String],
    pub(crate) shared_functions: &'a [String],
    pub(crate) structural_score: f64,
    pub(crate) textual_score: f64,
    pub(crate) combined_score: f64,
}

impl<'a> JsonCandidateGroup<'a> {
    fn new(rank: usize, group: &'a CandidateGroup) -> Self {
        Self {
            rank,
            scripts: &group.scripts,
            shared_functions: &group.shared_functions,
            structural_score: group.structural_score,
            textual_score: group.textual_score,
            combined_score: group.combined_score,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JsonAnalysis<'a> {
    pub(crate) stats: &'a AnalysisStats,
    pub(crate) groups: Vec<JsonCandidateGroup<'a>>,
}

impl<'a> From<&'a Analysis> for JsonAnalysis<'a> {
    fn from(analysis: &'a Analysis) -> Self {
        Self {
            stats: &analysis.stats,
            groups: analysis
                .groups
                .iter()
                .enumerate()
                .map(|(rank, group)| JsonCandidateGroup::new(rank, group))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JsonRun<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) analysis: Option<JsonAnalysis<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) plan: Option<&'a [PlanEntry]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) results: Option<&'a [ExecutionResult]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) report_path: Option<String>,
}

pub(crate) fn write_json<T: Serialize>(value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::other(format!("json encode: {e}")))?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}")
}
