mod config;
mod duplicates;
mod error;
mod extract;
mod pipeline;
mod plan;
mod report;
mod rewrite;
mod scan;
mod similarity;
mod types;
mod util;

pub use config::{ConfigStore, DEFAULT_CONFIG_PATH};

pub use duplicates::{FunctionIndex, group_candidates};

pub use error::{Error, ErrorCode, Incident, IncidentLog, Result};

pub use extract::{Extraction, extract};

pub use pipeline::{Analysis, Consolidator, analyze_scripts};

pub use plan::{
    load_plan, primary_dialect, save_plan, suggest_target_name, synthesize_plan, target_path,
};

pub use report::{generate_report, render_report};

pub use rewrite::{Rewriter, load_results, save_results, select_entries};

pub use scan::{RegistryEntry, ScriptFiles, content_hash, load_registry, parse_registry};

pub use similarity::{combined_score, score_groups, structural_similarity, textual_similarity};

pub use types::{
    Action, AnalysisStats, Benefit, CandidateGroup, ConsolidateOptions,
    DEFAULT_MAX_FILE_SIZE_BYTES, Dialect, EntryState, ExecutionResult, PlanEntry, ScriptRecord,
    default_ignore_dirs,
};
