use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dialect {
    #[serde(rename = "py")]
    Python,
    #[serde(rename = "sh")]
    Shell,
    #[serde(rename = "js")]
    JavaScript,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::Python, Dialect::Shell, Dialect::JavaScript];

    /// Registry `Type` cells are free-form ("Python (py)", "bash/sh", ...), so
    /// the tag is matched by substring in a fixed order.
    pub fn from_type_tag(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_ascii_lowercase();
        if lower.is_empty() {
            return None;
        }
        if lower.contains("py") {
            Some(Self::Python)
        } else if lower.contains("sh") {
            Some(Self::Shell)
        } else if lower.contains("js") || lower.contains("javascript") {
            Some(Self::JavaScript)
        } else {
            None
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "py" => Some(Self::Python),
            "sh" | "bash" => Some(Self::Shell),
            "js" | "mjs" | "cjs" => Some(Self::JavaScript),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Python => "py",
            Self::Shell => "sh",
            Self::JavaScript => "js",
        }
    }

    pub fn comment_prefix(self) -> &'static str {
        match self {
            Self::Python | Self::Shell => "#",
            Self::JavaScript => "//",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRecord {
    pub path: String,
    pub dialect: Dialect,
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    pub imports: BTreeSet<String>,
}

impl ScriptRecord {
    pub fn new(path: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            path: path.into(),
            dialect,
            functions: Vec::new(),
            classes: Vec::new(),
            imports: BTreeSet::new(),
        }
    }

    pub fn function_set(&self) -> BTreeSet<&str> {
        self.functions.iter().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateGroup {
    pub scripts: Vec<String>,
    pub shared_functions: Vec<String>,
    pub dialects: BTreeMap<String, Dialect>,
    pub structural_score: f64,
    pub textual_score: f64,
    pub combined_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Merge,
    Extract,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Merge => "merge",
            Self::Extract => "extract",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Benefit {
    High,
    Medium,
}

impl fmt::Display for Benefit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::High => "high",
            Self::Medium => "medium",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntry {
    pub group_id: usize,
    pub scripts: Vec<String>,
    pub shared_functions: Vec<String>,
    pub primary_dialect: Dialect,
    pub similarity_score: f64,
    pub target_name: String,
    pub target_path: String,
    pub action: Action,
    pub estimated_benefit: Benefit,
}

/// Lifecycle of one plan entry during execution. Every entry starts
/// `Pending` and ends in exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    Pending,
    Merged,
    Extracted,
    Failed,
}

impl EntryState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub group_id: usize,
    pub state: EntryState,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
    #[serde(default)]
    pub modified_scripts: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct ConsolidateOptions {
    pub root: PathBuf,
    pub registry_path: PathBuf,
    pub plan_path: PathBuf,
    pub results_path: PathBuf,
    pub report_path: PathBuf,
    pub backup_dir: PathBuf,
    pub lib_dir: PathBuf,
    pub log_path: PathBuf,
    pub incident_dir: PathBuf,
    pub discover_roots: Vec<PathBuf>,
    pub ignore_dirs: HashSet<String>,
    pub max_file_size: Option<u64>,
    pub min_shared_functions: usize,
    pub min_combined_score: f64,
    pub merge_threshold: f64,
    pub high_benefit_threshold: f64,
    /// Library import line per file extension (".py"), with `{module}`,
    /// `{functions}` and `{path}` placeholders.
    pub import_patterns: BTreeMap<String, String>,
}

pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 4 * 1024 * 1024;

impl Default for ConsolidateOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            registry_path: PathBuf::from("System/Configuration/script_database.csv"),
            plan_path: PathBuf::from("System/Configuration/script_consolidation_plan.json"),
            results_path: PathBuf::from("System/Configuration/script_consolidation_results.json"),
            report_path: PathBuf::from("Dashboards/System/script_consolidation_report.md"),
            backup_dir: PathBuf::from("System/Backups"),
            lib_dir: PathBuf::from("Scripts/lib"),
            log_path: PathBuf::from("System/Logs/script_consolidation.log"),
            incident_dir: PathBuf::from("System/Logs/Errors"),
            discover_roots: Vec::new(),
            ignore_dirs: default_ignore_dirs(),
            max_file_size: Some(DEFAULT_MAX_FILE_SIZE_BYTES),
            min_shared_functions: 2,
            min_combined_score: 0.3,
            merge_threshold: 0.5,
            high_benefit_threshold: 0.7,
            import_patterns: BTreeMap::new(),
        }
    }
}

impl ConsolidateOptions {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Relative option paths are anchored at `root`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

pub fn default_ignore_dirs() -> HashSet<String> {
    [
        ".git",
        ".hg",
        ".svn",
        "node_modules",
        "target",
        "dist",
        "build",
        ".cache",
        "__pycache__",
        ".venv",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStats {
    pub registry_rows: u64,
    pub skipped_malformed_rows: u64,
    pub skipped_unknown_dialect: u64,
    pub discovered_files: u64,
    pub scanned_scripts: u64,
    pub scanned_bytes: u64,
    pub skipped_not_found: u64,
    pub skipped_permission_denied: u64,
    pub skipped_too_large: u64,
    pub skipped_binary: u64,
    pub skipped_read_errors: u64,
    pub skipped_walk_errors: u64,
    pub indexed_functions: u64,
    pub duplicated_functions: u64,
    pub candidate_groups: u64,
}
