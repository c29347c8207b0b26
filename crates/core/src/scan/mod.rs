use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{AnalysisStats, ConsolidateOptions, Dialect};

mod files;
mod walker;


pub use files::{ScriptFiles, content_hash};
pub(crate) use files::ReadSkip;
pub(crate) use walker::discover_scripts;

/// One row of the script registry that survived validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub path: String,
    pub dialect: Dialect,
}

/// Parses a comma-delimited registry with a header row. Rows without a usable
/// `Path` cell, rows the reader rejects and rows with an unrecognised dialect
/// are skipped and counted.
pub fn parse_registry(text: &str, stats: &mut AnalysisStats) -> Result<Vec<RegistryEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| Error::Registry(format!("unreadable registry header: {e}")))?
        .clone();
    if headers.iter().all(str::is_empty) {
        return Ok(Vec::new());
    }
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let path_idx = column("path")
        .ok_or_else(|| Error::Registry("registry header has no Path column".to_string()))?;
    let type_idx = column("type");

    let mut out: Vec<RegistryEntry> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for record in reader.records() {
        stats.registry_rows = stats.registry_rows.saturating_add(1);
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                debug!(error = %err, "unreadable registry row");
                stats.skipped_malformed_rows = stats.skipped_malformed_rows.saturating_add(1);
                continue;
            }
        };
        let line = record.position().map(|p| p.line());

        let Some(path) = record.get(path_idx).filter(|p| !p.is_empty()) else {
            debug!(line, "registry row has no path");
            stats.skipped_malformed_rows = stats.skipped_malformed_rows.saturating_add(1);
            continue;
        };

        let dialect = type_idx
            .and_then(|idx| record.get(idx))
            .and_then(Dialect::from_type_tag)
            .or_else(|| Dialect::from_path(Path::new(path)));
        let Some(dialect) = dialect else {
            debug!(path, "no known dialect for registry row");
            stats.skipped_unknown_dialect = stats.skipped_unknown_dialect.saturating_add(1);
            continue;
        };

        let entry = RegistryEntry {
            path: path.to_string(),
            dialect,
        };
        match positions.get(path) {
            Some(&idx) => out[idx] = entry,
            None => {
                positions.insert(path.to_string(), out.len());
                out.push(entry);
            }
        }
    }

    Ok(out)
}

/// Loads the registry file; when it does not exist, falls back to walking
/// the configured discovery roots.
pub fn load_registry(
    options: &ConsolidateOptions,
    stats: &mut AnalysisStats,
) -> Result<Vec<RegistryEntry>> {
    let registry_path = options.resolve(&options.registry_path);
    match fs::read_to_string(&registry_path) {
        Ok(text) => {
            let entries = parse_registry(&text, stats)?;
            info!(
                path = %registry_path.display(),
                scripts = entries.len(),
                "loaded script registry"
            );
            Ok(entries)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound && !options.discover_roots.is_empty() => {
            info!(
                path = %registry_path.display(),
                "registry not found, discovering scripts"
            );
            Ok(discover_scripts(options, stats))
        }
        Err(err) => {
            if err.kind() == io::ErrorKind::NotFound {
                warn!(path = %registry_path.display(), "registry not found");
            }
            Err(Error::read(registry_path, err))
        }
    }
}
