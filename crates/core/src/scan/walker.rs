use std::collections::HashSet;
use std::io;
use std::path::Path;

use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::types::{AnalysisStats, ConsolidateOptions, Dialect};
use crate::util::{normalize_path, to_slash};

use super::RegistryEntry;

fn ignore_dirs_contains(ignore_dirs: &HashSet<String>, name: &str) -> bool {
    if ignore_dirs.contains(name) {
        return true;
    }
    #[cfg(windows)]
    {
        ignore_dirs.iter().any(|d| d.eq_ignore_ascii_case(name))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

fn registry_path(root: &Path, abs_path: &Path) -> String {
    match abs_path.strip_prefix(root) {
        Ok(rel) => to_slash(rel),
        Err(_) => to_slash(abs_path),
    }
}

/// Walks every discovery root (gitignore-aware) and returns one registry
/// entry per script with a recognised extension, sorted by path.
pub(crate) fn discover_scripts(
    options: &ConsolidateOptions,
    stats: &mut AnalysisStats,
) -> Vec<RegistryEntry> {
    let root = normalize_path(&options.root);
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<RegistryEntry> = Vec::new();

    for discover_root in &options.discover_roots {
        let walk_root = normalize_path(&options.resolve(discover_root));
        if !walk_root.is_dir() {
            warn!(root = %walk_root.display(), "discovery root is not a directory");
            stats.skipped_walk_errors = stats.skipped_walk_errors.saturating_add(1);
            continue;
        }

        let ignore_dirs = options.ignore_dirs.clone();
        let is_git_repo = walk_root.join(".git").exists();
        let mut builder = WalkBuilder::new(&walk_root);
        builder
            .hidden(false)
            .follow_links(false)
            .ignore(false)
            .git_ignore(true)
            .git_global(is_git_repo)
            .git_exclude(is_git_repo)
            .parents(false)
            .require_git(false);

        let walker = builder
            .filter_entry(move |entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                if !is_dir {
                    return true;
                }
                match entry.file_name().to_str() {
                    Some(name) => !ignore_dirs_contains(&ignore_dirs, name),
                    None => true,
                }
            })
            .build();

        for result in walker {
            let entry = match result {
                Ok(e) => e,
                Err(err) => {
                    match err.io_error().map(io::Error::kind) {
                        Some(io::ErrorKind::NotFound) => {
                            stats.skipped_not_found = stats.skipped_not_found.saturating_add(1);
                        }
                        Some(io::ErrorKind::PermissionDenied) => {
                            stats.skipped_permission_denied =
                                stats.skipped_permission_denied.saturating_add(1);
                        }
                        _ => {
                            stats.skipped_walk_errors = stats.skipped_walk_errors.saturating_add(1);
                        }
                    }
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let Some(dialect) = Dialect::from_path(entry.path()) else {
                continue;
            };

            let path = registry_path(&root, entry.path());
            if !seen.insert(path.clone()) {
                continue;
            }
            debug!(path = %path, %dialect, "discovered script");
            stats.discovered_files = stats.discovered_files.saturating_add(1);
            out.push(RegistryEntry { path, dialect });
        }
    }

    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}
