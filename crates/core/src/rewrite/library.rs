//! Extract-to-library: shared definitions move into one library file and
//! every member imports them from there instead.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::scan::ScriptFiles;
use crate::types::{ConsolidateOptions, Dialect, PlanEntry};
use crate::util::{base_name, collapse_blank_lines};

use super::blocks;
use super::{
    Applied, created_stamp, dir_from_member, path_from_member, quoted, read_members, shebang,
};

const PREAMBLE_MARKER: &str = "SCRIPT_DIR";

fn py_plain_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^import\s+(.+)$").expect("valid regex literal"))
}

fn js_path_binding() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:const|let|var)\s+path\s*=").expect("valid regex literal"))
}

fn library_text(
    entry: &PlanEntry,
    sources: &[String],
    imports: &BTreeSet<String>,
    definitions: &BTreeMap<&str, String>,
) -> String {
    let dialect = entry.primary_dialect;
    let c = dialect.comment_prefix();
    let mut out = vec![
        shebang(dialect).to_string(),
        format!("{c} {}", base_name(&entry.target_path)),
        format!("{c} Shared functions extracted from:"),
    ];
    out.extend(sources.iter().map(|path| format!("{c} - {path}")));
    out.push(format!("{c} Created: {}", created_stamp()));
    out.push(String::new());

    let kept: Vec<&String> = imports
        .iter()
        .filter(|statement| {
            !entry
                .shared_functions
                .iter()
                .any(|name| statement.contains(name.as_str()))
        })
        .collect();
    if !kept.is_empty() {
        out.extend(kept.into_iter().cloned());
        out.push(String::new());
    }
    if dialect == Dialect::Python {
        out.push(String::new());
    }

    let mut exported: Vec<&str> = Vec::new();
    for name in &entry.shared_functions {
        let Some(text) = definitions.get(name.as_str()) else {
            continue;
        };
        out.push(text.clone());
        out.push(String::new());
        if dialect == Dialect::Python {
            out.push(String::new());
        }
        exported.push(name);
    }

    if dialect == Dialect::JavaScript {
        out.push(format!("module.exports = {{ {} }};", exported.join(", ")));
        out.push(String::new());
    }
    while out.last().is_some_and(String::is_empty) {
        out.pop();
    }
    let mut text = out.join("\n");
    text.push('\n');
    text
}

fn import_pattern<'o>(options: &'o ConsolidateOptions, member: &str) -> Option<&'o str> {
    let ext = std::path::Path::new(member).extension()?.to_str()?;
    options
        .import_patterns
        .get(&format!(".{ext}"))
        .or_else(|| options.import_patterns.get(ext))
        .map(String::as_str)
}

/// The single statement that pulls `exported` into `member`.
fn library_import(
    options: &ConsolidateOptions,
    entry: &PlanEntry,
    exported: &[String],
    member: &str,
) -> String {
    let functions = exported.join(", ");
    let lib_path = path_from_member(member, &entry.target_path);
    if let Some(pattern) = import_pattern(options, member) {
        return pattern
            .replace("{module}", &entry.target_name)
            .replace("{functions}", &functions)
            .replace("{path}", &lib_path);
    }
    match entry.primary_dialect {
        Dialect::Python => format!("from {} import {functions}", entry.target_name),
        Dialect::Shell => format!("source \"$SCRIPT_DIR/{lib_path}\""),
        Dialect::JavaScript => format!(
            "const {{ {functions} }} = require(path.join(SCRIPT_DIR, {}));",
            quoted(&lib_path)
        ),
    }
}

fn preamble(dialect: Dialect, member: &str, entry: &PlanEntry) -> Vec<String> {
    let c = dialect.comment_prefix();
    match dialect {
        Dialect::Python => vec![
            format!("{c} Add lib directory to path"),
            "SCRIPT_DIR = os.path.dirname(os.path.abspath(__file__))".to_string(),
            format!(
                "sys.path.append(os.path.join(SCRIPT_DIR, {}))",
                quoted(&dir_from_member(member, &entry.target_path))
            ),
        ],
        Dialect::Shell => vec![
            "SCRIPT_DIR=\"$(cd \"$(dirname \"${BASH_SOURCE[0]}\")\" && pwd)\"".to_string(),
        ],
        Dialect::JavaScript => vec!["const SCRIPT_DIR = __dirname;".to_string()],
    }
}

fn python_has_module(lines: &[String], module: &str) -> bool {
    lines.iter().any(|line| {
        py_plain_import().captures(line).is_some_and(|caps| {
            caps[1]
                .split(',')
                .any(|part| part.split_whitespace().next() == Some(module))
        })
    })
}

fn missing_base_imports(dialect: Dialect, lines: &[String]) -> Vec<String> {
    match dialect {
        Dialect::Python => ["os", "sys"]
            .into_iter()
            .filter(|module| !python_has_module(lines, module))
            .map(|module| format!("import {module}"))
            .collect(),
        Dialect::Shell => Vec::new(),
        Dialect::JavaScript => {
            if lines.iter().any(|line| js_path_binding().is_match(line)) {
                Vec::new()
            } else {
                vec!["const path = require('path');".to_string()]
            }
        }
    }
}

fn borrowed(lines: &[String]) -> Vec<&str> {
    lines.iter().map(String::as_str).collect()
}

/// Rewrites one member: shared definitions removed, base imports and the
/// path-setup preamble ensured, the library import placed after the last
/// leading import statement.
fn rewrite_member(
    dialect: Dialect,
    text: &str,
    shared: &[String],
    import_line: &str,
    preamble: &[String],
) -> String {
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();

    let mut doomed: Vec<(usize, usize)> = blocks::find_definitions(dialect, &borrowed(&lines))
        .into_iter()
        .filter(|def| shared.iter().any(|name| *name == def.name))
        .map(|def| (def.start, def.end))
        .collect();
    doomed.sort_unstable();
    for (start, end) in doomed.into_iter().rev() {
        lines.drain(start..end);
    }

    let missing = missing_base_imports(dialect, &lines);
    if !missing.is_empty() {
        let at = {
            let view = borrowed(&lines);
            blocks::import_spans(dialect, &view)
                .first()
                .map_or_else(|| blocks::header_end(dialect, &view), |span| span.start)
        };
        lines.splice(at..at, missing);
    }

    let (anchor, has_preamble) = {
        let view = borrowed(&lines);
        let first_def = blocks::find_definitions(dialect, &view)
            .first()
            .map_or(view.len(), |def| def.start);
        let anchor = blocks::import_spans(dialect, &view)
            .into_iter()
            .filter(|span| span.start < first_def)
            .last()
            .map_or_else(|| blocks::header_end(dialect, &view), |span| span.end);

        match view.iter().position(|line| line.contains(PREAMBLE_MARKER)) {
            Some(marker) if marker >= anchor => {
                let mut end = marker;
                while end < view.len() && !view[end].trim().is_empty() {
                    end += 1;
                }
                (end, true)
            }
            Some(_) => (anchor, true),
            None => (anchor, false),
        }
    };

    let already_imported = lines.iter().any(|line| line.trim() == import_line.trim());
    let mut insert: Vec<String> = vec![String::new()];
    if !has_preamble {
        insert.extend(preamble.iter().cloned());
        insert.push(String::new());
    }
    if !already_imported {
        insert.push(format!("{} Import from shared library", dialect.comment_prefix()));
        insert.push(import_line.to_string());
        insert.push(String::new());
    }
    if insert.len() > 1 {
        lines.splice(anchor..anchor, insert);
    }

    let mut out = collapse_blank_lines(&lines.join("\n"));
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

pub(super) fn extract_group(
    files: &ScriptFiles,
    options: &ConsolidateOptions,
    entry: &PlanEntry,
) -> Result<Applied> {
    let dialect = entry.primary_dialect;
    let mut applied = Applied::default();
    let members = read_members(files, entry, &mut applied);

    let mut imports: BTreeSet<String> = BTreeSet::new();
    let mut definitions: BTreeMap<&str, String> = BTreeMap::new();
    for member in &members {
        let lines: Vec<&str> = member.text.lines().collect();
        imports.extend(blocks::import_statements(dialect, &lines));
        for def in blocks::find_definitions(dialect, &lines) {
            let Some(name) = entry
                .shared_functions
                .iter()
                .find(|name| **name == def.name)
            else {
                continue;
            };
            definitions
                .entry(name.as_str())
                .or_insert_with(|| def.text(&lines));
        }
    }
    let mut exported: Vec<String> = Vec::new();
    for name in &entry.shared_functions {
        if definitions.contains_key(name.as_str()) {
            exported.push(name.clone());
        } else {
            warn!(group_id = entry.group_id, function = %name, "no top-level definition found");
        }
    }
    if exported.is_empty() {
        return Err(Error::Rewrite(format!(
            "no shared function of group {} has a top-level definition",
            entry.group_id
        )));
    }

    let sources: Vec<String> = members.iter().map(|m| m.path.clone()).collect();
    let library = library_text(entry, &sources, &imports, &definitions);
    files.write(&entry.target_path, &library, true)?;
    debug!(
        target = %entry.target_path,
        functions = definitions.len(),
        "library written"
    );

    for member in &members {
        let import_line = library_import(options, entry, &exported, &member.path);
        let preamble = preamble(dialect, &member.path, entry);
        let updated = rewrite_member(
            dialect,
            &member.text,
            &exported,
            &import_line,
            &preamble,
        );
        match files.write(&member.path, &updated, true) {
            Ok(()) => applied.modified.push(member.path.clone()),
            Err(err) => {
                warn!(path = %member.path, error = %err, "failed to update script");
                applied.skipped += 1;
            }
        }
    }
    Ok(applied)
}
