//! Merge-into-dispatcher: every member's helpers land in one target file,
//! each member's `main` becomes a branch keyed by the invoking script name,
//! and the members shrink to stubs that load the target.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::scan::ScriptFiles;
use crate::types::{Dialect, PlanEntry};
use crate::util::{base_name, indent_lines};

use super::blocks::{self, Definition};
use super::{
    Applied, Member, created_stamp, dir_from_member, path_from_member, quoted, read_members,
    shebang,
};

#[derive(Debug)]
struct MergedFunction {
    text: String,
    sources: Vec<String>,
}

#[derive(Debug, Default)]
struct MergeSources {
    descriptions: Vec<(String, Option<String>)>,
    imports: BTreeSet<String>,
    functions: BTreeMap<String, MergedFunction>,
    /// (script base name, dedented `main` body) in member order.
    mains: Vec<(String, String)>,
}

fn collect(dialect: Dialect, members: &[Member]) -> MergeSources {
    let mut out = MergeSources::default();
    for member in members {
        let lines: Vec<&str> = member.text.lines().collect();
        let script = base_name(&member.path).to_string();
        out.descriptions
            .push((member.path.clone(), blocks::description(dialect, &lines)));

        for statement in blocks::import_statements(dialect, &lines) {
            if let Some(statement) = normalize_import(dialect, &statement) {
                out.imports.insert(statement);
            }
        }

        let defs: Vec<Definition> = blocks::find_definitions(dialect, &lines);
        let discarded = discarded_lines(dialect, &lines, &defs);
        if !discarded.is_empty() {
            warn!(
                path = %member.path,
                count = discarded.len(),
                lines = ?discarded,
                "top-level lines are not carried into the dispatcher"
            );
        }
        let mut has_main = false;
        for def in defs {
            if def.name == "main" {
                if !has_main {
                    out.mains.push((script.clone(), def.body(&lines)));
                    has_main = true;
                }
                continue;
            }
            match out.functions.get_mut(&def.name) {
                Some(existing) => {
                    if !existing.sources.contains(&script) {
                        existing.sources.push(script.clone());
                    }
                }
                None => {
                    out.functions.insert(
                        def.name.clone(),
                        MergedFunction {
                            text: def.text(&lines),
                            sources: vec![script.clone()],
                        },
                    );
                }
            }
        }
        if !has_main {
            debug!(path = %member.path, "script has no main, no dispatcher branch");
        }
    }

    for statement in base_imports(dialect) {
        out.imports.insert((*statement).to_string());
    }
    out
}

/// Column-zero statements that are neither imports, definitions, comments
/// nor the entry-point call; the dispatcher drops them.
fn discarded_lines(dialect: Dialect, lines: &[&str], defs: &[Definition]) -> Vec<String> {
    let mut covered = vec![false; lines.len()];
    let spans = blocks::import_spans(dialect, lines)
        .into_iter()
        .map(|span| (span.start, span.end))
        .chain(defs.iter().map(|def| (def.start, def.end)));
    for (start, end) in spans {
        for flag in &mut covered[start..end.min(lines.len())] {
            *flag = true;
        }
    }

    lines
        .iter()
        .zip(covered)
        .filter(|(line, covered)| {
            !covered
                && !line.trim().is_empty()
                && !line.starts_with([' ', '\t'])
                && !blocks::is_comment(dialect, line)
                && !is_entry_point(line)
        })
        .map(|(line, _)| line.trim_end().to_string())
        .collect()
}

fn is_entry_point(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("if __name__")
        || trimmed.starts_with("main(")
        || trimmed.starts_with("main \"$@\"")
        || trimmed == "main"
        || trimmed == "}"
}

fn base_imports(dialect: Dialect) -> &'static [&'static str] {
    match dialect {
        Dialect::Python => &["import os", "import sys"],
        Dialect::Shell => &[],
        Dialect::JavaScript => &["const path = require('path');"],
    }
}

/// JavaScript `require` lines are keyed with single quotes so the same module
/// is never bound twice; the dispatcher brings its own `path` binding.
fn normalize_import(dialect: Dialect, statement: &str) -> Option<String> {
    if dialect != Dialect::JavaScript {
        return Some(statement.to_string());
    }
    let normalized = statement.replace('"', "'");
    let binding = normalized
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .trim_end_matches('=');
    if normalized.contains("require(") && binding == "path" {
        return None;
    }
    if normalized.ends_with(';') {
        Some(normalized)
    } else {
        Some(format!("{normalized};"))
    }
}

fn header(dialect: Dialect, entry: &PlanEntry, sources: &MergeSources) -> Vec<String> {
    let c = dialect.comment_prefix();
    let mut out = vec![
        shebang(dialect).to_string(),
        format!("{c} {}", base_name(&entry.target_path)),
        format!("{c} Consolidated from:"),
    ];
    for (path, description) in &sources.descriptions {
        match description {
            Some(d) => out.push(format!("{c} - {path}: {d}")),
            None => out.push(format!("{c} - {path}")),
        }
    }
    out.push(format!("{c} Created: {}", created_stamp()));
    out
}

fn push_functions(out: &mut Vec<String>, dialect: Dialect, sources: &MergeSources) {
    let c = dialect.comment_prefix();
    for (name, function) in &sources.functions {
        debug!(function = %name, sources = function.sources.len(), "merged function");
        out.push(format!("{c} Defined in: {}", function.sources.join(", ")));
        out.push(function.text.clone());
        out.push(String::new());
        if dialect == Dialect::Python {
            out.push(String::new());
        }
    }
}

fn known_scripts(sources: &MergeSources, sep: &str) -> String {
    sources
        .mains
        .iter()
        .map(|(script, _)| script.as_str())
        .collect::<Vec<_>>()
        .join(sep)
}

fn python_target(entry: &PlanEntry, sources: &MergeSources) -> String {
    let mut out = header(Dialect::Python, entry, sources);
    out.push(String::new());
    out.extend(sources.imports.iter().cloned());
    out.push(String::new());
    out.push(String::new());
    push_functions(&mut out, Dialect::Python, sources);

    out.push("def _script_name_from_argv0():".to_string());
    out.push("    return os.path.basename(sys.argv[0])".to_string());
    out.push(String::new());
    out.push(String::new());
    out.push("def main():".to_string());
    out.push("    script = _script_name_from_argv0()".to_string());

    let fallback = [
        "print(f\"Unknown script name: {script}\", file=sys.stderr)".to_string(),
        format!(
            "print({}, file=sys.stderr)",
            quoted(&format!("Known scripts: {}", known_scripts(sources, ", ")))
        ),
        "return 1".to_string(),
    ];
    if sources.mains.is_empty() {
        out.extend(fallback.iter().map(|line| format!("    {line}")));
    } else {
        for (idx, (script, body)) in sources.mains.iter().enumerate() {
            let keyword = if idx == 0 { "if" } else { "elif" };
            out.push(format!("    {keyword} script == {}:", quoted(script)));
            if body.trim().is_empty() {
                out.push("        pass".to_string());
            } else {
                out.push(indent_lines(body, "        "));
            }
        }
        out.push("    else:".to_string());
        out.extend(fallback.iter().map(|line| format!("        {line}")));
        out.push("    return 0".to_string());
    }

    out.push(String::new());
    out.push(String::new());
    out.push("if __name__ == \"__main__\":".to_string());
    out.push("    sys.exit(main())".to_string());
    out.push(String::new());
    out.join("\n")
}

fn shell_target(entry: &PlanEntry, sources: &MergeSources) -> String {
    let mut out = header(Dialect::Shell, entry, sources);
    out.push(String::new());
    if !sources.imports.is_empty() {
        out.extend(sources.imports.iter().cloned());
        out.push(String::new());
    }
    push_functions(&mut out, Dialect::Shell, sources);

    out.push("main() {".to_string());
    out.push("    local script".to_string());
    out.push("    script=\"$(basename \"$0\")\"".to_string());
    out.push("    case \"$script\" in".to_string());
    for (script, body) in &sources.mains {
        out.push(format!("        {})", quoted(script)));
        if !body.trim().is_empty() {
            out.push(indent_lines(body, "            "));
        }
        out.push("            ;;".to_string());
    }
    out.push("        *)".to_string());
    out.push("            echo \"Unknown script name: $script\" >&2".to_string());
    out.push(format!(
        "            echo {} >&2",
        quoted(&format!("Known scripts: {}", known_scripts(sources, " ")))
    ));
    out.push("            return 1".to_string());
    out.push("            ;;".to_string());
    out.push("    esac".to_string());
    out.push("}".to_string());
    out.push(String::new());
    out.push("if [[ \"${BASH_SOURCE[0]}\" == \"$0\" ]]; then".to_string());
    out.push("    main \"$@\"".to_string());
    out.push("fi".to_string());
    out.push(String::new());
    out.join("\n")
}

fn javascript_target(entry: &PlanEntry, sources: &MergeSources) -> String {
    let mut out = header(Dialect::JavaScript, entry, sources);
    out.push(String::new());
    out.extend(sources.imports.iter().cloned());
    out.push(String::new());
    push_functions(&mut out, Dialect::JavaScript, sources);

    out.push("function main() {".to_string());
    out.push("  const script = path.basename(process.argv[1] || '');".to_string());
    let fallback = [
        "console.error(`Unknown script name: ${script}`);".to_string(),
        format!(
            "console.error({});",
            quoted(&format!("Known scripts: {}", known_scripts(sources, ", ")))
        ),
        "return 1;".to_string(),
    ];
    if sources.mains.is_empty() {
        out.extend(fallback.iter().map(|line| format!("  {line}")));
    } else {
        for (idx, (script, body)) in sources.mains.iter().enumerate() {
            let open = if idx == 0 { "  if" } else { "  } else if" };
            out.push(format!("{open} (script === {}) {{", quoted(script)));
            if !body.trim().is_empty() {
                out.push(indent_lines(body, "    "));
            }
        }
        out.push("  } else {".to_string());
        out.extend(fallback.iter().map(|line| format!("    {line}")));
        out.push("  }".to_string());
        out.push("  return 0;".to_string());
    }
    out.push("}".to_string());
    out.push(String::new());

    let mut exports: Vec<&str> = sources.functions.keys().map(String::as_str).collect();
    exports.push("main");
    out.push(format!("module.exports = {{ {} }};", exports.join(", ")));
    out.push(String::new());
    out.push("if (require.main === module) {".to_string());
    out.push("  process.exitCode = main();".to_string());
    out.push("}".to_string());
    out.push(String::new());
    out.join("\n")
}

fn stub(dialect: Dialect, member: &str, entry: &PlanEntry) -> String {
    let script = base_name(member);
    let c = dialect.comment_prefix();
    let note = format!("{c} {script}: merged into {}", entry.target_path);
    let lines: Vec<String> = match dialect {
        Dialect::Python => vec![
            shebang(dialect).to_string(),
            note,
            "import os".to_string(),
            "import sys".to_string(),
            String::new(),
            "SCRIPT_DIR = os.path.dirname(os.path.abspath(__file__))".to_string(),
            format!(
                "sys.path.insert(0, os.path.join(SCRIPT_DIR, {}))",
                quoted(&dir_from_member(member, &entry.target_path))
            ),
            String::new(),
            format!("from {} import *  # noqa: F401,F403", entry.target_name),
            format!("from {} import main", entry.target_name),
            String::new(),
            "if __name__ == \"__main__\":".to_string(),
            "    sys.exit(main())".to_string(),
        ],
        Dialect::Shell => vec![
            shebang(dialect).to_string(),
            note,
            "SCRIPT_DIR=\"$(cd \"$(dirname \"${BASH_SOURCE[0]}\")\" && pwd)\"".to_string(),
            format!(
                "source \"$SCRIPT_DIR/{}\"",
                path_from_member(member, &entry.target_path)
            ),
            String::new(),
            "if [[ \"${BASH_SOURCE[0]}\" == \"$0\" ]]; then".to_string(),
            "    main \"$@\"".to_string(),
            "fi".to_string(),
        ],
        Dialect::JavaScript => vec![
            shebang(dialect).to_string(),
            note,
            "const path = require('path');".to_string(),
            String::new(),
            "const SCRIPT_DIR = __dirname;".to_string(),
            format!(
                "const merged = require(path.join(SCRIPT_DIR, {}));",
                quoted(&path_from_member(member, &entry.target_path))
            ),
            "Object.assign(globalThis, merged);".to_string(),
            "module.exports = merged;".to_string(),
            String::new(),
            "if (require.main === module) {".to_string(),
            "  process.exitCode = merged.main();".to_string(),
            "}".to_string(),
        ],
    };
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

pub(super) fn merge_group(files: &ScriptFiles, entry: &PlanEntry) -> Result<Applied> {
    let dialect = entry.primary_dialect;
    let mut applied = Applied::default();
    let members = read_members(files, entry, &mut applied);
    if members.is_empty() {
        return Err(Error::Plan(format!(
            "group {} has no readable scripts",
            entry.group_id
        )));
    }

    let sources = collect(dialect, &members);
    let target = match dialect {
        Dialect::Python => python_target(entry, &sources),
        Dialect::Shell => shell_target(entry, &sources),
        Dialect::JavaScript => javascript_target(entry, &sources),
    };
    files.write(&entry.target_path, &target, true)?;
    files.make_executable(&entry.target_path)?;
    debug!(
        target = %entry.target_path,
        functions = sources.functions.len(),
        branches = sources.mains.len(),
        "dispatcher written"
    );

    for member in &members {
        let text = stub(dialect, &member.path, entry);
        if let Err(err) = files.write(&member.path, &text, true) {
            warn!(path = %member.path, error = %err, "stub write failed");
            return Err(err);
        }
        applied.modified.push(member.path.clone());
    }
    Ok(applied)
}
