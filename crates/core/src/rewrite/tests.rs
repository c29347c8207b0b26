use super::*;

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use crate::types::Benefit;

fn io_err(err: Error) -> io::Error {
    io::Error::other(err.to_string())
}

fn entry(
    group_id: usize,
    scripts: &[&str],
    shared: &[&str],
    action: Action,
    dialect: Dialect,
) -> PlanEntry {
    let target_name = format!("shared_{group_id}");
    PlanEntry {
        group_id,
        scripts: scripts.iter().map(|s| (*s).to_string()).collect(),
        shared_functions: shared.iter().map(|s| (*s).to_string()).collect(),
        primary_dialect: dialect,
        similarity_score: 0.8,
        target_path: format!("Scripts/lib/{target_name}.{}", dialect.extension()),
        target_name,
        action,
        estimated_benefit: Benefit::High,
    }
}

fn snapshot_tree(root: &Path) -> io::Result<BTreeSet<(String, String)>> {
    let mut out = BTreeSet::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for item in fs::read_dir(&dir)? {
            let path = item?.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(root).map_err(io::Error::other)?;
                out.insert((to_slash(rel), fs::read_to_string(&path)?));
            }
        }
    }
    Ok(out)
}

const PY_A: &str = "#!/usr/bin/env python3\n# Build the daily report\nimport json\n\n\ndef f(x):\n    return x + 1\n\n\ndef g(y):\n    return json.dumps(y)\n\n\ndef main():\n    print(g(f(1)))\n";
const PY_B: &str = "#!/usr/bin/env python3\n# Build the weekly report\nimport json\n\n\ndef f(x):\n    return x + 1\n\n\ndef g(y):\n    return json.dumps(y)\n\n\ndef main():\n    print(g(f(7)))\n";

fn setup(files: &[(&str, &str)]) -> io::Result<(tempfile::TempDir, ConsolidateOptions)> {
    let dir = tempfile::tempdir()?;
    for (path, text) in files {
        let abs = dir.path().join(path);
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(abs, text)?;
    }
    let options = ConsolidateOptions::with_root(dir.path());
    Ok((dir, options))
}

#[test]
fn merge_writes_one_dispatcher_and_two_stubs() -> io::Result<()> {
    let (dir, options) = setup(&[("Scripts/a.py", PY_A), ("Scripts/b.py", PY_B)])?;
    let files = ScriptFiles::new(&options);
    let rewriter = Rewriter::new(&files, &options);
    let plan = entry(0, &["Scripts/a.py", "Scripts/b.py"], &["f", "g"], Action::Merge, Dialect::Python);

    let result = rewriter.execute_entry(&plan, false);
    assert!(result.success, "{}", result.message);
    assert_eq!(result.state, EntryState::Merged);
    assert_eq!(result.modified_scripts, vec!["Scripts/a.py", "Scripts/b.py"]);

    let target = fs::read_to_string(dir.path().join("Scripts/lib/shared_0.py"))?;
    assert_eq!(target.matches("def f(").count(), 1);
    assert_eq!(target.matches("def g(").count(), 1);
    assert!(target.contains("# Defined in: a.py, b.py"));
    assert!(target.contains("# - Scripts/a.py: Build the daily report"));
    assert!(target.contains("    if script == \"a.py\":\n        print(g(f(1)))"));
    assert!(target.contains("    elif script == \"b.py\":\n        print(g(f(7)))"));
    assert!(target.contains("print(\"Known scripts: a.py, b.py\", file=sys.stderr)"));
    assert!(target.contains("import json\nimport os\nimport sys\n"));
    assert!(target.ends_with("if __name__ == \"__main__\":\n    sys.exit(main())\n"));

    for stub in ["Scripts/a.py", "Scripts/b.py"] {
        let text = fs::read_to_string(dir.path().join(stub))?;
        assert!(!text.contains("return x + 1"));
        assert!(!text.contains("json.dumps"));
        assert!(text.contains("sys.path.insert(0, os.path.join(SCRIPT_DIR, \"lib\"))"));
        assert!(text.contains("from shared_0 import *"));
    }

    let backups = fs::read_dir(dir.path().join("System/Backups"))?.count();
    assert_eq!(backups, 2);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(dir.path().join("Scripts/lib/shared_0.py"))?
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }
    Ok(())
}

#[test]
fn shell_merge_dispatches_on_script_name() -> io::Result<()> {
    let a = "#!/bin/bash\n# Rotate logs\nsource ./env.sh\n\nlog() {\n  echo \"$1\"\n}\n\nmain() {\n  log rotate\n}\n\nmain \"$@\"\n";
    let b = "#!/bin/bash\nlog() {\n  echo \"$1\"\n}\n\nmain() {\n  log clean\n}\n";
    let (dir, options) = setup(&[("tools/rotate.sh", a), ("tools/clean.sh", b)])?;
    let files = ScriptFiles::new(&options);
    let rewriter = Rewriter::new(&files, &options);
    let plan = entry(3, &["tools/clean.sh", "tools/rotate.sh"], &["log", "main"], Action::Merge, Dialect::Shell);

    let result = rewriter.execute_entry(&plan, false);
    assert!(result.success, "{}", result.message);

    let target = fs::read_to_string(dir.path().join("Scripts/lib/shared_3.sh"))?;
    assert_eq!(target.matches("log() {").count(), 1);
    assert!(target.contains("source ./env.sh\n"));
    assert!(target.contains("        \"clean.sh\")\n            log clean\n            ;;"));
    assert!(target.contains("        \"rotate.sh\")\n            log rotate\n            ;;"));
    assert!(target.contains("echo \"Known scripts: clean.sh rotate.sh\" >&2"));

    let stub = fs::read_to_string(dir.path().join("tools/rotate.sh"))?;
    assert!(stub.contains("source \"$SCRIPT_DIR/../Scripts/lib/shared_3.sh\""));
    Ok(())
}

#[test]
fn extract_moves_shared_definitions_into_library() -> io::Result<()> {
    let a = "#!/usr/bin/env python3\nimport json\nfrom helpers import f\n\n\ndef f(x):\n    return x + 1\n\n\ndef g(y):\n    return json.dumps(y)\n\n\nprint(g(f(1)))\n";
    let b = "#!/usr/bin/env python3\nimport csv\n\n\ndef g(y):\n    return str(y)\n\n\ndef f(x):\n    return x + 2\n\n\ndef other():\n    return csv\n";
    let (dir, options) = setup(&[("Scripts/a.py", a), ("Scripts/b.py", b)])?;
    let files = ScriptFiles::new(&options);
    let rewriter = Rewriter::new(&files, &options);
    let plan = entry(1, &["Scripts/a.py", "Scripts/b.py"], &["g", "f"], Action::Extract, Dialect::Python);

    let result = rewriter.execute_entry(&plan, false);
    assert!(result.success, "{}", result.message);
    assert_eq!(result.state, EntryState::Extracted);
    assert_eq!(result.artifact_path.as_deref(), Some("Scripts/lib/shared_1.py"));

    let library = fs::read_to_string(dir.path().join("Scripts/lib/shared_1.py"))?;
    assert!(library.contains("import csv\nimport json\n"));
    assert!(!library.contains("from helpers import f"));
    let g_at = library.find("def g(y):\n    return json.dumps(y)");
    let f_at = library.find("def f(x):\n    return x + 1");
    assert!(g_at.is_some() && f_at.is_some() && g_at < f_at);
    assert!(!library.contains("x + 2"));

    for member in ["Scripts/a.py", "Scripts/b.py"] {
        let text = fs::read_to_string(dir.path().join(member))?;
        assert!(!text.contains("def f("), "{member}");
        assert!(!text.contains("def g("), "{member}");
        assert_eq!(text.matches("from shared_1 import g, f").count(), 1);
        assert!(text.contains("SCRIPT_DIR = os.path.dirname(os.path.abspath(__file__))"));
        assert!(text.contains("import os\nimport sys\n"));
        assert!(!text.contains("\n\n\n"));
    }
    let b_text = fs::read_to_string(dir.path().join("Scripts/b.py"))?;
    assert!(b_text.contains("def other():"));
    Ok(())
}

#[test]
fn extract_honours_configured_import_pattern() -> io::Result<()> {
    let a = "const fs = require('fs');\n\nfunction load(p) {\n  return fs.readFileSync(p);\n}\n\nfunction save(p, d) {\n  fs.writeFileSync(p, d);\n}\n";
    let (dir, mut options) = setup(&[("web/a.js", a), ("web/b.js", a)])?;
    options
        .import_patterns
        .insert(".js".to_string(), "const {{functions}} = require('./{path}');".to_string());
    let files = ScriptFiles::new(&options);
    let rewriter = Rewriter::new(&files, &options);
    let plan = entry(2, &["web/a.js", "web/b.js"], &["load", "save"], Action::Extract, Dialect::JavaScript);

    let result = rewriter.execute_entry(&plan, false);
    assert!(result.success, "{}", result.message);

    let library = fs::read_to_string(dir.path().join("Scripts/lib/shared_2.js"))?;
    assert!(library.ends_with("module.exports = { load, save };\n"));
    let member = fs::read_to_string(dir.path().join("web/a.js"))?;
    assert!(member.contains("const {load, save} = require('./../Scripts/lib/shared_2.js');"));
    Ok(())
}

const PY_LOADER_A: &str = "import json\n\n\nclass Loader:\n    def __init__(self, path):\n        self.path = path\n\n    def load(self):\n        return json.load(open(self.path))\n\n\ndef tidy(rows):\n    return [r.strip() for r in rows]\n\n\nprint(Loader('a.json').load())\n";
const PY_LOADER_B: &str = "import csv\n\n\nclass Loader:\n    def __init__(self, path):\n        self.path = path\n\n    def load(self):\n        return list(csv.reader(open(self.path)))\n\n\ndef tidy(rows):\n    return [r.strip() for r in rows]\n\n\nprint(Loader('b.csv').load())\n";

#[test]
fn extract_imports_only_definitions_that_reached_the_library() -> io::Result<()> {
    let (dir, options) = setup(&[("Scripts/a.py", PY_LOADER_A), ("Scripts/b.py", PY_LOADER_B)])?;
    let files = ScriptFiles::new(&options);
    let rewriter = Rewriter::new(&files, &options);
    let plan = entry(
        5,
        &["Scripts/a.py", "Scripts/b.py"],
        &["__init__", "load", "tidy"],
        Action::Extract,
        Dialect::Python,
    );

    let result = rewriter.execute_entry(&plan, false);
    assert!(result.success, "{}", result.message);

    let library = fs::read_to_string(dir.path().join("Scripts/lib/shared_5.py"))?;
    assert!(library.contains("def tidy(rows):"));
    assert!(!library.contains("def load"));
    for member in ["Scripts/a.py", "Scripts/b.py"] {
        let text = fs::read_to_string(dir.path().join(member))?;
        assert!(text.contains("from shared_5 import tidy\n"), "{member}");
        assert!(!text.contains("import __init__"), "{member}");
        assert!(!text.contains("def tidy("), "{member}");
        assert!(text.contains("    def load(self):"), "{member}");
    }
    Ok(())
}

#[test]
fn extract_fails_untouched_when_no_shared_name_is_top_level() -> io::Result<()> {
    let (dir, options) = setup(&[("Scripts/a.py", PY_LOADER_A), ("Scripts/b.py", PY_LOADER_B)])?;
    let before = snapshot_tree(dir.path())?;
    let files = ScriptFiles::new(&options);
    let rewriter = Rewriter::new(&files, &options);
    let plan = entry(
        6,
        &["Scripts/a.py", "Scripts/b.py"],
        &["__init__", "load"],
        Action::Extract,
        Dialect::Python,
    );

    let result = rewriter.execute_entry(&plan, false);
    assert!(!result.success);
    assert_eq!(result.state, EntryState::Failed);
    assert!(result.message.starts_with("Failed to extract common functions"));
    assert!(result.artifact_path.is_none());
    assert_eq!(snapshot_tree(dir.path())?, before);
    Ok(())
}

#[test]
fn dry_run_touches_nothing_and_keeps_shape() -> io::Result<()> {
    let (dir, options) = setup(&[("Scripts/a.py", PY_A), ("Scripts/b.py", PY_B)])?;
    let before = snapshot_tree(dir.path())?;
    let files = ScriptFiles::new(&options);
    let rewriter = Rewriter::new(&files, &options);
    let plan = vec![
        entry(0, &["Scripts/a.py", "Scripts/b.py"], &["f", "g"], Action::Merge, Dialect::Python),
        entry(4, &["Scripts/a.py", "Scripts/missing.py"], &["f", "g"], Action::Extract, Dialect::Python),
    ];
    let selected = select_entries(&plan, None);

    let dry = rewriter.execute(&selected, true);
    assert_eq!(snapshot_tree(dir.path())?, before);
    assert_eq!(dry.len(), 2);
    assert_eq!(dry.iter().map(|r| r.group_id).collect::<Vec<_>>(), vec![0, 4]);
    assert!(dry.iter().all(|r| r.success && r.dry_run));
    assert!(dry.iter().all(|r| r.message.starts_with("[dry-run]")));
    assert_eq!(dry[0].state, EntryState::Merged);
    assert_eq!(dry[1].state, EntryState::Extracted);

    let real = rewriter.execute(&selected, false);
    assert_eq!(
        real.iter().map(|r| r.group_id).collect::<Vec<_>>(),
        dry.iter().map(|r| r.group_id).collect::<Vec<_>>()
    );
    assert!(real.iter().all(|r| r.state.is_terminal()));
    Ok(())
}

#[test]
fn failed_entry_does_not_stop_the_run() -> io::Result<()> {
    let (dir, options) = setup(&[("Scripts/a.py", PY_A), ("Scripts/b.py", PY_B)])?;
    let files = ScriptFiles::new(&options);
    let rewriter = Rewriter::new(&files, &options);
    let plan = vec![
        entry(0, &["Scripts/gone.py", "Scripts/also_gone.py"], &["f", "g"], Action::Merge, Dialect::Python),
        entry(1, &["Scripts/a.py", "Scripts/b.py"], &["f", "g"], Action::Merge, Dialect::Python),
    ];

    let results = rewriter.execute(&select_entries(&plan, None), false);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].state, EntryState::Failed);
    assert!(!results[0].success);
    assert!(results[0].message.starts_with("Failed to consolidate scripts"));
    assert!(results[1].success);
    assert!(dir.path().join("Scripts/lib/shared_1.py").is_file());
    assert!(!dir.path().join("Scripts/lib/shared_0.py").exists());
    Ok(())
}

#[test]
fn select_entries_filters_by_group_id_in_plan_order() {
    let plan = vec![
        entry(5, &["a.py", "b.py"], &["f", "g"], Action::Merge, Dialect::Python),
        entry(2, &["c.py", "d.py"], &["f", "g"], Action::Extract, Dialect::Python),
        entry(7, &["e.py", "f.py"], &["f", "g"], Action::Extract, Dialect::Python),
    ];
    let picked: Vec<usize> = select_entries(&plan, Some(&[7, 5, 99][..]))
        .iter()
        .map(|e| e.group_id)
        .collect();
    assert_eq!(picked, vec![5, 7]);
    assert_eq!(select_entries(&plan, None).len(), 3);
}

#[test]
fn results_file_is_optional_and_round_trips() -> io::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cfg/results.json");
    assert!(load_results(&path).map_err(io_err)?.is_empty());

    let results = vec![ExecutionResult {
        group_id: 3,
        state: EntryState::Failed,
        success: false,
        message: "Failed to extract common functions: boom".to_string(),
        artifact_path: None,
        modified_scripts: Vec::new(),
        dry_run: false,
    }];
    save_results(&path, &results).map_err(io_err)?;
    let raw = fs::read_to_string(&path)?;
    assert!(raw.contains("\"state\": \"failed\""));
    assert!(!raw.contains("artifactPath"));
    assert_eq!(load_results(&path).map_err(io_err)?, results);
    Ok(())
}
