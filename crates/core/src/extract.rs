//! Pattern-based extraction of function names and imports per dialect.
//!
//! No parsing happens here: every dialect is a fixed set of regexes applied
//! to the whole file, so names inside strings or comments are picked up too.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::Dialect;

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex literal")
}

fn py_function() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"def\s+([a-zA-Z_][a-zA-Z0-9_]*)\s*\("))
}

fn py_class() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"class\s+([a-zA-Z_][a-zA-Z0-9_]*)"))
}

fn py_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"(?:from\s+([a-zA-Z0-9_.]+)\s+import)|(?:import\s+([a-zA-Z0-9_.]+))"))
}

fn sh_function() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"(?:function\s+)?([a-zA-Z_][a-zA-Z0-9_]*)\s*\(\)"))
}

fn sh_source() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r#"source\s+["']([^"']*)["']"#))
}

fn js_function() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"function\s+([a-zA-Z_][a-zA-Z0-9_]*)"))
}

fn js_arrow() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex(
            r"const\s+([a-zA-Z_][a-zA-Z0-9_]*)\s*=\s*(?:\([^)]*\)|[a-zA-Z_][a-zA-Z0-9_]*)\s*=>",
        )
    })
}

fn js_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex(r#"(?:import\s+.*?from\s+["']([^"']+)["'])|(?:require\s*\(["']([^"']+)["']\))"#)
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// One entry per definition, in file order; repeated names stay repeated.
    pub functions: Vec<String>,
    /// Class-like declarations; recorded, never indexed.
    pub classes: Vec<String>,
    pub imports: BTreeSet<String>,
}

fn captures_first(re: &Regex, text: &str) -> Vec<String> {
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn captures_either(re: &Regex, text: &str) -> BTreeSet<String> {
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().trim().to_string())
        .filter(|module| !module.is_empty())
        .collect()
}

fn extract_python(text: &str) -> Extraction {
    Extraction {
        functions: captures_first(py_function(), text),
        classes: captures_first(py_class(), text),
        imports: captures_either(py_import(), text),
    }
}

fn extract_shell(text: &str) -> Extraction {
    Extraction {
        functions: captures_first(sh_function(), text),
        classes: Vec::new(),
        imports: captures_first(sh_source(), text)
            .into_iter()
            .filter(|path| !path.is_empty())
            .collect(),
    }
}

fn extract_javascript(text: &str) -> Extraction {
    let mut functions = captures_first(js_function(), text);
    functions.extend(captures_first(js_arrow(), text));
    Extraction {
        functions,
        classes: Vec::new(),
        imports: captures_either(js_import(), text),
    }
}

pub fn extract(dialect: Dialect, text: &str) -> Extraction {
    match dialect {
        Dialect::Python => extract_python(text),
        Dialect::Shell => extract_shell(text),
        Dialect::JavaScript => extract_javascript(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_functions_classes_and_imports() {
        let text = "import os\nfrom datetime import datetime\nimport json.decoder\n\n\
                    class Loader:\n    def load(self):\n        pass\n\n\
                    def save_data(path, data):\n    pass\n\ndef save_data(x):\n    pass\n";
        let out = extract(Dialect::Python, text);

        assert_eq!(out.functions, vec!["load", "save_data", "save_data"]);
        assert_eq!(out.classes, vec!["Loader"]);
        let imports: Vec<&str> = out.imports.iter().map(String::as_str).collect();
        assert_eq!(imports, vec!["datetime", "json.decoder", "os"]);
    }

    #[test]
    fn shell_functions_with_and_without_keyword() {
        let text = "#!/bin/bash\nsource \"./lib/common.sh\"\nsource './env.sh'\n\
                    log_info() {\n  echo \"$1\"\n}\nfunction cleanup () {\n  rm -f x\n}\n";
        let out = extract(Dialect::Shell, text);

        assert_eq!(out.functions, vec!["log_info", "cleanup"]);
        assert!(out.classes.is_empty());
        assert!(out.imports.contains("./lib/common.sh"));
        assert!(out.imports.contains("./env.sh"));
    }

    #[test]
    fn javascript_declarations_then_arrow_bindings() {
        let text = "const fs = require('fs');\nimport { join } from \"path\";\n\
                    const parse = (raw) => JSON.parse(raw);\nfunction load(p) {\n  return 1;\n}\n\
                    const shout = s => s.toUpperCase();\n";
        let out = extract(Dialect::JavaScript, text);

        assert_eq!(out.functions, vec!["load", "parse", "shout"]);
        let imports: Vec<&str> = out.imports.iter().map(String::as_str).collect();
        assert_eq!(imports, vec!["fs", "path"]);
    }

    #[test]
    fn unmatched_text_yields_empty_extraction() {
        for dialect in Dialect::ALL {
            let out = extract(dialect, "just some words\n");
            assert!(out.functions.is_empty(), "{dialect}");
            assert!(out.imports.is_empty(), "{dialect}");
        }
    }
}
