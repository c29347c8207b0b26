//! Line-level views of a script: top-level definition spans, import
//! statements, the leading description comment.
//!
//! Everything here works on `&[&str]` lines and only looks at column 0 for
//! headers, so nested definitions are never split out.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::Dialect;

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex literal")
}

fn py_def_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\("))
}

fn sh_def_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex(
            r"^(?:function\s+([A-Za-z_][A-Za-z0-9_]*)\s*(?:\(\s*\))?|([A-Za-z_][A-Za-z0-9_]*)\s*\(\s*\))",
        )
    })
}

fn js_function_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex(r"^(?:export\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][A-Za-z0-9_$]*)\s*\(")
    })
}

fn js_arrow_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex(
            r"^(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][A-Za-z0-9_$]*)\s*=>",
        )
    })
}

fn py_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^(?:import\s+\S|from\s+\S+\s+import\b)"))
}

fn sh_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^(?:source|\.)\s+\S"))
}

fn js_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^(?:import\s|(?:const|let|var)\s+.+=\s*require\s*\()"))
}

/// Position of a brace: (line index, byte column).
type BracePos = (usize, usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Definition {
    pub(crate) name: String,
    /// First line of the block, decorators included.
    pub(crate) start: usize,
    /// First line after the header; only meaningful for indentation blocks.
    pub(crate) body_start: usize,
    /// One past the last line of the block.
    pub(crate) end: usize,
    braces: Option<(BracePos, BracePos)>,
}

impl Definition {
    pub(crate) fn text(&self, lines: &[&str]) -> String {
        lines[self.start..self.end].join("\n")
    }

    /// The statements of the definition, dedented, without the header and
    /// the enclosing braces.
    pub(crate) fn body(&self, lines: &[&str]) -> String {
        let raw: Vec<String> = match self.braces {
            Some(((open_line, open_col), (close_line, close_col))) => {
                if open_line == close_line {
                    vec![lines[open_line][open_col + 1..close_col].trim().to_string()]
                } else {
                    let mut out = vec![lines[open_line][open_col + 1..].to_string()];
                    out.extend(
                        lines[open_line + 1..close_line]
                            .iter()
                            .map(|l| (*l).to_string()),
                    );
                    out.push(lines[close_line][..close_col].to_string());
                    out
                }
            }
            None if self.body_start < self.end => lines[self.body_start..self.end]
                .iter()
                .map(|l| (*l).to_string())
                .collect(),
            None => {
                let header = lines.get(self.body_start.saturating_sub(1)).copied();
                let inline = header
                    .and_then(|h| h.split_once("):"))
                    .map(|(_, rest)| rest.trim().to_string())
                    .unwrap_or_default();
                vec![inline]
            }
        };

        let mut trimmed: Vec<&str> = raw.iter().map(String::as_str).collect();
        while trimmed.first().is_some_and(|l| l.trim().is_empty()) {
            trimmed.remove(0);
        }
        while trimmed.last().is_some_and(|l| l.trim().is_empty()) {
            trimmed.pop();
        }
        dedent(&trimmed)
    }
}

fn indent_width(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

pub(crate) fn dedent(lines: &[&str]) -> String {
    let min = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| indent_width(l))
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| {
            if l.trim().is_empty() {
                ""
            } else {
                &l[min.min(indent_width(l))..]
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn starts_at_column_zero(line: &str) -> bool {
    !line.starts_with([' ', '\t'])
}

/// Every top-level definition in file order.
pub(crate) fn find_definitions(dialect: Dialect, lines: &[&str]) -> Vec<Definition> {
    match dialect {
        Dialect::Python => python_definitions(lines),
        Dialect::Shell | Dialect::JavaScript => brace_definitions(dialect, lines),
    }
}

fn paren_balance(line: &str) -> i32 {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for ch in line.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, ch) {
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '#') => break,
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            _ => {}
        }
    }
    depth
}

fn python_definitions(lines: &[&str]) -> Vec<Definition> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let Some(caps) = py_def_header().captures(lines[i]) else {
            i += 1;
            continue;
        };
        let name = caps[1].to_string();

        let mut start = i;
        while start > 0 && lines[start - 1].starts_with('@') {
            start -= 1;
        }

        let mut depth = paren_balance(lines[i]);
        let mut header_end = i;
        while depth > 0 && header_end + 1 < lines.len() {
            header_end += 1;
            depth += paren_balance(lines[header_end]);
        }

        let body_start = header_end + 1;
        let mut end = body_start;
        while end < lines.len()
            && (lines[end].trim().is_empty() || !starts_at_column_zero(lines[end]))
        {
            end += 1;
        }
        while end > body_start && lines[end - 1].trim().is_empty() {
            end -= 1;
        }

        out.push(Definition {
            name,
            start,
            body_start,
            end,
            braces: None,
        });
        i = end.max(i + 1);
    }
    out
}

fn brace_header(dialect: Dialect, line: &str) -> Option<(String, usize, bool)> {
    match dialect {
        Dialect::Shell => {
            let caps = sh_def_header().captures(line)?;
            let name = caps.get(1).or_else(|| caps.get(2))?;
            let end = caps.get(0).map_or(0, |m| m.end());
            Some((name.as_str().to_string(), end, false))
        }
        Dialect::JavaScript => {
            if let Some(caps) = js_function_header().captures(line) {
                // The match stops at the opening parenthesis of the parameters.
                let end = caps.get(0).map_or(0, |m| m.end() - 1);
                return Some((caps[1].to_string(), end, false));
            }
            let caps = js_arrow_header().captures(line)?;
            let end = caps.get(0).map_or(0, |m| m.end());
            Some((caps[1].to_string(), end, true))
        }
        Dialect::Python => None,
    }
}

#[derive(Debug, Default)]
struct BraceScanner {
    quote: Option<char>,
    block_comment: bool,
    parens: usize,
    depth: usize,
    open: Option<BracePos>,
}

impl BraceScanner {
    /// Feeds one line starting at byte `from`; returns the closing brace
    /// position once the first opened block is balanced again.
    fn feed(&mut self, dialect: Dialect, line_idx: usize, line: &str, from: usize) -> Option<BracePos> {
        let bytes = line.as_bytes();
        let mut i = from;
        while i < bytes.len() {
            let ch = bytes[i] as char;
            if self.block_comment {
                if ch == '*' && bytes.get(i + 1) == Some(&b'/') {
                    self.block_comment = false;
                    i += 1;
                }
                i += 1;
                continue;
            }
            if let Some(q) = self.quote {
                if ch == '\\' && q != '\'' {
                    i += 2;
                    continue;
                }
                if ch == '\\' && dialect == Dialect::JavaScript {
                    i += 2;
                    continue;
                }
                if ch == q {
                    self.quote = None;
                }
                i += 1;
                continue;
            }

            match (dialect, ch) {
                (_, '"' | '\'') => self.quote = Some(ch),
                (Dialect::JavaScript, '`') => self.quote = Some(ch),
                (Dialect::JavaScript, '/') if bytes.get(i + 1) == Some(&b'/') => break,
                (Dialect::JavaScript, '/') if bytes.get(i + 1) == Some(&b'*') => {
                    self.block_comment = true;
                    i += 1;
                }
                (Dialect::Shell, '#')
                    if i == 0 || bytes[i - 1].is_ascii_whitespace() || bytes[i - 1] == b';' =>
                {
                    break;
                }
                (Dialect::Shell, '\\') => i += 1,
                (Dialect::JavaScript, '(') => self.parens += 1,
                (Dialect::JavaScript, ')') => self.parens = self.parens.saturating_sub(1),
                (_, '{') if self.parens == 0 => {
                    if self.depth == 0 {
                        self.open = Some((line_idx, i));
                    }
                    self.depth += 1;
                }
                (_, '}') if self.parens == 0 && self.depth > 0 => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        return Some((line_idx, i));
                    }
                }
                _ => {}
            }
            i += 1;
        }
        None
    }
}

/// End line (exclusive) of an arrow function whose body is an expression.
fn expression_end(lines: &[&str], header: usize) -> usize {
    let mut j = header;
    while j < lines.len() {
        if j > header && (lines[j].trim().is_empty() || starts_at_column_zero(lines[j])) {
            return j;
        }
        if lines[j].trim_end().ends_with(';') {
            return j + 1;
        }
        j += 1;
    }
    lines.len()
}

fn brace_definitions(dialect: Dialect, lines: &[&str]) -> Vec<Definition> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let Some((name, header_end, arrow)) = brace_header(dialect, lines[i]) else {
            i += 1;
            continue;
        };

        if arrow && !lines[i][header_end..].trim_start().starts_with('{') {
            let end = expression_end(lines, i);
            out.push(Definition {
                name,
                start: i,
                body_start: i,
                end,
                braces: None,
            });
            i = end.max(i + 1);
            continue;
        }

        let mut scanner = BraceScanner::default();
        let mut close: Option<BracePos> = None;
        let mut j = i;
        while j < lines.len() {
            let from = if j == i { header_end } else { 0 };
            if let Some(pos) = scanner.feed(dialect, j, lines[j], from) {
                close = Some(pos);
                break;
            }
            // Opening brace must show up on the header line or the next one.
            if scanner.open.is_none() && j > i {
                break;
            }
            j += 1;
        }

        match (scanner.open, close) {
            (Some(open), Some(close)) => {
                out.push(Definition {
                    name,
                    start: i,
                    body_start: open.0 + 1,
                    end: close.0 + 1,
                    braces: Some((open, close)),
                });
                i = close.0 + 1;
            }
            _ => i += 1,
        }
    }
    out
}

pub(crate) fn is_import_line(dialect: Dialect, line: &str) -> bool {
    match dialect {
        Dialect::Python => py_import().is_match(line),
        Dialect::Shell => sh_import().is_match(line),
        Dialect::JavaScript => js_import().is_match(line),
    }
}

/// Line range of one import statement; multi-line forms (`from x import (`,
/// `import {` ... `} from 'x'`) span until their closing line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ImportSpan {
    pub(crate) start: usize,
    pub(crate) end: usize,
}

pub(crate) fn import_spans(dialect: Dialect, lines: &[&str]) -> Vec<ImportSpan> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if !is_import_line(dialect, lines[i]) {
            i += 1;
            continue;
        }
        let mut end = i + 1;
        let open = match dialect {
            Dialect::Python => lines[i].contains('(') && !lines[i].contains(')'),
            Dialect::JavaScript => {
                lines[i].starts_with("import") && lines[i].contains('{') && !lines[i].contains('}')
            }
            Dialect::Shell => false,
        };
        if open {
            let closer = if dialect == Dialect::Python { ')' } else { '}' };
            while end < lines.len() && !lines[end - 1].contains(closer) {
                end += 1;
            }
        }
        out.push(ImportSpan { start: i, end });
        i = end;
    }
    out
}

pub(crate) fn import_statements(dialect: Dialect, lines: &[&str]) -> Vec<String> {
    import_spans(dialect, lines)
        .into_iter()
        .map(|span| lines[span.start..span.end].join("\n"))
        .collect()
}

pub(crate) fn is_comment(dialect: Dialect, line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("#!") || trimmed.starts_with(dialect.comment_prefix())
}

/// First single-line comment that is not a shebang or an encoding marker.
pub(crate) fn description(dialect: Dialect, lines: &[&str]) -> Option<String> {
    lines.iter().find_map(|line| {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#!") || trimmed.contains("-*-") {
            return None;
        }
        let rest = trimmed.strip_prefix(dialect.comment_prefix())?;
        let rest = rest.trim_start_matches(['#', '/']).trim();
        (!rest.is_empty()).then(|| rest.to_string())
    })
}

/// Index of the first line after the leading shebang, comment and blank
/// lines.
pub(crate) fn header_end(dialect: Dialect, lines: &[&str]) -> usize {
    lines
        .iter()
        .position(|line| !(line.trim().is_empty() || is_comment(dialect, line)))
        .unwrap_or(lines.len())
}
