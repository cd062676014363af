// Lexical rule discovery
//
// Best-effort fallback for handlers without a validator type: reads the
// handler's own source text and pattern-matches inline `field_rules!`
// invocations. Only literal string keys with a literal string or literal
// array of strings are recognized; anything built dynamically yields nothing.
//
// Example source:
//   let rules = field_rules! { "name" => "required|string", "tags" => ["array", "min:1"] };
// Output:
//   [("name", ["required", "string"]), ("tags", ["array", "min:1"])]

use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;

use super::{split_rules, RawRules, RuleStrategy};
use crate::host::{HandlerInfo, HandlerSource};

lazy_static! {
    static ref INVOCATION: Regex = Regex::new(r"field_rules!\s*[\{\(\[]").unwrap();

    // "field" => "rule|rule"   or   "field" => ["rule", "rule"]
    static ref ENTRY: Regex = Regex::new(
        r#""((?:[^"\\]|\\.)*)"\s*=>\s*(?:"((?:[^"\\]|\\.)*)"|\[([^\]]*)\])"#
    ).unwrap();

    static ref QUOTED: Regex = Regex::new(r#""((?:[^"\\]|\\.)*)""#).unwrap();
}

/// Scans handler source files, resolving relative paths against `root`
#[derive(Debug, Clone)]
pub struct LexicalRules {
    pub root: PathBuf,
}

impl Default for LexicalRules {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
        }
    }
}

impl LexicalRules {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, source: &HandlerSource) -> Result<String, String> {
        let file = source.file();
        let path = if file.is_absolute() {
            file.clone()
        } else {
            self.root.join(file)
        };
        std::fs::read_to_string(&path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))
    }
}

impl RuleStrategy for LexicalRules {
    fn name(&self) -> &'static str {
        "lexical"
    }

    fn extract(&self, handler: &HandlerInfo) -> Result<RawRules, String> {
        let source = match &handler.source {
            Some(source) => source,
            None => return Ok(Vec::new()),
        };
        let text = self.read(source)?;
        let body = handler_text(&text, source)?;
        Ok(scan_rules(&body))
    }
}

/// The part of a file belonging to the handler
fn handler_text(text: &str, source: &HandlerSource) -> Result<String, String> {
    match source {
        HandlerSource::Lines {
            start_line,
            end_line,
            ..
        } => {
            let lines: Vec<&str> = text.lines().collect();
            if *start_line == 0 || start_line > end_line || *end_line > lines.len() {
                return Err(format!(
                    "Line range {}-{} outside of {} lines",
                    start_line,
                    end_line,
                    lines.len()
                ));
            }
            Ok(lines[start_line - 1..*end_line].join("\n"))
        }
        HandlerSource::Function { name, .. } => {
            let signature = Regex::new(&format!(r"\bfn\s+{}\b", regex::escape(name)))
                .map_err(|e| e.to_string())?;
            let start = signature
                .find(text)
                .ok_or_else(|| format!("fn {} not found", name))?
                .start();
            let open = text[start..]
                .find('{')
                .map(|i| start + i)
                .ok_or_else(|| format!("fn {} has no body", name))?;
            let close = matching_close(text, open).ok_or_else(|| format!("fn {} is unbalanced", name))?;
            Ok(text[start..=close].to_string())
        }
    }
}

/// Every literal `field_rules!` entry in `text`, in source order
pub fn scan_rules(text: &str) -> RawRules {
    let mut rules = Vec::new();
    for invocation in INVOCATION.find_iter(text) {
        let open = invocation.end() - 1;
        let close = match matching_close(text, open) {
            Some(close) => close,
            None => continue,
        };
        let body = &text[open + 1..close];
        for entry in ENTRY.captures_iter(body) {
            let field = unescape(&entry[1]);
            let parsed = if let Some(expr) = entry.get(2) {
                split_rules(&unescape(expr.as_str()))
            } else if let Some(items) = entry.get(3) {
                QUOTED
                    .captures_iter(items.as_str())
                    .map(|q| unescape(&q[1]))
                    .filter(|r| !r.trim().is_empty())
                    .collect()
            } else {
                continue;
            };
            rules.push((field, parsed));
        }
    }
    rules
}

/// Index of the delimiter closing the one at `open`.
///
/// String, raw string and char literals and line comments are skipped, so
/// `'{'` or `r#"}"#` inside a handler do not move its end.
fn matching_close(text: &str, open: usize) -> Option<usize> {
    let chars: Vec<(usize, char)> = text[open..].char_indices().map(|(i, c)| (open + i, c)).collect();
    let at = |i: usize| chars.get(i).map(|&(_, c)| c);
    let mut depth = 0usize;
    let mut i = 0;

    while let Some(c) = at(i) {
        match c {
            '"' => i = skip_string(&chars, i + 1)?,
            'r' if starts_raw_string(&chars, i) => i = skip_raw_string(&chars, i + 1)?,
            '\'' => i = skip_char_literal(&chars, i),
            '/' if at(i + 1) == Some('/') => {
                while at(i).map_or(false, |c| c != '\n') {
                    i += 1;
                }
            }
            '{' | '(' | '[' => depth += 1,
            '}' | ')' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(chars[i].0);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index of the closing quote of a string whose content starts at `i`
fn skip_string(chars: &[(usize, char)], mut i: usize) -> Option<usize> {
    while let Some(&(_, c)) = chars.get(i) {
        match c {
            '\\' => i += 2,
            '"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// `r"`, `r#"`, `br"` ... at `i`, and not the tail of an identifier
fn starts_raw_string(chars: &[(usize, char)], i: usize) -> bool {
    let before = |k: usize| i.checked_sub(k).and_then(|j| chars.get(j)).map(|&(_, c)| c);
    let standalone = match before(1) {
        None => true,
        Some('b') => before(2).map_or(true, |c| !is_ident(c)),
        Some(c) => !is_ident(c),
    };
    let mut j = i + 1;
    while chars.get(j).map(|&(_, c)| c) == Some('#') {
        j += 1;
    }
    standalone && chars.get(j).map(|&(_, c)| c) == Some('"')
}

/// Index of the last `#` (or the quote) closing a raw string whose hashes start at `i`
fn skip_raw_string(chars: &[(usize, char)], mut i: usize) -> Option<usize> {
    let mut hashes = 0;
    while chars.get(i)?.1 == '#' {
        hashes += 1;
        i += 1;
    }
    i += 1;
    while i < chars.len() {
        if chars[i].1 == '"' && (1..=hashes).all(|k| chars.get(i + k).map(|&(_, c)| c) == Some('#')) {
            return Some(i + hashes);
        }
        i += 1;
    }
    None
}

/// Index of the closing quote of a char literal at `i`; lifetimes are left alone
fn skip_char_literal(chars: &[(usize, char)], i: usize) -> usize {
    let at = |k: usize| chars.get(k).map(|&(_, c)| c);
    if at(i + 1) == Some('\\') {
        let mut j = i + 2;
        while let Some(c) = at(j) {
            if c == '\'' && j > i + 2 {
                return j;
            }
            j += 1;
        }
        return i;
    }
    if at(i + 2) == Some('\'') {
        return i + 2;
    }
    i
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
