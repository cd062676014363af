// Model collector
// Uses walkdir and regex to extract `pub struct` declarations from .rs files
//
// Example:
//   pub struct Item { pub id: u64, pub tags: Vec<String>, secret: String }
// Output:
//   {name: "Item", file: "item.rs", fields: [{id, u64}, {tags, Vec<String>}]}

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::Path;
use walkdir::WalkDir;

lazy_static! {
    static ref STRUCT: Regex = Regex::new(r"pub\s+struct\s+(\w+)\s*(?:<[^>{]*>)?\s*\{").unwrap();
    static ref FIELD: Regex =
        Regex::new(r"(?s)^\s*pub(?:\([^)]*\))?\s+(\w+)\s*:\s*(.+?)\s*$").unwrap();
    static ref ATTRIBUTE: Regex = Regex::new(r"#\[[^\]]*\]").unwrap();
    // string literals are matched too so `//` inside them survives
    static ref COMMENT_OR_STRING: Regex = Regex::new(r#""(?:[^"\\]|\\.)*"|//[^\n]*"#).unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    /// Path relative to the models directory
    pub file: String,
    pub fields: Vec<ModelField>,
}

/// Public structs under `root`, sorted by name; a missing directory yields none
pub fn collect_models(root: &Path) -> Vec<ModelDescriptor> {
    let mut models = Vec::new();
    if !root.is_dir() {
        tracing::debug!(root = %root.display(), "models directory not found");
        return models;
    }

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.path().extension().map_or(false, |ext| ext == "rs") {
            continue;
        }
        let content = match std::fs::read_to_string(entry.path()) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(file = %entry.path().display(), error = %e, "skipping unreadable model file");
                continue;
            }
        };
        let file = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        models.extend(parse_models(&content, &file));
    }

    models.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.file.cmp(&b.file)));
    models
}

pub fn parse_models(content: &str, file: &str) -> Vec<ModelDescriptor> {
    let content = COMMENT_OR_STRING.replace_all(content, |caps: &Captures| {
        if caps[0].starts_with('"') {
            caps[0].to_string()
        } else {
            String::new()
        }
    });
    let mut models = Vec::new();

    for caps in STRUCT.captures_iter(&content) {
        let open = match caps.get(0) {
            Some(m) => m.end() - 1,
            None => continue,
        };
        let close = match closing_brace(&content, open) {
            Some(close) => close,
            None => continue,
        };
        let body = ATTRIBUTE.replace_all(&content[open + 1..close], "");
        let fields = split_top_level(&body)
            .into_iter()
            .filter_map(|piece| {
                let field = FIELD.captures(piece)?;
                Some(ModelField {
                    name: field[1].to_string(),
                    kind: WHITESPACE.replace_all(&field[2], " ").to_string(),
                })
            })
            .collect();
        models.push(ModelDescriptor {
            name: caps[1].to_string(),
            file: file.to_string(),
            fields,
        });
    }
    models
}

fn closing_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, b) in text.bytes().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas outside of `<>`, `()` and `[]`
fn split_top_level(body: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                pieces.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&body[start..]);
    pieces
}
