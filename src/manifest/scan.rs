use regex::Regex;
use std::sync::LazyLock;

static MAPPING_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^(\{|["']?[^:\s"']+["']?:(\s|$))"#).unwrap());

/// A top-level item of the block-style `dependencies` list as found in the raw text
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedItem {
    pub text: String,
    pub line: usize,
    pub group: Option<String>,
    pub is_mapping: bool,
}

fn strip_trailing_comment(text: &str) -> &str {
    match text.find(" #") {
        Some(idx) => text[..idx].trim_end(),
        None => text,
    }
}

fn unquote(text: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = text.strip_prefix(q).and_then(|t| t.strip_suffix(q)) {
            return inner;
        }
    }
    text
}

/// Walks the manifest text and records line numbers and heading comments
/// for each top-level dependency item.
///
/// serde_yml drops comments, so this runs next to the real YAML decode and
/// its results are only trusted when they line up with the decoded entries.
pub fn scan_dependencies(content: &str) -> Vec<ScannedItem> {
    let mut items = Vec::new();
    let mut in_dependencies = false;
    let mut item_indent: Option<usize> = None;
    let mut group: Option<String> = None;

    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed == "---" {
            continue;
        }
        let indent = line.len() - line.trim_start().len();

        if indent == 0 && !trimmed.starts_with('#') && !trimmed.starts_with('-') {
            in_dependencies = trimmed
                .strip_prefix("dependencies:")
                .is_some_and(|rest| rest.trim().is_empty() || rest.trim().starts_with('#'));
            item_indent = None;
            group = None;
            continue;
        }

        if !in_dependencies {
            continue;
        }

        if let Some(comment) = trimmed.strip_prefix('#') {
            let heading = comment.trim_start_matches('#').trim();
            if !heading.is_empty() {
                group = Some(heading.to_string());
            }
            continue;
        }

        let Some(item) = trimmed.strip_prefix('-') else {
            continue;
        };
        if !item.is_empty() && !item.starts_with(char::is_whitespace) {
            continue;
        }

        match item_indent {
            None => item_indent = Some(indent),
            Some(expected) if indent > expected => continue,
            Some(_) => {}
        }

        let text = unquote(strip_trailing_comment(item.trim())).to_string();
        items.push(ScannedItem {
            is_mapping: MAPPING_ITEM_RE.is_match(&text),
            text,
            line: idx + 1,
            group: group.clone(),
        });
    }

    items
}
