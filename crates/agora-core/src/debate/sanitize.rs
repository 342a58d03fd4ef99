//! Removal of leaked reasoning artifacts from provider output
//!
//! Some upstreams echo their internal reasoning as XML-ish tags, signed JSON
//! blocks or bracketed spans. Stored messages are replayed to other agents,
//! so these fragments are stripped before storage and again before reuse.
//!
//! The cleaner is an ordered list of independent passes applied until the
//! text stops changing. The line filter is heuristic and can drop a line of
//! real prose that looks like markup; that trade-off is accepted.

use regex::Regex;
use std::sync::LazyLock;

type Pass = fn(&str) -> String;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("sanitizer pattern is valid")
}

static TAG_BLOCKS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r"(?is)<thinking[^>]*>.*?</thinking>"),
        re(r"(?is)<antThinking[^>]*>.*?</antThinking>"),
        re(r"(?is)<signature[^>]*>.*?</signature>"),
    ]
});

static SIGNATURE_ATTR: LazyLock<Regex> =
    LazyLock::new(|| re(r#"(?i)\s*signature\s*=\s*"[^"]*""#));

static JSON_THINKING_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| re(r#"(?s)\{[^{}]*"type"\s*:\s*"(?:thinking|redacted_thinking)"[^{}]*\}"#));

static JSON_BLOCK_ARRAYS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r#"(?s)\[\s*\{[^\]]*"type"\s*:\s*"thinking"[^\]]*\}\s*\]"#),
        re(r#"(?s)\[\s*\{[^\]]*"type"\s*:\s*"(?:thinking|text)"[^\]]*\}\s*(?:,\s*\{[^\]]*\}\s*)*\]"#),
    ]
});

static STRAY_TAG: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)</?(?:thinking|antthinking|signature)\b[^>]*>"));

static SIGNATURE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| re(r#"(?i)"signature"\s*:\s*"[^"]*""#));

static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| re(r"\n[ \t]*\n(?:[ \t]*\n)+"));

/// Passes in application order
const PASSES: &[(&str, Pass)] = &[
    ("tag_blocks", strip_tag_blocks),
    ("signature_attrs", strip_signature_attrs),
    ("json_thinking_objects", strip_json_thinking_objects),
    ("json_block_arrays", strip_json_block_arrays),
    ("stray_tags", strip_stray_tags),
    ("signature_fields", strip_signature_fields),
    ("bracket_spans", strip_bracket_spans),
    ("marker_lines", drop_marker_lines),
];

/// Clean one message body.
///
/// Idempotent; text without any marker is returned untouched.
pub fn clean_message_content(content: &str) -> String {
    let mut current = content.to_string();
    loop {
        let next = clean_round(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn clean_round(input: &str) -> String {
    let stripped = PASSES
        .iter()
        .fold(input.to_string(), |text, (_, pass)| pass(&text));

    if stripped == input {
        return stripped;
    }
    collapse_residue(&stripped)
}

fn strip_tag_blocks(text: &str) -> String {
    TAG_BLOCKS
        .iter()
        .fold(text.to_string(), |acc, re| re.replace_all(&acc, "").into_owned())
}

fn strip_signature_attrs(text: &str) -> String {
    SIGNATURE_ATTR.replace_all(text, "").into_owned()
}

fn strip_json_thinking_objects(text: &str) -> String {
    JSON_THINKING_OBJECT.replace_all(text, "").into_owned()
}

fn strip_json_block_arrays(text: &str) -> String {
    JSON_BLOCK_ARRAYS
        .iter()
        .fold(text.to_string(), |acc, re| re.replace_all(&acc, "").into_owned())
}

fn strip_stray_tags(text: &str) -> String {
    STRAY_TAG.replace_all(text, "").into_owned()
}

fn strip_signature_fields(text: &str) -> String {
    SIGNATURE_FIELD.replace_all(text, "").into_owned()
}

/// Remove `[thinking]...[/thinking]`; an unterminated opener drops the rest.
fn strip_bracket_spans(text: &str) -> String {
    const OPEN: &str = "[thinking]";
    const CLOSE: &str = "[/thinking]";

    let mut result = text.to_string();
    while let Some(start) = result.find(OPEN) {
        match result[start..].find(CLOSE) {
            Some(offset) => {
                result.replace_range(start..start + offset + CLOSE.len(), "");
            }
            None => {
                result.truncate(start);
                break;
            }
        }
    }
    result
}

/// Drop lines that are JSON block fragments, or that mention thinking or
/// signature while looking like markup rather than a sentence.
fn drop_marker_lines(text: &str) -> String {
    let kept: Vec<&str> = text
        .split('\n')
        .filter(|line| !is_marker_line(line))
        .collect();
    kept.join("\n")
}

fn is_marker_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.starts_with(r#""type""#)
        || trimmed.starts_with(r#"{"type""#)
        || trimmed.starts_with(r#"[{"type""#)
    {
        return true;
    }

    let lower = trimmed.to_lowercase();
    if !(lower.contains("thinking") || lower.contains("signature")) {
        return false;
    }
    looks_structural(trimmed)
}

fn looks_structural(trimmed: &str) -> bool {
    trimmed.starts_with(['<', '{', '[', '"'])
        || trimmed.contains("\":")
        || trimmed.contains("=\"")
        || trimmed.contains("</")
        || !trimmed.contains(char::is_whitespace)
}

/// Tidy up what the passes left behind. Only runs on text that changed.
fn collapse_residue(text: &str) -> String {
    let text = text.replace("\"\"", "").replace("{}", "").replace("[]", "");

    let kept: Vec<&str> = text
        .split('\n')
        .filter(|line| {
            let trimmed = line.trim();
            trimmed.is_empty() || !trimmed.chars().all(|c| matches!(c, ',' | '{' | '}' | '[' | ']'))
        })
        .collect();

    let joined = kept.join("\n");
    BLANK_RUNS.replace_all(&joined, "\n\n").trim().to_string()
}
