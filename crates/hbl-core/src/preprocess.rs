//! Whitespace normalisation applied to template text before parsing.
//!
//! Lines that hold nothing but a block tag are folded onto their neighbours so
//! that block structure does not leak blank lines into the output, and `~`
//! trim markers swallow the whitespace next to them.

/// Marker the parser renders as a literal line break.
pub const NEWLINE_MARKER: &str = "{{NEWLINE}}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Open,
    Close,
    Else,
    Text,
}

fn is_tag_line(line: &str, after_open: impl Fn(&str) -> bool) -> bool {
    if !line.ends_with("}}") {
        return false;
    }
    let Some(rest) = line.strip_prefix("{{") else {
        return false;
    };
    let rest = rest.strip_prefix('~').unwrap_or(rest);
    after_open(rest)
}

fn classify(trimmed: &str) -> LineKind {
    if is_tag_line(trimmed, |rest| rest.starts_with('#')) {
        LineKind::Open
    } else if is_tag_line(trimmed, |rest| rest.starts_with('/')) {
        LineKind::Close
    } else if is_tag_line(trimmed, |rest| {
        rest.starts_with("else") || rest == "^}}" || rest == "^~}}"
    }) {
        LineKind::Else
    } else {
        LineKind::Text
    }
}

pub fn preprocess(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_closing = false;
    // a leading run of block tags is merged without artificial newlines
    let mut prev_block_only = true;
    let mut pending_else: Option<&str> = None;

    for line in text.split('\n') {
        let trimmed = line.trim();
        match classify(trimmed) {
            LineKind::Open => {
                if let Some(else_tag) = pending_else.take() {
                    out.push('\n');
                    out.push_str(else_tag);
                } else if !out.is_empty() && !prev_block_only {
                    out.push_str(NEWLINE_MARKER);
                }
                out.push_str(trimmed);
                prev_closing = false;
            }
            LineKind::Close => {
                prev_block_only = false;
                if let Some(else_tag) = pending_else.take() {
                    out.push('\n');
                    out.push_str(else_tag);
                } else if !prev_closing {
                    out.push('\n');
                }
                out.push_str(trimmed);
                prev_closing = true;
            }
            LineKind::Else => {
                prev_block_only = false;
                prev_closing = false;
                if let Some(earlier) = pending_else.replace(trimmed) {
                    out.push('\n');
                    out.push_str(earlier);
                }
            }
            LineKind::Text => {
                prev_block_only = false;
                prev_closing = false;
                if let Some(else_tag) = pending_else.take() {
                    out.push('\n');
                    out.push_str(else_tag);
                } else if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(line);
            }
        }
    }
    if let Some(else_tag) = pending_else {
        out.push('\n');
        out.push_str(else_tag);
    }

    trim_after_markers(&trim_before_markers(&out))
}

/// `\s*{{~` becomes `{{`.
fn trim_before_markers(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find("{{~") {
        out.push_str(&rest[..at]);
        let kept = out.trim_end().len();
        out.truncate(kept);
        out.push_str("{{");
        rest = &rest[at + 3..];
    }
    out.push_str(rest);
    out
}

/// `~}}\s*` becomes `}}`.
fn trim_after_markers(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find("~}}") {
        out.push_str(&rest[..at]);
        out.push_str("}}");
        rest = rest[at + 3..].trim_start();
    }
    out.push_str(rest);
    out
}
