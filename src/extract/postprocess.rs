//! Final cleanup of extracted text.
//!
//! The run writer already emits well-formed Markdown (tables always carry a
//! separator row). What it cannot control is the source text itself: RTF and
//! Word runs arrive with CR line breaks, byte-order marks and zero-width
//! formatting characters, and empty paragraphs stack into long blank gaps.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6} \S").unwrap());

/// Tidy writer output: clean source characters, drop trailing blanks, keep
/// at most one empty line between blocks and exactly one before a heading.
pub fn tidy_markdown(input: &str) -> String {
    let cleaned = clean_source_text(input);
    let trimmed: Vec<&str> = cleaned.lines().map(str::trim_end).collect();
    let joined = RE_BLANK_LINES.replace_all(&trimmed.join("\n"), "\n\n").into_owned();
    space_headings(&joined).trim_matches('\n').to_string()
}

/// Plain text only gets the character cleanup; its layout is the source's.
pub fn tidy_plain_text(input: &str) -> String {
    clean_source_text(input)
}

/// Fold CR and CRLF breaks into LF and drop characters that render as
/// nothing (BOM, zero-width space/joiners, soft hyphen, word joiner).
fn clean_source_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
            }
            '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{00AD}' | '\u{2060}' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Put one blank line before every ATX heading that follows other text.
fn space_headings(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 16);
    for line in input.lines() {
        if RE_HEADING.is_match(line) && !out.is_empty() {
            let kept = out.trim_end_matches('\n').len();
            out.truncate(kept);
            out.push_str("\n\n");
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}
