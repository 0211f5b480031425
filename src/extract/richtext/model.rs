//! Formatting runs: the common representation every rich-text front-end
//! (RTF, DOCX, DOC, web archive, HTML, PDF) produces and every writer consumes.

/// Position of a run inside a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableCell {
    /// Document-unique table index.
    pub table: usize,
    pub row: usize,
    pub column: usize,
    /// Column count of the table (at least 1).
    pub columns: usize,
}

/// Character attributes shared by a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStyle {
    /// Point size, if the source specifies one.
    pub font_size: Option<f32>,
    pub bold: bool,
    pub italic: bool,
    pub link: Option<String>,
    pub cell: Option<TableCell>,
}

/// A maximal stretch of text with uniform attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub text: String,
    pub style: RunStyle,
}

/// An attributed string as an ordered list of runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RichText {
    pub runs: Vec<Run>,
}

impl RichText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text, merging into the previous run when the style is identical.
    ///
    /// Empty text is kept only for table cells, where it marks the cell as present.
    pub fn push(&mut self, text: impl Into<String>, style: RunStyle) {
        let text = text.into();
        if text.is_empty() && style.cell.is_none() {
            return;
        }
        if let Some(last) = self.runs.last_mut() {
            if last.style == style {
                last.text.push_str(&text);
                return;
            }
        }
        self.runs.push(Run { text, style });
    }

    /// Append a line break with default style unless the text already ends with one.
    pub fn ensure_newline(&mut self) {
        if !self.is_empty() && !self.ends_with('\n') {
            self.push("\n", RunStyle::default());
        }
    }

    /// Append a paragraph gap (blank line) unless already present.
    pub fn ensure_blank_line(&mut self) {
        if self.is_empty() {
            return;
        }
        self.ensure_newline();
        if !self.plain_tail(2).ends_with("\n\n") {
            self.push("\n", RunStyle::default());
        }
    }

    pub fn append(&mut self, other: RichText) {
        for run in other.runs {
            self.push(run.text, run.style);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(|r| r.text.is_empty())
    }

    /// True when the text holds nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.runs.iter().all(|r| r.text.trim().is_empty())
    }

    pub fn ends_with(&self, c: char) -> bool {
        self.runs
            .iter()
            .rev()
            .find(|r| !r.text.is_empty())
            .is_some_and(|r| r.text.ends_with(c))
    }

    /// Concatenated text of all runs.
    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    fn plain_tail(&self, chars: usize) -> String {
        let mut tail: Vec<char> = Vec::with_capacity(chars);
        for run in self.runs.iter().rev() {
            for c in run.text.chars().rev() {
                tail.push(c);
                if tail.len() == chars {
                    return tail.into_iter().rev().collect();
                }
            }
        }
        tail.into_iter().rev().collect()
    }
}
