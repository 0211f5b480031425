//! RTF reader.
//!
//! A single-pass tokenizer over the control-word stream with a group stack of
//! character state. It understands what the writers need: bold, italic, font
//! size, `HYPERLINK` fields, `\intbl`/`\cell`/`\row` tables, Unicode escapes
//! and the `\info` title/author. Everything else (font tables, pictures,
//! headers, list tables) is skipped as a destination.

use super::model::{RichText, RunStyle, TableCell};
use super::RichDocument;
use crate::error::IngestError;

/// Destinations whose content is never document text.
const SKIPPED_DESTINATIONS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "listtable",
    "listoverridetable",
    "revtbl",
    "rsidtbl",
    "generator",
    "pict",
    "object",
    "header",
    "headerl",
    "headerr",
    "headerf",
    "footer",
    "footerl",
    "footerr",
    "footerf",
    "footnote",
    "xmlnstbl",
    "themedata",
    "colorschememapping",
    "latentstyles",
    "datastore",
    "mmathPr",
    "pgdsctbl",
    "expandedcolortbl",
    "operator",
    "company",
    "category",
    "keywords",
    "comment",
    "subject",
    "doccomm",
    "creatim",
    "revtim",
    "printim",
    "buptim",
];

/// Windows-1252 code points for bytes 0x80..=0x9F.
const CP1252_HIGH: [char; 32] = [
    '€', '\u{81}', '‚', 'ƒ', '„', '…', '†', '‡', 'ˆ', '‰', 'Š', '‹', 'Œ', '\u{8D}', 'Ž',
    '\u{8F}', '\u{90}', '‘', '’', '“', '”', '•', '–', '—', '˜', '™', 'š', '›', 'œ', '\u{9D}',
    'ž', 'Ÿ',
];

pub(crate) fn cp1252(byte: u8) -> char {
    match byte {
        0x80..=0x9F => CP1252_HIGH[(byte - 0x80) as usize],
        _ => byte as char,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Destination {
    Text,
    Skip,
    FieldInstruction,
    Title,
    Author,
}

#[derive(Debug, Clone)]
struct GroupState {
    bold: bool,
    italic: bool,
    /// Half-points, as written by `\fs`.
    font_size: Option<i32>,
    destination: Destination,
    unicode_skip: usize,
    link: Option<String>,
    in_table: bool,
}

impl Default for GroupState {
    fn default() -> Self {
        Self {
            bold: false,
            italic: false,
            font_size: None,
            destination: Destination::Text,
            unicode_skip: 1,
            link: None,
            in_table: false,
        }
    }
}

#[derive(Default)]
struct TableState {
    active: bool,
    index: usize,
    row: usize,
    column: usize,
    columns: usize,
}

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
    state: GroupState,
    stack: Vec<GroupState>,
    out: RichText,
    table: TableState,
    tables_seen: usize,
    /// Characters still to drop after a `\u` escape.
    pending_skip: usize,
    /// Next control word follows `\*`.
    ignorable: bool,
    field_instruction: String,
    field_link: Option<String>,
    title: String,
    author: String,
}

/// Parse RTF bytes into runs plus `\info` metadata.
pub fn parse(data: &[u8]) -> Result<RichDocument, IngestError> {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    if !data[start..].starts_with(b"{\\rtf") {
        return Err(IngestError::parsing("missing {\\rtf header"));
    }

    let mut parser = Parser {
        data,
        pos: start,
        state: GroupState::default(),
        stack: Vec::new(),
        out: RichText::new(),
        table: TableState::default(),
        tables_seen: 0,
        pending_skip: 0,
        ignorable: false,
        field_instruction: String::new(),
        field_link: None,
        title: String::new(),
        author: String::new(),
    };
    parser.run();

    let non_empty = |s: String| {
        let s = s.trim().to_string();
        (!s.is_empty()).then_some(s)
    };
    Ok(RichDocument {
        text: parser.out,
        title: non_empty(parser.title),
        author: non_empty(parser.author),
    })
}

impl Parser<'_> {
    fn run(&mut self) {
        while self.pos < self.data.len() {
            match self.data[self.pos] {
                b'{' => {
                    self.stack.push(self.state.clone());
                    self.pos += 1;
                }
                b'}' => {
                    self.end_group();
                    self.pos += 1;
                }
                b'\\' => self.control(),
                b'\r' | b'\n' => self.pos += 1,
                _ => {
                    let begin = self.pos;
                    while self.pos < self.data.len()
                        && !matches!(self.data[self.pos], b'{' | b'}' | b'\\' | b'\r' | b'\n')
                    {
                        self.pos += 1;
                    }
                    let text: String = self.data[begin..self.pos]
                        .iter()
                        .map(|b| cp1252(*b))
                        .collect();
                    self.text(&text);
                }
            }
        }
    }

    fn end_group(&mut self) {
        let finished = std::mem::replace(&mut self.state, self.stack.pop().unwrap_or_default());
        if finished.destination == Destination::FieldInstruction
            && self.state.destination != Destination::FieldInstruction
        {
            self.field_link = hyperlink_target(&std::mem::take(&mut self.field_instruction));
        }
    }

    fn control(&mut self) {
        // Skip the backslash.
        self.pos += 1;
        let Some(&c) = self.data.get(self.pos) else {
            return;
        };

        if !c.is_ascii_alphabetic() {
            self.pos += 1;
            match c {
                b'\'' => {
                    let hex = self.data.get(self.pos..self.pos + 2).unwrap_or_default();
                    self.pos += hex.len();
                    if let Some(byte) = std::str::from_utf8(hex)
                        .ok()
                        .and_then(|h| u8::from_str_radix(h, 16).ok())
                    {
                        self.text(&cp1252(byte).to_string());
                    }
                }
                b'*' => self.ignorable = true,
                b'~' => self.text("\u{a0}"),
                b'_' => self.text("\u{2011}"),
                b'-' => {}
                b'\\' | b'{' | b'}' => self.text(&(c as char).to_string()),
                b'\r' | b'\n' => self.text("\n"),
                _ => {}
            }
            return;
        }

        let begin = self.pos;
        while self
            .data
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_alphabetic())
        {
            self.pos += 1;
        }
        let word = String::from_utf8_lossy(&self.data[begin..self.pos]).into_owned();

        let param_begin = self.pos;
        if self.data.get(self.pos) == Some(&b'-') {
            self.pos += 1;
        }
        while self.data.get(self.pos).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let param = std::str::from_utf8(&self.data[param_begin..self.pos])
            .ok()
            .and_then(|p| p.parse::<i32>().ok());
        if self.data.get(self.pos) == Some(&b' ') {
            self.pos += 1;
        }

        let ignorable = std::mem::take(&mut self.ignorable);
        self.word(&word, param, ignorable);
    }

    fn word(&mut self, word: &str, param: Option<i32>, ignorable: bool) {
        let on = param != Some(0);
        match word {
            "fldinst" => {
                self.state.destination = Destination::FieldInstruction;
                self.field_instruction.clear();
            }
            "fldrslt" => {
                self.state.destination = Destination::Text;
                self.state.link = self.field_link.take();
            }
            "info" => {}
            "title" => self.state.destination = Destination::Title,
            "author" => self.state.destination = Destination::Author,
            _ if SKIPPED_DESTINATIONS.contains(&word) || ignorable => {
                self.state.destination = Destination::Skip;
            }
            "par" | "line" | "sect" | "page" => self.text("\n"),
            "tab" => self.text("\t"),
            "emdash" => self.text("—"),
            "endash" => self.text("–"),
            "bullet" => self.text("•"),
            "lquote" => self.text("‘"),
            "rquote" => self.text("’"),
            "ldblquote" => self.text("“"),
            "rdblquote" => self.text("”"),
            "b" => self.state.bold = on,
            "i" => self.state.italic = on,
            "fs" => self.state.font_size = param.filter(|p| *p > 0),
            "plain" => {
                self.state.bold = false;
                self.state.italic = false;
                self.state.font_size = None;
            }
            "uc" => self.state.unicode_skip = param.unwrap_or(1).max(0) as usize,
            "u" => {
                if let Some(code) = param {
                    let code = if code < 0 { code + 65536 } else { code } as u32;
                    if let Some(ch) = char::from_u32(code) {
                        self.text(&ch.to_string());
                    }
                    self.pending_skip = self.state.unicode_skip;
                }
            }
            "pard" => self.state.in_table = false,
            "intbl" => self.state.in_table = true,
            "trowd" => {
                if !self.table.active {
                    self.table = TableState {
                        active: true,
                        index: self.tables_seen,
                        ..TableState::default()
                    };
                    self.tables_seen += 1;
                }
                self.table.columns = 0;
                self.table.column = 0;
            }
            "cellx" => self.table.columns += 1,
            "cell" | "nestcell" => {
                self.emit_cell_marker();
                self.table.column += 1;
            }
            "row" | "nestrow" => {
                self.table.row += 1;
                self.table.column = 0;
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        let mut chars = text.chars();
        while self.pending_skip > 0 {
            if chars.next().is_none() {
                return;
            }
            self.pending_skip -= 1;
        }
        let text = chars.as_str();
        if text.is_empty() {
            return;
        }

        match self.state.destination {
            Destination::Skip => {}
            Destination::FieldInstruction => self.field_instruction.push_str(text),
            Destination::Title => self.title.push_str(text),
            Destination::Author => self.author.push_str(text),
            Destination::Text => {
                if self.table.active && !self.state.in_table && !text.trim().is_empty() {
                    self.table.active = false;
                }
                let style = self.style();
                self.out.push(text, style);
            }
        }
    }

    /// Register the current cell even when it holds no text.
    fn emit_cell_marker(&mut self) {
        if self.state.destination == Destination::Text {
            if let Some(cell) = self.cell() {
                let style = RunStyle {
                    cell: Some(cell),
                    ..RunStyle::default()
                };
                self.out.push("", style);
            }
        }
    }

    fn cell(&self) -> Option<TableCell> {
        if !(self.table.active && self.state.in_table) {
            return None;
        }
        let columns = self.table.columns.max(self.table.column + 1).max(1);
        Some(TableCell {
            table: self.table.index,
            row: self.table.row,
            column: self.table.column,
            columns,
        })
    }

    fn style(&self) -> RunStyle {
        RunStyle {
            font_size: self.state.font_size.map(|hp| hp as f32 / 2.0),
            bold: self.state.bold,
            italic: self.state.italic,
            link: self.state.link.clone(),
            cell: self.cell(),
        }
    }
}

/// Extract the target of a `HYPERLINK "url"` field instruction.
fn hyperlink_target(instruction: &str) -> Option<String> {
    let rest = instruction.trim().strip_prefix("HYPERLINK")?.trim();
    let url = match rest.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next()?,
        None => rest.split_whitespace().next()?,
    };
    (!url.is_empty()).then(|| url.to_string())
}
