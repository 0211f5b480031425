//! Run-to-HTML writer.
//!
//! Produces a standalone document with zero paragraph spacing. Each line of
//! run text becomes a block; a block whose visible text is entirely
//! heading-sized is promoted to `<h1>`..`<h3>`. Table cells are gathered into
//! a `<table>` and emitted when the table ends.

use super::markdown::heading_level;
use super::model::{RichText, Run};

const HEAD: &str = "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
<style>p, h1, h2, h3 { margin: 0; padding: 0; } table { border-collapse: collapse; }</style>\n\
</head>\n<body>\n";
const TAIL: &str = "</body>\n</html>\n";

#[derive(Default)]
struct Block {
    html: String,
    heading: Option<usize>,
    plain_seen: bool,
}

impl Block {
    fn add(&mut self, inline: &str, text: &str, level: Option<usize>) {
        self.html.push_str(inline);
        if text.trim().is_empty() {
            return;
        }
        match level {
            Some(l) if !self.plain_seen => {
                self.heading = Some(self.heading.map_or(l, |h| h.min(l)));
            }
            _ => {
                self.plain_seen = true;
                self.heading = None;
            }
        }
    }

    fn close(&mut self, out: &mut String) {
        let block = std::mem::take(self);
        if block.html.trim().is_empty() {
            out.push_str("<p><br></p>\n");
            return;
        }
        let tag = match block.heading {
            Some(level) => format!("h{level}"),
            None => "p".to_string(),
        };
        out.push_str(&format!("<{tag}>{}</{tag}>\n", block.html));
    }
}

#[derive(Default)]
struct Table {
    id: usize,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn cell(&mut self, row: usize, column: usize, columns: usize) -> &mut String {
        while self.rows.len() <= row {
            self.rows.push(vec![String::new(); columns.max(1)]);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= column {
            cells.resize(column + 1, String::new());
        }
        &mut cells[column]
    }

    fn render(self, out: &mut String) {
        out.push_str("<table>\n");
        for row in self.rows {
            out.push_str("<tr>");
            for cell in row {
                out.push_str(&format!("<td>{}</td>", cell.trim()));
            }
            out.push_str("</tr>\n");
        }
        out.push_str("</table>\n");
    }
}

/// Serialise runs as an HTML document.
pub fn to_html(text: &RichText) -> String {
    let mut out = String::from(HEAD);
    let mut block = Block::default();
    let mut table: Option<Table> = None;

    for run in &text.runs {
        if let Some(cell) = run.style.cell {
            if !block.html.is_empty() {
                block.close(&mut out);
            }
            if table.as_ref().is_some_and(|t| t.id != cell.table) {
                if let Some(done) = table.take() {
                    done.render(&mut out);
                }
            }
            let current = table.get_or_insert_with(|| Table {
                id: cell.table,
                rows: Vec::new(),
            });
            let inline = inline_html(run, &run.text.replace('\n', " "));
            current
                .cell(cell.row, cell.column, cell.columns)
                .push_str(&inline);
            continue;
        }

        if let Some(done) = table.take() {
            done.render(&mut out);
            // The line break that ended the table is not a paragraph.
            if let Some(rest) = run.text.strip_prefix('\n') {
                push_lines(&mut out, &mut block, run, rest);
                continue;
            }
        }
        push_lines(&mut out, &mut block, run, &run.text);
    }

    if let Some(done) = table.take() {
        done.render(&mut out);
    }
    if !block.html.is_empty() {
        block.close(&mut out);
    }

    out.push_str(TAIL);
    out
}

fn push_lines(out: &mut String, block: &mut Block, run: &Run, text: &str) {
    let level = run.style.font_size.and_then(heading_level);
    let mut lines = text.split('\n').peekable();
    while let Some(line) = lines.next() {
        if !line.is_empty() {
            block.add(&inline_html(run, line), line, level);
        }
        if lines.peek().is_some() {
            block.close(out);
        }
    }
}

fn inline_html(run: &Run, text: &str) -> String {
    let mut html = escape(text).replace('\t', "&emsp;");
    if run.style.bold {
        html = format!("<b>{html}</b>");
    }
    if run.style.italic {
        html = format!("<i>{html}</i>");
    }
    if let Some(url) = &run.style.link {
        html = format!("<a href=\"{}\">{html}</a>", escape(url));
    }
    html
}

/// Minimal HTML text/attribute escaping.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
