//! HTML to formatting runs, via scraper.
//!
//! Used for web archives, EPUB chapters and HTML inputs exported to Markdown.
//! Heading elements map to the point sizes the Markdown writer recognises, so
//! `<h2>` comes back out as `## `.

use super::model::{RichText, RunStyle, TableCell};
use scraper::{ElementRef, Html, Node};

const H1_SIZE: f32 = 24.0;
const H2_SIZE: f32 = 18.0;
const H3_SIZE: f32 = 15.0;

/// Elements whose content is never text.
const SKIPPED: &[&str] = &[
    "script", "style", "noscript", "head", "template", "svg", "iframe", "object", "button",
    "select", "textarea",
];

/// Elements separated from their neighbours by a blank line.
const PARAGRAPHS: &[&str] = &[
    "p", "blockquote", "pre", "figure", "address", "section", "article", "header", "footer",
    "main", "aside", "nav", "dl",
];

/// Elements separated by a single line break.
const LINES: &[&str] = &[
    "div", "ul", "ol", "dt", "dd", "figcaption", "caption", "form", "fieldset", "details",
    "summary",
];

/// Convert an HTML document or fragment to runs.
pub fn from_html(html: &str) -> RichText {
    let document = Html::parse_document(html);
    let mut walker = Walker::default();
    walker.element(document.root_element(), &RunStyle::default(), false);
    walker.out
}

/// Text of the document's `<title>`, if any.
pub fn document_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = scraper::Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

#[derive(Default)]
struct Walker {
    out: RichText,
    tables: usize,
}

impl Walker {
    fn element(&mut self, el: ElementRef<'_>, style: &RunStyle, pre: bool) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => self.text(text, style, pre),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.child(child_el, style, pre);
                    }
                }
                _ => {}
            }
        }
    }

    fn child(&mut self, el: ElementRef<'_>, style: &RunStyle, pre: bool) {
        let name = el.value().name();
        let in_cell = style.cell.is_some();

        if SKIPPED.contains(&name) {
            return;
        }

        match name {
            "br" => {
                let newline = if in_cell { " " } else { "\n" };
                self.out.push(newline, style.clone());
            }
            "hr" if !in_cell => {
                self.out.ensure_blank_line();
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let mut inner = style.clone();
                match name {
                    "h1" => inner.font_size = Some(H1_SIZE),
                    "h2" => inner.font_size = Some(H2_SIZE),
                    "h3" => inner.font_size = Some(H3_SIZE),
                    _ => inner.bold = true,
                }
                self.block(el, &inner, pre, true);
            }
            "b" | "strong" => {
                let inner = RunStyle {
                    bold: true,
                    ..style.clone()
                };
                self.element(el, &inner, pre);
            }
            "i" | "em" | "cite" | "var" | "dfn" => {
                let inner = RunStyle {
                    italic: true,
                    ..style.clone()
                };
                self.element(el, &inner, pre);
            }
            "a" => {
                let inner = match el.value().attr("href") {
                    Some(href) if !href.starts_with('#') && !href.starts_with("javascript:") => {
                        RunStyle {
                            link: Some(href.to_string()),
                            ..style.clone()
                        }
                    }
                    _ => style.clone(),
                };
                self.element(el, &inner, pre);
            }
            "li" => {
                if !in_cell {
                    self.out.ensure_newline();
                    self.out.push("- ", style.clone());
                }
                self.element(el, style, pre);
                if !in_cell {
                    self.out.ensure_newline();
                }
            }
            "pre" => self.block(el, style, true, true),
            "table" if !in_cell => self.table(el, style),
            _ if PARAGRAPHS.contains(&name) => self.block(el, style, pre, true),
            _ if LINES.contains(&name) => self.block(el, style, pre, false),
            _ => self.element(el, style, pre),
        }
    }

    fn block(&mut self, el: ElementRef<'_>, style: &RunStyle, pre: bool, paragraph: bool) {
        if style.cell.is_some() {
            self.out.push(" ", style.clone());
            self.element(el, style, pre);
            return;
        }
        if paragraph {
            self.out.ensure_blank_line();
        } else {
            self.out.ensure_newline();
        }
        self.element(el, style, pre);
        if paragraph {
            self.out.ensure_blank_line();
        } else {
            self.out.ensure_newline();
        }
    }

    fn table(&mut self, el: ElementRef<'_>, style: &RunStyle) {
        let mut rows = Vec::new();
        collect_rows(el, &mut rows);
        if rows.is_empty() {
            return;
        }

        let table = self.tables;
        self.tables += 1;

        let cells: Vec<Vec<ElementRef<'_>>> = rows
            .iter()
            .map(|row| {
                row.children()
                    .filter_map(ElementRef::wrap)
                    .filter(|c| matches!(c.value().name(), "td" | "th"))
                    .collect()
            })
            .collect();
        let columns = cells.iter().map(Vec::len).max().unwrap_or(1).max(1);

        self.out.ensure_blank_line();
        for (row, row_cells) in cells.iter().enumerate() {
            for (column, cell) in row_cells.iter().enumerate() {
                let cell_style = RunStyle {
                    cell: Some(TableCell {
                        table,
                        row,
                        column,
                        columns,
                    }),
                    bold: style.bold || cell.value().name() == "th",
                    ..style.clone()
                };
                // Marks the cell as present even when it has no text.
                self.out.push("", cell_style.clone());
                self.element(*cell, &cell_style, false);
            }
        }
        self.out.push("\n", style.clone());
        self.out.ensure_blank_line();
    }

    fn text(&mut self, text: &str, style: &RunStyle, pre: bool) {
        if pre {
            self.out.push(text, style.clone());
            return;
        }
        let mut collapsed = String::with_capacity(text.len());
        let mut last_space = false;
        for c in text.chars() {
            if c.is_whitespace() {
                if !last_space {
                    collapsed.push(' ');
                }
                last_space = true;
            } else {
                collapsed.push(c);
                last_space = false;
            }
        }
        let at_line_start = self.out.is_empty() || self.out.ends_with('\n') || self.out.ends_with(' ');
        let collapsed = if at_line_start {
            collapsed.trim_start().to_string()
        } else {
            collapsed
        };
        if !collapsed.is_empty() {
            self.out.push(collapsed, style.clone());
        }
    }
}

fn collect_rows<'a>(el: ElementRef<'a>, rows: &mut Vec<ElementRef<'a>>) {
    for child in el.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => collect_rows(child, rows),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::richtext::markdown::to_markdown;

    #[test]
    fn headings_and_emphasis_become_markdown() {
        let rt = from_html(
            "<html><body><h1>Guide</h1><p>Read <b>this</b> and <em>that</em>.</p>\
             <h2>Next</h2><p>See <a href=\"https://example.org\">docs</a>.</p></body></html>",
        );
        let md = to_markdown(&rt);
        assert!(md.starts_with("# Guide"), "{md}");
        assert!(md.contains("Read **this** and *that*."), "{md}");
        assert!(md.contains("## Next"), "{md}");
        assert!(md.contains("[docs](https://example.org)"), "{md}");
    }

    #[test]
    fn scripts_are_skipped_and_whitespace_collapsed() {
        let rt = from_html("<p>  one \n   two</p><script>var x = 1;</script>");
        assert_eq!(rt.plain_text().trim(), "one two");
    }

    #[test]
    fn tables_produce_cells() {
        let rt = from_html(
            "<table><tr><th>Name</th><th>Qty</th></tr><tr><td>Apple</td><td>3</td></tr></table>",
        );
        let md = to_markdown(&rt);
        assert!(md.contains("| **Name** | **Qty** |"), "{md}");
        assert!(md.contains("| --- | --- |"), "{md}");
        assert!(md.contains("| Apple | 3 |"), "{md}");
    }

    #[test]
    fn list_items_get_bullets() {
        let rt = from_html("<ul><li>one</li><li>two</li></ul>");
        assert_eq!(rt.plain_text().trim(), "- one\n- two");
    }

    #[test]
    fn title_lookup() {
        assert_eq!(
            document_title("<html><head><title> Hello </title></head></html>").as_deref(),
            Some("Hello")
        );
        assert_eq!(document_title("<p>x</p>"), None);
    }
}
