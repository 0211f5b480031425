//! Run-to-Markdown writer.
//!
//! Headings are inferred from font size relative to a 12pt body size, since
//! most sources carry no semantic heading markup. Hyperlinks are recorded as
//! byte spans of the emitted text and substituted last, from the end of the
//! document backwards, so earlier spans stay valid while later ones grow.

use super::model::{RichText, TableCell};
use std::ops::Range;

/// Body text size the heading thresholds are measured against.
pub const BASE_FONT_SIZE: f32 = 12.0;

/// Heading level for a font size: ≥2× → 1, ≥1.5× → 2, ≥1.25× → 3.
pub fn heading_level(font_size: f32) -> Option<usize> {
    if font_size >= BASE_FONT_SIZE * 2.0 {
        Some(1)
    } else if font_size >= BASE_FONT_SIZE * 1.5 {
        Some(2)
    } else if font_size >= BASE_FONT_SIZE * 1.25 {
        Some(3)
    } else {
        None
    }
}

/// Wrap the non-whitespace core of `text` in `marker`, keeping the
/// surrounding whitespace outside so the emphasis stays valid Markdown.
fn emphasize(text: &str, marker: &str) -> String {
    let core = text.trim();
    let start = text.len() - text.trim_start().len();
    let end = start + core.len();
    format!("{}{marker}{core}{marker}{}", &text[..start], &text[end..])
}

/// Cells of the table row currently being accumulated.
struct PendingRow {
    table: usize,
    row: usize,
    cells: Vec<String>,
}

impl PendingRow {
    fn new(cell: TableCell) -> Self {
        Self {
            table: cell.table,
            row: cell.row,
            cells: vec![String::new(); cell.columns.max(1)],
        }
    }

    fn render(self) -> String {
        let columns = self.cells.len();
        let content = self
            .cells
            .iter()
            .map(|c| c.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join(" | ");
        let mut out = format!("| {content} |\n");
        if self.row == 0 {
            out.push('|');
            out.push_str(&" --- |".repeat(columns));
            out.push('\n');
        }
        out
    }
}

/// Serialise runs as Markdown.
pub fn to_markdown(text: &RichText) -> String {
    let mut out = String::new();
    let mut links: Vec<(Range<usize>, String)> = Vec::new();
    let mut pending: Option<PendingRow> = None;

    for run in &text.runs {
        let style = &run.style;
        let mut piece = run.text.clone();
        // Bytes at the front of `piece` that sit outside any link label.
        let mut marker_len = 0;

        let heading = style.font_size.and_then(heading_level);
        if let Some(level) = heading {
            // Only the run that starts the line carries the marker.
            let body = piece.trim_start_matches('\n');
            let lead = &piece[..piece.len() - body.len()];
            let line_start = !lead.is_empty() || out.is_empty() || out.ends_with('\n');
            if line_start && style.cell.is_none() && !body.trim().is_empty() {
                marker_len = level + 1;
                piece = format!("{lead}{} {body}", "#".repeat(level));
            }
        } else if !piece.trim().is_empty() {
            // Bold first, then italic: "***x***" for bold italic.
            if style.bold {
                piece = emphasize(&piece, "**");
            }
            if style.italic {
                piece = emphasize(&piece, "*");
            }
        }

        if let Some(cell) = style.cell {
            let same_row = pending
                .as_ref()
                .is_some_and(|p| p.table == cell.table && p.row == cell.row);
            if !same_row {
                if let Some(done) = pending.take() {
                    out.push_str(&done.render());
                }
                pending = Some(PendingRow::new(cell));
            }
            if let Some(row) = pending.as_mut() {
                if cell.column >= row.cells.len() {
                    row.cells.resize(cell.column + 1, String::new());
                }
                let cell_text = match &style.link {
                    Some(url) if !piece.trim().is_empty() => format!("[{}]({url})", piece.trim()),
                    _ => piece,
                };
                row.cells[cell.column].push_str(&cell_text);
            }
            continue;
        }

        if let Some(done) = pending.take() {
            out.push_str(&done.render());
        }

        let start = out.len();
        out.push_str(&piece);
        if let Some(url) = &style.link {
            // Label covers the visible text only: no heading marker, no
            // surrounding whitespace or line breaks.
            let lead_ws = piece.len() - piece.trim_start().len();
            let after_marker = piece[lead_ws + marker_len..].trim_start();
            let label_start = start + piece.len() - after_marker.len();
            let label_end = start + piece.trim_end().len();
            if label_start < label_end {
                match links.last_mut() {
                    Some((span, last_url))
                        if last_url == url
                            && span.end <= label_start
                            && out[span.end..label_start].trim().is_empty()
                            && !out[span.end..label_start].contains('\n') =>
                    {
                        span.end = label_end;
                    }
                    _ => links.push((label_start..label_end, url.clone())),
                }
            }
        }
    }

    if let Some(done) = pending.take() {
        out.push_str(&done.render());
    }

    links.sort_by(|a, b| b.0.start.cmp(&a.0.start));
    for (span, url) in links {
        let label = out[span.clone()].to_string();
        out.replace_range(span, &format!("[{label}]({url})"));
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::richtext::model::RunStyle;

    fn styled(size: Option<f32>, bold: bool, italic: bool) -> RunStyle {
        RunStyle {
            font_size: size,
            bold,
            italic,
            ..RunStyle::default()
        }
    }

    #[test]
    fn heading_thresholds() {
        assert_eq!(heading_level(24.0), Some(1));
        assert_eq!(heading_level(18.0), Some(2));
        assert_eq!(heading_level(15.0), Some(3));
        assert_eq!(heading_level(14.9), None);
        assert_eq!(heading_level(12.0), None);
    }

    #[test]
    fn headers_suppress_emphasis() {
        let mut rt = RichText::new();
        rt.push("Title\n", styled(Some(24.0), true, true));
        rt.push("body", styled(Some(12.0), false, false));
        assert_eq!(to_markdown(&rt), "# Title\nbody");
    }

    #[test]
    fn heading_marker_only_at_line_start() {
        let mut rt = RichText::new();
        rt.push("Big ", styled(Some(24.0), false, false));
        rt.push("bold\n", styled(Some(24.0), true, false));
        rt.push("text", RunStyle::default());
        assert_eq!(to_markdown(&rt), "# Big bold\ntext");
    }

    #[test]
    fn bold_wraps_before_italic() {
        let mut rt = RichText::new();
        rt.push("both", styled(None, true, true));
        assert_eq!(to_markdown(&rt), "***both***");

        let mut rt = RichText::new();
        rt.push("a ", RunStyle::default());
        rt.push("b", styled(None, true, false));
        rt.push(" c", RunStyle::default());
        rt.push("d", styled(None, false, true));
        rt.push(" e ", styled(None, true, false));
        rt.push("f", RunStyle::default());
        assert_eq!(to_markdown(&rt), "a **b** c*d* **e** f");
    }

    #[test]
    fn links_substituted_without_shifting_others() {
        let mut rt = RichText::new();
        let link = |url: &str| RunStyle {
            link: Some(url.to_string()),
            ..RunStyle::default()
        };
        rt.push("see ", RunStyle::default());
        rt.push("one", link("https://a.example"));
        rt.push(" and ", RunStyle::default());
        rt.push("two", link("https://b.example"));
        assert_eq!(
            to_markdown(&rt),
            "see [one](https://a.example) and [two](https://b.example)"
        );
    }

    #[test]
    fn linked_heading_keeps_marker_outside_label() {
        let mut rt = RichText::new();
        rt.push(
            "Home\n",
            RunStyle {
                font_size: Some(24.0),
                link: Some("https://x".into()),
                ..RunStyle::default()
            },
        );
        rt.push("body", RunStyle::default());
        assert_eq!(to_markdown(&rt), "# [Home](https://x)\nbody");
    }

    #[test]
    fn link_label_excludes_surrounding_whitespace() {
        let mut rt = RichText::new();
        rt.push("go", RunStyle::default());
        rt.push(
            " there \n",
            RunStyle {
                link: Some("u".into()),
                ..RunStyle::default()
            },
        );
        rt.push("next", RunStyle::default());
        assert_eq!(to_markdown(&rt), "go [there](u) \nnext");
    }

    #[test]
    fn adjacent_runs_with_same_link_merge() {
        let mut rt = RichText::new();
        rt.push(
            "bold",
            RunStyle {
                bold: true,
                link: Some("u".into()),
                ..RunStyle::default()
            },
        );
        rt.push(
            " plain",
            RunStyle {
                link: Some("u".into()),
                ..RunStyle::default()
            },
        );
        assert_eq!(to_markdown(&rt), "[**bold** plain](u)");
    }

    #[test]
    fn table_rows_flush_with_header_separator() {
        let mut rt = RichText::new();
        for (row, cells) in [["Name", "Qty"], ["Apple", "3"]].iter().enumerate() {
            for (column, text) in cells.iter().enumerate() {
                rt.push(
                    *text,
                    RunStyle {
                        cell: Some(TableCell {
                            table: 0,
                            row,
                            column,
                            columns: 2,
                        }),
                        ..RunStyle::default()
                    },
                );
            }
        }
        rt.push("after", RunStyle::default());
        assert_eq!(
            to_markdown(&rt),
            "| Name | Qty |\n| --- | --- |\n| Apple | 3 |\nafter"
        );
    }
}
