//! Legacy Word (`.doc`) reader.
//!
//! Opens the compound file with cfb, reads the FIB from `WordDocument`, then
//! walks the piece table (CLX) stored in the `0Table`/`1Table` stream to
//! reassemble the main document text. Formatting (CHPX) is not decoded, so
//! the result is unstyled runs.

use super::model::{RichText, RunStyle};
use super::rtf::cp1252;
use super::RichDocument;
use crate::error::IngestError;
use std::io::{Cursor, Read};

const WORD_IDENT: u16 = 0xA5EC;
/// `fWhichTblStm` bit of the FIB flags word.
const WHICH_TABLE_FLAG: u16 = 0x0200;
const FLAGS_OFFSET: usize = 0x000A;
const CCP_TEXT_OFFSET: usize = 0x004C;
const FC_CLX_OFFSET: usize = 0x01A2;
const LCB_CLX_OFFSET: usize = 0x01A6;
/// `fCompressed` bit of a piece descriptor's file offset.
const COMPRESSED_FLAG: u32 = 0x4000_0000;

fn u16_at(data: &[u8], offset: usize) -> Result<u16, IngestError> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| IngestError::corrupted(format!("truncated at offset {offset:#x}")))
}

fn u32_at(data: &[u8], offset: usize) -> Result<u32, IngestError> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| IngestError::corrupted(format!("truncated at offset {offset:#x}")))
}

fn read_stream(
    file: &mut cfb::CompoundFile<Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, IngestError> {
    let mut stream = file
        .open_stream(name)
        .map_err(|e| IngestError::corrupted(format!("{name}: {e}")))?;
    let mut buf = Vec::new();
    stream
        .read_to_end(&mut buf)
        .map_err(|e| IngestError::corrupted(format!("{name}: {e}")))?;
    Ok(buf)
}

/// Parse `.doc` bytes into unstyled runs.
pub fn parse(data: &[u8]) -> Result<RichDocument, IngestError> {
    let mut file = cfb::CompoundFile::open(Cursor::new(data)).map_err(IngestError::corrupted)?;
    let word = read_stream(&mut file, "/WordDocument")?;

    if u16_at(&word, 0)? != WORD_IDENT {
        return Err(IngestError::parsing("WordDocument stream has no Word signature"));
    }
    let flags = u16_at(&word, FLAGS_OFFSET)?;
    let table_name = if flags & WHICH_TABLE_FLAG != 0 {
        "/1Table"
    } else {
        "/0Table"
    };
    let table = read_stream(&mut file, table_name)?;

    let text_chars = u32_at(&word, CCP_TEXT_OFFSET)? as usize;
    let fc_clx = u32_at(&word, FC_CLX_OFFSET)? as usize;
    let lcb_clx = u32_at(&word, LCB_CLX_OFFSET)? as usize;
    let clx = table
        .get(fc_clx..fc_clx + lcb_clx)
        .ok_or_else(|| IngestError::corrupted("CLX outside table stream"))?;

    let raw = piece_text(&word, clx, text_chars)?;
    let mut text = RichText::new();
    text.push(clean(&raw), RunStyle::default());
    Ok(RichDocument {
        text,
        title: None,
        author: None,
    })
}

/// Concatenate the pieces covering the first `limit` characters.
fn piece_text(word: &[u8], clx: &[u8], limit: usize) -> Result<String, IngestError> {
    // Skip Prc entries (grpprl modifiers) preceding the piece table.
    let mut pos = 0;
    while clx.get(pos) == Some(&0x01) {
        let size = u16_at(clx, pos + 1)? as usize;
        pos += 3 + size;
    }
    if clx.get(pos) != Some(&0x02) {
        return Err(IngestError::corrupted("piece table not found"));
    }
    let lcb = u32_at(clx, pos + 1)? as usize;
    let plc = clx
        .get(pos + 5..pos + 5 + lcb)
        .ok_or_else(|| IngestError::corrupted("truncated piece table"))?;

    // PlcPcd: (n + 1) CPs of 4 bytes then n descriptors of 8 bytes.
    let pieces = lcb.saturating_sub(4) / 12;
    let descriptors = 4 * (pieces + 1);

    let mut out = String::new();
    let mut taken = 0usize;
    for i in 0..pieces {
        if taken >= limit {
            break;
        }
        let cp_start = u32_at(plc, 4 * i)? as usize;
        let cp_end = u32_at(plc, 4 * (i + 1))? as usize;
        let count = cp_end.saturating_sub(cp_start).min(limit - taken);
        let fc = u32_at(plc, descriptors + 8 * i + 2)?;

        if fc & COMPRESSED_FLAG != 0 {
            let offset = ((fc & !COMPRESSED_FLAG) / 2) as usize;
            let bytes = word
                .get(offset..offset + count)
                .ok_or_else(|| IngestError::corrupted("piece outside WordDocument"))?;
            out.extend(bytes.iter().map(|b| cp1252(*b)));
        } else {
            let offset = fc as usize;
            let bytes = word
                .get(offset..offset + 2 * count)
                .ok_or_else(|| IngestError::corrupted("piece outside WordDocument"))?;
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            out.push_str(&String::from_utf16_lossy(&units));
        }
        taken += count;
    }
    Ok(out)
}

/// Map Word's in-band control characters to text; drop field codes.
fn clean(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    // Depth of nested fields whose instruction part is being skipped.
    let mut field_code: Vec<bool> = Vec::new();
    for c in raw.chars() {
        match c {
            '\u{13}' => field_code.push(true),
            '\u{14}' => {
                if let Some(top) = field_code.last_mut() {
                    *top = false;
                }
            }
            '\u{15}' => {
                field_code.pop();
            }
            _ if field_code.last() == Some(&true) => {}
            '\r' | '\u{0B}' | '\u{0C}' => out.push('\n'),
            '\u{07}' => out.push('\t'),
            '\u{1E}' => out.push('-'),
            '\u{A0}' => out.push(' '),
            '\u{01}' | '\u{08}' | '\u{1F}' => {}
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_codes_are_dropped() {
        let raw = "See \u{13}HYPERLINK \"x\"\u{14}docs\u{15} here\rNext";
        assert_eq!(clean(raw), "See docs here\nNext");
    }

    #[test]
    fn piece_table_compressed_and_unicode() {
        // Piece 0: "Hi " compressed at byte 0x10; piece 1: "Zoë" UTF-16 at 0x20.
        let mut word = vec![0u8; 0x40];
        word[0x10..0x13].copy_from_slice(b"Hi ");
        for (i, unit) in "Zoë".encode_utf16().enumerate() {
            word[0x20 + 2 * i..0x22 + 2 * i].copy_from_slice(&unit.to_le_bytes());
        }

        let mut plc = Vec::new();
        for cp in [0u32, 3, 6] {
            plc.extend_from_slice(&cp.to_le_bytes());
        }
        for fc in [(0x10u32 * 2) | COMPRESSED_FLAG, 0x20] {
            plc.extend_from_slice(&0u16.to_le_bytes());
            plc.extend_from_slice(&fc.to_le_bytes());
            plc.extend_from_slice(&0u16.to_le_bytes());
        }
        let mut clx = vec![0x01, 0x02, 0x00, 0xAA, 0xBB, 0x02];
        clx.extend_from_slice(&(plc.len() as u32).to_le_bytes());
        clx.extend_from_slice(&plc);

        assert_eq!(piece_text(&word, &clx, 6).unwrap(), "Hi Zoë");
        assert_eq!(piece_text(&word, &clx, 4).unwrap(), "Hi Z");
    }

    #[test]
    fn not_a_compound_file_is_corrupted() {
        assert!(matches!(
            parse(b"not a doc"),
            Err(IngestError::FileCorrupted { .. })
        ));
    }
}
