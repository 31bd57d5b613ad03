//! Byte-level I/O for uploads and templates.
//!
//! - **Decoding**: uploads arrive in an unknown encoding. [`decode_upload`]
//!   tries UTF-8 (with any byte-order mark stripped) and then Shift_JIS,
//!   returning the first decode that covers the whole input.
//! - **Reading**: [`open_csv_reader`] parses decoded text without treating
//!   the first record as headers, so header validation stays explicit.
//!   [`read_data_rows`] tags every data record with its file line and keeps
//!   interior blank lines as empty records.
//! - **Writing**: templates are written with a UTF-8 byte-order mark and
//!   CRLF line endings so spreadsheet tools open them correctly.

use std::{
    fs::File,
    io::{self, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result};
use encoding_rs::{Encoding, SHIFT_JIS, UTF_8};
use log::debug;

use crate::error::ImportError;

pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Candidate encodings in priority order.
pub fn upload_encodings() -> [&'static Encoding; 2] {
    [UTF_8, SHIFT_JIS]
}

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn decode_upload(bytes: &[u8]) -> Result<String, ImportError> {
    for encoding in upload_encodings() {
        let body = if encoding == UTF_8 {
            bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
        } else {
            bytes
        };
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(body) {
            debug!("Decoded {} byte(s) as {}", bytes.len(), encoding.name());
            return Ok(text.into_owned());
        }
    }
    Err(ImportError::Encoding)
}

pub fn open_csv_reader(text: &str) -> csv::Reader<&[u8]> {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(text.as_bytes())
}

fn is_line_break(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

/// Byte offset → 1-based line lookup. `\r\n`, `\n` and a lone `\r` each end
/// a line.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut starts = vec![0];
        for (idx, byte) in bytes.iter().enumerate() {
            let ends_line = match byte {
                b'\n' => true,
                b'\r' => bytes.get(idx + 1) != Some(&b'\n'),
                _ => false,
            };
            if ends_line {
                starts.push(idx + 1);
            }
        }
        Self { starts }
    }

    pub fn line_of(&self, byte: usize) -> usize {
        self.starts.partition_point(|start| *start <= byte)
    }
}

/// A data record and the file line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub line: usize,
    pub record: csv::StringRecord,
}

/// Reads the records left after the header. The csv reader skips blank
/// lines; a blank line between records is returned as an empty record so it
/// is reported at its own line. Blank lines after the last record are
/// dropped.
pub fn read_data_rows(
    reader: &mut csv::Reader<&[u8]>,
    text: &str,
) -> Result<Vec<SourceRow>, ImportError> {
    let bytes = text.as_bytes();
    let lines = LineIndex::new(text);
    let mut consumed = reader.position().byte() as usize;
    let mut last_line = bytes[..consumed]
        .iter()
        .rposition(|b| !is_line_break(*b))
        .map(|idx| lines.line_of(idx))
        .unwrap_or(0);

    let mut rows = Vec::new();
    let mut record = csv::StringRecord::new();
    while reader.read_record(&mut record)? {
        let end = reader.position().byte() as usize;
        let start = (consumed..end)
            .find(|idx| !is_line_break(bytes[*idx]))
            .unwrap_or(consumed);
        let first_line = lines.line_of(start);
        rows.extend((last_line + 1..first_line).map(|line| SourceRow {
            line,
            record: csv::StringRecord::new(),
        }));
        rows.push(SourceRow {
            line: first_line,
            record: record.clone(),
        });
        last_line = bytes[..end]
            .iter()
            .rposition(|b| !is_line_break(*b))
            .map(|idx| lines.line_of(idx))
            .unwrap_or(first_line);
        consumed = end;
    }
    Ok(rows)
}

/// Renders one CSV line (BOM-prefixed, CRLF-terminated) from `headers`.
pub fn write_header_line(headers: &[String]) -> Result<Vec<u8>> {
    let mut buffer = UTF8_BOM.to_vec();
    {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .from_writer(&mut buffer);
        writer.write_record(headers)?;
        writer.flush()?;
    }
    Ok(buffer)
}

pub fn read_input(path: &Path) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    if is_dash(path) {
        io::stdin()
            .lock()
            .read_to_end(&mut buf)
            .context("Reading upload from stdin")?;
    } else {
        File::open(path)
            .with_context(|| format!("Opening input file {path:?}"))?
            .read_to_end(&mut buf)
            .with_context(|| format!("Reading input file {path:?}"))?;
    }
    Ok(buf)
}

pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(io::stdout()),
    })
}
