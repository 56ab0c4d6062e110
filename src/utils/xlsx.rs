// Minimal reader for the first-party xlsx files published by the EIA.  Only
// cell values are read, formatting and formulas are ignored.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("not a valid xlsx archive: {0}")]
    Zip(#[from] ZipError),
    #[error("malformed xml: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed xml attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("sheet {0} not found in workbook")]
    MissingSheet(usize),
    #[error("shared string index {0} out of range")]
    SharedString(usize),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read all rows of the worksheet part `xl/worksheets/sheet<sheet>.xml`.
/// The tab order in `workbook.xml` is not consulted.  Rows and cells missing
/// from the xml come back as empty strings, so positions are preserved.
pub fn read_rows(path: &Path, sheet: usize) -> Result<Vec<Vec<String>>, XlsxError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let shared = match archive.by_name("xl/sharedStrings.xml") {
        Ok(file) => read_shared_strings(BufReader::new(file))?,
        Err(ZipError::FileNotFound) => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    let name = format!("xl/worksheets/sheet{}.xml", sheet);
    let rows = match archive.by_name(&name) {
        Ok(file) => read_sheet(BufReader::new(file), &shared)?,
        Err(ZipError::FileNotFound) => return Err(XlsxError::MissingSheet(sheet)),
        Err(e) => return Err(e.into()),
    };
    Ok(rows)
}

/// Write a worksheet out as a comma-delimited file, dropping the first
/// `skip_rows` rows and any blank rows.  Returns the number of rows written,
/// header included.
pub fn convert_to_csv(
    xlsx_path: &Path,
    sheet: usize,
    skip_rows: usize,
    csv_path: &Path,
) -> Result<usize, XlsxError> {
    let rows = read_rows(xlsx_path, sheet)?;
    let rows: Vec<&Vec<String>> = rows
        .iter()
        .skip(skip_rows)
        .filter(|row| row.iter().any(|v| !v.trim().is_empty()))
        .collect();
    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);

    let mut wtr = csv::Writer::from_path(csv_path)?;
    for row in &rows {
        let mut record: Vec<&str> = row.iter().map(|v| v.as_str()).collect();
        record.resize(width, "");
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(rows.len())
}

fn read_shared_strings<R: BufRead>(reader: R) -> Result<Vec<String>, XlsxError> {
    let mut xml = Reader::from_reader(reader);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = current.is_some(),
                // phonetic hints repeat the text, skip them
                b"rPh" => in_text = false,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(t) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&t.unescape().map_err(quick_xml::Error::from)?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"si" => {
                    if let Some(s) = current.take() {
                        strings.push(s);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

struct Cell {
    column: usize,
    kind: Option<String>,
    raw: String,
}

impl Cell {
    fn start(e: &BytesStart, next_column: usize) -> Result<Cell, XlsxError> {
        let mut cell = Cell {
            column: next_column,
            kind: None,
            raw: String::new(),
        };
        for attr in e.attributes() {
            let attr = attr?;
            let value = attr.unescape_value().map_err(quick_xml::Error::from)?;
            match attr.key.as_ref() {
                b"r" => {
                    if let Some(column) = column_index(&value) {
                        cell.column = column;
                    }
                }
                b"t" => cell.kind = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(cell)
    }

    fn value(self, shared: &[String]) -> Result<String, XlsxError> {
        match self.kind.as_deref() {
            Some("s") => {
                let i: usize = self
                    .raw
                    .trim()
                    .parse()
                    .map_err(|_| XlsxError::SharedString(usize::MAX))?;
                shared.get(i).cloned().ok_or(XlsxError::SharedString(i))
            }
            Some("b") => Ok(if self.raw.trim() == "1" {
                "true".to_string()
            } else {
                "false".to_string()
            }),
            _ => Ok(self.raw),
        }
    }
}

fn row_number(e: &BytesStart) -> Result<Option<usize>, XlsxError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"r" {
            let value: Cow<str> = attr.unescape_value().map_err(quick_xml::Error::from)?;
            return Ok(value.parse().ok());
        }
    }
    Ok(None)
}

fn read_sheet<R: BufRead>(reader: R, shared: &[String]) -> Result<Vec<Vec<String>>, XlsxError> {
    let mut xml = Reader::from_reader(reader);
    let mut buf = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell: Option<Cell> = None;
    let mut in_value = false;
    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    pad_rows(&mut rows, row_number(&e)?);
                    row = Vec::new();
                }
                b"c" => cell = Some(Cell::start(&e, row.len())?),
                b"v" | b"t" => in_value = cell.is_some(),
                _ => {}
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"row" {
                    pad_rows(&mut rows, row_number(&e)?);
                    rows.push(Vec::new());
                }
            }
            Event::Text(t) if in_value => {
                if let Some(c) = cell.as_mut() {
                    c.raw.push_str(&t.unescape().map_err(quick_xml::Error::from)?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(c) = cell.take() {
                        let column = c.column;
                        let value = c.value(shared)?;
                        if row.len() <= column {
                            row.resize(column + 1, String::new());
                        }
                        row[column] = value;
                    }
                }
                b"row" => rows.push(std::mem::take(&mut row)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

/// Rows are 1-based in the sheet; insert blanks for the ones left out.
fn pad_rows(rows: &mut Vec<Vec<String>>, row_number: Option<usize>) {
    if let Some(n) = row_number {
        while rows.len() + 1 < n {
            rows.push(Vec::new());
        }
    }
}

/// Zero-based column index from a cell reference, e.g. `"AB12"` -> 27.
fn column_index(reference: &str) -> Option<usize> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let n = letters.iter().try_fold(0usize, |acc, b| {
        acc.checked_mul(26)?.checked_add((b - b'A' + 1) as usize)
    })?;
    Some(n - 1)
}
