// Primitives shared by the tabular import formats.

use std::collections::BTreeMap;
use std::path::Path;

use calamine::{open_workbook_auto, DataType, Reader};
use log::{debug, info, warn};

use election_results::headers::{as_valid_identifier, match_headers, normalize_header};
use election_results::*;

use crate::imports::FileImportError;

pub const EMPTY_FILE: &str = "The csv/xls/xlsx file is empty.";
pub const EMPTY_LINE: &str = "The file contains an empty line.";
pub const INVALID_FILE: &str = "Not a valid csv/xls/xlsx file.";

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// One data row of a file. The cells are keyed by the identifier of their
/// column (see `as_valid_identifier`).
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Line {
    /// The row number in the file. The header is row 1.
    pub rownumber: usize,
    cells: BTreeMap<String, String>,
}

impl Line {
    pub fn has(&self, col: &str) -> bool {
        self.cells.contains_key(col)
    }

    /// The trimmed value of a cell, empty if the column does not exist.
    pub fn get(&self, col: &str) -> &str {
        self.cells.get(col).map(|s| s.trim()).unwrap_or("")
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.cells.keys()
    }

    /// A non-negative integer. Empty cells count as 0.
    pub fn int(&self, col: &str) -> Result<u64, String> {
        Ok(self.opt_int(col)?.unwrap_or(0))
    }

    /// A non-negative integer, `None` for an empty cell.
    pub fn opt_int(&self, col: &str) -> Result<Option<u64>, String> {
        let value = self.get(col);
        if value.is_empty() {
            return Ok(None);
        }
        value
            .parse::<u64>()
            .map(Some)
            .map_err(|_| format!("Invalid integer: {}", col))
    }

    /// A count which must fit a `u32` (mandates, years). Empty cells count
    /// as 0.
    pub fn small_int(&self, col: &str) -> Result<u32, String> {
        Ok(self.opt_small_int(col)?.unwrap_or(0))
    }

    pub fn opt_small_int(&self, col: &str) -> Result<Option<u32>, String> {
        self.opt_int(col)?
            .map(u32::try_from)
            .transpose()
            .map_err(|_| format!("Invalid integer: {}", col))
    }

    /// An integer which may be negative (`-1` stands for "not set" in some
    /// exports).
    pub fn signed_int(&self, col: &str) -> Result<Option<i64>, String> {
        let value = self.get(col);
        if value.is_empty() {
            return Ok(None);
        }
        value
            .parse::<i64>()
            .map(Some)
            .map_err(|_| format!("Invalid integer: {}", col))
    }

    /// A non-empty value.
    pub fn required(&self, col: &str) -> Result<String, String> {
        let value = self.get(col);
        if value.is_empty() {
            return Err(format!("Empty value: {}", col));
        }
        Ok(value.to_string())
    }

    /// A decimal number with at most two decimals, `None` for an empty cell.
    pub fn centi(&self, col: &str) -> Result<Option<Centi>, String> {
        let value = self.get(col);
        if value.is_empty() {
            return Ok(None);
        }
        Centi::parse(value)
            .map(Some)
            .ok_or_else(|| format!("Invalid decimal number: {}", col))
    }

    /// A list id: letters, digits, `_` and `.`. Empty cells give `0`.
    pub fn list_id(&self, col: &str) -> Result<String, String> {
        let value = self.get(col);
        if value.is_empty() {
            return Ok("0".to_string());
        }
        if value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            Ok(value.to_string())
        } else {
            Err(format!("Not an alphanumeric: {}", col))
        }
    }

    /// A color in the `#rrggbb` notation, `None` for an empty cell.
    pub fn color(&self, col: &str) -> Result<Option<String>, String> {
        let value = self.get(col);
        if value.is_empty() {
            return Ok(None);
        }
        let valid = value.len() == 7
            && value.starts_with('#')
            && value[1..].chars().all(|c| c.is_ascii_hexdigit());
        if valid {
            Ok(Some(value.to_string()))
        } else {
            Err(format!("Invalid color: {}", col))
        }
    }

    pub fn gender(&self, col: &str) -> Result<Option<Gender>, String> {
        let value = self.get(col);
        if value.is_empty() {
            return Ok(None);
        }
        Gender::parse(value)
            .map(Some)
            .ok_or_else(|| format!("Invalid gender: {}", value))
    }

    /// `true`, in any case, is true. Everything else is false.
    pub fn flag(&self, col: &str) -> bool {
        self.get(col).eq_ignore_ascii_case("true")
    }
}

/// A tabular file whose headers matched the expected columns.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Table {
    pub filename: String,
    /// The normalized headers, in the order of the file.
    pub headers: Vec<String>,
    /// The column identifiers of the headers.
    pub columns: Vec<String>,
    pub lines: Vec<Line>,
}

impl Table {
    pub fn error(&self, line: &Line, error: String) -> FileImportError {
        FileImportError {
            filename: Some(self.filename.clone()),
            line: Some(line.rownumber),
            error,
        }
    }

    /// Records every error of a line.
    pub fn extend_errors(&self, errors: &mut Vec<FileImportError>, line: &Line, messages: Vec<String>) {
        errors.extend(messages.into_iter().map(|m| self.error(line, m)));
    }
}

// ******** Decoding ********

// Code points of the bytes 0x80..=0x9F in Windows-1252. The five undefined
// bytes map to the C1 control characters, as the WHATWG decoder does.
const CP1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

fn decode_cp1252(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| match *b {
            0x80..=0x9F => CP1252_HIGH[(*b - 0x80) as usize],
            _ => *b as char,
        })
        .collect()
}

fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Decodes the content of a file: UTF-16LE (as written by Wabsti), UTF-8
/// (with or without BOM), falling back to Windows-1252.
pub fn decode(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(b"\xFF\xFE") {
        return decode_utf16le(rest);
    }
    if bytes.len() >= 2 && bytes[0] != 0 && bytes[1] == 0 {
        debug!("decode: looks like utf-16le without BOM");
        return decode_utf16le(bytes);
    }
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            debug!("decode: not utf-8, falling back to windows-1252");
            decode_cp1252(bytes)
        }
    }
}

/// Picks the most frequent of `,`, `;` and tab in the header line.
pub fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut best = (b',', 0);
    for d in [b',', b';', b'\t'] {
        let count = header.bytes().filter(|b| *b == d).count();
        if count > best.1 {
            best = (d, count);
        }
    }
    best.0
}

pub fn read_csv_rows(text: &str) -> Result<Vec<Vec<String>>, String> {
    // The csv reader skips empty lines on its own.
    let mut lines = text.lines().skip_while(|l| l.trim().is_empty());
    if lines.any(|l| l.trim().is_empty()) && lines.any(|l| !l.trim().is_empty()) {
        return Err(EMPTY_LINE.to_string());
    }
    let delimiter = sniff_delimiter(text);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());
    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| {
            debug!("read_csv_rows: {:?}", e);
            INVALID_FILE.to_string()
        })?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }
    Ok(rows)
}

fn cell_to_string(cell: &DataType) -> String {
    match cell {
        DataType::Empty => "".to_string(),
        DataType::String(s) => s.clone(),
        DataType::Int(i) => i.to_string(),
        DataType::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        DataType::Float(f) => f.to_string(),
        DataType::Bool(b) => b.to_string(),
        x => format!("{}", x),
    }
}

/// Reads the sheet `Resultate` of a workbook, or its first sheet.
pub fn read_excel_rows(path: &str) -> Result<Vec<Vec<String>>, String> {
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        debug!("read_excel_rows: {:?}", e);
        INVALID_FILE.to_string()
    })?;
    let range = match workbook.worksheet_range("Resultate") {
        Some(r) => r,
        None => workbook
            .worksheet_range_at(0)
            .ok_or_else(|| EMPTY_FILE.to_string())?,
    }
    .map_err(|e| {
        debug!("read_excel_rows: {:?}", e);
        INVALID_FILE.to_string()
    })?;
    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();
    let mut data = rows.iter().skip_while(|r| is_blank(r));
    if data.any(|r| is_blank(r)) && data.any(|r| !is_blank(r)) {
        return Err(EMPTY_LINE.to_string());
    }
    Ok(rows)
}

fn is_excel(path: &str) -> bool {
    let extension = Path::new(path)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    matches!(extension.as_str(), "xlsx" | "xls" | "xlsm" | "ods")
}

/// Loads a csv, xls or xlsx file and matches its headers.
pub fn load_table(path: &str, filename: &str, expected: &[&str]) -> Result<Table, FileImportError> {
    info!("load_table: reading {} from {:?}", filename, path);
    let file_error = |error: String| FileImportError {
        filename: Some(filename.to_string()),
        line: None,
        error,
    };
    let rows = if is_excel(path) {
        read_excel_rows(path).map_err(file_error)?
    } else {
        let bytes = std::fs::read(path).map_err(|e| {
            warn!("load_table: could not read {:?}: {}", path, e);
            file_error(INVALID_FILE.to_string())
        })?;
        read_csv_rows(&decode(&bytes)).map_err(file_error)?
    };
    table_from_rows(rows, filename, expected)
}

/// Loads csv content held in memory.
pub fn load_csv_text(text: &str, filename: &str, expected: &[&str]) -> Result<Table, FileImportError> {
    let rows = read_csv_rows(text).map_err(|error| FileImportError {
        filename: Some(filename.to_string()),
        line: None,
        error,
    })?;
    table_from_rows(rows, filename, expected)
}

/// Loads the file registered under `key` in the inputs of a multi-file
/// export.
pub fn load_input(
    inputs: &BTreeMap<String, String>,
    key: &str,
    expected: &[&str],
) -> Result<Table, FileImportError> {
    match inputs.get(key) {
        Some(path) => load_table(path, key, expected),
        None => Err(FileImportError::in_file(key, "No file given")),
    }
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

/// Matches the header row against the expected columns and keys the cells
/// of the data rows by column. Empty header cells are dropped. Trailing
/// blank rows are ignored; blank rows between data rows are kept as lines
/// with empty cells.
pub fn table_from_rows(
    rows: Vec<Vec<String>>,
    filename: &str,
    expected: &[&str],
) -> Result<Table, FileImportError> {
    let file_error = |error: String| FileImportError {
        filename: Some(filename.to_string()),
        line: None,
        error,
    };
    let mut iter = rows.into_iter().skip_while(|r| is_blank(r));
    let header = match iter.next() {
        Some(h) => h,
        None => return Err(file_error(EMPTY_FILE.to_string())),
    };
    let positions: Vec<(usize, String)> = header
        .iter()
        .enumerate()
        .map(|(i, h)| (i, normalize_header(h)))
        .filter(|(_, h)| !h.is_empty())
        .collect();
    let headers: Vec<String> = positions.iter().map(|(_, h)| h.clone()).collect();
    let expected: Vec<String> = expected.iter().map(|e| normalize_header(e)).collect();
    let matched = match_headers(&headers, &expected).map_err(|e| file_error(e.to_string()))?;
    let columns: Vec<String> = matched.iter().map(|h| as_valid_identifier(h)).collect();
    debug!("table_from_rows: {}: columns {:?}", filename, columns);

    let mut rows: Vec<Vec<String>> = iter.collect();
    while rows.last().map(|r| is_blank(r)).unwrap_or(false) {
        rows.pop();
    }
    let mut lines: Vec<Line> = Vec::new();
    for (idx, row) in rows.into_iter().enumerate() {
        let cells: BTreeMap<String, String> = positions
            .iter()
            .zip(columns.iter())
            .map(|((pos, _), col)| (col.clone(), row.get(*pos).cloned().unwrap_or_default()))
            .collect();
        lines.push(Line {
            rownumber: idx + 2,
            cells,
        });
    }
    Ok(Table {
        filename: filename.to_string(),
        headers: matched,
        columns,
        lines,
    })
}

// ******** Entities ********

const EXPATS_SG: u64 = 9170;

/// The BFS numbers used for the Swiss abroad in the exports.
pub fn is_expats(id: u64) -> bool {
    id == EXPATS_SG || ((19010..=19260).contains(&id) && id % 10 == 0)
}

/// Reads an entity id, mapping the expat numbers to the expats entity.
pub fn entity_id(line: &Line, col: &str) -> Result<EntityId, String> {
    let id = line.int(col)?;
    if is_expats(id) {
        return Ok(EXPATS_ENTITY_ID);
    }
    EntityId::try_from(id).map_err(|_| format!("Invalid integer: {}", col))
}

/// The entities an election or a vote may contain.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub catalogue: &'a EntityCatalogue,
    pub domain: Domain,
    pub segment: Option<&'a str>,
    pub has_expats: bool,
}

impl<'a> Scope<'a> {
    pub fn of_election(election: &'a Election, catalogue: &'a EntityCatalogue) -> Scope<'a> {
        Scope {
            catalogue,
            domain: election.domain,
            segment: election.domain_segment.as_deref(),
            has_expats: election.has_expats,
        }
    }

    pub fn of_vote(vote: &'a Vote, catalogue: &'a EntityCatalogue) -> Scope<'a> {
        Scope {
            catalogue,
            domain: vote.domain,
            segment: vote.domain_segment.as_deref(),
            has_expats: vote.has_expats,
        }
    }

    /// Expat rows are ignored unless the business has expats.
    pub fn skips(&self, entity_id: EntityId) -> bool {
        entity_id == EXPATS_ENTITY_ID && !self.has_expats
    }

    /// Adds the errors of an unknown entity or of an entity outside of the
    /// domain segment.
    pub fn check(&self, entity_id: EntityId, errors: &mut Vec<String>) {
        if entity_id != EXPATS_ENTITY_ID && !self.catalogue.contains(entity_id) {
            errors.push(format!("{} is unknown", entity_id));
        }
        if let Some(e) = self.catalogue.scope_error(entity_id, self.domain, self.segment) {
            errors.push(e);
        }
    }

    pub fn locate(&self, entity_id: EntityId) -> EntityLocation {
        self.catalogue.locate(entity_id, self.domain)
    }

    pub fn missing(&self, present: &[EntityId]) -> Vec<(EntityId, EntityLocation)> {
        self.catalogue
            .missing_entities(present, self.domain, self.segment, self.has_expats)
    }
}

/// Whether a line of a Wabsti-C export belongs to the selected election.
pub fn line_is_relevant(line: &Line, number: &str, district: Option<&str>) -> bool {
    match district {
        Some(d) if !d.is_empty() => {
            line.get("sortwahlkreis") == d && line.get("sortgeschaeft") == number
        }
        _ => line.get("sortgeschaeft") == number,
    }
}

/// Appends uncounted rows for the entities of the scope which are absent
/// from the results.
pub fn add_missing_election_results(scope: &Scope, results: &mut Vec<ElectionResult>) {
    let present: Vec<EntityId> = results.iter().map(|r| r.entity_id).collect();
    for (id, location) in scope.missing(&present) {
        results.push(ElectionResult::uncounted(id, location));
    }
}
