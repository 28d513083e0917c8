use super::{
    DocumentAdapter, ZipArchive, attr_value, open_package, read_zip_entry_bounded, xml_error,
};
use crate::domain::errors::ExtractionError;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// Cell values of every worksheet, row-major, each sheet under a name header.
pub struct XlsxAdapter;

impl DocumentAdapter for XlsxAdapter {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let mut archive = open_package(bytes, "xlsx")?;
        let sheets = list_sheets(&mut archive)?;
        let shared_strings = match read_zip_entry_bounded(&mut archive, SHARED_STRINGS_PART)? {
            Some(xml) => read_shared_strings(&xml)?,
            None => Vec::new(),
        };

        let mut blocks = Vec::with_capacity(sheets.len());
        for sheet in sheets {
            let xml = read_zip_entry_bounded(&mut archive, &sheet.part)?.ok_or_else(|| {
                ExtractionError::Malformed(format!("worksheet {} not found", sheet.part))
            })?;
            let rows = sheet_rows(&xml, &sheet.part, &shared_strings)?;

            let underline = "-".repeat(sheet.name.chars().count() + 7);
            let mut block = format!("Sheet: {}\n{}", sheet.name, underline);
            for row in rows {
                block.push('\n');
                block.push_str(&row);
            }
            blocks.push(block);
        }
        Ok(blocks.join("\n\n"))
    }
}

struct SheetRef {
    name: String,
    part: String,
}

/// Sheets in workbook order, resolved to their worksheet parts.
fn list_sheets(archive: &mut ZipArchive<'_>) -> Result<Vec<SheetRef>, ExtractionError> {
    let workbook = read_zip_entry_bounded(archive, WORKBOOK_PART)?
        .ok_or_else(|| ExtractionError::Malformed(format!("{} not found", WORKBOOK_PART)))?;
    let targets = match read_zip_entry_bounded(archive, WORKBOOK_RELS_PART)? {
        Some(xml) => read_relationships(&xml)?,
        None => HashMap::new(),
    };

    let mut sheets = Vec::new();
    let mut reader = Reader::from_reader(workbook.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| xml_error(WORKBOOK_PART, e))?
        {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let position = sheets.len() + 1;
                let name = attr_value(&e, b"name").unwrap_or_else(|| format!("Sheet{}", position));
                let part = attr_value(&e, b"id")
                    .and_then(|id| targets.get(&id).cloned())
                    .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", position));
                sheets.push(SheetRef { name, part });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

fn read_relationships(xml: &[u8]) -> Result<HashMap<String, String>, ExtractionError> {
    let mut targets = HashMap::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| xml_error(WORKBOOK_RELS_PART, e))?
        {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr_value(&e, b"Id"), attr_value(&e, b"Target"))
                {
                    targets.insert(id, resolve_target(&target));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractionError> {
    let mut strings = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| xml_error(SHARED_STRINGS_PART, e))?
        {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(t) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&t.unescape().map_err(|e| xml_error(SHARED_STRINGS_PART, e))?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"t" => in_t = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Columns in a worksheet, `A` through `XFD`.
const MAX_COLUMNS: usize = 16_384;

/// Zero-based column of a cell reference such as `AB12`. `None` when the
/// reference carries no column letters.
fn column_index(reference: &str) -> Result<Option<usize>, ExtractionError> {
    let letters = reference
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .map(|b| b.to_ascii_uppercase());
    let mut number = 0usize;
    let mut seen = false;
    for b in letters {
        seen = true;
        number = number
            .checked_mul(26)
            .and_then(|n| n.checked_add((b - b'A' + 1) as usize))
            .filter(|n| *n <= MAX_COLUMNS)
            .ok_or_else(|| column_out_of_range(reference))?;
    }
    Ok(seen.then(|| number - 1))
}

fn column_out_of_range(reference: &str) -> ExtractionError {
    ExtractionError::Malformed(format!("cell reference {} is beyond column XFD", reference))
}

#[derive(Default)]
struct CellState {
    column: usize,
    kind: String,
    value: String,
}

impl CellState {
    fn start(e: &BytesStart<'_>, next_column: usize) -> Result<Self, ExtractionError> {
        let reference = attr_value(e, b"r");
        let column = match reference.as_deref().map(column_index).transpose()?.flatten() {
            Some(column) => column,
            None if next_column < MAX_COLUMNS => next_column,
            None => return Err(column_out_of_range(reference.as_deref().unwrap_or("(implicit)"))),
        };
        Ok(CellState {
            column,
            kind: attr_value(e, b"t").unwrap_or_default(),
            value: String::new(),
        })
    }

    fn resolve(self, shared_strings: &[String]) -> (usize, String) {
        let value = match self.kind.as_str() {
            "s" => self
                .value
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| shared_strings.get(i).cloned())
                .unwrap_or(self.value),
            "b" => match self.value.trim() {
                "1" => "TRUE".to_string(),
                "0" => "FALSE".to_string(),
                _ => self.value,
            },
            _ => self.value,
        };
        (self.column, value)
    }
}

fn sheet_rows(
    xml: &[u8],
    part: &str,
    shared_strings: &[String],
) -> Result<Vec<String>, ExtractionError> {
    let mut rows = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut cells: Vec<(usize, String)> = Vec::new();
    let mut cell: Option<CellState> = None;
    let mut next_column = 0usize;
    let mut capture = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| xml_error(part, e))? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    cells.clear();
                    next_column = 0;
                }
                b"c" => cell = Some(CellState::start(&e, next_column)?),
                b"v" | b"t" => capture = cell.is_some(),
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                next_column = CellState::start(&e, next_column)?.column + 1;
            }
            Event::Text(t) if capture => {
                if let Some(c) = cell.as_mut() {
                    c.value.push_str(&t.unescape().map_err(|e| xml_error(part, e))?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    if let Some(c) = cell.take() {
                        let (column, value) = c.resolve(shared_strings);
                        next_column = column + 1;
                        if !value.is_empty() {
                            cells.push((column, value));
                        }
                    }
                }
                b"row" => {
                    if let Some(row) = render_row(&cells) {
                        rows.push(row);
                    }
                    cells.clear();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

fn render_row(cells: &[(usize, String)]) -> Option<String> {
    let width = cells.iter().map(|(col, _)| col + 1).max()?;
    let mut values = vec![""; width];
    for (col, value) in cells {
        values[*col] = value.as_str();
    }
    Some(values.join(" | "))
}
