use super::{DocumentAdapter, open_package, read_zip_entry_bounded, xml_error};
use crate::domain::errors::ExtractionError;
use quick_xml::Reader;
use quick_xml::events::Event;

const DOCUMENT_PART: &str = "word/document.xml";

/// Paragraph and table text of a Word document, in document order.
///
/// Paragraphs become one line each; a table row becomes one line of its
/// non-empty cells joined with ` | `.
pub struct DocxAdapter;

impl DocumentAdapter for DocxAdapter {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let mut archive = open_package(bytes, "docx")?;
        let xml = read_zip_entry_bounded(&mut archive, DOCUMENT_PART)?.ok_or_else(|| {
            ExtractionError::Malformed(format!("{} not found", DOCUMENT_PART))
        })?;
        document_text(&xml)
    }
}

struct TableState {
    /// Open paragraphs around the table when it started.
    paragraph_depth: usize,
    row: Vec<String>,
    cell: String,
}

impl TableState {
    fn new(paragraph_depth: usize) -> Self {
        TableState {
            paragraph_depth,
            row: Vec::new(),
            cell: String::new(),
        }
    }

    fn push_paragraph(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.cell.is_empty() {
            self.cell.push(' ');
        }
        self.cell.push_str(text);
    }

    fn finish_cell(&mut self) {
        let cell = std::mem::take(&mut self.cell);
        self.row.push(cell.trim().to_string());
    }

    fn finish_row(&mut self) -> Option<String> {
        let cells: Vec<String> = std::mem::take(&mut self.row)
            .into_iter()
            .filter(|c| !c.is_empty())
            .collect();
        if cells.is_empty() {
            None
        } else {
            Some(cells.join(" | "))
        }
    }
}

/// Accumulates output lines while walking `word/document.xml`.
///
/// Paragraphs nest when a run holds a text box; nested text is appended to
/// the enclosing paragraph. Nested tables are flattened into the enclosing
/// cell.
#[derive(Default)]
struct Collector {
    lines: Vec<String>,
    paragraphs: Vec<String>,
    tables: Vec<TableState>,
}

impl Collector {
    /// Text finished at the current nesting level goes to the innermost
    /// open table cell or paragraph, or becomes a top-level line.
    fn emit(&mut self, text: String) {
        let depth = self.paragraphs.len();
        if let Some(table) = self.tables.last_mut() {
            if table.paragraph_depth == depth {
                table.push_paragraph(&text);
                return;
            }
        }
        match self.paragraphs.last_mut() {
            Some(parent) => {
                let text = text.trim();
                if !text.is_empty() {
                    if !parent.is_empty() {
                        parent.push(' ');
                    }
                    parent.push_str(text);
                }
            }
            None if !text.trim().is_empty() => self.lines.push(text),
            None => {}
        }
    }

    fn push_str(&mut self, text: &str) {
        if let Some(paragraph) = self.paragraphs.last_mut() {
            paragraph.push_str(text);
        }
    }

    fn push(&mut self, c: char) {
        if let Some(paragraph) = self.paragraphs.last_mut() {
            paragraph.push(c);
        }
    }

    /// A finished row lands in the cell or paragraph around its table.
    fn finish_row(&mut self) {
        let Some(mut table) = self.tables.pop() else {
            return;
        };
        if let Some(row) = table.finish_row() {
            self.emit(row);
        }
        self.tables.push(table);
    }
}

fn document_text(xml: &[u8]) -> Result<String, ExtractionError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = Collector::default();
    let mut in_text = false;
    // Tabs and breaks only count inside a run; `w:pPr` holds tab stops.
    let mut runs = 0usize;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| xml_error(DOCUMENT_PART, e))?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" => in_text = runs > 0,
                b"r" => runs += 1,
                b"p" => out.paragraphs.push(String::new()),
                b"tbl" => out.tables.push(TableState::new(out.paragraphs.len())),
                b"tc" => {
                    if let Some(table) = out.tables.last_mut() {
                        table.cell.clear();
                    }
                }
                _ => {}
            },
            Event::Empty(e) if runs > 0 => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" | b"cr" => out.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t.unescape().map_err(|e| xml_error(DOCUMENT_PART, e))?;
                out.push_str(&text);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"r" => runs = runs.saturating_sub(1),
                b"p" => {
                    if let Some(text) = out.paragraphs.pop() {
                        out.emit(text);
                    }
                }
                b"tc" => {
                    if let Some(table) = out.tables.last_mut() {
                        table.finish_cell();
                    }
                }
                b"tr" => out.finish_row(),
                b"tbl" => {
                    out.tables.pop();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out.lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extract::fixtures::{docx_with_body, zip_package};

    #[test]
    fn test_paragraphs_and_tables_in_document_order() {
        let body = concat!(
            "<w:p><w:r><w:t>Intro</w:t></w:r><w:r><w:t xml:space=\"preserve\"> text</w:t></w:r></w:p>",
            "<w:tbl>",
            "<w:tr><w:tc><w:p><w:r><w:t>Name</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Qty</w:t></w:r></w:p></w:tc></w:tr>",
            "<w:tr><w:tc><w:p><w:r><w:t>Bolts</w:t></w:r></w:p></w:tc><w:tc><w:p/></w:tc><w:tc><w:p><w:r><w:t>12</w:t></w:r></w:p></w:tc></w:tr>",
            "</w:tbl>",
            "<w:p><w:r><w:t>Closing &amp; notes</w:t></w:r></w:p>",
        );
        let text = DocxAdapter.extract(&docx_with_body(body)).unwrap();
        assert_eq!(text, "Intro text\nName | Qty\nBolts | 12\nClosing & notes");
    }

    #[test]
    fn test_tabs_breaks_and_empty_paragraphs() {
        let body = concat!(
            "<w:p><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t><w:br/><w:t>c</w:t></w:r></w:p>",
            "<w:p></w:p>",
            "<w:p><w:r><w:t>d</w:t></w:r></w:p>",
        );
        let text = DocxAdapter.extract(&docx_with_body(body)).unwrap();
        assert_eq!(text, "a\tb\nc\nd");
    }

    #[test]
    fn test_tab_stops_in_paragraph_properties_are_not_text() {
        let body = concat!(
            "<w:p><w:pPr><w:tabs><w:tab w:val=\"left\" w:pos=\"720\"/></w:tabs></w:pPr>",
            "<w:r><w:t>Title</w:t></w:r></w:p>",
            "<w:p><w:pPr><w:tabs><w:tab w:val=\"right\" w:pos=\"9000\"/></w:tabs></w:pPr>",
            "<w:r><w:t>Name</w:t><w:tab/><w:t>Page</w:t></w:r></w:p>",
        );
        let text = DocxAdapter.extract(&docx_with_body(body)).unwrap();
        assert_eq!(text, "Title\nName\tPage");
    }

    #[test]
    fn test_text_box_paragraph_keeps_enclosing_text() {
        let body = concat!(
            "<w:p><w:r><w:t>Before</w:t></w:r>",
            "<w:r><w:pict><v:shape><v:textbox><w:txbxContent>",
            "<w:p><w:r><w:t>Boxed</w:t></w:r></w:p>",
            "</w:txbxContent></v:textbox></v:shape></w:pict></w:r>",
            "<w:r><w:t xml:space=\"preserve\"> after</w:t></w:r></w:p>",
        );
        let text = DocxAdapter.extract(&docx_with_body(body)).unwrap();
        assert_eq!(text, "Before Boxed after");
    }

    #[test]
    fn test_nested_table_rows_flatten_into_cell() {
        let body = concat!(
            "<w:tbl><w:tr>",
            "<w:tc><w:p><w:r><w:t>Outer</w:t></w:r></w:p></w:tc>",
            "<w:tc><w:tbl><w:tr><w:tc><w:p><w:r><w:t>x</w:t></w:r></w:p></w:tc>",
            "<w:tc><w:p><w:r><w:t>y</w:t></w:r></w:p></w:tc></w:tr></w:tbl></w:tc>",
            "</w:tr></w:tbl>",
        );
        let text = DocxAdapter.extract(&docx_with_body(body)).unwrap();
        assert_eq!(text, "Outer | x | y");
    }

    #[test]
    fn test_not_a_zip_is_corrupt() {
        let err = DocxAdapter.extract(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, ExtractionError::Corrupt(_)));
    }

    #[test]
    fn test_missing_document_part_is_malformed() {
        let bytes = zip_package(&[("word/styles.xml", "<w:styles/>")]);
        let err = DocxAdapter.extract(&bytes).unwrap_err();
        assert!(matches!(err, ExtractionError::Malformed(_)));
    }

    #[test]
    fn test_broken_xml_is_malformed() {
        let bytes = zip_package(&[("word/document.xml", "<w:document><w:body></w:p>")]);
        let err = DocxAdapter.extract(&bytes).unwrap_err();
        assert!(matches!(err, ExtractionError::Malformed(_)));
    }
}
