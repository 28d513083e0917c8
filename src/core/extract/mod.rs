//! Text extraction for plain files and office/PDF documents.
//!
//! Adapters receive the raw bytes of a file and never touch the file system.
//! Every failure is returned as an [`ExtractionError`]; nothing here panics on
//! bad input.

mod docx;
mod pdf;
mod xlsx;

pub use docx::DocxAdapter;
pub use pdf::PdfAdapter;
pub use xlsx::XlsxAdapter;

use crate::domain::errors::ExtractionError;
use crate::domain::models::{Classification, DocumentFormat};
use log::debug;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;

/// Number of leading bytes inspected by the binary/text heuristic.
pub const SNIFF_LEN: usize = 8192;
/// Share of control bytes above which a file is treated as binary.
const MAX_CONTROL_RATIO: f64 = 0.30;
/// Maximum decompressed bytes read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// OLE compound file signature; office packages are wrapped in it when encrypted.
const OLE_SIGNATURE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const BINARY_EXTENSIONS: &[&str] = &[
    "gif", "jpg", "jpeg", "png", "ico", "pyc", "exe", "dll", "so", "dylib", "zip", "tar", "gz",
    "rar", "7z", "db", "sqlite", "bin", "dat",
];

pub trait DocumentAdapter: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError>;
}

/// Maps a classification to the strategy that turns bytes into text.
pub struct ExtractorRegistry {
    adapters: HashMap<DocumentFormat, Box<dyn DocumentAdapter>>,
}

impl ExtractorRegistry {
    /// A registry with no document adapters; only plain text is extracted.
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(DocumentFormat::Docx, Box::new(DocxAdapter));
        registry.register(DocumentFormat::Xlsx, Box::new(XlsxAdapter));
        registry.register(DocumentFormat::Pdf, Box::new(PdfAdapter));
        registry
    }

    pub fn register(&mut self, format: DocumentFormat, adapter: Box<dyn DocumentAdapter>) {
        self.adapters.insert(format, adapter);
    }

    pub fn extract(
        &self,
        classification: Classification,
        bytes: &[u8],
    ) -> Result<String, ExtractionError> {
        match classification {
            Classification::Text => Ok(String::from_utf8_lossy(bytes).into_owned()),
            Classification::Document(format) => match self.adapters.get(&format) {
                Some(adapter) => {
                    debug!("Extracting {} document ({} bytes)", format, bytes.len());
                    adapter.extract(bytes)
                }
                None => Err(ExtractionError::Unsupported(format!(
                    "no extractor registered for {}",
                    format
                ))),
            },
            Classification::Skipped => Err(ExtractionError::Unsupported(
                "binary or unsupported file".to_string(),
            )),
        }
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Decides processability from the file name and its leading bytes.
///
/// Document extensions win over the content sniff, since office files and
/// PDFs are binary containers.
pub fn classify(name: &str, sniff: &[u8]) -> Classification {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    if let Some(ext) = ext.as_deref() {
        if let Some(format) = DocumentFormat::from_extension(ext) {
            return Classification::Document(format);
        }
        if BINARY_EXTENSIONS.contains(&ext) {
            return Classification::Skipped;
        }
    }

    if looks_binary(sniff) {
        Classification::Skipped
    } else {
        Classification::Text
    }
}

fn looks_binary(sniff: &[u8]) -> bool {
    let window = &sniff[..sniff.len().min(SNIFF_LEN)];
    if window.is_empty() {
        return false;
    }
    if window.contains(&0) {
        return true;
    }
    let control = window
        .iter()
        .filter(|&&b| (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c | 0x1b)) || b == 0x7f)
        .count();
    control as f64 / window.len() as f64 > MAX_CONTROL_RATIO
}

type ZipArchive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn open_package<'a>(bytes: &'a [u8], what: &str) -> Result<ZipArchive<'a>, ExtractionError> {
    if bytes.starts_with(OLE_SIGNATURE) {
        return Err(ExtractionError::PasswordProtected(format!(
            "{} is an encrypted package",
            what
        )));
    }
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractionError::Corrupt(format!("{} is not a valid package: {}", what, e)))
}

fn read_zip_entry_bounded(
    archive: &mut ZipArchive<'_>,
    name: &str,
) -> Result<Option<Vec<u8>>, ExtractionError> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(ExtractionError::Corrupt(format!("{}: {}", name, e))),
    };
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractionError::Corrupt(format!("{}: {}", name, e)))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractionError::Malformed(format!(
            "{} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(Some(out))
}

fn xml_error(part: &str, e: impl std::fmt::Display) -> ExtractionError {
    ExtractionError::Malformed(format!("{}: {}", part, e))
}

/// Value of the attribute whose local name is `local`, unescaped.
fn attr_value(e: &quick_xml::events::BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}
