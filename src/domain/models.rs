use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

/// Default directory names never materialized in a tree.
pub const DEFAULT_IGNORED_NAMES: &[&str] = &[
    "__pycache__",
    "node_modules",
    ".git",
    ".venv",
    "venv",
    "env",
    "build",
    "dist",
    ".pytest_cache",
    ".mypy_cache",
    "target",
    "bin",
    "obj",
    "out",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of an externally enumerated directory listing.
///
/// `sniff` holds the leading bytes of a file, used for the binary/text heuristic.
#[derive(Debug, Clone)]
pub struct ListingEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub sniff: Vec<u8>,
    pub children: Vec<ListingEntry>,
}

impl ListingEntry {
    pub fn file(name: impl Into<String>, size: u64, sniff: impl Into<Vec<u8>>) -> Self {
        ListingEntry {
            name: name.into(),
            kind: EntryKind::File,
            size,
            modified: None,
            sniff: sniff.into(),
            children: Vec::new(),
        }
    }

    pub fn directory(name: impl Into<String>, children: Vec<ListingEntry>) -> Self {
        ListingEntry {
            name: name.into(),
            kind: EntryKind::Directory,
            size: 0,
            modified: None,
            sniff: Vec::new(),
            children,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentFormat {
    Docx,
    Xlsx,
    Pdf,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "docx" => Some(DocumentFormat::Docx),
            "xlsx" => Some(DocumentFormat::Xlsx),
            "pdf" => Some(DocumentFormat::Pdf),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DocumentFormat::Docx => "docx",
            DocumentFormat::Xlsx => "xlsx",
            DocumentFormat::Pdf => "pdf",
        };
        f.write_str(label)
    }
}

/// Processability of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Text,
    Document(DocumentFormat),
    Skipped,
}

impl Classification {
    pub fn is_processable(&self) -> bool {
        !matches!(self, Classification::Skipped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File(Classification),
    Directory,
}

/// Index of a node inside the tree that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone)]
pub struct Node {
    pub path: PathBuf,
    pub rel_path: PathBuf,
    pub name: String,
    pub kind: NodeKind,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    pub expanded: bool,
    pub visible: bool,
    // Only meaningful for files; directory selection is always derived.
    pub(crate) selected: bool,
}

impl Node {
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }

    pub fn is_processable_file(&self) -> bool {
        matches!(self.kind, NodeKind::File(c) if c.is_processable())
    }

    pub fn classification(&self) -> Option<Classification> {
        match self.kind {
            NodeKind::File(c) => Some(c),
            NodeKind::Directory => None,
        }
    }

    /// Root-relative path with `/` separators, as written in exports.
    pub fn display_path(&self) -> String {
        self.rel_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriState {
    None,
    All,
    Partial,
}

/// Running totals shown while the user is selecting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionStats {
    pub selected_files: usize,
    pub selected_bytes: u64,
    pub processable_files: usize,
    pub skipped_files: usize,
}

/// Order of siblings during display and export traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Name,
    DirectoriesFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Io,
    Unsupported,
    Corrupt,
    PasswordProtected,
    Malformed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Io => "IOError",
            FailureKind::Unsupported => "Unsupported",
            FailureKind::Corrupt => "Corrupt",
            FailureKind::PasswordProtected => "PasswordProtected",
            FailureKind::Malformed => "Malformed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionStatus {
    Ok,
    Failed { kind: FailureKind, reason: String },
    SkippedUnsupported { reason: String },
}

impl ExtractionStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ExtractionStatus::Ok)
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub node: NodeId,
    pub display_path: String,
    pub classification: Classification,
    pub source_size: u64,
    pub text: String,
    pub status: ExtractionStatus,
}

impl ExtractionResult {
    pub fn text_len(&self) -> usize {
        self.text.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationCounts {
    pub text: usize,
    pub docx: usize,
    pub xlsx: usize,
    pub pdf: usize,
    pub skipped: usize,
}

impl ClassificationCounts {
    pub fn record(&mut self, classification: Classification) {
        match classification {
            Classification::Text => self.text += 1,
            Classification::Document(DocumentFormat::Docx) => self.docx += 1,
            Classification::Document(DocumentFormat::Xlsx) => self.xlsx += 1,
            Classification::Document(DocumentFormat::Pdf) => self.pdf += 1,
            Classification::Skipped => self.skipped += 1,
        }
    }

    pub fn documents(&self) -> usize {
        self.docx + self.xlsx + self.pdf
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub file_count: usize,
    pub selected_bytes: u64,
    pub extracted_bytes: usize,
    pub failed: usize,
    pub by_classification: ClassificationCounts,
}

#[derive(Debug, Clone)]
pub struct ContextDocument {
    pub root_name: String,
    pub results: Vec<ExtractionResult>,
    pub stats: ExportStats,
    pub generated_at: DateTime<Utc>,
}

impl ContextDocument {
    pub fn failures(&self) -> impl Iterator<Item = &ExtractionResult> {
        self.results.iter().filter(|r| !r.status.is_ok())
    }
}

/// Ignore configuration applied while building a tree.
#[derive(Debug, Clone)]
pub struct IgnoreConfig {
    pub names: BTreeSet<String>,
    pub include_hidden: bool,
    pub patterns: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        IgnoreConfig {
            names: DEFAULT_IGNORED_NAMES.iter().map(|s| s.to_string()).collect(),
            include_hidden: false,
            patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Interactive,
    Automatic,
}

#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub root_path: PathBuf,
    pub mode: RunMode,
    pub ignore: IgnoreConfig,
    pub sort: SortOrder,
    pub output_path: Option<PathBuf>,
    pub clipboard: bool,
}
