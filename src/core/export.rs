use crate::core::extract::ExtractorRegistry;
use crate::core::tree::Tree;
use crate::domain::errors::{ExportError, ExtractionError};
use crate::domain::models::{
    Classification, ClassificationCounts, ContextDocument, ExportStats, ExtractionResult,
    ExtractionStatus, FailureKind, NodeId,
};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whole-file reads for the export.
pub trait FileReader {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

impl<F> FileReader for F
where
    F: Fn(&Path) -> io::Result<Vec<u8>>,
{
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self(path)
    }
}

/// Turns the selected files of a tree into a [`ContextDocument`].
pub struct ExportPipeline<'a> {
    registry: &'a ExtractorRegistry,
    reader: &'a dyn FileReader,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> ExportPipeline<'a> {
    pub fn new(registry: &'a ExtractorRegistry, reader: &'a dyn FileReader) -> Self {
        Self {
            registry,
            reader,
            cancel: None,
        }
    }

    /// Checked before each file; once set the export stops with
    /// [`ExportError::Cancelled`].
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn export(&self, tree: &Tree) -> Result<ContextDocument, ExportError> {
        self.export_at(tree, Utc::now())
    }

    /// Same as [`export`](Self::export) with a fixed generation time, so two
    /// runs over an unchanged tree produce identical documents.
    pub fn export_at(
        &self,
        tree: &Tree,
        generated_at: DateTime<Utc>,
    ) -> Result<ContextDocument, ExportError> {
        let selected = tree.selected_files();
        if selected.is_empty() {
            info!("Nothing selected under {}", tree.root_path().display());
            return Err(ExportError::EmptySelection);
        }

        let total = selected.len();
        info!("Exporting {} files from {}", total, tree.root_path().display());

        let mut results = Vec::with_capacity(total);
        for (completed, id) in selected.into_iter().enumerate() {
            if self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                warn!("Export cancelled after {} of {} files", completed, total);
                return Err(ExportError::Cancelled { completed, total });
            }
            results.push(self.extract_file(tree, id));
        }

        let stats = compute_stats(tree, &results);
        info!(
            "Export finished: {} files, {} extracted bytes, {} failed",
            stats.file_count, stats.extracted_bytes, stats.failed
        );

        Ok(ContextDocument {
            root_name: tree.root_name().to_string(),
            results,
            stats,
            generated_at,
        })
    }

    /// Reads and extracts one file. Failures are recorded in the result.
    pub fn extract_file(&self, tree: &Tree, id: NodeId) -> ExtractionResult {
        let node = tree.node(id);
        let classification = node.classification().unwrap_or(Classification::Skipped);
        debug!("Processing {} as {:?}", node.path.display(), classification);

        let (text, status) = match self.reader.read(&node.path) {
            Err(e) => {
                warn!("Error reading file {}: {}", node.path.display(), e);
                (
                    String::new(),
                    ExtractionStatus::Failed {
                        kind: FailureKind::Io,
                        reason: e.to_string(),
                    },
                )
            }
            Ok(bytes) => match self.registry.extract(classification, &bytes) {
                Ok(text) => (text, ExtractionStatus::Ok),
                Err(ExtractionError::Unsupported(reason)) => {
                    warn!("Unsupported file {}: {}", node.path.display(), reason);
                    (String::new(), ExtractionStatus::SkippedUnsupported { reason })
                }
                Err(e) => {
                    warn!("Error extracting {}: {}", node.path.display(), e);
                    (
                        String::new(),
                        ExtractionStatus::Failed {
                            kind: e.kind(),
                            reason: e.to_string(),
                        },
                    )
                }
            },
        };

        ExtractionResult {
            node: id,
            display_path: node.display_path(),
            classification,
            source_size: node.size,
            text,
            status,
        }
    }
}

fn compute_stats(tree: &Tree, results: &[ExtractionResult]) -> ExportStats {
    let mut by_classification = ClassificationCounts::default();
    for result in results {
        by_classification.record(result.classification);
    }
    by_classification.skipped = tree.selection_stats().skipped_files;

    ExportStats {
        file_count: results.len(),
        selected_bytes: results.iter().map(|r| r.source_size).sum(),
        extracted_bytes: results.iter().map(ExtractionResult::text_len).sum(),
        failed: results.iter().filter(|r| !r.status.is_ok()).count(),
        by_classification,
    }
}
