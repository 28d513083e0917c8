use crate::core::export::ExportPipeline;
use crate::core::tree::Tree;
use crate::domain::models::{ExtractionResult, NodeId};
use log::debug;
use std::collections::HashMap;
use std::time::SystemTime;

/// Size of one selected file as it will appear in the export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    pub lines: usize,
    pub chars: usize,
    pub size: u64,
    pub failed: bool,
}

impl FileStats {
    fn of(result: &ExtractionResult) -> Self {
        FileStats {
            lines: result.text.lines().count(),
            chars: result.text.chars().count(),
            size: result.source_size,
            failed: !result.status.is_ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRow {
    pub display_path: String,
    pub stats: FileStats,
    pub modified: Option<SystemTime>,
}

/// The selected files in export order, with totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preview {
    pub rows: Vec<PreviewRow>,
    pub total_lines: usize,
    pub total_chars: usize,
    pub total_size: u64,
}

impl Preview {
    pub fn file_count(&self) -> usize {
        self.rows.len()
    }
}

/// Per-file statistics, extracted once per node and reused while the
/// selection changes.
#[derive(Debug, Default)]
pub struct PreviewCache {
    stats: HashMap<NodeId, FileStats>,
}

impl PreviewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preview(&mut self, tree: &Tree, pipeline: &ExportPipeline<'_>) -> Preview {
        let mut preview = Preview::default();
        for id in tree.selected_files() {
            let stats = match self.stats.get(&id) {
                Some(stats) => *stats,
                None => {
                    let result = pipeline.extract_file(tree, id);
                    let stats = FileStats::of(&result);
                    debug!(
                        "Preview stats for {}: {} lines, {} chars",
                        result.display_path, stats.lines, stats.chars
                    );
                    self.stats.insert(result.node, stats);
                    stats
                }
            };

            let node = tree.node(id);
            preview.total_lines += stats.lines;
            preview.total_chars += stats.chars;
            preview.total_size += stats.size;
            preview.rows.push(PreviewRow {
                display_path: node.display_path(),
                stats,
                modified: node.modified,
            });
        }
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extract::ExtractorRegistry;
    use crate::core::selection::{Command, Session};
    use crate::core::ignore::IgnoreRules;
    use crate::core::tree::fixtures::{id, project_tree};
    use crate::domain::models::{ListingEntry, SortOrder};
    use std::cell::Cell;
    use std::io;
    use std::path::Path;
    use std::time::Duration;

    fn read_project(path: &Path) -> io::Result<Vec<u8>> {
        match path.file_name().and_then(|n| n.to_str()) {
            Some("a.txt") => Ok(b"alpha\nbeta\n".to_vec()),
            Some("c.docx") => Err(io::Error::new(io::ErrorKind::NotFound, "gone")),
            _ => Ok(Vec::new()),
        }
    }

    #[test]
    fn test_preview_lists_selected_files_with_totals() {
        let mut session = Session::new(project_tree());
        let root = session.tree().root();
        session.apply(Command::ToggleSelect(root));

        let registry = ExtractorRegistry::with_defaults();
        let pipeline = ExportPipeline::new(&registry, &read_project);
        let preview = PreviewCache::new().preview(session.tree(), &pipeline);

        let paths: Vec<&str> = preview.rows.iter().map(|r| r.display_path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "sub/c.docx"]);
        assert_eq!(preview.file_count(), 2);

        let a = &preview.rows[0].stats;
        assert_eq!((a.lines, a.chars, a.failed), (2, 11, false));
        let c = &preview.rows[1].stats;
        assert_eq!((c.lines, c.chars, c.failed), (0, 0, true));

        assert_eq!(preview.total_lines, 2);
        assert_eq!(preview.total_chars, 11);
        assert_eq!(preview.total_size, 126);
    }

    #[test]
    fn test_preview_reads_each_file_once() {
        let reads = Cell::new(0);
        let reader = |path: &Path| {
            reads.set(reads.get() + 1);
            read_project(path)
        };
        let registry = ExtractorRegistry::with_defaults();
        let pipeline = ExportPipeline::new(&registry, &reader);

        let mut session = Session::new(project_tree());
        let a = id(session.tree(), "a.txt");
        let mut cache = PreviewCache::new();

        session.apply(Command::ToggleSelect(a));
        assert_eq!(cache.preview(session.tree(), &pipeline).file_count(), 1);

        session.apply(Command::ToggleSelect(a));
        assert_eq!(cache.preview(session.tree(), &pipeline), Preview::default());

        session.apply(Command::ToggleSelect(a));
        cache.preview(session.tree(), &pipeline);
        assert_eq!(reads.get(), 1);
    }

    #[test]
    fn test_preview_row_carries_modification_time() {
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let mut file = ListingEntry::file("a.txt", 6, b"hello\n".to_vec());
        file.modified = Some(stamp);
        let mut tree = Tree::build(
            "/work/project",
            ListingEntry::directory("project", vec![file]),
            IgnoreRules::default(),
            SortOrder::Name,
        );
        let root = tree.root();
        tree.set_subtree_selected(root, true);

        let registry = ExtractorRegistry::with_defaults();
        let pipeline = ExportPipeline::new(&registry, &read_project);
        let preview = PreviewCache::new().preview(&tree, &pipeline);
        assert_eq!(preview.rows[0].modified, Some(stamp));
    }
}
