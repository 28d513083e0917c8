use crate::core::export::FileReader;
use crate::core::extract::SNIFF_LEN;
use crate::core::ignore::IgnoreRules;
use crate::domain::models::ListingEntry;
use anyhow::{Context, bail};
use log::{debug, info, warn};
use std::fs;
use std::io::{self, BufRead, Read};
use std::path::Path;
use walkdir::WalkDir;

pub const IGNORE_FILE_NAME: &str = ".contextignore";

/// Reads `.contextignore` from the root directory. A missing file yields no
/// patterns.
pub fn load_ignore_patterns(root: &Path) -> anyhow::Result<Vec<String>> {
    let ignore_path = root.join(IGNORE_FILE_NAME);
    let mut patterns = Vec::new();

    if !ignore_path.is_file() {
        debug!("No {} file found at: {}", IGNORE_FILE_NAME, ignore_path.display());
        return Ok(patterns);
    }

    debug!("Parsing {} file at: {}", IGNORE_FILE_NAME, ignore_path.display());
    let file = fs::File::open(&ignore_path)
        .with_context(|| format!("Failed to open {}", ignore_path.display()))?;
    for line in io::BufReader::new(file).lines() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            patterns.push(trimmed.to_string());
        }
    }

    info!("Loaded {} patterns from {}", patterns.len(), IGNORE_FILE_NAME);
    Ok(patterns)
}

fn read_sniff(path: &Path) -> Vec<u8> {
    let mut sniff = Vec::with_capacity(SNIFF_LEN);
    let read = fs::File::open(path)
        .and_then(|file| file.take(SNIFF_LEN as u64).read_to_end(&mut sniff));
    if let Err(e) = read {
        warn!("Could not read {}: {}", path.display(), e);
        sniff.clear();
    }
    sniff
}

/// Materializes the nested listing of `root`. Ignored entries are pruned
/// during the walk so ignored directories are never descended into. Symlinks
/// are not followed.
pub fn list_directory(root: &Path, ignore: &IgnoreRules) -> anyhow::Result<ListingEntry> {
    if !root.is_dir() {
        bail!("Not a directory: {}", root.display());
    }
    info!("Listing files in: {}", root.display());

    // Open directories along the current walk path, innermost last.
    let mut open: Vec<(usize, ListingEntry)> = Vec::new();
    let mut scanned = 0usize;

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let rel_path = e.path().strip_prefix(root).unwrap_or(e.path());
            !ignore.is_ignored(rel_path, e.file_type().is_dir())
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_symlink() {
            debug!("Skipping symlink: {}", entry.path().display());
            continue;
        }

        let depth = entry.depth();
        close_until(&mut open, depth);

        let name = entry.file_name().to_string_lossy().into_owned();
        let metadata = entry.metadata().ok();
        let modified = metadata.as_ref().and_then(|m| m.modified().ok());

        if entry.file_type().is_dir() {
            let mut dir = ListingEntry::directory(name, Vec::new());
            dir.modified = modified;
            open.push((depth, dir));
        } else if entry.file_type().is_file() {
            scanned += 1;
            let size = metadata.as_ref().map(|m| m.len()).unwrap_or(0);
            let mut file = ListingEntry::file(name, size, read_sniff(entry.path()));
            file.modified = modified;
            if let Some((_, parent)) = open.last_mut() {
                parent.children.push(file);
            }
        }
    }

    close_until(&mut open, 1);
    info!("Found {} files", scanned);
    match open.pop() {
        Some((_, listing)) => Ok(listing),
        None => bail!("Failed to list directory: {}", root.display()),
    }
}

/// Folds every open directory at `depth` or deeper into its parent.
fn close_until(open: &mut Vec<(usize, ListingEntry)>, depth: usize) {
    while open.len() > 1 && open.last().is_some_and(|(d, _)| *d >= depth) {
        if let Some((_, done)) = open.pop() {
            if let Some((_, parent)) = open.last_mut() {
                parent.children.push(done);
            }
        }
    }
}

/// Reads files straight from disk.
pub struct DiskReader;

impl FileReader for DiskReader {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        debug!("Reading file contents: {}", path.display());
        let bytes = fs::read(path)?;
        debug!("Read {} bytes from file", bytes.len());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tree::Tree;
    use crate::domain::models::{Classification, EntryKind, IgnoreConfig, SortOrder};
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn sample_dir() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), "hello\n").unwrap();
        fs::write(root.join("b.bin"), [0u8, 1, 2, 3]).unwrap();
        fs::write(root.join(".secret"), "token").unwrap();
        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        fs::write(root.join("sub/notes.md"), "# notes\n").unwrap();
        fs::write(root.join("sub/deeper/x.log"), "log line\n").unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "x").unwrap();
        temp_dir
    }

    fn names(entry: &ListingEntry) -> Vec<&str> {
        entry.children.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_list_directory_nests_and_prunes() {
        let temp_dir = sample_dir();
        let listing = list_directory(temp_dir.path(), &IgnoreRules::default()).unwrap();

        assert_eq!(listing.kind, EntryKind::Directory);
        assert_eq!(names(&listing), vec!["a.txt", "b.bin", "sub"]);

        let a = &listing.children[0];
        assert_eq!(a.size, 6);
        assert_eq!(a.sniff, b"hello\n");
        assert!(a.modified.is_some());

        let sub = &listing.children[2];
        assert_eq!(sub.kind, EntryKind::Directory);
        assert_eq!(names(sub), vec!["deeper", "notes.md"]);
        assert_eq!(names(&sub.children[0]), vec!["x.log"]);
    }

    #[test]
    fn test_list_directory_applies_patterns() {
        let temp_dir = sample_dir();
        let rules = IgnoreRules::new(&IgnoreConfig {
            patterns: vec!["*.log".to_string(), "b.bin".to_string()],
            ..IgnoreConfig::default()
        });
        let listing = list_directory(temp_dir.path(), &rules).unwrap();

        assert_eq!(names(&listing), vec!["a.txt", "sub"]);
        let deeper = &listing.children[1].children[0];
        assert!(deeper.children.is_empty());
    }

    #[test]
    fn test_listing_builds_classified_tree() {
        let temp_dir = sample_dir();
        let rules = IgnoreRules::default();
        let listing = list_directory(temp_dir.path(), &rules).unwrap();
        let tree = Tree::build(temp_dir.path(), listing, rules, SortOrder::Name);

        let a = tree.find("a.txt").unwrap();
        let b = tree.find("b.bin").unwrap();
        assert_eq!(tree.node(a).classification(), Some(Classification::Text));
        assert_eq!(tree.node(b).classification(), Some(Classification::Skipped));
        assert_eq!(tree.node(a).path, temp_dir.path().join("a.txt"));
    }

    #[test]
    fn test_list_directory_rejects_files() {
        let temp_dir = sample_dir();
        let result = list_directory(&temp_dir.path().join("a.txt"), &IgnoreRules::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_ignore_patterns() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut file = File::create(temp_dir.path().join(IGNORE_FILE_NAME)).unwrap();
            writeln!(file, "# Comment line").unwrap();
            writeln!(file, "*.log").unwrap();
            writeln!(file).unwrap();
            writeln!(file, "  drafts/  ").unwrap();
        }

        let patterns = load_ignore_patterns(temp_dir.path()).unwrap();
        assert_eq!(patterns, vec!["*.log", "drafts/"]);
    }

    #[test]
    fn test_load_ignore_patterns_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_ignore_patterns(temp_dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_disk_reader() {
        let temp_dir = sample_dir();
        let bytes = DiskReader.read(&temp_dir.path().join("a.txt")).unwrap();
        assert_eq!(bytes, b"hello\n");

        let err = DiskReader
            .read(&temp_dir.path().join("vanished.txt"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
