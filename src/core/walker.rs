use crate::core::ignore::IgnoreRules;
use crate::core::tree::Tree;
use crate::domain::models::{ListingEntry, SortOrder};
use log::info;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Builds a fully expanded tree and selects every processable file in it.
/// Entry point of the non-interactive mode.
pub fn walk_all(
    root_path: impl Into<PathBuf>,
    listing: ListingEntry,
    ignore: IgnoreRules,
    order: SortOrder,
) -> Tree {
    let mut tree = Tree::build(root_path, listing, ignore, order);
    tree.expand_all();
    let root = tree.root();
    let selected = tree.set_subtree_selected(root, true);
    info!(
        "Selected {} processable files of {} entries under {}",
        selected,
        tree.len(),
        tree.root_path().display()
    );
    tree
}

/// Number of processable files per lowercase extension. Files without an
/// extension are counted under `no extension`.
pub fn extension_counts(tree: &Tree) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for id in tree.preorder() {
        let node = tree.node(id);
        if !node.is_processable_file() {
            continue;
        }
        let ext = node
            .rel_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_else(|| "no extension".to_string());
        *counts.entry(ext).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tree::fixtures::{id, project_listing};
    use crate::domain::models::TriState;

    #[test]
    fn test_walk_all_selects_processable_files() {
        let tree = walk_all(
            "/work/project",
            project_listing(),
            IgnoreRules::default(),
            SortOrder::Name,
        );

        let selected: Vec<String> = tree
            .selected_files()
            .into_iter()
            .map(|id| tree.node(id).display_path())
            .collect();
        assert_eq!(selected, vec!["a.txt", "sub/c.docx"]);
        assert!(!tree.is_file_selected(id(&tree, "b.bin")));
        assert_eq!(tree.tri_state(tree.root()), TriState::All);
        assert!(tree.node(id(&tree, "sub")).expanded);

        let stats = tree.selection_stats();
        assert_eq!(stats.selected_files, 2);
        assert_eq!(stats.skipped_files, 1);
    }

    #[test]
    fn test_walk_all_honors_ignored_names() {
        let listing = ListingEntry::directory(
            "project",
            vec![
                ListingEntry::file("main.py", 10, b"print(1)\n".to_vec()),
                ListingEntry::directory(
                    "node_modules",
                    vec![ListingEntry::file("dep.js", 10, b"x".to_vec())],
                ),
            ],
        );
        let tree = walk_all("/p", listing, IgnoreRules::default(), SortOrder::Name);
        assert_eq!(tree.selected_files().len(), 1);
        assert!(tree.find("node_modules").is_none());
    }

    #[test]
    fn test_extension_counts() {
        let listing = ListingEntry::directory(
            "project",
            vec![
                ListingEntry::file("a.TXT", 1, b"a".to_vec()),
                ListingEntry::file("b.txt", 1, b"b".to_vec()),
                ListingEntry::file("Makefile", 1, b"all:".to_vec()),
                ListingEntry::file("logo.png", 4, vec![0x89u8, b'P', b'N', b'G']),
                ListingEntry::file("blob", 4, vec![0u8, 1, 2, 3]),
                ListingEntry::directory(
                    "docs",
                    vec![ListingEntry::file("r.pdf", 1, b"%PDF".to_vec())],
                ),
            ],
        );
        let tree = walk_all("/p", listing, IgnoreRules::default(), SortOrder::Name);
        let counts = extension_counts(&tree);
        assert_eq!(counts.get(".txt"), Some(&2));
        assert_eq!(counts.get(".pdf"), Some(&1));
        assert_eq!(counts.get("no extension"), Some(&1));
        assert_eq!(counts.get(".png"), None);
        assert_eq!(counts.len(), 3);
    }
}
