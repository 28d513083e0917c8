use crate::core::extract::classify;
use crate::core::ignore::IgnoreRules;
use crate::domain::models::{
    EntryKind, ListingEntry, Node, NodeId, NodeKind, SelectionStats, SortOrder, TriState,
};
use log::{debug, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The filtered, navigable model of one directory.
///
/// Nodes live in an arena owned by the tree; children are listed by id and
/// each node points back to its parent by id. Directory selection is never
/// stored, it is derived from the processable files below it.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root_path: PathBuf,
    query: String,
    ignore: IgnoreRules,
    order: SortOrder,
}

const ROOT: NodeId = NodeId(0);

impl Tree {
    /// Builds a tree from a nested listing. Ignored entries are dropped here
    /// and never become nodes.
    pub fn build(
        root_path: impl Into<PathBuf>,
        listing: ListingEntry,
        ignore: IgnoreRules,
        order: SortOrder,
    ) -> Self {
        let root_path = root_path.into();
        let mut tree = Tree {
            nodes: Vec::new(),
            root_path: root_path.clone(),
            query: String::new(),
            ignore,
            order,
        };

        tree.nodes.push(Node {
            path: root_path,
            rel_path: PathBuf::new(),
            name: listing.name.clone(),
            kind: NodeKind::Directory,
            size: 0,
            modified: listing.modified,
            children: Vec::new(),
            parent: None,
            expanded: true,
            visible: true,
            selected: false,
        });
        tree.insert_children(ROOT, listing.children);

        debug!(
            "Built tree for {} with {} nodes",
            tree.root_path.display(),
            tree.nodes.len()
        );
        tree
    }

    fn insert_children(&mut self, parent: NodeId, entries: Vec<ListingEntry>) {
        let mut seen = HashSet::new();
        let mut children = Vec::with_capacity(entries.len());

        for entry in entries {
            let is_dir = entry.kind == EntryKind::Directory;
            let rel_path = self.nodes[parent.0].rel_path.join(&entry.name);
            if self.ignore.is_ignored(&rel_path, is_dir) {
                continue;
            }
            if !seen.insert(entry.name.clone()) {
                warn!("Duplicate entry {} in listing, keeping the first", rel_path.display());
                continue;
            }

            let kind = if is_dir {
                NodeKind::Directory
            } else {
                NodeKind::File(classify(&entry.name, &entry.sniff))
            };
            let id = NodeId(self.nodes.len());
            self.nodes.push(Node {
                path: self.root_path.join(&rel_path),
                rel_path,
                name: entry.name,
                kind,
                size: entry.size,
                modified: entry.modified,
                children: Vec::new(),
                parent: Some(parent),
                expanded: false,
                visible: true,
                selected: false,
            });
            children.push(id);

            if is_dir {
                self.insert_children(id, entry.children);
            }
        }

        self.sort_ids(&mut children);
        self.nodes[parent.0].children = children;
    }

    fn sort_ids(&self, ids: &mut [NodeId]) {
        let order = self.order;
        ids.sort_by(|a, b| {
            let (a, b) = (&self.nodes[a.0], &self.nodes[b.0]);
            let group = match order {
                SortOrder::DirectoriesFirst => b.is_dir().cmp(&a.is_dir()),
                SortOrder::Name => std::cmp::Ordering::Equal,
            };
            group
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
                .then_with(|| a.name.cmp(&b.name))
        });
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn root_name(&self) -> &str {
        &self.nodes[ROOT.0].name
    }

    pub fn node(&self, id: NodeId) -> &Node {
        debug_assert!(id.0 < self.nodes.len(), "node {:?} is not part of this tree", id);
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Looks a node up by its root-relative path.
    pub fn find(&self, rel_path: impl AsRef<Path>) -> Option<NodeId> {
        let rel_path = rel_path.as_ref();
        self.nodes
            .iter()
            .position(|n| n.rel_path == rel_path)
            .map(NodeId)
    }

    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.node(id).parent, move |p| self.node(*p).parent)
    }

    /// All node ids in depth-first display order.
    pub fn preorder(&self) -> Vec<NodeId> {
        self.preorder_from(ROOT)
    }

    fn preorder_from(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        out
    }

    /// Recomputes visibility for the given query in one bottom-up pass.
    pub fn set_filter(&mut self, query: &str) {
        self.query = query.to_string();
        let needle = query.to_lowercase();

        // Children always have larger ids than their parent.
        for i in (0..self.nodes.len()).rev() {
            let matches = needle.is_empty() || self.nodes[i].name.to_lowercase().contains(&needle);
            let visible = matches
                || self.nodes[i]
                    .children
                    .iter()
                    .any(|child| self.nodes[child.0].visible);
            self.nodes[i].visible = visible;
        }
        debug!("Filter '{}' applied", query);
    }

    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) {
        let node = &mut self.nodes[id.0];
        if node.is_dir() {
            node.expanded = expanded;
        }
    }

    pub fn expand_all(&mut self) {
        for node in self.nodes.iter_mut().filter(|n| n.is_dir()) {
            node.expanded = true;
        }
    }

    pub fn is_file_selected(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.is_processable_file() && node.selected
    }

    /// Selects or deselects a file. Skipped files and directories are left alone.
    pub fn set_file_selected(&mut self, id: NodeId, selected: bool) -> bool {
        let node = &mut self.nodes[id.0];
        if !node.is_processable_file() || node.selected == selected {
            return false;
        }
        node.selected = selected;
        true
    }

    /// Processable files at or below `id`, in display order.
    pub fn processable_files_under(&self, id: NodeId) -> Vec<NodeId> {
        self.preorder_from(id)
            .into_iter()
            .filter(|&n| self.node(n).is_processable_file())
            .collect()
    }

    pub fn set_subtree_selected(&mut self, id: NodeId, selected: bool) -> usize {
        self.processable_files_under(id)
            .into_iter()
            .filter(|&file| self.set_file_selected(file, selected))
            .count()
    }

    pub fn tri_state(&self, id: NodeId) -> TriState {
        let node = self.node(id);
        if !node.is_dir() {
            return if self.is_file_selected(id) {
                TriState::All
            } else {
                TriState::None
            };
        }
        let files = self.processable_files_under(id);
        let selected = files.iter().filter(|&&f| self.node(f).selected).count();
        aggregate(selected, files.len())
    }

    /// Tri-state of every node, indexed by id, computed in one pass.
    pub fn tri_states(&self) -> Vec<TriState> {
        let mut counts = vec![(0usize, 0usize); self.nodes.len()];
        for i in (0..self.nodes.len()).rev() {
            let node = &self.nodes[i];
            if node.is_processable_file() {
                counts[i] = (usize::from(node.selected), 1);
            }
            if let Some(parent) = node.parent {
                counts[parent.0].0 += counts[i].0;
                counts[parent.0].1 += counts[i].1;
            }
        }
        counts
            .into_iter()
            .map(|(selected, total)| aggregate(selected, total))
            .collect()
    }

    /// Selected processable files in depth-first display order.
    pub fn selected_files(&self) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .filter(|&id| self.is_file_selected(id))
            .collect()
    }

    pub fn selection_stats(&self) -> SelectionStats {
        let mut stats = SelectionStats::default();
        for node in self.nodes.iter().filter(|n| !n.is_dir()) {
            if node.is_processable_file() {
                stats.processable_files += 1;
                if node.selected {
                    stats.selected_files += 1;
                    stats.selected_bytes += node.size;
                }
            } else {
                stats.skipped_files += 1;
            }
        }
        stats
    }

    /// Rows a renderer shows: visible nodes, descending only into expanded
    /// directories.
    pub fn visible_rows(&self, show_files: bool) -> Vec<(NodeId, usize)> {
        let mut rows = Vec::new();
        let mut stack = vec![(ROOT, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let node = self.node(id);
            if !node.visible || (!show_files && !node.is_dir()) {
                continue;
            }
            rows.push((id, depth));
            if node.is_dir() && node.expanded {
                stack.extend(node.children.iter().rev().map(|&c| (c, depth + 1)));
            }
        }
        rows
    }
}

fn aggregate(selected: usize, total: usize) -> TriState {
    if selected == 0 {
        TriState::None
    } else if selected == total {
        TriState::All
    } else {
        TriState::Partial
    }
}
