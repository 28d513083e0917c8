//! Command reducer over a [`Tree`].
//!
//! A driver turns input events into [`Command`]s and applies them one at a
//! time; after each application it reads a [`Snapshot`] to render. Commands
//! never fail; an id that does not belong to the session's tree is a caller
//! bug.

use crate::core::tree::Tree;
use crate::domain::models::{Classification, NodeId, SelectionStats, TriState};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    First,
    Last,
    Parent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    MoveFocus(Direction),
    ToggleExpand(NodeId),
    ToggleSelect(NodeId),
    SetFilter(String),
    SelectAllVisible,
    ClearAllSelection,
    ToggleShowFiles,
}

/// One renderable line of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: NodeId,
    pub depth: usize,
    pub name: String,
    pub is_dir: bool,
    pub expanded: bool,
    pub classification: Option<Classification>,
    pub state: TriState,
    pub focused: bool,
}

/// Read-only view handed to a renderer between commands.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub rows: Vec<Row>,
    pub focus: Option<NodeId>,
    pub filter: String,
    pub show_files: bool,
    pub stats: SelectionStats,
}

#[derive(Debug, Clone)]
pub struct Session {
    tree: Tree,
    focus: Option<NodeId>,
    show_files: bool,
}

impl Session {
    pub fn new(tree: Tree) -> Self {
        let mut session = Session {
            tree,
            focus: None,
            show_files: true,
        };
        session.reanchor_focus();
        session
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn focus(&self) -> Option<NodeId> {
        self.focus
    }

    pub fn show_files(&self) -> bool {
        self.show_files
    }

    /// Applies one command and returns the focused node afterwards.
    pub fn apply(&mut self, command: Command) -> Option<NodeId> {
        debug!("Applying {:?}", command);
        match command {
            Command::MoveFocus(direction) => self.move_focus(direction),
            Command::ToggleExpand(id) => self.toggle_expand(id),
            Command::ToggleSelect(id) => self.toggle_select(id),
            Command::SetFilter(query) => self.tree.set_filter(&query),
            Command::SelectAllVisible => {
                let visible: Vec<NodeId> = self
                    .tree
                    .preorder()
                    .into_iter()
                    .filter(|&id| self.tree.node(id).visible)
                    .collect();
                for id in visible {
                    self.tree.set_file_selected(id, true);
                }
            }
            Command::ClearAllSelection => {
                let root = self.tree.root();
                self.tree.set_subtree_selected(root, false);
            }
            Command::ToggleShowFiles => self.show_files = !self.show_files,
        }
        self.reanchor_focus();
        self.focus
    }

    fn navigable(&self) -> Vec<NodeId> {
        self.tree
            .visible_rows(self.show_files)
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    fn move_focus(&mut self, direction: Direction) {
        let rows = self.navigable();
        if rows.is_empty() {
            self.focus = None;
            return;
        }
        let last = rows.len() - 1;
        let current = self
            .focus
            .and_then(|f| rows.iter().position(|&id| id == f));

        let next = match (direction, current) {
            (_, None) | (Direction::First, _) => 0,
            (Direction::Last, _) => last,
            (Direction::Down, Some(i)) => {
                if i >= last {
                    0
                } else {
                    i + 1
                }
            }
            (Direction::Up, Some(i)) => {
                if i == 0 {
                    last
                } else {
                    i - 1
                }
            }
            (Direction::Parent, Some(i)) => self
                .tree
                .node(rows[i])
                .parent
                .and_then(|p| rows.iter().position(|&id| id == p))
                .unwrap_or(i),
        };
        self.focus = Some(rows[next]);
    }

    fn toggle_expand(&mut self, id: NodeId) {
        let node = self.tree.node(id);
        if !node.is_dir() {
            return;
        }
        let expanded = !node.expanded;
        self.tree.set_expanded(id, expanded);

        if !expanded {
            if let Some(focus) = self.focus {
                if self.tree.ancestors(focus).any(|a| a == id) {
                    self.focus = Some(id);
                }
            }
        }
    }

    fn toggle_select(&mut self, id: NodeId) {
        if self.tree.node(id).is_dir() {
            let select = self.tree.tri_state(id) != TriState::All;
            let changed = self.tree.set_subtree_selected(id, select);
            debug!(
                "{} {} files under {}",
                if select { "Selected" } else { "Deselected" },
                changed,
                self.tree.node(id).display_path()
            );
        } else {
            let selected = self.tree.is_file_selected(id);
            self.tree.set_file_selected(id, !selected);
        }
    }

    /// Keeps focus on a navigable row: the current one, else its nearest
    /// navigable ancestor, else the first row.
    fn reanchor_focus(&mut self) {
        let rows = self.navigable();
        let Some(focus) = self.focus else {
            self.focus = rows.first().copied();
            return;
        };
        if rows.contains(&focus) {
            return;
        }
        self.focus = self
            .tree
            .ancestors(focus)
            .find(|a| rows.contains(a))
            .or_else(|| rows.first().copied());
    }

    pub fn snapshot(&self) -> Snapshot {
        let states = self.tree.tri_states();
        let rows = self
            .tree
            .visible_rows(self.show_files)
            .into_iter()
            .map(|(id, depth)| {
                let node = self.tree.node(id);
                Row {
                    id,
                    depth,
                    name: node.name.clone(),
                    is_dir: node.is_dir(),
                    expanded: node.expanded,
                    classification: node.classification(),
                    state: states[id.0],
                    focused: self.focus == Some(id),
                }
            })
            .collect();

        Snapshot {
            rows,
            focus: self.focus,
            filter: self.tree.query().to_string(),
            show_files: self.show_files,
            stats: self.tree.selection_stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tree::fixtures::{id, project_tree};

    fn focused_path(session: &Session) -> Option<String> {
        session
            .focus()
            .map(|f| session.tree().node(f).display_path())
    }

    #[test]
    fn test_toggle_directory_selects_processable_descendants_only() {
        let mut session = Session::new(project_tree());
        let root = session.tree().root();
        session.apply(Command::ToggleSelect(root));
        let tree = session.tree();

        assert_eq!(tree.tri_state(root), TriState::All);
        assert!(tree.is_file_selected(id(tree, "a.txt")));
        assert!(tree.is_file_selected(id(tree, "sub/c.docx")));
        assert!(!tree.is_file_selected(id(tree, "b.bin")));

        session.apply(Command::ToggleSelect(root));
        assert_eq!(session.tree().tri_state(root), TriState::None);
        assert!(session.tree().selected_files().is_empty());
    }

    #[test]
    fn test_partial_directory_toggles_to_all() {
        let mut session = Session::new(project_tree());
        let root = session.tree().root();
        let a = id(session.tree(), "a.txt");
        session.apply(Command::ToggleSelect(a));
        assert_eq!(session.tree().tri_state(root), TriState::Partial);

        session.apply(Command::ToggleSelect(root));
        assert_eq!(session.tree().tri_state(root), TriState::All);
    }

    #[test]
    fn test_toggle_skipped_file_is_noop() {
        let mut session = Session::new(project_tree());
        let bin = id(session.tree(), "b.bin");
        session.apply(Command::ToggleSelect(bin));
        assert!(!session.tree().is_file_selected(bin));
        assert_eq!(session.snapshot().stats.selected_files, 0);
    }

    #[test]
    fn test_move_focus_walks_visible_rows_and_wraps() {
        let mut session = Session::new(project_tree());
        assert_eq!(focused_path(&session).as_deref(), Some(""));

        session.apply(Command::MoveFocus(Direction::Down));
        assert_eq!(focused_path(&session).as_deref(), Some("a.txt"));
        session.apply(Command::MoveFocus(Direction::Last));
        assert_eq!(focused_path(&session).as_deref(), Some("sub"));
        session.apply(Command::MoveFocus(Direction::Down));
        assert_eq!(focused_path(&session).as_deref(), Some(""));
        session.apply(Command::MoveFocus(Direction::Up));
        assert_eq!(focused_path(&session).as_deref(), Some("sub"));
    }

    #[test]
    fn test_move_focus_never_mutates_selection_or_expansion() {
        let mut session = Session::new(project_tree());
        let before: Vec<_> = session
            .tree()
            .preorder()
            .into_iter()
            .map(|i| (session.tree().node(i).expanded, session.tree().tri_state(i)))
            .collect();
        for direction in [Direction::Down, Direction::Down, Direction::Parent, Direction::Last] {
            session.apply(Command::MoveFocus(direction));
        }
        let after: Vec<_> = session
            .tree()
            .preorder()
            .into_iter()
            .map(|i| (session.tree().node(i).expanded, session.tree().tri_state(i)))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_collapsed_children_are_not_navigable() {
        let mut session = Session::new(project_tree());
        let sub = id(session.tree(), "sub");
        let paths = |s: &Session| -> Vec<String> {
            s.snapshot()
                .rows
                .iter()
                .map(|r| s.tree().node(r.id).display_path())
                .collect()
        };
        assert!(!paths(&session).contains(&"sub/c.docx".to_string()));

        session.apply(Command::ToggleExpand(sub));
        assert!(paths(&session).contains(&"sub/c.docx".to_string()));

        session.apply(Command::MoveFocus(Direction::Last));
        assert_eq!(focused_path(&session).as_deref(), Some("sub/c.docx"));
        session.apply(Command::MoveFocus(Direction::Parent));
        assert_eq!(focused_path(&session).as_deref(), Some("sub"));

        session.apply(Command::MoveFocus(Direction::Last));
        session.apply(Command::ToggleExpand(sub));
        assert_eq!(focused_path(&session).as_deref(), Some("sub"));
    }

    #[test]
    fn test_filter_reanchors_focus_and_clearing_restores_rows() {
        let mut session = Session::new(project_tree());
        session.apply(Command::MoveFocus(Direction::Down));
        assert_eq!(focused_path(&session).as_deref(), Some("a.txt"));

        session.apply(Command::SetFilter("docx".to_string()));
        assert_eq!(focused_path(&session).as_deref(), Some(""));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.filter, "docx");
        assert_eq!(snapshot.rows.len(), 2);

        session.apply(Command::SetFilter(String::new()));
        assert_eq!(session.snapshot().rows.len(), 4);
    }

    #[test]
    fn test_select_all_visible_respects_filter() {
        let mut session = Session::new(project_tree());
        session.apply(Command::SetFilter("a.t".to_string()));
        session.apply(Command::SelectAllVisible);
        session.apply(Command::SetFilter(String::new()));

        let tree = session.tree();
        assert!(tree.is_file_selected(id(tree, "a.txt")));
        assert!(!tree.is_file_selected(id(tree, "sub/c.docx")));

        session.apply(Command::ClearAllSelection);
        assert!(session.tree().selected_files().is_empty());
    }

    #[test]
    fn test_hiding_files_moves_focus_to_directory() {
        let mut session = Session::new(project_tree());
        session.apply(Command::MoveFocus(Direction::Down));
        session.apply(Command::ToggleShowFiles);
        assert_eq!(focused_path(&session).as_deref(), Some(""));
        let snapshot = session.snapshot();
        assert!(!snapshot.show_files);
        assert!(snapshot.rows.iter().all(|r| r.is_dir));
    }

    #[test]
    fn test_snapshot_reports_tri_states_and_stats() {
        let mut session = Session::new(project_tree());
        let sub = id(session.tree(), "sub");
        session.apply(Command::ToggleSelect(sub));
        let snapshot = session.snapshot();

        let root_row = &snapshot.rows[0];
        assert_eq!(root_row.state, TriState::Partial);
        assert!(root_row.focused);
        let sub_row = snapshot.rows.iter().find(|r| r.id == sub).unwrap();
        assert_eq!(sub_row.state, TriState::All);
        assert_eq!(snapshot.stats.selected_files, 1);
        assert_eq!(snapshot.stats.selected_bytes, 120);
    }
}
