use std::{
    collections::{HashMap, HashSet},
    hash::Hash,
};

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct FlatTreeNode<Key, Node> {
    pub key: Key,
    pub node: Node,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// A forest stored as a flat list, linked by index.
///
/// Built from items that name their parent by key. Insertion order is kept
/// for siblings and roots.
#[derive(Debug, Clone)]
pub struct FlatTree<Key, Node> {
    nodes: Vec<FlatTreeNode<Key, Node>>,
    roots: Vec<usize>,
    index: HashMap<Key, usize>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlatTreeError {
    #[error("index {0} is out of bounds")]
    IndexOutOfBounds(usize),
}

/// One line of a rendered tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub index: usize,
    pub depth: usize,
    pub is_branch: bool,
    pub is_expanded: bool,
}

impl<Key, Node> Default for FlatTree<Key, Node> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<Key, Node> FlatTree<Key, Node>
where
    Key: Eq + Hash + Clone,
{
    /// Build from `(key, parent key, node)` items.
    ///
    /// Lenient: a missing or self-referencing parent makes the item a root,
    /// and a parent cycle is broken at the first node found on it. Duplicate
    /// keys keep the last node.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = (Key, Option<Key>, Node)>,
    {
        let mut nodes: Vec<FlatTreeNode<Key, Node>> = Vec::new();
        let mut parents: Vec<Option<Key>> = Vec::new();
        let mut index: HashMap<Key, usize> = HashMap::new();

        for (key, parent, node) in items {
            if let Some(existing) = index.get(&key).copied() {
                nodes[existing].node = node;
                parents[existing] = parent;
                continue;
            }
            index.insert(key.clone(), nodes.len());
            nodes.push(FlatTreeNode {
                key,
                node,
                parent: None,
                children: Vec::new(),
            });
            parents.push(parent);
        }

        let mut roots = Vec::new();
        for (child, parent) in parents.iter().enumerate() {
            let parent = parent
                .as_ref()
                .and_then(|key| index.get(key).copied())
                .filter(|parent| *parent != child);
            match parent {
                Some(parent) => {
                    nodes[child].parent = Some(parent);
                    nodes[parent].children.push(child);
                }
                None => roots.push(child),
            }
        }

        let mut tree = Self {
            nodes,
            roots,
            index,
        };
        tree.break_cycles();
        tree
    }

    fn break_cycles(&mut self) {
        let mut reachable = vec![false; self.nodes.len()];
        let mut stack = self.roots.clone();
        while let Some(index) = stack.pop() {
            if std::mem::replace(&mut reachable[index], true) {
                continue;
            }
            stack.extend(self.nodes[index].children.iter().copied());
        }

        for index in 0..self.nodes.len() {
            if reachable[index] {
                continue;
            }
            if let Some(parent) = self.nodes[index].parent.take() {
                self.nodes[parent].children.retain(|child| *child != index);
            }
            self.roots.push(index);

            let mut stack = vec![index];
            while let Some(index) = stack.pop() {
                if std::mem::replace(&mut reachable[index], true) {
                    continue;
                }
                stack.extend(self.nodes[index].children.iter().copied());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn get(&self, index: usize) -> Result<&FlatTreeNode<Key, Node>, FlatTreeError> {
        self.nodes
            .get(index)
            .ok_or(FlatTreeError::IndexOutOfBounds(index))
    }

    pub fn index_of(&self, key: &Key) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Depth-first rows, skipping the descendants of collapsed keys.
    pub fn visible_rows(&self, collapsed: &HashSet<Key>) -> Vec<TreeRow> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut visited = HashSet::new();
        for root in &self.roots {
            self.visible_rows_rec(*root, 0, collapsed, &mut out, &mut visited);
        }
        out
    }

    fn visible_rows_rec(
        &self,
        index: usize,
        depth: usize,
        collapsed: &HashSet<Key>,
        out: &mut Vec<TreeRow>,
        visited: &mut HashSet<usize>,
    ) {
        if !visited.insert(index) {
            return;
        }

        let Ok(node) = self.get(index) else {
            return;
        };

        let is_branch = !node.children.is_empty();
        let is_expanded = is_branch && !collapsed.contains(&node.key);
        out.push(TreeRow {
            index,
            depth,
            is_branch,
            is_expanded,
        });

        if is_expanded {
            for child in node.children.iter().copied() {
                self.visible_rows_rec(child, depth + 1, collapsed, out, visited);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(tree: &FlatTree<&'static str, ()>, rows: &[TreeRow]) -> Vec<(&'static str, usize)> {
        rows.iter()
            .map(|row| (tree.get(row.index).unwrap().key, row.depth))
            .collect()
    }

    #[test]
    fn test_rows_follow_parents() {
        let tree = FlatTree::from_items([
            ("stack", None, ()),
            ("bucket", Some("stack"), ()),
            ("site", Some("stack"), ()),
            ("fn", Some("site"), ()),
        ]);

        let rows = tree.visible_rows(&HashSet::new());

        assert_eq!(
            keys(&tree, &rows),
            vec![("stack", 0), ("bucket", 1), ("site", 1), ("fn", 2)]
        );
        assert!(rows[0].is_branch && rows[0].is_expanded);
        assert!(!rows[1].is_branch);
    }

    #[test]
    fn test_collapsed_hides_descendants() {
        let tree = FlatTree::from_items([
            ("stack", None, ()),
            ("site", Some("stack"), ()),
            ("fn", Some("site"), ()),
        ]);

        let rows = tree.visible_rows(&HashSet::from(["site"]));

        assert_eq!(keys(&tree, &rows), vec![("stack", 0), ("site", 1)]);
        assert!(rows[1].is_branch && !rows[1].is_expanded);
    }

    #[test]
    fn test_unknown_parent_becomes_root() {
        let tree = FlatTree::from_items([("orphan", Some("gone"), ()), ("other", None, ())]);
        assert_eq!(tree.roots(), &[0, 1]);
    }

    #[test]
    fn test_cycle_is_broken() {
        let tree = FlatTree::from_items([("a", Some("b"), ()), ("b", Some("a"), ())]);

        let rows = tree.visible_rows(&HashSet::new());

        assert_eq!(keys(&tree, &rows), vec![("a", 0), ("b", 1)]);
    }

    #[test]
    fn test_get_out_of_bounds() {
        let tree: FlatTree<&str, ()> = FlatTree::default();
        assert_eq!(
            tree.get(3).unwrap_err(),
            FlatTreeError::IndexOutOfBounds(3)
        );
    }
}
