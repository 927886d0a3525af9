use std::collections::BTreeMap;

/// Id of the implicit root; top-level instances have it as parent.
pub const ROOT_ID: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub id: u64,
    pub parent_id: u64,
    pub key: String,
    /// False once the instance has been dropped. Retired nodes stay in the tree.
    pub live: bool,
}

/// Parent/child record of every instance a manager has created.
#[derive(Debug, Default)]
pub struct ModuleTree {
    nodes: BTreeMap<u64, TreeNode>,
}

impl ModuleTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u64, parent_id: u64, key: impl Into<String>) {
        self.nodes.insert(
            id,
            TreeNode {
                id,
                parent_id,
                key: key.into(),
                live: true,
            },
        );
    }

    /// Marks an instance as dropped. Returns false for unknown ids.
    pub fn retire(&mut self, id: u64) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.live = false;
                true
            }
            None => false,
        }
    }

    /// Forgets an instance entirely, e.g. when its factory failed.
    pub fn remove(&mut self, id: u64) -> Option<TreeNode> {
        self.nodes.remove(&id)
    }

    pub fn is_live(&self, id: u64) -> bool {
        id == ROOT_ID || self.nodes.get(&id).is_some_and(|n| n.live)
    }

    pub fn node(&self, id: u64) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    pub fn children(&self, id: u64) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values().filter(move |n| n.parent_id == id)
    }

    /// All nodes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values()
    }

    pub fn live(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values().filter(|n| n.live)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retired_nodes_remain_visible() {
        let mut tree = ModuleTree::new();
        tree.insert(1, ROOT_ID, "A");
        tree.insert(2, 1, "B");
        tree.insert(3, 1, "C");
        assert!(tree.retire(2));
        assert!(!tree.retire(9));
        assert!(!tree.is_live(2));
        assert!(tree.is_live(ROOT_ID));
        assert_eq!(tree.children(1).map(|n| n.id).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(tree.live().count(), 2);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn removed_nodes_are_gone() {
        let mut tree = ModuleTree::new();
        tree.insert(1, ROOT_ID, "A");
        assert_eq!(tree.remove(1).map(|n| n.key), Some("A".to_string()));
        assert!(tree.is_empty());
        assert!(!tree.is_live(1));
    }
}
