use std::collections::HashMap;

use crate::error::{ArError, Result};

/// Index of a node in the scene arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Anchor,
    Child,
}

#[derive(Clone, Debug)]
pub struct SceneNode {
    pub name: String,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Ownership tree of named scene nodes.
///
/// Anchors are roots; children hang off anchors or other children. Slots of
/// removed nodes are recycled through a free list, and `by_name` is the only
/// way in from the outside, so a stale [`NodeId`] can never alias a live
/// node of a different name without going through a lookup first.
#[derive(Debug, Default)]
pub struct SceneTree {
    slots: Vec<Option<SceneNode>>,
    free: Vec<usize>,
    by_name: HashMap<String, NodeId>,
    selected: Option<NodeId>,
}

impl SceneTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.slots.get(id.0).and_then(|s| s.as_ref())
    }

    pub fn kind_of(&self, name: &str) -> Option<NodeKind> {
        self.find(name).and_then(|id| self.get(id)).map(|n| n.kind)
    }

    /// Add a root node for an anchor.
    pub fn insert_anchor(&mut self, name: &str) -> Result<NodeId> {
        self.insert(name, NodeKind::Anchor, None)
    }

    /// Attach a child node under `parent`.
    pub fn attach(&mut self, parent: &str, name: &str) -> Result<NodeId> {
        let parent_id = self
            .find(parent)
            .ok_or_else(|| ArError::NotFound(parent.to_string()))?;
        let id = self.insert(name, NodeKind::Child, Some(parent_id))?;
        if let Some(Some(p)) = self.slots.get_mut(parent_id.0) {
            p.children.push(id);
        }
        Ok(id)
    }

    fn insert(&mut self, name: &str, kind: NodeKind, parent: Option<NodeId>) -> Result<NodeId> {
        if self.by_name.contains_key(name) {
            return Err(ArError::DuplicateName(name.to_string()));
        }
        let node = SceneNode {
            name: name.to_string(),
            kind,
            parent,
            children: Vec::new(),
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        };
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Detach `name` and its whole subtree. Returns the removed names,
    /// deepest first, ending with `name`. Unknown names remove nothing.
    ///
    /// Clears the selection if it pointed into the removed subtree.
    pub fn remove_subtree(&mut self, name: &str) -> Vec<String> {
        let Some(root) = self.find(name) else {
            return Vec::new();
        };

        if let Some(parent) = self.get(root).and_then(|n| n.parent)
            && let Some(Some(p)) = self.slots.get_mut(parent.0)
        {
            p.children.retain(|c| *c != root);
        }

        let mut removed = Vec::new();
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                if let Some(node) = self.slots[id.0].take() {
                    self.by_name.remove(&node.name);
                    self.free.push(id.0);
                    if self.selected == Some(id) {
                        self.selected = None;
                    }
                    removed.push(node.name);
                }
                continue;
            }
            stack.push((id, true));
            if let Some(node) = self.get(id) {
                for child in node.children.iter().rev() {
                    stack.push((*child, false));
                }
            }
        }
        removed
    }

    /// Names of every node under `name`, not including `name` itself.
    pub fn descendants(&self, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        let Some(root) = self.find(name) else {
            return out;
        };
        let mut stack: Vec<NodeId> = self.get(root).map(|n| n.children.clone()).unwrap_or_default();
        while let Some(id) = stack.pop() {
            if let Some(node) = self.get(id) {
                out.push(node.name.clone());
                stack.extend(node.children.iter().copied());
            }
        }
        out
    }

    pub fn select(&mut self, name: &str) -> Result<()> {
        let id = self
            .find(name)
            .ok_or_else(|| ArError::NotFound(name.to_string()))?;
        self.selected = Some(id);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected
            .and_then(|id| self.get(id))
            .map(|n| n.name.as_str())
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.by_name.clear();
        self.selected = None;
    }
}
