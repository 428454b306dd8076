use mercato_core::{MarketError, MarketResult};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ArenaNode<T> {
    pub id: Uuid,
    pub parent: Option<Uuid>,
    pub children: Vec<Uuid>,
    pub value: T,
}

/// Tree of nodes addressed by generated ids.
///
/// Nodes live in a flat map and link to each other by id, so detaching or re-parenting a
/// subtree only rewrites links. The root always exists and cannot be removed or moved.
#[derive(Debug, Clone)]
pub struct RuleArena<T> {
    entity: &'static str,
    root: Uuid,
    nodes: HashMap<Uuid, ArenaNode<T>>,
}

impl<T> RuleArena<T> {
    pub fn new(entity: &'static str, root_value: T) -> Self {
        let root = Uuid::new_v4();
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            ArenaNode {
                id: root,
                parent: None,
                children: Vec::new(),
                value: root_value,
            },
        );
        Self {
            entity,
            root,
            nodes,
        }
    }

    pub fn root(&self) -> Uuid {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn node(&self, id: Uuid) -> MarketResult<&ArenaNode<T>> {
        self.nodes
            .get(&id)
            .ok_or_else(|| MarketError::not_found(self.entity, id))
    }

    pub fn node_mut(&mut self, id: Uuid) -> MarketResult<&mut ArenaNode<T>> {
        let entity = self.entity;
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found(entity, id))
    }

    pub fn value(&self, id: Uuid) -> MarketResult<&T> {
        self.node(id).map(|node| &node.value)
    }

    pub fn value_mut(&mut self, id: Uuid) -> MarketResult<&mut T> {
        self.node_mut(id).map(|node| &mut node.value)
    }

    pub fn children(&self, id: Uuid) -> &[Uuid] {
        self.nodes
            .get(&id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn insert_child(&mut self, parent: Uuid, value: T) -> MarketResult<Uuid> {
        let id = Uuid::new_v4();
        self.node_mut(parent)?.children.push(id);
        self.nodes.insert(
            id,
            ArenaNode {
                id,
                parent: Some(parent),
                children: Vec::new(),
                value,
            },
        );
        Ok(id)
    }

    /// Put a new node in `target`'s place and hang `target` under it.
    pub fn wrap(&mut self, target: Uuid, value: T) -> MarketResult<Uuid> {
        let parent = self
            .node(target)?
            .parent
            .ok_or_else(|| MarketError::validation(format!("The root {} cannot be wrapped", self.entity)))?;

        let id = Uuid::new_v4();
        let siblings = &mut self.node_mut(parent)?.children;
        if let Some(slot) = siblings.iter_mut().find(|child| **child == target) {
            *slot = id;
        }
        self.node_mut(target)?.parent = Some(id);
        self.nodes.insert(
            id,
            ArenaNode {
                id,
                parent: Some(parent),
                children: vec![target],
                value,
            },
        );
        Ok(id)
    }

    /// Detach `id` and drop its whole subtree. Returns how many nodes were removed.
    pub fn remove(&mut self, id: Uuid) -> MarketResult<usize> {
        let parent = self
            .node(id)?
            .parent
            .ok_or_else(|| MarketError::validation(format!("The root {} cannot be removed", self.entity)))?;

        self.node_mut(parent)?.children.retain(|child| *child != id);
        let subtree = self.subtree(id);
        for node_id in &subtree {
            self.nodes.remove(node_id);
        }
        Ok(subtree.len())
    }

    /// Re-parent `id` (with its subtree) as the last child of `new_parent`.
    pub fn move_node(&mut self, id: Uuid, new_parent: Uuid) -> MarketResult<()> {
        let old_parent = self
            .node(id)?
            .parent
            .ok_or_else(|| MarketError::validation(format!("The root {} cannot be moved", self.entity)))?;
        self.node(new_parent)?;
        if self.is_in_subtree(id, new_parent) {
            return Err(MarketError::validation(format!(
                "Cannot move {} {} under its own subtree",
                self.entity, id
            )));
        }

        self.node_mut(old_parent)?.children.retain(|child| *child != id);
        self.node_mut(new_parent)?.children.push(id);
        self.node_mut(id)?.parent = Some(new_parent);
        Ok(())
    }

    /// True when `candidate` is `ancestor` or one of its descendants
    pub fn is_in_subtree(&self, ancestor: Uuid, candidate: Uuid) -> bool {
        let mut current = Some(candidate);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|node| node.parent);
        }
        false
    }

    fn subtree(&self, id: Uuid) -> Vec<Uuid> {
        let mut collected = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            collected.push(current);
            stack.extend(self.children(current).iter().copied());
        }
        collected
    }
}
