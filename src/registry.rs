use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dom::{Document, NodeId};

/// Identity assigned to a node by the patch stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeKey {
    Int(i64),
    Str(String),
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Int(value) => write!(f, "{value}"),
            NodeKey::Str(value) => f.write_str(value),
        }
    }
}

impl From<i64> for NodeKey {
    fn from(value: i64) -> Self {
        NodeKey::Int(value)
    }
}

impl From<&str> for NodeKey {
    fn from(value: &str) -> Self {
        NodeKey::Str(value.to_string())
    }
}

#[derive(Debug)]
struct ScriptRef {
    node: NodeId,
    owners: Vec<NodeKey>,
}

/// Shared `<script>` elements, reference counted by the ids that declared them.
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    scripts: HashMap<String, ScriptRef>,
    owner_uids: HashMap<NodeKey, String>,
}

impl ScriptRegistry {
    pub fn declare(&mut self, uid: &str, node: NodeId) {
        self.scripts.insert(
            uid.to_string(),
            ScriptRef {
                node,
                owners: Vec::new(),
            },
        );
    }

    pub fn exists(&self, uid: &str) -> bool {
        self.scripts.contains_key(uid)
    }

    pub fn script_node(&self, uid: &str) -> Option<NodeId> {
        self.scripts.get(uid).map(|script| script.node)
    }

    pub fn owners(&self, uid: &str) -> &[NodeKey] {
        self.scripts
            .get(uid)
            .map(|script| script.owners.as_slice())
            .unwrap_or(&[])
    }

    /// Record `id` as an owner of `uid`. Adding the same owner twice is a no-op; an id
    /// that owned a different script is moved over.
    pub fn add_ref(&mut self, uid: &str, id: &NodeKey, document: &mut Document) {
        if !self.scripts.contains_key(uid) {
            debug!(target = "registry", uid, "reference to undeclared script");
            return;
        }
        match self.owner_uids.get(id) {
            Some(current) if current == uid => return,
            Some(_) => self.remove_ref(id, document),
            None => {}
        }
        if let Some(script) = self.scripts.get_mut(uid) {
            script.owners.push(id.clone());
            self.owner_uids.insert(id.clone(), uid.to_string());
        }
    }

    /// Drop the reference held by `id`; the last owner out removes the script element.
    pub fn remove_ref(&mut self, id: &NodeKey, document: &mut Document) {
        let Some(uid) = self.owner_uids.remove(id) else {
            return;
        };
        let Some(script) = self.scripts.get_mut(&uid) else {
            return;
        };
        script.owners.retain(|owner| owner != id);
        if script.owners.is_empty() {
            if let Some(script) = self.scripts.remove(&uid) {
                debug!(target = "registry", uid = %uid, "removing unreferenced script");
                document.remove(script.node);
            }
        }
    }

    pub fn clear(&mut self, document: &mut Document) {
        for (_, script) in self.scripts.drain() {
            document.remove(script.node);
        }
        self.owner_uids.clear();
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

/// Bidirectional map between patch-stream ids and document nodes.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    by_id: HashMap<NodeKey, NodeId>,
    by_node: HashMap<NodeId, NodeKey>,
    scripts: ScriptRegistry,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `id` to `node`, replacing any earlier binding of either side.
    pub fn assign(&mut self, node: NodeId, id: NodeKey) {
        if let Some(previous_node) = self.by_id.insert(id.clone(), node) {
            if previous_node != node {
                self.by_node.remove(&previous_node);
            }
        }
        if let Some(previous_id) = self.by_node.insert(node, id.clone()) {
            if previous_id != id {
                self.by_id.remove(&previous_id);
            }
        }
    }

    pub fn by_id(&self, id: &NodeKey) -> Option<NodeId> {
        self.by_id.get(id).copied()
    }

    pub fn by_node(&self, node: NodeId) -> Option<&NodeKey> {
        self.by_node.get(&node)
    }

    pub fn release(&mut self, id: &NodeKey, document: &mut Document) {
        if let Some(node) = self.by_id.remove(id) {
            self.by_node.remove(&node);
        }
        self.scripts.remove_ref(id, document);
    }

    /// Release whatever id is bound to a node the document has discarded.
    pub fn release_node(&mut self, node: NodeId, document: &mut Document) {
        if let Some(id) = self.by_node.get(&node).cloned() {
            debug!(target = "registry", id = %id, "releasing id of discarded node");
            self.release(&id, document);
        }
    }

    pub fn clear(&mut self, document: &mut Document) {
        self.by_id.clear();
        self.by_node.clear();
        self.scripts.clear(document);
    }

    pub fn scripts(&self) -> &ScriptRegistry {
        &self.scripts
    }

    pub fn scripts_mut(&mut self) -> &mut ScriptRegistry {
        &mut self.scripts
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
