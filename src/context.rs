use tracing::debug;

use crate::dom::{Document, Namespace, NodeId};
use crate::events::DelegationEngine;
use crate::registry::{IdentityRegistry, NodeKey};

/// Per-session UI state: the document plus everything keyed on its nodes.
pub struct UiContext {
    pub document: Document,
    pub registry: IdentityRegistry,
    pub events: DelegationEngine,
    root: NodeId,
    root_id: String,
    online_bar: NodeId,
}

impl UiContext {
    /// Build `body > (#online_bar_id, #root_id)` with the online indicator hidden.
    pub fn new(root_id: &str, online_bar_id: &str) -> Self {
        let mut document = Document::new();
        let body = document.body();

        let online_bar = document.create_element("div", Namespace::Html);
        let root = document.create_element("div", Namespace::Html);
        // Both nodes are fresh elements appended to body; none of these calls can fail.
        let _ = document.set_attribute(online_bar, "id", online_bar_id);
        let _ = document.set_attribute(online_bar, "style", "display: none");
        let _ = document.set_attribute(root, "id", root_id);
        let _ = document.append_child(body, online_bar);
        let _ = document.append_child(body, root);

        Self {
            document,
            registry: IdentityRegistry::new(),
            events: DelegationEngine::new(),
            root,
            root_id: root_id.to_string(),
            online_bar,
        }
    }

    /// The root container every unparented node lands in.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: &NodeKey) -> Option<NodeId> {
        let node = self.registry.by_id(id);
        if node.is_none() {
            debug!(target = "session", id = %id, "node not found");
        }
        node
    }

    pub fn set_online(&mut self, online: bool) {
        let result = if online {
            self.document.remove_attribute(self.online_bar, "style")
        } else {
            self.document
                .set_attribute(self.online_bar, "style", "display: none")
        };
        if let Err(err) = result {
            debug!(target = "session", error = %err, "online indicator unavailable");
        }
    }

    pub fn is_online_shown(&self) -> bool {
        self.document.attribute(self.online_bar, "style").is_none()
    }

    /// Drop identities and direct listeners of nodes the document has discarded.
    pub fn release_discarded(&mut self) {
        // Releasing a script owner can discard the shared script in turn.
        loop {
            let discarded = self.document.drain_discarded();
            if discarded.is_empty() {
                break;
            }
            for node in discarded {
                self.registry.release_node(node, &mut self.document);
                self.events.forget(node);
            }
        }
    }

    /// Recreate the root container and drop every identity and event registration.
    pub fn reset(&mut self) {
        let parent = self
            .document
            .parent(self.root)
            .unwrap_or_else(|| self.document.body());
        self.document.remove(self.root);

        let root = self.document.create_element("div", Namespace::Html);
        let _ = self.document.set_attribute(root, "id", &self.root_id);
        if let Err(err) = self.document.append_child(parent, root) {
            debug!(target = "session", error = %err, "reattaching root container under body");
            let body = self.document.body();
            let _ = self.document.append_child(body, root);
        }
        self.root = root;

        self.registry.clear(&mut self.document);
        self.events.reset();
        self.document.drain_discarded();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBinding;

    #[test]
    fn skeleton_has_hidden_indicator_and_root() {
        let context = UiContext::new("display", "online-bar");
        assert_eq!(context.document.get_element_by_id("display"), Some(context.root()));
        assert!(!context.is_online_shown());
        assert_eq!(
            context.document.inner_html(context.document.body()),
            "<div id=\"online-bar\" style=\"display: none\"></div><div id=\"display\"></div>"
        );
    }

    #[test]
    fn reset_replaces_root_container() {
        let mut context = UiContext::new("display", "online-bar");
        let old_root = context.root();
        let child = context.document.create_element("p", Namespace::Html);
        context.document.append_child(old_root, child).unwrap();
        context.registry.assign(child, NodeKey::Int(1));

        let baseline = context.document.node_count();
        context.reset();
        assert_ne!(context.root(), old_root);
        assert!(!context.document.is_connected(old_root));
        assert!(!context.document.is_alive(child));
        assert_eq!(context.document.node_count(), baseline - 1);
        assert_eq!(context.document.get_element_by_id("display"), Some(context.root()));
        assert_eq!(context.node(&NodeKey::Int(1)), None);
    }

    #[test]
    fn discarded_nodes_lose_ids_and_listeners() {
        let mut context = UiContext::new("display", "online-bar");
        let root = context.root();
        let button = context.document.create_element("button", Namespace::Html);
        context.document.append_child(root, button).unwrap();
        context.registry.assign(button, NodeKey::Int(2));
        let binding = EventBinding::from_code("on:click", "save", Some(NodeKey::Int(2))).unwrap();
        context.events.listen(button, binding);

        context.document.set_text_content(root, "gone").unwrap();
        context.release_discarded();
        assert_eq!(context.node(&NodeKey::Int(2)), None);
        assert_eq!(context.events.direct_count(), 0);
    }
}
