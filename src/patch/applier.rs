use chrono::FixedOffset;
use tracing::{debug, warn};

use super::attributes::{AttributeKind, BooleanProperty, EVENT_PREFIX};
use super::record::{
    ElementPatch, EventDeclaration, PatchRecord, ScriptPatch, StubPatch, TextPatch,
};
use super::values::{assignment_for, Assignment};
use crate::context::UiContext;
use crate::dom::{Document, Namespace, NodeId};
use crate::events::EventBinding;
use crate::registry::NodeKey;

/// Applies server patches to a [`UiContext`], creating or updating nodes by id.
#[derive(Debug)]
pub struct PatchApplier {
    add_node_ids: bool,
    utc_offset: FixedOffset,
    root_filled: bool,
}

impl PatchApplier {
    pub fn new(add_node_ids: bool, utc_offset: FixedOffset) -> Self {
        Self {
            add_node_ids,
            utc_offset,
            root_filled: false,
        }
    }

    pub fn reset(&mut self) {
        self.root_filled = false;
    }

    pub fn apply_all(&mut self, context: &mut UiContext, patches: &[PatchRecord]) {
        for patch in patches {
            self.apply(context, patch);
            context.release_discarded();
        }
    }

    /// Apply one patch; returns the node it materialized, if any.
    pub fn apply(&mut self, context: &mut UiContext, patch: &PatchRecord) -> Option<NodeId> {
        match patch {
            PatchRecord::Element(element) => Some(self.apply_element(context, element)),
            PatchRecord::Text(text) => Some(self.apply_text(context, text)),
            PatchRecord::Stub(stub) => Some(self.apply_stub(context, stub)),
            PatchRecord::Script(script) => Some(self.apply_script(context, script)),
            PatchRecord::Events(declaration) => {
                apply_events(context, declaration);
                None
            }
        }
    }

    fn resolve_parent(
        &mut self,
        context: &mut UiContext,
        parent: Option<&NodeKey>,
        id: &NodeKey,
    ) -> NodeId {
        if let Some(node) = parent.and_then(|parent| context.registry.by_id(parent)) {
            return node;
        }
        match parent {
            Some(parent) => debug!(
                target = "patch",
                id = %id,
                parent = %parent,
                "parent not found, attaching to root"
            ),
            None => debug!(target = "patch", id = %id, "attaching to root"),
        }

        let root = context.root();
        if !self.root_filled {
            context.document.remove_children(root);
            self.root_filled = true;
        }
        root
    }

    fn create(
        &mut self,
        context: &mut UiContext,
        id: &NodeKey,
        parent: Option<&NodeKey>,
        tag: &str,
        namespace: Namespace,
    ) -> NodeId {
        let parent = self.resolve_parent(context, parent, id);
        let node = context.document.create_element(tag, namespace);
        if self.add_node_ids {
            let _ = context.document.set_attribute(node, "id", &format!("o{id}"));
        }
        context.registry.assign(node, id.clone());
        if let Err(err) = context.document.append_child(parent, node) {
            warn!(target = "patch", id = %id, error = %err, "failed to attach node");
        }
        node
    }

    fn apply_element(&mut self, context: &mut UiContext, patch: &ElementPatch) -> NodeId {
        let (node, is_new) = match context.registry.by_id(&patch.id) {
            Some(node) => {
                if patch.reposition {
                    reposition(&mut context.document, node);
                }
                (node, false)
            }
            None => {
                let namespace = match patch.namespace {
                    Some(code) => Namespace::from_code(code).unwrap_or_else(|| {
                        debug!(target = "patch", code, "unknown namespace code");
                        Namespace::Html
                    }),
                    None => Namespace::Html,
                };
                let node = self.create(context, &patch.id, patch.parent.as_ref(), &patch.tag, namespace);
                if let Some(input_type) = &patch.input_type {
                    let _ = context.document.set_input_type(node, input_type);
                }
                (node, true)
            }
        };

        self.sync_attributes(context, node, patch, is_new);
        sync_class(&mut context.document, node, patch);
        let document = &mut context.document;
        match patch.style.as_deref().filter(|style| !style.is_empty()) {
            Some(style) => {
                let _ = document.set_attribute(node, "style", style);
            }
            None => {
                let _ = document.remove_attribute(node, "style");
            }
        }

        if let Some(markup) = &patch.markup {
            if document.inner_html(node) != *markup {
                if let Err(err) = document.set_inner_html(node, markup) {
                    warn!(target = "patch", id = %patch.id, error = %err, "failed to set markup");
                }
            }
        } else if let Some(text) = &patch.text {
            if document.text_content(node) != *text {
                let _ = document.set_text_content(node, text);
            }
        }

        if patch.focus {
            document.focus(node);
        }

        if let Some(value) = &patch.value {
            let input_type = patch
                .input_type
                .clone()
                .or_else(|| document.control(node).and_then(|state| state.input_type.clone()));
            let assignment =
                assignment_for(input_type.as_deref(), value, patch.localized, self.utc_offset);
            if let Some(control) = document.control_mut(node) {
                match assignment {
                    Assignment::Checked(checked) => control.checked = checked,
                    Assignment::Value(value) => control.value = value,
                }
            }
        }

        node
    }

    fn sync_attributes(
        &mut self,
        context: &mut UiContext,
        node: NodeId,
        patch: &ElementPatch,
        is_new: bool,
    ) {
        for (name, value) in patch.attributes.iter() {
            let truthy = value.is_some_and(|value| value.is_truthy());
            match AttributeKind::classify(name) {
                AttributeKind::Event(code) => {
                    let Some(method) = value.filter(|_| is_new) else {
                        continue;
                    };
                    let binding =
                        EventBinding::from_code(code, &method.to_attr_string(), Some(patch.id.clone()));
                    if let Some(binding) = binding {
                        context.events.listen(node, binding);
                    }
                }
                AttributeKind::BindValue => {
                    let Some(variable) = value.filter(|_| is_new) else {
                        continue;
                    };
                    let tag = context.document.tag_name(node).unwrap_or_default().to_string();
                    let binding = EventBinding::value_bind(
                        &tag,
                        &variable.to_attr_string(),
                        Some(patch.id.clone()),
                    );
                    context.events.listen(node, binding);
                }
                AttributeKind::Property(property) => {
                    if let Some(control) = context.document.control_mut(node) {
                        match property {
                            BooleanProperty::Checked => control.checked = truthy,
                            BooleanProperty::Required => control.required = truthy,
                            BooleanProperty::Disabled => control.disabled = truthy,
                        }
                    }
                }
                AttributeKind::Plain => {
                    let result = match value.filter(|_| truthy) {
                        Some(value) => {
                            context
                                .document
                                .set_attribute(node, name, &value.to_attr_string())
                        }
                        None => context.document.remove_attribute(node, name),
                    };
                    if let Err(err) = result {
                        debug!(target = "patch", attribute = name, error = %err, "attribute skipped");
                    }
                }
            }
        }
    }

    fn apply_text(&mut self, context: &mut UiContext, patch: &TextPatch) -> NodeId {
        let node = match context.registry.by_id(&patch.id) {
            Some(node) => {
                if patch.reposition {
                    reposition(&mut context.document, node);
                }
                node
            }
            None => self.create(context, &patch.id, patch.parent.as_ref(), "text", Namespace::Html),
        };
        let _ = context.document.set_text_content(node, &patch.text);
        node
    }

    fn apply_stub(&mut self, context: &mut UiContext, patch: &StubPatch) -> NodeId {
        if let Some(node) = context.registry.by_id(&patch.id) {
            return node;
        }
        let node = self.create(context, &patch.id, patch.parent.as_ref(), "div", Namespace::Html);
        if let Some(class) = patch.class.as_deref().filter(|class| !class.is_empty()) {
            let _ = context.document.set_attribute(node, "class", class);
        }
        node
    }

    fn apply_script(&mut self, context: &mut UiContext, patch: &ScriptPatch) -> NodeId {
        if !context.registry.scripts().exists(&patch.uid) {
            let document = &mut context.document;
            let script = document.create_element("script", Namespace::Html);
            for (name, value) in patch.attributes.iter() {
                if let Some(value) = value.filter(|value| value.is_truthy()) {
                    let _ = document.set_attribute(script, name, &value.to_attr_string());
                }
            }
            if let Some(text) = patch.text.as_deref().filter(|text| !text.is_empty()) {
                let _ = document.set_text_content(script, text);
            }
            let head = document.head();
            let _ = document.append_child(head, script);
            context.registry.scripts_mut().declare(&patch.uid, script);
            debug!(target = "patch", uid = %patch.uid, "shared script inserted");
        }

        let node = match context.registry.by_id(&patch.id) {
            Some(node) => node,
            None => {
                let parent = self.resolve_parent(context, patch.parent.as_ref(), &patch.id);
                let placeholder = context.document.create_element("script", Namespace::Html);
                context.registry.assign(placeholder, patch.id.clone());
                let _ = context.document.append_child(parent, placeholder);
                placeholder
            }
        };

        context
            .registry
            .scripts_mut()
            .add_ref(&patch.uid, &patch.id, &mut context.document);
        node
    }
}

fn apply_events(context: &mut UiContext, declaration: &EventDeclaration) {
    let selector = declaration
        .attributes
        .get("selector")
        .map(|selector| selector.to_attr_string())
        .unwrap_or_default();
    for (name, value) in declaration.attributes.iter() {
        if !name.starts_with(EVENT_PREFIX) {
            continue;
        }
        let Some(method) = value else {
            continue;
        };
        context.events.register(
            &declaration.context,
            &selector,
            name,
            &method.to_attr_string(),
            declaration.owner.clone(),
        );
    }
}

fn sync_class(document: &mut Document, node: NodeId, patch: &ElementPatch) {
    let fragments: Vec<&str> = [patch.default_class.as_deref(), patch.custom_class.as_deref()]
        .into_iter()
        .flatten()
        .filter(|fragment| !fragment.is_empty())
        .collect();
    let _ = if fragments.is_empty() {
        document.remove_attribute(node, "class")
    } else {
        document.set_attribute(node, "class", &fragments.join(" "))
    };
}

/// Move the node to the end of its current parent.
fn reposition(document: &mut Document, node: NodeId) {
    if let Some(parent) = document.parent(node) {
        let _ = document.append_child(parent, node);
    }
}
