use std::collections::HashMap;
use std::rc::Rc;

use html5ever::{LocalName, QualName};
use kuchiki::{NodeRef, Selectors};
use thiserror::Error;

use super::markup::{self, MarkupError};

const HTML_NS: &str = "http://www.w3.org/1999/xhtml";
const SVG_NS: &str = "http://www.w3.org/2000/svg";
const XML_EVENTS_NS: &str = "http://www.w3.org/2001/xml-events";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
const MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";

/// Handle of a node inside one [`Document`].
///
/// Handles are never reused. A discarded node's handle stops resolving.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Namespace {
    #[default]
    Html,
    Svg,
    XmlEvents,
    XLink,
    MathMl,
}

impl Namespace {
    /// Fixed namespace table used by element patches.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Html),
            2 => Some(Self::Svg),
            3 => Some(Self::XmlEvents),
            4 => Some(Self::XLink),
            5 => Some(Self::MathMl),
            _ => None,
        }
    }

    pub fn from_uri(uri: &str) -> Self {
        match uri {
            SVG_NS => Self::Svg,
            XML_EVENTS_NS => Self::XmlEvents,
            XLINK_NS => Self::XLink,
            MATHML_NS => Self::MathMl,
            _ => Self::Html,
        }
    }

    pub fn uri(self) -> &'static str {
        match self {
            Self::Html => HTML_NS,
            Self::Svg => SVG_NS,
            Self::XmlEvents => XML_EVENTS_NS,
            Self::XLink => XLINK_NS,
            Self::MathMl => MATHML_NS,
        }
    }

    fn qual_name(self, local: &str) -> QualName {
        QualName::new(None, html5ever::Namespace::from(self.uri()), LocalName::from(local))
    }
}

/// Layout box in page coordinates, as reported by the embedder.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0.0 || self.height == 0.0
    }
}

/// Live state of a form control. Mirrors DOM properties rather than attributes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ControlState {
    pub input_type: Option<String>,
    pub value: String,
    pub checked: bool,
    pub selected: bool,
    pub required: bool,
    pub disabled: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomError {
    #[error("missing node {0:?}")]
    MissingNode(NodeId),
    #[error("node {0:?} cannot have children")]
    InvalidParent(NodeId),
    #[error("appending {child:?} to {parent:?} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },
}

fn address(node: &NodeRef) -> usize {
    Rc::as_ptr(&node.0) as usize
}

/// The kuchiki tree the runtime patches, addressed through numeric handles.
///
/// Every node reachable from a handle has one itself, so parent and child walks always
/// resolve. Control state and layout boxes live in side tables keyed by handle.
/// Identity bookkeeping lives in the registry.
pub struct Document {
    nodes: HashMap<NodeId, NodeRef>,
    handles: HashMap<usize, NodeId>,
    controls: HashMap<NodeId, ControlState>,
    layouts: HashMap<NodeId, Rect>,
    discarded: Vec<NodeId>,
    next_handle: usize,
    root: NodeId,
    head: NodeId,
    body: NodeId,
    title: String,
    location: Option<String>,
    focused: Option<NodeId>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let tree = NodeRef::new_document();
        let html = NodeRef::new_element(Namespace::Html.qual_name("html"), None);
        let head = NodeRef::new_element(Namespace::Html.qual_name("head"), None);
        let body = NodeRef::new_element(Namespace::Html.qual_name("body"), None);
        html.append(head.clone());
        html.append(body.clone());
        tree.append(NodeRef::new_doctype("html", "", ""));
        tree.append(html);

        let mut document = Self {
            nodes: HashMap::new(),
            handles: HashMap::new(),
            controls: HashMap::new(),
            layouts: HashMap::new(),
            discarded: Vec::new(),
            next_handle: 0,
            root: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
            title: String::new(),
            location: None,
            focused: None,
        };
        document.root = document.remember_subtree(&tree);
        document.head = document.remember(&head);
        document.body = document.remember(&body);
        document
    }

    fn remember(&mut self, node: &NodeRef) -> NodeId {
        if let Some(handle) = self.handles.get(&address(node)) {
            return *handle;
        }
        let handle = NodeId(self.next_handle);
        self.next_handle += 1;
        self.handles.insert(address(node), handle);
        if node.as_element().is_some() {
            self.controls.insert(handle, ControlState::default());
        }
        self.nodes.insert(handle, node.clone());
        handle
    }

    fn remember_subtree(&mut self, node: &NodeRef) -> NodeId {
        for descendant in node.inclusive_descendants() {
            self.remember(&descendant);
        }
        self.remember(node)
    }

    fn handle(&self, node: &NodeRef) -> Option<NodeId> {
        self.handles.get(&address(node)).copied()
    }

    fn node_ref(&self, node: NodeId) -> Result<&NodeRef, DomError> {
        self.nodes.get(&node).ok_or(DomError::MissingNode(node))
    }

    /// Forget `node` and everything below it. Their handles stop resolving.
    fn discard(&mut self, node: NodeId) {
        let Some(subtree) = self.nodes.get(&node).cloned() else {
            return;
        };
        let handles: Vec<NodeId> = subtree
            .inclusive_descendants()
            .filter_map(|descendant| self.handle(&descendant))
            .collect();
        for handle in handles {
            if let Some(forgotten) = self.nodes.remove(&handle) {
                self.handles.remove(&address(&forgotten));
            }
            self.controls.remove(&handle);
            self.layouts.remove(&handle);
            if self.focused == Some(handle) {
                self.focused = None;
            }
            self.discarded.push(handle);
        }
    }

    /// Handles discarded since the last call, for owners of per-node state.
    pub fn drain_discarded(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.discarded)
    }

    pub fn is_alive(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Number of live handles, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn document_node(&self) -> NodeId {
        self.root
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.nodes
            .get(&node)
            .is_some_and(|node| node.as_element().is_some())
    }

    pub fn is_text(&self, node: NodeId) -> bool {
        self.nodes
            .get(&node)
            .is_some_and(|node| node.as_text().is_some())
    }

    /// Lowercase local name for HTML elements, verbatim for foreign ones.
    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        let element = self.nodes.get(&node)?.as_element()?;
        Some(&*element.name.local)
    }

    pub fn namespace(&self, node: NodeId) -> Option<Namespace> {
        let element = self.nodes.get(&node)?.as_element()?;
        Some(Namespace::from_uri(&element.name.ns))
    }

    pub fn create_element(&mut self, name: &str, namespace: Namespace) -> NodeId {
        let local = if namespace == Namespace::Html {
            name.to_ascii_lowercase()
        } else {
            name.to_string()
        };
        let element = NodeRef::new_element(namespace.qual_name(&local), None);
        self.remember(&element)
    }

    pub fn create_text_node(&mut self, text: &str) -> NodeId {
        self.remember(&NodeRef::new_text(text))
    }

    pub fn create_comment_node(&mut self, text: &str) -> NodeId {
        self.remember(&NodeRef::new_comment(text))
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get(&node)?.parent()?;
        self.handle(&parent)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(&node) else {
            return Vec::new();
        };
        node.children().filter_map(|child| self.handle(&child)).collect()
    }

    /// Inclusive ancestor chain, starting at `node`.
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(&node) else {
            return Vec::new();
        };
        node.inclusive_ancestors()
            .filter_map(|ancestor| self.handle(&ancestor))
            .collect()
    }

    /// Whether `node` is `ancestor` or lives somewhere below it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let (Some(ancestor), Some(node)) = (self.nodes.get(&ancestor), self.nodes.get(&node))
        else {
            return false;
        };
        node.inclusive_ancestors().any(|candidate| candidate == *ancestor)
    }

    /// Whether the node is reachable from the document root.
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.contains(self.root, node)
    }

    /// Append `child` as the last child of `parent`, moving it out of its previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        let parent_ref = self.node_ref(parent)?.clone();
        if parent_ref.as_element().is_none() && parent_ref.as_document().is_none() {
            return Err(DomError::InvalidParent(parent));
        }
        let child_ref = self.node_ref(child)?.clone();
        if self.contains(child, parent) {
            return Err(DomError::Cycle { parent, child });
        }
        self.detach(child);
        parent_ref.append(child_ref);
        Ok(())
    }

    /// Remove the node from its parent. The subtree stays intact and addressable.
    pub fn detach(&mut self, node: NodeId) {
        if self.parent(node).is_none() {
            return;
        }
        if self.focused.is_some_and(|focused| self.contains(node, focused)) {
            self.focused = None;
        }
        if let Some(node) = self.nodes.get(&node) {
            node.detach();
        }
    }

    /// Detach the node and drop it together with its subtree.
    pub fn remove(&mut self, node: NodeId) {
        self.detach(node);
        self.discard(node);
    }

    /// Detach every child; the detached subtrees stay addressable.
    pub fn remove_children(&mut self, node: NodeId) {
        for child in self.children(node) {
            self.detach(child);
        }
    }

    fn replace_children(&mut self, node: NodeId) {
        for child in self.children(node) {
            self.remove(child);
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        let element = self.nodes.get(&node)?.as_element()?;
        let attributes = element.attributes.borrow();
        attributes.get(name).map(str::to_string)
    }

    fn attribute_name(&self, node: NodeId, name: &str) -> Option<String> {
        match self.namespace(node)? {
            Namespace::Html => Some(name.to_ascii_lowercase()),
            _ => Some(name.to_string()),
        }
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let name = self
            .attribute_name(node, name)
            .ok_or(DomError::MissingNode(node))?;
        if let Some(control) = self.controls.get_mut(&node) {
            match name.as_str() {
                "type" => control.input_type = Some(value.to_ascii_lowercase()),
                "selected" => control.selected = true,
                _ => {}
            }
        }
        if let Some(element) = self.node_ref(node)?.as_element() {
            let mut attributes = element.attributes.borrow_mut();
            match attributes.get_mut(name.as_str()) {
                Some(existing) if existing.as_str() == value => {}
                Some(existing) => *existing = value.to_string(),
                None => {
                    attributes.insert(name.as_str(), value.to_string());
                }
            }
        }
        Ok(())
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<(), DomError> {
        let name = self
            .attribute_name(node, name)
            .ok_or(DomError::MissingNode(node))?;
        if name == "selected" {
            if let Some(control) = self.controls.get_mut(&node) {
                control.selected = false;
            }
        }
        if let Some(element) = self.node_ref(node)?.as_element() {
            element.attributes.borrow_mut().remove(name.as_str());
        }
        Ok(())
    }

    pub fn text_content(&self, node: NodeId) -> String {
        self.nodes
            .get(&node)
            .map(NodeRef::text_contents)
            .unwrap_or_default()
    }

    /// Replace all children with a single text node (or nothing for an empty string).
    ///
    /// A lone text child is rewritten in place.
    pub fn set_text_content(&mut self, node: NodeId, value: &str) -> Result<(), DomError> {
        let target = self.node_ref(node)?.clone();
        if let Some(text) = target.as_text().or_else(|| target.as_comment()) {
            let mut text = text.borrow_mut();
            text.clear();
            text.push_str(value);
            return Ok(());
        }
        if target.as_element().is_none() {
            return Err(DomError::InvalidParent(node));
        }

        if let Some(only) = target.first_child().filter(|child| child.next_sibling().is_none()) {
            if let (Some(text), false) = (only.as_text(), value.is_empty()) {
                let mut text = text.borrow_mut();
                text.clear();
                text.push_str(value);
                return Ok(());
            }
        }

        self.replace_children(node);
        if !value.is_empty() {
            let text = NodeRef::new_text(value);
            self.remember(&text);
            target.append(text);
        }
        Ok(())
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        self.nodes
            .get(&node)
            .map(markup::serialize_children)
            .unwrap_or_default()
    }

    /// Parse `value` in the context of the element and make the result its children.
    pub fn set_inner_html(&mut self, node: NodeId, value: &str) -> Result<(), MarkupError> {
        let target = self
            .nodes
            .get(&node)
            .cloned()
            .ok_or(MarkupError::NotAnElement)?;
        let context = target
            .as_element()
            .map(|element| element.name.clone())
            .ok_or(MarkupError::NotAnElement)?;
        let container = markup::parse_fragment(context, value)?;

        self.replace_children(node);
        let parsed: Vec<NodeRef> = container.children().collect();
        for child in parsed {
            target.append(child.clone());
            self.remember_subtree(&child);
        }
        Ok(())
    }

    /// Whether the element matches a compiled selector list.
    pub fn matches(&self, node: NodeId, selectors: &Selectors) -> bool {
        self.nodes
            .get(&node)
            .and_then(|node| node.clone().into_element_ref())
            .is_some_and(|element| selectors.matches(&element))
    }

    pub fn control(&self, node: NodeId) -> Option<&ControlState> {
        self.controls.get(&node)
    }

    pub fn control_mut(&mut self, node: NodeId) -> Option<&mut ControlState> {
        self.controls.get_mut(&node)
    }

    /// Set the control type, reflected into the `type` attribute.
    pub fn set_input_type(&mut self, node: NodeId, input_type: &str) -> Result<(), DomError> {
        self.set_attribute(node, "type", input_type)
    }

    pub fn set_layout_box(&mut self, node: NodeId, rect: Rect) {
        if self.is_element(node) {
            self.layouts.insert(node, rect);
        }
    }

    /// Layout box reported by the embedder, if any.
    pub fn layout_box(&self, node: NodeId) -> Option<Rect> {
        self.layouts.get(&node).copied()
    }

    pub fn bounding_box(&self, node: NodeId) -> Rect {
        self.layout_box(node).unwrap_or_default()
    }

    pub fn focus(&mut self, node: NodeId) {
        if self.is_element(node) {
            self.focused = Some(node);
        }
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn navigate(&mut self, location: &str) {
        self.location = Some(location.to_string());
    }

    /// First connected element carrying `id="{html_id}"`, in tree order.
    pub fn get_element_by_id(&self, html_id: &str) -> Option<NodeId> {
        let root = self.nodes.get(&self.root)?;
        root.descendants()
            .find(|node| {
                node.as_element()
                    .is_some_and(|element| element.attributes.borrow().get("id") == Some(html_id))
            })
            .and_then(|node| self.handle(&node))
    }

    /// Constraint validation for form controls; non-controls are always valid.
    pub fn is_valid(&self, node: NodeId) -> bool {
        let (Some(name), Some(control)) = (self.tag_name(node), self.control(node)) else {
            return true;
        };
        if !matches!(name, "input" | "select" | "textarea") || control.disabled {
            return true;
        }
        if name == "select" {
            let any_selected = self.children(node).into_iter().any(|child| {
                self.control(child).is_some_and(|option| option.selected)
            });
            return !control.required || any_selected;
        }
        let input_type = control.input_type.as_deref().unwrap_or("text");
        if matches!(input_type, "checkbox" | "radio") {
            return !control.required || control.checked;
        }
        if control.value.is_empty() {
            return !control.required;
        }
        match input_type {
            "number" => control.value.trim().parse::<f64>().is_ok(),
            "date" => chrono::NaiveDate::parse_from_str(&control.value, "%Y-%m-%d").is_ok(),
            "time" => crate::patch::values::parse_time_of_day(&control.value).is_some(),
            _ => true,
        }
    }

    /// Serialize the whole document, doctype included.
    pub fn to_html(&self) -> String {
        self.outer_html(self.root)
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        self.nodes
            .get(&node)
            .map(markup::serialize_node)
            .unwrap_or_default()
    }
}
