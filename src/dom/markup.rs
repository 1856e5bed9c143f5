use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::QualName;
use kuchiki::traits::*;
use kuchiki::NodeRef;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarkupError {
    #[error("inner markup can only be set on elements")]
    NotAnElement,
    #[error("fragment parser produced no container element")]
    MissingContainer,
}

/// Parse an `innerHTML` payload as the content of an element named `context`.
///
/// Returns the parser's container; its children are the fragment. The context decides
/// the insertion mode, so `<tr>` survives under a `tbody` and is dropped under a `div`.
pub fn parse_fragment(context: QualName, markup: &str) -> Result<NodeRef, MarkupError> {
    let parsed = kuchiki::parse_fragment(context, Vec::new()).one(markup);
    parsed
        .first_child()
        .filter(|container| container.as_element().is_some())
        .ok_or(MarkupError::MissingContainer)
}

pub(crate) fn serialize_children(node: &NodeRef) -> String {
    let context = node.as_element().map(|element| element.name.clone());
    write(node, TraversalScope::ChildrenOnly(context))
}

pub(crate) fn serialize_node(node: &NodeRef) -> String {
    write(node, TraversalScope::IncludeNode)
}

fn write(node: &NodeRef, traversal_scope: TraversalScope) -> String {
    let mut output = Vec::new();
    let opts = SerializeOpts {
        traversal_scope,
        ..Default::default()
    };
    if let Err(err) = serialize(&mut output, node, opts) {
        warn!(target = "patch", error = %err, "failed to serialize node");
    }
    String::from_utf8_lossy(&output).into_owned()
}
