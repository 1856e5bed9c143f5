use serde::{Deserialize, Serialize};

use super::attributes::Attributes;
use super::values::FieldValue;
use crate::registry::NodeKey;

/// One unit of server-authored tree mutation, discriminated by `k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "k")]
pub enum PatchRecord {
    #[serde(rename = "h")]
    Element(ElementPatch),
    #[serde(rename = "t")]
    Text(TextPatch),
    #[serde(rename = "d")]
    Stub(StubPatch),
    #[serde(rename = "s")]
    Script(ScriptPatch),
    #[serde(rename = "e")]
    Events(EventDeclaration),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementPatch {
    #[serde(rename = "i")]
    pub id: NodeKey,
    #[serde(rename = "p", default)]
    pub parent: Option<NodeKey>,
    #[serde(rename = "n")]
    pub tag: String,
    #[serde(rename = "x", default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<u8>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(rename = "a", default)]
    pub attributes: Attributes,
    #[serde(rename = "$", default, skip_serializing_if = "Option::is_none")]
    pub default_class: Option<String>,
    #[serde(rename = "C", default, skip_serializing_if = "Option::is_none")]
    pub custom_class: Option<String>,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Inner markup; takes precedence over `text`.
    #[serde(rename = "T", default, skip_serializing_if = "Option::is_none")]
    pub markup: Option<String>,
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
    #[serde(rename = "l", default)]
    pub localized: bool,
    #[serde(rename = "f", default)]
    pub focus: bool,
    #[serde(rename = "#", default)]
    pub reposition: bool,
}

impl ElementPatch {
    pub fn new(id: impl Into<NodeKey>, parent: Option<NodeKey>, tag: &str) -> Self {
        Self {
            id: id.into(),
            parent,
            tag: tag.to_string(),
            namespace: None,
            input_type: None,
            attributes: Attributes::new(),
            default_class: None,
            custom_class: None,
            style: None,
            markup: None,
            text: None,
            value: None,
            localized: false,
            focus: false,
            reposition: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPatch {
    #[serde(rename = "i")]
    pub id: NodeKey,
    #[serde(rename = "p", default)]
    pub parent: Option<NodeKey>,
    #[serde(rename = "t", default)]
    pub text: String,
    #[serde(rename = "#", default)]
    pub reposition: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StubPatch {
    #[serde(rename = "i")]
    pub id: NodeKey,
    #[serde(rename = "p", default)]
    pub parent: Option<NodeKey>,
    #[serde(rename = "$", default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptPatch {
    #[serde(rename = "i")]
    pub id: NodeKey,
    #[serde(rename = "p", default)]
    pub parent: Option<NodeKey>,
    #[serde(rename = "u")]
    pub uid: String,
    #[serde(rename = "a", default)]
    pub attributes: Attributes,
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Delegated event registrations; never materialized as a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDeclaration {
    #[serde(rename = "ctx", default)]
    pub context: String,
    #[serde(rename = "a", default)]
    pub attributes: Attributes,
    #[serde(rename = "oid", default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<NodeKey>,
}
