use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::patch::PatchRecord;
use crate::registry::NodeKey;

/// Server-to-client message, tagged by `m`. The payload usually lives under `l`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "m")]
pub enum Message {
    #[serde(rename = "c")]
    ReplaceContent {
        #[serde(rename = "l", default)]
        patches: Vec<PatchRecord>,
    },
    #[serde(rename = "u")]
    Update {
        #[serde(rename = "l", default)]
        patches: Vec<PatchRecord>,
    },
    #[serde(rename = "0")]
    Done,
    #[serde(rename = "e")]
    Error {
        #[serde(rename = "l", default)]
        payload: JsonValue,
    },
    #[serde(rename = "log")]
    Log {
        #[serde(rename = "l", default)]
        payload: JsonValue,
    },
    #[serde(rename = "d")]
    Remove {
        #[serde(rename = "l", default)]
        ids: Vec<NodeKey>,
    },
    #[serde(rename = "m")]
    Measure {
        #[serde(rename = "l")]
        id: NodeKey,
    },
    #[serde(rename = "v")]
    ReadValue {
        #[serde(rename = "l")]
        id: NodeKey,
        /// Overrides the control's own input type.
        #[serde(rename = "t", default)]
        type_hint: Option<String>,
    },
    #[serde(rename = "dm")]
    DragMode,
    #[serde(rename = "call")]
    Call {
        method: String,
        #[serde(default)]
        args: Vec<JsonValue>,
    },
    #[serde(rename = "rst")]
    Reset,
    #[serde(rename = "recon")]
    Reconnect,
    #[serde(rename = "app")]
    Navigate {
        #[serde(rename = "l")]
        location: String,
    },
    #[serde(rename = "title")]
    Title {
        #[serde(rename = "l")]
        title: String,
    },
    #[serde(rename = "valid")]
    CheckValidity {
        #[serde(rename = "l")]
        id: NodeKey,
    },
    #[serde(rename = "koff")]
    KeysOff,
    #[serde(rename = "kon")]
    KeysOn,
    #[serde(other)]
    Unknown,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::ReplaceContent { .. } => "c",
            Message::Update { .. } => "u",
            Message::Done => "0",
            Message::Error { .. } => "e",
            Message::Log { .. } => "log",
            Message::Remove { .. } => "d",
            Message::Measure { .. } => "m",
            Message::ReadValue { .. } => "v",
            Message::DragMode => "dm",
            Message::Call { .. } => "call",
            Message::Reset => "rst",
            Message::Reconnect => "recon",
            Message::Navigate { .. } => "app",
            Message::Title { .. } => "title",
            Message::CheckValidity { .. } => "valid",
            Message::KeysOff => "koff",
            Message::KeysOn => "kon",
            Message::Unknown => "?",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_short_tags() {
        let message: Message = serde_json::from_str(r#"{"m":"v","l":4,"t":"number"}"#).unwrap();
        assert_eq!(
            message,
            Message::ReadValue {
                id: NodeKey::Int(4),
                type_hint: Some("number".into())
            }
        );
        let message: Message = serde_json::from_str(r#"{"m":"d","l":[1,"two"]}"#).unwrap();
        assert_eq!(
            message,
            Message::Remove {
                ids: vec![NodeKey::Int(1), NodeKey::from("two")]
            }
        );
    }

    #[test]
    fn unknown_kinds_are_tolerated() {
        let message: Message = serde_json::from_str(r#"{"m":"zz","l":1}"#).unwrap();
        assert_eq!(message, Message::Unknown);
    }
}
