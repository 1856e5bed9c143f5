use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::dom::Rect;
use crate::patch::values::FieldValue;
use crate::registry::NodeKey;

/// Rounded bounding box reported by `M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxMetrics {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl From<Rect> for BoxMetrics {
    fn from(rect: Rect) -> Self {
        Self {
            x: rect.x.round() as i64,
            y: rect.y.round() as i64,
            width: rect.width.round() as i64,
            height: rect.height.round() as i64,
        }
    }
}

/// Client-to-server command, tagged by `C`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "C")]
pub enum Command {
    #[serde(rename = "UP")]
    Up,
    #[serde(rename = "REFRESH")]
    Refresh,
    #[serde(rename = "CLICK")]
    Click { method: String, oid: NodeKey },
    #[serde(rename = "CHANGE")]
    Change {
        method: String,
        oid: NodeKey,
        x: FieldValue,
    },
    #[serde(rename = "B")]
    BindValue { v: String, oid: NodeKey, x: FieldValue },
    #[serde(rename = "DD")]
    DragStart {
        method: String,
        oid: NodeKey,
        x: f64,
        y: f64,
        button: i16,
    },
    #[serde(rename = "DM")]
    DragMove { x: f64, y: f64 },
    #[serde(rename = "DU")]
    DragStop { x: f64, y: f64 },
    #[serde(rename = "SELECT")]
    Select {
        method: String,
        oid: NodeKey,
        opts: Vec<NodeKey>,
    },
    #[serde(rename = "V")]
    Value {
        oid: NodeKey,
        value: Option<FieldValue>,
    },
    #[serde(rename = "KEY")]
    Key {
        method: String,
        oid: NodeKey,
        key: String,
    },
    #[serde(rename = "CALL")]
    Call {
        oid: NodeKey,
        method: String,
        args: Vec<JsonValue>,
    },
    #[serde(rename = "M")]
    Metrics {
        oid: NodeKey,
        #[serde(rename = "box")]
        bounds: BoxMetrics,
    },
    #[serde(rename = "VALID")]
    Validity { oid: NodeKey, validity: bool },
}

impl Command {
    /// Commands caused by user interaction; each keeps the busy indicator up until the
    /// server answers with `0`.
    pub fn is_interaction(&self) -> bool {
        !matches!(
            self,
            Command::Up
                | Command::Refresh
                | Command::Value { .. }
                | Command::Metrics { .. }
                | Command::Validity { .. }
                | Command::DragMove { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commands_use_wire_tags() {
        let click = Command::Click {
            method: "save".into(),
            oid: NodeKey::Int(2),
        };
        assert_eq!(
            serde_json::to_value(&click).unwrap(),
            json!({"C": "CLICK", "method": "save", "oid": 2})
        );
        assert_eq!(serde_json::to_value(Command::Up).unwrap(), json!({"C": "UP"}));
    }

    #[test]
    fn metrics_round_the_box() {
        let metrics = Command::Metrics {
            oid: NodeKey::from("panel"),
            bounds: Rect::new(1.4, 2.6, 100.5, 20.2).into(),
        };
        assert_eq!(
            serde_json::to_value(&metrics).unwrap(),
            json!({"C": "M", "oid": "panel", "box": {"x": 1, "y": 3, "width": 101, "height": 20}})
        );
    }
}
