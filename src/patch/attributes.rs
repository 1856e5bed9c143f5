use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::values::format_number;

pub const EVENT_PREFIX: &str = "on:";
pub const BIND_VALUE: &str = "bind:value";

/// Attribute value as sent by the server. Falsy values remove the attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl AttrValue {
    pub fn is_truthy(&self) -> bool {
        match self {
            AttrValue::Flag(value) => *value,
            AttrValue::Number(value) => *value != 0.0 && !value.is_nan(),
            AttrValue::Text(value) => !value.is_empty(),
        }
    }

    pub fn to_attr_string(&self) -> String {
        match self {
            AttrValue::Flag(value) => value.to_string(),
            AttrValue::Number(value) => format_number(*value),
            AttrValue::Text(value) => value.clone(),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

/// Attribute map that keeps the order the server wrote the keys in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(Vec<(String, Option<AttrValue>)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.0.push((name.to_string(), Some(value.into())));
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| value.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&AttrValue>)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_ref()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Attributes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = Attributes;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an attribute map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, Option<AttrValue>>()? {
                    entries.push((key, value));
                }
                Ok(Attributes(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanProperty {
    Checked,
    Required,
    Disabled,
}

/// Static classification of an attribute key, evaluated once per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind<'a> {
    /// `on:*` key; carries the full event code, prefix included.
    Event(&'a str),
    BindValue,
    Property(BooleanProperty),
    Plain,
}

impl<'a> AttributeKind<'a> {
    pub fn classify(name: &'a str) -> Self {
        match name {
            BIND_VALUE => AttributeKind::BindValue,
            "checked" => AttributeKind::Property(BooleanProperty::Checked),
            "required" => AttributeKind::Property(BooleanProperty::Required),
            "disabled" => AttributeKind::Property(BooleanProperty::Disabled),
            _ if name.starts_with(EVENT_PREFIX) => AttributeKind::Event(name),
            _ => AttributeKind::Plain,
        }
    }
}
