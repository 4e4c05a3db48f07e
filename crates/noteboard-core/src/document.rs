//! Opaque structured-document values carried by tiles.
//!
//! The editor owns the document shape. The core only stores, compares and
//! forwards it, and asks whether it is empty when picking default content.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A rich-text document as produced by the external editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RichDoc(Value);

impl RichDoc {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// A single-paragraph document holding plain text.
    pub fn plain_text(text: &str) -> Self {
        if text.is_empty() {
            return Self(json!({ "type": "doc", "content": [] }));
        }
        Self(json!({
            "type": "doc",
            "content": [
                { "type": "paragraph", "content": [ { "type": "text", "text": text } ] }
            ]
        }))
    }

    /// True for null, empty containers, empty strings, and editor documents
    /// whose `content` holds nothing but empty nodes.
    pub fn is_empty(&self) -> bool {
        value_is_empty(&self.0)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for RichDoc {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

fn value_is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.iter().all(value_is_empty),
        Value::Object(map) => {
            if let Some(text) = map.get("text") {
                return value_is_empty(text);
            }
            match map.get("content") {
                Some(content) => value_is_empty(content),
                // Leaf nodes such as images carry meaning without text.
                None => {
                    map.is_empty()
                        || matches!(
                            map.get("type").and_then(Value::as_str),
                            Some("doc" | "paragraph" | "heading" | "hardBreak")
                        )
                }
            }
        }
        Value::Bool(_) | Value::Number(_) => false,
    }
}
