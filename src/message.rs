//! Dialogue messages and batches.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::viseme::LipSyncTimeline;

/// Field of a wrapper object that holds the message array.
pub const MESSAGES_FIELD: &str = "messages";

/// One line of dialogue.
///
/// `facialExpression`, `animation` and any unrecognised fields belong to the
/// caller and are passed through untouched. `audio` and `lipsync` are set
/// together by enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Position in the batch. Assigned by [`MessageBatch`].
    #[serde(skip)]
    pub index: usize,
    /// Text to speak.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    /// Caller metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facial_expression: Option<Value>,
    /// Caller metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<Value>,
    /// Base64 of the synthesized audio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    /// Viseme timeline for `audio`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lipsync: Option<LipSyncTimeline>,
    /// Any other fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Message with only text set.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Read one batch element, keeping what can be kept when it is not a
    /// well-formed message.
    ///
    /// An object with a non-string `text` keeps that value among its extra
    /// fields and gets blank text. Any other non-object becomes an empty
    /// placeholder. Blank text is never synthesized, so placeholders stay
    /// unenriched and are reported as failures at their own position.
    fn from_element(position: usize, item: Value) -> Self {
        if let Ok(message) = Self::deserialize(&item) {
            return message;
        }
        let Value::Object(mut fields) = item else {
            warn!(position, kind = json_kind(&item), "element is not a message object; keeping empty placeholder");
            return Self::default();
        };

        // Produced by enrichment; rebuilt on every run.
        fields.remove("audio");
        fields.remove("lipsync");
        let mut message = Self {
            facial_expression: fields.remove("facialExpression"),
            animation: fields.remove("animation"),
            ..Self::default()
        };
        match fields.remove("text") {
            Some(Value::String(text)) => message.text = text,
            Some(other) => {
                warn!(position, kind = json_kind(&other), "message text is not a string; keeping as placeholder");
                fields.insert("text".to_owned(), other);
            }
            None => {}
        }
        message.extra = fields;
        message
    }

    /// Returns true once both `audio` and `lipsync` are present.
    pub fn is_enriched(&self) -> bool {
        self.audio.is_some() && self.lipsync.is_some()
    }
}

/// Ordered batch of messages with indices fixed at construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageBatch {
    messages: Vec<Message>,
}

impl MessageBatch {
    /// Build a batch, assigning each message its position as `index`.
    pub fn new(messages: Vec<Message>) -> Self {
        let messages = messages
            .into_iter()
            .enumerate()
            .map(|(index, mut message)| {
                message.index = index;
                message
            })
            .collect();
        Self { messages }
    }

    /// Batch of text-only messages.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        texts.into_iter().map(Message::new).collect()
    }

    /// Read a batch from loosely-shaped JSON.
    ///
    /// Accepts an array of messages or an object with a `messages` array.
    /// Anything else yields an empty batch. Every element keeps its position;
    /// elements that cannot be read as a message become unenriched
    /// placeholders.
    pub fn from_json(value: Value) -> Self {
        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove(MESSAGES_FIELD) {
                Some(Value::Array(items)) => items,
                _ => {
                    warn!("input object has no '{MESSAGES_FIELD}' array; treating as empty batch");
                    Vec::new()
                }
            },
            other => {
                warn!(kind = json_kind(&other), "input is not a message sequence; treating as empty batch");
                Vec::new()
            }
        };

        items
            .into_iter()
            .enumerate()
            .map(|(position, item)| Message::from_element(position, item))
            .collect()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the batch has no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages in index order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Consume the batch.
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

impl FromIterator<Message> for MessageBatch {
    fn from_iter<T: IntoIterator<Item = Message>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
