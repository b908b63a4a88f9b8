//! Send request carried by a queue item.
//!
//! The processor treats the payload as opaque apart from [`SendPayload::is_valid`].
//! [`SendPayload::from_raw`] is the producer-side sanitiser for untrusted JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Descriptor of a file to attach. At least one of `filename` / `url` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: Option<String>,
    pub name: Option<String>,
    pub size: Option<u64>,
    pub url: Option<String>,
}

impl Attachment {
    /// Normalise one untrusted attachment descriptor.
    ///
    /// Descriptors with neither a filename (or name) nor a url are dropped.
    pub fn from_raw(raw: &Value) -> Option<Self> {
        let obj = raw.as_object()?;
        let filename = non_empty_str(obj.get("filename")).or_else(|| non_empty_str(obj.get("name")));
        let url = non_empty_str(obj.get("url"));
        if filename.is_none() && url.is_none() {
            return None;
        }
        Some(Self {
            name: non_empty_str(obj.get("name")).or_else(|| filename.clone()),
            size: obj.get("size").and_then(Value::as_u64),
            filename,
            url,
        })
    }
}

/// A message send request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    #[serde(default)]
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// Record the message without delivering it; interpreted by the executor.
    #[serde(default)]
    pub record_only: bool,
}

impl SendPayload {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Destination, subject and body must all be non-empty.
    ///
    /// Fields are checked as stored. Addresses are already trimmed by
    /// [`SendPayload::from_raw`]; subject and body are not, so a
    /// whitespace-only subject counts as present.
    pub fn is_valid(&self) -> bool {
        !self.to.is_empty() && !self.subject.is_empty() && !self.body.is_empty()
    }

    /// Build a payload from untrusted JSON, keeping only known fields.
    ///
    /// Addresses are stringified and trimmed, subject/body are kept only when
    /// they are strings, metadata only when it is an object. Anything that is
    /// not an object yields an empty (invalid) payload.
    pub fn from_raw(raw: &Value) -> Self {
        let Some(obj) = raw.as_object() else {
            return Self::default();
        };

        let attachments = obj
            .get("attachments")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Attachment::from_raw).collect())
            .unwrap_or_default();

        Self {
            to: address(obj.get("to")).unwrap_or_default(),
            from: address(obj.get("from")),
            subject: obj.get("subject").and_then(Value::as_str).unwrap_or_default().to_string(),
            body: obj.get("body").and_then(Value::as_str).unwrap_or_default().to_string(),
            cc: address(obj.get("cc")),
            bcc: address(obj.get("bcc")),
            reply_to: address(obj.get("replyTo")),
            attachments,
            metadata: obj.get("metadata").and_then(Value::as_object).cloned(),
            record_only: obj.get("recordOnly").is_some_and(truthy),
        }
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Falsy values are dropped; everything else is stringified and trimmed.
/// A list of recipients becomes a comma-separated string.
fn address(value: Option<&Value>) -> Option<String> {
    let value = value.filter(|v| truthy(v))?;
    Some(display_text(value).trim().to_string())
}

fn display_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display_text).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_string(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
