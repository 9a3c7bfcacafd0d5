//! Per-user settings blobs (`user_data.val`).
//!
//! The host system stores them PHP-serialized, usually as Windows-1252.
//! JSON blobs are accepted as well. A blob is written back in the format and
//! charset it was read in, so keys this service does not know survive.

use anyhow::Result;
use serde_json::{Map, Value};
use thiserror::Error;

use mailroom_types::{charset, php};

/// The stored blob could not be parsed. Callers must not write over it.
#[derive(Debug, Error)]
#[error("settings blob of user {user_id} is unreadable: {reason}")]
pub struct UnreadableSettings {
    pub user_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlobFormat {
    #[default]
    PhpWindows1252,
    PhpUtf8,
    Json,
}

/// A user's parsed settings plus how they were stored.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSettings {
    pub value: Value,
    pub format: BlobFormat,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

impl UserSettings {
    /// Settings without a stored blob behind them. Saved in the host's format.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            format: BlobFormat::default(),
        }
    }

    /// Parse a stored blob. An empty blob or a serialized null is an empty
    /// settings object; anything but an object is unreadable.
    pub fn parse(raw: &[u8]) -> std::result::Result<Self, String> {
        let trimmed = raw.trim_ascii();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let (value, format) = if trimmed.starts_with(b"{") {
            let value: Value = serde_json::from_slice(trimmed).map_err(|e| e.to_string())?;
            (value, BlobFormat::Json)
        } else {
            let value = php::unserialize(trimmed).map_err(|e| e.to_string())?;
            let format = match std::str::from_utf8(trimmed) {
                Ok(_) => BlobFormat::PhpUtf8,
                Err(_) => BlobFormat::PhpWindows1252,
            };
            (value, format)
        };

        match value {
            Value::Object(_) => Ok(Self { value, format }),
            Value::Null => Ok(Self {
                value: Value::Object(Map::new()),
                format,
            }),
            other => Err(format!("expected an array, found {}", kind(&other))),
        }
    }

    /// Bytes to store, in the blob's original format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(match self.format {
            BlobFormat::Json => serde_json::to_vec(&self.value)?,
            BlobFormat::PhpUtf8 => php::serialize_utf8(&self.value).into_bytes(),
            BlobFormat::PhpWindows1252 => charset::encode(&php::serialize(&self.value)),
        })
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
