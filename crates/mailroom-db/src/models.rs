//! Database row types, mapping directly to host rows.
//! Distinct from mailroom-types API models to keep the DB layer independent.

use mailroom_types::charset;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};

pub struct UserRow {
    pub user_id: String,
    pub username: String,
    pub perms: String,
    pub forename: String,
    pub lastname: String,
    pub email: String,
}

/// A message joined with the acting user's delivery row and the
/// counterpart's delivery row.
pub struct MessageRow {
    pub message_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub subject: String,
    pub message: String,
    pub mkdate: i64,
    pub priority: String,
    pub unread: bool,
    pub folder: u32,
    pub snd_rec: String,
    pub dont_delete: bool,
}

/// Text column that may hold legacy Windows-1252 bytes. NULL reads as empty.
pub struct LegacyText(pub String);

impl FromSql for LegacyText {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                Ok(LegacyText(charset::decode(bytes).into_owned()))
            }
            ValueRef::Null => Ok(LegacyText(String::new())),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

impl From<LegacyText> for String {
    fn from(text: LegacyText) -> Self {
        text.0
    }
}

/// Text column read as raw bytes, for blobs that carry their own encoding.
/// NULL reads as empty.
pub struct RawBytes(pub Vec<u8>);

impl FromSql for RawBytes {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => Ok(RawBytes(bytes.to_vec())),
            ValueRef::Null => Ok(RawBytes(Vec::new())),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}
