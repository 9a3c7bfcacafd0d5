use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// -- Token claims --

/// Bearer token claims. `sub` is the host system's user id and becomes the
/// acting user for the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Folders --

/// Form body of `POST /messages/{box}`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateFolderForm {
    #[serde(default)]
    pub folder: String,
}

#[derive(Debug, Serialize)]
pub struct FolderList {
    pub folders: BTreeMap<u32, String>,
}

// -- Messages --

/// Form body of `POST /messages`. `user_id` may be repeated.
#[derive(Debug, Default, Deserialize)]
pub struct SendMessageForm {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "user_id[]")]
    pub user_id: Vec<String>,
}

/// A message as seen by one participant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRecord {
    pub message_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub subject: String,
    pub message: String,
    pub mkdate: i64,
    pub priority: String,
    /// 1 while unread, 0 once read.
    pub unread: u8,
}

#[derive(Debug, Serialize)]
pub struct FolderContents {
    pub messages: Vec<MessageRecord>,
    pub users: BTreeMap<String, UserProfile>,
}

// -- Users --

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub perms: String,
    pub forename: String,
    pub lastname: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct UserEnvelope {
    pub user: UserProfile,
}
