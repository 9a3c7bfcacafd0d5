use std::collections::BTreeMap;

use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
};
use axum_extra::extract::{Form, FormRejection};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use mailroom_db::{Database, UnreadableSettings};
use mailroom_types::MailBox;
use mailroom_types::api::{CreateFolderForm, FolderList};

use crate::auth::{ActingUser, AppState};
use crate::error::{ApiError, ApiResult};
use crate::format::{Rendered, render};
use crate::{blocking, parse_mailbox};

const SETTINGS_KEY: &str = "my_messaging_settings";
const FOLDER_KEY: &str = "folder";

// -- Settings blob --

/// User-defined folders of one box, by id. Folder 0 is implicit and only
/// appears here if a legacy blob stored it.
pub fn user_folders(settings: &Value, mailbox: MailBox) -> BTreeMap<u32, String> {
    let pointer = format!("/{}/{}/{}", SETTINGS_KEY, FOLDER_KEY, mailbox);
    match settings.pointer(&pointer) {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(id, name)| Some((id.parse().ok()?, name.as_str()?.to_string())))
            .collect(),
        // Blobs written by the host may store a plain list.
        Some(Value::Array(names)) => names
            .iter()
            .enumerate()
            .filter_map(|(id, name)| Some((u32::try_from(id).ok()?, name.as_str()?.to_string())))
            .collect(),
        _ => BTreeMap::new(),
    }
}

pub fn folder_exists(settings: &Value, mailbox: MailBox, folder: u32) -> bool {
    folder == 0 || user_folders(settings, mailbox).contains_key(&folder)
}

/// Store `name` as a new folder of `mailbox` and return its id. Ids never
/// reuse 0. Every other settings key is left alone.
pub fn append_folder(settings: &mut Value, mailbox: MailBox, name: &str) -> u32 {
    let existing = user_folders(settings, mailbox);
    let id = existing.keys().next_back().map_or(1, |max| max + 1);

    let mut folders: Map<String, Value> = existing
        .into_iter()
        .map(|(id, name)| (id.to_string(), Value::String(name)))
        .collect();
    folders.insert(id.to_string(), Value::String(name.to_string()));

    let mut root = into_object(Some(settings.take()));
    let mut messaging = into_object(root.remove(SETTINGS_KEY));
    let mut boxes = into_object(messaging.remove(FOLDER_KEY));
    boxes.insert(mailbox.to_string(), Value::Object(folders));
    messaging.insert(FOLDER_KEY.to_string(), Value::Object(boxes));
    root.insert(SETTINGS_KEY.to_string(), Value::Object(messaging));
    *settings = Value::Object(root);

    id
}

fn into_object(value: Option<Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Settings for read-only use. An unreadable blob is logged and shows no
/// user folders.
pub(crate) fn read_settings(db: &Database, user_id: &str) -> ApiResult<Value> {
    match db.get_user_settings(user_id) {
        Ok(settings) => Ok(settings.value),
        Err(e) if e.is::<UnreadableSettings>() => {
            warn!("{}, showing default folders only", e);
            Ok(Value::Object(Map::new()))
        }
        Err(e) => Err(e.into()),
    }
}

// -- Validation --

/// Trim and check a requested folder name.
pub fn check_folder_name(raw: &str) -> ApiResult<&str> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::NotAcceptable("No folder name provided".into()));
    }
    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
        return Err(ApiError::NotAcceptable("Invalid folder name provided".into()));
    }
    Ok(name)
}

/// Names are unique per box, the default folder's name included.
pub fn check_unique(name: &str, existing: &BTreeMap<u32, String>, default_name: &str) -> ApiResult<()> {
    if name == default_name || existing.values().any(|n| n == name) {
        return Err(ApiError::Conflict("Duplicate".into()));
    }
    Ok(())
}

// -- Handlers --

/// GET /messages/{box}
pub(crate) async fn list_folders(state: &AppState, user: ActingUser, mailbox: MailBox) -> ApiResult<Rendered> {
    let settings = blocking(state, move |db| read_settings(db, &user.id)).await?;

    let mut folders = user_folders(&settings, mailbox);
    folders.insert(0, state.locale.default_folder_name(mailbox).to_string());

    render(&FolderList { folders })
}

/// POST /messages/{box}
pub async fn create_folder(
    State(state): State<AppState>,
    Extension(user): Extension<ActingUser>,
    Path(target): Path<String>,
    form: Result<Form<CreateFolderForm>, FormRejection>,
) -> ApiResult<StatusCode> {
    let mailbox = parse_mailbox(&target)?;
    // An unreadable body counts as an empty one.
    let form = form.map(|Form(form)| form).unwrap_or_else(|e| {
        warn!("Unreadable folder form: {}", e);
        CreateFolderForm::default()
    });

    let name = check_folder_name(&form.folder)?.to_string();
    let default_name = state.locale.default_folder_name(mailbox);

    let user_id = user.id.clone();
    let folder_name = name.clone();
    let id = blocking(&state, move |db| {
        // Never write over a blob that could not be read.
        let mut settings = db.get_user_settings(&user_id).map_err(|e| {
            if e.is::<UnreadableSettings>() {
                error!("Refusing to update folders: {}", e);
                ApiError::Internal("Could not update folder settings".into())
            } else {
                e.into()
            }
        })?;
        check_unique(&folder_name, &user_folders(&settings.value, mailbox), default_name)?;

        let id = append_folder(&mut settings.value, mailbox, &folder_name);
        db.save_user_settings(&user_id, &settings)?;
        Ok(id)
    })
    .await?;

    info!("User {} created folder {}-{} '{}'", user.id, mailbox, id, name);
    Ok(StatusCode::CREATED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_settings_have_no_folders() {
        assert!(user_folders(&json!({}), MailBox::In).is_empty());
        assert!(folder_exists(&json!({}), MailBox::In, 0));
        assert!(!folder_exists(&json!({}), MailBox::In, 1));
    }

    #[test]
    fn append_starts_at_one_and_keeps_other_keys() {
        let mut settings = json!({ "theme": "dark", "my_messaging_settings": { "signature": "-- a" } });

        assert_eq!(append_folder(&mut settings, MailBox::In, "projects"), 1);
        assert_eq!(append_folder(&mut settings, MailBox::In, "archive"), 2);
        assert_eq!(append_folder(&mut settings, MailBox::Out, "sent2"), 1);

        assert_eq!(settings["theme"], "dark");
        assert_eq!(settings["my_messaging_settings"]["signature"], "-- a");
        assert_eq!(
            user_folders(&settings, MailBox::In),
            BTreeMap::from([(1, "projects".to_string()), (2, "archive".to_string())])
        );
        assert!(folder_exists(&settings, MailBox::Out, 1));
        assert!(!folder_exists(&settings, MailBox::Out, 2));
    }

    #[test]
    fn legacy_list_blobs_are_read() {
        let mut settings = json!({ "my_messaging_settings": { "folder": { "in": ["", "old"] } } });
        assert_eq!(user_folders(&settings, MailBox::In).get(&1).map(String::as_str), Some("old"));
        assert_eq!(append_folder(&mut settings, MailBox::In, "new"), 2);
    }

    #[test]
    fn names_are_validated() {
        assert_eq!(check_folder_name("  projects2 ").unwrap(), "projects2");
        assert!(matches!(check_folder_name("   "), Err(ApiError::NotAcceptable(r)) if r == "No folder name provided"));
        for bad in ["Projects", "my folder", "über", "a-b"] {
            assert!(
                matches!(check_folder_name(bad), Err(ApiError::NotAcceptable(r)) if r == "Invalid folder name provided"),
                "{bad}"
            );
        }
    }

    #[test]
    fn duplicates_are_case_sensitive() {
        let existing = BTreeMap::from([(1, "projects".to_string())]);
        assert!(matches!(check_unique("projects", &existing, "Inbox"), Err(ApiError::Conflict(_))));
        assert!(matches!(check_unique("Inbox", &existing, "Inbox"), Err(ApiError::Conflict(_))));
        assert!(check_unique("inbox", &existing, "Inbox").is_ok());
    }
}
