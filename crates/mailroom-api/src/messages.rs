use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::{Form, FormRejection};
use md5::{Digest, Md5};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use mailroom_db::NewMessage;
use mailroom_db::models::MessageRow;
use mailroom_types::MailBox;
use mailroom_types::api::{FolderContents, MessageRecord, SendMessageForm};

use crate::auth::{ActingUser, AppState};
use crate::error::{ApiError, ApiResult};
use crate::format::{Rendered, render};
use crate::{blocking, folders, markup, parse_mailbox, users};

fn message_not_found(message_id: &str) -> ApiError {
    ApiError::NotFound(format!("Message {} not found", message_id))
}

fn folder_not_found(mailbox: MailBox, folder: impl std::fmt::Display) -> ApiError {
    ApiError::NotFound(format!("Folder {}-{} not found", mailbox, folder))
}

/// Folder ids in paths are plain decimal numbers; anything else matches no folder.
fn parse_folder(mailbox: MailBox, raw: &str) -> ApiResult<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(folder_not_found(mailbox, raw));
    }
    raw.parse().map_err(|_| folder_not_found(mailbox, raw))
}

fn record_from_row(row: MessageRow) -> MessageRecord {
    MessageRecord {
        message: markup::format_ready(&row.message),
        message_id: row.message_id,
        sender_id: row.sender_id,
        receiver_id: row.receiver_id,
        subject: row.subject,
        mkdate: row.mkdate,
        priority: row.priority,
        unread: u8::from(row.unread),
    }
}

/// Message ids in the format the host system uses: 32 lowercase hex chars.
fn new_message_id() -> String {
    let seed = format!(
        "message{}{}",
        Uuid::new_v4(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    );
    hex::encode(Md5::digest(seed.as_bytes()))
}

async fn find_message(state: &AppState, user: &ActingUser, message_id: String) -> ApiResult<MessageRow> {
    let user_id = user.id.clone();
    blocking(state, move |db| {
        db.load_message(&user_id, &message_id)?
            .ok_or_else(|| message_not_found(&message_id))
    })
    .await
}

/// GET /messages/{target}: folder list for `in`/`out`, otherwise a single message.
pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<ActingUser>,
    Path(target): Path<String>,
) -> ApiResult<Rendered> {
    match target.parse::<MailBox>() {
        Ok(mailbox) => folders::list_folders(&state, user, mailbox).await,
        Err(_) => {
            let row = find_message(&state, &user, target).await?;
            render(&record_from_row(row))
        }
    }
}

/// GET /messages/{box}/{folder}
pub async fn list_folder(
    State(state): State<AppState>,
    Extension(user): Extension<ActingUser>,
    Path((target, folder)): Path<(String, String)>,
) -> ApiResult<Rendered> {
    let mailbox = parse_mailbox(&target)?;
    let folder = parse_folder(mailbox, &folder)?;

    let contents = blocking(&state, move |db| {
        let settings = folders::read_settings(db, &user.id)?;
        if !folders::folder_exists(&settings, mailbox, folder) {
            return Err(folder_not_found(mailbox, folder));
        }

        let ids = db.folder_message_ids(&user.id, mailbox, folder)?;
        let messages: Vec<MessageRecord> = db
            .load_messages(&user.id, mailbox, &ids)?
            .into_iter()
            .map(record_from_row)
            .collect();
        let users = users::resolve_participants(db, &messages)?;

        Ok(FolderContents { messages, users })
    })
    .await?;

    render(&contents)
}

/// POST /messages
pub async fn create_message(
    State(state): State<AppState>,
    Extension(user): Extension<ActingUser>,
    form: Result<Form<SendMessageForm>, FormRejection>,
) -> ApiResult<Response> {
    if !state.allow_message_creation {
        debug!("Message creation is disabled, rejecting request from {}", user.id);
        return Err(ApiError::BadRequest);
    }

    // An unreadable body counts as an empty one.
    let form = form.map(|Form(form)| form).unwrap_or_else(|e| {
        warn!("Unreadable message form: {}", e);
        SendMessageForm::default()
    });

    let subject = form.subject.trim().to_string();
    if subject.is_empty() {
        return Err(ApiError::NotAcceptable("No subject provided".into()));
    }
    let body = form.message.trim().to_string();
    if body.is_empty() {
        return Err(ApiError::NotAcceptable("No message provided".into()));
    }
    let receivers: Vec<String> = form
        .user_id
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    if receivers.is_empty() {
        return Err(ApiError::NotAcceptable("No receiver provided".into()));
    }

    let author_id = user.id.clone();
    let record = blocking(&state, move |db| {
        for id in &receivers {
            if db.get_user(id)?.is_none() {
                return Err(ApiError::NotFound(format!("Receiver user id {} not found", id)));
            }
        }

        let message = NewMessage {
            message_id: new_message_id(),
            author_id,
            subject,
            body,
            mkdate: chrono::Utc::now().timestamp(),
            priority: "normal".to_string(),
            receivers,
        };

        db.insert_message(&message).map_err(|e| {
            error!("Failed to insert message {}: {}", message.message_id, e);
            ApiError::Internal("Could not create message".into())
        })?;

        let row = db
            .load_message(&message.author_id, &message.message_id)?
            .ok_or_else(|| ApiError::Internal("Could not create message".into()))?;
        Ok(record_from_row(row))
    })
    .await?;

    info!("User {} sent message {}", user.id, record.message_id);
    Ok((StatusCode::CREATED, render(&record)?).into_response())
}

/// DELETE /messages/{message_id}
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(user): Extension<ActingUser>,
    Path(message_id): Path<String>,
) -> ApiResult<StatusCode> {
    let row = find_message(&state, &user, message_id.clone()).await?;
    if row.dont_delete {
        return Err(ApiError::Forbidden("Message shall not be deleted".into()));
    }

    let user_id = user.id.clone();
    let id = message_id.clone();
    let deleted = blocking(&state, move |db| Ok(db.delete_message(&user_id, &id)?)).await?;
    if !deleted {
        return Err(message_not_found(&message_id));
    }

    info!("User {} deleted message {}", user.id, message_id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /messages/{message_id}/read
///
/// Answers with the message as it was before, then flags it read in the
/// background. A failed update is only logged.
pub async fn read_message(
    State(state): State<AppState>,
    Extension(user): Extension<ActingUser>,
    Path(message_id): Path<String>,
) -> ApiResult<Rendered> {
    let row = find_message(&state, &user, message_id.clone()).await?;
    let rendered = render(&record_from_row(row))?;

    let db = state.clone();
    tokio::spawn(async move {
        let user_id = user.id;
        let id = message_id.clone();
        let result = tokio::task::spawn_blocking(move || db.db.mark_read(&user_id, &id)).await;
        match result {
            Ok(Ok(_)) => debug!("Message {} marked read", message_id),
            Ok(Err(e)) => warn!("Failed to mark message {} read: {}", message_id, e),
            Err(e) => error!("spawn_blocking join error: {}", e),
        }
    });

    Ok(rendered)
}

/// POST /messages/{message_id}/move/{folder}
///
/// The target folder must exist in the box the message is filed under for
/// the acting user. A message sent to oneself is filed in both boxes; the
/// first copy whose box has the folder is moved, the inbox copy first.
pub async fn move_message(
    State(state): State<AppState>,
    Extension(user): Extension<ActingUser>,
    Path((message_id, folder)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let user_id = user.id.clone();
    let id = message_id.clone();
    let (mailbox, folder) = blocking(&state, move |db| {
        let boxes: Vec<MailBox> = db
            .load_deliveries(&user_id, &id)?
            .iter()
            .filter_map(|row| {
                let mailbox = MailBox::from_direction(&row.snd_rec);
                if mailbox.is_none() {
                    warn!("Message {} has unknown direction '{}'", id, row.snd_rec);
                }
                mailbox
            })
            .collect();
        let Some(&first) = boxes.first() else {
            return Err(message_not_found(&id));
        };
        let folder = parse_folder(first, &folder)?;

        let settings = folders::read_settings(db, &user_id)?;
        let Some(&mailbox) = boxes
            .iter()
            .find(|&&mailbox| folders::folder_exists(&settings, mailbox, folder))
        else {
            return Err(folder_not_found(first, folder));
        };

        if !db.move_message(&user_id, &id, mailbox, folder)? {
            return Err(message_not_found(&id));
        }
        Ok((mailbox, folder))
    })
    .await?;

    info!("User {} moved message {} to {}-{}", user.id, message_id, mailbox, folder);
    Ok(StatusCode::NO_CONTENT)
}
