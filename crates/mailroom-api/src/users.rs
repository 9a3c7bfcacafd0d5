use std::collections::BTreeMap;

use axum::{
    Extension,
    extract::{Path, State},
};

use mailroom_db::Database;
use mailroom_db::models::UserRow;
use mailroom_types::api::{MessageRecord, UserEnvelope, UserProfile};

use crate::auth::{ActingUser, AppState};
use crate::blocking;
use crate::error::{ApiError, ApiResult};
use crate::format::{Rendered, render};

fn profile_from_row(row: UserRow) -> UserProfile {
    UserProfile {
        user_id: row.user_id,
        username: row.username,
        perms: row.perms,
        forename: row.forename,
        lastname: row.lastname,
        email: row.email,
    }
}

/// Resolve a user id to its display profile.
pub fn lookup(db: &Database, user_id: &str) -> anyhow::Result<Option<UserProfile>> {
    Ok(db.get_user(user_id)?.map(profile_from_row))
}

/// Profiles of every sender and receiver in `messages`, each looked up once.
/// Ids without a user record are left out.
pub fn resolve_participants(db: &Database, messages: &[MessageRecord]) -> anyhow::Result<BTreeMap<String, UserProfile>> {
    let mut users = BTreeMap::new();
    let mut missing = Vec::new();

    for id in messages.iter().flat_map(|m| [&m.sender_id, &m.receiver_id]) {
        if users.contains_key(id) || missing.contains(&id) {
            continue;
        }
        match lookup(db, id)? {
            Some(profile) => {
                users.insert(id.clone(), profile);
            }
            None => missing.push(id),
        }
    }

    Ok(users)
}

async fn show_user(state: &AppState, user_id: String) -> ApiResult<Rendered> {
    let profile = blocking(state, move |db| {
        lookup(db, &user_id)?.ok_or_else(|| ApiError::NotFound(format!("User {} not found", user_id)))
    })
    .await?;

    render(&UserEnvelope { user: profile })
}

/// GET /user
pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<ActingUser>,
) -> ApiResult<Rendered> {
    show_user(&state, user.id).await
}

/// GET /user/{user_id}
pub async fn show(
    State(state): State<AppState>,
    Extension(_user): Extension<ActingUser>,
    Path(user_id): Path<String>,
) -> ApiResult<Rendered> {
    show_user(&state, user_id).await
}
