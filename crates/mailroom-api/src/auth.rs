use std::sync::Arc;

use jsonwebtoken::{EncodingKey, Header, encode};

use mailroom_db::Database;
use mailroom_types::Locale;
use mailroom_types::api::Claims;

use crate::config::Config;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub locale: Locale,
    pub allow_message_creation: bool,
}

impl AppStateInner {
    pub fn new(db: Database, config: &Config) -> AppState {
        Arc::new(Self {
            db,
            jwt_secret: config.jwt_secret.clone(),
            locale: config.locale,
            allow_message_creation: config.allow_message_creation,
        })
    }
}

/// The user a request acts for, as vouched for by the token verifier.
/// Inserted into request extensions by [`crate::middleware::require_auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActingUser {
    pub id: String,
}

/// Mint a bearer token for `user_id`, valid for `ttl`.
pub fn issue_token(secret: &str, user_id: &str, ttl: chrono::Duration) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
