//! HTTP surface of the messaging API: routes, auth, and response encoding.

pub mod auth;
pub mod config;
pub mod error;
pub mod folders;
pub mod format;
pub mod markup;
pub mod messages;
pub mod middleware;
pub mod users;

use axum::{
    Router,
    http::Uri,
    middleware as axum_middleware,
    routing::{get, post},
};
use tracing::error;

use mailroom_db::Database;
use mailroom_types::MailBox;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// Build the full application: authenticated routes behind the format
/// negotiation layer.
pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/messages", post(messages::create_message))
        .route(
            "/messages/{target}",
            get(messages::show)
                .post(folders::create_folder)
                .delete(messages::delete_message),
        )
        .route("/messages/{target}/{folder}", get(messages::list_folder))
        .route(
            "/messages/{target}/read",
            post(messages::read_message).fallback(no_route),
        )
        .route(
            "/messages/{target}/move/{folder}",
            post(messages::move_message).fallback(no_route),
        )
        .route("/user", get(users::me))
        .route("/user/{user_id}", get(users::show))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state);

    // The suffix has to come off before routing, so negotiation wraps the
    // routes as a whole instead of being layered onto them.
    Router::new()
        .fallback_service(routes)
        .layer(axum_middleware::from_fn(format::negotiate))
}

/// Paths that only exist for POST are not found for other methods, the same
/// as any unknown path.
async fn no_route(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}

/// Run database work on the blocking pool.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("Internal server error".into())
        })?
}

/// The `{box}` path segment. Anything but `in`/`out` matches no route.
pub(crate) fn parse_mailbox(raw: &str) -> ApiResult<MailBox> {
    raw.parse()
        .map_err(|_| ApiError::NotFound(format!("No route for /messages/{}", raw)))
}
