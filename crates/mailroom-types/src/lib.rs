//! Wire types shared by the database layer and the HTTP API.

pub mod api;
pub mod charset;
pub mod models;
pub mod php;

pub use models::{Locale, MailBox};
