//! Response format negotiation.
//!
//! Clients pick the encoding with a suffix on the last path segment
//! (`/messages/in.xml`). [`negotiate`] strips the suffix before routing and,
//! once the handler is done, encodes the value it [`render`]ed. Handlers never
//! write bodies for successful responses themselves.

pub mod xml;

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderName, HeaderValue, Uri, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use mailroom_types::{charset, php};

use crate::error::{ApiError, ApiResult};

pub const SERVER_TIMESTAMP: HeaderName = HeaderName::from_static("x-server-timestamp");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Format {
    Json,
    Php,
    Xml,
    Unsupported(String),
}

impl Format {
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "json" => Format::Json,
            "php" => Format::Php,
            "xml" => Format::Xml,
            other => Format::Unsupported(other.to_string()),
        }
    }

    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Format::Json => Some("application/json"),
            Format::Php => Some("text/plain;charset=windows-1252"),
            Format::Xml => Some("text/xml;charset=windows-1252"),
            Format::Unsupported(_) => None,
        }
    }

    /// Encode a rendered value. Fails with 501 for unsupported formats.
    pub fn encode(&self, value: &Value) -> ApiResult<Vec<u8>> {
        match self {
            Format::Json => Ok(serde_json::to_vec(value)?),
            Format::Php => Ok(charset::encode(&php::serialize(value))),
            Format::Xml => Ok(charset::encode(&xml::document(value))),
            Format::Unsupported(ext) => {
                warn!("No encoder for response format '{}'", ext);
                Err(ApiError::NotImplemented)
            }
        }
    }
}

/// A handler's result value, waiting for [`negotiate`] to encode it.
#[derive(Debug, Clone)]
pub struct Rendered(pub Value);

impl IntoResponse for Rendered {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::empty());
        response.extensions_mut().insert(self);
        response
    }
}

pub fn render<T: Serialize>(value: &T) -> ApiResult<Rendered> {
    Ok(Rendered(serde_json::to_value(value)?))
}

/// Split a trailing `.ext` off the last path segment.
///
/// Returns the rewritten URI (query preserved) and the requested format, or
/// `None` when the path carries no suffix.
pub fn strip_suffix(uri: &Uri) -> Option<(Uri, Format)> {
    let path = uri.path();
    let segment_start = path.rfind('/').map_or(0, |i| i + 1);
    let dot = segment_start + path[segment_start..].rfind('.')?;
    if dot == segment_start || dot + 1 == path.len() {
        return None;
    }

    let format = Format::from_extension(&path[dot + 1..]);
    let stripped = &path[..dot];
    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", stripped, query),
        None => stripped.to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse().ok()?);
    let rewritten = Uri::from_parts(parts).ok()?;
    Some((rewritten, format))
}

/// Format negotiation middleware.
///
/// Must wrap the router from the outside so the rewritten URI is what gets
/// routed. Every response leaves with `X-Server-Timestamp`.
pub async fn negotiate(mut req: Request, next: Next) -> Response {
    let format = match strip_suffix(req.uri()) {
        Some((uri, format)) => {
            *req.uri_mut() = uri;
            format
        }
        None => Format::Json,
    };

    let mut response = next.run(req).await;

    if let Some(Rendered(value)) = response.extensions_mut().remove::<Rendered>() {
        response = match format.encode(&value) {
            Ok(bytes) => {
                let (mut parts, _) = response.into_parts();
                if let Some(content_type) = format.content_type() {
                    parts
                        .headers
                        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
                }
                Response::from_parts(parts, Body::from(bytes))
            }
            Err(e) => e.into_response(),
        };
    }

    response
        .headers_mut()
        .insert(SERVER_TIMESTAMP, HeaderValue::from(chrono::Utc::now().timestamp()));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(uri: &str) -> Option<(String, Format)> {
        let uri: Uri = uri.parse().unwrap();
        strip_suffix(&uri).map(|(uri, format)| (uri.to_string(), format))
    }

    #[test]
    fn known_suffixes_are_stripped() {
        assert_eq!(split("/messages/in.json"), Some(("/messages/in".into(), Format::Json)));
        assert_eq!(split("/messages/in/3.xml"), Some(("/messages/in/3".into(), Format::Xml)));
        assert_eq!(split("/messages/abc/read.php?x=1"), Some(("/messages/abc/read?x=1".into(), Format::Php)));
    }

    #[test]
    fn unknown_suffix_is_unsupported() {
        assert_eq!(
            split("/messages/in.yaml"),
            Some(("/messages/in".into(), Format::Unsupported("yaml".into())))
        );
    }

    #[test]
    fn bare_paths_have_no_suffix() {
        assert_eq!(split("/messages/in"), None);
        assert_eq!(split("/messages.d/in"), None);
        assert_eq!(split("/messages/.hidden"), None);
        assert_eq!(split("/messages/in."), None);
    }

    #[test]
    fn unsupported_format_refuses_to_encode() {
        let err = Format::Unsupported("yaml".into()).encode(&Value::Null).unwrap_err();
        assert!(matches!(err, ApiError::NotImplemented));
    }

    #[test]
    fn json_is_plain_serde() {
        let value = serde_json::json!({ "folders": { "0": "Inbox" } });
        assert_eq!(Format::Json.encode(&value).unwrap(), br#"{"folders":{"0":"Inbox"}}"#.to_vec());
    }
}
