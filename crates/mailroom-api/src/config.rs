use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use mailroom_types::Locale;

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub locale: Locale,
    /// `POST /messages` answers 400 unless this is set.
    pub allow_message_creation: bool,
    /// Create the host tables on startup if they are missing.
    pub bootstrap_schema: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("MAILROOM_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MAILROOM_JWT_SECRET is unset or still a placeholder");
        }

        let port = lookup("MAILROOM_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("MAILROOM_PORT must be a port number")?;

        let locale = match lookup("MAILROOM_LOCALE") {
            Some(raw) => raw.parse()?,
            None => Locale::default(),
        };

        Ok(Self {
            host: lookup("MAILROOM_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: lookup("MAILROOM_DB_PATH").unwrap_or_else(|| "studip.db".into()).into(),
            jwt_secret,
            locale,
            allow_message_creation: flag(lookup("MAILROOM_ALLOW_MESSAGE_CREATION"), "MAILROOM_ALLOW_MESSAGE_CREATION")?,
            bootstrap_schema: flag(lookup("MAILROOM_BOOTSTRAP_SCHEMA"), "MAILROOM_BOOTSTRAP_SCHEMA")?,
        })
    }
}

fn flag(raw: Option<String>, name: &str) -> Result<bool> {
    let Some(raw) = raw else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{} must be a boolean, got '{}'", name, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[("MAILROOM_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.locale, Locale::De);
        assert!(!cfg.allow_message_creation);
        assert!(!cfg.bootstrap_schema);
    }

    #[test]
    fn placeholder_secret_is_rejected() {
        assert!(config(&[]).is_err());
        assert!(config(&[("MAILROOM_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn flags_and_locale_parse() {
        let cfg = config(&[
            ("MAILROOM_JWT_SECRET", "s3cret"),
            ("MAILROOM_ALLOW_MESSAGE_CREATION", "yes"),
            ("MAILROOM_LOCALE", "en_GB"),
        ])
        .unwrap();
        assert!(cfg.allow_message_creation);
        assert_eq!(cfg.locale, Locale::En);

        assert!(config(&[("MAILROOM_JWT_SECRET", "s3cret"), ("MAILROOM_BOOTSTRAP_SCHEMA", "maybe")]).is_err());
    }
}
