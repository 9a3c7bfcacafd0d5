use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message direction as seen from the acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailBox {
    In,
    Out,
}

#[derive(Debug, Error)]
#[error("unknown mailbox '{0}'")]
pub struct UnknownMailBox(pub String);

impl MailBox {
    pub fn as_str(self) -> &'static str {
        match self {
            MailBox::In => "in",
            MailBox::Out => "out",
        }
    }

    /// Value of `message_user.snd_rec` for delivery rows in this box.
    pub fn direction(self) -> &'static str {
        match self {
            MailBox::In => "rec",
            MailBox::Out => "snd",
        }
    }

    pub fn from_direction(snd_rec: &str) -> Option<Self> {
        match snd_rec {
            "rec" => Some(MailBox::In),
            "snd" => Some(MailBox::Out),
            _ => None,
        }
    }
}

impl FromStr for MailBox {
    type Err = UnknownMailBox;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(MailBox::In),
            "out" => Ok(MailBox::Out),
            other => Err(UnknownMailBox(other.to_string())),
        }
    }
}

impl fmt::Display for MailBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language used for the names of the implicit default folders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Locale {
    #[default]
    De,
    En,
}

#[derive(Debug, Error)]
#[error("unsupported locale '{0}'")]
pub struct UnknownLocale(pub String);

impl Locale {
    /// Name of folder `0` in the given box.
    pub fn default_folder_name(self, mailbox: MailBox) -> &'static str {
        match (self, mailbox) {
            (Locale::De, MailBox::In) => "Posteingang",
            (Locale::De, MailBox::Out) => "Postausgang",
            (Locale::En, MailBox::In) => "Inbox",
            (Locale::En, MailBox::Out) => "Outbox",
        }
    }
}

impl FromStr for Locale {
    type Err = UnknownLocale;

    /// Accepts bare language codes as well as `de_DE` / `en-GB` style tags.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lang = s.split(['_', '-']).next().unwrap_or_default().to_ascii_lowercase();
        match lang.as_str() {
            "de" => Ok(Locale::De),
            "en" => Ok(Locale::En),
            _ => Err(UnknownLocale(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailbox_parses_only_known_boxes() {
        assert_eq!("in".parse::<MailBox>().unwrap(), MailBox::In);
        assert_eq!("out".parse::<MailBox>().unwrap(), MailBox::Out);
        assert!("IN".parse::<MailBox>().is_err());
        assert!("0f3a".parse::<MailBox>().is_err());
    }

    #[test]
    fn direction_roundtrips() {
        for mailbox in [MailBox::In, MailBox::Out] {
            assert_eq!(MailBox::from_direction(mailbox.direction()), Some(mailbox));
        }
        assert_eq!(MailBox::from_direction("cc"), None);
    }

    #[test]
    fn locale_accepts_region_tags() {
        assert_eq!("de_DE".parse::<Locale>().unwrap(), Locale::De);
        assert_eq!("en-GB".parse::<Locale>().unwrap(), Locale::En);
        assert!("fr".parse::<Locale>().is_err());
        assert_eq!(Locale::En.default_folder_name(MailBox::Out), "Outbox");
    }
}
