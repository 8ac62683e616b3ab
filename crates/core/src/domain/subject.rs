use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Chat-platform user identifier, e.g. `U024BE7LH`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Renders the id as a mention token (`<@U123>`).
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    User,
    Thing,
    Unknown,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Thing => "thing",
            Self::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for SubjectKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" | "users" => Ok(Self::User),
            "thing" | "things" => Ok(Self::Thing),
            "unknown" => Ok(Self::Unknown),
            other => Err(DomainError::InvalidSubject(format!("unknown subject kind `{other}`"))),
        }
    }
}

/// Something that can accrue karma.
///
/// Users are keyed by their platform id alone, so `<@U1>` and `<@U1|alice>`
/// are the same subject. Things keep their raw token verbatim, delimiters
/// included, which makes `` `foo` `` and `:foo:` distinct subjects.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    User(UserId),
    Thing(String),
}

impl Subject {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self::User(UserId::new(user_id))
    }

    pub fn thing(token: impl Into<String>) -> Self {
        Self::Thing(token.into())
    }

    /// Builds a subject from a raw user mention such as `<@U1>` or
    /// `<@U1|alice>`, dropping any display-name suffix.
    pub fn from_user_mention(raw: &str) -> Option<Self> {
        let inner = raw.strip_prefix("<@")?.strip_suffix('>')?;
        let id = inner.split('|').next().unwrap_or(inner).trim();
        if id.is_empty() {
            return None;
        }
        Some(Self::user(id))
    }

    /// Rebuilds a subject from its stored key. Anything that looks like a
    /// user mention is treated as a user; everything else is a thing.
    pub fn from_key(key: &str) -> Self {
        Self::from_user_mention(key).unwrap_or_else(|| Self::thing(key))
    }

    /// Canonical identity used as the natural key in storage.
    pub fn key(&self) -> String {
        match self {
            Self::User(user_id) => user_id.mention(),
            Self::Thing(token) => token.clone(),
        }
    }

    /// Emoji tokens such as `:tada:` count as things. `SubjectKind::Unknown`
    /// never comes from here; it only appears on rows read back from storage.
    pub fn kind(&self) -> SubjectKind {
        match self {
            Self::User(_) => SubjectKind::User,
            Self::Thing(_) => SubjectKind::Thing,
        }
    }

    pub fn is_user(&self, user_id: &UserId) -> bool {
        matches!(self, Self::User(id) if id == user_id)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(user_id) => write!(f, "<@{}>", user_id.0),
            Self::Thing(token) => f.write_str(token),
        }
    }
}
