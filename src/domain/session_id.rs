use std::fmt;

use super::LanguageTag;

/// Opaque streaming session key supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Sessions started without an explicit id are keyed by their language.
    pub fn from_language(lang: &LanguageTag) -> Self {
        Self(lang.as_str().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
