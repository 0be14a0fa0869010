use std::fmt;

use serde::{Deserialize, Serialize};

const AUTO: &str = "auto";

/// Normalized lowercase language tag such as `en-us`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct LanguageTag(String);

impl LanguageTag {
    pub fn new(tag: impl AsRef<str>) -> Self {
        let normalized = tag.as_ref().trim().replace('_', "-").to_lowercase();
        Self(normalized)
    }

    /// The detection sentinel.
    pub fn auto() -> Self {
        Self(AUTO.to_string())
    }

    pub fn is_auto(&self) -> bool {
        self.0 == AUTO
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `en` for `en-us`; the tag itself when it has no region.
    pub fn primary_subtag(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }

    pub fn primary(&self) -> LanguageTag {
        Self(self.primary_subtag().to_string())
    }

    pub fn has_region(&self) -> bool {
        self.0.contains('-')
    }

    /// Lookup keys in fallback order: the exact tag, then its primary subtag.
    pub fn lookup_keys(&self) -> Vec<LanguageTag> {
        if self.has_region() {
            vec![self.clone(), self.primary()]
        } else {
            vec![self.clone()]
        }
    }

    /// Parses a comma separated list, skipping blanks and duplicates.
    pub fn parse_list(list: &str) -> Vec<LanguageTag> {
        let mut tags: Vec<LanguageTag> = Vec::new();
        for tag in list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let tag = LanguageTag::new(tag);
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }
}

impl From<String> for LanguageTag {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for LanguageTag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<LanguageTag> for String {
    fn from(tag: LanguageTag) -> Self {
        tag.0
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
