//! Origins, post targets and origin allow-lists.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Errors produced while parsing origins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OriginError {
    #[error("Invalid URL '{0}': {1}")]
    InvalidUrl(String, String),

    #[error("URL '{0}' has an opaque origin")]
    Opaque(String),
}

/// A serialized tuple origin: `scheme://host[:port]`, default ports elided.
///
/// Two origins are equal exactly when their serializations are equal, which
/// is the comparison browsers apply to `MessageEvent.origin`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Origin(String);

impl Origin {
    /// Parse an origin from any URL; path, query and fragment are discarded.
    pub fn parse(input: &str) -> Result<Self, OriginError> {
        let url = Url::parse(input.trim())
            .map_err(|e| OriginError::InvalidUrl(input.to_string(), e.to_string()))?;
        Self::from_url(&url)
    }

    /// Origin of an already parsed URL.
    pub fn from_url(url: &Url) -> Result<Self, OriginError> {
        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(OriginError::Opaque(url.to_string()));
        }
        Ok(Self(origin.ascii_serialization()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Origin {
    type Err = OriginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Origin {
    type Error = OriginError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Origin> for String {
    fn from(origin: Origin) -> Self {
        origin.0
    }
}

/// The `targetOrigin` argument of a post.
///
/// Portico components always post to an exact origin; `Any` exists because
/// the messaging substrate mirrors browser semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOrigin {
    Any,
    Exact(Origin),
}

impl TargetOrigin {
    /// Whether a context at `origin` may receive a message posted with this target.
    pub fn admits(&self, origin: &Origin) -> bool {
        match self {
            TargetOrigin::Any => true,
            TargetOrigin::Exact(expected) => expected == origin,
        }
    }
}

impl fmt::Display for TargetOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetOrigin::Any => f.write_str("*"),
            TargetOrigin::Exact(origin) => origin.fmt(f),
        }
    }
}

impl FromStr for TargetOrigin {
    type Err = OriginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "*" {
            Ok(TargetOrigin::Any)
        } else {
            Origin::parse(s).map(TargetOrigin::Exact)
        }
    }
}

impl From<Origin> for TargetOrigin {
    fn from(origin: Origin) -> Self {
        TargetOrigin::Exact(origin)
    }
}

/// Fixed allow-list of origins a receiver accepts messages from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowedOriginSet {
    origins: BTreeSet<Origin>,
}

impl AllowedOriginSet {
    pub fn new(origins: impl IntoIterator<Item = Origin>) -> Self {
        Self {
            origins: origins.into_iter().collect(),
        }
    }

    /// Build a set from URL strings, failing on the first unparsable entry.
    pub fn parse<I, S>(entries: I) -> Result<Self, OriginError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let origins = entries
            .into_iter()
            .map(|s| Origin::parse(s.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { origins })
    }

    pub fn contains(&self, origin: &Origin) -> bool {
        self.origins.contains(origin)
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Origin> {
        self.origins.iter()
    }
}

impl FromIterator<Origin> for AllowedOriginSet {
    fn from_iter<T: IntoIterator<Item = Origin>>(iter: T) -> Self {
        Self::new(iter)
    }
}
