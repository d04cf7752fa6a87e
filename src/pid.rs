//! Validated identifiers: persistent identifiers, resource ids and link types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ResourceError, RuleError};
use crate::vocab;

fn parse_iri(value: &str) -> Result<String, ResourceError> {
    oxigraph::model::NamedNode::new(value)
        .map(|node| node.into_string())
        .map_err(|e| ResourceError::InvalidFormat {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// The stable, user-facing persistent identifier of a resource.
///
/// Ordered lexicographically; the lock coordinator relies on that order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PidUri(String);

impl PidUri {
    pub fn parse(value: &str) -> Result<Self, ResourceError> {
        parse_iri(value.trim()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Internal id of one lifecycle-state instance of a resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    pub fn parse(value: &str) -> Result<Self, ResourceError> {
        parse_iri(value).map(Self)
    }

    /// Mint a fresh id under the given namespace.
    pub fn mint(namespace: &str) -> Self {
        Self(format!("{namespace}{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A link predicate drawn from the configured allow-list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkType(String);

impl LinkType {
    /// Resolve `value` against the allow-list.
    ///
    /// Accepts a full IRI or a local name in the catalog namespace
    /// (`isCopyOf` → `https://pidgraph.dev/ontology#isCopyOf`).
    pub fn resolve(value: &str, allowed: &[String]) -> Result<Self, RuleError> {
        let value = value.trim();
        if allowed.iter().any(|t| t == value) {
            return Ok(Self(value.to_string()));
        }
        let expanded = vocab::term(value);
        if allowed.iter().any(|t| *t == expanded) {
            return Ok(Self(expanded));
        }
        Err(RuleError::DisallowedLinkType {
            link_type: value.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! string_newtype_impls {
    ($($ty:ident),*) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> String {
                value.0
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    )*};
}

string_newtype_impls!(PidUri, ResourceId, LinkType);

impl TryFrom<String> for PidUri {
    type Error = ResourceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = ResourceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}
