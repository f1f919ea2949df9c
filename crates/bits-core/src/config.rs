//! Repository configuration
//!
//! Captured once per process run; no runtime mutation.

use crate::BitsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Boundary across which push elides chunks known present remotely
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupScope {
    /// Never skip; every push transfers every key
    Off,
    /// Skip keys this repository has already pushed
    #[default]
    Repository,
    /// Additionally trust keys learned from a remote listing
    Remote,
}

impl DedupScope {
    /// Whether deduplication is disabled
    pub fn is_off(self) -> bool {
        matches!(self, DedupScope::Off)
    }

    /// Stable name of the scope
    pub fn as_str(self) -> &'static str {
        match self {
            DedupScope::Off => "off",
            DedupScope::Repository => "repository",
            DedupScope::Remote => "remote",
        }
    }
}

impl fmt::Display for DedupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DedupScope {
    type Err = BitsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(DedupScope::Off),
            "repository" => Ok(DedupScope::Repository),
            "remote" => Ok(DedupScope::Remote),
            other => Err(BitsError::Config(format!(
                "unknown deduplication scope {other:?} (expected off, repository or remote)"
            ))),
        }
    }
}

/// A secret value that redacts itself from debug output and is never logged
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the underlying value
    pub fn reveal(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Repository configuration for the transfer flows
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conf {
    /// Deduplication boundary for push; defaults to [`DedupScope::Repository`]
    pub dedup_scope: DedupScope,
    /// Name of the bucket used as chunk remote
    pub bucket: String,
    /// Access key id for the object store; empty selects the default chain
    pub access_key_id: String,
    /// Secret access key for the object store
    pub secret_access_key: Secret,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scope_is_not_off() {
        let conf = Conf::default();
        assert!(!conf.dedup_scope.is_off());
        assert_eq!(conf.dedup_scope, DedupScope::Repository);
    }

    #[test]
    fn scope_parses_from_names() {
        for scope in [DedupScope::Off, DedupScope::Repository, DedupScope::Remote] {
            assert_eq!(scope.as_str().parse::<DedupScope>().unwrap(), scope);
        }
        assert!("everywhere".parse::<DedupScope>().is_err());
    }

    #[test]
    fn secret_redacts_debug_output() {
        let conf = Conf {
            secret_access_key: Secret::new("hunter2"),
            ..Conf::default()
        };
        let rendered = format!("{conf:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("Secret(***)"));
        assert_eq!(conf.secret_access_key.reveal(), "hunter2");
    }
}
