//! Repository and reference naming.
//!
//! Remote references are written `repo:ref`. The separator is reserved, so a
//! repository name may never contain it; reference names follow git-style
//! rules so they can be mapped onto local refs without escaping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Separator between repository and reference in `repo:ref`.
pub const REF_SEPARATOR: char = ':';

/// Characters that may not appear anywhere in a reference name.
const FORBIDDEN_REF_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

/// A registered (or to-be-registered) repository name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoName(String);

impl RepoName {
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TypeError::InvalidName {
                name,
                reason: "repo name must not be empty".into(),
            });
        }
        if name.contains(REF_SEPARATOR) {
            return Err(TypeError::ReservedCharacter {
                name,
                separator: REF_SEPARATOR,
            });
        }
        if name.chars().any(|c| c.is_control() || c == '/') {
            return Err(TypeError::InvalidName {
                name,
                reason: "repo name must not contain '/' or control characters".into(),
            });
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A reference name within a repository, e.g. `master` or `release/v1`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefName(String);

impl RefName {
    /// Validate a reference name.
    ///
    /// ```
    /// use cpk_types::RefName;
    ///
    /// assert!(RefName::new("master").is_ok());
    /// assert!(RefName::new("release/v1").is_ok());
    /// assert!(RefName::new("a..b").is_err());
    /// assert!(RefName::new("tag:x").is_err());
    /// ```
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        let invalid = |reason: &str| {
            Err(TypeError::InvalidName {
                name: name.clone(),
                reason: reason.to_string(),
            })
        };

        if name.is_empty() {
            return invalid("ref name must not be empty");
        }
        if let Some(ch) = name.chars().find(|c| FORBIDDEN_REF_CHARS.contains(c)) {
            return invalid(&format!("contains forbidden character: {ch:?}"));
        }
        if name.contains("..") || name.contains("@{") || name.contains("//") {
            return invalid("must not contain '..', '@{' or '//'");
        }
        if name.starts_with(['.', '/']) || name.ends_with(['.', '/']) {
            return invalid("must not start or end with '.' or '/'");
        }
        if name.ends_with(".lock") {
            return invalid("must not end with '.lock'");
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A fully qualified remote reference: `repo:ref`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub repo: RepoName,
    pub name: RefName,
}

impl RepoRef {
    pub fn new(repo: RepoName, name: RefName) -> Self {
        Self { repo, name }
    }

    /// Parse `repo:ref`, splitting on the first separator.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let (repo, name) = s
            .split_once(REF_SEPARATOR)
            .ok_or_else(|| TypeError::MalformedRepoRef(s.to_string()))?;
        Ok(Self {
            repo: RepoName::new(repo)?,
            name: RefName::new(name)?,
        })
    }
}

macro_rules! string_name_impls {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($ty), self.0)
            }
        }

        impl FromStr for $ty {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::new(s).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_name_impls!(RepoName);
string_name_impls!(RefName);

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.repo, REF_SEPARATOR, self.name)
    }
}

impl fmt::Debug for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoRef({self})")
    }
}

impl FromStr for RepoRef {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
