use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Prefix that marks an authority as a group.
pub const GROUP_PREFIX: &str = "GROUP_";

/// A principal that permissions are granted to (a user name or `GROUP_*`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Authority(String);

impl Authority {
    /// A named user or principal. Fails on empty names or whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(TypeError::InvalidAuthority(name));
        }
        Ok(Self(name))
    }

    /// Build a group authority, adding the `GROUP_` prefix if missing.
    pub fn group(name: &str) -> Result<Self, TypeError> {
        if name.starts_with(GROUP_PREFIX) {
            Self::new(name)
        } else {
            Self::new(format!("{GROUP_PREFIX}{name}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Authority({})", self.0)
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Authority {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Authority {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Authority> for String {
    fn from(a: Authority) -> Self {
        a.0
    }
}

/// Permission role, ordered from least to most privileged.
///
/// A grant of a higher level satisfies a check for any lower level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PermissionLevel {
    /// Read content and list children.
    Consumer,
    /// Consumer plus edit existing content.
    Editor,
    /// Consumer plus create new children.
    Contributor,
    /// Editor and Contributor combined.
    Collaborator,
    /// Full control, including permission changes.
    Coordinator,
}

impl PermissionLevel {
    pub const ALL: [PermissionLevel; 5] = [
        Self::Consumer,
        Self::Editor,
        Self::Contributor,
        Self::Collaborator,
        Self::Coordinator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consumer => "Consumer",
            Self::Editor => "Editor",
            Self::Contributor => "Contributor",
            Self::Collaborator => "Collaborator",
            Self::Coordinator => "Coordinator",
        }
    }

    /// `true` if holding `self` satisfies a requirement of `required`.
    pub fn satisfies(&self, required: PermissionLevel) -> bool {
        *self >= required
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TypeError::UnknownPermission(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn group_prefix_is_added_once() {
        assert_eq!(Authority::group("X").unwrap().as_str(), "GROUP_X");
        assert_eq!(Authority::group("GROUP_X").unwrap().as_str(), "GROUP_X");
    }

    #[test]
    fn authority_rejects_whitespace() {
        assert!(Authority::new("").is_err());
        assert!(Authority::new("bad name").is_err());
    }

    #[test]
    fn level_parse_is_case_insensitive() {
        assert_eq!(
            "coordinator".parse::<PermissionLevel>().unwrap(),
            PermissionLevel::Coordinator
        );
        assert!("owner".parse::<PermissionLevel>().is_err());
    }

    #[test]
    fn coordinator_satisfies_everything() {
        for level in PermissionLevel::ALL {
            assert!(PermissionLevel::Coordinator.satisfies(level));
        }
        assert!(!PermissionLevel::Consumer.satisfies(PermissionLevel::Contributor));
    }

    proptest! {
        #[test]
        fn satisfies_matches_ordering(a in 0usize..5, b in 0usize..5) {
            let (la, lb) = (PermissionLevel::ALL[a], PermissionLevel::ALL[b]);
            prop_assert_eq!(la.satisfies(lb), a >= b);
        }
    }
}
