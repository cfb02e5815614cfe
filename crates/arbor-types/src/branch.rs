//! Branch names.
//!
//! Valid branch names:
//! - Must be non-empty
//! - Must not contain whitespace, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - Must not contain `..`
//! - Must not start or end with `.` or `/`
//! - Must not contain consecutive slashes (`//`)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Characters that are forbidden anywhere in a branch name.
const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

/// A validated branch (store) name such as `main` or `staging/web`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Validate and wrap a branch name.
    ///
    /// ```
    /// use arbor_types::BranchName;
    ///
    /// assert!(BranchName::new("main").is_ok());
    /// assert!(BranchName::new("sandbox/alice").is_ok());
    /// assert!(BranchName::new("").is_err());
    /// assert!(BranchName::new("bad..name").is_err());
    /// ```
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        validate(&name)?;
        Ok(Self(name))
    }

    /// The conventional default branch, `main`.
    pub fn main() -> Self {
        Self("main".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(name: &str) -> Result<(), TypeError> {
    let fail = |reason: String| -> Result<(), TypeError> {
        Err(TypeError::InvalidBranchName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return fail("branch name must not be empty".into());
    }
    if let Some(ch) = FORBIDDEN_CHARS.iter().find(|ch| name.contains(**ch)) {
        return fail(format!("contains forbidden character: {ch:?}"));
    }
    if name.contains("..") {
        return fail("must not contain '..'".into());
    }
    if name.starts_with('.') || name.ends_with('.') {
        return fail("must not start or end with '.'".into());
    }
    if name.starts_with('/') || name.ends_with('/') {
        return fail("must not start or end with '/'".into());
    }
    if name.contains("//") {
        return fail("must not contain consecutive slashes".into());
    }
    Ok(())
}

impl fmt::Debug for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BranchName({})", self.0)
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BranchName {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(b: BranchName) -> Self {
        b.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_names_are_valid() {
        for name in ["main", "develop", "sandbox/alice", "release-1.0"] {
            assert!(BranchName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn invalid_names_are_rejected() {
        for name in ["", "a b", "a..b", ".hidden", "trailing/", "/lead", "a//b", "x:y"] {
            assert!(BranchName::new(name).is_err(), "{name:?} should be invalid");
        }
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let err = serde_json::from_str::<BranchName>("\"bad..name\"");
        assert!(err.is_err());
        let ok: BranchName = serde_json::from_str("\"main\"").unwrap();
        assert_eq!(ok.as_str(), "main");
    }
}
