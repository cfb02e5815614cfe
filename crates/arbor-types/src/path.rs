//! Absolute, normalized paths inside a branch.
//!
//! A [`NodePath`] is a sequence of validated names. The root is the empty
//! sequence and renders as `/`. Paths never contain `.` or `..` components
//! and never have trailing or doubled slashes once parsed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum length of a single name in bytes.
const MAX_NAME_LEN: usize = 255;

/// Validate a single directory-entry name.
pub fn validate_name(name: &str) -> Result<(), TypeError> {
    let reason = if name.is_empty() {
        Some("name must not be empty")
    } else if name == "." || name == ".." {
        Some("name must not be '.' or '..'")
    } else if name.contains('/') {
        Some("name must not contain '/'")
    } else if name.contains('\0') {
        Some("name must not contain NUL")
    } else if name.len() > MAX_NAME_LEN {
        Some("name is too long")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(TypeError::InvalidName {
            name: name.to_string(),
            reason: reason.into(),
        }),
        None => Ok(()),
    }
}

/// A normalized absolute path.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodePath {
    components: Vec<String>,
}

impl NodePath {
    /// The root path `/`.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse an absolute path. Repeated and trailing slashes are collapsed.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let Some(rest) = s.strip_prefix('/') else {
            return Err(TypeError::InvalidPath {
                path: s.to_string(),
                reason: "path must be absolute".into(),
            });
        };
        let mut components = Vec::new();
        for part in rest.split('/').filter(|p| !p.is_empty()) {
            validate_name(part).map_err(|e| TypeError::InvalidPath {
                path: s.to_string(),
                reason: e.to_string(),
            })?;
            components.push(part.to_string());
        }
        Ok(Self { components })
    }

    /// Append a child name.
    pub fn join(&self, name: &str) -> Result<Self, TypeError> {
        validate_name(name)?;
        let mut components = self.components.clone();
        components.push(name.to_string());
        Ok(Self { components })
    }

    /// The parent path, or `None` for the root.
    pub fn parent(&self) -> Option<NodePath> {
        if self.components.is_empty() {
            return None;
        }
        Some(Self {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    /// The final component, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// Split into `(parent, name)`; `None` for the root.
    pub fn split_last(&self) -> Option<(NodePath, &str)> {
        let name = self.name()?;
        let parent = self.parent()?;
        Some((parent, name))
    }

    /// The path's names, outermost first.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Number of components (the root has depth 0).
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// `true` if `self` equals `prefix` or lies beneath it.
    pub fn starts_with(&self, prefix: &NodePath) -> bool {
        self.components.starts_with(&prefix.components)
    }

    /// Every prefix of this path from the root down to (and including) itself.
    pub fn ancestors_inclusive(&self) -> Vec<NodePath> {
        (0..=self.components.len())
            .map(|n| Self {
                components: self.components[..n].to_vec(),
            })
            .collect()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }
        for c in &self.components {
            write!(f, "/{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodePath({self})")
    }
}

impl FromStr for NodePath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NodePath {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<NodePath> for String {
    fn from(p: NodePath) -> Self {
        p.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn root_renders_as_slash() {
        assert_eq!(NodePath::root().to_string(), "/");
        assert_eq!(NodePath::parse("/").unwrap(), NodePath::root());
    }

    #[test]
    fn parse_collapses_slashes() {
        let p = NodePath::parse("//a///b/").unwrap();
        assert_eq!(p.to_string(), "/a/b");
        assert_eq!(p.depth(), 2);
    }

    #[test]
    fn relative_paths_rejected() {
        assert!(NodePath::parse("a/b").is_err());
    }

    #[test]
    fn dot_components_rejected() {
        assert!(NodePath::parse("/a/../b").is_err());
        assert!(NodePath::parse("/a/./b").is_err());
    }

    #[test]
    fn parent_and_name() {
        let p = NodePath::parse("/docs/report.txt").unwrap();
        assert_eq!(p.name(), Some("report.txt"));
        assert_eq!(p.parent().unwrap().to_string(), "/docs");
        assert!(NodePath::root().parent().is_none());
    }

    #[test]
    fn ancestors_inclusive_starts_at_root() {
        let p = NodePath::parse("/a/b").unwrap();
        let all: Vec<String> = p.ancestors_inclusive().iter().map(|a| a.to_string()).collect();
        assert_eq!(all, vec!["/", "/a", "/a/b"]);
    }

    #[test]
    fn starts_with_is_component_wise() {
        let ab = NodePath::parse("/a/b").unwrap();
        let abc = NodePath::parse("/abc").unwrap();
        let a = NodePath::parse("/a").unwrap();
        assert!(ab.starts_with(&a));
        assert!(!abc.starts_with(&a));
    }

    #[test]
    fn serde_uses_string_form() {
        let p = NodePath::parse("/a/b").unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"/a/b\"");
        let back: NodePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    proptest! {
        #[test]
        fn display_parse_is_stable(parts in proptest::collection::vec("[a-zA-Z0-9_-]{1,12}", 0..6)) {
            let raw = format!("/{}", parts.join("/"));
            let parsed = NodePath::parse(&raw).unwrap();
            let reparsed = NodePath::parse(&parsed.to_string()).unwrap();
            prop_assert_eq!(parsed.depth(), parts.len());
            prop_assert_eq!(parsed, reparsed);
        }

        #[test]
        fn join_then_parent_is_identity(parts in proptest::collection::vec("[a-z]{1,8}", 0..5), leaf in "[a-z]{1,8}") {
            let base = NodePath::parse(&format!("/{}", parts.join("/"))).unwrap();
            let child = base.join(&leaf).unwrap();
            prop_assert_eq!(child.parent().unwrap(), base);
            prop_assert_eq!(child.name().unwrap(), leaf.as_str());
        }
    }
}
