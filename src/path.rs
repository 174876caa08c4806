//! Path values identifying nodes in the naming tree.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{DfsError, DfsResult};

/// Immutable, ordered sequence of non-empty component names.
///
/// The empty sequence denotes the root. No component ever contains `/`
/// or `:`; the string form is `/` for the root and `/c1/c2/...` otherwise
/// and round-trips through [`DfsPath::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DfsPath {
    components: Vec<String>,
}

impl DfsPath {
    /// The root path, holding no components.
    pub fn root() -> Self {
        Self { components: Vec::new() }
    }

    /// Parses a path from its string form.
    ///
    /// Fails when the string is empty, does not start with `/`, or
    /// contains `:`. Consecutive separators collapse and trailing
    /// separators are ignored.
    pub fn parse(raw: &str) -> DfsResult<Self> {
        if raw.is_empty() || !raw.starts_with('/') || raw.contains(':') {
            return Err(DfsError::Argument);
        }
        let components =
            raw.split('/').filter(|part| !part.is_empty()).map(str::to_owned).collect();
        Ok(Self { components })
    }

    /// Returns a new path with `component` appended.
    ///
    /// Fails when the component is empty or contains `/` or `:`.
    pub fn join(&self, component: &str) -> DfsResult<Self> {
        if component.is_empty() || component.contains('/') || component.contains(':') {
            return Err(DfsError::Argument);
        }
        Ok(self.child(component))
    }

    /// Appends an already validated component, such as a tree child name.
    pub(crate) fn child(&self, component: &str) -> Self {
        let mut components = self.components.clone();
        components.push(component.to_owned());
        Self { components }
    }

    /// True for the empty component sequence.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// The path with the last component removed; `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.components.is_empty() {
            return None;
        }
        let components = self.components[..self.components.len() - 1].to_vec();
        Some(Self { components })
    }

    /// The last component; `None` for the root.
    pub fn last(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// True iff `other`'s components are a prefix of this path's,
    /// equality included.
    pub fn is_subpath(&self, other: &Self) -> bool {
        self.components.len() >= other.components.len()
            && self.components[..other.components.len()] == other.components[..]
    }

    /// Iterates the components in order; the root yields nothing.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }

    /// Number of components; 0 for the root.
    pub fn depth(&self) -> usize {
        self.components.len()
    }
}

impl fmt::Display for DfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl FromStr for DfsPath {
    type Err = DfsError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl Ord for DfsPath {
    /// Total order on the canonical string form. An ancestor compares
    /// before every one of its descendants.
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl PartialOrd for DfsPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
