//! Canonical hierarchical register names.
//!
//! Register paths are slash-separated, always begin with a separator, and
//! never contain empty components. Any string is normalized on construction,
//! so `"MOD/REG"`, `"/MOD/REG"` and `"//MOD///REG/"` all denote the same
//! register. Equality, ordering and hashing operate on the normalized form.

use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: char = '/';

/// Immutable canonical identifier of a register within one backend.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegisterPath(String);

impl RegisterPath {
    /// Build a path from any raw string, normalizing separators.
    pub fn new(raw: &str) -> Self {
        let mut normalized = String::with_capacity(raw.len() + 1);
        for component in raw.split(SEPARATOR).filter(|c| !c.is_empty()) {
            normalized.push(SEPARATOR);
            normalized.push_str(component);
        }
        if normalized.is_empty() {
            normalized.push(SEPARATOR);
        }
        RegisterPath(normalized)
    }

    /// The root path `/`.
    pub fn root() -> Self {
        RegisterPath(String::from("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the path components, root first.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR).filter(|c| !c.is_empty())
    }

    /// Append a sub-path, normalizing the result.
    pub fn join(&self, sub: &str) -> Self {
        RegisterPath::new(&format!("{}{}{}", self.0, SEPARATOR, sub))
    }
}

impl From<&str> for RegisterPath {
    fn from(raw: &str) -> Self {
        RegisterPath::new(raw)
    }
}

impl From<String> for RegisterPath {
    fn from(raw: String) -> Self {
        RegisterPath::new(&raw)
    }
}

impl fmt::Display for RegisterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RegisterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegisterPath({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(RegisterPath::new("MOD/REG").as_str(), "/MOD/REG");
        assert_eq!(RegisterPath::new("/MOD/REG").as_str(), "/MOD/REG");
        assert_eq!(RegisterPath::new("//MOD///REG/").as_str(), "/MOD/REG");
        assert_eq!(RegisterPath::new("").as_str(), "/");
    }

    #[test]
    fn test_equality_after_normalization() {
        assert_eq!(RegisterPath::new("A//B"), RegisterPath::new("/A/B"));
        assert_ne!(RegisterPath::new("/A/B"), RegisterPath::new("/A/C"));
    }

    #[test]
    fn test_ordering() {
        assert!(RegisterPath::new("/A/B") < RegisterPath::new("/A/C"));
        assert!(RegisterPath::new("/A") < RegisterPath::new("/A/B"));
    }

    #[test]
    fn test_components_and_join() {
        let path = RegisterPath::new("/BOARD/ADC");
        let parts: Vec<_> = path.components().collect();
        assert_eq!(parts, ["BOARD", "ADC"]);
        assert_eq!(path.join("GAIN").as_str(), "/BOARD/ADC/GAIN");
        assert_eq!(RegisterPath::root().components().count(), 0);
    }
}
