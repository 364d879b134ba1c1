//! DMap device-alias file parser.
//!
//! A DMap file maps device aliases to URIs and register map files, one
//! device per line:
//!
//! ```text
//! # alias    uri                          map file
//! DUMMY1     sdm://./dummy=devices.map    devices.map
//! PCIE0      sdm://./pci:pcieunis6        pcie_board.map
//! ```
//!
//! `#` starts a comment, blank lines are ignored, and map file names are
//! resolved relative to the DMap file's directory.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// One device registration from a DMap file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub alias: String,
    pub uri: String,
    /// Absolute path of the register map file.
    pub map_file: PathBuf,
    /// Line of the DMap file the entry came from.
    pub line_number: usize,
}

/// Alias lookup table built from one DMap file.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfoMap {
    entries: Vec<DeviceInfo>,
    index: HashMap<String, usize>,
}

impl DeviceInfoMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device. A duplicate alias replaces the earlier entry.
    pub fn insert(&mut self, info: DeviceInfo) {
        match self.index.get(&info.alias) {
            Some(&slot) => {
                tracing::warn!(alias = %info.alias, "replacing duplicate dmap alias");
                self.entries[slot] = info;
            }
            None => {
                self.index.insert(info.alias.clone(), self.entries.len());
                self.entries.push(info);
            }
        }
    }

    pub fn get(&self, alias: &str) -> Result<&DeviceInfo> {
        self.index
            .get(alias)
            .map(|&slot| &self.entries[slot])
            .ok_or_else(|| Error::logic(format!("device alias '{}' is not registered", alias)))
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.index.contains_key(alias)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceInfo> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse a DMap file into an alias lookup table.
pub fn parse_dmap_file(path: &Path) -> Result<DeviceInfoMap> {
    let content = std::fs::read_to_string(path).map_err(|error| {
        Error::logic(format!(
            "cannot open dmap file {}: {}",
            path.display(),
            error
        ))
    })?;
    let directory = path.parent().unwrap_or_else(|| Path::new("."));

    let mut map = DeviceInfoMap::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let (Some(alias), Some(uri), Some(map_file)) =
            (tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(Error::logic(format!(
                "dmap file {}: line {}: expected <alias> <uri> <map file>",
                path.display(),
                index + 1
            )));
        };
        map.insert(DeviceInfo {
            alias: alias.to_string(),
            uri: uri.to_string(),
            map_file: directory.join(map_file),
            line_number: index + 1,
        });
    }

    if map.is_empty() {
        return Err(Error::logic(format!(
            "no entries in dmap file {}",
            path.display()
        )));
    }
    info!(dmap = %path.display(), devices = map.len(), "device registry loaded");
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_dmap(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_and_resolve_relative_paths() {
        let file = write_dmap(
            "# test dmap\n\
             \n\
             DUMMY1 sdm://./dummy=devices.map devices.map\n\
             PCIE0  sdm://./pci:pcieunis6     board.map\n",
        );
        let map = parse_dmap_file(file.path()).unwrap();
        assert_eq!(map.len(), 2);

        let info = map.get("DUMMY1").unwrap();
        assert_eq!(info.uri, "sdm://./dummy=devices.map");
        assert!(info.map_file.is_absolute());
        assert!(info.map_file.ends_with("devices.map"));
        assert_eq!(info.line_number, 3);

        assert!(map.get("MISSING").unwrap_err().is_logic());
    }

    #[test]
    fn test_malformed_line_is_a_logic_error() {
        let file = write_dmap("ONLY_TWO sdm://./dummy\n");
        assert!(parse_dmap_file(file.path()).unwrap_err().is_logic());
    }

    #[test]
    fn test_empty_dmap_is_a_logic_error() {
        let file = write_dmap("# nothing\n");
        let err = parse_dmap_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("no entries"));
    }

    #[test]
    fn test_duplicate_alias_replaces() {
        let file = write_dmap(
            "DEV sdm://./dummy=a.map a.map\n\
             DEV sdm://./dummy=b.map b.map\n",
        );
        let map = parse_dmap_file(file.path()).unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.get("DEV").unwrap().map_file.ends_with("b.map"));
    }
}
