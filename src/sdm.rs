//! SDM device-URI parser.
//!
//! Device URIs follow the SDM form
//! `sdm://<host>/<interface>:<instance>;<protocol>`, with an alternative
//! `=`-separated parameter list `sdm://<host>/<interface>=<p1>,<p2>,...`.
//! Legacy filesystem-style strings are recognised heuristically: device
//! nodes (`/dev/<name>`) address a PCIe backend, map file names
//! (`*.map`/`*.mapp`) an in-memory dummy.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parsed form of an SDM device URI.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sdm {
    pub host: String,
    pub interface: String,
    pub instance: String,
    pub protocol: String,
    pub parameters: Vec<String>,
}

impl Sdm {
    /// Parse a strict `sdm://` URI. Parsing problems are logic errors.
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("sdm://")
            .ok_or_else(|| Error::logic(format!("'{}' is not an sdm URI", uri)))?;
        let (host, rest) = rest
            .split_once('/')
            .ok_or_else(|| Error::logic(format!("sdm URI '{}' is missing the interface", uri)))?;

        let mut sdm = Sdm {
            host: host.to_string(),
            ..Default::default()
        };

        if let Some((interface, parameters)) = rest.split_once('=') {
            sdm.interface = interface.to_string();
            sdm.parameters = parameters
                .split(',')
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        } else {
            let (body, protocol) = match rest.split_once(';') {
                Some((body, protocol)) => (body, protocol.to_string()),
                None => (rest, String::new()),
            };
            sdm.protocol = protocol;
            match body.split_once(':') {
                Some((interface, instance)) => {
                    sdm.interface = interface.to_string();
                    sdm.instance = instance.to_string();
                }
                None => sdm.interface = body.to_string(),
            }
        }

        if sdm.interface.is_empty() {
            return Err(Error::logic(format!(
                "sdm URI '{}' has an empty interface",
                uri
            )));
        }
        Ok(sdm)
    }

    /// Parse a device URI, accepting both strict SDM form and the legacy
    /// filesystem heuristics.
    pub fn parse_lenient(uri: &str) -> Result<Self> {
        if uri.starts_with("sdm://") {
            return Self::parse(uri);
        }
        if let Some(node) = uri.strip_prefix("/dev/") {
            return Ok(Sdm {
                host: ".".to_string(),
                interface: "pci".to_string(),
                instance: node.to_string(),
                ..Default::default()
            });
        }
        if uri.ends_with(".map") || uri.ends_with(".mapp") {
            return Ok(Sdm {
                host: ".".to_string(),
                interface: "dummy".to_string(),
                parameters: vec![uri.to_string()],
                ..Default::default()
            });
        }
        Err(Error::logic(format!(
            "'{}' is neither an sdm URI nor a recognised legacy device string",
            uri
        )))
    }
}

impl fmt::Display for Sdm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sdm://{}/{}", self.host, self.interface)?;
        if !self.parameters.is_empty() {
            return write!(f, "={}", self.parameters.join(","));
        }
        if !self.instance.is_empty() {
            write!(f, ":{}", self.instance)?;
        }
        if !self.protocol.is_empty() {
            write!(f, ";{}", self.protocol)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_form() {
        let sdm = Sdm::parse("sdm://host3/pci:pcieunis6;undefined").unwrap();
        assert_eq!(sdm.host, "host3");
        assert_eq!(sdm.interface, "pci");
        assert_eq!(sdm.instance, "pcieunis6");
        assert_eq!(sdm.protocol, "undefined");
        assert!(sdm.parameters.is_empty());
    }

    #[test]
    fn test_parse_parameter_list() {
        let sdm = Sdm::parse("sdm://./dummy=devices.map,extra").unwrap();
        assert_eq!(sdm.host, ".");
        assert_eq!(sdm.interface, "dummy");
        assert_eq!(sdm.parameters, ["devices.map", "extra"]);
        assert!(sdm.instance.is_empty());
    }

    #[test]
    fn test_parse_errors_are_logic_errors() {
        assert!(Sdm::parse("http://foo/bar").unwrap_err().is_logic());
        assert!(Sdm::parse("sdm://hostonly").unwrap_err().is_logic());
        assert!(Sdm::parse("sdm://./").unwrap_err().is_logic());
    }

    #[test]
    fn test_legacy_heuristics() {
        let pci = Sdm::parse_lenient("/dev/pcieunidummys6").unwrap();
        assert_eq!(pci.interface, "pci");
        assert_eq!(pci.instance, "pcieunidummys6");

        let dummy = Sdm::parse_lenient("devices.map").unwrap();
        assert_eq!(dummy.interface, "dummy");
        assert_eq!(dummy.parameters, ["devices.map"]);

        let dummy = Sdm::parse_lenient("registers.mapp").unwrap();
        assert_eq!(dummy.interface, "dummy");

        assert!(Sdm::parse_lenient("garbage").unwrap_err().is_logic());
    }

    #[test]
    fn test_display_round_trip() {
        for uri in [
            "sdm://./dummy=devices.map",
            "sdm://host3/pci:pcieunis6;undefined",
            "sdm://./rebot:remote",
        ] {
            assert_eq!(Sdm::parse(uri).unwrap().to_string(), uri);
        }
    }
}
