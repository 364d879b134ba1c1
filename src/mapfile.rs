//! MAP register-description file parser.
//!
//! A MAP file describes the register layout of one numeric-addressed device,
//! one register per line:
//!
//! ```text
//! # name          n_elements  address  n_bytes  bar  width  n_frac  signed  access
//! BOARD.WORD_FIRMWARE    1    0x0      4        0    32     0       0       RO
//! ADC.AREA_DATA          16   0x100    64       0    18     4       1
//! ```
//!
//! Module-qualified names (`MODULE.REGISTER`) map to hierarchical paths
//! (`/MODULE/REGISTER`). Columns after `bar` are optional and default to a
//! 32-bit signed integer, read-write register. The access column accepts
//! `RO`, `WO`, `RW` and `INTERRUPT<ctrl>:<id>`.
//!
//! 2D multiplexed regions use the area/sequence convention: a register named
//! `AREA_MULTIPLEXED_SEQUENCE_<name>` describes the full byte region, and
//! one `SEQUENCE_<name>_<i>` line per channel describes that channel's
//! width. Channels pack into 32-bit words without straddling word
//! boundaries.

use crate::catalogue::{Access, RegisterCatalogue, RegisterInfo};
use crate::data_types::{ChannelInfo, TransportType};
use crate::error::{Error, Result};
use crate::register_path::RegisterPath;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

const MULTIPLEXED_AREA_PREFIX: &str = "AREA_MULTIPLEXED_SEQUENCE_";
const SEQUENCE_PREFIX: &str = "SEQUENCE_";

#[derive(Debug, Clone)]
struct RawLine {
    module: String,
    name: String,
    n_elements: u32,
    address: u64,
    n_bytes: u64,
    bar: u64,
    width: u32,
    fractional_bits: i32,
    signed: bool,
    access: Access,
    transport: Option<TransportType>,
    interrupt: (u32, u32),
    line_number: usize,
}

fn parse_u64(token: &str) -> Option<u64> {
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        token.parse().ok()
    }
}

fn parse_error(path: &Path, line_number: usize, message: impl AsRef<str>) -> Error {
    Error::logic(format!(
        "map file {}: line {}: {}",
        path.display(),
        line_number,
        message.as_ref()
    ))
}

fn parse_access(token: &str) -> Option<(Access, (u32, u32))> {
    match token {
        "RO" => Some((Access::ReadOnly, (0, 0))),
        "WO" => Some((Access::WriteOnly, (0, 0))),
        "RW" => Some((Access::ReadWrite, (0, 0))),
        _ => {
            let spec = token.strip_prefix("INTERRUPT")?;
            let (controller, interrupt) = spec.split_once(':')?;
            Some((
                Access::Interrupt,
                (controller.parse().ok()?, interrupt.parse().ok()?),
            ))
        }
    }
}

fn parse_transport(token: &str) -> Option<TransportType> {
    match token {
        "FIXED_POINT" => Some(TransportType::FixedPoint),
        "IEEE754" => Some(TransportType::Ieee754),
        "ASCII" => Some(TransportType::Ascii),
        "VOID" => Some(TransportType::Void),
        _ => None,
    }
}

fn parse_line(path: &Path, line_number: usize, line: &str) -> Result<RawLine> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 5 {
        return Err(parse_error(
            path,
            line_number,
            "expected at least <name> <n_elements> <address> <n_bytes> <bar>",
        ));
    }

    let (module, name) = match tokens[0].split_once('.') {
        Some((module, name)) => (module.to_string(), name.to_string()),
        None => (String::new(), tokens[0].to_string()),
    };

    let n_elements = parse_u64(tokens[1])
        .ok_or_else(|| parse_error(path, line_number, "invalid element count"))?
        as u32;
    let address = parse_u64(tokens[2])
        .ok_or_else(|| parse_error(path, line_number, "invalid address"))?;
    let n_bytes = parse_u64(tokens[3])
        .ok_or_else(|| parse_error(path, line_number, "invalid byte count"))?;
    let bar = parse_u64(tokens[4])
        .ok_or_else(|| parse_error(path, line_number, "invalid bar"))?;

    let width = match tokens.get(5) {
        Some(token) => parse_u64(token)
            .ok_or_else(|| parse_error(path, line_number, "invalid bit width"))?
            as u32,
        None => 32,
    };
    let fractional_bits = match tokens.get(6) {
        Some(token) => token
            .parse()
            .map_err(|_| parse_error(path, line_number, "invalid fractional bit count"))?,
        None => 0,
    };
    let signed = match tokens.get(7) {
        Some(token) => parse_u64(token)
            .ok_or_else(|| parse_error(path, line_number, "invalid signed flag"))?
            != 0,
        None => true,
    };
    let (access, interrupt) = match tokens.get(8) {
        Some(token) => parse_access(token)
            .ok_or_else(|| parse_error(path, line_number, "invalid access specifier"))?,
        None => (Access::ReadWrite, (0, 0)),
    };
    let transport = match tokens.get(9) {
        Some(token) => Some(
            parse_transport(token)
                .ok_or_else(|| parse_error(path, line_number, "invalid data type"))?,
        ),
        None => None,
    };

    Ok(RawLine {
        module,
        name,
        n_elements,
        address,
        n_bytes,
        bar,
        width,
        fractional_bits,
        signed,
        access,
        transport,
        interrupt,
        line_number,
    })
}

fn register_path(module: &str, name: &str) -> RegisterPath {
    if module.is_empty() {
        RegisterPath::new(name)
    } else {
        RegisterPath::new(&format!("{}/{}", module, name))
    }
}

fn build_plain_register(raw: &RawLine) -> RegisterInfo {
    let transport = raw.transport.unwrap_or(if raw.width == 0 {
        TransportType::Void
    } else {
        TransportType::FixedPoint
    });
    let width = if transport == TransportType::Void {
        0
    } else {
        raw.width
    };
    let mut info = RegisterInfo::new_1d(
        register_path(&raw.module, &raw.name),
        raw.n_elements,
        raw.bar,
        raw.address,
        width,
        raw.fractional_bits,
        raw.signed,
        raw.access,
    );
    if transport != TransportType::Void && transport != TransportType::FixedPoint {
        info = info.with_transport(transport);
    }
    if raw.access == Access::Interrupt {
        info = info.with_interrupt(raw.interrupt.0, raw.interrupt.1);
    }
    info
}

/// Pack sequence channels into 32-bit words; a channel never straddles a
/// word boundary. Returns the channel layouts and the element pitch in bits.
fn pack_channels(sequences: &[RawLine]) -> (Vec<ChannelInfo>, u32) {
    let mut channels = Vec::with_capacity(sequences.len());
    let mut word_start: u32 = 0;
    let mut fill: u32 = 0;
    for sequence in sequences {
        let n_bytes = ChannelInfo::fixed_point(sequence.width, 0, false).raw_bytes();
        if fill + n_bytes > 4 {
            word_start += 4;
            fill = 0;
        }
        channels.push(ChannelInfo {
            bit_offset: (word_start + fill) * 8,
            transport: sequence.transport.unwrap_or(TransportType::FixedPoint),
            width: sequence.width,
            fractional_bits: sequence.fractional_bits,
            signed: sequence.signed,
        });
        fill += n_bytes;
    }
    let total_words = word_start / 4 + u32::from(fill > 0);
    (channels, total_words * 4 * 8)
}

/// Parse a MAP file into a register catalogue.
pub fn parse_map_file(path: &Path) -> Result<RegisterCatalogue> {
    let content = std::fs::read_to_string(path).map_err(|error| {
        Error::logic(format!("cannot open map file {}: {}", path.display(), error))
    })?;

    let mut plain = Vec::new();
    let mut areas: Vec<RawLine> = Vec::new();
    let mut sequences: HashMap<String, Vec<RawLine>> = HashMap::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('@') {
            continue;
        }
        let raw = parse_line(path, index + 1, line)?;
        if let Some(area) = raw.name.strip_prefix(MULTIPLEXED_AREA_PREFIX) {
            let mut raw = raw.clone();
            raw.name = area.to_string();
            areas.push(raw);
        } else if let Some(rest) = raw.name.strip_prefix(SEQUENCE_PREFIX) {
            let Some((area, index_str)) = rest.rsplit_once('_') else {
                return Err(parse_error(
                    path,
                    raw.line_number,
                    "sequence name must end in _<channel index>",
                ));
            };
            if index_str.parse::<u32>().is_err() {
                return Err(parse_error(
                    path,
                    raw.line_number,
                    "sequence name must end in _<channel index>",
                ));
            }
            if raw.n_elements != 1 {
                return Err(parse_error(
                    path,
                    raw.line_number,
                    "sequence words must have exactly one element",
                ));
            }
            let key = format!("{}.{}", raw.module, area);
            sequences.entry(key).or_default().push(raw);
        } else {
            plain.push(raw);
        }
    }

    let mut catalogue = RegisterCatalogue::new();
    for raw in &plain {
        catalogue.add_register(build_plain_register(raw));
    }

    for area in &areas {
        let key = format!("{}.{}", area.module, area.name);
        let Some(area_sequences) = sequences.get(&key) else {
            return Err(parse_error(
                path,
                area.line_number,
                format!("no sequences found for multiplexed area '{}'", area.name),
            ));
        };
        let (channels, pitch_bits) = pack_channels(area_sequences);
        let n_elements = (area.n_bytes / (pitch_bits as u64 / 8)) as u32;
        let mut info = RegisterInfo::new_2d(
            register_path(&area.module, &area.name),
            n_elements,
            area.bar,
            area.address,
            pitch_bits,
            channels,
            area.access,
        );
        if area.access == Access::Interrupt {
            info = info.with_interrupt(area.interrupt.0, area.interrupt.1);
        }
        catalogue.add_register(info);
    }

    if catalogue.is_empty() {
        return Err(Error::logic(format!(
            "no registers in map file {}",
            path.display()
        )));
    }
    info!(
        map = %path.display(),
        registers = catalogue.len(),
        "register catalogue loaded"
    );
    Ok(catalogue)
}
