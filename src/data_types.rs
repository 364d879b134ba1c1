//! Payload type description for registers.
//!
//! A register's payload is described on two levels. [`ChannelInfo`] gives the
//! exact bit layout of one channel inside one element (offset, transport
//! encoding, significant bits, fractional bits, signedness). The derived
//! [`DataDescriptor`] summarizes the whole register for clients that only
//! care about what kind of value comes out of the cooked conversion.

use serde::{Deserialize, Serialize};

/// On-the-wire encoding of one channel.
///
/// The variants are ordered by the amount of information the encoding can
/// hold. For 2D registers with mixed encodings in the channels, the largest
/// variant wins when deriving the register-wide descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    /// No payload bits; the register only signals events.
    Void,
    /// Fixed-point integer, includes plain integers (zero fractional bits).
    FixedPoint,
    /// IEEE754 single-precision floating point.
    Ieee754,
    /// ASCII text packed into the transport words.
    Ascii,
}

/// What kind of value the cooked conversion produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundamentalType {
    Boolean,
    Numeric,
    String,
    NoData,
}

/// Refinement of [`TransportType`] distinguishing integral from fractional
/// fixed-point payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    Void,
    Integral,
    Fractional,
    Ieee754,
    Ascii,
}

/// Bit layout of one channel inside one element.
///
/// Scalar and 1D registers have exactly one channel; 2D multiplexed registers
/// have one entry per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Offset in bits relative to the beginning of the element.
    pub bit_offset: u32,
    /// Transport encoding of this channel.
    pub transport: TransportType,
    /// Number of significant bits.
    pub width: u32,
    /// Number of fractional bits (may be negative).
    pub fractional_bits: i32,
    /// Signed/unsigned flag.
    pub signed: bool,
}

impl ChannelInfo {
    /// A plain fixed-point channel at bit offset 0.
    pub fn fixed_point(width: u32, fractional_bits: i32, signed: bool) -> Self {
        ChannelInfo {
            bit_offset: 0,
            transport: TransportType::FixedPoint,
            width,
            fractional_bits,
            signed,
        }
    }

    /// Transport bytes occupied by this channel (1, 2 or 4).
    pub fn raw_bytes(&self) -> u32 {
        match self.width {
            0 => 0,
            1..=8 => 1,
            9..=16 => 2,
            _ => 4,
        }
    }
}

/// Summary of the payload a register holds, derived from its channel list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDescriptor {
    pub fundamental: FundamentalType,
    pub kind: DescriptorKind,
    /// Raw word size in bits of the widest channel.
    pub raw_bits: u32,
    pub fractional_bits: i32,
    pub signed: bool,
}

impl DataDescriptor {
    /// Derive the register-wide descriptor from the per-channel layout.
    ///
    /// For mixed-transport channel lists the widest transport wins, in the
    /// ordering void < fixed_point < ieee754 < ascii.
    pub fn from_channels(channels: &[ChannelInfo]) -> Self {
        let transport = channels
            .iter()
            .map(|c| c.transport)
            .max()
            .unwrap_or(TransportType::Void);
        let widest = channels
            .iter()
            .filter(|c| c.transport == transport)
            .max_by_key(|c| c.width);

        match (transport, widest) {
            (TransportType::Void, _) | (_, None) => DataDescriptor {
                fundamental: FundamentalType::NoData,
                kind: DescriptorKind::Void,
                raw_bits: 0,
                fractional_bits: 0,
                signed: false,
            },
            (TransportType::FixedPoint, Some(c)) => DataDescriptor {
                fundamental: if c.width == 1 && c.fractional_bits == 0 && !c.signed {
                    FundamentalType::Boolean
                } else {
                    FundamentalType::Numeric
                },
                kind: if c.fractional_bits == 0 {
                    DescriptorKind::Integral
                } else {
                    DescriptorKind::Fractional
                },
                raw_bits: c.width,
                fractional_bits: c.fractional_bits,
                signed: c.signed,
            },
            (TransportType::Ieee754, Some(c)) => DataDescriptor {
                fundamental: FundamentalType::Numeric,
                kind: DescriptorKind::Ieee754,
                raw_bits: c.width,
                fractional_bits: 0,
                signed: true,
            },
            (TransportType::Ascii, Some(c)) => DataDescriptor {
                fundamental: FundamentalType::String,
                kind: DescriptorKind::Ascii,
                raw_bits: c.width,
                fractional_bits: 0,
                signed: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_ordering() {
        assert!(TransportType::Void < TransportType::FixedPoint);
        assert!(TransportType::FixedPoint < TransportType::Ieee754);
        assert!(TransportType::Ieee754 < TransportType::Ascii);
    }

    #[test]
    fn test_descriptor_from_single_channel() {
        let desc = DataDescriptor::from_channels(&[ChannelInfo::fixed_point(18, 4, true)]);
        assert_eq!(desc.fundamental, FundamentalType::Numeric);
        assert_eq!(desc.kind, DescriptorKind::Fractional);
        assert_eq!(desc.raw_bits, 18);
        assert_eq!(desc.fractional_bits, 4);
        assert!(desc.signed);
    }

    #[test]
    fn test_descriptor_widest_transport_wins() {
        let channels = [
            ChannelInfo::fixed_point(16, 0, false),
            ChannelInfo {
                bit_offset: 16,
                transport: TransportType::Ieee754,
                width: 32,
                fractional_bits: 0,
                signed: true,
            },
        ];
        let desc = DataDescriptor::from_channels(&channels);
        assert_eq!(desc.kind, DescriptorKind::Ieee754);
        assert_eq!(desc.raw_bits, 32);
    }

    #[test]
    fn test_descriptor_boolean_and_void() {
        let desc = DataDescriptor::from_channels(&[ChannelInfo::fixed_point(1, 0, false)]);
        assert_eq!(desc.fundamental, FundamentalType::Boolean);

        let void = DataDescriptor::from_channels(&[]);
        assert_eq!(void.fundamental, FundamentalType::NoData);
        assert_eq!(void.kind, DescriptorKind::Void);
    }

    #[test]
    fn test_channel_raw_bytes() {
        assert_eq!(ChannelInfo::fixed_point(8, 0, false).raw_bytes(), 1);
        assert_eq!(ChannelInfo::fixed_point(12, 0, false).raw_bytes(), 2);
        assert_eq!(ChannelInfo::fixed_point(17, 0, false).raw_bytes(), 4);
        assert_eq!(ChannelInfo::fixed_point(32, 0, false).raw_bytes(), 4);
    }
}
