//! Demultiplexing accessor for 2D registers.
//!
//! A 2D register interleaves one sample per channel into a fixed-pitch
//! block, repeated once per element. The accessor reads the whole area
//! through one low-level element and demultiplexes the channels into
//! independent cooked sequences, one fixed-point converter per channel.
//! Channel layouts must be byte-aligned (1, 2 or 4 transport bytes).

use crate::access_mode::AccessModeFlags;
use crate::backend::low_level::{adopt_or_merge, LowLevelTransferElement};
use crate::backend::numeric::DecodeMode;
use crate::backend::Backend;
use crate::catalogue::RegisterInfo;
use crate::data_types::{ChannelInfo, TransportType};
use crate::error::{Error, Result};
use crate::fixed_point::FixedPointConverter;
use crate::transfer::{
    ElementCore, NdAccessor, SharedElement, TransferElement, TransferType, TypedElement,
};
use crate::user_types::UserType;
use crate::version::VersionNumber;
use std::any::Any;
use std::sync::Arc;

struct ChannelLayout {
    byte_offset: usize,
    n_bytes: usize,
    mode: DecodeMode,
}

/// Transfer element for a 2D multiplexed register.
pub struct MuxedAccessor<T: UserType> {
    core: ElementCore,
    backend: Arc<dyn Backend>,
    info: RegisterInfo,
    layouts: Vec<ChannelLayout>,
    raw: SharedElement,
    first_word: usize,
    slice_start: u64,
    slice_bytes: u64,
    pitch_bytes: usize,
    buffer: Vec<Vec<T>>,
}

impl<T: UserType> MuxedAccessor<T> {
    fn with_raw<R>(&self, f: impl FnOnce(&mut LowLevelTransferElement) -> R) -> Result<R> {
        let mut guard = self.raw.lock();
        match guard.as_any_mut().downcast_mut::<LowLevelTransferElement>() {
            Some(leaf) => Ok(f(leaf)),
            None => Err(Error::logic(format!(
                "{}: internal transfer element has an unexpected type",
                self.core.name
            ))),
        }
    }

    fn area_bytes(&self) -> Result<Vec<u8>> {
        let first = self.first_word;
        let n_words = (self.slice_bytes / 4) as usize;
        self.with_raw(|leaf| {
            let mut bytes = Vec::with_capacity(n_words * 4);
            for word in &leaf.words()[first..first + n_words] {
                bytes.extend_from_slice(&word.to_le_bytes());
            }
            bytes
        })
    }

    fn store_area_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let first = self.first_word;
        self.with_raw(|leaf| {
            for (slot, chunk) in leaf.words_mut()[first..].iter_mut().zip(bytes.chunks(4)) {
                *slot = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            }
        })
    }

    fn extract_word(bytes: &[u8], offset: usize, n_bytes: usize) -> u32 {
        let mut word = [0u8; 4];
        word[..n_bytes].copy_from_slice(&bytes[offset..offset + n_bytes]);
        u32::from_le_bytes(word)
    }

    fn decode_buffer(&mut self) -> Result<()> {
        let bytes = self.area_bytes()?;
        for block in 0..self.buffer[0].len() {
            let base = block * self.pitch_bytes;
            for (channel, layout) in self.layouts.iter().enumerate() {
                let word = Self::extract_word(&bytes, base + layout.byte_offset, layout.n_bytes);
                self.buffer[channel][block] = layout.mode.decode(word)?;
            }
        }
        Ok(())
    }

    fn encode_buffer(&mut self) -> Result<()> {
        let mut bytes = self.area_bytes()?;
        for block in 0..self.buffer[0].len() {
            let base = block * self.pitch_bytes;
            for (channel, layout) in self.layouts.iter().enumerate() {
                let word = layout.mode.encode(&self.buffer[channel][block])?;
                let le = word.to_le_bytes();
                let offset = base + layout.byte_offset;
                bytes[offset..offset + layout.n_bytes].copy_from_slice(&le[..layout.n_bytes]);
            }
        }
        self.store_area_bytes(&bytes)
    }
}

impl<T: UserType> TransferElement for MuxedAccessor<T> {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn is_readable(&self) -> bool {
        self.info.is_readable()
    }

    fn is_writeable(&self) -> bool {
        self.info.is_writeable()
    }

    fn do_read_transfer(&mut self) -> Result<()> {
        self.with_raw(|leaf| leaf.read_transfer())?
    }

    fn do_post_read(&mut self, _ty: TransferType, update: bool) -> Result<()> {
        if !update {
            return Ok(());
        }
        self.decode_buffer()?;
        self.core.version = VersionNumber::new();
        self.core.validity = crate::transfer::DataValidity::Ok;
        Ok(())
    }

    fn do_pre_write(&mut self, _ty: TransferType, _version: VersionNumber) -> Result<()> {
        self.encode_buffer()
    }

    fn do_write_transfer(&mut self, version: VersionNumber) -> Result<()> {
        self.with_raw(|leaf| leaf.write_transfer(version))?
    }

    fn internal_elements(&self) -> Vec<SharedElement> {
        vec![self.raw.clone()]
    }

    fn replace_transfer_element(&mut self, candidate: &SharedElement) {
        if let Some(first_word) = adopt_or_merge(
            &mut self.raw,
            &self.backend,
            self.info.bar(),
            self.slice_start,
            self.slice_bytes,
            candidate,
        ) {
            self.first_word = first_word;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T: UserType> NdAccessor<T> for MuxedAccessor<T> {
    fn n_channels(&self) -> usize {
        self.buffer.len()
    }

    fn n_elements(&self) -> usize {
        self.buffer[0].len()
    }

    fn channel_slice(&self, channel: usize) -> &[T] {
        &self.buffer[channel]
    }

    fn channel_slice_mut(&mut self, channel: usize) -> &mut [T] {
        &mut self.buffer[channel]
    }
}

fn channel_layout(info: &RegisterInfo, channel: &ChannelInfo) -> Result<ChannelLayout> {
    if channel.bit_offset % 8 != 0 {
        return Err(Error::logic(format!(
            "register {}: channel bit offsets must be byte-aligned",
            info.path()
        )));
    }
    let mode = match channel.transport {
        TransportType::FixedPoint => DecodeMode::Fixed(FixedPointConverter::new(
            channel.width,
            channel.fractional_bits,
            channel.signed,
        )?),
        TransportType::Ieee754 => DecodeMode::Ieee754,
        TransportType::Void | TransportType::Ascii => {
            return Err(Error::logic(format!(
                "register {}: unsupported channel transport in a 2D register",
                info.path()
            )))
        }
    };
    Ok(ChannelLayout {
        byte_offset: (channel.bit_offset / 8) as usize,
        n_bytes: channel.raw_bytes() as usize,
        mode,
    })
}

/// Build a typed accessor element for a 2D multiplexed register. Also
/// accepts single-channel registers, yielding a `1 × n` view.
pub(crate) fn make_muxed_accessor<T: UserType>(
    backend: &Arc<dyn Backend>,
    info: &RegisterInfo,
    flags: AccessModeFlags,
) -> Result<TypedElement<T>> {
    if flags.contains(AccessModeFlags::RAW) {
        return Err(Error::logic(format!(
            "register {}: 2D accessors do not support raw mode",
            info.path()
        )));
    }
    if flags.contains(AccessModeFlags::WAIT_FOR_NEW_DATA) {
        return Err(Error::logic(format!(
            "register {}: 2D accessors do not support wait_for_new_data",
            info.path()
        )));
    }
    if info.element_pitch_bits() % 8 != 0 {
        return Err(Error::logic(format!(
            "register {} has a non-byte-aligned element pitch",
            info.path()
        )));
    }
    if info.channels().is_empty() {
        return Err(Error::logic(format!(
            "register {} has no channels",
            info.path()
        )));
    }

    let layouts = info
        .channels()
        .iter()
        .map(|channel| channel_layout(info, channel))
        .collect::<Result<Vec<_>>>()?;

    let pitch_bytes = (info.element_pitch_bits() / 8) as usize;
    let n_elements = info.n_elements() as usize;
    let area_bytes = pitch_bytes * n_elements;
    let n_words = area_bytes.div_ceil(4);

    let slice_start = info.address();
    let slice_bytes = 4 * n_words as u64;
    let raw =
        LowLevelTransferElement::new_shared(backend.clone(), info.bar(), slice_start, n_words);

    let core = ElementCore::new(info.path().clone(), flags)
        .with_exception_backend(backend.clone());
    Ok(TypedElement::new(MuxedAccessor {
        core,
        backend: backend.clone(),
        info: info.clone(),
        layouts,
        raw,
        first_word: 0,
        slice_start,
        slice_bytes,
        pitch_bytes,
        buffer: vec![vec![T::default(); n_elements]; info.n_channels() as usize],
    }))
}
