//! Typed accessors over numeric-addressed backends.
//!
//! [`NumericAccessor`] is the workhorse transfer element for scalar and 1D
//! registers: it holds a cooked `1 × n` buffer of the user type and decodes
//! it out of (or encodes it into) the raw word buffer of a shared
//! [`LowLevelTransferElement`](super::low_level::LowLevelTransferElement).
//! Void registers get their own lightweight elements, since they carry no
//! payload at all.

use crate::access_mode::AccessModeFlags;
use crate::backend::low_level::{adopt_or_merge, LowLevelTransferElement};
use crate::backend::Backend;
use crate::catalogue::{Access, RegisterInfo};
use crate::data_types::TransportType;
use crate::error::{Error, Result};
use crate::fixed_point::FixedPointConverter;
use crate::transfer::{
    ElementCore, NdAccessor, SharedElement, TransferElement, TransferType, TypedElement,
};
use crate::user_types::{UserType, Void};
use crate::version::VersionNumber;
use std::any::{Any, TypeId};
use std::sync::mpsc;
use std::sync::Arc;

/// How raw words map to cooked values for one register channel.
#[derive(Debug, Clone)]
pub(crate) enum DecodeMode {
    Fixed(FixedPointConverter),
    Ieee754,
    /// Bit-exact pass-through; restricted to `i32` buffers at construction.
    Raw,
    /// Text packed four bytes per word; restricted to `String` buffers.
    Ascii,
}

impl DecodeMode {
    pub(crate) fn decode<T: UserType>(&self, word: u32) -> Result<T> {
        match self {
            DecodeMode::Fixed(converter) => converter.to_cooked(word),
            DecodeMode::Ieee754 => T::from_cooked_f64(f32::from_bits(word) as f64),
            DecodeMode::Raw => T::from_raw_bits(word),
            DecodeMode::Ascii => Err(Error::logic("ascii registers decode whole buffers")),
        }
    }

    pub(crate) fn encode<T: UserType>(&self, value: &T) -> Result<u32> {
        match self {
            DecodeMode::Fixed(converter) => converter.to_raw(value),
            DecodeMode::Ieee754 => Ok((value.to_f64()? as f32).to_bits()),
            DecodeMode::Raw => value.to_raw_bits(),
            DecodeMode::Ascii => Err(Error::logic("ascii registers encode whole buffers")),
        }
    }
}

/// Transfer element for a scalar or 1D slice of a numeric-addressed
/// register.
pub struct NumericAccessor<T: UserType> {
    core: ElementCore,
    backend: Arc<dyn Backend>,
    info: RegisterInfo,
    mode: DecodeMode,
    /// Shared raw element this accessor decodes from. Replaced by the
    /// transfer group when ranges merge.
    raw: SharedElement,
    /// Word index of this accessor's first element inside the raw buffer.
    first_word: usize,
    /// Byte range of the accessed slice, fixed at construction.
    slice_start: u64,
    slice_bytes: u64,
    n_words: usize,
    buffer: Vec<T>,
    /// Push-type delivery for `wait_for_new_data` accessors.
    wait_receiver: Option<mpsc::Receiver<VersionNumber>>,
    pending_version: Option<VersionNumber>,
}

impl<T: UserType> NumericAccessor<T> {
    fn channel_closed_error(&self) -> Error {
        Error::runtime(format!(
            "{}: interrupt channel closed by backend",
            self.core.name
        ))
    }

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

    fn decode_buffer(&mut self) -> Result<()> {
        if matches!(self.mode, DecodeMode::Ascii) {
            let mut bytes = Vec::with_capacity(self.n_words * 4);
            self.with_raw(|leaf| {
                for word in &leaf.words()[self.first_word..self.first_word + self.n_words] {
                    bytes.extend_from_slice(&word.to_le_bytes());
                }
            })?;
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            let text = String::from_utf8_lossy(&bytes[..end]).into_owned();
            self.buffer[0] = T::from_text(&text)?;
            return Ok(());
        }

        let first = self.first_word;
        let n = self.n_words;
        let words: Vec<u32> =
            self.with_raw(|leaf| leaf.words()[first..first + n].to_vec())?;
        for (slot, word) in self.buffer.iter_mut().zip(words) {
            *slot = self.mode.decode(word)?;
        }
        Ok(())
    }

    fn encode_buffer(&mut self) -> Result<()> {
        if matches!(self.mode, DecodeMode::Ascii) {
            let mut bytes = self.buffer[0].to_text().into_bytes();
            bytes.resize(self.n_words * 4, 0);
            let first = self.first_word;
            return self.with_raw(|leaf| {
                for (slot, chunk) in leaf.words_mut()[first..].iter_mut().zip(bytes.chunks(4)) {
                    *slot = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                }
            });
        }

        let mut words = Vec::with_capacity(self.n_words);
        for value in &self.buffer {
            words.push(self.mode.encode(value)?);
        }
        let first = self.first_word;
        self.with_raw(|leaf| {
            leaf.words_mut()[first..first + words.len()].copy_from_slice(&words);
        })
    }
}

impl<T: UserType> TransferElement for NumericAccessor<T> {
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
        let delivered = match &self.wait_receiver {
            Some(receiver) => match receiver.recv() {
                Ok(version) => Some(version),
                Err(mpsc::RecvError) => return Err(self.channel_closed_error()),
            },
            None => None,
        };
        if delivered.is_some() {
            self.pending_version = delivered;
        }
        self.with_raw(|leaf| leaf.read_transfer())?
    }

    fn do_read_transfer_nonblocking(&mut self) -> Result<bool> {
        let polled = match &self.wait_receiver {
            Some(receiver) => receiver.try_recv(),
            None => {
                self.do_read_transfer()?;
                return Ok(true);
            }
        };
        match polled {
            Ok(version) => {
                self.pending_version = Some(version);
                self.with_raw(|leaf| leaf.read_transfer())??;
                Ok(true)
            }
            Err(mpsc::TryRecvError::Empty) => Ok(false),
            Err(mpsc::TryRecvError::Disconnected) => Err(self.channel_closed_error()),
        }
    }

    fn do_read_transfer_latest(&mut self) -> Result<bool> {
        let mut latest = None;
        let mut closed = false;
        match &self.wait_receiver {
            Some(receiver) => loop {
                match receiver.try_recv() {
                    Ok(version) => latest = Some(version),
                    Err(mpsc::TryRecvError::Empty) => break,
                    Err(mpsc::TryRecvError::Disconnected) => {
                        closed = true;
                        break;
                    }
                }
            },
            None => {
                self.do_read_transfer()?;
                return Ok(true);
            }
        }
        if closed {
            return Err(self.channel_closed_error());
        }
        match latest {
            Some(version) => {
                self.pending_version = Some(version);
                self.with_raw(|leaf| leaf.read_transfer())??;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn do_post_read(&mut self, _ty: TransferType, update: bool) -> Result<()> {
        if !update {
            return Ok(());
        }
        self.decode_buffer()?;
        self.core.version = self
            .pending_version
            .take()
            .unwrap_or_else(VersionNumber::new);
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

impl<T: UserType> NdAccessor<T> for NumericAccessor<T> {
    fn n_channels(&self) -> usize {
        1
    }

    fn n_elements(&self) -> usize {
        self.buffer.len()
    }

    fn channel_slice(&self, channel: usize) -> &[T] {
        assert_eq!(channel, 0, "scalar/1D accessors have a single channel");
        &self.buffer
    }

    fn channel_slice_mut(&mut self, channel: usize) -> &mut [T] {
        assert_eq!(channel, 0, "scalar/1D accessors have a single channel");
        &mut self.buffer
    }
}

/// Validate the requested access modes against what the register supports.
fn check_flags(info: &RegisterInfo, flags: AccessModeFlags) -> Result<()> {
    let unsupported = flags.difference(info.supported_access_modes());
    if !unsupported.is_empty() {
        return Err(Error::logic(format!(
            "register {} does not support access mode {}",
            info.path(),
            unsupported
        )));
    }
    Ok(())
}

/// Build a typed accessor element for a scalar or 1D register slice.
pub(crate) fn make_numeric_accessor<T: UserType>(
    backend: &Arc<dyn Backend>,
    info: &RegisterInfo,
    num_words: usize,
    word_offset: usize,
    flags: AccessModeFlags,
) -> Result<TypedElement<T>> {
    if info.n_channels() != 1 {
        return Err(Error::logic(format!(
            "register {} is two-dimensional; use a 2D accessor",
            info.path()
        )));
    }
    let channel = info.channels()[0];
    if channel.transport == TransportType::Void {
        return Err(Error::logic(format!(
            "register {} carries no data; use a void accessor",
            info.path()
        )));
    }
    if info.element_pitch_bits() != 32 {
        return Err(Error::logic(format!(
            "register {} has a non-word element pitch",
            info.path()
        )));
    }
    check_flags(info, flags)?;

    let n_elements = info.n_elements() as usize;
    if word_offset >= n_elements {
        return Err(Error::logic(format!(
            "offset {} is beyond the {} elements of register {}",
            word_offset,
            n_elements,
            info.path()
        )));
    }
    let n_words = if num_words == 0 {
        n_elements - word_offset
    } else {
        num_words
    };
    if word_offset + n_words > n_elements {
        return Err(Error::logic(format!(
            "requested {} elements at offset {} exceed the {} elements of register {}",
            n_words,
            word_offset,
            n_elements,
            info.path()
        )));
    }

    let mode = if flags.contains(AccessModeFlags::RAW) {
        if TypeId::of::<T>() != TypeId::of::<i32>() {
            return Err(Error::logic(format!(
                "raw access mode requires the raw word type i32, got {}",
                T::type_name()
            )));
        }
        DecodeMode::Raw
    } else {
        match channel.transport {
            TransportType::FixedPoint => DecodeMode::Fixed(FixedPointConverter::new(
                channel.width,
                channel.fractional_bits,
                channel.signed,
            )?),
            TransportType::Ieee754 => DecodeMode::Ieee754,
            TransportType::Ascii => {
                if TypeId::of::<T>() != TypeId::of::<String>() {
                    return Err(Error::logic(format!(
                        "register {} holds text; use a String accessor",
                        info.path()
                    )));
                }
                DecodeMode::Ascii
            }
            TransportType::Void => unreachable!("rejected above"),
        }
    };

    let wait_receiver = if flags.contains(AccessModeFlags::WAIT_FOR_NEW_DATA) {
        let (controller, interrupt) = info.interrupt();
        Some(backend.interrupt_receiver(controller, interrupt)?)
    } else {
        None
    };

    let slice_start = info.address() + 4 * word_offset as u64;
    let slice_bytes = 4 * n_words as u64;
    let raw =
        LowLevelTransferElement::new_shared(backend.clone(), info.bar(), slice_start, n_words);

    let buffer_len = if matches!(mode, DecodeMode::Ascii) {
        1
    } else {
        n_words
    };

    let core = ElementCore::new(info.path().clone(), flags)
        .with_exception_backend(backend.clone());
    Ok(TypedElement::new(NumericAccessor {
        core,
        backend: backend.clone(),
        info: info.clone(),
        mode,
        raw,
        first_word: 0,
        slice_start,
        slice_bytes,
        n_words,
        buffer: vec![T::default(); buffer_len],
        wait_receiver,
        pending_version: None,
    }))
}

// ----------------------------------------------------------------------
// Void elements
// ----------------------------------------------------------------------

/// Synchronous void element: write-only trigger with a zero-length payload.
pub struct SyncVoidElement {
    core: ElementCore,
    backend: Arc<dyn Backend>,
    info: RegisterInfo,
    buffer: [Void; 1],
}

impl TransferElement for SyncVoidElement {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn is_readable(&self) -> bool {
        // synchronous void accessors are never readable
        false
    }

    fn is_writeable(&self) -> bool {
        self.info.is_writeable()
    }

    fn do_read_transfer(&mut self) -> Result<()> {
        Err(Error::logic(format!(
            "{} is a synchronous void element and cannot be read",
            self.core.name
        )))
    }

    fn do_write_transfer(&mut self, _version: VersionNumber) -> Result<()> {
        self.backend
            .write_area(self.info.bar(), self.info.address(), &[])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl NdAccessor<Void> for SyncVoidElement {
    fn n_channels(&self) -> usize {
        1
    }

    fn n_elements(&self) -> usize {
        1
    }

    fn channel_slice(&self, _channel: usize) -> &[Void] {
        &self.buffer
    }

    fn channel_slice_mut(&mut self, _channel: usize) -> &mut [Void] {
        &mut self.buffer
    }
}

/// Push-type void element: wakes up once per interrupt delivery.
pub struct PushVoidElement {
    core: ElementCore,
    info: RegisterInfo,
    receiver: mpsc::Receiver<VersionNumber>,
    pending_version: Option<VersionNumber>,
    buffer: [Void; 1],
}

impl PushVoidElement {
    fn channel_closed(&self) -> Error {
        Error::runtime(format!(
            "{}: interrupt channel closed by backend",
            self.core.name
        ))
    }
}

impl TransferElement for PushVoidElement {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn is_readable(&self) -> bool {
        true
    }

    fn is_writeable(&self) -> bool {
        self.info.is_writeable()
    }

    fn do_read_transfer(&mut self) -> Result<()> {
        match self.receiver.recv() {
            Ok(version) => {
                self.pending_version = Some(version);
                Ok(())
            }
            Err(mpsc::RecvError) => Err(self.channel_closed()),
        }
    }

    fn do_read_transfer_nonblocking(&mut self) -> Result<bool> {
        match self.receiver.try_recv() {
            Ok(version) => {
                self.pending_version = Some(version);
                Ok(true)
            }
            Err(mpsc::TryRecvError::Empty) => Ok(false),
            Err(mpsc::TryRecvError::Disconnected) => Err(self.channel_closed()),
        }
    }

    fn do_read_transfer_latest(&mut self) -> Result<bool> {
        let mut latest = None;
        loop {
            match self.receiver.try_recv() {
                Ok(version) => latest = Some(version),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => return Err(self.channel_closed()),
            }
        }
        Ok(match latest {
            Some(version) => {
                self.pending_version = Some(version);
                true
            }
            None => false,
        })
    }

    fn do_post_read(&mut self, _ty: TransferType, update: bool) -> Result<()> {
        if update {
            self.core.version = self
                .pending_version
                .take()
                .unwrap_or_else(VersionNumber::new);
            self.core.validity = crate::transfer::DataValidity::Ok;
        }
        Ok(())
    }

    fn do_write_transfer(&mut self, _version: VersionNumber) -> Result<()> {
        Err(Error::logic(format!(
            "{} is a push-type void element and cannot be written",
            self.core.name
        )))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl NdAccessor<Void> for PushVoidElement {
    fn n_channels(&self) -> usize {
        1
    }

    fn n_elements(&self) -> usize {
        1
    }

    fn channel_slice(&self, _channel: usize) -> &[Void] {
        &self.buffer
    }

    fn channel_slice_mut(&mut self, _channel: usize) -> &mut [Void] {
        &mut self.buffer
    }
}

/// Build a void accessor element, enforcing the construction rules: without
/// `wait_for_new_data` the register must be writeable; with it, the register
/// must be a push source.
pub(crate) fn make_void_accessor(
    backend: &Arc<dyn Backend>,
    info: &RegisterInfo,
    flags: AccessModeFlags,
) -> Result<TypedElement<Void>> {
    if flags.contains(AccessModeFlags::RAW) {
        return Err(Error::logic(format!(
            "register {}: void accessors do not support raw mode",
            info.path()
        )));
    }

    if flags.contains(AccessModeFlags::WAIT_FOR_NEW_DATA) {
        if info.access() != Access::Interrupt {
            return Err(Error::logic(format!(
                "register {} does not support access mode {}",
                info.path(),
                AccessModeFlags::WAIT_FOR_NEW_DATA
            )));
        }
        let (controller, interrupt) = info.interrupt();
        let receiver = backend.interrupt_receiver(controller, interrupt)?;
        let core = ElementCore::new(info.path().clone(), flags)
            .with_exception_backend(backend.clone());
        return Ok(TypedElement::new(PushVoidElement {
            core,
            info: info.clone(),
            receiver,
            pending_version: None,
            buffer: [Void],
        }));
    }

    if !info.is_writeable() {
        return Err(Error::logic(format!(
            "a void accessor without wait_for_new_data does not make sense for \
             non-writeable register {}",
            info.path()
        )));
    }
    let core = ElementCore::new(info.path().clone(), flags)
        .with_exception_backend(backend.clone());
    Ok(TypedElement::new(SyncVoidElement {
        core,
        backend: backend.clone(),
        info: info.clone(),
        buffer: [Void],
    }))
}
