//! The transfer-element protocol.
//!
//! Every object taking part in a register transfer (backend accessors,
//! decorators and the low-level elements that actually touch the transport)
//! implements [`TransferElement`]. The protocol is a strict three-phase
//! lifecycle:
//!
//! 1. **pre**: validate preconditions and prepare buffers; never performs
//!    I/O and never blocks.
//! 2. **transfer**: the backend I/O. May block. Runtime errors raised here
//!    are *latched* into the element instead of propagating, so a transfer
//!    cycle can complete on all elements before any error is reported.
//! 3. **post**: decode or release buffers, then re-raise a latched error.
//!
//! For every successful pre phase exactly one matching post phase runs,
//! regardless of transfer success.
//!
//! Elements form a DAG through [`TransferElement::internal_elements`]:
//! decorators point at their targets, backend accessors at the shared
//! low-level elements performing the actual I/O. The DAG leaves are the
//! *hardware-accessing elements*; [`TransferGroup`] deduplicates and merges
//! them so each is transferred at most once per cycle.
//!
//! [`TransferGroup`]: crate::transfer::TransferGroup

pub mod decorators;
pub mod group;

pub use group::TransferGroup;

use crate::access_mode::AccessModeFlags;
use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::register_path::RegisterPath;
use crate::user_types::UserType;
use crate::version::VersionNumber;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;

/// Shared, type-erased handle to a transfer element.
pub type SharedElement = Arc<Mutex<dyn TransferElement>>;

/// Which operation a transfer cycle performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Read,
    ReadNonBlocking,
    ReadLatest,
    Write,
    WriteDestructively,
}

/// Whether an accessor's buffer content is trustworthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataValidity {
    #[default]
    Ok,
    Faulty,
}

/// Bookkeeping shared by every transfer element.
///
/// Concrete elements embed one `ElementCore` and expose it through
/// [`TransferElement::core`]; the provided lifecycle methods drive the state
/// machine through it.
pub struct ElementCore {
    pub name: RegisterPath,
    pub flags: AccessModeFlags,
    pub version: VersionNumber,
    pub validity: DataValidity,
    /// Runtime error captured during the transfer phase, consumed by the
    /// post phase.
    pub active_exception: Option<Error>,
    /// Set while the element belongs to a [`TransferGroup`].
    pub in_transfer_group: bool,
    /// Transaction flags: set between a successful pre phase and its
    /// matching post phase. Decorators and the group consult them so an
    /// element shared between forwarding paths runs each phase exactly once.
    pub(crate) read_active: bool,
    pub(crate) write_active: bool,
    /// Backend notified when a transfer latches a runtime error.
    pub exception_backend: Option<Arc<dyn Backend>>,
}

impl ElementCore {
    pub fn new(name: RegisterPath, flags: AccessModeFlags) -> Self {
        ElementCore {
            name,
            flags,
            version: VersionNumber::null(),
            validity: DataValidity::Ok,
            active_exception: None,
            in_transfer_group: false,
            read_active: false,
            write_active: false,
            exception_backend: None,
        }
    }

    pub fn with_exception_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.exception_backend = Some(backend);
        self
    }
}

/// The abstract transfer element. See the module documentation for the
/// lifecycle contract.
///
/// Implementors provide the `do_*` hooks; the provided wrapper methods
/// enforce the state machine (no doubled pre phases, post only after pre,
/// exception latching and re-raising) uniformly.
pub trait TransferElement: Send {
    fn core(&self) -> &ElementCore;
    fn core_mut(&mut self) -> &mut ElementCore;

    fn is_readable(&self) -> bool;
    fn is_writeable(&self) -> bool;

    /// Prepare a read. Must not perform I/O.
    fn do_pre_read(&mut self, _ty: TransferType) -> Result<()> {
        Ok(())
    }

    /// Perform the backend read. May block.
    fn do_read_transfer(&mut self) -> Result<()>;

    /// Non-blocking read variant; returns whether new data arrived.
    fn do_read_transfer_nonblocking(&mut self) -> Result<bool> {
        self.do_read_transfer()?;
        Ok(true)
    }

    /// Drain-the-queue read variant; returns whether new data arrived.
    fn do_read_transfer_latest(&mut self) -> Result<bool> {
        self.do_read_transfer_nonblocking()
    }

    /// Decode raw storage into the cooked buffer when `update` is set.
    fn do_post_read(&mut self, _ty: TransferType, _update: bool) -> Result<()> {
        Ok(())
    }

    /// Encode the cooked buffer into raw storage. Must not perform I/O.
    fn do_pre_write(&mut self, _ty: TransferType, _version: VersionNumber) -> Result<()> {
        Ok(())
    }

    /// Perform the backend write. May block.
    fn do_write_transfer(&mut self, _version: VersionNumber) -> Result<()>;

    /// Release transfer state after a write.
    fn do_post_write(&mut self, _ty: TransferType, _version: VersionNumber) -> Result<()> {
        Ok(())
    }

    /// Direct children of this element in the element DAG. Hardware leaves
    /// return an empty list.
    fn internal_elements(&self) -> Vec<SharedElement> {
        Vec::new()
    }

    /// Offer `candidate` as a substitute for one of this element's internal
    /// elements. The default does nothing; backend accessors adopt or merge
    /// candidates providing the same backend transfer.
    fn replace_transfer_element(&mut self, _candidate: &SharedElement) {}

    /// Whether this element is a copy-register decorator, which the group
    /// must drive explicitly instead of substituting it away.
    fn is_copy_decorator(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    // ------------------------------------------------------------------
    // Provided lifecycle wrappers
    // ------------------------------------------------------------------

    fn name(&self) -> RegisterPath {
        self.core().name.clone()
    }

    fn access_mode_flags(&self) -> AccessModeFlags {
        self.core().flags
    }

    fn version_number(&self) -> VersionNumber {
        self.core().version
    }

    fn data_validity(&self) -> DataValidity {
        self.core().validity
    }

    fn is_read_only(&self) -> bool {
        self.is_readable() && !self.is_writeable()
    }

    fn pre_read(&mut self, ty: TransferType) -> Result<()> {
        if self.core().read_active {
            return Err(Error::logic(format!(
                "{}: preRead called twice without an intervening postRead",
                self.core().name
            )));
        }
        if !self.is_readable() {
            return Err(Error::logic(format!(
                "{} is not readable",
                self.core().name
            )));
        }
        self.core_mut().active_exception = None;
        self.do_pre_read(ty)?;
        self.core_mut().read_active = true;
        Ok(())
    }

    fn read_transfer(&mut self) -> Result<()> {
        self.do_read_transfer()
    }

    fn post_read(&mut self, ty: TransferType, update: bool) -> Result<()> {
        if !self.core().read_active {
            return Err(Error::logic(format!(
                "{}: postRead called without a preceding preRead",
                self.core().name
            )));
        }
        let ok_to_update = update && self.core().active_exception.is_none();
        let result = self.do_post_read(ty, ok_to_update);
        self.core_mut().read_active = false;

        // Failed cycles leave the buffer unchanged and flagged. A
        // non-blocking read that simply saw no new data keeps the old,
        // still-valid content.
        let no_new_data = !update
            && matches!(ty, TransferType::ReadNonBlocking | TransferType::ReadLatest)
            && self.core().active_exception.is_none();
        if (!ok_to_update || result.is_err()) && !no_new_data {
            self.core_mut().validity = DataValidity::Faulty;
        }

        if let Some(exception) = self.core_mut().active_exception.take() {
            return Err(exception);
        }
        result
    }

    fn pre_write(&mut self, ty: TransferType, version: VersionNumber) -> Result<()> {
        if self.core().write_active {
            return Err(Error::logic(format!(
                "{}: preWrite called twice without an intervening postWrite",
                self.core().name
            )));
        }
        if !self.is_writeable() {
            return Err(Error::logic(format!(
                "{} is not writeable",
                self.core().name
            )));
        }
        if version < self.core().version {
            return Err(Error::logic(format!(
                "{}: version number {} is older than the last written {}",
                self.core().name,
                version,
                self.core().version
            )));
        }
        self.core_mut().active_exception = None;
        self.do_pre_write(ty, version)?;
        self.core_mut().write_active = true;
        Ok(())
    }

    fn write_transfer(&mut self, version: VersionNumber) -> Result<()> {
        self.do_write_transfer(version)
    }

    fn post_write(&mut self, ty: TransferType, version: VersionNumber) -> Result<()> {
        if !self.core().write_active {
            return Err(Error::logic(format!(
                "{}: postWrite called without a preceding preWrite",
                self.core().name
            )));
        }
        let result = self.do_post_write(ty, version);
        self.core_mut().write_active = false;
        if self.core().active_exception.is_none() && result.is_ok() {
            self.core_mut().version = version;
        }
        if let Some(exception) = self.core_mut().active_exception.take() {
            return Err(exception);
        }
        result
    }
}

/// Typed access to an N-dimensional accessor buffer, on top of the untyped
/// transfer protocol.
pub trait NdAccessor<T: UserType>: TransferElement {
    fn n_channels(&self) -> usize;
    fn n_elements(&self) -> usize;
    fn channel_slice(&self, channel: usize) -> &[T];
    fn channel_slice_mut(&mut self, channel: usize) -> &mut [T];

    fn get(&self, channel: usize, element: usize) -> T {
        self.channel_slice(channel)[element].clone()
    }

    fn set(&mut self, channel: usize, element: usize, value: T) {
        self.channel_slice_mut(channel)[element] = value;
    }
}

/// Shared, typed handle to a transfer element.
pub type SharedNdAccessor<T> = Arc<Mutex<dyn NdAccessor<T>>>;

/// Pair of views onto one accessor implementation: a typed one for buffer
/// access and a type-erased one for the transfer machinery. Both point at
/// the same allocation, so identity comparisons see one element.
pub struct TypedElement<T: UserType> {
    typed: SharedNdAccessor<T>,
    erased: SharedElement,
}

impl<T: UserType> Clone for TypedElement<T> {
    fn clone(&self) -> Self {
        TypedElement {
            typed: self.typed.clone(),
            erased: self.erased.clone(),
        }
    }
}

impl<T: UserType> TypedElement<T> {
    pub fn new<C>(implementation: C) -> Self
    where
        C: NdAccessor<T> + 'static,
    {
        let shared = Arc::new(Mutex::new(implementation));
        let typed: SharedNdAccessor<T> = shared.clone();
        let erased: SharedElement = shared;
        TypedElement { typed, erased }
    }

    pub fn typed(&self) -> &SharedNdAccessor<T> {
        &self.typed
    }

    pub fn erased(&self) -> &SharedElement {
        &self.erased
    }
}

/// Anything holding a high-level transfer element that can join a
/// [`TransferGroup`].
pub trait TransferElementHandle {
    fn high_level_element(&self) -> &SharedElement;
}

impl<T: UserType> TransferElementHandle for TypedElement<T> {
    fn high_level_element(&self) -> &SharedElement {
        &self.erased
    }
}

// ----------------------------------------------------------------------
// Element DAG traversal
// ----------------------------------------------------------------------

/// Stable identity of a shared element, independent of the handle type it is
/// viewed through.
pub fn element_id(element: &SharedElement) -> usize {
    Arc::as_ptr(element) as *const () as usize
}

fn push_unique(list: &mut Vec<SharedElement>, element: SharedElement) {
    let id = element_id(&element);
    if !list.iter().any(|e| element_id(e) == id) {
        list.push(element);
    }
}

/// All elements reachable through [`TransferElement::internal_elements`],
/// depth first, deduplicated, excluding the starting element.
pub fn transitive_internal_elements(element: &SharedElement) -> Vec<SharedElement> {
    let mut result = Vec::new();
    let direct = element.lock().internal_elements();
    for child in direct {
        push_unique(&mut result, child.clone());
        for grandchild in transitive_internal_elements(&child) {
            push_unique(&mut result, grandchild);
        }
    }
    result
}

/// The transitive hardware-accessing leaves below `element`. An element
/// without internal elements is its own leaf.
pub fn hardware_accessing_elements(element: &SharedElement) -> Vec<SharedElement> {
    let direct = element.lock().internal_elements();
    if direct.is_empty() {
        return vec![element.clone()];
    }
    let mut result = Vec::new();
    for child in direct {
        for leaf in hardware_accessing_elements(&child) {
            push_unique(&mut result, leaf);
        }
    }
    result
}

// ----------------------------------------------------------------------
// Stand-alone transfer drivers
// ----------------------------------------------------------------------

/// Latch a runtime error into the element and notify its exception backend.
/// Non-runtime errors pass through unchanged.
pub(crate) fn latch_transfer_error(element: &SharedElement, error: Error) -> Result<()> {
    if !error.is_runtime() {
        return Err(error);
    }
    let backend = {
        let mut guard = element.lock();
        guard.core_mut().active_exception = Some(error.clone());
        guard.core().exception_backend.clone()
    };
    if let Some(backend) = backend {
        backend.set_exception(&error.to_string());
    }
    Ok(())
}

/// Drive a complete read cycle on a stand-alone element. Returns whether new
/// data arrived (always true for blocking reads that complete).
pub fn run_read(element: &SharedElement, ty: TransferType) -> Result<bool> {
    if matches!(ty, TransferType::Write | TransferType::WriteDestructively) {
        return Err(Error::logic("write transfer type passed to a read cycle"));
    }
    element.lock().pre_read(ty)?;

    let transfer_result = match ty {
        TransferType::ReadNonBlocking => element.lock().do_read_transfer_nonblocking(),
        TransferType::ReadLatest => element.lock().do_read_transfer_latest(),
        _ => element.lock().read_transfer().map(|_| true),
    };

    let has_new_data = match transfer_result {
        Ok(has_new) => has_new,
        Err(error) => {
            latch_transfer_error(element, error)?;
            false
        }
    };

    element.lock().post_read(ty, has_new_data)?;
    Ok(has_new_data)
}

/// Drive a complete write cycle on a stand-alone element.
pub fn run_write(element: &SharedElement, ty: TransferType, version: VersionNumber) -> Result<()> {
    element.lock().pre_write(ty, version)?;

    let transfer_result = element.lock().write_transfer(version);
    if let Err(error) = transfer_result {
        latch_transfer_error(element, error)?;
    }

    element.lock().post_write(ty, version)
}
