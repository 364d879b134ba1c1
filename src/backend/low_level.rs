//! Shared low-level transfer elements.
//!
//! A [`LowLevelTransferElement`] owns the raw word buffer for one contiguous
//! byte range of one address space and performs the actual backend I/O for
//! it. High-level accessors keep a shared handle to a low-level element and
//! decode their register's slice out of its buffer, so several accessors can
//! ride on one backend round-trip after the transfer group has merged their
//! ranges.

use crate::access_mode::AccessModeFlags;
use crate::backend::Backend;
use crate::error::Result;
use crate::register_path::RegisterPath;
use crate::transfer::{ElementCore, SharedElement, TransferElement};
use crate::version::VersionNumber;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;

/// A hardware-accessing leaf element covering one contiguous word range.
pub struct LowLevelTransferElement {
    core: ElementCore,
    backend: Arc<dyn Backend>,
    bar: u64,
    start_byte: u64,
    buffer: Vec<u32>,
}

impl LowLevelTransferElement {
    /// Create a leaf for `n_words` words starting at the word-aligned byte
    /// offset `start_byte` of address space `bar`.
    pub fn new(backend: Arc<dyn Backend>, bar: u64, start_byte: u64, n_words: usize) -> Self {
        let name = RegisterPath::new(&format!("area/{}/{}/{}", bar, start_byte, n_words));
        let core = ElementCore::new(name, AccessModeFlags::empty())
            .with_exception_backend(backend.clone());
        LowLevelTransferElement {
            core,
            backend,
            bar,
            start_byte,
            buffer: vec![0; n_words],
        }
    }

    /// Create a leaf and return it as a shared element handle.
    pub fn new_shared(
        backend: Arc<dyn Backend>,
        bar: u64,
        start_byte: u64,
        n_words: usize,
    ) -> SharedElement {
        Arc::new(Mutex::new(Self::new(backend, bar, start_byte, n_words)))
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn bar(&self) -> u64 {
        self.bar
    }

    pub fn start_byte(&self) -> u64 {
        self.start_byte
    }

    pub fn n_bytes(&self) -> u64 {
        self.buffer.len() as u64 * 4
    }

    pub fn end_byte(&self) -> u64 {
        self.start_byte + self.n_bytes()
    }

    pub fn words(&self) -> &[u32] {
        &self.buffer
    }

    pub fn words_mut(&mut self) -> &mut [u32] {
        &mut self.buffer
    }

    /// Whether this element's range fully contains `[start, start + bytes)`.
    pub fn covers(&self, bar: u64, start: u64, bytes: u64) -> bool {
        bar == self.bar && start >= self.start_byte && start + bytes <= self.end_byte()
    }

    /// Whether this element's range overlaps or touches
    /// `[start, start + bytes)` on the same address space, making one merged
    /// transfer worthwhile.
    pub fn is_mergeable(&self, bar: u64, start: u64, bytes: u64) -> bool {
        bar == self.bar && start <= self.end_byte() && self.start_byte <= start + bytes
    }
}

impl TransferElement for LowLevelTransferElement {
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
        true
    }

    fn do_read_transfer(&mut self) -> Result<()> {
        self.backend
            .read_area(self.bar, self.start_byte, &mut self.buffer)
    }

    fn do_write_transfer(&mut self, _version: VersionNumber) -> Result<()> {
        self.backend
            .write_area(self.bar, self.start_byte, &self.buffer)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Properties of a candidate low-level element relevant for adoption
/// decisions, read out under its lock.
pub(crate) struct CandidateRange {
    pub backend: Arc<dyn Backend>,
    pub bar: u64,
    pub start_byte: u64,
    pub n_bytes: u64,
}

pub(crate) fn candidate_range(candidate: &SharedElement) -> Option<CandidateRange> {
    let guard = candidate.lock();
    let leaf = guard.as_any().downcast_ref::<LowLevelTransferElement>()?;
    Some(CandidateRange {
        backend: leaf.backend.clone(),
        bar: leaf.bar,
        start_byte: leaf.start_byte,
        n_bytes: leaf.n_bytes(),
    })
}

/// Adopt or merge a candidate low-level element into `raw`.
///
/// `my_start`/`my_bytes` is the byte range the owning accessor actually
/// needs. If the candidate covers it, the candidate is adopted outright; if
/// the candidate overlaps or touches the current range, a fresh element
/// spanning the union replaces both. Returns the new word offset of
/// `my_start` within the adopted element, or `None` if nothing changed.
pub(crate) fn adopt_or_merge(
    raw: &mut SharedElement,
    backend: &Arc<dyn Backend>,
    bar: u64,
    my_start: u64,
    my_bytes: u64,
    candidate: &SharedElement,
) -> Option<usize> {
    use crate::transfer::element_id;

    if element_id(candidate) == element_id(raw) {
        return None;
    }
    let info = candidate_range(candidate)?;
    if info.bar != bar || !Arc::ptr_eq(&info.backend, backend) {
        return None;
    }

    // Candidate already covers everything this accessor needs.
    if my_start >= info.start_byte && my_start + my_bytes <= info.start_byte + info.n_bytes {
        let offset = ((my_start - info.start_byte) / 4) as usize;
        tracing::debug!(
            bar,
            start = info.start_byte,
            bytes = info.n_bytes,
            "adopting shared low-level transfer element"
        );
        *raw = candidate.clone();
        return Some(offset);
    }

    // Otherwise merge if the ranges overlap or touch.
    let (current_start, current_end) = {
        let guard = raw.lock();
        let leaf = guard.as_any().downcast_ref::<LowLevelTransferElement>()?;
        (leaf.start_byte, leaf.end_byte())
    };
    let candidate_end = info.start_byte + info.n_bytes;
    if info.start_byte > current_end || current_start > candidate_end {
        return None;
    }

    let merged_start = current_start.min(info.start_byte);
    let merged_end = current_end.max(candidate_end);
    let merged_words = ((merged_end - merged_start) / 4) as usize;
    tracing::debug!(
        bar,
        start = merged_start,
        end = merged_end,
        "merging overlapping low-level transfer elements"
    );
    *raw = LowLevelTransferElement::new_shared(backend.clone(), bar, merged_start, merged_words);
    Some(((my_start - merged_start) / 4) as usize)
}
