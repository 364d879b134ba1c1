//! The transfer-coalescing engine.
//!
//! A `TransferGroup` collects user accessors and executes their combined
//! transfers in the minimum number of backend round-trips while preserving
//! each accessor's observable semantics. Coalescing is semantic, not
//! address-based: when an accessor joins, every element of the group is
//! offered every other element (and their internals) as a potential
//! substitute through
//! [`replace_transfer_element`](crate::transfer::TransferElement::replace_transfer_element),
//! and the accessors themselves decide what "the same hardware transfer"
//! means. After the exchange the group re-collects the hardware-accessing
//! leaves; duplicates have collapsed by identity, so each leaf is
//! transferred at most once per cycle.

use crate::access_mode::AccessModeFlags;
use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::transfer::{
    element_id, hardware_accessing_elements, transitive_internal_elements, SharedElement,
    TransferElementHandle, TransferType,
};
use crate::version::VersionNumber;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Coalescing coordinator for multiple accessors.
#[derive(Default)]
pub struct TransferGroup {
    /// High-level (user-visible) elements, in addition order.
    high_level: Vec<SharedElement>,
    /// Copy-register decorators found among the members and their internals.
    copy_decorators: Vec<SharedElement>,
    /// Hardware-accessing leaves with their advisory exception flags.
    low_level: Vec<(SharedElement, bool)>,
    /// Backends to notify and guard, deduplicated by identity.
    exception_backends: Vec<Arc<dyn Backend>>,
    read_only: bool,
}

impl TransferGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the group contains at least one read-only accessor, making
    /// the whole group read-only.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Number of distinct hardware transfers a cycle performs.
    pub fn n_hardware_elements(&self) -> usize {
        self.low_level.len()
    }

    /// Add an accessor to the group.
    ///
    /// Fails with a logic error, leaving both the group and the accessor
    /// untouched, if the accessor already belongs to a group or carries the
    /// `wait_for_new_data` access mode.
    pub fn add<A: TransferElementHandle>(&mut self, accessor: &A) -> Result<()> {
        let element = accessor.high_level_element().clone();
        {
            let guard = element.lock();
            if guard.core().in_transfer_group {
                return Err(Error::logic(format!(
                    "accessor {} is already in a TransferGroup and cannot be added to another",
                    guard.core().name
                )));
            }
            if guard
                .core()
                .flags
                .contains(AccessModeFlags::WAIT_FOR_NEW_DATA)
            {
                return Err(Error::logic(format!(
                    "accessor {} has wait_for_new_data and cannot be used in a TransferGroup",
                    guard.core().name
                )));
            }
        }

        element.lock().core_mut().in_transfer_group = true;

        if let Some(backend) = element.lock().core().exception_backend.clone() {
            if !self
                .exception_backends
                .iter()
                .any(|known| Arc::ptr_eq(known, &backend))
            {
                self.exception_backends.push(backend);
            }
        }

        // Coalescing step: offer every element (and its internals) of the
        // provisional member set to every member as a replacement.
        let mut provisional = self.high_level.clone();
        provisional.push(element.clone());
        for owner in &provisional {
            let mut candidates = vec![owner.clone()];
            candidates.extend(transitive_internal_elements(owner));
            for candidate in &candidates {
                for member in &provisional {
                    if element_id(member) == element_id(candidate) {
                        continue;
                    }
                    member.lock().replace_transfer_element(candidate);
                }
            }
        }

        self.high_level.push(element.clone());
        self.rebuild_leaves();
        self.rebuild_copy_decorators();

        if element.lock().is_read_only() {
            self.read_only = true;
        }
        debug!(
            members = self.high_level.len(),
            leaves = self.low_level.len(),
            "accessor added to transfer group"
        );
        Ok(())
    }

    fn rebuild_leaves(&mut self) {
        self.low_level.clear();
        let mut seen = HashSet::new();
        for member in &self.high_level {
            for leaf in hardware_accessing_elements(member) {
                if seen.insert(element_id(&leaf)) {
                    self.low_level.push((leaf, false));
                }
            }
        }
    }

    fn rebuild_copy_decorators(&mut self) {
        self.copy_decorators.clear();
        let mut seen = HashSet::new();
        for member in &self.high_level {
            if member.lock().is_copy_decorator() && seen.insert(element_id(member)) {
                self.copy_decorators.push(member.clone());
            }
            for internal in transitive_internal_elements(member) {
                if internal.lock().is_copy_decorator() && seen.insert(element_id(&internal)) {
                    self.copy_decorators.push(internal.clone());
                }
            }
        }
    }

    fn check_backends_open(&self) -> Result<()> {
        for backend in &self.exception_backends {
            if !backend.is_open() {
                return Err(Error::logic(format!(
                    "device backend {} is not opened",
                    backend.device_info()
                )));
            }
        }
        Ok(())
    }

    fn reset_cycle_state(&mut self) {
        for (leaf, flag) in &mut self.low_level {
            *flag = false;
            leaf.lock().core_mut().active_exception = None;
        }
    }

    /// Run the leaf transfers, latching runtime errors per leaf and
    /// recording the first one.
    fn run_transfers(
        &mut self,
        mut transfer: impl FnMut(&SharedElement) -> Result<()>,
    ) -> Result<Option<Error>> {
        let mut first_runtime = None;
        for (leaf, flag) in &mut self.low_level {
            if let Err(error) = transfer(leaf) {
                if !error.is_runtime() {
                    return Err(error);
                }
                *flag = true;
                let backend = {
                    let mut guard = leaf.lock();
                    guard.core_mut().active_exception = Some(error.clone());
                    guard.core().exception_backend.clone()
                };
                if let Some(backend) = backend {
                    backend.set_exception(&error.to_string());
                }
                if first_runtime.is_none() {
                    first_runtime = Some(error);
                }
            }
        }
        Ok(first_runtime)
    }

    /// Propagate latched leaf errors into `element` so its post phase sees
    /// them, then run the post phase. Runtime errors are already recorded;
    /// the first numeric-cast error is reported back.
    fn run_post_reads(
        &self,
        elements: &[SharedElement],
        first_runtime: &Option<Error>,
    ) -> Result<Option<Error>> {
        let mut first_bad_cast = None;
        for element in elements {
            // already driven through a forwarding path in this cycle
            if !element.lock().core().read_active {
                continue;
            }
            let mut leaf_error = None;
            for leaf in hardware_accessing_elements(element) {
                if let Some(error) = leaf.lock().core().active_exception.clone() {
                    if leaf_error.is_some() {
                        warn!(
                            element = %element.lock().core().name,
                            "more than one low-level exception; an error type may be lost"
                        );
                    } else {
                        leaf_error = Some(error);
                    }
                }
            }
            {
                let mut guard = element.lock();
                if let Some(error) = leaf_error {
                    guard.core_mut().active_exception = Some(error);
                }
            }

            let result = element
                .lock()
                .post_read(TransferType::Read, first_runtime.is_none());
            match result {
                Ok(()) => {}
                Err(error) if error.is_runtime() => {
                    // re-thrown transfer error; already recorded
                }
                Err(error) if error.is_numeric_cast() => {
                    if first_bad_cast.is_none() {
                        first_bad_cast = Some(error);
                    }
                }
                Err(error) => return Err(error),
            }
        }
        Ok(first_bad_cast)
    }

    /// Execute one coalesced read cycle over all members.
    ///
    /// Every leaf transfers at most once. All post phases run regardless of
    /// transfer failures; errors re-raise afterwards in a fixed order: the
    /// first runtime error, then the first numeric-cast error from the copy
    /// decorators, then the first from the high-level accessors.
    pub fn read(&mut self) -> Result<()> {
        self.check_backends_open()?;
        for member in &self.high_level {
            let guard = member.lock();
            if !guard.is_readable() {
                return Err(Error::logic(format!(
                    "accessor {} is not readable",
                    guard.core().name
                )));
            }
        }

        self.reset_cycle_state();

        for member in &self.high_level {
            let mut guard = member.lock();
            if !guard.core().read_active {
                guard.pre_read(TransferType::Read)?;
            }
        }
        for decorator in &self.copy_decorators {
            // decorators reachable through other members were already opened
            // by their wrappers' forwarding
            let mut guard = decorator.lock();
            if !guard.core().read_active {
                guard.pre_read(TransferType::Read)?;
            }
        }
        debug_assert!(self
            .high_level
            .iter()
            .all(|m| m.lock().core().active_exception.is_none()));

        let first_runtime = self.run_transfers(|leaf| leaf.lock().read_transfer())?;

        let copy_ids: HashSet<usize> =
            self.copy_decorators.iter().map(element_id).collect();
        let plain_members: Vec<SharedElement> = self
            .high_level
            .iter()
            .filter(|m| !copy_ids.contains(&element_id(m)))
            .cloned()
            .collect();

        let bad_cast_copies = self.run_post_reads(&self.copy_decorators, &first_runtime)?;
        let bad_cast_members = self.run_post_reads(&plain_members, &first_runtime)?;

        if let Some(error) = first_runtime {
            return Err(error);
        }
        if let Some(error) = bad_cast_copies {
            return Err(error);
        }
        if let Some(error) = bad_cast_members {
            return Err(error);
        }
        Ok(())
    }

    /// Execute one coalesced write cycle over all members, stamping the
    /// written data with a fresh version number.
    pub fn write(&mut self) -> Result<()> {
        self.write_with_version(VersionNumber::new())
    }

    /// Execute one coalesced write cycle with an explicit version number.
    ///
    /// Fails immediately with a logic error, without touching any backend,
    /// when the group is read-only. Post phases always run for every member;
    /// the first runtime error re-raises at the end.
    pub fn write_with_version(&mut self, version: VersionNumber) -> Result<()> {
        if self.read_only {
            return Err(Error::logic(
                "TransferGroup::write called, but the TransferGroup is read-only",
            ));
        }
        self.check_backends_open()?;
        for member in &self.high_level {
            let guard = member.lock();
            if !guard.is_writeable() {
                return Err(Error::logic(format!(
                    "accessor {} is not writeable",
                    guard.core().name
                )));
            }
        }

        self.reset_cycle_state();

        for member in &self.high_level {
            let mut guard = member.lock();
            if !guard.core().write_active {
                guard.pre_write(TransferType::Write, version)?;
            }
        }
        debug_assert!(self
            .high_level
            .iter()
            .all(|m| m.lock().core().active_exception.is_none()));

        let first_runtime =
            self.run_transfers(|leaf| leaf.lock().write_transfer(version))?;

        for member in &self.high_level {
            if !member.lock().core().write_active {
                continue;
            }
            let mut leaf_error = None;
            for leaf in hardware_accessing_elements(member) {
                if let Some(error) = leaf.lock().core().active_exception.clone() {
                    leaf_error.get_or_insert(error);
                }
            }
            {
                let mut guard = member.lock();
                if let Some(error) = leaf_error {
                    guard.core_mut().active_exception = Some(error);
                }
            }
            match member.lock().post_write(TransferType::Write, version) {
                Ok(()) => {}
                Err(error) if error.is_runtime() => {
                    // re-thrown transfer error; the first one is recorded
                }
                Err(error) => return Err(error),
            }
        }

        match first_runtime {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
