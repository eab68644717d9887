//! The process-wide record of patched slots

#![allow(unsafe_code)]

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Address, HookError, HookResult, VirtualTable};

/// Bookkeeping for one patched slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptionRecord {
    /// Human-readable target name, e.g. `IVRCompositor::Submit`
    pub name: String,
    /// Identity of the patched table
    pub table: Address,
    /// Patched slot index
    pub slot: usize,
    /// Address now stored in the slot
    pub handler: Address,
    /// Address the slot held before patching
    pub original: Address,
}

/// A recovered original function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trampoline(Address);

impl Trampoline {
    /// Address of the original function
    pub const fn address(self) -> Address {
        self.0
    }

    /// Reinterpret as a function pointer type
    ///
    /// # Safety
    /// `F` must be a function pointer type whose signature and calling
    /// convention match the function that was in the slot.
    pub unsafe fn cast<F: Copy>(self) -> F {
        debug_assert_eq!(
            std::mem::size_of::<F>(),
            std::mem::size_of::<Address>(),
            "trampolines cast only to function pointers"
        );
        unsafe { std::mem::transmute_copy(&self.0) }
    }
}

#[derive(Debug, Default)]
struct Records {
    by_slot: HashMap<(Address, usize), InterceptionRecord>,
    by_route: HashMap<(Address, Address), Address>,
    by_handler: HashMap<Address, Address>,
}

/// Every slot rewritten by this process, and how to reach what was there
///
/// Installing the same handler twice on one (table, slot) is a no-op that
/// returns the recorded original; a different handler on a patched slot is
/// refused, so a slot is never hooked twice.
#[derive(Debug, Default)]
pub struct PatchTable {
    records: RwLock<Records>,
}

impl PatchTable {
    /// Create an empty patch table
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `slot` of `table` to `handler`, returning the previous address
    ///
    /// The record is inserted before the slot is written, under the write
    /// lock, so a host thread entering the handler immediately after the
    /// write finds its trampoline. A failed write leaves no record.
    pub fn install(
        &self,
        name: &str,
        table: &dyn VirtualTable,
        slot: usize,
        handler: Address,
    ) -> HookResult<Address> {
        let identity = table.identity();
        let key = (identity, slot);
        let mut records = self.write();

        if let Some(existing) = records.by_slot.get(&key) {
            if existing.handler == handler {
                log::debug!("{name} already installed in slot {slot} of table {identity:#x}");
                return Ok(existing.original);
            }
            return Err(HookError::SlotOccupied { table: identity, slot });
        }

        let original = table.read_slot(slot)?;
        if original == 0 {
            return Err(HookError::EmptySlot { table: identity, slot });
        }
        if original == handler {
            return Err(HookError::OriginalLost { table: identity, slot });
        }

        let record = InterceptionRecord {
            name: name.to_string(),
            table: identity,
            slot,
            handler,
            original,
        };
        records.by_slot.insert(key, record);
        records.by_route.insert((identity, handler), original);
        let first_for_handler = !records.by_handler.contains_key(&handler);
        if first_for_handler {
            records.by_handler.insert(handler, original);
        }

        if let Err(error) = table.write_slot(slot, handler) {
            records.by_slot.remove(&key);
            records.by_route.remove(&(identity, handler));
            if first_for_handler {
                records.by_handler.remove(&handler);
            }
            return Err(error);
        }

        log::info!(
            "Installed {name} in slot {slot} of table {identity:#x} (original {original:#x})"
        );
        Ok(original)
    }

    /// The original behind `handler` when entered through `table`
    ///
    /// Falls back to the first original recorded for `handler` when the
    /// table is unknown, e.g. when the host copied the table.
    pub fn trampoline(&self, table: Option<Address>, handler: Address) -> Option<Trampoline> {
        let records = self.read();
        table
            .and_then(|table| records.by_route.get(&(table, handler)))
            .or_else(|| records.by_handler.get(&handler))
            .copied()
            .map(Trampoline)
    }

    /// Whether `slot` of the table identified by `table` is patched
    pub fn is_installed(&self, table: Address, slot: usize) -> bool {
        self.read().by_slot.contains_key(&(table, slot))
    }

    /// Snapshot of all records
    pub fn records(&self) -> Vec<InterceptionRecord> {
        self.read().by_slot.values().cloned().collect()
    }

    /// Number of patched slots
    pub fn len(&self) -> usize {
        self.read().by_slot.len()
    }

    /// Whether nothing has been patched
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Records> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Records> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}
