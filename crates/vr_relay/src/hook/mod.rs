//! Call interception through virtual-table patching
//!
//! A [`VirtualTable`] is the seam over one live dispatch table; the
//! [`PatchTable`] owns every slot this process has rewritten and hands out
//! typed trampolines to the functions that were there before.

mod protect;
mod raw;
mod table;

pub use raw::{table_of, RawVirtualTable};
pub use table::{InterceptionRecord, PatchTable, Trampoline};

/// A code or data address inside the host process
pub type Address = usize;

/// Result type for interception operations
pub type HookResult<T> = Result<T, HookError>;

/// Interception errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    /// The interface instance pointer was null
    #[error("Interface instance is null")]
    NullInstance,

    /// The instance did not carry a table pointer
    #[error("Virtual table pointer is null")]
    NullTable,

    /// The slot holds no function to forward to
    #[error("Slot {slot} of table {table:#x} is empty")]
    EmptySlot {
        /// Table identity
        table: Address,
        /// Slot index
        slot: usize,
    },

    /// The slot index lies outside the table
    #[error("Slot {slot} is outside a table of {len} entries")]
    SlotOutOfRange {
        /// Slot index
        slot: usize,
        /// Number of entries in the table
        len: usize,
    },

    /// Another handler already owns the slot
    #[error("Slot {slot} of table {table:#x} is already patched by another handler")]
    SlotOccupied {
        /// Table identity
        table: Address,
        /// Slot index
        slot: usize,
    },

    /// The slot already points at the handler but no original was recorded
    #[error("Slot {slot} of table {table:#x} already routes to the handler; original unknown")]
    OriginalLost {
        /// Table identity
        table: Address,
        /// Slot index
        slot: usize,
    },

    /// The page holding the slot could not be made writable
    #[error("Memory protection change failed: {0}")]
    Protection(String),
}

/// One live virtual-dispatch table
///
/// Implementations must make `write_slot` all-or-nothing: either the new
/// value is fully visible to other threads or the slot is untouched.
pub trait VirtualTable {
    /// Stable identity of the table, normally its base address
    fn identity(&self) -> Address;

    /// Read the function address stored in `slot`
    fn read_slot(&self, slot: usize) -> HookResult<Address>;

    /// Replace the function address stored in `slot`
    fn write_slot(&self, slot: usize, value: Address) -> HookResult<()>;
}
