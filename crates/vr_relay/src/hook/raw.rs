//! Virtual tables addressed through raw pointers

#![allow(unsafe_code)]

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{protect, Address, HookError, HookResult, VirtualTable};

/// The dispatch table of a live C++ object in this process
#[derive(Debug, Clone, Copy)]
pub struct RawVirtualTable {
    base: NonNull<Address>,
    len: Option<usize>,
}

// The table is process-global memory; all slot access goes through atomics.
unsafe impl Send for RawVirtualTable {}
unsafe impl Sync for RawVirtualTable {}

impl RawVirtualTable {
    /// Table of the object at `instance`, read from its first word
    ///
    /// # Safety
    /// `instance` must be null or point to a live object whose first word is
    /// its table pointer, and every slot later accessed must exist.
    pub unsafe fn from_instance(instance: *mut c_void) -> HookResult<Self> {
        if instance.is_null() {
            return Err(HookError::NullInstance);
        }
        let table = unsafe { instance.cast::<*mut Address>().read() };
        NonNull::new(table)
            .map(|base| Self { base, len: None })
            .ok_or(HookError::NullTable)
    }

    /// Table of `len` entries starting at `base`; slots past `len` are rejected
    ///
    /// # Safety
    /// `base` must be null or point to `len` readable addresses that stay
    /// mapped for as long as the table is used.
    pub unsafe fn from_raw_parts(base: *mut Address, len: usize) -> HookResult<Self> {
        NonNull::new(base)
            .map(|base| Self { base, len: Some(len) })
            .ok_or(HookError::NullTable)
    }

    fn slot_ptr(&self, slot: usize) -> HookResult<*mut Address> {
        if let Some(len) = self.len {
            if slot >= len {
                return Err(HookError::SlotOutOfRange { slot, len });
            }
        }
        Ok(unsafe { self.base.as_ptr().add(slot) })
    }
}

impl VirtualTable for RawVirtualTable {
    fn identity(&self) -> Address {
        self.base.as_ptr() as Address
    }

    fn read_slot(&self, slot: usize) -> HookResult<Address> {
        let ptr = self.slot_ptr(slot)?;
        Ok(unsafe { AtomicUsize::from_ptr(ptr) }.load(Ordering::Acquire))
    }

    fn write_slot(&self, slot: usize, value: Address) -> HookResult<()> {
        let ptr = self.slot_ptr(slot)?;
        unsafe {
            protect::with_writable(ptr.cast_const().cast(), std::mem::size_of::<Address>(), || {
                AtomicUsize::from_ptr(ptr).store(value, Ordering::Release);
            })
        }
    }
}

/// Identity of the table behind `instance`, if there is one
///
/// # Safety
/// `instance` must be null or point to a live object whose first word is its
/// table pointer.
pub unsafe fn table_of(instance: *mut c_void) -> Option<Address> {
    if instance.is_null() {
        return None;
    }
    let table = unsafe { instance.cast::<Address>().read() };
    (table != 0).then_some(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn first() -> i32 {
        1
    }

    unsafe extern "C" fn second() -> i32 {
        2
    }

    #[test]
    fn test_write_is_visible_through_instance() {
        let mut slots: Vec<Address> = vec![first as Address, first as Address];
        let mut object: [*mut Address; 1] = [slots.as_mut_ptr()];
        let instance = object.as_mut_ptr().cast::<c_void>();

        let table = unsafe { RawVirtualTable::from_instance(instance) }.unwrap();
        assert_eq!(table.identity(), slots.as_ptr() as Address);
        assert_eq!(unsafe { table_of(instance) }, Some(table.identity()));

        table.write_slot(1, second as Address).unwrap();
        assert_eq!(table.read_slot(0).unwrap(), first as Address);
        assert_eq!(table.read_slot(1).unwrap(), second as Address);
        assert_eq!(slots[1], second as Address);
    }

    #[test]
    fn test_null_instance_and_table() {
        let result = unsafe { RawVirtualTable::from_instance(std::ptr::null_mut()) };
        assert_eq!(result.unwrap_err(), HookError::NullInstance);

        let mut object: [usize; 1] = [0];
        let result = unsafe { RawVirtualTable::from_instance(object.as_mut_ptr().cast()) };
        assert_eq!(result.unwrap_err(), HookError::NullTable);
        assert_eq!(unsafe { table_of(object.as_mut_ptr().cast()) }, None);
    }

    #[test]
    fn test_bounded_table_rejects_out_of_range() {
        let mut slots: Vec<Address> = vec![first as Address; 3];
        let table = unsafe { RawVirtualTable::from_raw_parts(slots.as_mut_ptr(), slots.len()) }.unwrap();

        assert_eq!(
            table.write_slot(3, second as Address),
            Err(HookError::SlotOutOfRange { slot: 3, len: 3 })
        );
        assert!(slots.iter().all(|&s| s == first as Address));
    }
}
