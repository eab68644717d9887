//! Temporary write access to pages holding virtual tables

#![allow(unsafe_code)]

use std::ffi::c_void;

use super::{HookError, HookResult};

/// Run `write` while `len` bytes at `address` are writable
///
/// Nothing runs when the protection change fails.
///
/// # Safety
/// `address..address + len` must lie inside mapped memory of this process.
#[cfg(windows)]
pub(crate) unsafe fn with_writable<R>(
    address: *const c_void,
    len: usize,
    write: impl FnOnce() -> R,
) -> HookResult<R> {
    use windows::Win32::System::Memory::{VirtualProtect, PAGE_PROTECTION_FLAGS, PAGE_READWRITE};

    let mut previous = PAGE_PROTECTION_FLAGS(0);
    unsafe { VirtualProtect(address, len, PAGE_READWRITE, &mut previous) }
        .map_err(|e| HookError::Protection(e.to_string()))?;

    let result = write();

    let mut ignored = PAGE_PROTECTION_FLAGS(0);
    if let Err(e) = unsafe { VirtualProtect(address, len, previous, &mut ignored) } {
        log::warn!("Failed to restore page protection at {address:?}: {e}");
    }
    Ok(result)
}

/// Run `write` while `len` bytes at `address` are writable
///
/// The previous protection is read from `/proc/self/maps` and restored
/// afterwards, keeping `PROT_EXEC` set throughout when the pages had it.
/// Where the maps file is unavailable or the span crosses mappings, the
/// pages are left readable and writable.
///
/// # Safety
/// `address..address + len` must lie inside mapped memory of this process.
#[cfg(unix)]
pub(crate) unsafe fn with_writable<R>(
    address: *const c_void,
    len: usize,
    write: impl FnOnce() -> R,
) -> HookResult<R> {
    let page = page_size();
    let start = (address as usize) & !(page - 1);
    let span = (address as usize + len) - start;

    let previous = current_protection(start, start + span);
    let writable = previous.map_or(libc::PROT_READ | libc::PROT_WRITE, |prot| prot | libc::PROT_WRITE);

    let status = unsafe { libc::mprotect(start as *mut c_void, span, writable) };
    if status != 0 {
        return Err(HookError::Protection(std::io::Error::last_os_error().to_string()));
    }

    let result = write();

    match previous {
        Some(prot) if prot != writable => {
            if unsafe { libc::mprotect(start as *mut c_void, span, prot) } != 0 {
                let error = std::io::Error::last_os_error();
                log::warn!("Failed to restore page protection at {address:?}: {error}");
            }
        }
        Some(_) => {}
        None => log::debug!("Protection of {address:?} unknown; pages left writable"),
    }
    Ok(result)
}

#[cfg(unix)]
fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).ok().filter(|s| s.is_power_of_two()).unwrap_or(4096)
}

#[cfg(unix)]
fn current_protection(start: usize, end: usize) -> Option<libc::c_int> {
    let maps = std::fs::read_to_string("/proc/self/maps").ok()?;
    protection_in_maps(&maps, start, end)
}

/// Protection of the single mapping covering `start..end` in a maps listing
#[cfg(unix)]
fn protection_in_maps(maps: &str, start: usize, end: usize) -> Option<libc::c_int> {
    maps.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let (low, high) = fields.next()?.split_once('-')?;
        let low = usize::from_str_radix(low, 16).ok()?;
        let high = usize::from_str_radix(high, 16).ok()?;
        if start < low || end > high {
            return None;
        }

        let perms = fields.next()?.as_bytes();
        let mut prot = libc::PROT_NONE;
        for (flag, bit) in [(b'r', libc::PROT_READ), (b'w', libc::PROT_WRITE), (b'x', libc::PROT_EXEC)] {
            if perms.contains(&flag) {
                prot |= bit;
            }
        }
        Some(prot)
    })
}

/// Unsupported platform: never writes
///
/// # Safety
/// Always safe; kept `unsafe` for signature parity.
#[cfg(not(any(windows, unix)))]
pub(crate) unsafe fn with_writable<R>(
    _address: *const c_void,
    _len: usize,
    _write: impl FnOnce() -> R,
) -> HookResult<R> {
    Err(HookError::Protection("page protection is not supported on this platform".to_string()))
}
