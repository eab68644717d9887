//! Host-facing C ABI entry points
//!
//! Raw function pointers cannot capture, so the handlers reach the relay
//! through one process-wide session installed by [`activate`] (or
//! [`bootstrap`]). Every handler relays first and then forwards the host's
//! untouched arguments to the original, returning its result. Nothing that
//! goes wrong inside the relay, panics included, changes what the host sees.

#![allow(unsafe_code)]

use std::ffi::{c_char, c_void, CStr};
use std::sync::{Arc, OnceLock};

use crate::core::config::{ConfigError, RelayConfig};
use crate::dispatch::{DecodeError, FrameOutcome, GraphicsQueries, Submission};
use crate::foundation::{logging, panic};
use crate::hook::{table_of, Address, Trampoline};
use crate::openvr::{
    CompositorError, GetGenericInterfaceFn, InitInternal2Fn, ShutdownInternalFn, SubmitFn, SubmitRawFlagsFn,
    SubmitRawFn, Texture, TextureBounds, COMPOSITOR_ERROR_REQUEST_FAILED, INIT_ERROR_INTERFACE_NOT_FOUND,
};
use crate::relay::{SubmitHandlers, VrRelay};
use crate::runtime::RuntimeFactory;

/// The host runtime's own entry points, resolved by the loader
#[derive(Debug, Clone, Copy, Default)]
pub struct HostExports {
    /// Original `VR_GetGenericInterface`
    pub get_generic_interface: Option<GetGenericInterfaceFn>,
    /// Original `VR_ShutdownInternal`
    pub shutdown_internal: Option<ShutdownInternalFn>,
    /// Original `VR_InitInternal2`
    pub init_internal2: Option<InitInternal2Fn>,
}

/// Session activation errors
#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    /// [`activate`] already ran in this process
    #[error("A relay session is already active")]
    AlreadyActive,

    /// The configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

struct Session {
    relay: Arc<VrRelay>,
    exports: HostExports,
}

static SESSION: OnceLock<Session> = OnceLock::new();

/// Install `relay` as the process-wide session
///
/// Only the first call succeeds; the session lives until the process exits.
pub fn activate(relay: Arc<VrRelay>, exports: HostExports) -> Result<Arc<VrRelay>, RelayError> {
    let mut installed = false;
    let session = SESSION.get_or_init(|| {
        installed = true;
        Session { relay, exports }
    });
    if !installed {
        return Err(RelayError::AlreadyActive);
    }
    log::info!("Relay session active");
    Ok(Arc::clone(&session.relay))
}

/// Load configuration, start logging, build the relay and activate it
pub fn bootstrap(
    factory: Arc<dyn RuntimeFactory>,
    queries: Arc<dyn GraphicsQueries>,
    exports: HostExports,
) -> Result<Arc<VrRelay>, RelayError> {
    let config = RelayConfig::discover()?;
    if !logging::init(&config.logging) {
        log::debug!("Logger already installed by the host");
    }
    activate(Arc::new(VrRelay::new(config, factory, queries)), exports)
}

/// The active relay, if a session was activated
pub fn relay() -> Option<&'static Arc<VrRelay>> {
    SESSION.get().map(|session| &session.relay)
}

/// Addresses of the `Submit` handlers in this module
pub fn submit_handlers() -> SubmitHandlers {
    SubmitHandlers {
        raw_handle: submit_raw_handle as SubmitRawFn as Address,
        raw_handle_with_flags: submit_raw_handle_with_flags as SubmitRawFlagsFn as Address,
        texture: submit_texture as SubmitFn as Address,
    }
}

/// Replacement for `VR_GetGenericInterface`
///
/// # Safety
/// Same contract as the host's `VR_GetGenericInterface`.
pub unsafe extern "C" fn get_generic_interface(interface_version: *const c_char, error: *mut i32) -> *mut c_void {
    let Some(session) = SESSION.get() else {
        return unsafe { interface_not_found(error) };
    };
    let Some(original) = session.exports.get_generic_interface else {
        log::error!("VR_GetGenericInterface called but the original is unknown");
        return unsafe { interface_not_found(error) };
    };

    let interface = unsafe { original(interface_version, error) };
    if interface.is_null() || interface_version.is_null() {
        return interface;
    }

    let name = unsafe { CStr::from_ptr(interface_version) }.to_string_lossy();
    log::info!("Interface {name} acquired at {interface:?}");
    let hooked = panic::contain(|| unsafe {
        session
            .relay
            .hook_interface_instance(&name, interface, &submit_handlers())
    });
    if let Err(message) = hooked {
        log::error!("Panic while hooking {name}: {message}");
    }
    interface
}

/// Replacement for `VR_ShutdownInternal`
///
/// # Safety
/// Same contract as the host's `VR_ShutdownInternal`.
pub unsafe extern "C" fn shutdown_internal() {
    let Some(session) = SESSION.get() else {
        return;
    };

    log::info!("VR runtime shutting down");
    if let Err(message) = panic::contain(|| session.relay.shutdown()) {
        log::error!("Panic during relay shutdown: {message}");
    }

    match session.exports.shutdown_internal {
        Some(original) => unsafe { original() },
        None => log::error!("VR_ShutdownInternal called but the original is unknown"),
    }
}

/// Replacement for `VR_InitInternal2`
///
/// # Safety
/// Same contract as the host's `VR_InitInternal2`.
pub unsafe extern "C" fn init_internal2(error: *mut i32, application_type: i32, startup_info: *const c_char) -> u32 {
    let Some(original) = SESSION.get().and_then(|session| session.exports.init_internal2) else {
        log::error!("VR_InitInternal2 called but the original is unknown");
        if !error.is_null() {
            unsafe { error.write(INIT_ERROR_INTERFACE_NOT_FOUND) };
        }
        return 0;
    };

    log::info!("VR runtime initializing (application type {application_type})");
    let token = unsafe { original(error, application_type, startup_info) };
    if !error.is_null() {
        let status = unsafe { error.read() };
        if status != 0 {
            log::warn!("VR_InitInternal2 returned error {status}");
        }
    }
    token
}

/// `Submit` handler for revisions 9 onwards
///
/// # Safety
/// Called by the host through the patched slot with the host's arguments.
pub unsafe extern "C" fn submit_texture(
    this: *mut c_void,
    eye: i32,
    texture: *const Texture,
    bounds: *const TextureBounds,
    flags: u32,
) -> CompositorError {
    relay_frame(|| unsafe { Submission::from_texture(eye, texture, bounds, flags) });

    match unsafe { original(this, submit_texture as SubmitFn as Address) } {
        Some(trampoline) => unsafe { trampoline.cast::<SubmitFn>()(this, eye, texture, bounds, flags) },
        None => COMPOSITOR_ERROR_REQUEST_FAILED,
    }
}

/// `Submit` handler for revision 8
///
/// # Safety
/// Called by the host through the patched slot with the host's arguments.
pub unsafe extern "C" fn submit_raw_handle_with_flags(
    this: *mut c_void,
    eye: i32,
    texture_type: u32,
    texture: *mut c_void,
    bounds: *const TextureBounds,
    flags: u32,
) -> CompositorError {
    relay_frame(|| unsafe { Submission::from_legacy(eye, texture_type, texture, bounds, flags) });

    match unsafe { original(this, submit_raw_handle_with_flags as SubmitRawFlagsFn as Address) } {
        Some(trampoline) => unsafe {
            trampoline.cast::<SubmitRawFlagsFn>()(this, eye, texture_type, texture, bounds, flags)
        },
        None => COMPOSITOR_ERROR_REQUEST_FAILED,
    }
}

/// `Submit` handler for revision 7
///
/// # Safety
/// Called by the host through the patched slot with the host's arguments.
pub unsafe extern "C" fn submit_raw_handle(
    this: *mut c_void,
    eye: i32,
    texture_type: u32,
    texture: *mut c_void,
    bounds: *const TextureBounds,
) -> CompositorError {
    relay_frame(|| unsafe { Submission::from_legacy(eye, texture_type, texture, bounds, 0) });

    match unsafe { original(this, submit_raw_handle as SubmitRawFn as Address) } {
        Some(trampoline) => unsafe { trampoline.cast::<SubmitRawFn>()(this, eye, texture_type, texture, bounds) },
        None => COMPOSITOR_ERROR_REQUEST_FAILED,
    }
}

fn relay_frame(decode: impl FnOnce() -> Result<Submission, DecodeError>) -> Option<FrameOutcome> {
    let relay = relay()?;
    match panic::contain(|| decode().map(|submission| relay.submit(&submission))) {
        Ok(Ok(outcome)) => Some(outcome),
        Ok(Err(error)) => {
            log::debug!("Forwarding submission untouched: {error}");
            None
        }
        Err(message) => {
            log::error!("Panic while relaying frame: {message}");
            None
        }
    }
}

/// The original behind `handler` for the object `this`
unsafe fn original(this: *mut c_void, handler: Address) -> Option<Trampoline> {
    let trampoline = relay()?.trampoline(unsafe { table_of(this) }, handler);
    if trampoline.is_none() {
        log::error!("No original Submit recorded for handler {handler:#x}");
    }
    trampoline
}

unsafe fn interface_not_found(error: *mut i32) -> *mut c_void {
    if !error.is_null() {
        unsafe { error.write(INIT_ERROR_INTERFACE_NOT_FOUND) };
    }
    std::ptr::null_mut()
}

/// Unmangled `VR_*` symbols for builds loaded in place of the VR client library
#[cfg(feature = "proxy-exports")]
#[allow(non_snake_case)]
mod proxy {
    use super::*;

    /// # Safety
    /// Same contract as the host's `VR_GetGenericInterface`.
    #[no_mangle]
    pub unsafe extern "C" fn VR_GetGenericInterface(interface_version: *const c_char, error: *mut i32) -> *mut c_void {
        unsafe { get_generic_interface(interface_version, error) }
    }

    /// # Safety
    /// Same contract as the host's `VR_ShutdownInternal`.
    #[no_mangle]
    pub unsafe extern "C" fn VR_ShutdownInternal() {
        unsafe { shutdown_internal() }
    }

    /// # Safety
    /// Same contract as the host's `VR_InitInternal2`.
    #[no_mangle]
    pub unsafe extern "C" fn VR_InitInternal2(error: *mut i32, application_type: i32, startup_info: *const c_char) -> u32 {
        unsafe { init_internal2(error, application_type, startup_info) }
    }
}

#[cfg(test)]
mod tests {
    //! No session is ever activated in the library's unit tests; the
    //! activated path is covered by the integration tests.

    use super::*;

    #[test]
    fn test_handler_addresses_are_distinct() {
        let handlers = submit_handlers();
        assert_ne!(handlers.texture, handlers.raw_handle);
        assert_ne!(handlers.texture, handlers.raw_handle_with_flags);
        assert_ne!(handlers.raw_handle, handlers.raw_handle_with_flags);
    }

    #[test]
    fn test_without_session_interfaces_are_not_found() {
        let mut error = 0;
        let interface = unsafe { get_generic_interface(b"IVRCompositor_022\0".as_ptr().cast(), &mut error) };

        assert!(interface.is_null());
        assert_eq!(error, INIT_ERROR_INTERFACE_NOT_FOUND);
        assert!(relay().is_none());
    }

    #[test]
    fn test_without_session_submit_reports_request_failed() {
        let texture = Texture { handle: 0x10 as *mut c_void, texture_type: 0, color_space: 0 };
        let mut object: [usize; 1] = [0];

        let status = unsafe { submit_texture(object.as_mut_ptr().cast(), 0, &texture, std::ptr::null(), 0) };

        assert_eq!(status, COMPOSITOR_ERROR_REQUEST_FAILED);
    }

    #[test]
    fn test_without_session_shutdown_and_init_are_harmless() {
        unsafe { shutdown_internal() };

        let mut error = 0;
        assert_eq!(unsafe { init_internal2(&mut error, 1, std::ptr::null()) }, 0);
        assert_eq!(error, INIT_ERROR_INTERFACE_NOT_FOUND);
    }
}
