//! The fake VR runtime: exported entry points and one compositor object

use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::OnceLock;

use vr_relay::handlers::{self, HostExports};
use vr_relay::openvr::{
    CompositorError, SubmitFn, Texture, TextureBounds, COMPOSITOR_ERROR_NONE, INIT_ERROR_INTERFACE_NOT_FOUND,
};
use vr_relay::prelude::*;

use crate::SimError;

const VTABLE_LEN: usize = 48;
const SUBMIT_SLOT: usize = 5;
const APPLICATION_SCENE: i32 = 1;

/// Layout of a C++ object with virtual methods
#[repr(C)]
struct CompositorObject {
    vtable: *const usize,
}

static COMPOSITOR: OnceLock<usize> = OnceLock::new();

fn compositor_object() -> *mut c_void {
    let address = *COMPOSITOR.get_or_init(|| {
        let mut vtable = vec![unimplemented_method as unsafe extern "C" fn() as usize; VTABLE_LEN];
        vtable[SUBMIT_SLOT] = compositor_submit as SubmitFn as usize;
        let vtable = Box::leak(vtable.into_boxed_slice()).as_ptr();
        Box::leak(Box::new(CompositorObject { vtable })) as *mut CompositorObject as usize
    });
    address as *mut c_void
}

unsafe extern "C" fn unimplemented_method() {
    log::warn!("Fake compositor: unimplemented method called");
}

unsafe extern "C" fn compositor_submit(
    _this: *mut c_void,
    eye: i32,
    texture: *const Texture,
    _bounds: *const TextureBounds,
    flags: u32,
) -> CompositorError {
    match unsafe { texture.as_ref() } {
        Some(texture) => log::debug!(
            "Compositor received eye {eye}: type {} handle {:?} flags {flags:#x}",
            texture.texture_type,
            texture.handle
        ),
        None => log::warn!("Compositor received a null texture for eye {eye}"),
    }
    COMPOSITOR_ERROR_NONE
}

unsafe extern "C" fn runtime_get_generic_interface(version: *const c_char, error: *mut i32) -> *mut c_void {
    let name = unsafe { CStr::from_ptr(version) }.to_string_lossy();
    let (interface, code) = if name.starts_with("IVRCompositor_") {
        (compositor_object(), 0)
    } else {
        (std::ptr::null_mut(), INIT_ERROR_INTERFACE_NOT_FOUND)
    };
    if !error.is_null() {
        unsafe { error.write(code) };
    }
    interface
}

unsafe extern "C" fn runtime_shutdown_internal() {
    log::info!("Fake runtime shut down");
}

unsafe extern "C" fn runtime_init_internal2(error: *mut i32, _application_type: i32, _startup_info: *const c_char) -> u32 {
    if !error.is_null() {
        unsafe { error.write(0) };
    }
    1
}

/// Entry points of the fake runtime
pub fn exports() -> HostExports {
    HostExports {
        get_generic_interface: Some(runtime_get_generic_interface),
        shutdown_internal: Some(runtime_shutdown_internal),
        init_internal2: Some(runtime_init_internal2),
    }
}

/// `VR_InitInternal2` as the application would call it
pub fn init_runtime() {
    let mut error = 0;
    let token = unsafe { handlers::init_internal2(&mut error, APPLICATION_SCENE, std::ptr::null()) };
    log::info!("Runtime initialized with token {token} (error {error})");
}

/// A compositor interface as the application sees it
pub struct Compositor {
    this: *mut c_void,
}

impl Compositor {
    /// Call `Submit` through the object's virtual table
    pub fn submit(&self, eye: Eye, texture: &Texture, flags: SubmitFlags) -> CompositorError {
        let eye = match eye {
            Eye::Left => 0,
            Eye::Right => 1,
        };
        let submit = unsafe {
            let vtable = self.this.cast::<*const usize>().read();
            std::mem::transmute::<usize, SubmitFn>(vtable.add(SUBMIT_SLOT).read_volatile())
        };
        unsafe { submit(self.this, eye, texture, std::ptr::null(), flags.bits()) }
    }
}

/// `VR_GetGenericInterface` as the application would call it
pub fn acquire(name: &str) -> Result<Compositor, SimError> {
    let version = CString::new(name).map_err(|_| SimError::InterfaceUnavailable {
        name: name.to_string(),
        code: INIT_ERROR_INTERFACE_NOT_FOUND,
    })?;
    let mut code = 0;
    let this = unsafe { handlers::get_generic_interface(version.as_ptr(), &mut code) };
    if this.is_null() {
        return Err(SimError::InterfaceUnavailable { name: name.to_string(), code });
    }
    Ok(Compositor { this })
}

/// A stand-in `ID3D11Texture2D *`; only the simulated queries look at it
pub fn d3d11_texture() -> Texture {
    Texture { handle: 0xD3D1_1000 as *mut c_void, texture_type: 0, color_space: 0 }
}

/// GL renderbuffer name 3
pub fn gl_texture() -> Texture {
    Texture { handle: 3 as *mut c_void, texture_type: 1, color_space: 0 }
}
