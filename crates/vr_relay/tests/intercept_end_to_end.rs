//! Drives the C ABI path against an in-process fake compositor
//!
//! The relay session is process-wide, so everything runs in one test.

#![allow(unsafe_code)]

use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use vr_relay::handlers::{self, HostExports};
use vr_relay::openvr::{SubmitFn, Texture, TextureBounds, COMPOSITOR_ERROR_NONE, INIT_ERROR_INTERFACE_NOT_FOUND};
use vr_relay::prelude::*;

const SUBMIT_SLOT: usize = 5;
const TEXTURE: usize = 0x7E57_0000;
const DEVICE: usize = 0xDE71_CE00;

static EVENTS: Mutex<Vec<String>> = Mutex::new(Vec::new());
static ORIGINAL_SUBMITS: AtomicUsize = AtomicUsize::new(0);
static LAST_FORWARDED_HANDLE: AtomicUsize = AtomicUsize::new(0);
static COMPOSITOR: OnceLock<usize> = OnceLock::new();

fn record(event: impl Into<String>) {
    EVENTS.lock().unwrap().push(event.into());
}

fn take_events() -> Vec<String> {
    std::mem::take(&mut *EVENTS.lock().unwrap())
}

// Fake compositor

#[repr(C)]
struct FakeCompositor {
    vtable: *mut usize,
}

unsafe extern "C" fn unrelated_method() {}

unsafe extern "C" fn original_submit(
    _this: *mut c_void,
    _eye: i32,
    texture: *const Texture,
    _bounds: *const TextureBounds,
    _flags: u32,
) -> i32 {
    ORIGINAL_SUBMITS.fetch_add(1, Ordering::SeqCst);
    let handle = unsafe { texture.as_ref() }.map_or(0, |t| t.handle as usize);
    LAST_FORWARDED_HANDLE.store(handle, Ordering::SeqCst);
    record("original submit");
    COMPOSITOR_ERROR_NONE
}

fn compositor() -> *mut FakeCompositor {
    let address = *COMPOSITOR.get_or_init(|| {
        let mut slots = vec![unrelated_method as unsafe extern "C" fn() as usize; 12];
        slots[SUBMIT_SLOT] = original_submit as SubmitFn as usize;
        let vtable = Box::leak(slots.into_boxed_slice()).as_mut_ptr();
        Box::leak(Box::new(FakeCompositor { vtable })) as *mut FakeCompositor as usize
    });
    address as *mut FakeCompositor
}

fn submit_slot() -> usize {
    unsafe { (*compositor()).vtable.add(SUBMIT_SLOT).read_volatile() }
}

fn host_submit(texture: &Texture) -> i32 {
    let submit: SubmitFn = unsafe { std::mem::transmute::<usize, SubmitFn>(submit_slot()) };
    unsafe { submit(compositor().cast(), 0, texture, std::ptr::null(), 0) }
}

// Fake host exports

unsafe extern "C" fn host_get_generic_interface(version: *const c_char, error: *mut i32) -> *mut c_void {
    let name = unsafe { CStr::from_ptr(version) }.to_string_lossy();
    if name.starts_with("IVRCompositor_") {
        unsafe { error.write(0) };
        compositor().cast()
    } else {
        unsafe { error.write(INIT_ERROR_INTERFACE_NOT_FOUND) };
        std::ptr::null_mut()
    }
}

unsafe extern "C" fn host_shutdown_internal() {
    record("host shutdown");
}

fn acquire(name: &str) -> (*mut c_void, i32) {
    let name = std::ffi::CString::new(name).unwrap();
    let mut error = -1;
    let interface = unsafe { handlers::get_generic_interface(name.as_ptr(), &mut error) };
    (interface, error)
}

// Collaborators

struct LoggedRuntime {
    family: ApiFamily,
    extent: (u32, u32),
}

impl RenderRuntime for LoggedRuntime {
    fn init(&mut self, frame: &FrameDescriptor) -> BackendResult<()> {
        record(format!("{} init {}x{}", self.family, frame.width, frame.height));
        self.extent = frame.extent();
        Ok(())
    }

    fn reset(&mut self) -> BackendResult<()> {
        record(format!("{} reset", self.family));
        self.extent = (0, 0);
        Ok(())
    }

    fn present(&mut self) -> BackendResult<()> {
        record(format!("{} present", self.family));
        Ok(())
    }

    fn frame_width(&self) -> u32 {
        self.extent.0
    }

    fn frame_height(&self) -> u32 {
        self.extent.1
    }
}

#[derive(Default)]
struct CountingFactory {
    constructed: AtomicUsize,
    fail: AtomicBool,
}

impl RuntimeFactory for CountingFactory {
    fn create(&self, identity: &DeviceIdentity) -> BackendResult<Box<dyn RenderRuntime>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::ConstructionFailed("device lost".to_string()));
        }
        self.constructed.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LoggedRuntime { family: identity.family(), extent: (0, 0) }))
    }
}

#[derive(Default)]
struct TextureTable {
    extents: Mutex<HashMap<usize, (u32, u32)>>,
}

impl TextureTable {
    fn set(&self, texture: usize, width: u32, height: u32) {
        self.extents.lock().unwrap().insert(texture, (width, height));
    }
}

impl GraphicsQueries for TextureTable {
    fn d3d11_texture(&self, texture: RawHandle) -> BackendResult<TextureInfo> {
        let extents = self.extents.lock().unwrap();
        let &(width, height) = extents
            .get(&texture.raw())
            .ok_or_else(|| BackendError::QueryFailed("unknown texture".to_string()))?;
        Ok(TextureInfo { width, height, format: 28, sample_count: 1 })
    }

    fn d3d11_device(&self, _texture: RawHandle) -> BackendResult<RawHandle> {
        Ok(RawHandle::new(DEVICE))
    }

    fn d3d12_resource(&self, _resource: RawHandle) -> BackendResult<TextureInfo> {
        Err(BackendError::Unsupported("d3d12".to_string()))
    }

    fn d3d12_device(&self, _resource: RawHandle) -> BackendResult<RawHandle> {
        Err(BackendError::Unsupported("d3d12".to_string()))
    }

    fn gl_object_extent(&self, _name: u32, _object: GlObject) -> BackendResult<(u32, u32)> {
        Err(BackendError::Unsupported("opengl".to_string()))
    }
}

#[test]
fn test_submit_interception_lifecycle() {
    let factory = Arc::new(CountingFactory::default());
    let queries = Arc::new(TextureTable::default());
    let exports = HostExports {
        get_generic_interface: Some(host_get_generic_interface),
        shutdown_internal: Some(host_shutdown_internal),
        init_internal2: None,
    };
    let relay = handlers::activate(
        Arc::new(VrRelay::new(RelayConfig::default(), factory.clone(), queries.clone())),
        exports,
    )
    .unwrap();

    let second = VrRelay::new(RelayConfig::default(), factory.clone(), queries.clone());
    assert!(matches!(
        handlers::activate(Arc::new(second), exports),
        Err(RelayError::AlreadyActive)
    ));

    // Acquisition hooks Submit and hands back the host's interface untouched
    let original_slot = submit_slot();
    let (interface, error) = acquire("IVRCompositor_022");
    assert_eq!(interface, compositor().cast());
    assert_eq!(error, 0);
    assert_eq!(submit_slot(), handlers::submit_handlers().texture);
    assert_eq!(relay.patches().records()[0].original, original_slot);

    let (interface, error) = acquire("IVRCompositor_022");
    assert_eq!(interface, compositor().cast());
    assert_eq!(error, 0);
    assert_eq!(relay.patches().len(), 1);

    let (interface, error) = acquire("IVRSystem_019");
    assert!(interface.is_null());
    assert_eq!(error, INIT_ERROR_INTERFACE_NOT_FOUND);
    assert_eq!(relay.patches().len(), 1);

    // First frame: construct, initialize, present, forward
    queries.set(TEXTURE, 1920, 1080);
    let texture = Texture { handle: TEXTURE as *mut c_void, texture_type: 0, color_space: 0 };
    assert_eq!(host_submit(&texture), COMPOSITOR_ERROR_NONE);
    assert_eq!(
        take_events(),
        ["d3d11 reset", "d3d11 init 1920x1080", "d3d11 present", "original submit"]
    );
    assert_eq!(factory.constructed.load(Ordering::SeqCst), 1);
    assert_eq!(LAST_FORWARDED_HANDLE.load(Ordering::SeqCst), TEXTURE);

    // Same size: present only
    assert_eq!(host_submit(&texture), COMPOSITOR_ERROR_NONE);
    assert_eq!(take_events(), ["d3d11 present", "original submit"]);

    // Resize: reset and init exactly once before present
    queries.set(TEXTURE, 2560, 1440);
    assert_eq!(host_submit(&texture), COMPOSITOR_ERROR_NONE);
    assert_eq!(
        take_events(),
        ["d3d11 reset", "d3d11 init 2560x1440", "d3d11 present", "original submit"]
    );

    // Unsupported texture type is forwarded without touching any runtime
    let metal = Texture { handle: 0x1234 as *mut c_void, texture_type: 6, color_space: 0 };
    assert_eq!(host_submit(&metal), COMPOSITOR_ERROR_NONE);
    assert_eq!(take_events(), ["original submit"]);
    assert_eq!(LAST_FORWARDED_HANDLE.load(Ordering::SeqCst), 0x1234);

    // Teardown resets runtimes before the host's own shutdown
    unsafe { handlers::shutdown_internal() };
    assert_eq!(take_events(), ["d3d11 reset", "host shutdown"]);
    assert!(relay.registry().is_empty());

    // Construction failure: no runtime, no present, original still forwarded
    factory.fail.store(true, Ordering::SeqCst);
    let forwarded_before = ORIGINAL_SUBMITS.load(Ordering::SeqCst);
    assert_eq!(host_submit(&texture), COMPOSITOR_ERROR_NONE);
    assert_eq!(take_events(), ["original submit"]);
    assert!(relay.registry().is_empty());
    assert_eq!(ORIGINAL_SUBMITS.load(Ordering::SeqCst), forwarded_before + 1);
    assert_eq!(LAST_FORWARDED_HANDLE.load(Ordering::SeqCst), TEXTURE);
    factory.fail.store(false, Ordering::SeqCst);

    // A later frame reconstructs from scratch
    assert_eq!(host_submit(&texture), COMPOSITOR_ERROR_NONE);
    assert_eq!(
        take_events(),
        ["d3d11 reset", "d3d11 init 2560x1440", "d3d11 present", "original submit"]
    );
    assert_eq!(factory.constructed.load(Ordering::SeqCst), 2);
    assert_eq!(ORIGINAL_SUBMITS.load(Ordering::SeqCst), 6);
}
