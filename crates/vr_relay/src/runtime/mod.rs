//! Rendering runtime abstraction
//!
//! This module defines the contract every per-API rendering runtime
//! implements, the descriptors the dispatcher hands to it, and the factory
//! through which the registry constructs runtimes. The effect pipeline
//! behind the contract is opaque to this crate.

pub mod registry;

use std::ffi::c_void;
use std::fmt;

use ash::vk;
use serde::{Deserialize, Serialize};

use crate::openvr::{Eye, TextureBounds};

pub use registry::{RuntimeHandle, RuntimeRegistry, RuntimeState, ShutdownReport};

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Graphics API family a submitted frame originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ApiFamily {
    /// Direct3D 11
    #[serde(rename = "d3d11")]
    D3d11,
    /// Direct3D 12
    #[serde(rename = "d3d12")]
    D3d12,
    /// OpenGL
    #[serde(rename = "opengl")]
    OpenGl,
    /// Vulkan
    #[serde(rename = "vulkan")]
    Vulkan,
}

impl ApiFamily {
    /// Every family, in declaration order
    pub const ALL: [Self; 4] = [Self::D3d11, Self::D3d12, Self::OpenGl, Self::Vulkan];

    /// Lower-case name as used in configuration files
    pub const fn name(self) -> &'static str {
        match self {
            Self::D3d11 => "d3d11",
            Self::D3d12 => "d3d12",
            Self::OpenGl => "opengl",
            Self::Vulkan => "vulkan",
        }
    }
}

impl fmt::Display for ApiFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque handle owned by the host (a COM pointer, GL name, or Vulkan handle)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RawHandle(usize);

impl RawHandle {
    /// The null handle
    pub const NULL: Self = Self(0);

    /// Wrap a raw value
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Wrap a host pointer
    pub fn from_ptr(ptr: *const c_void) -> Self {
        Self(ptr as usize)
    }

    /// The raw value
    pub const fn raw(self) -> usize {
        self.0
    }

    /// The handle as a host pointer
    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    /// Whether the handle is null
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Pixel format of a submitted image, in the family's own vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// `DXGI_FORMAT` value (Direct3D 11 and 12)
    Dxgi(u32),
    /// `VkFormat`
    Vulkan(vk::Format),
}

/// Everything a runtime needs to know about the frame it is handed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameDescriptor {
    /// Family the frame came from
    pub family: ApiFamily,
    /// Submitted image: texture/resource pointer, GL name, or `VkImage`
    pub image: RawHandle,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format, when the family reports one
    pub format: Option<PixelFormat>,
    /// Multisample count (1 when not multisampled)
    pub sample_count: u32,
    /// Queue the frame was rendered on, when the family exposes one
    pub queue: Option<RawHandle>,
    /// Eye the frame is submitted for
    pub eye: Eye,
    /// Sub-rectangle of the image that is displayed
    pub bounds: Option<TextureBounds>,
}

impl FrameDescriptor {
    /// Frame extent as `(width, height)`
    pub const fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Construction arguments for a runtime, taken from the first frame of a family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceIdentity {
    /// `ID3D11Device *` the submitted texture belongs to
    D3d11 {
        /// Device pointer
        device: RawHandle,
    },
    /// `ID3D12Device *` plus the queue the host submits on
    D3d12 {
        /// Device pointer
        device: RawHandle,
        /// `ID3D12CommandQueue *`
        command_queue: RawHandle,
    },
    /// The OpenGL context current on the submitting thread
    OpenGl,
    /// Vulkan handles carried in the texture data
    Vulkan {
        /// Instance
        instance: vk::Instance,
        /// Physical device
        physical_device: vk::PhysicalDevice,
        /// Logical device
        device: vk::Device,
        /// Queue the host submits on
        queue: vk::Queue,
        /// Family index of `queue`
        queue_family_index: u32,
    },
}

impl DeviceIdentity {
    /// Family this identity belongs to
    pub const fn family(&self) -> ApiFamily {
        match self {
            Self::D3d11 { .. } => ApiFamily::D3d11,
            Self::D3d12 { .. } => ApiFamily::D3d12,
            Self::OpenGl => ApiFamily::OpenGl,
            Self::Vulkan { .. } => ApiFamily::Vulkan,
        }
    }
}

/// Backend errors
///
/// Raised by runtimes, factories and graphics queries. None of these ever
/// reach the host; they decide whether one frame is relayed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The device behind a submitted resource could not be identified
    #[error("Device lookup failed: {0}")]
    DeviceLookupFailed(String),

    /// A resource query (extent, format) failed
    #[error("Resource query failed: {0}")]
    QueryFailed(String),

    /// The submitted texture cannot be relayed
    #[error("Unsupported texture: {0}")]
    Unsupported(String),

    /// Runtime construction failed
    #[error("Runtime construction failed: {0}")]
    ConstructionFailed(String),

    /// Runtime initialization for a frame configuration failed
    #[error("Runtime initialization failed: {0}")]
    InitializationFailed(String),

    /// Present failed
    #[error("Present failed: {0}")]
    PresentFailed(String),

    /// Reset failed
    #[error("Reset failed: {0}")]
    ResetFailed(String),
}

/// Per-family rendering runtime
///
/// One instance exists per [`ApiFamily`]. The dispatcher drives it with
/// `reset` → `init` whenever the submitted frame configuration changes and
/// `present` once per relayed frame.
pub trait RenderRuntime: Send {
    /// Build size-dependent resources for `frame`
    fn init(&mut self, frame: &FrameDescriptor) -> BackendResult<()>;

    /// Release size-dependent resources; afterwards the runtime is uninitialized
    fn reset(&mut self) -> BackendResult<()>;

    /// Process and present the current frame
    fn present(&mut self) -> BackendResult<()>;

    /// Width the runtime was last initialized with (0 when uninitialized)
    fn frame_width(&self) -> u32;

    /// Height the runtime was last initialized with (0 when uninitialized)
    fn frame_height(&self) -> u32;

    /// Format the runtime was last initialized with, if it tracks one
    fn frame_format(&self) -> Option<PixelFormat> {
        None
    }

    /// Whether `init` has succeeded since the last `reset`
    fn is_initialized(&self) -> bool {
        self.frame_width() != 0 && self.frame_height() != 0
    }
}

/// Constructs runtimes for the registry
pub trait RuntimeFactory: Send + Sync {
    /// Construct the runtime for `identity.family()`
    fn create(&self, identity: &DeviceIdentity) -> BackendResult<Box<dyn RenderRuntime>>;
}

impl<F> RuntimeFactory for F
where
    F: Fn(&DeviceIdentity) -> BackendResult<Box<dyn RenderRuntime>> + Send + Sync,
{
    fn create(&self, identity: &DeviceIdentity) -> BackendResult<Box<dyn RenderRuntime>> {
        self(identity)
    }
}
