//! C ABI surface of the OpenVR compositor
//!
//! Only the pieces the relay touches: the `Submit` argument types, the
//! entry-point signatures it forwards to, and the enum values it decodes.
//! Enum-typed arguments are received as raw integers and decoded with
//! `from_raw`, since the host may pass values this crate does not know.

use std::ffi::{c_char, c_void};

use bitflags::bitflags;

/// `EVRCompositorError` as returned across the ABI
pub type CompositorError = i32;

/// `VRCompositorError_None`
pub const COMPOSITOR_ERROR_NONE: CompositorError = 0;

/// `VRCompositorError_RequestFailed`, returned when no original can be reached
pub const COMPOSITOR_ERROR_REQUEST_FAILED: CompositorError = 1;

/// `VRInitError_Init_InterfaceNotFound`
pub const INIT_ERROR_INTERFACE_NOT_FOUND: i32 = 105;

/// `EVREye`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    /// `Eye_Left`
    Left,
    /// `Eye_Right`
    Right,
}

impl Eye {
    /// Decode the raw ABI value
    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Left),
            1 => Some(Self::Right),
            _ => None,
        }
    }
}

/// `ETextureType`, the discriminant of [`Texture`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureType {
    /// `ID3D11Texture2D *`
    DirectX,
    /// OpenGL texture or renderbuffer name
    OpenGl,
    /// `VRVulkanTextureData_t *`
    Vulkan,
    /// macOS `IOSurfaceRef`
    IoSurface,
    /// `D3D12TextureData_t *`
    DirectX12,
    /// Shared DXGI handle
    DxgiSharedHandle,
    /// Metal texture
    Metal,
}

impl TextureType {
    /// Decode the raw ABI value
    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::DirectX),
            1 => Some(Self::OpenGl),
            2 => Some(Self::Vulkan),
            3 => Some(Self::IoSurface),
            4 => Some(Self::DirectX12),
            5 => Some(Self::DxgiSharedHandle),
            6 => Some(Self::Metal),
            _ => None,
        }
    }
}

/// `EGraphicsAPIConvention`, the texture discriminant of revisions 7 and 8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyTextureType {
    /// `API_DirectX`: an `ID3D11Texture2D *`
    DirectX,
    /// `API_OpenGL`: a texture name smuggled through the pointer argument
    OpenGl,
}

impl LegacyTextureType {
    /// Decode the raw ABI value
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::DirectX),
            1 => Some(Self::OpenGl),
            _ => None,
        }
    }
}

bitflags! {
    /// `EVRSubmitFlags`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SubmitFlags: u32 {
        /// `Submit_LensDistortionAlreadyApplied`
        const LENS_DISTORTION_ALREADY_APPLIED = 0x01;
        /// `Submit_GlRenderBuffer`
        const GL_RENDER_BUFFER = 0x02;
        /// `Submit_Reserved`
        const RESERVED = 0x04;
        /// `Submit_TextureWithPose`
        const TEXTURE_WITH_POSE = 0x08;
        /// `Submit_TextureWithDepth`
        const TEXTURE_WITH_DEPTH = 0x10;
        /// `Submit_FrameDiscontinuty`
        const FRAME_DISCONTINUITY = 0x20;
        /// `Submit_VulkanTextureWithArrayData`
        const VULKAN_TEXTURE_WITH_ARRAY_DATA = 0x40;
        /// `Submit_GlArrayTexture`
        const GL_ARRAY_TEXTURE = 0x80;
        /// `Submit_IsEgl`
        const IS_EGL = 0x100;
    }
}

/// `Texture_t`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Texture {
    /// Family-specific handle or pointer to a family-specific struct
    pub handle: *mut c_void,
    /// Raw [`TextureType`]
    pub texture_type: i32,
    /// Raw `EColorSpace`
    pub color_space: i32,
}

/// `VRTextureBounds_t`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureBounds {
    /// Left edge in normalized texture coordinates
    pub u_min: f32,
    /// Top edge
    pub v_min: f32,
    /// Right edge
    pub u_max: f32,
    /// Bottom edge
    pub v_max: f32,
}

/// `VRVulkanTextureData_t`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VulkanTextureData {
    /// `VkImage`
    pub image: u64,
    /// `VkDevice`
    pub device: *mut c_void,
    /// `VkPhysicalDevice`
    pub physical_device: *mut c_void,
    /// `VkInstance`
    pub instance: *mut c_void,
    /// `VkQueue`
    pub queue: *mut c_void,
    /// Family index of `queue`
    pub queue_family_index: u32,
    /// Image width
    pub width: u32,
    /// Image height
    pub height: u32,
    /// `VkFormat`
    pub format: u32,
    /// Sample count
    pub sample_count: u32,
}

/// `D3D12TextureData_t`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct D3d12TextureData {
    /// `ID3D12Resource *`
    pub resource: *mut c_void,
    /// `ID3D12CommandQueue *`
    pub command_queue: *mut c_void,
    /// Node mask for multi-adapter setups
    pub node_mask: u32,
}

/// `IVRCompositor::Submit`, revision 7
pub type SubmitRawFn = unsafe extern "C" fn(
    this: *mut c_void,
    eye: i32,
    texture_type: u32,
    texture: *mut c_void,
    bounds: *const TextureBounds,
) -> CompositorError;

/// `IVRCompositor::Submit`, revision 8
pub type SubmitRawFlagsFn = unsafe extern "C" fn(
    this: *mut c_void,
    eye: i32,
    texture_type: u32,
    texture: *mut c_void,
    bounds: *const TextureBounds,
    flags: u32,
) -> CompositorError;

/// `IVRCompositor::Submit`, revision 9 onwards
pub type SubmitFn = unsafe extern "C" fn(
    this: *mut c_void,
    eye: i32,
    texture: *const Texture,
    bounds: *const TextureBounds,
    flags: u32,
) -> CompositorError;

/// `VR_GetGenericInterface`
pub type GetGenericInterfaceFn =
    unsafe extern "C" fn(interface_version: *const c_char, error: *mut i32) -> *mut c_void;

/// `VR_ShutdownInternal`
pub type ShutdownInternalFn = unsafe extern "C" fn();

/// `VR_InitInternal2`
pub type InitInternal2Fn =
    unsafe extern "C" fn(error: *mut i32, application_type: i32, startup_info: *const c_char) -> u32;
