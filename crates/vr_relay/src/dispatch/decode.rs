//! Decoding of raw `Submit` arguments into a [`Submission`]

#![allow(unsafe_code)]

use std::ffi::c_void;

use ash::vk::{self, Handle};

use super::{GlObject, Submission, SubmittedTexture, VulkanTexture};
use crate::openvr::{
    D3d12TextureData, Eye, LegacyTextureType, SubmitFlags, Texture, TextureBounds, TextureType, VulkanTextureData,
};
use crate::runtime::RawHandle;

/// Why a submission cannot be relayed; the host call is forwarded regardless
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Eye value outside `EVREye`
    #[error("Unknown eye {0}")]
    UnknownEye(i32),

    /// The texture argument was null
    #[error("Null texture")]
    NullTexture,

    /// Texture type the relay has no runtime for
    #[error("Unsupported texture type {0}")]
    UnsupportedType(i32),

    /// Legacy texture type outside `EGraphicsAPIConvention`
    #[error("Unknown legacy texture type {0}")]
    UnknownLegacyType(u32),

    /// The GL name smuggled through a pointer does not fit 32 bits
    #[error("GL object name {0:#x} out of range")]
    GlNameOutOfRange(usize),
}

impl Submission {
    /// Decode the arguments of the texture-struct `Submit` (revision 9 on)
    ///
    /// # Safety
    ///
    /// `texture` and `bounds` must each be null or valid for reads, and the
    /// family-specific data `texture.handle` points at must match
    /// `texture.texture_type`.
    pub unsafe fn from_texture(
        eye: i32,
        texture: *const Texture,
        bounds: *const TextureBounds,
        flags: u32,
    ) -> Result<Self, DecodeError> {
        let eye = Eye::from_raw(eye).ok_or(DecodeError::UnknownEye(eye))?;
        let texture = texture.as_ref().ok_or(DecodeError::NullTexture)?;
        if texture.handle.is_null() {
            return Err(DecodeError::NullTexture);
        }
        let flags = SubmitFlags::from_bits_retain(flags);

        let decoded = match TextureType::from_raw(texture.texture_type) {
            Some(TextureType::DirectX) => SubmittedTexture::D3d11 { texture: RawHandle::from_ptr(texture.handle) },
            Some(TextureType::DirectX12) => {
                let data = &*texture.handle.cast::<D3d12TextureData>();
                SubmittedTexture::D3d12 {
                    resource: RawHandle::from_ptr(data.resource),
                    command_queue: RawHandle::from_ptr(data.command_queue),
                }
            }
            Some(TextureType::OpenGl) => {
                let object = if flags.contains(SubmitFlags::GL_RENDER_BUFFER) {
                    GlObject::Renderbuffer
                } else {
                    GlObject::Texture2d
                };
                SubmittedTexture::OpenGl { name: gl_name(texture.handle)?, object }
            }
            Some(TextureType::Vulkan) => {
                SubmittedTexture::Vulkan(vulkan_texture(&*texture.handle.cast::<VulkanTextureData>()))
            }
            Some(TextureType::IoSurface | TextureType::DxgiSharedHandle | TextureType::Metal) | None => {
                return Err(DecodeError::UnsupportedType(texture.texture_type));
            }
        };

        Ok(Self { eye, texture: decoded, bounds: bounds.as_ref().copied(), flags })
    }

    /// Decode the arguments of the raw-handle `Submit` (revisions 7 and 8)
    ///
    /// Revision 7 carries no flags; pass 0.
    ///
    /// # Safety
    ///
    /// `bounds` must be null or valid for reads.
    pub unsafe fn from_legacy(
        eye: i32,
        texture_type: u32,
        texture: *mut c_void,
        bounds: *const TextureBounds,
        flags: u32,
    ) -> Result<Self, DecodeError> {
        let eye = Eye::from_raw(eye).ok_or(DecodeError::UnknownEye(eye))?;
        if texture.is_null() {
            return Err(DecodeError::NullTexture);
        }

        let decoded = match LegacyTextureType::from_raw(texture_type) {
            Some(LegacyTextureType::DirectX) => SubmittedTexture::D3d11 { texture: RawHandle::from_ptr(texture) },
            Some(LegacyTextureType::OpenGl) => SubmittedTexture::OpenGl {
                name: gl_name(texture)?,
                object: GlObject::Texture2d,
            },
            None => return Err(DecodeError::UnknownLegacyType(texture_type)),
        };

        Ok(Self {
            eye,
            texture: decoded,
            bounds: bounds.as_ref().copied(),
            flags: SubmitFlags::from_bits_retain(flags),
        })
    }
}

fn gl_name(handle: *const c_void) -> Result<u32, DecodeError> {
    let raw = handle as usize;
    u32::try_from(raw).map_err(|_| DecodeError::GlNameOutOfRange(raw))
}

fn vulkan_texture(data: &VulkanTextureData) -> VulkanTexture {
    VulkanTexture {
        image: vk::Image::from_raw(data.image),
        instance: vk::Instance::from_raw(data.instance as u64),
        physical_device: vk::PhysicalDevice::from_raw(data.physical_device as u64),
        device: vk::Device::from_raw(data.device as u64),
        queue: vk::Queue::from_raw(data.queue as u64),
        queue_family_index: data.queue_family_index,
        extent: vk::Extent2D { width: data.width, height: data.height },
        format: vk::Format::from_raw(data.format as i32),
        sample_count: data.sample_count,
    }
}
