//! Vulkan frame description
//!
//! Everything needed is in the host's texture data; nothing is queried.

use ash::vk::{self, Handle};

use super::{Submission, VulkanTexture};
use crate::runtime::{ApiFamily, BackendError, BackendResult, DeviceIdentity, FrameDescriptor, PixelFormat, RawHandle};

pub(super) fn describe(texture: &VulkanTexture, submission: &Submission) -> BackendResult<FrameDescriptor> {
    if texture.image == vk::Image::null() {
        return Err(BackendError::QueryFailed("VK_NULL_HANDLE image".to_string()));
    }
    let image = usize::try_from(texture.image.as_raw())
        .map_err(|_| BackendError::Unsupported("VkImage handle wider than a pointer".to_string()))?;

    Ok(FrameDescriptor {
        family: ApiFamily::Vulkan,
        image: RawHandle::new(image),
        width: texture.extent.width,
        height: texture.extent.height,
        format: Some(PixelFormat::Vulkan(texture.format)),
        sample_count: texture.sample_count.max(1),
        queue: Some(RawHandle::new(texture.queue.as_raw() as usize)),
        eye: submission.eye,
        bounds: submission.bounds,
    })
}

pub(super) fn device_identity(texture: &VulkanTexture) -> BackendResult<DeviceIdentity> {
    if texture.device == vk::Device::null() || texture.queue == vk::Queue::null() {
        return Err(BackendError::DeviceLookupFailed("texture data lacks device or queue".to_string()));
    }
    Ok(DeviceIdentity::Vulkan {
        instance: texture.instance,
        physical_device: texture.physical_device,
        device: texture.device,
        queue: texture.queue,
        queue_family_index: texture.queue_family_index,
    })
}
