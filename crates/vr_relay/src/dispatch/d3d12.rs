//! Direct3D 12 frame description
//!
//! The command queue comes from the submitted texture data rather than the
//! resource, so it is part of both the frame and the device identity.

use super::{GraphicsQueries, Submission};
use crate::runtime::{ApiFamily, BackendError, BackendResult, DeviceIdentity, FrameDescriptor, PixelFormat, RawHandle};

pub(super) fn describe(
    queries: &dyn GraphicsQueries,
    resource: RawHandle,
    command_queue: RawHandle,
    submission: &Submission,
) -> BackendResult<FrameDescriptor> {
    if resource.is_null() {
        return Err(BackendError::QueryFailed("null ID3D12Resource".to_string()));
    }
    let info = queries.d3d12_resource(resource)?;

    Ok(FrameDescriptor {
        family: ApiFamily::D3d12,
        image: resource,
        width: info.width,
        height: info.height,
        format: Some(PixelFormat::Dxgi(info.format)),
        sample_count: info.sample_count.max(1),
        queue: (!command_queue.is_null()).then_some(command_queue),
        eye: submission.eye,
        bounds: submission.bounds,
    })
}

pub(super) fn device_identity(
    queries: &dyn GraphicsQueries,
    resource: RawHandle,
    command_queue: RawHandle,
) -> BackendResult<DeviceIdentity> {
    if command_queue.is_null() {
        return Err(BackendError::DeviceLookupFailed("submission carries no command queue".to_string()));
    }
    let device = queries.d3d12_device(resource)?;
    if device.is_null() {
        return Err(BackendError::DeviceLookupFailed("resource reports no ID3D12Device".to_string()));
    }
    Ok(DeviceIdentity::D3d12 { device, command_queue })
}
