//! Direct3D 11 frame description

use super::{GraphicsQueries, Submission};
use crate::runtime::{ApiFamily, BackendError, BackendResult, DeviceIdentity, FrameDescriptor, PixelFormat, RawHandle};

pub(super) fn describe(
    queries: &dyn GraphicsQueries,
    texture: RawHandle,
    submission: &Submission,
) -> BackendResult<FrameDescriptor> {
    if texture.is_null() {
        return Err(BackendError::QueryFailed("null ID3D11Texture2D".to_string()));
    }
    let info = queries.d3d11_texture(texture)?;

    Ok(FrameDescriptor {
        family: ApiFamily::D3d11,
        image: texture,
        width: info.width,
        height: info.height,
        format: Some(PixelFormat::Dxgi(info.format)),
        sample_count: info.sample_count.max(1),
        queue: None,
        eye: submission.eye,
        bounds: submission.bounds,
    })
}

pub(super) fn device_identity(queries: &dyn GraphicsQueries, texture: RawHandle) -> BackendResult<DeviceIdentity> {
    let device = queries.d3d11_device(texture)?;
    if device.is_null() {
        return Err(BackendError::DeviceLookupFailed("texture reports no ID3D11Device".to_string()));
    }
    Ok(DeviceIdentity::D3d11 { device })
}
