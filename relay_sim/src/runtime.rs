//! Simulated graphics collaborators
//!
//! The runtime only logs what a real effect pipeline would do; the queries
//! report whatever extent the simulator is currently rendering at.

use std::sync::atomic::{AtomicU64, Ordering};

use vr_relay::prelude::*;

const SIM_DEVICE: usize = 0xDE71_CE00;
const DXGI_FORMAT_R8G8B8A8_UNORM_SRGB: u32 = 29;

/// Runtime that logs its lifecycle
pub struct LoggingRuntime {
    family: ApiFamily,
    extent: (u32, u32),
    format: Option<PixelFormat>,
    presented: u64,
}

impl RenderRuntime for LoggingRuntime {
    fn init(&mut self, frame: &FrameDescriptor) -> BackendResult<()> {
        log::info!(
            "[{}] init {}x{} format {:?} samples {}",
            self.family,
            frame.width,
            frame.height,
            frame.format,
            frame.sample_count
        );
        self.extent = frame.extent();
        self.format = frame.format;
        Ok(())
    }

    fn reset(&mut self) -> BackendResult<()> {
        log::info!("[{}] reset after {} presented frames", self.family, self.presented);
        self.extent = (0, 0);
        self.format = None;
        Ok(())
    }

    fn present(&mut self) -> BackendResult<()> {
        self.presented += 1;
        log::trace!("[{}] present #{}", self.family, self.presented);
        Ok(())
    }

    fn frame_width(&self) -> u32 {
        self.extent.0
    }

    fn frame_height(&self) -> u32 {
        self.extent.1
    }

    fn frame_format(&self) -> Option<PixelFormat> {
        self.format
    }
}

/// Builds a [`LoggingRuntime`] for every family
pub struct LoggingFactory;

impl RuntimeFactory for LoggingFactory {
    fn create(&self, identity: &DeviceIdentity) -> BackendResult<Box<dyn RenderRuntime>> {
        log::info!("Constructing runtime for {identity:?}");
        Ok(Box::new(LoggingRuntime {
            family: identity.family(),
            extent: (0, 0),
            format: None,
            presented: 0,
        }))
    }
}

/// Queries answering with the simulator's current render extent
#[derive(Default)]
pub struct SimQueries {
    extent: AtomicU64,
}

impl SimQueries {
    /// Change the extent every query reports
    pub fn set_extent(&self, (width, height): (u32, u32)) {
        self.extent
            .store((u64::from(width) << 32) | u64::from(height), Ordering::Relaxed);
    }

    fn extent(&self) -> (u32, u32) {
        let packed = self.extent.load(Ordering::Relaxed);
        ((packed >> 32) as u32, packed as u32)
    }
}

impl GraphicsQueries for SimQueries {
    fn d3d11_texture(&self, _texture: RawHandle) -> BackendResult<TextureInfo> {
        let (width, height) = self.extent();
        Ok(TextureInfo { width, height, format: DXGI_FORMAT_R8G8B8A8_UNORM_SRGB, sample_count: 1 })
    }

    fn d3d11_device(&self, _texture: RawHandle) -> BackendResult<RawHandle> {
        Ok(RawHandle::new(SIM_DEVICE))
    }

    fn d3d12_resource(&self, _resource: RawHandle) -> BackendResult<TextureInfo> {
        Err(BackendError::Unsupported("the simulator renders no Direct3D 12 frames".to_string()))
    }

    fn d3d12_device(&self, _resource: RawHandle) -> BackendResult<RawHandle> {
        Err(BackendError::Unsupported("the simulator renders no Direct3D 12 frames".to_string()))
    }

    fn gl_object_extent(&self, _name: u32, _object: GlObject) -> BackendResult<(u32, u32)> {
        Ok(self.extent())
    }
}
