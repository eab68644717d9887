//! Frame Submission Dispatcher
//!
//! Turns one decoded host submission into at most one `present` on the
//! runtime of its API family:
//!
//! 1. describe the frame (family-specific, see the submodules)
//! 2. resolve or construct the family's runtime through the registry
//! 3. `reset` + `init` when the runtime is uninitialized or the frame
//!    configuration changed
//! 4. `present`
//!
//! Every failure drops the frame and is reported as a [`FrameOutcome`]; the
//! caller forwards the host's original call regardless.

mod d3d11;
mod d3d12;
mod decode;
mod opengl;
mod vulkan;

use std::sync::Arc;

use ash::vk;

use crate::core::config::DispatchConfig;
use crate::openvr::{Eye, SubmitFlags, TextureBounds};
use crate::runtime::{
    ApiFamily, BackendError, BackendResult, DeviceIdentity, FrameDescriptor, RawHandle, RenderRuntime, RuntimeHandle,
    RuntimeRegistry,
};

pub use decode::DecodeError;

/// Resource description returned by the Direct3D queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// `DXGI_FORMAT`
    pub format: u32,
    /// Multisample count
    pub sample_count: u32,
}

/// Kind of OpenGL object a name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlObject {
    /// `GL_TEXTURE_2D`
    Texture2d,
    /// `GL_RENDERBUFFER`
    Renderbuffer,
}

/// Introspection of host-owned graphics objects
///
/// Implemented against the live graphics APIs by the embedding loader.
/// Every method runs on the submitting thread, with the host's context
/// current for OpenGL.
pub trait GraphicsQueries: Send + Sync {
    /// Description of an `ID3D11Texture2D`
    fn d3d11_texture(&self, texture: RawHandle) -> BackendResult<TextureInfo>;

    /// The `ID3D11Device` owning `texture`, when the relay can drive it
    fn d3d11_device(&self, texture: RawHandle) -> BackendResult<RawHandle>;

    /// Description of an `ID3D12Resource`
    fn d3d12_resource(&self, resource: RawHandle) -> BackendResult<TextureInfo>;

    /// The `ID3D12Device` owning `resource`, when the relay can drive it
    fn d3d12_device(&self, resource: RawHandle) -> BackendResult<RawHandle>;

    /// Extent of an OpenGL object; previous bindings must be restored
    fn gl_object_extent(&self, name: u32, object: GlObject) -> BackendResult<(u32, u32)>;
}

/// Vulkan texture data copied out of the host's struct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VulkanTexture {
    /// Submitted image
    pub image: vk::Image,
    /// Instance
    pub instance: vk::Instance,
    /// Physical device
    pub physical_device: vk::PhysicalDevice,
    /// Logical device
    pub device: vk::Device,
    /// Queue the image was rendered on
    pub queue: vk::Queue,
    /// Family index of `queue`
    pub queue_family_index: u32,
    /// Image extent
    pub extent: vk::Extent2D,
    /// Image format
    pub format: vk::Format,
    /// Sample count
    pub sample_count: u32,
}

/// The family-specific payload of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmittedTexture {
    /// `ID3D11Texture2D *`
    D3d11 {
        /// Texture pointer
        texture: RawHandle,
    },
    /// `D3D12TextureData_t`
    D3d12 {
        /// `ID3D12Resource *`
        resource: RawHandle,
        /// `ID3D12CommandQueue *`
        command_queue: RawHandle,
    },
    /// OpenGL object name
    OpenGl {
        /// Object name
        name: u32,
        /// Texture or renderbuffer
        object: GlObject,
    },
    /// `VRVulkanTextureData_t`
    Vulkan(VulkanTexture),
}

impl SubmittedTexture {
    /// Family of the payload
    pub const fn family(&self) -> ApiFamily {
        match self {
            Self::D3d11 { .. } => ApiFamily::D3d11,
            Self::D3d12 { .. } => ApiFamily::D3d12,
            Self::OpenGl { .. } => ApiFamily::OpenGl,
            Self::Vulkan(_) => ApiFamily::Vulkan,
        }
    }
}

/// One decoded `Submit` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Submission {
    /// Target eye
    pub eye: Eye,
    /// Family-specific payload
    pub texture: SubmittedTexture,
    /// Displayed sub-rectangle
    pub bounds: Option<TextureBounds>,
    /// Submit flags
    pub flags: SubmitFlags,
}

/// Why a frame was not relayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The family is disabled in configuration
    FamilyDisabled,
    /// The frame could not be described
    DescribeFailed,
    /// No runtime could be constructed for the family
    ConstructionFailed,
    /// The runtime failed to initialize for the new frame configuration
    InitFailed,
    /// The runtime was torn down by shutdown while this frame held it
    Retired,
}

/// What the dispatcher did with one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameOutcome {
    /// The runtime presented the frame
    Presented {
        /// Whether `reset` + `init` ran first
        reinitialized: bool,
    },
    /// The runtime was ready but `present` reported an error
    PresentFailed,
    /// The frame was dropped before reaching `present`
    Skipped(SkipReason),
}

impl FrameOutcome {
    /// Whether the runtime presented the frame
    pub const fn is_presented(self) -> bool {
        matches!(self, Self::Presented { .. })
    }
}

/// The reconcile-and-present protocol shared by every family
pub struct FrameDispatcher {
    registry: Arc<RuntimeRegistry>,
    queries: Arc<dyn GraphicsQueries>,
    config: DispatchConfig,
}

impl FrameDispatcher {
    /// Create a dispatcher over `registry`
    pub fn new(registry: Arc<RuntimeRegistry>, queries: Arc<dyn GraphicsQueries>, config: DispatchConfig) -> Self {
        Self { registry, queries, config }
    }

    /// The registry runtimes are resolved from
    pub fn registry(&self) -> &Arc<RuntimeRegistry> {
        &self.registry
    }

    /// Dispatch configuration
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Relay one submission
    pub fn submit(&self, submission: &Submission) -> FrameOutcome {
        let family = submission.texture.family();
        if !self.config.is_enabled(family) {
            return FrameOutcome::Skipped(SkipReason::FamilyDisabled);
        }

        let frame = match self.describe(submission) {
            Ok(frame) => frame,
            Err(error) => {
                log::warn!("Skipping {family} frame: {error}");
                return FrameOutcome::Skipped(SkipReason::DescribeFailed);
            }
        };

        let runtime = match self
            .registry
            .get_or_create(family, || self.device_identity(&submission.texture))
        {
            Ok(runtime) => runtime,
            Err(error) => {
                log::error!("Failed to create {family} runtime: {error}");
                return FrameOutcome::Skipped(SkipReason::ConstructionFailed);
            }
        };

        self.present(&runtime, &frame)
    }

    /// Bring `runtime` in line with `frame`, then present
    pub fn present(&self, runtime: &RuntimeHandle, frame: &FrameDescriptor) -> FrameOutcome {
        let family = runtime.family();
        let mut state = runtime.lock();
        if state.is_retired() {
            log::debug!("Dropping {family} frame: runtime was shut down");
            return FrameOutcome::Skipped(SkipReason::Retired);
        }

        let reinitialize = self.needs_reinit(state.runtime(), state.bound_source(), frame);
        if reinitialize {
            log::debug!(
                "Reinitializing {family} runtime for {}x{} (was {}x{})",
                frame.width,
                frame.height,
                state.runtime().frame_width(),
                state.runtime().frame_height()
            );

            if let Err(error) = state.runtime_mut().reset() {
                log::warn!("{family} runtime reset reported an error: {error}");
            }
            state.set_bound_source(None);

            if let Err(error) = state.runtime_mut().init(frame) {
                log::error!("Failed to recreate {family} runtime environment: {error}");
                // Leave it uninitialized so the next frame retries from scratch
                if let Err(error) = state.runtime_mut().reset() {
                    log::warn!("{family} runtime reset after failed init reported an error: {error}");
                }
                return FrameOutcome::Skipped(SkipReason::InitFailed);
            }
            state.set_bound_source(Some(frame.image));
        }

        match state.runtime_mut().present() {
            Ok(()) => {
                log::trace!("Presented {family} frame {:?} ({:?})", frame.image, frame.eye);
                FrameOutcome::Presented { reinitialized: reinitialize }
            }
            Err(error) => {
                log::warn!("{family} present failed: {error}");
                FrameOutcome::PresentFailed
            }
        }
    }

    fn needs_reinit(
        &self,
        runtime: &dyn RenderRuntime,
        bound_source: Option<RawHandle>,
        frame: &FrameDescriptor,
    ) -> bool {
        if !runtime.is_initialized() {
            return true;
        }
        if runtime.frame_width() != frame.width || runtime.frame_height() != frame.height {
            return true;
        }
        if self.config.track_format {
            if let (Some(current), Some(next)) = (runtime.frame_format(), frame.format) {
                if current != next {
                    return true;
                }
            }
        }
        self.config.reinit_on_source_change && bound_source != Some(frame.image)
    }

    fn describe(&self, submission: &Submission) -> BackendResult<FrameDescriptor> {
        let frame = match submission.texture {
            SubmittedTexture::D3d11 { texture } => d3d11::describe(self.queries.as_ref(), texture, submission)?,
            SubmittedTexture::D3d12 { resource, command_queue } => {
                d3d12::describe(self.queries.as_ref(), resource, command_queue, submission)?
            }
            SubmittedTexture::OpenGl { name, object } => {
                opengl::describe(self.queries.as_ref(), name, object, submission)?
            }
            SubmittedTexture::Vulkan(ref texture) => vulkan::describe(texture, submission)?,
        };

        if frame.width == 0 || frame.height == 0 {
            return Err(BackendError::QueryFailed(format!(
                "zero-sized {} frame",
                frame.family
            )));
        }
        Ok(frame)
    }

    fn device_identity(&self, texture: &SubmittedTexture) -> BackendResult<DeviceIdentity> {
        match *texture {
            SubmittedTexture::D3d11 { texture } => d3d11::device_identity(self.queries.as_ref(), texture),
            SubmittedTexture::D3d12 { resource, command_queue } => {
                d3d12::device_identity(self.queries.as_ref(), resource, command_queue)
            }
            SubmittedTexture::OpenGl { .. } => Ok(opengl::device_identity()),
            SubmittedTexture::Vulkan(ref texture) => vulkan::device_identity(texture),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Table-driven graphics queries

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub(crate) struct FakeQueries {
        pub(crate) textures: Mutex<HashMap<usize, TextureInfo>>,
        pub(crate) devices: Mutex<HashMap<usize, RawHandle>>,
        pub(crate) gl_extents: Mutex<HashMap<(u32, GlObject), (u32, u32)>>,
    }

    impl FakeQueries {
        pub(crate) fn set_texture(&self, handle: usize, width: u32, height: u32, format: u32) {
            self.textures.lock().unwrap().insert(
                handle,
                TextureInfo { width, height, format, sample_count: 1 },
            );
        }

        pub(crate) fn set_device(&self, handle: usize, device: usize) {
            self.devices.lock().unwrap().insert(handle, RawHandle::new(device));
        }

        fn texture(&self, handle: RawHandle) -> BackendResult<TextureInfo> {
            self.textures
                .lock()
                .unwrap()
                .get(&handle.raw())
                .copied()
                .ok_or_else(|| BackendError::QueryFailed(format!("unknown resource {handle:?}")))
        }

        fn device(&self, handle: RawHandle) -> BackendResult<RawHandle> {
            self.devices
                .lock()
                .unwrap()
                .get(&handle.raw())
                .copied()
                .ok_or_else(|| BackendError::DeviceLookupFailed(format!("no device for {handle:?}")))
        }
    }

    impl GraphicsQueries for FakeQueries {
        fn d3d11_texture(&self, texture: RawHandle) -> BackendResult<TextureInfo> {
            self.texture(texture)
        }

        fn d3d11_device(&self, texture: RawHandle) -> BackendResult<RawHandle> {
            self.device(texture)
        }

        fn d3d12_resource(&self, resource: RawHandle) -> BackendResult<TextureInfo> {
            self.texture(resource)
        }

        fn d3d12_device(&self, resource: RawHandle) -> BackendResult<RawHandle> {
            self.device(resource)
        }

        fn gl_object_extent(&self, name: u32, object: GlObject) -> BackendResult<(u32, u32)> {
            self.gl_extents
                .lock()
                .unwrap()
                .get(&(name, object))
                .copied()
                .ok_or_else(|| BackendError::QueryFailed(format!("unknown GL object {name}")))
        }
    }
}
