//! # VR Relay
//!
//! Intercepts the frames a VR application submits to the OpenVR compositor
//! and routes them through a per-API rendering runtime before the compositor
//! sees them. The application is not aware of the relay.
//!
//! ## Features
//!
//! - **Interception**: `IVRCompositor::Submit` is patched in the interface's
//!   virtual table as soon as the application acquires it
//! - **Multi-API**: Direct3D 11, Direct3D 12, OpenGL and Vulkan frames, each
//!   with its own lazily constructed runtime
//! - **Resize Tracking**: runtimes are rebuilt whenever the submitted frame
//!   changes size (and optionally format or source texture)
//! - **Transparent Forwarding**: the original `Submit` always runs with the
//!   application's untouched arguments
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use vr_relay::prelude::*;
//!
//! struct NoQueries;
//!
//! impl GraphicsQueries for NoQueries {
//!     fn d3d11_texture(&self, _: RawHandle) -> BackendResult<TextureInfo> {
//!         Err(BackendError::Unsupported("d3d11".to_string()))
//!     }
//!     fn d3d11_device(&self, _: RawHandle) -> BackendResult<RawHandle> {
//!         Err(BackendError::Unsupported("d3d11".to_string()))
//!     }
//!     fn d3d12_resource(&self, _: RawHandle) -> BackendResult<TextureInfo> {
//!         Err(BackendError::Unsupported("d3d12".to_string()))
//!     }
//!     fn d3d12_device(&self, _: RawHandle) -> BackendResult<RawHandle> {
//!         Err(BackendError::Unsupported("d3d12".to_string()))
//!     }
//!     fn gl_object_extent(&self, _: u32, _: GlObject) -> BackendResult<(u32, u32)> {
//!         Err(BackendError::Unsupported("opengl".to_string()))
//!     }
//! }
//!
//! fn load(factory: Arc<dyn RuntimeFactory>, exports: HostExports) -> Result<(), RelayError> {
//!     let relay = vr_relay::handlers::bootstrap(factory, Arc::new(NoQueries), exports)?;
//!     assert!(relay.patches().is_empty());
//!     // Hand vr_relay::handlers::get_generic_interface to the application
//!     // in place of VR_GetGenericInterface.
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::missing_safety_doc)]

pub mod core;
pub mod foundation;
pub mod config;

pub mod openvr;
pub mod hook;
pub mod resolver;
pub mod runtime;
pub mod dispatch;
pub mod shutdown;
pub mod handlers;

mod relay;

pub use handlers::{HostExports, RelayError};
pub use relay::{SubmitHandlers, VrRelay, SUBMIT_TARGET};

/// Common imports for relay embedders
pub mod prelude {
    pub use crate::{
        core::config::{Config, DispatchConfig, InterceptionConfig, LoggingConfig, RelayConfig},
        dispatch::{FrameOutcome, GlObject, GraphicsQueries, SkipReason, Submission, SubmittedTexture, TextureInfo},
        hook::{HookError, PatchTable, VirtualTable},
        openvr::{Eye, SubmitFlags},
        resolver::{InterfaceResolver, SubmitBinding, SubmitVariant},
        runtime::{
            ApiFamily, BackendError, BackendResult, DeviceIdentity, FrameDescriptor, PixelFormat, RawHandle,
            RenderRuntime, RuntimeFactory, RuntimeRegistry,
        },
        HostExports, RelayError, SubmitHandlers, VrRelay,
    };
}
