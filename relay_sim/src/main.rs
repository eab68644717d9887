//! Relay simulator
//!
//! Plays both sides of the relay inside one process: a fake VR runtime
//! exporting `VR_GetGenericInterface` and a compositor object, and an
//! application submitting frames whose size changes halfway through. Frames
//! travel the same C ABI path they take in a real host.
//!
//! Set `VR_RELAY_CONFIG` to a TOML or RON file to try other configurations
//! and `VR_RELAY_LOG=trace` to see every frame.

#![allow(unsafe_code)]

mod host;
mod runtime;

use std::sync::Arc;

use vr_relay::config::ConfigError;
use vr_relay::foundation::logging;
use vr_relay::handlers;
use vr_relay::openvr::{Texture, COMPOSITOR_ERROR_NONE};
use vr_relay::prelude::*;

const COMPOSITOR_VERSION: &str = "IVRCompositor_022";
const FRAMES_PER_PHASE: u32 = 4;
const ORIGINAL_EXTENT: (u32, u32) = (1852, 2056);
const RESIZED_EXTENT: (u32, u32) = (2016, 2240);

/// Simulator errors
#[derive(thiserror::Error, Debug)]
pub enum SimError {
    /// Relay activation failed
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// The configuration file could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The fake runtime refused an interface
    #[error("Interface {name} unavailable (error {code})")]
    InterfaceUnavailable {
        /// Requested interface
        name: String,
        /// `EVRInitError`
        code: i32,
    },

    /// `Submit` reported an error
    #[error("Submit failed with compositor error {0}")]
    SubmitFailed(i32),
}

fn main() -> Result<(), SimError> {
    let config = RelayConfig::discover()?;
    logging::init(&config.logging);
    log::info!("Starting relay simulator");

    let queries = Arc::new(runtime::SimQueries::default());
    let relay = handlers::activate(
        Arc::new(VrRelay::new(config, Arc::new(runtime::LoggingFactory), queries.clone())),
        host::exports(),
    )?;

    host::init_runtime();
    let compositor = host::acquire(COMPOSITOR_VERSION)?;
    log::info!("Patched slots: {:?}", relay.patches().records());

    let d3d11 = host::d3d11_texture();
    let gl = host::gl_texture();
    run_phase("Direct3D 11", &compositor, &queries, &d3d11, SubmitFlags::empty())?;
    run_phase("OpenGL renderbuffer", &compositor, &queries, &gl, SubmitFlags::GL_RENDER_BUFFER)?;

    log::info!("Live runtimes before shutdown: {:?}", relay.registry().families());
    unsafe { handlers::shutdown_internal() };
    log::info!("Live runtimes after shutdown: {}", relay.registry().len());
    Ok(())
}

/// Submit both eyes for a few frames, resizing halfway
fn run_phase(
    label: &str,
    compositor: &host::Compositor,
    queries: &runtime::SimQueries,
    texture: &Texture,
    flags: SubmitFlags,
) -> Result<(), SimError> {
    log::info!("--- {label} ---");
    for frame in 0..FRAMES_PER_PHASE {
        let extent = if frame < FRAMES_PER_PHASE / 2 { ORIGINAL_EXTENT } else { RESIZED_EXTENT };
        queries.set_extent(extent);

        for eye in [Eye::Left, Eye::Right] {
            let status = compositor.submit(eye, texture, flags);
            if status != COMPOSITOR_ERROR_NONE {
                return Err(SimError::SubmitFailed(status));
            }
        }
    }
    Ok(())
}
