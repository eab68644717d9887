//! OpenGL frame description
//!
//! GL names carry no format the relay tracks, and the runtime binds to
//! whatever context is current on the submitting thread.

use super::{GlObject, GraphicsQueries, Submission};
use crate::runtime::{ApiFamily, BackendError, BackendResult, DeviceIdentity, FrameDescriptor, RawHandle};

pub(super) fn describe(
    queries: &dyn GraphicsQueries,
    name: u32,
    object: GlObject,
    submission: &Submission,
) -> BackendResult<FrameDescriptor> {
    if name == 0 {
        return Err(BackendError::QueryFailed("GL object name 0".to_string()));
    }
    let (width, height) = queries.gl_object_extent(name, object)?;

    Ok(FrameDescriptor {
        family: ApiFamily::OpenGl,
        image: RawHandle::new(name as usize),
        width,
        height,
        format: None,
        sample_count: 1,
        queue: None,
        eye: submission.eye,
        bounds: submission.bounds,
    })
}

pub(super) const fn device_identity() -> DeviceIdentity {
    DeviceIdentity::OpenGl
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::FakeQueries;
    use crate::dispatch::SubmittedTexture;
    use crate::openvr::{Eye, SubmitFlags, TextureBounds};

    fn submission(name: u32, object: GlObject) -> Submission {
        Submission {
            eye: Eye::Left,
            texture: SubmittedTexture::OpenGl { name, object },
            bounds: Some(TextureBounds { u_min: 0.0, v_min: 0.0, u_max: 0.5, v_max: 1.0 }),
            flags: SubmitFlags::empty(),
        }
    }

    #[test]
    fn test_renderbuffer_uses_renderbuffer_query() {
        let queries = FakeQueries::default();
        queries.gl_extents.lock().unwrap().insert((3, GlObject::Renderbuffer), (800, 600));

        let frame = describe(&queries, 3, GlObject::Renderbuffer, &submission(3, GlObject::Renderbuffer)).unwrap();
        assert_eq!(frame.extent(), (800, 600));
        assert_eq!(frame.image, RawHandle::new(3));
        assert_eq!(frame.bounds.map(|b| b.u_max), Some(0.5));

        assert!(describe(&queries, 3, GlObject::Texture2d, &submission(3, GlObject::Texture2d)).is_err());
    }

    #[test]
    fn test_name_zero_is_rejected() {
        let queries = FakeQueries::default();
        assert!(describe(&queries, 0, GlObject::Texture2d, &submission(0, GlObject::Texture2d)).is_err());
    }
}
