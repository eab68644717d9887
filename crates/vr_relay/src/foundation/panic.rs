//! Panic containment for code running on host threads
//!
//! Unwinding out of an `extern "C"` handler aborts the host process, so
//! collaborator code is run through [`contain`] at every boundary where a
//! panic must degrade into a skipped frame.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run `f`, turning a panic into its message
pub fn contain<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| message(payload.as_ref()))
}

/// Best-effort text of a panic payload
pub fn message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
