//! Interface Resolver
//!
//! Maps the version-tagged interface names the host asks for onto the
//! virtual-table slot of `IVRCompositor::Submit` and the handler shape that
//! can receive it. Revisions moved `Submit` around the table and changed its
//! signature twice; the table below is the whole of that history the relay
//! cares about.

use std::fmt;

use crate::core::config::InterceptionConfig;

/// Name prefix of every compositor interface revision
pub const COMPOSITOR_PREFIX: &str = "IVRCompositor_";

/// Argument shape of `Submit` in a given revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmitVariant {
    /// `(this, eye, texture_type, handle, bounds)`, revision 7
    RawHandle,
    /// `(this, eye, texture_type, handle, bounds, flags)`, revision 8
    RawHandleWithFlags,
    /// `(this, eye, *const Texture, bounds, flags)`, revision 9 onwards
    Texture,
}

impl SubmitVariant {
    /// Whether the variant belongs to a legacy revision
    pub const fn is_legacy(self) -> bool {
        !matches!(self, Self::Texture)
    }
}

impl fmt::Display for SubmitVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RawHandle => "raw handle",
            Self::RawHandleWithFlags => "raw handle with flags",
            Self::Texture => "texture",
        })
    }
}

/// Where and how to intercept `Submit` for one interface revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmitBinding {
    /// Parsed interface revision
    pub revision: u32,
    /// Virtual-table slot of `Submit`
    pub slot: usize,
    /// Handler shape
    pub variant: SubmitVariant,
}

/// Parse the revision out of `IVRCompositor_<digits>`
///
/// The prefix must start the string and be followed by at least one digit.
/// Anything after the digits is ignored. Revisions that overflow `u32` do
/// not parse.
pub fn parse_compositor_revision(name: &str) -> Option<u32> {
    let rest = name.strip_prefix(COMPOSITOR_PREFIX)?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    rest[..digits].parse().ok()
}

/// The `Submit` binding of `revision`, including the legacy revisions
pub const fn submit_binding(revision: u32) -> Option<SubmitBinding> {
    let (slot, variant) = match revision {
        12.. => (5, SubmitVariant::Texture),
        9..=11 => (4, SubmitVariant::Texture),
        8 => (6, SubmitVariant::RawHandleWithFlags),
        7 => (6, SubmitVariant::RawHandle),
        _ => return None,
    };
    Some(SubmitBinding { revision, slot, variant })
}

/// Resolves interface names to [`SubmitBinding`]s under a configuration
#[derive(Debug, Clone, Default)]
pub struct InterfaceResolver {
    config: InterceptionConfig,
}

impl InterfaceResolver {
    /// Create a resolver
    pub fn new(config: InterceptionConfig) -> Self {
        Self { config }
    }

    /// Resolve `name`, or `None` when the interface is not intercepted
    pub fn resolve(&self, name: &str) -> Option<SubmitBinding> {
        let Some(revision) = parse_compositor_revision(name) else {
            log::debug!("Ignoring interface '{name}'");
            return None;
        };

        match submit_binding(revision) {
            Some(binding) if binding.variant.is_legacy() && !self.config.legacy_compositor_versions => {
                log::debug!("Ignoring legacy compositor revision {revision}; legacy interception is disabled");
                None
            }
            Some(binding) => Some(binding),
            None => {
                log::debug!("Compositor revision {revision} predates Submit interception");
                None
            }
        }
    }
}
