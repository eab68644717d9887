//! The relay service
//!
//! [`VrRelay`] owns every piece of process-scoped state: the interface
//! resolver, the patch table, the runtime registry, the dispatcher built on
//! it and the shutdown coordinator. The C ABI handlers reach it through the
//! session in [`crate::handlers`]; everything else receives it explicitly.

#![allow(unsafe_code)]

use std::ffi::c_void;
use std::sync::Arc;

use crate::core::config::RelayConfig;
use crate::dispatch::{FrameDispatcher, FrameOutcome, GraphicsQueries, Submission};
use crate::hook::{Address, PatchTable, RawVirtualTable, Trampoline, VirtualTable};
use crate::resolver::{InterfaceResolver, SubmitBinding, SubmitVariant};
use crate::runtime::{RuntimeFactory, RuntimeRegistry, ShutdownReport};
use crate::shutdown::ShutdownCoordinator;

/// Name recorded for every `Submit` interception
pub const SUBMIT_TARGET: &str = "IVRCompositor::Submit";

/// Handler address for each `Submit` shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitHandlers {
    /// Revision 7 handler
    pub raw_handle: Address,
    /// Revision 8 handler
    pub raw_handle_with_flags: Address,
    /// Revision 9+ handler
    pub texture: Address,
}

impl SubmitHandlers {
    /// Handler for `variant`
    pub const fn address(&self, variant: SubmitVariant) -> Address {
        match variant {
            SubmitVariant::RawHandle => self.raw_handle,
            SubmitVariant::RawHandleWithFlags => self.raw_handle_with_flags,
            SubmitVariant::Texture => self.texture,
        }
    }
}

/// Process-scoped relay state
pub struct VrRelay {
    config: RelayConfig,
    resolver: InterfaceResolver,
    patches: PatchTable,
    dispatcher: FrameDispatcher,
    shutdown: ShutdownCoordinator,
}

impl VrRelay {
    /// Create a relay with an empty registry and no patched slots
    pub fn new(config: RelayConfig, factory: Arc<dyn RuntimeFactory>, queries: Arc<dyn GraphicsQueries>) -> Self {
        let registry = Arc::new(RuntimeRegistry::new(factory));
        Self {
            resolver: InterfaceResolver::new(config.interception.clone()),
            patches: PatchTable::new(),
            dispatcher: FrameDispatcher::new(Arc::clone(&registry), queries, config.dispatch.clone()),
            shutdown: ShutdownCoordinator::new(registry),
            config,
        }
    }

    /// Configuration the relay was built with
    pub const fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Every slot patched so far
    pub const fn patches(&self) -> &PatchTable {
        &self.patches
    }

    /// The runtime registry
    pub fn registry(&self) -> &Arc<RuntimeRegistry> {
        self.dispatcher.registry()
    }

    /// The frame dispatcher
    pub const fn dispatcher(&self) -> &FrameDispatcher {
        &self.dispatcher
    }

    /// Intercept `Submit` on `table` when `name` is a compositor revision
    ///
    /// Returns the binding that is now in place. Re-acquiring a hooked
    /// table leaves it untouched. Install failures are logged and the host
    /// keeps running uninstrumented for that table.
    pub fn hook_interface(
        &self,
        name: &str,
        table: &dyn VirtualTable,
        handlers: &SubmitHandlers,
    ) -> Option<SubmitBinding> {
        let binding = self.resolver.resolve(name)?;
        self.install(name, binding, table, handlers)
    }

    /// [`hook_interface`](Self::hook_interface) on the table of a live object
    ///
    /// # Safety
    /// `instance` must be null or point to a live C++ object whose first
    /// word is its virtual-table pointer, with at least `binding.slot + 1`
    /// entries for the revision `name` resolves to.
    pub unsafe fn hook_interface_instance(
        &self,
        name: &str,
        instance: *mut c_void,
        handlers: &SubmitHandlers,
    ) -> Option<SubmitBinding> {
        let binding = self.resolver.resolve(name)?;
        match unsafe { RawVirtualTable::from_instance(instance) } {
            Ok(table) => self.install(name, binding, &table, handlers),
            Err(error) => {
                log::error!("Failed to hook {name}: {error}");
                None
            }
        }
    }

    /// Original `Submit` behind `handler` when entered through `table`
    pub fn trampoline(&self, table: Option<Address>, handler: Address) -> Option<Trampoline> {
        self.patches.trampoline(table, handler)
    }

    /// Relay one decoded submission
    pub fn submit(&self, submission: &Submission) -> FrameOutcome {
        self.dispatcher.submit(submission)
    }

    /// Reset and drop every runtime
    pub fn shutdown(&self) -> ShutdownReport {
        self.shutdown.run()
    }

    /// Shut down, then run the host's teardown
    pub fn shutdown_then<R>(&self, forward: impl FnOnce() -> R) -> (ShutdownReport, R) {
        self.shutdown.run_then(forward)
    }

    fn install(
        &self,
        name: &str,
        binding: SubmitBinding,
        table: &dyn VirtualTable,
        handlers: &SubmitHandlers,
    ) -> Option<SubmitBinding> {
        let handler = handlers.address(binding.variant);
        match self.patches.install(SUBMIT_TARGET, table, binding.slot, handler) {
            Ok(_) => {
                log::info!(
                    "Hooked {name}: Submit in slot {} ({} variant)",
                    binding.slot,
                    binding.variant
                );
                Some(binding)
            }
            Err(error) => {
                log::error!("Failed to hook {name}: {error}");
                None
            }
        }
    }
}

impl std::fmt::Debug for VrRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VrRelay")
            .field("config", &self.config)
            .field("patched_slots", &self.patches.len())
            .field("registry", self.registry())
            .finish_non_exhaustive()
    }
}
