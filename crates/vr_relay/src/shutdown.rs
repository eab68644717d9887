//! Shutdown Coordinator
//!
//! Runs when the host tears the VR runtime down: every live rendering
//! runtime is reset while the graphics devices still exist, the registry is
//! cleared, and only then does the host's own teardown run.

use std::sync::Arc;

use crate::runtime::{RuntimeRegistry, ShutdownReport};

/// Tears down the runtime registry ahead of the host's teardown
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    registry: Arc<RuntimeRegistry>,
}

impl ShutdownCoordinator {
    /// Create a coordinator for `registry`
    pub fn new(registry: Arc<RuntimeRegistry>) -> Self {
        Self { registry }
    }

    /// Reset and drop every runtime
    pub fn run(&self) -> ShutdownReport {
        if self.registry.is_empty() {
            log::debug!("Shutdown with no live runtimes");
            return ShutdownReport::default();
        }

        let report = self.registry.shutdown();
        log::info!(
            "Shut down {} runtime(s), {} failed to reset cleanly",
            report.total(),
            report.failed.len()
        );
        report
    }

    /// [`run`](Self::run), then the host's teardown
    pub fn run_then<R>(&self, forward: impl FnOnce() -> R) -> (ShutdownReport, R) {
        let report = self.run();
        (report, forward())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::{identity_for, Call, RecordingFactory};
    use crate::runtime::ApiFamily;

    fn populated(families: &[ApiFamily]) -> (Arc<RecordingFactory>, Arc<RuntimeRegistry>) {
        let factory = Arc::new(RecordingFactory::default());
        let registry = Arc::new(RuntimeRegistry::new(factory.clone()));
        for &family in families {
            registry.get_or_create(family, || Ok(identity_for(family))).unwrap();
        }
        (factory, registry)
    }

    #[test]
    fn test_resets_before_forwarding() {
        let (factory, registry) = populated(&[ApiFamily::D3d11, ApiFamily::Vulkan]);
        let coordinator = ShutdownCoordinator::new(Arc::clone(&registry));

        let (report, calls_at_forward) = coordinator.run_then(|| {
            (factory.calls(ApiFamily::D3d11), factory.calls(ApiFamily::Vulkan))
        });

        assert!(report.is_clean());
        assert_eq!(report.total(), 2);
        assert_eq!(calls_at_forward, (vec![Call::Reset], vec![Call::Reset]));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_empty_registry_still_forwards() {
        let (factory, registry) = populated(&[]);
        let coordinator = ShutdownCoordinator::new(registry);

        let (report, forwarded) = coordinator.run_then(|| true);

        assert!(forwarded);
        assert_eq!(report.total(), 0);
        assert_eq!(factory.constructed(), 0);
    }

    #[test]
    fn test_failed_reset_is_reported_and_cleared() {
        let factory = Arc::new(RecordingFactory::default());
        *factory.fail_reset_for.lock().unwrap() = Some(ApiFamily::OpenGl);
        let registry = Arc::new(RuntimeRegistry::new(factory.clone()));
        registry.get_or_create(ApiFamily::OpenGl, || Ok(identity_for(ApiFamily::OpenGl))).unwrap();
        registry.get_or_create(ApiFamily::D3d12, || Ok(identity_for(ApiFamily::D3d12))).unwrap();

        let report = ShutdownCoordinator::new(Arc::clone(&registry)).run();

        assert_eq!(report.reset, vec![ApiFamily::D3d12]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, ApiFamily::OpenGl);
        assert!(registry.is_empty());
    }
}
