//! Runtime Registry - one shared runtime per API family
//!
//! The map itself is the only state that is mutated from more than one
//! thread: the first submitting thread of each family inserts, the teardown
//! thread clears. Both paths take the same lock. Holders of a
//! [`RuntimeHandle`] use the runtime without touching the map.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{ApiFamily, BackendError, BackendResult, DeviceIdentity, RawHandle, RenderRuntime, RuntimeFactory};
use crate::foundation::panic;

/// A runtime together with the dispatcher's bookkeeping about it
pub struct RuntimeState {
    runtime: Box<dyn RenderRuntime>,
    bound_source: Option<RawHandle>,
    retired: bool,
}

impl RuntimeState {
    /// The runtime
    pub fn runtime(&self) -> &dyn RenderRuntime {
        self.runtime.as_ref()
    }

    /// The runtime, mutably
    pub fn runtime_mut(&mut self) -> &mut dyn RenderRuntime {
        self.runtime.as_mut()
    }

    /// Image the runtime was last initialized from
    pub const fn bound_source(&self) -> Option<RawHandle> {
        self.bound_source
    }

    pub(crate) fn set_bound_source(&mut self, source: Option<RawHandle>) {
        self.bound_source = source;
    }

    /// Whether shutdown already tore this runtime down
    ///
    /// A retired runtime is out of the registry and must not be initialized
    /// again by a submitter still holding its handle.
    pub const fn is_retired(&self) -> bool {
        self.retired
    }
}

/// Shared handle to the runtime of one family
#[derive(Clone)]
pub struct RuntimeHandle {
    family: ApiFamily,
    state: Arc<Mutex<RuntimeState>>,
}

impl RuntimeHandle {
    fn new(family: ApiFamily, runtime: Box<dyn RenderRuntime>) -> Self {
        Self {
            family,
            state: Arc::new(Mutex::new(RuntimeState { runtime, bound_source: None, retired: false })),
        }
    }

    /// Family this runtime serves
    pub const fn family(&self) -> ApiFamily {
        self.family
    }

    /// Lock the runtime for one submission or teardown step
    ///
    /// A poisoned lock is recovered: a panic in an earlier frame must not
    /// disable the family for the rest of the session.
    pub fn lock(&self) -> MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether both handles refer to the same runtime instance
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("family", &self.family)
            .field("runtime", &Arc::as_ptr(&self.state))
            .finish()
    }
}

/// Outcome of tearing the registry down
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Families whose runtime reset cleanly
    pub reset: Vec<ApiFamily>,
    /// Families whose reset failed, with the error
    pub failed: Vec<(ApiFamily, BackendError)>,
}

impl ShutdownReport {
    /// Whether every runtime reset cleanly
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of runtimes torn down
    pub fn total(&self) -> usize {
        self.reset.len() + self.failed.len()
    }
}

/// Process-scoped map from API family to its runtime
pub struct RuntimeRegistry {
    factory: Arc<dyn RuntimeFactory>,
    runtimes: Mutex<HashMap<ApiFamily, RuntimeHandle>>,
}

impl RuntimeRegistry {
    /// Create an empty registry constructing runtimes through `factory`
    pub fn new(factory: Arc<dyn RuntimeFactory>) -> Self {
        Self {
            factory,
            runtimes: Mutex::new(HashMap::new()),
        }
    }

    /// Existing runtime for `family`, or a newly constructed one
    ///
    /// `identity` is evaluated only when construction is needed. Construction
    /// runs under the registry lock, so racing first frames of one family
    /// construct exactly once. On failure nothing is inserted and the next
    /// call retries.
    ///
    /// The registry lock is held across `factory.create`, so a slow
    /// construction also delays the first frame of every other family and
    /// any concurrent shutdown. Factories should keep `create` cheap and
    /// leave heavy setup to `init`.
    pub fn get_or_create(
        &self,
        family: ApiFamily,
        identity: impl FnOnce() -> BackendResult<DeviceIdentity>,
    ) -> BackendResult<RuntimeHandle> {
        let mut runtimes = self.lock_map();
        if let Some(handle) = runtimes.get(&family) {
            return Ok(handle.clone());
        }

        let identity = identity()?;
        if identity.family() != family {
            return Err(BackendError::DeviceLookupFailed(format!(
                "{} device identity offered for a {family} frame",
                identity.family()
            )));
        }

        let runtime = self.factory.create(&identity)?;
        let handle = RuntimeHandle::new(family, runtime);
        runtimes.insert(family, handle.clone());

        log::info!("Created {family} runtime {:?}", Arc::as_ptr(&handle.state));
        Ok(handle)
    }

    /// Runtime for `family`, if one is live
    pub fn get(&self, family: ApiFamily) -> Option<RuntimeHandle> {
        self.lock_map().get(&family).cloned()
    }

    /// Families with a live runtime, sorted
    pub fn families(&self) -> Vec<ApiFamily> {
        let mut families: Vec<_> = self.lock_map().keys().copied().collect();
        families.sort_unstable();
        families
    }

    /// Number of live runtimes
    pub fn len(&self) -> usize {
        self.lock_map().len()
    }

    /// Whether no runtime is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reset every live runtime, then clear the registry
    ///
    /// A reset that fails or panics is recorded for its family and does not
    /// stop the others. Each runtime is retired under its own lock right
    /// after the reset, so a submitter still holding its handle skips it
    /// instead of initializing it again. The registry lock is held
    /// throughout, so a racing `get_or_create` either sees the old runtime
    /// before teardown starts or constructs a fresh one afterwards.
    pub fn shutdown(&self) -> ShutdownReport {
        let mut runtimes = self.lock_map();
        let mut report = ShutdownReport::default();

        for (family, handle) in runtimes.iter() {
            let mut state = handle.lock();
            let result = panic::contain(|| state.runtime_mut().reset())
                .unwrap_or_else(|message| Err(BackendError::ResetFailed(format!("panicked: {message}"))));
            state.retired = true;
            drop(state);

            match result {
                Ok(()) => report.reset.push(*family),
                Err(error) => {
                    log::error!("Failed to reset {family} runtime during shutdown: {error}");
                    report.failed.push((*family, error));
                }
            }
        }

        runtimes.clear();
        report.reset.sort_unstable();
        report.failed.sort_unstable_by_key(|(family, _)| *family);
        report
    }

    fn lock_map(&self) -> MutexGuard<'_, HashMap<ApiFamily, RuntimeHandle>> {
        self.runtimes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for RuntimeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeRegistry")
            .field("families", &self.families())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::{identity_for, Call, RecordingFactory};
    use std::sync::atomic::Ordering;

    fn registry() -> (Arc<RecordingFactory>, RuntimeRegistry) {
        let factory = Arc::new(RecordingFactory::default());
        let registry = RuntimeRegistry::new(factory.clone());
        (factory, registry)
    }

    #[test]
    fn test_get_or_create_returns_same_runtime() {
        let (factory, registry) = registry();

        let first = registry.get_or_create(ApiFamily::D3d11, || Ok(identity_for(ApiFamily::D3d11))).unwrap();
        let second = registry
            .get_or_create(ApiFamily::D3d11, || panic!("identity must not be resolved twice"))
            .unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(factory.constructed(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_one_runtime_per_family() {
        let (factory, registry) = registry();

        for family in ApiFamily::ALL {
            registry.get_or_create(family, || Ok(identity_for(family))).unwrap();
        }

        assert_eq!(factory.constructed(), 4);
        assert_eq!(registry.families(), ApiFamily::ALL.to_vec());
        let d3d11 = registry.get(ApiFamily::D3d11).unwrap();
        let vulkan = registry.get(ApiFamily::Vulkan).unwrap();
        assert!(!d3d11.ptr_eq(&vulkan));
    }

    #[test]
    fn test_construction_failure_leaves_registry_empty() {
        let (factory, registry) = registry();
        factory.fail_construction.store(true, Ordering::SeqCst);

        let result = registry.get_or_create(ApiFamily::D3d12, || Ok(identity_for(ApiFamily::D3d12)));

        assert!(matches!(result, Err(BackendError::ConstructionFailed(_))));
        assert!(registry.is_empty());

        factory.fail_construction.store(false, Ordering::SeqCst);
        registry.get_or_create(ApiFamily::D3d12, || Ok(identity_for(ApiFamily::D3d12))).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_identity_failure_skips_construction() {
        let (factory, registry) = registry();

        let result = registry.get_or_create(ApiFamily::D3d11, || {
            Err(BackendError::DeviceLookupFailed("no private data".to_string()))
        });

        assert!(matches!(result, Err(BackendError::DeviceLookupFailed(_))));
        assert_eq!(factory.constructed(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_mismatched_identity_rejected() {
        let (factory, registry) = registry();

        let result = registry.get_or_create(ApiFamily::Vulkan, || Ok(identity_for(ApiFamily::OpenGl)));

        assert!(result.is_err());
        assert_eq!(factory.constructed(), 0);
    }

    #[test]
    fn test_shutdown_resets_and_clears() {
        let (factory, registry) = registry();
        registry.get_or_create(ApiFamily::OpenGl, || Ok(identity_for(ApiFamily::OpenGl))).unwrap();
        registry.get_or_create(ApiFamily::Vulkan, || Ok(identity_for(ApiFamily::Vulkan))).unwrap();

        let report = registry.shutdown();

        assert!(report.is_clean());
        assert_eq!(report.reset, vec![ApiFamily::OpenGl, ApiFamily::Vulkan]);
        assert!(registry.is_empty());
        assert_eq!(factory.calls(ApiFamily::OpenGl), vec![Call::Reset]);
        assert_eq!(factory.calls(ApiFamily::Vulkan), vec![Call::Reset]);

        registry.get_or_create(ApiFamily::Vulkan, || Ok(identity_for(ApiFamily::Vulkan))).unwrap();
        assert_eq!(factory.constructed(), 3);
    }

    #[test]
    fn test_shutdown_isolates_reset_failure() {
        let (factory, registry) = registry();
        *factory.fail_reset_for.lock().unwrap() = Some(ApiFamily::D3d11);
        registry.get_or_create(ApiFamily::D3d11, || Ok(identity_for(ApiFamily::D3d11))).unwrap();
        registry.get_or_create(ApiFamily::D3d12, || Ok(identity_for(ApiFamily::D3d12))).unwrap();

        let report = registry.shutdown();

        assert_eq!(report.reset, vec![ApiFamily::D3d12]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, ApiFamily::D3d11);
        assert_eq!(report.total(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_shutdown_retires_outstanding_handles() {
        let (factory, registry) = registry();
        let held = registry.get_or_create(ApiFamily::D3d11, || Ok(identity_for(ApiFamily::D3d11))).unwrap();
        assert!(!held.lock().is_retired());

        registry.shutdown();

        assert!(held.lock().is_retired());
        let fresh = registry.get_or_create(ApiFamily::D3d11, || Ok(identity_for(ApiFamily::D3d11))).unwrap();
        assert!(!fresh.lock().is_retired());
        assert!(!fresh.ptr_eq(&held));
        assert_eq!(factory.constructed(), 2);
    }

    #[test]
    fn test_shutdown_of_empty_registry() {
        let (_factory, registry) = registry();
        let report = registry.shutdown();
        assert_eq!(report, ShutdownReport::default());
    }

    #[test]
    fn test_concurrent_first_frames_construct_once() {
        let (factory, registry) = registry();
        let registry = Arc::new(registry);

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .get_or_create(ApiFamily::Vulkan, || Ok(identity_for(ApiFamily::Vulkan)))
                        .unwrap()
                })
            })
            .collect();
        let handles: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();

        assert_eq!(factory.constructed(), 1);
        assert!(handles.windows(2).all(|pair| pair[0].ptr_eq(&pair[1])));
    }
}
