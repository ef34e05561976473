//! Module type registry for rackhost.
//!
//! The registry is the single place where a module type's static facts are
//! established: its [`ModuleInfo`], its parameter descriptors (from one call to
//! [`EffectModule::create_parameters`]), the [`ControlKind`] of each parameter,
//! and the shared [`ParameterSet`] that backs every instance the type will
//! ever have. All of it is immutable after registration.
//!
//! # Example
//!
//! ```rust
//! use rackhost_registry::ModuleRegistry;
//!
//! let registry = ModuleRegistry::with_builtins();
//! let eq = registry.get("equalizer").unwrap();
//! assert_eq!(eq.info().max_instances, 5);
//! assert_eq!(eq.parameters().instances(), 5);
//!
//! // Instance 2's parameters live in their own window of the pool.
//! let binding = eq.parameters().bind(2).unwrap();
//! assert_eq!(binding.len(), eq.descriptors().len());
//! ```

use rackhost_core::{
    ControlKind, EffectModule, ModuleContext, ModuleInfo, ParamDescriptor, ParameterSet,
};
use std::sync::Arc;

/// Errors raised while registering a module type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A type with this id is already registered.
    #[error("module type already registered: {0}")]
    Duplicate(&'static str),

    /// The type declares a zero instance limit.
    #[error("module type '{0}' allows no instances")]
    NoInstances(&'static str),
}

/// A registered module type and everything derived from it.
pub struct RegisteredModule {
    module: Arc<dyn EffectModule>,
    info: ModuleInfo,
    descriptors: Vec<ParamDescriptor>,
    controls: Vec<ControlKind>,
    parameters: Arc<ParameterSet>,
}

impl RegisteredModule {
    /// Capability metadata captured at registration.
    pub fn info(&self) -> &ModuleInfo {
        &self.info
    }

    /// Parameter descriptors in declaration order.
    pub fn descriptors(&self) -> &[ParamDescriptor] {
        &self.descriptors
    }

    /// Attachment kind for each parameter, parallel to [`descriptors`](Self::descriptors).
    pub fn controls(&self) -> &[ControlKind] {
        &self.controls
    }

    /// The shared parameter pool for all instances of this type.
    pub fn parameters(&self) -> &Arc<ParameterSet> {
        &self.parameters
    }

    /// A fresh context from the type's factory.
    pub fn create_context(&self) -> Box<dyn ModuleContext> {
        self.module.create_context()
    }
}

impl std::fmt::Debug for RegisteredModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredModule")
            .field("info", &self.info)
            .field("params", &self.descriptors.len())
            .finish_non_exhaustive()
    }
}

/// Registry of all available module types.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    entries: Vec<RegisteredModule>,
}

impl ModuleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in module from `rackhost-effects`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for module in rackhost_effects::builtin_modules() {
            if let Err(err) = registry.register(module) {
                tracing::warn!(%err, "skipping built-in module");
            }
        }
        registry
    }

    /// Registers a module type.
    ///
    /// Calls `create_parameters` exactly once and allocates the type's
    /// parameter pool for `max_instances` instances.
    pub fn register(&mut self, module: Arc<dyn EffectModule>) -> Result<(), RegistryError> {
        let info = module.info();
        if self.get(info.id).is_some() {
            return Err(RegistryError::Duplicate(info.id));
        }
        if info.max_instances == 0 {
            return Err(RegistryError::NoInstances(info.id));
        }
        let descriptors = module.create_parameters();
        let controls = descriptors.iter().map(ParamDescriptor::control_kind).collect();
        let parameters = ParameterSet::new(&descriptors, info.max_instances);
        tracing::debug!(
            id = info.id,
            params = descriptors.len(),
            max_instances = info.max_instances,
            "module type registered"
        );
        self.entries.push(RegisteredModule {
            module,
            info,
            descriptors,
            controls,
            parameters,
        });
        Ok(())
    }

    /// Looks a type up by id.
    pub fn get(&self, id: &str) -> Option<&RegisteredModule> {
        self.entries.iter().find(|e| e.info.id == id)
    }

    /// All registered types in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredModule> {
        self.entries.iter()
    }

    /// Sum of every type's instance limit; the most instances a rack can hold.
    pub fn total_capacity(&self) -> usize {
        self.entries.iter().map(|e| e.info.max_instances).sum()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rackhost_effects::{Equalizer, Gain};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    impl EffectModule for Counting {
        fn info(&self) -> ModuleInfo {
            ModuleInfo {
                id: "counting",
                name: "Counting",
                max_instances: 2,
                has_editor: false,
                supports_double: false,
            }
        }

        fn create_parameters(&self) -> Vec<ParamDescriptor> {
            self.0.fetch_add(1, Ordering::SeqCst);
            vec![ParamDescriptor::toggle("On", "on", true)]
        }

        fn create_context(&self) -> Box<dyn ModuleContext> {
            Gain.create_context()
        }
    }

    #[test]
    fn builtins_registered() {
        let registry = ModuleRegistry::with_builtins();
        assert_eq!(registry.len(), 3);
        assert!(registry.get(Equalizer::ID).is_some());
        assert!(registry.get("nope").is_none());
        assert_eq!(registry.total_capacity(), 5 + 8 + 4);
    }

    #[test]
    fn parameters_created_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ModuleRegistry::new();
        registry
            .register(Arc::new(Counting(Arc::clone(&calls))))
            .unwrap();
        let entry = registry.get("counting").unwrap();
        let _ = entry.parameters().bind(0);
        let _ = entry.parameters().bind(1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(entry.controls(), &[ControlKind::Toggle]);
    }

    #[test]
    fn duplicate_rejected() {
        let mut registry = ModuleRegistry::with_builtins();
        assert_eq!(
            registry.register(Arc::new(Equalizer)),
            Err(RegistryError::Duplicate("equalizer"))
        );
    }

    #[test]
    fn pool_sized_by_instance_limit() {
        let registry = ModuleRegistry::with_builtins();
        let eq = registry.get(Equalizer::ID).unwrap();
        assert_eq!(eq.parameters().instances(), Equalizer::MAX_INSTANCES);
        assert!(eq.parameters().bind(Equalizer::MAX_INSTANCES).is_none());
    }
}
