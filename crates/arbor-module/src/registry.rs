//! Module registration and activation.

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::error::RegistryError;
use crate::module::GalaxyModule;
use crate::pipeline::ActivePipeline;

/// The set of available physics modules.
///
/// Modules are registered explicitly at process start — there is no
/// link-time self-registration — then a user-declared ordered subset
/// is activated into an [`ActivePipeline`]. The registry is consumed
/// by activation; modules left inactive are dropped.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: IndexMap<String, Box<dyn GalaxyModule>>,
}

impl ModuleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. Fails if the name is already taken.
    pub fn register(&mut self, module: Box<dyn GalaxyModule>) -> Result<(), RegistryError> {
        let name = module.name().to_string();
        if self.modules.contains_key(&name) {
            return Err(RegistryError::DuplicateModule { name });
        }
        debug!(module = %name, "registered module");
        self.modules.insert(name, module);
        Ok(())
    }

    /// Names of all registered modules, in registration order.
    pub fn registered_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no modules are registered.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Activate an ordered subset of the registered modules.
    ///
    /// `core_provided` names the properties the core itself populates
    /// (the halo-category fields); they satisfy requirements at any
    /// position. Each module's `requires` must otherwise be provided
    /// by a module **earlier** in `order` — activation fails with the
    /// first offender rather than reordering anything.
    pub fn activate(
        mut self,
        order: &[String],
        core_provided: &[String],
    ) -> Result<ActivePipeline, RegistryError> {
        let mut provided: IndexSet<String> = core_provided.iter().cloned().collect();
        let mut active = Vec::with_capacity(order.len());

        for name in order {
            let module = self
                .modules
                .shift_remove(name)
                .ok_or_else(|| RegistryError::UnknownModule { name: name.clone() })?;
            for requirement in module.requires() {
                if !provided.contains(&requirement) {
                    return Err(RegistryError::UnsatisfiedRequirement {
                        module: name.clone(),
                        property: requirement,
                    });
                }
            }
            provided.extend(module.provides());
            active.push(module);
        }

        debug!(count = active.len(), "activated module pipeline");
        Ok(ActivePipeline::new(active))
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}
