//! External assemblies.
//!
//! References into assemblies that are not among the loaded modules are served by an
//! [`AssemblyResolver`]. The resolver for an assembly is created on first use through the
//! configured [`AssemblyLoader`] and kept for the rest of the run, including when the
//! assembly turned out to be unavailable. The module a loader serves is interned by the
//! caller, so it shares its [`ResolvedModule`] with a later registration of the same
//! module.

use std::sync::Arc;

use crate::{
    metadata::{identity::AssemblyName, module::ModuleDef, token::Token},
    resolver::resolved::{ResolvedModule, TypeHandle},
    Result,
};

/// Supplies modules for external assembly references.
///
/// Implementations typically search a directory of reference assemblies. `Ok(None)` means
/// the assembly is not available; errors abort the resolution that asked for it.
pub trait AssemblyLoader: Send + Sync {
    /// Loads the manifest module of `name`.
    ///
    /// # Errors
    /// Returns an error if the assembly exists but could not be read.
    fn load(&self, name: &AssemblyName) -> Result<Option<Arc<ModuleDef>>>;
}

impl<F> AssemblyLoader for F
where
    F: Fn(&AssemblyName) -> Result<Option<Arc<ModuleDef>>> + Send + Sync,
{
    fn load(&self, name: &AssemblyName) -> Result<Option<Arc<ModuleDef>>> {
        self(name)
    }
}

/// Resolves members of one external assembly.
#[derive(Debug)]
pub struct AssemblyResolver {
    name: AssemblyName,
    module: Option<Arc<ResolvedModule>>,
}

impl AssemblyResolver {
    /// Loads `name` through `loader` and passes the served module to `intern` for its
    /// resolved form. A missing loader yields an unavailable assembly.
    ///
    /// # Errors
    /// Propagates loader failures.
    pub fn load<F>(name: &AssemblyName, loader: Option<&dyn AssemblyLoader>, intern: F) -> Result<Self>
    where
        F: FnOnce(Arc<ModuleDef>) -> Arc<ResolvedModule>,
    {
        let module = match loader {
            Some(loader) => loader.load(name)?,
            None => None,
        };

        match &module {
            Some(module) => log::debug!("Loaded external assembly {} ({})", name, module.name),
            None => log::debug!("External assembly {} is not available", name),
        }

        Ok(Self {
            name: name.clone(),
            module: module.map(intern),
        })
    }

    /// The assembly this resolver serves.
    #[must_use]
    pub fn name(&self) -> &AssemblyName {
        &self.name
    }

    /// The assembly's manifest module, if it could be loaded.
    #[must_use]
    pub fn module(&self) -> Option<&Arc<ResolvedModule>> {
        self.module.as_ref()
    }

    /// Returns true if the assembly could be loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.module.is_some()
    }

    /// Finds a type by name in this assembly.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if the module's type rows are inconsistent.
    pub fn find_type(
        &self,
        namespace: &str,
        name: &str,
        enclosing: Option<Token>,
    ) -> Result<Option<Arc<TypeHandle>>> {
        let Some(module) = &self.module else {
            return Ok(None);
        };
        module
            .module()
            .find_type(namespace, name, enclosing)
            .map(|token| module.type_handle(token))
            .transpose()
    }
}
