//! Decrypter registration.
//!
//! The driver tells the inliner which methods are decrypters by registering them up front,
//! either by definition token or by a module-independent signature key. Each registration
//! carries a strategy-specific entry: a handler function for the static strategy, an
//! integer id for the out-of-process strategy.

use std::collections::{HashMap, HashSet};

use uguid::Guid;

use crate::{
    metadata::{module::ModuleDef, token::Token},
    resolver::ResolvedMethod,
    Error, Result,
};

/// Module-independent identity of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureKey {
    /// Full name of the declaring type, e.g. `Crypto.Strings`
    pub declaring_type: String,
    /// Method name
    pub name: String,
    /// Rendered signature, e.g. `System.String(System.Int32)`
    pub signature: String,
}

impl SignatureKey {
    /// Creates a key from its parts.
    #[must_use]
    pub fn new(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            signature: signature.into(),
        }
    }

    /// The key of a method definition.
    ///
    /// # Errors
    /// Returns [`Error::InvalidToken`] if `token` is not a `MethodDef` of `module`.
    pub fn of_definition(module: &ModuleDef, token: Token) -> Result<Self> {
        let method = module.method_def(token)?;
        Ok(Self {
            declaring_type: module.type_full_name(method.declaring_type)?,
            name: method.name.clone(),
            signature: module.method_sig_name(&method.signature)?,
        })
    }
}

/// Registered decrypters, each mapped to an entry of type `E`.
#[derive(Debug, Clone)]
pub struct DecrypterRegistry<E> {
    by_method: HashMap<(Guid, Token), E>,
    by_signature: HashMap<SignatureKey, E>,
    // method name -> full names of the declaring types
    names: HashMap<String, HashSet<String>>,
}

impl<E> Default for DecrypterRegistry<E> {
    fn default() -> Self {
        Self {
            by_method: HashMap::new(),
            by_signature: HashMap::new(),
            names: HashMap::new(),
        }
    }
}

impl<E> DecrypterRegistry<E> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the `MethodDef` `token` of `module`.
    ///
    /// Returns false, keeping the first entry, if the method was already registered.
    ///
    /// # Errors
    /// Returns [`Error::Registration`] if `token` is not a `MethodDef` of `module`.
    pub fn register_method(&mut self, module: &ModuleDef, token: Token, entry: E) -> Result<bool> {
        let not_a_method =
            |_| Error::Registration(format!("{token} is not a method of {}", module.name));
        let method = module.method_def(token).map_err(not_a_method)?;
        let declaring_type = module
            .type_full_name(method.declaring_type)
            .map_err(not_a_method)?;

        let key = (module.mvid, token);
        if self.by_method.contains_key(&key) {
            return Ok(false);
        }
        self.add_name(declaring_type, &method.name);
        self.by_method.insert(key, entry);
        Ok(true)
    }

    /// Registers every method matching `key`, in any module.
    ///
    /// Returns false, keeping the first entry, if the key was already registered.
    pub fn register_signature(&mut self, key: SignatureKey, entry: E) -> bool {
        if self.by_signature.contains_key(&key) {
            return false;
        }
        self.add_name(key.declaring_type.clone(), &key.name);
        self.by_signature.insert(key, entry);
        true
    }

    fn add_name(&mut self, declaring_type: String, name: &str) {
        self.names
            .entry(name.to_string())
            .or_default()
            .insert(declaring_type);
    }

    /// Returns true if some decrypter is named `name` and declared by the type with full
    /// name `declaring_type`.
    ///
    /// Call targets are only resolved when this pre-filter passes, so references into
    /// unavailable assemblies that cannot be decrypters are never looked up.
    #[must_use]
    pub fn might_match(&self, declaring_type: &str, name: &str) -> bool {
        self.names
            .get(name)
            .is_some_and(|types| types.contains(declaring_type))
    }

    /// The entry registered for a resolved call target, by definition first and signature
    /// second.
    ///
    /// # Errors
    /// Returns [`Error::InvalidToken`] if the target's definition rows are inconsistent.
    pub fn lookup(&self, method: &ResolvedMethod) -> Result<Option<&E>> {
        let handle = &method.handle;
        if let Some(entry) = self.by_method.get(&(handle.module.mvid, handle.token)) {
            return Ok(Some(entry));
        }
        if self.by_signature.is_empty() {
            return Ok(None);
        }

        let key = SignatureKey::of_definition(&handle.module, handle.token)?;
        Ok(self.by_signature.get(&key))
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_method.len() + self.by_signature.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
