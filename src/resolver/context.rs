//! The resolution context shared by one deobfuscation run.

use std::sync::Arc;

use dashmap::DashMap;
use uguid::Guid;

use crate::{
    metadata::{
        identity::AssemblyName,
        module::{ModuleDef, ResolutionScope},
        signature::{MemberSig, TypeSig},
        token::Token,
    },
    resolver::{
        assembly::{AssemblyLoader, AssemblyResolver},
        resolved::{ResolvedField, ResolvedMethod, ResolvedModule, ResolvedType, TypeHandle},
    },
    Error, Result,
};

/// Resolves type, method and field references across all loaded modules.
///
/// Two caches back every lookup: modules keyed by MVID, and one [`AssemblyResolver`] per
/// external assembly keyed by its display name. Modules served by the loader are entered
/// in the first cache too. Both are filled lazily with insert-if-absent semantics and
/// never evicted, so all threads of a run agree on a single [`ResolvedModule`] per module
/// and a single handle per definition.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use dotinline::metadata::{builder::ModuleBuilder, module::ResolutionScope};
/// use dotinline::resolver::ResolverContext;
///
/// let mut builder = ModuleBuilder::new("App.exe");
/// builder.add_type("App", "Program");
/// let program_ref = builder.add_type_ref(ResolutionScope::Module, "App", "Program");
///
/// let context = ResolverContext::new();
/// let module = context.add_module(Arc::new(builder.build()));
/// let resolved = context.resolve_type(&module, program_ref)?;
/// assert_eq!(resolved.to_string(), "App.Program");
/// # Ok::<(), dotinline::Error>(())
/// ```
pub struct ResolverContext {
    modules: DashMap<Guid, Arc<ResolvedModule>>,
    assemblies: DashMap<String, Arc<AssemblyResolver>>,
    loader: Option<Arc<dyn AssemblyLoader>>,
}

impl Default for ResolverContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverContext {
    /// Creates a context without an external assembly loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            modules: DashMap::new(),
            assemblies: DashMap::new(),
            loader: None,
        }
    }

    /// Sets the loader consulted for assemblies that are not loaded modules.
    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn AssemblyLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Registers a loaded module and returns its shared resolved form.
    ///
    /// Adding a module whose MVID is already known, including one served earlier by the
    /// assembly loader, returns the existing entry.
    pub fn add_module(&self, module: Arc<ModuleDef>) -> Arc<ResolvedModule> {
        self.modules
            .entry(module.mvid)
            .or_insert_with(|| Arc::new(ResolvedModule::new(module)))
            .clone()
    }

    /// The loaded module with `mvid`.
    #[must_use]
    pub fn module(&self, mvid: &Guid) -> Option<Arc<ResolvedModule>> {
        self.modules.get(mvid).map(|entry| entry.clone())
    }

    /// All known modules, including those served by the loader, in no particular order.
    #[must_use]
    pub fn modules(&self) -> Vec<Arc<ResolvedModule>> {
        self.modules.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Number of external assemblies looked up so far, available or not.
    #[must_use]
    pub fn external_assembly_count(&self) -> usize {
        self.assemblies.len()
    }

    /// Resolves a `TypeDef`, `TypeRef` or `TypeSpec` token of `module`.
    ///
    /// # Errors
    /// Returns [`Error::Unresolvable`] if the reference cannot be mapped to a definition and
    /// [`Error::InvalidToken`] for tokens of other tables.
    pub fn resolve_type(&self, module: &ResolvedModule, token: Token) -> Result<ResolvedType> {
        match token.table() {
            Token::TYPE_DEF => Ok(ResolvedType::Definition(module.type_handle(token)?)),
            Token::TYPE_REF => Ok(ResolvedType::Definition(
                self.resolve_type_ref(module, token)?,
            )),
            Token::TYPE_SPEC => self.resolve_type_sig(module, module.module().type_spec(token)?),
            _ => Err(Error::InvalidToken(token)),
        }
    }

    /// Resolves a signature type as seen from `module`.
    ///
    /// The element type is resolved first and the array, pointer and by-ref wrappers of
    /// the signature are reapplied from the innermost outwards. Generic instantiations
    /// resolve every type argument.
    ///
    /// # Errors
    /// Returns [`Error::Unresolvable`] if the element type or a type argument cannot be
    /// resolved.
    pub fn resolve_type_sig(&self, module: &ResolvedModule, sig: &TypeSig) -> Result<ResolvedType> {
        let (wrappers, leaf) = sig.peel();

        let mut resolved = match leaf {
            TypeSig::Class(token) | TypeSig::ValueType(token) => {
                self.resolve_type(module, *token)?
            }
            TypeSig::GenericInst { generic, args } => {
                let ResolvedType::Definition(definition) = self.resolve_type_sig(module, generic)?
                else {
                    return Err(malformed_error!("Generic instance over {:?}", generic));
                };
                let args = args
                    .iter()
                    .map(|arg| self.resolve_type_sig(module, arg))
                    .collect::<Result<Vec<_>>>()?;
                ResolvedType::GenericInstance { definition, args }
            }
            TypeSig::Var(index) => ResolvedType::GenericParameter {
                method: false,
                index: *index,
            },
            TypeSig::MVar(index) => ResolvedType::GenericParameter {
                method: true,
                index: *index,
            },
            primitive => ResolvedType::Primitive(primitive.clone()),
        };

        for wrapper in wrappers.into_iter().rev() {
            resolved = resolved.wrap(wrapper);
        }
        Ok(resolved)
    }

    /// Resolves a `MethodDef`, `MemberRef` or `MethodSpec` token of `module` to its
    /// definition.
    ///
    /// # Errors
    /// Returns [`Error::Unresolvable`] if the reference cannot be mapped to a definition and
    /// [`Error::InvalidToken`] for tokens of other tables.
    pub fn resolve_method(&self, module: &ResolvedModule, token: Token) -> Result<ResolvedMethod> {
        match token.table() {
            Token::METHOD_DEF => {
                let handle = module.method_handle(token)?;
                let declaring = module.module().method_def(token)?.declaring_type;
                Ok(ResolvedMethod {
                    handle,
                    declaring_type: ResolvedType::Definition(module.type_handle(declaring)?),
                    generic_args: Vec::new(),
                })
            }
            Token::MEMBER_REF => {
                if let Some(cached) = module.method_refs.get(&token) {
                    return Ok(cached.clone());
                }
                let resolved = self.resolve_method_ref(module, token)?;
                Ok(module
                    .method_refs
                    .entry(token)
                    .or_insert(resolved)
                    .clone())
            }
            Token::METHOD_SPEC => {
                let spec = module.module().method_spec(token)?;
                let mut resolved = self.resolve_method(module, spec.method)?;
                resolved.generic_args = spec
                    .instantiation
                    .iter()
                    .map(|arg| self.resolve_type_sig(module, arg))
                    .collect::<Result<Vec<_>>>()?;
                Ok(resolved)
            }
            _ => Err(Error::InvalidToken(token)),
        }
    }

    /// Resolves a `Field` or field `MemberRef` token of `module` to its definition.
    ///
    /// # Errors
    /// Returns [`Error::Unresolvable`] if the reference cannot be mapped to a definition and
    /// [`Error::InvalidToken`] for tokens of other tables.
    pub fn resolve_field(&self, module: &ResolvedModule, token: Token) -> Result<ResolvedField> {
        match token.table() {
            Token::FIELD => {
                let declaring = module.module().field_def(token)?.declaring_type;
                Ok(ResolvedField {
                    handle: module.field_handle(token)?,
                    declaring_type: ResolvedType::Definition(module.type_handle(declaring)?),
                })
            }
            Token::MEMBER_REF => {
                let member = module.module().member_ref(token)?;
                let MemberSig::Field(signature) = &member.signature else {
                    return Err(Error::InvalidToken(token));
                };
                let declaring_type = self.resolve_type(module, member.parent)?;
                let Some(owner) = declaring_type.definition() else {
                    return Err(unresolvable(module, token));
                };

                let wanted = module.module().type_sig_name(signature)?;
                let target = &owner.module;
                for &candidate in &target.type_def(owner.token)?.fields {
                    let field = target.field_def(candidate)?;
                    if field.name == member.name && target.type_sig_name(&field.signature)? == wanted
                    {
                        let home = self.home_of(owner)?;
                        return Ok(ResolvedField {
                            handle: home.field_handle(candidate)?,
                            declaring_type,
                        });
                    }
                }
                Err(unresolvable(module, token))
            }
            _ => Err(Error::InvalidToken(token)),
        }
    }

    fn resolve_method_ref(&self, module: &ResolvedModule, token: Token) -> Result<ResolvedMethod> {
        let member = module.module().member_ref(token)?;
        let MemberSig::Method(signature) = &member.signature else {
            return Err(Error::InvalidToken(token));
        };

        // vararg call sites reference their MethodDef directly
        if member.parent.is_table(Token::METHOD_DEF) {
            return self.resolve_method(module, member.parent);
        }
        if member.parent.is_table(Token::MODULE_REF) {
            return Err(unresolvable(module, token));
        }

        let declaring_type = self.resolve_type(module, member.parent)?;
        let Some(owner) = declaring_type.definition() else {
            return Err(unresolvable(module, token));
        };

        let wanted = module.module().method_sig_name(signature)?;
        let target = &owner.module;
        for &candidate in &target.type_def(owner.token)?.methods {
            let method = target.method_def(candidate)?;
            if method.name == member.name
                && method.signature.arg_count() == signature.arg_count()
                && target.method_sig_name(&method.signature)? == wanted
            {
                let home = self.home_of(owner)?;
                return Ok(ResolvedMethod {
                    handle: home.method_handle(candidate)?,
                    declaring_type: declaring_type.clone(),
                    generic_args: Vec::new(),
                });
            }
        }

        Err(unresolvable(module, token))
    }

    fn resolve_type_ref(&self, module: &ResolvedModule, token: Token) -> Result<Arc<TypeHandle>> {
        if let Some(cached) = module.type_refs.get(&token) {
            return Ok(cached.clone());
        }

        let reference = module.module().type_ref(token)?;
        let found = match reference.scope {
            ResolutionScope::Module => module
                .module()
                .find_type(&reference.namespace, &reference.name, None)
                .map(|t| module.type_handle(t))
                .transpose()?,
            ResolutionScope::TypeRef(outer) => {
                let outer = self.resolve_type_ref(module, outer)?;
                let home = self.home_of(&outer)?;
                home.module()
                    .find_type(&reference.namespace, &reference.name, Some(outer.token))
                    .map(|t| home.type_handle(t))
                    .transpose()?
            }
            ResolutionScope::AssemblyRef(assembly) => {
                let name = module.module().assembly_ref(assembly)?;
                match self.module_for_assembly(name)? {
                    Some(home) => home
                        .module()
                        .find_type(&reference.namespace, &reference.name, None)
                        .map(|t| home.type_handle(t))
                        .transpose()?,
                    None => None,
                }
            }
            ResolutionScope::ModuleRef(module_ref) => {
                let index = module_ref.index().ok_or(Error::InvalidToken(module_ref))?;
                let file = module
                    .module()
                    .module_refs
                    .get(index)
                    .ok_or(Error::InvalidToken(module_ref))?;
                match self.loaded_module_named(file) {
                    Some(home) => home
                        .module()
                        .find_type(&reference.namespace, &reference.name, None)
                        .map(|t| home.type_handle(t))
                        .transpose()?,
                    None => None,
                }
            }
        };

        let Some(handle) = found else {
            return Err(unresolvable(module, token));
        };
        Ok(module.type_refs.entry(token).or_insert(handle).clone())
    }

    /// The resolved module that owns `handle`.
    fn home_of(&self, handle: &TypeHandle) -> Result<Arc<ResolvedModule>> {
        if let Some(home) = self.modules.get(&handle.module.mvid) {
            return Ok(home.clone());
        }
        Err(malformed_error!(
            "Type {} belongs to an unknown module",
            handle.full_name
        ))
    }

    fn loaded_module_named(&self, file: &str) -> Option<Arc<ResolvedModule>> {
        self.modules
            .iter()
            .find(|entry| entry.module().name.eq_ignore_ascii_case(file))
            .map(|entry| entry.value().clone())
    }

    /// Finds the module serving `name`: a loaded module first, then the external
    /// assembly cache.
    fn module_for_assembly(&self, name: &AssemblyName) -> Result<Option<Arc<ResolvedModule>>> {
        let loaded = self.modules.iter().find(|entry| {
            entry
                .module()
                .assembly
                .as_ref()
                .is_some_and(|assembly| name.matches(assembly))
        });
        if let Some(entry) = loaded {
            return Ok(Some(entry.value().clone()));
        }

        let key = name.display_name();
        let cached = self.assemblies.get(&key).map(|entry| entry.value().clone());
        let resolver = match cached {
            Some(resolver) => resolver,
            None => {
                let resolver = Arc::new(AssemblyResolver::load(
                    name,
                    self.loader.as_deref(),
                    |module| self.add_module(module),
                )?);
                self.assemblies.entry(key).or_insert(resolver).clone()
            }
        };
        Ok(resolver.module().cloned())
    }
}

fn unresolvable(module: &ResolvedModule, token: Token) -> Error {
    let reference = module.module().member_display(token);
    log::warn!("Unable to resolve {} ({}) in {}", reference, token, module.module().name);
    Error::Unresolvable { reference, token }
}
