//! Cross-module member resolution.
//!
//! Obfuscated assemblies routinely call decrypters that live in a different module, through
//! `TypeRef`/`MemberRef` rows that only name their target. This module maps such references
//! back to the definitions they denote, following resolution scopes into the other loaded
//! modules and, through an [`AssemblyLoader`], into external assemblies.
//!
//! # Key Components
//!
//! - [`ResolverContext`] - the shared entry point, owning the module and assembly caches
//! - [`ResolvedModule`] - a loaded module with its per-definition handle caches
//! - [`AssemblyResolver`] / [`AssemblyLoader`] - external assembly lookup
//! - [`ResolvedType`], [`ResolvedMethod`], [`ResolvedField`] - resolution results
//!
//! # Identity
//!
//! A definition has exactly one handle per run. Resolving the same member twice, from the
//! same or from different referencing modules, yields handles for which
//! [`Arc::ptr_eq`](std::sync::Arc::ptr_eq) holds.
//!
//! # Thread Safety
//!
//! All caches are [`dashmap::DashMap`]s filled with insert-if-absent semantics. Lookups
//! from many threads at once are safe; a race to create the same entry keeps exactly one
//! winner, which every caller then observes.

mod assembly;
mod context;
mod resolved;

pub use assembly::{AssemblyLoader, AssemblyResolver};
pub use context::ResolverContext;
pub use resolved::{
    FieldHandle, MethodHandle, ResolvedField, ResolvedMethod, ResolvedModule, ResolvedType,
    TypeHandle,
};
