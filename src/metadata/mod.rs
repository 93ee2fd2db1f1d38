//! Metadata model.
//!
//! A compact, owned representation of the ECMA-335 metadata the inliner and resolver consume:
//!
//! - [`token::Token`] - table/row handles carried by instruction operands
//! - [`module::ModuleDef`] - one loaded module with its rows and replaceable method bodies
//! - [`signature`] - type, method and field signatures
//! - [`identity::AssemblyName`] - assembly identities used for cross-module binding
//! - [`builder::ModuleBuilder`] - construction of modules from a lifted binary or for tests

pub mod builder;
pub mod identity;
pub mod module;
pub mod signature;
pub mod token;
