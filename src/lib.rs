// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![deny(unsafe_code)]

//! # dotinline
//!
//! Constant inlining for obfuscated .NET assemblies. Obfuscators hide string and integer
//! literals behind calls to decrypter methods; `dotinline` finds those calls, computes
//! their results and replaces each call, together with the loads of its constant
//! arguments, by the literal it returns.
//!
//! ## Features
//!
//! - **Symbolic evaluation** - run int32 decrypters over known/unknown values with a step
//!   budget, without executing foreign code
//! - **Two strategies** - native handler functions in-process, or batched requests to an
//!   isolated executor
//! - **Cross-module resolution** - follow `TypeRef`/`MemberRef` chains into other loaded
//!   modules and external assemblies, reapplying generic and array wrapping
//! - **Whole-method rewrites** - every method is scanned, resolved and rewritten in
//!   separate phases, so a failure never leaves a half-edited body
//! - **Parallel** - several modules can be processed concurrently over shared caches
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use dotinline::prelude::*;
//!
//! let mut builder = ModuleBuilder::new("App.exe");
//! let ty = builder.add_type("App", "Program");
//! let decrypt = builder.add_method(
//!     ty,
//!     "Decrypt",
//!     MethodSig::new_static(TypeSig::I4, vec![TypeSig::I4]),
//!     Some(MethodBody::new(vec![
//!         Instruction::ldarg(0),
//!         Instruction::ldc_i4(7),
//!         Instruction::simple(OpCode::Sub),
//!         Instruction::simple(OpCode::Ret),
//!     ])),
//! );
//! let main = builder.add_method(
//!     ty,
//!     "Main",
//!     MethodSig::new_static(TypeSig::I4, vec![]),
//!     Some(MethodBody::new(vec![
//!         Instruction::ldc_i4(49),
//!         Instruction::token(OpCode::Call, decrypt),
//!         Instruction::simple(OpCode::Ret),
//!     ])),
//! );
//! let module = Arc::new(builder.build());
//!
//! let mut registry = DecrypterRegistry::new();
//! registry.register_method(&module, decrypt, emulated_handler())?;
//! let inliner = CallSiteInliner::new(StaticStrategy::new(registry), Arc::new(ResolverContext::new()));
//!
//! let report = inliner.inline_module(&module)?;
//! assert_eq!(report.replaced, 1);
//! assert_eq!(
//!     module.method_def(main)?.body()?.unwrap().instructions[0],
//!     Instruction::ldc_i4(42)
//! );
//! # Ok::<(), dotinline::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`assembly`] - CIL instructions, bodies, basic blocks and the IL codec
//! - [`metadata`] - the in-memory module model: tokens, rows, signatures, identities
//! - [`emulation`] - symbolic values, the instruction and branch emulators and the
//!   bounded method evaluator
//! - [`resolver`] - cross-module resolution of types, methods and fields
//! - [`deobfuscation`] - call-site scanning, strategies and the inliner itself
//!
//! ## Logging
//!
//! Diagnostics go through the [`log`](https://docs.rs/log) facade. Install any logger
//! (for example `env_logger`) in the driver to see per-site decisions at `debug` level.

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dotinline::prelude::*;
///
/// let config = InlinerConfig::new().with_inline_null_results(true);
/// assert!(config.inline_null_results);
/// ```
pub mod prelude;

pub mod assembly;
pub mod deobfuscation;
pub mod emulation;
pub mod metadata;
pub mod resolver;

/// `dotinline` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotinline` Error type
///
/// # Examples
///
/// ```rust
/// use dotinline::{Error, metadata::token::Token};
///
/// fn describe(error: &Error) -> &'static str {
///     match error {
///         Error::Unresolvable { .. } => "reference has no target",
///         Error::BatchMismatch { .. } => "executor answered the wrong number of requests",
///         _ => "other",
///     }
/// }
///
/// assert_eq!(describe(&Error::InvalidToken(Token::new(0x06000001))), "other");
/// ```
pub use error::Error;

/// Bounds-checked byte cursor used by the IL decoder.
pub use file::parser::Parser;
