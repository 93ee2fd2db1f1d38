//! # dotinline Prelude
//!
//! The types needed to build or load a module, register decrypters and run the inliner,
//! for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotinline operations
pub use crate::Error;

/// The result type used throughout dotinline
pub use crate::Result;

// ================================================================================================
// Instructions
// ================================================================================================

/// Instruction model and basic blocks
pub use crate::assembly::{Block, Blocks, Instruction, MethodBody, OpCode, Operand};

// ================================================================================================
// Metadata
// ================================================================================================

/// Metadata token type for referencing table entries
pub use crate::metadata::token::Token;

/// Module model and construction
pub use crate::metadata::{
    builder::ModuleBuilder,
    identity::{AssemblyName, AssemblyVersion},
    module::{MethodDef, ModuleDef, ResolutionScope},
    signature::{MethodSig, TypeSig},
};

// ================================================================================================
// Emulation
// ================================================================================================

/// Symbolic evaluation of decrypter bodies
pub use crate::emulation::{Evaluation, MethodEvaluator, SkipReason, SymbolicValue};

// ================================================================================================
// Resolution
// ================================================================================================

/// Cross-module resolution
pub use crate::resolver::{
    AssemblyLoader, ResolvedMethod, ResolvedModule, ResolvedType, ResolverContext,
};

// ================================================================================================
// Inlining
// ================================================================================================

/// Call-site inliner, strategies and their configuration
pub use crate::deobfuscation::{
    emulated_handler, CallSiteInliner, ConstValue, DecrypterHandler, DecrypterRegistry,
    DecrypterTransport, ExecutorConfig, HandlerContext, InlineReport, InlineStrategy,
    InlinerConfig, IsolatedExecutor, RemoteStrategy, SignatureKey, StaticStrategy,
    UsageStatistics,
};
