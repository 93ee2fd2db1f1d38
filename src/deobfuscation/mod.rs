//! Decrypter call-site inlining.
//!
//! Obfuscators replace constants with calls such as `Strings.Get(1234)`. The
//! [`CallSiteInliner`] finds those calls, computes their results and splices the literal
//! back in place of the call and its argument loads.
//!
//! # Architecture
//!
//! ```text
//!   method body ──► Blocks ──► scan ──► compute ──► plan ──► apply ──► method body
//!                               │          │
//!                      DecrypterRegistry   InlineStrategy
//!                      ResolverContext     ├─ StaticStrategy  (handlers, emulation)
//!                                          └─ RemoteStrategy  (DecrypterTransport)
//! ```
//!
//! Each method goes through three phases: every block is scanned before any value is
//! computed, and every value is computed before the body is edited. A method whose
//! computation fails keeps its original body.
//!
//! # Strategies
//!
//! - [`StaticStrategy`] calls a [`DecrypterHandler`] per call site; [`emulated_handler`]
//!   evaluates int32 decrypters with [`crate::emulation::MethodEvaluator`]
//! - [`RemoteStrategy`] batches call sites per decrypter id to a [`DecrypterTransport`],
//!   for example an [`IsolatedExecutor`], and keeps [`UsageStatistics`]
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use dotinline::{
//!     deobfuscation::{CallSiteInliner, DecrypterRegistry, InlinerConfig, StaticStrategy},
//!     resolver::ResolverContext,
//! };
//!
//! let registry = DecrypterRegistry::new();
//! let inliner = CallSiteInliner::new(StaticStrategy::new(registry), Arc::new(ResolverContext::new()))
//!     .with_config(InlinerConfig::new().with_max_emulation_steps(200));
//! assert_eq!(inliner.config().max_emulation_steps, 200);
//! ```

mod callsite;
mod config;
mod constant;
mod executor;
mod handler;
mod inliner;
mod registry;
mod remote;
mod stats;

pub use callsite::{is_string_no_op, scan_block, CallSite, Scan};
pub use config::InlinerConfig;
pub use constant::ConstValue;
pub use executor::{DecryptFn, ExecutorConfig, IsolatedExecutor};
pub use handler::{emulated_handler, DecrypterHandler, HandlerContext, StaticStrategy};
pub use inliner::{CallSiteInliner, InlineReport, InlineStrategy};
pub use registry::{DecrypterRegistry, SignatureKey};
pub use remote::{DecrypterTransport, RemoteStrategy};
pub use stats::{DecrypterUsage, UsageStatistics};
