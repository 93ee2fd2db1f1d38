//! The static, in-process strategy.
//!
//! Each registered decrypter maps to a handler function that is called synchronously with
//! the resolved method, its generic instantiation and the constant arguments. Drivers
//! supply handlers that reimplement known decrypters natively; [`emulated_handler`]
//! covers int32 decrypters by evaluating their body symbolically.

use std::sync::Arc;

use crate::{
    deobfuscation::{
        callsite::CallSite, config::InlinerConfig, constant::ConstValue,
        inliner::InlineStrategy, registry::DecrypterRegistry,
    },
    emulation::{Evaluation, MethodEvaluator, SymbolicValue},
    metadata::token::Token,
    resolver::ResolvedMethod,
    Result,
};

/// What a handler sees of one call site.
pub struct HandlerContext<'a> {
    /// The decrypter, including any generic method arguments
    pub method: &'a ResolvedMethod,
    /// Constant arguments in parameter order
    pub args: &'a [ConstValue],
    /// The calling method
    pub caller: Token,
    /// The inliner configuration
    pub config: &'a InlinerConfig,
}

/// Computes the result of one decrypter call, or `None` if it cannot.
pub type DecrypterHandler = Arc<dyn Fn(&HandlerContext<'_>) -> Option<ConstValue> + Send + Sync>;

/// Resolves call sites with registered handler functions.
pub struct StaticStrategy {
    registry: DecrypterRegistry<DecrypterHandler>,
}

impl StaticStrategy {
    /// Creates the strategy over `registry`.
    #[must_use]
    pub fn new(registry: DecrypterRegistry<DecrypterHandler>) -> Self {
        Self { registry }
    }
}

impl InlineStrategy for StaticStrategy {
    type Decrypter = DecrypterHandler;

    fn registry(&self) -> &DecrypterRegistry<DecrypterHandler> {
        &self.registry
    }

    fn compute(
        &self,
        config: &InlinerConfig,
        caller: Token,
        sites: &mut [CallSite<DecrypterHandler>],
    ) -> Result<()> {
        for site in sites {
            let context = HandlerContext {
                method: &site.method,
                args: &site.args,
                caller,
                config,
            };
            site.value = (site.decrypter)(&context);
        }
        Ok(())
    }
}

/// A handler that evaluates the decrypter's own body over symbolic values.
///
/// Integer arguments become known values, any other argument stays unknown. The result
/// is used only if evaluation reaches `ret` with a known int32 within
/// [`InlinerConfig::max_emulation_steps`].
#[must_use]
pub fn emulated_handler() -> DecrypterHandler {
    Arc::new(|context: &HandlerContext<'_>| {
        let method = match context.method.handle.def() {
            Ok(method) => method,
            Err(error) => {
                log::warn!("{}: {}", context.method.handle.display, error);
                return None;
            }
        };

        let args: Vec<SymbolicValue> = context
            .args
            .iter()
            .map(|arg| arg.as_i32().map_or(SymbolicValue::Unknown, SymbolicValue::Known))
            .collect();

        match MethodEvaluator::new(context.config.max_emulation_steps).evaluate(method, &args) {
            Ok(Evaluation::Known { value, steps }) => {
                log::debug!(
                    "{} evaluated to {} in {} steps",
                    context.method.handle.display,
                    value,
                    steps
                );
                Some(ConstValue::I32(value))
            }
            Ok(Evaluation::Skipped { reason, steps }) => {
                log::debug!(
                    "{} not evaluated after {} steps: {}",
                    context.method.handle.display,
                    steps,
                    reason
                );
                None
            }
            Err(error) => {
                log::warn!("{}: {}", context.method.handle.display, error);
                None
            }
        }
    })
}
