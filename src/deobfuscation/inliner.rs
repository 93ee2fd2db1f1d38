//! The call-site inliner.
//!
//! Every method is processed in three phases that never interleave:
//!
//! 1. **Scan** - split the body into blocks and record all decrypter call sites
//! 2. **Resolve** - let the [`InlineStrategy`] compute the value of every site
//! 3. **Rewrite** - plan one edit per solved site, then apply the edits block by block in
//!    descending instruction order, so earlier indices stay valid while later spans
//!    shrink
//!
//! A method is rewritten as a whole or not at all: an error in any phase leaves its body
//! untouched. A call whose target cannot be resolved only abandons that call site.

use std::{
    ops::{AddAssign, Range},
    sync::Arc,
};

use rayon::prelude::*;

use crate::{
    assembly::{Blocks, Instruction},
    deobfuscation::{
        callsite::{is_string_no_op, scan_block, CallSite, Scan},
        config::InlinerConfig,
        registry::DecrypterRegistry,
    },
    metadata::{module::ModuleDef, token::Token},
    resolver::{ResolvedModule, ResolverContext},
    Error, Result,
};

/// How the value of a decrypter call is obtained.
pub trait InlineStrategy: Send + Sync {
    /// What the registry maps a decrypter to.
    type Decrypter: Clone + Send + Sync;

    /// The decrypters this strategy serves.
    fn registry(&self) -> &DecrypterRegistry<Self::Decrypter>;

    /// Computes `value` for the call sites of the method `caller`.
    ///
    /// Sites left at `None` are skipped.
    ///
    /// # Errors
    /// An error aborts the caller's rewrite; no site of the method is applied.
    fn compute(
        &self,
        config: &InlinerConfig,
        caller: Token,
        sites: &mut [CallSite<Self::Decrypter>],
    ) -> Result<()>;
}

/// Counts of one inlining run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineReport {
    /// Call sites replaced by a constant
    pub replaced: usize,
    /// Decrypter call sites left unchanged
    pub skipped: usize,
    /// Candidate call sites abandoned because their target could not be resolved
    pub unresolved: usize,
    /// Methods whose body was rewritten
    pub methods_changed: usize,
    /// Methods left unchanged because processing them failed
    pub failed: Vec<Token>,
}

impl AddAssign for InlineReport {
    fn add_assign(&mut self, other: Self) {
        self.replaced += other.replaced;
        self.skipped += other.skipped;
        self.unresolved += other.unresolved;
        self.methods_changed += other.methods_changed;
        self.failed.extend(other.failed);
    }
}

struct Edit {
    block: usize,
    range: Range<usize>,
    replacement: Instruction,
}

/// Replaces decrypter calls with the constants they return.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use dotinline::assembly::{Instruction, MethodBody, OpCode};
/// use dotinline::deobfuscation::{
///     emulated_handler, CallSiteInliner, DecrypterRegistry, StaticStrategy,
/// };
/// use dotinline::metadata::{builder::ModuleBuilder, signature::{MethodSig, TypeSig}};
/// use dotinline::resolver::ResolverContext;
///
/// let mut builder = ModuleBuilder::new("App.exe");
/// let ty = builder.add_type("App", "Program");
/// let decrypt = builder.add_method(
///     ty,
///     "Decrypt",
///     MethodSig::new_static(TypeSig::I4, vec![TypeSig::I4]),
///     Some(MethodBody::new(vec![
///         Instruction::ldarg(0),
///         Instruction::ldc_i4(0x55),
///         Instruction::simple(OpCode::Xor),
///         Instruction::simple(OpCode::Ret),
///     ])),
/// );
/// let main = builder.add_method(
///     ty,
///     "Main",
///     MethodSig::new_static(TypeSig::I4, vec![]),
///     Some(MethodBody::new(vec![
///         Instruction::ldc_i4(0x50),
///         Instruction::token(OpCode::Call, decrypt),
///         Instruction::simple(OpCode::Ret),
///     ])),
/// );
/// let module = Arc::new(builder.build());
///
/// let mut registry = DecrypterRegistry::new();
/// registry.register_method(&module, decrypt, emulated_handler())?;
///
/// let inliner = CallSiteInliner::new(
///     StaticStrategy::new(registry),
///     Arc::new(ResolverContext::new()),
/// );
/// let report = inliner.inline_module(&module)?;
/// assert_eq!(report.replaced, 1);
///
/// let body = module.method_def(main)?.body()?.unwrap();
/// assert_eq!(body.instructions[0], Instruction::ldc_i4(5));
/// # Ok::<(), dotinline::Error>(())
/// ```
pub struct CallSiteInliner<S> {
    strategy: S,
    context: Arc<ResolverContext>,
    config: InlinerConfig,
}

impl<S: InlineStrategy> CallSiteInliner<S> {
    /// Creates an inliner with the default configuration.
    pub fn new(strategy: S, context: Arc<ResolverContext>) -> Self {
        Self {
            strategy,
            context,
            config: InlinerConfig::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: InlinerConfig) -> Self {
        self.config = config;
        self
    }

    /// The configuration.
    pub fn config(&self) -> &InlinerConfig {
        &self.config
    }

    /// The strategy.
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// The resolver context.
    pub fn context(&self) -> &Arc<ResolverContext> {
        &self.context
    }

    /// Consumes the inliner, returning its strategy.
    pub fn into_strategy(self) -> S {
        self.strategy
    }

    /// Inlines decrypter calls in every method of `module`.
    ///
    /// A method that fails is left unchanged, recorded in [`InlineReport::failed`] and the
    /// remaining methods are still processed.
    ///
    /// # Errors
    /// Returns [`Error::BatchMismatch`] if the strategy's results cannot be matched to their
    /// call sites. Methods processed before keep their rewrites; the rest of the module is
    /// not processed.
    pub fn inline_module(&self, module: &Arc<ModuleDef>) -> Result<InlineReport> {
        let resolved = self.context.add_module(module.clone());

        let mut report = InlineReport::default();
        for token in module.method_tokens() {
            match self.inline_method(&resolved, token) {
                Ok(method) => report += method,
                Err(error @ Error::BatchMismatch { .. }) => return Err(error),
                Err(error) => {
                    log::warn!(
                        "{}: left {} unchanged: {}",
                        module.name,
                        module.member_display(token),
                        error
                    );
                    report.failed.push(token);
                }
            }
        }

        log::info!(
            "{}: replaced {} call sites in {} methods, skipped {}, unresolved {}, failed methods {}",
            module.name,
            report.replaced,
            report.methods_changed,
            report.skipped,
            report.unresolved,
            report.failed.len()
        );
        Ok(report)
    }

    /// Inlines decrypter calls in several modules concurrently.
    ///
    /// All modules are registered with the resolver first, so calls may cross between
    /// them. Results are returned in input order.
    pub fn inline_modules(&self, modules: &[Arc<ModuleDef>]) -> Vec<Result<InlineReport>> {
        for module in modules {
            self.context.add_module(module.clone());
        }

        modules
            .par_iter()
            .map(|module| self.inline_module(module))
            .collect()
    }

    /// Inlines decrypter calls in the method `token` of `module`.
    ///
    /// # Errors
    /// Returns transport and batch failures; the method body is then left unchanged.
    pub fn inline_method(&self, module: &ResolvedModule, token: Token) -> Result<InlineReport> {
        let method = module.module().method_def(token)?;
        let Some(body) = method.body()? else {
            return Ok(InlineReport::default());
        };
        let mut blocks = Blocks::from_body(body)?;

        let mut scan = Scan::default();
        for (index, block) in blocks.iter().enumerate() {
            scan_block(
                &self.context,
                module,
                self.strategy.registry(),
                index,
                block,
                &mut scan,
            )?;
        }

        let mut report = InlineReport {
            skipped: scan.skipped,
            unresolved: scan.unresolved,
            ..InlineReport::default()
        };
        if scan.sites.is_empty() {
            return Ok(report);
        }

        self.strategy.compute(&self.config, token, &mut scan.sites)?;

        let edits = self.plan(module.module(), token, &blocks, &scan.sites, &mut report);
        if edits.is_empty() {
            return Ok(report);
        }
        apply(&mut blocks, edits)?;

        method.set_body(blocks.into_body())?;
        report.methods_changed = 1;
        Ok(report)
    }

    fn plan(
        &self,
        module: &ModuleDef,
        caller: Token,
        blocks: &Blocks,
        sites: &[CallSite<S::Decrypter>],
        report: &mut InlineReport,
    ) -> Vec<Edit> {
        let mut edits = Vec::with_capacity(sites.len());

        for site in sites {
            let value = match &site.value {
                Some(value) if value.is_null() && !self.config.inline_null_results => None,
                other => other.as_ref(),
            };
            let Some(value) = value else {
                log::debug!(
                    "{}: left call to {} unchanged",
                    module.member_display(caller),
                    site.method.handle.display
                );
                report.skipped += 1;
                continue;
            };

            let mut end = site.call + 1;
            if value.is_string() && self.config.remove_string_casts {
                let next = blocks
                    .get(site.block)
                    .and_then(|block| block.instructions.get(end));
                if next.is_some_and(|next| is_string_no_op(module, next)) {
                    end += 1;
                }
            }

            log::debug!(
                "{}: replaced call to {} with {}",
                module.member_display(caller),
                site.method.handle.display,
                value
            );
            report.replaced += 1;
            edits.push(Edit {
                block: site.block,
                range: site.start..end,
                replacement: value.to_instruction(),
            });
        }

        edits
    }
}

fn apply(blocks: &mut Blocks, mut edits: Vec<Edit>) -> Result<()> {
    edits.sort_unstable_by(|a, b| (b.block, b.range.start).cmp(&(a.block, a.range.start)));

    for edit in edits {
        let block = blocks
            .get_mut(edit.block)
            .ok_or_else(|| malformed_error!("Edit targets missing block {}", edit.block))?;
        if edit.range.end > block.len() {
            return Err(malformed_error!(
                "Edit {:?} exceeds block {} of length {}",
                edit.range,
                edit.block,
                block.len()
            ));
        }
        block.splice(edit.range, [edit.replacement]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::OpCode,
        deobfuscation::{
            constant::ConstValue,
            handler::{emulated_handler, DecrypterHandler, HandlerContext, StaticStrategy},
        },
        test::factories::CryptoModule,
    };

    fn inliner(fixture: &CryptoModule, string_value: Option<ConstValue>) -> CallSiteInliner<StaticStrategy> {
        let mut registry = DecrypterRegistry::new();
        registry
            .register_method(&fixture.module, fixture.decode, emulated_handler())
            .unwrap();
        let handler: DecrypterHandler = Arc::new(move |_: &HandlerContext<'_>| string_value.clone());
        registry
            .register_method(&fixture.module, fixture.get_string, handler)
            .unwrap();

        CallSiteInliner::new(StaticStrategy::new(registry), Arc::new(ResolverContext::new()))
    }

    #[test]
    fn test_affine_call_sites() {
        let fixture = CryptoModule::new();
        let report = inliner(&fixture, None).inline_module(&fixture.module).unwrap();

        assert_eq!(report.replaced, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.methods_changed, 1);

        let body = fixture.module.method_def(fixture.main).unwrap().body().unwrap().unwrap();
        assert_eq!(
            body.instructions,
            vec![
                Instruction::ldc_i4(7),
                Instruction::ldc_i4(11),
                Instruction::simple(OpCode::Add),
                Instruction::simple(OpCode::Ret),
            ]
        );
    }

    #[test]
    fn test_string_cast_is_absorbed() {
        let fixture = CryptoModule::new();
        let inliner = inliner(&fixture, Some(ConstValue::String("hi".into())));
        let report = inliner.inline_module(&fixture.module).unwrap();
        assert_eq!(report.replaced, 3);

        let body = fixture
            .module
            .method_def(fixture.greeting)
            .unwrap()
            .body()
            .unwrap()
            .unwrap();
        assert_eq!(
            body.instructions,
            vec![Instruction::ldstr("hi"), Instruction::simple(OpCode::Ret)]
        );
    }

    #[test]
    fn test_string_cast_kept_when_disabled() {
        let fixture = CryptoModule::new();
        let inliner = inliner(&fixture, Some(ConstValue::String("hi".into())))
            .with_config(InlinerConfig::new().with_remove_string_casts(false));
        inliner.inline_module(&fixture.module).unwrap();

        let body = fixture
            .module
            .method_def(fixture.greeting)
            .unwrap()
            .body()
            .unwrap()
            .unwrap();
        assert_eq!(body.instructions.len(), 3);
        assert_eq!(body.instructions[1].opcode, OpCode::Castclass);
    }

    #[test]
    fn test_null_results() {
        let fixture = CryptoModule::new();
        let report = inliner(&fixture, Some(ConstValue::Null))
            .inline_module(&fixture.module)
            .unwrap();
        assert_eq!((report.replaced, report.skipped), (2, 1));

        let fixture = CryptoModule::new();
        let report = inliner(&fixture, Some(ConstValue::Null))
            .with_config(InlinerConfig::new().with_inline_null_results(true))
            .inline_module(&fixture.module)
            .unwrap();
        assert_eq!((report.replaced, report.skipped), (3, 0));

        // A null is not a string: the cast stays
        let body = fixture
            .module
            .method_def(fixture.greeting)
            .unwrap()
            .body()
            .unwrap()
            .unwrap();
        assert_eq!(body.instructions[0].opcode, OpCode::Ldnull);
        assert_eq!(body.instructions[1].opcode, OpCode::Castclass);
    }

    #[test]
    fn test_branch_targets_survive_rewrite() {
        let fixture = CryptoModule::new();
        let body = crate::assembly::MethodBody::new(vec![
            Instruction::ldarg(0),                              // 0
            Instruction::branch(OpCode::BrtrueS, 5),            // 1
            Instruction::ldc_i4(3),                             // 2
            Instruction::token(OpCode::Call, fixture.decode),   // 3
            Instruction::simple(OpCode::Ret),                   // 4
            Instruction::ldc_i4(5),                             // 5
            Instruction::token(OpCode::Call, fixture.decode),   // 6
            Instruction::simple(OpCode::Ret),                   // 7
        ]);
        let main = fixture.module.method_def(fixture.main).unwrap();
        main.set_body(body).unwrap();

        let inliner = inliner(&fixture, None);
        let resolved = inliner.context().add_module(fixture.module.clone());
        let report = inliner.inline_method(&resolved, fixture.main).unwrap();
        assert_eq!(report.replaced, 2);

        let body = main.body().unwrap().unwrap();
        assert_eq!(
            body.instructions,
            vec![
                Instruction::ldarg(0),
                Instruction::branch(OpCode::BrtrueS, 4),
                Instruction::ldc_i4(7),
                Instruction::simple(OpCode::Ret),
                Instruction::ldc_i4(11),
                Instruction::simple(OpCode::Ret),
            ]
        );
    }
}
