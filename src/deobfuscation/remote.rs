//! The out-of-process strategy.
//!
//! Decrypters run in an isolated executor, typically the original assembly loaded into a
//! sandbox. All call sites of one method that share a decrypter id are sent as one batch,
//! in call-site order, and the executor answers with one result per request in the same
//! order.

use std::sync::Mutex;

use crate::{
    deobfuscation::{
        callsite::CallSite, config::InlinerConfig, constant::ConstValue,
        inliner::InlineStrategy, registry::DecrypterRegistry, stats::UsageStatistics,
    },
    metadata::token::Token,
    Error, Result,
};

/// A channel to an executor running the decrypters.
pub trait DecrypterTransport: Send {
    /// Invokes decrypter `decrypter` once per argument list of `batch` on behalf of the
    /// method `caller`, returning the results in request order.
    ///
    /// Failed invocations are reported as [`ConstValue::Null`].
    ///
    /// # Errors
    /// Returns [`Error::Transport`] if the executor cannot be reached or does not answer.
    fn decrypt(
        &mut self,
        decrypter: i32,
        batch: Vec<Vec<ConstValue>>,
        caller: Token,
    ) -> Result<Vec<ConstValue>>;
}

/// Resolves call sites by batching them to a [`DecrypterTransport`].
///
/// The transport sits behind a mutex: one batch is in flight at a time, even when several
/// modules are inlined concurrently.
pub struct RemoteStrategy<T> {
    registry: DecrypterRegistry<i32>,
    transport: Mutex<T>,
    statistics: UsageStatistics,
}

impl<T: DecrypterTransport> RemoteStrategy<T> {
    /// Creates the strategy; `registry` maps decrypters to executor ids.
    pub fn new(registry: DecrypterRegistry<i32>, transport: T) -> Self {
        Self {
            registry,
            transport: Mutex::new(transport),
            statistics: UsageStatistics::new(),
        }
    }

    /// Per-id usage counters accumulated so far.
    pub fn statistics(&self) -> &UsageStatistics {
        &self.statistics
    }

    /// Returns the transport.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if a batch panicked while holding the transport.
    pub fn into_transport(self) -> Result<T> {
        self.transport
            .into_inner()
            .map_err(|_| Error::LockError("Failed to take decrypter transport".to_string()))
    }

    fn send(&self, decrypter: i32, batch: Vec<Vec<ConstValue>>, caller: Token) -> Result<Vec<ConstValue>> {
        let expected = batch.len();
        let results = {
            let mut transport = self
                .transport
                .lock()
                .map_err(|_| Error::LockError("Failed to lock decrypter transport".to_string()))?;
            transport.decrypt(decrypter, batch, caller)?
        };

        if results.len() != expected {
            log::warn!(
                "Decrypter {} answered {} requests with {} results",
                decrypter,
                expected,
                results.len()
            );
            return Err(Error::BatchMismatch {
                decrypter,
                expected,
                actual: results.len(),
            });
        }

        let non_null = results.iter().filter(|value| !value.is_null()).count();
        self.statistics
            .record(decrypter, expected as u64, non_null as u64);
        Ok(results)
    }
}

impl<T: DecrypterTransport> InlineStrategy for RemoteStrategy<T> {
    type Decrypter = i32;

    fn registry(&self) -> &DecrypterRegistry<i32> {
        &self.registry
    }

    fn compute(
        &self,
        _config: &InlinerConfig,
        caller: Token,
        sites: &mut [CallSite<i32>],
    ) -> Result<()> {
        // decrypter id -> site indices, both in call-site order
        let mut batches: Vec<(i32, Vec<usize>)> = Vec::new();
        for (index, site) in sites.iter().enumerate() {
            match batches.iter_mut().find(|(id, _)| *id == site.decrypter) {
                Some((_, indices)) => indices.push(index),
                None => batches.push((site.decrypter, vec![index])),
            }
        }

        let mut answered = Vec::with_capacity(batches.len());
        for (id, indices) in &batches {
            let batch = indices.iter().map(|&i| sites[i].args.clone()).collect();
            answered.push(self.send(*id, batch, caller)?);
        }

        for ((_, indices), results) in batches.iter().zip(answered) {
            for (&index, value) in indices.iter().zip(results) {
                sites[index].value = Some(value);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        deobfuscation::inliner::CallSiteInliner, resolver::ResolverContext,
        test::factories::CryptoModule,
    };

    /// Answers `x * 2 + 1` for decrypter 4, dropping the last result when `short` is set.
    /// Other decrypter ids fail.
    struct Affine {
        short: bool,
        batches: Vec<(i32, usize)>,
    }

    impl DecrypterTransport for Affine {
        fn decrypt(
            &mut self,
            decrypter: i32,
            batch: Vec<Vec<ConstValue>>,
            _caller: Token,
        ) -> Result<Vec<ConstValue>> {
            if decrypter != 4 {
                return Err(Error::Transport(format!("no decrypter {decrypter}")));
            }
            self.batches.push((decrypter, batch.len()));
            let mut results: Vec<ConstValue> = batch
                .iter()
                .map(|args| match args.first().and_then(ConstValue::as_i32) {
                    Some(x) => ConstValue::I32(x * 2 + 1),
                    None => ConstValue::Null,
                })
                .collect();
            if self.short {
                results.pop();
            }
            Ok(results)
        }
    }

    fn inliner(fixture: &CryptoModule, short: bool) -> CallSiteInliner<RemoteStrategy<Affine>> {
        let mut registry = DecrypterRegistry::new();
        registry
            .register_method(&fixture.module, fixture.decode, 4)
            .unwrap();
        let transport = Affine {
            short,
            batches: Vec::new(),
        };
        CallSiteInliner::new(
            RemoteStrategy::new(registry, transport),
            Arc::new(ResolverContext::new()),
        )
    }

    #[test]
    fn test_batches_per_decrypter() {
        let fixture = CryptoModule::new();
        let inliner = inliner(&fixture, false);
        let report = inliner.inline_module(&fixture.module).unwrap();

        assert_eq!(report.replaced, 2);
        let usage = inliner.strategy().statistics().get(4);
        assert_eq!((usage.calls, usage.non_null_results), (2, 2));
    }

    #[test]
    fn test_short_batch_applies_nothing() {
        let fixture = CryptoModule::new();
        let before = fixture
            .module
            .method_def(fixture.main)
            .unwrap()
            .body()
            .unwrap();

        let inliner = inliner(&fixture, true);
        let error = inliner.inline_module(&fixture.module).unwrap_err();
        assert!(matches!(
            error,
            Error::BatchMismatch {
                decrypter: 4,
                expected: 2,
                actual: 1
            }
        ));

        let after = fixture
            .module
            .method_def(fixture.main)
            .unwrap()
            .body()
            .unwrap();
        assert_eq!(before, after);
        assert_eq!(inliner.strategy().statistics().get(4).calls, 0);
    }

    #[test]
    fn test_one_batch_per_method() {
        let fixture = CryptoModule::new();
        let inliner = inliner(&fixture, false);
        inliner.inline_module(&fixture.module).unwrap();

        let transport = inliner.into_strategy().into_transport().unwrap();
        assert_eq!(transport.batches, vec![(4, 2)]);
    }

    #[test]
    fn test_transport_failure_skips_only_its_method() {
        let fixture = CryptoModule::new();
        let mut registry = DecrypterRegistry::new();
        registry
            .register_method(&fixture.module, fixture.decode, 4)
            .unwrap();
        registry
            .register_method(&fixture.module, fixture.get_string, 9)
            .unwrap();
        let transport = Affine {
            short: false,
            batches: Vec::new(),
        };
        let inliner = CallSiteInliner::new(
            RemoteStrategy::new(registry, transport),
            Arc::new(ResolverContext::new()),
        );
        let before = fixture
            .module
            .method_def(fixture.greeting)
            .unwrap()
            .body()
            .unwrap();

        let report = inliner.inline_module(&fixture.module).unwrap();
        assert_eq!(report.replaced, 2);
        assert_eq!(report.methods_changed, 1);
        assert_eq!(report.failed, vec![fixture.greeting]);

        let after = fixture
            .module
            .method_def(fixture.greeting)
            .unwrap()
            .body()
            .unwrap();
        assert_eq!(before, after);
    }
}
