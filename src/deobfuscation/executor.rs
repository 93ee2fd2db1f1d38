//! A [`DecrypterTransport`] backed by a dedicated worker thread.
//!
//! The worker owns the decrypter implementations and is reached over channels, so a
//! decrypter that hangs only stalls the worker. Requests wait at most
//! [`ExecutorConfig::timeout`] for their reply. Once a request has timed out the worker
//! is considered lost and every later request fails as well.

use std::{
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    deobfuscation::{constant::ConstValue, remote::DecrypterTransport},
    metadata::token::Token,
    Error, Result,
};

/// A decrypter implementation run by the worker.
///
/// Returns `None` if the invocation fails; the failure is reported as
/// [`ConstValue::Null`].
pub type DecryptFn = Box<dyn Fn(&[ConstValue]) -> Option<ConstValue> + Send>;

/// Settings of an [`IsolatedExecutor`].
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// How long a single batch may take; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl ExecutorConfig {
    /// Sets the per-batch timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

struct Request {
    decrypter: i32,
    batch: Vec<Vec<ConstValue>>,
    caller: Token,
    reply: Sender<Option<Vec<ConstValue>>>,
}

/// Runs decrypters on a worker thread.
///
/// ```rust
/// use std::collections::HashMap;
/// use dotinline::{
///     deobfuscation::{ConstValue, DecryptFn, DecrypterTransport, ExecutorConfig, IsolatedExecutor},
///     metadata::token::Token,
/// };
///
/// let mut decrypters: HashMap<i32, DecryptFn> = HashMap::new();
/// decrypters.insert(1, Box::new(|args| args.first().and_then(ConstValue::as_i32).map(|x| ConstValue::I32(-x))));
///
/// let mut executor = IsolatedExecutor::spawn(decrypters, ExecutorConfig::default())?;
/// let results = executor.decrypt(1, vec![vec![ConstValue::I32(4)]], Token::new(0x06000001))?;
/// assert_eq!(results, vec![ConstValue::I32(-4)]);
/// # Ok::<(), dotinline::Error>(())
/// ```
pub struct IsolatedExecutor {
    requests: Option<Sender<Request>>,
    worker: Option<JoinHandle<()>>,
    config: ExecutorConfig,
    lost: bool,
}

impl IsolatedExecutor {
    /// Starts the worker thread owning `decrypters`, keyed by decrypter id.
    ///
    /// # Errors
    /// Returns [`Error::Transport`] if the thread cannot be spawned.
    pub fn spawn(decrypters: HashMap<i32, DecryptFn>, config: ExecutorConfig) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Request>();
        let worker = thread::Builder::new()
            .name("dotinline-decrypter".to_string())
            .spawn(move || serve(&decrypters, &receiver))
            .map_err(|error| Error::Transport(format!("Failed to spawn executor - {error}")))?;

        Ok(Self {
            requests: Some(sender),
            worker: Some(worker),
            config,
            lost: false,
        })
    }

    /// The executor settings.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }
}

fn serve(decrypters: &HashMap<i32, DecryptFn>, requests: &Receiver<Request>) {
    for request in requests {
        let Some(decrypt) = decrypters.get(&request.decrypter) else {
            log::warn!(
                "Executor has no decrypter {} (called from {})",
                request.decrypter,
                request.caller
            );
            // The caller may have timed out already
            let _ = request.reply.send(None);
            continue;
        };

        let results = request
            .batch
            .iter()
            .map(|args| {
                match panic::catch_unwind(AssertUnwindSafe(|| decrypt(args))) {
                    Ok(Some(value)) => value,
                    Ok(None) => ConstValue::Null,
                    Err(_) => {
                        log::debug!(
                            "Decrypter {} panicked for {} (called from {})",
                            request.decrypter,
                            args.iter()
                                .map(ToString::to_string)
                                .collect::<Vec<_>>()
                                .join(", "),
                            request.caller
                        );
                        ConstValue::Null
                    }
                }
            })
            .collect();
        let _ = request.reply.send(Some(results));
    }
}

impl DecrypterTransport for IsolatedExecutor {
    fn decrypt(
        &mut self,
        decrypter: i32,
        batch: Vec<Vec<ConstValue>>,
        caller: Token,
    ) -> Result<Vec<ConstValue>> {
        if self.lost {
            return Err(Error::Transport(
                "Executor is unavailable after an earlier timeout".to_string(),
            ));
        }
        let Some(requests) = &self.requests else {
            return Err(Error::Transport("Executor has shut down".to_string()));
        };

        let (reply, results) = mpsc::channel();
        requests
            .send(Request {
                decrypter,
                batch,
                caller,
                reply,
            })
            .map_err(|_| Error::Transport("Executor worker has exited".to_string()))?;

        let answer = match self.config.timeout {
            Some(timeout) => results.recv_timeout(timeout).map_err(|error| match error {
                RecvTimeoutError::Timeout => {
                    self.lost = true;
                    Error::Transport(format!(
                        "Decrypter {decrypter} did not answer within {timeout:?}"
                    ))
                }
                RecvTimeoutError::Disconnected => {
                    Error::Transport("Executor worker has exited".to_string())
                }
            })?,
            None => results
                .recv()
                .map_err(|_| Error::Transport("Executor worker has exited".to_string()))?,
        };

        answer.ok_or_else(|| Error::Transport(format!("Executor has no decrypter {decrypter}")))
    }
}

impl Drop for IsolatedExecutor {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if self.lost {
                // A hung decrypter would block the join forever
                return;
            }
            if worker.join().is_err() {
                log::warn!("Decrypter executor worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor(timeout: Option<Duration>) -> IsolatedExecutor {
        let mut decrypters: HashMap<i32, DecryptFn> = HashMap::new();
        decrypters.insert(
            1,
            Box::new(|args| {
                args.first()
                    .and_then(ConstValue::as_i32)
                    .map(|x| ConstValue::I32(x * 2 + 1))
            }),
        );
        decrypters.insert(
            2,
            Box::new(|args| {
                let x = args.first().and_then(ConstValue::as_i32)?;
                if x == 0 {
                    panic!("division by zero");
                }
                Some(ConstValue::String(format!("s{}", 100 / x)))
            }),
        );
        decrypters.insert(
            3,
            Box::new(|_| {
                thread::sleep(Duration::from_millis(500));
                Some(ConstValue::Null)
            }),
        );
        IsolatedExecutor::spawn(
            decrypters,
            ExecutorConfig { timeout },
        )
        .unwrap()
    }

    #[test]
    fn test_results_in_request_order() {
        let mut executor = executor(None);
        let batch = vec![
            vec![ConstValue::I32(3)],
            vec![ConstValue::I32(5)],
            vec![ConstValue::String("x".into())],
        ];
        let results = executor.decrypt(1, batch, Token::new(0x06000001)).unwrap();
        assert_eq!(
            results,
            vec![ConstValue::I32(7), ConstValue::I32(11), ConstValue::Null]
        );
    }

    #[test]
    fn test_panic_is_null() {
        let mut executor = executor(None);
        let batch = vec![vec![ConstValue::I32(0)], vec![ConstValue::I32(4)]];
        let results = executor.decrypt(2, batch, Token::new(0x06000001)).unwrap();
        assert_eq!(
            results,
            vec![ConstValue::Null, ConstValue::String("s25".into())]
        );

        // The worker survives
        let results = executor
            .decrypt(1, vec![vec![ConstValue::I32(1)]], Token::new(0x06000001))
            .unwrap();
        assert_eq!(results, vec![ConstValue::I32(3)]);
    }

    #[test]
    fn test_unknown_decrypter() {
        let mut executor = executor(None);
        let error = executor
            .decrypt(9, vec![vec![]], Token::new(0x06000001))
            .unwrap_err();
        assert!(matches!(error, Error::Transport(_)));
    }

    #[test]
    fn test_timeout() {
        let mut executor = executor(Some(Duration::from_millis(20)));
        let error = executor
            .decrypt(3, vec![vec![]], Token::new(0x06000001))
            .unwrap_err();
        assert!(matches!(error, Error::Transport(_)));

        let error = executor
            .decrypt(1, vec![vec![ConstValue::I32(1)]], Token::new(0x06000001))
            .unwrap_err();
        assert!(matches!(error, Error::Transport(_)));
    }
}
