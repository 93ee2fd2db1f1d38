use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which covers every failure this library can surface to a caller.
///
/// Note that symbolic evaluation of a decrypter never produces an [`Error`]: a decrypter whose
/// result cannot be determined is reported as a skipped call site through
/// [`crate::emulation::SkipReason`]. Errors are reserved for conditions where continuing would
/// produce *wrong* output rather than merely incomplete output.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Malformed`] - Corrupted IL stream or inconsistent metadata
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of an IL stream
/// - [`Error::InvalidToken`] - A token does not point at a row of the expected table
///
/// ## Resolution Errors
/// - [`Error::Unresolvable`] - A type, field or method reference has no concrete target
///
/// ## Inlining Errors
/// - [`Error::BatchMismatch`] - An out-of-process batch returned the wrong number of results
/// - [`Error::Transport`] - The out-of-process executor failed or timed out
/// - [`Error::Registration`] - A decrypter could not be registered
///
/// ## Synchronisation
/// - [`Error::LockError`] - A lock guarding shared state was poisoned
///
/// # Examples
///
/// ```rust
/// use dotinline::{Error, metadata::token::Token};
///
/// let err = Error::Unresolvable {
///     reference: "System.String Crypto.Strings::Get(System.Int32)".to_string(),
///     token: Token::new(0x0A000004),
/// };
/// assert!(err.to_string().contains("0x0a000004"));
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged and could not be interpreted.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while decoding an IL stream.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// A token did not reference a valid row of the table it was expected to reference.
    #[error("Invalid token {0} for this module")]
    InvalidToken(Token),

    /// A member reference could not be mapped to a concrete definition.
    ///
    /// Carries the textual form of the reference and its raw metadata token so the
    /// failing reference can be located in the original binary.
    #[error("Unable to resolve {reference} ({token})")]
    Unresolvable {
        /// Display form of the offending reference
        reference: String,
        /// Raw metadata token of the offending reference
        token: Token,
    },

    /// The out-of-process executor answered a batch with a different number of results
    /// than requests were sent.
    ///
    /// There is no safe partial recovery: the correspondence between results and call
    /// sites cannot be reconstructed, so none of the batch is applied.
    #[error("Decrypter {decrypter} returned {actual} results for {expected} requests")]
    BatchMismatch {
        /// The decrypter id of the failing batch
        decrypter: i32,
        /// Number of requests sent
        expected: usize,
        /// Number of results received
        actual: usize,
    },

    /// The transport to the out-of-process executor failed.
    #[error("Decrypter transport failed - {0}")]
    Transport(String),

    /// A decrypter registration was rejected.
    #[error("Decrypter registration failed - {0}")]
    Registration(String),

    /// Failed to lock target.
    #[error("Failed to lock target - {0}")]
    LockError(String),
}
