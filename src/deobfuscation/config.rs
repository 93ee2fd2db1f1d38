//! Configuration for the call-site inliner.

use crate::emulation::DEFAULT_MAX_STEPS;

/// Configuration for the call-site inliner.
///
/// Controls the emulation budget of the static strategy and how results are applied to
/// call sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinerConfig {
    /// Maximum instructions the built-in emulated handler executes per call site
    /// (default: 50).
    pub max_emulation_steps: usize,

    /// Absorb a `castclass`/`isinst System.String` or `call String::Intern` directly
    /// following a call whose result is a string (default: true).
    pub remove_string_casts: bool,

    /// Replace call sites whose decrypter returned `null` with `ldnull` (default: false).
    ///
    /// Executors report failures as `null`, so by default such sites are left alone.
    pub inline_null_results: bool,
}

impl Default for InlinerConfig {
    fn default() -> Self {
        Self {
            max_emulation_steps: DEFAULT_MAX_STEPS,
            remove_string_casts: true,
            inline_null_results: false,
        }
    }
}

impl InlinerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the emulation step budget.
    #[must_use]
    pub fn with_max_emulation_steps(mut self, steps: usize) -> Self {
        self.max_emulation_steps = steps;
        self
    }

    /// Enables or disables absorption of string casts and interning.
    #[must_use]
    pub fn with_remove_string_casts(mut self, enabled: bool) -> Self {
        self.remove_string_casts = enabled;
        self
    }

    /// Enables or disables inlining of `null` results.
    #[must_use]
    pub fn with_inline_null_results(mut self, enabled: bool) -> Self {
        self.inline_null_results = enabled;
        self
    }
}
