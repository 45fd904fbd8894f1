// =============================================================================
// Engine error taxonomy
// =============================================================================
//
// Most fallible paths in this crate return `anyhow::Result` — I/O, parsing,
// and venue-call failures carry enough context as opaque chained errors.
// `EngineError` is reserved for the smaller set of conditions that must be
// distinguished by *kind* at the call site (the Supervisor decides whether to
// retry, degrade, or halt based on which variant it sees), per the taxonomy:
// transient / auth-or-shape / rate-limited / validation-rejected /
// consistency-violated / protocol-violated.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transient venue error for {operation}: {source}")]
    Transient {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("venue rejected request ({operation}): {reason}")]
    Rejected { operation: String, reason: String },

    #[error("rate limit exhausted for {operation}")]
    RateLimited { operation: String },

    #[error("circuit breaker open for {operation}")]
    BreakerOpen { operation: String },

    #[error("internal consistency violation: {0}")]
    Consistency(String),

    #[error("protocol violation from venue: {0}")]
    Protocol(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient { .. })
    }
}
