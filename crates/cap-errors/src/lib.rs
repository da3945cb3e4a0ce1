//! Stable error taxonomy for the capabilities core, grounded on the
//! teacher's `thiserror`-derived enum style (`bpi_receipts::ReceiptError`,
//! `bpi_vrf::VrfError`): one variant per stable ASCII code, carrying enough
//! structure for a caller to decide whether to retry.

use cap_enc::{ToValue, Value};
use std::fmt;
use thiserror::Error;

mod diagnostics;

pub use diagnostics::{sanitize_value, Diagnostics};

/// Stable ASCII error codes from spec.md §4.3 / §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum CapErrorKind {
    #[error("CAP_ERROR")]
    CapError,
    #[error("NOT_DETERMINISTIC")]
    NotDeterministic,
    #[error("LIMIT_EXCEEDED")]
    LimitExceeded,
    #[error("NO_RESULT_YET")]
    NoResultYet,
    #[error("ATTESTATION_ERROR")]
    AttestationError,
    #[error("CODEC_ERROR")]
    CodecError,
    #[error("INVALID_INPUT")]
    InvalidInput,
}

impl CapErrorKind {
    pub const fn code(self) -> &'static str {
        match self {
            CapErrorKind::CapError => "CAP_ERROR",
            CapErrorKind::NotDeterministic => "NOT_DETERMINISTIC",
            CapErrorKind::LimitExceeded => "LIMIT_EXCEEDED",
            CapErrorKind::NoResultYet => "NO_RESULT_YET",
            CapErrorKind::AttestationError => "ATTESTATION_ERROR",
            CapErrorKind::CodecError => "CODEC_ERROR",
            CapErrorKind::InvalidInput => "INVALID_INPUT",
        }
    }

    /// Whether this kind is, by default, a retryable condition. `NO_RESULT_YET`
    /// is always retryable; everything else defaults to non-retryable but a
    /// specific [`CapError`] instance may override this.
    pub const fn default_retryable(self) -> bool {
        matches!(self, CapErrorKind::NoResultYet)
    }
}

/// A taxonomy error: `{code, message, details (sanitized), retryable}` per
/// spec.md §4.3, propagated unchanged from providers to the VM boundary.
#[derive(Debug, Clone)]
pub struct CapError {
    pub kind: CapErrorKind,
    pub message: String,
    pub details: Vec<(String, Value)>,
    pub retryable: bool,
    pub retry_after_blocks: Option<u64>,
}

impl CapError {
    pub fn new(kind: CapErrorKind, message: impl Into<String>) -> Self {
        Self {
            retryable: kind.default_retryable(),
            kind,
            message: message.into(),
            details: Vec::new(),
            retry_after_blocks: None,
        }
    }

    pub fn cap_error(message: impl Into<String>) -> Self {
        Self::new(CapErrorKind::CapError, message)
    }

    pub fn not_deterministic(message: impl Into<String>) -> Self {
        Self::new(CapErrorKind::NotDeterministic, message)
    }

    pub fn limit_exceeded(message: impl Into<String>) -> Self {
        Self::new(CapErrorKind::LimitExceeded, message)
    }

    pub fn no_result_yet(retry_after_blocks: u64) -> Self {
        let mut err = Self::new(CapErrorKind::NoResultYet, "result not available yet");
        err.retry_after_blocks = Some(retry_after_blocks);
        err
    }

    pub fn attestation_error(message: impl Into<String>) -> Self {
        Self::new(CapErrorKind::AttestationError, message)
    }

    pub fn codec_error(message: impl Into<String>) -> Self {
        Self::new(CapErrorKind::CodecError, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(CapErrorKind::InvalidInput, message)
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl ToValue) -> Self {
        self.details.push((key.into(), value.to_value()));
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Wraps an arbitrary, unexpected failure the way
    /// `ProviderRegistry::call` does for spec.md §7's "Unexpected" category:
    /// the taxonomy code is always `CAP_ERROR`, never retryable by default,
    /// and the original cause is sanitized into `details.cause`.
    pub fn unexpected(provider_key: &str, cause: impl fmt::Display) -> Self {
        Self::cap_error(format!("unexpected error in provider {provider_key}"))
            .with_detail("cause", sanitize_cause(cause))
            .with_retryable(false)
    }

    pub fn no_provider(key: &str) -> Self {
        Self::cap_error(format!("no provider registered for {key}")).with_retryable(false)
    }
}

fn sanitize_cause(cause: impl fmt::Display) -> Value {
    let text = cause.to_string();
    Value::Text(diagnostics::truncate_str(&text, diagnostics::DEFAULT_STRING_CAP))
}

impl fmt::Display for CapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for CapError {}

impl From<cap_enc::CodecError> for CapError {
    fn from(err: cap_enc::CodecError) -> Self {
        CapError::codec_error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_result_yet_is_retryable_by_default() {
        let err = CapError::no_result_yet(3);
        assert!(err.retryable);
        assert_eq!(err.retry_after_blocks, Some(3));
    }

    #[test]
    fn cap_error_is_not_retryable_by_default() {
        let err = CapError::cap_error("boom");
        assert!(!err.retryable);
    }

    #[test]
    fn unexpected_wraps_into_cap_error() {
        let err = CapError::unexpected("zk.verify", "panic in adapter");
        assert_eq!(err.kind.code(), "CAP_ERROR");
        assert!(err.message.contains("zk.verify"));
    }
}
