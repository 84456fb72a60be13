//! Provider interaction support: retry with backoff and error classification.
//!
//! Everything between the [`draft`](crate::draft) pipeline and the
//! chat-completions API that is not the HTTP call itself:
//!
//! - [`retry`] — transient error detection (429, 5xx, network timeouts) with
//!   configurable exponential backoff and jitter, plus rate-limit
//!   classification so callers can surface HTTP 429 distinctly. Never
//!   retries 400/401 errors.

pub mod retry;

pub use retry::RetryConfig;
