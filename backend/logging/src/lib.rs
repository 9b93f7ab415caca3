//! Structured logging for the locshare relay.
//!
//! Console output, optional daily-rolling JSON files, and masking of session
//! tokens before they reach a log line.

pub mod logger;
pub mod redact;

pub use logger::init_logger;
pub use redact::mask_token;
