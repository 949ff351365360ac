//! Structured logging setup.
//!
//! Object keys and bucket names may appear in log fields. Plaintext, tokens
//! and key material never do.

pub mod init;

pub use init::init_tracing;
