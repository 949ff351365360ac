//! AES-GCM token encryption primitives and selective-field payload encryption.
//!
//! This crate is intentionally free of AWS and network dependencies.
//!
//! # Token format
//!
//! ```text
//! base64(ciphertext)|$|base64(iv)|$|base64(tag)
//! ```
//!
//! Standard base64 with padding is used for every part. The separator can
//! never occur inside base64 output, so splitting is unambiguous.

pub mod cipher;
pub mod keyring;
pub mod payload;
pub mod token;

pub use cipher::{CipherCodec, CipherError};
pub use keyring::KeyRing;
pub use payload::{PayloadCodec, PayloadError, ENCRYPTED_PAYLOAD};
pub use token::EncryptedToken;
