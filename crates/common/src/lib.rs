//! Shared record types used across the `crypt` and `blobstore` crates.

pub mod value;

pub use value::{Payload, Value, Whitelist};
