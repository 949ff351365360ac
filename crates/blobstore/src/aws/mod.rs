//! AWS S3 implementation of the blob-store session.

pub mod session;

pub use session::S3Session;
