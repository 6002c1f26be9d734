pub mod async_helpers;
pub mod fingerprint;

pub use async_helpers::with_timeout;
pub use fingerprint::{content_hash, short_hash};
