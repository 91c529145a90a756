//! Response caching for chat models.
//!
//! Responses are keyed by a SHA-256 digest of the model id, the prompt and
//! the canonicalized request parameters.

mod key;
mod store;

pub use key::CacheKey;
pub use store::{CacheEntry, ClearFilter, ResponseCache};
