//! Wrappers adding behavior to an existing chat model.

mod cached;
mod historized;

pub use cached::CachedChatModel;
pub use historized::HistorizedChatModel;
