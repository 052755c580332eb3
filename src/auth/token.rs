//! Token cache items, their keys, and the secret wrapper.

pub mod item;
pub mod key;
pub mod secret;
