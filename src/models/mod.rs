//! Core data models shared by the crawler, storage and cycle layers.

mod feed;
mod summary;

pub use feed::*;
pub use summary::*;
