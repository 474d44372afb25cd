//! Storage for listener state.
//!
//! The in-memory backend is always available; the `persistent` feature adds a
//! write-ahead journal that survives restarts.

mod memory;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::InMemoryExpressionStore;
pub use traits::{ExpressionStore, StorageError};
