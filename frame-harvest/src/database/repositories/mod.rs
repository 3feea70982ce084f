//! Repository layer for database access.
//!
//! `CatalogRepository` is the public surface; the `*TxOps` helpers hold the
//! individual statements and run inside a caller-owned transaction.

pub mod catalog;
pub mod category_tx;
pub mod frame_tx;

pub use catalog::*;
pub use category_tx::*;
pub use frame_tx::*;
