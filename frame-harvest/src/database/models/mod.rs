//! Database models.

mod category;
mod frame;

pub use category::*;
pub use frame::*;
