//! Core domain model and contracts for aionex.

pub mod error;
pub mod file_state;
pub mod history;
pub mod memory;
pub mod protocol;
pub mod store;
pub mod tree;
pub mod util;

pub use error::{Error, Result};
pub use protocol::*;
