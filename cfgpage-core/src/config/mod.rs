//! Config page and RO constants
//!
//! Fixed-layout records stored as 32-bit words in their own flash pages.

pub mod record;
pub mod store;

pub use record::*;
pub use store::ConfigStore;
