//! Board-agnostic core logic for the cfgpage flash driver
//!
//! This crate contains everything that does not depend on a specific
//! flash peripheral:
//!
//! - Memory map of the logical flash regions
//! - Address validation against the part's flash bounds
//! - Region writer (unlock, erase one page, program, lock)
//! - Config page and RO constants record codec

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

#[macro_use]
mod fmt;

pub mod config;
pub mod memory_map;
pub mod validator;
pub mod writer;

pub use config::{ConfigLayout, ConfigRecord, ConfigStore, PortParams, RoConstants, Version};
pub use memory_map::{FlashRegion, LayoutConfig, MemoryMap, RegionPurpose};
pub use validator::FlashBounds;
pub use writer::{FlashWriter, WriteOutcome, DEFAULT_ADDRESS};
