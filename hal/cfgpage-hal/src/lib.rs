//! cfgpage Hardware Abstraction Layer
//!
//! This crate defines the flash controller capability that chip-specific
//! HALs (AT32F413, GD32F103, etc.) implement. The region writer and the
//! configuration codec in `cfgpage-core` are written once against these
//! traits instead of once per part.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  cfgpage-core (writer, config codec)    │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  cfgpage-hal (this crate - traits)      │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ cfgpage-hal-  │       │ cfgpage-hal-  │
//! │   at32f413    │       │   gd32f103    │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`flash::FlashController`] - Unlock/lock, page erase, halfword and word
//!   programming, memory-mapped reads
//!
//! With the `std` feature, [`mock::MockFlash`] provides an in-memory model
//! of a flash array for host tests.

#![no_std]
#![deny(unsafe_code)]

#[cfg(feature = "std")]
extern crate std;

pub mod flash;
#[cfg(feature = "std")]
pub mod mock;

// Re-export key types at crate root for convenience
pub use flash::{FlashController, FlashGeometry, FlashStatus, UnitSize};
