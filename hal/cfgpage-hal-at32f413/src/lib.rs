//! AT32F413-specific HAL for cfgpage
//!
//! This crate provides the AT32F413 implementation of the
//! `cfgpage-hal` flash controller capability on top of the
//! `at32f4xx-pac` register definitions.
//!
//! # Features
//!
//! - `defmt` - Enable debug formatting support
//!
//! # Usage
//!
//! ```ignore
//! let p = pac::Peripherals::take().unwrap();
//! let flash = At32Flash::new(p.FLASH);
//! let mut store = ConfigStore::new(flash, ConfigLayout::WithBusSpeed).unwrap();
//! let config = store.read_config();
//! ```

#![no_std]

pub use at32f4xx_pac::at32f413 as pac;

pub mod flash;

pub use flash::At32Flash;

// Re-export shared types from cfgpage-hal
pub use cfgpage_hal::{FlashController, FlashGeometry, FlashStatus};
