//! GD32F103-specific HAL for cfgpage
//!
//! This crate provides the GD32F103 implementation of the shared
//! `cfgpage-hal` flash controller capability:
//!
//! - FMC bank 0 unlock/lock, page erase, halfword and word programming
//! - Flash size detection from the device identification area
//! - Memory-mapped reads
//!
//! ```ignore
//! let p = pac::Peripherals::take().unwrap();
//! let fmc = Gd32Fmc::new(p.FMC);
//! let store = ConfigStore::new(fmc, ConfigLayout::Compact).unwrap();
//! ```

#![no_std]

pub use gd32f1::gd32f103 as pac;

pub mod flash;

pub use flash::Gd32Fmc;

// Re-export shared traits from cfgpage-hal for convenience
pub use cfgpage_hal::{FlashController, FlashGeometry, FlashStatus};
