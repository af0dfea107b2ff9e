//! Flash memory map
//!
//! Logical regions of the program flash, laid out from page 0:
//!
//! | Region         | Offset            | Size     |
//! |----------------|-------------------|----------|
//! | Bootloader     | 0                 | 28 KB    |
//! | MainProgram    | +28 KB            | 48 KB    |
//! | DownloadBuffer | +76 KB            | 48 KB    |
//! | ConfigPage     | +124 KB           | 2 KB     |
//! | RoConstants    | +126 KB           | 2 KB     |
//! | Unused         | to end of flash   | rest     |
//!
//! At `0x0800_0000` this puts the config page at `0x0801_F000` and the RO
//! constants at `0x0801_F800` on every part. The two record slots are
//! 2 KB even on 1 KB page parts, where each slot spans two pages and only
//! the first one holds data.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use cfgpage_hal::FlashGeometry;

/// Minimum size of the config page and RO constants slots
pub const RECORD_SLOT_SIZE: u32 = 2 * 1024;

/// Purpose of a flash region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RegionPurpose {
    /// Bootloader image
    Bootloader,
    /// Running application image
    MainProgram,
    /// Staging area for a downloaded application image
    DownloadBuffer,
    /// Mutable module parameters
    ConfigPage,
    /// Manufacturing-time identity data
    RoConstants,
    /// Everything after the RO constants
    Unused,
}

/// A contiguous flash region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashRegion {
    /// First address of the region
    pub start: u32,
    /// Size in bytes
    pub size: u32,
    /// What the region holds
    pub purpose: RegionPurpose,
}

impl FlashRegion {
    /// First address past the region
    pub const fn end(&self) -> u32 {
        self.start + self.size
    }

    /// Check if `address` falls inside the region
    pub const fn contains(&self, address: u32) -> bool {
        address >= self.start && address < self.end()
    }
}

/// Sizes of the image regions in KB
///
/// The config page and RO constants always take one record slot each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayoutConfig {
    /// Bootloader size in KB
    pub bootloader_kb: u32,
    /// Main program size in KB
    pub main_program_kb: u32,
    /// Download buffer size in KB
    pub download_buffer_kb: u32,
}

impl LayoutConfig {
    /// Layout used by the AT32F413 and GD32F103 modules
    pub const DEFAULT: Self = Self {
        bootloader_kb: 28,
        main_program_kb: 48,
        download_buffer_kb: 48,
    };
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Region table for one part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MemoryMap {
    regions: [FlashRegion; 6],
}

impl MemoryMap {
    /// Lay out the regions over `geometry`
    pub const fn new(geometry: FlashGeometry, layout: LayoutConfig) -> Self {
        let bootloader = FlashRegion {
            start: geometry.base,
            size: layout.bootloader_kb * 1024,
            purpose: RegionPurpose::Bootloader,
        };
        let main_program = FlashRegion {
            start: bootloader.end(),
            size: layout.main_program_kb * 1024,
            purpose: RegionPurpose::MainProgram,
        };
        let download_buffer = FlashRegion {
            start: main_program.end(),
            size: layout.download_buffer_kb * 1024,
            purpose: RegionPurpose::DownloadBuffer,
        };
        let slot_size = record_slot_size(geometry.page_size);
        let config_page = FlashRegion {
            start: download_buffer.end(),
            size: slot_size,
            purpose: RegionPurpose::ConfigPage,
        };
        let ro_constants = FlashRegion {
            start: config_page.end(),
            size: slot_size,
            purpose: RegionPurpose::RoConstants,
        };
        let unused = FlashRegion {
            start: ro_constants.end(),
            size: geometry.end().saturating_sub(ro_constants.end()),
            purpose: RegionPurpose::Unused,
        };

        Self {
            regions: [
                bootloader,
                main_program,
                download_buffer,
                config_page,
                ro_constants,
                unused,
            ],
        }
    }

    /// Memory map with [`LayoutConfig::DEFAULT`]
    pub const fn with_default_layout(geometry: FlashGeometry) -> Self {
        Self::new(geometry, LayoutConfig::DEFAULT)
    }

    /// All regions in address order
    pub const fn regions(&self) -> [FlashRegion; 6] {
        self.regions
    }

    /// Look up a region by purpose
    pub const fn region(&self, purpose: RegionPurpose) -> FlashRegion {
        let index = match purpose {
            RegionPurpose::Bootloader => 0,
            RegionPurpose::MainProgram => 1,
            RegionPurpose::DownloadBuffer => 2,
            RegionPurpose::ConfigPage => 3,
            RegionPurpose::RoConstants => 4,
            RegionPurpose::Unused => 5,
        };
        self.regions[index]
    }

    /// The config page region
    pub const fn config_page(&self) -> FlashRegion {
        self.region(RegionPurpose::ConfigPage)
    }

    /// The RO constants region
    pub const fn ro_constants(&self) -> FlashRegion {
        self.region(RegionPurpose::RoConstants)
    }

    /// Find the region holding `address`
    pub fn purpose_of(&self, address: u32) -> Option<RegionPurpose> {
        self.regions
            .iter()
            .find(|region| region.contains(address))
            .map(|region| region.purpose)
    }

    /// Check that every region up to the RO constants lies inside flash
    pub const fn fits(&self, geometry: &FlashGeometry) -> bool {
        self.ro_constants().end() <= geometry.end()
    }
}

/// Size of a record slot: [`RECORD_SLOT_SIZE`], or one page if pages are
/// larger
const fn record_slot_size(page_size: u32) -> u32 {
    if page_size > RECORD_SLOT_SIZE {
        page_size
    } else {
        RECORD_SLOT_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfgpage_hal::flash::FLASH_BASE;

    fn map_256k() -> MemoryMap {
        MemoryMap::with_default_layout(FlashGeometry::from_size_kb(FLASH_BASE, 256))
    }

    #[test]
    fn test_documented_addresses() {
        let map = map_256k();
        assert_eq!(map.region(RegionPurpose::Bootloader).start, 0x0800_0000);
        assert_eq!(map.region(RegionPurpose::MainProgram).start, 0x0800_7000);
        assert_eq!(map.region(RegionPurpose::DownloadBuffer).start, 0x0801_3000);
        assert_eq!(map.config_page().start, 0x0801_F000);
        assert_eq!(map.ro_constants().start, 0x0801_F800);
        assert_eq!(map.config_page().size, 2048);
    }

    #[test]
    fn test_regions_are_contiguous() {
        let regions = map_256k().regions();
        for pair in regions.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start);
        }
        assert_eq!(regions[5].end(), 0x0804_0000);
    }

    #[test]
    fn test_small_page_part() {
        let geometry = FlashGeometry::from_size_kb(FLASH_BASE, 128);
        let map = MemoryMap::with_default_layout(geometry);
        assert_eq!(map.config_page().start, 0x0801_F000);
        assert_eq!(map.config_page().size, 2048);
        assert_eq!(map.ro_constants().start, 0x0801_F800);
        assert_eq!(map.ro_constants().end(), geometry.end());
        assert!(map.fits(&geometry));
        assert_eq!(map.region(RegionPurpose::Unused).size, 0);
    }

    #[test]
    fn test_part_too_small_for_layout() {
        let geometry = FlashGeometry::from_size_kb(FLASH_BASE, 64);
        let map = MemoryMap::with_default_layout(geometry);
        assert!(!map.fits(&geometry));
        assert_eq!(map.region(RegionPurpose::Unused).size, 0);
    }

    #[test]
    fn test_record_slot_grows_with_large_pages() {
        assert_eq!(record_slot_size(1024), RECORD_SLOT_SIZE);
        assert_eq!(record_slot_size(2048), RECORD_SLOT_SIZE);
        assert_eq!(record_slot_size(4096), 4096);
    }

    #[test]
    fn test_purpose_of() {
        let map = map_256k();
        assert_eq!(map.purpose_of(0x0800_0000), Some(RegionPurpose::Bootloader));
        assert_eq!(map.purpose_of(0x0801_F004), Some(RegionPurpose::ConfigPage));
        assert_eq!(map.purpose_of(0x0801_F7FF), Some(RegionPurpose::ConfigPage));
        assert_eq!(map.purpose_of(0x0801_F800), Some(RegionPurpose::RoConstants));
        assert_eq!(map.purpose_of(0x0803_FFFF), Some(RegionPurpose::Unused));
        assert_eq!(map.purpose_of(0x0804_0000), None);
        assert_eq!(map.purpose_of(0x0000_0000), None);
    }
}
