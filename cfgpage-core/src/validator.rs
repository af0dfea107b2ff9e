//! Flash address validation
//!
//! Bounds come from the part's [`FlashGeometry`], whose size is read from
//! the silicon identification memory by the chip HAL.

use cfgpage_hal::FlashGeometry;

/// Inclusive address range of the physically present flash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashBounds {
    /// First byte of page 0
    pub first: u32,
    /// Last byte of the last page
    pub last: u32,
    page_size: u32,
}

impl FlashBounds {
    /// Derive bounds from a part's geometry
    pub const fn new(geometry: FlashGeometry) -> Self {
        Self {
            first: geometry.base,
            last: geometry.base + geometry.size - 1,
            page_size: geometry.page_size,
        }
    }

    /// Check if `address` lies inside flash
    pub const fn validate(&self, address: u32) -> bool {
        address >= self.first && address <= self.last
    }

    /// Check if all `len` bytes starting at `address` lie inside flash
    ///
    /// An empty range always fits.
    pub fn contains_range(&self, address: u32, len: usize) -> bool {
        let Ok(len) = u32::try_from(len) else {
            return false;
        };
        match len.checked_sub(1) {
            None => true,
            Some(extra) => address
                .checked_add(extra)
                .is_some_and(|end| self.validate(address) && end <= self.last),
        }
    }

    /// Start of the page containing `address`
    ///
    /// Only meaningful for addresses that pass [`validate`](Self::validate).
    pub const fn page_start(&self, address: u32) -> u32 {
        self.first + (address - self.first) / self.page_size * self.page_size
    }

    /// Start of the last flash page, the default write location
    pub const fn last_page_start(&self) -> u32 {
        self.last - self.page_size + 1
    }

    /// Erase page size in bytes
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }
}

impl From<FlashGeometry> for FlashBounds {
    fn from(geometry: FlashGeometry) -> Self {
        Self::new(geometry)
    }
}
