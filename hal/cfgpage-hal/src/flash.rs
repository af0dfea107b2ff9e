//! Flash controller abstractions
//!
//! Provides the capability interface that chip-specific HALs implement on
//! top of their flash peripheral. Flash on these parts is memory mapped, so
//! only erase and program need peripheral sequencing; reads go straight to
//! the array.

/// Start of the main flash array on the supported Cortex-M parts
pub const FLASH_BASE: u32 = 0x0800_0000;

/// Value of every byte after a page erase
pub const ERASED_BYTE: u8 = 0xFF;

/// Status reported by a single peripheral operation
///
/// This keeps the full vendor detail. The writer in `cfgpage-core`
/// collapses everything except [`FlashStatus::Done`] into one error value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashStatus {
    /// Operation completed
    Done,
    /// Peripheral still busy when polling gave up
    Busy,
    /// Programming error (target not erased or misaligned)
    ProgramError,
    /// Write/erase protection error
    WriteProtectError,
    /// Polling loop count exhausted
    Timeout,
}

impl FlashStatus {
    /// Check if the operation completed successfully
    pub const fn is_done(self) -> bool {
        matches!(self, FlashStatus::Done)
    }
}

/// Programming granularity of a single program call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UnitSize {
    /// 16-bit halfword
    HalfWord,
    /// 32-bit word
    Word,
}

impl UnitSize {
    /// Size of one unit in bytes
    pub const fn bytes(self) -> u32 {
        match self {
            UnitSize::HalfWord => 2,
            UnitSize::Word => 4,
        }
    }
}

/// Physical layout of a part's main flash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashGeometry {
    /// Address of page 0
    pub base: u32,
    /// Total flash size in bytes
    pub size: u32,
    /// Erase page (sector) size in bytes
    pub page_size: u32,
}

impl FlashGeometry {
    /// Create a geometry from explicit values
    pub const fn new(base: u32, size: u32, page_size: u32) -> Self {
        Self {
            base,
            size,
            page_size,
        }
    }

    /// Create a geometry from the flash size in KB, as reported by the
    /// silicon identification memory
    ///
    /// Parts with up to 128 KB of flash use 1 KB pages, larger ones 2 KB.
    pub const fn from_size_kb(base: u32, size_kb: u16) -> Self {
        let size = size_kb as u32 * 1024;
        Self::new(base, size, page_size_for(size))
    }

    /// First address past the end of flash
    pub const fn end(&self) -> u32 {
        self.base + self.size
    }

    /// Number of erase pages
    pub const fn page_count(&self) -> u32 {
        self.size / self.page_size
    }
}

/// Page size for a flash array of `flash_size` bytes
pub const fn page_size_for(flash_size: u32) -> u32 {
    if flash_size <= 128 * 1024 {
        1024
    } else {
        2048
    }
}

/// Flash controller capability
///
/// Implemented by chip-specific HALs. Every method is blocking: erase and
/// program poll the peripheral until it reports completion, an error or
/// the implementation's own timeout.
///
/// Implementations are not reentrant. Calling into the same peripheral
/// from an interrupt while a write sequence holds it unlocked is undefined.
pub trait FlashController {
    /// Layout of the flash array this controller drives
    fn geometry(&self) -> FlashGeometry;

    /// Remove write protection from the program/erase control register
    fn unlock(&mut self);

    /// Restore write protection
    fn lock(&mut self);

    /// Erase the page starting at `page_address`
    fn erase_page(&mut self, page_address: u32) -> FlashStatus;

    /// Program one halfword at a 2-byte aligned address
    fn program_halfword(&mut self, address: u32, value: u16) -> FlashStatus;

    /// Program one word at a 4-byte aligned address
    fn program_word(&mut self, address: u32, value: u32) -> FlashStatus;

    /// Copy bytes out of the memory-mapped flash array
    ///
    /// `address..address + buf.len()` must lie within the flash array.
    fn read(&self, address: u32, buf: &mut [u8]);
}

impl<T: FlashController + ?Sized> FlashController for &mut T {
    fn geometry(&self) -> FlashGeometry {
        (**self).geometry()
    }

    fn unlock(&mut self) {
        (**self).unlock()
    }

    fn lock(&mut self) {
        (**self).lock()
    }

    fn erase_page(&mut self, page_address: u32) -> FlashStatus {
        (**self).erase_page(page_address)
    }

    fn program_halfword(&mut self, address: u32, value: u16) -> FlashStatus {
        (**self).program_halfword(address, value)
    }

    fn program_word(&mut self, address: u32, value: u32) -> FlashStatus {
        (**self).program_word(address, value)
    }

    fn read(&self, address: u32, buf: &mut [u8]) {
        (**self).read(address, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_from_size_kb_large_part() {
        let geometry = FlashGeometry::from_size_kb(FLASH_BASE, 256);
        assert_eq!(geometry.size, 256 * 1024);
        assert_eq!(geometry.page_size, 2048);
        assert_eq!(geometry.end(), 0x0804_0000);
        assert_eq!(geometry.page_count(), 128);
    }

    #[test]
    fn test_geometry_from_size_kb_small_part() {
        let geometry = FlashGeometry::from_size_kb(FLASH_BASE, 64);
        assert_eq!(geometry.page_size, 1024);
        assert_eq!(geometry.page_count(), 64);
    }

    #[test]
    fn test_unit_size_bytes() {
        assert_eq!(UnitSize::HalfWord.bytes(), 2);
        assert_eq!(UnitSize::Word.bytes(), 4);
    }

    #[test]
    fn test_status_is_done() {
        assert!(FlashStatus::Done.is_done());
        assert!(!FlashStatus::Busy.is_done());
        assert!(!FlashStatus::ProgramError.is_done());
        assert!(!FlashStatus::WriteProtectError.is_done());
        assert!(!FlashStatus::Timeout.is_done());
    }
}
