//! Flash controller driver for AT32F413
//!
//! Registers are driven through the `at32f4xx-pac` FLASH block. AT32F413 parts with more
//! than 128 KB of flash use 2 KB sectors, smaller ones 1 KB. The flash size
//! in KB is read from the device identification area at `0x1FFF_F7E0`.

use core::ptr;

use cfgpage_hal::flash::FLASH_BASE;
use cfgpage_hal::{FlashController, FlashGeometry, FlashStatus};

use crate::pac;

/// Flash size in KB (16 bit), device identification area
const FLASH_SIZE_REG: usize = 0x1FFF_F7E0;

/// Unlock key sequence
const KEY1: u32 = 0x4567_0123;
const KEY2: u32 = 0xCDEF_89AB;

/// STS bits
const STS_OBF: u32 = 1 << 0; // operation busy
const STS_PRGMERR: u32 = 1 << 2;
const STS_EPPERR: u32 = 1 << 4; // erase/program protection
const STS_ODF: u32 = 1 << 5; // operation done

/// Poll counts before giving up, as in the vendor library
pub const ERASE_TIMEOUT: u32 = 0x1000_0000;
pub const PROGRAMMING_TIMEOUT: u32 = 0x0010_0000;

/// AT32F413 flash controller
///
/// Owns the FLASH peripheral.
pub struct At32Flash {
    flash: pac::FLASH,
    geometry: FlashGeometry,
}

impl At32Flash {
    /// Wrap the FLASH peripheral, sizing it from the device identification
    /// area
    pub fn new(flash: pac::FLASH) -> Self {
        Self::with_size_kb(flash, flash_size_kb())
    }

    /// Wrap the FLASH peripheral with an explicit flash size
    ///
    /// For parts whose identification area does not match the usable
    /// flash.
    pub fn with_size_kb(flash: pac::FLASH, size_kb: u16) -> Self {
        Self {
            flash,
            geometry: FlashGeometry::from_size_kb(FLASH_BASE, size_kb),
        }
    }

    /// Release the FLASH peripheral
    pub fn free(self) -> pac::FLASH {
        self.flash
    }

    fn clear_flags(&mut self) {
        // Write-1-to-clear
        self.flash
            .sts()
            .write(|w| unsafe { w.bits(STS_ODF | STS_PRGMERR | STS_EPPERR) });
    }

    fn wait(&mut self, timeout: u32) -> FlashStatus {
        let status = wait_for(|| self.flash.sts().read().bits(), timeout);
        self.clear_flags();
        status
    }

    fn program(&mut self, store: impl FnOnce()) -> FlashStatus {
        let mut status = self.wait(PROGRAMMING_TIMEOUT);
        if status.is_done() {
            self.flash.ctrl().modify(|_, w| w.fprgm().set_bit());
            store();
            cortex_m::asm::dsb();
            status = self.wait(PROGRAMMING_TIMEOUT);
            self.flash.ctrl().modify(|_, w| w.fprgm().clear_bit());
        }
        status
    }
}

impl FlashController for At32Flash {
    fn geometry(&self) -> FlashGeometry {
        self.geometry
    }

    fn unlock(&mut self) {
        if self.flash.ctrl().read().oplk().bit_is_set() {
            self.flash.unlock().write(|w| unsafe { w.ukval().bits(KEY1) });
            self.flash.unlock().write(|w| unsafe { w.ukval().bits(KEY2) });
        }
    }

    fn lock(&mut self) {
        self.flash.ctrl().modify(|_, w| w.oplk().set_bit());
    }

    fn erase_page(&mut self, page_address: u32) -> FlashStatus {
        let mut status = self.wait(ERASE_TIMEOUT);
        if status.is_done() {
            self.flash.ctrl().modify(|_, w| w.secers().set_bit());
            self.flash.addr().write(|w| unsafe { w.fa().bits(page_address) });
            self.flash.ctrl().modify(|_, w| w.erstr().set_bit());
            status = self.wait(ERASE_TIMEOUT);
            self.flash.ctrl().modify(|_, w| w.secers().clear_bit());
        }
        status
    }

    fn program_halfword(&mut self, address: u32, value: u16) -> FlashStatus {
        // SAFETY: the writer only programs inside the flash bounds
        self.program(|| unsafe { ptr::write_volatile(address as *mut u16, value) })
    }

    fn program_word(&mut self, address: u32, value: u32) -> FlashStatus {
        // SAFETY: the writer only programs inside the flash bounds
        self.program(|| unsafe { ptr::write_volatile(address as *mut u32, value) })
    }

    fn read(&self, address: u32, buf: &mut [u8]) {
        debug_assert!(address >= self.geometry.base);
        debug_assert!(address as usize + buf.len() <= self.geometry.end() as usize);
        for (i, byte) in buf.iter_mut().enumerate() {
            // SAFETY: flash is memory mapped and the range lies inside it
            *byte = unsafe { ptr::read_volatile((address as usize + i) as *const u8) };
        }
    }
}

/// Flash size in KB from the device identification area
pub fn flash_size_kb() -> u16 {
    // SAFETY: read-only factory value, always mapped
    unsafe { ptr::read_volatile(FLASH_SIZE_REG as *const u16) }
}

/// Map an STS register value to a status
fn decode_status(sts: u32) -> FlashStatus {
    if sts & STS_OBF != 0 {
        FlashStatus::Busy
    } else if sts & STS_PRGMERR != 0 {
        FlashStatus::ProgramError
    } else if sts & STS_EPPERR != 0 {
        FlashStatus::WriteProtectError
    } else {
        FlashStatus::Done
    }
}

/// Poll `read_sts` until the peripheral is no longer busy
///
/// Gives up with [`FlashStatus::Timeout`] after `timeout` busy reads.
fn wait_for(mut read_sts: impl FnMut() -> u32, timeout: u32) -> FlashStatus {
    let mut remaining = timeout;
    loop {
        let status = decode_status(read_sts());
        if status != FlashStatus::Busy {
            return status;
        }
        if remaining == 0 {
            return FlashStatus::Timeout;
        }
        remaining -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_status() {
        assert_eq!(decode_status(0), FlashStatus::Done);
        assert_eq!(decode_status(STS_ODF), FlashStatus::Done);
        assert_eq!(decode_status(STS_OBF), FlashStatus::Busy);
        assert_eq!(decode_status(STS_PRGMERR | STS_ODF), FlashStatus::ProgramError);
        assert_eq!(decode_status(STS_EPPERR), FlashStatus::WriteProtectError);
        // Busy wins over stale error flags
        assert_eq!(decode_status(STS_OBF | STS_PRGMERR), FlashStatus::Busy);
    }

    #[test]
    fn test_wait_for_busy_then_done() {
        let mut reads = 0;
        let status = wait_for(
            || {
                reads += 1;
                if reads < 5 {
                    STS_OBF
                } else {
                    STS_ODF
                }
            },
            100,
        );
        assert_eq!(status, FlashStatus::Done);
        assert_eq!(reads, 5);
    }

    #[test]
    fn test_wait_for_times_out() {
        let mut reads = 0u32;
        let status = wait_for(
            || {
                reads += 1;
                STS_OBF
            },
            10,
        );
        assert_eq!(status, FlashStatus::Timeout);
        assert_eq!(reads, 11);
    }

    #[test]
    fn test_wraps_flash_peripheral() {
        // SAFETY: only the geometry is used, no register is touched
        let p = unsafe { pac::Peripherals::steal() };
        let flash = At32Flash::with_size_kb(p.FLASH, 256);
        assert_eq!(flash.geometry().page_size, 2048);
        assert_eq!(flash.geometry().end(), 0x0804_0000);

        let flash = At32Flash::with_size_kb(flash.free(), 128);
        assert_eq!(flash.geometry().page_size, 1024);
    }

    #[test]
    fn test_wait_for_reports_error() {
        assert_eq!(wait_for(|| STS_PRGMERR, 10), FlashStatus::ProgramError);
    }
}
