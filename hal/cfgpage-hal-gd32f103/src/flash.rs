//! Flash memory controller (FMC) driver for GD32F103
//!
//! Registers are driven through the `gd32f1` PAC's FMC block.
//!
//! Only bank 0 is driven. It covers the first 512 KB, which is all of the
//! flash on every GD32F103R part this driver targets; larger parts are
//! clamped to bank 0.
//!
//! Page size is 1 KB on parts with up to 128 KB of flash and 2 KB above.

use core::ptr;

use cfgpage_hal::flash::FLASH_BASE;
use cfgpage_hal::{FlashController, FlashGeometry, FlashStatus};

use crate::pac;

/// Flash size in KB (16 bit), device identification area
const FMC_SIZE: *const u16 = 0x1FFF_F7E0 as *const u16;

const UNLOCK_KEY0: u32 = 0x4567_0123;
const UNLOCK_KEY1: u32 = 0xCDEF_89AB;

const STAT0_BUSY: u32 = 1 << 0;
const STAT0_PGERR: u32 = 1 << 2;
const STAT0_WPERR: u32 = 1 << 4;
const STAT0_ENDF: u32 = 1 << 5;

/// Bank 0 size
const BANK0_SIZE: u32 = 512 * 1024;

/// Poll count before giving up, as in the vendor library
pub const FMC_TIMEOUT_COUNT: u32 = 0x000F_0000;

/// GD32F103 FMC bank 0
pub struct Gd32Fmc {
    fmc: pac::FMC,
    geometry: FlashGeometry,
}

impl Gd32Fmc {
    /// Wrap the FMC, sizing it from the device identification area
    pub fn new(fmc: pac::FMC) -> Self {
        Self::with_size_kb(fmc, flash_size_kb())
    }

    /// Wrap the FMC with an explicit flash size in KB
    pub fn with_size_kb(fmc: pac::FMC, size_kb: u16) -> Self {
        Self {
            fmc,
            geometry: bank0_geometry(size_kb),
        }
    }

    /// Release the FMC
    pub fn free(self) -> pac::FMC {
        self.fmc
    }

    fn ready_wait(&mut self) -> FlashStatus {
        let state = ready_wait_with(|| self.fmc.stat0().read().bits(), FMC_TIMEOUT_COUNT);
        // STAT0 flags are write-1-to-clear
        self.fmc
            .stat0()
            .write(|w| unsafe { w.bits(STAT0_ENDF | STAT0_PGERR | STAT0_WPERR) });
        state
    }

    fn program(&mut self, store: impl FnOnce()) -> FlashStatus {
        let mut state = self.ready_wait();
        if state.is_done() {
            self.fmc.ctl0().modify(|_, w| w.pg().set_bit());
            store();
            cortex_m::asm::dsb();
            state = self.ready_wait();
            self.fmc.ctl0().modify(|_, w| w.pg().clear_bit());
        }
        state
    }
}

impl FlashController for Gd32Fmc {
    fn geometry(&self) -> FlashGeometry {
        self.geometry
    }

    fn unlock(&mut self) {
        if self.fmc.ctl0().read().lk().bit_is_set() {
            self.fmc.key0().write(|w| unsafe { w.key().bits(UNLOCK_KEY0) });
            self.fmc.key0().write(|w| unsafe { w.key().bits(UNLOCK_KEY1) });
        }
    }

    fn lock(&mut self) {
        self.fmc.ctl0().modify(|_, w| w.lk().set_bit());
    }

    fn erase_page(&mut self, page_address: u32) -> FlashStatus {
        let mut state = self.ready_wait();
        if state.is_done() {
            self.fmc.ctl0().modify(|_, w| w.per().set_bit());
            self.fmc.addr0().write(|w| unsafe { w.addr().bits(page_address) });
            self.fmc.ctl0().modify(|_, w| w.start().set_bit());
            state = self.ready_wait();
            self.fmc.ctl0().modify(|_, w| w.per().clear_bit());
        }
        state
    }

    fn program_halfword(&mut self, address: u32, value: u16) -> FlashStatus {
        // SAFETY: the writer only programs inside bank 0
        self.program(|| unsafe { ptr::write_volatile(address as *mut u16, value) })
    }

    fn program_word(&mut self, address: u32, value: u32) -> FlashStatus {
        // SAFETY: the writer only programs inside bank 0
        self.program(|| unsafe { ptr::write_volatile(address as *mut u32, value) })
    }

    fn read(&self, address: u32, buf: &mut [u8]) {
        for (dst, src) in buf.iter_mut().zip(address as usize..) {
            // SAFETY: flash is memory mapped and the caller keeps the range
            // inside it
            *dst = unsafe { ptr::read_volatile(src as *const u8) };
        }
    }
}

/// Flash size in KB from the device identification area
pub fn flash_size_kb() -> u16 {
    // SAFETY: read-only factory value, always mapped
    unsafe { ptr::read_volatile(FMC_SIZE) }
}

/// Geometry of bank 0 for a part with `size_kb` of flash
fn bank0_geometry(size_kb: u16) -> FlashGeometry {
    let geometry = FlashGeometry::from_size_kb(FLASH_BASE, size_kb);
    FlashGeometry {
        size: geometry.size.min(BANK0_SIZE),
        ..geometry
    }
}

/// Map a STAT0 value to an FMC state
fn bank0_state(stat0: u32) -> FlashStatus {
    if stat0 & STAT0_BUSY != 0 {
        FlashStatus::Busy
    } else if stat0 & STAT0_PGERR != 0 {
        FlashStatus::ProgramError
    } else if stat0 & STAT0_WPERR != 0 {
        FlashStatus::WriteProtectError
    } else {
        FlashStatus::Done
    }
}

/// Poll STAT0 until bank 0 leaves the busy state or `timeout` reads pass
fn ready_wait_with(mut stat0: impl FnMut() -> u32, mut timeout: u32) -> FlashStatus {
    let mut state;
    loop {
        state = bank0_state(stat0());
        timeout = timeout.saturating_sub(1);
        if state != FlashStatus::Busy || timeout == 0 {
            break;
        }
    }
    if state == FlashStatus::Busy {
        FlashStatus::Timeout
    } else {
        state
    }
}
