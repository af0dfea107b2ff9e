//! Mock flash controller for testing
//!
//! Provides an in-memory flash array that behaves like the program flash of
//! the supported parts closely enough to exercise the writer on the host.

use std::vec;
use std::vec::Vec;

use crate::flash::{FlashController, FlashGeometry, FlashStatus, ERASED_BYTE, FLASH_BASE};

/// Mock flash controller
///
/// Simulates the flash array and its controller in memory. Supports:
/// - Erased state of `0xFF` and programming that can only clear bits
/// - Program errors when the target halfword is not erased
/// - Lock state (erase/program while locked fails with a protection error)
/// - Failure injection for erase and for the n-th program call
/// - Operation counters for verifying peripheral sequencing
///
/// # Example
///
/// ```
/// use cfgpage_hal::mock::MockFlash;
/// use cfgpage_hal::FlashController;
///
/// let mut flash = MockFlash::with_size_kb(256);
/// flash.unlock();
/// flash.erase_page(0x0803_F800);
/// flash.program_halfword(0x0803_F800, 0xA001);
/// flash.lock();
///
/// let mut buf = [0u8; 2];
/// flash.read(0x0803_F800, &mut buf);
/// assert_eq!(u16::from_le_bytes(buf), 0xA001);
/// ```
#[derive(Debug, Clone)]
pub struct MockFlash {
    geometry: FlashGeometry,
    /// Flash storage (initialized to 0xFF - erased state)
    storage: Vec<u8>,
    locked: bool,
    unlock_count: usize,
    lock_count: usize,
    program_count: usize,
    erased_pages: Vec<u32>,
    fail_next_erase: bool,
    fail_program_at: Option<usize>,
}

impl MockFlash {
    /// Create a mock flash array with the given geometry, fully erased
    pub fn new(geometry: FlashGeometry) -> Self {
        Self {
            geometry,
            storage: vec![ERASED_BYTE; geometry.size as usize],
            locked: true,
            unlock_count: 0,
            lock_count: 0,
            program_count: 0,
            erased_pages: Vec::new(),
            fail_next_erase: false,
            fail_program_at: None,
        }
    }

    /// Create a mock of a part with `size_kb` of flash at the usual base
    pub fn with_size_kb(size_kb: u16) -> Self {
        Self::new(FlashGeometry::from_size_kb(FLASH_BASE, size_kb))
    }

    /// Get flash contents (for test verification)
    pub fn contents(&self, address: u32, len: usize) -> Vec<u8> {
        let start = self.offset(address);
        self.storage[start..start + len].to_vec()
    }

    /// Overwrite flash contents directly, bypassing the controller
    ///
    /// Used to leave stale data behind, as a previous firmware would.
    pub fn preload(&mut self, address: u32, data: &[u8]) {
        let start = self.offset(address);
        self.storage[start..start + data.len()].copy_from_slice(data);
    }

    /// Make the next page erase fail with a program error
    pub fn fail_next_erase(&mut self) {
        self.fail_next_erase = true;
    }

    /// Make the program call with zero-based index `n` fail
    ///
    /// The index counts program calls since this mock was created.
    pub fn fail_program_at(&mut self, n: usize) {
        self.fail_program_at = Some(n);
    }

    /// Whether the controller is currently locked
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Number of unlock calls
    pub fn unlock_count(&self) -> usize {
        self.unlock_count
    }

    /// Number of lock calls
    pub fn lock_count(&self) -> usize {
        self.lock_count
    }

    /// Number of program calls, successful or not
    pub fn program_count(&self) -> usize {
        self.program_count
    }

    /// Page addresses passed to erase, in call order
    pub fn erased_pages(&self) -> &[u32] {
        &self.erased_pages
    }

    fn offset(&self, address: u32) -> usize {
        (address - self.geometry.base) as usize
    }

    fn in_range(&self, address: u32, len: u32) -> bool {
        address >= self.geometry.base
            && address
                .checked_add(len)
                .is_some_and(|end| end <= self.geometry.end())
    }

    fn program(&mut self, address: u32, bytes: &[u8]) -> FlashStatus {
        let index = self.program_count;
        self.program_count += 1;

        if self.locked {
            return FlashStatus::WriteProtectError;
        }
        if !self.in_range(address, bytes.len() as u32) || address % bytes.len() as u32 != 0 {
            return FlashStatus::ProgramError;
        }
        if self.fail_program_at == Some(index) {
            return FlashStatus::ProgramError;
        }

        let start = self.offset(address);
        let target = &mut self.storage[start..start + bytes.len()];

        // Programming a non-erased cell is refused unless it clears it to zero
        let erased = target.iter().all(|&b| b == ERASED_BYTE);
        let zeroing = bytes.iter().all(|&b| b == 0);
        if !erased && !zeroing {
            return FlashStatus::ProgramError;
        }

        // Flash can only change bits from 1→0
        for (cell, &b) in target.iter_mut().zip(bytes) {
            *cell &= b;
        }
        FlashStatus::Done
    }
}

impl FlashController for MockFlash {
    fn geometry(&self) -> FlashGeometry {
        self.geometry
    }

    fn unlock(&mut self) {
        self.unlock_count += 1;
        self.locked = false;
    }

    fn lock(&mut self) {
        self.lock_count += 1;
        self.locked = true;
    }

    fn erase_page(&mut self, page_address: u32) -> FlashStatus {
        self.erased_pages.push(page_address);

        if self.locked {
            return FlashStatus::WriteProtectError;
        }
        if !self.in_range(page_address, self.geometry.page_size)
            || (page_address - self.geometry.base) % self.geometry.page_size != 0
        {
            return FlashStatus::ProgramError;
        }
        if self.fail_next_erase {
            self.fail_next_erase = false;
            return FlashStatus::ProgramError;
        }

        let start = self.offset(page_address);
        let end = start + self.geometry.page_size as usize;
        self.storage[start..end].fill(ERASED_BYTE);
        FlashStatus::Done
    }

    fn program_halfword(&mut self, address: u32, value: u16) -> FlashStatus {
        self.program(address, &value.to_le_bytes())
    }

    fn program_word(&mut self, address: u32, value: u32) -> FlashStatus {
        self.program(address, &value.to_le_bytes())
    }

    fn read(&self, address: u32, buf: &mut [u8]) {
        let start = self.offset(address);
        buf.copy_from_slice(&self.storage[start..start + buf.len()]);
    }
}
