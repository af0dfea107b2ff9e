//! Flash region writer
//!
//! Every write runs the same single pass: unlock the controller, erase the
//! page containing the start address, program the payload unit by unit in
//! ascending address order, lock the controller. The first failing unit
//! ends the pass. There is no retry and no rollback.
//!
//! # Page boundaries
//!
//! Only the page holding the start address is erased. A payload that runs
//! into the next page programs cells that were never erased; on real parts
//! those program calls fail (or merge bits with stale data) and the write
//! reports [`WriteOutcome::Error`]. Keep each payload inside one page.

use cfgpage_hal::flash::ERASED_BYTE;
use cfgpage_hal::{FlashController, FlashStatus, UnitSize};

use crate::validator::FlashBounds;

/// Sentinel address selecting the default write location, the start of the
/// last flash page
pub const DEFAULT_ADDRESS: u32 = 0xFFFF_FFFF;

/// Result of a write
///
/// All peripheral failures (busy, program error, protection error, timeout)
/// collapse into [`WriteOutcome::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteOutcome {
    /// Address outside flash, misaligned, or payload not a whole number of
    /// units. Nothing was touched.
    WrongAddress,
    /// The whole payload was programmed
    Ok,
    /// Erase or program failed; the page may be partially programmed
    Error,
}

impl WriteOutcome {
    /// Check if the write completed
    pub const fn is_ok(self) -> bool {
        matches!(self, WriteOutcome::Ok)
    }
}

/// Region writer over a flash controller
///
/// Owns the controller, so writes through one writer are serialized by
/// `&mut self`. Nothing guards against an interrupt handler driving the
/// same peripheral behind its back.
pub struct FlashWriter<C> {
    controller: C,
    bounds: FlashBounds,
}

impl<C: FlashController> FlashWriter<C> {
    /// Create a writer, deriving the address bounds from the controller
    pub fn new(controller: C) -> Self {
        let bounds = FlashBounds::new(controller.geometry());
        Self { controller, bounds }
    }

    /// Address bounds of the flash array
    pub fn bounds(&self) -> FlashBounds {
        self.bounds
    }

    /// Get the underlying controller
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Get the underlying controller mutably
    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    /// Consume the writer and return the controller
    pub fn into_inner(self) -> C {
        self.controller
    }

    /// Start of the last flash page
    pub fn default_address(&self) -> u32 {
        self.bounds.last_page_start()
    }

    /// Replace [`DEFAULT_ADDRESS`] with the default write location
    pub fn resolve_address(&self, address: u32) -> u32 {
        if address == DEFAULT_ADDRESS {
            self.default_address()
        } else {
            address
        }
    }

    /// Erase the page at `address` and program `payload` as little-endian
    /// units of `unit` size
    ///
    /// `payload.len()` must be a multiple of the unit size and `address`
    /// aligned to it.
    pub fn write_region(&mut self, address: u32, payload: &[u8], unit: UnitSize) -> WriteOutcome {
        let step = unit.bytes() as usize;
        if payload.len() % step != 0 {
            warn!(
                "Payload of {} bytes is not a whole number of {}-byte units",
                payload.len(),
                step
            );
            return WriteOutcome::WrongAddress;
        }

        let units = payload.chunks_exact(step).map(|chunk| match unit {
            UnitSize::HalfWord => u32::from(u16::from_le_bytes([chunk[0], chunk[1]])),
            UnitSize::Word => u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
        });
        self.program_units(address, unit, units)
    }

    /// Erase the page at `address` and program one halfword
    pub fn write_halfword(&mut self, address: u32, value: u16) -> WriteOutcome {
        self.write_halfwords(address, &[value])
    }

    /// Erase the page at `address` and program consecutive halfwords
    pub fn write_halfwords(&mut self, address: u32, halfwords: &[u16]) -> WriteOutcome {
        self.program_units(
            address,
            UnitSize::HalfWord,
            halfwords.iter().map(|&h| u32::from(h)),
        )
    }

    /// Erase the page at `address` and program one word
    pub fn write_word(&mut self, address: u32, value: u32) -> WriteOutcome {
        self.write_words(address, &[value])
    }

    /// Erase the page at `address` and program consecutive words
    pub fn write_words(&mut self, address: u32, words: &[u32]) -> WriteOutcome {
        self.program_units(address, UnitSize::Word, words.iter().copied())
    }

    /// Read bytes straight from the memory-mapped array
    ///
    /// A range reaching outside flash is not read. `buf` is filled with
    /// erased bytes and `false` is returned.
    pub fn read(&self, address: u32, buf: &mut [u8]) -> bool {
        if !self.bounds.contains_range(address, buf.len()) {
            warn!("Rejected flash read of {} bytes at {:#x}", buf.len(), address);
            buf.fill(ERASED_BYTE);
            return false;
        }

        trace!("Reading {} bytes at {:#x}", buf.len(), address);
        self.controller.read(address, buf);
        true
    }

    /// Read one halfword, erased if it lies outside flash
    pub fn read_halfword(&self, address: u32) -> u16 {
        let mut buf = [0u8; 2];
        self.read(address, &mut buf);
        u16::from_le_bytes(buf)
    }

    /// Read one word, erased if it lies outside flash
    pub fn read_word(&self, address: u32) -> u32 {
        let mut buf = [0u8; 4];
        self.read(address, &mut buf);
        u32::from_le_bytes(buf)
    }

    fn program_units<I>(&mut self, address: u32, unit: UnitSize, units: I) -> WriteOutcome
    where
        I: ExactSizeIterator<Item = u32>,
    {
        let address = self.resolve_address(address);
        if !self.bounds.validate(address) || address % unit.bytes() != 0 {
            warn!("Rejected flash write at {:#x}", address);
            return WriteOutcome::WrongAddress;
        }

        let page = self.bounds.page_start(address);
        debug!(
            "Writing {} x {} at {:#x} (page {:#x})",
            units.len(),
            unit,
            address,
            page
        );

        self.controller.unlock();

        let mut status = self.controller.erase_page(page);
        if status.is_done() {
            let mut target = address;
            for value in units {
                status = self.program_unit(target, unit, value);
                if !status.is_done() {
                    warn!("Program failed at {:#x}: {}", target, status);
                    break;
                }
                target = target.wrapping_add(unit.bytes());
            }
        } else {
            warn!("Erase of page {:#x} failed: {}", page, status);
        }

        self.controller.lock();

        if status.is_done() {
            WriteOutcome::Ok
        } else {
            WriteOutcome::Error
        }
    }

    fn program_unit(&mut self, target: u32, unit: UnitSize, value: u32) -> FlashStatus {
        // A unit hanging off the end of flash would fault on the bus
        if !self.bounds.contains_range(target, unit.bytes() as usize) {
            return FlashStatus::ProgramError;
        }

        match unit {
            UnitSize::HalfWord => self.controller.program_halfword(target, value as u16),
            UnitSize::Word => self.controller.program_word(target, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfgpage_hal::mock::MockFlash;
    use proptest::prelude::*;

    const PAGE: u32 = 0x0803_E800;

    fn new_writer() -> FlashWriter<MockFlash> {
        FlashWriter::new(MockFlash::with_size_kb(256))
    }

    #[test]
    fn test_address_past_end_is_rejected_without_side_effects() {
        let mut writer = new_writer();
        let past_end = writer.bounds().last + 1;

        assert_eq!(writer.write_word(past_end, 0x1234_5678), WriteOutcome::WrongAddress);

        let flash = writer.controller();
        assert_eq!(flash.unlock_count(), 0);
        assert_eq!(flash.lock_count(), 0);
        assert!(flash.erased_pages().is_empty());
        assert_eq!(flash.program_count(), 0);
    }

    #[test]
    fn test_address_before_flash_is_rejected() {
        let mut writer = new_writer();
        assert_eq!(
            writer.write_halfwords(0x07FF_FFFE, &[1, 2]),
            WriteOutcome::WrongAddress
        );
        assert_eq!(writer.controller().unlock_count(), 0);
    }

    #[test]
    fn test_misaligned_address_is_rejected() {
        let mut writer = new_writer();
        assert_eq!(writer.write_word(PAGE + 2, 0), WriteOutcome::WrongAddress);
        assert_eq!(writer.write_halfword(PAGE + 1, 0), WriteOutcome::WrongAddress);
        assert!(writer.controller().erased_pages().is_empty());
    }

    #[test]
    fn test_ragged_payload_is_rejected() {
        let mut writer = new_writer();
        assert_eq!(
            writer.write_region(PAGE, &[1, 2, 3], UnitSize::HalfWord),
            WriteOutcome::WrongAddress
        );
        assert_eq!(
            writer.write_region(PAGE, &[1, 2, 3, 4, 5, 6], UnitSize::Word),
            WriteOutcome::WrongAddress
        );
        assert_eq!(writer.controller().unlock_count(), 0);
    }

    #[test]
    fn test_halfword_scenario() {
        let mut writer = new_writer();
        let halfwords: [u16; 10] = core::array::from_fn(|i| 0xA001 + i as u16);

        assert_eq!(writer.write_halfwords(PAGE, &halfwords), WriteOutcome::Ok);
        assert_eq!(writer.read_halfword(PAGE + 2 * 2), 0xA003);
        assert!(writer.controller().is_locked());
    }

    #[test]
    fn test_default_address_resolves_to_last_page() {
        let mut writer = new_writer();
        assert_eq!(writer.default_address(), 0x0803_F800);
        assert_eq!(writer.resolve_address(DEFAULT_ADDRESS), 0x0803_F800);
        assert_eq!(writer.resolve_address(PAGE), PAGE);

        assert_eq!(
            writer.write_halfwords(DEFAULT_ADDRESS, &[0xBEEF, 0xCAFE]),
            WriteOutcome::Ok
        );
        assert_eq!(writer.controller().erased_pages(), &[0x0803_F800]);
        assert_eq!(writer.read_word(0x0803_F800), 0xCAFE_BEEF);
    }

    #[test]
    fn test_write_erases_whole_page_first() {
        let mut writer = new_writer();
        writer.controller_mut().preload(PAGE, &[0x00; 16]);

        assert_eq!(writer.write_word(PAGE + 8, 0x5566_7788), WriteOutcome::Ok);

        let contents = writer.controller().contents(PAGE, 16);
        assert_eq!(&contents[..8], &[0xFF; 8]);
        assert_eq!(&contents[8..12], &[0x88, 0x77, 0x66, 0x55]);
        assert_eq!(&contents[12..], &[0xFF; 4]);
    }

    #[test]
    fn test_write_inside_page_erases_containing_page() {
        let mut writer = new_writer();
        assert_eq!(writer.write_halfword(PAGE + 0x7FE, 0x0102), WriteOutcome::Ok);
        assert_eq!(writer.controller().erased_pages(), &[PAGE]);
    }

    #[test]
    fn test_region_bytes_are_little_endian_units() {
        let mut writer = new_writer();
        let payload = [0x44, 0x33, 0x22, 0x11, 0x88, 0x77, 0x66, 0x55];

        assert_eq!(writer.write_region(PAGE, &payload, UnitSize::Word), WriteOutcome::Ok);
        assert_eq!(writer.read_word(PAGE), 0x1122_3344);
        assert_eq!(writer.read_word(PAGE + 4), 0x5566_7788);
        assert_eq!(writer.controller().program_count(), 2);

        assert_eq!(
            writer.write_region(PAGE, &payload, UnitSize::HalfWord),
            WriteOutcome::Ok
        );
        assert_eq!(writer.controller().contents(PAGE, 8), payload.to_vec());
        assert_eq!(writer.controller().program_count(), 6);
    }

    #[test]
    fn test_partial_failure_leaves_tail_erased() {
        let mut writer = new_writer();
        writer.controller_mut().fail_program_at(3);
        let words = [1u32, 2, 3, 4, 5, 6];

        assert_eq!(writer.write_words(PAGE, &words), WriteOutcome::Error);

        for (i, expected) in [1u32, 2, 3].iter().enumerate() {
            assert_eq!(writer.read_word(PAGE + 4 * i as u32), *expected);
        }
        for i in 3..6 {
            assert_eq!(writer.read_word(PAGE + 4 * i), 0xFFFF_FFFF);
        }

        // Stopped at the first failure and still relocked
        let flash = writer.controller();
        assert_eq!(flash.program_count(), 4);
        assert!(flash.is_locked());
        assert_eq!(flash.lock_count(), 1);
    }

    #[test]
    fn test_erase_failure_skips_programming_and_relocks() {
        let mut writer = new_writer();
        writer.controller_mut().fail_next_erase();

        assert_eq!(writer.write_words(PAGE, &[1, 2]), WriteOutcome::Error);

        let flash = writer.controller();
        assert_eq!(flash.program_count(), 0);
        assert_eq!(flash.unlock_count(), 1);
        assert_eq!(flash.lock_count(), 1);
        assert!(flash.is_locked());
    }

    #[test]
    fn test_empty_payload_still_erases_page() {
        let mut writer = new_writer();
        writer.controller_mut().preload(PAGE, &[0x00; 4]);

        assert_eq!(writer.write_words(PAGE, &[]), WriteOutcome::Ok);
        assert_eq!(writer.read_word(PAGE), 0xFFFF_FFFF);
    }

    #[test]
    fn test_payload_past_end_of_flash_fails() {
        let mut writer = new_writer();
        let last_word = writer.bounds().last - 3;

        assert_eq!(writer.write_words(last_word, &[7, 8]), WriteOutcome::Error);
        assert_eq!(writer.read_word(last_word), 7);
        assert_eq!(writer.controller().program_count(), 1);
    }

    #[test]
    fn test_read_past_end_of_flash_returns_erased() {
        let writer = new_writer();
        let last = writer.bounds().last;

        assert_eq!(writer.read_word(last - 1), 0xFFFF_FFFF);
        assert_eq!(writer.read_halfword(last), 0xFFFF);

        let mut buf = [0u8; 8];
        assert!(!writer.read(last - 3, &mut buf));
        assert_eq!(buf, [0xFF; 8]);
        assert!(!writer.read(0x0000_0000, &mut buf[..1]));
    }

    #[test]
    fn test_read_of_last_word_succeeds() {
        let mut writer = new_writer();
        let last_word = writer.bounds().last - 3;
        assert_eq!(writer.write_word(last_word, 0x0BAD_F00D), WriteOutcome::Ok);

        let mut buf = [0u8; 4];
        assert!(writer.read(last_word, &mut buf));
        assert_eq!(u32::from_le_bytes(buf), 0x0BAD_F00D);
    }

    /// Only the start page is erased. A payload that runs into the next
    /// page lands on whatever that page already holds.
    #[test]
    fn test_cross_page_write_does_not_erase_next_page() {
        let next_page = PAGE + 0x800;

        // Clean next page: the write goes through, but only one page was erased
        let mut writer = new_writer();
        assert_eq!(
            writer.write_words(next_page - 4, &[0x1111_1111, 0x2222_2222]),
            WriteOutcome::Ok
        );
        assert_eq!(writer.controller().erased_pages(), &[PAGE]);

        // Stale next page: the write fails on the first unit past the boundary
        let mut writer = new_writer();
        writer.controller_mut().preload(next_page, &[0x00, 0x11, 0x22, 0x33]);
        assert_eq!(
            writer.write_words(next_page - 4, &[0x1111_1111, 0x2222_2222]),
            WriteOutcome::Error
        );
        assert_eq!(writer.read_word(next_page - 4), 0x1111_1111);
        assert_eq!(writer.read_word(next_page), 0x3322_1100);
        assert_eq!(writer.controller().erased_pages(), &[PAGE]);
    }

    proptest! {
        #[test]
        fn prop_out_of_range_is_rejected(address in any::<u32>(), value in any::<u32>()) {
            let mut writer = new_writer();
            let bounds = writer.bounds();
            prop_assume!(address != DEFAULT_ADDRESS);
            prop_assume!(!bounds.validate(address));

            prop_assert_eq!(writer.write_word(address, value), WriteOutcome::WrongAddress);
            prop_assert!(writer.controller().erased_pages().is_empty());
            prop_assert_eq!(writer.controller().program_count(), 0);
        }

        #[test]
        fn prop_write_then_read_matches(
            page in 0u32..128,
            offset in 0u32..256,
            words in proptest::collection::vec(any::<u32>(), 0..256),
        ) {
            let mut writer = new_writer();
            let page_start = writer.bounds().first + page * 0x800;
            let address = page_start + offset * 4;
            prop_assume!(address + 4 * words.len() as u32 <= page_start + 0x800);

            prop_assert_eq!(writer.write_words(address, &words), WriteOutcome::Ok);

            let mut buf = std::vec![0u8; words.len() * 4];
            prop_assert!(writer.read(address, &mut buf));
            let expected: std::vec::Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
            prop_assert_eq!(buf, expected);
        }
    }
}
