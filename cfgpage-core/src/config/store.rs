//! Config page persistence
//!
//! Writes go through [`FlashWriter`], so a config write is always a full
//! erase of the config page followed by every word of the record. Reads
//! come straight from the memory-mapped page and never fail, since a store
//! is only built over a memory map that fits the part's flash.

use cfgpage_hal::FlashController;

use super::record::{
    ConfigLayout, ConfigRecord, RoConstants, Version, CONFIG_WORDS_MAX, MODULE_ADDR_MASK,
    RO_CONSTANTS_WORDS,
};
use crate::memory_map::MemoryMap;
use crate::writer::{FlashWriter, WriteOutcome};

/// Byte offset of the bus speed word in the config page
const BUS_SPEED_OFFSET: u32 = 4;

/// Byte offset of the hardware revision word in the RO constants page
const HARDWARE_REVISION_OFFSET: u32 = 4;

/// Byte offset of the serial number (low word first) in the RO constants page
const SERIAL_NUMBER_OFFSET: u32 = 8;

/// Config page and RO constants access for one part
pub struct ConfigStore<C> {
    writer: FlashWriter<C>,
    map: MemoryMap,
    layout: ConfigLayout,
}

impl<C: FlashController> ConfigStore<C> {
    /// Create a store using the default memory map for the controller's part
    ///
    /// Returns `None` if the part's flash is too small to hold the config
    /// page and RO constants.
    pub fn new(controller: C, layout: ConfigLayout) -> Option<Self> {
        let map = MemoryMap::with_default_layout(controller.geometry());
        Self::with_map(controller, map, layout)
    }

    /// Create a store with an explicit memory map
    ///
    /// Returns `None` if `map` reaches past the end of the part's flash.
    pub fn with_map(controller: C, map: MemoryMap, layout: ConfigLayout) -> Option<Self> {
        let geometry = controller.geometry();
        if !map.fits(&geometry) {
            warn!(
                "RO constants end at {:#x}, past flash end {:#x}",
                map.ro_constants().end(),
                geometry.end()
            );
            return None;
        }

        Some(Self {
            writer: FlashWriter::new(controller),
            map,
            layout,
        })
    }

    /// Memory map in use
    pub fn memory_map(&self) -> &MemoryMap {
        &self.map
    }

    /// Config page layout in use
    pub fn layout(&self) -> ConfigLayout {
        self.layout
    }

    /// Get the underlying writer
    pub fn writer(&self) -> &FlashWriter<C> {
        &self.writer
    }

    /// Get the underlying writer mutably
    ///
    /// RO constants are provisioned through this, with
    /// [`RoConstants::to_words`] written at the RO constants region start.
    pub fn writer_mut(&mut self) -> &mut FlashWriter<C> {
        &mut self.writer
    }

    /// Consume the store and return the controller
    pub fn into_inner(self) -> C {
        self.writer.into_inner()
    }

    /// Erase the config page and write every field of `record`
    pub fn write_config(&mut self, record: &ConfigRecord) -> WriteOutcome {
        let words = record.to_words(self.layout);
        let address = self.map.config_page().start;
        debug!("Writing {} config words at {:#x}", words.len(), address);
        self.writer.write_words(address, &words)
    }

    /// Read the config page as a record
    ///
    /// An unwritten page comes back with every byte `0xFF`.
    pub fn read_config(&self) -> ConfigRecord {
        let mut words = [0u32; CONFIG_WORDS_MAX];
        let words = &mut words[..self.layout.word_count()];
        self.read_words(self.map.config_page().start, words);
        ConfigRecord::from_words(self.layout, words)
    }

    /// Read the RO constants page as a record
    pub fn read_ro_constants(&self) -> RoConstants {
        let mut words = [0u32; RO_CONSTANTS_WORDS];
        self.read_words(self.map.ro_constants().start, &mut words);
        RoConstants::from_words(&words)
    }

    /// Bus address from the config page, masked to its valid range
    pub fn read_module_address(&self) -> u8 {
        let mut buf = [0u8; 1];
        self.writer.read(self.map.config_page().start, &mut buf);
        buf[0] & MODULE_ADDR_MASK
    }

    /// Bus speed from the config page, if the layout stores one
    pub fn read_bus_speed(&self) -> Option<u32> {
        self.layout
            .has_bus_speed()
            .then(|| self.writer.read_word(self.map.config_page().start + BUS_SPEED_OFFSET))
    }

    /// Hardware revision from the RO constants page
    pub fn read_hardware_revision(&self) -> Version {
        let mut buf = [0u8; 2];
        self.writer
            .read(self.map.ro_constants().start + HARDWARE_REVISION_OFFSET, &mut buf);
        let [minor, major] = buf;
        Version { minor, major }
    }

    /// 64-bit serial number from the RO constants page
    pub fn read_serial_number(&self) -> u64 {
        let base = self.map.ro_constants().start;
        let low = self.writer.read_word(base + SERIAL_NUMBER_OFFSET);
        let high = self.writer.read_word(base + SERIAL_NUMBER_OFFSET + 4);
        u64::from(high) << 32 | u64::from(low)
    }

    fn read_words(&self, address: u32, words: &mut [u32]) {
        for (i, word) in words.iter_mut().enumerate() {
            *word = self.writer.read_word(address + 4 * i as u32);
        }
    }
}
