//! Config page and RO constants records
//!
//! Both records are stored as consecutive little-endian 32-bit words.
//!
//! Config page (`WithBusSpeed` layout):
//!
//! | Word | Byte 0   | Byte 1   | Byte 2 | Byte 3 |
//! |------|----------|----------|--------|--------|
//! | 0    | addr     | -        | -      | -      |
//! | 1    | bus speed (32 bit)                   ||||
//! | 2    | bl_minor | bl_major | reserved       ||
//! | 3    | sw_minor | sw_major | reserved       ||
//! | 4    | first-run flag (32 bit)              ||||
//! | 5    | reserved                             ||||
//! | 6..9 | baud     | parity   | stop   | reserved |
//!
//! The `Compact` layout drops word 1, leaving 9 words.
//!
//! RO constants: module type, hardware revision (minor, major, reserved),
//! serial number low word, serial number high word.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Word value of erased flash
pub const ERASED_WORD: u32 = 0xFFFF_FFFF;

/// Mask for the bus address stored in the low byte of the module address
pub const MODULE_ADDR_MASK: u8 = 0x1F;

/// Number of Modbus ports with stored parameters
pub const PORT_COUNT: usize = 4;

/// Largest config page record, in words
pub const CONFIG_WORDS_MAX: usize = 10;

/// Number of words in the RO constants record
pub const RO_CONSTANTS_WORDS: usize = 4;

/// Encoded config page record
pub type ConfigWords = heapless::Vec<u32, CONFIG_WORDS_MAX>;

/// Which config page layout a module uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConfigLayout {
    /// 10 words, bus speed stored after the module address
    #[default]
    WithBusSpeed,
    /// 9 words, no bus speed
    Compact,
}

impl ConfigLayout {
    /// Number of words written to the config page
    pub const fn word_count(self) -> usize {
        match self {
            ConfigLayout::WithBusSpeed => 10,
            ConfigLayout::Compact => 9,
        }
    }

    /// Whether the bus speed word is stored
    pub const fn has_bus_speed(self) -> bool {
        matches!(self, ConfigLayout::WithBusSpeed)
    }
}

/// Firmware or hardware version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Version {
    pub minor: u8,
    pub major: u8,
}

impl Version {
    /// Build a version, arguments in storage order
    pub const fn new(minor: u8, major: u8) -> Self {
        Self { minor, major }
    }

    fn to_word(self, reserved: u16) -> u32 {
        u32::from(self.minor) | u32::from(self.major) << 8 | u32::from(reserved) << 16
    }

    fn from_word(word: u32) -> (Self, u16) {
        let [minor, major, lo, hi] = word.to_le_bytes();
        (Self { minor, major }, u16::from_le_bytes([lo, hi]))
    }
}

/// Serial parameters of one Modbus port
///
/// Values are the module's own codes, not raw baud rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PortParams {
    /// Baud rate code
    pub baud: u8,
    /// Parity code
    pub parity: u8,
    /// Number of stop bits
    pub stop_bits: u8,
    /// Reserved
    pub reserved: u8,
}

impl PortParams {
    pub const fn new(baud: u8, parity: u8, stop_bits: u8) -> Self {
        Self {
            baud,
            parity,
            stop_bits,
            reserved: 0,
        }
    }

    fn to_word(self) -> u32 {
        u32::from_le_bytes([self.baud, self.parity, self.stop_bits, self.reserved])
    }

    fn from_word(word: u32) -> Self {
        let [baud, parity, stop_bits, reserved] = word.to_le_bytes();
        Self {
            baud,
            parity,
            stop_bits,
            reserved,
        }
    }
}

/// Mutable module parameters kept in the config page
///
/// The page is always rewritten in full, so a caller updating one field
/// passes every other field along unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConfigRecord {
    /// Module address; only the low byte is used
    pub module_address: u32,
    /// CAN bus speed. Not stored by [`ConfigLayout::Compact`], where it
    /// always reads back as 0.
    pub bus_speed: u32,
    pub bootloader_version: Version,
    pub bootloader_reserved: u16,
    pub program_version: Version,
    pub program_reserved: u16,
    /// First-run flag
    pub first_run_flag: u32,
    /// Unused by Modbus modules
    pub reserved: u32,
    pub ports: [PortParams; PORT_COUNT],
}

impl ConfigRecord {
    /// Bus address from the module address slot
    pub const fn bus_address(&self) -> u8 {
        (self.module_address as u8) & MODULE_ADDR_MASK
    }

    /// Encode as config page words
    pub fn to_words(&self, layout: ConfigLayout) -> ConfigWords {
        let [p0, p1, p2, p3] = self.ports.map(PortParams::to_word);
        let mut words = ConfigWords::new();
        words.extend(
            [
                Some(self.module_address),
                layout.has_bus_speed().then_some(self.bus_speed),
                Some(self.bootloader_version.to_word(self.bootloader_reserved)),
                Some(self.program_version.to_word(self.program_reserved)),
                Some(self.first_run_flag),
                Some(self.reserved),
                Some(p0),
                Some(p1),
                Some(p2),
                Some(p3),
            ]
            .into_iter()
            .flatten(),
        );
        words
    }

    /// Decode from config page words
    ///
    /// Missing trailing words decode as erased flash.
    pub fn from_words(layout: ConfigLayout, words: &[u32]) -> Self {
        let mut words = words.iter().copied();
        let mut next = || words.next().unwrap_or(ERASED_WORD);

        let module_address = next();
        let bus_speed = if layout.has_bus_speed() { next() } else { 0 };
        let (bootloader_version, bootloader_reserved) = Version::from_word(next());
        let (program_version, program_reserved) = Version::from_word(next());
        let first_run_flag = next();
        let reserved = next();
        let ports = core::array::from_fn(|_| PortParams::from_word(next()));

        Self {
            module_address,
            bus_speed,
            bootloader_version,
            bootloader_reserved,
            program_version,
            program_reserved,
            first_run_flag,
            reserved,
            ports,
        }
    }

    /// Check if every stored word reads as erased flash
    pub fn is_erased(&self, layout: ConfigLayout) -> bool {
        self.to_words(layout).iter().all(|&w| w == ERASED_WORD)
    }
}

/// Identity data written once at manufacturing time
///
/// Firmware only reads this record. Nothing enforces that; it is a
/// convention of the production flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RoConstants {
    /// Module type/class
    pub module_type: u32,
    pub hardware_revision: Version,
    pub hardware_reserved: u16,
    /// Serial number, low word
    pub serial_low: u32,
    /// Serial number, high word
    pub serial_high: u32,
}

impl RoConstants {
    /// Full 64-bit serial number
    pub const fn serial_number(&self) -> u64 {
        (self.serial_high as u64) << 32 | self.serial_low as u64
    }

    /// Split a 64-bit serial number into the low and high words
    pub fn set_serial_number(&mut self, serial: u64) {
        self.serial_low = serial as u32;
        self.serial_high = (serial >> 32) as u32;
    }

    /// Encode as RO constants words, ready for
    /// [`FlashWriter::write_words`](crate::writer::FlashWriter::write_words)
    pub fn to_words(&self) -> [u32; RO_CONSTANTS_WORDS] {
        [
            self.module_type,
            self.hardware_revision.to_word(self.hardware_reserved),
            self.serial_low,
            self.serial_high,
        ]
    }

    /// Decode from RO constants words
    pub fn from_words(words: &[u32; RO_CONSTANTS_WORDS]) -> Self {
        let (hardware_revision, hardware_reserved) = Version::from_word(words[1]);
        Self {
            module_type: words[0],
            hardware_revision,
            hardware_reserved,
            serial_low: words[2],
            serial_high: words[3],
        }
    }

    /// Check if every word reads as erased flash
    pub fn is_erased(&self) -> bool {
        self.to_words().iter().all(|&w| w == ERASED_WORD)
    }
}
