//! # Serial presence detect reader
//!
//! Reads the SPD EEPROM of every configured module slot. Slots are classified as populated,
//! empty, or failed, where both of the latter count as not populated.
use embedded_hal::i2c::{ErrorKind, I2c, NoAcknowledgeSource};

use crate::board::{BoardConfig, MAX_SLOTS, SlotConfig};

/// Number of SPD bytes read from each module.
pub const SPD_LEN: usize = 64;

pub mod offsets {
    pub const EEPROM_SIZE: u8 = 0;
    pub const TOTAL_SIZE: u8 = 1;
    pub const MEMORY_TYPE: u8 = 2;
    pub const ROW_ADDR_BITS: u8 = 3;
    pub const COL_ADDR_BITS: u8 = 4;
    pub const RANKS: u8 = 5;
    pub const DATA_WIDTH_LSB: u8 = 6;
    pub const DATA_WIDTH_MSB: u8 = 7;
    pub const VOLTAGE: u8 = 8;
    /// Minimum cycle time at the highest supported CAS latency.
    pub const TCK_CL_X: u8 = 9;
    pub const CONFIG_TYPE: u8 = 11;
    pub const REFRESH: u8 = 12;
    /// DDR1 write command to chip select latency.
    pub const WCSBC: u8 = 15;
    pub const INTERNAL_BANKS: u8 = 17;
    pub const CAS_LATENCIES: u8 = 18;
    pub const MODULE_TYPE: u8 = 20;
    pub const MODULE_ATTRIBUTES: u8 = 21;
    pub const TCK_CL_X_MINUS_1: u8 = 23;
    pub const TCK_CL_X_MINUS_2: u8 = 25;
    pub const TRP: u8 = 27;
    pub const TRRD: u8 = 28;
    pub const TRCD: u8 = 29;
    pub const TRAS: u8 = 30;
    pub const RANK_DENSITY: u8 = 31;
    pub const TWR: u8 = 36;
    pub const TWTR: u8 = 37;
    pub const TRTP: u8 = 38;
    pub const TRC: u8 = 41;
    pub const TRFC: u8 = 42;
}

/// Memory technology byte (offset 2) encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum SpdMemoryType {
    Fpm = 1,
    Edo = 2,
    PipelinedNibble = 3,
    Sdram = 4,
    MultiplexedRom = 5,
    Sgram = 6,
    Ddr1 = 7,
    Ddr2 = 8,
}

impl SpdMemoryType {
    pub const fn name(&self) -> &'static str {
        match self {
            SpdMemoryType::Fpm => "FPM DRAM",
            SpdMemoryType::Edo => "EDO",
            SpdMemoryType::PipelinedNibble => "pipelined nibble",
            SpdMemoryType::Sdram => "SDRAM",
            SpdMemoryType::MultiplexedRom => "multiplexed ROM",
            SpdMemoryType::Sgram => "SGRAM DDR",
            SpdMemoryType::Ddr1 => "DDR1",
            SpdMemoryType::Ddr2 => "DDR2",
        }
    }
}

/// Supported memory technology of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    None,
    Ddr1,
    Ddr2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SpdError {
    #[error("no SPD device at address {0:#04x}")]
    NoDevice(u8),
    #[error("I2C error {kind:?} reading SPD at {addr:#04x}")]
    Bus { addr: u8, kind: ErrorKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No module, or an EEPROM reporting zero size.
    Empty,
    /// The EEPROM could not be read.
    ReadError(ErrorKind),
    Populated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpdData(pub [u8; SPD_LEN]);

impl SpdData {
    pub const fn empty() -> Self {
        Self([0; SPD_LEN])
    }

    #[inline]
    pub const fn byte(&self, offset: u8) -> u8 {
        self.0[offset as usize]
    }
}

/// Everything known about one module slot after reading its SPD EEPROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotDescriptor {
    /// Index of the slot in the board slot table.
    pub index: usize,
    pub i2c_address: u8,
    pub first_bank: u8,
    pub state: SlotState,
    pub spd: SpdData,
}

impl SlotDescriptor {
    pub const fn new(index: usize, cfg: &SlotConfig, state: SlotState, spd: SpdData) -> Self {
        Self {
            index,
            i2c_address: cfg.spd_addr,
            first_bank: cfg.first_bank,
            state,
            spd,
        }
    }

    #[inline]
    pub const fn populated(&self) -> bool {
        matches!(self.state, SlotState::Populated)
    }

    #[inline]
    pub const fn byte(&self, offset: u8) -> u8 {
        self.spd.byte(offset)
    }

    pub fn spd_memory_type(&self) -> Result<SpdMemoryType, u8> {
        let raw = self.byte(offsets::MEMORY_TYPE);
        SpdMemoryType::try_from(raw).map_err(|_| raw)
    }

    pub fn memory_type(&self) -> MemoryType {
        if !self.populated() {
            return MemoryType::None;
        }
        match self.spd_memory_type() {
            Ok(SpdMemoryType::Ddr1) => MemoryType::Ddr1,
            Ok(SpdMemoryType::Ddr2) => MemoryType::Ddr2,
            _ => MemoryType::None,
        }
    }

    #[inline]
    pub const fn is_ddr2(&self) -> bool {
        self.byte(offsets::MEMORY_TYPE) == SpdMemoryType::Ddr2 as u8
    }

    pub const fn ecc_supported(&self) -> bool {
        self.byte(offsets::CONFIG_TYPE) == 0x02
    }

    /// Raw SPD voltage interface level code.
    pub const fn voltage_class(&self) -> u8 {
        self.byte(offsets::VOLTAGE)
    }

    pub const fn rank_count(&self) -> u32 {
        let ranks = (self.byte(offsets::RANKS) & 0x0F) as u32;
        if self.is_ddr2() { ranks + 1 } else { ranks }
    }

    pub const fn row_bits(&self) -> u32 {
        (self.byte(offsets::ROW_ADDR_BITS) & 0x1F) as u32
    }

    pub const fn col_bits(&self) -> u32 {
        (self.byte(offsets::COL_ADDR_BITS) & 0x0F) as u32
    }

    /// Number of internal banks of the DRAM devices.
    pub const fn bank_count(&self) -> u32 {
        self.byte(offsets::INTERNAL_BANKS) as u32
    }

    /// Module data width in bits, including ECC bits.
    pub const fn data_width(&self) -> u16 {
        self.byte(offsets::DATA_WIDTH_LSB) as u16
            | ((self.byte(offsets::DATA_WIDTH_MSB) as u16) << 8)
    }

    pub const fn registered(&self) -> bool {
        self.byte(offsets::MODULE_TYPE) == 0x01
            || (self.byte(offsets::MODULE_ATTRIBUTES) & 0x02) != 0
    }

    pub const fn refresh_code(&self) -> u8 {
        self.byte(offsets::REFRESH) & 0x7F
    }

    pub const fn cas_latency_mask(&self) -> u8 {
        self.byte(offsets::CAS_LATENCIES)
    }

    pub const fn rank_density(&self) -> u8 {
        self.byte(offsets::RANK_DENSITY)
    }
}

pub struct SpdReader<'a, I2C> {
    i2c: &'a mut I2C,
}

impl<'a, I2C: I2c> SpdReader<'a, I2C> {
    pub fn new(i2c: &'a mut I2C) -> Self {
        Self { i2c }
    }

    /// Read a single SPD byte.
    pub fn read_byte(&mut self, addr: u8, offset: u8) -> Result<u8, SpdError> {
        let mut buf = [0; 1];
        self.read_block(addr, offset, &mut buf)?;
        Ok(buf[0])
    }

    fn read_block(&mut self, addr: u8, offset: u8, buf: &mut [u8]) -> Result<(), SpdError> {
        use embedded_hal::i2c::Error;
        self.i2c
            .write_read(addr, &[offset], buf)
            .map_err(|e| match e.kind() {
                ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address) => SpdError::NoDevice(addr),
                kind => SpdError::Bus { addr, kind },
            })
    }

    /// Probe and read one slot.
    ///
    /// A slot is populated if both the EEPROM size and the total size bytes are non-zero.
    pub fn read_slot(&mut self, index: usize, cfg: &SlotConfig) -> SlotDescriptor {
        let state = match self.probe(cfg.spd_addr) {
            Ok(true) => SlotState::Populated,
            Ok(false) => SlotState::Empty,
            Err(SpdError::NoDevice(_)) => SlotState::Empty,
            Err(SpdError::Bus { kind, .. }) => SlotState::ReadError(kind),
        };
        let mut spd = SpdData::empty();
        let state = match state {
            SlotState::Populated => match self.read_block(cfg.spd_addr, 0, &mut spd.0) {
                Ok(()) => SlotState::Populated,
                Err(SpdError::NoDevice(_)) => SlotState::Empty,
                Err(SpdError::Bus { kind, .. }) => SlotState::ReadError(kind),
            },
            other => other,
        };
        if !matches!(state, SlotState::Populated) {
            spd = SpdData::empty();
        }
        match state {
            SlotState::Populated => log::debug!(
                "slot {} (SPD {:#04x}): populated, type {:#04x}",
                index,
                cfg.spd_addr,
                spd.byte(offsets::MEMORY_TYPE)
            ),
            SlotState::Empty => log::debug!("slot {} (SPD {:#04x}): empty", index, cfg.spd_addr),
            SlotState::ReadError(kind) => log::warn!(
                "slot {} (SPD {:#04x}): read error {:?}, treated as empty",
                index,
                cfg.spd_addr,
                kind
            ),
        }
        SlotDescriptor::new(index, cfg, state, spd)
    }

    fn probe(&mut self, addr: u8) -> Result<bool, SpdError> {
        let eeprom_size = self.read_byte(addr, offsets::EEPROM_SIZE)?;
        let total_size = self.read_byte(addr, offsets::TOTAL_SIZE)?;
        Ok(eeprom_size != 0 && total_size != 0)
    }
}

/// Read all slots of the board.
pub fn read_slots<I2C: I2c>(
    i2c: &mut I2C,
    board: &BoardConfig,
) -> heapless::Vec<SlotDescriptor, MAX_SLOTS> {
    let mut reader = SpdReader::new(i2c);
    let mut slots = heapless::Vec::new();
    for (index, cfg) in board.slots.iter().enumerate() {
        // The board slot table has the same capacity.
        let _ = slots.push(reader.read_slot(index, cfg));
    }
    slots
}
