//! # Board configuration
//!
//! Everything the SDRAM bring-up needs to know about the board which can not be read from the
//! SPD EEPROMs: the controller generation, the memory bus clock, where the modules sit on the
//! I2C bus and which controller bank register each module slot feeds.
use crate::time::Hertz;

/// Maximum number of module slots a board may describe.
pub const MAX_SLOTS: usize = 4;
/// Number of controller bank registers for both controller generations.
pub const MAX_BANKS: usize = 4;
/// Maximum number of ranks, per slot and in total.
pub const MAX_RANKS: usize = 4;

pub const DEFAULT_MAX_MEM_MAPPED: u64 = 2 * 1024 * 1024 * 1024;
pub const DEFAULT_INIT_POLL_LIMIT: u32 = 1_000_000;
pub const DEFAULT_IDLE_POLL_LIMIT: u32 = 1_000_000;
/// Upper bound of the starting RQFD value for the DDR2 calibration retry loop.
pub const DEFAULT_RQFD_RETRY_LIMIT: u32 = 0x1FF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    /// SDRAM0 controller of the 440GP/GX/EP/GR. Only DDR1 modules are supported.
    Ddr1,
    /// IBM DDR2 controller of the 440SP/SPe/460. Drives DDR1 or DDR2 modules.
    Ddr2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotConfig {
    /// 7-bit I2C address of the SPD EEPROM.
    pub spd_addr: u8,
    /// Controller bank register used by the first rank of this slot. Further ranks use the
    /// following registers.
    pub first_bank: u8,
}

impl SlotConfig {
    pub const fn new(spd_addr: u8, first_bank: u8) -> Self {
        Self {
            spd_addr,
            first_bank,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub controller: ControllerKind,
    /// Memory bus clock. This is the PLB clock for the DDR1 controller and the DDR clock for the
    /// DDR2 controller.
    pub bus_clock: Hertz,
    /// Physical base address of the DRAM window.
    pub sdram_base: u64,
    /// Maximum amount of memory which is mapped and tested. Larger installations are truncated
    /// to this size.
    pub max_mem_mapped: u64,
    pub slots: heapless::Vec<SlotConfig, MAX_SLOTS>,
    /// Iterations to wait for the controller initialization complete flag.
    pub init_poll_limit: u32,
    /// Iterations to wait for the controller to become idle during ECC priming.
    pub idle_poll_limit: u32,
    /// Enable ECC if all modules support it.
    pub ecc_permitted: bool,
    /// Re-read every calibration pattern 64 times on the DDR2 controller.
    pub ddr2_reread: bool,
    /// The DDR2 calibration retries with an incremented RQFD start value until this bound.
    pub rqfd_retry_limit: u32,
}

impl BoardConfig {
    /// Create a board configuration with default limits.
    ///
    /// Slots beyond [MAX_SLOTS] are ignored.
    pub fn new(controller: ControllerKind, bus_clock: Hertz, slots: &[SlotConfig]) -> Self {
        if slots.len() > MAX_SLOTS {
            log::warn!(
                "{} module slots configured, only the first {} are used",
                slots.len(),
                MAX_SLOTS
            );
        }
        Self {
            controller,
            bus_clock,
            sdram_base: 0,
            max_mem_mapped: DEFAULT_MAX_MEM_MAPPED,
            slots: slots.iter().copied().take(MAX_SLOTS).collect(),
            init_poll_limit: DEFAULT_INIT_POLL_LIMIT,
            idle_poll_limit: DEFAULT_IDLE_POLL_LIMIT,
            ecc_permitted: true,
            ddr2_reread: true,
            rqfd_retry_limit: DEFAULT_RQFD_RETRY_LIMIT,
        }
    }

    /// Ebony and Ocotea: two DDR1 DIMM sockets feeding banks 0/1 and 2/3.
    pub fn ebony_ocotea(bus_clock: Hertz) -> Self {
        Self::new(
            ControllerKind::Ddr1,
            bus_clock,
            &[SlotConfig::new(0x53, 0), SlotConfig::new(0x52, 2)],
        )
    }

    /// Bamboo: one soldered DDR1 bank plus two single rank sockets.
    pub fn bamboo(bus_clock: Hertz) -> Self {
        Self::new(
            ControllerKind::Ddr1,
            bus_clock,
            &[
                SlotConfig::new(0x53, 0),
                SlotConfig::new(0x52, 1),
                SlotConfig::new(0x51, 3),
            ],
        )
    }

    /// Sequoia, Katmai and other DDR2 controller boards with two DIMM sockets.
    pub fn sequoia_katmai(bus_clock: Hertz) -> Self {
        Self::new(
            ControllerKind::Ddr2,
            bus_clock,
            &[SlotConfig::new(0x50, 0), SlotConfig::new(0x51, 2)],
        )
    }

    pub fn with_sdram_base(mut self, base: u64) -> Self {
        self.sdram_base = base;
        self
    }

    pub fn with_max_mem_mapped(mut self, max: u64) -> Self {
        self.max_mem_mapped = max;
        self
    }

    pub fn with_poll_limits(mut self, init: u32, idle: u32) -> Self {
        self.init_poll_limit = init;
        self.idle_poll_limit = idle;
        self
    }

    pub fn with_ecc_permitted(mut self, permitted: bool) -> Self {
        self.ecc_permitted = permitted;
        self
    }

    pub fn with_ddr2_reread(mut self, reread: bool) -> Self {
        self.ddr2_reread = reread;
        self
    }

    pub fn with_rqfd_retry_limit(mut self, limit: u32) -> Self {
        self.rqfd_retry_limit = limit;
        self
    }

    /// Number of reads per pattern word during the calibration memory test.
    pub fn memtest_reread_loops(&self) -> u32 {
        match self.controller {
            ControllerKind::Ddr2 if self.ddr2_reread => 64,
            _ => 1,
        }
    }
}
