//! DDR1 SDRAM0 controller registers (440GP/GX/EP/GR).
//!
//! All offsets are indirect offsets written to [crate::SDRAM0_CFGADDR].
use arbitrary_int::{u2, u3, u9, u14};

pub const CFG0: u16 = 0x20;
pub const CFG1: u16 = 0x21;
pub const DEVOPT: u16 = 0x22;
pub const MCSTS: u16 = 0x24;
pub const RTR: u16 = 0x30;
pub const B0CR: u16 = 0x40;
pub const TR0: u16 = 0x80;
pub const TR1: u16 = 0x81;
pub const CLKTR: u16 = 0x82;
pub const DLYCAL: u16 = 0x84;
pub const ECCESR: u16 = 0x98;

/// Number of bank configuration registers.
pub const NUM_BANK_REGS: usize = 4;

/// Offset of the bank configuration register with the given index.
pub const fn bxcr(index: usize) -> u16 {
    B0CR + ((index as u16) << 2)
}

static_assertions::const_assert_eq!(bxcr(3), 0x4c);

#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum EccMode {
    None = 0b00,
    Reserved = 0b01,
    Generate = 0b10,
    GenerateAndCheck = 0b11,
}

#[bitbybit::bitenum(u1, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum DataWidth {
    Bits32 = 0,
    Bits64 = 1,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Cfg0 {
    /// Controller enable. Must only be set after every other register was configured.
    #[bit(31, rw)]
    dcen: bool,
    #[bits(28..=29, rw)]
    mchk: EccMode,
    /// Registered DIMM enable.
    #[bit(27, rw)]
    rden: bool,
    /// Page management unit disable.
    #[bit(26, rw)]
    pmud: bool,
    #[bit(25, rw)]
    dmwd: DataWidth,
    #[bits(22..=23, rw)]
    uios: u2,
    /// Page deallocation policy.
    #[bit(21, rw)]
    pdp: bool,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Cfg1 {
    /// Self-refresh entry.
    #[bit(31, rw)]
    sre: bool,
    /// Power management enable.
    #[bit(30, rw)]
    pmen: bool,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct McSts {
    /// Memory controller ready after the initialization sequence completed.
    #[bit(31, r)]
    mrsc: bool,
    /// Self-refresh mode status.
    #[bit(30, r)]
    srms: bool,
    #[bit(29, r)]
    cis: bool,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Rtr {
    /// Refresh interval in memory clock cycles. Only bits 3 to 13 of the count are implemented.
    #[bits(16..=29, rw)]
    interval: u14,
}

/// Bank size encodings of the BxCR SDSZ field.
#[bitbybit::bitenum(u3, exhaustive = false)]
#[derive(Debug, PartialEq, Eq)]
pub enum BankSize {
    _8M = 1,
    _16M = 2,
    _32M = 3,
    _64M = 4,
    _128M = 5,
    _256M = 6,
    _512M = 7,
}

impl BankSize {
    pub const fn from_megabytes(mb: u32) -> Option<Self> {
        Some(match mb {
            8 => Self::_8M,
            16 => Self::_16M,
            32 => Self::_32M,
            64 => Self::_64M,
            128 => Self::_128M,
            256 => Self::_256M,
            512 => Self::_512M,
            _ => return None,
        })
    }

    pub const fn megabytes(&self) -> u32 {
        match self {
            Self::_8M => 8,
            Self::_16M => 16,
            Self::_32M => 32,
            Self::_64M => 64,
            Self::_128M => 128,
            Self::_256M => 256,
            Self::_512M => 512,
        }
    }
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct BxCr {
    /// Base address bits 31..23, so banks are aligned to 8 MB.
    #[bits(23..=31, rw)]
    base: u9,
    #[bits(17..=19, rw)]
    size: Option<BankSize>,
    /// Addressing mode. Mode 1 (raw value 0) is used for 8 column bits, mode 4 for 11.
    #[bits(13..=15, rw)]
    addr_mode: u3,
    #[bit(0, rw)]
    enable: bool,
}

impl BxCr {
    pub const fn base_address(&self) -> u32 {
        (self.base().value() as u32) << 23
    }
}

#[bitbybit::bitenum(u2, exhaustive = false)]
#[derive(Debug, PartialEq, Eq)]
pub enum CasLatency {
    _2_0 = 0b01,
    _2_5 = 0b10,
    _3_0 = 0b11,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Tr0 {
    /// Write recovery. 0: 2 clocks, 1: 3 clocks.
    #[bit(31, rw)]
    sdwr: bool,
    /// Write command to data delay. 0: 0 clocks, 1: 1 clock.
    #[bit(30, rw)]
    sdwd: bool,
    #[bits(23..=24, rw)]
    sdcl: Option<CasLatency>,
    /// Precharge to activate, encoded as clocks - 1 with a range of 2 to 4 clocks.
    #[bits(18..=19, rw)]
    sdpa: u2,
    /// Activate to precharge minus RAS to CAS, encoded as clocks - 2.
    #[bits(16..=17, rw)]
    sdcp: u2,
    /// Leadoff. 0: 1 clock, 1: 2 clocks.
    #[bits(14..=15, rw)]
    sdld: u2,
    /// Refresh to activate, encoded as clocks - 6.
    #[bits(2..=4, rw)]
    sdra: u3,
    /// RAS to CAS delay, encoded as clocks - 1.
    #[bits(0..=1, rw)]
    sdrd: u2,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Tr1 {
    /// Read data sample select.
    #[bits(30..=31, rw)]
    rdss: u2,
    /// Read data stage select.
    #[bits(22..=23, rw)]
    rdsl: u2,
    /// Read data capture delay. Selects the half cycle used to capture read data.
    #[bit(11, rw)]
    rdcd: bool,
    /// Read data capture tap.
    #[bits(0..=8, rw)]
    rdct: u9,
}

pub const TR1_RDSS_TR1: u2 = u2::new(0b01);
pub const TR1_RDSS_TR2: u2 = u2::new(0b10);
pub const TR1_RDSL_STAGE2: u2 = u2::new(0b01);
pub const TR1_RDSL_STAGE3: u2 = u2::new(0b10);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct ClkTr {
    /// Clock phase. 0b01 advances the memory clock by 90 degrees.
    #[bits(30..=31, rw)]
    clkp: u2,
    #[bits(0..=8, rw)]
    dcdt: u9,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct DlyCal {
    /// Delay line calibration value. The number of usable capture taps is this value times 4.
    #[bits(2..=9, r)]
    dlcv: u8,
}
