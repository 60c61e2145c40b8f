//! IBM DDR2 SDRAM controller registers (440SP/440SPe/460EX/460GT).
//!
//! This controller drives both DDR1 and DDR2 modules. All offsets are indirect offsets written
//! to [crate::SDRAM0_CFGADDR].
use arbitrary_int::{u2, u3, u4, u5, u6, u7, u9, u11};

pub const MCSTAT: u16 = 0x14;
pub const MCOPT1: u16 = 0x20;
pub const MCOPT2: u16 = 0x21;
pub const MODT0: u16 = 0x22;
pub const MODT1: u16 = 0x23;
pub const MODT2: u16 = 0x24;
pub const MODT3: u16 = 0x25;
pub const CODT: u16 = 0x26;
pub const RTR: u16 = 0x30;
pub const MB0CF: u16 = 0x40;
pub const INITPLR0: u16 = 0x50;
pub const RQDC: u16 = 0x70;
pub const RFDC: u16 = 0x74;
pub const RDCC: u16 = 0x78;
pub const DLCR: u16 = 0x7A;
pub const CLKTR: u16 = 0x80;
pub const WRDTR: u16 = 0x81;
pub const SDTR1: u16 = 0x85;
pub const SDTR2: u16 = 0x86;
pub const SDTR3: u16 = 0x87;
pub const MMODE: u16 = 0x88;
pub const MEMODE: u16 = 0x89;
pub const ECCCR: u16 = 0x98;
pub const RTSR: u16 = 0xB1;

pub const NUM_BANK_REGS: usize = 4;
pub const NUM_INITPLR: usize = 16;

pub const fn mbxcf(index: usize) -> u16 {
    MB0CF + ((index as u16) << 2)
}

pub const fn modt(index: usize) -> u16 {
    MODT0 + index as u16
}

pub const fn initplr(index: usize) -> u16 {
    INITPLR0 + index as u16
}

static_assertions::const_assert_eq!(mbxcf(3), 0x4c);
static_assertions::const_assert_eq!(modt(3), 0x25);
static_assertions::const_assert_eq!(initplr(15), 0x5f);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct McStat {
    /// Memory initialization complete.
    #[bit(31, r)]
    mic: bool,
    /// Self-refresh mode status.
    #[bit(30, r)]
    srms: bool,
    /// Controller idle.
    #[bit(29, r)]
    idle: bool,
}

#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum EccMode {
    None = 0b00,
    CheckOnly = 0b01,
    Generate = 0b10,
    CheckAndReport = 0b11,
}

#[bitbybit::bitenum(u1, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum DataWidth {
    Bits32 = 0,
    Bits64 = 1,
}

#[bitbybit::bitenum(u1, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum MemoryType {
    Ddr1 = 0,
    Ddr2 = 1,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct McOpt1 {
    #[bits(28..=29, rw)]
    mchk: EccMode,
    /// Registered DIMM enable.
    #[bit(27, rw)]
    rden: bool,
    /// Page management unit. 0b10 keeps pages open.
    #[bits(25..=26, rw)]
    pmu: u2,
    #[bit(24, rw)]
    dmwd: DataWidth,
    #[bits(22..=23, rw)]
    uios: u2,
    /// Eight internal banks when set, four otherwise.
    #[bit(21, rw)]
    eight_banks: bool,
    #[bit(20, rw)]
    ddr_type: MemoryType,
    #[bit(17, rw)]
    qdep: bool,
    /// Read/write out-of-order disable.
    #[bit(15, rw)]
    rwoo: bool,
    /// Write out-of-order disable.
    #[bit(14, rw)]
    wooo: bool,
    /// Data coherency out-of-order disable.
    #[bit(13, rw)]
    dcoo: bool,
    /// Disable refresh.
    #[bit(12, rw)]
    dref: bool,
}

pub const MCOPT1_PMU_OPEN: u2 = u2::new(0b10);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct McOpt2 {
    /// Self-refresh entry.
    #[bit(31, rw)]
    sren: bool,
    #[bit(30, rw)]
    pmen: bool,
    /// Run the initialization preload sequence.
    #[bit(29, rw)]
    iptr: bool,
    /// Prevent self-refresh exit.
    #[bit(28, rw)]
    xsrp: bool,
    /// Controller enable.
    #[bit(27, rw)]
    dcen: bool,
    /// Initialization sequence interrupt enable.
    #[bit(26, rw)]
    isie: bool,
}

/// Bit offset of a rank's read ODT enable inside the ODT rank field.
pub const fn odt_read(rank: usize) -> u8 {
    1 << (2 * rank)
}

/// Bit offset of a rank's write ODT enable inside the ODT rank field.
pub const fn odt_write(rank: usize) -> u8 {
    1 << (2 * rank + 1)
}

static_assertions::const_assert_eq!(odt_read(3), 0x40);
static_assertions::const_assert_eq!(odt_write(0), 0x02);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Codt {
    #[bit(31, rw)]
    odt_on: bool,
    /// Read/write ODT enables for ranks 0 to 3. See [odt_read] and [odt_write].
    #[bits(23..=30, rw)]
    ranks: u8,
    /// DQS receivers run at 1.8 V (DDR2) when set, 2.5 V (DDR1) otherwise.
    #[bit(5, rw)]
    dqs_1_8v: bool,
    #[bit(4, rw)]
    dqs_single_ended: bool,
    #[bit(3, rw)]
    ck_single_ended: bool,
    #[bit(2, rw)]
    feedback_rcv_single_ended: bool,
    #[bit(1, rw)]
    feedback_drv_single_ended: bool,
    #[bit(0, rw)]
    io_nmode: bool,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Modt {
    #[bits(23..=30, rw)]
    ranks: u8,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Rtr {
    /// Refresh interval in memory clock cycles. The low three bits are not implemented.
    #[bits(16..=31, rw)]
    rint: u16,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct MbxCf {
    /// Addressing mode. Column bits minus 8, plus 5 for parts with 8 internal banks.
    #[bits(8..=11, rw)]
    addr_mode: u4,
    #[bit(0, rw)]
    enable: bool,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Initplr {
    #[bit(31, rw)]
    enable: bool,
    /// Number of memory clocks to wait after the command.
    #[bits(23..=30, rw)]
    wait: u8,
    #[bits(19..=22, rw)]
    command: u4,
    /// Mode register select.
    #[bits(16..=18, rw)]
    bank: u3,
    #[bits(0..=15, rw)]
    addr: u16,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Rqdc {
    /// Internal DQS delay mechanism enable.
    #[bit(31, rw)]
    rqde: bool,
    #[bits(0..=8, rw)]
    rqfd: u9,
}

pub const RQFD_MAX: u32 = 0x1FF;

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Rfdc {
    /// Auto read sample cycle detection disable.
    #[bit(31, rw)]
    arse: bool,
    #[bits(16..=22, rw)]
    rfos: u7,
    #[bits(0..=10, rw)]
    rffd: u11,
}

pub const RFFD_MAX: u32 = 0x7FF;

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Rdcc {
    /// Read data sample select, T1 to T4.
    #[bits(30..=31, rw)]
    rdss: u2,
    /// Read sample cycle auto-update disable.
    #[bit(0, rw)]
    rsae: bool,
}

pub const RDCC_RDSS_T4: u2 = u2::new(0b11);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Dlcr {
    /// Manual calibration mode.
    #[bit(31, rw)]
    dclm: bool,
    #[bit(27, rw)]
    calibrate: bool,
    #[bits(24..=26, r)]
    status: u3,
    /// Delay line calibration value.
    #[bits(0..=8, r)]
    dlcv: u9,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct ClkTr {
    /// Clock phase. 0: 0 degrees, 1: 90 degrees advanced, 2: 180, 3: 270.
    #[bits(30..=31, rw)]
    clkp: u2,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct WrDtr {
    /// Leading write pulse disable.
    #[bit(28, rw)]
    llwp: bool,
    /// Write timing phase. 0b010 advances by 90 degrees.
    #[bits(25..=27, rw)]
    wtr: u3,
}

pub const WRDTR_WTR_90_DEG_ADV: u3 = u3::new(0b010);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Sdtr1 {
    /// Leadoff. Set for 2 clocks.
    #[bit(31, rw)]
    ldof: bool,
    /// Read to write turnaround in clocks.
    #[bits(20..=23, rw)]
    rtw: u4,
    /// Write to write turnaround between ranks.
    #[bits(16..=19, rw)]
    wtwo: u4,
    /// Read to read turnaround between ranks.
    #[bits(12..=15, rw)]
    rtro: u4,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Sdtr2 {
    #[bits(28..=31, rw)]
    rcd: u4,
    #[bits(24..=27, rw)]
    wtr: u4,
    /// Self-refresh exit to non-read command.
    #[bits(16..=23, rw)]
    xsnr: u8,
    /// Write to precharge.
    #[bits(12..=15, rw)]
    wpc: u4,
    /// Read to precharge.
    #[bits(8..=11, rw)]
    rpc: u4,
    #[bits(4..=7, rw)]
    rp: u4,
    #[bits(0..=3, rw)]
    rrd: u4,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Sdtr3 {
    #[bits(24..=28, rw)]
    ras: u5,
    #[bits(16..=20, rw)]
    rc: u5,
    /// Self-refresh exit to any command.
    #[bits(8..=12, rw)]
    xcs: u5,
    #[bits(0..=5, rw)]
    rfc: u6,
}

pub const SDTR3_XCS_DEFAULT: u5 = u5::new(0x0D);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct MMode {
    /// Write recovery for DDR2, encoded as cycles - 1. Zero for DDR1.
    #[bits(9..=11, rw)]
    wr: u3,
    /// CAS latency. DDR1 uses 2, 6 and 3 for 2.0, 2.5 and 3.0.
    #[bits(4..=6, rw)]
    dcl: u3,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct MEMode {
    #[bit(10, rw)]
    dqs_disable: bool,
    #[bit(6, rw)]
    rtt_150: bool,
    #[bit(2, rw)]
    rtt_75: bool,
    #[bit(1, rw)]
    dic_weak: bool,
    #[bit(0, rw)]
    dll_disable: bool,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Rtsr {
    /// Tracking state machine 1 status.
    #[bits(30..=31, r)]
    trk1sm: u2,
}

pub const RTSR_TRK1SM_ATPLS1: u2 = u2::new(0b10);
