//! Low-level DDR2 controller register values.
//!
//! Pure functions computing register contents from the validated module configuration. The
//! controller driver in the parent module writes them in the required order.
use arbitrary_int::{u2, u3, u4, u5, u6, u11};
use ppc44x_sdram::{
    ddr2::{MemoryType as ControllerMemoryType, *},
    mq::{RankSize, RxBas},
};

use super::Ddr2Error;
use crate::{
    board::MAX_BANKS,
    geometry::AddressMap,
    spd::{MemoryType, SlotDescriptor},
    time::Hertz,
    timing::{CasLatency, TimingSet, clamp_cycles},
    validate::{Capabilities, DataWidth as HalDataWidth},
};

/// Modules with other than four internal banks use the eight bank addressing.
pub fn eight_banks(slots: &[SlotDescriptor]) -> bool {
    slots
        .iter()
        .filter(|s| s.populated())
        .any(|s| s.bank_count() != 4)
}

/// Options set before the initialization: self-refresh entry, no power management and the
/// initialization preload sequence idle.
pub fn mcopt2_preinit(prev: McOpt2) -> McOpt2 {
    prev.with_sren(true)
        .with_pmen(false)
        .with_iptr(false)
        .with_xsrp(false)
        .with_isie(true)
}

/// Enable the controller and execute the preload sequence.
pub fn mcopt2_enable(prev: McOpt2) -> McOpt2 {
    prev.with_sren(false)
        .with_isie(false)
        .with_dcen(true)
        .with_iptr(true)
}

pub fn mcopt1_value(prev: McOpt1, caps: &Capabilities, eight_banks: bool) -> McOpt1 {
    prev.with_mchk(if caps.ecc {
        EccMode::Generate
    } else {
        EccMode::None
    })
    .with_rden(caps.registered)
    .with_pmu(MCOPT1_PMU_OPEN)
    .with_dmwd(match caps.data_width {
        HalDataWidth::Bits32 => DataWidth::Bits32,
        HalDataWidth::Bits64 => DataWidth::Bits64,
    })
    .with_uios(u2::new(0))
    .with_eight_banks(eight_banks)
    .with_ddr_type(match caps.memory_type {
        MemoryType::Ddr2 => ControllerMemoryType::Ddr2,
        _ => ControllerMemoryType::Ddr1,
    })
    .with_qdep(true)
    .with_rwoo(true)
    .with_wooo(true)
    .with_dcoo(true)
    .with_dref(false)
}

/// On-die termination for the controller and the modules.
///
/// The controller terminates reads on every populated rank. For DDR2 modules, writes to a
/// single DIMM are terminated by the DIMM itself, while with two DIMMs each one terminates the
/// accesses to the other.
pub fn odt_values(prev: Codt, map: &AddressMap, ddr2: bool) -> (Codt, [Modt; MAX_BANKS]) {
    let mut read = 0u8;
    for bank in &map.banks {
        read |= odt_read(bank.controller_bank_index as usize);
    }
    let codt = prev
        .with_io_nmode(true)
        .with_dqs_single_ended(false)
        .with_ck_single_ended(false)
        .with_feedback_rcv_single_ended(false)
        .with_feedback_drv_single_ended(false)
        .with_dqs_1_8v(ddr2)
        .with_ranks(prev.ranks() | read);

    let mut modt = [Modt::new_with_raw_value(0); MAX_BANKS];
    if !ddr2 {
        return (codt, modt);
    }

    // First controller bank and ODT bits per populated slot.
    let mut dimms: heapless::Vec<(usize, u8, u8), MAX_BANKS> = heapless::Vec::new();
    for bank in &map.banks {
        let index = bank.controller_bank_index;
        let rw = odt_read(index as usize) | odt_write(index as usize);
        if let Some(dimm) = dimms.iter_mut().find(|d| d.0 == bank.slot) {
            dimm.1 = dimm.1.min(index);
            dimm.2 |= rw;
        } else {
            let _ = dimms.push((bank.slot, index, rw));
        }
    }

    match dimms.as_slice() {
        [(_, first, bits)] => {
            // Write termination only.
            let write_bits = bits & 0xAA;
            modt[*first as usize] = Modt::new_with_raw_value(0).with_ranks(write_bits);
        }
        [(_, first_a, bits_a), (_, first_b, bits_b)] => {
            modt[*first_a as usize] = Modt::new_with_raw_value(0).with_ranks(*bits_b);
            modt[*first_b as usize] = Modt::new_with_raw_value(0).with_ranks(*bits_a);
        }
        _ => (),
    }
    (codt, modt)
}

pub fn rtr_value(refresh_interval_cycles: u32) -> Rtr {
    let rint = refresh_interval_cycles.min(0xFFF8) & 0xFFF8;
    Rtr::new_with_raw_value(0).with_rint(rint as u16)
}

pub fn mmode_value(timing: &TimingSet, memory_type: MemoryType) -> Result<MMode, Ddr2Error> {
    let ddr2 = memory_type == MemoryType::Ddr2;
    let dcl = match (ddr2, timing.cas_latency) {
        (false, CasLatency::Cl2_0) => 2,
        (false, CasLatency::Cl2_5) => 6,
        (false, CasLatency::Cl3_0) => 3,
        (true, CasLatency::Cl3_0) => 3,
        (true, CasLatency::Cl4_0) => 4,
        (true, CasLatency::Cl5_0) => 5,
        (_, cas) => return Err(Ddr2Error::UnsupportedCasLatency(cas)),
    };
    let wr = if ddr2 {
        clamp_cycles(timing.twr_cycles, 3, 6) - 1
    } else {
        0
    };
    Ok(MMode::new_with_raw_value(0)
        .with_wr(u3::new(wr as u8))
        .with_dcl(u3::new(dcl)))
}

pub fn wrdtr_value() -> WrDtr {
    WrDtr::new_with_raw_value(0)
        .with_llwp(false)
        .with_wtr(WRDTR_WTR_90_DEG_ADV)
}

pub fn sdtr1_value() -> Sdtr1 {
    Sdtr1::new_with_raw_value(0)
        .with_ldof(true)
        .with_rtw(u4::new(2))
        .with_wtwo(u4::new(0))
        .with_rtro(u4::new(1))
}

pub fn sdtr2_value(timing: &TimingSet, memory_type: MemoryType, freq: Hertz) -> Sdtr2 {
    let (wtr, wpc, rpc) = if memory_type == MemoryType::Ddr2 {
        (
            clamp_cycles(timing.twtr_cycles, 1, 4),
            clamp_cycles(timing.twr_cycles, 2, 6),
            clamp_cycles(timing.trtp_cycles, 2, 4),
        )
    } else if freq.raw() < 200_000_000 {
        (1, 2, 2)
    } else {
        (2, 3, 2)
    };
    Sdtr2::new_with_raw_value(0)
        .with_rcd(u4::new(clamp_cycles(timing.trcd_cycles, 1, 5) as u8))
        .with_wtr(u4::new(wtr as u8))
        .with_xsnr(0x10)
        .with_wpc(u4::new(wpc as u8))
        .with_rpc(u4::new(rpc as u8))
        .with_rp(u4::new(clamp_cycles(timing.trp_cycles, 3, 7) as u8))
        .with_rrd(u4::new(clamp_cycles(timing.trrd_cycles, 2, 3) as u8))
}

pub fn sdtr3_value(timing: &TimingSet) -> Sdtr3 {
    Sdtr3::new_with_raw_value(0)
        .with_ras(u5::new(timing.tras_cycles.min(0x1F) as u8))
        .with_rc(u5::new(timing.trc_cycles.min(0x1F) as u8))
        .with_xcs(SDTR3_XCS_DEFAULT)
        .with_rfc(u6::new(timing.trfc_cycles.min(0x3F) as u8))
}

/// DLL enabled, normal drive strength, 150 Ohm termination and DQS enabled.
pub fn memode_value(prev: MEMode) -> MEMode {
    prev.with_dic_weak(false)
        .with_dll_disable(false)
        .with_rtt_75(false)
        .with_rtt_150(true)
        .with_dqs_disable(false)
}

pub fn mbxcf_value(addr_mode: u8) -> MbxCf {
    MbxCf::new_with_raw_value(0)
        .with_addr_mode(u4::new(addr_mode & 0xF))
        .with_enable(true)
}

/// Memory queue rank base register. Returns [None] for unsupported rank sizes.
pub fn rxbas_value(base: u64, size_bytes: u64) -> Option<RxBas> {
    let size = RankSize::from_megabytes((size_bytes >> 20) as u32)?;
    let base: u11 = RxBas::encode_base(base);
    Some(RxBas::new_with_raw_value(0).with_base(base).with_size(size))
}

/// One INITPLR entry and the time to wait after writing it.
#[derive(Debug, Clone, Copy)]
pub struct PreloadStep {
    pub value: Initplr,
    pub delay_us: u32,
}

/// Initialization sequence for DDR1 modules on the DDR2 controller.
pub const DDR1_PRELOAD: [u32; 8] = [
    0x81B8_0000,
    0x8190_0400,
    0x8181_0000,
    0xff80_0162,
    0x8190_0400,
    0x8608_0000,
    0x8608_0000,
    0x8100_0062,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Command {
    ModeRegister = 0,
    Refresh = 1,
    Precharge = 2,
    Nop = 7,
}

/// Mode register select values.
const MR: u8 = 0;
const EMR: u8 = 1;
const EMR2: u8 = 2;
const EMR3: u8 = 3;

const MR_BURST_LEN_4: u16 = 0x2;
const MR_WRITE_RECOVERY_3: u16 = 2 << 9;
const MR_DLL_RESET: u16 = 0x100;
const EMR_ODT_75_OHM: u16 = 0x04;
const EMR_ODT_150_OHM: u16 = 0x40;
const EMR_ODS_REDUCED: u16 = 0x02;
const EMR_OCD_DEFAULT: u16 = 0x380;
/// Precharge all banks.
const ADDR_A10: u16 = 0x400;

/// Wait while the DLL locks.
pub const DLL_DELAY_US: u32 = 1000;

const fn step(wait: u8, command: Command, bank: u8, addr: u16, delay_us: u32) -> PreloadStep {
    PreloadStep {
        value: Initplr::new_with_raw_value(0)
            .with_enable(true)
            .with_wait(wait)
            .with_command(u4::new(command as u8))
            .with_bank(u3::new(bank))
            .with_addr(addr),
        delay_us,
    }
}

/// Initialization preload sequence for the installed module type.
///
/// The DDR2 sequence follows the JEDEC power-up procedure. Write recovery in the mode register
/// is fixed to 3 cycles, independent of the MMODE setting.
pub fn initplr_sequence(
    memory_type: MemoryType,
    cas: CasLatency,
    dimm_count: u32,
) -> Result<heapless::Vec<PreloadStep, NUM_INITPLR>, Ddr2Error> {
    let mut seq = heapless::Vec::new();
    if memory_type != MemoryType::Ddr2 {
        for raw in DDR1_PRELOAD {
            let _ = seq.push(PreloadStep {
                value: Initplr::new_with_raw_value(raw),
                delay_us: 0,
            });
        }
        return Ok(seq);
    }

    let cl: u16 = match cas {
        CasLatency::Cl3_0 => 3,
        CasLatency::Cl4_0 => 4,
        CasLatency::Cl5_0 => 5,
        other => return Err(Ddr2Error::UnsupportedCasLatency(other)),
    };
    let emr = match dimm_count {
        1 => EMR_ODT_150_OHM,
        2 => EMR_ODT_75_OHM | EMR_ODS_REDUCED,
        n => return Err(Ddr2Error::UnsupportedDimmCount(n)),
    };
    let mr = MR_BURST_LEN_4 | MR_WRITE_RECOVERY_3 | (cl << 4);

    let steps = [
        step(0x6A, Command::Nop, 0, 0, DLL_DELAY_US),
        step(4, Command::Precharge, 0, ADDR_A10, 0),
        step(1, Command::ModeRegister, EMR2, 0, 0),
        step(1, Command::ModeRegister, EMR3, 0, 0),
        // DLL enable.
        step(1, Command::ModeRegister, EMR, emr, 0),
        step(1, Command::ModeRegister, MR, mr | MR_DLL_RESET, DLL_DELAY_US),
        step(4, Command::Precharge, 0, ADDR_A10, 0),
        step(0x14, Command::Refresh, 0, 0, 0),
        step(0x14, Command::Refresh, 0, 0, 0),
        step(0x14, Command::Refresh, 0, 0, 0),
        step(0x14, Command::Refresh, 0, 0, 0),
        step(0, Command::ModeRegister, MR, mr, 0),
        step(1, Command::ModeRegister, EMR, emr | EMR_OCD_DEFAULT, 0),
        step(1, Command::ModeRegister, EMR, emr, 0),
    ];
    for s in steps {
        let _ = seq.push(s);
    }
    Ok(seq)
}
