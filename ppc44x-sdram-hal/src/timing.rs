//! # Timing calculator
//!
//! Converts the nanosecond SPD timings of all populated modules into memory clock cycles at the
//! configured bus frequency. All conversions round up, so a cycle count always covers the
//! requirement of the slowest module.
use crate::{
    spd::{MemoryType, SlotDescriptor, offsets},
    time::Hertz,
};

/// Cycle time of one bus clock in units of 10 ps. `freq` must not be zero.
pub const fn bus_period_10ps(freq: Hertz) -> u32 {
    (100_000_000_000u64 / freq.raw() as u64) as u32
}

/// Decode an SPD cycle time byte into units of 10 ps.
///
/// The high nibble holds whole nanoseconds. The low nibble holds tenths, except for
/// 0xA to 0xD which encode .25, .33, .66 and .75 ns. 0xE and 0xF are invalid.
pub const fn decode_tck(raw: u8) -> Option<u32> {
    let whole = (raw >> 4) as u32 * 100;
    let frac = match raw & 0x0F {
        n @ 0..=9 => n as u32 * 10,
        0xA => 25,
        0xB => 33,
        0xC => 66,
        0xD => 75,
        _ => return None,
    };
    Some(whole + frac)
}

/// Convert nanoseconds to clock cycles, rounding up.
///
/// The truncated cycle count is converted back and incremented if it falls short of the
/// requirement.
pub const fn ns_to_cycles(ns: u32, freq: Hertz) -> u32 {
    let freq = freq.raw() as u64;
    let ns = ns as u64;
    let mut clk = freq * ns / 1_000_000_000;
    if ns != 0 && 1_000_000_000 * clk / ns != freq {
        clk += 1;
    }
    clk as u32
}

/// Clamp a cycle count into the range of a register field.
#[inline]
pub const fn clamp_cycles(cycles: u32, min: u32, max: u32) -> u32 {
    if cycles < min {
        min
    } else if cycles > max {
        max
    } else {
        cycles
    }
}

/// Refresh period in nanoseconds for the SPD refresh rate code.
pub const fn refresh_period_ns(code: u8) -> Option<u32> {
    Some(match code {
        0 => 15_625,
        1 => 3_906,
        2 => 7_812,
        3 => 31_250,
        4 => 62_500,
        5 => 125_000,
        _ => return None,
    })
}

/// DDR1 modules without a tRFC byte are assumed to need this refresh to activate time.
pub const DDR1_DEFAULT_TRFC_NS: u32 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CasLatency {
    Cl2_0,
    Cl2_5,
    Cl3_0,
    Cl4_0,
    Cl5_0,
}

impl CasLatency {
    /// Latency in tenths of a clock cycle.
    pub const fn tenths(&self) -> u32 {
        match self {
            CasLatency::Cl2_0 => 20,
            CasLatency::Cl2_5 => 25,
            CasLatency::Cl3_0 => 30,
            CasLatency::Cl4_0 => 40,
            CasLatency::Cl5_0 => 50,
        }
    }
}

struct CasCandidate {
    latency: CasLatency,
    /// Bit in the SPD CAS latency byte.
    mask: u8,
    selectable: bool,
}

/// Highest latency first, matching the order in which the cycle time bytes are assigned.
const DDR1_CAS: [CasCandidate; 4] = [
    CasCandidate {
        latency: CasLatency::Cl4_0,
        mask: 0x40,
        selectable: false,
    },
    CasCandidate {
        latency: CasLatency::Cl3_0,
        mask: 0x10,
        selectable: true,
    },
    CasCandidate {
        latency: CasLatency::Cl2_5,
        mask: 0x08,
        selectable: true,
    },
    CasCandidate {
        latency: CasLatency::Cl2_0,
        mask: 0x04,
        selectable: true,
    },
];

const DDR2_CAS: [CasCandidate; 3] = [
    CasCandidate {
        latency: CasLatency::Cl5_0,
        mask: 0x20,
        selectable: true,
    },
    CasCandidate {
        latency: CasLatency::Cl4_0,
        mask: 0x10,
        selectable: true,
    },
    CasCandidate {
        latency: CasLatency::Cl3_0,
        mask: 0x08,
        selectable: true,
    },
];

const TCK_OFFSETS: [u8; 3] = [
    offsets::TCK_CL_X,
    offsets::TCK_CL_X_MINUS_1,
    offsets::TCK_CL_X_MINUS_2,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimingError {
    #[error("no CAS latency supported by all modules at {freq_hz} Hz")]
    NoCasLatency { freq_hz: u32 },
    #[error("slot {slot}: unsupported refresh rate code {code:#04x}")]
    UnsupportedRefreshRate { slot: usize, code: u8 },
    #[error("no populated slots")]
    NoModules,
}

/// Select the lowest CAS latency which every populated module supports at the bus frequency.
pub fn select_cas(
    slots: &[SlotDescriptor],
    memory_type: MemoryType,
    freq: Hertz,
) -> Result<CasLatency, TimingError> {
    let candidates: &[CasCandidate] = match memory_type {
        MemoryType::Ddr2 => &DDR2_CAS,
        _ => &DDR1_CAS,
    };
    let mut available = [true; 4];
    let mut worst_tck = [0u32; 4];

    for slot in slots.iter().filter(|s| s.populated()) {
        let mask = slot.cas_latency_mask();
        let mut tck_index = 0;
        for (i, cand) in candidates.iter().enumerate() {
            let tck = if tck_index < TCK_OFFSETS.len() {
                decode_tck(slot.byte(TCK_OFFSETS[tck_index])).unwrap_or(0)
            } else {
                0
            };
            if (mask & cand.mask) != 0 && tck != 0 {
                worst_tck[i] = worst_tck[i].max(tck);
                tck_index += 1;
            } else {
                if tck_index != 0 {
                    tck_index += 1;
                }
                available[i] = false;
            }
        }
    }

    let freq_hz = freq.raw();
    for (i, cand) in candidates.iter().enumerate().rev() {
        if !cand.selectable || !available[i] || worst_tck[i] == 0 {
            continue;
        }
        // A small slack absorbs the truncation of the SPD cycle time encoding.
        let max_freq = 100_000_000_000u64 / worst_tck[i] as u64 + 10;
        if freq_hz as u64 <= max_freq {
            log::debug!(
                "selected CAS latency {}.{} (tCK {}0 ps)",
                cand.latency.tenths() / 10,
                cand.latency.tenths() % 10,
                worst_tck[i]
            );
            return Ok(cand.latency);
        }
    }
    Err(TimingError::NoCasLatency { freq_hz })
}

/// Timing parameters in memory clock cycles, worst case across all populated modules.
///
/// Values are not clamped. The register encoders clamp them into their field ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSet {
    pub cas_latency: CasLatency,
    pub trcd_cycles: u32,
    pub trp_cycles: u32,
    pub tras_cycles: u32,
    /// tRAS minus tRCD, converted after the subtraction.
    pub tras_trcd_cycles: u32,
    pub trc_cycles: u32,
    pub trfc_cycles: u32,
    pub trrd_cycles: u32,
    pub trtp_cycles: u32,
    /// Write recovery time.
    pub twr_cycles: u32,
    pub twtr_cycles: u32,
    /// Clock cycles between refresh commands. Rounded down.
    pub refresh_interval_cycles: u32,
    /// DDR1 modules needing a write command to data delay.
    pub write_cs_delay: bool,
}

impl TimingSet {
    pub const fn cas_latency_tenths(&self) -> u32 {
        self.cas_latency.tenths()
    }
}

#[derive(Default)]
struct WorstCase {
    trcd: u32,
    trp: u32,
    tras: u32,
    tras_trcd: u32,
    trc: u32,
    trfc: u32,
    trrd: u32,
    trtp: u32,
    twr: u32,
    twtr: u32,
    refresh: u32,
    wcsbc: bool,
}

/// Compute the timing set for all populated slots.
pub fn compute(
    slots: &[SlotDescriptor],
    memory_type: MemoryType,
    freq: Hertz,
) -> Result<TimingSet, TimingError> {
    if !slots.iter().any(|s| s.populated()) {
        return Err(TimingError::NoModules);
    }
    let cas_latency = select_cas(slots, memory_type, freq)?;

    let mut worst = WorstCase::default();
    for slot in slots.iter().filter(|s| s.populated()) {
        let trcd = (slot.byte(offsets::TRCD) >> 2) as u32;
        let tras = slot.byte(offsets::TRAS) as u32;
        let mut trfc = slot.byte(offsets::TRFC) as u32;
        if trfc == 0 && !slot.is_ddr2() {
            trfc = DDR1_DEFAULT_TRFC_NS;
        }
        let refresh = refresh_period_ns(slot.refresh_code()).ok_or(
            TimingError::UnsupportedRefreshRate {
                slot: slot.index,
                code: slot.refresh_code(),
            },
        )?;

        worst.trcd = worst.trcd.max(trcd);
        worst.trp = worst.trp.max((slot.byte(offsets::TRP) >> 2) as u32);
        worst.tras = worst.tras.max(tras);
        worst.tras_trcd = worst.tras_trcd.max(tras.saturating_sub(trcd));
        worst.trc = worst.trc.max(slot.byte(offsets::TRC) as u32);
        worst.trfc = worst.trfc.max(trfc);
        worst.trrd = worst.trrd.max((slot.byte(offsets::TRRD) >> 2) as u32);
        worst.trtp = worst.trtp.max((slot.byte(offsets::TRTP) >> 2) as u32);
        worst.twr = worst.twr.max((slot.byte(offsets::TWR) >> 2) as u32);
        worst.twtr = worst.twtr.max((slot.byte(offsets::TWTR) >> 2) as u32);
        worst.refresh = worst.refresh.max(refresh);
        worst.wcsbc |= slot.byte(offsets::WCSBC) != 0;
    }

    let timing = TimingSet {
        cas_latency,
        trcd_cycles: ns_to_cycles(worst.trcd, freq),
        trp_cycles: ns_to_cycles(worst.trp, freq),
        tras_cycles: ns_to_cycles(worst.tras, freq),
        tras_trcd_cycles: ns_to_cycles(worst.tras_trcd, freq),
        trc_cycles: ns_to_cycles(worst.trc, freq),
        trfc_cycles: ns_to_cycles(worst.trfc, freq),
        trrd_cycles: ns_to_cycles(worst.trrd, freq),
        trtp_cycles: ns_to_cycles(worst.trtp, freq),
        twr_cycles: ns_to_cycles(worst.twr, freq),
        twtr_cycles: ns_to_cycles(worst.twtr, freq),
        refresh_interval_cycles: ((freq.raw() as u64 * worst.refresh as u64) / 1_000_000_000)
            as u32,
        write_cs_delay: worst.wcsbc,
    };
    log::debug!("{:?}", timing);
    Ok(timing)
}
