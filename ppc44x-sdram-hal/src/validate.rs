//! # Capability validator
//!
//! Checks that the installed modules are supported by the controller and compatible with each
//! other. Every check completes before the first controller register is written.
use crate::{
    board::{BoardConfig, ControllerKind, MAX_RANKS},
    spd::{MemoryType, SlotDescriptor, SpdMemoryType, offsets},
    timing::{bus_period_10ps, decode_tck, refresh_period_ns},
};

/// SPD voltage interface level codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum VoltageClass {
    Ttl5V = 0,
    Lvttl = 1,
    Hstl1_5V = 2,
    Sstl3_3V = 3,
    Sstl2_5V = 4,
    Sstl1_8V = 5,
}

impl VoltageClass {
    pub const fn name(&self) -> &'static str {
        match self {
            VoltageClass::Ttl5V => "TTL/5V",
            VoltageClass::Lvttl => "LVTTL",
            VoltageClass::Hstl1_5V => "HSTL 1.5V",
            VoltageClass::Sstl3_3V => "SSTL 3.3V",
            VoltageClass::Sstl2_5V => "SSTL 2.5V",
            VoltageClass::Sstl1_8V => "SSTL 1.8V",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataWidth {
    Bits32,
    Bits64,
}

impl DataWidth {
    /// Width of one ECC protected datapath unit in bytes.
    pub const fn bytes(&self) -> u64 {
        match self {
            DataWidth::Bits32 => 4,
            DataWidth::Bits64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("bus clock of the board configuration is zero")]
    ZeroBusClock,
    #[error("no memory modules detected")]
    NoModules,
    #[error("slot {slot}: {name} modules are not supported")]
    UnsupportedMemoryType { slot: usize, name: &'static str },
    #[error("slot {slot}: unknown memory type {raw:#04x}")]
    UnknownMemoryType { slot: usize, raw: u8 },
    #[error("slot {slot}: DDR2 modules are not supported by the DDR1 controller")]
    Ddr2OnDdr1Controller { slot: usize },
    #[error("slot {slot}: DDR1 and DDR2 modules can not be mixed")]
    MixedMemoryTypes { slot: usize },
    #[error("slot {slot}: invalid cycle time byte {raw:#04x}")]
    InvalidCycleTime { slot: usize, raw: u8 },
    #[error(
        "slot {slot}: module cycle time {module_tck_10ps}0 ps is slower than the bus cycle \
         {bus_tck_10ps}0 ps"
    )]
    FrequencyTooHigh {
        slot: usize,
        module_tck_10ps: u32,
        bus_tck_10ps: u32,
    },
    #[error("slot {slot}: {ranks} ranks exceed the limit of 4 per slot")]
    TooManyRanksInSlot { slot: usize, ranks: u32 },
    #[error("slot {slot}: {total} ranks installed, at most 4 are supported")]
    TooManyRanks { slot: usize, total: u32 },
    #[error("slot {slot}: {name} modules are not supported")]
    UnsupportedVoltage { slot: usize, name: &'static str },
    #[error("slot {slot}: unknown voltage interface level {raw:#04x}")]
    UnknownVoltage { slot: usize, raw: u8 },
    #[error("slot {slot}: unsupported data width {width}")]
    UnsupportedDataWidth { slot: usize, width: u16 },
    #[error("slot {slot}: 32-bit and 64-bit modules can not be mixed")]
    MixedDataWidth { slot: usize },
    #[error("slot {slot}: registered and unbuffered modules can not be mixed")]
    MixedRegistered { slot: usize },
    #[error("slot {slot}: unsupported refresh rate code {code:#04x}")]
    UnsupportedRefreshRate { slot: usize, code: u8 },
}

/// Properties shared by all installed modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub memory_type: MemoryType,
    pub data_width: DataWidth,
    pub registered: bool,
    /// ECC is supported by every module and permitted by the board.
    pub ecc: bool,
    pub total_ranks: u32,
    pub dimm_count: u32,
}

/// Validate the populated slots against each other and against the controller.
pub fn validate(
    slots: &[SlotDescriptor],
    board: &BoardConfig,
) -> Result<Capabilities, ValidationError> {
    if board.bus_clock.raw() == 0 {
        return Err(ValidationError::ZeroBusClock);
    }
    let first = slots
        .iter()
        .find(|s| s.populated())
        .ok_or(ValidationError::NoModules)?;
    let populated = || slots.iter().filter(|s| s.populated());

    let memory_type = check_memory_types(populated(), board.controller)?;
    check_frequency(populated(), board)?;
    let total_ranks = check_ranks(populated())?;
    for slot in populated() {
        check_voltage(slot)?;
    }
    let data_width = check_data_width(populated())?;

    let registered = first.registered();
    if let Some(slot) = populated().find(|s| s.registered() != registered) {
        return Err(ValidationError::MixedRegistered { slot: slot.index });
    }

    for slot in populated() {
        if refresh_period_ns(slot.refresh_code()).is_none() {
            return Err(ValidationError::UnsupportedRefreshRate {
                slot: slot.index,
                code: slot.refresh_code(),
            });
        }
    }

    let ecc = board.ecc_permitted && populated().all(|s| s.ecc_supported());
    let caps = Capabilities {
        memory_type,
        data_width,
        registered,
        ecc,
        total_ranks,
        dimm_count: populated().count() as u32,
    };
    log::debug!("{:?}", caps);
    Ok(caps)
}

fn check_memory_types<'a>(
    slots: impl Iterator<Item = &'a SlotDescriptor>,
    controller: ControllerKind,
) -> Result<MemoryType, ValidationError> {
    let mut found = MemoryType::None;
    for slot in slots {
        let ty = match slot.spd_memory_type() {
            Ok(SpdMemoryType::Ddr1) => MemoryType::Ddr1,
            Ok(SpdMemoryType::Ddr2) => {
                if controller == ControllerKind::Ddr1 {
                    return Err(ValidationError::Ddr2OnDdr1Controller { slot: slot.index });
                }
                MemoryType::Ddr2
            }
            Ok(other) => {
                return Err(ValidationError::UnsupportedMemoryType {
                    slot: slot.index,
                    name: other.name(),
                });
            }
            Err(raw) => {
                return Err(ValidationError::UnknownMemoryType {
                    slot: slot.index,
                    raw,
                });
            }
        };
        if found != MemoryType::None && found != ty {
            return Err(ValidationError::MixedMemoryTypes { slot: slot.index });
        }
        found = ty;
    }
    Ok(found)
}

fn check_frequency<'a>(
    slots: impl Iterator<Item = &'a SlotDescriptor>,
    board: &BoardConfig,
) -> Result<(), ValidationError> {
    let bus_tck_10ps = bus_period_10ps(board.bus_clock);
    for slot in slots {
        let raw = slot.byte(offsets::TCK_CL_X);
        let module_tck_10ps = decode_tck(raw).ok_or(ValidationError::InvalidCycleTime {
            slot: slot.index,
            raw,
        })?;
        if module_tck_10ps > bus_tck_10ps + 10 {
            return Err(ValidationError::FrequencyTooHigh {
                slot: slot.index,
                module_tck_10ps,
                bus_tck_10ps,
            });
        }
    }
    Ok(())
}

fn check_ranks<'a>(
    slots: impl Iterator<Item = &'a SlotDescriptor>,
) -> Result<u32, ValidationError> {
    let mut total = 0;
    for slot in slots {
        let ranks = slot.rank_count();
        if ranks > MAX_RANKS as u32 {
            return Err(ValidationError::TooManyRanksInSlot {
                slot: slot.index,
                ranks,
            });
        }
        total += ranks;
        if total > MAX_RANKS as u32 {
            return Err(ValidationError::TooManyRanks {
                slot: slot.index,
                total,
            });
        }
    }
    Ok(total)
}

fn check_voltage(slot: &SlotDescriptor) -> Result<(), ValidationError> {
    let raw = slot.voltage_class();
    let class = VoltageClass::try_from(raw).map_err(|_| ValidationError::UnknownVoltage {
        slot: slot.index,
        raw,
    })?;
    let supported = match class {
        VoltageClass::Sstl2_5V => !slot.is_ddr2(),
        VoltageClass::Sstl1_8V => slot.is_ddr2(),
        _ => false,
    };
    if !supported {
        return Err(ValidationError::UnsupportedVoltage {
            slot: slot.index,
            name: class.name(),
        });
    }
    Ok(())
}

fn check_data_width<'a>(
    slots: impl Iterator<Item = &'a SlotDescriptor>,
) -> Result<DataWidth, ValidationError> {
    let mut found = None;
    for slot in slots {
        let width = match slot.data_width() {
            64 | 72 => DataWidth::Bits64,
            32 | 40 => DataWidth::Bits32,
            width => {
                return Err(ValidationError::UnsupportedDataWidth {
                    slot: slot.index,
                    width,
                });
            }
        };
        if found.is_some_and(|w| w != width) {
            return Err(ValidationError::MixedDataWidth { slot: slot.index });
        }
        found = Some(width);
    }
    // At least one slot is populated when this is called.
    Ok(found.unwrap_or(DataWidth::Bits64))
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use crate::{
        board::SlotConfig,
        spd::{SlotState, SpdData},
        testutil::{ddr1_spd, ddr2_spd},
    };
    use embedded_hal::i2c::ErrorKind;
    use fugit::RateExtU32;

    fn slot(index: usize, spd: [u8; 64]) -> SlotDescriptor {
        SlotDescriptor::new(
            index,
            &SlotConfig::new(0x50 + index as u8, 0),
            SlotState::Populated,
            SpdData(spd),
        )
    }

    fn empty(index: usize, state: SlotState) -> SlotDescriptor {
        SlotDescriptor::new(
            index,
            &SlotConfig::new(0x50 + index as u8, 2),
            state,
            SpdData::empty(),
        )
    }

    fn ddr2_board() -> BoardConfig {
        BoardConfig::sequoia_katmai(266.MHz())
    }

    #[test]
    fn accepts_single_ddr2_module() {
        let slots = [slot(0, ddr2_spd()), empty(1, SlotState::Empty)];
        let caps = validate(&slots, &ddr2_board()).unwrap();
        assert_eq!(caps.memory_type, MemoryType::Ddr2);
        assert_eq!(caps.data_width, DataWidth::Bits64);
        assert_eq!(caps.total_ranks, 1);
        assert_eq!(caps.dimm_count, 1);
        assert!(!caps.ecc);
        assert!(!caps.registered);
    }

    #[test]
    fn no_modules() {
        let slots = [
            empty(0, SlotState::Empty),
            empty(1, SlotState::ReadError(ErrorKind::Bus)),
        ];
        assert_eq!(
            validate(&slots, &ddr2_board()),
            Err(ValidationError::NoModules)
        );
    }

    #[test]
    fn memory_type_rejections() {
        let mut sdram = ddr2_spd();
        sdram[2] = 4;
        assert_eq!(
            validate(&[slot(0, sdram)], &ddr2_board()),
            Err(ValidationError::UnsupportedMemoryType {
                slot: 0,
                name: "SDRAM"
            })
        );
        sdram[2] = 0x0B;
        assert_eq!(
            validate(&[slot(0, sdram)], &ddr2_board()),
            Err(ValidationError::UnknownMemoryType { slot: 0, raw: 0x0B })
        );
        let ddr1_board = BoardConfig::ebony_ocotea(266.MHz());
        assert_eq!(
            validate(&[slot(0, ddr2_spd())], &ddr1_board),
            Err(ValidationError::Ddr2OnDdr1Controller { slot: 0 })
        );
        let slots = [slot(0, ddr2_spd()), slot(1, ddr1_spd())];
        assert_eq!(
            validate(&slots, &ddr2_board()),
            Err(ValidationError::MixedMemoryTypes { slot: 1 })
        );
    }

    #[test]
    fn zero_bus_clock() {
        let board = BoardConfig::sequoia_katmai(0.Hz());
        assert_eq!(
            validate(&[slot(0, ddr2_spd())], &board),
            Err(ValidationError::ZeroBusClock)
        );
    }

    #[test]
    fn frequency_too_high() {
        let board = BoardConfig::sequoia_katmai(400.MHz());
        assert_eq!(
            validate(&[slot(0, ddr2_spd())], &board),
            Err(ValidationError::FrequencyTooHigh {
                slot: 0,
                module_tck_10ps: 300,
                bus_tck_10ps: 250
            })
        );
    }

    #[test]
    fn wrong_voltage() {
        let mut spd = ddr2_spd();
        spd[8] = 4;
        assert_eq!(
            validate(&[slot(0, spd)], &ddr2_board()),
            Err(ValidationError::UnsupportedVoltage {
                slot: 0,
                name: "SSTL 2.5V"
            })
        );
        spd[8] = 1;
        assert_eq!(
            validate(&[slot(0, spd)], &ddr2_board()),
            Err(ValidationError::UnsupportedVoltage {
                slot: 0,
                name: "LVTTL"
            })
        );
        spd[8] = 9;
        assert_eq!(
            validate(&[slot(0, spd)], &ddr2_board()),
            Err(ValidationError::UnknownVoltage { slot: 0, raw: 9 })
        );
    }

    #[test]
    fn excess_ranks() {
        let mut quad = ddr2_spd();
        quad[5] = 0x64;
        assert_eq!(
            validate(&[slot(0, quad)], &ddr2_board()),
            Err(ValidationError::TooManyRanksInSlot { slot: 0, ranks: 5 })
        );
        let mut dual = ddr2_spd();
        dual[5] = 0x61;
        let mut triple = ddr2_spd();
        triple[5] = 0x62;
        assert_eq!(
            validate(&[slot(0, dual), slot(1, triple)], &ddr2_board()),
            Err(ValidationError::TooManyRanks { slot: 1, total: 5 })
        );
    }

    #[test]
    fn data_width_checks() {
        let mut narrow = ddr2_spd();
        narrow[6] = 40;
        assert_eq!(
            validate(&[slot(0, narrow)], &ddr2_board()).map(|c| c.data_width),
            Ok(DataWidth::Bits32)
        );
        assert_eq!(
            validate(&[slot(0, ddr2_spd()), slot(1, narrow)], &ddr2_board()),
            Err(ValidationError::MixedDataWidth { slot: 1 })
        );
        narrow[6] = 16;
        assert_eq!(
            validate(&[slot(0, narrow)], &ddr2_board()),
            Err(ValidationError::UnsupportedDataWidth { slot: 0, width: 16 })
        );
    }

    #[test]
    fn registered_mismatch() {
        let mut reg = ddr2_spd();
        reg[20] = 0x01;
        assert_eq!(
            validate(&[slot(0, ddr2_spd()), slot(1, reg)], &ddr2_board()),
            Err(ValidationError::MixedRegistered { slot: 1 })
        );
        assert!(validate(&[slot(0, reg)], &ddr2_board()).unwrap().registered);
    }

    #[test]
    fn refresh_code() {
        let mut spd = ddr2_spd();
        spd[12] = 0x87;
        assert_eq!(
            validate(&[slot(0, spd)], &ddr2_board()),
            Err(ValidationError::UnsupportedRefreshRate { slot: 0, code: 7 })
        );
    }

    #[test]
    fn ecc_requires_all_modules_and_board() {
        let mut ecc = ddr2_spd();
        ecc[11] = 0x02;
        ecc[6] = 72;
        let caps = validate(&[slot(0, ecc), slot(1, ecc)], &ddr2_board()).unwrap();
        assert!(caps.ecc);
        let caps = validate(&[slot(0, ecc), slot(1, ddr2_spd())], &ddr2_board()).unwrap();
        assert!(!caps.ecc);
        let board = ddr2_board().with_ecc_permitted(false);
        assert!(!validate(&[slot(0, ecc)], &board).unwrap().ecc);
    }
}
