//! # Address map builder
//!
//! Emits one controller bank per module rank, orders the banks by descending size and assigns
//! contiguous base addresses starting at zero.
use crate::{
    board::{ControllerKind, MAX_BANKS},
    spd::SlotDescriptor,
};

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankAssignment {
    /// Index of the bank configuration register.
    pub controller_bank_index: u8,
    pub base_address: u64,
    pub size_bytes: u64,
    /// Addressing mode field value for the bank configuration register.
    pub addr_mode: u8,
    pub slot: usize,
    pub rank: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressMap {
    /// Banks in address order.
    pub banks: heapless::Vec<BankAssignment, MAX_BANKS>,
    pub total_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    #[error("slot {slot}: unsupported number of column address bits {cols}")]
    UnsupportedColumns { slot: usize, cols: u32 },
    #[error("slot {slot}: unsupported rank density code {code:#04x}")]
    UnsupportedDensity { slot: usize, code: u8 },
    #[error("slot {slot}: rank {rank} maps to invalid controller bank {index}")]
    BankIndexOutOfRange { slot: usize, rank: u8, index: u32 },
    #[error("slot {slot}: controller bank {index} is already in use")]
    BankIndexInUse { slot: usize, index: u8 },
    #[error("slot {slot}: module reports no ranks")]
    NoRanks { slot: usize },
}

/// Size of one rank in bytes, derived from the SPD rank density byte.
pub fn rank_size_bytes(slot: &SlotDescriptor) -> Option<u64> {
    let code = slot.rank_density();
    if slot.is_ddr2() {
        let mb = match code {
            0x01 => 1024,
            0x02 => 2048,
            0x04 => 4096,
            0x08 => 32,
            0x10 => 64,
            0x20 => 128,
            0x40 => 256,
            0x80 => 512,
            _ => return None,
        };
        Some(mb * MIB)
    } else {
        // Each bit is 4 MiB. Single rank sizes below 8 MiB are not supported by the controller.
        match code {
            0x02 | 0x04 | 0x08 | 0x10 | 0x20 | 0x40 | 0x80 => Some(code as u64 * 4 * MIB),
            _ => None,
        }
    }
}

/// Encode the addressing mode of a slot for the given controller.
pub fn addr_mode(slot: &SlotDescriptor, controller: ControllerKind) -> Option<u8> {
    let cols = slot.col_bits();
    match controller {
        ControllerKind::Ddr1 if (8..=11).contains(&cols) => Some((cols - 8) as u8),
        ControllerKind::Ddr2 if (8..=12).contains(&cols) => {
            let mode = (cols - 8) as u8;
            Some(if slot.bank_count() == 8 { mode + 5 } else { mode })
        }
        _ => None,
    }
}

/// Build the address map for all populated slots.
///
/// The controller bank index of a rank is the first bank of its slot plus the rank number.
pub fn build_map(
    slots: &[SlotDescriptor],
    controller: ControllerKind,
) -> Result<AddressMap, GeometryError> {
    let mut banks: heapless::Vec<BankAssignment, MAX_BANKS> = heapless::Vec::new();
    let mut used = [false; MAX_BANKS];

    for slot in slots.iter().filter(|s| s.populated()) {
        let mode = addr_mode(slot, controller).ok_or(GeometryError::UnsupportedColumns {
            slot: slot.index,
            cols: slot.col_bits(),
        })?;
        let size_bytes = rank_size_bytes(slot).ok_or(GeometryError::UnsupportedDensity {
            slot: slot.index,
            code: slot.rank_density(),
        })?;
        let ranks = slot.rank_count();
        if ranks == 0 {
            return Err(GeometryError::NoRanks { slot: slot.index });
        }
        for rank in 0..ranks {
            let index = slot.first_bank as u32 + rank;
            if index as usize >= MAX_BANKS {
                return Err(GeometryError::BankIndexOutOfRange {
                    slot: slot.index,
                    rank: rank as u8,
                    index,
                });
            }
            if used[index as usize] {
                return Err(GeometryError::BankIndexInUse {
                    slot: slot.index,
                    index: index as u8,
                });
            }
            used[index as usize] = true;
            // Cannot overflow, every bank index is unique and below the capacity.
            let _ = banks.push(BankAssignment {
                controller_bank_index: index as u8,
                base_address: 0,
                size_bytes,
                addr_mode: mode,
                slot: slot.index,
                rank: rank as u8,
            });
        }
    }

    sort_by_size_descending(&mut banks);

    let mut next_base = 0;
    for bank in banks.iter_mut() {
        bank.base_address = next_base;
        next_base += bank.size_bytes;
        log::debug!(
            "bank {}: slot {} rank {}, base {:#x}, {} MiB, mode {}",
            bank.controller_bank_index,
            bank.slot,
            bank.rank,
            bank.base_address,
            bank.size_bytes / MIB,
            bank.addr_mode
        );
    }
    Ok(AddressMap {
        banks,
        total_size: next_base,
    })
}

/// Stable insertion sort. Equal sizes keep their discovery order.
fn sort_by_size_descending(banks: &mut [BankAssignment]) {
    for i in 1..banks.len() {
        let mut j = i;
        while j > 0 && banks[j - 1].size_bytes < banks[j].size_bytes {
            banks.swap(j - 1, j);
            j -= 1;
        }
    }
}
