//! # SPD driven SDRAM bring-up for PPC440/460 SoCs
//!
//! This crate initializes the on-chip SDRAM controller from the serial presence detect (SPD)
//! EEPROMs of the installed modules. It is built on top of the register definitions in the
//! [ppc44x-sdram](pac) crate and supports both controller generations:
//!
//! - The DDR1 SDRAM0 controller of the 440GP/GX/EP/GR, see [ddr1].
//! - The IBM DDR2 controller of the 440SP/SPe/460EX/GT, which also drives DDR1 modules, see
//!   [ddr2].
//!
//! The complete sequence is run by [init_sdram]:
//!
//! 1. Read the SPD of every slot listed in the [board::BoardConfig].
//! 2. Validate the module set against the controller and the bus clock.
//! 3. Compute the timing parameters and the address map.
//! 4. Program the controller and wait for the memory initialization.
//! 5. Calibrate the read data capture.
//! 6. Prime the ECC check bits if ECC is used.
//!
//! Nothing is written to the controller before all SPD derived checks passed.
//!
//! Hardware access is injected: SPD through [embedded_hal::i2c::I2c], controller registers
//! through [regs::SdramAccess] and DRAM through [memtest::MemoryBus].
#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg))]

use embedded_hal::{delay::DelayNs, i2c::I2c};

pub mod board;
pub mod calib;
pub mod ddr1;
pub mod ddr2;
pub mod ecc;
pub mod geometry;
pub mod memtest;
pub mod regs;
pub mod spd;
pub mod time;
pub mod timing;
pub mod validate;

#[cfg(test)]
mod testutil;

pub use ppc44x_sdram as pac;

use board::{BoardConfig, ControllerKind};
use ddr1::{Ddr1Controller, Ddr1Error};
use ddr2::{Ddr2Controller, Ddr2Error};
use ecc::EccPriming;
use geometry::{AddressMap, GeometryError};
use memtest::MemoryBus;
use regs::{PollTimeout, SdramAccess};
use timing::{CasLatency, TimingError};
use validate::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("module validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("timing calculation failed: {0}")]
    Timing(#[from] TimingError),
    #[error("address map failed: {0}")]
    Geometry(#[from] GeometryError),
    #[error("DDR1 controller: {0}")]
    Ddr1(#[from] Ddr1Error),
    #[error("DDR2 controller: {0}")]
    Ddr2(#[from] Ddr2Error),
    #[error("ECC priming: {0}")]
    Ecc(#[from] PollTimeout),
}

/// Result of a successful initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DramInfo {
    /// Usable DRAM size in bytes, capped at the mapped maximum.
    pub total_size: u64,
    pub cas_latency: CasLatency,
    pub ecc_enabled: bool,
    pub banks: AddressMap,
}

/// Initialize the SDRAM controller from the SPD of the installed modules.
///
/// Addresses passed to `mem` are offsets from [BoardConfig::sdram_base].
pub fn init_sdram<I2C: I2c, A: SdramAccess, M: MemoryBus, D: DelayNs>(
    board: &BoardConfig,
    i2c: &mut I2C,
    access: A,
    mem: &mut M,
    delay: &mut D,
) -> Result<DramInfo, InitError> {
    let slots = spd::read_slots(i2c, board);
    let caps = validate::validate(&slots, board)?;
    let timing = timing::compute(&slots, caps.memory_type, board.bus_clock)?;
    let map = geometry::build_map(&slots, board.controller)?;

    let (installed, priming) = match board.controller {
        ControllerKind::Ddr1 => {
            let mut ctrl = Ddr1Controller::new(access, board.sdram_base);
            ctrl.program(&caps, &timing, &map, delay, board.init_poll_limit)?;
            ctrl.calibrate_read_capture(mem, timing.cas_latency, board.bus_clock)
                .map_err(Ddr1Error::from)?;
            let installed = map.total_size;
            (installed, ecc::prime_ecc(&mut ctrl, mem, installed, board)?)
        }
        ControllerKind::Ddr2 => {
            let mut ctrl = Ddr2Controller::new(access, board.sdram_base);
            ctrl.program(&slots, &caps, &timing, &map, board, delay)?;
            ctrl.calibrate_dqs(mem, board).map_err(Ddr2Error::from)?;
            let installed = ctrl.installed_size();
            (installed, ecc::prime_ecc(&mut ctrl, mem, installed, board)?)
        }
    };

    let total_size = installed.min(board.max_mem_mapped);
    let ecc_enabled = priming == EccPriming::Primed;
    log::info!(
        "SDRAM: {} MiB, CAS {}.{}, ECC {}",
        total_size >> 20,
        timing.cas_latency.tenths() / 10,
        timing.cas_latency.tenths() % 10,
        if ecc_enabled { "on" } else { "off" }
    );
    Ok(DramInfo {
        total_size,
        cas_latency: timing.cas_latency,
        ecc_enabled,
        banks: map,
    })
}

/// Run [init_sdram] and return the usable DRAM size. Any error is logged and `halt` is called.
pub fn init_or_halt<I2C: I2c, A: SdramAccess, M: MemoryBus, D: DelayNs>(
    board: &BoardConfig,
    i2c: &mut I2C,
    access: A,
    mem: &mut M,
    delay: &mut D,
    halt: fn() -> !,
) -> u64 {
    match init_sdram(board, i2c, access, mem, delay) {
        Ok(info) => info.total_size,
        Err(e) => {
            log::error!("SDRAM initialization failed: {}", e);
            halt()
        }
    }
}

/// Default halt primitive.
pub fn halt() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
