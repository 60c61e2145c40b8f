//! # ECC priming
//!
//! The check bits of freshly powered DRAM are random. Before checking is enabled, every datapath
//! unit of the installed memory is written once with check bit generation active.
use crate::{
    board::BoardConfig,
    memtest::MemoryBus,
    regs::{ControllerRegs, EccMode, PollTimeout, poll_until},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EccPriming {
    Primed,
    /// ECC is not configured on the controller.
    Disabled,
    /// The controller is not enabled or did not complete its initialization.
    ControllerNotReady,
    /// The installed memory exceeds the mapped window.
    TooLarge,
}

/// Write the complete installed memory so all check bits are valid, then enable checking.
///
/// `size` is the installed memory size in bytes. Addresses passed to `mem` are offsets from the
/// DRAM base.
pub fn prime_ecc<C: ControllerRegs, M: MemoryBus>(
    regs: &mut C,
    mem: &mut M,
    size: u64,
    board: &BoardConfig,
) -> Result<EccPriming, PollTimeout> {
    if regs.ecc_mode() == EccMode::None {
        return Ok(EccPriming::Disabled);
    }
    if !regs.controller_enabled() || !regs.init_complete() {
        log::debug!("ECC priming skipped, controller not ready");
        return Ok(EccPriming::ControllerNotReady);
    }
    if size > board.max_mem_mapped {
        log::warn!(
            "ECC priming skipped, {:#x} bytes installed but only {:#x} mapped",
            size,
            board.max_mem_mapped
        );
        return Ok(EccPriming::TooLarge);
    }

    regs.set_ecc_mode(EccMode::Generate);
    poll_until(board.idle_poll_limit, "controller idle", || regs.is_idle())?;

    let stride = regs.data_width().bytes();
    log::debug!("ECC priming {:#x} bytes in {} byte steps", size, stride);
    let mut addr = 0;
    while addr < size {
        mem.write_word(addr, 0);
        addr += stride;
    }

    poll_until(board.idle_poll_limit, "controller idle", || regs.is_idle())?;
    regs.clear_ecc_status();
    regs.set_ecc_mode(EccMode::GenerateAndCheck);
    poll_until(board.idle_poll_limit, "controller idle", || regs.is_idle())?;
    log::debug!("ECC enabled");
    Ok(EccPriming::Primed)
}
