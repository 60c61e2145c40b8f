//! # Register access
//!
//! The SDRAM controllers are reached through an indirect address/data DCR pair. DCR access
//! requires `mtdcr`/`mfdcr` instructions, so the board supplies the access primitives through
//! [SdramAccess]. [ControllerRegs] is the generation independent view used by the ECC primer and
//! the driver.
use ppc44x_sdram::{SDRAM0_CFGADDR, SDRAM0_CFGDATA};

use crate::{board::MAX_BANKS, validate::DataWidth};

/// Raw device control register access.
pub trait SdramAccess {
    fn read_dcr(&mut self, dcr: u16) -> u32;
    fn write_dcr(&mut self, dcr: u16, value: u32);

    /// Read an indirect SDRAM controller register.
    #[inline]
    fn read_sdram(&mut self, offset: u16) -> u32 {
        self.write_dcr(SDRAM0_CFGADDR, offset as u32);
        self.read_dcr(SDRAM0_CFGDATA)
    }

    /// Write an indirect SDRAM controller register.
    #[inline]
    fn write_sdram(&mut self, offset: u16, value: u32) {
        self.write_dcr(SDRAM0_CFGADDR, offset as u32);
        self.write_dcr(SDRAM0_CFGDATA, value);
    }
}

impl<T: SdramAccess + ?Sized> SdramAccess for &mut T {
    #[inline]
    fn read_dcr(&mut self, dcr: u16) -> u32 {
        (**self).read_dcr(dcr)
    }

    #[inline]
    fn write_dcr(&mut self, dcr: u16, value: u32) {
        (**self).write_dcr(dcr, value)
    }

    #[inline]
    fn read_sdram(&mut self, offset: u16) -> u32 {
        (**self).read_sdram(offset)
    }

    #[inline]
    fn write_sdram(&mut self, offset: u16, value: u32) {
        (**self).write_sdram(offset, value)
    }
}

/// Generate typed accessors for an indirect SDRAM controller register.
///
/// The implementing type must have an `access` field implementing [SdramAccess].
macro_rules! sdram_register {
    ($ty:ty, $offset:expr, $read:ident) => {
        #[inline]
        pub fn $read(&mut self) -> $ty {
            <$ty>::new_with_raw_value(self.access.read_sdram($offset))
        }
    };
    ($ty:ty, $offset:expr, $read:ident, $write:ident, $modify:ident) => {
        $crate::regs::sdram_register!($ty, $offset, $read);

        #[inline]
        pub fn $write(&mut self, value: $ty) {
            self.access.write_sdram($offset, value.raw_value());
        }

        #[inline]
        pub fn $modify(&mut self, f: impl FnOnce($ty) -> $ty) {
            let value = self.$read();
            self.$write(f(value));
        }
    };
}

pub(crate) use sdram_register;

/// ECC mode of the memory controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EccMode {
    None,
    /// Generate check bits on writes, do not check on reads.
    Generate,
    /// Generate check bits, check and report errors.
    GenerateAndCheck,
}

/// Typed view of the controller state shared by both generations.
pub trait ControllerRegs {
    fn ecc_mode(&mut self) -> EccMode;
    fn set_ecc_mode(&mut self, mode: EccMode);
    fn data_width(&mut self) -> DataWidth;
    /// Controller enable bit.
    fn controller_enabled(&mut self) -> bool;
    /// Memory initialization sequence completed.
    fn init_complete(&mut self) -> bool;
    /// No memory accesses outstanding.
    fn is_idle(&mut self) -> bool;
    /// Base addresses of all enabled banks, relative to the DRAM base.
    fn enabled_bank_bases(&mut self) -> heapless::Vec<u64, MAX_BANKS>;
    /// Number of taps covered by the read capture delay line.
    fn delay_line_taps(&mut self) -> u32;
    fn clear_ecc_status(&mut self);
    /// Log the register file at error level.
    fn dump_registers(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("timeout waiting for {what} after {limit} polls")]
pub struct PollTimeout {
    pub what: &'static str,
    pub limit: u32,
}

/// Poll a condition at most `limit` times.
pub fn poll_until(
    limit: u32,
    what: &'static str,
    mut cond: impl FnMut() -> bool,
) -> Result<(), PollTimeout> {
    for _ in 0..limit {
        if cond() {
            return Ok(());
        }
        core::hint::spin_loop();
    }
    Err(PollTimeout { what, limit })
}
