//! # Register definitions for the PPC440/460 SDRAM controllers
//!
//! Two controller generations are covered:
//!
//! - [ddr1]: the DDR1 SDRAM0 controller of the 440GP, 440GX, 440EP and 440GR.
//! - [ddr2]: the IBM DDR2 controller of the 440SP, 440SPe and 460EX/GT, together with the
//!   memory queue rank registers in [mq].
//!
//! Both controllers are not memory mapped. Their registers are reached through an indirect
//! address/data DCR pair, so this crate only provides register offsets and typed bitfield layouts.
//! The actual access is supplied by the bring-up code.
#![no_std]

pub mod ddr1;
pub mod ddr2;
pub mod mq;

/// DCR number of the SDRAM0 indirect address register.
pub const SDRAM0_CFGADDR: u16 = 0x10;
/// DCR number of the SDRAM0 indirect data register.
pub const SDRAM0_CFGDATA: u16 = 0x11;
