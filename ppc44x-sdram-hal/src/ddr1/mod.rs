//! # DDR1 SDRAM0 controller
//!
//! Programming sequence for the 440GP/GX/EP/GR controller, which only drives DDR1 modules.
use arbitrary_int::{u2, u3, u9, u14};
use embedded_hal::delay::DelayNs;
use ppc44x_sdram::ddr1::*;

use crate::{
    board::MAX_BANKS,
    calib::CalibrationError,
    geometry::AddressMap,
    regs::{
        ControllerRegs, EccMode as HalEccMode, PollTimeout, SdramAccess, poll_until,
        sdram_register,
    },
    timing::{self, TimingSet, clamp_cycles},
    validate::{Capabilities, DataWidth as HalDataWidth},
};

pub mod calib;

/// Wait time between the clock setup and the controller enable.
pub const CLOCK_STABLE_DELAY_US: u32 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Ddr1Error {
    #[error("CAS latency {0:?} not supported by the DDR1 controller")]
    UnsupportedCasLatency(timing::CasLatency),
    #[error("bank {index}: unsupported bank size of {size_bytes} bytes")]
    UnsupportedBankSize { index: u8, size_bytes: u64 },
    #[error(transparent)]
    InitTimeout(#[from] PollTimeout),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

pub struct Ddr1Controller<A> {
    access: A,
    sdram_base: u64,
}

impl<A: SdramAccess> Ddr1Controller<A> {
    /// `sdram_base` is the physical address of the DRAM window. Bank base addresses handed to
    /// the memory test are relative to it.
    pub const fn new(access: A, sdram_base: u64) -> Self {
        Self { access, sdram_base }
    }

    pub fn release(self) -> A {
        self.access
    }

    sdram_register!(Cfg0, CFG0, read_cfg0, write_cfg0, modify_cfg0);
    sdram_register!(Cfg1, CFG1, read_cfg1, write_cfg1, modify_cfg1);
    sdram_register!(McSts, MCSTS, read_mcsts);
    sdram_register!(Rtr, RTR, read_rtr, write_rtr, modify_rtr);
    sdram_register!(Tr0, TR0, read_tr0, write_tr0, modify_tr0);
    sdram_register!(Tr1, TR1, read_tr1, write_tr1, modify_tr1);
    sdram_register!(ClkTr, CLKTR, read_clktr, write_clktr, modify_clktr);
    sdram_register!(DlyCal, DLYCAL, read_dlycal);

    #[inline]
    pub fn read_bxcr(&mut self, index: usize) -> BxCr {
        BxCr::new_with_raw_value(self.access.read_sdram(bxcr(index)))
    }

    #[inline]
    pub fn write_bxcr(&mut self, index: usize, value: BxCr) {
        self.access.write_sdram(bxcr(index), value.raw_value());
    }

    /// Program the controller and start the memory initialization.
    ///
    /// All values are computed before the first register write, so an error leaves the
    /// controller untouched.
    pub fn program(
        &mut self,
        caps: &Capabilities,
        timing: &TimingSet,
        map: &AddressMap,
        delay: &mut impl DelayNs,
        init_poll_limit: u32,
    ) -> Result<(), Ddr1Error> {
        let tr0 = tr0_value(timing)?;
        let mut banks = [BxCr::new_with_raw_value(0); NUM_BANK_REGS];
        for bank in &map.banks {
            banks[bank.controller_bank_index as usize] =
                bxcr_value(self.sdram_base + bank.base_address, bank.size_bytes, bank.addr_mode)
                    .ok_or(Ddr1Error::UnsupportedBankSize {
                        index: bank.controller_bank_index,
                        size_bytes: bank.size_bytes,
                    })?;
        }

        self.modify_cfg0(|v| {
            v.with_dcen(false)
                .with_mchk(if caps.ecc {
                    EccMode::Generate
                } else {
                    EccMode::None
                })
                .with_rden(caps.registered)
                .with_pmud(false)
                .with_dmwd(match caps.data_width {
                    HalDataWidth::Bits32 => DataWidth::Bits32,
                    HalDataWidth::Bits64 => DataWidth::Bits64,
                })
                .with_uios(u2::new(0))
                .with_pdp(false)
        });
        self.modify_cfg1(|v| v.with_sre(false).with_pmen(false));

        let interval = timing.refresh_interval_cycles.min(0x3FF8) & 0x3FF8;
        self.write_rtr(Rtr::new_with_raw_value(0).with_interval(u14::new(interval as u16)));
        self.write_tr0(tr0);

        for (index, value) in banks.iter().enumerate() {
            self.write_bxcr(index, BxCr::new_with_raw_value(0));
            if value.enable() {
                self.write_bxcr(index, *value);
            }
        }

        self.write_clktr(ClkTr::new_with_raw_value(0).with_clkp(u2::new(0b01)));
        delay.delay_us(CLOCK_STABLE_DELAY_US);

        self.modify_cfg0(|v| v.with_dcen(true));
        poll_until(init_poll_limit, "SDRAM0 MCSTS.MRSC", || {
            self.read_mcsts().mrsc()
        })?;
        log::debug!(
            "SDRAM0 enabled: CFG0 {:#010x}, TR0 {:#010x}, RTR {:#010x}",
            self.read_cfg0().raw_value(),
            tr0.raw_value(),
            self.read_rtr().raw_value()
        );
        Ok(())
    }
}

/// Encode the TR0 timing register.
pub fn tr0_value(timing: &TimingSet) -> Result<Tr0, Ddr1Error> {
    let cas = match timing.cas_latency {
        timing::CasLatency::Cl2_0 => CasLatency::_2_0,
        timing::CasLatency::Cl2_5 => CasLatency::_2_5,
        timing::CasLatency::Cl3_0 => CasLatency::_3_0,
        other => return Err(Ddr1Error::UnsupportedCasLatency(other)),
    };
    Ok(Tr0::new_with_raw_value(0)
        // 2 clock write recovery.
        .with_sdwr(false)
        .with_sdwd(timing.write_cs_delay)
        .with_sdcl(cas)
        .with_sdpa(u2::new((clamp_cycles(timing.trp_cycles, 2, 4) - 1) as u8))
        .with_sdcp(u2::new((clamp_cycles(timing.tras_trcd_cycles, 2, 5) - 2) as u8))
        // 2 clock leadoff.
        .with_sdld(u2::new(1))
        .with_sdra(u3::new((clamp_cycles(timing.trfc_cycles, 6, 13) - 6) as u8))
        .with_sdrd(u2::new((clamp_cycles(timing.trcd_cycles, 2, 4) - 1) as u8)))
}

/// Encode a bank configuration register. Returns [None] for unsupported sizes.
pub fn bxcr_value(base: u64, size_bytes: u64, addr_mode: u8) -> Option<BxCr> {
    let size = BankSize::from_megabytes((size_bytes >> 20) as u32)?;
    Some(
        BxCr::new_with_raw_value(0)
            .with_base(u9::new(((base >> 23) & 0x1FF) as u16))
            .with_size(size)
            .with_addr_mode(u3::new(addr_mode & 0x7))
            .with_enable(true),
    )
}

impl<A: SdramAccess> ControllerRegs for Ddr1Controller<A> {
    fn ecc_mode(&mut self) -> HalEccMode {
        match self.read_cfg0().mchk() {
            EccMode::None | EccMode::Reserved => HalEccMode::None,
            EccMode::Generate => HalEccMode::Generate,
            EccMode::GenerateAndCheck => HalEccMode::GenerateAndCheck,
        }
    }

    fn set_ecc_mode(&mut self, mode: HalEccMode) {
        let mchk = match mode {
            HalEccMode::None => EccMode::None,
            HalEccMode::Generate => EccMode::Generate,
            HalEccMode::GenerateAndCheck => EccMode::GenerateAndCheck,
        };
        self.modify_cfg0(|v| v.with_mchk(mchk));
    }

    fn data_width(&mut self) -> HalDataWidth {
        match self.read_cfg0().dmwd() {
            DataWidth::Bits32 => HalDataWidth::Bits32,
            DataWidth::Bits64 => HalDataWidth::Bits64,
        }
    }

    fn controller_enabled(&mut self) -> bool {
        self.read_cfg0().dcen()
    }

    fn init_complete(&mut self) -> bool {
        self.read_mcsts().mrsc()
    }

    /// SDRAM0 has no idle status. Posted writes complete in order.
    fn is_idle(&mut self) -> bool {
        true
    }

    fn enabled_bank_bases(&mut self) -> heapless::Vec<u64, MAX_BANKS> {
        let mut bases = heapless::Vec::new();
        for index in 0..NUM_BANK_REGS {
            let bank = self.read_bxcr(index);
            if bank.enable() {
                let _ = bases.push((bank.base_address() as u64).saturating_sub(self.sdram_base));
            }
        }
        bases
    }

    fn delay_line_taps(&mut self) -> u32 {
        (self.read_dlycal().dlcv() as u32) << 2
    }

    fn clear_ecc_status(&mut self) {
        self.access.write_sdram(ECCESR, 0xffff_ffff);
    }

    fn dump_registers(&mut self) {
        log::error!("SDRAM0_CFG0   = {:#010x}", self.read_cfg0().raw_value());
        log::error!("SDRAM0_CFG1   = {:#010x}", self.read_cfg1().raw_value());
        log::error!("SDRAM0_MCSTS  = {:#010x}", self.read_mcsts().raw_value());
        log::error!("SDRAM0_RTR    = {:#010x}", self.read_rtr().raw_value());
        log::error!("SDRAM0_TR0    = {:#010x}", self.read_tr0().raw_value());
        log::error!("SDRAM0_TR1    = {:#010x}", self.read_tr1().raw_value());
        log::error!("SDRAM0_CLKTR  = {:#010x}", self.read_clktr().raw_value());
        log::error!("SDRAM0_DLYCAL = {:#010x}", self.read_dlycal().raw_value());
        for index in 0..NUM_BANK_REGS {
            log::error!(
                "SDRAM0_B{}CR   = {:#010x}",
                index,
                self.read_bxcr(index).raw_value()
            );
        }
    }
}
