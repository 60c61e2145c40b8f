//! # IBM DDR2 SDRAM controller
//!
//! Programming sequence for the 440SP/440SPe/460EX/460GT controller. It drives both DDR1 and
//! DDR2 modules. Rank placement in the processor address space is configured through the memory
//! queue RxBAS registers.
use arbitrary_int::u2;
use embedded_hal::delay::DelayNs;
use ppc44x_sdram::{
    ddr2::{DataWidth, EccMode, *},
    mq::{self, RxBas},
};

use crate::{
    board::{BoardConfig, MAX_BANKS},
    calib::CalibrationError,
    geometry::AddressMap,
    regs::{
        ControllerRegs, EccMode as HalEccMode, PollTimeout, SdramAccess, poll_until,
        sdram_register,
    },
    spd::{MemoryType, SlotDescriptor},
    timing::{CasLatency, TimingSet},
    validate::{Capabilities, DataWidth as HalDataWidth},
};

pub mod calib;
pub mod ll;

/// Wait time between the preload programming and the controller enable.
pub const CLOCK_STABLE_DELAY_US: u32 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Ddr2Error {
    #[error("CAS latency {0:?} not supported for the installed modules")]
    UnsupportedCasLatency(CasLatency),
    #[error("{0} DIMMs not supported by the DDR2 initialization sequence")]
    UnsupportedDimmCount(u32),
    #[error("bank {index}: unsupported rank size of {size_bytes} bytes")]
    UnsupportedRankSize { index: u8, size_bytes: u64 },
    #[error(transparent)]
    InitTimeout(#[from] PollTimeout),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

pub struct Ddr2Controller<A> {
    access: A,
    sdram_base: u64,
}

impl<A: SdramAccess> Ddr2Controller<A> {
    /// `sdram_base` is the physical address of the DRAM window. Bank base addresses handed to
    /// the memory test are relative to it.
    pub const fn new(access: A, sdram_base: u64) -> Self {
        Self { access, sdram_base }
    }

    pub fn release(self) -> A {
        self.access
    }

    sdram_register!(McStat, MCSTAT, read_mcstat);
    sdram_register!(McOpt1, MCOPT1, read_mcopt1, write_mcopt1, modify_mcopt1);
    sdram_register!(McOpt2, MCOPT2, read_mcopt2, write_mcopt2, modify_mcopt2);
    sdram_register!(Codt, CODT, read_codt, write_codt, modify_codt);
    sdram_register!(Rtr, RTR, read_rtr, write_rtr, modify_rtr);
    sdram_register!(Rqdc, RQDC, read_rqdc, write_rqdc, modify_rqdc);
    sdram_register!(Rfdc, RFDC, read_rfdc, write_rfdc, modify_rfdc);
    sdram_register!(Rdcc, RDCC, read_rdcc, write_rdcc, modify_rdcc);
    sdram_register!(Dlcr, DLCR, read_dlcr, write_dlcr, modify_dlcr);
    sdram_register!(ClkTr, CLKTR, read_clktr, write_clktr, modify_clktr);
    sdram_register!(WrDtr, WRDTR, read_wrdtr, write_wrdtr, modify_wrdtr);
    sdram_register!(Sdtr1, SDTR1, read_sdtr1, write_sdtr1, modify_sdtr1);
    sdram_register!(Sdtr2, SDTR2, read_sdtr2, write_sdtr2, modify_sdtr2);
    sdram_register!(Sdtr3, SDTR3, read_sdtr3, write_sdtr3, modify_sdtr3);
    sdram_register!(MMode, MMODE, read_mmode, write_mmode, modify_mmode);
    sdram_register!(MEMode, MEMODE, read_memode, write_memode, modify_memode);
    sdram_register!(Rtsr, RTSR, read_rtsr);

    #[inline]
    pub fn read_modt(&mut self, index: usize) -> Modt {
        Modt::new_with_raw_value(self.access.read_sdram(modt(index)))
    }

    #[inline]
    pub fn write_modt(&mut self, index: usize, value: Modt) {
        self.access.write_sdram(modt(index), value.raw_value());
    }

    #[inline]
    pub fn read_mbxcf(&mut self, index: usize) -> MbxCf {
        MbxCf::new_with_raw_value(self.access.read_sdram(mbxcf(index)))
    }

    #[inline]
    pub fn write_mbxcf(&mut self, index: usize, value: MbxCf) {
        self.access.write_sdram(mbxcf(index), value.raw_value());
    }

    #[inline]
    pub fn write_initplr(&mut self, index: usize, value: Initplr) {
        self.access.write_sdram(initplr(index), value.raw_value());
    }

    #[inline]
    pub fn read_rxbas(&mut self, index: usize) -> RxBas {
        RxBas::new_with_raw_value(self.access.read_dcr(mq::rxbas(index)))
    }

    #[inline]
    pub fn write_rxbas(&mut self, index: usize, value: RxBas) {
        self.access.write_dcr(mq::rxbas(index), value.raw_value());
    }

    /// Program the controller, run the initialization preload sequence and wait for its
    /// completion.
    ///
    /// All values are computed before the first register write, so an error leaves the
    /// controller untouched.
    pub fn program(
        &mut self,
        slots: &[SlotDescriptor],
        caps: &Capabilities,
        timing: &TimingSet,
        map: &AddressMap,
        board: &BoardConfig,
        delay: &mut impl DelayNs,
    ) -> Result<(), Ddr2Error> {
        let ddr2 = caps.memory_type == MemoryType::Ddr2;
        let eight_banks = ll::eight_banks(slots);
        let mmode = ll::mmode_value(timing, caps.memory_type)?;
        let preload = ll::initplr_sequence(caps.memory_type, timing.cas_latency, caps.dimm_count)?;
        let mut bank_cfg = [MbxCf::new_with_raw_value(0); NUM_BANK_REGS];
        let mut rank_bases = [RxBas::new_with_raw_value(0); NUM_BANK_REGS];
        for bank in &map.banks {
            let index = bank.controller_bank_index as usize;
            bank_cfg[index] = ll::mbxcf_value(bank.addr_mode);
            rank_bases[index] = ll::rxbas_value(
                self.sdram_base + bank.base_address,
                bank.size_bytes,
            )
            .ok_or(Ddr2Error::UnsupportedRankSize {
                index: bank.controller_bank_index,
                size_bytes: bank.size_bytes,
            })?;
        }

        self.modify_mcopt2(ll::mcopt2_preinit);
        self.modify_mcopt1(|v| ll::mcopt1_value(v, caps, eight_banks));

        let (codt, modt) = ll::odt_values(self.read_codt(), map, ddr2);
        self.write_codt(codt);
        for (index, value) in modt.iter().enumerate() {
            self.write_modt(index, *value);
        }

        self.write_rtr(ll::rtr_value(timing.refresh_interval_cycles));
        self.write_mmode(mmode);
        self.write_wrdtr(ll::wrdtr_value());
        self.modify_clktr(|v| v.with_clkp(u2::new(0)));

        for (index, value) in bank_cfg.iter().enumerate() {
            self.write_mbxcf(index, *value);
        }

        self.write_sdtr1(ll::sdtr1_value());
        self.write_sdtr2(ll::sdtr2_value(timing, caps.memory_type, board.bus_clock));
        self.write_sdtr3(ll::sdtr3_value(timing));
        self.modify_memode(ll::memode_value);

        for (index, step) in preload.iter().enumerate() {
            self.write_initplr(index, step.value);
            if step.delay_us > 0 {
                delay.delay_us(step.delay_us);
            }
        }
        delay.delay_us(CLOCK_STABLE_DELAY_US);
        for (index, value) in rank_bases.iter().enumerate() {
            self.write_rxbas(index, *value);
        }

        self.modify_mcopt2(ll::mcopt2_enable);
        poll_until(board.init_poll_limit, "SDRAM MCSTAT.MIC", || {
            self.read_mcstat().mic()
        })?;
        log::debug!(
            "DDR2 controller enabled: MCOPT1 {:#010x}, CODT {:#010x}, MMODE {:#010x}",
            self.read_mcopt1().raw_value(),
            codt.raw_value(),
            mmode.raw_value()
        );
        Ok(())
    }

    /// Memory size as seen by the controller. The caller caps it to the mapped window.
    ///
    /// Returns 0 unless the controller is enabled, initialized and not in self-refresh.
    pub fn installed_size(&mut self) -> u64 {
        let opt2 = self.read_mcopt2();
        let stat = self.read_mcstat();
        if !opt2.dcen() || opt2.sren() || !stat.mic() || stat.srms() {
            return 0;
        }
        let mut size = 0u64;
        for index in 0..NUM_BANK_REGS {
            if !self.read_mbxcf(index).enable() {
                continue;
            }
            if let Some(mb) = self.read_rxbas(index).size_megabytes() {
                size += (mb as u64) << 20;
            }
        }
        size
    }
}

impl<A: SdramAccess> ControllerRegs for Ddr2Controller<A> {
    fn ecc_mode(&mut self) -> HalEccMode {
        match self.read_mcopt1().mchk() {
            EccMode::None => HalEccMode::None,
            EccMode::Generate => HalEccMode::Generate,
            EccMode::CheckOnly | EccMode::CheckAndReport => HalEccMode::GenerateAndCheck,
        }
    }

    fn set_ecc_mode(&mut self, mode: HalEccMode) {
        let mchk = match mode {
            HalEccMode::None => EccMode::None,
            HalEccMode::Generate => EccMode::Generate,
            HalEccMode::GenerateAndCheck => EccMode::CheckAndReport,
        };
        self.modify_mcopt1(|v| v.with_mchk(mchk));
    }

    fn data_width(&mut self) -> HalDataWidth {
        match self.read_mcopt1().dmwd() {
            DataWidth::Bits32 => HalDataWidth::Bits32,
            DataWidth::Bits64 => HalDataWidth::Bits64,
        }
    }

    fn controller_enabled(&mut self) -> bool {
        self.read_mcopt2().dcen()
    }

    fn init_complete(&mut self) -> bool {
        self.read_mcstat().mic()
    }

    fn is_idle(&mut self) -> bool {
        self.read_mcstat().idle()
    }

    fn enabled_bank_bases(&mut self) -> heapless::Vec<u64, MAX_BANKS> {
        let mut bases = heapless::Vec::new();
        for index in 0..NUM_BANK_REGS {
            if self.read_mbxcf(index).enable() {
                let base = self.read_rxbas(index).base_address();
                let _ = bases.push(base.saturating_sub(self.sdram_base));
            }
        }
        bases
    }

    fn delay_line_taps(&mut self) -> u32 {
        (self.read_dlcr().dlcv().value() as u32) << 2
    }

    fn clear_ecc_status(&mut self) {
        self.access.write_sdram(ECCCR, 0xffff_ffff);
    }

    fn dump_registers(&mut self) {
        const REGS: [(&str, u16); 20] = [
            ("MCSTAT", MCSTAT),
            ("MCOPT1", MCOPT1),
            ("MCOPT2", MCOPT2),
            ("MODT0", MODT0),
            ("MODT1", MODT1),
            ("MODT2", MODT2),
            ("MODT3", MODT3),
            ("CODT", CODT),
            ("RTR", RTR),
            ("RQDC", RQDC),
            ("RFDC", RFDC),
            ("RDCC", RDCC),
            ("DLCR", DLCR),
            ("CLKTR", CLKTR),
            ("WRDTR", WRDTR),
            ("SDTR1", SDTR1),
            ("SDTR2", SDTR2),
            ("SDTR3", SDTR3),
            ("MMODE", MMODE),
            ("MEMODE", MEMODE),
        ];
        for (name, offset) in REGS {
            log::error!("SDRAM0_{:<7}= {:#010x}", name, self.access.read_sdram(offset));
        }
        for index in 0..NUM_BANK_REGS {
            log::error!(
                "SDRAM0_MB{}CF = {:#010x}, R{}BAS = {:#010x}",
                index,
                self.read_mbxcf(index).raw_value(),
                index,
                self.read_rxbas(index).raw_value()
            );
        }
        log::error!(
            "SDRAM0_ECCCR = {:#010x}",
            self.access.read_sdram(ECCCR)
        );
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use crate::{
        board::ControllerKind,
        geometry::build_map,
        spd::{SlotState, SpdData},
        testutil::{FakeSdram, NoDelay, ddr2_spd},
        timing::compute,
        validate::validate,
    };
    use fugit::RateExtU32;
    use ppc44x_sdram::ddr2::MemoryType as MemoryType2;

    struct Setup {
        slots: [SlotDescriptor; 1],
        board: BoardConfig,
    }

    fn setup(spd: [u8; 64]) -> Setup {
        let board = BoardConfig::sequoia_katmai(333_333_333.Hz()).with_poll_limits(100, 100);
        let slots = [SlotDescriptor::new(
            0,
            &board.slots[0],
            SlotState::Populated,
            SpdData(spd),
        )];
        Setup { slots, board }
    }

    fn program(fake: &FakeSdram, setup: &Setup) -> Result<Ddr2Controller<FakeSdram>, Ddr2Error> {
        let caps = validate(&setup.slots, &setup.board).unwrap();
        let timing = compute(&setup.slots, caps.memory_type, setup.board.bus_clock).unwrap();
        let map = build_map(&setup.slots, ControllerKind::Ddr2).unwrap();
        let mut ctrl = Ddr2Controller::new(fake.clone(), setup.board.sdram_base);
        ctrl.program(&setup.slots, &caps, &timing, &map, &setup.board, &mut NoDelay)?;
        Ok(ctrl)
    }

    #[test]
    fn programming_sequence() {
        let fake = FakeSdram::ddr2();
        let mut ctrl = program(&fake, &setup(ddr2_spd())).unwrap();

        let opt1 = McOpt1::new_with_raw_value(fake.sdram(MCOPT1));
        assert_eq!(opt1.ddr_type(), MemoryType2::Ddr2);
        assert_eq!(opt1.dmwd(), DataWidth::Bits64);
        assert_eq!(opt1.mchk(), EccMode::None);
        assert_eq!(opt1.pmu(), MCOPT1_PMU_OPEN);
        assert!(opt1.eight_banks());
        assert!(opt1.qdep());
        assert!(!opt1.rden());

        let opt2 = McOpt2::new_with_raw_value(fake.sdram(MCOPT2));
        assert!(opt2.dcen());
        assert!(opt2.iptr());
        assert!(!opt2.sren());

        assert_eq!(fake.sdram(initplr(0)), 0xB538_0000);
        assert_eq!(fake.sdram(initplr(5)), 0x8080_0552);
        assert_eq!(fake.sdram(initplr(14)), 0);
        assert_eq!(fake.sdram(mbxcf(0)), 0x0000_0701);
        assert_eq!(fake.sdram(mbxcf(1)), 0);
        assert_eq!(fake.sdram(SDTR2), 0x5310_5353);
        assert_eq!(fake.sdram(MMODE), 0x850);
        assert_eq!(fake.sdram(modt(0)), 0x02 << 23);
        assert_eq!(fake.sdram(CODT) & 0x7F80_0021, (0x01 << 23) | 0x21);

        let writes = fake.sdram_writes();
        assert_eq!(writes.first().map(|w| w.0), Some(MCOPT2));
        assert_eq!(writes.last().map(|w| w.0), Some(MCOPT2));

        assert!(ctrl.controller_enabled());
        assert!(ctrl.init_complete());
        assert_eq!(ctrl.enabled_bank_bases().as_slice(), &[0]);
        assert_eq!(ctrl.installed_size(), 512 << 20);
        assert_eq!(ctrl.delay_line_taps(), 256);
    }

    #[test]
    fn rank_bases_include_sdram_base() {
        let fake = FakeSdram::ddr2();
        let mut s = setup(ddr2_spd());
        s.board = s.board.with_sdram_base(0x1_0000_0000);
        let mut ctrl = program(&fake, &s).unwrap();
        assert_eq!(ctrl.read_rxbas(0).base_address(), 0x1_0000_0000);
        assert_eq!(ctrl.enabled_bank_bases().as_slice(), &[0]);
    }

    #[test]
    fn ecc_mode_mapping() {
        let fake = FakeSdram::ddr2();
        let mut ctrl = Ddr2Controller::new(fake.clone(), 0);
        ctrl.set_ecc_mode(HalEccMode::GenerateAndCheck);
        assert_eq!(
            McOpt1::new_with_raw_value(fake.sdram(MCOPT1)).mchk(),
            EccMode::CheckAndReport
        );
        assert_eq!(ctrl.ecc_mode(), HalEccMode::GenerateAndCheck);
        ctrl.write_mcopt1(McOpt1::new_with_raw_value(0).with_mchk(EccMode::CheckOnly));
        assert_eq!(ctrl.ecc_mode(), HalEccMode::GenerateAndCheck);
        ctrl.set_ecc_mode(HalEccMode::Generate);
        assert_eq!(ctrl.ecc_mode(), HalEccMode::Generate);
    }

    #[test]
    fn idle_status() {
        let fake = FakeSdram::ddr2();
        let mut ctrl = Ddr2Controller::new(fake.clone(), 0);
        assert!(ctrl.is_idle());
        fake.set_busy(true);
        assert!(!ctrl.is_idle());
    }

    #[test]
    fn no_size_without_init() {
        let fake = FakeSdram::ddr2();
        fake.set_hang_init(true);
        let s = setup(ddr2_spd());
        assert_eq!(
            program(&fake, &s).err(),
            Some(Ddr2Error::InitTimeout(PollTimeout {
                what: "SDRAM MCSTAT.MIC",
                limit: 100
            }))
        );
        let mut ctrl = Ddr2Controller::new(fake.clone(), 0);
        assert_eq!(ctrl.installed_size(), 0);
    }

    #[test]
    fn errors_leave_controller_untouched() {
        let fake = FakeSdram::ddr2();
        let s = setup(ddr2_spd());
        let caps = validate(&s.slots, &s.board).unwrap();
        let mut timing = compute(&s.slots, caps.memory_type, s.board.bus_clock).unwrap();
        timing.cas_latency = CasLatency::Cl2_0;
        let map = build_map(&s.slots, ControllerKind::Ddr2).unwrap();
        let mut ctrl = Ddr2Controller::new(fake.clone(), 0);
        assert_eq!(
            ctrl.program(&s.slots, &caps, &timing, &map, &s.board, &mut NoDelay),
            Err(Ddr2Error::UnsupportedCasLatency(CasLatency::Cl2_0))
        );
        assert!(fake.sdram_writes().is_empty());
    }
}
