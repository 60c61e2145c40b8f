//! Read data capture calibration through the TR1 register.
//!
//! The capture delay line is swept over four half cycles. Every half cycle toggles the RDCD
//! bit and continues the tap numbering where the previous one ended, so the window may span a
//! half cycle boundary.
use arbitrary_int::u9;
use ppc44x_sdram::ddr1::{TR1_RDSL_STAGE2, TR1_RDSL_STAGE3, TR1_RDSS_TR1, TR1_RDSS_TR2, Tr1};

use super::Ddr1Controller;
use crate::{
    calib::{CalibrationError, ScanStep, WindowTracker},
    memtest::{MemoryBus, short_test},
    regs::{ControllerRegs, EccMode, SdramAccess},
    time::Hertz,
    timing::CasLatency,
};

const HALF_CYCLES: i32 = 4;

/// Initial TR1 value before the tap sweep.
pub fn initial_tr1(prev: Tr1, cas: CasLatency, bus_clock: Hertz) -> Tr1 {
    if cas == CasLatency::Cl2_5 && bus_clock.raw() > 100_000_000 {
        prev.with_rdss(TR1_RDSS_TR2)
            .with_rdsl(TR1_RDSL_STAGE3)
            .with_rdcd(true)
    } else {
        prev.with_rdss(TR1_RDSS_TR1)
            .with_rdsl(TR1_RDSL_STAGE2)
            .with_rdcd(false)
    }
}

impl<A: SdramAccess> Ddr1Controller<A> {
    /// Find the read capture window and program its center.
    ///
    /// ECC checking is disabled while sweeping and restored afterwards.
    pub fn calibrate_read_capture<M: MemoryBus>(
        &mut self,
        mem: &mut M,
        cas: CasLatency,
        bus_clock: Hertz,
    ) -> Result<Tr1, CalibrationError> {
        let tr1 = initial_tr1(self.read_tr1(), cas, bus_clock);
        self.write_tr1(tr1.with_rdct(u9::new(0)));

        let saved_ecc = self.ecc_mode();
        self.set_ecc_mode(EccMode::None);

        let dly_val = self.delay_line_taps() as i32;
        let banks = self.enabled_bank_bases();
        let mut tracker = WindowTracker::new((dly_val >> 2) as u32);
        let mut offset = 0;
        'half_cycles: for _ in 0..HALF_CYCLES {
            for tap in 0..dly_val {
                self.modify_tr1(|v| v.with_rdct(u9::new(tap.min(0x1FF) as u16)));
                let passed = short_test(mem, &banks, 1);
                if tracker.record(offset + tap, passed) == ScanStep::Closed {
                    break 'half_cycles;
                }
            }
            self.modify_tr1(|v| v.with_rdcd(!v.rdcd()));
            offset += dly_val;
        }

        self.set_ecc_mode(saved_ecc);
        let window = match tracker.finish("TR1.RDCT") {
            Ok(window) => window,
            Err(e) => {
                self.dump_registers();
                return Err(e);
            }
        };

        let mut start = window.start_tap;
        let mut end = window.end_tap;
        while end >= 2 * dly_val {
            start -= 2 * dly_val;
            end -= 2 * dly_val;
        }
        let mut rdcd = cas == CasLatency::Cl2_5;
        let mut center = ((start + end) >> 1).max(0);
        if center >= dly_val {
            center -= dly_val;
            rdcd = !rdcd;
        }
        log::debug!(
            "TR1 window {}..={}, RDCT {}, RDCD {}",
            window.start_tap,
            window.end_tap,
            center,
            rdcd
        );
        let tr1 = self
            .read_tr1()
            .with_rdcd(rdcd)
            .with_rdct(u9::new(center.min(0x1FF) as u16));
        self.write_tr1(tr1);
        Ok(tr1)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use crate::testutil::{FakeDram, FakeSdram};
    use core::cell::Cell;
    use fugit::RateExtU32;
    use ppc44x_sdram::ddr1::{B0CR, CFG0, Cfg0, EccMode as PacEccMode, TR1};

    /// Delay line taps of the simulated SDRAM0 controller.
    const TAPS: i32 = 64;

    fn controller(fake: &FakeSdram) -> Ddr1Controller<FakeSdram> {
        // One enabled 256 MiB bank at address 0 and ECC generation active.
        fake.set_sdram(B0CR, 0x000c_4001);
        fake.set_sdram(
            CFG0,
            Cfg0::new_with_raw_value(0x8000_0000)
                .with_mchk(PacEccMode::Generate)
                .raw_value(),
        );
        Ddr1Controller::new(fake.clone(), 0)
    }

    fn rdct_in(fake: &FakeSdram, range: core::ops::RangeInclusive<u16>) -> FakeDram {
        FakeDram::new(fake.clone(), move |regs| {
            range.contains(&Tr1::new_with_raw_value(regs.sdram(TR1)).rdct().value())
        })
    }

    #[test]
    fn window_across_half_cycle() {
        let fake = FakeSdram::ddr1();
        let mut ctrl = controller(&fake);
        let mut dram = rdct_in(&fake, 10..=40);
        let tr1 = ctrl
            .calibrate_read_capture(&mut dram, CasLatency::Cl2_0, 133.MHz())
            .unwrap();
        // The first half cycle arms on the trailing fails, the second one closes the window
        // 74..=104, which maps back to tap 25 with RDCD flipped.
        assert_eq!(tr1.rdct().value(), 25);
        assert!(tr1.rdcd());
        assert_eq!(tr1.rdss(), TR1_RDSS_TR1);
        assert_eq!(fake.sdram(TR1), tr1.raw_value());
        assert_eq!(ctrl.ecc_mode(), EccMode::Generate);
    }

    /// Pass when the tap counted across all half cycles lies in `pass`. The half cycle is
    /// tracked through the RDCD toggles seen by the reads.
    fn absolute_tap_in(
        fake: &FakeSdram,
        initial_rdcd: bool,
        pass: core::ops::RangeInclusive<i32>,
    ) -> FakeDram {
        let state = Cell::new((initial_rdcd, 0));
        FakeDram::new(fake.clone(), move |regs| {
            let tr1 = Tr1::new_with_raw_value(regs.sdram(TR1));
            let (last_rdcd, mut half) = state.get();
            if tr1.rdcd() != last_rdcd {
                half += 1;
            }
            state.set((tr1.rdcd(), half));
            pass.contains(&(half * TAPS + tr1.rdct().value() as i32))
        })
    }

    #[test]
    fn window_in_third_half_cycle_wraps() {
        let fake = FakeSdram::ddr1();
        let mut ctrl = controller(&fake);
        let mut dram = absolute_tap_in(&fake, false, 150..=180);
        let tr1 = ctrl
            .calibrate_read_capture(&mut dram, CasLatency::Cl2_0, 133.MHz())
            .unwrap();
        // 150..=180 wraps to 22..=52.
        assert_eq!(tr1.rdct().value(), 37);
        assert!(!tr1.rdcd());
    }

    #[test]
    fn window_in_fourth_half_cycle_flips_rdcd() {
        let fake = FakeSdram::ddr1();
        let mut ctrl = controller(&fake);
        let mut dram = absolute_tap_in(&fake, false, 200..=230);
        let tr1 = ctrl
            .calibrate_read_capture(&mut dram, CasLatency::Cl2_0, 133.MHz())
            .unwrap();
        // 200..=230 wraps to 72..=102, center 87 lies in the second half cycle.
        assert_eq!(tr1.rdct().value(), 23);
        assert!(tr1.rdcd());
    }

    #[test]
    fn cas_2_5_window_starts_from_half_cycle_capture() {
        let fake = FakeSdram::ddr1();
        let mut ctrl = controller(&fake);
        let mut dram = absolute_tap_in(&fake, true, 200..=230);
        let tr1 = ctrl
            .calibrate_read_capture(&mut dram, CasLatency::Cl2_5, 133.MHz())
            .unwrap();
        assert_eq!(tr1.rdct().value(), 23);
        assert!(!tr1.rdcd());
        assert_eq!(tr1.rdss(), TR1_RDSS_TR2);
        assert_eq!(tr1.rdsl(), TR1_RDSL_STAGE3);

        let fake = FakeSdram::ddr1();
        let mut ctrl = controller(&fake);
        let mut dram = absolute_tap_in(&fake, true, 150..=180);
        let tr1 = ctrl
            .calibrate_read_capture(&mut dram, CasLatency::Cl2_5, 133.MHz())
            .unwrap();
        assert_eq!(tr1.rdct().value(), 37);
        assert!(tr1.rdcd());
    }

    #[test]
    fn cas_2_5_starts_on_second_stage() {
        let tr1 = initial_tr1(Tr1::new_with_raw_value(0), CasLatency::Cl2_5, 133.MHz());
        assert_eq!(tr1.rdss(), TR1_RDSS_TR2);
        assert_eq!(tr1.rdsl(), TR1_RDSL_STAGE3);
        assert!(tr1.rdcd());
        let tr1 = initial_tr1(Tr1::new_with_raw_value(0), CasLatency::Cl2_5, 100.MHz());
        assert_eq!(tr1.rdss(), TR1_RDSS_TR1);
        assert!(!tr1.rdcd());
    }

    #[test]
    fn no_window() {
        let fake = FakeSdram::ddr1();
        let mut ctrl = controller(&fake);
        let mut dram = FakeDram::new(fake.clone(), |_| false);
        assert_eq!(
            ctrl.calibrate_read_capture(&mut dram, CasLatency::Cl2_0, 133.MHz())
                .map(|tr1| tr1.raw_value()),
            Err(CalibrationError::NoWindow {
                register: "TR1.RDCT"
            })
        );
        // ECC mode is restored on failure too.
        assert_eq!(ctrl.ecc_mode(), EccMode::Generate);
    }
}
