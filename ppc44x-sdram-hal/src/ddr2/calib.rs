//! Read DQS delay calibration.
//!
//! The feedback delay (RFFD) is swept first with the DQS delay parked at a start value. The DQS
//! delay (RQFD) is then swept with the feedback delay at the center of its best pass run. If the
//! DQS sweep finds no window, the sequence is repeated with the next start value.
use arbitrary_int::{u2, u7, u9, u11};
use ppc44x_sdram::ddr2::{RDCC_RDSS_T4, RFFD_MAX, RQFD_MAX, RTSR_TRK1SM_ATPLS1};

use super::Ddr2Controller;
use crate::{
    board::BoardConfig,
    calib::{CalibrationError, WindowTracker, scan},
    memtest::{MemoryBus, banks_below, short_test},
    regs::{ControllerRegs, SdramAccess},
};

/// RQFD value used for the first feedback delay sweep.
pub const RQFD_START: u32 = 64;
/// RQFD value while the calibration is set up.
const RQFD_INITIAL: u16 = 0x38;

/// Calibrated delay values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DqsCalibration {
    pub rqfd: u16,
    pub rffd: u16,
}

impl<A: SdramAccess> Ddr2Controller<A> {
    /// Calibrate the read DQS and feedback delays and program the results.
    pub fn calibrate_dqs<M: MemoryBus>(
        &mut self,
        mem: &mut M,
        board: &BoardConfig,
    ) -> Result<DqsCalibration, CalibrationError> {
        self.modify_rdcc(|v| v.with_rdss(u2::new(0)).with_rsae(false));
        self.modify_rqdc(|v| v.with_rqde(true).with_rqfd(u9::new(RQFD_INITIAL)));
        self.modify_rfdc(|v| {
            v.with_arse(false)
                .with_rfos(u7::new(0))
                .with_rffd(u11::new(0))
        });

        let banks = banks_below(&self.enabled_bank_bases(), board.max_mem_mapped);
        let loops = board.memtest_reread_loops();
        let mut start = RQFD_START;
        let result = loop {
            match self.sweep(mem, &banks, loops, start) {
                Ok(result) => break result,
                Err(e) if start < board.rqfd_retry_limit => {
                    log::debug!("{}, retrying with RQFD start {}", e, start + 1);
                    start += 1;
                }
                Err(e) => {
                    self.dump_registers();
                    return Err(e);
                }
            }
        };

        self.modify_rqdc(|v| v.with_rqfd(u9::new(result.rqfd)));
        let rdcc = self.read_rdcc();
        if self.read_rtsr().trk1sm() == RTSR_TRK1SM_ATPLS1 && rdcc.rdss() != RDCC_RDSS_T4 {
            self.write_rdcc(rdcc.with_rdss(u2::new(rdcc.rdss().value() + 1)));
        }

        log::debug!(
            "DQS calibration: RQFD {}, RFFD {}, DLCR {:#010x}, RQDC {:#010x}, RFDC {:#010x}, RDCC {:#010x}",
            result.rqfd,
            result.rffd,
            self.read_dlcr().raw_value(),
            self.read_rqdc().raw_value(),
            self.read_rfdc().raw_value(),
            self.read_rdcc().raw_value()
        );
        Ok(result)
    }

    fn sweep<M: MemoryBus>(
        &mut self,
        mem: &mut M,
        banks: &[u64],
        loops: u32,
        start: u32,
    ) -> Result<DqsCalibration, CalibrationError> {
        self.modify_rqdc(|v| v.with_rqfd(u9::new(start.min(RQFD_MAX) as u16)));
        let dly_val = self.delay_line_taps();

        // The best feedback delay run is used even if it was not closed.
        let mut tracker = WindowTracker::new(dly_val >> 2);
        scan(&mut tracker, 0..=RFFD_MAX as i32, |tap| {
            self.modify_rfdc(|v| v.with_rffd(u11::new(tap as u16)));
            short_test(mem, banks, loops)
        });
        let rffd = tracker.best().center().clamp(0, RFFD_MAX as i32) as u16;
        self.modify_rfdc(|v| v.with_rffd(u11::new(rffd)));

        let mut tracker = WindowTracker::new(1);
        scan(&mut tracker, 0..=RQFD_MAX as i32, |tap| {
            self.modify_rqdc(|v| v.with_rqfd(u9::new(tap as u16)));
            short_test(mem, banks, loops)
        });
        // Any closed run is accepted, even a single tap.
        let window = tracker.closed("RQDC.RQFD")?;
        let rqfd = window.center().clamp(0, RQFD_MAX as i32) as u16;
        Ok(DqsCalibration { rqfd, rffd })
    }
}
