//! # Delay tap window search
//!
//! Both controller generations calibrate a read delay by sweeping a tap value and running the
//! [crate::memtest] patterns at every tap. [WindowTracker] finds the longest run of passing taps
//! which is enclosed by failing runs on both sides.

/// Longest passing tap run found by a scan. Both taps are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationWindow {
    pub start_tap: i32,
    pub end_tap: i32,
}

impl CalibrationWindow {
    #[inline]
    pub const fn width(&self) -> i32 {
        self.end_tap - self.start_tap + 1
    }

    #[inline]
    pub const fn center(&self) -> i32 {
        (self.start_tap + self.end_tap) >> 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CalibrationError {
    #[error("no {register} calibration window found")]
    NoWindow { register: &'static str },
    #[error("{register} calibration window of {width} taps is narrower than {min_width} taps")]
    WindowTooNarrow {
        register: &'static str,
        width: i32,
        min_width: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    Continue,
    /// A pass run was closed by a failing run. The scan can stop.
    Closed,
}

#[derive(Debug, Clone)]
pub struct WindowTracker {
    fail_threshold: u32,
    current_pass: u32,
    current_fail: u32,
    max_pass: u32,
    current_start: i32,
    max_start: i32,
    max_end: i32,
    fail_found: bool,
    pass_found: bool,
    window_found: bool,
}

impl WindowTracker {
    /// A failing run counts once it is at least `fail_threshold` taps long.
    pub const fn new(fail_threshold: u32) -> Self {
        Self {
            fail_threshold: if fail_threshold == 0 {
                1
            } else {
                fail_threshold
            },
            current_pass: 0,
            current_fail: 0,
            max_pass: 0,
            current_start: 0,
            max_start: 0,
            max_end: 0,
            fail_found: false,
            pass_found: false,
            window_found: false,
        }
    }

    /// Record the memory test result for one tap position.
    ///
    /// Passing taps are ignored until the first failing run was seen, so a tap range which
    /// already passes at its start can not be taken for a window.
    pub fn record(&mut self, tap: i32, passed: bool) -> ScanStep {
        if passed {
            if self.fail_found {
                self.pass_found = true;
                if self.current_pass == 0 {
                    self.current_start = tap;
                }
                self.current_fail = 0;
                self.current_pass += 1;
                if self.current_pass > self.max_pass {
                    self.max_pass = self.current_pass;
                    self.max_start = self.current_start;
                    self.max_end = tap;
                }
            }
            return ScanStep::Continue;
        }
        self.current_pass = 0;
        self.current_fail += 1;
        if self.current_fail >= self.fail_threshold {
            if !self.fail_found {
                self.fail_found = true;
            } else if self.pass_found {
                self.window_found = true;
                return ScanStep::Closed;
            }
        }
        ScanStep::Continue
    }

    #[inline]
    pub const fn window_found(&self) -> bool {
        self.window_found
    }

    #[inline]
    pub const fn fail_threshold(&self) -> u32 {
        self.fail_threshold
    }

    /// Longest pass run seen so far, whether or not it was closed.
    #[inline]
    pub const fn best(&self) -> CalibrationWindow {
        CalibrationWindow {
            start_tap: self.max_start,
            end_tap: self.max_end,
        }
    }

    /// The closed window, without a width requirement.
    pub fn closed(&self, register: &'static str) -> Result<CalibrationWindow, CalibrationError> {
        if !self.window_found {
            return Err(CalibrationError::NoWindow { register });
        }
        Ok(self.best())
    }

    /// The closed window, which must be wider than the fail threshold.
    pub fn finish(&self, register: &'static str) -> Result<CalibrationWindow, CalibrationError> {
        let window = self.closed(register)?;
        if window.width() <= self.fail_threshold as i32 {
            return Err(CalibrationError::WindowTooNarrow {
                register,
                width: window.width(),
                min_width: self.fail_threshold,
            });
        }
        Ok(window)
    }
}

/// Sweep `taps`, stopping once a window was closed.
pub fn scan(
    tracker: &mut WindowTracker,
    taps: impl Iterator<Item = i32>,
    mut probe: impl FnMut(i32) -> bool,
) -> ScanStep {
    for tap in taps {
        if tracker.record(tap, probe(tap)) == ScanStep::Closed {
            return ScanStep::Closed;
        }
    }
    ScanStep::Continue
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;

    fn oracle(pass: core::ops::RangeInclusive<i32>) -> impl FnMut(i32) -> bool {
        move |tap| pass.contains(&tap)
    }

    #[test]
    fn window_in_the_middle() {
        let mut tracker = WindowTracker::new(1);
        assert_eq!(scan(&mut tracker, 0..64, oracle(10..=40)), ScanStep::Closed);
        let window = tracker.finish("test").unwrap();
        assert_eq!(window, CalibrationWindow {
            start_tap: 10,
            end_tap: 40
        });
        assert_eq!(window.center(), 25);
        assert_eq!(window.width(), 31);
    }

    #[test]
    fn same_oracle_same_result() {
        let run = || {
            let mut tracker = WindowTracker::new(4);
            scan(&mut tracker, 0..128, oracle(20..=70));
            tracker.finish("test").map(|w| w.center())
        };
        assert_eq!(run(), Ok(45));
        assert_eq!(run(), run());
    }

    #[test]
    fn leading_pass_run_is_ignored() {
        let mut tracker = WindowTracker::new(4);
        let mut probe = |tap: i32| (0..=20).contains(&tap) || (40..=50).contains(&tap);
        scan(&mut tracker, 0..64, &mut probe);
        assert_eq!(tracker.finish("test").unwrap().center(), 45);
    }

    #[test]
    fn short_fail_run_does_not_arm() {
        let mut tracker = WindowTracker::new(16);
        // Only 10 failing taps before the pass run.
        scan(&mut tracker, 0..41, oracle(10..=40));
        assert!(!tracker.window_found());
        assert_eq!(
            tracker.finish("RDCT"),
            Err(CalibrationError::NoWindow { register: "RDCT" })
        );
    }

    #[test]
    fn open_ended_window_is_not_found() {
        let mut tracker = WindowTracker::new(2);
        assert_eq!(scan(&mut tracker, 0..64, oracle(30..=63)), ScanStep::Continue);
        assert!(!tracker.window_found());
        assert_eq!(tracker.best(), CalibrationWindow {
            start_tap: 30,
            end_tap: 63
        });
    }

    #[test]
    fn narrow_window_is_rejected() {
        let mut tracker = WindowTracker::new(4);
        scan(&mut tracker, 0..64, oracle(20..=22));
        assert_eq!(
            tracker.finish("RQFD"),
            Err(CalibrationError::WindowTooNarrow {
                register: "RQFD",
                width: 3,
                min_width: 4
            })
        );
    }

    #[test]
    fn single_tap_window_is_closed_but_narrow() {
        let mut tracker = WindowTracker::new(1);
        assert_eq!(scan(&mut tracker, 0..64, oracle(30..=30)), ScanStep::Closed);
        assert_eq!(tracker.closed("RQFD").map(|w| w.center()), Ok(30));
        assert_eq!(
            tracker.finish("RQFD"),
            Err(CalibrationError::WindowTooNarrow {
                register: "RQFD",
                width: 1,
                min_width: 1
            })
        );
        let open = WindowTracker::new(1);
        assert_eq!(
            open.closed("RQFD"),
            Err(CalibrationError::NoWindow { register: "RQFD" })
        );
    }

    #[test]
    fn first_closed_run_ends_scan() {
        let mut tracker = WindowTracker::new(1);
        let mut probe = |tap: i32| (5..=8).contains(&tap) || (12..=30).contains(&tap);
        // The first run is closed immediately, so the scan stops there.
        scan(&mut tracker, 0..64, &mut probe);
        assert_eq!(tracker.best(), CalibrationWindow {
            start_tap: 5,
            end_tap: 8
        });
    }
}
