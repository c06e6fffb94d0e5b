//! The T.30 timer base
//!
//! Four logical countdown timers driven by sample ticks at the 8 kHz
//! telephony rate. T0 and T1 share one counter: before the far end has
//! been detected the counter means T0, afterwards T1. T2 and T4 share a
//! second counter with an explicit discriminating flag. A counter value
//! above zero means the timer is running.

use arrayvec::ArrayVec;

/// Telephony sampling rate the tick counts are measured at
pub const SAMPLE_RATE: i64 = 8000;

/// T0: wait for the called terminal to answer
pub const TIMER_T0_MS: i64 = 60_000;
/// T1: wait for the terminals to identify each other
pub const TIMER_T1_MS: i64 = 35_000;
/// T2: command/response synchronisation
pub const TIMER_T2_MS: i64 = 7_000;
/// T3: wait for operator intervention on a procedural interrupt
pub const TIMER_T3_MS: i64 = 15_000;
/// T4: wait for a response to a command
pub const TIMER_T4_MS: i64 = 3_450;
/// T5: wait for the receiver's busy condition to clear (ECM)
pub const TIMER_T5_MS: i64 = 65_000;

/// Convert milliseconds to sample ticks
#[inline]
pub const fn ms_to_samples(ms: i64) -> i64 {
    (ms * SAMPLE_RATE) / 1000
}

/// A timer that crossed zero during a tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerEvent {
    T0Expired,
    T1Expired,
    T2Expired,
    T3Expired,
    T4Expired,
    T5Expired,
}

/// The four shared countdown counters
#[derive(Clone, Debug, Default)]
pub struct Timers {
    t0_t1: i64,
    t2_t4: i64,
    t3: i64,
    t5: i64,
    timer_is_t4: bool,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop everything
    pub fn stop_all(&mut self) {
        self.t0_t1 = 0;
        self.t2_t4 = 0;
        self.t3 = 0;
        self.t5 = 0;
    }

    /// Arm the shared T0/T1 counter for T0
    pub fn start_t0(&mut self) {
        self.t0_t1 = ms_to_samples(TIMER_T0_MS);
    }

    /// Arm the shared T0/T1 counter for T1
    pub fn start_t1(&mut self) {
        self.t0_t1 = ms_to_samples(TIMER_T1_MS);
    }

    pub fn stop_t0_t1(&mut self) {
        self.t0_t1 = 0;
    }

    pub fn t0_t1_running(&self) -> bool {
        self.t0_t1 > 0
    }

    /// Arm the shared T2/T4 counter for T2
    pub fn start_t2(&mut self) {
        self.t2_t4 = ms_to_samples(TIMER_T2_MS);
        self.timer_is_t4 = false;
    }

    /// Arm the shared T2/T4 counter for T4
    pub fn start_t4(&mut self) {
        self.t2_t4 = ms_to_samples(TIMER_T4_MS);
        self.timer_is_t4 = true;
    }

    pub fn stop_t2_t4(&mut self) {
        self.t2_t4 = 0;
    }

    /// Stop the shared counter only if it is currently running as T2
    ///
    /// Receipt of an HDLC flag resets T2, but must not disturb a pending
    /// T4.
    pub fn stop_t2_if_running(&mut self) {
        if !self.timer_is_t4 && self.t2_t4 > 0 {
            self.t2_t4 = 0;
        }
    }

    pub fn t2_t4_running(&self) -> bool {
        self.t2_t4 > 0
    }

    /// Re-arm the shared counter as whichever of T2/T4 it last ran as
    ///
    /// A non-final frame in a command sequence restarts the wait for
    /// the rest of the sequence.
    pub fn rearm_t2_t4(&mut self) {
        self.t2_t4 = ms_to_samples(if self.timer_is_t4 {
            TIMER_T4_MS
        } else {
            TIMER_T2_MS
        });
    }

    pub fn start_t3(&mut self) {
        self.t3 = ms_to_samples(TIMER_T3_MS);
    }

    pub fn stop_t3(&mut self) {
        self.t3 = 0;
    }

    pub fn t3_running(&self) -> bool {
        self.t3 > 0
    }

    /// Arm T5 if it is not already running
    ///
    /// T5 begins on the first RNR of a busy period and must not restart
    /// on repeats.
    pub fn start_t5_if_stopped(&mut self) {
        if self.t5 == 0 {
            self.t5 = ms_to_samples(TIMER_T5_MS);
        }
    }

    pub fn stop_t5(&mut self) {
        self.t5 = 0;
    }

    pub fn t5_running(&self) -> bool {
        self.t5 > 0
    }

    /// Advance every running timer by `samples` ticks
    ///
    /// `far_end_detected` selects whether the shared T0/T1 counter
    /// reports as T0 or T1 on expiry. At most one event per timer is
    /// produced per call.
    pub fn tick(&mut self, samples: i64, far_end_detected: bool) -> ArrayVec<TimerEvent, 4> {
        let mut events = ArrayVec::new();
        if self.t0_t1 > 0 {
            self.t0_t1 -= samples;
            if self.t0_t1 <= 0 {
                self.t0_t1 = 0;
                events.push(if far_end_detected {
                    TimerEvent::T1Expired
                } else {
                    TimerEvent::T0Expired
                });
            }
        }
        if self.t3 > 0 {
            self.t3 -= samples;
            if self.t3 <= 0 {
                self.t3 = 0;
                events.push(TimerEvent::T3Expired);
            }
        }
        if self.t2_t4 > 0 {
            self.t2_t4 -= samples;
            if self.t2_t4 <= 0 {
                self.t2_t4 = 0;
                events.push(if self.timer_is_t4 {
                    TimerEvent::T4Expired
                } else {
                    TimerEvent::T2Expired
                });
            }
        }
        if self.t5 > 0 {
            self.t5 -= samples;
            if self.t5 <= 0 {
                self.t5 = 0;
                events.push(TimerEvent::T5Expired);
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ms_to_samples() {
        assert_eq!(8000, ms_to_samples(1000));
        assert_eq!(27600, ms_to_samples(TIMER_T4_MS));
        assert_eq!(480_000, ms_to_samples(TIMER_T0_MS));
    }

    #[test]
    fn test_t0_vs_t1() {
        let mut timers = Timers::new();
        timers.start_t0();
        let events = timers.tick(ms_to_samples(TIMER_T0_MS), false);
        assert_eq!(&events[..], &[TimerEvent::T0Expired]);

        timers.start_t1();
        let events = timers.tick(ms_to_samples(TIMER_T1_MS), true);
        assert_eq!(&events[..], &[TimerEvent::T1Expired]);
    }

    #[test]
    fn test_t2_t4_share_storage() {
        let mut timers = Timers::new();
        timers.start_t2();
        timers.start_t4();
        // only one of the pair can be pending
        let events = timers.tick(ms_to_samples(TIMER_T4_MS), false);
        assert_eq!(&events[..], &[TimerEvent::T4Expired]);
        assert!(!timers.t2_t4_running());
    }

    #[test]
    fn test_flag_resets_t2_not_t4() {
        let mut timers = Timers::new();
        timers.start_t2();
        timers.stop_t2_if_running();
        assert!(!timers.t2_t4_running());

        timers.start_t4();
        timers.stop_t2_if_running();
        assert!(timers.t2_t4_running());
    }

    #[test]
    fn test_partial_tick_no_event() {
        let mut timers = Timers::new();
        timers.start_t2();
        assert!(timers.tick(ms_to_samples(TIMER_T2_MS) - 1, false).is_empty());
        assert_eq!(
            &timers.tick(1, false)[..],
            &[TimerEvent::T2Expired]
        );
    }

    #[test]
    fn test_t5_arms_once() {
        let mut timers = Timers::new();
        timers.start_t5_if_stopped();
        timers.tick(ms_to_samples(1000), false);
        let before = timers.t5;
        timers.start_t5_if_stopped();
        assert_eq!(before, timers.t5);
    }

    #[test]
    fn test_stopped_timers_stay_quiet() {
        let mut timers = Timers::new();
        assert!(timers.tick(ms_to_samples(120_000), false).is_empty());
    }
}
