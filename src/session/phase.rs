//! Call phases and their modem wiring
//!
//! T.30 structures a call into five phases: A (call set-up with CNG/CED
//! tones), B (pre-message negotiation), C (the page itself), D
//! (post-message procedure) and E (release). Each phase fixes which
//! modem runs in each direction; entering a phase reconfigures the
//! front end through the environment and arms the phase-owned timers.

#[cfg(not(test))]
use log::debug;

#[cfg(test)]
use std::println as debug;

use crate::fallback::FALLBACK_SEQUENCE;
use crate::modem::ModemType;

use super::{Session, SessionEnvironment};

/// Silence appended before disconnecting, so the last frame flushes
/// through the far end's buffers
const FINAL_FLUSH_TIME_MS: u16 = 1000;

/// Where the call currently is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Freshly initialised
    Idle,
    /// Answering party sending CED
    ACed,
    /// Calling party sending CNG
    ACng,
    /// Receiving pre-message control frames
    BRx,
    /// Transmitting pre-message control frames
    BTx,
    /// Receiving a page in non-ECM mode
    CNonEcmRx,
    /// Transmitting a page in non-ECM mode
    CNonEcmTx,
    /// Receiving a page in ECM (HDLC) mode
    CEcmRx,
    /// Transmitting a page in ECM (HDLC) mode
    CEcmTx,
    /// Receiving post-message control frames
    DRx,
    /// Transmitting post-message control frames
    DTx,
    /// Call release
    E,
    /// The call is completely finished
    CallFinished,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::ACed => "A_CED",
            Phase::ACng => "A_CNG",
            Phase::BRx => "B_RX",
            Phase::BTx => "B_TX",
            Phase::CNonEcmRx => "C_NON_ECM_RX",
            Phase::CNonEcmTx => "C_NON_ECM_TX",
            Phase::CEcmRx => "C_ECM_RX",
            Phase::CEcmTx => "C_ECM_TX",
            Phase::DRx => "D_RX",
            Phase::DTx => "D_TX",
            Phase::E => "E",
            Phase::CallFinished => "CALL_FINISHED",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl<E: SessionEnvironment> Session<E> {
    /// Install `phase`, deferred until the receive signal drops if one
    /// is present
    ///
    /// This is the only reordering the session performs: the phase
    /// change is latched and applied when the receive-signal indicator
    /// next goes false.
    pub(super) fn queue_phase(&mut self, phase: Phase) {
        if self.rx_signal_present {
            self.next_phase = Some(phase);
        } else {
            self.set_phase(phase);
            self.next_phase = None;
        }
    }

    /// Switch to `phase` immediately and rewire the modems
    pub(super) fn set_phase(&mut self, phase: Phase) {
        if phase == self.phase {
            return;
        }
        debug!("changing from phase {} to {}", self.phase, phase);
        // We may be killing a receiver before it has declared the end
        // of its signal; it will never get the chance to, so force the
        // indicator off. The phase A tone detectors are not receivers
        // in that sense.
        if self.phase != Phase::ACed && self.phase != Phase::ACng {
            self.rx_signal_present = false;
        }
        self.rx_trained = false;
        self.phase = phase;
        match phase {
            Phase::Idle => {}
            Phase::ACed => {
                self.env.set_rx_modem(ModemType::V21, false, true);
                self.env.set_tx_modem(ModemType::Ced, false, false);
            }
            Phase::ACng => {
                self.env.set_rx_modem(ModemType::V21, false, true);
                self.env.set_tx_modem(ModemType::Cng, false, false);
            }
            Phase::BRx | Phase::DRx => {
                self.env.set_rx_modem(ModemType::V21, false, true);
                self.env.set_tx_modem(ModemType::None, false, false);
            }
            Phase::BTx | Phase::DTx => {
                // Transmitting a V.21 frame counts as having contacted
                // the far end.
                if !self.far_end_detected && self.timers.t0_t1_running() {
                    self.timers.start_t1();
                    self.far_end_detected = true;
                }
                self.env.set_rx_modem(ModemType::None, false, false);
                self.env.set_tx_modem(ModemType::V21, false, true);
            }
            Phase::CNonEcmRx => {
                self.timers.start_t2();
                self.env.set_rx_modem(
                    FALLBACK_SEQUENCE[self.current_fallback].modem_type,
                    self.short_train,
                    false,
                );
                self.env.set_tx_modem(ModemType::None, false, false);
            }
            Phase::CNonEcmTx => {
                // Prime the training count for 1.5s of data at the
                // current rate. Harmless if this turns out not to be a
                // TCF.
                self.training_test_bits =
                    (3 * FALLBACK_SEQUENCE[self.current_fallback].bit_rate as i32) / 2;
                self.env.set_rx_modem(ModemType::None, false, false);
                self.env.set_tx_modem(
                    FALLBACK_SEQUENCE[self.current_fallback].modem_type,
                    self.short_train,
                    false,
                );
            }
            Phase::CEcmRx => {
                self.timers.start_t2();
                self.env.set_rx_modem(
                    FALLBACK_SEQUENCE[self.current_fallback].modem_type,
                    self.short_train,
                    true,
                );
                self.env.set_tx_modem(ModemType::None, false, false);
            }
            Phase::CEcmTx => {
                self.env.set_rx_modem(ModemType::None, false, false);
                self.env.set_tx_modem(
                    FALLBACK_SEQUENCE[self.current_fallback].modem_type,
                    self.short_train,
                    true,
                );
            }
            Phase::E => {
                // A little silence before ending things, so the far end
                // sees the last message we sent.
                self.training_current_zeros = 0;
                self.training_most_zeros = 0;
                self.env.set_rx_modem(ModemType::None, false, false);
                self.env
                    .set_tx_modem(ModemType::Pause(FINAL_FLUSH_TIME_MS), false, false);
            }
            Phase::CallFinished => {
                self.env.set_rx_modem(ModemType::Done, false, false);
                self.env.set_tx_modem(ModemType::Done, false, false);
            }
        }
    }
}
