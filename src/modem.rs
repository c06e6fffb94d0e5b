//! Modem selection and front-end event types
//!
//! The session never touches samples itself. It selects which modem the
//! front end should run in each direction, and the front end feeds back
//! carrier events, decoded frames, and completion notices.

/// Modem (or tone generator) selection for one direction of the link
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModemType {
    /// No modem; the direction is quiet
    None,
    /// Timed silence of the given duration in milliseconds
    Pause(u16),
    /// Called-terminal answer tone
    Ced,
    /// Calling tone
    Cng,
    /// V.21 channel 2, 300 bps HDLC signalling
    V21,
    /// V.27ter at 2400 bps
    V27ter2400,
    /// V.27ter at 4800 bps
    V27ter4800,
    /// V.29 at 7200 bps
    V29_7200,
    /// V.29 at 9600 bps
    V29_9600,
    /// V.17 at 7200 bps
    V17_7200,
    /// V.17 at 9600 bps
    V17_9600,
    /// V.17 at 12000 bps
    V17_12000,
    /// V.17 at 14400 bps
    V17_14400,
    /// The call is over; the front end may shut down
    Done,
}

/// Carrier and training events from a receive modem
///
/// Delivered through [`Session::hdlc_signal`](crate::Session::hdlc_signal)
/// for the V.21/ECM side and
/// [`Session::non_ecm_signal`](crate::Session::non_ecm_signal) for the
/// image modem.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CarrierEvent {
    /// The modem failed to train on the incoming carrier
    TrainingFailed,
    /// The modem trained; data will follow
    TrainingSucceeded,
    /// Carrier energy detected
    CarrierUp,
    /// Carrier dropped
    CarrierDown,
    /// A well-formed HDLC flag sequence was seen (V.21 side only)
    FramingOk,
}

/// Notifications from the front end about its own progress
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrontEndStatus {
    /// One queued transmit step has finished
    SendStepComplete,
    /// The whole queued transmission has finished
    SendComplete,
    /// Reception has finished, even if no carrier-down was seen
    ReceiveComplete,
    /// The front end asserts the expected signal is present
    SignalPresent,
    /// The front end asserts no signal is present
    SignalAbsent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modem_distinct() {
        assert_ne!(ModemType::V29_9600, ModemType::V17_9600);
        assert_ne!(ModemType::None, ModemType::Pause(0));
    }
}
