//! Session completion codes
//!
//! A session carries a single "current status" from start to finish. It
//! begins as [`Status::Ok`], may be overwritten by whichever failure is
//! detected first, and is delivered to the phase-E hook when the call
//! reaches its end.

use strum::EnumMessage;

/// Result of a fax session, reported at phase E
///
/// `Status` implements `Display` with a short human-readable description
/// of each outcome:
///
/// ```
/// use t30ctl::Status;
///
/// assert_eq!("OK", &format!("{}", Status::Ok));
/// assert_eq!(
///     "failed to train with any of the compatible modems",
///     &format!("{}", Status::CannotTrain)
/// );
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum_macros::EnumMessage)]
pub enum Status {
    /// The call completed normally
    #[default]
    #[strum(detailed_message = "OK")]
    Ok,

    /// Timed out waiting for initial communication
    #[strum(detailed_message = "timed out waiting for initial communication")]
    T0Expired,
    /// Timed out waiting for the first message
    #[strum(detailed_message = "timed out waiting for the first message")]
    T1Expired,
    /// Timed out waiting for a procedural interrupt
    #[strum(detailed_message = "timed out waiting for procedural interrupt")]
    T3Expired,
    /// Timed out waiting for the receiver to become ready (ECM)
    #[strum(detailed_message = "timed out waiting for receiver ready (ECM mode)")]
    T5Expired,

    /// Timer T2 expired while waiting for the fax page
    #[strum(detailed_message = "timer T2 expired while waiting for fax page")]
    T2ExpiredFaxRx,
    /// Timer T2 expired while waiting for the next fax page
    #[strum(detailed_message = "timer T2 expired while waiting for next fax page")]
    T2ExpiredMpsRx,
    /// Timer T2 expired while waiting for the RR command
    #[strum(detailed_message = "timer T2 expired while waiting for RR command")]
    T2ExpiredRrRx,
    /// Timer T2 expired while waiting for NSS, DCS or MCF
    #[strum(detailed_message = "timer T2 expired while waiting for NSS, DCS or MCF")]
    T2ExpiredRx,
    /// Timer T2 expired while waiting for DCN
    #[strum(detailed_message = "timer T2 expired while waiting for DCN")]
    T2ExpiredDcnRx,
    /// Timer T2 expired while waiting for phase D
    #[strum(detailed_message = "timer T2 expired while waiting for phase D")]
    T2ExpiredDRx,

    /// An unexpected final or non-final frame arrived
    #[strum(detailed_message = "unexpected message received")]
    Unexpected,
    /// The far end offers no modem we support
    #[strum(detailed_message = "far end is not compatible")]
    Incompatible,
    /// The far end cannot receive
    #[strum(detailed_message = "far end is not able to receive")]
    RxIncapable,
    /// The far end cannot transmit
    #[strum(detailed_message = "far end is not able to transmit")]
    TxIncapable,
    /// The far end cannot receive at the resolution of the image
    #[strum(detailed_message = "far end cannot receive at the resolution of the image")]
    ResolutionNotSupported,
    /// The far end cannot receive at the size of the image
    #[strum(detailed_message = "far end cannot receive at the size of image")]
    SizeNotSupported,

    /// Unexpected DCN while waiting for DCS or DIS
    #[strum(detailed_message = "unexpected DCN while waiting for DCS or DIS")]
    DcnWhyRx,
    /// Unexpected DCN while waiting for image data
    #[strum(detailed_message = "unexpected DCN while waiting for image data")]
    DcnDataRx,
    /// Unexpected DCN while waiting for EOM, EOP or MPS
    #[strum(detailed_message = "unexpected DCN while waiting for EOM, EOP or MPS")]
    DcnFaxRx,
    /// Unexpected DCN after an EOM or MPS sequence
    #[strum(detailed_message = "unexpected DCN after EOM or MPS sequence")]
    DcnPhdRx,
    /// Unexpected DCN after an RR/RNR sequence
    #[strum(detailed_message = "unexpected DCN after RR/RNR sequence")]
    DcnRrdRx,
    /// Unexpected DCN after a requested retransmission
    #[strum(detailed_message = "unexpected DCN after requested retransmission")]
    DcnNoRtnRx,

    /// The document file cannot be opened
    #[strum(detailed_message = "document file cannot be opened")]
    FileError,
    /// Bad TIFF header values
    #[strum(detailed_message = "bad TIFF/F header - incorrect values in fields")]
    BadTiffHdr,
    /// Incorrect TIFF tag values
    #[strum(detailed_message = "incorrect values for TIFF/F tags")]
    BadTag,
    /// The requested page was not found
    #[strum(detailed_message = "document page not found")]
    NoPage,

    /// Every compatible modem failed the trainability test
    #[strum(detailed_message = "failed to train with any of the compatible modems")]
    CannotTrain,
    /// Carrier lost during fax receive
    #[strum(detailed_message = "carrier lost during fax receive")]
    NoCarrierRx,
    /// Bad response to DCS or training
    #[strum(detailed_message = "received bad response to DCS or training")]
    BadDcsTx,
    /// DCN received from the remote after sending a page
    #[strum(detailed_message = "received a DCN from remote after sending a page")]
    BadPgTx,
    /// Invalid ECM response received from the receiver
    #[strum(detailed_message = "invalid ECM response received from receiver")]
    EcmPhdTx,
    /// Invalid ECM response received from the transmitter
    #[strum(detailed_message = "invalid ECM response received from transmitter")]
    EcmPhdRx,
    /// DCN received while waiting for a DIS
    #[strum(detailed_message = "received a DCN while waiting for a DIS")]
    GotDcnTx,
    /// Invalid response after sending a page
    #[strum(detailed_message = "invalid response after sending a page")]
    InvalRspTx,
    /// Something other than DIS received while waiting for DIS
    #[strum(detailed_message = "received other than DIS while waiting for DIS")]
    NoDisTx,
    /// No response to DCS or TCF
    #[strum(detailed_message = "received no response to DCS or TCF")]
    PhBDeadTx,
    /// No response after sending a page
    #[strum(detailed_message = "no response after sending a page")]
    PhDDeadTx,
    /// Unexpected command after a page was received
    #[strum(detailed_message = "unexpected command after page received")]
    InvalCmdRx,
    /// Disconnected after the permitted retries
    #[strum(detailed_message = "disconnected after permitted retries")]
    RetryDCN,
    /// The call dropped prematurely
    #[strum(detailed_message = "the call dropped prematurely")]
    CallDropped,
}

impl Status {
    /// Human-readable description of this completion code
    pub fn as_display_str(&self) -> &'static str {
        self.get_detailed_message().expect("missing definition")
    }

    /// True if this code represents a clean outcome
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_display_str().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!("OK", Status::Ok.as_display_str());
        assert_eq!(
            "disconnected after permitted retries",
            &format!("{}", Status::RetryDCN)
        );
        assert_eq!(
            "received no response to DCS or TCF",
            &format!("{}", Status::PhBDeadTx)
        );
    }

    #[test]
    fn test_is_ok() {
        assert!(Status::Ok.is_ok());
        assert!(!Status::CallDropped.is_ok());
    }
}
