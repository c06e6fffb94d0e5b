//! T.30 HDLC frame constants
//!
//! Every control frame on a T.30 link starts with the three-octet header
//! `FF 03 <fcf>` (non-final) or `FF 13 <fcf>` (final). The fax control
//! field (FCF) values live in [`fcf`]; the low-order bit of most FCFs is
//! reused on the wire to mark whether the sender has previously received
//! a DIS, so receivers compare FCFs with that bit masked off.

/// HDLC address octet shared by all T.30 frames
pub const ADDRESS: u8 = 0xFF;

/// Control octet for a non-final frame
pub const CONTROL_NON_FINAL: u8 = 0x03;

/// Control octet for a final frame
pub const CONTROL_FINAL: u8 = 0x13;

/// Bit within the control octet that marks a final frame
pub const FINAL_BIT: u8 = 0x10;

/// Mask applied to a received FCF to strip the DIS-received bit
pub const FCF_MASK: u8 = 0xFE;

/// Longest frame the session will emit: 3-octet header + FCF extension
/// octet + ECM sequence number + a 256-octet ECM payload.
pub const MAX_FRAME_LEN: usize = 3 + 1 + 256;

/// Fax control field values
///
/// The initial identification group travels from the called to the
/// calling terminal; the command groups run the other way. Values with
/// the low bit set (DTC, CIG, NSC) are the "from a DIS receiver"
/// variants of the value one below them.
pub mod fcf {
    /// Digital identification signal
    pub const DIS: u8 = 0x80;
    /// Called subscriber identification
    pub const CSI: u8 = 0x40;
    /// Non-standard facilities
    pub const NSF: u8 = 0x20;

    /// Digital transmit command
    pub const DTC: u8 = 0x81;
    /// Calling subscriber identification
    pub const CIG: u8 = 0x41;
    /// Non-standard facilities command
    pub const NSC: u8 = 0x21;
    /// Password (for polling)
    pub const PWD: u8 = 0xC1;
    /// Selective polling address
    pub const SEP: u8 = 0xA1;
    /// Polled subaddress
    pub const PSA: u8 = 0x61;
    /// Calling subscriber internet address
    pub const CIA: u8 = 0xE1;
    /// Internet selective polling address
    pub const ISP: u8 = 0x11;

    /// Digital command signal
    pub const DCS: u8 = 0x82;
    /// Transmitting subscriber identification
    pub const TSI: u8 = 0x42;
    /// Non-standard facilities set-up
    pub const NSS: u8 = 0x22;
    /// Subaddress
    pub const SUB: u8 = 0xC2;
    /// Sender identification
    pub const SID: u8 = 0xA2;
    /// Continue to correct
    pub const CTC: u8 = 0x12;
    /// Transmitting subscriber internet address
    pub const TSA: u8 = 0x62;
    /// Internet routing address
    pub const IRA: u8 = 0xE2;

    /// Confirmation to receive
    pub const CFR: u8 = 0x84;
    /// Failure to train
    pub const FTT: u8 = 0x44;
    /// Response to continue-to-correct
    pub const CTR: u8 = 0xC4;
    /// Called subscriber internet address
    pub const CSA: u8 = 0x24;

    /// End of message (more documents follow)
    pub const EOM: u8 = 0x8E;
    /// Multipage signal (more pages of this document follow)
    pub const MPS: u8 = 0x4E;
    /// End of procedure
    pub const EOP: u8 = 0x2E;
    /// Procedure interrupt, end of message
    pub const PRI_EOM: u8 = 0x9E;
    /// Procedure interrupt, multipage
    pub const PRI_MPS: u8 = 0x5E;
    /// Procedure interrupt, end of procedure
    pub const PRI_EOP: u8 = 0x3E;
    /// End of selection
    pub const EOS: u8 = 0x1E;
    /// Partial page signal
    pub const PPS: u8 = 0xBE;
    /// End of retransmission
    pub const EOR: u8 = 0xCE;
    /// Receiver ready
    pub const RR: u8 = 0x6E;

    /// Message confirmation
    pub const MCF: u8 = 0x8C;
    /// Retrain positive
    pub const RTP: u8 = 0xCC;
    /// Retrain negative
    pub const RTN: u8 = 0x4C;
    /// Procedure interrupt positive
    pub const PIP: u8 = 0xAC;
    /// Procedure interrupt negative
    pub const PIN: u8 = 0x2C;
    /// Partial page request
    pub const PPR: u8 = 0xBC;
    /// Receive not ready
    pub const RNR: u8 = 0xEC;
    /// Response to end-of-retransmission
    pub const ERR: u8 = 0x1C;
    /// File diagnostics message
    pub const FDM: u8 = 0xFC;

    /// Disconnect
    pub const DCN: u8 = 0xFA;
    /// Command repeat
    pub const CRP: u8 = 0x1A;
    /// Field not valid
    pub const FNV: u8 = 0xCA;
    /// Transmit not ready
    pub const TNR: u8 = 0xEA;
    /// Transmit ready
    pub const TR: u8 = 0x6A;

    /// Placeholder FCF2 in PPS/EOR when there is no post-page command yet
    pub const NULL: u8 = 0x00;

    /// Facsimile coded data (ECM image frame, T.4 annex A)
    pub const FCD: u8 = 0x06;
    /// Return to control for partial page
    pub const RCP: u8 = 0x86;
}

/// Name of a frame type, for trace output
///
/// The DIS-received bit distinguishes pairs like DIS/DTC and CSI/CIG, so
/// the unmasked FCF is needed to name those correctly.
pub fn frame_name(x: u8) -> &'static str {
    match x & FCF_MASK {
        fcf::DIS => {
            if x == fcf::DTC {
                "DTC"
            } else {
                "DIS"
            }
        }
        fcf::CSI => {
            if x == fcf::CIG {
                "CIG"
            } else {
                "CSI"
            }
        }
        fcf::NSF => {
            if x == fcf::NSC {
                "NSC"
            } else {
                "NSF"
            }
        }
        0xC0 => "PWD",
        0xA0 => "SEP",
        0x60 => "PSA",
        0xE0 => "CIA",
        0x10 => "ISP",
        fcf::DCS => "DCS",
        fcf::TSI => "TSI",
        fcf::NSS => "NSS",
        fcf::SUB => "SUB",
        fcf::SID => "SID",
        fcf::CTC => "CTC",
        fcf::TSA => "TSA",
        fcf::IRA => "IRA",
        fcf::CFR => "CFR",
        fcf::FTT => "FTT",
        fcf::CTR => "CTR",
        fcf::CSA => "CSA",
        fcf::EOM => "EOM",
        fcf::MPS => "MPS",
        fcf::EOP => "EOP",
        fcf::PRI_EOM => "PRI_EOM",
        fcf::PRI_MPS => "PRI_MPS",
        fcf::PRI_EOP => "PRI_EOP",
        fcf::EOS => "EOS",
        fcf::PPS => "PPS",
        fcf::EOR => "EOR",
        fcf::RR => "RR",
        fcf::MCF => "MCF",
        fcf::RTP => "RTP",
        fcf::RTN => "RTN",
        fcf::PIP => "PIP",
        fcf::PIN => "PIN",
        fcf::PPR => "PPR",
        fcf::RNR => "RNR",
        fcf::ERR => "ERR",
        fcf::FDM => "FDM",
        fcf::DCN => "DCN",
        fcf::CRP => "CRP",
        fcf::FNV => "FNV",
        fcf::TNR => "TNR",
        fcf::TR => "TR",
        fcf::NULL => "NULL",
        fcf::FCD => "FCD",
        fcf::RCP => "RCP",
        _ => "???",
    }
}

/// True if the control octet carries the final-frame tag
#[inline]
pub fn is_final(control: u8) -> bool {
    (control & FINAL_BIT) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_names() {
        assert_eq!("DIS", frame_name(fcf::DIS));
        assert_eq!("DTC", frame_name(fcf::DTC));
        assert_eq!("CSI", frame_name(fcf::CSI));
        assert_eq!("CIG", frame_name(fcf::CIG));
        assert_eq!("MCF", frame_name(fcf::MCF));
        assert_eq!("MCF", frame_name(fcf::MCF | 0x01));
        assert_eq!("PPS", frame_name(fcf::PPS));
        assert_eq!("PPR", frame_name(fcf::PPR));
        assert_eq!("FCD", frame_name(fcf::FCD));
        assert_eq!("RCP", frame_name(fcf::RCP));
        assert_eq!("???", frame_name(0xF0));
    }

    #[test]
    fn test_final_bit() {
        assert!(is_final(CONTROL_FINAL));
        assert!(!is_final(CONTROL_NON_FINAL));
    }

    #[test]
    fn test_pairs_differ_by_dis_bit() {
        assert_eq!(fcf::DTC, fcf::DIS | 0x01);
        assert_eq!(fcf::CIG, fcf::CSI | 0x01);
        assert_eq!(fcf::NSC, fcf::NSF | 0x01);
    }
}
