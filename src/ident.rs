//! Station identifier and address payload codecs
//!
//! T.30 carries station identities (TSI/CSI/CIG), passwords, and
//! addresses as 20-character payloads, transmitted in reverse order and
//! right-padded with spaces. Internet addresses (CSA/CIA/TSA/IRA/ISP)
//! use a short sequenced format with a type octet and a length octet.

use arrayvec::ArrayVec;

#[cfg(not(test))]
use log::debug;

#[cfg(test)]
use std::println as debug;

use crate::frames::{frame_name, ADDRESS, CONTROL_NON_FINAL};

/// Longest station identifier, in characters
pub const MAX_IDENT_LEN: usize = 20;

/// A complete 20-digit message frame: header + FCF + 20 payload octets
pub const IDENT_FRAME_LEN: usize = 23;

/// Build a 20-digit message frame around `fcf`
///
/// The payload is written backwards and the frame padded with spaces to
/// its fixed 23-octet length. These frames are never final; the caller
/// ors in the DIS-received bit beforehand if needed.
pub fn encode_ident_frame(fcf: u8, msg: &str) -> ArrayVec<u8, IDENT_FRAME_LEN> {
    let mut frame = ArrayVec::new();
    frame.push(ADDRESS);
    frame.push(CONTROL_NON_FINAL);
    frame.push(fcf);
    for byte in msg.bytes().rev().take(MAX_IDENT_LEN) {
        frame.push(byte);
    }
    while !frame.is_full() {
        frame.push(b' ');
    }
    frame
}

/// Decode a 20-digit payload (FCF octet included in `pkt`)
///
/// Trailing spaces are trimmed and the character order restored.
/// Returns `None` when the payload exceeds the identifier limit, which
/// the caller reports as a bad frame length.
pub fn decode_ident_payload(pkt: &[u8]) -> Option<String> {
    if pkt.len() > MAX_IDENT_LEN + 1 {
        return None;
    }
    let mut p = pkt.len();
    while p > 1 && pkt[p - 1] == b' ' {
        p -= 1;
    }
    let mut msg = String::with_capacity(p);
    while p > 1 {
        p -= 1;
        msg.push(char::from(pkt[p]));
    }
    debug!("remote gave {} as: \"{}\"", frame_name(pkt[0]), msg);
    Some(msg)
}

/// Decode a URL-like payload (FCF octet included in `pkt`)
///
/// The payload carries a sequence octet, an address-type octet, a length
/// octet, then the address text. Returns `None` on any length
/// inconsistency.
pub fn decode_url_payload(pkt: &[u8]) -> Option<String> {
    const MAX_URL_LEN: usize = 77;

    if pkt.len() < 3 || pkt.len() > MAX_URL_LEN + 3 || pkt.len() != usize::from(pkt[2]) + 3 {
        return None;
    }
    let msg: String = pkt[3..].iter().map(|&b| char::from(b)).collect();
    debug!(
        "remote gave {} as: {}, {}, \"{}\"",
        frame_name(pkt[0]),
        pkt[0],
        pkt[1],
        msg
    );
    Some(msg)
}
