//! The ECM partial page and selective repeat
//!
//! In error correction mode a page travels as up to 256 HDLC "facsimile
//! coded data" frames per partial page, each tagged with its sequence
//! number. The transmitter keeps the whole partial page buffered so the
//! receiver can request any subset again with a PPR bitmap; the
//! receiver keeps the same shape of buffer so it can tell which frames
//! it is still missing.

use arrayvec::ArrayVec;

#[cfg(not(test))]
use log::{debug, info, warn};

#[cfg(test)]
use std::{println as debug, println as info, println as warn};

use crate::document::TxDocument;
use crate::frames::{fcf, frame_name, ADDRESS, CONTROL_FINAL, CONTROL_NON_FINAL, FCF_MASK};

use super::states::State;
use super::{Session, SessionEnvironment};

/// Frames per partial page
pub const FRAMES_PER_PARTIAL_PAGE: usize = 256;

/// A transmit slot: 3-octet HDLC header + sequence octet + up to 256
/// octets of image data
pub const MAX_SLOT_LEN: usize = 4 + 256;

/// Octets in the PPR / missing-frame bitmap
pub const FRAME_MAP_LEN: usize = 32;

/// One buffered ECM frame; `None` marks a slot with nothing (left) to
/// send, or not yet received
type Slot = Option<ArrayVec<u8, MAX_SLOT_LEN>>;

/// What the transmitter should put on the wire next
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EcmTxStep {
    /// Send the frame buffered in this slot
    DataFrame(usize),
    /// All data frames are out; send an RCP
    Rcp,
    /// Data and RCP frames are all out
    Exhausted,
}

/// The 256-slot partial page shared by both directions
pub struct EcmBuffer {
    slots: Vec<Slot>,
    /// Page number within the call
    pub page: u32,
    /// Block number within the page
    pub block: u32,
    /// Frames in the current block, when known
    pub frames: Option<usize>,
    /// Transmit cursor
    pub current_frame: usize,
    /// Frames sent in the burst now on the wire
    pub frames_this_burst: usize,
    /// True when the buffered block reaches the end of the page
    pub at_page_end: bool,
    /// Missing-frame bitmap, as sent in a PPR
    pub frame_map: [u8; FRAME_MAP_LEN],
    /// Lowest missing frame number found by the last map scan
    pub first_bad_frame: usize,
}

impl EcmBuffer {
    pub fn new() -> Self {
        Self {
            slots: (0..FRAMES_PER_PARTIAL_PAGE).map(|_| None).collect(),
            page: 0,
            block: 0,
            frames: None,
            current_frame: 0,
            frames_this_burst: 0,
            at_page_end: false,
            frame_map: [0; FRAME_MAP_LEN],
            first_bad_frame: FRAMES_PER_PARTIAL_PAGE,
        }
    }

    /// Empty every slot and forget the frame count
    pub fn clear_slots(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.frames = None;
    }

    pub fn slot(&self, index: usize) -> Option<&[u8]> {
        self.slots[index].as_deref()
    }

    /// Store a received FCD payload in its numbered slot
    pub fn store_frame(&mut self, frame_no: usize, payload: &[u8]) {
        let mut slot = ArrayVec::new();
        slot.try_extend_from_slice(payload)
            .expect("FCD payload length checked by caller");
        self.slots[frame_no] = Some(slot);
    }

    /// Fill the buffer with complete FCD frames read from `doc`
    ///
    /// Frames are built ready to send: header, sequence number, then
    /// `octets_per_frame` of image data, the last frame zero-padded to
    /// full size since most receivers expect that. Returns the number
    /// of frames buffered; zero means the page had no data left.
    pub fn fill_from_document(
        &mut self,
        doc: &mut dyn TxDocument,
        octets_per_frame: usize,
    ) -> usize {
        self.frame_map = [0xFF; FRAME_MAP_LEN];
        for i in 0..FRAMES_PER_PARTIAL_PAGE {
            let mut slot: ArrayVec<u8, MAX_SLOT_LEN> = ArrayVec::new();
            slot.push(ADDRESS);
            slot.push(CONTROL_NON_FINAL);
            slot.push(fcf::FCD);
            slot.push(i as u8);
            let start = slot.len();
            for _ in 0..octets_per_frame {
                slot.push(0);
            }
            let len = doc.get_chunk(&mut slot[start..start + octets_per_frame]);
            if len < octets_per_frame {
                // the image ran out inside this frame
                self.slots[i] = None;
                let mut count = i;
                if len > 0 {
                    // keep the short frame, padded to full size
                    self.slots[i] = Some(slot);
                    count = i + 1;
                }
                for slot in &mut self.slots[count..] {
                    *slot = None;
                }
                self.frames = Some(count);
                info!(
                    "partial page buffer contains {} frames ({} per frame)",
                    count, octets_per_frame
                );
                self.at_page_end = true;
                return count;
            }
            self.slots[i] = Some(slot);
        }
        self.frames = Some(FRAMES_PER_PARTIAL_PAGE);
        info!("partial page buffer full ({} per frame)", octets_per_frame);
        self.at_page_end = doc.at_end_of_page();
        FRAMES_PER_PARTIAL_PAGE
    }

    /// Next transmit step, advancing the cursor
    ///
    /// Skips slots already confirmed by the far end. After the last
    /// data frame, yields three RCP frames; several are sent so a bit
    /// error cannot hide the return to control.
    pub fn advance_tx(&mut self) -> EcmTxStep {
        let frames = self.frames.unwrap_or(0);
        if self.current_frame < frames {
            for i in self.current_frame..frames {
                if self.slots[i].is_some() {
                    self.current_frame = i + 1;
                    self.frames_this_burst += 1;
                    return EcmTxStep::DataFrame(i);
                }
            }
            self.current_frame = frames;
        }
        if self.current_frame <= frames + 2 {
            self.current_frame += 1;
            return EcmTxStep::Rcp;
        }
        EcmTxStep::Exhausted
    }

    /// Rewind the cursor for a fresh burst
    pub fn start_burst(&mut self) {
        self.current_frame = 0;
        self.frames_this_burst = 0;
    }

    /// Rebuild the missing-frame bitmap from the slots
    ///
    /// Only the announced frame count is scanned; bits beyond it stay
    /// clear. Records the lowest missing frame number.
    pub fn build_missing_map(&mut self) {
        let frames = self.frames.unwrap_or(0);
        self.frame_map = [0; FRAME_MAP_LEN];
        self.first_bad_frame = FRAMES_PER_PARTIAL_PAGE;
        for frame_no in 0..frames {
            if self.slots[frame_no].is_none() {
                self.frame_map[frame_no / 8] |= 1 << (frame_no % 8);
                if frame_no < self.first_bad_frame {
                    self.first_bad_frame = frame_no;
                }
            }
        }
    }

    /// Apply a received PPR bitmap to the transmit slots
    ///
    /// Frames the far end is not complaining about are marked done;
    /// frames with their bit set stay buffered for the next burst.
    pub fn apply_ppr(&mut self, map: &[u8]) {
        let frames = self.frames.unwrap_or(0);
        for (i, &octet) in map.iter().enumerate().take(FRAME_MAP_LEN) {
            if octet == 0 {
                // a run of 8 frames made it through
                self.frame_map[i] = 0;
                for j in 0..8 {
                    self.slots[(i << 3) + j] = None;
                }
            } else {
                for j in 0..8 {
                    let frame_no = (i << 3) + j;
                    if (octet & (1 << j)) == 0 {
                        self.slots[frame_no] = None;
                    } else if frame_no < frames {
                        debug!("frame {} to be resent", frame_no);
                    }
                }
            }
        }
    }

    /// True if every slot inside the announced count holds data
    pub fn is_complete(&self) -> bool {
        let frames = self.frames.unwrap_or(0);
        self.slots[..frames].iter().all(|slot| slot.is_some())
    }
}

impl<E: SessionEnvironment> Session<E> {
    /// Buffer the next partial page from the transmit document
    ///
    /// Returns the number of frames buffered. Resets the PPR burst
    /// counter: a fresh partial page starts a fresh correction budget.
    pub(super) fn fill_partial_page(&mut self) -> usize {
        self.ppr_count = 0;
        let doc = match self.tx_doc.as_mut() {
            Some(doc) => doc,
            None => return 0,
        };
        self.ecm
            .fill_from_document(doc.as_mut(), self.octets_per_ecm_frame)
    }

    /// Feed the received partial page into the page decoder
    pub(super) fn commit_partial_page(&mut self) {
        let frames = self.ecm.frames.unwrap_or(0);
        info!("commiting partial page - {} frames", frames);
        if let Some(doc) = self.rx_doc.as_mut() {
            for i in 0..frames {
                if let Some(slot) = self.ecm.slot(i) {
                    if doc.put_chunk(slot) {
                        // end of the document
                        break;
                    }
                }
            }
        }
        self.ecm.clear_slots();
    }

    /// Send the next FCD or RCP frame of the current burst
    ///
    /// Returns false once the burst is exhausted.
    pub(super) fn send_next_ecm_frame(&mut self) -> bool {
        match self.ecm.advance_tx() {
            EcmTxStep::DataFrame(index) => {
                let mut frame: ArrayVec<u8, MAX_SLOT_LEN> = ArrayVec::new();
                frame
                    .try_extend_from_slice(self.ecm.slot(index).expect("advance_tx checked slot"))
                    .expect("slot fits frame");
                self.send_frame(&frame);
                true
            }
            EcmTxStep::Rcp => {
                // RCP is the odd man out: a simple control frame sent
                // without the final bit and without the DIS-received
                // bit.
                self.send_frame(&[ADDRESS, CONTROL_NON_FINAL, fcf::RCP]);
                // in case a CTC/CTR exchange kicked us back to long
                // training
                self.short_train = true;
                true
            }
            EcmTxStep::Exhausted => false,
        }
    }

    /// Start a burst from the top of the partial page
    pub(super) fn send_first_ecm_frame(&mut self) -> bool {
        self.ecm.start_burst();
        self.send_next_ecm_frame()
    }

    /// Send PPS with the pending post-page command (or NULL mid-page)
    ///
    /// Returns the FCF2 the frame carried, masked of the DIS-received
    /// bit.
    pub(super) fn send_pps_frame(&mut self) -> u8 {
        let fcf2 = if self.ecm.at_page_end {
            self.next_tx_step | self.dis_received_bit()
        } else {
            fcf::NULL
        };
        let burst = self.ecm.frames_this_burst;
        let frame = [
            ADDRESS,
            CONTROL_FINAL,
            fcf::PPS | self.dis_received_bit(),
            fcf2,
            (self.ecm.page & 0xFF) as u8,
            (self.ecm.block & 0xFF) as u8,
            if burst == 0 { 0 } else { (burst - 1) as u8 },
        ];
        info!("sending PPS + {}", frame_name(fcf2));
        self.send_frame(&frame);
        fcf2 & FCF_MASK
    }

    /// Handle a received FCD frame
    pub(super) fn process_rx_fcd(&mut self, msg: &[u8]) {
        match self.state {
            State::FDocEcm => {
                if (4..=4 + 256).contains(&msg.len()) {
                    let frame_no = usize::from(msg[3]);
                    debug!("storing ECM frame {}, length {}", frame_no, msg.len() - 4);
                    self.ecm.store_frame(frame_no, &msg[4..]);
                    // in case a CTC/CTR exchange kicked us back to long
                    // training
                    self.short_train = true;
                } else {
                    self.unexpected_frame_length(msg);
                }
            }
            _ => self.unexpected_non_final_frame(msg),
        }
    }

    /// Handle a received RCP frame
    ///
    /// RCPs may arrive with or without the final bit; the source sends
    /// several, so repeats in the post-document state are ignored.
    pub(super) fn process_rx_rcp(&mut self, msg: &[u8]) {
        match self.state {
            State::FDocEcm => {
                self.set_state(State::FPostDocEcm);
                self.queue_phase(super::phase::Phase::DRx);
            }
            State::FPostDocEcm => {}
            _ => self.unexpected_non_final_frame(msg),
        }
    }

    /// Handle a received PPS frame
    pub(super) fn process_rx_pps(&mut self, msg: &[u8]) {
        if msg.len() < 7 {
            warn!("bad PPS message length {}", msg.len());
            return;
        }
        self.last_pps_fcf2 = msg[3] & FCF_MASK;
        // The frame count field is loosely specified: it might count
        // the block or just the burst on the wire. Believe the first
        // value for a block; afterwards accept only increases, and read
        // 0xFF as a zero that rolled under.
        let announced = usize::from(msg[6]) + 1;
        match self.ecm.frames {
            None => self.ecm.frames = Some(announced),
            Some(running) => {
                let announced = if msg[6] == 0xFF { 0 } else { announced };
                if announced > running {
                    self.ecm.frames = Some(announced);
                }
            }
        }
        info!("received PPS + {}", frame_name(msg[3]));
        self.ecm.build_missing_map();
        match self.last_pps_fcf2 {
            fcf::NULL | fcf::EOP | fcf::EOM | fcf::MPS | fcf::PRI_EOP | fcf::PRI_EOM
            | fcf::PRI_MPS => {
                if self.receiver_not_ready_count > 0 {
                    self.queue_phase(super::phase::Phase::DTx);
                    self.receiver_not_ready_count -= 1;
                    self.set_state(State::FPostRcpRnr);
                    self.send_simple_frame(fcf::RNR);
                } else {
                    self.send_deferred_pps_response();
                }
            }
            _ => self.unexpected_final_frame(msg),
        }
    }

    /// Answer the last PPS now that any not-ready stalling is over
    pub(super) fn send_deferred_pps_response(&mut self) {
        self.queue_phase(super::phase::Phase::DTx);
        if self.ecm.first_bad_frame >= self.ecm.frames.unwrap_or(0) {
            // everything arrived; accept the data and move on
            match self.last_pps_fcf2 {
                fcf::NULL => {
                    self.commit_partial_page();
                }
                _ => {
                    // the whole page is confirmed
                    self.next_rx_step = self.last_pps_fcf2;
                    let fcf2 = self.last_pps_fcf2;
                    self.commit_partial_page();
                    if let Some(doc) = self.rx_doc.as_mut() {
                        doc.end_page();
                    }
                    self.env.on_phase_d(fcf2);
                    self.start_rx_page();
                }
            }
            self.set_state(State::FPostRcpMcf);
            self.send_simple_frame(fcf::MCF);
        } else {
            // ask for the missing and bad frames again
            self.set_state(State::FPostRcpPpr);
            let mut frame: ArrayVec<u8, { 3 + FRAME_MAP_LEN }> = ArrayVec::new();
            frame.push(ADDRESS);
            frame.push(CONTROL_FINAL);
            frame.push(fcf::PPR | self.dis_received_bit());
            frame.try_extend_from_slice(&self.ecm.frame_map).unwrap();
            self.send_frame(&frame);
        }
    }

    /// Handle a received PPR frame (transmit side)
    pub(super) fn process_rx_ppr(&mut self, msg: &[u8]) {
        self.ppr_count += 1;
        if self.ppr_count >= 4 {
            // repeated selective repeat is not converging at this rate;
            // ask to continue correction and start a fresh budget
            self.ppr_count = 0;
            self.set_state(State::IvCtc);
            self.send_simple_frame(fcf::CTC);
            return;
        }
        if msg.len() != 3 + FRAME_MAP_LEN {
            warn!("bad length for PPR bits - {}", msg.len());
            return;
        }
        self.ecm.apply_ppr(&msg[3..]);
        // resend whatever is still marked outstanding
        self.set_state(State::Iv);
        self.queue_phase(super::phase::Phase::CEcmTx);
        self.send_first_ecm_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{TransferStats, XResolution, YResolution};

    /// A page source that produces a fixed number of data octets
    struct CannedPage {
        remaining: usize,
    }

    impl TxDocument for CannedPage {
        fn start_page(&mut self) -> Result<(), crate::document::DocumentError> {
            Ok(())
        }
        fn restart_page(&mut self) {}
        fn end_page(&mut self) {}
        fn more_pages(&self) -> bool {
            false
        }
        fn get_bit(&mut self) -> Option<u8> {
            None
        }
        fn get_chunk(&mut self, buf: &mut [u8]) -> usize {
            let n = usize::min(self.remaining, buf.len());
            for byte in &mut buf[..n] {
                *byte = 0xAA;
            }
            self.remaining -= n;
            n
        }
        fn at_end_of_page(&self) -> bool {
            self.remaining == 0
        }
        fn image_width(&self) -> u32 {
            1728
        }
        fn x_resolution(&self) -> XResolution {
            XResolution::R8
        }
        fn y_resolution(&self) -> YResolution {
            YResolution::Standard
        }
        fn set_min_row_bits(&mut self, _bits: u32) {}
        fn stats(&self) -> TransferStats {
            TransferStats::default()
        }
    }

    #[test]
    fn test_fill_partial_page() {
        let mut buffer = EcmBuffer::new();
        let mut doc = CannedPage { remaining: 256 * 3 + 10 };
        let count = buffer.fill_from_document(&mut doc, 256);
        assert_eq!(4, count);
        assert!(buffer.at_page_end);
        // short last frame padded to full length
        let last = buffer.slot(3).expect("slot 3");
        assert_eq!(4 + 256, last.len());
        assert_eq!(&last[..4], &[0xFF, 0x03, fcf::FCD, 3]);
        assert_eq!(last[4 + 9], 0xAA);
        assert_eq!(last[4 + 10], 0x00);
        assert!(buffer.slot(4).is_none());
    }

    #[test]
    fn test_fill_whole_buffer() {
        let mut buffer = EcmBuffer::new();
        let mut doc = CannedPage { remaining: 256 * 300 };
        assert_eq!(256, buffer.fill_from_document(&mut doc, 256));
        assert!(!buffer.at_page_end);
    }

    #[test]
    fn test_advance_tx_sequence() {
        let mut buffer = EcmBuffer::new();
        let mut doc = CannedPage { remaining: 256 * 2 };
        buffer.fill_from_document(&mut doc, 256);
        buffer.start_burst();

        assert_eq!(EcmTxStep::DataFrame(0), buffer.advance_tx());
        assert_eq!(EcmTxStep::DataFrame(1), buffer.advance_tx());
        assert_eq!(EcmTxStep::Rcp, buffer.advance_tx());
        assert_eq!(EcmTxStep::Rcp, buffer.advance_tx());
        assert_eq!(EcmTxStep::Rcp, buffer.advance_tx());
        assert_eq!(EcmTxStep::Exhausted, buffer.advance_tx());
        assert_eq!(2, buffer.frames_this_burst);
    }

    #[test]
    fn test_advance_tx_skips_confirmed() {
        let mut buffer = EcmBuffer::new();
        let mut doc = CannedPage { remaining: 256 * 4 };
        buffer.fill_from_document(&mut doc, 256);

        // the far end confirmed everything except frames 1 and 3
        let mut map = [0u8; FRAME_MAP_LEN];
        map[0] = (1 << 1) | (1 << 3);
        buffer.apply_ppr(&map);

        buffer.start_burst();
        assert_eq!(EcmTxStep::DataFrame(1), buffer.advance_tx());
        assert_eq!(EcmTxStep::DataFrame(3), buffer.advance_tx());
        assert_eq!(EcmTxStep::Rcp, buffer.advance_tx());
    }

    #[test]
    fn test_missing_map() {
        let mut buffer = EcmBuffer::new();
        buffer.frames = Some(128);
        for i in 0..128 {
            if i != 3 && i != 17 && i != 98 {
                buffer.store_frame(i, &[0u8; 64]);
            }
        }
        buffer.build_missing_map();
        assert_eq!(3, buffer.first_bad_frame);
        let mut expected = [0u8; FRAME_MAP_LEN];
        expected[0] = 1 << 3;
        expected[2] = 1 << 1; // frame 17
        expected[12] = 1 << 2; // frame 98
        assert_eq!(expected, buffer.frame_map);
        assert!(!buffer.is_complete());
    }

    #[test]
    fn test_missing_map_complete() {
        let mut buffer = EcmBuffer::new();
        buffer.frames = Some(16);
        for i in 0..16 {
            buffer.store_frame(i, &[0u8; 64]);
        }
        buffer.build_missing_map();
        assert_eq!([0u8; FRAME_MAP_LEN], buffer.frame_map);
        assert_eq!(FRAMES_PER_PARTIAL_PAGE, buffer.first_bad_frame);
        assert!(buffer.is_complete());
    }
}
