//! Scripted full-session exchanges
//!
//! These tests play the far terminal by hand: they feed the session the
//! frames a real peer would send and check the frames, modem
//! selections, and phase milestones that come back.

use std::println as debug;

use crate::capabilities::{bit, CapabilityFrame};
use crate::document::{
    DocumentError, Encoding, PageSetup, RxDocument, TransferStats, TxDocument, XResolution,
    YResolution,
};
use crate::frames::{fcf, ADDRESS, CONTROL_FINAL, CONTROL_NON_FINAL};
use crate::modem::{CarrierEvent, FrontEndStatus, ModemType};
use crate::status::Status;
use crate::timers::{ms_to_samples, TIMER_T4_MS};

use super::phase::Phase;
use super::states::State;
use super::{Session, SessionEnvironment};

/// Environment double that records everything the session does
pub(crate) struct Recorder {
    /// Frames handed to the transport; `None` is the flush terminator
    pub frames: Vec<Option<Vec<u8>>>,
    pub rx_modems: Vec<(ModemType, bool, bool)>,
    pub tx_modems: Vec<(ModemType, bool, bool)>,
    pub phase_b: Vec<u8>,
    pub phase_d: Vec<u8>,
    pub phase_e: Option<Status>,
    pub more_documents: bool,
    /// Handed out once by `open_tx_document`
    pub tx_doc: Option<Box<dyn TxDocument>>,
    /// Handed out once by `open_rx_document`
    pub rx_doc: Option<Box<dyn RxDocument>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            rx_modems: Vec::new(),
            tx_modems: Vec::new(),
            phase_b: Vec::new(),
            phase_d: Vec::new(),
            phase_e: None,
            more_documents: false,
            tx_doc: None,
            rx_doc: None,
        }
    }

    /// FCFs of the frames sent so far, terminators skipped
    pub fn sent_fcfs(&self) -> Vec<u8> {
        self.frames
            .iter()
            .flatten()
            .map(|frame| frame[2])
            .collect()
    }

    /// The last real frame sent
    pub fn last_frame(&self) -> &[u8] {
        self.frames
            .iter()
            .flatten()
            .last()
            .expect("no frames sent")
    }
}

impl SessionEnvironment for Recorder {
    fn send_hdlc(&mut self, frame: Option<&[u8]>) {
        debug!("recorder: send {:02X?}", frame);
        self.frames.push(frame.map(<[u8]>::to_vec));
    }

    fn set_rx_modem(&mut self, modem: ModemType, short_train: bool, hdlc: bool) {
        self.rx_modems.push((modem, short_train, hdlc));
    }

    fn set_tx_modem(&mut self, modem: ModemType, short_train: bool, hdlc: bool) {
        self.tx_modems.push((modem, short_train, hdlc));
    }

    fn on_phase_b(&mut self, fcf: u8) {
        self.phase_b.push(fcf);
    }

    fn on_phase_d(&mut self, fcf: u8) {
        self.phase_d.push(fcf);
    }

    fn on_phase_e(&mut self, status: Status) {
        self.phase_e = Some(status);
    }

    fn more_documents(&mut self) -> bool {
        self.more_documents
    }

    fn open_tx_document(
        &mut self,
        _file: &str,
        _start_page: Option<u32>,
        _stop_page: Option<u32>,
    ) -> Result<Box<dyn TxDocument>, DocumentError> {
        self.tx_doc.take().ok_or(DocumentError::Open)
    }

    fn open_rx_document(
        &mut self,
        _file: &str,
        _encoding: Encoding,
        _stop_page: Option<u32>,
    ) -> Result<Box<dyn RxDocument>, DocumentError> {
        self.rx_doc.take().ok_or(DocumentError::Open)
    }
}

/// Transmit document stub producing fixed-size pages of 0xAA octets
pub(crate) struct CannedTxDocument {
    pages: u32,
    page_octets: usize,
    started: u32,
    octets_left: usize,
    bits_left: usize,
}

impl CannedTxDocument {
    pub fn new(pages: u32, page_octets: usize) -> Self {
        Self {
            pages,
            page_octets,
            started: 0,
            octets_left: 0,
            bits_left: 0,
        }
    }

    pub fn page_of(page_octets: usize) -> Box<dyn TxDocument> {
        Box::new(Self::new(1, page_octets))
    }
}

impl TxDocument for CannedTxDocument {
    fn start_page(&mut self) -> Result<(), DocumentError> {
        if self.started >= self.pages {
            return Err(DocumentError::NoPage);
        }
        self.started += 1;
        self.octets_left = self.page_octets;
        self.bits_left = self.page_octets * 8;
        Ok(())
    }

    fn restart_page(&mut self) {
        self.octets_left = self.page_octets;
        self.bits_left = self.page_octets * 8;
    }

    fn end_page(&mut self) {}

    fn more_pages(&self) -> bool {
        self.started < self.pages
    }

    fn get_bit(&mut self) -> Option<u8> {
        if self.bits_left == 0 {
            return None;
        }
        self.bits_left -= 1;
        Some(0)
    }

    fn get_chunk(&mut self, buf: &mut [u8]) -> usize {
        let n = usize::min(self.octets_left, buf.len());
        for byte in &mut buf[..n] {
            *byte = 0xAA;
        }
        self.octets_left -= n;
        n
    }

    fn at_end_of_page(&self) -> bool {
        self.octets_left == 0
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
        TransferStats {
            pages_transferred: self.started,
            pages_in_file: self.pages,
            width: 1728,
            ..TransferStats::default()
        }
    }
}

/// Receive document stub that counts what it is fed
pub(crate) struct CannedRxDocument {
    pub bits: usize,
    pub chunk_octets: usize,
    pub pages_ended: u32,
    /// Report end-of-page after this many bits
    pub end_after_bits: Option<usize>,
    pub bad_rows: u32,
    pub rows: u32,
}

impl CannedRxDocument {
    pub fn new() -> Self {
        Self {
            bits: 0,
            chunk_octets: 0,
            pages_ended: 0,
            end_after_bits: None,
            bad_rows: 0,
            rows: 1500,
        }
    }

    pub fn boxed() -> Box<dyn RxDocument> {
        Box::new(Self::new())
    }
}

impl RxDocument for CannedRxDocument {
    fn configure_page(&mut self, _setup: &PageSetup) {}

    fn start_page(&mut self) {
        self.bits = 0;
    }

    fn put_bit(&mut self, _bit: u8) -> bool {
        self.bits += 1;
        self.end_after_bits
            .map(|limit| self.bits >= limit)
            .unwrap_or(false)
    }

    fn put_chunk(&mut self, buf: &[u8]) -> bool {
        self.chunk_octets += buf.len();
        false
    }

    fn end_page(&mut self) {
        self.pages_ended += 1;
    }

    fn stats(&self) -> TransferStats {
        TransferStats {
            pages_transferred: self.pages_ended,
            width: 1728,
            length: self.rows,
            bad_rows: self.bad_rows,
            ..TransferStats::default()
        }
    }
}

/// A plausible answerer DIS: ready to receive, V.29 + V.27ter, fine
/// resolution, 2-D coding, 255 mm width
fn answerer_dis(extra_bits: &[u16]) -> Vec<u8> {
    let mut frame = CapabilityFrame::new(fcf::DIS);
    for &n in [
        bit::READY_TO_RECEIVE,
        bit::V29,
        bit::V27TER,
        bit::FINE_RESOLUTION,
        bit::TWO_D_CODING,
        bit::WIDTH_255MM,
    ]
    .iter()
    .chain(extra_bits)
    {
        frame.set_bit(n);
    }
    frame.set_bits(7, bit::MIN_SCAN_TIME);
    frame.prune();
    frame.as_slice().to_vec()
}

fn simple_final(fcf_value: u8) -> [u8; 3] {
    [ADDRESS, CONTROL_FINAL, fcf_value]
}

/// Walk a caller session from DIS receipt to the end of the TCF
fn run_caller_to_post_tcf(session: &mut Session<Recorder>, dis: &[u8]) {
    // CNG is playing; the answerer's preamble flags arrive
    session.hdlc_signal(CarrierEvent::CarrierUp);
    session.hdlc_signal(CarrierEvent::FramingOk);
    assert_eq!(Phase::BRx, session.phase);

    session.hdlc_frame(dis, true);
    assert_eq!(State::D, session.state);
    // the V.21 carrier drops; the queued transmit phase latches
    session.hdlc_signal(CarrierEvent::CarrierDown);
    assert_eq!(Phase::BTx, session.phase);

    // the DCS sequence goes out one frame per completion, then the TCF
    for _ in 0..6 {
        if session.state != State::D {
            break;
        }
        session.front_end_status(FrontEndStatus::SendComplete);
    }
    assert_eq!(State::DTcf, session.state);
    assert_eq!(Phase::CNonEcmTx, session.phase);

    // drain the training bits so the schedule can finish
    while session.non_ecm_get_bit().is_some() {}
    session.front_end_status(FrontEndStatus::SendComplete);
    assert_eq!(State::DPostTcf, session.state);
    assert_eq!(Phase::BRx, session.phase);
}

/// Finish a caller session: DCN exchange and phase E
fn run_caller_to_finish(session: &mut Session<Recorder>) {
    assert_eq!(State::C, session.state);
    session.front_end_status(FrontEndStatus::SendComplete);
    session.front_end_status(FrontEndStatus::SendComplete);
    assert_eq!(Phase::E, session.phase);
    session.front_end_status(FrontEndStatus::SendComplete);
    assert_eq!(Phase::CallFinished, session.phase);
}

#[test]
fn test_full_handshake_send_non_ecm() {
    // scenario: one page, non-ECM, V.29 9600
    let mut env = Recorder::new();
    env.tx_doc = Some(CannedTxDocument::page_of(4000));
    let mut session = Session::new(true, env);
    session.set_local_ident("+1 212 555 0100").unwrap();
    session.set_tx_file("page.tif", None, None);

    // caller starts with CNG playing and V.21 listening
    assert_eq!(
        &[(ModemType::V21, false, true)][..],
        &session.env.rx_modems[..]
    );
    assert_eq!(
        &[(ModemType::Cng, false, false)][..],
        &session.env.tx_modems[..]
    );

    run_caller_to_post_tcf(&mut session, &answerer_dis(&[]));

    // the DCS must have selected V.29 9600
    let fcfs = session.env.sent_fcfs();
    let dcs = session
        .env
        .frames
        .iter()
        .flatten()
        .find(|frame| frame[2] == fcf::DCS | 0x01)
        .expect("no DCS sent");
    assert_eq!(0x04, dcs[4] & 0x3C);
    assert!(fcfs.contains(&(fcf::TSI | 0x01)));

    // answerer confirms training; the page goes out
    session.hdlc_frame(&simple_final(fcf::CFR | 0x01), true);
    assert_eq!(State::I, session.state);
    assert_eq!(Phase::CNonEcmTx, session.phase);
    while session.non_ecm_get_bit().is_some() {}

    // page sent; EOP goes out and MCF comes back
    session.front_end_status(FrontEndStatus::SendComplete);
    assert_eq!(State::IIQ, session.state);
    assert_eq!(
        fcf::EOP | 0x01,
        session.env.last_frame()[2],
        "expected EOP"
    );
    session.front_end_status(FrontEndStatus::SendComplete);
    session.front_end_status(FrontEndStatus::SendComplete);
    session.hdlc_frame(&simple_final(fcf::MCF | 0x01), true);

    // DCN, then phase E reports a clean call
    assert!(session.env.sent_fcfs().contains(&(fcf::DCN | 0x01)));
    run_caller_to_finish(&mut session);
    assert_eq!(Some(Status::Ok), session.env.phase_e);
}

#[test]
fn test_failed_training_steps_fallback() {
    // scenario: FTT steps the ladder from V.29 9600 to V.29 7200
    let mut env = Recorder::new();
    env.tx_doc = Some(CannedTxDocument::page_of(4000));
    let mut session = Session::new(true, env);
    session.set_tx_file("page.tif", None, None);

    run_caller_to_post_tcf(&mut session, &answerer_dis(&[]));
    session.env.frames.clear();

    // the answerer could not train; we must fall back and resend DCS
    session.hdlc_frame(&simple_final(fcf::FTT | 0x01), true);
    assert_eq!(State::D, session.state);
    let dcs = session.env.last_frame().to_vec();
    assert_eq!(fcf::DCS | 0x01, dcs[2]);
    assert_eq!(0x0C, dcs[4] & 0x3C, "expected the V.29 7200 rate code");

    // second training attempt succeeds this time
    session.front_end_status(FrontEndStatus::SendComplete);
    session.front_end_status(FrontEndStatus::SendComplete);
    while session.non_ecm_get_bit().is_some() {}
    session.front_end_status(FrontEndStatus::SendComplete);
    session.hdlc_frame(&simple_final(fcf::CFR | 0x01), true);
    assert_eq!(State::I, session.state);
    assert_eq!(Status::Ok, session.current_status());
}

#[test]
fn test_fallback_exhaustion_cannot_train() {
    let mut env = Recorder::new();
    env.tx_doc = Some(CannedTxDocument::page_of(4000));
    let mut session = Session::new(true, env);
    session.set_tx_file("page.tif", None, None);

    run_caller_to_post_tcf(&mut session, &answerer_dis(&[]));

    // V.29 9600 -> V.29 7200 -> V.27ter 4800 -> V.27ter 2400 -> give up
    for _ in 0..3 {
        session.hdlc_frame(&simple_final(fcf::FTT | 0x01), true);
        assert_eq!(State::D, session.state);
        session.front_end_status(FrontEndStatus::SendComplete);
        session.front_end_status(FrontEndStatus::SendComplete);
        while session.non_ecm_get_bit().is_some() {}
        session.front_end_status(FrontEndStatus::SendComplete);
    }
    session.hdlc_frame(&simple_final(fcf::FTT | 0x01), true);
    assert_eq!(Status::CannotTrain, session.current_status());
    assert_eq!(fcf::DCN | 0x01, session.env.last_frame()[2]);
}

#[test]
fn test_ecm_selective_repeat() {
    // scenario: 128-frame ECM page; frames 3, 17 and 98 go missing
    let mut env = Recorder::new();
    env.tx_doc = Some(CannedTxDocument::page_of(128 * 256));
    let mut session = Session::new(true, env);
    session.set_tx_file("page.tif", None, None);
    session.set_ecm_capability(true);

    run_caller_to_post_tcf(&mut session, &answerer_dis(&[bit::ECM]));
    assert!(session.error_correcting_mode);

    session.env.frames.clear();
    session.hdlc_frame(&simple_final(fcf::CFR | 0x01), true);
    assert_eq!(State::Iv, session.state);

    // step the transmit schedule until the burst is flushed
    while session.state == State::Iv && session.step == 0 {
        session.front_end_status(FrontEndStatus::SendStepComplete);
    }
    // 128 FCD frames, then three RCPs
    let fcds: Vec<&Vec<u8>> = session
        .env
        .frames
        .iter()
        .flatten()
        .filter(|frame| frame[2] == fcf::FCD)
        .collect();
    assert_eq!(128, fcds.len());
    assert_eq!(
        3,
        session
            .env
            .sent_fcfs()
            .iter()
            .filter(|&&fcf_value| fcf_value == fcf::RCP)
            .count()
    );

    // PPS follows the terminator
    session.front_end_status(FrontEndStatus::SendComplete);
    assert_eq!(State::IvPpsQ, session.state);
    let pps = session.env.last_frame().to_vec();
    assert_eq!(fcf::PPS | 0x01, pps[2]);
    assert_eq!(fcf::EOP | 0x01, pps[3]);
    assert_eq!(127, pps[6]);

    // the far end missed frames 3, 17 and 98
    let mut ppr = vec![ADDRESS, CONTROL_FINAL, fcf::PPR | 0x01];
    let mut map = [0u8; 32];
    map[0] = 1 << 3;
    map[2] = 1 << 1;
    map[12] = 1 << 2;
    ppr.extend_from_slice(&map);
    session.env.frames.clear();
    session.hdlc_frame(&ppr, true);
    assert_eq!(State::Iv, session.state);

    while session.state == State::Iv && session.step == 0 {
        session.front_end_status(FrontEndStatus::SendStepComplete);
    }
    let resent: Vec<u8> = session
        .env
        .frames
        .iter()
        .flatten()
        .filter(|frame| frame[2] == fcf::FCD)
        .map(|frame| frame[3])
        .collect();
    assert_eq!(vec![3, 17, 98], resent);

    // and the PPS again, answered with MCF this time
    session.front_end_status(FrontEndStatus::SendComplete);
    session.hdlc_frame(&simple_final(fcf::MCF | 0x01), true);
    assert!(session.env.sent_fcfs().contains(&(fcf::DCN | 0x01)));
    run_caller_to_finish(&mut session);
    assert_eq!(Some(Status::Ok), session.env.phase_e);
}

#[test]
fn test_rnr_arms_t5_and_mcf_clears_it() {
    let mut env = Recorder::new();
    env.tx_doc = Some(CannedTxDocument::page_of(2 * 256));
    let mut session = Session::new(true, env);
    session.set_tx_file("page.tif", None, None);
    session.set_ecm_capability(true);

    run_caller_to_post_tcf(&mut session, &answerer_dis(&[bit::ECM]));
    session.hdlc_frame(&simple_final(fcf::CFR | 0x01), true);
    while session.state == State::Iv && session.step == 0 {
        session.front_end_status(FrontEndStatus::SendStepComplete);
    }
    session.front_end_status(FrontEndStatus::SendComplete);
    assert_eq!(State::IvPpsQ, session.state);

    // receiver is busy: RNR arms T5 and we poll with RR
    session.hdlc_frame(&simple_final(fcf::RNR | 0x01), true);
    assert_eq!(State::IvPpsRnr, session.state);
    assert!(session.timers.t5_running());
    assert_eq!(fcf::RR | 0x01, session.env.last_frame()[2]);

    // a second RNR must not restart T5
    session.hdlc_frame(&simple_final(fcf::RNR | 0x01), true);
    assert!(session.timers.t5_running());

    // the busy condition clears
    session.hdlc_frame(&simple_final(fcf::MCF | 0x01), true);
    assert!(!session.timers.t5_running());
}

#[test]
fn test_t4_retry_until_dead() {
    // scenario: no response to DCS/TCF, three retries, then PhBDeadTx
    let mut env = Recorder::new();
    env.tx_doc = Some(CannedTxDocument::page_of(4000));
    let mut session = Session::new(true, env);
    session.set_tx_file("page.tif", None, None);

    run_caller_to_post_tcf(&mut session, &answerer_dis(&[]));

    for round in 0..3 {
        // T4 fires with no response: the DCS sequence is repeated
        session.timer_tick(ms_to_samples(TIMER_T4_MS));
        assert_eq!(State::D, session.state, "round {}", round);
        // ... and the whole training exchange runs again
        session.front_end_status(FrontEndStatus::SendComplete);
        session.front_end_status(FrontEndStatus::SendComplete);
        while session.non_ecm_get_bit().is_some() {}
        session.front_end_status(FrontEndStatus::SendComplete);
        assert_eq!(State::DPostTcf, session.state);
    }
    let dcs_count = session
        .env
        .sent_fcfs()
        .iter()
        .filter(|&&fcf_value| fcf_value == fcf::DCS | 0x01)
        .count();
    assert_eq!(4, dcs_count);

    // the retry budget is spent
    session.timer_tick(ms_to_samples(TIMER_T4_MS));
    assert_eq!(Status::PhBDeadTx, session.current_status());
    assert_eq!(fcf::DCN | 0x01, session.env.last_frame()[2]);
}

/// Walk an answerer session through CED, DIS, DCS and a good TCF
fn run_answerer_to_doc(session: &mut Session<Recorder>, ecm: bool) {
    assert_eq!(State::Answering, session.state);
    // CED finished playing
    session.front_end_status(FrontEndStatus::SendComplete);
    assert_eq!(State::R, session.state);
    assert_eq!(Phase::BTx, session.phase);
    // DIS, terminator, then listen
    session.front_end_status(FrontEndStatus::SendComplete);
    session.front_end_status(FrontEndStatus::SendComplete);
    session.front_end_status(FrontEndStatus::SendComplete);
    assert_eq!(Phase::BRx, session.phase);

    // the caller commands us with a DCS
    let mut dcs = CapabilityFrame::new(fcf::DCS | 0x01);
    dcs.set_rate_code(0x04);
    dcs.set_bit(bit::READY_TO_RECEIVE);
    dcs.set_bit(bit::FRAME_SIZE);
    if ecm {
        dcs.set_bit(bit::ECM);
    }
    dcs.prune();
    session.hdlc_frame(dcs.as_slice(), true);
    assert_eq!(State::FTcf, session.state);
    assert_eq!(Phase::CNonEcmRx, session.phase);

    // a clean TCF: train, a run of zeros, carrier drop
    session.non_ecm_signal(CarrierEvent::TrainingSucceeded);
    session.non_ecm_chunk(&[0u8; 1250]);
    session.non_ecm_signal(CarrierEvent::CarrierDown);
    assert_eq!(State::FCfr, session.state);
    // the answerer never received a DIS, so its FCFs carry no
    // DIS-received bit
    assert_eq!(fcf::CFR, session.env.last_frame()[2], "expected CFR");
    // CFR terminator, then the document phase
    session.front_end_status(FrontEndStatus::SendComplete);
    session.front_end_status(FrontEndStatus::SendComplete);
}

#[test]
fn test_receiver_not_ready_stalls_twice() {
    // scenario: receiver_not_ready_count = 2 stalls the PPS twice
    let mut env = Recorder::new();
    env.rx_doc = Some(CannedRxDocument::boxed());
    let mut session = Session::new(false, env);
    session.set_rx_file("out.tif", None);
    session.set_ecm_capability(true);
    session.set_receiver_not_ready(2);

    run_answerer_to_doc(&mut session, true);
    assert_eq!(State::FDocEcm, session.state);
    assert_eq!(Phase::CEcmRx, session.phase);

    // eight FCD frames arrive intact
    for seq in 0u8..8 {
        let mut fcd = vec![ADDRESS, CONTROL_NON_FINAL, fcf::FCD, seq];
        fcd.extend_from_slice(&[0x55; 64]);
        session.hdlc_frame(&fcd, true);
    }
    session.env.frames.clear();

    // PPS-EOP: we are "not ready", twice
    let pps = [
        ADDRESS,
        CONTROL_FINAL,
        fcf::PPS | 0x01,
        fcf::EOP | 0x01,
        0,
        0,
        7,
    ];
    session.hdlc_frame(&pps, true);
    assert_eq!(State::FPostRcpRnr, session.state);
    assert_eq!(fcf::RNR, session.env.last_frame()[2]);

    session.hdlc_frame(&simple_final(fcf::RR | 0x01), true);
    assert_eq!(fcf::RNR, session.env.last_frame()[2]);

    // the third poll gets the real answer: everything arrived, so MCF
    session.hdlc_frame(&simple_final(fcf::RR | 0x01), true);
    assert_eq!(State::FPostRcpMcf, session.state);
    assert_eq!(fcf::MCF, session.env.last_frame()[2]);
    assert_eq!(&[fcf::EOP][..], &session.env.phase_d[..]);
}

#[test]
fn test_ecm_receive_with_ppr() {
    let mut env = Recorder::new();
    env.rx_doc = Some(CannedRxDocument::boxed());
    let mut session = Session::new(false, env);
    session.set_rx_file("out.tif", None);
    session.set_ecm_capability(true);

    run_answerer_to_doc(&mut session, true);

    // frames 0..8 arrive, but 3 is missing
    for seq in (0u8..8).filter(|&seq| seq != 3) {
        let mut fcd = vec![ADDRESS, CONTROL_NON_FINAL, fcf::FCD, seq];
        fcd.extend_from_slice(&[0x55; 64]);
        session.hdlc_frame(&fcd, true);
    }
    session.env.frames.clear();
    let pps = [
        ADDRESS,
        CONTROL_FINAL,
        fcf::PPS | 0x01,
        fcf::EOP | 0x01,
        0,
        0,
        7,
    ];
    session.hdlc_frame(&pps, true);
    assert_eq!(State::FPostRcpPpr, session.state);
    let ppr = session.env.last_frame().to_vec();
    assert_eq!(fcf::PPR, ppr[2]);
    assert_eq!(3 + 32, ppr.len());
    assert_eq!(1 << 3, ppr[3], "only frame 3 may be marked missing");
    assert!(ppr[4..].iter().all(|&octet| octet == 0));

    // the PPR terminator flushes; we return to the document phase
    session.front_end_status(FrontEndStatus::SendComplete);
    session.front_end_status(FrontEndStatus::SendComplete);
    assert_eq!(State::FDocEcm, session.state);

    // the missing frame arrives, and the PPS is repeated
    let mut fcd = vec![ADDRESS, CONTROL_NON_FINAL, fcf::FCD, 3];
    fcd.extend_from_slice(&[0x55; 64]);
    session.hdlc_frame(&fcd, true);
    session.env.frames.clear();
    session.hdlc_frame(&pps, true);
    assert_eq!(State::FPostRcpMcf, session.state);
    assert_eq!(fcf::MCF, session.env.last_frame()[2]);
}

#[test]
fn test_mid_call_dcn_reports_dcn_fax_rx() {
    // scenario: DCN while waiting for the post-page command
    let mut env = Recorder::new();
    let mut rx_doc = CannedRxDocument::new();
    rx_doc.end_after_bits = Some(1000);
    env.rx_doc = Some(Box::new(rx_doc));
    let mut session = Session::new(false, env);
    session.set_rx_file("out.tif", None);

    run_answerer_to_doc(&mut session, false);
    assert_eq!(State::FDocNonEcm, session.state);

    // the page streams in and ends
    session.non_ecm_signal(CarrierEvent::TrainingSucceeded);
    for _ in 0..1000 {
        session.non_ecm_bit(0);
    }
    assert_eq!(State::FPostDocNonEcm, session.state);
    session.non_ecm_signal(CarrierEvent::CarrierDown);
    assert_eq!(Phase::DRx, session.phase);

    // instead of MPS/EOP, the far end hangs up
    session.hdlc_frame(&simple_final(fcf::DCN | 0x01), true);
    assert_eq!(Status::DcnFaxRx, session.current_status());
    assert_eq!(Phase::E, session.phase);
    session.front_end_status(FrontEndStatus::SendComplete);
    assert_eq!(Some(Status::DcnFaxRx), session.env.phase_e);
}

#[test]
fn test_non_ecm_receive_page_quality() {
    // a page with too many bad rows draws RTN
    let mut env = Recorder::new();
    let mut rx_doc = CannedRxDocument::new();
    rx_doc.end_after_bits = Some(100);
    rx_doc.bad_rows = 500;
    rx_doc.rows = 1500;
    env.rx_doc = Some(Box::new(rx_doc));
    let mut session = Session::new(false, env);
    session.set_rx_file("out.tif", None);

    run_answerer_to_doc(&mut session, false);
    session.non_ecm_signal(CarrierEvent::TrainingSucceeded);
    for _ in 0..100 {
        session.non_ecm_bit(0);
    }
    session.non_ecm_signal(CarrierEvent::CarrierDown);

    session.env.frames.clear();
    session.hdlc_frame(&simple_final(fcf::EOP | 0x01), true);
    assert_eq!(State::IIIQRtn, session.state);
    assert_eq!(fcf::RTN, session.env.last_frame()[2]);
}

#[test]
fn test_queued_phase_waits_for_carrier_drop() {
    // a phase queued while the receive signal is up must latch only
    // when the carrier drops
    let mut env = Recorder::new();
    env.rx_doc = Some(CannedRxDocument::boxed());
    let mut session = Session::new(false, env);
    session.set_rx_file("out.tif", None);
    session.set_ecm_capability(true);

    run_answerer_to_doc(&mut session, true);
    session.hdlc_signal(CarrierEvent::CarrierUp);

    let mut fcd = vec![ADDRESS, CONTROL_NON_FINAL, fcf::FCD, 0];
    fcd.extend_from_slice(&[0x55; 64]);
    session.hdlc_frame(&fcd, true);
    let pps = [
        ADDRESS,
        CONTROL_FINAL,
        fcf::PPS | 0x01,
        fcf::EOP | 0x01,
        0,
        0,
        0,
    ];
    session.hdlc_frame(&pps, true);
    // the response is decided, but the phase change is parked
    assert_eq!(State::FPostRcpMcf, session.state);
    assert_eq!(Phase::CEcmRx, session.phase);
    assert!(session.next_phase.is_some());

    session.hdlc_signal(CarrierEvent::CarrierDown);
    assert_eq!(Phase::DTx, session.phase);
    assert_eq!(None, session.next_phase);
}

#[test]
fn test_terminate_mid_call() {
    let mut session = Session::new(true, Recorder::new());
    session.hdlc_signal(CarrierEvent::FramingOk);
    session.terminate();
    assert_eq!(Some(Status::CallDropped), session.env.phase_e);
    assert_eq!(Phase::CallFinished, session.phase);
    // a second terminate is a no-op
    session.terminate();
}

#[test]
fn test_t0_expiry_ends_idle_call() {
    let mut session = Session::new(true, Recorder::new());
    session.timer_tick(ms_to_samples(60_000));
    assert_eq!(Status::T0Expired, session.current_status());
    assert_eq!(Phase::E, session.phase);
}

#[test]
fn test_crp_elicited_by_bad_crc() {
    let mut env = Recorder::new();
    env.tx_doc = Some(CannedTxDocument::page_of(4000));
    let mut session = Session::new(true, env);
    session.set_tx_file("page.tif", None, None);
    session.set_crp_enabled(true);

    run_caller_to_post_tcf(&mut session, &answerer_dis(&[]));
    session.env.frames.clear();

    // a corrupt frame draws CRP...
    session.hdlc_frame(&simple_final(fcf::CFR | 0x01), false);
    assert_eq!(fcf::CRP | 0x01, session.env.last_frame()[2]);
    // ...and CRP from the far end replays our DCS sequence
    session.env.frames.clear();
    session.hdlc_frame(&simple_final(fcf::CRP | 0x01), true);
    assert_eq!(fcf::DCS | 0x01, session.env.last_frame()[2]);
}

#[test]
fn test_unexpected_final_frame_draws_dcn() {
    let mut session = Session::new(true, Recorder::new());
    session.hdlc_signal(CarrierEvent::FramingOk);
    // an MCF while waiting for DIS makes no sense
    session.hdlc_frame(&simple_final(fcf::MCF), true);
    assert_eq!(Status::NoDisTx, session.current_status());
    assert!(session.env.sent_fcfs().contains(&fcf::DCN));
}

#[test]
fn test_non_final_idents_are_recorded() {
    let mut session = Session::new(true, Recorder::new());
    session.hdlc_signal(CarrierEvent::FramingOk);

    // CSI ahead of the DIS
    let mut csi = vec![ADDRESS, CONTROL_NON_FINAL, fcf::CSI];
    for byte in "0010 555 212 1+".bytes() {
        csi.push(byte);
    }
    while csi.len() < 23 {
        csi.push(b' ');
    }
    session.hdlc_frame(&csi, true);
    assert_eq!("+1 212 555 0100", session.far_ident());

    // NSF is retained raw
    let nsf = [ADDRESS, CONTROL_NON_FINAL, fcf::NSF, 0x00, 0x00, 0x0E];
    session.hdlc_frame(&nsf, true);
    assert_eq!(&[0x00, 0x00, 0x0E][..], session.far_nsf());
}

#[test]
fn test_t1_expiry_for_caller() {
    let mut session = Session::new(true, Recorder::new());
    // far end detected: the shared timer now means T1
    session.hdlc_signal(CarrierEvent::FramingOk);
    session.timer_tick(ms_to_samples(35_000));
    assert_eq!(Status::T1Expired, session.current_status());
    assert_eq!(Phase::E, session.phase);
}

#[test]
fn test_stats_snapshot() {
    let mut env = Recorder::new();
    env.tx_doc = Some(CannedTxDocument::page_of(4000));
    let mut session = Session::new(true, env);
    session.set_tx_file("page.tif", None, None);

    run_caller_to_post_tcf(&mut session, &answerer_dis(&[]));
    let stats = session.stats();
    assert_eq!(9600, stats.bit_rate);
    assert!(!stats.error_correcting_mode);
    assert_eq!(Status::Ok, stats.current_status);
}
