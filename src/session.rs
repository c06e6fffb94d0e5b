//! The T.30 session facade
//!
//! A [`Session`] is a passive object driven by the front end: sample
//! ticks feed the timers, decoded HDLC frames and non-ECM image bits
//! feed the protocol, and completion notices step the transmit
//! schedule. The session answers through the environment: frames to
//! send, modem selections, and phase notifications.

pub mod phase;

mod ecm;
mod negotiate;
mod states;

#[cfg(test)]
mod tests;

use arrayvec::ArrayVec;

#[cfg(not(test))]
use log::{debug, info, warn};

#[cfg(test)]
use std::{println as debug, println as info, println as warn};

use thiserror::Error;

use crate::capabilities::CapabilityFrame;
use crate::document::{
    DocumentError, Encoding, PageSetup, RxDocument, TxDocument, XResolution, YResolution,
};
use crate::fallback::{ModemSupport, FALLBACK_SEQUENCE};
use crate::frames::{fcf, frame_name, is_final, ADDRESS, CONTROL_FINAL, CONTROL_NON_FINAL};
use crate::ident::{encode_ident_frame, MAX_IDENT_LEN};
use crate::modem::{CarrierEvent, FrontEndStatus};
use crate::status::Status;
use crate::timers::{TimerEvent, Timers};

use self::ecm::EcmBuffer;
use self::phase::Phase;
use self::states::State;

/// How many times a command is repeated before giving up
pub(crate) const MAX_MESSAGE_TRIES: u32 = 3;

/// Longest non-standard-facilities payload we will carry
pub const MAX_LOCAL_NSF_LEN: usize = 100;

/// Longest page header string
const MAX_HEADER_INFO_LEN: usize = 50;

macro_rules! option_set {
    ($(#[$outer:meta])* $name:ident($repr:ty) { $($(#[$inner:meta])* $flag:ident = $value:expr;)* }) => {
        $(#[$outer])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
        pub struct $name($repr);

        impl $name {
            /// The empty set
            pub const NONE: $name = $name(0);
            $($(#[$inner])* pub const $flag: $name = $name($value);)*

            /// True if every member of `other` is in `self`
            #[inline]
            pub fn contains(&self, other: $name) -> bool {
                (self.0 & other.0) == other.0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;

            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

option_set! {
    /// Line encodings the terminal can produce or accept
    Compressions(u8) {
        /// Uncompressed mode
        UNCOMPRESSED = 0x01;
        /// T.4 one-dimensional (MH)
        T4_1D = 0x02;
        /// T.4 two-dimensional (MR)
        T4_2D = 0x04;
        /// T.6 (MMR)
        T6 = 0x08;
        /// T.85 monochrome JBIG
        T85 = 0x10;
        /// T.43 colour JBIG
        T43 = 0x20;
        /// T.45 run-length colour
        T45 = 0x40;
    }
}

option_set! {
    /// Resolutions the terminal can produce or accept
    Resolutions(u32) {
        /// 3.85 lines/mm
        STANDARD = 0x01;
        /// 7.7 lines/mm
        FINE = 0x02;
        /// 15.4 lines/mm
        SUPERFINE = 0x04;
        /// R8 horizontal
        R8 = 0x10000;
        /// R16 horizontal
        R16 = 0x20000;
        /// 300 x 300 pels/25.4 mm
        RES_300_300 = 0x100000;
        /// 400 x 400 pels/25.4 mm
        RES_400_400 = 0x200000;
        /// 600 x 600 pels/25.4 mm
        RES_600_600 = 0x400000;
        /// 1200 x 1200 pels/25.4 mm
        RES_1200_1200 = 0x800000;
        /// 300 x 600 pels/25.4 mm
        RES_300_600 = 0x1000000;
        /// 400 x 800 pels/25.4 mm
        RES_400_800 = 0x2000000;
        /// 600 x 1200 pels/25.4 mm
        RES_600_1200 = 0x4000000;
    }
}

option_set! {
    /// Scan line widths and recording lengths the terminal accepts
    ImageSizes(u32) {
        /// 215 mm scan line
        WIDTH_215MM = 0x01;
        /// 255 mm scan line
        WIDTH_255MM = 0x02;
        /// 303 mm scan line
        WIDTH_303MM = 0x04;
        /// Unlimited recording length
        LENGTH_UNLIMITED = 0x10000;
        /// A4 recording length
        LENGTH_A4 = 0x20000;
        /// B4 recording length
        LENGTH_B4 = 0x40000;
        /// North American Letter
        LENGTH_US_LETTER = 0x80000;
        /// North American Legal
        LENGTH_US_LEGAL = 0x100000;
    }
}

option_set! {
    /// Polling-related optional features
    PollingFeatures(u8) {
        /// Selective polling addresses
        SEP = 0x01;
        /// Polled subaddresses
        PSA = 0x02;
    }
}

option_set! {
    /// Internet-aware fax behaviour switches
    IafMode(u8) {
        /// T.37 store-and-forward
        T37 = 0x01;
        /// T.38 real time
        T38 = 0x02;
        /// Flow control available
        FLOW_CONTROL = 0x04;
        /// Continuous flow possible
        CONTINUOUS_FLOW = 0x08;
        /// Suppress the trainability test
        NO_TCF = 0x10;
        /// No fill bits needed
        NO_FILL_BITS = 0x20;
        /// No indicator tones
        NO_INDICATORS = 0x40;
    }
}

/// Invalid configuration value
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// An identifier exceeds the 20-character limit
    #[error("identifier exceeds {MAX_IDENT_LEN} characters")]
    IdentTooLong,
    /// The NSF payload exceeds the size limit
    #[error("non-standard facilities payload exceeds {MAX_LOCAL_NSF_LEN} octets")]
    NsfTooLong,
    /// The page header string exceeds the size limit
    #[error("header info exceeds {MAX_HEADER_INFO_LEN} characters")]
    HeaderTooLong,
}

/// Everything the session needs from its owner
///
/// Handlers are invoked synchronously from the session's entry points
/// and must not call back into the session.
pub trait SessionEnvironment {
    /// Queue an HDLC frame for transmission; `None` asks the transport
    /// to flush and expect a response
    fn send_hdlc(&mut self, frame: Option<&[u8]>);

    /// Select the receive-side modem
    fn set_rx_modem(&mut self, modem: crate::modem::ModemType, short_train: bool, hdlc: bool);

    /// Select the transmit-side modem
    fn set_tx_modem(&mut self, modem: crate::modem::ModemType, short_train: bool, hdlc: bool);

    /// Phase B milestone: negotiation frame processed; `fcf` names it
    fn on_phase_b(&mut self, fcf: u8) {
        let _ = fcf;
    }

    /// Phase D milestone: post-page signal processed
    fn on_phase_d(&mut self, fcf: u8) {
        let _ = fcf;
    }

    /// Phase E: the call is over; `status` is the final outcome
    fn on_phase_e(&mut self, status: Status) {
        let _ = status;
    }

    /// Asked after the last page of a document: is another document
    /// waiting, so EOM should be sent instead of EOP?
    fn more_documents(&mut self) -> bool {
        false
    }

    /// Open the document named by the transmit-file setting, limited
    /// to the given page range when one was set
    fn open_tx_document(
        &mut self,
        file: &str,
        start_page: Option<u32>,
        stop_page: Option<u32>,
    ) -> Result<Box<dyn TxDocument>, DocumentError>;

    /// Open (or create) the document named by the receive-file setting
    fn open_rx_document(
        &mut self,
        file: &str,
        encoding: Encoding,
        stop_page: Option<u32>,
    ) -> Result<Box<dyn RxDocument>, DocumentError>;
}

/// Point-in-time transfer statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Negotiated bit rate
    pub bit_rate: u32,
    /// True if the call is running in ECM mode
    pub error_correcting_mode: bool,
    pub pages_transferred: u32,
    pub pages_in_file: u32,
    pub width: u32,
    pub length: u32,
    pub bad_rows: u32,
    pub longest_bad_row_run: u32,
    pub x_resolution: u32,
    pub y_resolution: u32,
    pub image_size: u32,
    /// The status the phase-E handler will see
    pub current_status: Status,
}

/// Verdict on a received page
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CopyQuality {
    Good,
    Poor,
    Bad,
}

/// One end of a T.30 facsimile call
///
/// Create with [`Session::new`], configure through the setters, then
/// feed events. The party (caller or answerer) is fixed at creation;
/// [`Session::restart`] rewinds everything else for a fresh call.
pub struct Session<E: SessionEnvironment> {
    env: E,
    calling_party: bool,

    // local configuration
    local_ident: String,
    local_nsf: ArrayVec<u8, MAX_LOCAL_NSF_LEN>,
    local_sub_address: String,
    local_password: String,
    far_password: String,
    header_info: String,
    tx_file: String,
    tx_start_page: Option<u32>,
    tx_stop_page: Option<u32>,
    rx_file: String,
    rx_stop_page: Option<u32>,
    iaf: IafMode,
    supported_modems: ModemSupport,
    supported_compressions: Compressions,
    supported_resolutions: Resolutions,
    supported_image_sizes: ImageSizes,
    supported_polling_features: PollingFeatures,
    support_fnv: bool,
    ecm_allowed: bool,
    crp_enabled: bool,
    receiver_not_ready_count: u32,
    forced_min_row_bits: Option<u32>,
    output_encoding: Encoding,

    // what we have learned about the far end
    far_ident: String,
    far_sub_address: String,
    far_password_ok: bool,
    sep_address: String,
    psa_address: String,
    far_nsf: ArrayVec<u8, MAX_LOCAL_NSF_LEN>,
    rx_dcs_hex: String,

    // negotiation state
    dis_dtc_frame: CapabilityFrame,
    dcs_frame: CapabilityFrame,
    dis_received: bool,
    far_end_detected: bool,
    current_fallback: usize,
    current_permitted_modems: ModemSupport,
    line_encoding: Encoding,
    min_scan_time_code: u8,
    x_resolution: XResolution,
    y_resolution: YResolution,
    image_width: u32,
    octets_per_ecm_frame: usize,
    error_correcting_mode: bool,
    short_train: bool,

    // call state
    phase: Phase,
    next_phase: Option<Phase>,
    state: State,
    timers: Timers,
    current_status: Status,
    rx_signal_present: bool,
    rx_trained: bool,
    in_message: bool,
    retries: u32,
    step: u32,
    next_tx_step: u8,
    next_rx_step: u8,
    local_interrupt_pending: bool,

    // trainability test bookkeeping
    training_current_zeros: i32,
    training_most_zeros: i32,
    training_test_bits: i32,

    // the documents in flight
    tx_doc: Option<Box<dyn TxDocument>>,
    rx_doc: Option<Box<dyn RxDocument>>,

    // ECM
    ecm: EcmBuffer,
    last_pps_fcf2: u8,
    ppr_count: u32,
}

impl<E: SessionEnvironment> Session<E> {
    /// New session for one call party
    ///
    /// `calling_party` fixes which side of the procedure this session
    /// plays. The defaults select the basic modems and capabilities;
    /// adjust them through the setters before the call starts.
    pub fn new(calling_party: bool, env: E) -> Self {
        let mut session = Self {
            env,
            calling_party,
            local_ident: String::new(),
            local_nsf: ArrayVec::new(),
            local_sub_address: String::new(),
            local_password: String::new(),
            far_password: String::new(),
            header_info: String::new(),
            tx_file: String::new(),
            tx_start_page: None,
            tx_stop_page: None,
            rx_file: String::new(),
            rx_stop_page: None,
            iaf: IafMode::NONE,
            supported_modems: ModemSupport::V27TER | ModemSupport::V29,
            supported_compressions: Compressions::T4_1D | Compressions::T4_2D,
            supported_resolutions: Resolutions::STANDARD
                | Resolutions::FINE
                | Resolutions::SUPERFINE
                | Resolutions::R8,
            supported_image_sizes: ImageSizes::LENGTH_US_LETTER
                | ImageSizes::LENGTH_US_LEGAL
                | ImageSizes::LENGTH_UNLIMITED
                | ImageSizes::WIDTH_215MM,
            supported_polling_features: PollingFeatures::NONE,
            support_fnv: false,
            ecm_allowed: false,
            crp_enabled: false,
            receiver_not_ready_count: 0,
            forced_min_row_bits: None,
            // most things get 1D and 2D right; plenty get anything
            // fancier wrong
            output_encoding: Encoding::T4TwoD,
            far_ident: String::new(),
            far_sub_address: String::new(),
            far_password_ok: false,
            sep_address: String::new(),
            psa_address: String::new(),
            far_nsf: ArrayVec::new(),
            rx_dcs_hex: String::new(),
            dis_dtc_frame: CapabilityFrame::new(fcf::DIS),
            dcs_frame: CapabilityFrame::new(fcf::DCS),
            dis_received: false,
            far_end_detected: false,
            current_fallback: 0,
            current_permitted_modems: ModemSupport::NONE,
            line_encoding: Encoding::T4OneD,
            min_scan_time_code: 0,
            x_resolution: XResolution::R8,
            y_resolution: YResolution::Standard,
            image_width: 0,
            octets_per_ecm_frame: 256,
            error_correcting_mode: false,
            short_train: false,
            phase: Phase::Idle,
            next_phase: None,
            state: State::CallFinished,
            timers: Timers::new(),
            current_status: Status::Ok,
            rx_signal_present: false,
            rx_trained: false,
            in_message: false,
            retries: 0,
            step: 0,
            next_tx_step: fcf::EOP,
            next_rx_step: fcf::MPS,
            local_interrupt_pending: false,
            training_current_zeros: 0,
            training_most_zeros: 0,
            training_test_bits: 0,
            tx_doc: None,
            rx_doc: None,
            ecm: EcmBuffer::new(),
            last_pps_fcf2: fcf::NULL,
            ppr_count: 0,
        };
        session.restart();
        session
    }

    /// Reset for a fresh call with the current configuration
    pub fn restart(&mut self) {
        self.phase = Phase::Idle;
        self.next_phase = None;
        self.current_fallback = 0;
        self.rx_signal_present = false;
        self.rx_trained = false;
        self.current_status = Status::Ok;
        self.ppr_count = 0;
        self.receiver_not_ready_count = 0;
        self.dis_received = false;
        self.in_message = false;
        self.short_train = false;
        self.retries = 0;
        self.tx_doc = None;
        self.rx_doc = None;
        self.ecm = EcmBuffer::new();
        self.timers.stop_all();

        self.build_dis_or_dtc();
        if self.calling_party {
            self.set_state(State::T);
            self.set_phase(Phase::ACng);
        } else {
            self.set_state(State::Answering);
            self.set_phase(Phase::ACed);
        }
        self.far_end_detected = false;
        self.timers.start_t0();
    }

    /// Force the session to end now
    ///
    /// If the call was not already closing, the outcome becomes
    /// [`Status::CallDropped`]. The phase-E handler runs either way.
    pub fn terminate(&mut self) {
        if self.phase == Phase::CallFinished {
            return;
        }
        match self.state {
            State::C => {
                // we were sending the final disconnect; hussle it along
                self.disconnect();
            }
            State::B => {
                // just waiting for the line to flush
            }
            _ => {
                self.current_status = Status::CallDropped;
            }
        }
        let status = self.current_status;
        self.env.on_phase_e(status);
        self.set_state(State::CallFinished);
        self.set_phase(Phase::CallFinished);
    }

    // -- front-end entry points --------------------------------------------

    /// Advance the timer base by `samples` ticks of 8 kHz audio
    pub fn timer_tick(&mut self, samples: i64) {
        let events = self.timers.tick(samples, self.far_end_detected);
        for event in events {
            match event {
                TimerEvent::T0Expired => self.timer_t0_expired(),
                TimerEvent::T1Expired => self.timer_t1_expired(),
                TimerEvent::T2Expired => self.timer_t2_expired(),
                TimerEvent::T3Expired => self.timer_t3_expired(),
                TimerEvent::T4Expired => self.timer_t4_expired(),
                TimerEvent::T5Expired => self.timer_t5_expired(),
            }
        }
    }

    /// Carrier/training events from the V.21 (or ECM image) receiver
    pub fn hdlc_signal(&mut self, event: CarrierEvent) {
        match event {
            CarrierEvent::TrainingFailed => {
                debug!("HDLC carrier training failed in state {:?}", self.state);
                self.rx_trained = false;
                // we have seen something; wait for the carrier to drop
                // before proceeding
                self.timers.stop_t2_t4();
            }
            CarrierEvent::TrainingSucceeded => {
                debug!("HDLC carrier trained in state {:?}", self.state);
                self.rx_signal_present = true;
                self.rx_trained = true;
            }
            CarrierEvent::CarrierUp => {
                debug!("HDLC carrier up in state {:?}", self.state);
                self.rx_signal_present = true;
            }
            CarrierEvent::CarrierDown => {
                debug!("HDLC carrier down in state {:?}", self.state);
                self.rx_signal_present = false;
                self.rx_trained = false;
                // a queued phase change waits for exactly this moment
                if let Some(next) = self.next_phase.take() {
                    self.set_phase(next);
                }
            }
            CarrierEvent::FramingOk => {
                debug!("HDLC framing OK in state {:?}", self.state);
                if !self.far_end_detected && self.timers.t0_t1_running() {
                    self.timers.start_t1();
                    self.far_end_detected = true;
                    if self.phase == Phase::ACed || self.phase == Phase::ACng {
                        self.set_phase(Phase::BRx);
                    }
                }
                // T2 is reset whenever a flag is received
                self.timers.stop_t2_if_running();
            }
        }
    }

    /// A decoded HDLC frame from the V.21 or ECM receiver
    ///
    /// `crc_ok` reports the frame check; corrupt frames elicit CRP when
    /// enabled and are otherwise dropped.
    pub fn hdlc_frame(&mut self, msg: &[u8], crc_ok: bool) {
        if !crc_ok {
            debug!("bad CRC received");
            if self.crp_enabled {
                self.send_simple_frame(fcf::CRP);
            }
            return;
        }
        // the command or response arrived
        self.timers.stop_t2_t4();
        if msg.len() < 3 {
            debug!("bad HDLC frame length - {}", msg.len());
            return;
        }
        if msg[0] != ADDRESS || !(msg[1] == CONTROL_NON_FINAL || msg[1] == CONTROL_FINAL) {
            debug!("bad HDLC frame header - {:02x} {:02x}", msg[0], msg[1]);
            return;
        }
        debug!(
            "Rx: {} with{} final frame tag",
            frame_name(msg[2]),
            if is_final(msg[1]) { "" } else { "out" }
        );
        match self.phase {
            Phase::ACed | Phase::ACng | Phase::BRx | Phase::CEcmRx | Phase::DRx => {}
            _ => {
                debug!(
                    "unexpected HDLC frame received in phase {}, state {:?}",
                    self.phase, self.state
                );
            }
        }
        if is_final(msg[1]) {
            // any successful frame from the far end cancels T1
            self.timers.stop_t0_t1();
            self.process_final(msg);
        } else {
            self.process_non_final(msg);
        }
    }

    /// Carrier/training events from the non-ECM image receiver
    pub fn non_ecm_signal(&mut self, event: CarrierEvent) {
        match event {
            CarrierEvent::TrainingFailed => {
                debug!("non-ECM carrier training failed in state {:?}", self.state);
                self.rx_trained = false;
                // we saw something; let the carrier drop before
                // responding
                self.timers.stop_t2_t4();
            }
            CarrierEvent::TrainingSucceeded => {
                debug!("non-ECM carrier trained in state {:?}", self.state);
                // in case we are in trainability test mode
                self.training_current_zeros = 0;
                self.training_most_zeros = 0;
                self.rx_signal_present = true;
                self.rx_trained = true;
                self.timers.stop_t2_t4();
            }
            CarrierEvent::CarrierUp => {
                debug!("non-ECM carrier up in state {:?}", self.state);
            }
            CarrierEvent::CarrierDown => {
                debug!("non-ECM carrier down in state {:?}", self.state);
                let was_trained = self.rx_trained;
                self.rx_signal_present = false;
                self.rx_trained = false;
                match self.state {
                    State::FTcf => {
                        // Only respond if we really synced up with the
                        // source; clicks often precede the real signal
                        // as the far modem switches.
                        if was_trained {
                            self.judge_tcf();
                        }
                    }
                    State::FPostDocNonEcm => {
                        // page ended cleanly
                        if self.current_status == Status::NoCarrierRx {
                            self.current_status = Status::Ok;
                        }
                    }
                    _ => {
                        // we should be receiving a document right now
                        if was_trained {
                            warn!("page did not end cleanly");
                            // we trained, so some kind of page exists
                            self.set_state(State::FPostDocNonEcm);
                            self.set_phase(Phase::DRx);
                            self.timers.start_t2();
                            if self.current_status == Status::NoCarrierRx {
                                self.current_status = Status::Ok;
                            }
                        } else {
                            warn!("non-ECM carrier not found");
                            self.current_status = Status::NoCarrierRx;
                        }
                    }
                }
                if let Some(next) = self.next_phase.take() {
                    self.set_phase(next);
                }
            }
            CarrierEvent::FramingOk => {
                warn!("unexpected non-ECM event - {:?}", event);
            }
        }
    }

    /// One bit from the non-ECM image receiver
    pub fn non_ecm_bit(&mut self, bit: u8) {
        match self.state {
            State::FTcf => {
                // trainability test
                if bit != 0 {
                    if self.training_current_zeros > self.training_most_zeros {
                        self.training_most_zeros = self.training_current_zeros;
                    }
                    self.training_current_zeros = 0;
                } else {
                    self.training_current_zeros += 1;
                }
            }
            State::FDocNonEcm => {
                let done = self
                    .rx_doc
                    .as_mut()
                    .map(|doc| doc.put_bit(bit))
                    .unwrap_or(false);
                if done {
                    // that is the end of the document
                    self.set_state(State::FPostDocNonEcm);
                    self.queue_phase(Phase::DRx);
                    self.timers.start_t2();
                }
            }
            _ => {}
        }
    }

    /// One byte from the non-ECM image receiver
    pub fn non_ecm_byte(&mut self, byte: u8) {
        match self.state {
            State::FTcf => {
                // counting zeros bytewise is approximate; that really
                // doesn't matter
                if byte != 0 {
                    if self.training_current_zeros > self.training_most_zeros {
                        self.training_most_zeros = self.training_current_zeros;
                    }
                    self.training_current_zeros = 0;
                } else {
                    self.training_current_zeros += 8;
                }
            }
            State::FDocNonEcm => {
                let done = self
                    .rx_doc
                    .as_mut()
                    .map(|doc| doc.put_chunk(&[byte]))
                    .unwrap_or(false);
                if done {
                    self.set_state(State::FPostDocNonEcm);
                    self.queue_phase(Phase::DRx);
                    self.timers.start_t2();
                }
            }
            _ => {}
        }
    }

    /// A chunk from the non-ECM image receiver
    pub fn non_ecm_chunk(&mut self, buf: &[u8]) {
        match self.state {
            State::FTcf => {
                for &byte in buf {
                    if byte != 0 {
                        if self.training_current_zeros > self.training_most_zeros {
                            self.training_most_zeros = self.training_current_zeros;
                        }
                        self.training_current_zeros = 0;
                    } else {
                        self.training_current_zeros += 8;
                    }
                }
            }
            State::FDocNonEcm => {
                let done = self
                    .rx_doc
                    .as_mut()
                    .map(|doc| doc.put_chunk(buf))
                    .unwrap_or(false);
                if done {
                    self.set_state(State::FPostDocNonEcm);
                    self.queue_phase(Phase::DRx);
                    self.timers.start_t2();
                }
            }
            _ => {}
        }
    }

    /// Next bit for the non-ECM image transmitter, `None` at the end
    /// of the data
    pub fn non_ecm_get_bit(&mut self) -> Option<u8> {
        match self.state {
            State::DTcf => {
                // trainability test
                self.training_test_bits -= 1;
                if self.training_test_bits < 0 {
                    None
                } else {
                    Some(0)
                }
            }
            State::I => self.tx_doc.as_mut().and_then(|doc| doc.get_bit()),
            State::DPostTcf | State::IIQ => {
                // padding out a block of samples
                Some(0)
            }
            _ => {
                warn!("non-ECM bit requested in bad state {:?}", self.state);
                None
            }
        }
    }

    /// Next byte for the non-ECM image transmitter
    pub fn non_ecm_get_byte(&mut self) -> Option<u8> {
        match self.state {
            State::DTcf => {
                self.training_test_bits -= 8;
                if self.training_test_bits < 0 {
                    None
                } else {
                    Some(0)
                }
            }
            State::I => {
                let mut byte = [0u8; 1];
                match self.tx_doc.as_mut().map(|doc| doc.get_chunk(&mut byte)) {
                    Some(1) => Some(byte[0]),
                    _ => None,
                }
            }
            State::DPostTcf | State::IIQ => Some(0),
            _ => {
                warn!("non-ECM byte requested in bad state {:?}", self.state);
                None
            }
        }
    }

    /// Fill `buf` for the non-ECM image transmitter; returns the count
    /// provided, 0 at the end of the data
    pub fn non_ecm_get_chunk(&mut self, buf: &mut [u8]) -> usize {
        match self.state {
            State::DTcf => {
                for (len, byte) in buf.iter_mut().enumerate() {
                    *byte = 0;
                    self.training_test_bits -= 8;
                    if self.training_test_bits < 0 {
                        return len;
                    }
                }
                buf.len()
            }
            State::I => self
                .tx_doc
                .as_mut()
                .map(|doc| doc.get_chunk(buf))
                .unwrap_or(0),
            State::DPostTcf | State::IIQ => 0,
            _ => {
                warn!("non-ECM chunk requested in bad state {:?}", self.state);
                0
            }
        }
    }

    /// Progress notifications from the front end
    pub fn front_end_status(&mut self, status: FrontEndStatus) {
        match status {
            FrontEndStatus::SendStepComplete | FrontEndStatus::SendComplete => {
                debug!(
                    "send complete in phase {}, state {:?}",
                    self.phase, self.state
                );
                self.send_step_complete();
            }
            FrontEndStatus::ReceiveComplete => {
                debug!(
                    "receive complete in phase {}, state {:?}",
                    self.phase, self.state
                );
                // usually a carrier-down reports this, but a dying
                // packet stream needs a way to stop things too
                match self.phase {
                    Phase::CNonEcmRx => self.non_ecm_signal(CarrierEvent::CarrierDown),
                    _ => self.hdlc_signal(CarrierEvent::CarrierDown),
                }
            }
            FrontEndStatus::SignalPresent => {
                debug!("a signal is present");
                // The front end says the expected signal is here. That
                // may be premature, but disbelieving it risks timing
                // out while an ECM sender idles on flags.
                match self.phase {
                    Phase::ACed | Phase::ACng | Phase::BRx | Phase::DRx => {
                        self.hdlc_signal(CarrierEvent::CarrierUp);
                        self.hdlc_signal(CarrierEvent::FramingOk);
                    }
                    _ => {
                        self.rx_signal_present = true;
                        self.timers.stop_t2_t4();
                    }
                }
            }
            FrontEndStatus::SignalAbsent => {
                debug!("no signal is present");
            }
        }
    }

    // -- configuration -----------------------------------------------------

    /// Station identifier sent in CSI/TSI/CIG frames
    pub fn set_local_ident(&mut self, ident: &str) -> Result<(), ConfigError> {
        if ident.len() > MAX_IDENT_LEN {
            return Err(ConfigError::IdentTooLong);
        }
        self.local_ident = ident.to_owned();
        Ok(())
    }

    /// Non-standard-facilities payload sent ahead of our DIS
    pub fn set_local_nsf(&mut self, nsf: &[u8]) -> Result<(), ConfigError> {
        if nsf.len() > MAX_LOCAL_NSF_LEN {
            return Err(ConfigError::NsfTooLong);
        }
        self.local_nsf.clear();
        self.local_nsf.extend(nsf.iter().copied());
        Ok(())
    }

    /// Subaddress sent in SUB frames
    pub fn set_local_sub_address(&mut self, sub_address: &str) -> Result<(), ConfigError> {
        if sub_address.len() > MAX_IDENT_LEN {
            return Err(ConfigError::IdentTooLong);
        }
        self.local_sub_address = sub_address.to_owned();
        Ok(())
    }

    /// Password sent in PWD frames
    pub fn set_local_password(&mut self, password: &str) -> Result<(), ConfigError> {
        if password.len() > MAX_IDENT_LEN {
            return Err(ConfigError::IdentTooLong);
        }
        self.local_password = password.to_owned();
        Ok(())
    }

    /// Password expected from the far end
    pub fn set_far_password(&mut self, password: &str) -> Result<(), ConfigError> {
        if password.len() > MAX_IDENT_LEN {
            return Err(ConfigError::IdentTooLong);
        }
        self.far_password = password.to_owned();
        Ok(())
    }

    /// Page header text for transmitted pages
    pub fn set_header_info(&mut self, info: &str) -> Result<(), ConfigError> {
        if info.len() > MAX_HEADER_INFO_LEN {
            return Err(ConfigError::HeaderTooLong);
        }
        self.header_info = info.to_owned();
        Ok(())
    }

    /// File to transmit, with optional page range
    pub fn set_tx_file(&mut self, file: &str, start_page: Option<u32>, stop_page: Option<u32>) {
        self.tx_file = file.to_owned();
        self.tx_start_page = start_page;
        self.tx_stop_page = stop_page;
    }

    /// File to receive into, with optional stop page
    pub fn set_rx_file(&mut self, file: &str, stop_page: Option<u32>) {
        self.rx_file = file.to_owned();
        self.rx_stop_page = stop_page;
    }

    pub fn set_iaf_mode(&mut self, iaf: IafMode) {
        self.iaf = iaf;
    }

    pub fn set_supported_modems(&mut self, modems: ModemSupport) {
        self.supported_modems = modems;
        self.build_dis_or_dtc();
    }

    pub fn set_supported_compressions(&mut self, compressions: Compressions) {
        self.supported_compressions = compressions;
        self.build_dis_or_dtc();
    }

    pub fn set_supported_resolutions(&mut self, resolutions: Resolutions) {
        self.supported_resolutions = resolutions;
        self.build_dis_or_dtc();
    }

    pub fn set_supported_image_sizes(&mut self, sizes: ImageSizes) {
        self.supported_image_sizes = sizes;
        self.build_dis_or_dtc();
    }

    pub fn set_supported_polling_features(&mut self, features: PollingFeatures) {
        self.supported_polling_features = features;
        self.build_dis_or_dtc();
    }

    pub fn set_ecm_capability(&mut self, enabled: bool) {
        self.ecm_allowed = enabled;
        self.build_dis_or_dtc();
    }

    /// Advertise field-not-valid support in our DIS
    pub fn set_fnv_support(&mut self, enabled: bool) {
        self.support_fnv = enabled;
        self.build_dis_or_dtc();
    }

    /// Answer corrupt frames with CRP instead of silence
    pub fn set_crp_enabled(&mut self, enabled: bool) {
        self.crp_enabled = enabled;
    }

    /// Stall the transmitter with RNR this many times before answering
    /// a PPS
    pub fn set_receiver_not_ready(&mut self, count: u32) {
        self.receiver_not_ready_count = count;
    }

    /// Override the negotiated minimum bits per non-ECM row
    pub fn set_min_non_ecm_row_bits(&mut self, bits: Option<u32>) {
        self.forced_min_row_bits = bits;
    }

    /// Line encoding for the received document
    pub fn set_rx_encoding(&mut self, encoding: Encoding) {
        self.output_encoding = encoding;
    }

    /// Answer an outstanding procedural interrupt and latch the local
    /// interrupt request
    pub fn local_interrupt_request(&mut self, state: bool) {
        if self.timers.t3_running() {
            // accept the far end's outstanding request
            self.send_simple_frame(if state { fcf::PIP } else { fcf::PIN });
        }
        self.local_interrupt_pending = state;
    }

    // -- introspection -----------------------------------------------------

    /// The status the phase-E handler will be given
    pub fn current_status(&self) -> Status {
        self.current_status
    }

    /// Far terminal's station identifier, as received
    pub fn far_ident(&self) -> &str {
        &self.far_ident
    }

    /// Far terminal's subaddress, as received
    pub fn far_sub_address(&self) -> &str {
        &self.far_sub_address
    }

    /// Selective polling address, as received
    pub fn far_sep_address(&self) -> &str {
        &self.sep_address
    }

    /// Polled subaddress, as received
    pub fn far_psa_address(&self) -> &str {
        &self.psa_address
    }

    /// Raw non-standard-facilities payload, as received
    pub fn far_nsf(&self) -> &[u8] {
        &self.far_nsf
    }

    /// True once the far end has presented the expected password
    pub fn far_password_matched(&self) -> bool {
        self.far_password_ok
    }

    /// Snapshot of the transfer statistics
    pub fn stats(&self) -> SessionStats {
        let doc_stats = self
            .rx_doc
            .as_ref()
            .map(|doc| doc.stats())
            .or_else(|| self.tx_doc.as_ref().map(|doc| doc.stats()))
            .unwrap_or_default();
        SessionStats {
            bit_rate: FALLBACK_SEQUENCE[self.current_fallback].bit_rate,
            error_correcting_mode: self.error_correcting_mode,
            pages_transferred: doc_stats.pages_transferred,
            pages_in_file: doc_stats.pages_in_file,
            width: doc_stats.width,
            length: doc_stats.length,
            bad_rows: doc_stats.bad_rows,
            longest_bad_row_run: doc_stats.longest_bad_row_run,
            x_resolution: doc_stats.x_resolution,
            y_resolution: doc_stats.y_resolution,
            image_size: doc_stats.image_size,
            current_status: self.current_status,
        }
    }

    /// The owner's environment
    pub fn environment(&self) -> &E {
        &self.env
    }

    pub fn environment_mut(&mut self) -> &mut E {
        &mut self.env
    }

    // -- internals ---------------------------------------------------------

    fn set_state(&mut self, state: State) {
        if self.state != state {
            debug!("changing from state {:?} to {:?}", self.state, state);
            self.state = state;
        }
        self.step = 0;
    }

    pub(crate) fn dis_received_bit(&self) -> u8 {
        u8::from(self.dis_received)
    }

    fn send_frame(&mut self, frame: &[u8]) {
        debug!(
            "Tx: {} with{} final frame tag",
            frame_name(frame[2]),
            if is_final(frame[1]) { "" } else { "out" }
        );
        self.env.send_hdlc(Some(frame));
    }

    /// Simple command/response frames are always final frames
    fn send_simple_frame(&mut self, fcf_value: u8) {
        let frame = [
            ADDRESS,
            CONTROL_FINAL,
            fcf_value | self.dis_received_bit(),
        ];
        self.send_frame(&frame);
    }

    /// Send the station ident under `cmd` (TSI, CIG or CSI) if one is
    /// configured
    fn send_ident_frame(&mut self, cmd: u8) -> bool {
        if self.local_ident.is_empty() {
            return false;
        }
        info!("sending ident '{}'", self.local_ident);
        let frame = encode_ident_frame(cmd | self.dis_received_bit(), &self.local_ident);
        self.send_frame(&frame);
        true
    }

    fn send_pw_frame(&mut self) -> bool {
        if self.local_password.is_empty() {
            return false;
        }
        info!("sending password");
        let frame = encode_ident_frame(fcf::PWD | self.dis_received_bit(), &self.local_password);
        self.send_frame(&frame);
        true
    }

    fn send_sub_frame(&mut self) -> bool {
        if self.local_sub_address.is_empty() {
            return false;
        }
        info!("sending sub address '{}'", self.local_sub_address);
        let frame =
            encode_ident_frame(fcf::SUB | self.dis_received_bit(), &self.local_sub_address);
        self.send_frame(&frame);
        true
    }

    fn send_nsf_frame(&mut self) -> bool {
        if self.local_nsf.is_empty() {
            return false;
        }
        info!("sending user supplied NSF - {} octets", self.local_nsf.len());
        let mut frame: ArrayVec<u8, { MAX_LOCAL_NSF_LEN + 3 }> = ArrayVec::new();
        frame.push(ADDRESS);
        frame.push(CONTROL_NON_FINAL);
        frame.push(fcf::NSF | self.dis_received_bit());
        let nsf = self.local_nsf.clone();
        frame.try_extend_from_slice(&nsf).unwrap();
        self.send_frame(&frame);
        true
    }

    /// Send (NSF) (CSI) DIS, one frame per send step
    fn send_dis_or_dtc_sequence(&mut self) {
        self.dis_dtc_frame.prune();
        self.set_state(State::R);
        if self.send_nsf_frame() {
            self.step = 0;
            return;
        }
        if self.send_ident_frame(fcf::CSI) {
            self.step = 1;
            return;
        }
        self.refresh_dis_dtc();
        let frame = self.dis_dtc_frame.as_slice().to_vec();
        self.send_frame(&frame);
        self.step = 2;
    }

    /// Send (PWD) (SUB) (TSI) DCS, one frame per send step; training
    /// follows the sequence
    fn send_dcs_sequence(&mut self) {
        self.dcs_frame.prune();
        self.set_state(State::D);
        if self.send_pw_frame() {
            self.step = 0;
            return;
        }
        if self.send_sub_frame() {
            self.step = 1;
            return;
        }
        if self.send_ident_frame(fcf::TSI) {
            self.step = 2;
            return;
        }
        let frame = self.dcs_frame.as_slice().to_vec();
        self.send_frame(&frame);
        self.step = 3;
    }

    fn send_dcn(&mut self) {
        self.queue_phase(Phase::DTx);
        self.set_state(State::C);
        self.send_simple_frame(fcf::DCN);
    }

    fn disconnect(&mut self) {
        info!("disconnecting");
        // tidy up any fax in progress; repeating this is harmless
        self.tx_doc = None;
        self.rx_doc = None;
        self.timers.stop_all();
        self.set_phase(Phase::E);
        self.set_state(State::B);
    }

    /// Which post-page command closes the page now ending
    fn check_next_tx_step(&mut self) -> u8 {
        let more_pages = self
            .tx_doc
            .as_ref()
            .map(|doc| doc.more_pages())
            .unwrap_or(false);
        if more_pages {
            return if self.local_interrupt_pending {
                fcf::PRI_MPS
            } else {
                fcf::MPS
            };
        }
        // if the owner has another document queued we send EOM, then
        // renegotiate and begin the new document
        if self.env.more_documents() {
            if self.local_interrupt_pending {
                fcf::PRI_EOM
            } else {
                fcf::EOM
            }
        } else if self.local_interrupt_pending {
            fcf::PRI_EOP
        } else {
            fcf::EOP
        }
    }

    /// Set up the page decoder for the page about to start and clear
    /// the ECM block state
    fn start_rx_page(&mut self) {
        let setup = PageSetup {
            image_width: self.image_width,
            encoding: Some(self.line_encoding),
            x_resolution: self.x_resolution.per_metre(),
            y_resolution: self.y_resolution.per_metre(),
            remote_ident: self.far_ident.clone(),
            remote_sub_address: self.far_sub_address.clone(),
            dcs_hex: self.rx_dcs_hex.clone(),
        };
        if let Some(doc) = self.rx_doc.as_mut() {
            doc.configure_page(&setup);
            doc.start_page();
        }
        self.ecm.clear_slots();
        self.ecm.page += 1;
        self.ecm.block = 0;
        self.ecm.frames_this_burst = 0;
    }

    /// Grade the page the far end just finished
    fn copy_quality(&mut self) -> CopyQuality {
        // There is no specification for copy quality; three levels are
        // enough to pick the response: fine as is, tolerable but
        // retrain, or intolerable.
        let stats = self
            .rx_doc
            .as_ref()
            .map(|doc| doc.stats())
            .unwrap_or_default();
        info!(
            "page {}: {} x {} pels, {} bad rows (longest run {})",
            stats.pages_transferred + 1,
            stats.width,
            stats.length,
            stats.bad_rows,
            stats.longest_bad_row_run
        );
        if stats.bad_rows * 50 < stats.length {
            CopyQuality::Good
        } else if stats.bad_rows * 20 < stats.length {
            CopyQuality::Poor
        } else {
            CopyQuality::Bad
        }
    }

    /// Respond to a mid-document post-page command (MPS or EOM)
    fn judge_page(&mut self, pri: bool) {
        match self.copy_quality() {
            CopyQuality::Good => {
                if let Some(doc) = self.rx_doc.as_mut() {
                    doc.end_page();
                }
                if pri {
                    self.close_rx_document();
                    self.set_state(State::IIIQMcf);
                } else {
                    self.start_rx_page();
                    self.set_state(State::IIIQMcf);
                    self.send_simple_frame(fcf::MCF);
                }
            }
            CopyQuality::Poor => {
                if let Some(doc) = self.rx_doc.as_mut() {
                    doc.end_page();
                }
                if pri {
                    self.close_rx_document();
                    self.set_state(State::IIIQRtp);
                } else {
                    self.start_rx_page();
                    self.set_state(State::IIIQRtp);
                    self.send_simple_frame(fcf::RTP);
                }
            }
            CopyQuality::Bad => {
                if pri {
                    self.set_state(State::IIIQRtn);
                } else {
                    self.start_rx_page();
                    self.set_state(State::IIIQRtn);
                    self.send_simple_frame(fcf::RTN);
                }
            }
        }
    }

    /// Respond to the final post-page command (EOP)
    fn judge_final_page(&mut self, pri: bool) {
        if pri {
            self.judge_page(true);
            return;
        }
        match self.copy_quality() {
            CopyQuality::Good => {
                if let Some(doc) = self.rx_doc.as_mut() {
                    doc.end_page();
                }
                self.close_rx_document();
                self.set_state(State::IIIQMcf);
                self.send_simple_frame(fcf::MCF);
            }
            CopyQuality::Poor => {
                if let Some(doc) = self.rx_doc.as_mut() {
                    doc.end_page();
                }
                self.close_rx_document();
                self.set_state(State::IIIQRtp);
                self.send_simple_frame(fcf::RTP);
            }
            CopyQuality::Bad => {
                self.set_state(State::IIIQRtn);
                self.send_simple_frame(fcf::RTN);
            }
        }
    }

    fn close_rx_document(&mut self) {
        self.rx_doc = None;
        self.in_message = false;
    }

    /// Grade the trainability test after the carrier drops
    fn judge_tcf(&mut self) {
        // T.30 says 1.5s of zeros, but some machines prefix a burst of
        // ones; tolerate that by scoring the longest zero run
        if self.training_current_zeros > self.training_most_zeros {
            self.training_most_zeros = self.training_current_zeros;
        }
        if self.training_most_zeros < FALLBACK_SEQUENCE[self.current_fallback].bit_rate as i32 {
            info!(
                "trainability test failed - longest run of zeros was {}",
                self.training_most_zeros
            );
            self.set_phase(Phase::BTx);
            self.set_state(State::FFtt);
            self.send_simple_frame(fcf::FTT);
        } else {
            // the training went OK
            self.short_train = true;
            self.in_message = true;
            self.start_rx_page();
            self.set_phase(Phase::BTx);
            self.set_state(State::FCfr);
            self.send_simple_frame(fcf::CFR);
        }
    }

    /// Step the transmit schedule after the front end finishes a send
    fn send_step_complete(&mut self) {
        match self.state {
            State::Answering => {
                debug!("starting answer mode");
                self.set_phase(Phase::BTx);
                self.timers.start_t2();
                self.dis_received = false;
                self.send_dis_or_dtc_sequence();
            }
            State::R => match self.step {
                0 => {
                    self.step = 1;
                    if !self.send_ident_frame(fcf::CSI) {
                        self.step = 2;
                        self.refresh_dis_dtc();
                        let frame = self.dis_dtc_frame.as_slice().to_vec();
                        self.send_frame(&frame);
                    }
                }
                1 => {
                    self.step = 2;
                    self.refresh_dis_dtc();
                    let frame = self.dis_dtc_frame.as_slice().to_vec();
                    self.send_frame(&frame);
                }
                2 => {
                    self.step = 3;
                    self.env.send_hdlc(None);
                }
                _ => {
                    // wait for an acknowledgement
                    self.set_phase(Phase::BRx);
                    self.timers.start_t4();
                }
            },
            State::FCfr => {
                if self.step == 0 {
                    self.env.send_hdlc(None);
                    self.step = 1;
                } else if self.error_correcting_mode {
                    self.set_state(State::FDocEcm);
                    self.set_phase(Phase::CEcmRx);
                    self.next_rx_step = fcf::MPS;
                } else {
                    self.set_state(State::FDocNonEcm);
                    self.set_phase(Phase::CNonEcmRx);
                    self.next_rx_step = fcf::MPS;
                }
            }
            State::FFtt => {
                if self.step == 0 {
                    self.env.send_hdlc(None);
                    self.step = 1;
                } else {
                    self.set_phase(Phase::BRx);
                    self.timers.start_t4();
                }
            }
            State::IIIQMcf
            | State::IIIQRtp
            | State::IIIQRtn
            | State::FPostRcpPpr
            | State::FPostRcpMcf => {
                if self.step == 0 {
                    self.env.send_hdlc(None);
                    self.step = 1;
                } else {
                    match self.next_rx_step {
                        fcf::MPS | fcf::PRI_MPS => {
                            if self.error_correcting_mode {
                                self.set_state(State::FDocEcm);
                                self.set_phase(Phase::CEcmRx);
                            } else {
                                self.set_state(State::FDocNonEcm);
                                self.set_phase(Phase::CNonEcmRx);
                            }
                        }
                        fcf::EOM | fcf::PRI_EOM | fcf::EOP | fcf::PRI_EOP => {
                            self.disconnect();
                        }
                        other => {
                            debug!("unknown next rx step - {:02x}", other);
                            self.disconnect();
                        }
                    }
                }
            }
            State::IIQ
            | State::IvPpsNull
            | State::IvPpsQ
            | State::IvPpsRnr
            | State::IvEorRnr
            | State::FPostRcpRnr => {
                if self.step == 0 {
                    self.env.send_hdlc(None);
                    self.step = 1;
                } else {
                    // the post-image message is out; wait for the
                    // acknowledgement
                    self.set_phase(Phase::DRx);
                    self.timers.start_t4();
                }
            }
            State::B => {
                // the final message has had time to flush through, so
                // it is safe to report the end of the call
                let status = self.current_status;
                self.env.on_phase_e(status);
                self.set_state(State::CallFinished);
                self.set_phase(Phase::CallFinished);
            }
            State::C => {
                if self.step == 0 {
                    self.env.send_hdlc(None);
                    self.step = 1;
                } else {
                    // the disconnect message is out; now disconnect
                    self.disconnect();
                }
            }
            State::D => match self.step {
                0 => {
                    self.step = 1;
                    if !self.send_sub_frame() {
                        self.step = 2;
                        if !self.send_ident_frame(fcf::TSI) {
                            self.step = 3;
                            let frame = self.dcs_frame.as_slice().to_vec();
                            self.send_frame(&frame);
                        }
                    }
                }
                1 => {
                    self.step = 2;
                    if !self.send_ident_frame(fcf::TSI) {
                        self.step = 3;
                        let frame = self.dcs_frame.as_slice().to_vec();
                        self.send_frame(&frame);
                    }
                }
                2 => {
                    self.step = 3;
                    let frame = self.dcs_frame.as_slice().to_vec();
                    self.send_frame(&frame);
                }
                3 => {
                    self.step = 4;
                    self.env.send_hdlc(None);
                }
                _ => {
                    if self.iaf.contains(IafMode::NO_TCF) {
                        // skip the trainability test
                        self.retries = 0;
                        self.short_train = true;
                        if self.error_correcting_mode {
                            self.set_state(State::Iv);
                            self.queue_phase(Phase::CEcmTx);
                        } else {
                            self.set_state(State::I);
                            self.queue_phase(Phase::CNonEcmTx);
                        }
                    } else {
                        self.set_state(State::DTcf);
                        self.set_phase(Phase::CNonEcmTx);
                    }
                }
            },
            State::DTcf => {
                // training test sent; listen for the verdict
                self.set_phase(Phase::BRx);
                self.timers.start_t4();
                self.set_state(State::DPostTcf);
            }
            State::I => {
                // send the end of page message; it must say now
                // whether more pages follow
                self.set_phase(Phase::DTx);
                self.set_state(State::IIQ);
                self.next_tx_step = self.check_next_tx_step();
                self.send_simple_frame(self.next_tx_step);
            }
            State::Iv => {
                if self.step == 0 {
                    if !self.send_next_ecm_frame() {
                        self.env.send_hdlc(None);
                        self.step = 1;
                    }
                } else {
                    // the burst is out; follow it with the partial
                    // page signal
                    self.set_phase(Phase::DTx);
                    self.next_tx_step = self.check_next_tx_step();
                    if self.send_pps_frame() == fcf::NULL {
                        self.set_state(State::IvPpsNull);
                    } else {
                        self.set_state(State::IvPpsQ);
                    }
                }
            }
            State::CallFinished => {
                // a premature disconnect from the far end can overlap
                // something; ignore it
            }
            _ => {
                debug!("send complete in unexpected state {:?}", self.state);
            }
        }
    }

    // -- timer expiries ----------------------------------------------------

    fn timer_t0_expired(&mut self) {
        debug!("T0 expired in state {:?}", self.state);
        self.current_status = Status::T0Expired;
        // just end the call
        self.disconnect();
    }

    fn timer_t1_expired(&mut self) {
        debug!("T1 expired in state {:?}", self.state);
        // we have been unable to identify with the remote machine;
        // abandon the call
        self.current_status = Status::T1Expired;
        match self.state {
            State::T => {
                // just end the call
                self.disconnect();
            }
            State::R => {
                // T.30 says to send a disconnect first, even though we
                // never successfully contacted the far end
                self.send_dcn();
            }
            _ => {}
        }
    }

    fn timer_t2_expired(&mut self) {
        debug!(
            "T2 expired in phase {}, state {:?}",
            self.phase, self.state
        );
        match self.state {
            State::FDocEcm | State::FDocNonEcm => {
                // waiting for the fax page
                self.current_status = Status::T2ExpiredFaxRx;
            }
            State::FPostDocEcm | State::FPostDocNonEcm => {
                // waiting for the next fax page
                self.current_status = Status::T2ExpiredMpsRx;
            }
            State::IvPpsRnr | State::IvEorRnr => {
                // waiting for the RR command
                self.current_status = Status::T2ExpiredRrRx;
            }
            State::R => {
                // waiting for NSS, DCS or MCF
                self.current_status = Status::T2ExpiredRx;
            }
            _ => {}
        }
        // re-announce ourselves and look for a command
        self.set_phase(Phase::BTx);
        let _ = self.start_receiving_document();
    }

    fn timer_t3_expired(&mut self) {
        debug!(
            "T3 expired in phase {}, state {:?}",
            self.phase, self.state
        );
        self.current_status = Status::T3Expired;
        self.disconnect();
    }

    fn timer_t4_expired(&mut self) {
        // no response, or only a corrupt response, to a command
        debug!(
            "T4 expired in phase {}, state {:?}",
            self.phase, self.state
        );
        self.retries += 1;
        if self.retries > MAX_MESSAGE_TRIES {
            self.current_status = match self.state {
                // no response to DCS or TCF
                State::DPostTcf => Status::PhBDeadTx,
                // no response after sending a page
                State::IIQ | State::IvPpsNull | State::IvPpsQ => Status::PhDDeadTx,
                _ => Status::RetryDCN,
            };
            self.send_dcn();
            return;
        }
        self.repeat_last_command();
    }

    fn timer_t5_expired(&mut self) {
        // give up waiting for the receiver to become ready
        debug!(
            "T5 expired in phase {}, state {:?}",
            self.phase, self.state
        );
        self.current_status = Status::T5Expired;
        self.send_dcn();
    }
}
