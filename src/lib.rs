//! # t30ctl: an ITU-T T.30 fax session controller
//!
//! This crate implements the session-control layer of a Group-3 fax
//! terminal: the phase A–E call procedure, capability negotiation over
//! DIS/DTC/DCS, modem training and rate fallback, page transfer in
//! non-ECM or error-correcting (ECM) mode with selective repeat, page
//! confirmation, retries, and disconnection.
//!
//! It deliberately contains no signal processing. Tone generators, the
//! V.17/V.29/V.27ter modems, the HDLC framer, and the T.4 image codec
//! are external collaborators: the session tells the front end which
//! modem to run in each direction, and the front end feeds decoded
//! frames, image bits, carrier events and completion notices back in.
//!
//! ## Wiring a session
//!
//! The owner supplies an environment — the capability set the session
//! drives — and then forwards front-end events to the session's entry
//! points:
//!
//! ```
//! use t30ctl::{
//!     CarrierEvent, DocumentError, Encoding, ModemType, RxDocument, Session,
//!     SessionEnvironment, Status, TxDocument,
//! };
//!
//! struct Frontend {
//!     // modem glue lives here
//! }
//!
//! impl SessionEnvironment for Frontend {
//!     fn send_hdlc(&mut self, frame: Option<&[u8]>) {
//!         // queue the frame on the V.21 transmitter; None flushes
//!     }
//!     fn set_rx_modem(&mut self, modem: ModemType, short_train: bool, hdlc: bool) {
//!         // reconfigure the receive side
//!     }
//!     fn set_tx_modem(&mut self, modem: ModemType, short_train: bool, hdlc: bool) {
//!         // reconfigure the transmit side
//!     }
//!     fn on_phase_e(&mut self, status: Status) {
//!         println!("call ended: {}", status);
//!     }
//!     fn open_tx_document(
//!         &mut self,
//!         _file: &str,
//!         _start_page: Option<u32>,
//!         _stop_page: Option<u32>,
//!     ) -> Result<Box<dyn TxDocument>, DocumentError> {
//!         Err(DocumentError::Open) // plug a T.4 encoder in here
//!     }
//!     fn open_rx_document(
//!         &mut self,
//!         _file: &str,
//!         _encoding: Encoding,
//!         _stop_page: Option<u32>,
//!     ) -> Result<Box<dyn RxDocument>, DocumentError> {
//!         Err(DocumentError::Open) // plug a T.4 decoder in here
//!     }
//! }
//!
//! let mut session = Session::new(true, Frontend {});
//! session.set_local_ident("+1 212 555 0100").unwrap();
//!
//! // per received sample block:
//! session.timer_tick(160);
//! // on carrier changes:
//! session.hdlc_signal(CarrierEvent::CarrierDown);
//! ```
//!
//! A session is a passive object: it never blocks, owns no thread, and
//! calls the environment synchronously. The owner must not overlap the
//! entry points, and environment handlers must not re-enter the
//! session. One party per session, fixed at creation (caller or
//! answerer).

pub mod capabilities;
pub mod document;
pub mod fallback;
pub mod frames;
pub mod ident;
pub mod modem;
pub mod session;
pub mod status;
pub mod timers;

pub use document::{
    classify_width, width_pels, DocumentError, Encoding, PageSetup, RxDocument, SizeClass,
    TransferStats, TxDocument, XResolution, YResolution,
};
pub use fallback::ModemSupport;
pub use modem::{CarrierEvent, FrontEndStatus, ModemType};
pub use session::{
    Compressions, ConfigError, IafMode, ImageSizes, PollingFeatures, Resolutions, Session,
    SessionEnvironment, SessionStats, MAX_LOCAL_NSF_LEN,
};
pub use status::Status;
pub use timers::{TimerEvent, Timers};
