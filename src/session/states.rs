//! The flow-chart state machine
//!
//! Each state corresponds to a position in the T.30 flow charts. A
//! handler per state consumes final HDLC frames; non-final frames carry
//! auxiliary information and are handled uniformly. Frames that arrive
//! out of context are logged and answered with DCN where the procedure
//! requires it, but never crash the machine.

#[cfg(not(test))]
use log::{debug, info, warn};

#[cfg(test)]
use std::{println as debug, println as info, println as warn};

use crate::fallback;
use crate::frames::{fcf, frame_name, FCF_MASK};
use crate::ident::{decode_ident_payload, decode_url_payload};
use crate::status::Status;

use super::phase::Phase;
use super::{Session, SessionEnvironment};

/// Positions in the T.30 flow charts
///
/// The D-group states belong to the transmitting side of phase B, the
/// F-group to the receiving side; the Roman-numeral groups mirror the
/// chart names for the message and post-message procedures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Answering the call, CED in progress
    Answering,
    /// Waiting for the final flush before reporting the end of the call
    B,
    /// Sending the disconnect message
    C,
    /// Sending the DCS sequence
    D,
    /// Sending the trainability test
    DTcf,
    /// Waiting for the verdict on the trainability test
    DPostTcf,
    /// Receiving the trainability test
    FTcf,
    /// Sent CFR, waiting for the document carrier
    FCfr,
    /// Sent FTT, waiting for a new DCS
    FFtt,
    /// Receiving a document in non-ECM mode
    FDocNonEcm,
    /// Document ended, waiting for the post-page command
    FPostDocNonEcm,
    /// Receiving a document in ECM mode
    FDocEcm,
    /// ECM partial page ended, waiting for PPS
    FPostDocEcm,
    /// Sent MCF for a partial page
    FPostRcpMcf,
    /// Sent PPR for a partial page
    FPostRcpPpr,
    /// Sent RNR, stalling the transmitter
    FPostRcpRnr,
    /// Sent our DIS/DTC, waiting to be commanded
    R,
    /// Calling terminal waiting for the first DIS
    T,
    /// Transmitting a page in non-ECM mode
    I,
    /// Non-ECM page done, post-page command pending
    II,
    /// Sent the post-page command, waiting for the verdict
    IIQ,
    /// Sent MCF, waiting for the line to clear
    IIIQMcf,
    /// Sent RTP, waiting for the line to clear
    IIIQRtp,
    /// Sent RTN, waiting for the line to clear
    IIIQRtn,
    /// Transmitting an ECM partial page
    Iv,
    /// Sent PPS-NULL, mid-page
    IvPpsNull,
    /// Sent PPS with a post-page command
    IvPpsQ,
    /// Far end not ready after PPS
    IvPpsRnr,
    /// Sent CTC, waiting for CTR
    IvCtc,
    /// Sent EOR, waiting for ERR
    IvEor,
    /// Far end not ready after EOR
    IvEorRnr,
    /// Call done; ignore everything
    CallFinished,
}

impl<E: SessionEnvironment> Session<E> {
    /// Handle a non-final control frame
    ///
    /// These deliver auxiliary information (identities, addresses, ECM
    /// image frames) ahead of the final frame that closes the sequence.
    pub(super) fn process_non_final(&mut self, msg: &[u8]) {
        // It seems wrong to restart the command/response timer while
        // exchanging HDLC image data; if the modem loses sync
        // mid-image, wait for the carrier to drop instead.
        if self.phase != Phase::CEcmRx {
            self.timers.rearm_t2_t4();
        }
        // A frame T.30 says not to expect in this context is pretty
        // harmless here; accept the usual ones wherever they show up.
        match msg[2] & FCF_MASK {
            fcf::CSI => {
                // CSI in (NSF) (CSI) DIS; CIG in (NSC) (CIG) DTC
                if let Some(ident) = decode_ident_payload(&msg[2..]) {
                    self.far_ident = ident;
                } else {
                    self.unexpected_frame_length(msg);
                }
            }
            fcf::NSF => {
                if msg[2] == fcf::NSF {
                    // hold the raw payload; the T.35 country/vendor
                    // prefix is decoded by layers that care
                    self.far_nsf.clear();
                    let take = usize::min(msg.len() - 3, self.far_nsf.capacity());
                    self.far_nsf.extend(msg[3..3 + take].iter().copied());
                }
            }
            0xC0 => {
                if msg[2] == fcf::PWD {
                    // PWD in (PWD) (SUB) (TSI) DCS and (PWD) (SEP) (CIG) DTC
                    match decode_ident_payload(&msg[2..]) {
                        Some(password) => {
                            if password == self.far_password {
                                self.far_password_ok = true;
                            }
                        }
                        None => self.unexpected_frame_length(msg),
                    }
                } else {
                    self.unexpected_frame(msg);
                }
            }
            0xA0 => {
                if msg[2] == fcf::SEP {
                    match decode_ident_payload(&msg[2..]) {
                        Some(address) => self.sep_address = address,
                        None => self.unexpected_frame_length(msg),
                    }
                } else {
                    self.unexpected_frame(msg);
                }
            }
            0x60 => {
                if msg[2] == fcf::PSA {
                    match decode_ident_payload(&msg[2..]) {
                        Some(address) => self.psa_address = address,
                        None => self.unexpected_frame_length(msg),
                    }
                } else {
                    self.unexpected_frame(msg);
                }
            }
            0xE0 => {
                if msg[2] == fcf::CIA || msg[2] == fcf::IRA {
                    let _ = decode_url_payload(&msg[2..]);
                } else {
                    self.unexpected_frame(msg);
                }
            }
            0x10 => {
                if msg[2] == fcf::ISP {
                    let _ = decode_url_payload(&msg[2..]);
                } else {
                    self.unexpected_frame(msg);
                }
            }
            fcf::TSI => {
                // TSI in (TSI) DCS and (PWD) (SUB) (TSI) DCS
                match decode_ident_payload(&msg[2..]) {
                    Some(ident) => self.far_ident = ident,
                    None => self.unexpected_frame_length(msg),
                }
            }
            fcf::SUB => match decode_ident_payload(&msg[2..]) {
                Some(address) => self.far_sub_address = address,
                None => self.unexpected_frame_length(msg),
            },
            fcf::SID => {
                let _ = decode_ident_payload(&msg[2..]);
            }
            fcf::CSA | fcf::TSA => {
                let _ = decode_url_payload(&msg[2..]);
            }
            fcf::FCD => self.process_rx_fcd(msg),
            fcf::RCP => self.process_rx_rcp(msg),
            _ => self.unexpected_non_final_frame(msg),
        }
    }

    /// Dispatch a final control frame to the current state's handler
    pub(super) fn process_final(&mut self, msg: &[u8]) {
        debug!("in state {:?}", self.state);
        match self.state {
            State::Answering => self.state_answering(msg),
            State::B => self.state_b(msg),
            State::C => self.state_c(msg),
            State::D | State::DTcf => self.state_d(msg),
            State::DPostTcf => self.state_d_post_tcf(msg),
            State::FTcf | State::FCfr | State::FFtt => self.state_simple_wait(msg),
            State::FDocNonEcm => self.state_f_doc_non_ecm(msg),
            State::FPostDocNonEcm => self.state_f_post_doc_non_ecm(msg),
            State::FDocEcm | State::FPostDocEcm => self.state_f_doc_ecm(msg),
            State::FPostRcpMcf | State::FPostRcpPpr => self.state_simple_wait(msg),
            State::FPostRcpRnr => self.state_f_post_rcp_rnr(msg),
            State::R => self.state_r(msg),
            State::T => self.state_t(msg),
            State::I | State::II => self.state_simple_wait(msg),
            State::IIQ => self.state_ii_q(msg),
            State::IIIQMcf => self.state_iii_q(msg, fcf::MCF),
            State::IIIQRtp => self.state_iii_q(msg, fcf::RTP),
            State::IIIQRtn => self.state_iii_q_rtn(msg),
            State::Iv => self.state_simple_wait(msg),
            State::IvPpsNull | State::IvPpsQ => self.state_iv_pps(msg),
            State::IvPpsRnr => self.state_iv_pps_rnr(msg),
            State::IvCtc => self.state_iv_ctc(msg),
            State::IvEor => self.state_iv_eor(msg, false),
            State::IvEorRnr => self.state_iv_eor(msg, true),
            State::CallFinished => {
                // anything arriving after the end of the call is noise
            }
        }
    }

    /// Replay the last outgoing message for the current state
    ///
    /// Invoked on CRP, on T4 expiry below the retry limit, and when a
    /// phase-D command shows the far end missed our response.
    pub(super) fn repeat_last_command(&mut self) {
        match self.state {
            State::R => {
                self.dis_received = false;
                self.set_phase(Phase::BTx);
                self.send_dis_or_dtc_sequence();
            }
            State::IIIQMcf => {
                self.set_phase(Phase::DTx);
                self.send_simple_frame(fcf::MCF);
            }
            State::IIIQRtp => {
                self.set_phase(Phase::DTx);
                self.send_simple_frame(fcf::RTP);
            }
            State::IIIQRtn => {
                self.set_phase(Phase::DTx);
                self.send_simple_frame(fcf::RTN);
            }
            State::IIQ => {
                self.set_phase(Phase::DTx);
                self.send_simple_frame(self.next_tx_step);
            }
            State::IvPpsNull | State::IvPpsQ => {
                self.set_phase(Phase::DTx);
                self.send_pps_frame();
            }
            State::IvPpsRnr | State::IvEorRnr => {
                self.set_phase(Phase::DTx);
                self.send_simple_frame(fcf::RNR);
            }
            State::D => {
                self.set_phase(Phase::BTx);
                self.send_dcs_sequence();
            }
            State::FFtt => {
                self.set_phase(Phase::BTx);
                self.send_simple_frame(fcf::FTT);
            }
            State::FCfr => {
                self.set_phase(Phase::BTx);
                self.send_simple_frame(fcf::CFR);
            }
            State::DPostTcf => {
                // the whole training exchange must run again
                self.short_train = false;
                self.set_phase(Phase::BTx);
                self.send_dcs_sequence();
            }
            State::FPostRcpRnr => {}
            _ => {
                debug!(
                    "repeat command called with nothing to repeat - phase {}, state {:?}",
                    self.phase, self.state
                );
            }
        }
    }

    // -- per-state handlers ------------------------------------------------

    fn state_answering(&mut self, msg: &[u8]) {
        match msg[2] & FCF_MASK {
            fcf::DIS => {
                // The other end may have seen our CED by analogue means
                // and led with its DIS/DTC straight away. We might have
                // missed a TSI, but accept things and carry on.
                debug!("DIS/DTC before DIS");
                self.process_rx_dis_dtc(msg);
            }
            fcf::DCS => {
                debug!("DCS before DIS");
                self.process_rx_dcs(msg);
            }
            fcf::DCN => {
                self.current_status = Status::GotDcnTx;
                self.disconnect();
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => self.unexpected_final_frame(msg),
        }
    }

    fn state_b(&mut self, msg: &[u8]) {
        match msg[2] & FCF_MASK {
            // DCNs at this stage are stragglers; ignore them
            fcf::DCN => {}
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => self.unexpected_final_frame(msg),
        }
    }

    fn state_c(&mut self, msg: &[u8]) {
        match msg[2] & FCF_MASK {
            fcf::DCN => {}
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => self.unexpected_final_frame(msg),
        }
    }

    /// Sending DCS or TCF; a DCN here means the far end gave up on our
    /// DCS
    fn state_d(&mut self, msg: &[u8]) {
        match msg[2] & FCF_MASK {
            fcf::DCN => {
                self.current_status = Status::BadDcsTx;
                self.disconnect();
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => self.unexpected_final_frame(msg),
        }
    }

    fn state_d_post_tcf(&mut self, msg: &[u8]) {
        match msg[2] & FCF_MASK {
            fcf::CFR => {
                info!("trainability test succeeded");
                self.retries = 0;
                self.short_train = true;
                if self.error_correcting_mode {
                    self.set_state(State::Iv);
                    self.queue_phase(Phase::CEcmTx);
                    self.send_first_ecm_frame();
                } else {
                    self.set_state(State::I);
                    self.queue_phase(Phase::CNonEcmTx);
                }
            }
            fcf::FTT => {
                info!("trainability test failed");
                self.retries = 0;
                self.short_train = false;
                match fallback::step(self.current_fallback, self.current_permitted_modems) {
                    Some(next) => {
                        self.current_fallback = next;
                        self.queue_phase(Phase::BTx);
                        self.send_dcs_sequence();
                    }
                    None => {
                        // we have fallen back as far as we can go
                        self.current_fallback = 0;
                        self.current_status = Status::CannotTrain;
                        self.send_dcn();
                    }
                }
            }
            fcf::DIS => {
                // it appears they never saw our DCS; try again
                self.retries += 1;
                if self.retries > super::MAX_MESSAGE_TRIES {
                    self.current_status = Status::RetryDCN;
                    self.send_dcn();
                    return;
                }
                self.queue_phase(Phase::BTx);
                self.send_dcs_sequence();
            }
            fcf::DCN => {
                self.current_status = Status::BadDcsTx;
                self.disconnect();
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => self.unexpected_final_frame(msg),
        }
    }

    /// Shared handler for the states where only CRP and FNV make sense
    fn state_simple_wait(&mut self, msg: &[u8]) {
        match msg[2] & FCF_MASK {
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => self.unexpected_final_frame(msg),
        }
    }

    /// HDLC frames while the non-ECM document carrier should be running
    /// mean we never saw the image properly; post-page commands here
    /// get an RTN
    fn state_f_doc_non_ecm(&mut self, msg: &[u8]) {
        match msg[2] & FCF_MASK {
            fcf::DIS => self.process_rx_dis_dtc(msg),
            fcf::DCS => self.process_rx_dcs(msg),
            fcf::MPS => {
                self.env.on_phase_d(fcf::MPS);
                self.next_rx_step = fcf::MPS;
                self.queue_phase(Phase::DTx);
                self.set_state(State::IIIQRtn);
                self.send_simple_frame(fcf::RTN);
            }
            fcf::PRI_MPS => {
                self.env.on_phase_d(fcf::PRI_MPS);
                self.timers.start_t3();
                self.next_rx_step = fcf::PRI_MPS;
                self.set_state(State::IIIQRtn);
            }
            fcf::EOM => {
                self.env.on_phase_d(fcf::EOM);
                self.next_rx_step = fcf::EOM;
                // back to phase B for the renegotiation
                self.queue_phase(Phase::BTx);
                self.set_state(State::IIIQRtn);
                self.send_simple_frame(fcf::RTN);
            }
            fcf::PRI_EOM => {
                self.env.on_phase_d(fcf::PRI_EOM);
                self.timers.start_t3();
                self.next_rx_step = fcf::PRI_EOM;
                self.set_state(State::IIIQRtn);
            }
            fcf::EOP => {
                self.env.on_phase_d(fcf::EOP);
                self.next_rx_step = fcf::EOP;
                self.queue_phase(Phase::DTx);
                self.set_state(State::IIIQRtn);
                self.send_simple_frame(fcf::RTN);
            }
            fcf::PRI_EOP => {
                self.env.on_phase_d(fcf::PRI_EOP);
                self.timers.start_t3();
                self.next_rx_step = fcf::PRI_EOP;
                self.set_state(State::IIIQRtn);
            }
            fcf::DCN => {
                self.current_status = Status::DcnDataRx;
                self.disconnect();
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => self.unexpected_final_frame(msg),
        }
    }

    fn state_f_post_doc_non_ecm(&mut self, msg: &[u8]) {
        match msg[2] & FCF_MASK {
            fcf::MPS => {
                self.env.on_phase_d(fcf::MPS);
                self.next_rx_step = fcf::MPS;
                self.queue_phase(Phase::DTx);
                self.judge_page(false);
            }
            fcf::PRI_MPS => {
                self.env.on_phase_d(fcf::PRI_MPS);
                self.timers.start_t3();
                self.next_rx_step = fcf::PRI_MPS;
                self.judge_page(true);
            }
            fcf::EOM => {
                self.env.on_phase_d(fcf::EOM);
                self.next_rx_step = fcf::EOM;
                // back to phase B for the renegotiation
                self.queue_phase(Phase::BTx);
                self.judge_page(false);
            }
            fcf::PRI_EOM => {
                self.env.on_phase_d(fcf::PRI_EOM);
                self.timers.start_t3();
                self.next_rx_step = fcf::PRI_EOM;
                self.judge_page(true);
            }
            fcf::EOP => {
                self.env.on_phase_d(fcf::EOP);
                self.next_rx_step = fcf::EOP;
                self.queue_phase(Phase::DTx);
                self.judge_final_page(false);
            }
            fcf::PRI_EOP => {
                self.env.on_phase_d(fcf::PRI_EOP);
                self.timers.start_t3();
                self.next_rx_step = fcf::PRI_EOP;
                self.judge_final_page(true);
            }
            fcf::DCN => {
                self.current_status = Status::DcnFaxRx;
                self.disconnect();
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => self.unexpected_final_frame(msg),
        }
    }

    /// Handles both the ECM document state and the post-document state;
    /// they differ only in how RCP is treated
    fn state_f_doc_ecm(&mut self, msg: &[u8]) {
        match msg[2] & FCF_MASK {
            fcf::DIS => self.process_rx_dis_dtc(msg),
            fcf::DCS => self.process_rx_dcs(msg),
            fcf::RCP => self.process_rx_rcp(msg),
            fcf::EOR => {
                if msg.len() != 4 {
                    self.unexpected_frame_length(msg);
                    return;
                }
                let fcf2 = msg[3] & FCF_MASK;
                info!("received EOR + {}", frame_name(msg[3]));
                match fcf2 {
                    fcf::NULL => {}
                    fcf::PRI_EOM | fcf::PRI_MPS | fcf::PRI_EOP | fcf::EOM | fcf::MPS
                    | fcf::EOP => {
                        self.next_rx_step = fcf2;
                        self.send_simple_frame(fcf::ERR);
                    }
                    _ => self.unexpected_final_frame(msg),
                }
            }
            fcf::PPS => self.process_rx_pps(msg),
            fcf::CTC => {
                self.send_simple_frame(fcf::CTR);
                // back to long training after a continue-to-correct
                self.short_train = false;
            }
            fcf::RR => {}
            fcf::DCN => {
                self.current_status = Status::DcnDataRx;
                self.disconnect();
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => self.unexpected_final_frame(msg),
        }
    }

    fn state_f_post_rcp_rnr(&mut self, msg: &[u8]) {
        match msg[2] & FCF_MASK {
            fcf::RR => {
                if self.receiver_not_ready_count > 0 {
                    self.receiver_not_ready_count -= 1;
                    self.queue_phase(Phase::DTx);
                    self.set_state(State::FPostRcpRnr);
                    self.send_simple_frame(fcf::RNR);
                } else {
                    self.send_deferred_pps_response();
                }
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => self.unexpected_final_frame(msg),
        }
    }

    fn state_r(&mut self, msg: &[u8]) {
        match msg[2] & FCF_MASK {
            fcf::DIS => self.process_rx_dis_dtc(msg),
            fcf::DCS => self.process_rx_dcs(msg),
            fcf::DCN => {
                // a DCN while waiting to be commanded
                self.current_status = Status::GotDcnTx;
                self.disconnect();
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => self.unexpected_final_frame(msg),
        }
    }

    fn state_t(&mut self, msg: &[u8]) {
        match msg[2] & FCF_MASK {
            fcf::DIS => self.process_rx_dis_dtc(msg),
            fcf::DCN => {
                self.current_status = Status::DcnWhyRx;
                self.disconnect();
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => {
                self.unexpected_final_frame(msg);
                self.current_status = Status::NoDisTx;
            }
        }
    }

    fn state_ii_q(&mut self, msg: &[u8]) {
        match msg[2] & FCF_MASK {
            fcf::MCF => match self.next_tx_step {
                fcf::MPS | fcf::PRI_MPS => {
                    self.retries = 0;
                    if let Some(doc) = self.tx_doc.as_mut() {
                        doc.end_page();
                    }
                    self.env.on_phase_d(fcf::MCF);
                    if self
                        .tx_doc
                        .as_mut()
                        .map(|doc| doc.start_page().is_err())
                        .unwrap_or(true)
                    {
                        warn!("cannot start the next page");
                        return;
                    }
                    self.set_state(State::I);
                    self.queue_phase(Phase::CNonEcmTx);
                }
                fcf::EOM | fcf::PRI_EOM => {
                    self.retries = 0;
                    self.end_tx_document();
                    self.set_state(State::R);
                }
                fcf::EOP | fcf::PRI_EOP => {
                    self.retries = 0;
                    self.end_tx_document();
                    self.send_dcn();
                }
                _ => {}
            },
            fcf::RTP => match self.next_tx_step {
                fcf::MPS | fcf::PRI_MPS => {
                    self.retries = 0;
                    self.env.on_phase_d(fcf::RTP);
                    // fresh training, then the next page
                    if let Some(doc) = self.tx_doc.as_mut() {
                        doc.end_page();
                        let _ = doc.start_page();
                    }
                    self.queue_phase(Phase::BTx);
                    self.restart_sending_document();
                }
                fcf::EOM | fcf::PRI_EOM => {
                    self.retries = 0;
                    self.env.on_phase_d(fcf::RTP);
                    self.set_state(State::R);
                }
                fcf::EOP | fcf::PRI_EOP => {
                    self.retries = 0;
                    self.env.on_phase_d(fcf::RTN);
                    self.current_status = Status::InvalRspTx;
                    self.send_dcn();
                }
                _ => {}
            },
            fcf::RTN => match self.next_tx_step {
                fcf::MPS | fcf::PRI_MPS => {
                    self.retries = 0;
                    self.env.on_phase_d(fcf::RTN);
                    // fresh training, then the same page again
                    self.queue_phase(Phase::BTx);
                    self.restart_sending_document();
                }
                fcf::EOM | fcf::PRI_EOM | fcf::EOP | fcf::PRI_EOP => {
                    self.retries = 0;
                    self.env.on_phase_d(fcf::RTN);
                    self.current_status = Status::InvalRspTx;
                    self.send_dcn();
                }
                _ => {}
            },
            fcf::PIP => {
                self.retries = 0;
                self.env.on_phase_d(fcf::PIP);
                self.timers.start_t3();
            }
            fcf::PIN => {
                self.retries = 0;
                self.env.on_phase_d(fcf::PIN);
                self.timers.start_t3();
            }
            fcf::DCN => {
                self.current_status = match self.next_tx_step {
                    fcf::MPS | fcf::PRI_MPS | fcf::EOM | fcf::PRI_EOM => Status::DcnPhdRx,
                    _ => Status::BadPgTx,
                };
                self.disconnect();
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => self.unexpected_final_frame(msg),
        }
    }

    /// III-Q after MCF or RTP: post-page commands mean the far end
    /// missed our verdict
    fn state_iii_q(&mut self, msg: &[u8], verdict: u8) {
        match msg[2] & FCF_MASK {
            fcf::MPS | fcf::EOM | fcf::EOP => {
                // looks like they didn't see our signal; repeat it
                self.send_simple_frame(verdict);
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => self.unexpected_final_frame(msg),
        }
    }

    fn state_iii_q_rtn(&mut self, msg: &[u8]) {
        match msg[2] & FCF_MASK {
            fcf::MPS | fcf::EOM | fcf::EOP => {
                self.send_simple_frame(fcf::RTN);
            }
            fcf::DCN => {
                self.current_status = Status::DcnNoRtnRx;
                self.disconnect();
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => self.unexpected_final_frame(msg),
        }
    }

    /// After PPS: MCF advances the block or page, PPR triggers the
    /// selective repeat, RNR stalls us
    fn state_iv_pps(&mut self, msg: &[u8]) {
        match msg[2] & FCF_MASK {
            fcf::MCF => {
                self.retries = 0;
                self.timers.stop_t5();
                // more of this page, or on to the next?
                if !self.ecm.at_page_end && self.fill_partial_page() > 0 {
                    info!("additional image data to send");
                    self.ecm.block += 1;
                    self.set_state(State::Iv);
                    self.queue_phase(Phase::CEcmTx);
                    self.send_first_ecm_frame();
                    return;
                }
                info!("moving on to the next page");
                match self.next_tx_step {
                    fcf::MPS | fcf::PRI_MPS => {
                        self.retries = 0;
                        if let Some(doc) = self.tx_doc.as_mut() {
                            doc.end_page();
                        }
                        self.env.on_phase_d(fcf::MCF);
                        if self
                            .tx_doc
                            .as_mut()
                            .map(|doc| doc.start_page().is_err())
                            .unwrap_or(true)
                        {
                            warn!("cannot start the next page");
                            return;
                        }
                        self.ecm.page += 1;
                        self.ecm.block = 0;
                        if self.fill_partial_page() > 0 {
                            self.set_state(State::Iv);
                            self.queue_phase(Phase::CEcmTx);
                            self.send_first_ecm_frame();
                        }
                    }
                    fcf::EOM | fcf::PRI_EOM => {
                        self.retries = 0;
                        self.end_tx_document();
                        self.set_state(State::R);
                    }
                    fcf::EOP | fcf::PRI_EOP => {
                        self.retries = 0;
                        self.end_tx_document();
                        self.send_dcn();
                    }
                    _ => {}
                }
            }
            fcf::PPR => self.process_rx_ppr(msg),
            fcf::RNR => {
                self.timers.start_t5_if_stopped();
                self.set_state(State::IvPpsRnr);
                self.queue_phase(Phase::DTx);
                self.send_simple_frame(fcf::RR);
            }
            fcf::PIP => {
                self.retries = 0;
                self.env.on_phase_d(fcf::PIP);
                self.timers.start_t3();
            }
            fcf::PIN => {
                self.retries = 0;
                self.env.on_phase_d(fcf::PIN);
                self.timers.start_t3();
            }
            fcf::DCN => {
                self.current_status = Status::BadPgTx;
                self.disconnect();
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => {
                self.unexpected_final_frame(msg);
                self.current_status = Status::EcmPhdTx;
            }
        }
    }

    fn state_iv_pps_rnr(&mut self, msg: &[u8]) {
        match msg[2] & FCF_MASK {
            fcf::MCF => {
                // the stall cleared; treat this like the PPS answer
                self.state_iv_pps(msg);
            }
            fcf::RNR => {
                self.timers.start_t5_if_stopped();
                self.set_state(State::IvPpsRnr);
                self.queue_phase(Phase::DTx);
                self.send_simple_frame(fcf::RR);
            }
            fcf::PIP => {
                self.retries = 0;
                self.env.on_phase_d(fcf::PIP);
                self.timers.start_t3();
            }
            fcf::PIN => {
                self.retries = 0;
                self.env.on_phase_d(fcf::PIN);
                self.timers.start_t3();
            }
            fcf::DCN => {
                self.current_status = Status::DcnRrdRx;
                self.disconnect();
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => self.unexpected_final_frame(msg),
        }
    }

    fn state_iv_ctc(&mut self, msg: &[u8]) {
        match msg[2] & FCF_MASK {
            fcf::CTR => {
                // back to long training, then resume the partial page
                self.short_train = false;
                self.set_state(State::Iv);
                self.queue_phase(Phase::CEcmTx);
                self.send_first_ecm_frame();
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => self.unexpected_final_frame(msg),
        }
    }

    fn state_iv_eor(&mut self, msg: &[u8], was_rnr: bool) {
        match msg[2] & FCF_MASK {
            fcf::RNR => {
                self.timers.start_t5_if_stopped();
                self.set_state(State::IvEorRnr);
                self.queue_phase(Phase::DTx);
                self.send_simple_frame(fcf::RR);
            }
            fcf::PIN => {
                self.retries = 0;
                self.env.on_phase_d(fcf::PIN);
                self.timers.start_t3();
            }
            fcf::ERR => {
                self.timers.stop_t5();
                self.send_dcn();
            }
            fcf::DCN if was_rnr => {
                self.current_status = Status::DcnRrdRx;
                self.disconnect();
            }
            fcf::CRP => self.repeat_last_command(),
            fcf::FNV => self.process_rx_fnv(msg),
            _ => self.unexpected_final_frame(msg),
        }
    }

    // -- shared pieces -----------------------------------------------------

    /// Field-not-valid: decoded for the log, then treated as unexpected
    pub(super) fn process_rx_fnv(&mut self, msg: &[u8]) {
        if msg.len() > 3 {
            let reasons = [
                (0x01, "incorrect password (PWD)"),
                (0x02, "selective polling reference (SEP) not known"),
                (0x04, "subaddress (SUB) not known"),
                (0x08, "sender identity (SID) not known"),
                (0x10, "secure fax error"),
                (0x20, "transmitting subscriber identity (TSI) not accepted"),
                (0x40, "polled subaddress (PSA) not known"),
            ];
            for (mask, text) in reasons {
                if (msg[3] & mask) != 0 {
                    info!("FNV: {}", text);
                }
            }
        }
        // we can decode it, but not usefully act on it
        self.unexpected_final_frame(msg);
    }

    pub(super) fn unexpected_frame(&mut self, msg: &[u8]) {
        info!(
            "unexpected {} received in state {:?}",
            frame_name(msg[2]),
            self.state
        );
        if matches!(self.state, State::FDocEcm | State::FDocNonEcm) {
            self.current_status = Status::InvalCmdRx;
        }
    }

    pub(super) fn unexpected_non_final_frame(&mut self, msg: &[u8]) {
        info!(
            "unexpected {} frame in state {:?}",
            frame_name(msg[2]),
            self.state
        );
        self.current_status = Status::Unexpected;
    }

    pub(super) fn unexpected_final_frame(&mut self, msg: &[u8]) {
        info!(
            "unexpected {} received in state {:?}",
            frame_name(msg[2]),
            self.state
        );
        self.current_status = Status::Unexpected;
        self.send_dcn();
    }

    pub(super) fn unexpected_frame_length(&mut self, msg: &[u8]) {
        info!(
            "unexpected {} frame length - {}",
            frame_name(msg[2]),
            msg.len()
        );
        self.current_status = Status::Unexpected;
        self.send_dcn();
    }

    /// Close out the transmit document and log the delivery
    fn end_tx_document(&mut self) {
        if let Some(mut doc) = self.tx_doc.take() {
            doc.end_page();
            self.env.on_phase_d(fcf::MCF);
            info!(
                "success - delivered {} pages",
                doc.stats().pages_transferred
            );
        }
    }
}
