//! Capability negotiation
//!
//! Building our DIS/DTC from local capability, building a DCS as the
//! intersection of local capability with the remote's DIS, and
//! interpreting the remote's DIS/DTC and DCS frames. The bit numbers
//! follow the T.30 tables; see [`crate::capabilities::bit`].

#[cfg(not(test))]
use log::{debug, info, warn};

#[cfg(test)]
use std::{println as debug, println as info, println as warn};

use crate::capabilities::{bit, CapabilityFrame};
use crate::document::{classify_width, SizeClass, XResolution, YResolution};
use crate::fallback::{
    self, FALLBACK_SEQUENCE, V17_FALLBACK_START, V27TER_FALLBACK_START, V29_FALLBACK_START,
};
use crate::frames::{fcf, frame_name};
use crate::status::Status;

use super::phase::Phase;
use super::states::State;
use super::{
    Compressions, IafMode, ImageSizes, ModemSupport, PollingFeatures, Resolutions, Session,
    SessionEnvironment,
};

/// Codes for the minimum scan line time field
mod min_scan {
    pub const MS_20: u8 = 0;
    pub const MS_5: u8 = 1;
    pub const MS_10: u8 = 2;
    pub const MS_40: u8 = 4;
    pub const MS_0: u8 = 7;
}

/// Minimum scan time code → milliseconds
const MIN_SCAN_TIMES_MS: [u32; 8] = [20, 5, 10, 0, 40, 0, 0, 0];

/// Reverse the bits of one octet, for the wire-order hex rendition of
/// a received DCS
fn bit_reverse8(x: u8) -> u8 {
    x.reverse_bits()
}

impl<E: SessionEnvironment> Session<E> {
    /// Build the skeleton DIS/DTC from the static local capabilities
    ///
    /// The dynamic bits (can receive, ready to poll) are edited in just
    /// before each transmission by [`refresh_dis_dtc`](Self::refresh_dis_dtc).
    pub(super) fn build_dis_or_dtc(&mut self) {
        let mut frame = CapabilityFrame::new(fcf::DIS | self.dis_received_bit());
        if self.iaf.contains(IafMode::T37) {
            frame.set_bit(bit::T37);
        }
        if self.iaf.contains(IafMode::T38) {
            frame.set_bit(bit::T38);
        }
        // with no modem bits set we are selecting V.27ter fallback at
        // 2400 bps
        if self.supported_modems.intersects(ModemSupport::V27TER) {
            frame.set_bit(bit::V27TER);
        }
        if self.supported_modems.intersects(ModemSupport::V29) {
            frame.set_bit(bit::V29);
        }
        // V.17 is only valid combined with V.29 and V.27ter, so V.17
        // forces the others
        if self.supported_modems.intersects(ModemSupport::V17) {
            frame.set_rate_code(0x2C);
        }
        if self.supported_resolutions.contains(Resolutions::FINE) {
            frame.set_bit(bit::FINE_RESOLUTION);
        }
        if self.supported_compressions.contains(Compressions::T4_2D) {
            frame.set_bit(bit::TWO_D_CODING);
        }
        // 215 mm is always supported
        if self.supported_image_sizes.contains(ImageSizes::WIDTH_303MM) {
            frame.set_bit(bit::WIDTH_303MM);
        } else if self.supported_image_sizes.contains(ImageSizes::WIDTH_255MM) {
            frame.set_bit(bit::WIDTH_255MM);
        }
        // A4 length is always supported
        if self
            .supported_image_sizes
            .contains(ImageSizes::LENGTH_UNLIMITED)
        {
            frame.set_bit(bit::LENGTH_UNLIMITED);
        } else if self.supported_image_sizes.contains(ImageSizes::LENGTH_B4) {
            frame.set_bit(bit::LENGTH_B4);
        }
        // no scan-line padding required
        frame.set_bits(min_scan::MS_0, bit::MIN_SCAN_TIME);
        if self
            .supported_compressions
            .contains(Compressions::UNCOMPRESSED)
        {
            frame.set_bit(bit::UNCOMPRESSED);
        }
        if self.ecm_allowed {
            frame.set_bit(bit::ECM);
            // only offer the fancy compressions along with the ECM
            // needed to carry them
            if self.supported_compressions.contains(Compressions::T6) {
                frame.set_bit(bit::T6_CODING);
            }
            if self.supported_compressions.contains(Compressions::T43) {
                frame.set_bit(bit::T43_CODING);
            }
            if self.supported_compressions.contains(Compressions::T85) {
                frame.set_bit(bit::T85_CODING);
            }
            if self.supported_compressions.contains(Compressions::T45) {
                frame.set_bit(bit::T45_CODING);
            }
        }
        if self.support_fnv {
            frame.set_bit(bit::FNV);
        }
        if self.supported_polling_features.contains(PollingFeatures::SEP) {
            frame.set_bit(bit::SEP);
        }
        if self.supported_polling_features.contains(PollingFeatures::PSA) {
            frame.set_bit(bit::PSA);
        }
        if self.supported_resolutions.contains(Resolutions::SUPERFINE) {
            frame.set_bit(bit::SUPERFINE_RESOLUTION);
        }
        if self.supported_resolutions.contains(Resolutions::RES_300_300) {
            frame.set_bit(bit::RES_300_300);
        }
        if self
            .supported_resolutions
            .contains(Resolutions::RES_400_400)
            || self.supported_resolutions.contains(Resolutions::R16)
        {
            frame.set_bit(bit::RES_400_400);
        }
        frame.set_bit(bit::METRIC_RESOLUTION);
        if self
            .supported_image_sizes
            .contains(ImageSizes::LENGTH_US_LETTER)
        {
            frame.set_bit(bit::LENGTH_US_LETTER);
        }
        if self
            .supported_image_sizes
            .contains(ImageSizes::LENGTH_US_LEGAL)
        {
            frame.set_bit(bit::LENGTH_US_LEGAL);
        }
        if self.supported_resolutions.contains(Resolutions::RES_600_600) {
            frame.set_bit(bit::RES_600_600);
        }
        if self
            .supported_resolutions
            .contains(Resolutions::RES_1200_1200)
        {
            frame.set_bit(bit::RES_1200_1200);
        }
        if self.supported_resolutions.contains(Resolutions::RES_300_600) {
            frame.set_bit(bit::RES_300_600);
        }
        if self.supported_resolutions.contains(Resolutions::RES_400_800) {
            frame.set_bit(bit::RES_400_800);
        }
        if self
            .supported_resolutions
            .contains(Resolutions::RES_600_1200)
        {
            frame.set_bit(bit::RES_600_1200);
        }
        if self.iaf.contains(IafMode::FLOW_CONTROL) {
            frame.set_bit(bit::IAF_FLOW_CONTROL);
        }
        if self.iaf.contains(IafMode::CONTINUOUS_FLOW) {
            frame.set_bit(bit::IAF_CONTINUOUS_FLOW);
        }
        self.dis_dtc_frame = frame;
    }

    /// Edit the dynamic bits of the prebuilt DIS/DTC
    ///
    /// Whether the frame goes out as DIS or DTC is decided by whether
    /// we have received a DIS.
    pub(super) fn refresh_dis_dtc(&mut self) {
        self.dis_dtc_frame.set_fcf(fcf::DIS | self.dis_received_bit());
        // receive capable iff we have somewhere to put a document
        if self.rx_file.is_empty() {
            self.dis_dtc_frame.clear_bit(bit::READY_TO_RECEIVE);
        } else {
            self.dis_dtc_frame.set_bit(bit::READY_TO_RECEIVE);
        }
        // ready to transmit (pollable) iff we have a document to send
        if self.tx_file.is_empty() {
            self.dis_dtc_frame.clear_bit(bit::READY_TO_TRANSMIT);
        } else {
            self.dis_dtc_frame.set_bit(bit::READY_TO_TRANSMIT);
        }
    }

    /// Choose the DCS minimum scan time code from the remote's DIS
    /// field and the page's vertical resolution
    fn set_min_scan_time_code(&mut self, remote: &CapabilityFrame) -> Result<(), Status> {
        // translation between what the other end needs and what we say
        // we will use; we need no minimum ourselves
        const TRANSLATE: [[u8; 8]; 3] = [
            // at standard vertical resolution
            [
                min_scan::MS_20,
                min_scan::MS_5,
                min_scan::MS_10,
                min_scan::MS_20,
                min_scan::MS_40,
                min_scan::MS_40,
                min_scan::MS_10,
                min_scan::MS_0,
            ],
            // at fine resolution
            [
                min_scan::MS_20,
                min_scan::MS_5,
                min_scan::MS_10,
                min_scan::MS_10,
                min_scan::MS_40,
                min_scan::MS_20,
                min_scan::MS_5,
                min_scan::MS_0,
            ],
            // at superfine, when half the fine time is selected
            [
                min_scan::MS_10,
                min_scan::MS_5,
                min_scan::MS_5,
                min_scan::MS_5,
                min_scan::MS_20,
                min_scan::MS_10,
                min_scan::MS_5,
                min_scan::MS_0,
            ],
        ];

        let field = usize::from(
            if self.iaf.contains(IafMode::NO_FILL_BITS) || remote.len() <= 5 {
                min_scan::MS_0
            } else {
                remote.min_scan_code()
            },
        );
        match self.y_resolution {
            YResolution::Superfine => {
                if remote.len() > 8 && remote.bit(bit::SUPERFINE_RESOLUTION) {
                    let half_fine = remote.bit(46);
                    self.min_scan_time_code = TRANSLATE[if half_fine { 2 } else { 1 }][field];
                    Ok(())
                } else {
                    warn!("remote fax does not support super-fine resolution");
                    Err(Status::ResolutionNotSupported)
                }
            }
            YResolution::Fine => {
                if remote.len() > 4 && remote.bit(bit::FINE_RESOLUTION) {
                    self.min_scan_time_code = TRANSLATE[1][field];
                    Ok(())
                } else {
                    warn!("remote fax does not support fine resolution");
                    Err(Status::ResolutionNotSupported)
                }
            }
            _ => {
                self.min_scan_time_code = TRANSLATE[0][field];
                Ok(())
            }
        }
    }

    /// Negotiate a DCS from local capability and the remote's DIS/DTC
    pub(super) fn build_dcs(&mut self, remote: &CapabilityFrame) -> Result<(), Status> {
        let mut frame = CapabilityFrame::new(fcf::DCS | self.dis_received_bit());
        frame.set_rate_code(FALLBACK_SEQUENCE[self.current_fallback].dcs_code);

        // compression, and the matching minimum scan line time
        match self.line_encoding {
            crate::document::Encoding::T6 => {
                frame.set_bit(bit::T6_CODING);
                frame.set_bits(min_scan::MS_0, bit::MIN_SCAN_TIME);
            }
            crate::document::Encoding::T4TwoD => {
                frame.set_bit(bit::TWO_D_CODING);
                frame.set_bits(self.min_scan_time_code & 0x7, bit::MIN_SCAN_TIME);
            }
            crate::document::Encoding::T4OneD => {
                frame.set_bits(self.min_scan_time_code & 0x7, bit::MIN_SCAN_TIME);
            }
        }
        // we have a file to send, so tell the far end to receive
        frame.set_bit(bit::READY_TO_RECEIVE);

        // the resolution pairing must map to exactly one DCS bit
        let res_bit = match (self.y_resolution, self.x_resolution) {
            (YResolution::Y1200, XResolution::X600) => {
                self.require_resolution(Resolutions::RES_600_1200, Some(bit::RES_600_1200))?
            }
            (YResolution::Y1200, XResolution::X1200) => {
                self.require_resolution(Resolutions::RES_1200_1200, Some(bit::RES_1200_1200))?
            }
            (YResolution::Y800, XResolution::R16) => {
                self.require_resolution(Resolutions::RES_400_800, Some(bit::RES_400_800))?
            }
            (YResolution::Y600, XResolution::X300) => {
                self.require_resolution(Resolutions::RES_300_600, Some(bit::RES_300_600))?
            }
            (YResolution::Y600, XResolution::X600) => {
                self.require_resolution(Resolutions::RES_600_600, Some(bit::RES_600_600))?
            }
            (YResolution::Superfine, XResolution::R8) => {
                self.require_resolution(Resolutions::SUPERFINE, Some(bit::SUPERFINE_RESOLUTION))?
            }
            (YResolution::Superfine, XResolution::R16) => {
                self.require_resolution(Resolutions::SUPERFINE, Some(bit::RES_400_400))?
            }
            (YResolution::Y300, XResolution::X300) => {
                self.require_resolution(Resolutions::RES_300_300, Some(bit::RES_300_300))?
            }
            (YResolution::Fine, XResolution::R8) => {
                self.require_resolution(Resolutions::FINE, Some(bit::FINE_RESOLUTION))?
            }
            (YResolution::Standard, XResolution::R8) => None,
            _ => {
                warn!(
                    "image resolution ({:?} x {:?}) not acceptable",
                    self.x_resolution, self.y_resolution
                );
                return Err(Status::ResolutionNotSupported);
            }
        };
        if let Some(n) = res_bit {
            frame.set_bit(n);
        }

        // image width: the X resolution falls in line with any valid
        // width
        match classify_width(self.image_width) {
            Some(SizeClass::A4) => {}
            Some(SizeClass::B4) => {
                if remote.width_code() < 1 {
                    return Err(Status::SizeNotSupported);
                } else if !self.supported_image_sizes.contains(ImageSizes::WIDTH_255MM) {
                    return Err(Status::BadTiffHdr);
                }
                frame.set_bit(bit::WIDTH_255MM);
            }
            Some(SizeClass::A3) => {
                if remote.width_code() < 2 {
                    return Err(Status::SizeNotSupported);
                } else if !self.supported_image_sizes.contains(ImageSizes::WIDTH_303MM) {
                    return Err(Status::BadTiffHdr);
                }
                frame.set_bit(bit::WIDTH_303MM);
            }
            None => {
                warn!(
                    "image width ({} pels) not a valid fax image width",
                    self.image_width
                );
                return Err(Status::BadTiffHdr);
            }
        }
        // the remote must take this width at this X resolution
        let width_ok = match self.x_resolution {
            XResolution::R8 => true,
            XResolution::X300 => remote.bit(bit::RES_300_300) || remote.bit(bit::RES_300_600),
            XResolution::R16 => remote.bit(bit::RES_400_400),
            XResolution::X600 => remote.bit(bit::RES_600_600) || remote.bit(bit::RES_600_1200),
            XResolution::X1200 => remote.bit(bit::RES_1200_1200),
            XResolution::R4 => false,
        };
        if !width_ok {
            warn!(
                "remote cannot take width {} at {:?}",
                self.image_width, self.x_resolution
            );
            return Err(Status::SizeNotSupported);
        }

        // recording length: prefer unlimited, then B4
        if remote.bit(bit::LENGTH_UNLIMITED) {
            frame.set_bit(bit::LENGTH_UNLIMITED);
        } else if remote.bit(bit::LENGTH_B4) {
            frame.set_bit(bit::LENGTH_B4);
        }

        if self.error_correcting_mode {
            frame.set_bit(bit::ECM);
        }
        if self.iaf.contains(IafMode::FLOW_CONTROL) && remote.bit(bit::IAF_FLOW_CONTROL) {
            frame.set_bit(bit::IAF_FLOW_CONTROL);
        }
        if self.iaf.contains(IafMode::CONTINUOUS_FLOW) && remote.bit(bit::IAF_CONTINUOUS_FLOW) {
            frame.set_bit(bit::IAF_CONTINUOUS_FLOW);
        }
        self.dcs_frame = frame;
        Ok(())
    }

    /// Capability gate for one resolution pairing
    fn require_resolution(
        &self,
        needed: Resolutions,
        dcs_bit: Option<u16>,
    ) -> Result<Option<u16>, Status> {
        if self.supported_resolutions.contains(needed) {
            Ok(dcs_bit)
        } else {
            Err(Status::ResolutionNotSupported)
        }
    }

    /// Interpret a received DIS or DTC and respond to it
    pub(super) fn process_rx_dis_dtc(&mut self, msg: &[u8]) {
        debug!("remote capabilities: {:02X?}", &msg[3..]);
        let remote = match CapabilityFrame::from_frame(msg) {
            Some(remote) => remote,
            None => {
                warn!("short DIS/DTC frame");
                return;
            }
        };
        if msg[2] == fcf::DIS {
            self.dis_received = true;
        }
        self.error_correcting_mode = self.ecm_allowed && remote.bit(bit::ECM);
        // 256 octets per ECM frame; 64 is never used in the real world
        self.octets_per_ecm_frame = 256;
        // select the compression to use
        self.line_encoding = if self.error_correcting_mode
            && self.supported_compressions.contains(Compressions::T6)
            && remote.bit(bit::T6_CODING)
        {
            crate::document::Encoding::T6
        } else if self.supported_compressions.contains(Compressions::T4_2D)
            && remote.bit(bit::TWO_D_CODING)
        {
            crate::document::Encoding::T4TwoD
        } else {
            crate::document::Encoding::T4OneD
        };
        info!("selected compression {:?}", self.line_encoding);

        if !self.select_fallback_start(remote.rate_code()) {
            warn!("remote does not support a compatible modem");
            self.current_status = Status::Incompatible;
            return;
        }

        self.env.on_phase_b(msg[2]);
        self.queue_phase(Phase::BTx);

        // try to send something...
        if !self.tx_file.is_empty() {
            info!("trying to send file '{}'", self.tx_file);
            if !remote.bit(bit::READY_TO_RECEIVE) {
                info!("{} far end cannot receive", frame_name(msg[2]));
                self.current_status = Status::RxIncapable;
                self.send_dcn();
                return;
            }
            if self.start_sending_document(&remote).is_err() {
                self.send_dcn();
                return;
            }
            if let Err(status) = self.build_dcs(&remote) {
                info!("the far end is incompatible");
                self.current_status = status;
                self.send_dcn();
                return;
            }
            self.retries = 0;
            self.send_dcs_sequence();
            return;
        }
        info!("{} nothing to send", frame_name(msg[2]));
        // ...then try to receive something
        if !self.rx_file.is_empty() {
            info!("trying to receive file '{}'", self.rx_file);
            if !remote.bit(bit::READY_TO_TRANSMIT) {
                info!("{} far end cannot transmit", frame_name(msg[2]));
                self.current_status = Status::TxIncapable;
                self.send_dcn();
                return;
            }
            // poll the far end with a DTC
            self.dis_received = true;
            self.ecm.page = 0;
            self.ecm.block = 0;
            self.retries = 0;
            self.send_dis_or_dtc_sequence();
            return;
        }
        info!("{} nothing to receive", frame_name(msg[2]));
        // nothing to do, or nothing we are able to do
        self.send_dcn();
    }

    /// Choose the fallback starting point the remote's rate field
    /// allows, constrained by our own modems
    fn select_fallback_start(&mut self, rate_code: u8) -> bool {
        if rate_code == 0x2C && self.supported_modems.intersects(ModemSupport::V17) {
            self.current_permitted_modems =
                ModemSupport::V17 | ModemSupport::V29 | ModemSupport::V27TER;
            self.current_fallback = V17_FALLBACK_START;
            return true;
        }
        if matches!(rate_code, 0x2C | 0x0C) && self.supported_modems.intersects(ModemSupport::V29)
        {
            self.current_permitted_modems = ModemSupport::V29 | ModemSupport::V27TER;
            self.current_fallback = V29_FALLBACK_START;
            return true;
        }
        match rate_code {
            0x2C | 0x0C | 0x08 => {
                self.current_permitted_modems = ModemSupport::V27TER;
                self.current_fallback = V27TER_FALLBACK_START;
                true
            }
            0x00 => {
                self.current_permitted_modems = ModemSupport::V27TER;
                self.current_fallback = V27TER_FALLBACK_START + 1;
                true
            }
            0x04 if self.supported_modems.intersects(ModemSupport::V29) => {
                self.current_permitted_modems = ModemSupport::V29;
                self.current_fallback = V29_FALLBACK_START;
                true
            }
            _ => false,
        }
    }

    /// Interpret a received DCS and prepare to receive the document
    pub(super) fn process_rx_dcs(&mut self, msg: &[u8]) {
        debug!("remote DCS: {:02X?}", &msg[3..]);
        let remote = match CapabilityFrame::from_frame(msg) {
            Some(remote) => remote,
            None => {
                warn!("short DCS frame");
                return;
            }
        };

        // wire-order hex rendition of the DCS content, recorded in the
        // received file
        self.rx_dcs_hex = msg[3..]
            .iter()
            .map(|&octet| format!("{:02X}", bit_reverse8(octet)))
            .collect::<Vec<_>>()
            .join(" ");

        self.octets_per_ecm_frame = if remote.bit(bit::FRAME_SIZE) { 256 } else { 64 };

        self.x_resolution = if remote.bit(bit::RES_1200_1200) {
            XResolution::X1200
        } else if remote.bit(bit::RES_600_600) || remote.bit(bit::RES_600_1200) {
            XResolution::X600
        } else if remote.bit(bit::RES_400_400) || remote.bit(bit::RES_400_800) {
            XResolution::R16
        } else if remote.bit(bit::RES_300_300) || remote.bit(bit::RES_300_600) {
            XResolution::X300
        } else {
            XResolution::R8
        };

        self.y_resolution = if remote.bit(bit::RES_1200_1200) || remote.bit(bit::RES_600_1200) {
            YResolution::Y1200
        } else if remote.bit(bit::RES_400_800) {
            YResolution::Y800
        } else if remote.bit(bit::RES_600_600) || remote.bit(bit::RES_300_600) {
            YResolution::Y600
        } else if remote.bit(bit::SUPERFINE_RESOLUTION) || remote.bit(bit::RES_400_400) {
            YResolution::Superfine
        } else if remote.bit(bit::RES_300_300) {
            YResolution::Y300
        } else if remote.bit(bit::FINE_RESOLUTION) {
            YResolution::Fine
        } else {
            YResolution::Standard
        };

        self.image_width = match remote.width_code() {
            0 => crate::document::width_pels(self.x_resolution, SizeClass::A4),
            1 => crate::document::width_pels(self.x_resolution, SizeClass::B4),
            2 => crate::document::width_pels(self.x_resolution, SizeClass::A3),
            _ => {
                warn!("invalid width code in DCS");
                0
            }
        };

        self.line_encoding = if remote.bit(bit::T6_CODING) {
            crate::document::Encoding::T6
        } else if remote.bit(bit::TWO_D_CODING) {
            crate::document::Encoding::T4TwoD
        } else {
            crate::document::Encoding::T4OneD
        };
        info!("selected compression {:?}", self.line_encoding);
        if !remote.bit(bit::READY_TO_RECEIVE) {
            info!("remote cannot receive");
        }

        self.current_fallback = match fallback::find_by_dcs_code(remote.rate_code()) {
            Some(index) => index,
            None => {
                warn!("remote asked for a modem standard we do not support");
                self.current_status = Status::Incompatible;
                return;
            }
        };
        self.error_correcting_mode = remote.bit(bit::ECM);

        self.env.on_phase_b(fcf::DCS);
        // start document reception
        info!(
            "get document at {} bps, modem {:?}",
            FALLBACK_SEQUENCE[self.current_fallback].bit_rate,
            FALLBACK_SEQUENCE[self.current_fallback].modem_type
        );
        if self.rx_file.is_empty() {
            info!("no document to receive");
            self.current_status = Status::FileError;
            self.send_dcn();
            return;
        }
        if !self.in_message {
            let rx_file = self.rx_file.clone();
            match self
                .env
                .open_rx_document(&rx_file, self.output_encoding, self.rx_stop_page)
            {
                Ok(doc) => self.rx_doc = Some(doc),
                Err(err) => {
                    warn!("cannot open target file '{}': {}", self.rx_file, err);
                    self.current_status = Status::FileError;
                    self.send_dcn();
                    return;
                }
            }
        }
        if !self.iaf.contains(IafMode::NO_TCF) {
            self.set_state(State::FTcf);
            self.set_phase(Phase::CNonEcmRx);
        }
    }

    /// Open the transmit document and prepare the first page
    pub(super) fn start_sending_document(&mut self, remote: &CapabilityFrame) -> Result<(), ()> {
        if self.tx_file.is_empty() {
            info!("no document to send");
            return Err(());
        }
        info!("start sending document");
        let tx_file = self.tx_file.clone();
        let mut doc = match self
            .env
            .open_tx_document(&tx_file, self.tx_start_page, self.tx_stop_page)
        {
            Ok(doc) => doc,
            Err(err) => {
                warn!("cannot open source file '{}': {}", self.tx_file, err);
                self.current_status = Status::FileError;
                return Err(());
            }
        };
        doc.set_header_info(&self.header_info);
        self.x_resolution = doc.x_resolution();
        self.y_resolution = doc.y_resolution();
        // the minimum scan time cannot be evaluated until the Y
        // resolution is known, and must be known before the minimum
        // row bits
        if let Err(status) = self.set_min_scan_time_code(remote) {
            self.current_status = status;
            return Err(());
        }
        let min_row_bits = FALLBACK_SEQUENCE[self.current_fallback].bit_rate
            * MIN_SCAN_TIMES_MS[usize::from(self.min_scan_time_code)]
            / 1000;
        info!("minimum bits per row will be {}", min_row_bits);
        doc.set_min_row_bits(self.forced_min_row_bits.unwrap_or(min_row_bits));

        if doc.start_page().is_err() {
            return Err(());
        }
        self.image_width = doc.image_width();
        self.tx_doc = Some(doc);
        self.ecm.page = 0;
        self.ecm.block = 0;
        if self.error_correcting_mode && self.fill_partial_page() == 0 {
            warn!("no image data to send");
        }
        Ok(())
    }

    /// Rewind the page and renegotiate with a fresh DCS
    pub(super) fn restart_sending_document(&mut self) {
        if let Some(doc) = self.tx_doc.as_mut() {
            doc.restart_page();
        }
        self.retries = 0;
        self.ecm.block = 0;
        self.send_dcs_sequence();
    }

    /// (Re)announce our DIS and wait to be commanded
    ///
    /// Also the T2 recovery path: when command/response sync is lost,
    /// the receiver re-identifies itself.
    pub(super) fn start_receiving_document(&mut self) -> Result<(), ()> {
        if self.rx_file.is_empty() {
            info!("no document to receive");
            return Err(());
        }
        info!("start receiving document");
        self.queue_phase(Phase::BTx);
        self.dis_received = false;
        self.ecm.page = 0;
        self.ecm.block = 0;
        self.send_dis_or_dtc_sequence();
        Ok(())
    }
}
