//! Interfaces to the T.4 image codec
//!
//! The image codec (and the TIFF storage behind it) is an external
//! collaborator. The session only needs a source of encoded page data on
//! the transmit side and a sink on the receive side, plus enough
//! geometry to negotiate with. The environment constructs concrete
//! implementations when a document is opened.

use thiserror::Error;

/// Failure opening or paging through a document
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum DocumentError {
    /// The file cannot be opened
    #[error("document file cannot be opened")]
    Open,
    /// The TIFF header fields are unusable
    #[error("bad TIFF/F header - incorrect values in fields")]
    BadHeader,
    /// A required TIFF tag carries an unusable value
    #[error("incorrect values for TIFF/F tags")]
    BadTag,
    /// The requested page does not exist
    #[error("document page not found")]
    NoPage,
}

/// Line encoding for page data
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// T.4 one-dimensional (MH)
    T4OneD,
    /// T.4 two-dimensional (MR)
    T4TwoD,
    /// T.6 (MMR); only valid under ECM
    T6,
}

/// Horizontal resolution classes from the T.4 tables
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XResolution {
    /// R4: 4016 pels/metre (no longer negotiable, kept for width lookup)
    R4,
    /// R8: 8031 pels/metre
    R8,
    /// 300 pels/25.4 mm: 11811 pels/metre
    X300,
    /// R16: 16063 pels/metre
    R16,
    /// 600 pels/25.4 mm: 23622 pels/metre
    X600,
    /// 1200 pels/25.4 mm: 47244 pels/metre
    X1200,
}

impl XResolution {
    /// Pels per metre
    pub fn per_metre(&self) -> u32 {
        match self {
            XResolution::R4 => 4016,
            XResolution::R8 => 8031,
            XResolution::X300 => 11811,
            XResolution::R16 => 16063,
            XResolution::X600 => 23622,
            XResolution::X1200 => 47244,
        }
    }
}

/// Vertical resolution classes from the T.4 tables
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum YResolution {
    /// 3.85 lines/mm
    Standard,
    /// 7.7 lines/mm
    Fine,
    /// 300 lines/25.4 mm
    Y300,
    /// 15.4 lines/mm
    Superfine,
    /// 600 lines/25.4 mm
    Y600,
    /// 800 lines/25.4 mm
    Y800,
    /// 1200 lines/25.4 mm
    Y1200,
}

impl YResolution {
    /// Lines per metre
    pub fn per_metre(&self) -> u32 {
        match self {
            YResolution::Standard => 3850,
            YResolution::Fine => 7700,
            YResolution::Y300 => 11811,
            YResolution::Superfine => 15400,
            YResolution::Y600 => 23622,
            YResolution::Y800 => 31496,
            YResolution::Y1200 => 47244,
        }
    }
}

/// Paper width classes a scan line can span
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeClass {
    /// 215 mm (A4)
    A4,
    /// 255 mm (B4)
    B4,
    /// 303 mm (A3)
    A3,
}

/// Scan line length in pels for a resolution/paper pairing
pub fn width_pels(x: XResolution, size: SizeClass) -> u32 {
    let row = match x {
        XResolution::R4 => [864, 1024, 1216],
        XResolution::R8 => [1728, 2048, 2432],
        XResolution::X300 => [2592, 3072, 3648],
        XResolution::R16 => [3456, 4096, 4864],
        XResolution::X600 => [5184, 6144, 7296],
        XResolution::X1200 => [10368, 12288, 14592],
    };
    match size {
        SizeClass::A4 => row[0],
        SizeClass::B4 => row[1],
        SizeClass::A3 => row[2],
    }
}

/// Recover the paper class from a pel count, at any resolution
///
/// R4 widths are excluded: recent versions of T.30 no longer admit them.
pub fn classify_width(width: u32) -> Option<SizeClass> {
    for x in [
        XResolution::R8,
        XResolution::X300,
        XResolution::R16,
        XResolution::X600,
        XResolution::X1200,
    ] {
        for size in [SizeClass::A4, SizeClass::B4, SizeClass::A3] {
            if width_pels(x, size) == width {
                return Some(size);
            }
        }
    }
    None
}

/// Per-page configuration handed to the receive codec before a page
/// starts
#[derive(Clone, Debug, Default)]
pub struct PageSetup {
    pub image_width: u32,
    pub encoding: Option<Encoding>,
    pub x_resolution: u32,
    pub y_resolution: u32,
    /// Far terminal's station ident, for the page header
    pub remote_ident: String,
    /// Far terminal's subaddress
    pub remote_sub_address: String,
    /// ASCII hex rendition of the DCS that set this page up
    pub dcs_hex: String,
}

/// Transfer statistics from either side of the codec
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub pages_transferred: u32,
    pub pages_in_file: u32,
    /// Image width in pels
    pub width: u32,
    /// Image length in rows
    pub length: u32,
    pub bad_rows: u32,
    pub longest_bad_row_run: u32,
    pub x_resolution: u32,
    pub y_resolution: u32,
    pub image_size: u32,
}

/// Source of encoded page data for transmission
pub trait TxDocument {
    /// Prepare the next page for reading
    fn start_page(&mut self) -> Result<(), DocumentError>;

    /// Rewind the current page so it can be sent again
    fn restart_page(&mut self);

    /// Finish the current page
    fn end_page(&mut self);

    /// True if at least one page follows the current one
    fn more_pages(&self) -> bool;

    /// Next bit of page data, or `None` at the end of the page
    fn get_bit(&mut self) -> Option<u8>;

    /// Fill `buf` with page data; a return below `buf.len()` marks the
    /// end of the page
    fn get_chunk(&mut self, buf: &mut [u8]) -> usize;

    /// True if the encoder has no further data for the current page
    fn at_end_of_page(&self) -> bool;

    /// Width of the current page in pels
    fn image_width(&self) -> u32;

    fn x_resolution(&self) -> XResolution;

    fn y_resolution(&self) -> YResolution;

    /// Tell the encoder the minimum bits per row the pairing requires
    fn set_min_row_bits(&mut self, bits: u32);

    /// Header text to print across the top of each transmitted page
    fn set_header_info(&mut self, info: &str) {
        let _ = info;
    }

    fn stats(&self) -> TransferStats;
}

/// Sink for received page data
pub trait RxDocument {
    /// Configure the decoder for the page about to start
    fn configure_page(&mut self, setup: &PageSetup);

    /// Begin a page
    fn start_page(&mut self);

    /// Feed one bit; returns true when the decoder sees the end of the
    /// page
    fn put_bit(&mut self, bit: u8) -> bool;

    /// Feed a chunk; returns true when the decoder sees the end of the
    /// page
    fn put_chunk(&mut self, buf: &[u8]) -> bool;

    /// Close out the current page
    fn end_page(&mut self);

    fn stats(&self) -> TransferStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_matrix() {
        assert_eq!(1728, width_pels(XResolution::R8, SizeClass::A4));
        assert_eq!(2048, width_pels(XResolution::R8, SizeClass::B4));
        assert_eq!(2432, width_pels(XResolution::R8, SizeClass::A3));
        assert_eq!(3456, width_pels(XResolution::R16, SizeClass::A4));
        assert_eq!(14592, width_pels(XResolution::X1200, SizeClass::A3));
    }

    #[test]
    fn test_classify_width() {
        assert_eq!(Some(SizeClass::A4), classify_width(1728));
        assert_eq!(Some(SizeClass::B4), classify_width(2048));
        assert_eq!(Some(SizeClass::A3), classify_width(2432));
        assert_eq!(Some(SizeClass::A4), classify_width(5184));
        // R4 widths no longer negotiable
        assert_eq!(None, classify_width(864));
        assert_eq!(None, classify_width(1729));
    }

    #[test]
    fn test_resolutions() {
        assert_eq!(8031, XResolution::R8.per_metre());
        assert_eq!(3850, YResolution::Standard.per_metre());
        assert_eq!(15400, YResolution::Superfine.per_metre());
    }
}
