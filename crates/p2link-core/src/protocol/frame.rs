//! Frame encoding/decoding
//!
//! Implements the binary frame format spoken by P2 furnace controllers.
//!
//! Frame format:
//! - 2 bytes: Header (command identifier, e.g. `M1` = `0x4D 0x31`)
//! - 1 byte: Data size
//! - N bytes: Data
//! - 2 bytes: Checksum (big-endian) = (size + Σheader + Σdata) mod 65536
//! - 1 byte: Frame end (0x0D), outbound only, appended by the transport
//!
//! Every field can be read back in four representations, see [`Format`].

use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use tracing::warn;

use super::{CommunicationError, ErrorCode, FrameError, HEADER_LEN};

/// A value handed to one of the [`Frame`] setters.
///
/// The caller states which representation it holds; setters reject the ones
/// that make no sense for their field with [`FrameError::TypeMismatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repr {
    /// A plain unsigned integer
    Integer(u64),
    /// Bytes exactly as they travel on the wire
    RawBytes(Vec<u8>),
    /// Uppercase or lowercase hex text, two digits per byte
    HexDigits(String),
    /// One integer per byte
    IntegerList(Vec<u8>),
}

impl Repr {
    /// Hex text representation
    pub fn hex(digits: impl Into<String>) -> Self {
        Repr::HexDigits(digits.into())
    }

    fn kind(&self) -> &'static str {
        match self {
            Repr::Integer(_) => "integer",
            Repr::RawBytes(_) => "raw bytes",
            Repr::HexDigits(_) => "hex digits",
            Repr::IntegerList(_) => "integer list",
        }
    }
}

impl From<&[u8]> for Repr {
    fn from(bytes: &[u8]) -> Self {
        Repr::RawBytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Repr {
    fn from(bytes: Vec<u8>) -> Self {
        Repr::RawBytes(bytes)
    }
}

impl<const N: usize> From<[u8; N]> for Repr {
    fn from(bytes: [u8; N]) -> Self {
        Repr::IntegerList(bytes.to_vec())
    }
}

/// Output representation selector for the frame accessors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Single integer (big-endian for multi-byte fields)
    Integer,
    /// Raw wire bytes
    RawBytes,
    /// Uppercase hex text without separators
    HexDigits,
    /// One integer per byte
    IntegerList,
}

/// A field value returned by the frame accessors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameValue {
    /// Integer form
    Integer(u64),
    /// Raw byte form
    RawBytes(Vec<u8>),
    /// Hex text form
    HexDigits(String),
    /// Integer list form
    IntegerList(Vec<u8>),
}

impl FrameValue {
    /// The bytes behind a byte-like value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FrameValue::RawBytes(b) | FrameValue::IntegerList(b) => Some(b),
            _ => None,
        }
    }

    /// The integer behind an integer value
    pub fn as_integer(&self) -> Option<u64> {
        match self {
            FrameValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// The text behind a hex value
    pub fn as_hex(&self) -> Option<&str> {
        match self {
            FrameValue::HexDigits(s) => Some(s),
            _ => None,
        }
    }
}

/// One protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: Option<Vec<u8>>,
    data_size: Option<u8>,
    data: Option<Vec<u8>>,
    checksum: Option<u16>,
    valid: bool,
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl Frame {
    /// Create an empty frame
    pub fn new() -> Self {
        Self {
            header: None,
            data_size: None,
            data: None,
            checksum: None,
            valid: true,
        }
    }

    /// Build a ready-to-send frame from a header and payload.
    ///
    /// Payloads longer than 255 bytes do not fit the size byte.
    pub fn prepared(header: [u8; 2], data: &[u8]) -> Result<Self, FrameError> {
        let size = u8::try_from(data.len()).map_err(|_| FrameError::ValueOutOfRange {
            field: "data length",
            value: data.len() as u64,
        })?;
        let mut frame = Self::new();
        frame.header = Some(header.to_vec());
        frame.data_size = Some(size);
        frame.data = Some(data.to_vec());
        frame.checksum = Some(frame.compute_checksum());
        Ok(frame)
    }

    /// Decode a frame from the bytes of one reply.
    ///
    /// Truncation at any field boundary is reported with the matching
    /// [`ErrorCode`] and the fields parsed so far. A checksum mismatch is not
    /// an error here: the frame comes back flagged invalid.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CommunicationError> {
        let mut frame = Self::new();

        let header_end = bytes.len().min(HEADER_LEN);
        frame.assign_header(bytes[..header_end].to_vec());
        if bytes.len() <= HEADER_LEN || !frame.valid {
            frame.valid = false;
            return Err(CommunicationError::new(ErrorCode::Header, Some(frame)));
        }

        let size = bytes[HEADER_LEN];
        frame.data_size = Some(size);
        let body = &bytes[HEADER_LEN + 1..];
        if body.is_empty() {
            frame.valid = false;
            return Err(CommunicationError::new(ErrorCode::DataSize, Some(frame)));
        }

        let size = size as usize;
        if body.len() < size {
            frame.data = Some(body.to_vec());
            frame.valid = false;
            return Err(CommunicationError::new(ErrorCode::Data, Some(frame)));
        }
        if body.len() < size + 2 {
            frame.data = Some(body[..size].to_vec());
            frame.valid = false;
            return Err(CommunicationError::new(ErrorCode::ChecksumRecv, Some(frame)));
        }

        // Trailing bytes end up in the data slice and break the size check
        let (data, checksum) = body.split_at(body.len() - 2);
        if !frame.assign_data(data.to_vec(), true) {
            return Err(CommunicationError::new(ErrorCode::Data, Some(frame)));
        }

        frame.verify_checksum(BigEndian::read_u16(checksum));
        Ok(frame)
    }

    fn assign_header(&mut self, bytes: Vec<u8>) -> bool {
        if bytes.len() != HEADER_LEN {
            self.valid = false;
        }
        self.header = Some(bytes);
        self.valid
    }

    fn assign_data(&mut self, bytes: Vec<u8>, verify: bool) -> bool {
        let len = bytes.len();
        match self.data_size {
            Some(size) if verify => {
                if size as usize != len {
                    self.valid = false;
                }
            }
            _ => self.data_size = Some(len.min(u8::MAX as usize) as u8),
        }
        if len > u8::MAX as usize {
            self.valid = false;
        }
        self.data = Some(bytes);
        self.valid
    }

    fn verify_checksum(&mut self, checksum: u16) -> bool {
        self.checksum = Some(checksum);
        if !self.check() {
            self.valid = false;
            warn!(
                frame = %self.to_hex(),
                expected = format_args!("{:04X}", self.compute_checksum()),
                "invalid checksum"
            );
        }
        self.valid
    }

    /// Set the header (command identifier).
    ///
    /// Returns the validity flag: a header that is not exactly 2 bytes long
    /// marks the frame invalid.
    pub fn set_header(&mut self, header: Repr) -> Result<bool, FrameError> {
        let bytes = bytes_of("header", header)?;
        Ok(self.assign_header(bytes))
    }

    /// Set the data size byte.
    ///
    /// With `verify`, fails when data is already present with another length.
    pub fn set_data_size(&mut self, size: Repr, verify: bool) -> Result<bool, FrameError> {
        let size = match size {
            Repr::RawBytes(bytes) => bytes.first().copied(),
            Repr::Integer(value) => Some(u8::try_from(value).map_err(|_| {
                FrameError::ValueOutOfRange {
                    field: "data size",
                    value,
                }
            })?),
            other => {
                return Err(FrameError::TypeMismatch {
                    field: "data size",
                    got: other.kind(),
                })
            }
        };

        let Some(size) = size else {
            self.data_size = None;
            self.valid = false;
            return Ok(false);
        };

        if verify {
            if let Some(data) = &self.data {
                if data.len() != size as usize {
                    return Err(FrameError::SizeMismatch {
                        declared: size,
                        actual: data.len(),
                    });
                }
            }
        }

        self.data_size = Some(size);
        Ok(self.valid)
    }

    /// Set the payload.
    ///
    /// The size is derived from the payload when it was not set yet, or
    /// always when `verify` is false. With `verify` and a size that disagrees
    /// with the payload, the frame is marked invalid.
    pub fn set_data(&mut self, data: Repr, verify: bool) -> Result<bool, FrameError> {
        let bytes = bytes_of("data", data)?;
        if bytes.len() > u8::MAX as usize {
            return Err(FrameError::ValueOutOfRange {
                field: "data length",
                value: bytes.len() as u64,
            });
        }
        Ok(self.assign_data(bytes, verify))
    }

    /// Set or compute the checksum.
    ///
    /// `None` computes the checksum from the current fields. A given value is
    /// decoded as a big-endian 16-bit integer and, with `verify`, compared
    /// against the recomputed one; a mismatch only clears the validity flag.
    pub fn set_checksum(&mut self, checksum: Option<Repr>, verify: bool) -> Result<bool, FrameError> {
        let Some(checksum) = checksum else {
            self.checksum = Some(self.compute_checksum());
            return Ok(self.valid);
        };

        let value = match checksum {
            Repr::RawBytes(bytes) | Repr::IntegerList(bytes) => {
                (bytes.len() == 2).then(|| BigEndian::read_u16(&bytes))
            }
            Repr::HexDigits(digits) => {
                let bytes = parse_hex("checksum", &digits)?;
                (bytes.len() == 2).then(|| BigEndian::read_u16(&bytes))
            }
            Repr::Integer(value) => Some(u16::try_from(value).map_err(|_| {
                FrameError::ValueOutOfRange {
                    field: "checksum",
                    value,
                }
            })?),
        };

        let Some(value) = value else {
            self.checksum = Some(0);
            self.valid = false;
            return Ok(false);
        };

        if verify {
            Ok(self.verify_checksum(value))
        } else {
            self.checksum = Some(value);
            Ok(self.valid)
        }
    }

    /// Set header and/or payload, then recompute size and checksum.
    ///
    /// Parts passed as `None` keep their current value. The frame is valid
    /// afterwards when it has a 2-byte header and a payload.
    pub fn prepare(&mut self, header: Option<Repr>, data: Option<Repr>) -> Result<bool, FrameError> {
        if let Some(header) = header {
            self.set_header(header)?;
        }
        if let Some(data) = data {
            self.set_data(data, false)?;
        }
        if let Some(data) = &self.data {
            self.data_size = Some(data.len() as u8);
        }
        self.checksum = Some(self.compute_checksum());
        self.valid = self.header.as_ref().is_some_and(|h| h.len() == HEADER_LEN)
            && self.data.is_some();
        Ok(self.valid)
    }

    /// Force the validity flag
    pub fn reset_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    /// Whether the frame is marked valid
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Whether the frame is marked invalid
    pub fn failed(&self) -> bool {
        !self.valid
    }

    /// Header bytes (empty when unset)
    pub fn header(&self) -> &[u8] {
        self.header.as_deref().unwrap_or_default()
    }

    /// Whether the header equals `header`
    pub fn header_is(&self, header: [u8; 2]) -> bool {
        self.header() == header
    }

    /// Payload bytes (empty when unset)
    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }

    /// Whether a payload was assigned
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Data size byte
    pub fn data_size(&self) -> Option<u8> {
        self.data_size
    }

    /// Stored checksum
    pub fn checksum(&self) -> Option<u16> {
        self.checksum
    }

    /// Header in the requested format
    pub fn get_header(&self, format: Format) -> Result<FrameValue, FrameError> {
        let header = self.header();
        match format {
            Format::Integer => {
                if header.len() > 8 {
                    return Err(FrameError::TypeMismatch {
                        field: "header",
                        got: "integer",
                    });
                }
                Ok(FrameValue::Integer(
                    header.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64),
                ))
            }
            _ => format_bytes("header", header, format),
        }
    }

    /// Payload in the requested format
    pub fn get_data(&self, format: Format) -> Result<FrameValue, FrameError> {
        format_bytes("data", self.data(), format)
    }

    /// Data size in the requested format
    pub fn get_data_size(&self, format: Format) -> FrameValue {
        let bytes: Vec<u8> = self.data_size.into_iter().collect();
        match format {
            Format::Integer => FrameValue::Integer(self.data_size.unwrap_or(0) as u64),
            Format::RawBytes => FrameValue::RawBytes(bytes),
            Format::HexDigits => FrameValue::HexDigits(hex_string(&bytes)),
            Format::IntegerList => FrameValue::IntegerList(bytes),
        }
    }

    /// Checksum in the requested format
    pub fn get_checksum(&self, format: Format) -> FrameValue {
        let bytes: Vec<u8> = self
            .checksum
            .map(|c| c.to_be_bytes().to_vec())
            .unwrap_or_default();
        match format {
            Format::Integer => FrameValue::Integer(self.checksum.unwrap_or(0) as u64),
            Format::RawBytes => FrameValue::RawBytes(bytes),
            Format::HexDigits => FrameValue::HexDigits(hex_string(&bytes)),
            Format::IntegerList => FrameValue::IntegerList(bytes),
        }
    }

    /// Additive checksum of the current fields
    pub fn compute_checksum(&self) -> u16 {
        let sum = self.data_size.unwrap_or(0) as u32
            + self.header().iter().map(|b| *b as u32).sum::<u32>()
            + self.data().iter().map(|b| *b as u32).sum::<u32>();
        (sum & 0xFFFF) as u16
    }

    /// Re-verify the stored checksum against the current fields
    pub fn check(&self) -> bool {
        self.checksum == Some(self.compute_checksum())
    }

    fn wire_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + 1 + self.data().len() + 2);
        bytes.extend_from_slice(self.header());
        bytes.extend(self.data_size);
        bytes.extend_from_slice(self.data());
        if let Some(checksum) = self.checksum {
            bytes.extend_from_slice(&checksum.to_be_bytes());
        }
        bytes
    }

    /// Encode header, size, data and checksum as wire bytes.
    ///
    /// Invalid frames are still encoded; a warning is logged so the caller
    /// can decide whether to send them.
    pub fn get_raw(&self) -> Vec<u8> {
        if self.failed() {
            warn!(frame = %self.to_hex(), "frame marked invalid while encoding");
        }
        if !self.check() {
            warn!(frame = %self.to_hex(), "invalid frame checksum while encoding");
        }
        self.wire_bytes()
    }

    /// Uppercase hex form used in logs and storage
    pub fn to_hex(&self) -> String {
        hex_string(&self.wire_bytes())
    }

    /// Human-readable dump of an initialisation message
    pub fn describe(&self) -> String {
        let header = self.header();
        let data = self.data();
        let mut out = match header {
            [a, b] if a.is_ascii_alphabetic() && b.is_ascii_alphabetic() => {
                format!("[{}{}] ", *a as char, *b as char)
            }
            _ => format!(
                "[{}]",
                header
                    .iter()
                    .map(|b| format!("0x{:02X}", b))
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
        };

        // Leading binary bytes before the printable part, per command
        let (chars, binary) = match header {
            [b'M', b'A' | b'B' | b'M'] => (0, 5),
            [b'M', b'D'] => (1, 6),
            [b'M', b'T'] => (0, 1),
            [b'M', b'L'] => (0, 11),
            [b'M', b'F' | b'W'] => (0, 3),
            _ => (0, data.len()),
        };

        let chars = chars.min(data.len());
        for c in &data[..chars] {
            out.push(*c as char);
            out.push(' ');
        }
        let binary_end = (chars + binary).min(data.len());
        for b in &data[chars..binary_end] {
            out.push_str(&format!("0x{:02X} ", b));
        }
        out.push_str(&printable(&data[binary_end..]));
        out
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Uppercase hex text, two digits per byte, no separators
pub fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Parse hex text (two digits per byte) into bytes
pub fn parse_hex(field: &'static str, digits: &str) -> Result<Vec<u8>, FrameError> {
    let invalid = || FrameError::InvalidHex {
        field,
        value: digits.to_string(),
    };
    if digits.len() % 2 != 0 {
        return Err(invalid());
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(invalid)
        })
        .collect()
}

fn bytes_of(field: &'static str, repr: Repr) -> Result<Vec<u8>, FrameError> {
    match repr {
        Repr::RawBytes(bytes) | Repr::IntegerList(bytes) => Ok(bytes),
        Repr::HexDigits(digits) => parse_hex(field, &digits),
        other => Err(FrameError::TypeMismatch {
            field,
            got: other.kind(),
        }),
    }
}

fn format_bytes(field: &'static str, bytes: &[u8], format: Format) -> Result<FrameValue, FrameError> {
    match format {
        Format::RawBytes => Ok(FrameValue::RawBytes(bytes.to_vec())),
        Format::IntegerList => Ok(FrameValue::IntegerList(bytes.to_vec())),
        Format::HexDigits => Ok(FrameValue::HexDigits(hex_string(bytes))),
        Format::Integer => Err(FrameError::TypeMismatch {
            field,
            got: "integer",
        }),
    }
}

fn printable(bytes: &[u8]) -> String {
    let mut out = String::new();
    for b in bytes {
        if (b' '..=b'~').contains(b) {
            out.push(*b as char);
            out.push(' ');
        } else {
            out.push_str(&format!("0x{:02X} ", b));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_probe_frame_encoding() {
        let frame = Frame::prepared([0x4D, 0x41], &[0x01]).unwrap();

        assert_eq!(frame.data_size(), Some(0x01));
        assert_eq!(frame.checksum(), Some(0x0090));
        assert_eq!(frame.get_raw(), vec![0x4D, 0x41, 0x01, 0x01, 0x00, 0x90]);
        assert_eq!(frame.to_hex(), "4D4101010090");
        assert!(frame.is_valid());
    }

    #[test]
    fn test_prepare_matches_prepared() {
        let mut frame = Frame::new();
        assert!(frame
            .prepare(Some(Repr::hex("4D41")), Some(Repr::IntegerList(vec![0x01])))
            .unwrap());
        assert_eq!(frame, Frame::prepared([0x4D, 0x41], &[0x01]).unwrap());
    }

    #[test]
    fn test_prepare_keeps_payload_on_new_header() {
        let mut frame = Frame::prepared([0x4D, 0x41], &[0x01]).unwrap();
        frame.prepare(Some(Repr::IntegerList(vec![0x4D, 0x20])), None).unwrap();

        assert_eq!(frame.header(), &[0x4D, 0x20]);
        assert_eq!(frame.data(), &[0x01]);
        assert_eq!(frame.checksum(), Some(0x01 + 0x4D + 0x20 + 0x01));
    }

    #[test]
    fn test_header_length_marks_invalid() {
        let mut short = Frame::new();
        assert_eq!(short.set_header(Repr::RawBytes(vec![0x4D])), Ok(false));
        assert!(short.failed());

        let mut long = Frame::new();
        assert_eq!(long.set_header(Repr::IntegerList(vec![1, 2, 3])), Ok(false));
        assert!(long.failed());
    }

    #[test]
    fn test_header_type_mismatch() {
        let mut frame = Frame::new();
        let err = frame.set_header(Repr::Integer(0x4D41)).unwrap_err();
        assert!(matches!(err, FrameError::TypeMismatch { field: "header", .. }));
    }

    #[test]
    fn test_invalid_hex_is_rejected() {
        let mut frame = Frame::new();
        assert!(matches!(
            frame.set_header(Repr::hex("4G41")),
            Err(FrameError::InvalidHex { .. })
        ));
        assert!(matches!(
            frame.set_data(Repr::hex("123"), true),
            Err(FrameError::InvalidHex { .. })
        ));
    }

    #[test]
    fn test_data_size_mismatch() {
        let mut frame = Frame::new();
        frame.set_data(Repr::IntegerList(vec![1, 2, 3]), true).unwrap();
        assert_eq!(frame.data_size(), Some(3));

        let err = frame.set_data_size(Repr::Integer(2), true).unwrap_err();
        assert_eq!(
            err,
            FrameError::SizeMismatch {
                declared: 2,
                actual: 3
            }
        );

        // Without verification the size is simply overwritten
        assert!(frame.set_data_size(Repr::Integer(2), false).unwrap());
        assert_eq!(frame.data_size(), Some(2));
    }

    #[test]
    fn test_data_size_types() {
        let mut frame = Frame::new();
        assert!(frame.set_data_size(Repr::RawBytes(vec![7, 9]), true).unwrap());
        assert_eq!(frame.data_size(), Some(7));

        assert!(matches!(
            frame.set_data_size(Repr::Integer(256), true),
            Err(FrameError::ValueOutOfRange { .. })
        ));
        assert!(matches!(
            frame.set_data_size(Repr::hex("07"), true),
            Err(FrameError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_set_data_respects_existing_size() {
        let mut frame = Frame::new();
        frame.set_data_size(Repr::Integer(2), true).unwrap();
        assert!(!frame.set_data(Repr::RawBytes(vec![1, 2, 3]), true).unwrap());
        assert_eq!(frame.data_size(), Some(2));
    }

    #[test]
    fn test_checksum_verification() {
        let mut frame = Frame::new();
        frame.set_header(Repr::IntegerList(vec![0x4D, 0x31])).unwrap();
        frame.set_data(Repr::RawBytes(vec![0x10, 0x20]), true).unwrap();

        assert!(frame
            .set_checksum(Some(Repr::Integer(0x4D + 0x31 + 0x02 + 0x30)), true)
            .unwrap());
        assert!(frame.check());

        assert!(!frame.set_checksum(Some(Repr::hex("0000")), true).unwrap());
        assert!(frame.failed());
    }

    #[test]
    fn test_checksum_wrong_length() {
        let mut frame = Frame::prepared([0x4D, 0x31], &[0x01]).unwrap();
        assert!(!frame
            .set_checksum(Some(Repr::RawBytes(vec![0x00])), true)
            .unwrap());
        assert_eq!(frame.checksum(), Some(0));
    }

    #[test]
    fn test_checksum_wraps_at_16_bits() {
        let data = vec![0xFF; 255];
        let frame = Frame::prepared([0xFF, 0xFF], &data).unwrap();
        let expected = (0xFFu32 + 0xFF * 2 + 0xFF * 255) % 65536;
        assert_eq!(frame.checksum(), Some(expected as u16));
    }

    #[test]
    fn test_accessor_formats() {
        let frame = Frame::prepared([0x52, 0x62], &[0x00, 0x00, 0x01]).unwrap();

        assert_eq!(
            frame.get_header(Format::Integer).unwrap(),
            FrameValue::Integer(0x5262)
        );
        assert_eq!(
            frame.get_header(Format::HexDigits).unwrap(),
            FrameValue::HexDigits("5262".into())
        );
        assert_eq!(
            frame.get_data(Format::IntegerList).unwrap(),
            FrameValue::IntegerList(vec![0, 0, 1])
        );
        assert!(frame.get_data(Format::Integer).is_err());
        assert_eq!(frame.get_data_size(Format::HexDigits).as_hex(), Some("03"));
        assert_eq!(
            frame.get_checksum(Format::RawBytes).as_bytes(),
            Some(&[0x00, 0xB8][..])
        );
        assert_eq!(frame.get_checksum(Format::Integer).as_integer(), Some(0xB8));
    }

    #[test]
    fn test_unset_fields_are_empty() {
        let frame = Frame::new();
        assert_eq!(frame.get_data_size(Format::Integer), FrameValue::Integer(0));
        assert_eq!(
            frame.get_checksum(Format::HexDigits),
            FrameValue::HexDigits(String::new())
        );
        assert_eq!(frame.to_hex(), "");
    }

    fn sample_frames() -> Vec<Frame> {
        let long: Vec<u8> = (0..=254).collect();
        [
            ([0x4D, 0x31], vec![0x12, 0x34, 0x56, 0x78]),
            ([0x4D, 0x32], vec![]),
            ([0x52, 0x61], vec![0xFF]),
            ([0xFF, 0xFF], long),
            ([0xFF, 0x00], vec![0x00; 3]),
        ]
        .into_iter()
        .map(|(header, data)| Frame::prepared(header, &data).unwrap())
        .collect()
    }

    #[test]
    fn test_decode_roundtrip() {
        for sent in sample_frames() {
            let decoded = Frame::from_bytes(&sent.get_raw()).expect("Should decode successfully");

            assert_eq!(decoded.header(), sent.header());
            assert_eq!(decoded.data_size(), sent.data_size());
            assert_eq!(decoded.data(), sent.data());
            assert_eq!(decoded.checksum(), sent.checksum());
            assert!(decoded.is_valid(), "{}", sent.to_hex());
        }
    }

    #[test]
    fn test_decode_flags_bad_checksum() {
        for sent in sample_frames() {
            let raw = sent.get_raw();
            for position in [raw.len() - 2, raw.len() - 1] {
                for flip in [0x01, 0x80, 0xFF] {
                    let mut corrupted = raw.clone();
                    corrupted[position] ^= flip;

                    let decoded = Frame::from_bytes(&corrupted).unwrap();
                    assert!(decoded.failed(), "{} byte {}", sent.to_hex(), position);
                    assert!(!decoded.check());
                }
            }
        }
    }

    #[test]
    fn test_prepared_rejects_oversized_payload() {
        assert_eq!(Frame::prepared([0x4D, 0x31], &[0u8; 255]).unwrap().data_size(), Some(255));
        assert_eq!(
            Frame::prepared([0x4D, 0x31], &[0u8; 256]),
            Err(FrameError::ValueOutOfRange {
                field: "data length",
                value: 256,
            })
        );
    }

    #[test]
    fn test_decode_truncation_codes() {
        let raw = Frame::prepared([0x4D, 0x31], &[1, 2, 3]).unwrap().get_raw();
        let code = |len: usize| Frame::from_bytes(&raw[..len]).unwrap_err().code;

        assert_eq!(code(1), ErrorCode::Header);
        assert_eq!(code(2), ErrorCode::Header);
        assert_eq!(code(3), ErrorCode::DataSize);
        assert_eq!(code(5), ErrorCode::Data);
        assert_eq!(code(7), ErrorCode::ChecksumRecv);
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut raw = Frame::prepared([0x4D, 0x31], &[1]).unwrap().get_raw();
        raw.push(0x0D);
        let err = Frame::from_bytes(&raw).unwrap_err();
        assert_eq!(err.code, ErrorCode::Data);
    }

    #[test]
    fn test_describe_init_message() {
        let frame = Frame::prepared([b'M', b'T'], &[0x07, b'O', b'K']).unwrap();
        assert_eq!(frame.describe(), "[MT] 0x07 O K ");

        let frame = Frame::prepared([0x41, 0x10], &[0x01]).unwrap();
        assert_eq!(frame.describe(), "[0x41 0x10]0x01 ");
    }
}
