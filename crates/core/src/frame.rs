//! Fixed-width header frame codec
//!
//! Wire format: [24-byte ASCII header][body, 0..=512 bytes]
//!
//! ```text
//! bytes  0..4    body length    decimal, right-aligned, width 4
//! bytes  4..8    message kind   decimal, right-aligned, width 4
//! bytes  8..18   sender id      fixed-point, 2 decimals, width 10
//! bytes 18..24   receiver id    leading 6 columns of a width-10 fixed-point field
//! ```
//!
//! The header is rendered as `%4d%4d%10.2f%10.2f` (28 columns) and only the
//! first 24 columns go on the wire, so the receiver field is cut short. Peers
//! only ever see that prefix, and this codec reproduces it byte for byte.

use std::fmt::Write as _;

use crate::error::{EncodeError, HeaderError};

/// Size of the fixed header in bytes
pub const HEADER_LENGTH: usize = 24;

/// Maximum body size in bytes
pub const MAX_BODY_LENGTH: usize = 512;

const LENGTH_FIELD: std::ops::Range<usize> = 0..4;
const KIND_FIELD: std::ops::Range<usize> = 4..8;
const SENDER_FIELD: std::ops::Range<usize> = 8..18;
const RECEIVER_FIELD: std::ops::Range<usize> = 18..24;

/// Column width of an identifier before the header is cut to 24 bytes
const ID_WIDTH: usize = 10;

/// Purpose of a frame, carried in the header's kind field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageKind {
    Login = 1,
    Logout = 2,
    AssignReceiver = 3,
    SendMessage = 4,
    Reserved = 5,
}

impl MessageKind {
    /// Numeric code written into the header
    pub fn code(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for MessageKind {
    type Error = HeaderError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(MessageKind::Login),
            2 => Ok(MessageKind::Logout),
            3 => Ok(MessageKind::AssignReceiver),
            4 => Ok(MessageKind::SendMessage),
            5 => Ok(MessageKind::Reserved),
            other => Err(HeaderError::UnknownKind(other)),
        }
    }
}

/// One header-plus-body unit exchanged over the connection
#[derive(Debug, Clone, PartialEq)]
pub struct MessageFrame {
    header: [u8; HEADER_LENGTH],
    body: Vec<u8>,
}

impl Default for MessageFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFrame {
    /// Empty frame: blank header, zero-length body
    pub fn new() -> Self {
        Self {
            header: [b' '; HEADER_LENGTH],
            body: Vec::new(),
        }
    }

    /// Frame whose body is a copy of `bytes`, truncated to [`MAX_BODY_LENGTH`]
    pub fn with_body(bytes: &[u8]) -> Self {
        let len = bytes.len().min(MAX_BODY_LENGTH);
        Self {
            header: [b' '; HEADER_LENGTH],
            body: bytes[..len].to_vec(),
        }
    }

    /// Build a complete frame: body (truncated) plus encoded header
    pub fn compose(
        kind: MessageKind,
        sender_id: f64,
        receiver_id: f64,
        body: &[u8],
    ) -> Result<Self, EncodeError> {
        let mut frame = Self::with_body(body);
        frame.encode_header(sender_id, receiver_id, kind)?;
        Ok(frame)
    }

    pub fn header(&self) -> &[u8; HEADER_LENGTH] {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut [u8; HEADER_LENGTH] {
        &mut self.header
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut [u8] {
        &mut self.body
    }

    pub fn body_length(&self) -> usize {
        self.body.len()
    }

    /// Total bytes on the wire (header + body)
    pub fn length(&self) -> usize {
        HEADER_LENGTH + self.body.len()
    }

    /// Set the body length, clamped to [`MAX_BODY_LENGTH`].
    ///
    /// Growing zero-fills the new bytes. Lengths above the maximum are
    /// silently truncated.
    pub fn set_body_length(&mut self, new_length: usize) {
        self.body.resize(new_length.min(MAX_BODY_LENGTH), 0);
    }

    /// Write the four header fields in place. The body length field is taken
    /// from the current body.
    ///
    /// Fails without touching the header if any field would overflow its
    /// column width or an identifier is not finite.
    pub fn encode_header(
        &mut self,
        sender_id: f64,
        receiver_id: f64,
        kind: MessageKind,
    ) -> Result<(), EncodeError> {
        let sender = render_id("sender id", sender_id)?;
        let receiver = render_id("receiver id", receiver_id)?;

        let mut rendered = String::with_capacity(HEADER_LENGTH + ID_WIDTH);
        // Writing into a String cannot fail
        let _ = write!(
            rendered,
            "{:>4}{:>4}{}{}",
            self.body.len(),
            kind.code(),
            sender,
            receiver
        );
        debug_assert_eq!(rendered.len(), 4 + 4 + ID_WIDTH + ID_WIDTH);

        self.header
            .copy_from_slice(&rendered.as_bytes()[..HEADER_LENGTH]);
        Ok(())
    }

    /// Parse the body length field and size the body buffer to match.
    ///
    /// Leading spaces are accepted; anything else must be decimal digits.
    /// On failure the body length is reset to 0.
    pub fn decode_header(&mut self) -> Result<usize, HeaderError> {
        match parse_length(&self.header[LENGTH_FIELD]) {
            Ok(len) => {
                self.body.clear();
                self.body.resize(len, 0);
                Ok(len)
            }
            Err(e) => {
                self.body.clear();
                Err(e)
            }
        }
    }

    /// Raw kind code from the header, if the field holds a number
    pub fn kind_code(&self) -> Option<u16> {
        field_text(&self.header[KIND_FIELD])?.parse().ok()
    }

    /// Kind from the header, if it is one of the known kinds
    pub fn kind(&self) -> Option<MessageKind> {
        self.kind_code()
            .and_then(|code| MessageKind::try_from(code).ok())
    }

    /// Sender identifier from the header
    pub fn sender_id(&self) -> Option<f64> {
        field_text(&self.header[SENDER_FIELD])?.parse().ok()
    }

    /// Numeric value of the truncated receiver column.
    ///
    /// Only the leading 6 of the 10 rendered columns are on the wire, so this
    /// is `None` for identifiers short enough to be all padding.
    pub fn receiver_prefix(&self) -> Option<f64> {
        field_text(&self.header[RECEIVER_FIELD])?.parse().ok()
    }

    /// Header followed by body
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.length());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.body);
        out
    }
}

fn render_id(field: &'static str, value: f64) -> Result<String, EncodeError> {
    if !value.is_finite() {
        return Err(EncodeError::NonFinite { field });
    }
    let text = format!("{:>width$.2}", value, width = ID_WIDTH);
    if text.len() > ID_WIDTH {
        return Err(EncodeError::Overflow {
            field,
            value: text.trim().to_string(),
            width: ID_WIDTH,
        });
    }
    Ok(text)
}

/// Check that an identifier renders within its fixed-point column
pub fn validate_id(field: &'static str, value: f64) -> Result<(), EncodeError> {
    render_id(field, value).map(|_| ())
}

fn field_text(bytes: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(bytes).ok()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn parse_length(field: &[u8]) -> Result<usize, HeaderError> {
    let digits = match field.iter().position(|b| *b != b' ') {
        Some(start) => &field[start..],
        None => &field[field.len()..],
    };
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(HeaderError::Malformed {
            field: "body length",
            text: String::from_utf8_lossy(field).into_owned(),
        });
    }
    let len = digits
        .iter()
        .fold(0usize, |acc, d| acc * 10 + usize::from(d - b'0'));
    if len > MAX_BODY_LENGTH {
        return Err(HeaderError::Oversized(len));
    }
    Ok(len)
}
