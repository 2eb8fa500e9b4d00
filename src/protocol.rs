/*!
 * Tuple Space Wire Protocol
 *
 * Every message is ASCII text starting with a 3-digit, zero-padded decimal
 * length that counts the whole message, header included:
 *
 *   request:  "<len> REA <key>" | "<len> GET <key>" | "<len> PUT <key> <value>"
 *   response: "<len> OK (<key>, <value>) <verb>" | "<len> ERR <reason>"
 *
 * The PUT value is the remainder of the frame and may contain spaces.
 */

use crate::error::DecodeError;
use bytes::{Buf, BytesMut};
use smol_str::SmolStr;
use std::fmt::{self, Display};

/// Width of the decimal length header
pub const HEADER_LEN: usize = 3;

/// Smallest frame that can hold a header, a space and a command code
pub const MIN_FRAME_LEN: usize = HEADER_LEN + 1 + 3;

/// Largest length a 3-digit header can express
pub const MAX_MESSAGE_LEN: usize = 999;

/// Length prefix written on ERROR responses under [`ErrorLength::Fixed`]
pub const FIXED_ERROR_LEN: usize = 24;

/// How every ERROR reason the server sends ends
///
/// A fixed `024` header cannot tell a reader where an error message stops,
/// so readers look for one of these instead.
pub const ERROR_ENDINGS: &[&str] = &[
    "does not exist",
    "already exists",
    "invalid command",
    "request too short",
    "malformed length header",
    "PUT requires a value",
    "request is not valid UTF-8",
    "length header does not match request",
];

/// The three tuple space primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Non-destructive read (`REA`)
    Read,
    /// Destructive read (`GET`)
    Remove,
    /// Insert-if-absent (`PUT`)
    Insert,
}

impl OpKind {
    /// Three-letter wire code
    pub fn code(self) -> &'static str {
        match self {
            OpKind::Read => "REA",
            OpKind::Remove => "GET",
            OpKind::Insert => "PUT",
        }
    }

    /// Look up a wire code; codes are case sensitive
    pub fn from_code(code: &[u8]) -> Option<Self> {
        match code {
            b"REA" => Some(OpKind::Read),
            b"GET" => Some(OpKind::Remove),
            b"PUT" => Some(OpKind::Insert),
            _ => None,
        }
    }

    /// Past-tense verb closing a success message
    pub fn verb(self) -> &'static str {
        match self {
            OpKind::Read => "read",
            OpKind::Remove => "removed",
            OpKind::Insert => "added",
        }
    }
}

/// A decoded client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// REA key
    Read(SmolStr),
    /// GET key
    Remove(SmolStr),
    /// PUT key value
    Insert(SmolStr, String),
}

impl Request {
    pub fn kind(&self) -> OpKind {
        match self {
            Request::Read(_) => OpKind::Read,
            Request::Remove(_) => OpKind::Remove,
            Request::Insert(..) => OpKind::Insert,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Request::Read(k) | Request::Remove(k) | Request::Insert(k, _) => k,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

/// A response ready to be encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    /// Message text without the length header, e.g. `OK (a, 1) added`
    pub message: String,
}

impl Response {
    /// Success message for `kind` applied to the tuple `(key, value)`
    pub fn success(kind: OpKind, key: &str, value: &str) -> Self {
        Self {
            status: Status::Ok,
            message: format!("OK ({}, {}) {}", key, value, kind.verb()),
        }
    }

    /// Error message carrying `reason` after the `ERR` marker
    pub fn failure(reason: impl Display) -> Self {
        Self {
            status: Status::Error,
            message: format!("ERR {}", reason),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// How the length header of ERROR responses is produced
///
/// Deployed clients expect the literal `024` on every error even though it
/// only matches the real length for one-byte keys, so `Fixed` is the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorLength {
    #[default]
    Fixed,
    Computed,
}

/// Parse the 3-digit length header at the start of `data`
fn read_header(data: &[u8]) -> Result<usize, DecodeError> {
    let header = &data[..HEADER_LEN];
    if !header.iter().all(u8::is_ascii_digit) {
        return Err(DecodeError::BadHeader);
    }
    Ok(header
        .iter()
        .fold(0usize, |acc, d| acc * 10 + (d - b'0') as usize))
}

/// Length of the first complete frame in `data`
///
/// # Returns
/// * `Ok(Some(len))` - a whole frame of `len` bytes is buffered
/// * `Ok(None)` - more bytes are needed
/// * `Err(...)` - the header itself is unusable
pub fn frame_len(data: &[u8]) -> Result<Option<usize>, DecodeError> {
    if data.len() < HEADER_LEN {
        return Ok(None);
    }
    let declared = read_header(data)?;
    if declared < MIN_FRAME_LEN {
        return Err(DecodeError::TooShort);
    }
    if data.len() < declared {
        return Ok(None);
    }
    Ok(Some(declared))
}

/// Decode one complete request message
///
/// The whole of `frame` is taken as the message and its header must state
/// exactly that length; [`frame_len`] is what cuts a stream into frames.
pub fn decode(frame: &[u8]) -> Result<Request, DecodeError> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(DecodeError::TooShort);
    }
    if read_header(frame)? != frame.len() {
        return Err(DecodeError::LengthMismatch);
    }
    if frame[HEADER_LEN] != b' ' {
        return Err(DecodeError::BadHeader);
    }

    let body = &frame[HEADER_LEN + 1..];
    let kind = OpKind::from_code(&body[..3]).ok_or(DecodeError::InvalidCommand)?;

    // "REA" alone addresses the empty key; anything else must be separated
    // from the code by a space ("READ x" is not "REA D x").
    let rest = match body.get(3) {
        None => &body[3..],
        Some(b' ') => &body[4..],
        Some(_) => return Err(DecodeError::InvalidCommand),
    };
    let rest = std::str::from_utf8(rest).map_err(|_| DecodeError::InvalidUtf8)?;

    Ok(match kind {
        OpKind::Read => Request::Read(SmolStr::new(rest)),
        OpKind::Remove => Request::Remove(SmolStr::new(rest)),
        OpKind::Insert => {
            let (key, value) = rest.split_once(' ').ok_or(DecodeError::MissingValue)?;
            Request::Insert(SmolStr::new(key), value.to_string())
        }
    })
}

/// Whether `data` could be the beginning of a frame: up to three digits,
/// then a space
fn could_start_frame(data: &[u8]) -> bool {
    data.iter().take(HEADER_LEN + 1).enumerate().all(|(i, b)| {
        if i < HEADER_LEN {
            b.is_ascii_digit()
        } else {
            *b == b' '
        }
    })
}

/// Pull every complete frame out of `buf`
///
/// Each frame yields one entry in `out`, so every request receives exactly
/// one response. Header errors discard whatever is buffered because the next
/// frame boundary is unknown; body errors consume only their own frame. A
/// frame followed by bytes that cannot start another one had a header that
/// understated its length, so the whole buffer is answered as one bad request.
///
/// An incomplete trailing frame stays in `buf`; see [`parse_rest`].
pub fn parse_many(buf: &mut BytesMut, out: &mut Vec<Result<Request, DecodeError>>) {
    loop {
        match frame_len(&buf[..]) {
            Ok(Some(n)) if could_start_frame(&buf[n..]) => {
                out.push(decode(&buf[..n]));
                buf.advance(n);
            }
            Ok(Some(_)) => {
                buf.clear();
                out.push(Err(DecodeError::LengthMismatch));
                break;
            }
            Ok(None) => break,
            Err(e) => {
                buf.clear();
                out.push(Err(e));
                break;
            }
        }
    }
}

/// Decode whatever is left in `buf` as one message and empty it
///
/// Used once the peer has stopped sending with a partial frame buffered:
/// too few bytes for a header give [`DecodeError::TooShort`], a header that
/// promised more than arrived gives [`DecodeError::LengthMismatch`].
pub fn parse_rest(buf: &mut BytesMut, out: &mut Vec<Result<Request, DecodeError>>) {
    if !buf.is_empty() {
        out.push(decode(&buf[..]));
        buf.clear();
    }
}

/// Append the encoded response to `out`
pub fn write_response(resp: &Response, errors: ErrorLength, out: &mut BytesMut) {
    let len = match (resp.status, errors) {
        (Status::Error, ErrorLength::Fixed) => FIXED_ERROR_LEN,
        _ => HEADER_LEN + 1 + resp.message.len(),
    };
    if len > MAX_MESSAGE_LEN {
        log::warn!("response of {} bytes exceeds the 3-digit length header", len);
    }
    out.reserve(len);
    out.extend_from_slice(format!("{:03} ", len).as_bytes());
    out.extend_from_slice(resp.message.as_bytes());
}

/// Encode a response into a fresh buffer
pub fn encode_response(resp: &Response, errors: ErrorLength) -> Vec<u8> {
    let mut out = BytesMut::new();
    write_response(resp, errors, &mut out);
    out.to_vec()
}

/// Encode a request with its true total length
///
/// `code` is normally an [`OpKind::code`]; the client also forwards unknown
/// 3-letter codes so the server can reject them.
pub fn encode_request(code: &str, key: &str, value: Option<&str>) -> String {
    let body = match value {
        Some(v) => format!("{} {} {}", code, key, v),
        None => format!("{} {}", code, key),
    };
    format!("{:03} {}", HEADER_LEN + 1 + body.len(), body)
}
