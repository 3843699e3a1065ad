//! Incremental frame parser: accumulates arbitrary byte chunks and yields complete,
//! length-delimited FIX messages. Generalizes the fixed-version assumption in
//! [`crate::fix::stream`]'s `read_header`/`read_message` (which only recognizes
//! `8=FIX.4.2`) to all nine `BeginString` values a counterparty might open with.

use crate::fix::{GarbledMessageType, SessionError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// The nine `BeginString` values defined by the FIX protocol (FIX.4.0 through FIX.5.0SP2,
/// plus the FIXT.1.1 session-layer/application-layer split).
pub const VALID_BEGIN_STRINGS: &[&str] = &[
    "FIX.4.0",
    "FIX.4.1",
    "FIX.4.2",
    "FIX.4.3",
    "FIX.4.4",
    "FIX.5.0",
    "FIX.5.0SP1",
    "FIX.5.0SP2",
    "FIXT.1.1",
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("BeginString tag did not start the message")]
    BeginStringNotFirst,
    #[error("unrecognized BeginString value")]
    UnknownBeginString,
    #[error("BodyLength tag was malformed or missing")]
    BodyLengthMalformed,
    #[error("message exceeded the maximum allowed length of {0} bytes")]
    MessageTooLong(usize),
    #[error("BodyLength did not point at a CheckSum trailer")]
    BodyLengthMismatch,
    #[error("CheckSum trailer was missing or malformed")]
    ChecksumMissing,
}

/// Translates a framing failure into the `SessionError` the live engine's state machine
/// already knows how to react to (logout with the offending reason).
pub(super) fn map_parse_error(e: ParseError) -> SessionError {
    let garbled_msg_type = match e {
        ParseError::BeginStringNotFirst | ParseError::UnknownBeginString => {
            GarbledMessageType::BeginStringIssue
        }
        ParseError::BodyLengthMalformed
        | ParseError::MessageTooLong(_)
        | ParseError::BodyLengthMismatch => GarbledMessageType::BodyLengthIssue,
        ParseError::ChecksumMissing => GarbledMessageType::ChecksumIssue,
    };
    SessionError::GarbledMessage {
        text: e.to_string(),
        garbled_msg_type,
    }
}

/// Reads from `stream` and feeds `parser` until a complete frame is available, returning it.
/// `AsyncReadExt::read` is cancel-safe, so this future can be dropped (e.g. by a `tokio::select!`
/// losing a race) without discarding any bytes already appended to `parser`.
pub(super) async fn read_next_frame<R: AsyncRead + Unpin>(
    stream: &mut R,
    parser: &mut FrameParser,
) -> Result<Vec<u8>, SessionError> {
    loop {
        match parser.next() {
            Ok(Some(msg)) => return Ok(msg),
            Ok(None) => {}
            Err(e) => return Err(map_parse_error(e)),
        }
        let mut chunk = [0u8; 4096];
        let num_read = stream.read(&mut chunk).await?;
        if num_read == 0 {
            return Err(SessionError::TcpDisconnection);
        }
        parser.append(&chunk[..num_read]);
    }
}

/// Default cap on a single message's total length, matching spec.md §4.1's design note.
/// Guards against a corrupt or malicious `BodyLength` driving an unbounded allocation.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 1024 * 1024;

pub struct FrameParser {
    buf: Vec<u8>,
    max_message_len: usize,
}

impl Default for FrameParser {
    fn default() -> Self {
        FrameParser::new(DEFAULT_MAX_MESSAGE_LEN)
    }
}

impl FrameParser {
    pub fn new(max_message_len: usize) -> Self {
        FrameParser { buf: Vec::new(), max_message_len }
    }

    /// Feeds newly-received bytes into the parser's internal buffer. Does not itself try to
    /// extract a frame; call [`FrameParser::next`] after appending.
    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Attempts to extract one complete message from the buffered bytes. Returns `Ok(None)`
    /// when more bytes are needed. On a framing error, the offending bytes up to the next
    /// plausible `8=` are discarded from the internal buffer so the caller can resynchronize
    /// without the parser getting stuck, following the same `skip_to_next_message` discard
    /// strategy as `stream.rs`.
    pub fn next(&mut self) -> Result<Option<Vec<u8>>, ParseError> {
        if self.buf.len() < 2 {
            return Ok(None);
        }
        if &self.buf[0..2] != b"8=" {
            self.resync();
            return Err(ParseError::BeginStringNotFirst);
        }

        let begin_string_end = match find(&self.buf, b"\x019=") {
            Some(p) => p,
            None => {
                if self.buf.len() > 32 {
                    self.resync();
                    return Err(ParseError::UnknownBeginString);
                }
                return Ok(None);
            }
        };
        let begin_string = &self.buf[2..begin_string_end];
        let begin_string = std::str::from_utf8(begin_string).unwrap_or("");
        if !VALID_BEGIN_STRINGS.contains(&begin_string) {
            self.resync();
            return Err(ParseError::UnknownBeginString);
        }

        let len_start = begin_string_end + 3;
        let len_end = match self.buf[len_start..].iter().position(|&b| b == 1) {
            Some(p) => len_start + p,
            None => {
                if self.buf.len() - len_start > 20 {
                    self.resync();
                    return Err(ParseError::BodyLengthMalformed);
                }
                return Ok(None);
            }
        };
        let body_len: usize = match std::str::from_utf8(&self.buf[len_start..len_end])
            .ok()
            .and_then(|s| s.parse().ok())
        {
            Some(n) => n,
            None => {
                self.resync();
                return Err(ParseError::BodyLengthMalformed);
            }
        };

        let body_start = len_end + 1;
        let total_len = body_start + body_len + 7; // + "10=NNN\x01"
        if total_len > self.max_message_len {
            self.resync();
            return Err(ParseError::MessageTooLong(self.max_message_len));
        }
        if self.buf.len() < total_len {
            return Ok(None);
        }

        let trailer = &self.buf[body_start + body_len..total_len];
        if &trailer[0..3] != b"10=" {
            self.resync();
            return Err(ParseError::BodyLengthMismatch);
        }
        if !trailer[3..6].iter().all(u8::is_ascii_digit) || trailer[6] != b'\x01' {
            self.resync();
            return Err(ParseError::ChecksumMissing);
        }

        let message: Vec<u8> = self.buf.drain(..total_len).collect();
        Ok(Some(message))
    }

    /// Drops bytes up through (and including) the first byte after the start, so a subsequent
    /// `8=` found later in the buffer is no longer preceded by the bytes that failed to parse.
    fn resync(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let skip = 1;
        self.buf.drain(..skip);
        if let Some(pos) = find(&self.buf, b"8=") {
            self.buf.drain(..pos);
        } else {
            self.buf.clear();
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_single_message_in_one_chunk() {
        let mut p = FrameParser::default();
        let msg = b"8=FIX.4.2\x019=5\x0135=0\x0110=000\x01";
        p.append(msg);
        let out = p.next().unwrap().unwrap();
        assert_eq!(out, msg);
        assert_eq!(p.next().unwrap(), None);
    }

    #[test]
    fn test_message_split_across_chunks() {
        let mut p = FrameParser::default();
        let msg = b"8=FIX.4.2\x019=5\x0135=0\x0110=000\x01";
        p.append(&msg[..10]);
        assert_eq!(p.next().unwrap(), None);
        p.append(&msg[10..]);
        assert_eq!(p.next().unwrap().unwrap(), msg);
    }

    #[test]
    fn test_two_messages_in_one_chunk() {
        let mut p = FrameParser::default();
        let one = b"8=FIX.4.2\x019=5\x0135=0\x0110=000\x01".to_vec();
        let two = b"8=FIXT.1.1\x019=5\x0135=1\x0110=000\x01".to_vec();
        let mut both = one.clone();
        both.extend_from_slice(&two);
        p.append(&both);
        assert_eq!(p.next().unwrap().unwrap(), one);
        assert_eq!(p.next().unwrap().unwrap(), two);
        assert_eq!(p.next().unwrap(), None);
    }

    #[test]
    fn test_unknown_begin_string_rejected() {
        let mut p = FrameParser::default();
        p.append(b"8=FIX.9.9\x019=5\x0135=0\x0110=000\x01");
        assert_eq!(p.next().unwrap_err(), ParseError::UnknownBeginString);
    }

    #[test]
    fn test_oversize_message_rejected() {
        let mut p = FrameParser::new(16);
        p.append(b"8=FIX.4.2\x019=100\x0135=0\x0110=000\x01");
        assert!(matches!(p.next(), Err(ParseError::MessageTooLong(16))));
    }

    #[test]
    fn test_body_length_mismatch_rejected() {
        let mut p = FrameParser::default();
        // BodyLength=4 points one byte short of the "10=" trailer.
        p.append(b"8=FIX.4.2\x019=4\x0135=0\x0110=000\x01");
        assert_eq!(p.next().unwrap_err(), ParseError::BodyLengthMismatch);
    }

    #[test]
    fn test_checksum_missing_rejected() {
        let mut p = FrameParser::default();
        // Trailer is at the right offset but the CheckSum value isn't three ASCII digits.
        p.append(b"8=FIX.4.2\x019=5\x0135=0\x0110=0X0\x01");
        assert_eq!(p.next().unwrap_err(), ParseError::ChecksumMissing);
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut p = FrameParser::default();
        p.append(b"garbage8=FIX.4.2\x019=5\x0135=0\x0110=000\x01");
        let _ = p.next();
        let out = p.next().unwrap().unwrap();
        assert_eq!(out, b"8=FIX.4.2\x019=5\x0135=0\x0110=000\x01");
    }
}
