//! Frame scanner.
//!
//! Consumes the modem byte stream one byte at a time and decides where one
//! response ends and the next begins. Normal responses are lines framed as
//! `\r\n<text>\r\n`. Socket receive responses additionally carry a binary
//! payload: a header line declaring a decimal byte count, followed by exactly
//! that many raw bytes which may themselves contain terminator lookalikes.
//! The declared length is authoritative over content.
//!
//! The binary mode is entered when the accumulated line prefix matches a
//! registered payload marker (supplied by the vendor plugin, e.g. `+RCVD: `).

use bytes::BytesMut;

use crate::error::FrameError;

/// Default scanner buffer capacity in bytes.
pub const DEFAULT_CAPACITY: usize = 1600;

/// What the scanner declared after consuming a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSignal {
    /// Nothing complete yet.
    None,
    /// A full response line has been captured; read it with
    /// [`FrameScanner::line`].
    LineComplete,
    /// A full binary payload has been captured; read it with
    /// [`FrameScanner::payload`].
    PayloadComplete,
}

/// Scanner mode. The binary payload sub-automaton is an explicit mode rather
/// than a set of flags so a missed state is a compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Waiting for the `\r` that opens a response.
    AwaitingInitialTerminator,
    /// Saw `\r`, waiting for the `\n`.
    AwaitingLineFeed,
    /// Framed and ready for the first character of the line.
    AwaitingFirstChar,
    /// Capturing line text until `\r`.
    Line,
    /// Inside a payload header, accumulating the decimal length field.
    PayloadLength { len: usize, any_digit: bool },
    /// Length field ended with `\r`; skip the `\n` before raw bytes.
    PayloadSkipLineFeed { len: usize },
    /// Counting raw payload bytes. The count is authoritative: terminator
    /// bytes inside the payload are payload.
    Payload { remaining: usize },
}

/// Byte-at-a-time frame scanner.
#[derive(Debug)]
pub struct FrameScanner {
    mode: Mode,
    buf: BytesMut,
    capacity: usize,
    markers: Vec<&'static str>,
    /// Start of payload bytes within `buf` (header text precedes it).
    payload_start: usize,
    /// Declared payload length of the frame being captured.
    declared_len: usize,
    /// Set when payload bytes past capacity were counted but not stored.
    truncated: bool,
}

impl Default for FrameScanner {
    fn default() -> Self {
        FrameScanner::new(DEFAULT_CAPACITY)
    }
}

impl FrameScanner {
    /// Create a scanner with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        FrameScanner {
            mode: Mode::AwaitingInitialTerminator,
            buf: BytesMut::with_capacity(capacity),
            capacity,
            markers: Vec::new(),
            payload_start: 0,
            declared_len: 0,
            truncated: false,
        }
    }

    /// Register a binary payload marker (e.g. `"+RCVD: "`). A line whose
    /// accumulated prefix equals a marker switches the scanner into the
    /// payload header sub-automaton.
    pub fn register_marker(&mut self, marker: &'static str) {
        self.markers.push(marker);
    }

    /// Buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The captured line after [`FrameSignal::LineComplete`].
    pub fn line(&self) -> &[u8] {
        &self.buf
    }

    /// The captured payload bytes after [`FrameSignal::PayloadComplete`].
    pub fn payload(&self) -> &[u8] {
        &self.buf[self.payload_start..]
    }

    /// Declared payload length of the last payload frame. May exceed
    /// `payload().len()` when the frame was truncated.
    pub fn declared_len(&self) -> usize {
        self.declared_len
    }

    /// Whether the last payload frame declared more bytes than the buffer
    /// could hold. The excess bytes were consumed and counted but not stored.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Abort any in-progress capture and return to line scanning.
    pub fn reset(&mut self) {
        self.mode = Mode::AwaitingInitialTerminator;
        self.buf.clear();
        self.payload_start = 0;
        self.declared_len = 0;
        self.truncated = false;
    }

    /// Consume one byte from the transport.
    ///
    /// Returns the framing signal, or a [`FrameError`] on a malformed payload
    /// header (which aborts the payload wait and resets to line scanning).
    pub fn feed(&mut self, byte: u8) -> Result<FrameSignal, FrameError> {
        match self.mode {
            Mode::AwaitingInitialTerminator => {
                match byte {
                    b'\r' => self.mode = Mode::AwaitingLineFeed,
                    b'\n' => {}
                    // Tolerate a missing leading terminator pair.
                    _ => self.begin_line(byte),
                }
                Ok(FrameSignal::None)
            }
            Mode::AwaitingLineFeed => {
                match byte {
                    b'\n' => self.mode = Mode::AwaitingFirstChar,
                    b'\r' => {}
                    _ => self.begin_line(byte),
                }
                Ok(FrameSignal::None)
            }
            Mode::AwaitingFirstChar => {
                match byte {
                    b'\r' | b'\n' => {}
                    _ => self.begin_line(byte),
                }
                Ok(FrameSignal::None)
            }
            Mode::Line => {
                if byte == b'\r' {
                    self.mode = Mode::AwaitingLineFeed;
                    return Ok(FrameSignal::LineComplete);
                }
                if self.buf.len() >= self.capacity {
                    let capacity = self.capacity;
                    self.reset();
                    return Err(FrameError::LineOverflow { capacity });
                }
                self.buf.extend_from_slice(&[byte]);
                if self.matches_marker() {
                    self.mode = Mode::PayloadLength {
                        len: 0,
                        any_digit: false,
                    };
                }
                Ok(FrameSignal::None)
            }
            Mode::PayloadLength { len, any_digit } => match byte {
                b'0'..=b'9' => {
                    self.buf.extend_from_slice(&[byte]);
                    self.mode = Mode::PayloadLength {
                        len: len * 10 + usize::from(byte - b'0'),
                        any_digit: true,
                    };
                    Ok(FrameSignal::None)
                }
                b'\r' if any_digit => {
                    self.mode = Mode::PayloadSkipLineFeed { len };
                    Ok(FrameSignal::None)
                }
                b',' | b':' if any_digit => {
                    // Separator ends the length field; raw bytes follow.
                    self.buf.extend_from_slice(&[byte]);
                    Ok(self.begin_payload(len))
                }
                _ => {
                    self.reset();
                    Err(FrameError::MalformedLength { byte })
                }
            },
            Mode::PayloadSkipLineFeed { len } => {
                if byte == b'\n' {
                    Ok(self.begin_payload(len))
                } else {
                    // The byte already belongs to the payload.
                    let signal = self.begin_payload(len);
                    if signal == FrameSignal::PayloadComplete {
                        // Zero-length payload completed before this byte.
                        return Ok(signal);
                    }
                    Ok(self.consume_payload_byte(byte))
                }
            }
            Mode::Payload { .. } => Ok(self.consume_payload_byte(byte)),
        }
    }

    /// Start capturing a new frame. The previous frame's capture stays
    /// readable until this point, so callers may consume buffered bytes
    /// (including the trailing terminators) before reading it.
    fn begin_line(&mut self, byte: u8) {
        self.buf.clear();
        self.payload_start = 0;
        self.declared_len = 0;
        self.truncated = false;
        self.buf.extend_from_slice(&[byte]);
        self.mode = Mode::Line;
        if self.matches_marker() {
            self.mode = Mode::PayloadLength {
                len: 0,
                any_digit: false,
            };
        }
    }

    fn matches_marker(&self) -> bool {
        self.markers.iter().any(|m| self.buf[..] == *m.as_bytes())
    }

    fn begin_payload(&mut self, len: usize) -> FrameSignal {
        self.declared_len = len;
        self.truncated = false;
        self.payload_start = self.buf.len();
        if len == 0 {
            self.mode = Mode::AwaitingInitialTerminator;
            return FrameSignal::PayloadComplete;
        }
        self.mode = Mode::Payload { remaining: len };
        FrameSignal::None
    }

    fn consume_payload_byte(&mut self, byte: u8) -> FrameSignal {
        let Mode::Payload { remaining } = self.mode else {
            unreachable!("consume_payload_byte outside payload mode");
        };
        if self.buf.len() < self.capacity {
            self.buf.extend_from_slice(&[byte]);
        } else {
            self.truncated = true;
        }
        let remaining = remaining - 1;
        if remaining == 0 {
            self.mode = Mode::AwaitingInitialTerminator;
            FrameSignal::PayloadComplete
        } else {
            self.mode = Mode::Payload { remaining };
            FrameSignal::None
        }
    }
}
