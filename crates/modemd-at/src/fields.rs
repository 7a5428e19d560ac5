//! Element extraction.
//!
//! Splits a captured response line into comma/colon-delimited fields. The
//! cursor advances strictly forward, never reads past the buffer, and is
//! restartable per line. Empty fields are skipped but still advance the
//! field rank, so analyzers can address fields by position.

/// Result of advancing the cursor by one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEvent {
    /// A field was captured and a separator follows.
    EndOfField,
    /// The message ended (carriage return or end of buffer). The last field
    /// bounds may be empty.
    EndOfMessage,
}

/// Forward-only field cursor over one response line.
#[derive(Debug)]
pub struct ParseCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    field_rank: u32,
    field_start: usize,
    field_end: usize,
}

fn is_separator(byte: u8) -> bool {
    byte == b',' || byte == b':'
}

impl<'a> ParseCursor<'a> {
    /// Create a cursor over a captured line.
    pub fn new(buf: &'a [u8]) -> Self {
        ParseCursor {
            buf,
            pos: 0,
            field_rank: 0,
            field_start: 0,
            field_end: 0,
        }
    }

    /// Advance to the next non-empty field (or the end of the message).
    ///
    /// On return, [`field`](Self::field) holds the captured bytes and
    /// [`rank`](Self::rank) its 1-based position counting empty fields.
    pub fn next_field(&mut self) -> FieldEvent {
        loop {
            if self.pos >= self.buf.len() || self.buf[self.pos] == b'\r' {
                self.field_start = self.pos.min(self.buf.len());
                self.field_end = self.field_start;
                return FieldEvent::EndOfMessage;
            }

            let start = self.pos;
            let mut end = self.pos;
            let mut hit_separator = false;
            while end < self.buf.len() {
                let byte = self.buf[end];
                if byte == b'\r' {
                    break;
                }
                if is_separator(byte) {
                    hit_separator = true;
                    break;
                }
                end += 1;
            }

            self.field_rank += 1;
            self.pos = if hit_separator { end + 1 } else { end };

            // Trim surrounding spaces; "+CSQ: 18,0" yields "18" not " 18".
            let (start, end) = trim(self.buf, start, end);

            if start < end {
                self.field_start = start;
                self.field_end = end;
                return if hit_separator {
                    FieldEvent::EndOfField
                } else {
                    FieldEvent::EndOfMessage
                };
            }

            // Empty field: skip it, rank already advanced.
            if !hit_separator {
                self.field_start = end;
                self.field_end = end;
                return FieldEvent::EndOfMessage;
            }
        }
    }

    /// The bytes of the last captured field.
    pub fn field(&self) -> &'a [u8] {
        &self.buf[self.field_start..self.field_end]
    }

    /// The last captured field as UTF-8, empty string if invalid.
    pub fn field_str(&self) -> &'a str {
        std::str::from_utf8(self.field()).unwrap_or("")
    }

    /// Parse the last captured field as a decimal integer.
    pub fn field_u32(&self) -> Option<u32> {
        self.field_str().parse().ok()
    }

    /// 1-based rank of the last captured field, counting skipped empties.
    pub fn rank(&self) -> u32 {
        self.field_rank
    }

    /// Byte bounds of the last captured field.
    pub fn bounds(&self) -> (usize, usize) {
        (self.field_start, self.field_end)
    }

    /// Everything from the current position to the end of the message.
    pub fn rest(&self) -> &'a [u8] {
        let end = self
            .buf
            .iter()
            .position(|&b| b == b'\r')
            .unwrap_or(self.buf.len());
        &self.buf[self.pos.min(end)..end]
    }
}

fn trim(buf: &[u8], mut start: usize, mut end: usize) -> (usize, usize) {
    while start < end && buf[start] == b' ' {
        start += 1;
    }
    while end > start && buf[end - 1] == b' ' {
        end -= 1;
    }
    (start, end)
}
