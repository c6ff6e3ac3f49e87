//! Frame reassembly for the BLE UART byte stream.
//!
//! The UART service delivers bytes with no message boundaries. A frame ends
//! when a transport read leaves the buffer ending in the terminator `;`:
//!
//! ```text
//! "ssi" | "d=Home;pwd=hun" | "ter2;"   ->   "ssid=Home;pwd=hunter2"
//! ```
//!
//! Exactly one trailing terminator is stripped, so `"a;;"` yields `"a;"`.
//! A UTF-8 sequence split across reads is carried over to the next read;
//! genuinely malformed input discards the just-arrived chunk and nothing else.
//!
//! # Example
//!
//! ```
//! use ble_wifi_provisioner::ble::FrameAssembler;
//!
//! let mut assembler = FrameAssembler::new(256);
//! assert_eq!(assembler.feed(b"ssid=A;pwd=").unwrap(), None);
//! assert_eq!(assembler.feed(b"B;").unwrap().as_deref(), Some("ssid=A;pwd=B"));
//! ```

use std::fmt;

/// Frame terminator byte.
pub const TERMINATOR: u8 = b';';

/// Longest incomplete UTF-8 sequence that can be carried between reads.
const MAX_UTF8_CARRY: usize = 3;

/// Accumulates inbound chunks and yields complete frames.
///
/// Holds at most one partial frame; the provisioning protocol is strictly
/// sequential.
#[derive(Debug)]
pub struct FrameAssembler {
    /// Decoded text of the frame in progress.
    buffer: String,
    /// Leading bytes of a UTF-8 sequence cut off by the previous read.
    carry: Vec<u8>,
    /// Buffer cap in bytes.
    max_len: usize,
}

impl FrameAssembler {
    /// Create an assembler that resets once a partial frame exceeds `max_len` bytes.
    pub fn new(max_len: usize) -> Self {
        Self {
            buffer: String::new(),
            carry: Vec::new(),
            max_len,
        }
    }

    /// Append a chunk of newly arrived bytes.
    ///
    /// Returns `Ok(Some(frame))` when the chunk completes a frame,
    /// `Ok(None)` when more bytes are needed, and an error when the chunk was
    /// dropped (malformed UTF-8) or the buffer was reset (overflow).
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Option<String>, FrameError> {
        if chunk.is_empty() {
            return Ok(None);
        }

        let mut bytes = std::mem::take(&mut self.carry);
        let carried = bytes.len();
        bytes.extend_from_slice(chunk);

        let (text, rest) = match split_utf8(&bytes) {
            // A lead byte that the new chunk does not continue was noise
            // from the previous read; judge the chunk on its own.
            Err(_) if carried > 0 => split_utf8(chunk)?,
            result => result?,
        };
        self.carry = rest.to_vec();

        if self.buffer.len() + text.len() + self.carry.len() > self.max_len {
            let len = self.buffer.len() + text.len() + self.carry.len();
            self.reset();
            return Err(FrameError::BufferOverflow {
                len,
                max: self.max_len,
            });
        }

        self.buffer.push_str(text);

        if self.carry.is_empty() && self.buffer.as_bytes().last() == Some(&TERMINATOR) {
            let mut frame = std::mem::take(&mut self.buffer);
            frame.pop();
            return Ok(Some(frame));
        }

        Ok(None)
    }

    /// Bytes currently held for the frame in progress.
    pub fn pending_len(&self) -> usize {
        self.buffer.len() + self.carry.len()
    }

    /// Discard any partial frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.carry.clear();
    }
}

/// Split `bytes` into its valid UTF-8 text and a trailing truncated sequence.
fn split_utf8(bytes: &[u8]) -> Result<(&str, &[u8]), FrameError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok((text, &[])),
        Err(e) => {
            let (valid, rest) = bytes.split_at(e.valid_up_to());
            match e.error_len() {
                // Truncated sequence at the end: keep it for the next read.
                None if rest.len() <= MAX_UTF8_CARRY => {
                    Ok((std::str::from_utf8(valid).unwrap_or_default(), rest))
                }
                _ => Err(FrameError::MalformedEncoding),
            }
        }
    }
}

/// Conditions reported by [`FrameAssembler::feed`]. All are recoverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The chunk was not valid UTF-8 and was discarded.
    MalformedEncoding,
    /// The unterminated frame grew past the cap; the buffer was reset.
    BufferOverflow { len: usize, max: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedEncoding => write!(f, "received malformed UTF-8"),
            Self::BufferOverflow { len, max } => {
                write!(f, "frame too long: {} bytes (max {})", len, max)
            }
        }
    }
}

impl std::error::Error for FrameError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(assembler: &mut FrameAssembler, chunks: &[&[u8]]) -> Vec<String> {
        chunks
            .iter()
            .filter_map(|chunk| assembler.feed(chunk).ok().flatten())
            .collect()
    }

    // ==================== Framing Tests ====================

    #[test]
    fn test_single_chunk_frame() {
        let mut assembler = FrameAssembler::new(256);
        let frame = assembler.feed(b"ssid=MyNet;pwd=Secr3t!;").unwrap();
        assert_eq!(frame.as_deref(), Some("ssid=MyNet;pwd=Secr3t!"));
        assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn test_three_chunk_scenario() {
        let mut assembler = FrameAssembler::new(256);
        assert_eq!(assembler.feed(b"ssi").unwrap(), None);
        assert_eq!(assembler.feed(b"d=Home;pwd=hun").unwrap(), None);
        assert_eq!(
            assembler.feed(b"ter2;").unwrap().as_deref(),
            Some("ssid=Home;pwd=hunter2")
        );
        assert_eq!(assembler.feed(b"").unwrap(), None);
    }

    #[test]
    fn test_empty_chunk_is_noop() {
        let mut assembler = FrameAssembler::new(256);
        assembler.feed(b"abc").unwrap();
        assert_eq!(assembler.feed(b"").unwrap(), None);
        assert_eq!(assembler.pending_len(), 3);
    }

    #[test]
    fn test_lone_terminator_yields_empty_frame() {
        let mut assembler = FrameAssembler::new(256);
        assert_eq!(assembler.feed(b";").unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_strips_exactly_one_terminator() {
        let mut assembler = FrameAssembler::new(256);
        assert_eq!(
            assembler.feed(b"ssid=A;pwd=B;;").unwrap().as_deref(),
            Some("ssid=A;pwd=B;")
        );
    }

    #[test]
    fn test_consecutive_frames() {
        let mut assembler = FrameAssembler::new(256);
        let frames = feed_all(&mut assembler, &[b"ssid=A;pwd=1;", b"ssid=B;", b"pwd=2;"]);
        assert_eq!(frames, vec!["ssid=A;pwd=1", "ssid=B", "pwd=2"]);
    }

    #[test]
    fn test_chunk_size_independence() {
        // Chunkings whose boundaries never sit just after an interior ';'
        // produce the same frames as a single read.
        let stream: &[u8] = b"ssid=Home;pwd=hunter2;";
        let mut whole = FrameAssembler::new(256);
        let expected = feed_all(&mut whole, &[stream]);

        for split in [1usize, 3, 7, 12, 15, 21] {
            let (head, tail) = stream.split_at(split);
            if head.last() == Some(&TERMINATOR) {
                continue;
            }
            let mut assembler = FrameAssembler::new(256);
            assert_eq!(feed_all(&mut assembler, &[head, tail]), expected, "split at {}", split);
        }
    }

    // ==================== Encoding Tests ====================

    #[test]
    fn test_malformed_chunk_discarded_buffer_kept() {
        let mut assembler = FrameAssembler::new(256);
        assembler.feed(b"ssid=A;").ok();
        assembler.feed(b"pwd=").unwrap();
        assert_eq!(
            assembler.feed(&[0xFF, 0xFE, b'x']),
            Err(FrameError::MalformedEncoding)
        );
        assert_eq!(assembler.feed(b"B;").unwrap().as_deref(), Some("pwd=B"));
    }

    #[test]
    fn test_multibyte_char_split_across_reads() {
        let stream = "ssid=Café;pwd=ü;".as_bytes();
        let split = stream.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut assembler = FrameAssembler::new(256);
        assert_eq!(assembler.feed(&stream[..split]).unwrap(), None);
        assert_eq!(
            assembler.feed(&stream[split..]).unwrap().as_deref(),
            Some("ssid=Café;pwd=ü")
        );
    }

    #[test]
    fn test_multibyte_one_byte_at_a_time() {
        let mut assembler = FrameAssembler::new(256);
        let stream = "pwd=€€".as_bytes();
        for byte in stream {
            assert_eq!(assembler.feed(&[*byte]).unwrap(), None);
        }
        assert_eq!(assembler.feed(b";").unwrap().as_deref(), Some("pwd=€€"));
    }

    #[test]
    fn test_dangling_lead_byte_does_not_spoil_next_chunk() {
        let mut assembler = FrameAssembler::new(256);
        assert_eq!(assembler.feed(b"junk\xC3").unwrap(), None);
        assert_eq!(
            assembler.feed(b"ssid=A;pwd=B;").unwrap().as_deref(),
            Some("junkssid=A;pwd=B")
        );
        assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn test_dangling_lead_byte_then_malformed_chunk() {
        let mut assembler = FrameAssembler::new(256);
        assert_eq!(assembler.feed(b"pwd=\xE2\x82").unwrap(), None);
        assert_eq!(
            assembler.feed(&[0xFF, b'x']),
            Err(FrameError::MalformedEncoding)
        );
        assert_eq!(assembler.feed(b"B;").unwrap().as_deref(), Some("pwd=B"));
    }

    // ==================== Overflow Tests ====================

    #[test]
    fn test_overflow_resets_buffer() {
        let mut assembler = FrameAssembler::new(16);
        assembler.feed(b"0123456789").unwrap();
        assert_eq!(
            assembler.feed(b"0123456789"),
            Err(FrameError::BufferOverflow { len: 20, max: 16 })
        );
        assert_eq!(assembler.pending_len(), 0);

        // Next frame is unaffected.
        assert_eq!(assembler.feed(b"ssid=A;").unwrap().as_deref(), Some("ssid=A"));
    }

    #[test]
    fn test_frame_at_cap_is_accepted() {
        let mut assembler = FrameAssembler::new(8);
        assert_eq!(assembler.feed(b"1234567;").unwrap().as_deref(), Some("1234567"));
    }
}
