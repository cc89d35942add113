//! Incremental base64 decoding for PDF streams read over CDP.
//!
//! `IO.read` returns the PDF in base64 text chunks whose boundaries fall
//! anywhere, including inside a 4-character group. The decoder carries the
//! partial group across pushes so the concatenated output is identical to a
//! single-shot decode of the concatenated input.

use thiserror::Error;

/// Whitespace bytes tolerated anywhere in the input stream.
const WHITESPACE: [u8; 6] = [b' ', b'\t', b'\n', 0x0B, 0x0C, b'\r'];

const INVALID: u8 = 0xFF;

/// Maps an ASCII byte to its 6-bit value, or `INVALID`.
const fn build_table() -> [u8; 256] {
    let mut table = [INVALID; 256];
    let alphabet = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut i = 0;
    while i < alphabet.len() {
        table[alphabet[i] as usize] = i as u8;
        i += 1;
    }
    table
}

static DECODE_TABLE: [u8; 256] = build_table();

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid base64 byte 0x{0:02x}")]
    InvalidByte(u8),

    #[error("padding in the middle of a base64 group")]
    MisplacedPadding,

    #[error("data after terminating padding")]
    TrailingData,
}

/// Stateful 4→3 base64 decoder.
///
/// Bytes that do not complete a group are buffered (at most 3 sextets) and
/// joined with the next `push`. After a padded group terminates the stream,
/// any further non-whitespace input is an error.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    quad: [u8; 3],
    quad_len: usize,
    pad_len: usize,
    finished: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, appending output bytes to `out`.
    ///
    /// Emits between 0 and `chunk.len() / 4 * 3` bytes; whitespace-only
    /// chunks emit nothing. The first malformed byte fails the whole stream
    /// with no partial bytes emitted past the error boundary.
    pub fn push(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<(), DecodeError> {
        out.reserve(chunk.len() / 4 * 3);

        for &byte in chunk {
            if WHITESPACE.contains(&byte) {
                continue;
            }
            if self.finished {
                return Err(DecodeError::TrailingData);
            }
            if byte == b'=' {
                self.push_padding(out)?;
                continue;
            }
            if self.pad_len > 0 {
                return Err(DecodeError::MisplacedPadding);
            }
            let sextet = DECODE_TABLE[byte as usize];
            if sextet == INVALID {
                return Err(DecodeError::InvalidByte(byte));
            }
            if self.quad_len == 3 {
                let [s0, s1, s2] = self.quad;
                out.push(s0 << 2 | s1 >> 4);
                out.push(s1 << 4 | s2 >> 2);
                out.push(s2 << 6 | sextet);
                self.quad_len = 0;
            } else {
                self.quad[self.quad_len] = sextet;
                self.quad_len += 1;
            }
        }
        Ok(())
    }

    /// Discard any buffered partial group and padding state.
    pub fn reset(&mut self) {
        self.quad_len = 0;
        self.pad_len = 0;
        self.finished = false;
    }

    fn push_padding(&mut self, out: &mut Vec<u8>) -> Result<(), DecodeError> {
        match (self.quad_len, self.pad_len) {
            // "xx==" → one byte, needs the second '=' to close the group.
            (2, 0) => {
                self.pad_len = 1;
                Ok(())
            }
            (2, 1) => {
                out.push(self.quad[0] << 2 | self.quad[1] >> 4);
                self.terminate();
                Ok(())
            }
            // "xxx=" → two bytes.
            (3, 0) => {
                out.push(self.quad[0] << 2 | self.quad[1] >> 4);
                out.push(self.quad[1] << 4 | self.quad[2] >> 2);
                self.terminate();
                Ok(())
            }
            _ => Err(DecodeError::MisplacedPadding),
        }
    }

    fn terminate(&mut self) {
        self.quad_len = 0;
        self.pad_len = 0;
        self.finished = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    fn decode_chunked(input: &[u8], chunk_size: usize) -> Vec<u8> {
        let mut decoder = StreamDecoder::new();
        let mut out = Vec::new();
        for chunk in input.chunks(chunk_size.max(1)) {
            decoder.push(chunk, &mut out).unwrap();
        }
        out
    }

    #[test]
    fn single_shot_matches_reference() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let encoded = STANDARD.encode(data);

        let mut decoder = StreamDecoder::new();
        let mut out = Vec::new();
        decoder.push(encoded.as_bytes(), &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn every_chunking_matches_single_shot() {
        let data: Vec<u8> = (0u16..=511).map(|i| (i % 251) as u8).collect();
        let encoded = STANDARD.encode(&data);

        for chunk_size in 1..=17 {
            assert_eq!(
                decode_chunked(encoded.as_bytes(), chunk_size),
                data,
                "chunk size {chunk_size}"
            );
        }
    }

    #[test]
    fn whitespace_anywhere_is_ignored() {
        let encoded = " SG\nVs\tbG8\r sIH\x0bdvcmxk \x0c";
        let mut decoder = StreamDecoder::new();
        let mut out = Vec::new();
        decoder.push(encoded.as_bytes(), &mut out).unwrap();
        assert_eq!(out, b"Hello, world");
    }

    #[test]
    fn whitespace_only_chunks_emit_nothing() {
        let mut decoder = StreamDecoder::new();
        let mut out = Vec::new();
        decoder.push(b"  \n\r\t ", &mut out).unwrap();
        decoder.push(b"", &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn padding_split_across_pushes() {
        // "QQ==" decodes to "A"; split every way around the padding.
        for split in 1..4 {
            let encoded = b"QQ==";
            let mut decoder = StreamDecoder::new();
            let mut out = Vec::new();
            decoder.push(&encoded[..split], &mut out).unwrap();
            decoder.push(&encoded[split..], &mut out).unwrap();
            assert_eq!(out, b"A", "split at {split}");
        }
    }

    #[test]
    fn one_pad_group() {
        let mut decoder = StreamDecoder::new();
        let mut out = Vec::new();
        decoder.push(b"SGk=", &mut out).unwrap();
        assert_eq!(out, b"Hi");
    }

    #[test]
    fn invalid_byte_fails_fast() {
        let mut decoder = StreamDecoder::new();
        let mut out = Vec::new();
        let err = decoder.push(b"SG#s", &mut out).unwrap_err();
        assert_eq!(err, DecodeError::InvalidByte(b'#'));
        // Nothing emitted past the error boundary.
        assert!(out.is_empty());
    }

    #[test]
    fn data_after_padding_fails() {
        let mut decoder = StreamDecoder::new();
        let mut out = Vec::new();
        decoder.push(b"QQ==", &mut out).unwrap();
        assert_eq!(
            decoder.push(b"QQ==", &mut out).unwrap_err(),
            DecodeError::TrailingData
        );
        // Trailing whitespace is still fine.
        let mut decoder = StreamDecoder::new();
        decoder.push(b"QQ== \n", &mut out).unwrap();
    }

    #[test]
    fn misplaced_padding_fails() {
        let mut decoder = StreamDecoder::new();
        let mut out = Vec::new();
        assert_eq!(
            decoder.push(b"Q===", &mut out).unwrap_err(),
            DecodeError::MisplacedPadding
        );
    }

    #[test]
    fn reset_discards_partial_group() {
        let mut decoder = StreamDecoder::new();
        let mut out = Vec::new();
        decoder.push(b"SGVsbG8gd29ybG", &mut out).unwrap();
        decoder.reset();
        out.clear();

        decoder.push(b"SGk=", &mut out).unwrap();
        assert_eq!(out, b"Hi");
    }

    #[test]
    fn reset_clears_terminated_state() {
        let mut decoder = StreamDecoder::new();
        let mut out = Vec::new();
        decoder.push(b"QQ==", &mut out).unwrap();
        decoder.reset();
        out.clear();
        decoder.push(b"SGk=", &mut out).unwrap();
        assert_eq!(out, b"Hi");
    }
}
