//! KISS Stream Decoder

use bytes::{Bytes, BytesMut};
use tracing::debug;

use super::constants::*;
use super::types::Frame;

/// Incremental KISS decoder.
///
/// Bytes can arrive in arbitrary chunks; frames are emitted once their closing
/// FEND has been seen. A frame with a bad escape sequence or one exceeding
/// `KISS_MAX_FRAME_LEN` is dropped as a whole.
#[derive(Debug, Default)]
pub struct KissDecoder {
    buf: BytesMut,
    escaped: bool,
    corrupt: bool,
    dropped: u64,
}

impl KissDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return the frames completed by them
    pub fn decode(&mut self, data: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();

        for &byte in data {
            match byte {
                KISS_FEND => {
                    if let Some(frame) = self.finish_frame() {
                        frames.push(frame);
                    }
                }
                KISS_FESC if !self.escaped => {
                    self.escaped = true;
                }
                _ if self.escaped => {
                    self.escaped = false;
                    match byte {
                        KISS_TFEND => self.push_byte(KISS_FEND),
                        KISS_TFESC => self.push_byte(KISS_FESC),
                        other => {
                            debug!("Invalid KISS escape sequence 0x{:02x}, dropping frame", other);
                            self.corrupt = true;
                        }
                    }
                }
                _ => self.push_byte(byte),
            }
        }

        frames
    }

    /// Number of frames discarded as malformed so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Discard any partially received frame
    pub fn reset(&mut self) {
        self.buf.clear();
        self.escaped = false;
        self.corrupt = false;
    }

    fn push_byte(&mut self, byte: u8) {
        if self.corrupt {
            return;
        }
        if self.buf.len() >= KISS_MAX_FRAME_LEN {
            debug!("KISS frame exceeds {} bytes, dropping frame", KISS_MAX_FRAME_LEN);
            self.corrupt = true;
            return;
        }
        self.buf.extend_from_slice(&[byte]);
    }

    fn finish_frame(&mut self) -> Option<Frame> {
        let corrupt = self.corrupt || self.escaped;
        let mut body = self.buf.split().freeze();
        self.escaped = false;
        self.corrupt = false;

        if corrupt {
            self.dropped += 1;
            return None;
        }

        // Back-to-back FENDs delimit nothing
        if body.is_empty() {
            return None;
        }

        let type_byte = body[0];
        let payload: Bytes = body.split_off(1);
        Some(Frame::from_type_byte(type_byte, payload))
    }
}
