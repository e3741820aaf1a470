//! KISS Frame Types

use bytes::Bytes;
use std::time::SystemTime;

use crate::kiss::constants::KISS_CMD_DATA;

/// One decoded protocol unit received from a TNC.
///
/// `payload` is the unescaped frame body with the KISS type byte removed.
/// For data frames this is the raw AX.25 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub port: u8,
    pub command: u8,
    pub payload: Bytes,
    pub received_at: SystemTime,
}

impl Frame {
    /// Build a frame from the KISS type byte and the unescaped body.
    pub fn from_type_byte(type_byte: u8, payload: Bytes) -> Self {
        Self {
            port: type_byte >> 4,
            command: type_byte & 0x0F,
            payload,
            received_at: SystemTime::now(),
        }
    }

    /// Whether this frame carries data (as opposed to a TNC parameter command)
    pub fn is_data(&self) -> bool {
        self.command == KISS_CMD_DATA
    }

    /// Lowercase hex rendering of the payload
    pub fn payload_hex(&self) -> String {
        use std::fmt::Write;

        let mut out = String::with_capacity(self.payload.len() * 2);
        for byte in self.payload.iter() {
            let _ = write!(out, "{:02x}", byte);
        }
        out
    }
}
