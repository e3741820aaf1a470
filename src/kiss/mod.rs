//! KISS Protocol Implementation
//!
//! Decoding of the KISS byte stream exchanged with a TNC into frames.

pub mod codec;
pub mod constants;
pub mod types;

pub use codec::KissDecoder;
pub use constants::*;
pub use types::Frame;
