//! KISS Protocol Constants

// Special characters
pub const KISS_FEND: u8 = 0xC0;
pub const KISS_FESC: u8 = 0xDB;
pub const KISS_TFEND: u8 = 0xDC;
pub const KISS_TFESC: u8 = 0xDD;

// Commands (low nibble of the type byte)
pub const KISS_CMD_DATA: u8 = 0x00;
pub const KISS_CMD_TX_DELAY: u8 = 0x01;

// Upper bound on a single unescaped frame; longer input is discarded
pub const KISS_MAX_FRAME_LEN: usize = 4096;
