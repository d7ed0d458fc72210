pub mod crc;
pub mod fname;

pub use crc::*;
