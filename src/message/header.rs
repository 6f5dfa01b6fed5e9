//! The fixed 12-octet header codec.

use crate::buffer::ReadBuffer;
use crate::error::Error;
use crate::types::HEADER_LEN;

/// The header as it appears on the wire: the id, the undissected flag
/// word, and the four section counts.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct WireHeader {
    pub id: u16,
    pub flags: u16,
    pub counts: [u16; 4],
}

impl WireHeader {
    pub fn from_wire(buffer: &mut ReadBuffer<'_>) -> Result<Self, Error> {
        if buffer.remaining() < HEADER_LEN {
            return Err(Error::UnexpectedEnd);
        }

        let id = buffer.next_u16().ok_or(Error::UnexpectedEnd)?;
        let flags = buffer.next_u16().ok_or(Error::UnexpectedEnd)?;
        let mut counts = [0; 4];
        for count in &mut counts {
            *count = buffer.next_u16().ok_or(Error::UnexpectedEnd)?;
        }

        Ok(Self { id, flags, counts })
    }

    pub fn to_wire(self) -> [u8; HEADER_LEN] {
        let mut out = [0; HEADER_LEN];
        out[0..2].copy_from_slice(&self.id.to_be_bytes());
        out[2..4].copy_from_slice(&self.flags.to_be_bytes());
        for (i, count) in self.counts.iter().enumerate() {
            out[4 + 2 * i..6 + 2 * i].copy_from_slice(&count.to_be_bytes());
        }
        out
    }
}
