//! Transaction-signature support: the owned TSIG payload, its rdata
//! codec, and the signing primitive the engine consumes but does not
//! implement.

use bytes::{BufMut, Bytes, BytesMut};

use crate::buffer::ReadBuffer;
use crate::error::Error;
use crate::name::{DomainName, Label};
use crate::types::Rcode;

/// The decoded rdata of a TSIG record.
///
/// `time_signed` is the 48-bit seconds-since-epoch field; the upper 16
/// bits of the `u64` are always zero.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TsigData {
    pub algorithm: DomainName,
    pub time_signed: u64,
    pub fudge: u16,
    pub mac: Bytes,
    pub original_id: u16,
    pub error: Rcode,
    pub other: Bytes,
}

impl TsigData {
    /// Parse a TSIG payload from canonical (uncompressed) rdata octets.
    pub fn from_rdata(octets: &[u8]) -> Result<Self, Error> {
        let mut buffer = ReadBuffer::new(octets);

        let algorithm = uncompressed_name(&mut buffer)?;

        let time_hi = buffer.next_u16().ok_or(Error::UnexpectedEnd)?;
        let time_lo = buffer.next_u32().ok_or(Error::UnexpectedEnd)?;
        let fudge = buffer.next_u16().ok_or(Error::UnexpectedEnd)?;

        let mac_size = buffer.next_u16().ok_or(Error::UnexpectedEnd)?;
        let mac = buffer
            .take(usize::from(mac_size))
            .ok_or(Error::UnexpectedEnd)?;

        let original_id = buffer.next_u16().ok_or(Error::UnexpectedEnd)?;
        let error = buffer.next_u16().ok_or(Error::UnexpectedEnd)?;

        let other_len = buffer.next_u16().ok_or(Error::UnexpectedEnd)?;
        let other = buffer
            .take(usize::from(other_len))
            .ok_or(Error::UnexpectedEnd)?;

        if buffer.remaining() != 0 {
            return Err(Error::FormErr);
        }

        Ok(Self {
            algorithm,
            time_signed: (u64::from(time_hi) << 32) | u64::from(time_lo),
            fudge,
            mac: Bytes::copy_from_slice(mac),
            original_id,
            error: Rcode::from(error),
            other: Bytes::copy_from_slice(other),
        })
    }

    /// Serialise the payload back into rdata octets.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_rdata(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(
            self.algorithm.wire_len() + 16 + self.mac.len() + self.other.len(),
        );

        for label in self.algorithm.labels() {
            out.put_u8(label.len());
            out.put_slice(label.octets());
        }
        out.put_u16((self.time_signed >> 32) as u16);
        out.put_u32(self.time_signed as u32);
        out.put_u16(self.fudge);
        out.put_u16(self.mac.len() as u16);
        out.put_slice(&self.mac);
        out.put_u16(self.original_id);
        out.put_u16(u16::from(self.error));
        out.put_u16(self.other.len() as u16);
        out.put_slice(&self.other);

        out.freeze()
    }
}

/// The signing and verification primitive.
///
/// The engine hands over the covered wire octets and the payload; how
/// the MAC is computed, and against which secret, is entirely the
/// implementation's business.
pub trait TsigKey {
    /// The key name, used as the owner name of rendered TSIG records.
    fn name(&self) -> &DomainName;

    /// Check `tsig` against the covered octets, returning the status to
    /// latch into the message.
    fn verify(&self, covered: &[u8], tsig: &TsigData) -> Rcode;

    /// Produce the payload for a message whose covered octets are
    /// `covered`.  `query` carries the request's TSIG when signing a
    /// response.
    fn sign(&self, covered: &[u8], query: Option<&TsigData>) -> Result<TsigData, Error>;
}

fn uncompressed_name(buffer: &mut ReadBuffer<'_>) -> Result<DomainName, Error> {
    let mut labels = Vec::new();
    loop {
        let len = buffer.next_u8().ok_or(Error::UnexpectedEnd)?;
        if len & 0b1100_0000 != 0 {
            return Err(Error::BadPointer);
        }
        if len == 0 {
            labels.push(Label::new());
            break;
        }
        let octets = buffer.take(usize::from(len)).ok_or(Error::UnexpectedEnd)?;
        labels.push(Label::try_from(octets)?);
    }
    DomainName::from_labels(labels).ok_or(Error::NameTooLong)
}
