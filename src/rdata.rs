//! The record-data codec: decoding rdata into canonical (expanded)
//! form held in scratchpad storage, and rendering whole record sets
//! under a compression context.
//!
//! Names embedded in record data may arrive compressed; they are stored
//! expanded, so rendering can copy the payload verbatim.

use bytes::Bytes;

use crate::arena::{Block, BlockWriter};
use crate::buffer::{ReadBuffer, RenderBuffer};
use crate::compress::{Compression, Decompression};
use crate::error::Error;
use crate::name::{self, DomainName};
use crate::types::{RecordClass, RecordType};

/// Decode one record's rdata from `source`, a window restricted to the
/// record's rdata length, into `scratch`.
///
/// Fails with [`Error::NoSpace`] when the scratch block is too small;
/// the caller grows the scratchpad under the sized-growth rule and
/// retries.  Any other error is final.
pub fn from_wire(
    _rdclass: RecordClass,
    rtype: RecordType,
    source: &mut ReadBuffer<'_>,
    dctx: &Decompression,
    scratch: &mut Block,
) -> Result<Bytes, Error> {
    let mut writer = scratch.writer();

    match rtype {
        RecordType::NS
        | RecordType::MD
        | RecordType::MF
        | RecordType::CNAME
        | RecordType::MB
        | RecordType::MG
        | RecordType::MR
        | RecordType::PTR => {
            name::copy_uncompressed(source, dctx, &mut writer)?;
        }
        RecordType::SOA => {
            name::copy_uncompressed(source, dctx, &mut writer)?;
            name::copy_uncompressed(source, dctx, &mut writer)?;
            copy_octets(source, &mut writer, 20)?;
        }
        RecordType::MINFO => {
            name::copy_uncompressed(source, dctx, &mut writer)?;
            name::copy_uncompressed(source, dctx, &mut writer)?;
        }
        RecordType::MX => {
            copy_octets(source, &mut writer, 2)?;
            name::copy_uncompressed(source, dctx, &mut writer)?;
        }
        RecordType::SRV => {
            copy_octets(source, &mut writer, 6)?;
            name::copy_uncompressed(source, dctx, &mut writer)?;
        }
        RecordType::SIG => {
            copy_octets(source, &mut writer, 18)?;
            name::copy_uncompressed(source, dctx, &mut writer)?;
            copy_rest(source, &mut writer)?;
        }
        RecordType::TSIG => {
            name::copy_uncompressed(source, dctx, &mut writer)?;
            copy_rest(source, &mut writer)?;
        }
        RecordType::A => {
            copy_octets(source, &mut writer, 4)?;
        }
        RecordType::AAAA => {
            copy_octets(source, &mut writer, 16)?;
        }
        _ => {
            copy_rest(source, &mut writer)?;
        }
    }

    if source.remaining() != 0 {
        return Err(Error::FormErr);
    }

    Ok(writer.finish())
}

/// The covered type of a signature record, held in its first two rdata
/// octets.
pub fn covers(data: &[u8]) -> RecordType {
    if data.len() < 2 {
        return crate::types::COVERS_NONE;
    }
    RecordType::from(u16::from_be_bytes([data[0], data[1]]))
}

/// Render a whole record set: one wire record per rdata, or the bare
/// question form when `question` is set.  `count` is advanced per
/// record actually completed, so a failed write reports how far the
/// set got.
#[allow(clippy::too_many_arguments)]
pub fn set_to_wire<'a, I>(
    owner: &DomainName,
    rtype: RecordType,
    rdclass: RecordClass,
    ttl: u32,
    question: bool,
    rdatas: I,
    cctx: &mut Compression,
    target: &mut RenderBuffer,
    count: &mut usize,
) -> Result<(), Error>
where
    I: Iterator<Item = &'a [u8]>,
{
    if question {
        owner.to_wire(cctx, target)?;
        target.write_u16(u16::from(rtype))?;
        target.write_u16(u16::from(rdclass))?;
        *count += 1;
        return Ok(());
    }

    for data in rdatas {
        owner.to_wire(cctx, target)?;
        target.write_u16(u16::from(rtype))?;
        target.write_u16(u16::from(rdclass))?;
        target.write_u32(ttl)?;
        let rdlength = u16::try_from(data.len()).map_err(|_| Error::FormErr)?;
        target.write_u16(rdlength)?;
        target.write_octets(data)?;
        *count += 1;
    }

    Ok(())
}

fn copy_octets(
    source: &mut ReadBuffer<'_>,
    writer: &mut BlockWriter<'_>,
    len: usize,
) -> Result<(), Error> {
    let octets = source.take(len).ok_or(Error::UnexpectedEnd)?;
    writer.append(octets).ok_or(Error::NoSpace)?;
    Ok(())
}

fn copy_rest(source: &mut ReadBuffer<'_>, writer: &mut BlockWriter<'_>) -> Result<(), Error> {
    copy_octets(source, writer, source.remaining())
}
