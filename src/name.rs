//! The domain name codec: an owned label-sequence type, wire decoding
//! through a decompression context into scratchpad storage, and wire
//! encoding through the render compression table.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use bytes::Bytes;

use crate::arena::{Block, BlockWriter};
use crate::buffer::{ReadBuffer, RenderBuffer};
use crate::compress::{Compression, Decompression};
use crate::error::Error;

/// Maximum encoded length of a domain name: the number of labels plus
/// the sum of the lengths of the labels.
pub const DOMAINNAME_MAX_LEN: usize = 255;

/// Maximum length of a single label in a domain name.
pub const LABEL_MAX_LEN: usize = 63;

/// A label is a sequence of up to 63 octets, compared as
/// case-insensitive ASCII.  Octets are stored as they appeared so that
/// re-rendering reproduces the original spelling.
#[derive(Debug, Clone)]
pub struct Label {
    octets: Bytes,
}

impl Label {
    /// Create a new, empty, label.
    pub fn new() -> Self {
        Self {
            octets: Bytes::new(),
        }
    }

    pub(crate) fn from_stored(octets: Bytes) -> Self {
        debug_assert!(octets.len() <= LABEL_MAX_LEN);
        Self { octets }
    }

    #[allow(clippy::missing_panics_doc)]
    pub fn len(&self) -> u8 {
        // safe as the `TryFrom` ensures a label is <= 63 bytes
        self.octets.len().try_into().unwrap()
    }

    pub fn is_empty(&self) -> bool {
        self.octets.is_empty()
    }

    pub fn octets(&self) -> &Bytes {
        &self.octets
    }
}

impl Default for Label {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.octets.eq_ignore_ascii_case(&other.octets)
    }
}

impl Eq for Label {}

impl Hash for Label {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for octet in &self.octets {
            state.write_u8(octet.to_ascii_lowercase());
        }
    }
}

impl TryFrom<&[u8]> for Label {
    type Error = Error;

    fn try_from(octets: &[u8]) -> Result<Self, Self::Error> {
        if octets.len() > LABEL_MAX_LEN {
            return Err(Error::BadLabel);
        }

        Ok(Self {
            octets: Bytes::copy_from_slice(octets),
        })
    }
}

/// A domain name is a sequence of labels ending with the empty root
/// label.  A name must be 255 octets or shorter in its wire encoding,
/// counting both length and label octets.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct DomainName {
    labels: Vec<Label>,
    // INVARIANT: len == len(labels) + sum(map(len, labels))
    len: usize,
}

impl DomainName {
    pub fn root_domain() -> Self {
        DomainName {
            labels: vec![Label::new()],
            len: 1,
        }
    }

    pub fn is_root(&self) -> bool {
        self.len == 1 && self.labels[0].is_empty()
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// The number of octets the name occupies on the wire when written
    /// without compression.
    pub fn wire_len(&self) -> usize {
        self.len
    }

    pub fn to_dotted_string(&self) -> String {
        if self.is_root() {
            return ".".to_string();
        }

        let mut out = String::with_capacity(self.len);
        let mut first = true;
        for label in &self.labels {
            if first {
                first = false;
            } else {
                out.push('.');
            }
            for octet in label.octets() {
                out.push(*octet as char);
            }
        }

        out
    }

    pub fn from_dotted_string(s: &str) -> Option<Self> {
        if s == "." {
            return Some(Self::root_domain());
        }

        let chunks = s.split('.').collect::<Vec<_>>();
        let mut labels = Vec::with_capacity(chunks.len());

        for (i, label_chars) in chunks.iter().enumerate() {
            if label_chars.is_empty() && i != chunks.len() - 1 {
                return None;
            }

            match label_chars.as_bytes().try_into() {
                Ok(label) => labels.push(label),
                Err(_) => return None,
            }
        }

        Self::from_labels(labels)
    }

    pub fn from_labels(labels: Vec<Label>) -> Option<Self> {
        if labels.is_empty() {
            return None;
        }

        let mut len = labels.len();
        let mut blank_label = false;

        for label in &labels {
            if blank_label {
                return None;
            }

            blank_label |= label.is_empty();
            len += label.len() as usize;
        }

        if blank_label && len <= DOMAINNAME_MAX_LEN {
            Some(Self { labels, len })
        } else {
            None
        }
    }

    /// Decode a name from the wire, storing label octets in `scratch`.
    ///
    /// Fails with [`Error::NoSpace`] when the scratch block cannot hold
    /// the labels; the caller grows the scratchpad and retries.
    pub fn from_wire(
        source: &mut ReadBuffer<'_>,
        dctx: &Decompression,
        scratch: &mut Block,
    ) -> Result<Self, Error> {
        let mut labels = Vec::new();
        let mut len = 0;

        walk(source, dctx, |octets| {
            len += octets.len() + 1;
            if octets.is_empty() {
                labels.push(Label::new());
            } else {
                let stored = scratch.write(octets).ok_or(Error::NoSpace)?;
                labels.push(Label::from_stored(stored));
            }
            Ok(())
        })?;

        Ok(Self { labels, len })
    }

    /// Encode the name, emitting a compression pointer when the whole
    /// name was written before and remembering it otherwise.
    pub fn to_wire(&self, cctx: &mut Compression, target: &mut RenderBuffer) -> Result<(), Error> {
        if let Some(offset) = cctx.find(self) {
            return target.write_u16(0xc000 | offset);
        }

        cctx.insert(self, target.used());
        for label in &self.labels {
            target.write_u8(label.len())?;
            target.write_octets(label.octets())?;
        }

        Ok(())
    }
}

impl fmt::Debug for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainName")
            .field("to_dotted_string()", &self.to_dotted_string())
            .finish()
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", &self.to_dotted_string())
    }
}

impl FromStr for DomainName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DomainName::from_dotted_string(s).ok_or(Error::BadLabel)
    }
}

/// Copy a possibly-compressed name out of `source` into `writer` in
/// uncompressed wire form.  Used for names embedded in record data,
/// which are stored expanded.
pub(crate) fn copy_uncompressed(
    source: &mut ReadBuffer<'_>,
    dctx: &Decompression,
    writer: &mut BlockWriter<'_>,
) -> Result<(), Error> {
    walk(source, dctx, |octets| {
        #[allow(clippy::cast_possible_truncation)]
        writer.append(&[octets.len() as u8]).ok_or(Error::NoSpace)?;
        writer.append(octets).ok_or(Error::NoSpace)?;
        Ok(())
    })
}

/// Walk the labels of a wire-format name, chasing compression pointers
/// under the context's rules, and hand each label (the empty root label
/// last) to `on_label`.  `source` is left positioned after the name.
fn walk<'a, F>(source: &mut ReadBuffer<'a>, dctx: &Decompression, mut on_label: F) -> Result<(), Error>
where
    F: FnMut(&'a [u8]) -> Result<(), Error>,
{
    let mut reader = source.clone();
    // Pointers must target an earlier offset than any seen so far, which
    // rules out loops.
    let mut min_pos = source.position();
    let mut resume = None;
    let mut total = 0;

    loop {
        let length = reader.next_u8().ok_or(Error::UnexpectedEnd)?;
        match length & 0b1100_0000 {
            0b1100_0000 => {
                if !dctx.pointers_allowed() {
                    return Err(Error::BadPointer);
                }
                let lo = reader.next_u8().ok_or(Error::UnexpectedEnd)?;
                let ptr = usize::from(u16::from_be_bytes([length & 0b0011_1111, lo]));
                if ptr >= min_pos {
                    return Err(Error::BadPointer);
                }
                if resume.is_none() {
                    resume = Some(reader.position());
                }
                min_pos = ptr;
                reader = reader.at_offset(ptr);
            }
            0b0000_0000 => {
                let length = usize::from(length);
                total += length + 1;
                if total > DOMAINNAME_MAX_LEN {
                    return Err(Error::NameTooLong);
                }
                if length == 0 {
                    on_label(&[])?;
                    break;
                }
                let octets = reader.take(length).ok_or(Error::UnexpectedEnd)?;
                on_label(octets)?;
            }
            _ => return Err(Error::BadLabel),
        }
    }

    source.advance_to(resume.unwrap_or_else(|| reader.position()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Scratchpad;

    fn decode(octets: &[u8]) -> Result<DomainName, Error> {
        let mut pad = Scratchpad::new();
        let dctx = Decompression::new(-1, false);
        DomainName::from_wire(&mut ReadBuffer::new(octets), &dctx, pad.current())
    }

    #[test]
    fn decode_simple_name() {
        let name = decode(&[
            7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0,
        ])
        .unwrap();
        assert_eq!(name.to_dotted_string(), "example.com.");
        assert_eq!(name.wire_len(), 13);

        assert!(decode(&[0]).unwrap().is_root());
    }

    #[test]
    fn decode_follows_pointers() {
        let octets = [
            3, b'c', b'o', b'm', 0, // "com." at offset 0
            7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 0xc0, 0, // "example" + ptr
        ];
        let mut pad = Scratchpad::new();
        let dctx = Decompression::new(-1, false);
        let mut buf = ReadBuffer::new(&octets);
        buf.take(5).unwrap();
        let name = DomainName::from_wire(&mut buf, &dctx, pad.current()).unwrap();
        assert_eq!(name.to_dotted_string(), "example.com.");
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn decode_rejects_forward_and_self_pointers() {
        assert_eq!(decode(&[0xc0, 0]), Err(Error::BadPointer));
        assert_eq!(decode(&[0xc0, 9]), Err(Error::BadPointer));
    }

    #[test]
    fn decode_rejects_reserved_length_bits() {
        assert_eq!(decode(&[0b1000_0001, b'x', 0]), Err(Error::BadLabel));
    }

    #[test]
    fn decode_rejects_overlong_name() {
        let mut octets = Vec::new();
        for _ in 0..5 {
            octets.push(63);
            octets.extend_from_slice(&[b'a'; 63]);
        }
        octets.push(0);
        assert_eq!(decode(&octets), Err(Error::NameTooLong));
    }

    #[test]
    fn comparison_ignores_ascii_case() {
        let a = DomainName::from_dotted_string("WWW.Example.COM.").unwrap();
        let b = DomainName::from_dotted_string("www.example.com.").unwrap();
        assert_eq!(a, b);
        // but the stored spelling survives
        assert_eq!(a.to_dotted_string(), "WWW.Example.COM.");
    }

    #[test]
    #[rustfmt::skip]
    fn encode_compresses_repeats() {
        let mut cctx = Compression::new();
        let mut target = RenderBuffer::new(64);
        target.write_u32(0).unwrap();

        let name = DomainName::from_dotted_string("www.example.com.").unwrap();
        name.to_wire(&mut cctx, &mut target).unwrap();
        name.to_wire(&mut cctx, &mut target).unwrap();

        assert_eq!(
            target.as_slice(),
            &[
                0, 0, 0, 0,
                // name
                3, 119, 119, 119, // "www"
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 99, 111, 109, 0, // "com"
                // pointer back to offset 4
                0b1100_0000, 0b0000_0100,
            ][..],
        );
    }

    #[test]
    fn encode_after_rollback_writes_labels_again() {
        let mut cctx = Compression::new();
        let mut target = RenderBuffer::new(64);

        let name = DomainName::from_dotted_string("a.example.").unwrap();
        let checkpoint = target.checkpoint();
        name.to_wire(&mut cctx, &mut target).unwrap();

        cctx.rollback(checkpoint.used());
        target.rollback(checkpoint);

        // nothing of the name survives, so no pointer may be emitted
        name.to_wire(&mut cctx, &mut target).unwrap();
        assert_eq!(target.used(), name.wire_len());
    }

    #[test]
    fn copy_uncompressed_expands_pointers() {
        let octets = [
            3, b'c', b'o', b'm', 0, // target of the pointer
            0xc0, 0, // the name: just a pointer
        ];
        let dctx = Decompression::new(-1, false);
        let mut pad = Scratchpad::new();
        let mut buf = ReadBuffer::new(&octets);
        buf.take(5).unwrap();

        let mut writer = pad.current().writer();
        copy_uncompressed(&mut buf, &dctx, &mut writer).unwrap();
        assert_eq!(&writer.finish()[..], &[3, b'c', b'o', b'm', 0]);
        assert_eq!(buf.remaining(), 0);
    }
}
