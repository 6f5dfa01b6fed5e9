//! Byte-region cursors used on both sides of the wire: a consuming
//! reader for parsing and a fixed-budget append buffer for rendering.

use bytes::{BufMut, BytesMut};

use crate::error::Error;

/// A buffer which will be consumed by the parsing process.
///
/// The full source region stays reachable through [`ReadBuffer::at_offset`]
/// so that compression pointers can be chased backwards, while forward
/// reads are bounded by the current window.
#[derive(Clone)]
pub struct ReadBuffer<'a> {
    octets: &'a [u8],
    position: usize,
    limit: usize,
}

impl<'a> ReadBuffer<'a> {
    pub fn new(octets: &'a [u8]) -> Self {
        Self {
            octets,
            position: 0,
            limit: octets.len(),
        }
    }

    /// Current cursor position from the start of the source.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Octets still readable in the current window.
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    pub fn next_u8(&mut self) -> Option<u8> {
        if self.remaining() >= 1 {
            let a = self.octets[self.position];
            self.position += 1;
            Some(a)
        } else {
            None
        }
    }

    pub fn next_u16(&mut self) -> Option<u16> {
        if self.remaining() >= 2 {
            let a = self.octets[self.position];
            let b = self.octets[self.position + 1];
            self.position += 2;
            Some(u16::from_be_bytes([a, b]))
        } else {
            None
        }
    }

    pub fn next_u32(&mut self) -> Option<u32> {
        if self.remaining() >= 4 {
            let mut quad = [0; 4];
            quad.copy_from_slice(&self.octets[self.position..self.position + 4]);
            self.position += 4;
            Some(u32::from_be_bytes(quad))
        } else {
            None
        }
    }

    pub fn take(&mut self, size: usize) -> Option<&'a [u8]> {
        if self.remaining() >= size {
            let slice = &self.octets[self.position..self.position + size];
            self.position += size;
            Some(slice)
        } else {
            None
        }
    }

    /// A cursor over the same source, positioned at `position` with no
    /// window restriction.  Used to expand compression pointers.
    pub fn at_offset(&self, position: usize) -> ReadBuffer<'a> {
        Self {
            octets: self.octets,
            position,
            limit: self.octets.len(),
        }
    }

    /// A sub-reader whose forward reads stop after `len` octets.  The
    /// caller must have checked that `len` octets remain.
    pub fn window(&self, len: usize) -> ReadBuffer<'a> {
        Self {
            octets: self.octets,
            position: self.position,
            limit: self.position + len,
        }
    }

    /// Advance past octets a sub-reader has consumed.
    pub fn advance_to(&mut self, position: usize) {
        debug_assert!(position >= self.position && position <= self.limit);
        self.position = position;
    }
}

/// Snapshot of a [`RenderBuffer`]'s mutable state, taken by value so a
/// failed write can be rolled back exactly.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Checkpoint {
    used: usize,
    limit: usize,
}

impl Checkpoint {
    pub fn used(self) -> usize {
        self.used
    }
}

/// An append-only render target with a fixed octet budget.
///
/// Unlike a plain growable buffer, writes past the budget fail with
/// [`Error::NoSpace`] instead of reallocating; the renderer relies on
/// this to honour tail reservations and to discover truncation.
pub struct RenderBuffer {
    octets: BytesMut,
    budget: usize,
    limit: usize,
}

impl RenderBuffer {
    /// A buffer that will accept at most `budget` octets.
    pub fn new(budget: usize) -> Self {
        Self {
            octets: BytesMut::with_capacity(budget),
            budget,
            limit: budget,
        }
    }

    pub fn clear(&mut self) {
        self.octets.clear();
        self.limit = self.budget;
    }

    pub fn used(&self) -> usize {
        self.octets.len()
    }

    /// Octets still writable before the current limit.
    pub fn available(&self) -> usize {
        self.limit - self.octets.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.octets
    }

    /// Temporarily pull the limit back by `n` octets, hiding reserved
    /// tail space from writers.
    pub fn shrink(&mut self, n: usize) {
        debug_assert!(n <= self.limit);
        self.limit -= n;
    }

    pub fn unshrink(&mut self, n: usize) {
        debug_assert!(self.limit + n <= self.budget);
        self.limit += n;
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            used: self.octets.len(),
            limit: self.limit,
        }
    }

    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.octets.truncate(checkpoint.used);
        self.limit = checkpoint.limit;
    }

    pub fn write_u8(&mut self, octet: u8) -> Result<(), Error> {
        self.write_octets(&[octet])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), Error> {
        self.write_octets(&value.to_be_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), Error> {
        self.write_octets(&value.to_be_bytes())
    }

    pub fn write_octets(&mut self, octets: &[u8]) -> Result<(), Error> {
        if octets.len() > self.available() {
            return Err(Error::NoSpace);
        }
        self.octets.put_slice(octets);
        Ok(())
    }

    /// Advance the used count by `n` zero octets, claiming space that
    /// will be overwritten later (the header prefix).
    pub fn skip(&mut self, n: usize) -> Result<(), Error> {
        if n > self.available() {
            return Err(Error::NoSpace);
        }
        self.octets.put_bytes(0, n);
        Ok(())
    }

    /// Overwrite previously written octets in place.
    pub fn patch(&mut self, at: usize, octets: &[u8]) {
        self.octets[at..at + octets.len()].copy_from_slice(octets);
    }

    /// Consume the buffer, yielding the rendered octets.
    pub fn into_octets(self) -> BytesMut {
        self.octets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_past_end() {
        let mut buf = ReadBuffer::new(&[1, 2, 3]);
        assert_eq!(buf.next_u16(), Some(0x0102));
        assert_eq!(buf.next_u16(), None);
        assert_eq!(buf.next_u8(), Some(3));
        assert_eq!(buf.next_u8(), None);
    }

    #[test]
    fn window_bounds_forward_reads() {
        let mut buf = ReadBuffer::new(&[1, 2, 3, 4]);
        buf.next_u8().unwrap();

        let mut window = buf.window(2);
        assert_eq!(window.remaining(), 2);
        assert_eq!(window.next_u16(), Some(0x0203));
        assert_eq!(window.next_u8(), None);

        // the parent still sees the tail once advanced
        buf.advance_to(window.position());
        assert_eq!(buf.next_u8(), Some(4));
    }

    #[test]
    fn budget_is_enforced() {
        let mut buf = RenderBuffer::new(4);
        buf.write_u16(0xbeef).unwrap();
        assert_eq!(buf.write_u32(1), Err(Error::NoSpace));
        buf.write_u16(0xcafe).unwrap();
        assert_eq!(buf.available(), 0);
        assert_eq!(buf.as_slice(), &[0xbe, 0xef, 0xca, 0xfe]);
    }

    #[test]
    fn shrink_hides_tail_space() {
        let mut buf = RenderBuffer::new(4);
        buf.shrink(2);
        buf.write_u16(1).unwrap();
        assert_eq!(buf.write_u8(0), Err(Error::NoSpace));
        buf.unshrink(2);
        buf.write_u16(2).unwrap();
    }

    #[test]
    fn rollback_restores_used_and_limit() {
        let mut buf = RenderBuffer::new(8);
        buf.write_u16(0xaaaa).unwrap();
        let checkpoint = buf.checkpoint();
        buf.shrink(2);
        buf.write_u32(0xbbbb_bbbb).unwrap();
        buf.rollback(checkpoint);
        assert_eq!(buf.used(), 2);
        assert_eq!(buf.available(), 6);
    }

    #[test]
    fn patch_overwrites_prefix() {
        let mut buf = RenderBuffer::new(8);
        buf.skip(4).unwrap();
        buf.write_u16(0x0102).unwrap();
        buf.patch(0, &[9, 8, 7, 6]);
        assert_eq!(buf.as_slice(), &[9, 8, 7, 6, 1, 2]);
    }
}
