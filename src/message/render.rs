//! Rendering a message into a caller-owned buffer under a reservation
//! budget, with per-record-set rollback of both the buffer and the
//! compression table.

use super::{Message, WireHeader};
use crate::buffer::RenderBuffer;
use crate::compress::Compression;
use crate::error::Error;
use crate::rdata;
use crate::types::{
    Intent, Rcode, RecordClass, RecordType, Section, COVERS_NONE, EDNS_RCODE_MASK,
    EDNS_RCODE_SHIFT, FLAG_MASK, FLAG_QR, HEADER_LEN, OPCODE_MASK, OPCODE_SHIFT, OPT_FIXED_LEN,
    RCODE_MASK,
};

impl Message {
    /// Take ownership of `buffer` and start rendering into it.  The
    /// first 12 octets are claimed for the header, which is written
    /// last.
    pub fn render_begin(&mut self, mut buffer: RenderBuffer) -> Result<(), Error> {
        if self.intent != Intent::Render || self.buffer.is_some() {
            return Err(Error::InvalidState);
        }

        buffer.clear();
        if buffer.available() < HEADER_LEN {
            return Err(Error::NoSpace);
        }

        self.cctx = Some(Compression::new());
        buffer.skip(HEADER_LEN)?;
        self.buffer = Some(buffer);

        Ok(())
    }

    /// Hold `space` octets back from the writable tail of the buffer.
    pub fn render_reserve(&mut self, space: usize) -> Result<(), Error> {
        let buffer = self.buffer.as_ref().ok_or(Error::InvalidState)?;
        if buffer.available() < space + self.reserved {
            return Err(Error::NoSpace);
        }
        self.reserved += space;
        Ok(())
    }

    /// Return `space` octets of reservation to the writable window.
    pub fn render_release(&mut self, space: usize) -> Result<(), Error> {
        if self.buffer.is_none() {
            return Err(Error::InvalidState);
        }
        if self.reserved < space {
            return Err(Error::NoSpace);
        }
        self.reserved -= space;
        Ok(())
    }

    /// Render every not-yet-rendered record set of a section.
    ///
    /// On failure the buffer and the compression table are restored to
    /// the state after the last complete set, the partial count is
    /// still added to the section tally, and the error is surfaced so
    /// the caller can retry with a bigger buffer.
    ///
    /// `priority` and `options` are accepted for forward compatibility
    /// and currently ignored.
    pub fn render_section(
        &mut self,
        section: Section,
        _priority: u32,
        _options: u32,
    ) -> Result<(), Error> {
        let mut buffer = self.buffer.take().ok_or(Error::InvalidState)?;
        let mut cctx = self.cctx.take().ok_or(Error::InvalidState)?;

        if self.sections[section.index()].is_empty() {
            self.buffer = Some(buffer);
            self.cctx = Some(cctx);
            return Ok(());
        }

        buffer.shrink(self.reserved);
        let mut total = 0;
        let result = self.render_section_inner(section, &mut buffer, &mut cctx, &mut total);
        buffer.unshrink(self.reserved);

        self.counts[section.index()] += u16::try_from(total).unwrap_or(u16::MAX);
        self.buffer = Some(buffer);
        self.cctx = Some(cctx);

        result
    }

    fn render_section_inner(
        &mut self,
        section: Section,
        buffer: &mut RenderBuffer,
        cctx: &mut Compression,
        total: &mut usize,
    ) -> Result<(), Error> {
        let sidx = section.index();

        for name_pos in 0..self.sections[sidx].len() {
            let name = self.sections[sidx][name_pos];

            for set_pos in 0..self.names.get(name).sets.len() {
                let set = self.names.get(name).sets[set_pos];
                if self.sets.get(set).rendered {
                    continue;
                }

                let checkpoint = buffer.checkpoint();
                let mut count = 0;
                let result = {
                    let view = self.sets.get(set);
                    let records = match view.list {
                        Some(list) => &self.lists.get(list).records[..],
                        None => &[],
                    };
                    rdata::set_to_wire(
                        &self.names.get(name).domain,
                        view.rtype,
                        view.rdclass,
                        view.ttl,
                        view.question,
                        records.iter().map(|r| self.records.get(*r).data.as_ref()),
                        cctx,
                        buffer,
                        &mut count,
                    )
                };

                *total += count;

                if let Err(error) = result {
                    tracing::debug!(%section, "rolling back partial record set");
                    cctx.rollback(checkpoint.used());
                    buffer.rollback(checkpoint);
                    return Err(error);
                }

                self.sets.get_mut(set).rendered = true;
            }
        }

        Ok(())
    }

    /// Swap in a larger empty buffer, carrying over everything written
    /// so far.  Returns the old buffer.
    pub fn render_changebuffer(&mut self, mut new: RenderBuffer) -> Result<RenderBuffer, Error> {
        let old = self.buffer.take().ok_or(Error::InvalidState)?;

        new.clear();
        if new.available() <= old.used() {
            self.buffer = Some(old);
            return Err(Error::NoSpace);
        }
        new.write_octets(old.as_slice())?;

        self.buffer = Some(new);
        Ok(old)
    }

    /// Finish rendering: emit the OPT record and transaction signature
    /// when called for, write the header into the reserved prefix, and
    /// hand the buffer back.
    pub fn render_end(&mut self) -> Result<RenderBuffer, Error> {
        if self.buffer.is_none() || self.cctx.is_none() {
            return Err(Error::InvalidState);
        }

        // An extended rcode cannot be expressed without an OPT record.
        if (self.rcode & !RCODE_MASK) != 0 && self.opt.is_none() {
            return Err(Error::FormErr);
        }

        if let Some(opt) = self.opt {
            let rdata_len = self.first_rdata_len(opt)?;
            self.render_release(OPT_FIXED_LEN + rdata_len)?;

            {
                let set = self.sets.get_mut(opt);
                set.ttl = (set.ttl & !EDNS_RCODE_MASK)
                    | ((u32::from(self.rcode) << EDNS_RCODE_SHIFT) & EDNS_RCODE_MASK);
            }

            let mut buffer = self.buffer.take().ok_or(Error::InvalidState)?;
            let mut cctx = self.cctx.take().ok_or(Error::InvalidState)?;
            let mut count = 0;
            let result = {
                let view = self.sets.get(opt);
                let records = match view.list {
                    Some(list) => &self.lists.get(list).records[..],
                    None => &[],
                };
                rdata::set_to_wire(
                    &crate::name::DomainName::root_domain(),
                    view.rtype,
                    view.rdclass,
                    view.ttl,
                    false,
                    records.iter().map(|r| self.records.get(*r).data.as_ref()),
                    &mut cctx,
                    &mut buffer,
                    &mut count,
                )
            };
            self.counts[Section::Additional.index()] += u16::try_from(count).unwrap_or(u16::MAX);
            self.buffer = Some(buffer);
            self.cctx = Some(cctx);
            result?;
        }

        if self.tsigkey.is_some()
            || (self.flags & FLAG_QR != 0 && self.querytsigstatus != Rcode::NoError)
        {
            // the signature covers the message as it stands, so the
            // header must be in place before the key sees it
            self.write_header()?;
            self.sign_tsig()?;
            self.render_section(Section::Tsig, 0, 0)?;
        }

        self.write_header()?;
        let buffer = self.buffer.take().ok_or(Error::InvalidState)?;
        self.cctx = None;
        Ok(buffer)
    }

    fn write_header(&mut self) -> Result<(), Error> {
        let header = WireHeader {
            id: self.id,
            flags: ((u16::from(u8::from(self.opcode)) << OPCODE_SHIFT) & OPCODE_MASK)
                | (self.rcode & RCODE_MASK)
                | (self.flags & FLAG_MASK),
            counts: [
                self.counts[Section::Question.index()],
                self.counts[Section::Answer.index()],
                self.counts[Section::Authority.index()],
                // on the wire the signature counts as additional data
                self.counts[Section::Additional.index()] + self.counts[Section::Tsig.index()],
            ],
        };
        let buffer = self.buffer.as_mut().ok_or(Error::InvalidState)?;
        buffer.patch(0, &header.to_wire());
        Ok(())
    }

    fn sign_tsig(&mut self) -> Result<(), Error> {
        let (data, owner) = {
            let buffer = self.buffer.as_ref().ok_or(Error::InvalidState)?;
            let key = self
                .tsigkey
                .as_ref()
                .ok_or(Error::Tsig(self.querytsigstatus))?;
            (
                key.sign(buffer.as_slice(), self.querytsig.as_ref())?,
                key.name().clone(),
            )
        };

        let rdata = data.to_rdata();
        self.tsig = Some(data);

        let name = self.alloc_name(owner);
        let record = self.records.alloc();
        {
            let entry = self.records.get_mut(record);
            entry.rdclass = RecordClass::ANY;
            entry.rtype = RecordType::TSIG;
            entry.data = rdata;
        }
        let list = self.lists.alloc();
        self.init_record_list(list, RecordType::TSIG, COVERS_NONE, RecordClass::ANY, 0);
        self.lists.get_mut(list).records.push(record);
        let set = self.sets.alloc();
        self.bind_record_set(set, list);
        self.names.get_mut(name).sets.push(set);
        self.sections[Section::Tsig.index()].push(name);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_requires_render_intent_and_room() {
        let mut parse_msg = Message::new(Intent::Parse);
        assert_eq!(
            parse_msg.render_begin(RenderBuffer::new(512)),
            Err(Error::InvalidState)
        );

        let mut msg = Message::new(Intent::Render);
        assert_eq!(
            msg.render_begin(RenderBuffer::new(HEADER_LEN - 1)),
            Err(Error::NoSpace)
        );
        msg.render_begin(RenderBuffer::new(512)).unwrap();
        assert_eq!(
            msg.render_begin(RenderBuffer::new(512)),
            Err(Error::InvalidState)
        );
    }

    #[test]
    fn reserve_and_release_are_exact_inverses() {
        let mut msg = Message::new(Intent::Render);
        msg.render_begin(RenderBuffer::new(64)).unwrap();

        msg.render_reserve(10).unwrap();
        assert_eq!(msg.reserved(), 10);
        msg.render_release(10).unwrap();
        assert_eq!(msg.reserved(), 0);

        msg.render_reserve(10).unwrap();
        assert_eq!(msg.render_release(11), Err(Error::NoSpace));
        assert_eq!(msg.reserved(), 10);
    }

    #[test]
    fn reserve_honours_the_buffer_budget() {
        let mut msg = Message::new(Intent::Render);
        msg.render_begin(RenderBuffer::new(64)).unwrap();

        // 12 octets already claimed for the header
        assert_eq!(msg.render_reserve(53), Err(Error::NoSpace));
        msg.render_reserve(52).unwrap();
        assert_eq!(msg.render_reserve(1), Err(Error::NoSpace));
    }

    #[test]
    fn changebuffer_requires_strictly_more_room() {
        let mut msg = Message::new(Intent::Render);
        msg.render_begin(RenderBuffer::new(64)).unwrap();

        assert_eq!(
            msg.render_changebuffer(RenderBuffer::new(HEADER_LEN))
                .err(),
            Some(Error::NoSpace)
        );
        let old = msg.render_changebuffer(RenderBuffer::new(128)).unwrap();
        assert_eq!(old.used(), HEADER_LEN);

        let rendered = msg.render_end().unwrap();
        assert_eq!(rendered.used(), HEADER_LEN);
    }

    #[test]
    fn extended_rcode_without_opt_fails() {
        let mut msg = Message::new(Intent::Render);
        msg.render_begin(RenderBuffer::new(64)).unwrap();
        msg.set_rcode(Rcode::from(0x123));
        assert_eq!(msg.render_end().err(), Some(Error::FormErr));

        msg.set_rcode(Rcode::NoError);
        assert!(msg.render_end().is_ok());
    }
}
