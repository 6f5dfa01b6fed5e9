//! Wire-format parsing: the header, the question section, and the
//! three record sections, with class latching, record-set merging, and
//! OPT/TSIG recognition.

use std::cmp;

use bytes::Bytes;

use super::{ClassState, Message, WireHeader};
use crate::arena::SCRATCHPAD_SIZE;
use crate::buffer::ReadBuffer;
use crate::compress::{Decompression, Method};
use crate::error::Error;
use crate::name::DomainName;
use crate::rdata;
use crate::tsig::TsigData;
use crate::types::{
    Intent, Opcode, Rcode, RecordClass, RecordType, Section, COVERS_NONE, EDNS_RCODE_MASK,
    EDNS_RCODE_SHIFT, FLAG_MASK, OPCODE_MASK, OPCODE_SHIFT, RCODE_MASK,
};

impl Message {
    /// Parse a wire-format message into this (parse-intent) message.
    ///
    /// With `preserve_order` set, records are kept as distinct
    /// occurrences in wire order instead of being merged into record
    /// sets; dynamic-update messages always behave this way.
    pub fn parse(&mut self, source: &[u8], preserve_order: bool) -> Result<(), Error> {
        if self.intent != Intent::Parse {
            return Err(Error::InvalidState);
        }

        self.header_ok = false;
        self.question_ok = false;

        let mut buffer = ReadBuffer::new(source);
        let header = WireHeader::from_wire(&mut buffer)?;
        self.id = header.id;
        #[allow(clippy::cast_possible_truncation)]
        {
            self.opcode = Opcode::from(((header.flags & OPCODE_MASK) >> OPCODE_SHIFT) as u8);
        }
        self.rcode = header.flags & RCODE_MASK;
        self.flags = header.flags & FLAG_MASK;
        for (section, count) in header.counts.iter().enumerate() {
            self.counts[section] = *count;
        }
        self.counts[Section::Tsig.index()] = 0;
        self.header_ok = true;

        // No EDNS information is known before any OPT record is seen.
        let mut dctx = Decompression::new(-1, false);
        if dctx.edns() > 1 || !dctx.strict() {
            dctx.set_method(Method::Global);
        } else {
            dctx.set_method(Method::Global14);
        }

        self.get_questions(&mut buffer, &dctx)?;
        self.question_ok = true;

        self.get_section(&mut buffer, &dctx, Section::Answer, preserve_order)?;
        self.get_section(&mut buffer, &dctx, Section::Authority, preserve_order)?;
        self.get_section(&mut buffer, &dctx, Section::Additional, preserve_order)?;

        if buffer.remaining() != 0 {
            return Err(Error::FormErr);
        }

        if !self.sections[Section::Tsig.index()].is_empty() {
            self.verify_tsig(source)?;
        }

        Ok(())
    }

    fn get_questions(
        &mut self,
        source: &mut ReadBuffer<'_>,
        dctx: &Decompression,
    ) -> Result<(), Error> {
        let qidx = Section::Question.index();

        for _ in 0..self.counts[qidx] {
            let domain = self.get_name(source, dctx)?;
            let candidate = self.alloc_name(domain);

            let found =
                self.find_in_section(Section::Question, &self.names.get(candidate).domain);

            // The question section admits a single owner name; an equal
            // name is reused, a second distinct name is a format error.
            let name = match found {
                Some(existing) => {
                    self.names.release(candidate);
                    existing
                }
                None => {
                    if !self.sections[qidx].is_empty() {
                        return Err(Error::FormErr);
                    }
                    self.sections[qidx].push(candidate);
                    candidate
                }
            };

            if source.remaining() < 4 {
                return Err(Error::UnexpectedEnd);
            }
            let rtype = RecordType::from(source.next_u16().ok_or(Error::UnexpectedEnd)?);
            let class = RecordClass::from(source.next_u16().ok_or(Error::UnexpectedEnd)?);

            match self.state {
                ClassState::None => {
                    self.rdclass = class;
                    self.state = ClassState::Established;
                }
                ClassState::Established => {
                    if class != self.rdclass {
                        return Err(Error::FormErr);
                    }
                }
            }

            // Can't ask the same question twice.
            if self.find_type(name, rtype, COVERS_NONE).is_ok() {
                return Err(Error::FormErr);
            }

            let list = self.lists.alloc();
            self.init_record_list(list, rtype, COVERS_NONE, class, 0);
            let set = self.sets.alloc();
            self.bind_record_set(set, list);
            self.sets.get_mut(set).question = true;
            self.names.get_mut(name).sets.push(set);
        }

        Ok(())
    }

    fn get_section(
        &mut self,
        source: &mut ReadBuffer<'_>,
        dctx: &Decompression,
        section: Section,
        preserve_order: bool,
    ) -> Result<(), Error> {
        for _ in 0..self.counts[section.index()] {
            // a transaction signature must be the final record
            if !self.sections[Section::Tsig.index()].is_empty() {
                return Err(Error::FormErr);
            }

            let recstart = source.position();
            let domain = self.get_name(source, dctx)?;

            if source.remaining() < 10 {
                return Err(Error::UnexpectedEnd);
            }
            let rtype = RecordType::from(source.next_u16().ok_or(Error::UnexpectedEnd)?);
            let wire_class = RecordClass::from(source.next_u16().ok_or(Error::UnexpectedEnd)?);

            // A record may establish the class when there was no
            // question, but meta-classes cannot.
            if self.state == ClassState::None {
                if wire_class.is_meta() {
                    return Err(Error::FormErr);
                }
                self.rdclass = wire_class;
                self.state = ClassState::Established;
            }

            if self.opcode != Opcode::Update
                && rtype != RecordType::TSIG
                && rtype != RecordType::OPT
                && wire_class != self.rdclass
            {
                return Err(Error::FormErr);
            }

            let mut target_section = section;
            let mut skip_search = false;

            if rtype == RecordType::TSIG {
                if section != Section::Additional || wire_class != RecordClass::ANY {
                    return Err(Error::FormErr);
                }
                target_section = Section::Tsig;
                self.tsigstart = Some(recstart);
                skip_search = true;
                tracing::trace!(offset = recstart, "redirecting tsig to pseudo-section");
            } else if rtype == RecordType::OPT {
                if !domain.is_root() || section != Section::Additional || self.opt.is_some() {
                    return Err(Error::FormErr);
                }
                skip_search = true;
            }

            let ttl = source.next_u32().ok_or(Error::UnexpectedEnd)?;
            let rdatalen = usize::from(source.next_u16().ok_or(Error::UnexpectedEnd)?);
            if source.remaining() < rdatalen {
                return Err(Error::UnexpectedEnd);
            }

            let candidate = self.alloc_name(domain);
            let name = if preserve_order || self.opcode == Opcode::Update || skip_search {
                // Keep this occurrence distinct; the OPT owner name is
                // not linked anywhere at all.
                if rtype == RecordType::OPT {
                    self.names.release(candidate);
                } else {
                    self.sections[target_section.index()].push(candidate);
                }
                candidate
            } else {
                let found =
                    self.find_in_section(target_section, &self.names.get(candidate).domain);
                match found {
                    Some(existing) => {
                        self.names.release(candidate);
                        existing
                    }
                    None => {
                        self.sections[target_section.index()].push(candidate);
                        candidate
                    }
                }
            };

            // Interpret the rdata with the established class even if the
            // wire carried a meta-class, except for TSIG; the record
            // keeps the wire class either way.
            let use_class = if rtype == RecordType::TSIG {
                wire_class
            } else {
                self.rdclass
            };
            let data = self.get_rdata(source, dctx, use_class, rtype, rdatalen)?;

            let covers = if rtype == RecordType::SIG && !data.is_empty() {
                rdata::covers(&data)
            } else {
                COVERS_NONE
            };

            let record = self.records.alloc();
            {
                let entry = self.records.get_mut(record);
                entry.rdclass = wire_class;
                entry.rtype = rtype;
                entry.data = data;
            }

            let existing = if preserve_order || self.opcode == Opcode::Update || skip_search {
                None
            } else {
                self.find_type(name, rtype, covers).ok()
            };

            let set = match existing {
                Some(set) => set,
                None => {
                    let list = self.lists.alloc();
                    self.init_record_list(list, rtype, covers, wire_class, ttl);
                    let set = self.sets.alloc();
                    self.bind_record_set(set, list);
                    if rtype != RecordType::OPT {
                        self.names.get_mut(name).sets.push(set);
                    }
                    set
                }
            };

            let list = self.sets.get(set).list.ok_or(Error::FormErr)?;
            self.lists.get_mut(list).records.push(record);

            if rtype == RecordType::OPT {
                self.opt = Some(set);
                #[allow(clippy::cast_possible_truncation)]
                let ercode =
                    ((self.sets.get(set).ttl & EDNS_RCODE_MASK) >> EDNS_RCODE_SHIFT) as u16;
                self.rcode |= ercode;
                tracing::trace!(rcode = self.rcode, "folded extended rcode from opt ttl");
            }
        }

        Ok(())
    }

    /// Decode a name into scratchpad storage, growing the scratchpad
    /// once if the current block is full.
    fn get_name(
        &mut self,
        source: &mut ReadBuffer<'_>,
        dctx: &Decompression,
    ) -> Result<DomainName, Error> {
        for _ in 0..2 {
            let mut attempt = source.clone();
            match DomainName::from_wire(&mut attempt, dctx, self.scratch.current()) {
                Ok(domain) => {
                    *source = attempt;
                    return Ok(domain);
                }
                Err(Error::NoSpace) => self.scratch.grow(SCRATCHPAD_SIZE),
                Err(other) => return Err(other),
            }
        }

        // a fresh default-size block always fits a 255-octet name
        Err(Error::NoSpace)
    }

    /// Decode one record's rdata under the sized-growth rule: first
    /// retry at `max(default, 2 * wire length)`, doubling after that,
    /// capped by the 16-bit rdata length domain.
    fn get_rdata(
        &mut self,
        source: &mut ReadBuffer<'_>,
        dctx: &Decompression,
        use_class: RecordClass,
        rtype: RecordType,
        rdatalen: usize,
    ) -> Result<Bytes, Error> {
        // In dynamic update messages the rdata can be empty.
        if self.opcode == Opcode::Update && rdatalen == 0 {
            return Ok(Bytes::new());
        }

        let mut tries = 0;
        let mut trysize = 0;
        loop {
            let mut window = source.window(rdatalen);
            match rdata::from_wire(use_class, rtype, &mut window, dctx, self.scratch.current()) {
                Ok(data) => {
                    source.advance_to(window.position());
                    return Ok(data);
                }
                Err(Error::NoSpace) => {
                    if tries == 0 {
                        trysize = cmp::max(SCRATCHPAD_SIZE, 2 * rdatalen);
                    } else {
                        if trysize >= 65535 {
                            return Err(Error::NoSpace);
                        }
                        trysize *= 2;
                    }
                    tries += 1;
                    self.scratch.grow(trysize);
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn verify_tsig(&mut self, source: &[u8]) -> Result<(), Error> {
        let name = self.sections[Section::Tsig.index()][0];
        let set = self
            .names
            .get(name)
            .sets
            .first()
            .copied()
            .ok_or(Error::FormErr)?;
        let record = self
            .set_records(set)
            .first()
            .copied()
            .ok_or(Error::FormErr)?;

        let data = TsigData::from_rdata(&self.records.get(record).data)?;
        let start = self.tsigstart.unwrap_or(0);

        let status = match &self.tsigkey {
            Some(key) => key.verify(&source[..start], &data),
            None => Rcode::NoError,
        };

        self.tsig = Some(data);
        self.tsigstatus = status;

        if status != Rcode::NoError {
            tracing::debug!(%status, "transaction signature verification failed");
            return Err(Error::Tsig(status));
        }

        Ok(())
    }
}
