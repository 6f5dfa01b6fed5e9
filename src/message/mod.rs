//! The message engine: a single in-memory representation of a DNS
//! message, parsed from the wire or assembled for rendering, plus the
//! facade callers drive it through.
//!
//! Ownership is arranged as an arena: the message owns four slab
//! families (names, records, record lists, record sets) and a
//! scratchpad; everything else holds stable handles into them.  A name
//! is linked into at most one section list at a time, and carries its
//! record sets; a record set is a view onto the record list that backs
//! it.

mod header;
mod parse;
mod render;

pub use header::WireHeader;

use bytes::Bytes;

use crate::arena::{Handle, Scratchpad, Slab};
use crate::buffer::{ReadBuffer, RenderBuffer};
use crate::compress::Compression;
use crate::error::Error;
use crate::name::DomainName;
use crate::tsig::{TsigData, TsigKey};
use crate::types::{
    Intent, Opcode, Rcode, RecordClass, RecordType, Section, COVERS_NONE, FLAG_MASK, FLAG_QR,
    OPT_FIXED_LEN, REPLY_PRESERVE, SECTION_COUNT,
};

pub type NameRef = Handle<Name>;
pub type RecordRef = Handle<Record>;
pub type RecordListRef = Handle<RecordList>;
pub type RecordSetRef = Handle<RecordSet>;

/// An owner name, linked into one section, with its record sets in
/// insertion order.
pub struct Name {
    domain: DomainName,
    sets: Vec<RecordSetRef>,
}

impl Name {
    pub fn domain(&self) -> &DomainName {
        &self.domain
    }

    pub fn record_sets(&self) -> &[RecordSetRef] {
        &self.sets
    }
}

impl Default for Name {
    fn default() -> Self {
        Self {
            domain: DomainName::root_domain(),
            sets: Vec::new(),
        }
    }
}

/// A single resource record's payload in canonical form.
pub struct Record {
    rdclass: RecordClass,
    rtype: RecordType,
    data: Bytes,
}

impl Record {
    pub fn rdclass(&self) -> RecordClass {
        self.rdclass
    }

    pub fn rtype(&self) -> RecordType {
        self.rtype
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

impl Default for Record {
    fn default() -> Self {
        Self {
            rdclass: RecordClass::from(0),
            rtype: COVERS_NONE,
            data: Bytes::new(),
        }
    }
}

/// The aggregation backing a record set: shared type, covered type,
/// class and TTL, and the records themselves.
pub struct RecordList {
    rtype: RecordType,
    covers: RecordType,
    rdclass: RecordClass,
    ttl: u32,
    records: Vec<RecordRef>,
}

impl RecordList {
    pub fn records(&self) -> &[RecordRef] {
        &self.records
    }
}

impl Default for RecordList {
    fn default() -> Self {
        Self {
            rtype: COVERS_NONE,
            covers: COVERS_NONE,
            rdclass: RecordClass::from(0),
            ttl: 0,
            records: Vec::new(),
        }
    }
}

/// The public view of a record list, carrying the attributes the
/// renderer and callers act on.
pub struct RecordSet {
    rtype: RecordType,
    covers: RecordType,
    rdclass: RecordClass,
    ttl: u32,
    question: bool,
    rendered: bool,
    list: Option<RecordListRef>,
}

impl RecordSet {
    pub fn rtype(&self) -> RecordType {
        self.rtype
    }

    pub fn covers(&self) -> RecordType {
        self.covers
    }

    pub fn rdclass(&self) -> RecordClass {
        self.rdclass
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn is_question(&self) -> bool {
        self.question
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered
    }
}

impl Default for RecordSet {
    fn default() -> Self {
        Self {
            rtype: COVERS_NONE,
            covers: COVERS_NONE,
            rdclass: RecordClass::from(0),
            ttl: 0,
            question: false,
            rendered: false,
            list: None,
        }
    }
}

/// Whether the message-wide class has been established yet.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ClassState {
    None,
    Established,
}

/// A DNS message.
pub struct Message {
    intent: Intent,
    id: u16,
    flags: u16,
    opcode: Opcode,
    rcode: u16,
    rdclass: RecordClass,
    counts: [u16; SECTION_COUNT],
    state: ClassState,
    sections: [Vec<NameRef>; SECTION_COUNT],
    cursors: [Option<usize>; SECTION_COUNT],
    opt: Option<RecordSetRef>,
    tsig: Option<TsigData>,
    querytsig: Option<TsigData>,
    tsigkey: Option<Box<dyn TsigKey>>,
    tsigstart: Option<usize>,
    tsigstatus: Rcode,
    querytsigstatus: Rcode,
    reserved: usize,
    buffer: Option<RenderBuffer>,
    cctx: Option<Compression>,
    header_ok: bool,
    question_ok: bool,
    scratch: Scratchpad,
    names: Slab<Name>,
    records: Slab<Record>,
    lists: Slab<RecordList>,
    sets: Slab<RecordSet>,
}

impl Message {
    pub fn new(intent: Intent) -> Self {
        Self {
            intent,
            id: 0,
            flags: 0,
            opcode: Opcode::Query,
            rcode: 0,
            rdclass: RecordClass::from(0),
            counts: [0; SECTION_COUNT],
            state: ClassState::None,
            sections: Default::default(),
            cursors: [None; SECTION_COUNT],
            opt: None,
            tsig: None,
            querytsig: None,
            tsigkey: None,
            tsigstart: None,
            tsigstatus: Rcode::NoError,
            querytsigstatus: Rcode::NoError,
            reserved: 0,
            buffer: None,
            cctx: None,
            header_ok: false,
            question_ok: false,
            scratch: Scratchpad::new(),
            names: Slab::new(),
            records: Slab::new(),
            lists: Slab::new(),
            sets: Slab::new(),
        }
    }

    /// Return the message to its initial state under a possibly new
    /// intent, keeping one slab block per family and one scratchpad
    /// block as a fast-path cache.
    pub fn reset(&mut self, intent: Intent) {
        self.intent = intent;
        self.id = 0;
        self.flags = 0;
        self.opcode = Opcode::Query;
        self.rcode = 0;
        self.rdclass = RecordClass::from(0);
        self.counts = [0; SECTION_COUNT];
        self.state = ClassState::None;
        for section in &mut self.sections {
            section.clear();
        }
        self.cursors = [None; SECTION_COUNT];
        self.opt = None;
        self.tsig = None;
        self.querytsig = None;
        self.tsigkey = None;
        self.tsigstart = None;
        self.tsigstatus = Rcode::NoError;
        self.querytsigstatus = Rcode::NoError;
        self.reserved = 0;
        self.buffer = None;
        self.cctx = None;
        self.header_ok = false;
        self.question_ok = false;
        self.scratch.reset_keep_one();
        self.names.reset_keep_one();
        self.records.reset_keep_one();
        self.lists.reset_keep_one();
        self.sets.reset_keep_one();
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn set_id(&mut self, id: u16) {
        self.id = id;
    }

    /// The stored flag bits; opcode and rcode are kept separately.
    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: u16) {
        self.flags = flags & FLAG_MASK;
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn set_opcode(&mut self, opcode: Opcode) {
        self.opcode = opcode;
    }

    pub fn rcode(&self) -> Rcode {
        Rcode::from(self.rcode)
    }

    pub fn set_rcode(&mut self, rcode: Rcode) {
        self.rcode = u16::from(rcode);
    }

    /// The message-wide record class, once a question or record has
    /// established it.
    pub fn rdclass(&self) -> RecordClass {
        self.rdclass
    }

    pub fn count(&self, section: Section) -> u16 {
        self.counts[section.index()]
    }

    pub fn header_ok(&self) -> bool {
        self.header_ok
    }

    pub fn question_ok(&self) -> bool {
        self.question_ok
    }

    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// Owner names of a section, in order.
    pub fn names(&self, section: Section) -> &[NameRef] {
        &self.sections[section.index()]
    }

    pub fn name(&self, name: NameRef) -> &Name {
        self.names.get(name)
    }

    pub fn record_set(&self, set: RecordSetRef) -> &RecordSet {
        self.sets.get(set)
    }

    pub fn record(&self, record: RecordRef) -> &Record {
        self.records.get(record)
    }

    /// The records backing a set, in insertion order.
    pub fn set_records(&self, set: RecordSetRef) -> &[RecordRef] {
        match self.sets.get(set).list {
            Some(list) => &self.lists.get(list).records,
            None => &[],
        }
    }

    // ------------------------------------------------------------------
    // Cursors

    pub fn first_name(&mut self, section: Section) -> Result<(), Error> {
        let idx = section.index();
        if self.sections[idx].is_empty() {
            self.cursors[idx] = None;
            return Err(Error::NoMore);
        }
        self.cursors[idx] = Some(0);
        Ok(())
    }

    pub fn next_name(&mut self, section: Section) -> Result<(), Error> {
        let idx = section.index();
        let cursor = self.cursors[idx].ok_or(Error::InvalidState)?;
        if cursor + 1 >= self.sections[idx].len() {
            self.cursors[idx] = None;
            return Err(Error::NoMore);
        }
        self.cursors[idx] = Some(cursor + 1);
        Ok(())
    }

    pub fn current_name(&self, section: Section) -> Result<NameRef, Error> {
        let idx = section.index();
        self.cursors[idx]
            .map(|cursor| self.sections[idx][cursor])
            .ok_or(Error::InvalidState)
    }

    // ------------------------------------------------------------------
    // Lookup

    /// Find `target` in a section.  The search runs tail to head so the
    /// most recently inserted match wins.
    pub fn find_name(&self, section: Section, target: &DomainName) -> Result<NameRef, Error> {
        self.find_in_section(section, target).ok_or(Error::NotFound)
    }

    /// Find the record set of `(rtype, covers)` under a name, most
    /// recently inserted first.
    pub fn find_type(
        &self,
        name: NameRef,
        rtype: RecordType,
        covers: RecordType,
    ) -> Result<RecordSetRef, Error> {
        self.names
            .get(name)
            .sets
            .iter()
            .rev()
            .find(|&&set| {
                let set = self.sets.get(set);
                set.rtype == rtype && set.covers == covers
            })
            .copied()
            .ok_or(Error::NoRecordForType)
    }

    pub(crate) fn find_in_section(
        &self,
        section: Section,
        target: &DomainName,
    ) -> Option<NameRef> {
        self.sections[section.index()]
            .iter()
            .rev()
            .find(|&&name| self.names.get(name).domain == *target)
            .copied()
    }

    // ------------------------------------------------------------------
    // Section mutation (render side)

    pub fn add_name(&mut self, name: NameRef, section: Section) -> Result<(), Error> {
        if self.intent != Intent::Render {
            return Err(Error::InvalidState);
        }
        self.sections[section.index()].push(name);
        Ok(())
    }

    pub fn move_name(&mut self, name: NameRef, from: Section, to: Section) -> Result<(), Error> {
        if self.intent != Intent::Render {
            return Err(Error::InvalidState);
        }
        let from_idx = from.index();
        let position = self.sections[from_idx]
            .iter()
            .position(|&h| h == name)
            .ok_or(Error::NotFound)?;
        self.sections[from_idx].remove(position);
        self.sections[to.index()].push(name);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Temporaries

    pub fn get_temp_name(&mut self) -> NameRef {
        self.names.alloc()
    }

    pub fn get_temp_record(&mut self) -> RecordRef {
        self.records.alloc()
    }

    pub fn get_temp_record_list(&mut self) -> RecordListRef {
        self.lists.alloc()
    }

    pub fn get_temp_record_set(&mut self) -> RecordSetRef {
        self.sets.alloc()
    }

    pub fn put_temp_name(&mut self, name: NameRef) {
        self.names.release(name);
    }

    pub fn put_temp_record(&mut self, record: RecordRef) {
        self.records.release(record);
    }

    pub fn put_temp_record_list(&mut self, list: RecordListRef) {
        self.lists.release(list);
    }

    pub fn put_temp_record_set(&mut self, set: RecordSetRef) {
        self.sets.release(set);
    }

    // ------------------------------------------------------------------
    // Builders for externally constructed records

    pub fn set_name(&mut self, name: NameRef, domain: DomainName) {
        self.names.get_mut(name).domain = domain;
    }

    pub fn init_record(
        &mut self,
        record: RecordRef,
        rdclass: RecordClass,
        rtype: RecordType,
        data: Bytes,
    ) {
        let record = self.records.get_mut(record);
        record.rdclass = rdclass;
        record.rtype = rtype;
        record.data = data;
    }

    pub fn init_record_list(
        &mut self,
        list: RecordListRef,
        rtype: RecordType,
        covers: RecordType,
        rdclass: RecordClass,
        ttl: u32,
    ) {
        let list = self.lists.get_mut(list);
        list.rtype = rtype;
        list.covers = covers;
        list.rdclass = rdclass;
        list.ttl = ttl;
        list.records.clear();
    }

    pub fn append_record(&mut self, list: RecordListRef, record: RecordRef) {
        self.lists.get_mut(list).records.push(record);
    }

    /// Make `set` the public view of `list`, copying its shared fields.
    pub fn bind_record_set(&mut self, set: RecordSetRef, list: RecordListRef) {
        let (rtype, covers, rdclass, ttl) = {
            let list = self.lists.get(list);
            (list.rtype, list.covers, list.rdclass, list.ttl)
        };
        let set = self.sets.get_mut(set);
        set.rtype = rtype;
        set.covers = covers;
        set.rdclass = rdclass;
        set.ttl = ttl;
        set.question = false;
        set.rendered = false;
        set.list = Some(list);
    }

    pub fn append_record_set(&mut self, name: NameRef, set: RecordSetRef) {
        self.names.get_mut(name).sets.push(set);
    }

    /// Flag a set as a question, so it renders in name/type/class form.
    pub fn mark_question(&mut self, set: RecordSetRef) {
        self.sets.get_mut(set).question = true;
    }

    // ------------------------------------------------------------------
    // Header peeking and reply transformation

    /// Read the id and masked flag bits of a wire message without
    /// consuming anything.
    pub fn peek_header(source: &[u8]) -> Result<(u16, u16), Error> {
        let mut buffer = ReadBuffer::new(source);
        let header = WireHeader::from_wire(&mut buffer)?;
        Ok((header.id, header.flags & FLAG_MASK))
    }

    /// Turn a parsed request into the start of its reply: drop the
    /// answers (and optionally the question), clear non-preserved
    /// flags, set QR, and stash the query's TSIG for response signing.
    pub fn reply(&mut self, want_question: bool) -> Result<(), Error> {
        if self.flags & FLAG_QR != 0 {
            return Err(Error::InvalidState);
        }
        if !self.header_ok {
            return Err(Error::FormErr);
        }

        let want_question = want_question && self.opcode == Opcode::Query;
        let first_section = if want_question {
            if !self.question_ok {
                return Err(Error::FormErr);
            }
            Section::Answer
        } else {
            Section::Question
        };

        self.intent = Intent::Render;
        self.release_sections_from(first_section.index());
        if let Some(opt) = self.opt.take() {
            self.release_set_chain(opt);
        }

        self.cursors = [None; SECTION_COUNT];
        self.counts = [0; SECTION_COUNT];
        self.state = ClassState::None;
        self.reserved = 0;
        self.buffer = None;
        self.cctx = None;

        self.flags &= REPLY_PRESERVE;
        self.flags |= FLAG_QR;

        if self.tsig.is_some() {
            self.querytsig = self.tsig.take();
            self.querytsigstatus = self.tsigstatus;
            self.tsigstatus = Rcode::NoError;
        }

        tracing::trace!(id = self.id, "transformed request into reply");
        Ok(())
    }

    // ------------------------------------------------------------------
    // OPT

    pub fn get_opt(&self) -> Option<RecordSetRef> {
        self.opt
    }

    /// Install an OPT record set, reserving render space for it.  Legal
    /// only before any record has established the message state.
    pub fn set_opt(&mut self, set: RecordSetRef) -> Result<(), Error> {
        if self.intent != Intent::Render
            || self.buffer.is_none()
            || self.state != ClassState::None
        {
            return Err(Error::InvalidState);
        }
        if self.sets.get(set).rtype != RecordType::OPT {
            return Err(Error::InvalidState);
        }

        if let Some(old) = self.opt.take() {
            let old_len = self.first_rdata_len(old)?;
            self.render_release(OPT_FIXED_LEN + old_len)?;
            self.release_set_chain(old);
        }

        let rdata_len = self.first_rdata_len(set)?;
        self.render_reserve(OPT_FIXED_LEN + rdata_len)?;
        self.opt = Some(set);
        Ok(())
    }

    // ------------------------------------------------------------------
    // TSIG

    pub fn set_tsig_key(&mut self, key: Box<dyn TsigKey>) {
        self.tsigkey = Some(key);
    }

    pub fn tsig(&self) -> Option<&TsigData> {
        self.tsig.as_ref()
    }

    pub fn query_tsig(&self) -> Option<&TsigData> {
        self.querytsig.as_ref()
    }

    pub fn tsig_status(&self) -> Rcode {
        self.tsigstatus
    }

    pub fn query_tsig_status(&self) -> Rcode {
        self.querytsigstatus
    }

    /// Offset of the TSIG record in the parsed source, for signature
    /// coverage.  `None` when the message carried no TSIG.
    pub fn tsig_start(&self) -> Option<usize> {
        self.tsigstart
    }

    // ------------------------------------------------------------------
    // Internal allocation helpers

    pub(crate) fn alloc_name(&mut self, domain: DomainName) -> NameRef {
        let handle = self.names.alloc();
        let name = self.names.get_mut(handle);
        name.domain = domain;
        name.sets.clear();
        handle
    }

    pub(crate) fn first_rdata_len(&self, set: RecordSetRef) -> Result<usize, Error> {
        let list = self.sets.get(set).list.ok_or(Error::InvalidState)?;
        let record = self
            .lists
            .get(list)
            .records
            .first()
            .ok_or(Error::InvalidState)?;
        Ok(self.records.get(*record).data.len())
    }

    fn release_sections_from(&mut self, first: usize) {
        for idx in first..SECTION_COUNT {
            let names = std::mem::take(&mut self.sections[idx]);
            for name in names {
                let sets = std::mem::take(&mut self.names.get_mut(name).sets);
                for set in sets {
                    self.release_set_chain(set);
                }
                self.names.release(name);
            }
        }
    }

    fn release_set_chain(&mut self, set: RecordSetRef) {
        if let Some(list) = self.sets.get(set).list {
            for record in std::mem::take(&mut self.lists.get_mut(list).records) {
                self.records.release(record);
            }
            self.lists.release(list);
        }
        self.sets.release(set);
    }

    #[cfg(test)]
    pub(crate) fn slab_block_counts(&self) -> [usize; 4] {
        [
            self.names.block_count(),
            self.records.block_count(),
            self.lists.block_count(),
            self.sets.block_count(),
        ]
    }

    #[cfg(test)]
    pub(crate) fn scratch_block_count(&self) -> usize {
        self.scratch.block_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(s: &str) -> DomainName {
        DomainName::from_dotted_string(s).unwrap()
    }

    #[test]
    fn peek_header_masks_flags() {
        // id 0x1234, flags QR|opcode(2)|RD|rcode(3)
        let octets = [0x12, 0x34, 0x91, 0x03, 0, 0, 0, 0, 0, 0, 0, 0];
        let (id, flags) = Message::peek_header(&octets).unwrap();
        assert_eq!(id, 0x1234);
        assert_eq!(flags, 0x9103 & FLAG_MASK);

        assert_eq!(Message::peek_header(&octets[..11]), Err(Error::UnexpectedEnd));
    }

    #[test]
    fn cursor_walks_a_section() {
        let mut msg = Message::new(Intent::Render);
        let a = msg.get_temp_name();
        msg.set_name(a, domain("a.example."));
        let b = msg.get_temp_name();
        msg.set_name(b, domain("b.example."));
        msg.add_name(a, Section::Answer).unwrap();
        msg.add_name(b, Section::Answer).unwrap();

        assert_eq!(msg.first_name(Section::Question), Err(Error::NoMore));

        msg.first_name(Section::Answer).unwrap();
        assert_eq!(msg.current_name(Section::Answer).unwrap(), a);
        msg.next_name(Section::Answer).unwrap();
        assert_eq!(msg.current_name(Section::Answer).unwrap(), b);
        assert_eq!(msg.next_name(Section::Answer), Err(Error::NoMore));
        assert_eq!(msg.current_name(Section::Answer), Err(Error::InvalidState));
    }

    #[test]
    fn find_name_prefers_most_recent() {
        let mut msg = Message::new(Intent::Render);
        let first = msg.get_temp_name();
        msg.set_name(first, domain("dup.example."));
        let second = msg.get_temp_name();
        msg.set_name(second, domain("dup.example."));
        msg.add_name(first, Section::Answer).unwrap();
        msg.add_name(second, Section::Answer).unwrap();

        assert_eq!(
            msg.find_name(Section::Answer, &domain("dup.example.")).unwrap(),
            second
        );
        assert_eq!(
            msg.find_name(Section::Answer, &domain("other.example.")),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn section_mutation_requires_render_intent() {
        let mut msg = Message::new(Intent::Parse);
        let name = msg.get_temp_name();
        assert_eq!(
            msg.add_name(name, Section::Answer),
            Err(Error::InvalidState)
        );
    }

    #[test]
    fn temporaries_recycle_through_the_free_list() {
        let mut msg = Message::new(Intent::Render);
        let name = msg.get_temp_name();
        msg.put_temp_name(name);
        assert_eq!(msg.get_temp_name(), name);
    }
}
