//! Scalar protocol types and wire-level constants shared by the parser
//! and the renderer.

use std::fmt;

/// Length of the fixed message header.
pub const HEADER_LEN: usize = 12;

/// Mask for the opcode field inside the 16-bit flag word.
pub const OPCODE_MASK: u16 = 0x7800;

/// Offset of the opcode field inside the flag word.
pub const OPCODE_SHIFT: u16 = 11;

/// Mask for the response-code field inside the flag word.
pub const RCODE_MASK: u16 = 0x000f;

/// Mask for the flag bits the engine stores verbatim (everything that is
/// neither opcode nor rcode).
pub const FLAG_MASK: u16 = 0x8ff0;

/// Flag word bit for QR (message is a response).
pub const FLAG_QR: u16 = 0x8000;

/// Flag word bit for AA (authoritative answer).
pub const FLAG_AA: u16 = 0x0400;

/// Flag word bit for TC (truncated).
pub const FLAG_TC: u16 = 0x0200;

/// Flag word bit for RD (recursion desired).
pub const FLAG_RD: u16 = 0x0100;

/// Flag word bit for RA (recursion available).
pub const FLAG_RA: u16 = 0x0080;

/// Flag bits carried over from a request into its reply.
pub const REPLY_PRESERVE: u16 = FLAG_RD;

/// Mask for the extended rcode bits inside an OPT record's TTL.
pub const EDNS_RCODE_MASK: u32 = 0xff00_0000;

/// Shift folding the OPT TTL's extended rcode into the 12-bit rcode: the
/// high 8 bits of the TTL land above the 4 header bits.
pub const EDNS_RCODE_SHIFT: u32 = 20;

/// Mask for the EDNS version bits inside an OPT record's TTL.
pub const EDNS_VERSION_MASK: u32 = 0x00ff_0000;

/// Shift for the EDNS version bits.
pub const EDNS_VERSION_SHIFT: u32 = 16;

/// Fixed space an OPT record occupies ahead of its rdata: 1 octet of root
/// name, 2 of type, 2 of class, 4 of ttl, 2 of rdata length.
pub const OPT_FIXED_LEN: usize = 11;

/// Whether a message exists to be filled from the wire or written to it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Intent {
    Parse,
    Render,
}

/// The named message sections, plus the synthetic section holding a
/// transaction signature between parse (or sign) and the wire.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Section {
    Question,
    Answer,
    Authority,
    Additional,
    Tsig,
}

/// Number of section slots, counting the TSIG pseudo-section.
pub const SECTION_COUNT: usize = 5;

impl Section {
    /// The four sections that exist on the wire.
    pub const NAMED: [Section; 4] = [
        Section::Question,
        Section::Answer,
        Section::Authority,
        Section::Additional,
    ];

    pub fn index(self) -> usize {
        match self {
            Section::Question => 0,
            Section::Answer => 1,
            Section::Authority => 2,
            Section::Additional => 3,
            Section::Tsig => 4,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Section::Question => write!(f, "QUESTION"),
            Section::Answer => write!(f, "ANSWER"),
            Section::Authority => write!(f, "AUTHORITY"),
            Section::Additional => write!(f, "ADDITIONAL"),
            Section::Tsig => write!(f, "TSIG"),
        }
    }
}

/// A four bit field that specifies the kind of query in this message,
/// set by the originator and copied into the response.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Opcode {
    Query,
    IQuery,
    Status,
    Notify,
    Update,
    Unknown(OpcodeUnknown),
}

/// A struct with a private constructor, to ensure invalid `Opcode`s
/// cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct OpcodeUnknown(u8);

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Opcode::Query,
            1 => Opcode::IQuery,
            2 => Opcode::Status,
            4 => Opcode::Notify,
            5 => Opcode::Update,
            _ => Opcode::Unknown(OpcodeUnknown(value & 0x0f)),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Query => 0,
            Opcode::IQuery => 1,
            Opcode::Status => 2,
            Opcode::Notify => 4,
            Opcode::Update => 5,
            Opcode::Unknown(OpcodeUnknown(value)) => value,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Opcode::Query => write!(f, "QUERY"),
            Opcode::IQuery => write!(f, "IQUERY"),
            Opcode::Status => write!(f, "STATUS"),
            Opcode::Notify => write!(f, "NOTIFY"),
            Opcode::Update => write!(f, "UPDATE"),
            Opcode::Unknown(OpcodeUnknown(n)) => write!(f, "OPCODE{n}"),
        }
    }
}

/// Response codes.  Twelve bits wide once an OPT record extends the four
/// bits the header carries.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Rcode {
    NoError,
    FormErr,
    ServFail,
    NXDomain,
    NotImp,
    Refused,
    NotAuth,
    Unknown(RcodeUnknown),
}

/// A struct with a private constructor, to ensure invalid `Rcode`s
/// cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RcodeUnknown(u16);

impl From<u16> for Rcode {
    fn from(value: u16) -> Self {
        match value {
            0 => Rcode::NoError,
            1 => Rcode::FormErr,
            2 => Rcode::ServFail,
            3 => Rcode::NXDomain,
            4 => Rcode::NotImp,
            5 => Rcode::Refused,
            9 => Rcode::NotAuth,
            _ => Rcode::Unknown(RcodeUnknown(value & 0x0fff)),
        }
    }
}

impl From<Rcode> for u16 {
    fn from(value: Rcode) -> Self {
        match value {
            Rcode::NoError => 0,
            Rcode::FormErr => 1,
            Rcode::ServFail => 2,
            Rcode::NXDomain => 3,
            Rcode::NotImp => 4,
            Rcode::Refused => 5,
            Rcode::NotAuth => 9,
            Rcode::Unknown(RcodeUnknown(value)) => value,
        }
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Rcode::NoError => write!(f, "NOERROR"),
            Rcode::FormErr => write!(f, "FORMERR"),
            Rcode::ServFail => write!(f, "SERVFAIL"),
            Rcode::NXDomain => write!(f, "NXDOMAIN"),
            Rcode::NotImp => write!(f, "NOTIMP"),
            Rcode::Refused => write!(f, "REFUSED"),
            Rcode::NotAuth => write!(f, "NOTAUTH"),
            Rcode::Unknown(RcodeUnknown(n)) => write!(f, "RCODE{n}"),
        }
    }
}

/// Resource record types.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordType {
    A,
    NS,
    MD,
    MF,
    CNAME,
    SOA,
    MB,
    MG,
    MR,
    NULL,
    WKS,
    PTR,
    HINFO,
    MINFO,
    MX,
    TXT,
    SIG,
    AAAA,
    SRV,
    OPT,
    TSIG,
    Unknown(RecordTypeUnknown),
}

/// A struct with a private constructor, to ensure invalid `RecordType`s
/// cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordTypeUnknown(u16);

/// The covered-type slot of a record set that is not a signature.
pub const COVERS_NONE: RecordType = RecordType::Unknown(RecordTypeUnknown(0));

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            3 => RecordType::MD,
            4 => RecordType::MF,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            7 => RecordType::MB,
            8 => RecordType::MG,
            9 => RecordType::MR,
            10 => RecordType::NULL,
            11 => RecordType::WKS,
            12 => RecordType::PTR,
            13 => RecordType::HINFO,
            14 => RecordType::MINFO,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            24 => RecordType::SIG,
            28 => RecordType::AAAA,
            33 => RecordType::SRV,
            41 => RecordType::OPT,
            250 => RecordType::TSIG,
            _ => RecordType::Unknown(RecordTypeUnknown(value)),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::MD => 3,
            RecordType::MF => 4,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::MB => 7,
            RecordType::MG => 8,
            RecordType::MR => 9,
            RecordType::NULL => 10,
            RecordType::WKS => 11,
            RecordType::PTR => 12,
            RecordType::HINFO => 13,
            RecordType::MINFO => 14,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::SIG => 24,
            RecordType::AAAA => 28,
            RecordType::SRV => 33,
            RecordType::OPT => 41,
            RecordType::TSIG => 250,
            RecordType::Unknown(RecordTypeUnknown(value)) => value,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::MD => write!(f, "MD"),
            RecordType::MF => write!(f, "MF"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::SOA => write!(f, "SOA"),
            RecordType::MB => write!(f, "MB"),
            RecordType::MG => write!(f, "MG"),
            RecordType::MR => write!(f, "MR"),
            RecordType::NULL => write!(f, "NULL"),
            RecordType::WKS => write!(f, "WKS"),
            RecordType::PTR => write!(f, "PTR"),
            RecordType::HINFO => write!(f, "HINFO"),
            RecordType::MINFO => write!(f, "MINFO"),
            RecordType::MX => write!(f, "MX"),
            RecordType::TXT => write!(f, "TXT"),
            RecordType::SIG => write!(f, "SIG"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::SRV => write!(f, "SRV"),
            RecordType::OPT => write!(f, "OPT"),
            RecordType::TSIG => write!(f, "TSIG"),
            RecordType::Unknown(RecordTypeUnknown(n)) => write!(f, "TYPE{n}"),
        }
    }
}

/// Record classes, including the meta-classes dynamic update and TSIG
/// traffic in.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordClass {
    IN,
    CH,
    HS,
    NONE,
    ANY,
    Unknown(RecordClassUnknown),
}

/// A struct with a private constructor, to ensure invalid
/// `RecordClass`es cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordClassUnknown(u16);

impl RecordClass {
    /// Meta-classes cannot establish the class of a message.
    pub fn is_meta(self) -> bool {
        matches!(self, RecordClass::ANY) || u16::from(self) == 0
    }
}

impl From<u16> for RecordClass {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordClass::IN,
            3 => RecordClass::CH,
            4 => RecordClass::HS,
            254 => RecordClass::NONE,
            255 => RecordClass::ANY,
            _ => RecordClass::Unknown(RecordClassUnknown(value)),
        }
    }
}

impl From<RecordClass> for u16 {
    fn from(value: RecordClass) -> Self {
        match value {
            RecordClass::IN => 1,
            RecordClass::CH => 3,
            RecordClass::HS => 4,
            RecordClass::NONE => 254,
            RecordClass::ANY => 255,
            RecordClass::Unknown(RecordClassUnknown(value)) => value,
        }
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordClass::IN => write!(f, "IN"),
            RecordClass::CH => write!(f, "CH"),
            RecordClass::HS => write!(f, "HS"),
            RecordClass::NONE => write!(f, "NONE"),
            RecordClass::ANY => write!(f, "ANY"),
            RecordClass::Unknown(RecordClassUnknown(n)) => write!(f, "CLASS{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u8_opcode_roundtrip() {
        for i in 0..15 {
            assert_eq!(u8::from(Opcode::from(i)), i);
        }
    }

    #[test]
    fn u16_rcode_roundtrip() {
        for i in 0..100 {
            assert_eq!(u16::from(Rcode::from(i)), i);
        }
    }

    #[test]
    fn u16_recordtype_roundtrip() {
        for i in 0..300 {
            assert_eq!(u16::from(RecordType::from(i)), i);
        }
    }

    #[test]
    fn u16_recordclass_roundtrip() {
        for i in 0..300 {
            assert_eq!(u16::from(RecordClass::from(i)), i);
        }
    }

    #[test]
    fn meta_classes() {
        assert!(RecordClass::ANY.is_meta());
        assert!(RecordClass::from(0).is_meta());
        assert!(!RecordClass::IN.is_meta());
        assert!(!RecordClass::NONE.is_meta());
    }

    #[test]
    fn flag_mask_excludes_opcode_and_rcode_fields() {
        assert_eq!(OPCODE_MASK & RCODE_MASK, 0);
        assert_eq!(FLAG_MASK & RCODE_MASK, 0);
    }
}
