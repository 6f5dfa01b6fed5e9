//! Result kinds surfaced by the message engine and the codecs it drives.

use std::fmt;

use crate::types::Rcode;

/// Errors encountered while parsing, rendering, or inspecting a message.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// The source ended before the structure expected at this position.
    UnexpectedEnd,

    /// A protocol invariant was violated: class mismatch, duplicate
    /// question, misplaced OPT or TSIG, trailing octets, an extended
    /// rcode with no OPT present, and similar.
    FormErr,

    /// The output buffer, or scratchpad growth, refused further room.
    NoSpace,

    /// `find_name` did not find the owner name.
    NotFound,

    /// The owner name exists but carries no record set of the requested
    /// type and covered type.
    NoRecordForType,

    /// A section cursor ran off the end of its list.
    NoMore,

    /// A label was longer than 63 octets, or used reserved length bits.
    BadLabel,

    /// A compression pointer did not point strictly backwards.
    BadPointer,

    /// A name exceeded 255 octets once expanded.
    NameTooLong,

    /// The operation is not legal for the message's intent or current
    /// phase (for example rendering into a parse-intent message).
    InvalidState,

    /// The transaction signature did not verify, or could not be built.
    Tsig(Rcode),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnexpectedEnd => write!(f, "unexpected end of input"),
            Error::FormErr => write!(f, "message violates the wire format"),
            Error::NoSpace => write!(f, "out of buffer space"),
            Error::NotFound => write!(f, "name not present in section"),
            Error::NoRecordForType => write!(f, "name has no record set of that type"),
            Error::NoMore => write!(f, "no more names in section"),
            Error::BadLabel => write!(f, "invalid label"),
            Error::BadPointer => write!(f, "invalid compression pointer"),
            Error::NameTooLong => write!(f, "name exceeds 255 octets"),
            Error::InvalidState => write!(f, "operation not valid in this state"),
            Error::Tsig(rcode) => write!(f, "transaction signature failure: {rcode}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
