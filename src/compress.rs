//! Per-message name compression state: the offset table the renderer
//! feeds, and the policy the parser applies when expanding pointers.

use std::collections::HashMap;

use crate::name::DomainName;

/// Largest buffer offset a 14-bit compression pointer can address.
const POINTER_LIMIT: usize = 0x4000;

/// Which pointer forms a decoder will accept.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Method {
    /// No pointers at all; any pointer octet is an error.
    None,
    /// 14-bit global pointers, the original discipline.
    Global14,
    /// Global pointers from anywhere earlier in the packet.
    Global,
}

/// Render-side compression table: whole owner names already written,
/// keyed to the offset where their labels start.
pub struct Compression {
    offsets: HashMap<DomainName, u16>,
}

impl Compression {
    pub fn new() -> Self {
        Self {
            offsets: HashMap::new(),
        }
    }

    /// The stored offset of `name`, if it was written earlier.
    pub fn find(&self, name: &DomainName) -> Option<u16> {
        self.offsets.get(name).copied()
    }

    /// Remember that `name`'s labels start at `offset`.  Root names and
    /// offsets beyond pointer reach are not worth remembering.
    pub fn insert(&mut self, name: &DomainName, offset: usize) {
        if !name.is_root() && offset < POINTER_LIMIT && !self.offsets.contains_key(name) {
            #[allow(clippy::cast_possible_truncation)]
            self.offsets.insert(name.clone(), offset as u16);
        }
    }

    /// Forget every name written at or past `used`.  Called when the
    /// renderer rolls its buffer back, so no pointer can reference
    /// octets that are no longer there.
    pub fn rollback(&mut self, used: usize) {
        self.offsets.retain(|_, offset| usize::from(*offset) < used);
    }
}

impl Default for Compression {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse-side decompression policy.
///
/// The EDNS version is unknown until an OPT record has been seen, which
/// is why it starts out as `-1`.
pub struct Decompression {
    edns: i32,
    strict: bool,
    method: Method,
}

impl Decompression {
    pub fn new(edns: i32, strict: bool) -> Self {
        Self {
            edns,
            strict,
            method: Method::Global14,
        }
    }

    pub fn edns(&self) -> i32 {
        self.edns
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn pointers_allowed(&self) -> bool {
        !matches!(self.method, Method::None)
    }
}
