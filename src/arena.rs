//! Message-owned storage: fixed-capacity slabs of small homogeneous
//! items, and a scratchpad chain backing decoded names and payloads.
//!
//! Items are addressed by stable integer handles rather than pointers;
//! a handle stays valid until the owning message is reset or dropped.

use std::marker::PhantomData;

use bytes::{BufMut, Bytes, BytesMut};

/// Size of each individual scratchpad buffer.
pub const SCRATCHPAD_SIZE: usize = 512;

/// Items per slab block, for all four record families.
pub const BLOCK_CAPACITY: usize = 8;

/// A stable index into one slab family.
pub struct Handle<T> {
    index: u32,
    marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: usize) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let index = index as u32;
        Self {
            index,
            marker: PhantomData,
        }
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

/// A chain of fixed-capacity blocks with a free-list of released slots.
///
/// Acquisition pops the free-list when it can, bump-allocates from the
/// tail block otherwise, and appends a fresh block when the tail is
/// full.  Releasing never returns memory; it only queues the slot for
/// reuse.
pub struct Slab<T> {
    blocks: Vec<Vec<T>>,
    free: Vec<Handle<T>>,
}

impl<T: Default> Slab<T> {
    pub fn new() -> Self {
        Self {
            blocks: vec![Vec::with_capacity(BLOCK_CAPACITY)],
            free: Vec::new(),
        }
    }

    pub fn alloc(&mut self) -> Handle<T> {
        if let Some(handle) = self.free.pop() {
            *self.get_mut(handle) = T::default();
            return handle;
        }

        if self.blocks.last().map_or(true, |b| b.len() == BLOCK_CAPACITY) {
            self.blocks.push(Vec::with_capacity(BLOCK_CAPACITY));
        }

        let block_index = self.blocks.len() - 1;
        let block = self.blocks.last_mut().expect("slab always has a block");
        block.push(T::default());
        let slot_index = block.len() - 1;
        Handle::new(block_index * BLOCK_CAPACITY + slot_index)
    }

    pub fn release(&mut self, handle: Handle<T>) {
        self.free.push(handle);
    }

    pub fn get(&self, handle: Handle<T>) -> &T {
        let index = handle.index as usize;
        &self.blocks[index / BLOCK_CAPACITY][index % BLOCK_CAPACITY]
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> &mut T {
        let index = handle.index as usize;
        &mut self.blocks[index / BLOCK_CAPACITY][index % BLOCK_CAPACITY]
    }

    /// Keep a single empty block and drop everything else, including the
    /// free-list.
    pub fn reset_keep_one(&mut self) {
        self.blocks.truncate(1);
        self.blocks[0].clear();
        self.free.clear();
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

impl<T: Default> Default for Slab<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One scratchpad buffer.  Writes that would overflow the block's fixed
/// capacity are refused so the caller can grow the chain and retry.
pub struct Block {
    buf: BytesMut,
    remaining: usize,
}

impl Block {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            remaining: capacity,
        }
    }

    /// Store `octets` and return an owned slice of them.
    pub fn write(&mut self, octets: &[u8]) -> Option<Bytes> {
        if octets.len() > self.remaining {
            return None;
        }
        self.remaining -= octets.len();
        self.buf.put_slice(octets);
        Some(self.buf.split().freeze())
    }

    /// Begin a multi-part write that yields one contiguous slice.
    pub fn writer(&mut self) -> BlockWriter<'_> {
        BlockWriter {
            block: self,
            finished: false,
        }
    }
}

/// In-progress multi-part write into a [`Block`].  Dropping the writer
/// without finishing returns the partially written space to the block.
pub struct BlockWriter<'a> {
    block: &'a mut Block,
    finished: bool,
}

impl BlockWriter<'_> {
    pub fn append(&mut self, octets: &[u8]) -> Option<()> {
        if octets.len() > self.block.remaining {
            return None;
        }
        self.block.remaining -= octets.len();
        self.block.buf.put_slice(octets);
        Some(())
    }

    pub fn finish(mut self) -> Bytes {
        self.finished = true;
        self.block.buf.split().freeze()
    }
}

impl Drop for BlockWriter<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.block.remaining += self.block.buf.len();
            self.block.buf.clear();
        }
    }
}

/// The scratchpad chain.  The tail block is always the current one.
pub struct Scratchpad {
    blocks: Vec<Block>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self {
            blocks: vec![Block::with_capacity(SCRATCHPAD_SIZE)],
        }
    }

    pub fn current(&mut self) -> &mut Block {
        self.blocks.last_mut().expect("scratchpad always has a block")
    }

    /// Append a fresh block of exactly `size` octets and make it
    /// current.
    pub fn grow(&mut self, size: usize) {
        self.blocks.push(Block::with_capacity(size));
    }

    /// Collapse back to a single default-sized block.  Payloads handed
    /// out earlier may still pin old storage, so rewinding means
    /// replacing the block rather than reusing its octets.
    pub fn reset_keep_one(&mut self) {
        self.blocks.clear();
        self.blocks.push(Block::with_capacity(SCRATCHPAD_SIZE));
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

impl Default for Scratchpad {
    fn default() -> Self {
        Self::new()
    }
}
