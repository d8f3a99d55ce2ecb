//! Descriptor table: dense small-integer handles with holes.
//!
//! Descriptors are handed out at the smallest free index. The backing
//! array doubles when full and halves when occupancy falls below half,
//! never dropping under [`TABLE_FLOOR`] slots.

use crate::fs::OpenFlags;

/// Minimum capacity of the descriptor table.
pub(crate) const TABLE_FLOOR: usize = 10;

/// Growth and shrink factor for the backing array.
const CAPACITY_FACTOR: usize = 2;

// ---------------------------------------------------------------------------
//  Descriptor
// ---------------------------------------------------------------------------

/// An open-file handle: which file, in what mode, and where the cursor is.
#[derive(Debug, Clone)]
pub(crate) struct Descriptor {
    /// Identity of the file this descriptor refers to.
    pub file_id: u64,
    /// Open mode.
    pub flags: OpenFlags,
    /// Index of the cursor's block within the file chain.
    pub block_index: usize,
    /// Byte offset within that block. May rest at `BLOCK_SIZE`; the next
    /// I/O step normalizes it into the following block.
    pub byte_pos: usize,
}

impl Descriptor {
    pub fn new(file_id: u64, flags: OpenFlags) -> Self {
        Self {
            file_id,
            flags,
            block_index: 0,
            byte_pos: 0,
        }
    }
}

// ---------------------------------------------------------------------------
//  Descriptor Table
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct DescriptorTable {
    /// Backing array; `None` marks a free slot.
    slots: Vec<Option<Descriptor>>,
    /// One past the highest occupied slot.
    count: usize,
}

impl DescriptorTable {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(TABLE_FLOOR);
        slots.resize_with(TABLE_FLOOR, || None);
        Self { slots, count: 0 }
    }

    /// Place a descriptor at the smallest free index, growing the backing
    /// array when every slot is taken.
    pub fn allocate(&mut self, descriptor: Descriptor) -> usize {
        let fd = match self.slots.iter().position(Option::is_none) {
            Some(fd) => fd,
            None => {
                let grown = self.slots.len() * CAPACITY_FACTOR;
                self.slots.resize_with(grown, || None);
                self.count
            }
        };
        self.slots[fd] = Some(descriptor);
        if fd == self.count {
            self.count += 1;
        }
        fd
    }

    pub fn get(&self, fd: usize) -> Option<&Descriptor> {
        self.slots.get(fd).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, fd: usize) -> Option<&mut Descriptor> {
        self.slots.get_mut(fd).and_then(Option::as_mut)
    }

    /// Free a slot and hand back its descriptor. The logical count shrinks
    /// over trailing holes and the backing array compacts when occupancy
    /// drops below half.
    pub fn release(&mut self, fd: usize) -> Option<Descriptor> {
        let descriptor = self.slots.get_mut(fd)?.take()?;
        while self.count > 0 && self.slots[self.count - 1].is_none() {
            self.count -= 1;
        }
        let capacity = self.slots.len();
        if self.count < capacity / CAPACITY_FACTOR && capacity > TABLE_FLOOR {
            let target = (capacity / CAPACITY_FACTOR).max(TABLE_FLOOR);
            self.slots.truncate(target);
            self.slots.shrink_to_fit();
        }
        Some(descriptor)
    }

    /// Number of live descriptors.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Descriptor> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
//  Tests
// ===========================================================================
