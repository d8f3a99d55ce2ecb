//! In-memory file objects and the file system facade.
//!
//! Files are chains of fixed-size blocks; only the terminal block of a
//! chain may be partially occupied. Descriptors carry their own cursor, so
//! two descriptors on the same file read and write independently. Deleting
//! a file that still has open descriptors hides it from name lookup and
//! defers destruction until the last descriptor closes.

use std::collections::HashMap;

use crate::table::{Descriptor, DescriptorTable};

/// Size of one data block.
pub const BLOCK_SIZE: usize = 4096;

/// Hard ceiling on a single file's payload.
pub const MAX_FILE_SIZE: usize = 100 * 1024 * 1024;

// ---------------------------------------------------------------------------
//  Errors
// ---------------------------------------------------------------------------

/// Errors for file system operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum FsError {
    /// No such file or descriptor (ENOENT).
    #[error("no such file or descriptor: {target}")]
    #[diagnostic(code(memfs::no_file))]
    NoFile { target: String },

    /// File size cap or allocation limit exceeded (ENOMEM).
    #[error("storage limit exceeded: {detail}")]
    #[diagnostic(code(memfs::no_memory))]
    NoMemory { detail: String },

    /// The descriptor's open mode forbids the operation (EACCES).
    #[error("permission denied: {detail}")]
    #[diagnostic(code(memfs::no_permission))]
    NoPermission { detail: String },
}

// ---------------------------------------------------------------------------
//  Open Flags
// ---------------------------------------------------------------------------

/// Flags for [`MemFs::open`].
///
/// When none of the three access bits are set, the descriptor allows both
/// reading and writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags {
    /// Create the file if it does not exist.
    pub create: bool,
    pub read_only: bool,
    pub write_only: bool,
    pub read_write: bool,
}

impl OpenFlags {
    pub fn create() -> Self {
        Self {
            create: true,
            ..Self::default()
        }
    }

    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    pub fn write_only() -> Self {
        Self {
            write_only: true,
            ..Self::default()
        }
    }

    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Self::default()
        }
    }

    /// Also create the file if missing.
    pub fn with_create(mut self) -> Self {
        self.create = true;
        self
    }

    fn unrestricted(&self) -> bool {
        !self.read_only && !self.write_only && !self.read_write
    }

    pub(crate) fn readable(&self) -> bool {
        self.read_only || self.read_write || self.unrestricted()
    }

    pub(crate) fn writable(&self) -> bool {
        self.write_only || self.read_write || self.unrestricted()
    }
}

// ---------------------------------------------------------------------------
//  Block
// ---------------------------------------------------------------------------

/// One fixed-size node of a file's data chain.
#[derive(Debug, Clone)]
struct Block {
    /// Block memory, always `BLOCK_SIZE` long and zero-initialized.
    data: Vec<u8>,
    /// How many bytes hold file payload, `0..=BLOCK_SIZE`.
    occupied: usize,
}

impl Block {
    fn new() -> Self {
        Self {
            data: vec![0; BLOCK_SIZE],
            occupied: 0,
        }
    }

    fn full() -> Self {
        Self {
            data: vec![0; BLOCK_SIZE],
            occupied: BLOCK_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
//  File
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct File {
    /// Unique among visible files; meaningless once `removed`.
    name: String,
    /// Block chain, never empty. Every non-terminal block is full.
    blocks: Vec<Block>,
    /// Number of descriptors open on this file.
    refs: usize,
    /// Hidden from name lookup; destroyed when `refs` drops to zero.
    removed: bool,
}

impl File {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            blocks: vec![Block::new()],
            refs: 0,
            removed: false,
        }
    }

    /// Total payload bytes.
    fn size(&self) -> usize {
        (self.blocks.len() - 1) * BLOCK_SIZE + self.blocks[self.blocks.len() - 1].occupied
    }
}

// ---------------------------------------------------------------------------
//  File System
// ---------------------------------------------------------------------------

/// The in-memory file system: a file table plus a descriptor table.
///
/// Single-threaded; callers needing concurrent access wrap the whole
/// object in their own lock. Teardown is `Drop`.
#[derive(Debug, Default)]
pub struct MemFs {
    /// Every live file, including removed ones kept alive by open
    /// descriptors.
    files: HashMap<u64, File>,
    next_file_id: u64,
    table: DescriptorTable,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_visible(&self, name: &str) -> Option<u64> {
        self.files
            .iter()
            .find(|(_, file)| !file.removed && file.name == name)
            .map(|(id, _)| *id)
    }

    fn cursor(&self, fd: usize) -> Result<(u64, OpenFlags, usize, usize), FsError> {
        let descriptor = self.table.get(fd).ok_or(FsError::NoFile {
            target: format!("fd {fd}"),
        })?;
        Ok((
            descriptor.file_id,
            descriptor.flags,
            descriptor.block_index,
            descriptor.byte_pos,
        ))
    }

    fn store_cursor(&mut self, fd: usize, block_index: usize, byte_pos: usize) {
        if let Some(descriptor) = self.table.get_mut(fd) {
            descriptor.block_index = block_index;
            descriptor.byte_pos = byte_pos;
        }
    }

    /// Open a file, creating it when `flags.create` is set, and return the
    /// smallest free descriptor index.
    pub fn open(&mut self, name: &str, flags: OpenFlags) -> Result<usize, FsError> {
        if name.is_empty() {
            return Err(FsError::NoFile {
                target: String::from("<empty name>"),
            });
        }

        let file_id = match self.find_visible(name) {
            Some(id) => id,
            None if flags.create => {
                let id = self.next_file_id;
                self.next_file_id += 1;
                self.files.insert(id, File::new(name));
                id
            }
            None => {
                return Err(FsError::NoFile {
                    target: name.to_string(),
                })
            }
        };

        let fd = self.table.allocate(Descriptor::new(file_id, flags));
        if let Some(file) = self.files.get_mut(&file_id) {
            file.refs += 1;
        }
        Ok(fd)
    }

    /// Write the whole buffer at the descriptor's cursor, extending the
    /// block chain as needed. Refuses the entire write when it would push
    /// the file past [`MAX_FILE_SIZE`].
    pub fn write(&mut self, fd: usize, buf: &[u8]) -> Result<usize, FsError> {
        let (file_id, flags, mut block_index, mut byte_pos) = self.cursor(fd)?;
        if !flags.writable() {
            return Err(FsError::NoPermission {
                detail: format!("fd {fd} is not open for writing"),
            });
        }

        let file = self.files.get_mut(&file_id).ok_or(FsError::NoFile {
            target: format!("fd {fd}"),
        })?;

        let end = block_index * BLOCK_SIZE + byte_pos + buf.len();
        if end > MAX_FILE_SIZE {
            return Err(FsError::NoMemory {
                detail: format!("write would grow file past {MAX_FILE_SIZE} bytes"),
            });
        }

        let mut written = 0;
        while written < buf.len() {
            if byte_pos == BLOCK_SIZE {
                block_index += 1;
                byte_pos = 0;
                if block_index == file.blocks.len() {
                    file.blocks.push(Block::new());
                }
            }

            let block = &mut file.blocks[block_index];
            let chunk = (BLOCK_SIZE - byte_pos).min(buf.len() - written);
            block.data[byte_pos..byte_pos + chunk].copy_from_slice(&buf[written..written + chunk]);
            byte_pos += chunk;
            written += chunk;
            if byte_pos > block.occupied {
                block.occupied = byte_pos;
            }
        }

        self.store_cursor(fd, block_index, byte_pos);
        Ok(written)
    }

    /// Read up to `buf.len()` bytes from the descriptor's cursor. Returns a
    /// short count at end of data and 0 at EOF.
    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> Result<usize, FsError> {
        let (file_id, flags, mut block_index, mut byte_pos) = self.cursor(fd)?;
        if !flags.readable() {
            return Err(FsError::NoPermission {
                detail: format!("fd {fd} is not open for reading"),
            });
        }

        let file = self.files.get(&file_id).ok_or(FsError::NoFile {
            target: format!("fd {fd}"),
        })?;

        let mut total = 0;
        while total < buf.len() {
            if byte_pos == BLOCK_SIZE {
                if block_index + 1 == file.blocks.len() {
                    break;
                }
                block_index += 1;
                byte_pos = 0;
            }

            let block = &file.blocks[block_index];
            let chunk = block
                .occupied
                .saturating_sub(byte_pos)
                .min(buf.len() - total);
            if chunk == 0 {
                break;
            }
            buf[total..total + chunk].copy_from_slice(&block.data[byte_pos..byte_pos + chunk]);
            byte_pos += chunk;
            total += chunk;
        }

        self.store_cursor(fd, block_index, byte_pos);
        Ok(total)
    }

    /// Close a descriptor. A removed file is destroyed when its last
    /// descriptor goes away.
    pub fn close(&mut self, fd: usize) -> Result<(), FsError> {
        let descriptor = self.table.release(fd).ok_or(FsError::NoFile {
            target: format!("fd {fd}"),
        })?;

        if let Some(file) = self.files.get_mut(&descriptor.file_id) {
            file.refs -= 1;
            if file.refs == 0 && file.removed {
                self.files.remove(&descriptor.file_id);
            }
        }
        Ok(())
    }

    /// Delete a file by name. With open descriptors the file is only
    /// hidden: the name becomes free for a new file while existing
    /// descriptors keep operating on the old content.
    pub fn delete(&mut self, name: &str) -> Result<(), FsError> {
        let file_id = self.find_visible(name).ok_or(FsError::NoFile {
            target: name.to_string(),
        })?;

        let file = self.files.get_mut(&file_id).ok_or(FsError::NoFile {
            target: name.to_string(),
        })?;
        if file.refs == 0 {
            self.files.remove(&file_id);
        } else {
            file.removed = true;
        }
        Ok(())
    }

    /// Truncate or extend the file behind `fd` so its payload is exactly
    /// `new_size` bytes. Truncation clamps every cursor past the new end;
    /// extension appends zeroed bytes.
    pub fn resize(&mut self, fd: usize, new_size: usize) -> Result<(), FsError> {
        let (file_id, flags, _, _) = self.cursor(fd)?;
        if !flags.writable() {
            return Err(FsError::NoPermission {
                detail: format!("fd {fd} is not open for writing"),
            });
        }
        if new_size > MAX_FILE_SIZE {
            return Err(FsError::NoMemory {
                detail: format!("resize target exceeds {MAX_FILE_SIZE} bytes"),
            });
        }

        let file = self.files.get_mut(&file_id).ok_or(FsError::NoFile {
            target: format!("fd {fd}"),
        })?;
        let old_size = file.size();

        if new_size < old_size {
            let last = if new_size == 0 {
                0
            } else {
                (new_size - 1) / BLOCK_SIZE
            };
            file.blocks.truncate(last + 1);
            file.blocks[last].occupied = new_size - last * BLOCK_SIZE;
            let last_occupied = file.blocks[last].occupied;

            for descriptor in self.table.iter_mut() {
                if descriptor.file_id != file_id {
                    continue;
                }
                if descriptor.block_index > last
                    || (descriptor.block_index == last && descriptor.byte_pos > last_occupied)
                {
                    descriptor.block_index = last;
                    descriptor.byte_pos = descriptor.byte_pos.min(last_occupied);
                }
            }
        } else if new_size > old_size {
            let tail = file.blocks.len() - 1;
            let old_occupied = file.blocks[tail].occupied;
            for byte in &mut file.blocks[tail].data[old_occupied..] {
                *byte = 0;
            }
            file.blocks[tail].occupied = BLOCK_SIZE;

            while file.blocks.len() * BLOCK_SIZE < new_size {
                file.blocks.push(Block::full());
            }
            let last = file.blocks.len() - 1;
            file.blocks[last].occupied = new_size - last * BLOCK_SIZE;
        }

        Ok(())
    }

    /// Live file objects, including removed files kept alive by open
    /// descriptors.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Number of open descriptors.
    pub fn open_descriptor_count(&self) -> usize {
        self.table.occupied()
    }

    /// Current capacity of the descriptor table's backing array.
    pub fn table_capacity(&self) -> usize {
        self.table.capacity()
    }
}

// ===========================================================================
//  Tests
// ===========================================================================
