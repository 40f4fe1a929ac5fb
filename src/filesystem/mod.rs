use std::fmt::Debug;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{error, info};

use crate::structs::*;
use crate::Error;

mod api;
mod gc;
mod version;

pub trait BlockDevice: Read + Write + Seek + Debug {}

impl BlockDevice for std::fs::File {}

/// File descriptor handle, an index into the engine's descriptor table
pub type Fd = i32;

/// Copy-on-write storage engine over a fixed pool of [`BLOCK_SIZE`] blocks.
///
/// The whole state lives in memory; the backing device only sees it on
/// [`save`](Self::save). A single instance owns its device exclusively and
/// must not be shared across threads without external locking.
#[derive(Debug)]
pub struct CowFs {
    pub(crate) inodes: Vec<Inode>,
    pub(crate) blocks: Vec<Block>,
    pub(crate) descriptors: Vec<FileDescriptor>,
    pub(crate) free_list: FreeList,
    pub(crate) device: Box<dyn BlockDevice>,
    pub(crate) total_blocks: u64,
    pub(crate) flushed: bool,
}

impl CowFs {
    /// Fresh engine with `capacity / BLOCK_SIZE` zeroed blocks.
    ///
    /// The device is not written until [`save`](Self::save).
    pub fn new(device: Box<dyn BlockDevice>, capacity: u64) -> Self {
        let total_blocks = capacity / BLOCK_SIZE as u64;
        info!("Initializing engine with {total_blocks} blocks of {BLOCK_SIZE} bytes");
        Self {
            inodes: (0..MAX_FILES).map(|_| Inode::default()).collect(),
            blocks: (0..total_blocks).map(|_| Block::default()).collect(),
            descriptors: vec![
                FileDescriptor {
                    inode: 0,
                    mode: FileMode::Read,
                    position: 0,
                    valid: false,
                };
                MAX_FILES
            ],
            free_list: FreeList::full(total_blocks),
            device,
            total_blocks,
            flushed: false,
        }
    }

    /// Load a previously saved engine image.
    ///
    /// The image layout is unversioned: `capacity` must match the value the
    /// image was created with, otherwise the result is undefined. The read is
    /// all-or-nothing; a short image fails with [`Error::Io`].
    pub fn load(mut device: Box<dyn BlockDevice>, capacity: u64) -> Result<Self, Error> {
        let total_blocks = capacity / BLOCK_SIZE as u64;
        info!("Loading engine image with {total_blocks} blocks");
        device.seek(SeekFrom::Start(0))?;
        let mut inodes = Vec::with_capacity(MAX_FILES);
        for _ in 0..MAX_FILES {
            inodes.push(Inode::load(&mut device)?);
        }
        let mut blocks = Vec::with_capacity(total_blocks as usize);
        for _ in 0..total_blocks {
            blocks.push(Block::load(&mut device)?);
        }
        // The free list is never persisted, reconstruct it from occupancy
        let free_list = FreeList::rebuild(&blocks);
        Ok(Self {
            inodes,
            blocks,
            descriptors: vec![
                FileDescriptor {
                    inode: 0,
                    mode: FileMode::Read,
                    position: 0,
                    valid: false,
                };
                MAX_FILES
            ],
            free_list,
            device,
            total_blocks,
            flushed: false,
        })
    }

    /// Open the engine backed by `path`, loading an existing image or
    /// creating the file and writing the zero-initialized state.
    pub fn open_disk<P: AsRef<Path>>(path: P, capacity: u64) -> Result<Self, Error> {
        let path = path.as_ref();
        if path.exists() {
            let device = std::fs::File::options().read(true).write(true).open(path)?;
            Self::load(Box::new(device), capacity)
        } else {
            let device = std::fs::File::options()
                .read(true)
                .write(true)
                .create(true)
                .open(path)?;
            let mut fs = Self::new(Box::new(device), capacity);
            fs.save()?;
            Ok(fs)
        }
    }

    /// Rewrite the whole image: the inode table with inline version
    /// histories, then the block array.
    pub fn save(&mut self) -> Result<(), Error> {
        self.device.seek(SeekFrom::Start(0))?;
        for inode in &self.inodes {
            inode.flush(&mut self.device)?;
        }
        for block in &self.blocks {
            block.flush(&mut self.device)?;
        }
        self.device.flush()?;
        Ok(())
    }

    /// Flush to the device and consume the engine
    pub fn shutdown(mut self) -> Result<(), Error> {
        info!("Shutting down");
        self.save()?;
        self.flushed = true;
        Ok(())
    }

    /// Slot of the in-use inode carrying `name`
    pub(crate) fn find_inode(&self, name: &str) -> Option<usize> {
        self.inodes
            .iter()
            .position(|inode| inode.in_use && inode.filename().is_ok_and(|f| f == name))
    }

    /// First free inode slot
    pub(crate) fn allocate_inode(&mut self) -> Result<usize, Error> {
        self.inodes
            .iter()
            .position(|inode| !inode.in_use)
            .ok_or(Error::NoInodes)
    }

    /// Take a block from the free list and mark it allocated
    pub(crate) fn allocate_block(&mut self) -> Result<u64, Error> {
        let index = self.free_list.allocate_one().ok_or(Error::OutOfSpace)?;
        let block = &mut self.blocks[index as usize];
        block.next = SENTINEL_BLOCK;
        block.in_use = true;
        block.ref_count = 1;
        Ok(index)
    }

    /// Clear a block and return it to the free list
    pub(crate) fn free_block(&mut self, index: u64) {
        self.blocks[index as usize].clear();
        self.free_list.free_one(index);
    }

    /// Block indices of the chain starting at `head`, in order
    pub(crate) fn chain_blocks(&self, head: u64) -> Vec<u64> {
        let mut chain = Vec::new();
        let mut current = head;
        while current != SENTINEL_BLOCK {
            chain.push(current);
            current = self.blocks[current as usize].next;
        }
        chain
    }

    /// Block index `position` steps down the chain starting at `head`
    pub(crate) fn nth_chain_block(&self, head: u64, position: u64) -> u64 {
        let mut current = head;
        for _ in 0..position {
            current = self.blocks[current as usize].next;
        }
        current
    }

    /// Materialize the first `size` bytes of the chain starting at `head`
    pub(crate) fn read_chain(&self, head: u64, size: u64) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(size as usize);
        let mut current = head;
        while bytes.len() < size as usize && current != SENTINEL_BLOCK {
            let block = &self.blocks[current as usize];
            let take = (size as usize - bytes.len()).min(BLOCK_SIZE);
            bytes.extend_from_slice(&block.data[..take]);
            current = block.next;
        }
        bytes
    }

    /// Add one reference to every block of a chain
    pub(crate) fn increment_chain(&mut self, head: u64) {
        let mut current = head;
        while current != SENTINEL_BLOCK {
            let block = &mut self.blocks[current as usize];
            block.ref_count += 1;
            current = block.next;
        }
    }

    /// Drop one reference from every block of a chain, freeing blocks that
    /// reach zero
    pub(crate) fn decrement_chain(&mut self, head: u64) {
        let mut current = head;
        while current != SENTINEL_BLOCK {
            let next = self.blocks[current as usize].next;
            let block = &mut self.blocks[current as usize];
            block.ref_count = block.ref_count.saturating_sub(1);
            if block.ref_count == 0 {
                self.free_block(current);
            }
            current = next;
        }
    }
}

impl Drop for CowFs {
    fn drop(&mut self) {
        if self.flushed {
            return;
        }
        if let Err(e) = self.save() {
            error!("Error flushing engine image on drop: {e}");
        }
    }
}
