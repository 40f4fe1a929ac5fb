use log::{debug, info, warn};

use super::{CowFs, Fd};
use crate::structs::*;
use crate::Error;

impl CowFs {
    /// Create an empty file and open it for writing at position 0.
    ///
    /// The first version is only recorded by the first [`write`](Self::write).
    pub fn create(&mut self, name: &str) -> Result<Fd, Error> {
        info!("Creating file {name}");
        // An embedded null would be cut short by the null-terminated record
        if name.is_empty() || name.len() >= MAX_FILENAME_LENGTH || name.contains('\0') {
            warn!("Rejecting invalid file name of {} bytes", name.len());
            return Err(Error::NameTooLong);
        }
        if self.find_inode(name).is_some() {
            warn!("File {name} already exists");
            return Err(Error::AlreadyExists);
        }
        let inode_index = self.allocate_inode()?;
        let inode = &mut self.inodes[inode_index];
        *inode = Inode::default();
        inode.set_filename(name);
        inode.in_use = true;
        let Some(fd) = self.allocate_fd() else {
            // Roll back the inode so the failed create leaves no trace
            self.inodes[inode_index].in_use = false;
            return Err(Error::NoDescriptors);
        };
        self.descriptors[fd as usize] = FileDescriptor {
            inode: inode_index,
            mode: FileMode::Write,
            position: 0,
            valid: true,
        };
        debug!("Created {name} with fd {fd}");
        Ok(fd)
    }

    /// Open an existing file. Reads start at position 0, writes append at the
    /// current end of the file.
    pub fn open(&mut self, name: &str, mode: FileMode) -> Result<Fd, Error> {
        info!("Opening {name} in {mode:?} mode");
        let inode_index = self.find_inode(name).ok_or(Error::NotFound)?;
        let fd = self.allocate_fd().ok_or(Error::NoDescriptors)?;
        let position = match mode {
            FileMode::Read => 0,
            FileMode::Write => self.inodes[inode_index].size,
        };
        self.descriptors[fd as usize] = FileDescriptor {
            inode: inode_index,
            mode,
            position,
            valid: true,
        };
        debug!("Opened {name} with fd {fd} at position {position}");
        Ok(fd)
    }

    /// Read from the current version at the descriptor's position.
    ///
    /// Returns the count of bytes copied into `buffer`, 0 at end of file.
    pub fn read(&mut self, fd: Fd, buffer: &mut [u8]) -> Result<usize, Error> {
        let descriptor = self.descriptor(fd)?;
        if descriptor.mode != FileMode::Read {
            return Err(Error::WrongMode);
        }
        let inode = &self.inodes[descriptor.inode];
        if descriptor.position >= inode.size {
            debug!("End of file on fd {fd}");
            return Ok(0);
        }
        let wanted = buffer.len().min((inode.size - descriptor.position) as usize);
        let mut current =
            self.nth_chain_block(inode.head_block, descriptor.position / BLOCK_SIZE as u64);
        let mut offset = (descriptor.position % BLOCK_SIZE as u64) as usize;
        let mut total = 0;
        while total < wanted && current != SENTINEL_BLOCK {
            let block = &self.blocks[current as usize];
            let take = (wanted - total).min(BLOCK_SIZE - offset);
            buffer[total..total + take].copy_from_slice(&block.data[offset..offset + take]);
            total += take;
            offset = 0;
            current = block.next;
        }
        self.descriptors[fd as usize].position += total as u64;
        debug!("Read {total} bytes from fd {fd}");
        Ok(total)
    }

    /// Replace the file content from the descriptor's position onward and
    /// record it as exactly one new version.
    ///
    /// On failure no version is committed and no block stays allocated.
    pub fn write(&mut self, fd: Fd, buffer: &[u8]) -> Result<usize, Error> {
        let descriptor = self.descriptor(fd)?;
        if descriptor.mode != FileMode::Write {
            return Err(Error::WrongMode);
        }
        let (head, size) = {
            let inode = &self.inodes[descriptor.inode];
            (inode.head_block, inode.size)
        };
        let previous = self.read_chain(head, size);
        let keep = (descriptor.position as usize).min(previous.len());
        let mut content = Vec::with_capacity(keep + buffer.len());
        content.extend_from_slice(&previous[..keep]);
        content.extend_from_slice(buffer);
        self.append_version(descriptor.inode, &previous, &content)?;
        self.descriptors[fd as usize].position += buffer.len() as u64;
        debug!(
            "Wrote {} bytes to fd {fd} as version {}",
            buffer.len(),
            self.inodes[descriptor.inode].version_count
        );
        Ok(buffer.len())
    }

    /// Invalidate a descriptor; the file and its versions stay intact
    pub fn close(&mut self, fd: Fd) -> Result<(), Error> {
        self.descriptor(fd)?;
        self.descriptors[fd as usize].valid = false;
        debug!("Closed fd {fd}");
        Ok(())
    }

    pub fn get_version_count(&self, fd: Fd) -> Result<u64, Error> {
        let descriptor = self.descriptor(fd)?;
        Ok(self.inodes[descriptor.inode].version_count)
    }

    pub fn get_version_history(&self, fd: Fd) -> Result<Vec<VersionInfo>, Error> {
        let descriptor = self.descriptor(fd)?;
        Ok(self.inodes[descriptor.inode].history.clone())
    }

    pub fn get_file_size(&self, fd: Fd) -> Result<u64, Error> {
        let descriptor = self.descriptor(fd)?;
        Ok(self.inodes[descriptor.inode].size)
    }

    pub fn get_file_status(&self, fd: Fd) -> Result<FileStatus, Error> {
        let descriptor = self.descriptor(fd)?;
        let inode = &self.inodes[descriptor.inode];
        Ok(FileStatus {
            is_open: true,
            is_modified: descriptor.mode == FileMode::Write,
            size: inode.size,
            version: inode.version_count,
        })
    }

    /// Names of all files, in inode order
    pub fn list_files(&self) -> Vec<String> {
        self.inodes
            .iter()
            .filter(|inode| inode.in_use)
            .filter_map(|inode| inode.filename().ok().map(str::to_string))
            .collect()
    }

    /// Bytes held by allocated blocks
    pub fn total_memory_usage(&self) -> u64 {
        self.blocks.iter().filter(|block| block.in_use).count() as u64 * BLOCK_SIZE as u64
    }

    /// First invalid descriptor slot
    fn allocate_fd(&self) -> Option<Fd> {
        self.descriptors
            .iter()
            .position(|descriptor| !descriptor.valid)
            .map(|index| index as Fd)
    }

    /// Validated copy of the descriptor behind `fd`
    pub(crate) fn descriptor(&self, fd: Fd) -> Result<FileDescriptor, Error> {
        let index = usize::try_from(fd).map_err(|_| Error::BadDescriptor)?;
        match self.descriptors.get(index) {
            Some(descriptor) if descriptor.valid => Ok(*descriptor),
            _ => Err(Error::BadDescriptor),
        }
    }
}
