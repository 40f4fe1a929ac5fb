use std::io::{Read, Write};

use super::*;
use crate::Error;

impl Default for Inode {
    fn default() -> Self {
        Self {
            filename: [0; MAX_FILENAME_LENGTH],
            head_block: SENTINEL_BLOCK,
            size: 0,
            version_count: 0,
            in_use: false,
            history: Vec::new(),
        }
    }
}

impl Inode {
    /// Store a null-terminated name, truncating at the record capacity
    pub(crate) fn set_filename(&mut self, name: &str) {
        self.filename.fill(0);
        let bytes = name.as_bytes();
        let length = bytes.len().min(MAX_FILENAME_LENGTH - 1);
        self.filename[..length].copy_from_slice(&bytes[..length]);
    }

    /// Name up to the first null byte
    pub(crate) fn filename(&self) -> Result<&str, Error> {
        let end = self
            .filename
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.filename.len());
        Ok(std::str::from_utf8(&self.filename[..end])?)
    }
}

impl PersistentRecord for Inode {
    type Error = Error;

    fn load<D: Read>(device: &mut D) -> Result<Self, Self::Error> {
        let mut record_raw = [0u8; std::mem::size_of::<InodeRecord>()];
        device.read_exact(&mut record_raw)?;
        let record = bytemuck::pod_read_unaligned::<InodeRecord>(&record_raw);
        let version_count = record.version_count;
        let mut history = Vec::with_capacity(version_count as usize);
        for _ in 0..version_count {
            history.push(VersionInfo::load(device)?);
        }
        Ok(Self {
            filename: record.filename,
            head_block: record.head_block,
            size: record.size,
            version_count,
            in_use: record.in_use != 0,
            history,
        })
    }

    fn flush<D: Write>(&self, device: &mut D) -> Result<(), Self::Error> {
        let record = InodeRecord {
            filename: self.filename,
            head_block: self.head_block,
            size: self.size,
            version_count: self.version_count,
            in_use: self.in_use as u8,
        };
        device.write_all(bytemuck::bytes_of(&record))?;
        for version in &self.history {
            version.flush(device)?;
        }
        Ok(())
    }
}
