use std::io::{Read, Write};

use super::*;
use crate::Error;

impl Default for Block {
    fn default() -> Self {
        Self {
            data: vec![0; BLOCK_SIZE],
            next: SENTINEL_BLOCK,
            in_use: false,
            ref_count: 0,
        }
    }
}

impl Block {
    /// Reset to the freshly allocated state without touching the data bytes
    pub(crate) fn clear(&mut self) {
        self.next = SENTINEL_BLOCK;
        self.in_use = false;
        self.ref_count = 0;
    }
}

impl PersistentRecord for Block {
    type Error = Error;

    fn load<D: Read>(device: &mut D) -> Result<Self, Self::Error> {
        let mut data = vec![0u8; BLOCK_SIZE];
        device.read_exact(&mut data)?;
        let mut record_raw = [0u8; std::mem::size_of::<BlockRecord>()];
        device.read_exact(&mut record_raw)?;
        let record = bytemuck::pod_read_unaligned::<BlockRecord>(&record_raw);
        Ok(Self {
            data,
            next: record.next,
            in_use: record.in_use != 0,
            ref_count: record.ref_count,
        })
    }

    fn flush<D: Write>(&self, device: &mut D) -> Result<(), Self::Error> {
        device.write_all(&self.data)?;
        let record = BlockRecord {
            next: self.next,
            in_use: self.in_use as u8,
            ref_count: self.ref_count,
        };
        device.write_all(bytemuck::bytes_of(&record))?;
        Ok(())
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.next == other.next
            && self.in_use == other.in_use
            && self.ref_count == other.ref_count
            && self.data == other.data
    }
}
