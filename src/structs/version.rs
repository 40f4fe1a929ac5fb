use std::fmt::Display;
use std::io::{Read, Write};

use chrono::Local;

use super::*;
use crate::Error;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current wall-clock time as `YYYY-MM-DD HH:MM:SS` in local time
pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

impl PersistentRecord for VersionInfo {
    type Error = Error;

    fn load<D: Read>(device: &mut D) -> Result<Self, Self::Error> {
        let mut record_raw = [0u8; std::mem::size_of::<VersionRecord>()];
        device.read_exact(&mut record_raw)?;
        let record = bytemuck::pod_read_unaligned::<VersionRecord>(&record_raw);
        let timestamp_raw = record.timestamp;
        let end = timestamp_raw
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(timestamp_raw.len());
        Ok(Self {
            version_number: record.version_number,
            head_block: record.head_block,
            size: record.size,
            timestamp: std::str::from_utf8(&timestamp_raw[..end])?.to_string(),
            delta_start: record.delta_start,
            delta_size: record.delta_size,
            prev_version: record.prev_version,
        })
    }

    fn flush<D: Write>(&self, device: &mut D) -> Result<(), Self::Error> {
        let mut timestamp = [0u8; TIMESTAMP_LENGTH];
        let bytes = self.timestamp.as_bytes();
        let length = bytes.len().min(TIMESTAMP_LENGTH);
        timestamp[..length].copy_from_slice(&bytes[..length]);
        let record = VersionRecord {
            version_number: self.version_number,
            head_block: self.head_block,
            size: self.size,
            timestamp,
            delta_start: self.delta_start,
            delta_size: self.delta_size,
            prev_version: self.prev_version,
        };
        device.write_all(bytemuck::bytes_of(&record))?;
        Ok(())
    }
}

impl Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "version {} (size: {} bytes, block: {}, delta: {}+{}, time: {})",
            self.version_number,
            self.size,
            self.head_block,
            self.delta_start,
            self.delta_size,
            self.timestamp,
        )
    }
}
