//! Read-only JSON snapshots of the engine state.
//!
//! Only the enumeration surface is used here: file listing, read-mode opens,
//! status, history, and the memory gauge. Nothing in this module mutates a
//! file or its versions.

use log::info;
use serde::Serialize;

use crate::structs::{FileMode, VersionInfo};
use crate::{CowFs, Error};

#[derive(Debug, Serialize)]
pub struct MetadataSnapshot {
    pub filesystem: FilesystemMetadata,
}

#[derive(Debug, Serialize)]
pub struct FilesystemMetadata {
    pub total_memory_usage: u64,
    pub files: Vec<FileMetadata>,
}

#[derive(Debug, Serialize)]
pub struct FileMetadata {
    pub name: String,
    pub size: u64,
    pub version_count: u64,
    pub is_open: bool,
    pub version_history: Vec<VersionInfo>,
}

/// Collect the status and version history of every file
pub fn snapshot(fs: &mut CowFs) -> Result<MetadataSnapshot, Error> {
    let mut files = Vec::new();
    for name in fs.list_files() {
        let fd = fs.open(&name, FileMode::Read)?;
        let status = fs.get_file_status(fd)?;
        let version_history = fs.get_version_history(fd)?;
        fs.close(fd)?;
        files.push(FileMetadata {
            name,
            size: status.size,
            version_count: status.version,
            is_open: status.is_open,
            version_history,
        });
    }
    Ok(MetadataSnapshot {
        filesystem: FilesystemMetadata {
            total_memory_usage: fs.total_memory_usage(),
            files,
        },
    })
}

/// Snapshot rendered as pretty-printed JSON
pub fn render(fs: &mut CowFs) -> Result<String, Error> {
    Ok(serde_json::to_string_pretty(&snapshot(fs)?)?)
}

/// Write the snapshot to `metadata_<label>.json` in the working directory
pub fn save(fs: &mut CowFs, label: &str) -> Result<(), Error> {
    let path = format!("metadata_{label}.json");
    std::fs::write(&path, render(fs)?)?;
    info!("Metadata saved to {path}");
    Ok(())
}
