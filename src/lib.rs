//! Single-process copy-on-write storage engine. A fixed pool of fixed-size
//! blocks backs a flat set of named files; every write preserves the previous
//! contents as an immutable version that can be re-promoted later.

pub use error::Error;
pub use filesystem::{BlockDevice, CowFs, Fd};
pub use structs::{
    FileMode, FileStatus, VersionInfo, BLOCK_SIZE, MAX_FILENAME_LENGTH, MAX_FILES,
};

mod delta;
mod error;
mod filesystem;
pub mod metadata;
mod structs;
