use std::fmt::Display;

#[derive(Debug)]
pub enum Error {
    NameTooLong,
    AlreadyExists,
    NotFound,
    NoInodes,
    NoDescriptors,
    BadDescriptor,
    WrongMode,
    OutOfSpace,
    VersionNotFound,
    Io(std::io::Error),
    Utf8(std::str::Utf8Error),
    Json(serde_json::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NameTooLong => write!(f, "file name too long"),
            Self::AlreadyExists => write!(f, "file already exists"),
            Self::NotFound => write!(f, "file not found"),
            Self::NoInodes => write!(f, "no free inodes"),
            Self::NoDescriptors => write!(f, "no free file descriptors"),
            Self::BadDescriptor => write!(f, "bad file descriptor"),
            Self::WrongMode => write!(f, "wrong file mode"),
            Self::OutOfSpace => write!(f, "out of space"),
            Self::VersionNotFound => write!(f, "version not found"),
            Self::Io(e) => write!(f, "{e}"),
            Self::Utf8(e) => write!(f, "{e}"),
            Self::Json(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(value: std::str::Utf8Error) -> Self {
        Self::Utf8(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
