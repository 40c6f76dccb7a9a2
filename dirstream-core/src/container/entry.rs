use serde::{Deserialize, Serialize};

/// Type tag carried by header and manifest records.
#[repr(u8)]
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Regular = 0,
    Directory = 1,
    Symlink = 2,
}

impl EntryType {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(EntryType::Regular),
            1 => Some(EntryType::Directory),
            2 => Some(EntryType::Symlink),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Regular => "file",
            EntryType::Directory => "dir",
            EntryType::Symlink => "symlink",
        }
    }
}

/// Metadata of one file-system object in the stream.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// Slash-separated path relative to the stream root.
    pub path: String,
    pub kind: EntryType,
    /// Content length; always 0 for directories and symlinks.
    pub size: u64,
    pub mode: u32,
    /// Seconds since the Unix epoch.
    pub mtime: i64,
    pub link_target: Option<String>,
}

impl Entry {
    pub fn directory(path: impl Into<String>, mode: u32, mtime: i64) -> Self {
        Self {
            path: path.into(),
            kind: EntryType::Directory,
            size: 0,
            mode,
            mtime,
            link_target: None,
        }
    }

    pub fn regular(path: impl Into<String>, size: u64, mode: u32, mtime: i64) -> Self {
        Self {
            path: path.into(),
            kind: EntryType::Regular,
            size,
            mode,
            mtime,
            link_target: None,
        }
    }

    pub fn symlink(path: impl Into<String>, target: impl Into<String>, mtime: i64) -> Self {
        Self {
            path: path.into(),
            kind: EntryType::Symlink,
            size: 0,
            mode: 0o777,
            mtime,
            link_target: Some(target.into()),
        }
    }

    /// Content bytes that follow the header as chunks.
    pub fn size_on_wire(&self) -> u64 {
        match self.kind {
            EntryType::Regular => self.size,
            _ => 0,
        }
    }
}
