use alloc::{format, string::String};
use core::fmt;
use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// An offset, count or index taken from the file does not fit the image.
    /// Nothing after the file header can be trusted, so this ends the parse.
    #[error("malformed header")]
    MalformedHeader(#[from] Malformed),

    #[error("unsupported object file: {0}")]
    Unsupported(&'static str),

    /// A decoder needs a companion section that the file does not have.
    #[error("section `{section}` needs the `{anchor}` section, which was not found")]
    MissingAnchorSection { section: String, anchor: Anchor },
}

impl Error {
    /// Whether the parse can go on with the next section after this error.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::MissingAnchorSection { .. })
    }
}

#[derive(Debug, Error)]
pub enum Malformed {
    #[error(
        "{region} at {offset:#x} (+{length:#x} bytes) exceeds the {image_length:#x}-byte image"
    )]
    OutOfBounds {
        region: &'static str,
        offset: u64,
        length: u64,
        image_length: usize,
    },

    #[error("string at {offset:#x} is not null-terminated within the image")]
    UnterminatedString { offset: u64 },

    #[error("{region} entry size {entry_size} is smaller than the {expected}-byte record")]
    EntrySize {
        region: &'static str,
        entry_size: u64,
        expected: usize,
    },

    #[error("{region} index {index} is out of range ({count} entries)")]
    IndexOutOfRange {
        region: &'static str,
        index: usize,
        count: usize,
    },

    #[error("missing the ELF magic bytes")]
    BadMagic,

    #[error("failed to decode {region}: {message}")]
    Decode {
        region: &'static str,
        message: String,
    },
}

impl Malformed {
    pub(crate) fn decode(region: &'static str, err: binrw::Error) -> Self {
        Self::Decode {
            region,
            message: format!("{err}"),
        }
    }
}

/// Companion sections located by name before any section is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// `.strtab`
    StringTable,
    /// `.dynstr`
    DynamicStringTable,
    /// `.dynsym`
    DynamicSymbolTable,
}

impl Anchor {
    pub const ALL: [Anchor; 3] = [
        Self::StringTable,
        Self::DynamicStringTable,
        Self::DynamicSymbolTable,
    ];

    pub const fn section_name(self) -> &'static str {
        match self {
            Self::StringTable => ".strtab",
            Self::DynamicStringTable => ".dynstr",
            Self::DynamicSymbolTable => ".dynsym",
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section_name())
    }
}
