//! Bounds-checked access to the raw file image.
//!
//! Every read goes through [`Image`] or a [`Table`] built from it, so an offset taken from the
//! file is checked against the buffer before a single byte behind it is touched.

use crate::error::{Malformed, Result};
use alloc::{borrow::Cow, string::String};
use binrw::{io::Cursor, BinRead, Endian};
use core::{fmt, marker::PhantomData};

/// An immutable view over the complete file contents.
#[derive(Clone, Copy)]
pub struct Image<'a> {
    bytes: &'a [u8],
}

impl<'a> Image<'a> {
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub(crate) const fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `length` bytes starting at `offset`, or `OutOfBounds` naming `region`.
    pub fn region(&self, region: &'static str, offset: u64, length: u64) -> Result<&'a [u8]> {
        let out_of_bounds = || Malformed::OutOfBounds {
            region,
            offset,
            length,
            image_length: self.len(),
        };

        let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
        let length = usize::try_from(length).map_err(|_| out_of_bounds())?;
        let end = start.checked_add(length).ok_or_else(out_of_bounds)?;

        Ok(self.bytes.get(start..end).ok_or_else(out_of_bounds)?)
    }

    /// Reads the null-terminated string starting at `offset`.
    /// Both the start and the terminator have to lie within the image.
    pub fn string_at(&self, offset: u64) -> Result<Cow<'a, str>> {
        let unterminated = || Malformed::UnterminatedString { offset };

        let tail = usize::try_from(offset)
            .ok()
            .and_then(|start| self.bytes.get(start..))
            .ok_or_else(unterminated)?;
        let end = tail.iter().position(|&b| b == 0).ok_or_else(unterminated)?;

        Ok(String::from_utf8_lossy(&tail[..end]))
    }

    /// Like [`Image::string_at`], for a string stored `offset` bytes into a table at `base`.
    pub fn string_in(&self, base: u64, offset: u64) -> Result<Cow<'a, str>> {
        let start = base
            .checked_add(offset)
            .ok_or(Malformed::UnterminatedString { offset })?;
        self.string_at(start)
    }
}

impl fmt::Debug for Image<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("bytes", &format_args!("[u8; {}]", self.bytes.len()))
            .finish()
    }
}

/// A fixed-size little-endian record as laid out in the file.
pub trait Record: for<'b> BinRead<Args<'b> = ()> + Sized {
    /// Size in bytes of the record on disk.
    const SIZE: usize;
    /// Name used in error messages.
    const REGION: &'static str;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let bytes = bytes.get(..Self::SIZE).ok_or(Malformed::EntrySize {
            region: Self::REGION,
            entry_size: bytes.len() as u64,
            expected: Self::SIZE,
        })?;

        Self::read_options(&mut Cursor::new(bytes), Endian::Little, ())
            .map_err(|err| Malformed::decode(Self::REGION, err).into())
    }
}

/// A contiguous array of records, decoded one entry at a time.
///
/// `entry_size` comes from the file and may be larger than the record, but never smaller.
pub struct Table<'a, T> {
    data: &'a [u8],
    entry_size: usize,
    _record: PhantomData<fn() -> T>,
}

impl<'a, T: Record> Table<'a, T> {
    pub fn new(data: &'a [u8], entry_size: u64) -> Result<Self> {
        let too_small = || Malformed::EntrySize {
            region: T::REGION,
            entry_size,
            expected: T::SIZE,
        };

        let entry_size = usize::try_from(entry_size).map_err(|_| too_small())?;
        if entry_size < T::SIZE {
            return Err(too_small().into());
        }

        Ok(Self {
            data,
            entry_size,
            _record: PhantomData,
        })
    }

    pub const fn empty() -> Self {
        Self {
            data: &[],
            entry_size: T::SIZE,
            _record: PhantomData,
        }
    }

    /// Number of whole entries; a trailing partial entry is ignored.
    pub fn len(&self) -> usize {
        self.data.len() / self.entry_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Result<T> {
        if index >= self.len() {
            return Err(Malformed::IndexOutOfRange {
                region: T::REGION,
                index,
                count: self.len(),
            }
            .into());
        }

        T::decode(&self.data[index * self.entry_size..])
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<T>> + '_ {
        (0..self.len()).map(move |index| self.get(index))
    }
}

impl<T> Clone for Table<'_, T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data,
            entry_size: self.entry_size,
            _record: PhantomData,
        }
    }
}

impl<T: Record> fmt::Debug for Table<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("region", &T::REGION)
            .field("entry_size", &self.entry_size)
            .field("len", &self.len())
            .finish()
    }
}
