#![cfg_attr(not(any(test, feature = "fixture")), no_std)]

// Resources:
// https://en.wikipedia.org/wiki/Executable_and_Linkable_Format
// https://upload.wikimedia.org/wikipedia/commons/e/e4/ELF_Executable_and_Linkable_Format_diagram_by_Ange_Albertini.png
// https://man7.org/linux/man-pages/man5/elf.5.html
// https://docs.oracle.com/cd/E23824_01/html/819-0690/chapter6-46512.html#scrolltoc
// https://wiki.osdev.org/ELF_Tutorial
// $ readelf --headers --symbols --dynamic --relocs

pub mod anchor;
pub mod dispatch;
pub mod dynamic;
pub mod error;
#[cfg(any(test, feature = "fixture"))]
pub mod fixture;
pub mod header;
pub mod image;
pub mod program;
pub mod relocation;
pub mod section;
pub mod symbol;

extern crate alloc;

pub use error::{Anchor, Error, Malformed, Result};
pub use image::Image;

use header::Header;
use image::Table;
use program::ProgramHeader;
use section::SectionTable;

/// Displayed for any enumerant or flag set without a known name.
pub const UNKNOWN: &str = "???";

/// A parsed 64-bit little-endian ELF image.
///
/// Everything borrows from the byte buffer the image was parsed from; nothing is mutated
/// after construction.
#[derive(Debug)]
pub struct Elf<'a> {
    pub image: Image<'a>,
    pub header: Header,
    pub programs: Table<'a, ProgramHeader>,
    pub sections: SectionTable<'a>,
}

impl<'a> Elf<'a> {
    /// Decodes the file header, locates both header arrays and resolves every section name.
    /// Any region that falls outside of `bytes` is reported before it is read.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let image = Image::new(bytes);
        let header = Header::parse(&image)?;
        let programs = header.program_headers(&image)?;
        let sections = SectionTable::new(&image, &header)?;

        log::info!(
            "parsed {} program headers and {} sections from {} bytes",
            programs.len(),
            sections.len(),
            image.len()
        );

        Ok(Self {
            image,
            header,
            programs,
            sections,
        })
    }
}
