use crate::{
    error::Result,
    header::Header,
    image::{Image, Record, Table},
    UNKNOWN,
};
use alloc::{borrow::Cow, string::String, vec::Vec};
use arbitrary_int::u4;
use binrw::binrw;
use bitbybit::{bitenum, bitfield};
use core::{fmt, ops::Index};

/// Every section of the file with its resolved name and the bytes it covers.
#[derive(Debug)]
pub struct SectionTable<'a> {
    sections: Vec<Section<'a>>,
}

impl<'a> SectionTable<'a> {
    pub fn new(image: &Image<'a>, header: &Header) -> Result<Self> {
        let headers = header
            .section_headers(image)?
            .iter()
            .collect::<Result<Vec<_>>>()?;

        let Some(name_table_offset) = headers
            .get(header.primary.section_header_string_table_index as usize)
            .map(|name_table| name_table.offset)
        else {
            return Ok(Self {
                sections: Vec::new(),
            });
        };

        let mut sections = Vec::with_capacity(headers.len());
        for (index, section_header) in headers.into_iter().enumerate() {
            let name = section_name(image, name_table_offset, section_header.name_offset)?;
            let (offset, size) = (section_header.offset, section_header.size);
            let section_type = SectionType::new_with_raw_value(section_header.section_type);
            let data: &'a [u8] = match section_type {
                // Occupies no space in the file, `size` only describes memory.
                Ok(SectionType::ProgramSpaceNoData) => &[],
                _ => image.region("section data", offset, size)?,
            };

            log::trace!("section {index}: {name} ({} bytes)", data.len());
            sections.push(Section {
                index,
                name,
                header: section_header,
                data,
            });
        }

        Ok(Self { sections })
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// The first section called `name`.
    pub fn get(&self, name: &str) -> Option<&Section<'a>> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Section<'a>> {
        self.sections.iter()
    }
}

impl<'a> Index<usize> for SectionTable<'a> {
    type Output = Section<'a>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.sections[index]
    }
}

/// Resolves a section name from the section name table at `name_table_offset`.
pub fn section_name<'a>(
    image: &Image<'a>,
    name_table_offset: u64,
    name_offset: u32,
) -> Result<Cow<'a, str>> {
    image.string_in(name_table_offset, name_offset.into())
}

pub struct Section<'a> {
    /// Position in the section header table.
    pub index: usize,
    pub name: Cow<'a, str>,
    pub header: SectionHeader64,
    pub data: &'a [u8],
}

impl<'a> Section<'a> {
    pub fn type_name(&self) -> &'static str {
        SectionType::name_of(self.header.section_type)
    }

    /// The section's contents as an array of `T`, using the entry size from its header.
    pub fn entries<T: Record>(&self) -> Result<Table<'a, T>> {
        Table::new(self.data, self.header.entry_size)
    }

    /// Walks the section as a sequence of null-terminated strings.
    pub fn strings(&self) -> Strings<'a> {
        Strings { rest: self.data }
    }

    /// The section's contents up to the first null byte, such as the path in `.interp`.
    pub fn as_str(&self) -> Cow<'a, str> {
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.data.len());
        String::from_utf8_lossy(&self.data[..end])
    }
}

impl<'a> fmt::Debug for Section<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Section")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("header", &self.header)
            .field("data", &format_args!("[u8; {}]", self.data.len()))
            .finish()
    }
}

/// Iterator over the strings of a string table, in the order they are stored.
pub struct Strings<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Strings<'a> {
    type Item = Cow<'a, str>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }

        // An unterminated tail still ends at the section boundary.
        let end = self
            .rest
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.rest.len());
        let string = String::from_utf8_lossy(&self.rest[..end]);
        self.rest = self.rest.get(end + 1..).unwrap_or_default();
        Some(string)
    }
}

/// A section header table entry, for 64-bit objects.
#[derive(Debug)]
#[binrw]
pub struct SectionHeader64 {
    /// An offset to a string in the .shstrtab section that represents the name of this section. (`sh_name`)
    pub name_offset: u32,
    /// The type of this section header. (`sh_type`)
    pub section_type: u32,
    /// The attributes of the section. (`sh_flags`)
    pub flags: SectionFlags,
    /// The virtual address of the section in memory. (`sh_addr`)
    pub address: u64,
    /// Offset of the section in the file image. (`sh_offset`)
    pub offset: u64,
    /// Size in bytes of the section in the file image. (`sh_size`)
    pub size: u64,
    /// The section index of an associated section. (`sh_link`)
    pub link: u32,
    /// Extra information about the section. (`sh_info`)
    pub info: u32,
    /// The required alignment of the section. Must be a power of two. (`sh_addralign`)
    pub address_align: u64,
    /// The size, in bytes, of each entry, for sections that contain fixed-size entries. (`sh_entsize`)
    pub entry_size: u64,
}

impl Record for SectionHeader64 {
    const SIZE: usize = 64;
    const REGION: &'static str = "section header";
}

/// The type of section. (`sh_type`)
#[bitenum(u32, exhaustive: false)]
#[derive(Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum SectionType {
    /// Section header table entry unused. (`SHT_NULL`)
    Unused = 0x0,
    /// Program data. (`SHT_PROGBITS`)
    ProgramBits = 0x1,
    /// Symbol table. (`SHT_SYMTAB`)
    SymbolTable = 0x2,
    /// String table. (`SHT_STRTAB`)
    StringTable = 0x3,
    /// Relocation entries with addends. (`SHT_RELA`)
    RelocationEntriesWithAddends = 0x4,
    /// Symbol hash table. (`SHT_HASH`)
    SymbolHashTable = 0x5,
    /// Dynamic linking information. (`SHT_DYNAMIC`)
    Dynamic = 0x6,
    /// Notes. (`SHT_NOTE`)
    Notes = 0x7,
    /// Program space with no data (bss) (`SHT_NOBITS`)
    ProgramSpaceNoData = 0x8,
    /// Relocation entries, no addends. (`SHT_REL`)
    RelocationEntries = 0x9,
    /// Reserved. (`SHT_SHLIB`)
    Reserved = 0x0A,
    /// Dynamic linker symbol table. (`SHT_DYNSYM`)
    DynamicLinkerSymbol = 0x0B,
    /// Array of constructors. (`SHT_INIT_ARRAY`)
    ArrayConstructors = 0x0E,
    /// Array of destructors. (`SHT_FINI_ARRAY`)
    ArrayDestructors = 0x0F,
    /// Array of pre-constructors. (`SHT_PREINIT_ARRAY`)
    ArrayPreConstructors = 0x10,
    /// Section group. (`SHT_GROUP`)
    SectionGroup = 0x11,
    /// Extended section indices. (`SHT_SYMTAB_SHNDX`)
    SymbolTableWithExtendedIndices = 0x12,
    /// GNU-style symbol hash table. (`SHT_GNU_HASH`)
    GnuHash = 0x6ffffff6,
    /// Version definitions. (`SHT_GNU_verdef`)
    GnuVersionDefinitions = 0x6ffffffd,
    /// Version requirements. (`SHT_GNU_verneed`)
    GnuVersionRequirements = 0x6ffffffe,
    /// Symbol version table. (`SHT_GNU_versym`)
    GnuVersionSymbols = 0x6fffffff,
}

impl SectionType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unused => "SHT_NULL",
            Self::ProgramBits => "SHT_PROGBITS",
            Self::SymbolTable => "SHT_SYMTAB",
            Self::StringTable => "SHT_STRTAB",
            Self::RelocationEntriesWithAddends => "SHT_RELA",
            Self::SymbolHashTable => "SHT_HASH",
            Self::Dynamic => "SHT_DYNAMIC",
            Self::Notes => "SHT_NOTE",
            Self::ProgramSpaceNoData => "SHT_NOBITS",
            Self::RelocationEntries => "SHT_REL",
            Self::Reserved => "SHT_SHLIB",
            Self::DynamicLinkerSymbol => "SHT_DYNSYM",
            Self::ArrayConstructors => "SHT_INIT_ARRAY",
            Self::ArrayDestructors => "SHT_FINI_ARRAY",
            Self::ArrayPreConstructors => "SHT_PREINIT_ARRAY",
            Self::SectionGroup => "SHT_GROUP",
            Self::SymbolTableWithExtendedIndices => "SHT_SYMTAB_SHNDX",
            Self::GnuHash => "SHT_GNU_HASH",
            Self::GnuVersionDefinitions => "SHT_GNU_verdef",
            Self::GnuVersionRequirements => "SHT_GNU_verneed",
            Self::GnuVersionSymbols => "SHT_GNU_versym",
        }
    }

    pub fn name_of(raw: u32) -> &'static str {
        match Self::new_with_raw_value(raw) {
            Ok(section_type) => section_type.name(),
            Err(0x60000000..=0x6fffffff) => "SHT_LOOS",
            Err(0x70000000..=0x7fffffff) => "SHT_LOPROC",
            Err(0x80000000..=0x8fffffff) => "SHT_LOUSER",
            Err(_) => UNKNOWN,
        }
    }
}

/// The attributes of a section. (`sh_flags`)
#[bitfield(u64)]
#[binrw]
#[br(map = Self::new_with_raw_value)]
pub struct SectionFlags {
    /// Writable during execution. (`SHF_WRITE`)
    #[bit(0, r)]
    write: bool,
    /// Occupies memory during execution. (`SHF_ALLOC`)
    #[bit(1, r)]
    alloc: bool,
    /// Contains executable instructions. (`SHF_EXECINSTR`)
    #[bit(2, r)]
    execute: bool,
    /// Elements may be merged. (`SHF_MERGE`)
    #[bit(4, r)]
    merge: bool,
    /// Contains null-terminated strings. (`SHF_STRINGS`)
    #[bit(5, r)]
    strings: bool,
    /// `sh_info` holds a section index. (`SHF_INFO_LINK`)
    #[bit(6, r)]
    info_link: bool,
    /// Preserve order after combining. (`SHF_LINK_ORDER`)
    #[bit(7, r)]
    link_order: bool,
    /// Member of a section group. (`SHF_GROUP`)
    #[bit(9, r)]
    group: bool,
    /// Holds thread-local data. (`SHF_TLS`)
    #[bit(10, r)]
    thread_local: bool,
    /// Processor-specific. (`SHF_MASKPROC`)
    #[bits(28..=31, r)]
    processor_specific: u4,
}

impl SectionFlags {
    /// Names of the set flags, lowest bit first.
    pub fn names(&self) -> Vec<&'static str> {
        [
            (self.write(), "SHF_WRITE"),
            (self.alloc(), "SHF_ALLOC"),
            (self.execute(), "SHF_EXECINSTR"),
            (self.merge(), "SHF_MERGE"),
            (self.strings(), "SHF_STRINGS"),
            (self.info_link(), "SHF_INFO_LINK"),
            (self.link_order(), "SHF_LINK_ORDER"),
            (self.group(), "SHF_GROUP"),
            (self.thread_local(), "SHF_TLS"),
            (self.processor_specific().value() != 0, "SHF_MASKPROC"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
    }
}

impl fmt::Debug for SectionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
