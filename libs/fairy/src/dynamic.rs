use crate::{
    error::Result,
    image::{Image, Record, Table},
    section::Section,
    UNKNOWN,
};
use alloc::borrow::Cow;
use binrw::binrw;
use bitbybit::bitenum;

/// Entries of the `.dynamic` section. String-valued entries resolve through `.dynstr`.
#[derive(Debug)]
pub struct DynamicSection<'a> {
    image: Image<'a>,
    entries: Table<'a, DynamicEntry>,
    string_table_offset: u64,
}

impl<'a> DynamicSection<'a> {
    pub fn new(image: Image<'a>, dynamic: &Section<'a>, strings: &Section<'a>) -> Result<Self> {
        Ok(Self {
            image,
            entries: dynamic.entries()?,
            string_table_offset: strings.header.offset,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Dynamic<'a>> {
        let entry = self.entries.get(index)?;

        // Only the library name of `DT_NEEDED` is resolved, other values are left as-is.
        let needed = match DynamicTag::new_with_raw_value(entry.tag) {
            Ok(DynamicTag::Needed) => {
                let offset = entry.value;
                Some(self.image.string_in(self.string_table_offset, offset)?)
            }
            _ => None,
        };

        Ok(Dynamic {
            index,
            entry,
            needed,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Dynamic<'a>>> + '_ {
        (0..self.len()).map(move |index| self.get(index))
    }
}

#[derive(Debug)]
pub struct Dynamic<'a> {
    pub index: usize,
    pub entry: DynamicEntry,
    /// The library name, for `DT_NEEDED` entries.
    pub needed: Option<Cow<'a, str>>,
}

#[derive(Debug)]
#[binrw]
pub struct DynamicEntry {
    /// What kind of directive this is. (`d_tag`)
    pub tag: u64,
    /// Either an integer or an address, depending on the tag. (`d_un`)
    pub value: u64,
}

impl Record for DynamicEntry {
    const SIZE: usize = 16;
    const REGION: &'static str = "dynamic entry";
}

impl DynamicEntry {
    pub fn tag_name(&self) -> &'static str {
        DynamicTag::name_of(self.tag)
    }
}

/// The tag of a dynamic entry. (`d_tag`)
#[bitenum(u64, exhaustive: false)]
#[derive(Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum DynamicTag {
    /// Marks the end of the array. (`DT_NULL`)
    Null = 0,
    /// Name of a needed library, as an offset into `.dynstr`. (`DT_NEEDED`)
    Needed = 1,
    PltRelocationSize = 2,
    PltGot = 3,
    Hash = 4,
    StringTable = 5,
    SymbolTable = 6,
    Rela = 7,
    RelaSize = 8,
    RelaEntrySize = 9,
    StringTableSize = 10,
    SymbolEntrySize = 11,
    Init = 12,
    Fini = 13,
    SharedObjectName = 14,
    RunPathLegacy = 15,
    Symbolic = 16,
    Rel = 17,
    RelSize = 18,
    RelEntrySize = 19,
    PltRelocationType = 20,
    DebugHook = 21,
    TextRelocations = 22,
    JumpRelocations = 23,
    BindNow = 24,
    InitArray = 25,
    FiniArray = 26,
    InitArraySize = 27,
    FiniArraySize = 28,
    RunPath = 29,
    Flags = 30,
    GnuHash = 0x6ffffef5,
    VersionSymbols = 0x6ffffff0,
    RelaCount = 0x6ffffff9,
    RelCount = 0x6ffffffa,
    Flags1 = 0x6ffffffb,
    VersionDefinitions = 0x6ffffffc,
    VersionDefinitionCount = 0x6ffffffd,
    VersionRequirements = 0x6ffffffe,
    VersionRequirementCount = 0x6fffffff,
}

impl DynamicTag {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Null => "DT_NULL",
            Self::Needed => "DT_NEEDED",
            Self::PltRelocationSize => "DT_PLTRELSZ",
            Self::PltGot => "DT_PLTGOT",
            Self::Hash => "DT_HASH",
            Self::StringTable => "DT_STRTAB",
            Self::SymbolTable => "DT_SYMTAB",
            Self::Rela => "DT_RELA",
            Self::RelaSize => "DT_RELASZ",
            Self::RelaEntrySize => "DT_RELAENT",
            Self::StringTableSize => "DT_STRSZ",
            Self::SymbolEntrySize => "DT_SYMENT",
            Self::Init => "DT_INIT",
            Self::Fini => "DT_FINI",
            Self::SharedObjectName => "DT_SONAME",
            Self::RunPathLegacy => "DT_RPATH",
            Self::Symbolic => "DT_SYMBOLIC",
            Self::Rel => "DT_REL",
            Self::RelSize => "DT_RELSZ",
            Self::RelEntrySize => "DT_RELENT",
            Self::PltRelocationType => "DT_PLTREL",
            Self::DebugHook => "DT_DEBUG",
            Self::TextRelocations => "DT_TEXTREL",
            Self::JumpRelocations => "DT_JMPREL",
            Self::BindNow => "DT_BIND_NOW",
            Self::InitArray => "DT_INIT_ARRAY",
            Self::FiniArray => "DT_FINI_ARRAY",
            Self::InitArraySize => "DT_INIT_ARRAYSZ",
            Self::FiniArraySize => "DT_FINI_ARRAYSZ",
            Self::RunPath => "DT_RUNPATH",
            Self::Flags => "DT_FLAGS",
            Self::GnuHash => "DT_GNU_HASH",
            Self::VersionSymbols => "DT_VERSYM",
            Self::RelaCount => "DT_RELACOUNT",
            Self::RelCount => "DT_RELCOUNT",
            Self::Flags1 => "DT_FLAGS_1",
            Self::VersionDefinitions => "DT_VERDEF",
            Self::VersionDefinitionCount => "DT_VERDEFNUM",
            Self::VersionRequirements => "DT_VERNEED",
            Self::VersionRequirementCount => "DT_VERNEEDNUM",
        }
    }

    pub fn name_of(raw: u64) -> &'static str {
        match Self::new_with_raw_value(raw) {
            Ok(tag) => tag.name(),
            Err(0x6000000d..=0x6ffff000) => "DT_LOOS",
            Err(0x70000000..=0x7fffffff) => "DT_LOPROC",
            Err(_) => UNKNOWN,
        }
    }
}
