use crate::{
    error::Result,
    image::{Image, Record, Table},
    section::Section,
    UNKNOWN,
};
use alloc::borrow::Cow;
use arbitrary_int::u4;
use binrw::binrw;
use bitbybit::{bitenum, bitfield};
use core::fmt;

/// Symbols of a `.symtab` or `.dynsym` section, named through a companion string table.
#[derive(Debug)]
pub struct SymbolTable<'a> {
    image: Image<'a>,
    entries: Table<'a, SymbolEntry>,
    string_table_offset: u64,
}

impl<'a> SymbolTable<'a> {
    pub fn new(image: Image<'a>, symbols: &Section<'a>, strings: &Section<'a>) -> Result<Self> {
        Ok(Self {
            image,
            entries: symbols.entries()?,
            string_table_offset: strings.header.offset,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Symbol<'a>> {
        let entry = self.entries.get(index)?;
        let name = self
            .image
            .string_in(self.string_table_offset, entry.name_offset.into())?;

        Ok(Symbol { index, name, entry })
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Symbol<'a>>> + '_ {
        (0..self.len()).map(move |index| self.get(index))
    }
}

#[derive(Debug)]
pub struct Symbol<'a> {
    pub index: usize,
    /// Empty for symbols without a name (`st_name` of 0).
    pub name: Cow<'a, str>,
    pub entry: SymbolEntry,
}

#[derive(Debug)]
#[binrw]
pub struct SymbolEntry {
    /// An index into the object file's symbol string table, which holds the character representations of the symbol names. (`st_name`)
    pub name_offset: u32,
    /// The symbol's type and binding attributes. (`st_info`)
    pub info: SymbolInfo,
    /// The symbol's visibility. (`st_other`)
    pub other: u8,
    /// The index of the section header table entry associated with this symbol. (`st_shndx`)
    pub section_index: u16,
    /// The value of the symbol. (`st_value`)
    pub value: u64,
    /// The size of the symbol. (`st_size`)
    pub size: u64,
}

impl Record for SymbolEntry {
    const SIZE: usize = 24;
    const REGION: &'static str = "symbol";
}

/// `st_info`, packing the binding into the high nibble and the type into the low one.
#[bitfield(u8)]
#[binrw]
#[br(map = Self::new_with_raw_value)]
pub struct SymbolInfo {
    /// `ELF64_ST_TYPE`
    #[bits(0..=3, r)]
    symbol_type: u4,
    /// `ELF64_ST_BIND`
    #[bits(4..=7, r)]
    binding: u4,
}

impl SymbolInfo {
    pub fn type_name(&self) -> &'static str {
        SymbolType::name_of(self.symbol_type().value())
    }

    pub fn binding_name(&self) -> &'static str {
        Binding::name_of(self.binding().value())
    }
}

impl fmt::Debug for SymbolInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolInfo")
            .field("symbol_type", &self.type_name())
            .field("binding", &self.binding_name())
            .finish()
    }
}

#[bitenum(u8, exhaustive: false)]
#[derive(Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Binding {
    Local = 0,
    Global = 1,
    Weak = 2,
    GnuUnique = 10,
}

impl Binding {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Local => "STB_LOCAL",
            Self::Global => "STB_GLOBAL",
            Self::Weak => "STB_WEAK",
            Self::GnuUnique => "STB_GNU_UNIQUE",
        }
    }

    pub fn name_of(raw: u8) -> &'static str {
        match Self::new_with_raw_value(raw) {
            Ok(binding) => binding.name(),
            Err(_) => UNKNOWN,
        }
    }
}

#[bitenum(u8, exhaustive: false)]
#[derive(Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SymbolType {
    NoType = 0,
    Object = 1,
    Function = 2,
    Section = 3,
    File = 4,
    Common = 5,
    ThreadLocalStorage = 6,
    GnuIndirectFunction = 10,
}

impl SymbolType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoType => "STT_NOTYPE",
            Self::Object => "STT_OBJECT",
            Self::Function => "STT_FUNC",
            Self::Section => "STT_SECTION",
            Self::File => "STT_FILE",
            Self::Common => "STT_COMMON",
            Self::ThreadLocalStorage => "STT_TLS",
            Self::GnuIndirectFunction => "STT_GNU_IFUNC",
        }
    }

    pub fn name_of(raw: u8) -> &'static str {
        match Self::new_with_raw_value(raw) {
            Ok(symbol_type) => symbol_type.name(),
            Err(_) => UNKNOWN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fixture::{self, ElfBuilder},
        section::SectionType,
        Elf,
    };

    #[test]
    fn info_nibbles() {
        // binding = 1 (global), type = 2 (function)
        let info = SymbolInfo::new_with_raw_value(0x12);
        assert_eq!(info.symbol_type().value(), 2);
        assert_eq!(info.binding().value(), 1);
        assert_eq!(info.type_name(), "STT_FUNC");
        assert_eq!(info.binding_name(), "STB_GLOBAL");

        let info = SymbolInfo::new_with_raw_value(0x2a);
        assert_eq!(info.type_name(), "STT_GNU_IFUNC");
        assert_eq!(info.binding_name(), "STB_WEAK");

        let info = SymbolInfo::new_with_raw_value(0xf7);
        assert_eq!(info.type_name(), UNKNOWN);
        assert_eq!(info.binding_name(), UNKNOWN);
    }

    fn symbol_table<'a>(elf: &Elf<'a>, symbols: &str, strings: &str) -> Result<SymbolTable<'a>> {
        let section = |name: &str| elf.sections.get(name).unwrap();
        SymbolTable::new(elf.image, section(symbols), section(strings))
    }

    #[test]
    fn names_from_either_string_table() {
        let symbols = [fixture::symbol(0, 0x00), fixture::symbol(1, 0x12)];
        let symbols = fixture::records(&symbols);
        let strtab = fixture::strings(&["", "main"]);
        let dynstr = fixture::strings(&["", "puts"]);
        let bytes = ElfBuilder::new()
            .name_table()
            .table(".symtab", SectionType::SymbolTable, 24, symbols.clone())
            .section(".strtab", SectionType::StringTable, strtab)
            .table(".dynsym", SectionType::DynamicLinkerSymbol, 24, symbols)
            .section(".dynstr", SectionType::StringTable, dynstr)
            .build();
        let elf = Elf::parse(&bytes).unwrap();

        let symtab = symbol_table(&elf, ".symtab", ".strtab").unwrap();
        let dynsym = symbol_table(&elf, ".dynsym", ".dynstr").unwrap();
        assert_eq!(symtab.len(), 2);

        let (main, puts) = (symtab.get(1).unwrap(), dynsym.get(1).unwrap());
        assert_eq!(main.name, "main");
        assert_eq!(puts.name, "puts");
        for symbol in [&main, &puts] {
            assert_eq!(symbol.entry.info.type_name(), "STT_FUNC");
            assert_eq!(symbol.entry.info.binding_name(), "STB_GLOBAL");
        }

        assert_eq!(symtab.get(0).unwrap().name, "");
        assert!(symtab.get(2).is_err());
    }

    #[test]
    fn zero_entry_size() {
        let bytes = ElfBuilder::new()
            .name_table()
            .table(".symtab", SectionType::SymbolTable, 0, vec![0; 24])
            .section(".strtab", SectionType::StringTable, vec![0])
            .build();
        let elf = Elf::parse(&bytes).unwrap();

        assert!(symbol_table(&elf, ".symtab", ".strtab").is_err());
    }
}
