use crate::{
    error::Result,
    image::{Image, Record, Table},
    section::Section,
    symbol::{Symbol, SymbolTable},
};
use binrw::binrw;
use bitbybit::bitfield;
use core::fmt;

/// A `.rela.*` section, with every entry's symbol looked up in `.dynsym`.
#[derive(Debug)]
pub struct RelocationTable<'a> {
    entries: Table<'a, RelocationEntry>,
    symbols: SymbolTable<'a>,
}

impl<'a> RelocationTable<'a> {
    pub fn new(
        image: Image<'a>,
        relocations: &Section<'a>,
        symbols: &Section<'a>,
        strings: &Section<'a>,
    ) -> Result<Self> {
        Ok(Self {
            entries: relocations.entries()?,
            symbols: SymbolTable::new(image, symbols, strings)?,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Relocation<'a>> {
        let entry = self.entries.get(index)?;
        let symbol = self.symbols.get(entry.info.symbol_index() as usize)?;

        Ok(Relocation {
            index,
            entry,
            symbol,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Relocation<'a>>> + '_ {
        (0..self.len()).map(move |index| self.get(index))
    }
}

#[derive(Debug)]
pub struct Relocation<'a> {
    pub index: usize,
    pub entry: RelocationEntry,
    /// The symbol the relocation refers to, index 0 being the unnamed null symbol.
    pub symbol: Symbol<'a>,
}

/// A relocation entry with an explicit addend. (`Elf64_Rela`)
#[derive(Debug)]
#[binrw]
pub struct RelocationEntry {
    /// Location to apply the relocation to. (`r_offset`)
    pub offset: u64,
    /// Symbol index and relocation type. (`r_info`)
    pub info: RelocationInfo,
    /// Constant addend used to compute the value. (`r_addend`)
    pub addend: i64,
}

impl Record for RelocationEntry {
    const SIZE: usize = 24;
    const REGION: &'static str = "relocation";
}

#[bitfield(u64)]
#[binrw]
#[br(map = Self::new_with_raw_value)]
pub struct RelocationInfo {
    /// Processor-specific relocation type. (`ELF64_R_TYPE`)
    #[bits(0..=31, r)]
    relocation_type: u32,
    /// Index into the associated symbol table. (`ELF64_R_SYM`)
    #[bits(32..=63, r)]
    symbol_index: u32,
}

impl fmt::Debug for RelocationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelocationInfo")
            .field("relocation_type", &self.relocation_type())
            .field("symbol_index", &self.symbol_index())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fixture::{self, ElfBuilder},
        section::SectionType,
        Elf, Error, Malformed,
    };
    use alloc::vec::Vec;

    const R_X86_64_JUMP_SLOT: u64 = 7;

    fn rela(offset: u64, symbol: u64) -> RelocationEntry {
        RelocationEntry {
            offset,
            info: RelocationInfo::new_with_raw_value(symbol << 32 | R_X86_64_JUMP_SLOT),
            addend: 0,
        }
    }

    fn image(relocations: &[RelocationEntry]) -> Vec<u8> {
        let names = ["", "free", "malloc", "puts", "exit"];
        let mut symbols = Vec::new();
        let mut name_offset = 0;
        for name in names {
            symbols.push(fixture::symbol(name_offset, 0x12));
            name_offset += name.len() as u32 + 1;
        }

        let relocations = fixture::records(relocations);
        let symbols = fixture::records(&symbols);
        let strings = fixture::strings(&names);
        ElfBuilder::new()
            .name_table()
            .table(
                ".rela.plt",
                SectionType::RelocationEntriesWithAddends,
                24,
                relocations,
            )
            .table(".dynsym", SectionType::DynamicLinkerSymbol, 24, symbols)
            .section(".dynstr", SectionType::StringTable, strings)
            .build()
    }

    #[test]
    fn info_split() {
        let info = RelocationInfo::new_with_raw_value(3 << 32 | R_X86_64_JUMP_SLOT);
        assert_eq!(info.symbol_index(), 3);
        assert_eq!(info.relocation_type(), 7);
    }

    #[test]
    fn resolves_exact_symbol() {
        let bytes = image(&[rela(0x4018, 3), rela(0x4020, 0)]);
        let elf = Elf::parse(&bytes).unwrap();
        let section = |name: &str| elf.sections.get(name).unwrap();

        let table = RelocationTable::new(
            elf.image,
            section(".rela.plt"),
            section(".dynsym"),
            section(".dynstr"),
        )
        .unwrap();
        assert_eq!(table.len(), 2);

        let relocation = table.get(0).unwrap();
        assert_eq!(relocation.entry.offset, 0x4018);
        assert_eq!(relocation.symbol.index, 3);
        assert_eq!(relocation.symbol.name, "puts");

        assert_eq!(table.get(1).unwrap().symbol.name, "");
    }

    #[test]
    fn symbol_index_out_of_range() {
        let bytes = image(&[rela(0x4018, 5)]);
        let elf = Elf::parse(&bytes).unwrap();
        let section = |name: &str| elf.sections.get(name).unwrap();

        let table = RelocationTable::new(
            elf.image,
            section(".rela.plt"),
            section(".dynsym"),
            section(".dynstr"),
        )
        .unwrap();
        assert!(matches!(
            table.get(0),
            Err(Error::MalformedHeader(Malformed::IndexOutOfRange {
                index: 5,
                count: 5,
                ..
            }))
        ));
    }
}
