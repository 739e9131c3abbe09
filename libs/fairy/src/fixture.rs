//! Synthetic ELF images for tests.
//!
//! The layout is fixed: file header, program headers, section contents in the order they were
//! added, then the section header array aligned to 8 bytes.

use crate::{
    header::{Class, Data, Header, Identifier, Machine, ObjectType, PrimaryHeader},
    image::Record,
    program::{ProgramFlags, ProgramHeader, ProgramType},
    section::{SectionFlags, SectionHeader64, SectionType},
    symbol::{SymbolEntry, SymbolInfo},
};
use alloc::{string::String, vec::Vec};
use binrw::{io::Cursor, BinWrite, Endian};

const NAME_TABLE: &str = ".shstrtab";

struct PendingSection {
    name: String,
    section_type: u32,
    flags: u64,
    entry_size: u64,
    data: Vec<u8>,
    size: Option<u64>,
    name_offset: Option<u32>,
}

#[derive(Default)]
pub struct ElfBuilder {
    segments: Vec<ProgramHeader>,
    sections: Vec<PendingSection>,
    name_table: Option<usize>,
    name_table_index: Option<u16>,
}

impl ElfBuilder {
    /// An `x86_64` executable without segments or sections.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segment(mut self, program_type: ProgramType, flags: u32) -> Self {
        self.segments.push(ProgramHeader {
            program_type: program_type as u32,
            flags: ProgramFlags::new_with_raw_value(flags),
            offset: 0,
            virtual_address: 0x40_0000,
            physical_address: 0x40_0000,
            file_size: 0,
            memory_size: 0,
            alignment: 0x1000,
        });
        self
    }

    /// The reserved first entry, with type `SHT_NULL` and an empty name.
    pub fn null_section(mut self) -> Self {
        self.push("", SectionType::Unused, 0, Vec::new());
        self
    }

    /// `.shstrtab`, its contents generated from every section name once the image is built.
    pub fn name_table(mut self) -> Self {
        self.name_table = Some(self.sections.len());
        self.push(NAME_TABLE, SectionType::StringTable, 0, Vec::new());
        self
    }

    pub fn section(mut self, name: &str, section_type: SectionType, data: Vec<u8>) -> Self {
        self.push(name, section_type, 0, data);
        self
    }

    /// A section of fixed-size records.
    pub fn table(
        mut self,
        name: &str,
        section_type: SectionType,
        entry_size: u64,
        data: Vec<u8>,
    ) -> Self {
        self.push(name, section_type, entry_size, data);
        self
    }

    /// Overrides `sh_size` of the last section.
    pub fn size(mut self, size: u64) -> Self {
        self.last().size = Some(size);
        self
    }

    /// Overrides `sh_flags` of the last section.
    pub fn flags(mut self, flags: u64) -> Self {
        self.last().flags = flags;
        self
    }

    /// Overrides `sh_name` of the last section.
    pub fn name_offset(mut self, name_offset: u32) -> Self {
        self.last().name_offset = Some(name_offset);
        self
    }

    /// Overrides `e_shstrndx`.
    pub fn name_table_index(mut self, index: u16) -> Self {
        self.name_table_index = Some(index);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let (names, name_offsets) = self.names();

        let program_header_start = Header::SIZE as u64;
        let mut offset = program_header_start + (self.segments.len() * ProgramHeader::SIZE) as u64;

        let mut contents = Vec::new();
        let mut section_headers = Vec::with_capacity(self.sections.len());
        for (index, (section, name_offset)) in self.sections.iter().zip(name_offsets).enumerate() {
            let data = if self.name_table == Some(index) {
                &names
            } else {
                &section.data
            };

            let unused = section.section_type == SectionType::Unused as u32;
            section_headers.push(SectionHeader64 {
                name_offset: section.name_offset.unwrap_or(name_offset),
                section_type: section.section_type,
                flags: SectionFlags::new_with_raw_value(section.flags),
                address: 0,
                offset: if unused { 0 } else { offset },
                size: section.size.unwrap_or(data.len() as u64),
                link: 0,
                info: 0,
                address_align: 1,
                entry_size: section.entry_size,
            });

            contents.extend_from_slice(data);
            offset += data.len() as u64;
        }

        let padding = offset.next_multiple_of(8) - offset;
        contents.resize(contents.len() + padding as usize, 0);
        let section_header_start = offset + padding;

        let identifier = Identifier {
            class: Class::Bits64 as u8,
            data: Data::LittleEndian as u8,
            version: 1,
            os_abi: 0,
            abi_version: 0,
        };
        let primary = PrimaryHeader {
            object_type: ObjectType::Executable as u16,
            machine: Machine::X86_64 as u16,
            version: 1,
            entry_point: 0x40_1000,
            program_header_start,
            section_header_start,
            flags: 0,
            header_size: Header::SIZE as u16,
            program_header_entry_size: ProgramHeader::SIZE as u16,
            program_header_entry_count: self.segments.len() as u16,
            section_header_entry_size: SectionHeader64::SIZE as u16,
            section_header_entry_count: self.sections.len() as u16,
            section_header_string_table_index: self
                .name_table_index
                .or(self.name_table.map(|index| index as u16))
                .unwrap_or(0),
        };

        let mut cursor = Cursor::new(Vec::new());
        write(&mut cursor, &identifier);
        write(&mut cursor, &primary);
        for segment in &self.segments {
            write(&mut cursor, segment);
        }
        let mut bytes = cursor.into_inner();
        bytes.extend_from_slice(&contents);

        let mut cursor = Cursor::new(bytes);
        cursor.set_position(section_header_start);
        for section_header in &section_headers {
            write(&mut cursor, section_header);
        }
        cursor.into_inner()
    }

    fn push(&mut self, name: &str, section_type: SectionType, entry_size: u64, data: Vec<u8>) {
        self.sections.push(PendingSection {
            name: name.into(),
            section_type: section_type as u32,
            flags: 0,
            entry_size,
            data,
            size: None,
            name_offset: None,
        });
    }

    fn last(&mut self) -> &mut PendingSection {
        self.sections
            .last_mut()
            .expect("a section to be added before it is modified")
    }

    /// The name table contents and the offset of each section's name in it.
    fn names(&self) -> (Vec<u8>, Vec<u32>) {
        let mut names = vec![0];
        let offsets = self
            .sections
            .iter()
            .map(|section| {
                if section.name.is_empty() {
                    return 0;
                }
                let offset = names.len() as u32;
                names.extend_from_slice(section.name.as_bytes());
                names.push(0);
                offset
            })
            .collect();

        (names, offsets)
    }
}

fn write<T: for<'a> BinWrite<Args<'a> = ()>>(cursor: &mut Cursor<Vec<u8>>, value: &T) {
    value
        .write_options(cursor, Endian::Little, ())
        .expect("writing to a Vec does not fail");
}

/// A string table holding each of `strings` followed by a null byte.
pub fn strings(strings: &[&str]) -> Vec<u8> {
    strings.iter().flat_map(|s| s.bytes().chain([0])).collect()
}

/// Records laid out back to back, as in a section with `sh_entsize` equal to the record size.
pub fn records<T: for<'a> BinWrite<Args<'a> = ()>>(records: &[T]) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    for record in records {
        write(&mut cursor, record);
    }
    cursor.into_inner()
}

/// A defined symbol in section 1, with its `st_info` given raw.
pub fn symbol(name_offset: u32, info: u8) -> SymbolEntry {
    SymbolEntry {
        name_offset,
        info: SymbolInfo::new_with_raw_value(info),
        other: 0,
        section_index: if name_offset == 0 { 0 } else { 1 },
        value: if name_offset == 0 { 0 } else { 0x40_1000 },
        size: 0,
    }
}
