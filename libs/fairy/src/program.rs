use crate::{image::Record, UNKNOWN};
use alloc::vec::Vec;
use arbitrary_int::u4;
use binrw::binrw;
use bitbybit::{bitenum, bitfield};
use core::{fmt, ops::RangeInclusive};

#[derive(Debug)]
#[binrw]
pub struct ProgramHeader {
    /// Identifies the type of the segment. (`p_type`)
    pub program_type: u32,
    /// Segment-dependent flags. (`p_flags`)
    pub flags: ProgramFlags,
    /// The file offset of the segment. (`p_offset`)
    pub offset: u64,
    /// The virtual address of the segment in memory. (`p_vaddr`)
    pub virtual_address: u64,
    /// The physical address of the segment in memory. (`p_paddr`)
    pub physical_address: u64,
    /// Size in bytes of the segment in the file image. (`p_filesz`)
    pub file_size: u64,
    /// Size in bytes of the segment in memory. (`p_memsz`)
    pub memory_size: u64,
    /// Alignment of the segment in memory and file. (`p_align`)
    pub alignment: u64,
}

impl Record for ProgramHeader {
    const SIZE: usize = 56;
    const REGION: &'static str = "program header";
}

impl ProgramHeader {
    pub fn type_name(&self) -> &'static str {
        ProgramType::name_of(self.program_type)
    }
}

#[bitenum(u32, exhaustive: false)]
#[derive(Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ProgramType {
    /// Program header table entry unused. (`NULL`)
    Null = 0,
    /// Loadable segment. (`LOAD`)
    Loadable = 1,
    /// Dynamic linking information. (`DYNAMIC`)
    Dynamic = 2,
    /// Interpreter information. (`INTERP`)
    Interpreter = 3,
    /// Auxiliary information. (`NOTE`)
    Note = 4,
    /// Reserved. (`SHLIB`)
    ShLib = 5,
    /// Segment containing program header table itself. (`PHDR`)
    ProgramHeaderTable = 6,
    /// Thread-Local Storage template. (`TLS`)
    ThreadLocalStorage = 7,
    /// Exception handling frame lookup table. (`GNU_EH_FRAME`)
    GnuEhFrame = 0x6474e550,
    /// Stack executability. (`GNU_STACK`)
    GnuStack = 0x6474e551,
    /// Read-only after relocation. (`GNU_RELRO`)
    GnuRelro = 0x6474e552,
    /// `.note.gnu.property` notes. (`GNU_PROPERTY`)
    GnuProperty = 0x6474e553,
}

impl ProgramType {
    const OPERATING_SYSTEM_SPECIFIC: RangeInclusive<u32> = 0x60000000..=0x6FFFFFFF;
    const PROCESSOR_SPECIFIC: RangeInclusive<u32> = 0x70000000..=0x7FFFFFFF;

    pub fn name(&self) -> &'static str {
        match self {
            Self::Null => "PT_NULL",
            Self::Loadable => "PT_LOAD",
            Self::Dynamic => "PT_DYNAMIC",
            Self::Interpreter => "PT_INTERP",
            Self::Note => "PT_NOTE",
            Self::ShLib => "PT_SHLIB",
            Self::ProgramHeaderTable => "PT_PHDR",
            Self::ThreadLocalStorage => "PT_TLS",
            Self::GnuEhFrame => "PT_GNU_EH_FRAME",
            Self::GnuStack => "PT_GNU_STACK",
            Self::GnuRelro => "PT_GNU_RELRO",
            Self::GnuProperty => "PT_GNU_PROPERTY",
        }
    }

    pub fn name_of(raw: u32) -> &'static str {
        match Self::new_with_raw_value(raw) {
            Ok(program_type) => program_type.name(),
            Err(raw) if Self::OPERATING_SYSTEM_SPECIFIC.contains(&raw) => "PT_LOOS",
            Err(raw) if Self::PROCESSOR_SPECIFIC.contains(&raw) => "PT_LOPROC",
            Err(_) => UNKNOWN,
        }
    }
}

#[bitfield(u32)]
#[binrw]
#[br(map = Self::new_with_raw_value)]
pub struct ProgramFlags {
    /// Execute permission. (`PF_X`)
    #[bit(0, r)]
    execute: bool,
    /// Write permission. (`PF_W`)
    #[bit(1, r)]
    write: bool,
    /// Read permission. (`PF_R`)
    #[bit(2, r)]
    read: bool,
    /// Reserved for processor-specific semantics. (`PF_MASKPROC`)
    #[bits(28..=31, r)]
    processor_specific: u4,
}

impl ProgramFlags {
    /// Names of the set flags, lowest bit first.
    pub fn names(&self) -> Vec<&'static str> {
        [
            (self.execute(), "PF_X"),
            (self.write(), "PF_W"),
            (self.read(), "PF_R"),
            (self.processor_specific().value() != 0, "PF_MASKPROC"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
    }
}

impl fmt::Debug for ProgramFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramFlags")
            .field("execute", &self.execute())
            .field("write", &self.write())
            .field("read", &self.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Record;

    #[test]
    fn flag_names_in_bit_order() {
        let flags = ProgramFlags::new_with_raw_value(0b101);
        assert_eq!(flags.names(), ["PF_X", "PF_R"]);
        assert_eq!(flags.names().join("|"), "PF_X|PF_R");

        let flags = ProgramFlags::new_with_raw_value(0b110);
        assert_eq!(flags.names(), ["PF_W", "PF_R"]);
        assert_eq!(
            ProgramFlags::new_with_raw_value(0x8000_0001).names(),
            ["PF_X", "PF_MASKPROC"]
        );
        assert!(ProgramFlags::new_with_raw_value(0).names().is_empty());
    }

    #[test]
    fn type_names() {
        assert_eq!(ProgramType::name_of(1), "PT_LOAD");
        assert_eq!(ProgramType::name_of(0x6474e551), "PT_GNU_STACK");
        assert_eq!(ProgramType::name_of(0x60000001), "PT_LOOS");
        assert_eq!(ProgramType::name_of(0x70000003), "PT_LOPROC");
        assert_eq!(ProgramType::name_of(8), UNKNOWN);
    }

    #[test]
    fn decode() {
        let mut bytes = [0u8; 56];
        bytes[0..4].copy_from_slice(&1u32.to_le_bytes());
        bytes[4..8].copy_from_slice(&5u32.to_le_bytes());
        bytes[8..16].copy_from_slice(&0x1000u64.to_le_bytes());
        bytes[48..56].copy_from_slice(&0x1000u64.to_le_bytes());

        let header = ProgramHeader::decode(&bytes).unwrap();
        assert_eq!(header.type_name(), "PT_LOAD");
        assert_eq!(header.flags.names(), ["PF_X", "PF_R"]);
        assert_eq!(header.offset, 0x1000);
        assert_eq!(header.alignment, 0x1000);
    }
}
