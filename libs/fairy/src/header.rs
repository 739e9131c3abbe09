use crate::{
    error::{Error, Malformed, Result},
    image::{Image, Record, Table},
    program::ProgramHeader,
    section::SectionHeader64,
    UNKNOWN,
};
use binrw::{binrw, io::Cursor, BinRead, Endian};
use bitbybit::bitenum;

/// The initial section of a ELF header. (`e_ident`)
#[derive(Debug, Clone)]
#[binrw]
#[brw(little, magic = b"\x7fELF")]
pub struct Identifier {
    /// `e_ident[EI_CLASS]`
    pub class: u8,
    /// `e_ident[EI_DATA]`
    pub data: u8,
    /// `e_ident[EI_VERSION]`
    pub version: u8,
    /// `e_ident[EI_OSABI]`
    pub os_abi: u8,
    /// `e_ident[EI_ABIVERSION]`
    #[brw(pad_after = 7)]
    pub abi_version: u8,
}

/// The main ELF header of a 64-bit object, following `e_ident`.
#[derive(Debug, Clone)]
#[binrw]
#[brw(little)]
pub struct PrimaryHeader {
    /// `e_type`
    pub object_type: u16,
    /// `e_machine`
    pub machine: u16,
    /// `e_version`
    pub version: u32,
    /// `e_entry`
    pub entry_point: u64,
    /// `e_phoff`
    pub program_header_start: u64,
    /// `e_shoff`
    pub section_header_start: u64,
    /// `e_flags`
    pub flags: u32,
    /// `e_ehsize`
    pub header_size: u16,
    /// `e_phentsize`
    pub program_header_entry_size: u16,
    /// `e_phnum`
    pub program_header_entry_count: u16,
    /// `e_shentsize`
    pub section_header_entry_size: u16,
    /// `e_shnum`
    pub section_header_entry_count: u16,
    /// `e_shstrndx`
    pub section_header_string_table_index: u16,
}

#[derive(Debug, Clone)]
pub struct Header {
    pub identifier: Identifier,
    pub primary: PrimaryHeader,
}

impl Header {
    /// Size of `Elf64_Ehdr`.
    pub const SIZE: usize = 64;

    pub fn parse(image: &Image) -> Result<Self> {
        let bytes = image.region("file header", 0, Self::SIZE as u64)?;
        let mut cursor = Cursor::new(bytes);

        let identifier = Identifier::read_options(&mut cursor, Endian::Little, ())
            .map_err(file_header_error)?;

        match Class::new_with_raw_value(identifier.class) {
            Ok(Class::Bits64) => {}
            Ok(Class::Bits32) => return Err(Error::Unsupported("32-bit objects")),
            _ => return Err(Error::Unsupported("unknown object class")),
        }
        if identifier.data != Data::LittleEndian as u8 {
            return Err(Error::Unsupported("objects that are not little-endian"));
        }

        let primary = PrimaryHeader::read_options(&mut cursor, Endian::Little, ())
            .map_err(file_header_error)?;

        let header = Self {
            identifier,
            primary,
        };

        let count = header.primary.section_header_entry_count;
        let index = header.primary.section_header_string_table_index;
        if count != 0 && index >= count {
            return Err(Malformed::IndexOutOfRange {
                region: "section name table",
                index: index as usize,
                count: count as usize,
            }
            .into());
        }

        Ok(header)
    }

    /// The program header array, checked against the image bounds.
    pub fn program_headers<'a>(&self, image: &Image<'a>) -> Result<Table<'a, ProgramHeader>> {
        header_array(
            image,
            "program headers",
            self.primary.program_header_start,
            self.primary.program_header_entry_size,
            self.primary.program_header_entry_count,
        )
    }

    /// The section header array, checked against the image bounds.
    pub fn section_headers<'a>(&self, image: &Image<'a>) -> Result<Table<'a, SectionHeader64>> {
        header_array(
            image,
            "section headers",
            self.primary.section_header_start,
            self.primary.section_header_entry_size,
            self.primary.section_header_entry_count,
        )
    }

    pub fn object_type_name(&self) -> &'static str {
        ObjectType::name_of(self.primary.object_type)
    }

    pub fn class_name(&self) -> &'static str {
        Class::name_of(self.identifier.class)
    }

    pub fn machine_name(&self) -> &'static str {
        Machine::name_of(self.primary.machine)
    }
}

fn file_header_error(err: binrw::Error) -> Malformed {
    match err {
        binrw::Error::BadMagic { .. } => Malformed::BadMagic,
        err => Malformed::decode("file header", err),
    }
}

fn header_array<'a, T: Record>(
    image: &Image<'a>,
    region: &'static str,
    start: u64,
    entry_size: u16,
    count: u16,
) -> Result<Table<'a, T>> {
    if count == 0 {
        return Ok(Table::empty());
    }

    let length = u64::from(entry_size) * u64::from(count);
    let data = image.region(region, start, length)?;
    Table::new(data, entry_size.into())
}

/// The class of the object file. (`e_ident[EI_CLASS]`)
#[bitenum(u8, exhaustive: false)]
#[derive(Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Class {
    None = 0,
    Bits32 = 1,
    Bits64 = 2,
}

impl Class {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "ELFCLASSNONE",
            Self::Bits32 => "ELFCLASS32",
            Self::Bits64 => "ELFCLASS64",
        }
    }

    pub fn name_of(raw: u8) -> &'static str {
        match Self::new_with_raw_value(raw) {
            Ok(class) => class.name(),
            Err(_) => UNKNOWN,
        }
    }
}

/// The endianness of the object file. (`e_ident[EI_DATA]`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Data {
    LittleEndian = 1,
    BigEndian = 2,
}

/// The type of object. (`e_type`)
#[bitenum(u16, exhaustive: false)]
#[derive(Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum ObjectType {
    /// Unknown. (`ET_NONE`)
    None = 0,
    /// Relocatable file. (`ET_REL`)
    Relocatable = 1,
    /// Executable file. (`ET_EXEC`)
    Executable = 2,
    /// Shared object. (`ET_DYN`)
    SharedObject = 3,
    /// Core file. (`ET_CORE`)
    Core = 4,
}

impl ObjectType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "ET_NONE",
            Self::Relocatable => "ET_REL",
            Self::Executable => "ET_EXEC",
            Self::SharedObject => "ET_DYN",
            Self::Core => "ET_CORE",
        }
    }

    pub fn name_of(raw: u16) -> &'static str {
        match Self::new_with_raw_value(raw) {
            Ok(object_type) => object_type.name(),
            Err(0xfe00..=0xfeff) => "ET_LOOS",
            Err(0xff00..=0xffff) => "ET_LOPROC",
            Err(_) => UNKNOWN,
        }
    }
}

/// The target instruction set architecture. (`e_machine`)
#[bitenum(u16, exhaustive: false)]
#[derive(Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Machine {
    // Ignoring many (mostly ancient) variants
    None = 0x0,
    X86 = 0x3,
    Mips = 0x8,
    PowerPC = 0x14,
    PowerPC64 = 0x15,
    Aarch32 = 0x28,
    X86_64 = 0x3E,
    Aarch64 = 0xB7,
    RiscV = 0xF3,
    LoongArch = 0x102,
}

impl Machine {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "EM_NONE",
            Self::X86 => "EM_386",
            Self::Mips => "EM_MIPS",
            Self::PowerPC => "EM_PPC",
            Self::PowerPC64 => "EM_PPC64",
            Self::Aarch32 => "EM_ARM",
            Self::X86_64 => "EM_X86_64",
            Self::Aarch64 => "EM_AARCH64",
            Self::RiscV => "EM_RISCV",
            Self::LoongArch => "EM_LOONGARCH",
        }
    }

    pub fn name_of(raw: u16) -> &'static str {
        match Self::new_with_raw_value(raw) {
            Ok(machine) => machine.name(),
            Err(_) => UNKNOWN,
        }
    }
}
