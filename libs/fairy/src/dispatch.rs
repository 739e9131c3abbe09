//! Picks the one decoder that interprets a section's contents.

use crate::section::SectionType;

/// How a section's contents are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    /// Null-terminated strings, one after the other.
    StringTable,
    /// `Elf64_Sym` records named through `.strtab` or `.dynstr`.
    SymbolTable,
    /// `Elf64_Dyn` records.
    Dynamic,
    /// The dynamic linker path in `.interp`.
    InterpreterPath,
    /// `Elf64_Rela` records naming symbols from `.dynsym`.
    Relocation,
    /// `.plt.got`, which is recognised but has nothing to decode.
    LinkageTablePlaceholder,
}

#[derive(Debug, Clone, Copy)]
enum Matcher {
    Type(u32),
    Name(&'static str),
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    matcher: Matcher,
    decoder: Decoder,
}

const fn by_type(section_type: SectionType, decoder: Decoder) -> Rule {
    Rule {
        matcher: Matcher::Type(section_type as u32),
        decoder,
    }
}

const fn by_name(name: &'static str, decoder: Decoder) -> Rule {
    Rule {
        matcher: Matcher::Name(name),
        decoder,
    }
}

/// In decreasing precedence, the first match wins.
const RULES: [Rule; 7] = [
    by_type(SectionType::SymbolTable, Decoder::SymbolTable),
    by_type(SectionType::StringTable, Decoder::StringTable),
    by_type(SectionType::DynamicLinkerSymbol, Decoder::SymbolTable),
    by_type(SectionType::Dynamic, Decoder::Dynamic),
    by_name(".interp", Decoder::InterpreterPath),
    by_type(
        SectionType::RelocationEntriesWithAddends,
        Decoder::Relocation,
    ),
    by_name(".plt.got", Decoder::LinkageTablePlaceholder),
];

impl Rule {
    fn matches(&self, section_type: u32, name: &str) -> bool {
        match self.matcher {
            Matcher::Name(expected) => name == expected,
            Matcher::Type(expected) => {
                section_type != SectionType::Unused as u32 && section_type == expected
            }
        }
    }
}

/// Selects the decoder for a section with the given raw `sh_type` and resolved name.
/// Sections without one only get their summary line.
pub fn select(section_type: u32, name: &str) -> Option<Decoder> {
    RULES
        .iter()
        .find(|rule| rule.matches(section_type, name))
        .map(|rule| rule.decoder)
}
