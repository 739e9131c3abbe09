use fairy::{
    anchor::AnchorSet,
    dispatch::{self, Decoder},
    dynamic::DynamicSection,
    relocation::RelocationTable,
    section::Section,
    symbol::SymbolTable,
    Anchor, Elf, UNKNOWN,
};
use std::io::{self, Write};
use thiserror::Error;

/// Printed between report blocks.
pub const DIVIDER: &str = "========================================";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Elf(#[from] fairy::Error),

    #[error("failed to write the report")]
    Io(#[from] io::Error),
}

/// What a completed report covered.
#[derive(Debug)]
pub struct Summary {
    pub sections: usize,
    pub programs: usize,
    /// Recoverable errors, one for every section whose contents could not be decoded.
    pub skipped: Vec<fairy::Error>,
}

/// Parses `bytes` and writes the report to `out`.
///
/// A section whose companion sections are missing is reported without its contents; any
/// other error ends the report.
pub fn report<W: Write>(bytes: &[u8], out: W) -> Result<Summary, ReportError> {
    let elf = Elf::parse(bytes)?;
    let anchors = AnchorSet::resolve(&elf.sections);

    let mut report = Report {
        elf: &elf,
        anchors,
        out,
    };

    report.file_header()?;
    let skipped = report.sections()?;
    report.program_headers()?;
    report.out.flush()?;

    Ok(Summary {
        sections: elf.sections.len(),
        programs: elf.programs.len(),
        skipped,
    })
}

struct Report<'e, 'a, W> {
    elf: &'e Elf<'a>,
    anchors: AnchorSet,
    out: W,
}

impl<'e, 'a, W: Write> Report<'e, 'a, W> {
    fn file_header(&mut self) -> Result<(), ReportError> {
        let header = &self.elf.header;

        writeln!(self.out, "ELF HEADER:")?;
        writeln!(
            self.out,
            "[e_type]{}, [e_class]{}, [e_phnum]{}, [e_shnum]:{}",
            header.object_type_name(),
            header.class_name(),
            header.primary.program_header_entry_count,
            header.primary.section_header_entry_count,
        )?;
        writeln!(
            self.out,
            "[e_machine]{}, [e_entry]{:#x}",
            header.machine_name(),
            header.primary.entry_point,
        )?;
        writeln!(self.out, "{DIVIDER}")?;
        Ok(())
    }

    fn sections(&mut self) -> Result<Vec<fairy::Error>, ReportError> {
        let elf = self.elf;
        let mut skipped = Vec::new();

        for section in elf.sections.iter() {
            writeln!(
                self.out,
                "[idx]{}, [sh_name]{}:{}, [sh_type]{}, [sh_flags]{}",
                section.index,
                section.header.name_offset,
                section.name,
                section.type_name(),
                joined(section.header.flags.names()),
            )?;

            let (index, name) = (section.index, &section.name);
            if let Some(decoder) = dispatch::select(section.header.section_type, name) {
                log::debug!("decoding section {index} `{name}` as {decoder:?}");

                match self.decode(section, decoder) {
                    Ok(()) => {}
                    Err(ReportError::Elf(err)) if err.is_recoverable() => {
                        log::warn!("skipping the contents of section {index}: {err}");
                        writeln!(self.out, "[skipped] {err}")?;
                        skipped.push(err);
                    }
                    Err(err) => return Err(err),
                }
            }

            writeln!(self.out, "{DIVIDER}")?;
        }

        Ok(skipped)
    }

    fn decode(&mut self, section: &Section<'a>, decoder: Decoder) -> Result<(), ReportError> {
        match decoder {
            Decoder::StringTable => self.string_table(section),
            Decoder::SymbolTable => self.symbol_table(section),
            Decoder::Dynamic => self.dynamic(section),
            Decoder::InterpreterPath => {
                writeln!(self.out, "ld path is:{}", section.as_str())?;
                Ok(())
            }
            Decoder::Relocation => self.relocations(section),
            // Recognised, but there is nothing in it to show.
            Decoder::LinkageTablePlaceholder => Ok(()),
        }
    }

    fn string_table(&mut self, section: &Section<'a>) -> Result<(), ReportError> {
        for string in section.strings() {
            writeln!(self.out, "{string}")?;
        }
        Ok(())
    }

    fn symbol_table(&mut self, section: &Section<'a>) -> Result<(), ReportError> {
        // Only `.dynsym` is named through `.dynstr`, every other symbol table through `.strtab`.
        let anchor = if section.name == Anchor::DynamicSymbolTable.section_name() {
            Anchor::DynamicStringTable
        } else {
            Anchor::StringTable
        };
        let strings = self.anchors.require(&self.elf.sections, anchor, section)?;
        let symbols = SymbolTable::new(self.elf.image, section, strings)?;

        for symbol in symbols.iter() {
            let symbol = symbol?;
            log::trace!("{symbol:?}");
            writeln!(
                self.out,
                "{}, [st_name]{}, [st_info]{}, [st_bind]{}",
                symbol.index,
                symbol.name,
                symbol.entry.info.type_name(),
                symbol.entry.info.binding_name(),
            )?;
        }
        Ok(())
    }

    fn dynamic(&mut self, section: &Section<'a>) -> Result<(), ReportError> {
        let strings = self
            .anchors
            .require(&self.elf.sections, Anchor::DynamicStringTable, section)?;
        let dynamic = DynamicSection::new(self.elf.image, section, strings)?;

        for entry in dynamic.iter() {
            let entry = entry?;
            log::trace!("{entry:?}");
            write!(
                self.out,
                "{}, [d_tag]{}:{}",
                entry.index,
                entry.entry.tag,
                entry.entry.tag_name(),
            )?;
            if let Some(library) = &entry.needed {
                write!(self.out, ", {library}")?;
            }
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn relocations(&mut self, section: &Section<'a>) -> Result<(), ReportError> {
        let sections = &self.elf.sections;
        let symbols = self
            .anchors
            .require(sections, Anchor::DynamicSymbolTable, section)?;
        let strings = self
            .anchors
            .require(sections, Anchor::DynamicStringTable, section)?;
        let relocations = RelocationTable::new(self.elf.image, section, symbols, strings)?;

        for relocation in relocations.iter() {
            let relocation = relocation?;
            log::trace!("{relocation:?}");
            writeln!(
                self.out,
                "{}, [r_offset]{:#x}, [r_sym]{}",
                relocation.index,
                relocation.entry.offset,
                relocation.symbol.name,
            )?;
        }
        Ok(())
    }

    fn program_headers(&mut self) -> Result<(), ReportError> {
        for (index, program) in self.elf.programs.iter().enumerate() {
            let program = program?;
            writeln!(
                self.out,
                "[idx]{index}, [p_type]{}: {}, [p_flag]{}",
                program.program_type,
                program.type_name(),
                joined(program.flags.names()),
            )?;
            writeln!(self.out, "{DIVIDER}")?;
        }
        Ok(())
    }
}

/// Flag names separated by `|`, or the unknown sentinel when no flag is set.
fn joined(names: Vec<&'static str>) -> String {
    if names.is_empty() {
        UNKNOWN.into()
    } else {
        names.join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairy::{
        dynamic::DynamicEntry,
        fixture::{self, ElfBuilder},
        program::ProgramType,
        relocation::{RelocationEntry, RelocationInfo},
        section::SectionType,
        Malformed,
    };

    const INTERPRETER: &str = "/lib64/ld-linux-x86-64.so.2";

    fn render(bytes: &[u8]) -> (String, Summary) {
        let mut out = Vec::new();
        let summary = report(bytes, &mut out).unwrap();
        (String::from_utf8(out).unwrap(), summary)
    }

    /// The lines of the block that starts with the summary of section `index`.
    fn section_block(output: &str, index: usize) -> Vec<&str> {
        let prefix = format!("[idx]{index}, [sh_name]");
        output
            .lines()
            .skip_while(|line| !line.starts_with(&prefix))
            .take_while(|line| *line != DIVIDER)
            .collect()
    }

    fn dynamic_symbols() -> Vec<u8> {
        fixture::records(&[
            fixture::symbol(0, 0x00),
            fixture::symbol(1, 0x12),
            fixture::symbol(6, 0x12),
            fixture::symbol(13, 0x12),
            fixture::symbol(18, 0x12),
        ])
    }

    fn dynamic_strings() -> Vec<u8> {
        fixture::strings(&["", "free", "malloc", "puts", "exit"])
    }

    #[test]
    fn end_to_end() {
        let symbols = fixture::records(&[fixture::symbol(1, 0x12)]);
        let bytes = ElfBuilder::new()
            .segment(ProgramType::Loadable, 0b101)
            .name_table()
            .section(".text", SectionType::ProgramBits, vec![0x31, 0xc0, 0xc3])
            .flags(0b110)
            .table(".symtab", SectionType::SymbolTable, 24, symbols)
            .section(".strtab", SectionType::StringTable, b"\0main\0".to_vec())
            .build();

        let (output, summary) = render(&bytes);
        let expected = [
            "ELF HEADER:",
            "[e_type]ET_EXEC, [e_class]ELFCLASS64, [e_phnum]1, [e_shnum]:4",
            "[e_machine]EM_X86_64, [e_entry]0x401000",
            DIVIDER,
            "[idx]0, [sh_name]1:.shstrtab, [sh_type]SHT_STRTAB, [sh_flags]???",
            "",
            ".shstrtab",
            ".text",
            ".symtab",
            ".strtab",
            DIVIDER,
            "[idx]1, [sh_name]11:.text, [sh_type]SHT_PROGBITS, [sh_flags]SHF_ALLOC|SHF_EXECINSTR",
            DIVIDER,
            "[idx]2, [sh_name]17:.symtab, [sh_type]SHT_SYMTAB, [sh_flags]???",
            "0, [st_name]main, [st_info]STT_FUNC, [st_bind]STB_GLOBAL",
            DIVIDER,
            "[idx]3, [sh_name]25:.strtab, [sh_type]SHT_STRTAB, [sh_flags]???",
            "",
            "main",
            DIVIDER,
            "[idx]0, [p_type]1: PT_LOAD, [p_flag]PF_X|PF_R",
            DIVIDER,
        ];
        assert_eq!(output.lines().collect::<Vec<_>>(), expected);

        assert_eq!(summary.sections, 4);
        assert_eq!(summary.programs, 1);
        assert!(summary.skipped.is_empty());
    }

    #[test]
    fn missing_anchor_skips_only_that_section() {
        let (symbols, interpreter) = (dynamic_symbols(), fixture::strings(&[INTERPRETER]));
        let bytes = ElfBuilder::new()
            .segment(ProgramType::Loadable, 0b100)
            .null_section()
            .table(".dynsym", SectionType::DynamicLinkerSymbol, 24, symbols)
            .section(".interp", SectionType::ProgramBits, interpreter)
            .name_table()
            .build();

        let (output, summary) = render(&bytes);
        assert_eq!(
            section_block(&output, 1),
            [
                "[idx]1, [sh_name]1:.dynsym, [sh_type]SHT_DYNSYM, [sh_flags]???",
                "[skipped] section `.dynsym` needs the `.dynstr` section, which was not found",
            ]
        );

        // Everything after the skipped section is still reported.
        let interpreter = format!("ld path is:{INTERPRETER}");
        assert_eq!(section_block(&output, 2)[1], interpreter);
        assert_eq!(section_block(&output, 3).len(), 5);
        let program = "[idx]0, [p_type]1: PT_LOAD, [p_flag]PF_R\n";
        assert!(output.contains(program));

        assert_eq!(summary.skipped.len(), 1);
        assert!(matches!(
            summary.skipped[0],
            fairy::Error::MissingAnchorSection {
                anchor: Anchor::DynamicStringTable,
                ..
            }
        ));
    }

    #[test]
    fn linkage_table_section_prints_only_its_summary() {
        let plt_got = vec![0xff, 0x25, 0, 0, 0, 0];
        let bytes = ElfBuilder::new()
            .name_table()
            .section(".plt.got", SectionType::ProgramBits, plt_got)
            .flags(0b110)
            .section(".text", SectionType::ProgramBits, vec![0xc3])
            .build();

        let (output, _) = render(&bytes);
        let summary = "[idx]1, [sh_name]11:.plt.got, [sh_type]SHT_PROGBITS, \
                       [sh_flags]SHF_ALLOC|SHF_EXECINSTR";
        assert_eq!(section_block(&output, 1), [summary]);
        assert_eq!(section_block(&output, 2).len(), 1);
    }

    #[test]
    fn dynamic_needed_library() {
        let entries = fixture::records(&[
            DynamicEntry { tag: 1, value: 0 },
            DynamicEntry {
                tag: 0x6ffffef5,
                value: 0x3a0,
            },
            DynamicEntry { tag: 0, value: 0 },
        ]);
        let strings = fixture::strings(&["libc.so.6"]);
        let bytes = ElfBuilder::new()
            .name_table()
            .table(".dynamic", SectionType::Dynamic, 16, entries)
            .section(".dynstr", SectionType::StringTable, strings)
            .build();

        let (output, _) = render(&bytes);
        assert_eq!(
            section_block(&output, 1)[1..],
            [
                "0, [d_tag]1:DT_NEEDED, libc.so.6",
                "1, [d_tag]1879047925:DT_GNU_HASH",
                "2, [d_tag]0:DT_NULL",
            ]
        );
    }

    #[test]
    fn relocation_symbols() {
        let rela = |offset: u64, symbol: u64| RelocationEntry {
            offset,
            info: RelocationInfo::new_with_raw_value(symbol << 32 | 7),
            addend: 0,
        };
        let symbols = dynamic_symbols();
        let bytes = ElfBuilder::new()
            .name_table()
            .table(".dynsym", SectionType::DynamicLinkerSymbol, 24, symbols)
            .section(".dynstr", SectionType::StringTable, dynamic_strings())
            .table(
                ".rela.plt",
                SectionType::RelocationEntriesWithAddends,
                24,
                fixture::records(&[rela(0x4018, 3), rela(0x4020, 2)]),
            )
            .build();

        let (output, summary) = render(&bytes);
        assert_eq!(
            section_block(&output, 3)[1..],
            [
                "0, [r_offset]0x4018, [r_sym]puts",
                "1, [r_offset]0x4020, [r_sym]malloc",
            ]
        );
        assert_eq!(
            section_block(&output, 1)[3],
            "2, [st_name]malloc, [st_info]STT_FUNC, [st_bind]STB_GLOBAL"
        );
        assert!(summary.skipped.is_empty());
    }

    #[test]
    fn relocations_need_both_dynamic_tables() {
        let bytes = ElfBuilder::new()
            .name_table()
            .section(".dynstr", SectionType::StringTable, dynamic_strings())
            .table(
                ".rela.dyn",
                SectionType::RelocationEntriesWithAddends,
                24,
                vec![0; 24],
            )
            .build();

        let (output, summary) = render(&bytes);
        assert_eq!(
            section_block(&output, 2)[1],
            "[skipped] section `.rela.dyn` needs the `.dynsym` section, which was not found"
        );
        assert_eq!(summary.skipped.len(), 1);
    }

    #[test]
    fn malformed_files_end_the_report() {
        let bytes = ElfBuilder::new()
            .name_table()
            .table(".symtab", SectionType::SymbolTable, 24, vec![0; 24])
            .section(".strtab", SectionType::StringTable, vec![0])
            .build();

        let mut out = Vec::new();
        let err = report(&bytes[..bytes.len() - 8], &mut out).unwrap_err();
        let ReportError::Elf(err) = err else {
            panic!("expected a parse error");
        };
        assert!(matches!(
            err,
            fairy::Error::MalformedHeader(Malformed::OutOfBounds { .. })
        ));
        // Nothing is printed for a file that cannot be parsed.
        assert!(out.is_empty());

        let mut out = Vec::new();
        assert!(matches!(
            report(b"MZ\x90\0", &mut out),
            Err(ReportError::Elf(fairy::Error::MalformedHeader(_)))
        ));
    }

    /// Rejects every write, like stdout piped into a closed reader.
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn causes(err: ReportError) -> Vec<String> {
        anyhow::Error::from(err)
            .chain()
            .map(|cause| cause.to_string())
            .collect()
    }

    #[test]
    fn each_cause_is_named_once() {
        let err = report(b"MZ\x90\0", Vec::new()).unwrap_err();
        assert_eq!(
            causes(err),
            [
                "malformed header",
                "file header at 0x0 (+0x40 bytes) exceeds the 0x4-byte image",
            ]
        );

        let bytes = ElfBuilder::new().build();
        let err = report(&bytes, ClosedPipe).unwrap_err();
        assert!(matches!(err, ReportError::Io(_)));
        let causes = causes(err);
        assert_eq!(causes.len(), 2);
        assert_eq!(causes[0], "failed to write the report");
        assert!(!causes[0].contains(&causes[1]));
    }
}
