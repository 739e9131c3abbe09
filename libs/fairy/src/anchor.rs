//! Companion sections needed to name symbols, libraries and relocation targets.
//!
//! They are looked up by their conventional names rather than through `sh_link`, so a file
//! with renamed sections resolves nothing here.

use crate::{
    error::{Anchor, Error, Result},
    section::{Section, SectionTable},
};
use alloc::string::ToString;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AnchorSet {
    /// Index of `.strtab`.
    pub string_table: Option<usize>,
    /// Index of `.dynstr`.
    pub dynamic_string_table: Option<usize>,
    /// Index of `.dynsym`.
    pub dynamic_symbol_table: Option<usize>,
}

impl AnchorSet {
    /// Scans every section once. When several sections share an anchor name, the last one wins.
    pub fn resolve(sections: &SectionTable) -> Self {
        let mut anchors = Self::default();

        for section in sections.iter() {
            let Some(anchor) = Anchor::ALL
                .into_iter()
                .find(|anchor| section.name == anchor.section_name())
            else {
                continue;
            };

            if let Some(previous) = anchors.slot(anchor).replace(section.index) {
                log::warn!(
                    "`{anchor}` appears more than once, using section {} over {previous}",
                    section.index
                );
            }
        }

        log::debug!("resolved anchors: {anchors:?}");
        anchors
    }

    pub fn get(&self, anchor: Anchor) -> Option<usize> {
        match anchor {
            Anchor::StringTable => self.string_table,
            Anchor::DynamicStringTable => self.dynamic_string_table,
            Anchor::DynamicSymbolTable => self.dynamic_symbol_table,
        }
    }

    /// The anchor section `requester` cannot be decoded without.
    pub fn require<'s, 'a>(
        &self,
        sections: &'s SectionTable<'a>,
        anchor: Anchor,
        requester: &Section,
    ) -> Result<&'s Section<'a>> {
        self.get(anchor)
            .map(|index| &sections[index])
            .ok_or_else(|| Error::MissingAnchorSection {
                section: requester.name.to_string(),
                anchor,
            })
    }

    fn slot(&mut self, anchor: Anchor) -> &mut Option<usize> {
        match anchor {
            Anchor::StringTable => &mut self.string_table,
            Anchor::DynamicStringTable => &mut self.dynamic_string_table,
            Anchor::DynamicSymbolTable => &mut self.dynamic_symbol_table,
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
    fn finds_all_three() {
        let bytes = ElfBuilder::new()
            .null_section()
            .section(".dynsym", SectionType::DynamicLinkerSymbol, Vec::new())
            .section(".dynstr", SectionType::StringTable, vec![0])
            .section(".symtab", SectionType::SymbolTable, Vec::new())
            .section(".strtab", SectionType::StringTable, vec![0])
            .name_table()
            .build();
        let elf = Elf::parse(&bytes).unwrap();

        let anchors = AnchorSet::resolve(&elf.sections);
        assert_eq!(
            anchors,
            AnchorSet {
                string_table: Some(4),
                dynamic_string_table: Some(2),
                dynamic_symbol_table: Some(1),
            }
        );
    }

    #[test]
    fn last_match_wins() {
        let (first, second) = (fixture::strings(&["first"]), fixture::strings(&["second"]));
        let bytes = ElfBuilder::new()
            .name_table()
            .section(".strtab", SectionType::StringTable, first)
            .section(".strtab", SectionType::StringTable, second)
            .build();
        let elf = Elf::parse(&bytes).unwrap();

        let anchors = AnchorSet::resolve(&elf.sections);
        assert_eq!(anchors.string_table, Some(2));
        assert_eq!(anchors.dynamic_string_table, None);
        assert_eq!(anchors.dynamic_symbol_table, None);
    }

    #[test]
    fn missing_anchor() {
        let bytes = ElfBuilder::new()
            .name_table()
            .section(".dynsym", SectionType::DynamicLinkerSymbol, Vec::new())
            .build();
        let elf = Elf::parse(&bytes).unwrap();
        let anchors = AnchorSet::resolve(&elf.sections);

        let sections = &elf.sections;
        let dynsym = &sections[1];
        let found = anchors.require(sections, Anchor::DynamicSymbolTable, dynsym);
        assert_eq!(found.unwrap().index, 1);

        let err = anchors.require(sections, Anchor::DynamicStringTable, dynsym);
        let err = err.unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(
            err,
            Error::MissingAnchorSection {
                anchor: Anchor::DynamicStringTable,
                ref section,
            } if section == ".dynsym"
        ));
    }
}
