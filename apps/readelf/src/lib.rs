//! Renders a line-oriented report of a 64-bit ELF file: the file header, every section with
//! its decoded contents, then the program headers.

mod report;

pub use report::{report, ReportError, Summary, DIVIDER};
