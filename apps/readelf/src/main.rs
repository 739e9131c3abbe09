use anyhow::Context;
use clap::{ArgAction, Parser};
use std::{
    fs,
    io::{self, BufWriter},
    path::PathBuf,
};

/// Print the headers, symbols, dynamic entries and relocations of a 64-bit ELF file
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// The ELF file to inspect
    path: PathBuf,

    /// Log more to stderr, repeat for more detail
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env = env_logger::Env::default().default_filter_or(level);
    env_logger::Builder::from_env(env).init();

    let bytes = fs::read(&args.path)
        .with_context(|| format!("failed to read `{}`", args.path.display()))?;
    log::info!("read {} bytes from {}", bytes.len(), args.path.display());

    let out = BufWriter::new(io::stdout().lock());
    let summary = readelf::report(&bytes, out)
        .with_context(|| format!("failed to inspect `{}`", args.path.display()))?;

    log::info!(
        "reported {} sections and {} program headers",
        summary.sections,
        summary.programs
    );
    if !summary.skipped.is_empty() {
        let skipped = summary.skipped.len();
        log::warn!("{skipped} sections were reported without their contents");
    }

    Ok(())
}
