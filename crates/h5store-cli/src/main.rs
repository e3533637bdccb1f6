//! `h5store-info`: print where the bytes of every dataset in an HDF5 file
//! are stored.

mod report;

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use h5store::{ByteRangeReader, File, FileRangeReader};
use log::info;

#[derive(Parser, Debug)]
#[command(name = "h5store-info", version)]
#[command(about = "List the stored chunks of every dataset in an HDF5 file")]
struct Args {
    /// HDF5 file to inspect
    file: PathBuf,

    /// Print a JSON report instead of one line per byte stream
    #[arg(short = 'j', long = "json")]
    json: bool,

    /// Add a SHA-3-256 checksum of each byte stream
    #[arg(short = 'c', long = "checksum")]
    checksum: bool,

    /// Stop at the first dataset that cannot be indexed
    #[arg(long)]
    fail_fast: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let reader = FileRangeReader::new(&args.file);
    if args.checksum && !reader.seekable() {
        return Err(h5store::Error::NotSeekable)
            .with_context(|| format!("cannot checksum {}", args.file.display()));
    }

    let file = File::open(&args.file)
        .with_context(|| format!("cannot open {}", args.file.display()))?;
    info!("{}: {:?}", args.file.display(), file);

    let report = report::collect(&file, &reader, args.checksum, args.fail_fast)?;

    let mut out = std::io::stdout().lock();
    if args.json {
        let file_name = args
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| args.file.display().to_string());
        let json = report::to_json(&file_name, &report)?;
        serde_json::to_writer(&mut out, &json)?;
        writeln!(out)?;
    } else {
        report::write_text(&mut out, &report)?;
    }
    out.flush()?;

    if !report.failures.is_empty() {
        bail!(
            "{} of {} datasets could not be indexed",
            report.failures.len(),
            report.failures.len() + report.datasets.len()
        );
    }
    Ok(())
}
