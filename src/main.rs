// src/main.rs
// Command-line application for EMF Reader

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use emf_reader::{report, DecoderOptions, EmfDecoder, EmfError, EmfFile, SummaryCadence};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Which records carry a summary block
    #[arg(long, value_enum, default_value = "every-base", global = true)]
    cadence: SummaryCadence,

    /// Fail on records whose timestamp goes backwards
    #[arg(long, global = true)]
    check_monotonic: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Display EMF header and record statistics
    Info { file: PathBuf },
    /// Print records, one per line
    Records {
        file: PathBuf,
        /// Stop after this many records
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Convert records to CSV
    Convert { file: PathBuf, output: PathBuf },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let options = DecoderOptions {
        cadence: cli.cadence,
        check_monotonic: cli.check_monotonic,
    };

    match cli.command {
        Command::Info { file } => info(&file, options),
        Command::Records { file, limit } => records(&file, options, limit),
        Command::Convert { file, output } => convert(&file, &output, options),
    }
}

/// Cadence as spelled on the command line.
fn cadence_name(cadence: SummaryCadence) -> String {
    cadence
        .to_possible_value()
        .map(|v| v.get_name().to_string())
        .unwrap_or_else(|| format!("{:?}", cadence))
}

/// Report a corrupt record stream and exit. Records already printed stay valid.
fn stream_failed(decoded: usize, err: &EmfError) -> ! {
    let _ = report::write_failure(&mut io::stderr(), decoded, err);
    process::exit(1);
}

fn load(file: &Path, options: DecoderOptions) -> Result<EmfFile> {
    let mut emf = EmfFile::with_options(options);
    emf.load_file(file)
        .with_context(|| format!("Error loading EMF file '{}'", file.display()))?;
    Ok(emf)
}

fn info(file: &Path, options: DecoderOptions) -> Result<()> {
    let emf = load(file, options)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(out, "EMF File Information")?;
    writeln!(out, "====================")?;
    writeln!(out)?;
    writeln!(out, "File: {}", emf.file_path)?;
    writeln!(out, "Summary cadence: {}", cadence_name(options.cadence))?;
    writeln!(out)?;
    report::write_header_info(&mut out, &emf.file_header)?;
    writeln!(out)?;
    report::write_statistics(&mut out, emf.statistics().as_ref())?;

    if let Some(err) = &emf.stream_error {
        out.flush()?;
        stream_failed(emf.records.len(), err);
    }
    Ok(())
}

fn records(file: &Path, options: DecoderOptions, limit: Option<usize>) -> Result<()> {
    let decoder = EmfDecoder::open(file, options)
        .with_context(|| format!("Error loading EMF file '{}'", file.display()))?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut decoded = 0usize;
    for record in decoder.take(limit.unwrap_or(usize::MAX)) {
        match record {
            Ok(r) => {
                report::write_record_line(&mut out, &r)?;
                decoded += 1;
            }
            Err(e) => {
                out.flush()?;
                stream_failed(decoded, &e);
            }
        }
    }

    out.flush()?;
    Ok(())
}

fn convert(file: &Path, output: &Path, options: DecoderOptions) -> Result<()> {
    let emf = load(file, options)?;
    emf.write_csv(output)
        .with_context(|| format!("Error writing CSV file '{}'", output.display()))?;

    println!("Converted {} to {}", file.display(), output.display());
    println!("Total records written: {}", emf.records.len());

    if let Some(err) = &emf.stream_error {
        stream_failed(emf.records.len(), err);
    }
    Ok(())
}
