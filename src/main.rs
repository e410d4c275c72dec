use clap::{Parser, Subcommand};
use mytar::archive::{ArchiveOptions, Archiver, PathPolicy};
use mytar::copy::DEFAULT_BUFFER_SIZE;
use mytar::header::{HeaderLimits, DEFAULT_MAX_ENTRIES};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "mytar", about = "Pack files into a minimal header-then-data archive")]
struct Cli {
    /// Largest entry count accepted in a header
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_ENTRIES)]
    max_entries: u32,
    /// Copy buffer size in bytes
    #[arg(long, global = true, default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack one or more files into an archive
    Create {
        #[arg(short = 'f', long = "file")]
        archive: PathBuf,
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },
    /// Recreate every file stored in an archive
    Extract {
        #[arg(short = 'f', long = "file")]
        archive: PathBuf,
        #[arg(short = 'C', long)]
        output_dir: Option<PathBuf>,
        /// Refuse absolute entry names and names containing `..`
        #[arg(long)]
        relative_only: bool,
    },
    /// List archive contents
    List {
        #[arg(short = 'f', long = "file")]
        archive: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("mytar: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut opts = ArchiveOptions {
        limits: HeaderLimits { max_entries: cli.max_entries, ..HeaderLimits::default() },
        buffer_size: cli.buffer_size,
        ..ArchiveOptions::default()
    };

    match cli.command {

        // ── Create ───────────────────────────────────────────────────────────
        Commands::Create { archive, files } => {
            let summary = Archiver::new(opts).create(&files, &archive)?;
            println!("Created: {} ({} file(s), {} B header, {} B data)",
                     archive.display(), summary.entries, summary.header_size, summary.data_size);
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { archive, output_dir, relative_only } => {
            if let Some(dir) = output_dir {
                opts.output_dir = dir;
            }
            if relative_only {
                opts.path_policy = PathPolicy::RelativeOnly;
            }
            let summary = Archiver::new(opts).extract(&archive)?;
            println!("Extracted {} file(s), {} B", summary.entries, summary.bytes);
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { archive, json } => {
            let table = Archiver::new(opts).list(&archive)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&table)?);
            } else {
                println!("Archive: {}", archive.display());
                println!("{:<40} {:>12}", "Name", "Size");
                for entry in &table {
                    println!("{:<40} {:>12}", entry.name, entry.size);
                }
            }
        }
    }

    Ok(())
}
