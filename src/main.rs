use acdat::{verify, DatError, DatReader, FileEntry, ReaderOptions, VerifyOptions};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "acdat", about = "Inspect and extract DAT game asset containers")]
struct Cli {
    /// Walk the directory per lookup instead of indexing it at open
    #[arg(long, global = true)]
    no_preload: bool,
    /// Do not keep decoded directory nodes between lookups
    #[arg(long, global = true)]
    no_cache: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the header
    Info {
        input: PathBuf,
    },
    /// List every file entry
    List {
        input: PathBuf,
        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },
    /// Look up one file id (decimal or 0x-prefixed hex)
    Find {
        input: PathBuf,
        #[arg(value_parser = parse_id)]
        id: u32,
    },
    /// Write one file's content to disk
    Extract {
        input: PathBuf,
        #[arg(value_parser = parse_id)]
        id: u32,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Write every file to a directory, named by id
    DumpAll {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Check the directory, every entry's content, and the free list
    Verify {
        input: PathBuf,
        /// Print a BLAKE3 digest per entry
        #[arg(long)]
        digests: bool,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, DatError> {
    let options = ReaderOptions {
        preload_file_entries: !cli.no_preload,
        cache_directories:    !cli.no_cache,
        node_cache_capacity:  None,
    };

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            // Preloading is pointless for a header dump.
            let dat = DatReader::open_mmap(&input, ReaderOptions::default())?;
            println!("{}", dat.header());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let dat = DatReader::open_mmap(&input, options)?;
            if !json {
                println!("{:<10} {:>10} {:>10} {:>8} {:>5}  Modified", "Id", "Start", "Size", "Flags", "Iter");
            }
            for entry in dat.iterate_entries() {
                let entry = entry?;
                if json {
                    println!("{}", serde_json::to_string(&entry)?);
                } else {
                    print_entry(&entry);
                }
            }
        }

        // ── Find ─────────────────────────────────────────────────────────────
        Commands::Find { input, id } => {
            let dat = DatReader::open_mmap(&input, options)?;
            match dat.find(id)? {
                Some(entry) => print_entry(&entry),
                None => {
                    eprintln!("{id:#010x}: not found");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, id, output } => {
            let dat = DatReader::open_mmap(&input, options)?;
            match dat.read_file(id)? {
                Some(bytes) => {
                    std::fs::write(&output, &bytes)?;
                    println!("{id:#010x}: {} bytes -> {}", bytes.len(), output.display());
                }
                None => {
                    eprintln!("{id:#010x}: not found");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }

        // ── DumpAll ──────────────────────────────────────────────────────────
        Commands::DumpAll { input, output_dir } => {
            let dat = DatReader::open_mmap(&input, options)?;
            std::fs::create_dir_all(&output_dir)?;
            let mut written = 0usize;
            let mut failed = 0usize;
            for entry in dat.iterate_entries() {
                let entry = entry?;
                match dat.read_content(&entry) {
                    Ok(bytes) => {
                        std::fs::write(output_path(&output_dir, entry.file_id), &bytes)?;
                        written += 1;
                    }
                    Err(e) => {
                        eprintln!("  skip {:08X}: {e}", entry.file_id);
                        failed += 1;
                    }
                }
            }
            println!("Wrote {written} file(s) to {} ({failed} unreadable)", output_dir.display());
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { input, digests } => {
            // Verification walks the tree itself; skip the open-time walk.
            let dat = DatReader::open_mmap(&input, ReaderOptions { preload_file_entries: false, ..options })?;
            let report = verify(&dat, VerifyOptions { digests });
            for d in &report.digests {
                println!("{:08X} {:>10}  {}", d.file_id, d.size, hex::encode(d.blake3));
            }
            for issue in &report.issues {
                println!("  ! {issue:?}");
            }
            println!("{}", report.summary());
            if !report.is_clean() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn print_entry(e: &FileEntry) {
    let modified = e
        .modified()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".into());
    println!(
        "{:08X}   {:08X} {:>10} {:>8X} {:>5}  {}",
        e.file_id, e.start_block, e.size, e.flags, e.iteration, modified
    );
}

fn output_path(dir: &Path, file_id: u32) -> PathBuf {
    dir.join(format!("{file_id:08X}.bin"))
}

fn parse_id(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid file id '{s}': {e}"))
}
