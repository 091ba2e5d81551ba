use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use umi_dedup::io::load_allowlist;
use umi_dedup::processing::{process_sam, DedupOptions};
use umi_dedup::DEFAULT_UMI_LENGTH;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Remove PCR duplicates from a sorted SAM file using UMIs, strand and 5' start position"
)]
struct Args {
    /// Input SAM file, sorted by reference (may be gzipped)
    #[arg(short, long)]
    input: PathBuf,

    /// Output SAM file for kept reads (gzipped when the name ends in .gz)
    #[arg(short, long)]
    output: PathBuf,

    /// Newline-delimited list of known UMIs
    #[arg(short, long)]
    umis: PathBuf,

    /// Optional summary statistics report
    #[arg(short, long)]
    stats: Option<PathBuf>,

    /// Optional SAM file receiving duplicates and reads with unknown UMIs
    #[arg(short, long)]
    removed: Option<PathBuf>,

    /// UMI length: the number of trailing read-name characters holding the UMI
    #[arg(short = 'l', long, default_value_t = DEFAULT_UMI_LENGTH as u16, value_parser = clap::value_parser!(u16).range(1..))]
    umi_length: u16,

    /// Number of threads for parallel feature extraction
    #[arg(short, long, default_value_t = 4)]
    threads: usize,

    /// Fail when a reference name re-appears after another (unsorted input)
    #[arg(long, default_value_t = false)]
    strict_sort: bool,

    /// Show a progress spinner on stderr
    #[arg(long, default_value_t = false)]
    progress: bool,

    /// Verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// CLI entry point: parse args, configure logging and threading, deduplicate,
/// then print a concise tab-separated summary:
/// input, total, unique, duplicates, unknown_umi, malformed, percent_unique.
fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        })
        .init();

    // Set up thread pool
    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()?;

    let allowlist = load_allowlist(&args.umis)?;
    info!(
        "Loaded {} UMIs from {}",
        allowlist.len(),
        args.umis.display()
    );
    if allowlist.is_empty() {
        warn!(
            "UMI list {} is empty; every read will count as an unknown UMI",
            args.umis.display()
        );
    }

    let options = DedupOptions {
        umi_length: usize::from(args.umi_length),
        strict_sort: args.strict_sort,
        show_progress: args.progress,
    };

    // Start timer
    let start = std::time::Instant::now();

    let stats = process_sam(
        &args.input,
        &args.output,
        args.removed.as_deref(),
        &allowlist,
        &options,
    )?;

    if let Some(ref path) = args.stats {
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        stats
            .write_report(BufWriter::new(file))
            .with_context(|| format!("Failed to write statistics to {}", path.display()))?;
    }

    let fname = args
        .input
        .file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| args.input.to_string_lossy().to_string());

    println!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{:.2}",
        fname,
        stats.total_reads,
        stats.unique_reads,
        stats.duplicate_reads,
        stats.unknown_umi_reads,
        stats.malformed_reads,
        stats.percent_unique()
    );

    info!(
        "Kept {} of {} reads ({} duplicates, {} unknown UMIs, {} malformed) in {:.3}s",
        stats.unique_reads,
        stats.total_reads,
        stats.duplicate_reads,
        stats.unknown_umi_reads,
        stats.malformed_reads,
        start.elapsed().as_secs_f64()
    );

    Ok(())
}
