use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, trace, warn};
use rayon::prelude::*;
use std::io::BufRead;
use std::path::Path;

use crate::cigar::five_prime_position;
use crate::dedup::{Decision, DedupKey, DuplicateFilter};
use crate::io::{create_sam_writer, open_sam_reader, RecordSink};
use crate::record::{classify_line, LineKind, RecordError, SamFields, Strand};
use crate::stats::RunStatistics;
use crate::{extract_umi, UmiAllowlist, DEFAULT_UMI_LENGTH};

const BATCH_SIZE: usize = 10_000;

/// Settings for a deduplication run.
#[derive(Debug, Clone)]
pub struct DedupOptions {
    /// Trailing read-identifier characters that hold the UMI
    pub umi_length: usize,
    /// Abort instead of warning when a reference re-appears
    pub strict_sort: bool,
    /// Show a progress spinner on stderr
    pub show_progress: bool,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self {
            umi_length: DEFAULT_UMI_LENGTH,
            strict_sort: false,
            show_progress: false,
        }
    }
}

/// What one input line turned out to be, before the duplicate check.
#[derive(Debug)]
enum LineOutcome<'a> {
    Header,
    UnknownUmi,
    Malformed(RecordError),
    Eligible { reference: &'a str, key: DedupKey },
}

/// Classify a line and derive its dedup key. Pure, so batches can run in
/// parallel.
fn extract_features<'a>(
    line: &'a [u8],
    allowlist: &UmiAllowlist,
    umi_length: usize,
) -> LineOutcome<'a> {
    if classify_line(line) == LineKind::Header {
        return LineOutcome::Header;
    }

    let line = match std::str::from_utf8(line) {
        Ok(line) => line,
        Err(_) => return LineOutcome::Malformed(RecordError::InvalidUtf8),
    };

    let fields = match SamFields::split(line) {
        Ok(fields) => fields,
        Err(e) => return LineOutcome::Malformed(e),
    };

    // The UMI decides eligibility before any numeric column is looked at
    let umi = extract_umi(fields.read_id(), umi_length);
    if !allowlist.contains(umi) {
        return LineOutcome::UnknownUmi;
    }

    let record = match fields.parse() {
        Ok(record) => record,
        Err(e) => return LineOutcome::Malformed(e),
    };

    let strand = Strand::from_flag(record.flag);
    let five_prime = five_prime_position(record.position, &record.cigar, strand);
    LineOutcome::Eligible {
        reference: record.reference_name,
        key: DedupKey::new(umi, strand, five_prime),
    }
}

/// Mutable state carried across batches.
struct Deduplicator<'a> {
    allowlist: &'a UmiAllowlist,
    umi_length: usize,
    filter: DuplicateFilter,
    stats: RunStatistics,
    line_number: usize,
}

impl<'a> Deduplicator<'a> {
    fn new(allowlist: &'a UmiAllowlist, options: &DedupOptions) -> Self {
        Self {
            allowlist,
            umi_length: options.umi_length,
            filter: DuplicateFilter::new(options.strict_sort),
            stats: RunStatistics::default(),
            line_number: 0,
        }
    }

    /// Process a batch of lines: parallel feature extraction then serial
    /// filtering and writes, in input order.
    fn process_batch(
        &mut self,
        batch: &[Vec<u8>],
        kept: &mut RecordSink,
        removed: &mut RecordSink,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        // 1. Parallel compute
        let allowlist = self.allowlist;
        let umi_length = self.umi_length;
        let outcomes: Vec<LineOutcome> = batch
            .par_iter()
            .map(|line| extract_features(line, allowlist, umi_length))
            .collect();

        // 2. Serial filter + write
        for (line, outcome) in batch.iter().zip(outcomes) {
            self.line_number += 1;
            match outcome {
                LineOutcome::Header => {
                    self.stats.record_header();
                    kept.write_line(line)?;
                }
                LineOutcome::UnknownUmi => {
                    self.stats.record_unknown_umi();
                    removed.write_line(line)?;
                }
                LineOutcome::Malformed(e) => {
                    if self.stats.malformed_reads == 0 {
                        warn!("Skipping malformed record at line {}: {}", self.line_number, e);
                    } else {
                        debug!("Skipping malformed record at line {}: {}", self.line_number, e);
                    }
                    self.stats.record_malformed();
                }
                LineOutcome::Eligible { reference, key } => {
                    trace!("Line {}: key {} on '{}'", self.line_number, key, reference);
                    let decision = self
                        .filter
                        .check(reference, key)
                        .with_context(|| format!("Sort check failed at line {}", self.line_number))?;
                    match decision {
                        Decision::Unique => {
                            self.stats.record_unique(reference);
                            kept.write_line(line)?;
                        }
                        Decision::Duplicate => {
                            self.stats.record_duplicate();
                            removed.write_line(line)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn progress_bar(show: bool) -> Result<ProgressBar> {
    if !show {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template(
        "{spinner} [{elapsed_precise}] {human_pos} lines ({per_sec})",
    )?);
    Ok(pb)
}

/// Deduplicate a SAM stream. Headers and first-seen reads go to `kept`;
/// duplicates and reads with unknown UMIs go to `removed`. Malformed lines
/// are counted and dropped. Both sinks are finished before returning.
pub fn dedup_stream<R: BufRead>(
    mut reader: R,
    mut kept: RecordSink,
    mut removed: RecordSink,
    allowlist: &UmiAllowlist,
    options: &DedupOptions,
) -> Result<RunStatistics> {
    let mut dedup = Deduplicator::new(allowlist, options);
    let progress = progress_bar(options.show_progress)?;
    let mut batch: Vec<Vec<u8>> = Vec::with_capacity(BATCH_SIZE);

    // Raw bytes: a line that is not UTF-8 is a bad record, not a read failure
    loop {
        let mut line = Vec::new();
        let n = reader
            .read_until(b'\n', &mut line)
            .context("Failed to read SAM input")?;
        if n == 0 {
            break;
        }
        batch.push(line);

        if batch.len() >= BATCH_SIZE {
            dedup.process_batch(&batch, &mut kept, &mut removed)?;
            progress.inc(batch.len() as u64);
            batch.clear();
        }
    }

    // Final flush
    dedup.process_batch(&batch, &mut kept, &mut removed)?;
    progress.inc(batch.len() as u64);
    progress.finish_and_clear();

    kept.finish()?;
    removed.finish()?;

    debug_assert!(dedup.stats.is_conserved());
    Ok(dedup.stats)
}

/// Deduplicate the SAM file at `input` into `output`, optionally routing
/// dropped reads to `removed`. Returns the run counters.
pub fn process_sam(
    input: &Path,
    output: &Path,
    removed: Option<&Path>,
    allowlist: &UmiAllowlist,
    options: &DedupOptions,
) -> Result<RunStatistics> {
    let reader = open_sam_reader(input)?;
    let kept_w = create_sam_writer(output)?;
    let removed_w = match removed {
        Some(p) => create_sam_writer(p)?,
        None => RecordSink::Sink,
    };

    dedup_stream(reader, kept_w, removed_w, allowlist, options)
        .with_context(|| format!("Failed to deduplicate {}", input.display()))
}
