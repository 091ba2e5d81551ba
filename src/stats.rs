//! Run counters and the deduplication summary report.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::{self, Write};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStatistics {
    /// Every non-header line
    pub total_reads: u64,
    pub header_lines: u64,
    pub unique_reads: u64,
    pub duplicate_reads: u64,
    pub unknown_umi_reads: u64,
    pub malformed_reads: u64,
    /// Kept reads per reference name
    pub per_chromosome: HashMap<String, u64>,
}

impl RunStatistics {
    pub fn record_header(&mut self) {
        self.header_lines += 1;
    }

    pub fn record_unique(&mut self, reference: &str) {
        self.total_reads += 1;
        self.unique_reads += 1;
        match self.per_chromosome.get_mut(reference) {
            Some(count) => *count += 1,
            None => {
                self.per_chromosome.insert(reference.to_string(), 1);
            }
        }
    }

    pub fn record_duplicate(&mut self) {
        self.total_reads += 1;
        self.duplicate_reads += 1;
    }

    pub fn record_unknown_umi(&mut self) {
        self.total_reads += 1;
        self.unknown_umi_reads += 1;
    }

    pub fn record_malformed(&mut self) {
        self.total_reads += 1;
        self.malformed_reads += 1;
    }

    /// Every read lands in exactly one outcome bucket.
    pub fn is_conserved(&self) -> bool {
        self.unique_reads + self.duplicate_reads + self.unknown_umi_reads + self.malformed_reads
            == self.total_reads
    }

    pub fn percent_unique(&self) -> f64 {
        if self.total_reads > 0 {
            (self.unique_reads as f64 / self.total_reads as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Per-reference kept counts in report order (see [`natural_cmp`]).
    pub fn sorted_chromosomes(&self) -> Vec<(&str, u64)> {
        let mut rows: Vec<(&str, u64)> = self
            .per_chromosome
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
            .collect();
        rows.sort_by(|a, b| natural_cmp(a.0, b.0));
        rows
    }

    /// Write the human-readable summary report.
    pub fn write_report<W: Write>(&self, mut w: W) -> io::Result<()> {
        writeln!(w, "Deduplication Summary Statistics")?;
        writeln!(w)?;
        writeln!(w, "Total Input Reads: {}", self.total_reads)?;
        writeln!(w, "Header Lines: {}", self.header_lines)?;
        writeln!(w, "Unique Reads: {}", self.unique_reads)?;
        writeln!(w, "Duplicate (Removed) Reads: {}", self.duplicate_reads)?;
        writeln!(w, "Reads with Unknown UMIs: {}", self.unknown_umi_reads)?;
        writeln!(w, "Malformed Reads: {}", self.malformed_reads)?;
        writeln!(w)?;
        writeln!(w, "Unique Reads per Chromosome:")?;
        for (name, count) in self.sorted_chromosomes() {
            writeln!(w, "{}\t{}", name, count)?;
        }
        w.flush()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chunk<'a> {
    Text(&'a str),
    Digits(&'a str),
}

impl Ord for Chunk<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Chunk::Text(a), Chunk::Text(b)) => a.cmp(b),
            (Chunk::Digits(a), Chunk::Digits(b)) => cmp_digit_runs(a, b),
            (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Less,
            (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Chunk<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two ASCII digit runs by numeric value, for any length.
fn cmp_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Split a name into alternating text and digit runs, always starting with a
/// (possibly empty) text run so chunks line up position by position.
fn natural_key(s: &str) -> Vec<Chunk<'_>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut in_digits = false;
    for (i, b) in s.bytes().enumerate() {
        let digit = b.is_ascii_digit();
        if digit != in_digits {
            chunks.push(chunk(&s[start..i], in_digits));
            start = i;
            in_digits = digit;
        }
    }
    chunks.push(chunk(&s[start..], in_digits));
    chunks
}

fn chunk(s: &str, digits: bool) -> Chunk<'_> {
    if digits {
        Chunk::Digits(s)
    } else {
        Chunk::Text(s)
    }
}

/// Order reference names for the report.
///
/// Embedded numbers compare by value, so purely numeric names come first in
/// numeric order, then the rest with `chr2` before `chr10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_key(a)
        .cmp(&natural_key(b))
        .then_with(|| a.cmp(b))
}
