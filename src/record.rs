//! Line classification and typed access to SAM alignment lines.

use std::fmt;

use thiserror::Error;

use crate::cigar::{parse_cigar, CigarError, CigarOp};

/// SAM flag bit marking a read as reverse complemented.
pub const FLAG_REVERSE: i64 = 0x10;

/// Index of the CIGAR column; a data line needs at least this many + 1 fields.
const CIGAR_FIELD: usize = 5;

/// Per-record parse failures. These never abort a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("expected at least {min} tab-separated fields, found {0}", min = CIGAR_FIELD + 1)]
    MissingFields(usize),

    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid flag '{0}'")]
    InvalidFlag(String),

    #[error("invalid position '{0}'")]
    InvalidPosition(String),

    #[error("invalid CIGAR '{cigar}': {source}")]
    InvalidCigar {
        cigar: String,
        #[source]
        source: CigarError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Header,
    Alignment,
}

/// Header lines start with `@`; everything else is treated as an alignment.
pub fn classify_line(line: impl AsRef<[u8]>) -> LineKind {
    if line.as_ref().starts_with(b"@") {
        LineKind::Header
    } else {
        LineKind::Alignment
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    /// Only bit 16 is consulted, so any integer flag has a strand.
    pub fn from_flag(flag: i64) -> Self {
        if flag & FLAG_REVERSE != 0 {
            Strand::Reverse
        } else {
            Strand::Forward
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strand::Forward => f.write_str("+"),
            Strand::Reverse => f.write_str("-"),
        }
    }
}

/// The tab-separated columns of an alignment line, not yet interpreted.
///
/// Splitting is separated from parsing so the read identifier (and so the
/// UMI) can be inspected before the numeric columns are validated.
#[derive(Debug, Clone, Copy)]
pub struct SamFields<'a> {
    raw_line: &'a str,
    read_id: &'a str,
    flag: &'a str,
    reference_name: &'a str,
    position: &'a str,
    cigar: &'a str,
}

impl<'a> SamFields<'a> {
    /// Split a raw line (with or without its line terminator).
    pub fn split(raw_line: &'a str) -> Result<Self, RecordError> {
        let line = raw_line.trim_end_matches(['\n', '\r']);
        let fields: Vec<&str> = line.splitn(CIGAR_FIELD + 2, '\t').collect();
        if fields.len() <= CIGAR_FIELD {
            return Err(RecordError::MissingFields(fields.len()));
        }
        Ok(Self {
            raw_line,
            read_id: fields[0],
            flag: fields[1],
            reference_name: fields[2],
            position: fields[3],
            cigar: fields[CIGAR_FIELD],
        })
    }

    pub fn read_id(&self) -> &'a str {
        self.read_id
    }

    /// Interpret the flag, position and CIGAR columns.
    pub fn parse(self) -> Result<AlignmentRecord<'a>, RecordError> {
        let flag = self
            .flag
            .parse::<i64>()
            .map_err(|_| RecordError::InvalidFlag(self.flag.to_string()))?;
        let position = self
            .position
            .parse::<i64>()
            .ok()
            .filter(|p| *p >= 0)
            .ok_or_else(|| RecordError::InvalidPosition(self.position.to_string()))?;
        let cigar = parse_cigar(self.cigar).map_err(|source| RecordError::InvalidCigar {
            cigar: self.cigar.to_string(),
            source,
        })?;

        Ok(AlignmentRecord {
            read_id: self.read_id,
            flag,
            reference_name: self.reference_name,
            position,
            cigar,
            raw_line: self.raw_line,
        })
    }
}

/// One alignment line. Borrows from the line it was parsed from and lives for
/// a single pass of the driver loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentRecord<'a> {
    pub read_id: &'a str,
    pub flag: i64,
    pub reference_name: &'a str,
    /// 1-based leftmost mapping position
    pub position: i64,
    pub cigar: Vec<CigarOp>,
    /// The line exactly as read, terminator included
    pub raw_line: &'a str,
}

impl<'a> AlignmentRecord<'a> {
    pub fn parse(raw_line: &'a str) -> Result<Self, RecordError> {
        SamFields::split(raw_line)?.parse()
    }

    pub fn strand(&self) -> Strand {
        Strand::from_flag(self.flag)
    }
}
