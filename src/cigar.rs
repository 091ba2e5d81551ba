//! CIGAR tokenizing and 5' start position inference.
//!
//! The mapping position in a SAM record is the leftmost reference base that
//! the alignment covers. That is not where the sequenced fragment starts:
//! soft-clipped bases hang off the alignment, and on the reverse strand the
//! biological start is the rightmost end of the alignment.

use thiserror::Error;

use crate::record::Strand;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CigarError {
    #[error("CIGAR is unavailable ('*')")]
    Unavailable,

    #[error("CIGAR is empty")]
    Empty,

    #[error("operation '{0}' has no length")]
    MissingLength(char),

    #[error("unknown operation '{0}'")]
    UnknownOp(char),

    #[error("trailing length without an operation")]
    DanglingLength,

    #[error("operation length does not fit in 32 bits")]
    LengthOverflow,
}

/// The operation code of a single CIGAR element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarKind {
    /// M
    Match,
    /// I
    Insertion,
    /// D
    Deletion,
    /// N
    RefSkip,
    /// S
    SoftClip,
    /// H
    HardClip,
    /// P
    Padding,
    /// =
    SeqMatch,
    /// X
    SeqMismatch,
}

impl CigarKind {
    fn from_char(c: char) -> Option<Self> {
        let kind = match c {
            'M' => Self::Match,
            'I' => Self::Insertion,
            'D' => Self::Deletion,
            'N' => Self::RefSkip,
            'S' => Self::SoftClip,
            'H' => Self::HardClip,
            'P' => Self::Padding,
            '=' => Self::SeqMatch,
            'X' => Self::SeqMismatch,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether this operation counts toward the reverse-strand span.
    ///
    /// Only `M`, `N`, `D` and `S` are counted. `=` and `X` are not.
    pub fn in_reverse_span(self) -> bool {
        matches!(
            self,
            Self::Match | Self::RefSkip | Self::Deletion | Self::SoftClip
        )
    }
}

/// One `(length, operation)` pair of a CIGAR string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    pub len: u32,
    pub kind: CigarKind,
}

impl CigarOp {
    pub fn new(len: u32, kind: CigarKind) -> Self {
        Self { len, kind }
    }
}

/// Tokenize a SAM CIGAR string into its operations.
///
/// Each operation must be a run of decimal digits followed by one of
/// `MIDNSHP=X`. The SAM placeholder `*` is reported as
/// [`CigarError::Unavailable`].
pub fn parse_cigar(cigar: &str) -> Result<Vec<CigarOp>, CigarError> {
    if cigar == "*" {
        return Err(CigarError::Unavailable);
    }
    if cigar.is_empty() {
        return Err(CigarError::Empty);
    }

    let mut ops = Vec::new();
    let mut pending: Option<u32> = None;

    for c in cigar.chars() {
        if let Some(digit) = c.to_digit(10) {
            let len = pending
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|v| v.checked_add(digit))
                .ok_or(CigarError::LengthOverflow)?;
            pending = Some(len);
            continue;
        }

        let kind = CigarKind::from_char(c).ok_or(CigarError::UnknownOp(c))?;
        let len = pending.take().ok_or(CigarError::MissingLength(c))?;
        ops.push(CigarOp::new(len, kind));
    }

    if pending.is_some() {
        return Err(CigarError::DanglingLength);
    }
    Ok(ops)
}

/// The operations that take part in the reverse-strand 5' computation.
pub fn reverse_span_ops(ops: &[CigarOp]) -> impl Iterator<Item = &CigarOp> + '_ {
    ops.iter().filter(|op| op.kind.in_reverse_span())
}

/// Length of the soft clip that opens the alignment, or 0.
fn leading_soft_clip(ops: &[CigarOp]) -> i64 {
    match ops.first() {
        Some(op) if op.kind == CigarKind::SoftClip => i64::from(op.len),
        _ => 0,
    }
}

/// Compute the 5' start coordinate of a read.
///
/// * Forward strand: the mapping position minus any soft clip that opens the
///   CIGAR. Clips anywhere else are ignored.
/// * Reverse strand: the mapping position plus the summed lengths of the
///   `M`/`N`/`D`/`S` operations, after dropping the first of those if it is a
///   soft clip. Trailing clips are included, so the result is one past the
///   last base the read would occupy.
///
/// A reverse-strand CIGAR with no counted operations (e.g. `8H`, or a lone
/// `5S`) leaves the position unchanged.
pub fn five_prime_position(position: i64, ops: &[CigarOp], strand: Strand) -> i64 {
    match strand {
        Strand::Forward => position - leading_soft_clip(ops),
        Strand::Reverse => {
            let mut span = reverse_span_ops(ops).peekable();
            span.next_if(|op| op.kind == CigarKind::SoftClip);
            position + span.map(|op| i64::from(op.len)).sum::<i64>()
        }
    }
}
