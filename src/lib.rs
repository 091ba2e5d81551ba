pub mod cigar;
pub mod dedup;
pub mod io;
pub mod processing;
pub mod record;
pub mod stats;

use std::collections::HashSet;
use std::io::BufRead;

/// Number of trailing read-identifier characters that hold the UMI.
pub const DEFAULT_UMI_LENGTH: usize = 8;

/// Extract the UMI from a read identifier.
///
/// The UMI is the fixed-width suffix of the identifier: no delimiter is
/// searched for and the characters are passed through untouched, so
/// `NS500451:154:HWKTMBGXX:1:11101:24260:1121:CTGTTCAC` yields `CTGTTCAC`.
/// The width is counted in characters, not bytes. Identifiers shorter than
/// `umi_length` are returned whole.
pub fn extract_umi(read_id: &str, umi_length: usize) -> &str {
    if umi_length == 0 {
        return &read_id[read_id.len()..];
    }
    let start = read_id
        .char_indices()
        .rev()
        .nth(umi_length - 1)
        .map_or(0, |(i, _)| i);
    &read_id[start..]
}

/// The set of known UMIs, loaded once before processing and read-only after.
#[derive(Debug, Default, Clone)]
pub struct UmiAllowlist {
    umis: HashSet<String>,
}

impl UmiAllowlist {
    /// Build an allowlist from a newline-delimited list of UMIs.
    ///
    /// Surrounding whitespace (including a `\r` from CRLF files) is stripped
    /// and blank lines are skipped.
    pub fn from_reader<R: BufRead>(reader: R) -> std::io::Result<Self> {
        let mut umis = HashSet::new();
        for line in reader.lines() {
            let line = line?;
            let umi = line.trim();
            if !umi.is_empty() {
                umis.insert(umi.to_string());
            }
        }
        Ok(Self { umis })
    }

    pub fn contains(&self, umi: &str) -> bool {
        self.umis.contains(umi)
    }

    pub fn len(&self) -> usize {
        self.umis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.umis.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for UmiAllowlist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            umis: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_umi_takes_fixed_width_suffix() {
        let id = "NS500451:154:HWKTMBGXX:1:11101:24260:1121:CTGTTCAC";
        assert_eq!(extract_umi(id, 8), "CTGTTCAC");

        // No delimiter parsing: separators inside the window are kept
        assert_eq!(extract_umi("read_ACGT:TTTT", 8), "CGT:TTTT");
    }

    #[test]
    fn test_extract_umi_counts_characters() {
        assert_eq!(extract_umi("r:\u{c4}ACGCCAT", 8), "\u{c4}ACGCCAT");
        assert_eq!(extract_umi("r:ACGTACG\u{c4}", 8), "ACGTACG\u{c4}");
        assert_eq!(extract_umi("r:ACGTACG\u{c4}", 8).chars().count(), 8);
    }

    #[test]
    fn test_extract_umi_short_identifier() {
        assert_eq!(extract_umi("ACGT", 8), "ACGT");
        assert_eq!(extract_umi("", 8), "");
        assert_eq!(extract_umi("ACGT", 0), "");
    }

    #[test]
    fn test_allowlist_from_reader_skips_blank_lines() {
        let data = "AACGCCAT\r\nAAGGTACG\n\n  \nACACTGTG\n";
        let allowlist = UmiAllowlist::from_reader(data.as_bytes()).unwrap();
        assert_eq!(allowlist.len(), 3);
        assert!(allowlist.contains("AACGCCAT"));
        assert!(allowlist.contains("ACACTGTG"));
        assert!(!allowlist.contains(""));
        assert!(!allowlist.contains("aacgccat"));
    }
}
