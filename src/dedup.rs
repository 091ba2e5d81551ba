//! Per-chromosome duplicate detection.
//!
//! Two reads are duplicates when they share a [`DedupKey`] on the same
//! reference. Keys are only remembered for the reference currently being
//! read, and the key set is dropped as soon as the reference name changes, so
//! memory is bounded by the reads of one chromosome. That is only correct for
//! input sorted by reference; [`DuplicateFilter`] can detect a reference that
//! shows up again after another one and either warn or fail.

use std::collections::HashSet;
use std::fmt;

use log::{debug, warn};
use thiserror::Error;

use crate::record::Strand;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DedupError {
    #[error("input is not sorted: reference '{reference}' appears again after other references")]
    UnsortedInput { reference: String },
}

/// The identity of a read event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub umi: String,
    pub strand: Strand,
    pub five_prime: i64,
}

impl DedupKey {
    pub fn new(umi: impl Into<String>, strand: Strand, five_prime: i64) -> Self {
        Self {
            umi: umi.into(),
            strand,
            five_prime,
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.umi, self.strand, self.five_prime)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// First time this key is seen on the reference; keep the read.
    Unique,
    /// Key already seen on the reference; drop the read.
    Duplicate,
}

/// The keys seen so far on one reference.
#[derive(Debug, Clone, Default)]
pub struct ChromosomeScope {
    name: String,
    keys: HashSet<DedupKey>,
}

impl ChromosomeScope {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            keys: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of distinct keys seen on this reference.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Record `key`, returning whether it had been seen before.
    pub fn decide(&mut self, key: DedupKey) -> Decision {
        if self.keys.insert(key) {
            Decision::Unique
        } else {
            Decision::Duplicate
        }
    }
}

#[derive(Debug, Default)]
pub enum FilterState {
    #[default]
    NoActiveChromosome,
    ActiveChromosome(ChromosomeScope),
}

/// Keep/drop decisions for a stream of eligible reads sorted by reference.
#[derive(Debug, Default)]
pub struct DuplicateFilter {
    state: FilterState,
    strict_sort: bool,
    /// References that have been active and then left
    finished: HashSet<String>,
    /// References already reported as re-appearing
    reported: HashSet<String>,
}

impl DuplicateFilter {
    /// With `strict_sort`, a reference that re-appears is an error instead of
    /// a warning.
    pub fn new(strict_sort: bool) -> Self {
        Self {
            strict_sort,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn active_chromosome(&self) -> Option<&str> {
        match &self.state {
            FilterState::ActiveChromosome(scope) => Some(scope.name()),
            FilterState::NoActiveChromosome => None,
        }
    }

    /// Decide whether a read with `key` on `reference` is a duplicate.
    ///
    /// Switching to a new reference discards the previous key set.
    pub fn check(&mut self, reference: &str, key: DedupKey) -> Result<Decision, DedupError> {
        if self.active_chromosome() != Some(reference) {
            self.guard_sorted(reference)?;
        }

        let mut scope = match std::mem::take(&mut self.state) {
            FilterState::ActiveChromosome(scope) if scope.name == reference => scope,
            previous => {
                self.retire(previous);
                ChromosomeScope::new(reference)
            }
        };
        let decision = scope.decide(key);
        self.state = FilterState::ActiveChromosome(scope);
        Ok(decision)
    }

    fn guard_sorted(&mut self, reference: &str) -> Result<(), DedupError> {
        if !self.finished.contains(reference) {
            return Ok(());
        }
        if self.strict_sort {
            return Err(DedupError::UnsortedInput {
                reference: reference.to_string(),
            });
        }
        if self.reported.insert(reference.to_string()) {
            warn!(
                "Reference '{}' appears again after other references; input is not sorted and duplicates across the two blocks will not be detected",
                reference
            );
        }
        Ok(())
    }

    fn retire(&mut self, previous: FilterState) {
        if let FilterState::ActiveChromosome(scope) = previous {
            debug!(
                "Leaving reference '{}' with {} distinct keys",
                scope.name,
                scope.key_count()
            );
            self.finished.insert(scope.name);
        }
    }
}

/// Deduplicate the eligible reads of a single reference on their own.
///
/// Every reference's result is independent of every other's, so this gives
/// the same decisions as [`DuplicateFilter`] does for that reference's block
/// of a sorted stream.
pub fn dedup_chromosome<I>(reference: &str, keys: I) -> Vec<Decision>
where
    I: IntoIterator<Item = DedupKey>,
{
    let mut scope = ChromosomeScope::new(reference);
    keys.into_iter().map(|key| scope.decide(key)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(umi: &str, strand: Strand, pos: i64) -> DedupKey {
        DedupKey::new(umi, strand, pos)
    }

    #[test]
    fn test_duplicate_within_chromosome() {
        let mut filter = DuplicateFilter::new(false);
        assert!(matches!(filter.state(), FilterState::NoActiveChromosome));

        let k = key("AACGCCAT", Strand::Forward, 95);
        assert_eq!(filter.check("1", k.clone()).unwrap(), Decision::Unique);
        assert_eq!(filter.check("1", k).unwrap(), Decision::Duplicate);
        assert_eq!(filter.active_chromosome(), Some("1"));
    }

    #[test]
    fn test_key_fields_all_matter() {
        let mut filter = DuplicateFilter::new(false);
        let base = key("AACGCCAT", Strand::Forward, 95);
        assert_eq!(filter.check("1", base).unwrap(), Decision::Unique);
        assert_eq!(
            filter.check("1", key("AAGGTACG", Strand::Forward, 95)).unwrap(),
            Decision::Unique
        );
        assert_eq!(
            filter.check("1", key("AACGCCAT", Strand::Reverse, 95)).unwrap(),
            Decision::Unique
        );
        assert_eq!(
            filter.check("1", key("AACGCCAT", Strand::Forward, 96)).unwrap(),
            Decision::Unique
        );
    }

    #[test]
    fn test_key_display() {
        assert_eq!(key("AACGCCAT", Strand::Reverse, 172).to_string(), "AACGCCAT/-/172");
        assert_eq!(key("CTGTTCAC", Strand::Forward, 95).to_string(), "CTGTTCAC/+/95");
    }

    #[test]
    fn test_scope_resets_on_new_chromosome() {
        let mut filter = DuplicateFilter::new(true);
        let k = key("AACGCCAT", Strand::Reverse, 172);
        assert_eq!(filter.check("1", k.clone()).unwrap(), Decision::Unique);
        assert_eq!(filter.check("2", k.clone()).unwrap(), Decision::Unique);
        assert_eq!(filter.check("2", k).unwrap(), Decision::Duplicate);
        match filter.state() {
            FilterState::ActiveChromosome(scope) => {
                assert_eq!(scope.name(), "2");
                assert_eq!(scope.key_count(), 1);
            }
            FilterState::NoActiveChromosome => panic!("expected an active chromosome"),
        }
    }

    #[test]
    fn test_unsorted_input_strict() {
        let mut filter = DuplicateFilter::new(true);
        let k = key("AACGCCAT", Strand::Forward, 10);
        filter.check("1", k.clone()).unwrap();
        filter.check("2", k.clone()).unwrap();
        let err = filter.check("1", k).unwrap_err();
        assert_eq!(
            err,
            DedupError::UnsortedInput {
                reference: "1".to_string()
            }
        );
        // The active scope survives the rejected record
        assert_eq!(filter.active_chromosome(), Some("2"));
    }

    #[test]
    fn test_unsorted_input_lenient_gets_fresh_scope() {
        let mut filter = DuplicateFilter::new(false);
        let k = key("AACGCCAT", Strand::Forward, 10);
        filter.check("1", k.clone()).unwrap();
        filter.check("2", k.clone()).unwrap();
        // Not detected as a duplicate: the first block of "1" is forgotten
        assert_eq!(filter.check("1", k).unwrap(), Decision::Unique);
    }

    #[test]
    fn test_chromosomes_are_independent() {
        let chr1 = vec![
            key("AACGCCAT", Strand::Forward, 95),
            key("AACGCCAT", Strand::Forward, 95),
            key("AAGGTACG", Strand::Reverse, 172),
        ];
        let chr2 = vec![
            key("AACGCCAT", Strand::Forward, 95),
            key("AAGGTACG", Strand::Reverse, 172),
            key("AAGGTACG", Strand::Reverse, 172),
        ];

        let mut filter = DuplicateFilter::new(true);
        let streamed: Vec<Decision> = chr1
            .iter()
            .map(|k| ("1", k))
            .chain(chr2.iter().map(|k| ("2", k)))
            .map(|(r, k)| filter.check(r, k.clone()).unwrap())
            .collect();

        let mut partitioned = dedup_chromosome("1", chr1);
        partitioned.extend(dedup_chromosome("2", chr2));
        assert_eq!(streamed, partitioned);
        assert_eq!(
            partitioned,
            [
                Decision::Unique,
                Decision::Duplicate,
                Decision::Unique,
                Decision::Unique,
                Decision::Unique,
                Decision::Duplicate
            ]
        );
    }
}
