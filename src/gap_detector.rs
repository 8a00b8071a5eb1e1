/// Ordinal sequence checking
///
/// Classifies each incoming ordinal against the last applied one and keeps a history of
/// the gaps seen, as inclusive ranges of missing ordinals.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Exactly `last + 1`: apply it.
    Next,
    /// Older than the last applied ordinal: a leftover from before the snapshot.
    Stale,
    /// Equal to the last applied ordinal. A correct feed never repeats one.
    Duplicate,
    /// Ordinals between `expected` and `actual` never arrived.
    Gap { expected: i64, actual: i64 },
}

#[derive(Debug, Clone)]
pub struct GapDetector {
    gaps: Vec<(i64, i64)>, // Vec of (start, end) ranges
    total_gap_count: u64,
}

impl GapDetector {
    pub fn new() -> Self {
        GapDetector {
            gaps: Vec::new(),
            total_gap_count: 0,
        }
    }

    /// Classify `ordinal` given the last applied one, without recording anything.
    pub fn check(last_applied: i64, ordinal: i64) -> SequenceCheck {
        let expected = last_applied.saturating_add(1);
        if ordinal == expected {
            SequenceCheck::Next
        } else if ordinal == last_applied {
            SequenceCheck::Duplicate
        } else if ordinal < last_applied {
            SequenceCheck::Stale
        } else {
            SequenceCheck::Gap {
                expected,
                actual: ordinal,
            }
        }
    }

    /// Classify `ordinal` and record it if it opens a gap.
    pub fn process(&mut self, last_applied: i64, ordinal: i64) -> SequenceCheck {
        let check = Self::check(last_applied, ordinal);
        if let SequenceCheck::Gap { expected, actual } = check {
            self.gaps.push((expected, actual - 1));
            self.total_gap_count = self
                .total_gap_count
                .saturating_add((actual - expected) as u64);
        }
        check
    }

    /// Get all detected gaps as (start, end) tuples (inclusive)
    pub fn gaps(&self) -> &[(i64, i64)] {
        &self.gaps
    }

    /// Get total number of missing ordinals
    pub fn total_gaps(&self) -> u64 {
        self.total_gap_count
    }

    /// Get count of gap ranges detected
    pub fn gap_count(&self) -> usize {
        self.gaps.len()
    }
}

impl Default for GapDetector {
    fn default() -> Self {
        Self::new()
    }
}
