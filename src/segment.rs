use crate::filename::{derive_segment_key, SegmentKey};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A partition of a storage listing by orbital segment.
///
/// Every listed key lands in exactly one place: either one segment group or
/// the `unassigned` bucket. Both are ordered sets, so the result does not
/// depend on listing order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Grouping {
    pub segments: BTreeMap<SegmentKey, BTreeSet<String>>,
    pub unassigned: BTreeSet<String>,
}

impl Grouping {
    /// Total number of distinct keys across all groups.
    pub fn len(&self) -> usize {
        self.segments.values().map(BTreeSet::len).sum::<usize>() + self.unassigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.unassigned.is_empty()
    }
}

pub fn group<I, S>(raw_keys: I) -> Grouping
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut grouping = Grouping::default();
    for raw_key in raw_keys {
        let raw_key = raw_key.as_ref();
        match derive_segment_key(raw_key) {
            Some(segment) => {
                grouping
                    .segments
                    .entry(segment)
                    .or_default()
                    .insert(raw_key.to_string());
            }
            None => {
                debug!(key = raw_key, "key does not belong to a segment");
                grouping.unassigned.insert(raw_key.to_string());
            }
        }
    }
    grouping
}
