use std::collections::{BTreeMap, HashMap};

use crate::flags::FlagForEvaluation;
use crate::segments::Segment;

/// Read access to every flag of one project/environment.
pub trait FlagStore: Sync {
    fn flag(&self, key: &str) -> Option<&FlagForEvaluation>;

    fn all_flags(&self) -> Vec<&FlagForEvaluation>;
}

/// Read access to segments by key.
pub trait SegmentStore: Sync {
    fn segment(&self, key: &str) -> Option<&Segment>;
}

impl FlagStore for HashMap<String, FlagForEvaluation> {
    fn flag(&self, key: &str) -> Option<&FlagForEvaluation> {
        self.get(key)
    }

    fn all_flags(&self) -> Vec<&FlagForEvaluation> {
        self.values().collect()
    }
}

impl FlagStore for BTreeMap<String, FlagForEvaluation> {
    fn flag(&self, key: &str) -> Option<&FlagForEvaluation> {
        self.get(key)
    }

    fn all_flags(&self) -> Vec<&FlagForEvaluation> {
        self.values().collect()
    }
}

impl SegmentStore for HashMap<String, Segment> {
    fn segment(&self, key: &str) -> Option<&Segment> {
        self.get(key)
    }
}

impl SegmentStore for BTreeMap<String, Segment> {
    fn segment(&self, key: &str) -> Option<&Segment> {
        self.get(key)
    }
}

/// The empty segment store.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSegments;

impl SegmentStore for NoSegments {
    fn segment(&self, _key: &str) -> Option<&Segment> {
        None
    }
}

/// An immutable, owned set of flags and segments for one environment.
///
/// Build one per configuration change and share it across evaluations.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    flags: BTreeMap<String, FlagForEvaluation>,
    segments: BTreeMap<String, Segment>,
}

impl Snapshot {
    /// Later entries with the same key replace earlier ones.
    pub fn new(
        flags: impl IntoIterator<Item = FlagForEvaluation>,
        segments: impl IntoIterator<Item = Segment>,
    ) -> Self {
        Self {
            flags: flags.into_iter().map(|f| (f.key.clone(), f)).collect(),
            segments: segments.into_iter().map(|s| (s.key.clone(), s)).collect(),
        }
    }

    pub fn flags(&self) -> &BTreeMap<String, FlagForEvaluation> {
        &self.flags
    }

    pub fn segments(&self) -> &BTreeMap<String, Segment> {
        &self.segments
    }
}

impl FlagStore for Snapshot {
    fn flag(&self, key: &str) -> Option<&FlagForEvaluation> {
        self.flags.get(key)
    }

    fn all_flags(&self) -> Vec<&FlagForEvaluation> {
        self.flags.values().collect()
    }
}

impl SegmentStore for Snapshot {
    fn segment(&self, key: &str) -> Option<&Segment> {
        self.segments.get(key)
    }
}
