//! Incremental index of contractible edge pairs.
//!
//! Every fully labelled edge is filed under both of its orientations in a
//! bucket keyed by `(near label, far label, sign)`. Two entries of the same
//! bucket that belong to distinct, endpoint-disjoint edges form a pair.
//! Only buckets touched since their last inspection are searched again.

use crate::{TaxonId, WeightSign};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct BucketKey {
    pub(crate) near_label: String,
    pub(crate) far_label: String,
    /// `None` when contraction ignores weights.
    pub(crate) sign: Option<WeightSign>,
}

/// One orientation of one edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Entry {
    pub(crate) key: u64,
    pub(crate) near: TaxonId,
    pub(crate) far: TaxonId,
}

impl Entry {
    fn disjoint(&self, other: &Entry) -> bool {
        self.key != other.key
            && self.near != other.near
            && self.near != other.far
            && self.far != other.near
            && self.far != other.far
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pair {
    pub(crate) bucket: BucketKey,
    pub(crate) first: Entry,
    pub(crate) second: Entry,
}

#[derive(Debug, Default)]
pub(crate) struct PairIndex {
    buckets: BTreeMap<BucketKey, BTreeSet<Entry>>,
    by_edge: BTreeMap<u64, Vec<(BucketKey, Entry)>>,
    dirty: BTreeSet<BucketKey>,
}

impl PairIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// File edge `key` between `source` and `target` under both orientations.
    pub(crate) fn insert(
        &mut self,
        key: u64,
        (source, source_label): (&TaxonId, &str),
        (target, target_label): (&TaxonId, &str),
        sign: Option<WeightSign>,
    ) {
        let forward = (
            BucketKey {
                near_label: source_label.to_string(),
                far_label: target_label.to_string(),
                sign,
            },
            Entry {
                key,
                near: source.clone(),
                far: target.clone(),
            },
        );
        let backward = (
            BucketKey {
                near_label: target_label.to_string(),
                far_label: source_label.to_string(),
                sign,
            },
            Entry {
                key,
                near: target.clone(),
                far: source.clone(),
            },
        );
        for (bucket, entry) in [forward, backward] {
            let entries = self.buckets.entry(bucket.clone()).or_default();
            if entries.insert(entry.clone()) {
                if entries.len() >= 2 {
                    self.dirty.insert(bucket.clone());
                }
                self.by_edge.entry(key).or_default().push((bucket, entry));
            }
        }
    }

    /// Drop every entry of edge `key`.
    pub(crate) fn remove_edge(&mut self, key: u64) {
        for (bucket, entry) in self.by_edge.remove(&key).unwrap_or_default() {
            self.drop_entry(&bucket, &entry);
        }
    }

    /// Drop a single entry whose edge no longer matches its claimed orientation.
    pub(crate) fn remove_entry(&mut self, bucket: &BucketKey, entry: &Entry) {
        if let Some(entries) = self.by_edge.get_mut(&entry.key) {
            entries.retain(|(b, e)| !(b == bucket && e == entry));
        }
        self.drop_entry(bucket, entry);
    }

    fn drop_entry(&mut self, bucket: &BucketKey, entry: &Entry) {
        if let Some(entries) = self.buckets.get_mut(bucket) {
            entries.remove(entry);
            if entries.is_empty() {
                self.buckets.remove(bucket);
                self.dirty.remove(bucket);
            }
        }
    }

    /// The next contractible pair, scanning dirty buckets in key order.
    pub(crate) fn next_pair(&mut self) -> Option<Pair> {
        while let Some(bucket) = self.dirty.first().cloned() {
            if let Some(pair) = self.find_in(&bucket) {
                return Some(pair);
            }
            self.dirty.remove(&bucket);
        }
        None
    }

    fn find_in(&self, bucket: &BucketKey) -> Option<Pair> {
        let entries: Vec<&Entry> = self.buckets.get(bucket)?.iter().collect();
        for (i, first) in entries.iter().enumerate() {
            if let Some(second) = entries.iter().skip(i + 1).find(|e| first.disjoint(e)) {
                return Some(Pair {
                    bucket: bucket.clone(),
                    first: (*first).clone(),
                    second: (*second).clone(),
                });
            }
        }
        None
    }
}
