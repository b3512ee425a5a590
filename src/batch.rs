use crate::models::{Record, RecordSet};
use std::iter::FusedIterator;
use std::num::NonZeroUsize;
use std::slice::Chunks;

/// A contiguous slice of a record set, never empty and never above capacity.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    /// Zero-based position of this batch within its record set
    pub index: usize,
    pub records: &'a [Record],
}

/// Lazy, order-preserving batch iterator. Cloning restarts from the clone's position.
#[derive(Debug, Clone)]
pub struct Batches<'a> {
    chunks: Chunks<'a, Record>,
    next_index: usize,
}

impl<'a> Iterator for Batches<'a> {
    type Item = Batch<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let records = self.chunks.next()?;
        let index = self.next_index;
        self.next_index += 1;
        Some(Batch { index, records })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for Batches<'_> {}

impl FusedIterator for Batches<'_> {}

pub fn batches(set: &RecordSet, capacity: NonZeroUsize) -> Batches<'_> {
    Batches {
        chunks: set.records.chunks(capacity.get()),
        next_index: 0,
    }
}

pub fn batch_count(len: usize, capacity: NonZeroUsize) -> usize {
    len.div_ceil(capacity.get())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    fn set_of(n: usize) -> RecordSet {
        let records = (0..n)
            .map(|i| Record::new(vec![Value::Int(i as i64)]))
            .collect();
        RecordSet::new(vec!["id".into()], records)
    }

    fn cap(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn sizes_sum_to_record_count() {
        for (n, c) in [(0, 3), (1, 3), (3, 3), (10, 3), (10_001, 5000), (7, 1)] {
            let set = set_of(n);
            let sizes: Vec<usize> = batches(&set, cap(c)).map(|b| b.records.len()).collect();
            assert_eq!(sizes.iter().sum::<usize>(), n);
            assert_eq!(sizes.len(), batch_count(n, cap(c)));
            assert!(sizes.iter().all(|&s| s > 0 && s <= c));
            if let Some((last, full)) = sizes.split_last() {
                assert!(full.iter().all(|&s| s == c));
                assert!(*last <= c);
            }
        }
    }

    #[test]
    fn preserves_order_without_gaps() {
        let set = set_of(8);
        let ids: Vec<Value> = batches(&set, cap(3))
            .flat_map(|b| b.records.iter().map(|r| r.values[0].clone()))
            .collect();
        let expected: Vec<Value> = (0..8).map(Value::Int).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn indices_are_sequential() {
        let set = set_of(11);
        let indices: Vec<usize> = batches(&set, cap(5)).map(|b| b.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn clone_restarts_independently() {
        let set = set_of(6);
        let mut iter = batches(&set, cap(2));
        let snapshot = iter.clone();
        iter.next();
        assert_eq!(iter.len(), 2);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.map(|b| b.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn empty_set_yields_nothing() {
        let set = set_of(0);
        assert_eq!(batches(&set, cap(5000)).count(), 0);
    }
}
