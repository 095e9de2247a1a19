//! Bounded atime heap
//!
//! Keeps the coldest eviction candidates seen so far, bounded by the
//! byte target: once the retained candidates cover the target, the
//! hottest ones are popped back off. Draining yields coldest-first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::PathBuf;

/// One evictable object, snapshotted at walk time
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Candidate {
    pub atime_ns: i64,
    pub size: u64,
    pub fqn: PathBuf,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // max-heap by atime: the hottest candidate surfaces for eviction
        // from the heap (not from disk) when the byte budget is covered
        self.atime_ns
            .cmp(&other.atime_ns)
            .then_with(|| self.fqn.cmp(&other.fqn))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub(crate) struct CandidateHeap {
    heap: BinaryHeap<Candidate>,
    bytes: u64,
    target: u64,
}

impl CandidateHeap {
    pub(crate) fn new(target: u64) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(64),
            bytes: 0,
            target,
        }
    }

    /// Admit a candidate, shedding the hottest ones the byte target no
    /// longer needs.
    pub(crate) fn push(&mut self, cand: Candidate) {
        self.bytes += cand.size;
        self.heap.push(cand);
        while let Some(hottest) = self.heap.peek() {
            if self.bytes - hottest.size < self.target {
                break;
            }
            let popped = self.heap.pop().expect("peeked");
            self.bytes -= popped.size;
        }
    }

    /// Coldest-first eviction order.
    pub(crate) fn drain_coldest(self) -> Vec<Candidate> {
        self.heap.into_sorted_vec()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(atime_ns: i64, size: u64) -> Candidate {
        Candidate {
            atime_ns,
            size,
            fqn: PathBuf::from(format!("/data/o-{atime_ns}")),
        }
    }

    #[test]
    fn test_drain_is_coldest_first() {
        let mut heap = CandidateHeap::new(u64::MAX);
        for atime in [50, 10, 40, 20, 30] {
            heap.push(cand(atime, 1));
        }
        let order: Vec<i64> = heap.drain_coldest().iter().map(|c| c.atime_ns).collect();
        assert_eq!(order, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_bounded_by_byte_target() {
        // target 100 bytes; candidates of 60 bytes each
        let mut heap = CandidateHeap::new(100);
        heap.push(cand(30, 60));
        heap.push(cand(10, 60)); // 120 >= 100: still need both (dropping one leaves 60 < 100)
        assert_eq!(heap.len(), 2);
        heap.push(cand(20, 60)); // colder than 30; 30 becomes sheddable
        let order: Vec<i64> = heap.drain_coldest().iter().map(|c| c.atime_ns).collect();
        assert_eq!(order, vec![10, 20]);
    }

    #[test]
    fn test_hotter_candidates_shed_first() {
        let mut heap = CandidateHeap::new(10);
        for atime in 0..100 {
            heap.push(cand(atime, 1));
        }
        let kept: Vec<i64> = heap.drain_coldest().iter().map(|c| c.atime_ns).collect();
        assert_eq!(kept.len(), 10);
        assert_eq!(kept, (0..10).collect::<Vec<_>>());
    }
}
