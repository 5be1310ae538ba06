//! Candidate heap merge
//!
//! When the per-band posting lists are already in process, ranking does
//! not need a count map: a k-way merge over the sorted lists coalesces
//! equal-id runs into weights while it drains, and a secondary max-heap
//! yields candidates in descending weight. Equal ids arrive consecutively
//! by sortedness, so the run length of an id is its band-agreement count.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::types::RecordId;

/// Merge per-source posting lists into `(record_id, weight)` candidates,
/// descending by weight with ascending-id ties. Sources need not arrive
/// sorted; each is sorted before the merge.
pub fn merge_candidates(mut sources: Vec<Vec<RecordId>>) -> Vec<(RecordId, usize)> {
    let mut merge: BinaryHeap<Reverse<(RecordId, usize)>> = BinaryHeap::new();
    let mut cursors = vec![0usize; sources.len()];

    for (source, list) in sources.iter_mut().enumerate() {
        list.sort_unstable();
        if let Some(&first) = list.first() {
            merge.push(Reverse((first, source)));
            cursors[source] = 1;
        }
    }

    let mut weighted: BinaryHeap<(usize, Reverse<RecordId>)> = BinaryHeap::new();
    let mut run: Option<(RecordId, usize)> = None;

    while let Some(Reverse((id, source))) = merge.pop() {
        run = match run {
            Some((prev, count)) if prev == id => Some((prev, count + 1)),
            Some((prev, count)) => {
                weighted.push((count, Reverse(prev)));
                Some((id, 1))
            }
            None => Some((id, 1)),
        };

        // Refill from the source the popped entry came from.
        if let Some(&next) = sources[source].get(cursors[source]) {
            merge.push(Reverse((next, source)));
            cursors[source] += 1;
        }
    }
    if let Some((prev, count)) = run {
        weighted.push((count, Reverse(prev)));
    }

    let mut out = Vec::with_capacity(weighted.len());
    while let Some((count, Reverse(id))) = weighted.pop() {
        out.push((id, count));
    }
    out
}
