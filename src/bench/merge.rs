use super::sample::LatencySample;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Merge already-sorted sample sequences into one sequence sorted by start time.
///
/// Uses a min-heap holding one cursor per source. Ties on start time keep the
/// order of `sources`, so the merge is stable.
pub fn merge_sorted(sources: Vec<Vec<LatencySample>>) -> Vec<LatencySample> {
    let mut sources: Vec<Vec<LatencySample>> =
        sources.into_iter().filter(|s| !s.is_empty()).collect();

    match sources.len() {
        0 => return Vec::new(),
        1 => return sources.pop().unwrap_or_default(),
        _ => {}
    }

    let total = sources.iter().map(Vec::len).sum();
    let mut merged = Vec::with_capacity(total);
    let mut cursors: Vec<_> = sources.into_iter().map(Vec::into_iter).collect();

    // (start, source index, duration)
    let mut heap = BinaryHeap::with_capacity(cursors.len());
    for (source, cursor) in cursors.iter_mut().enumerate() {
        if let Some(sample) = cursor.next() {
            heap.push(Reverse((sample.start, source, sample.duration)));
        }
    }

    while let Some(Reverse((start, source, duration))) = heap.pop() {
        merged.push(LatencySample::new(start, duration));
        if let Some(next) = cursors[source].next() {
            debug_assert!(next.start >= start, "merge source {} is not sorted", source);
            heap.push(Reverse((next.start, source, next.duration)));
        }
    }

    merged
}
