use std::cmp::Reverse;
use std::collections::BinaryHeap;

use indexmap::IndexMap;

use crate::base::Token;

/// Split `piece` into byte-pair-merged parts: start from single bytes and keep
/// merging the adjacent pair whose concatenation has the lowest rank (leftmost
/// on ties) until no adjacent concatenation is in `mergeable_ranks`.
///
/// Parts live in a linked list indexed by their first byte and candidate
/// merges sit in a min-heap, so a chunk costs O(n log n) rather than a full
/// rescan per merge. Heap entries made stale by an earlier merge are skipped
/// when popped.
pub fn bpe(mergeable_ranks: &IndexMap<Vec<u8>, Token>, piece: &[u8]) -> Vec<Vec<u8>> {
    let n = piece.len();
    if n == 0 {
        return Vec::new();
    }

    // part starting at byte i covers piece[i..end[i]]
    let mut end: Vec<usize> = (1..=n).collect();
    let mut prev: Vec<Option<usize>> = (0..n).map(|i| i.checked_sub(1)).collect();
    let mut next: Vec<Option<usize>> = (1..=n).map(|j| Some(j).filter(|&j| j < n)).collect();
    let mut alive = vec![true; n];

    let mut heap = BinaryHeap::new();
    let push = |heap: &mut BinaryHeap<Reverse<(Token, usize, usize, usize)>>,
                left: usize,
                right: usize,
                right_end: usize| {
        if let Some(&rank) = mergeable_ranks.get(&piece[left..right_end]) {
            heap.push(Reverse((rank, left, right, right_end)));
        }
    };
    for i in 0..n - 1 {
        push(&mut heap, i, i + 1, i + 2);
    }

    while let Some(Reverse((_, left, right, right_end))) = heap.pop() {
        let current = alive[left]
            && alive[right]
            && next[left] == Some(right)
            && end[right] == right_end;
        if !current {
            continue;
        }

        alive[right] = false;
        end[left] = right_end;
        next[left] = next[right];
        if let Some(after) = next[right] {
            prev[after] = Some(left);
            push(&mut heap, left, after, end[after]);
        }
        if let Some(before) = prev[left] {
            push(&mut heap, before, left, right_end);
        }
    }

    let mut parts = Vec::new();
    let mut cursor = Some(0);
    while let Some(i) = cursor {
        parts.push(piece[i..end[i]].to_vec());
        cursor = next[i];
    }
    parts
}
