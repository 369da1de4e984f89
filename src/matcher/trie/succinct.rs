//! Bitmap-backed succinct trie storage.
//!
//! The trie's pointer structure is flattened into three arrays: one label
//! byte per edge in BFS order, a bitmap where each node contributes a run
//! of 0-bits (one per edge) closed by a 1-bit, and a leaf bitmap over node
//! ids. Rank/select indices over the edge bitmap make child navigation
//! O(1): the id of the child reached through edge `e` is the number of
//! 0-bits before `e`'s position, and a node's first edge sits right after
//! the `(id-1)`-th 1-bit.

/// Succinct set over a sorted, deduplicated key list.
#[derive(Debug, Clone, Default)]
pub(super) struct SuccinctSet {
    pub(super) leaves: Vec<u64>,
    pub(super) label_bitmap: Vec<u64>,
    pub(super) labels: Vec<u8>,
    pub(super) ranks: Vec<u32>,
    pub(super) selects: Vec<u32>,
}

impl SuccinctSet {
    /// Build from keys that are already sorted and unique.
    pub(super) fn new(sorted_keys: &[String]) -> Self {
        let mut set = SuccinctSet::default();
        if sorted_keys.is_empty() {
            return set;
        }
        let keys: Vec<&[u8]> = sorted_keys.iter().map(|k| k.as_bytes()).collect();

        // BFS over key ranges; the queue index is the node id.
        let mut queue: Vec<(usize, usize, usize)> = vec![(0, keys.len(), 0)];
        let mut l_idx = 0usize;
        let mut node = 0usize;
        while node < queue.len() {
            let (mut start, end, col) = queue[node];
            if col == keys[start].len() {
                // A key terminates at this node.
                set_bit(&mut set.leaves, node);
                start += 1;
            }
            let mut i = start;
            while i < end {
                let from = i;
                let c = keys[from][col];
                while i < end && keys[i][col] == c {
                    i += 1;
                }
                queue.push((from, i, col + 1));
                set.labels.push(c);
                l_idx += 1; // 0-bit: one more edge for this node
            }
            set_bit(&mut set.label_bitmap, l_idx);
            l_idx += 1;
            node += 1;
        }

        set.ranks = index_rank64(&set.label_bitmap);
        set.selects = index_select32(&set.label_bitmap);
        set
    }

    pub(super) fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

fn set_bit(bitmap: &mut Vec<u64>, i: usize) {
    let word = i >> 6;
    if bitmap.len() <= word {
        bitmap.resize(word + 1, 0);
    }
    bitmap[word] |= 1u64 << (i & 63);
}

#[inline]
pub(super) fn get_bit(bitmap: &[u64], i: usize) -> bool {
    bitmap
        .get(i >> 6)
        .is_some_and(|w| (w >> (i & 63)) & 1 == 1)
}

/// `ranks[i]` = number of 1-bits in `words[..i]`; one trailing total entry.
fn index_rank64(words: &[u64]) -> Vec<u32> {
    let mut ranks = Vec::with_capacity(words.len() + 1);
    let mut n = 0u32;
    for w in words {
        ranks.push(n);
        n += w.count_ones();
    }
    ranks.push(n);
    ranks
}

/// Bit position of every 32nd 1-bit, for O(1) word location in select.
fn index_select32(words: &[u64]) -> Vec<u32> {
    let mut selects = Vec::new();
    let mut ith = 0u64;
    for (wi, &word) in words.iter().enumerate() {
        let mut w = word;
        while w != 0 {
            if ith % 32 == 0 {
                selects.push((wi * 64 + w.trailing_zeros() as usize) as u32);
            }
            ith += 1;
            w &= w - 1;
        }
    }
    if selects.is_empty() {
        selects.push(0);
    }
    selects
}

/// Number of 0-bits strictly before position `i`.
#[inline]
pub(super) fn count_zeros(words: &[u64], ranks: &[u32], i: usize) -> usize {
    let word = i >> 6;
    if word >= words.len() {
        return i - ranks.last().copied().unwrap_or(0) as usize;
    }
    let partial = (words[word] & ((1u64 << (i & 63)) - 1)).count_ones();
    i - (ranks[word] + partial) as usize
}

/// Position of the `i`-th (0-based) 1-bit.
#[inline]
pub(super) fn select_ith_one(words: &[u64], ranks: &[u32], selects: &[u32], i: usize) -> usize {
    let sample = selects[(i >> 5).min(selects.len() - 1)];
    let mut word = (sample >> 6) as usize;
    while word < words.len() && ranks[word + 1] as usize <= i {
        word += 1;
    }
    if word >= words.len() {
        return words.len() << 6;
    }
    let mut w = words[word];
    let mut n = i - ranks[word] as usize;
    while n > 0 {
        w &= w - 1;
        n -= 1;
    }
    (word << 6) + w.trailing_zeros() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_helpers() {
        let mut bm = Vec::new();
        set_bit(&mut bm, 1);
        set_bit(&mut bm, 3);
        set_bit(&mut bm, 64);
        assert!(!get_bit(&bm, 0));
        assert!(get_bit(&bm, 1));
        assert!(!get_bit(&bm, 2));
        assert!(get_bit(&bm, 3));
        assert!(get_bit(&bm, 64));
        assert!(!get_bit(&bm, 200));
    }

    #[test]
    fn rank_counts_preceding_ones() {
        let words = vec![0b1011u64, u64::MAX];
        let ranks = index_rank64(&words);
        assert_eq!(ranks, vec![0, 3, 67]);
        assert_eq!(count_zeros(&words, &ranks, 0), 0);
        assert_eq!(count_zeros(&words, &ranks, 2), 0);
        assert_eq!(count_zeros(&words, &ranks, 4), 1);
        assert_eq!(count_zeros(&words, &ranks, 64), 61);
        assert_eq!(count_zeros(&words, &ranks, 128), 61);
    }

    #[test]
    fn select_finds_ith_one() {
        let words = vec![0b1010_0100u64, 0b1u64];
        let ranks = index_rank64(&words);
        let selects = index_select32(&words);
        assert_eq!(select_ith_one(&words, &ranks, &selects, 0), 2);
        assert_eq!(select_ith_one(&words, &ranks, &selects, 1), 5);
        assert_eq!(select_ith_one(&words, &ranks, &selects, 2), 7);
        assert_eq!(select_ith_one(&words, &ranks, &selects, 3), 64);
    }

    #[test]
    fn select_past_last_one_is_out_of_range() {
        let words = vec![0b1u64];
        let ranks = index_rank64(&words);
        let selects = index_select32(&words);
        assert_eq!(select_ith_one(&words, &ranks, &selects, 5), 64);
    }

    #[test]
    fn empty_set() {
        let set = SuccinctSet::new(&[]);
        assert!(set.is_empty());
    }

    #[test]
    fn build_populates_structure() {
        let mut keys: Vec<String> = vec!["moc.elgoog".into(), "moc.koobecaf".into()];
        keys.sort();
        let set = SuccinctSet::new(&keys);
        assert!(!set.is_empty());
        // Shared prefix "moc." then a branch: 'e' and 'k'.
        assert!(set.labels.contains(&b'e'));
        assert!(set.labels.contains(&b'k'));
    }
}
