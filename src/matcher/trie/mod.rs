//! Reverse-domain index for large Full/RootDomain sets.
//!
//! Domains are lowercased and stored reversed so that suffix questions
//! become prefix walks. Two sentinel bytes, impossible in a legal domain,
//! are appended to the reversed key to encode suffix semantics:
//!
//! - `ROOT` (`\n`): the entry matches itself and any dot-separated
//!   extension (`google.com` and `www.google.com`);
//! - `PREFIX` (`\r`): the entry came with a leading dot and matches only
//!   strict extensions (`www.google.com` but not `google.com`);
//! - no sentinel: exact match only.
//!
//! A lookup is a single walk over the reversed query, O(len).

mod succinct;

use std::collections::HashSet;

use succinct::{count_zeros, get_bit, select_ith_one, SuccinctSet};

const ROOT_LABEL: u8 = b'\n';
const PREFIX_LABEL: u8 = b'\r';

#[derive(Debug, Clone, Default)]
pub struct DomainTrie {
    set: SuccinctSet,
}

impl DomainTrie {
    /// Build from exact-match domains and suffix domains. A suffix entry
    /// with a leading dot matches subdomains only; without, it also
    /// matches the bare domain.
    pub fn new(exact: &[String], suffixes: &[String]) -> Self {
        if exact.is_empty() && suffixes.is_empty() {
            return Self::default();
        }

        let mut keys = Vec::with_capacity(exact.len() + suffixes.len());
        let mut seen = HashSet::with_capacity(exact.len() + suffixes.len());

        for domain in suffixes {
            let domain = domain.to_lowercase();
            if !seen.insert(domain.clone()) {
                continue;
            }
            let sentinel = if domain.starts_with('.') {
                PREFIX_LABEL
            } else {
                ROOT_LABEL
            };
            let mut key = reverse_domain(&domain);
            key.push(sentinel as char);
            keys.push(key);
        }
        for domain in exact {
            let domain = domain.to_lowercase();
            if !seen.insert(domain.clone()) {
                continue;
            }
            keys.push(reverse_domain(&domain));
        }

        keys.sort();
        Self {
            set: SuccinctSet::new(&keys),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Whether `domain` is covered by any stored entry.
    pub fn matches(&self, domain: &str) -> bool {
        if self.set.is_empty() {
            return false;
        }
        let key = reverse_domain(&domain.to_lowercase());
        self.walk(key.as_bytes())
    }

    fn walk(&self, key: &[u8]) -> bool {
        let set = &self.set;
        let mut node_id = 0usize;
        let mut bm_idx = 0usize;

        for &c in key {
            // Scan the current node's edges for `c`, watching for
            // sentinel edges on the way (they sort first).
            loop {
                if get_bit(&set.label_bitmap, bm_idx) {
                    return false; // edges exhausted, no branch for `c`
                }
                let Some(&label) = bm_idx
                    .checked_sub(node_id)
                    .and_then(|idx| set.labels.get(idx))
                else {
                    return false;
                };

                if label == PREFIX_LABEL {
                    // Anything left in the query is a strict extension.
                    return true;
                }
                if label == ROOT_LABEL {
                    let child = count_zeros(&set.label_bitmap, &set.ranks, bm_idx + 1);
                    if c == b'.' && get_bit(&set.leaves, child) {
                        return true;
                    }
                }
                if label == c {
                    break;
                }
                bm_idx += 1;
            }

            node_id = count_zeros(&set.label_bitmap, &set.ranks, bm_idx + 1);
            if node_id == 0 {
                return false;
            }
            bm_idx = select_ith_one(&set.label_bitmap, &set.ranks, &set.selects, node_id - 1) + 1;
        }

        // Query fully consumed: exact terminal, or a sentinel edge meaning
        // the query itself is a stored root/prefix value.
        if get_bit(&set.leaves, node_id) {
            return true;
        }
        loop {
            if get_bit(&set.label_bitmap, bm_idx) {
                return false;
            }
            let Some(&label) = bm_idx
                .checked_sub(node_id)
                .and_then(|idx| set.labels.get(idx))
            else {
                return false;
            };
            if label == PREFIX_LABEL || label == ROOT_LABEL {
                return true;
            }
            bm_idx += 1;
        }
    }
}

/// Character-wise reversal: `google.com` -> `moc.elgoog`.
fn reverse_domain(domain: &str) -> String {
    domain.chars().rev().collect()
}
