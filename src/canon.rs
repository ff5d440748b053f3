//! Pairwise canonicalization
//!
//! Shared helper for connection resolution (logic level) and bridge
//! coalescing (netlist level): given a set of equivalence-inducing pairs,
//! map every non-canonical member to the preferred representative of its
//! class.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::hash::Hash;

/// Compute, for every value that loses at least one comparison, the best
/// representative of its equivalence class under `prefer` (`prefer(a, b)`
/// is true when `a` should win). The returned map never contains a
/// canonical value as a key.
pub fn canonicalize<T, F>(pairs: &[(T, T)], prefer: F) -> HashMap<T, T>
where
    T: Copy + Eq + Hash,
    F: Fn(&T, &T) -> bool,
{
    // For each value, some strictly better value of the same class.
    let mut better: HashMap<T, T> = HashMap::new();

    let follow = |better: &HashMap<T, T>, mut x: T| {
        while let Some(&next) = better.get(&x) {
            x = next;
        }
        x
    };

    for &(a, b) in pairs {
        let a = follow(&better, a);
        let b = follow(&better, b);
        if a == b {
            continue;
        }
        if prefer(&a, &b) {
            better.insert(b, a);
        } else {
            better.insert(a, b);
        }
    }

    // Collapse chains so every key maps straight to its class root.
    let keys: Vec<T> = better.keys().copied().collect();
    let mut best: HashMap<T, T> = HashMap::with_capacity(keys.len());
    for key in keys {
        best.insert(key, follow(&better, key));
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smallest(pairs: &[(u32, u32)]) -> HashMap<u32, u32> {
        canonicalize(pairs, |a, b| a < b)
    }

    #[test]
    fn single_pair() {
        let best = smallest(&[(5, 3)]);
        assert_eq!(best.len(), 1);
        assert_eq!(best[&5], 3);
    }

    #[test]
    fn chain_collapses_to_root() {
        let best = smallest(&[(1, 2), (2, 3), (3, 4)]);
        assert_eq!(best.len(), 3);
        assert_eq!(best[&2], 1);
        assert_eq!(best[&3], 1);
        assert_eq!(best[&4], 1);
        assert!(!best.contains_key(&1));
    }

    #[test]
    fn order_of_pairs_does_not_change_roots() {
        let best = smallest(&[(4, 3), (1, 2), (2, 3)]);
        for x in [2, 3, 4] {
            assert_eq!(best[&x], 1);
        }
    }

    #[test]
    fn self_pair_is_ignored() {
        let best = smallest(&[(7, 7)]);
        assert!(best.is_empty());
    }

    #[test]
    fn disjoint_classes_stay_disjoint() {
        let best = smallest(&[(1, 2), (10, 11)]);
        assert_eq!(best[&2], 1);
        assert_eq!(best[&11], 10);
        assert_eq!(best.len(), 2);
    }
}
