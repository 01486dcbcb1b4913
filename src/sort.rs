//! Parallel sort-merge over owned keys.
//!
//! The input is cut into `workers` contiguous runs of `ceil(n / workers)`
//! keys, the runs are sorted in parallel, then adjacent runs are merged
//! pairwise round after round until a single run is left.

use itertools::Itertools;
use rayon::prelude::*;

/// Sorts `keys` in byte-wise lexicographic order using `workers` runs.
///
/// Runs on the current rayon pool.
pub fn parallel_sort_merge(mut keys: Vec<String>, workers: usize) -> Vec<String> {
    if keys.len() <= 1 || workers <= 1 {
        keys.sort_unstable();
        return keys;
    }

    let run_len = keys.len().div_ceil(workers);
    let mut runs = keys
        .into_iter()
        .chunks(run_len)
        .into_iter()
        .map(|run| run.collect_vec())
        .collect_vec();

    runs.par_iter_mut().for_each(|run| run.sort_unstable());

    while runs.len() > 1 {
        runs = runs
            .into_par_iter()
            .chunks(2)
            .map(|pair| {
                let mut pair = pair.into_iter();
                match (pair.next(), pair.next()) {
                    (Some(left), Some(right)) => merge_runs(left, right),
                    (Some(odd), None) => odd,
                    _ => Vec::new(),
                }
            })
            .collect();
    }

    runs.pop().unwrap_or_default()
}

/// Linear two-pointer merge of two sorted runs; ties go left.
pub fn merge_runs(left: Vec<String>, right: Vec<String>) -> Vec<String> {
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();

    loop {
        let take_left = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => l.as_bytes() <= r.as_bytes(),
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_left { left.next() } else { right.next() };
        merged.extend(next);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_merge_runs() {
        let merged = merge_runs(strings(&["a", "c", "e"]), strings(&["b", "d", "f", "g"]));
        assert_eq!(merged, strings(&["a", "b", "c", "d", "e", "f", "g"]));
        assert_eq!(merge_runs(Vec::new(), strings(&["x"])), strings(&["x"]));
        assert!(merge_runs(Vec::new(), Vec::new()).is_empty());
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(parallel_sort_merge(Vec::new(), 4).is_empty());
        assert_eq!(parallel_sort_merge(strings(&["only"]), 4), strings(&["only"]));
        assert_eq!(
            parallel_sort_merge(strings(&["b", "a", "c"]), 1),
            strings(&["a", "b", "c"])
        );
    }

    #[test]
    fn test_more_workers_than_keys() {
        assert_eq!(
            parallel_sort_merge(strings(&["delta", "alpha", "charlie", "bravo"]), 16),
            strings(&["alpha", "bravo", "charlie", "delta"])
        );
    }

    #[test]
    fn test_byte_wise_order() {
        // Uppercase sorts before lowercase and multi-byte UTF-8 after ASCII.
        let sorted = parallel_sort_merge(strings(&["Zürich", "abu dhabi", "Ürümqi", "Zagreb", "Accra"]), 3);
        assert_eq!(sorted, strings(&["Accra", "Zagreb", "Zürich", "abu dhabi", "Ürümqi"]));
    }

    proptest! {
        #[test]
        fn prop_matches_sequential_sort(
            keys in proptest::collection::hash_set("\\PC{0,8}", 0..200),
            workers in 1usize..24,
        ) {
            let keys: Vec<String> = keys.into_iter().collect();
            let mut expected = keys.clone();
            expected.sort();
            prop_assert_eq!(parallel_sort_merge(keys, workers), expected);
        }
    }
}
