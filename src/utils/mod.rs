//! Shared helpers: residue-load range partitioning, distributed part
//! naming and the rank barrier abstraction.

use std::path::{Path, PathBuf};
use std::sync::Barrier;

use crate::db::append_suffix;

/// Split `[0, seq_lens.len())` into `ranks` contiguous sub-ranges with
/// near-equal summed lengths. Returns `(from, count)` for `rank`.
/// Earlier ranks take the extra record when a boundary is ambiguous.
pub fn decompose_by_residue_load(seq_lens: &[usize], rank: u32, ranks: u32) -> (usize, usize) {
    let n = seq_lens.len();
    let ranks = ranks.max(1) as u64;
    let rank = (rank as u64).min(ranks - 1);
    let total: u64 = seq_lens.iter().map(|&l| l as u64).sum();

    // Boundary r sits at the first prefix sum reaching the rounded
    // r/ranks share of the total load.
    let cut = |r: u64| -> usize {
        if r == 0 {
            return 0;
        }
        if r >= ranks {
            return n;
        }
        let target = (total * r + ranks / 2) / ranks;
        let mut prefix = 0u64;
        for (i, &len) in seq_lens.iter().enumerate() {
            if prefix >= target {
                return i;
            }
            prefix += len as u64;
        }
        n
    };

    let from = cut(rank);
    let to = cut(rank + 1);
    (from, to - from)
}

/// Deterministic per-rank output names for distributed runs.
pub fn tmp_part_names(data: &Path, index: &Path, rank: u32) -> (PathBuf, PathBuf) {
    let suffix = format!(".{}", rank);
    (append_suffix(data, &suffix), append_suffix(index, &suffix))
}

/// Synchronization point between distributed ranks. The transport is
/// external; in-process tests drive ranks as threads over
/// [`std::sync::Barrier`].
pub trait RankBarrier: Sync {
    fn wait(&self);
}

/// Barrier for single-process runs: nothing to wait for.
pub struct NoBarrier;

impl RankBarrier for NoBarrier {
    fn wait(&self) {}
}

impl RankBarrier for Barrier {
    fn wait(&self) {
        Barrier::wait(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(lens: &[usize], ranks: u32) -> Vec<(usize, usize)> {
        (0..ranks)
            .map(|r| decompose_by_residue_load(lens, r, ranks))
            .collect()
    }

    #[test]
    fn ranges_are_contiguous_and_cover_everything() {
        let lens = [5, 1, 9, 2, 2, 7, 3, 3];
        for ranks in 1..=5 {
            let parts = ranges(&lens, ranks);
            let mut next = 0;
            for &(from, count) in &parts {
                assert_eq!(from, next);
                next = from + count;
            }
            assert_eq!(next, lens.len());
        }
    }

    #[test]
    fn load_is_balanced_by_residue_count() {
        // One long sequence and many short ones: the long one should
        // not drag half the records along with it.
        let lens = [100, 1, 1, 1, 1, 1, 1, 1];
        let parts = ranges(&lens, 2);
        assert_eq!(parts[0], (0, 1));
        assert_eq!(parts[1], (1, 7));
    }

    #[test]
    fn ties_favor_earlier_ranks() {
        let lens = [1, 1, 1];
        let parts = ranges(&lens, 2);
        assert_eq!(parts[0], (0, 2));
        assert_eq!(parts[1], (2, 1));
    }

    #[test]
    fn empty_input_gives_empty_ranges() {
        assert_eq!(decompose_by_residue_load(&[], 0, 4), (0, 0));
        assert_eq!(decompose_by_residue_load(&[], 3, 4), (0, 0));
    }

    #[test]
    fn part_names_are_deterministic() {
        let (d, i) = tmp_part_names(Path::new("/x/out"), Path::new("/x/out.index"), 2);
        assert_eq!(d, Path::new("/x/out.2"));
        assert_eq!(i, Path::new("/x/out.index.2"));
    }
}
