// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::bandwidth::Bandwidth;
use core::time::Duration;
use num_rational::Ratio;
use num_traits::One;

/// Number of (bucket-size, sustained-rate) candidates carried at once
pub(crate) const GRID_SIZE: usize = 9;

/// `BASED_UNIT - abrupt_decrease_thresh`, as a fraction of `BASED_UNIT`
///
/// This is the bucket-size floor applied at the "no bucket at all" end of the
/// candidate range (see [`build`]).
const LOWER_BOUND_SCALE: Ratio<u64> = Ratio::new_raw(256 - 150, 256);

pub(crate) const ABRUPT_DECREASE_THRESH_NUM: u64 = 150;
pub(crate) const ABRUPT_DECREASE_THRESH_DEN: u64 = 256;

/// Candidate bucket size, indexed so that `B` is non-decreasing.
///
/// The percent vector is documented elsewhere (and listed there) in descending
/// order, `p = [8/8, 7/8, ..., 1/8, 0]`; since bucket size grows with `p`,
/// storing candidates in that order would make `B` non-*increasing*. Index 0
/// here holds the `p = 0` ("no bucket, all sustained rate") hypothesis and
/// index `GRID_SIZE - 1` holds `p = 1` ("all of it was bucket"), which is the
/// order that satisfies the grid's stated monotonicity invariant.
fn percent(i: usize) -> Ratio<u64> {
    Ratio::new(i as u64, (GRID_SIZE - 1) as u64)
}

/// Builds the initial candidate grid from a single delivered-bytes snapshot
///
/// `B[i] = delivered * p[i] + (1 - p[i]) * delivered * lower_bound_scale`. At
/// `i = 0` (`p = 0`) this does not evaluate to zero: the "zero" percent entry
/// still carries the lower-bound floor, so the smallest candidate bucket is
/// `delivered * lower_bound_scale`, not an empty bucket. Kept as specified;
/// `comp` (`select_best`) is what's responsible for skating past a degenerate
/// entry, not a literal zero here.
fn build(delivered: u64) -> [u64; GRID_SIZE] {
    let mut b = [0u64; GRID_SIZE];
    for (i, slot) in b.iter_mut().enumerate() {
        let p = percent(i);
        let f = p + (Ratio::one() - p) * LOWER_BOUND_SCALE;
        *slot = (Ratio::from_integer(delivered) * f).to_integer();
    }
    b
}

/// The detector's candidate (bucket-size, sustained-rate) grid
#[derive(Clone, Copy, Debug)]
pub(crate) struct Grid {
    b: [u64; GRID_SIZE],
    r: [Bandwidth; GRID_SIZE],
    best_index: usize,
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            b: [0; GRID_SIZE],
            r: [Bandwidth::ZERO; GRID_SIZE],
            best_index: 0,
        }
    }
}

impl Grid {
    /// (Re-)seeds the grid from a pre-loss delivered-bytes snapshot, clearing
    /// every rate candidate back to zero
    pub(crate) fn new(delivered: u64) -> Self {
        Self {
            b: build(delivered),
            r: [Bandwidth::ZERO; GRID_SIZE],
            best_index: 0,
        }
    }

    /// Refines every rate candidate that the given sample is informative for
    ///
    /// For each `i` with `delivered > B[i]`, raises `R[i]` to the rate implied
    /// by the excess delivered over `elapsed`, never letting it fall.
    pub(crate) fn refine(&mut self, delivered: u64, elapsed: Duration) {
        for i in 0..GRID_SIZE {
            if delivered > self.b[i] {
                let candidate = Bandwidth::new(delivered - self.b[i], elapsed);
                self.r[i] = self.r[i].max(candidate);
            }
        }
    }

    /// The `(B, R)` pair at the given index
    pub(crate) fn candidate(&self, index: usize) -> (u64, Bandwidth) {
        (self.b[index], self.r[index])
    }

    /// The currently selected best candidate
    pub(crate) fn best(&self) -> (u64, Bandwidth) {
        self.candidate(self.best_index)
    }

    pub(crate) fn best_index(&self) -> usize {
        self.best_index
    }

    /// Runs `comp` (best-candidate selection), extending the grid outward if
    /// the winner lands on index 0 (the grid has been "outgrown")
    ///
    /// `flow_len` bounds how readily the selector advances past a candidate:
    /// a longer-lived flow demands a larger rate gap before preferring a
    /// larger bucket.
    pub(crate) fn select_best(&mut self, flow_len: Duration) -> usize {
        const MAX_EXTENSIONS: u8 = 3;

        let mut extensions = 0;
        loop {
            let winner = self.comp(flow_len);
            if winner != 0 || extensions >= MAX_EXTENSIONS {
                self.best_index = winner;
                return winner;
            }
            self.extend_outward();
            extensions += 1;
        }
    }

    fn comp(&self, flow_len: Duration) -> usize {
        let flow_len_half_us = flow_len.as_micros() as u128 / 2;

        let mut best = 0usize;
        for i in 1..GRID_SIZE {
            let delta_b = self.b[i].abs_diff(self.b[best]) as u128;
            let delta_r = self.r[i]
                .bits_per_second()
                .abs_diff(self.r[best].bits_per_second()) as u128;

            let advances = delta_r == 0 || delta_b <= flow_len_half_us * delta_r;
            if advances {
                best = i;
            }
        }
        best
    }

    /// Shifts every candidate up one slot (dropping the old largest-bucket
    /// entry) and synthesizes a new, smaller-bucket entry at index 0
    ///
    /// The new `B[0]` continues the gap between the old `B[0]` and `B[1]`
    /// outward, keeping the grid bracketing the true pair from below.
    fn extend_outward(&mut self) {
        let old_b = self.b;
        let old_r = self.r;
        let gap = old_b[1].saturating_sub(old_b[0]);

        for i in (1..GRID_SIZE).rev() {
            self.b[i] = old_b[i - 1];
            self.r[i] = old_r[i - 1];
        }
        self.b[0] = old_b[0].saturating_sub(gap);
        self.r[0] = Bandwidth::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_is_non_decreasing() {
        let b = build(10_000);
        for pair in b.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert_eq!(b[GRID_SIZE - 1], 10_000);
    }

    #[test]
    fn zero_percent_entry_is_not_literally_zero() {
        let b = build(10_000);
        assert!(b[0] > 0);
    }

    #[test]
    fn refine_only_updates_candidates_below_delivered() {
        let mut grid = Grid::new(1_000);
        grid.refine(2_000, Duration::from_millis(10));

        for i in 0..GRID_SIZE {
            let (b, r) = grid.candidate(i);
            if 2_000 > b {
                assert!(r.bits_per_second() > 0);
            } else {
                assert_eq!(r, Bandwidth::ZERO);
            }
        }
    }

    #[test]
    fn select_best_extends_grid_and_preserves_monotonicity() {
        let mut grid = Grid::new(1_000);
        // Force every candidate to the same rate so `comp` always lands on 0.
        for i in 0..GRID_SIZE {
            grid.r[i] = Bandwidth::new(1, Duration::from_secs(1));
        }

        let winner = grid.select_best(Duration::from_millis(50));
        assert_eq!(winner, 0);

        for pair in grid.b.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }
}
