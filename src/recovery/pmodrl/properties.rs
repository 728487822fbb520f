// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Property tests for the detector's grid and classification invariants.

use super::*;
use crate::recovery::pmodrl::grid::GRID_SIZE;
use bolero::{check, generator::*};

#[derive(Debug, TypeGenerator)]
struct Sample {
    #[generator(0..=2_000u64)]
    delivered_delta: u64,
    #[generator(0..=2_000u64)]
    lost_delta: u64,
    #[generator(1..=50u64)]
    elapsed_ms: u64,
}

fn rank(classification: Classification) -> u8 {
    match classification {
        Classification::Unclassified => 0,
        Classification::RateLimited => 1,
        Classification::Disclassified => 2,
    }
}

/// P6: classification never moves backwards. Unclassified -> RateLimited ->
/// Disclassified is the only legal direction; a reset starts a new epoch from
/// a fresh `Detector` rather than rewinding this one.
#[test]
fn classify_never_reverts() {
    check!()
        .with_generator(gen::<Vec<Sample>>())
        .for_each(|samples| {
            let start = Timestamp::from_duration(Duration::from_micros(1));
            let mut detector = Detector::new(start, 0, 0);
            let mut now = start;
            let mut delivered = 0u64;
            let mut lost = 0u64;
            let mut prior_rank = 0u8;
            let min_rtt = Duration::from_millis(20);

            for sample in samples {
                now += Duration::from_millis(sample.elapsed_ms);
                delivered = delivered.saturating_add(sample.delivered_delta);
                lost = lost.saturating_add(sample.lost_delta);

                // Every sample is treated as loss-advancing so `try_arm`/`classify`
                // actually run; the detector's own loss-ratio gate decides whether
                // that loss is "high" enough to matter.
                detector.on_pre_empty_sample(now, delivered, lost, true);
                detector.try_arm(now, delivered, lost, min_rtt);
                detector.refine(now, delivered);

                let flow_len = detector.flow_len(now);
                let classification = detector.classify(now, min_rtt, flow_len, delivered, 2);

                let observed_rank = rank(classification);
                assert!(
                    observed_rank >= prior_rank,
                    "classification moved backwards: {:?} -> {:?}",
                    prior_rank,
                    classification
                );
                prior_rank = observed_rank;
            }
        });
}

/// P5: after the grid has been shifted outward (`extend_outward`) any number
/// of times, the bucket-size column stays non-decreasing.
#[test]
fn grid_shift_preserves_monotonicity() {
    check!()
        .with_generator((0..=500_000u64, 0..=5u8))
        .for_each(|(delivered, shifts)| {
            let mut grid = Grid::new(*delivered);

            for _ in 0..*shifts {
                let _ = grid.select_best(Duration::from_millis(50));
            }

            let mut prior = grid.candidate(0).0;
            for i in 1..GRID_SIZE {
                let current = grid.candidate(i).0;
                assert!(current >= prior, "grid lost monotonicity after shifting");
                prior = current;
            }
        });
}
