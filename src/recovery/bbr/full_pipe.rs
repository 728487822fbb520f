// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    bandwidth::{Bandwidth, RateSample},
    counter::{Counter, Saturating},
    number::Fraction,
};

/// Estimator for determining if BBR has fully utilized its available bandwidth
/// ("filled the pipe"), the condition that ends STARTUP.
#[derive(Debug, Clone, Default)]
pub(crate) struct Estimator {
    /// True once BBR estimates it has ever fully utilized its available bandwidth
    full_bw_reached: bool,
    /// A recent baseline max bw, used to judge whether bandwidth is still growing
    full_bw: Bandwidth,
    /// The number of non-app-limited round trips without a large increase in `full_bw`
    full_bw_count: Counter<u8, Saturating>,
}

/// Bandwidth must grow by at least this factor per round to count as "still growing"
const DELIVERY_RATE_INCREASE: Fraction = Fraction::new(5, 4); // 1.25

/// Rounds without growth before the pipe is considered full
const BANDWIDTH_PLATEAU_ROUND_COUNT: u8 = 3;

impl Estimator {
    /// Returns true if BBR estimates it has ever fully utilized its available bandwidth
    #[inline]
    pub(crate) fn full_bw_reached(&self) -> bool {
        self.full_bw_reached
    }

    /// Called once per round, with the current filtered max bw
    #[inline]
    pub(crate) fn on_round_start(&mut self, rate_sample: RateSample, max_bw: Bandwidth) {
        if self.full_bw_reached {
            return;
        }

        self.full_bw_reached = self.bandwidth_plateaued(rate_sample, max_bw);
    }

    #[inline]
    fn bandwidth_plateaued(&mut self, rate_sample: RateSample, max_bw: Bandwidth) -> bool {
        if rate_sample.is_app_limited {
            return false;
        }

        if max_bw.bits_per_second() >= self.full_bw.bits_per_second() * DELIVERY_RATE_INCREASE {
            // still growing: record the new baseline and restart the count
            self.full_bw = max_bw;
            self.full_bw_count = Counter::default();
            return false;
        }

        // another round without much growth
        self.full_bw_count += 1;

        self.full_bw_count >= BANDWIDTH_PLATEAU_ROUND_COUNT
    }

    /// Resets the plateau detector, used on loss entry per the recovery hook
    #[inline]
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    fn sample(bw_bps: u64, app_limited: bool) -> (RateSample, Bandwidth) {
        let bw = Bandwidth::new(bw_bps / 8, Duration::from_secs(1));
        (
            RateSample {
                delivery_rate: bw,
                is_app_limited: app_limited,
                ..Default::default()
            },
            bw,
        )
    }

    #[test]
    fn plateau_after_three_flat_rounds() {
        let mut estimator = Estimator::default();

        let (rate_sample, max_bw) = sample(10_000_000, false);
        estimator.on_round_start(rate_sample, max_bw);
        assert!(!estimator.full_bw_reached());

        for _ in 0..3 {
            estimator.on_round_start(rate_sample, max_bw);
        }

        assert!(estimator.full_bw_reached());
    }

    #[test]
    fn growth_resets_the_count() {
        let mut estimator = Estimator::default();

        let (rate_sample, max_bw) = sample(10_000_000, false);
        estimator.on_round_start(rate_sample, max_bw);
        estimator.on_round_start(rate_sample, max_bw);

        let (rate_sample, max_bw) = sample(20_000_000, false);
        estimator.on_round_start(rate_sample, max_bw);
        assert!(!estimator.full_bw_reached());
    }

    #[test]
    fn app_limited_samples_are_ignored() {
        let mut estimator = Estimator::default();

        let (rate_sample, max_bw) = sample(10_000_000, true);
        for _ in 0..5 {
            estimator.on_round_start(rate_sample, max_bw);
        }
        assert!(!estimator.full_bw_reached());
    }
}
