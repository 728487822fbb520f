// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    bandwidth::{Bandwidth, RateSample},
    windowed_filter::WindowedMaxFilter,
};
use core::num::Wrapping;

/// Rounds over which the max-bandwidth filter retains its peak sample
const MAX_BW_FILTER_LEN: Wrapping<u8> = Wrapping(10);

/// Tracks the modeled maximum bottleneck bandwidth
///
/// `bw` is the value the rest of the control loop should actually use: it is
/// either the windowed-max filter's current value, or, while the long-term
/// policed-bandwidth estimator has committed, the LT estimate instead.
#[derive(Clone, Debug)]
pub(crate) struct Model {
    max_bw_filter: WindowedMaxFilter<Bandwidth, Wrapping<u8>, Wrapping<u8>>,
    bw: Bandwidth,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            max_bw_filter: WindowedMaxFilter::new(MAX_BW_FILTER_LEN),
            bw: Bandwidth::ZERO,
        }
    }
}

impl Model {
    /// The bandwidth the rest of the model should pace/size cwnd against
    #[inline]
    pub(crate) fn bw(&self) -> Bandwidth {
        self.bw
    }

    /// The raw windowed-max filtered bandwidth, ignoring any LT override
    #[inline]
    pub(crate) fn max_bw(&self) -> Bandwidth {
        self.max_bw_filter.value().unwrap_or(Bandwidth::ZERO)
    }

    /// Feeds a new delivery-rate sample into the max-bw filter
    ///
    /// App-limited samples are discarded unless they exceed the current max:
    /// an app-limited sample can never prove the pipe is *more* full, but it can
    /// raise the bar if it happens to observe a higher rate anyway (R2).
    #[inline]
    pub(crate) fn update_max_bw(&mut self, rate_sample: RateSample, round_count: u64) {
        if rate_sample.is_app_limited && rate_sample.delivery_rate <= self.max_bw() {
            return;
        }

        self.max_bw_filter
            .update(rate_sample.delivery_rate, Wrapping(round_count as u8));
    }

    /// Recomputes the operative `bw`, applying the LT override when present
    #[inline]
    pub(crate) fn update_bw(&mut self, lt_bw: Option<Bandwidth>) {
        self.bw = lt_bw.unwrap_or_else(|| self.max_bw());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    fn sample(bps: u64, app_limited: bool) -> RateSample {
        RateSample {
            delivery_rate: Bandwidth::new(bps / 8, Duration::from_secs(1)),
            is_app_limited: app_limited,
            ..Default::default()
        }
    }

    #[test]
    fn max_bw_tracks_the_peak() {
        let mut model = Model::default();
        model.update_max_bw(sample(10_000_000, false), 0);
        model.update_max_bw(sample(5_000_000, false), 1);
        assert_eq!(model.max_bw().bits_per_second(), 10_000_000);
    }

    #[test]
    fn app_limited_sample_below_max_is_discarded() {
        let mut model = Model::default();
        model.update_max_bw(sample(10_000_000, false), 0);
        model.update_max_bw(sample(1_000_000, true), 1);
        assert_eq!(model.max_bw().bits_per_second(), 10_000_000);
    }

    #[test]
    fn lt_bw_overrides_bw() {
        let mut model = Model::default();
        model.update_max_bw(sample(10_000_000, false), 0);
        model.update_bw(None);
        assert_eq!(model.bw().bits_per_second(), 10_000_000);

        let lt = Bandwidth::new(625_000, Duration::from_secs(1));
        model.update_bw(Some(lt));
        assert_eq!(model.bw(), lt);
    }
}
