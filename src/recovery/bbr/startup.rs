// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{bandwidth::RateSample, recovery::bbr::{BbrCongestionController, State}};
use num_rational::Ratio;

/// `2 / ln(2) ~= 2.885`: the gain that lets a connection double its sending rate
/// each round while estimating available bandwidth
pub(crate) const PACING_GAIN: Ratio<u64> = Ratio::new_raw(2885, 1000);

/// STARTUP's cwnd gain is the same `2 / ln(2)` constant as its pacing gain
pub(crate) const CWND_GAIN: Ratio<u64> = PACING_GAIN;

/// Methods related to the Startup state
impl BbrCongestionController {
    /// Enter the `Startup` state
    pub(super) fn enter_startup(&mut self) {
        self.state.transition_to(State::Startup);
    }

    /// Checks if the `Startup` state is done and enters `Drain` if so
    pub(super) fn check_startup_done(&mut self, rate_sample: RateSample) {
        if self.round_counter.round_start() {
            self.full_pipe_estimator
                .on_round_start(rate_sample, self.data_rate_model.max_bw());
        }

        if self.state.is_startup() && self.full_pipe_estimator.full_bw_reached() {
            self.enter_drain();
        }
    }
}
