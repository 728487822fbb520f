// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    random,
    recovery::bbr::{startup, BbrCongestionController, State},
    time::Timestamp,
};
use num_rational::Ratio;
use num_traits::One;

/// `ln(2) / 2 ~= 0.347`: the inverse of [`startup::PACING_GAIN`], chosen to drain
/// the queue Startup built up in roughly one round
pub(crate) const PACING_GAIN: Ratio<u64> = Ratio::new_raw(1000, 2885);

/// DRAIN keeps STARTUP's cwnd gain so the window doesn't shrink while the queue drains
pub(crate) const CWND_GAIN: Ratio<u64> = startup::CWND_GAIN;

/// Methods related to the Drain state
impl BbrCongestionController {
    /// Enter the `Drain` state
    pub(super) fn enter_drain(&mut self) {
        self.state.transition_to(State::Drain);
    }

    /// Checks if the `Drain` state is done and enters `ProbeBw` if so
    pub(super) fn check_drain_done(
        &mut self,
        random_generator: &mut dyn random::Generator,
        now: Timestamp,
    ) {
        if self.state.is_drain()
            && self.bytes_in_flight <= self.inflight(self.data_rate_model.bw(), Ratio::one())
        {
            self.enter_probe_bw(random_generator, now);
        }
    }
}
