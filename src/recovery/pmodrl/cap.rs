// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{bandwidth::Bandwidth, config::Config};
use num_rational::Ratio;

/// Whether BBR's pacing rate is currently being ceilinged by the detector
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UpperBound {
    /// No cap in effect
    Inactive,
    /// Cap active
    Active,
    /// Cap suspended: a probe just found new headroom and re-estimation is in progress
    Suspended,
}

/// Multiplicative inflation applied to the cap rate while a probe is underway
///
/// Documented elsewhere as an effective gain of `probe_per * 5 - 100` percent,
/// but the only form actually wired as a multiplier on the gain-1.0 cap rate
/// is the literal `probe_per / 20`; the two aren't reconcilable as written, so
/// the literal multiplicative form is what's implemented here.
fn probe_gain(config: &Config) -> Ratio<u64> {
    Ratio::new(config.probe_per() as u64, 20)
}

/// Drives the periodic upward probe of an active cap
///
/// Owned by the detector only while `classify = RateLimited`; has no opinion
/// about classification itself.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CapController {
    upper_bound: UpperBound,
    /// Non-zero (`true`) while a probe's high-gain excursion is in progress
    nominator: bool,
    round_count: u32,
    round_count_no: u32,
}

impl Default for CapController {
    fn default() -> Self {
        Self {
            upper_bound: UpperBound::Inactive,
            nominator: false,
            round_count: 0,
            round_count_no: 0,
        }
    }
}

impl CapController {
    pub(crate) fn upper_bound(&self) -> UpperBound {
        self.upper_bound
    }

    pub(crate) fn is_probing(&self) -> bool {
        self.nominator
    }

    /// Activates the cap with a fresh probe schedule, called when the
    /// detector first commits to `classify = RateLimited`
    pub(crate) fn activate(&mut self) {
        self.upper_bound = UpperBound::Active;
        self.nominator = false;
        self.round_count = 0;
        self.round_count_no = 0;
    }

    /// The pacing-rate ceiling derived from the best candidate's rate,
    /// inflated by [`probe_gain`] while a probe is in progress
    pub(crate) fn cap_rate(&self, best_r: Bandwidth, config: &Config) -> Bandwidth {
        if self.nominator {
            best_r * probe_gain(config)
        } else {
            best_r
        }
    }

    /// Called once per round while `classify = RateLimited`
    ///
    /// Returns `true` if a probe just started and the gain cycle should be
    /// forced back to its high-gain phase.
    pub(crate) fn on_round_start(
        &mut self,
        best: (u64, Bandwidth),
        mem: &mut (u64, Bandwidth),
        config: &Config,
    ) -> bool {
        if self.upper_bound == UpperBound::Active && !self.nominator {
            self.round_count += 1;
            if self.round_count >= config.probe_interval() {
                self.nominator = true;
                self.round_count = 0;
                *mem = best;
                return true;
            }
            return false;
        }

        if best != *mem {
            // The probe (or the suspension that preceded it) found new headroom.
            self.upper_bound = UpperBound::Suspended;
            *mem = best;
            self.round_count_no = 0;
        } else {
            self.round_count_no += 1;
            if self.round_count_no >= config.monitor_peroid() {
                self.upper_bound = UpperBound::Active;
                self.nominator = false;
                self.round_count_no = 0;
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    fn bw(bps: u64) -> Bandwidth {
        Bandwidth::new(bps / 8, Duration::from_secs(1))
    }

    #[test]
    fn probe_starts_after_probe_interval_rounds() {
        let config = Config::default();
        let mut cap = CapController::default();
        cap.activate();
        let mut mem = (0, Bandwidth::ZERO);
        let best = (1_000, bw(8_000));

        let mut started = false;
        for _ in 0..config.probe_interval() {
            started = cap.on_round_start(best, &mut mem, &config);
        }

        assert!(started);
        assert!(cap.is_probing());
        assert_eq!(mem, best);
    }

    #[test]
    fn unchanged_candidate_closes_probe_after_monitor_period() {
        let config = Config::default();
        let mut cap = CapController::default();
        cap.activate();
        let mut mem = (0, Bandwidth::ZERO);
        let best = (1_000, bw(8_000));

        for _ in 0..config.probe_interval() {
            cap.on_round_start(best, &mut mem, &config);
        }
        assert!(cap.is_probing());

        for _ in 0..config.monitor_peroid() {
            cap.on_round_start(best, &mut mem, &config);
        }

        assert_eq!(cap.upper_bound(), UpperBound::Active);
        assert!(!cap.is_probing());
    }

    #[test]
    fn new_headroom_suspends_the_cap() {
        let config = Config::default();
        let mut cap = CapController::default();
        cap.activate();
        let mut mem = (0, Bandwidth::ZERO);
        let best = (1_000, bw(8_000));

        for _ in 0..config.probe_interval() {
            cap.on_round_start(best, &mut mem, &config);
        }

        let higher = (2_000, bw(16_000));
        cap.on_round_start(higher, &mut mem, &config);

        assert_eq!(cap.upper_bound(), UpperBound::Suspended);
        assert_eq!(mem, higher);
    }
}
