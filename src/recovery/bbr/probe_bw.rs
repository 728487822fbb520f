// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    bandwidth::Bandwidth,
    random,
    recovery::bbr::{BbrCongestionController, State},
    time::Timestamp,
};
use num_rational::Ratio;
use num_traits::One;

/// Cwnd gain used throughout ProbeBw, regardless of the current cycle phase
pub(crate) const CWND_GAIN: Ratio<u64> = Ratio::new_raw(2, 1);

/// The 8-phase pacing-gain cycle. Phase 0 probes for more bandwidth; phase 1
/// drains the queue that phase 0 built up; the rest cruise at gain 1.0.
const PACING_GAIN_CYCLE: [Ratio<u64>; 8] = [
    Ratio::new_raw(5, 4),
    Ratio::new_raw(3, 4),
    Ratio::new_raw(1, 1),
    Ratio::new_raw(1, 1),
    Ratio::new_raw(1, 1),
    Ratio::new_raw(1, 1),
    Ratio::new_raw(1, 1),
    Ratio::new_raw(1, 1),
];

/// Phase indices a freshly entered ProbeBw cycle may start from. Index 1 (the
/// drain phase) is excluded: starting there would undo the work Drain just did.
const STARTING_PHASES: [u8; 7] = [0, 2, 3, 4, 5, 6, 7];

/// Tracks which phase of the gain cycle is active, and how long it has been active
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ProbeBwCycle {
    phase: u8,
    phase_start: Timestamp,
}

impl ProbeBwCycle {
    /// Starts a fresh cycle at phase 0, used when the detector forces a probe
    /// back to the top of the gain cycle
    #[inline]
    pub(crate) fn restart(now: Timestamp) -> Self {
        Self {
            phase: 0,
            phase_start: now,
        }
    }

    #[inline]
    pub(crate) fn pacing_gain(self) -> Ratio<u64> {
        PACING_GAIN_CYCLE[self.phase as usize]
    }

    /// True while in the high pacing-gain phase (phase 0), where BBR probes for
    /// more bandwidth than it currently believes is available
    #[inline]
    pub(crate) fn is_high_gain_phase(self) -> bool {
        self.phase == 0
    }

    /// True while in the low pacing-gain phase (phase 1), draining the queue the
    /// high-gain phase built up
    #[inline]
    pub(crate) fn is_low_gain_phase(self) -> bool {
        self.phase == 1
    }
}

/// Methods related to the ProbeBw state
impl BbrCongestionController {
    /// Enters ProbeBw, choosing the starting phase uniformly among the 7
    /// non-drain indices so a flow doesn't systematically restart in the phase
    /// that would immediately cut its rate
    pub(super) fn enter_probe_bw(
        &mut self,
        random_generator: &mut dyn random::Generator,
        now: Timestamp,
    ) {
        let phase = STARTING_PHASES[random_generator.gen_range(STARTING_PHASES.len())];
        self.state.transition_to(State::ProbeBw(ProbeBwCycle {
            phase,
            phase_start: now,
        }));
    }

    /// Checks whether the current gain-cycle phase should advance, and does so
    ///
    /// `newly_lost_bytes` is this sample's loss count: in the high-gain phase a
    /// loss is itself sufficient evidence that the probe found the ceiling, even
    /// before in-flight data reaches the target BDP.
    pub(super) fn check_probe_bw_cycle_phase(&mut self, newly_lost_bytes: u64, now: Timestamp) {
        let cycle = match self.state {
            State::ProbeBw(cycle) => cycle,
            _ => return,
        };

        let min_rtt = self.data_volume_model.min_rtt().unwrap_or_default();
        if now.saturating_duration_since(cycle.phase_start) < min_rtt {
            return;
        }

        let bw = self.data_rate_model.bw();
        let should_advance = if cycle.is_high_gain_phase() {
            let target = self.inflight(bw, cycle.pacing_gain());
            self.bytes_in_flight >= target || newly_lost_bytes > 0
        } else if cycle.is_low_gain_phase() {
            let target = self.inflight(bw, Ratio::one());
            self.bytes_in_flight <= target
        } else {
            true
        };

        if should_advance {
            let next_phase = (cycle.phase + 1) % PACING_GAIN_CYCLE.len() as u8;
            self.state = State::ProbeBw(ProbeBwCycle {
                phase: next_phase,
                phase_start: now,
            });
        }
    }

    /// Inflight target based on the given bandwidth and gain, bound by the
    /// quantization budget
    #[inline]
    pub(super) fn inflight(&self, bw: Bandwidth, gain: Ratio<u64>) -> u32 {
        let bdp = if let Some(min_rtt) = self.data_volume_model.min_rtt() {
            gain.checked_mul(&(bw * min_rtt).into())
                .map_or(u64::MAX, |bdp| bdp.to_integer())
        } else {
            Self::initial_window(self.max_datagram_size) as u64
        };

        self.quantization_budget(bdp)
            .try_into()
            .unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_phases_exclude_the_drain_phase() {
        assert!(!STARTING_PHASES.contains(&1));
        assert_eq!(STARTING_PHASES.len(), 7);
    }

    #[test]
    fn gain_cycle_matches_spec_literal() {
        assert_eq!(PACING_GAIN_CYCLE[0], Ratio::new_raw(5, 4));
        assert_eq!(PACING_GAIN_CYCLE[1], Ratio::new_raw(3, 4));
        for gain in &PACING_GAIN_CYCLE[2..] {
            assert_eq!(*gain, Ratio::one());
        }
    }
}
