// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::recovery::bbr::BbrCongestionController;
use num_rational::Ratio;

/// The minimal cwnd BBR ever targets, expressed in packets
pub(crate) const MIN_PIPE_CWND_PACKETS: u16 = 4;

/// Methods for computing and applying the congestion window
impl BbrCongestionController {
    /// The number of TSO/GSO segments the pacer is currently bursting at once
    #[inline]
    fn tso_segs_goal(&self) -> u32 {
        (self.pacer.send_quantum() / self.max_datagram_size as usize).max(1) as u32
    }

    /// Calculates a bandwidth-delay product using the current model and the given gain
    #[inline]
    pub(super) fn bdp_multiple(&self, gain: Ratio<u64>) -> u64 {
        if let Some(min_rtt) = self.data_volume_model.min_rtt() {
            gain.checked_mul(&(self.data_rate_model.bw() * min_rtt).into())
                .map_or(u64::MAX, |bdp| bdp.to_integer())
        } else {
            Self::initial_window(self.max_datagram_size).into()
        }
    }

    /// How much data BBR wants in flight, based on the BDP and gain for the current mode
    #[inline]
    pub(super) fn target_cwnd(&self) -> u32 {
        let bdp = self.bdp_multiple(self.state.cwnd_gain());
        let inflight = bdp.saturating_add(self.data_volume_model.extra_acked());
        self.quantization_budget(inflight)
            .try_into()
            .unwrap_or(u32::MAX)
    }

    /// Rounds the inflight budget up to account for TSO/GSO bursting
    ///
    /// Adds `3 * tso_segs_goal`, rounds the result up to an even number of
    /// segments, and adds 2 more segments' worth when the gain cycle is in its
    /// high-gain phase (phase 0), which needs extra headroom to probe upward.
    #[inline]
    pub(super) fn quantization_budget(&self, inflight: u64) -> u64 {
        let segment = self.max_datagram_size as u64;
        let mut inflight = inflight.saturating_add(3 * self.tso_segs_goal() as u64 * segment);

        if (inflight / segment) % 2 != 0 {
            inflight = inflight.saturating_add(segment);
        }

        if self.state.is_probing_bw_high_gain_phase() {
            inflight = inflight.saturating_add(2 * segment);
        }

        inflight
    }

    /// The minimal cwnd value BBR targets
    #[inline]
    pub(super) fn minimum_window(&self) -> u32 {
        (MIN_PIPE_CWND_PACKETS * self.max_datagram_size) as u32
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-7.2
    //# Endpoints SHOULD use an initial congestion
    //# window of ten times the maximum datagram size (max_datagram_size),
    //# while limiting the window to the larger of 14,720 bytes or twice the
    //# maximum datagram size.
    #[inline]
    pub(super) fn initial_window(max_datagram_size: u16) -> u32 {
        const INITIAL_WINDOW_LIMIT: u32 = 14720;
        (10 * max_datagram_size as u32).min(INITIAL_WINDOW_LIMIT.max(2 * max_datagram_size as u32))
    }

    /// Updates the congestion window based on the latest model
    ///
    /// While the pipe hasn't been confirmed full, cwnd grows unconditionally by
    /// whatever was newly acked. Once full, growth is still by `newly_acked` but
    /// is never allowed to exceed `target_cwnd`. A single ack processed while
    /// `packet_conservation` holds (the round recovery was entered in) skips
    /// growth entirely.
    #[inline]
    pub(super) fn set_cwnd(&mut self, newly_acked: usize) {
        if self.packet_conservation {
            self.packet_conservation = false;
        } else {
            let target = self.target_cwnd();

            self.cwnd = if self.full_pipe_estimator.full_bw_reached() {
                self.cwnd
                    .saturating_add(newly_acked as u32)
                    .min(target)
            } else {
                self.cwnd.saturating_add(newly_acked as u32)
            };
        }

        if self.state.is_probing_rtt() {
            self.cwnd = self.cwnd.min(self.probe_rtt_cwnd());
        }

        self.cwnd = self.cwnd.max(self.minimum_window());
    }

    /// Saves the last-known good congestion window, unmodulated by loss recovery
    /// or PROBE_RTT
    #[inline]
    pub(super) fn save_cwnd(&mut self) {
        self.prior_cwnd = if !self.recovery_state.in_recovery() && !self.state.is_probing_rtt() {
            self.cwnd
        } else {
            self.prior_cwnd.max(self.cwnd)
        };
    }

    /// Restores the last-known good congestion window on exit from recovery or PROBE_RTT
    #[inline]
    pub(super) fn restore_cwnd(&mut self) {
        self.cwnd = self.cwnd.max(self.prior_cwnd);
    }

    /// Called when recovery is entered: checkpoints `prior_cwnd`, starts packet
    /// conservation for the current round, and cuts cwnd to the amount of data
    /// still in flight (plus one packet's worth, so a retransmission can go out)
    #[inline]
    pub(super) fn on_enter_recovery(&mut self, newly_acked: usize) {
        self.save_cwnd();
        self.packet_conservation = true;
        self.cwnd = (*self.bytes_in_flight)
            .saturating_add(newly_acked as u32)
            .max(self.minimum_window());
    }

    /// Called when recovery is exited: restores the last-known good window
    #[inline]
    pub(super) fn on_exit_recovery(&mut self) {
        self.restore_cwnd();
    }
}

impl super::State {
    /// True while the ProbeBw gain cycle is in its high pacing-gain phase (phase 0)
    #[inline]
    pub(crate) fn is_probing_bw_high_gain_phase(&self) -> bool {
        matches!(self, super::State::ProbeBw(cycle) if cycle.is_high_gain_phase())
    }
}

#[cfg(test)]
mod tests {
    use crate::recovery::bbr::cwnd::MIN_PIPE_CWND_PACKETS;

    #[test]
    fn minimum_window_packets_matches_spec() {
        assert_eq!(MIN_PIPE_CWND_PACKETS, 4);
    }
}
