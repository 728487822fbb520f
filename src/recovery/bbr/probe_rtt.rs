// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    random,
    recovery::bbr::{BbrCongestionController, State},
    time::Timestamp,
};
use core::time::Duration;

/// The minimum duration for which ProbeRTT state holds inflight at or below
/// [`MIN_CWND_PACKETS`]
pub(crate) const PROBE_RTT_DURATION: Duration = Duration::from_millis(200);

/// PROBE_RTT clamps the congestion window to this many packets, per the spec's
/// `bbr_cwnd_min_target`
pub(crate) const MIN_CWND_PACKETS: u16 = 4;

#[derive(Clone, Debug, Default)]
pub(crate) struct ProbeRttState {
    done_timestamp: Option<Timestamp>,
    round_done: bool,
}

/// Methods related to the ProbeRtt state
impl BbrCongestionController {
    /// Entered when the 10s min-RTT filter has expired, we're not idle-restarting,
    /// and we're not already in PROBE_RTT
    pub(super) fn check_probe_rtt(
        &mut self,
        random_generator: &mut dyn random::Generator,
        now: Timestamp,
    ) {
        if self.data_volume_model.probe_rtt_expired(now)
            && !self.idle_restart
            && !self.state.is_probing_rtt()
        {
            self.save_cwnd();
            self.probe_rtt_state = ProbeRttState::default();
            self.state.transition_to(State::ProbeRtt);
            self.round_counter.start(self.delivered_bytes);
        }

        if self.state.is_probing_rtt() {
            self.handle_probe_rtt(random_generator, now);
        }
    }

    fn handle_probe_rtt(&mut self, random_generator: &mut dyn random::Generator, now: Timestamp) {
        let bytes_in_flight = self.bytes_in_flight;
        let target = self.probe_rtt_cwnd();

        if self.probe_rtt_state.done_timestamp.is_none() && bytes_in_flight <= target {
            self.probe_rtt_state.done_timestamp = Some(now + PROBE_RTT_DURATION);
            self.probe_rtt_state.round_done = false;
            self.round_counter.start(self.delivered_bytes);
        } else if self.probe_rtt_state.done_timestamp.is_some() {
            if self.round_counter.round_start() {
                self.probe_rtt_state.round_done = true;
            }
            if self.probe_rtt_state.round_done {
                self.check_probe_rtt_done(random_generator, now);
            }
        }
    }

    fn check_probe_rtt_done(
        &mut self,
        random_generator: &mut dyn random::Generator,
        now: Timestamp,
    ) {
        let elapsed = self
            .probe_rtt_state
            .done_timestamp
            .map_or(false, |done| now >= done);

        if elapsed {
            self.data_volume_model.schedule_next_probe_rtt(now);
            self.restore_cwnd();
            self.exit_probe_rtt(random_generator, now);
        }
    }

    pub(super) fn exit_probe_rtt(&mut self, random_generator: &mut dyn random::Generator, now: Timestamp) {
        if self.full_pipe_estimator.full_bw_reached() {
            self.enter_probe_bw(random_generator, now);
        } else {
            self.enter_startup();
        }
    }

    /// Inflight bound while in PROBE_RTT: [`MIN_CWND_PACKETS`] packets' worth of bytes
    pub(crate) fn probe_rtt_cwnd(&self) -> u32 {
        (MIN_CWND_PACKETS as u32) * (self.max_datagram_size as u32)
    }
}
