// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{recovery::congestion_controller::CongestionAvoidanceState, time::Timestamp};

/// Allows a single packet to be transmitted immediately after entering recovery,
/// so a retransmission of the lost data isn't itself held up by the window cut
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FastRetransmission {
    Idle,
    RequiresTransmission,
}

/// Tracks whether the connection is currently in a loss-recovery episode
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum State {
    /// Not currently in recovery
    Recovered,
    /// Recovering
    ///
    /// If a packet sent after the `Timestamp` is acknowledged, recovery is exited.
    /// `FastRetransmission` allows one packet to be sent despite the cwnd cut that
    /// accompanies entering recovery. The trailing `bool` records whether this
    /// episode was entered from [`CongestionAvoidanceState::Loss`] (an RTO), as
    /// opposed to [`CongestionAvoidanceState::Recovery`] (fast retransmit).
    Recovering(Timestamp, FastRetransmission, bool),
}

impl Default for State {
    fn default() -> Self {
        State::Recovered
    }
}

impl State {
    /// True if a single packet may be transmitted despite a cwnd constraint
    #[inline]
    pub(crate) fn requires_fast_retransmission(&self) -> bool {
        matches!(
            self,
            State::Recovering(_, FastRetransmission::RequiresTransmission, _)
        )
    }

    /// Called when a packet is transmitted
    #[inline]
    pub(crate) fn on_packet_sent(&mut self) {
        if let State::Recovering(_, transmission @ FastRetransmission::RequiresTransmission, _) =
            self
        {
            *transmission = FastRetransmission::Idle;
        }
    }

    /// Called on each ack; returns `true` if the ack caused recovery to be exited
    #[inline]
    pub(crate) fn on_ack(&mut self, time_sent: Timestamp) -> bool {
        match self {
            State::Recovering(recovery_start_time, _, _) => {
                if time_sent > *recovery_start_time {
                    *self = State::Recovered;
                    return true;
                }
            }
            State::Recovered => {}
        }

        false
    }

    /// Called when the collaborator reports a new congestion-avoidance state;
    /// returns `true` if this caused recovery to be entered
    #[inline]
    pub(crate) fn on_congestion_event(
        &mut self,
        ca_state: CongestionAvoidanceState,
        now: Timestamp,
    ) -> bool {
        let entering_recovery = matches!(
            ca_state,
            CongestionAvoidanceState::Recovery | CongestionAvoidanceState::Loss
        );

        if entering_recovery && matches!(self, State::Recovered) {
            let is_rto = matches!(ca_state, CongestionAvoidanceState::Loss);
            *self = State::Recovering(now, FastRetransmission::RequiresTransmission, is_rto);
            return true;
        }

        false
    }

    #[inline]
    pub(crate) fn on_packet_discarded(&mut self) {
        if let State::Recovering(_, transmission @ FastRetransmission::RequiresTransmission, _) =
            self
        {
            *transmission = FastRetransmission::Idle;
        }
    }

    /// True if currently in recovery
    pub(crate) fn in_recovery(&self) -> bool {
        !matches!(self, State::Recovered)
    }

    /// True if the current (or most recently exited) recovery episode was
    /// entered from [`CongestionAvoidanceState::Loss`] (an RTO) rather than
    /// [`CongestionAvoidanceState::Recovery`] (fast retransmit)
    pub(crate) fn is_rto(&self) -> bool {
        matches!(self, State::Recovering(_, _, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{Clock as _, NoopClock};
    use core::time::Duration;

    #[test]
    fn recovered() {
        let state = State::Recovered;

        assert!(!state.in_recovery());
        assert!(!state.requires_fast_retransmission());
    }

    #[test]
    fn in_recovery() {
        let now = NoopClock.get_time();
        let state = State::Recovering(now, FastRetransmission::RequiresTransmission, false);

        assert!(state.in_recovery());
        assert!(state.requires_fast_retransmission());
    }

    #[test]
    fn state_transitions() {
        let now = NoopClock.get_time() + Duration::from_secs(10);
        let mut state = State::Recovered;

        assert!(!state.on_ack(now));
        assert_eq!(state, State::Recovered);

        assert!(state.on_congestion_event(CongestionAvoidanceState::Loss, now));
        assert_eq!(
            state,
            State::Recovering(now, FastRetransmission::RequiresTransmission, true)
        );
        assert!(state.requires_fast_retransmission());
        assert!(state.is_rto());

        state.on_packet_sent();
        assert!(!state.requires_fast_retransmission());

        let sent_time = now - Duration::from_secs(1);
        assert!(!state.on_ack(sent_time));
        assert_eq!(
            state,
            State::Recovering(now, FastRetransmission::Idle, true)
        );

        let sent_time = now + Duration::from_secs(1);
        assert!(state.on_ack(sent_time));
        assert_eq!(state, State::Recovered);
        assert!(!state.is_rto());

        let mut state = State::Recovering(now, FastRetransmission::RequiresTransmission, false);
        state.on_packet_discarded();
        assert_eq!(
            state,
            State::Recovering(now, FastRetransmission::Idle, false)
        );
        assert!(!state.is_rto());
    }

    #[test]
    fn fast_retransmit_entry_is_not_rto() {
        let now = NoopClock.get_time();
        let mut state = State::Recovered;

        assert!(state.on_congestion_event(CongestionAvoidanceState::Recovery, now));
        assert!(!state.is_rto());
    }

    #[test]
    fn open_state_does_not_enter_recovery() {
        let now = NoopClock.get_time();
        let mut state = State::Recovered;
        assert!(!state.on_congestion_event(CongestionAvoidanceState::Open, now));
        assert_eq!(state, State::Recovered);
    }
}
