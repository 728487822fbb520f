// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    bandwidth::Bandwidth, recovery::congestion_controller::Publisher, time::Duration,
};
use num_rational::Ratio;

/// Burst size cap for the TSO/GSO send quantum, expressed in packets
const MAX_BURST_PACKETS: usize = 10;

/// Tracks the current pacing rate and the TSO/GSO send quantum derived from it
///
/// Departure-time scheduling is left to the transport's own pacing timer; this
/// model only computes the *rate* the transport should pace at.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Pacer {
    pacing_rate: Bandwidth,
    send_quantum: usize,
}

impl Pacer {
    pub(super) fn new(max_datagram_size: u16, initial_cwnd: u32, initial_gain: Ratio<u64>) -> Self {
        let nominal_bandwidth = Bandwidth::new(initial_cwnd as u64, Duration::from_millis(1));
        let pacing_rate = Self::bandwidth_to_pacing_rate(nominal_bandwidth, initial_gain);

        Self {
            pacing_rate,
            send_quantum: Self::max_send_quantum(max_datagram_size),
        }
    }

    /// Sets the pacing rate, publishing the update iff it actually increased the
    /// rate or the pipe has been confirmed full (`filled_pipe`). This mirrors
    /// the "only move pacing rate up during Startup/Drain" rule: the model
    /// should never let a transient dip in the gain cycle slow the pacer below
    /// what was already confirmed achievable.
    #[inline]
    pub(super) fn set_pacing_rate<Pub: Publisher>(
        &mut self,
        bw: Bandwidth,
        gain: Ratio<u64>,
        filled_pipe: bool,
        publisher: &mut Pub,
    ) {
        let rate = Self::bandwidth_to_pacing_rate(bw, gain);

        if filled_pipe || rate > self.pacing_rate {
            self.pacing_rate = rate;
            publisher.on_pacing_rate_updated(rate, gain);
        }
    }

    /// Sets the maximum size of a data aggregate scheduled and transmitted together
    #[inline]
    pub(super) fn set_send_quantum(&mut self, max_datagram_size: u16) {
        // 1.2 Mbps
        const SEND_QUANTUM_THRESHOLD: Bandwidth =
            Bandwidth::from_bits_per_second(1_200_000);

        let floor = if self.pacing_rate < SEND_QUANTUM_THRESHOLD {
            max_datagram_size
        } else {
            max_datagram_size * 2
        } as usize;

        let send_quantum = (self.pacing_rate * Duration::from_millis(1)).to_integer() as usize;
        self.send_quantum = send_quantum
            .max(floor)
            .min(Self::max_send_quantum(max_datagram_size));
    }

    /// The pacing rate modeled by BBR, before any cap from the bucket detector
    #[inline]
    pub(super) fn pacing_rate(&self) -> Bandwidth {
        self.pacing_rate
    }

    /// Returns the maximum size of a data aggregate scheduled and transmitted together
    #[inline]
    pub(super) fn send_quantum(&self) -> usize {
        self.send_quantum
    }

    #[inline]
    fn max_send_quantum(max_datagram_size: u16) -> usize {
        MAX_BURST_PACKETS * max_datagram_size as usize
    }

    /// Applies the fixed 1% pacing margin: the target rate is 99% of modeled bandwidth
    #[inline]
    fn bandwidth_to_pacing_rate(bw: Bandwidth, gain: Ratio<u64>) -> Bandwidth {
        const PACING_MARGIN_PERCENT: u64 = 1;
        const PACING_RATIO: Ratio<u64> = Ratio::new_raw(100 - PACING_MARGIN_PERCENT, 100);

        bw * gain * PACING_RATIO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::congestion_controller::NoopPublisher;
    use num_traits::One;

    #[test]
    fn pacing_rate_applies_margin() {
        let mut pacer = Pacer::new(1200, 10 * 1200, Ratio::one());
        let bw = Bandwidth::new(125_000, Duration::from_secs(1));
        pacer.set_pacing_rate(bw, Ratio::one(), true, &mut NoopPublisher);

        // 99% of 1_000_000_000 bps
        assert_eq!(pacer.pacing_rate().bits_per_second(), 990_000_000);
    }

    #[test]
    fn pacing_rate_only_increases_without_filled_pipe() {
        let mut pacer = Pacer::new(1200, 10 * 1200, Ratio::one());
        let high = Bandwidth::new(1_000_000, Duration::from_secs(1));
        pacer.set_pacing_rate(high, Ratio::one(), false, &mut NoopPublisher);
        let after_high = pacer.pacing_rate();

        let low = Bandwidth::new(10, Duration::from_secs(1));
        pacer.set_pacing_rate(low, Ratio::one(), false, &mut NoopPublisher);

        assert_eq!(pacer.pacing_rate(), after_high);
    }

    #[test]
    fn send_quantum_floors_at_two_segments_above_threshold() {
        let mut pacer = Pacer::new(1200, 10 * 1200, Ratio::one());
        let bw = Bandwidth::new(10_000_000, Duration::from_secs(1));
        pacer.set_pacing_rate(bw, Ratio::one(), true, &mut NoopPublisher);
        pacer.set_send_quantum(1200);

        assert!(pacer.send_quantum() >= 2400);
    }
}
