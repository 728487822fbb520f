// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::bandwidth::PacketInfo;

/// Counts "packet-timed" round trips: a round starts at the transmission of some
/// segment and ends at the acknowledgement of that segment. Several parts of the
/// model (the bw filter horizon, the LT estimator, the gain cycle) are driven by
/// this count rather than by wall-clock time.
#[derive(Clone, Debug, Default)]
pub(crate) struct Counter {
    /// The `delivered_bytes` at which the next round begins
    next_round_delivered_bytes: u64,
    /// True if the current ack being processed started a new round
    round_start: bool,
    /// The number of rounds counted since initialization
    round_count: u64,
}

impl Counter {
    /// Called for each acknowledgement of one or more packets
    pub fn on_ack(&mut self, packet_info: PacketInfo, delivered_bytes: u64) {
        if packet_info.delivered_bytes >= self.next_round_delivered_bytes {
            self.start(delivered_bytes);
            self.round_count += 1;
            self.round_start = true;
        } else {
            self.round_start = false;
        }
    }

    /// Starts a round that ends when the packet sent with `delivered_bytes` is acked
    pub fn start(&mut self, delivered_bytes: u64) {
        self.next_round_delivered_bytes = delivered_bytes;
    }

    /// True if the latest acknowledgement started a new round, false otherwise
    pub fn round_start(&self) -> bool {
        self.round_start
    }

    /// The number of rounds counted since initialization
    pub fn round_count(&self) -> u64 {
        self.round_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{Clock, NoopClock};

    fn packet_info(delivered_bytes: u64) -> PacketInfo {
        PacketInfo {
            delivered_bytes,
            delivered_time: NoopClock.get_time(),
            lost_bytes: 0,
            first_sent_time: NoopClock.get_time(),
            bytes_in_flight: 0,
            is_app_limited: false,
        }
    }

    #[test]
    fn new_round_on_delivered_bytes_advance() {
        let mut counter = Counter::default();
        counter.start(1000);

        counter.on_ack(packet_info(500), 1100);
        assert!(!counter.round_start());
        assert_eq!(counter.round_count(), 0);

        counter.on_ack(packet_info(1000), 1200);
        assert!(counter.round_start());
        assert_eq!(counter.round_count(), 1);
    }
}
