// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{bandwidth::Bandwidth, time::Timestamp, windowed_filter::WindowedMaxFilter};
use core::time::Duration;

/// The min-RTT filter horizon; PROBE_RTT is entered once a sample has not
/// refreshed the minimum for this long
const MIN_RTT_FILTER_LEN: Duration = Duration::from_secs(10);

/// How many rounds the ACK-aggregation max filter retains its peak sample over
const EXTRA_ACKED_FILTER_LEN: u64 = 10;

/// Tracks the minimum observed RTT over a sliding window, and the volume of data
/// the network has been observed to deliver in excess of the bandwidth-delay
/// product (the "ACK aggregation" compensator)
#[derive(Clone, Debug)]
pub(crate) struct Model {
    min_rtt: Option<Duration>,
    min_rtt_stamp: Option<Timestamp>,
    extra_acked_filter: WindowedMaxFilter<u64, u64, u64>,
    ack_epoch_start: Option<Timestamp>,
    ack_epoch_acked: u64,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            min_rtt: None,
            min_rtt_stamp: None,
            extra_acked_filter: WindowedMaxFilter::new(EXTRA_ACKED_FILTER_LEN),
            ack_epoch_start: None,
            ack_epoch_acked: 0,
        }
    }
}

impl Model {
    /// The current minimum RTT sample, or `None` if no sample has been recorded
    #[inline]
    pub(crate) fn min_rtt(&self) -> Option<Duration> {
        self.min_rtt
    }

    /// True if the min-RTT filter has gone [`MIN_RTT_FILTER_LEN`] without a refresh
    #[inline]
    pub(crate) fn probe_rtt_expired(&self, now: Timestamp) -> bool {
        self.min_rtt_stamp.map_or(true, |stamp| {
            now.saturating_duration_since(stamp) >= MIN_RTT_FILTER_LEN
        })
    }

    /// Restarts the min-RTT filter's clock after a PROBE_RTT cycle completes,
    /// whether or not the round produced a lower sample
    #[inline]
    pub(crate) fn schedule_next_probe_rtt(&mut self, now: Timestamp) {
        self.min_rtt_stamp = Some(now);
    }

    /// Folds a new RTT sample into the min-RTT filter
    ///
    /// A sample that beats the current minimum always wins. Otherwise, the
    /// filter still adopts the sample if its window has expired, unless this
    /// particular ACK was delayed (a delayed ACK inflates the apparent RTT, so
    /// it shouldn't be allowed to reset the filter to a stale-but-higher value).
    #[inline]
    pub(crate) fn update_min_rtt(&mut self, rtt: Duration, now: Timestamp, is_ack_delayed: bool) {
        let beats_min = self.min_rtt.map_or(true, |min_rtt| rtt <= min_rtt);
        let expired = self.probe_rtt_expired(now);

        if beats_min || (expired && !is_ack_delayed) {
            self.min_rtt = Some(rtt);
            self.min_rtt_stamp = Some(now);
        }
    }

    /// The current ACK-aggregation extra-volume estimate, in bytes
    #[inline]
    pub(crate) fn extra_acked(&self) -> u64 {
        self.extra_acked_filter.value().unwrap_or(0)
    }

    /// Updates the ACK-aggregation compensator with a newly-acked byte count
    ///
    /// `expected = bw * epoch_interval` is what the model predicts should have
    /// been delivered over the current epoch at the modeled bandwidth; any acked
    /// volume beyond that is attributed to ACK aggregation (bursty acking caused
    /// by e.g. a cellular radio waking up), clamped to `cwnd` since the sender
    /// can never have more data outstanding than that.
    #[inline]
    pub(crate) fn update_ack_aggregation(
        &mut self,
        bw: Bandwidth,
        newly_acked_bytes: u64,
        cwnd: u32,
        round_count: u64,
        now: Timestamp,
    ) {
        let epoch_start = *self.ack_epoch_start.get_or_insert(now);
        let epoch_interval = now.saturating_duration_since(epoch_start);
        let expected_delivered = (bw * epoch_interval).to_integer();

        if self.ack_epoch_acked <= expected_delivered {
            self.ack_epoch_start = Some(now);
            self.ack_epoch_acked = newly_acked_bytes;
            return;
        }

        self.ack_epoch_acked = self.ack_epoch_acked.saturating_add(newly_acked_bytes);
        let extra = self
            .ack_epoch_acked
            .saturating_sub(expected_delivered)
            .min(cwnd as u64);

        self.extra_acked_filter.update(extra, round_count);
    }

    /// Resets the lower-bound bookkeeping on entry/exit of PROBE_RTT
    ///
    /// Currently a no-op: BBRv1's inflight lower bound is derived directly from
    /// the BDP rather than a tracked `inflight_lo` field (that bound is a BBRv2
    /// addition), but the hook is kept so callers don't need to know that.
    #[inline]
    pub(crate) fn reset_lower_bound(&mut self) {}

    /// Restarts the ACK-aggregation epoch, called on idle restart so a burst of
    /// acks for data sent before the idle period isn't mistaken for aggregation
    #[inline]
    pub(crate) fn restart_ack_epoch(&mut self, now: Timestamp) {
        self.ack_epoch_start = Some(now);
        self.ack_epoch_acked = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{Clock, NoopClock};

    #[test]
    fn min_rtt_adopts_lower_sample() {
        let mut model = Model::default();
        let now = NoopClock.get_time();
        model.update_min_rtt(Duration::from_millis(100), now, false);
        model.update_min_rtt(Duration::from_millis(50), now, false);
        assert_eq!(model.min_rtt(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn min_rtt_expires_after_window() {
        let mut model = Model::default();
        let now = NoopClock.get_time();
        model.update_min_rtt(Duration::from_millis(50), now, false);

        let later = now + MIN_RTT_FILTER_LEN + Duration::from_millis(1);
        assert!(model.probe_rtt_expired(later));

        model.update_min_rtt(Duration::from_millis(80), later, false);
        assert_eq!(model.min_rtt(), Some(Duration::from_millis(80)));
    }

    #[test]
    fn delayed_ack_does_not_force_expiry_adoption() {
        let mut model = Model::default();
        let now = NoopClock.get_time();
        model.update_min_rtt(Duration::from_millis(50), now, false);

        let later = now + MIN_RTT_FILTER_LEN + Duration::from_millis(1);
        model.update_min_rtt(Duration::from_millis(80), later, true);
        assert_eq!(model.min_rtt(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn ack_aggregation_tracks_excess_delivery() {
        let mut model = Model::default();
        let now = NoopClock.get_time();
        let bw = Bandwidth::new(1_000, Duration::from_secs(1));

        model.update_ack_aggregation(bw, 5_000, u32::MAX, 0, now);
        let later = now + Duration::from_secs(1);
        model.update_ack_aggregation(bw, 5_000, u32::MAX, 1, later);

        assert!(model.extra_acked() > 0);
    }
}
