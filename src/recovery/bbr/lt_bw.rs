// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{bandwidth::Bandwidth, time::Timestamp};
use core::time::Duration;

/// Minimum number of packet-timed rounds an interval must span before it can close
const MIN_SAMPLE_ROUNDS: u32 = 4;

/// An interval that hasn't closed within this many rounds is abandoned
const MAX_SAMPLE_ROUNDS: u32 = 16;

/// An interval only counts as evidence of policing if at least this fraction of
/// its bytes were lost (20%, expressed as a ratio to avoid floating point)
const LOSS_RATE_THRESHOLD_NUM: u64 = 1;
const LOSS_RATE_THRESHOLD_DEN: u64 = 5;

/// Two candidate rates agree if they're within `lt_bw / 8` of each other
const RELATIVE_AGREEMENT_DIVISOR: u64 = 8;

/// ...or within this absolute margin, which matters when `lt_bw` itself is small
const ABSOLUTE_AGREEMENT_MARGIN: Bandwidth = Bandwidth::from_bits_per_second(4_000);

/// While using the long-term estimate, give up and resume normal probing after
/// this many rounds in case the policer has gone away
const LT_BW_RESET_ROUNDS: u32 = 48;

#[derive(Clone, Copy, Debug)]
struct Sample {
    started_at: Timestamp,
    delivered_bytes: u64,
    lost_bytes: u64,
    rounds: u32,
}

/// Detects a token-bucket policer by looking for two consecutive intervals of
/// consistent throughput under sustained high loss
///
/// Mirrors the "bw_latest"-style congestion state: it samples across a window of
/// several round trips rather than reacting to any single ACK.
#[derive(Clone, Debug, Default)]
pub(crate) struct Estimator {
    sample: Option<Sample>,
    candidate_bw: Option<Bandwidth>,
    lt_bw: Option<Bandwidth>,
    use_bw: bool,
    rounds_since_commit: u32,
}

impl Estimator {
    /// The committed long-term bandwidth estimate, if a policer has been detected
    #[inline]
    pub(crate) fn lt_bw(&self) -> Option<Bandwidth> {
        self.lt_bw.filter(|_| self.use_bw)
    }

    /// True while the model should pace at `lt_bw` instead of the windowed-max filter
    #[inline]
    pub(crate) fn use_bw(&self) -> bool {
        self.use_bw
    }

    /// Feeds a new rate sample into the estimator
    ///
    /// `delivered_bytes`/`lost_bytes` are the connection's running totals (not
    /// this sample's delta), matching what the snapshot-and-diff algorithm needs.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn on_ack(
        &mut self,
        now: Timestamp,
        delivered_bytes: u64,
        lost_bytes: u64,
        newly_lost_bytes: u64,
        is_app_limited: bool,
        round_start: bool,
        is_probing_bw: bool,
    ) {
        if self.use_bw {
            if is_probing_bw && round_start {
                self.rounds_since_commit += 1;
                if self.rounds_since_commit >= LT_BW_RESET_ROUNDS {
                    self.reset();
                }
            }
            return;
        }

        if is_app_limited {
            self.sample = None;
            return;
        }

        let Some(sample) = self.sample.as_mut() else {
            if newly_lost_bytes > 0 {
                self.sample = Some(Sample {
                    started_at: now,
                    delivered_bytes,
                    lost_bytes,
                    rounds: 0,
                });
            }
            return;
        };

        if round_start {
            sample.rounds += 1;
        }

        if sample.rounds > MAX_SAMPLE_ROUNDS {
            self.sample = None;
            return;
        }

        if sample.rounds < MIN_SAMPLE_ROUNDS || newly_lost_bytes == 0 {
            return;
        }

        let interval_delivered = delivered_bytes.saturating_sub(sample.delivered_bytes);
        let interval_lost = lost_bytes.saturating_sub(sample.lost_bytes);
        let total = interval_delivered.saturating_add(interval_lost);

        if total == 0 || interval_lost * LOSS_RATE_THRESHOLD_DEN < total * LOSS_RATE_THRESHOLD_NUM
        {
            // loss rate below threshold; this interval isn't evidence of policing,
            // but keep collecting in case a later loss within the window qualifies
            return;
        }

        let elapsed = now.saturating_duration_since(sample.started_at);
        let interval_bw = Bandwidth::new(interval_delivered, elapsed);
        let started_at = now;
        self.sample = None;

        match self.candidate_bw {
            Some(prev) if Self::agrees(prev, interval_bw) => {
                self.lt_bw = Some(Self::average(prev, interval_bw));
                self.use_bw = true;
                self.rounds_since_commit = 0;
                self.candidate_bw = None;
            }
            _ => {
                self.candidate_bw = Some(interval_bw);
                self.sample = Some(Sample {
                    started_at,
                    delivered_bytes,
                    lost_bytes,
                    rounds: 0,
                });
            }
        }
    }

    /// Whether two consecutive interval estimates agree closely enough to commit
    fn agrees(prev: Bandwidth, cur: Bandwidth) -> bool {
        let diff = prev.bits_per_second().abs_diff(cur.bits_per_second());
        diff <= prev.bits_per_second() / RELATIVE_AGREEMENT_DIVISOR
            || diff <= ABSOLUTE_AGREEMENT_MARGIN.bits_per_second()
    }

    fn average(a: Bandwidth, b: Bandwidth) -> Bandwidth {
        Bandwidth::from_bits_per_second(
            (a.bits_per_second().saturating_add(b.bits_per_second())) / 2,
        )
    }

    /// Clears the estimator, resuming ordinary windowed-max bandwidth behavior
    pub(crate) fn reset(&mut self) {
        self.sample = None;
        self.candidate_bw = None;
        self.lt_bw = None;
        self.use_bw = false;
        self.rounds_since_commit = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{Clock, NoopClock};

    fn rounds(
        est: &mut Estimator,
        now: &mut Timestamp,
        delivered: &mut u64,
        lost: &mut u64,
        per_round_delivered: u64,
        per_round_lost: u64,
        count: u32,
        interval: Duration,
    ) {
        for _ in 0..count {
            *now = *now + interval;
            *delivered += per_round_delivered;
            *lost += per_round_lost;
            est.on_ack(*now, *delivered, *lost, per_round_lost, false, true, false);
        }
    }

    #[test]
    fn commits_after_two_agreeing_intervals() {
        let mut est = Estimator::default();
        let mut now = NoopClock.get_time();
        let mut delivered = 0u64;
        let mut lost = 0u64;

        // first interval: ~20% loss sustained over several rounds
        rounds(
            &mut est,
            &mut now,
            &mut delivered,
            &mut lost,
            400,
            100,
            8,
            Duration::from_millis(10),
        );

        assert!(!est.use_bw());

        rounds(
            &mut est,
            &mut now,
            &mut delivered,
            &mut lost,
            400,
            100,
            8,
            Duration::from_millis(10),
        );

        assert!(est.use_bw());
        assert!(est.lt_bw().is_some());
    }

    #[test]
    fn app_limited_interval_is_discarded() {
        let mut est = Estimator::default();
        let now = NoopClock.get_time();
        est.on_ack(now, 100, 50, 50, false, true, false);
        assert!(est.sample.is_some());

        let later = now + Duration::from_millis(10);
        est.on_ack(later, 200, 60, 10, true, true, false);
        assert!(est.sample.is_none());
    }

    #[test]
    fn resets_after_48_rounds_of_use() {
        let mut est = Estimator::default();
        est.lt_bw = Some(Bandwidth::new(1_000, Duration::from_secs(1)));
        est.use_bw = true;
        let now = NoopClock.get_time();

        for _ in 0..LT_BW_RESET_ROUNDS {
            est.on_ack(now, 0, 0, 0, false, true, true);
        }

        assert!(!est.use_bw());
        assert!(est.lt_bw().is_none());
    }
}
