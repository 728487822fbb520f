// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The bucket/rate detector ("R-TCP"/PMODRL) and its cap & probe controller
//!
//! Runs alongside BBR from the start of a transfer, fitting a family of
//! candidate `(bucket_size, sustained_rate)` pairs to the delivery/loss
//! signal and, once confident a token-bucket policer is present, capping the
//! pacing rate BBR would otherwise choose.

mod cap;
mod grid;
#[cfg(test)]
mod properties;

use crate::{bandwidth::Bandwidth, config::Config, time::Timestamp};
use cap::CapController;
use core::time::Duration;
use grid::Grid;
use num_rational::Ratio;

pub(crate) use cap::UpperBound;
pub(crate) use grid::{ABRUPT_DECREASE_THRESH_DEN, ABRUPT_DECREASE_THRESH_NUM};

/// Loss rate, at interval close, that arms the "bucket just emptied" hypothesis
const HIGH_LOSS_THRESHOLD: Ratio<u64> = Ratio::new_raw(50, 256);

/// How long after the loss counter first advances the detector arms itself,
/// expressed as a multiple of `min_rtt`
const ARM_DELAY_MIN_RTTS: u32 = 7;

/// How long the best candidate must remain unchanged before locking in,
/// expressed as a multiple of `min_rtt`
const STABILITY_MIN_RTTS: u32 = 10;

/// Whether the detector has locked onto a rate-limiting link
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// No verdict yet
    Unclassified,
    /// Locked: a token-bucket policer has been identified
    RateLimited,
    /// Previously `RateLimited`, since withdrawn (the "abrupt drop" evidence
    /// that justified the lock is no longer present)
    Disclassified,
}

/// The bucket/rate detector's full state for one connection
#[derive(Clone, Debug)]
pub(crate) struct Detector {
    grid: Grid,
    classify: Classification,
    /// Reason code (5-10) recorded on the last forced disclassification;
    /// introspection-only, never read back by any decision branch
    last_reset_reason: Option<u32>,

    high_loss_flag: bool,
    loss_start_time: Option<Timestamp>,
    before_loss_delivered: u64,
    before_loss_time: Option<Timestamp>,
    before_loss_lost: u64,
    bef_empty_goodput: Bandwidth,

    bbr_start: Timestamp,
    transfer_start_delivered: u64,
    transfer_start_lost: u64,

    best_stable_since: Option<Timestamp>,
    mem: (u64, Bandwidth),

    detected_time: Option<Timestamp>,
    detected_bytes_acked: u64,
    reset_ltbw_flag: bool,

    cap: CapController,
}

impl Detector {
    pub(crate) fn new(now: Timestamp, delivered: u64, lost: u64) -> Self {
        Self {
            grid: Grid::default(),
            classify: Classification::Unclassified,
            last_reset_reason: None,
            high_loss_flag: false,
            loss_start_time: None,
            before_loss_delivered: delivered,
            before_loss_time: Some(now),
            before_loss_lost: lost,
            bef_empty_goodput: Bandwidth::ZERO,
            bbr_start: now,
            transfer_start_delivered: delivered,
            transfer_start_lost: lost,
            best_stable_since: None,
            mem: (0, Bandwidth::ZERO),
            detected_time: None,
            detected_bytes_acked: 0,
            reset_ltbw_flag: false,
            cap: CapController::default(),
        }
    }

    pub(crate) fn classification(&self) -> Classification {
        self.classify
    }

    pub(crate) fn best(&self) -> (u64, Bandwidth) {
        self.grid.best()
    }

    pub(crate) fn detected_time(&self) -> Option<Timestamp> {
        self.detected_time
    }

    pub(crate) fn detected_bytes_acked(&self) -> u64 {
        self.detected_bytes_acked
    }

    /// Elapsed time since this detection epoch began, the `flow_len` input to
    /// [`grid::Grid::select_best`]
    pub(crate) fn flow_len(&self, now: Timestamp) -> Duration {
        now.saturating_duration_since(self.bbr_start)
    }

    /// Consumes the one-shot "cancel the LT estimator" signal raised the
    /// first time this epoch locks `classify = RateLimited`
    pub(crate) fn take_reset_ltbw_flag(&mut self) -> bool {
        core::mem::take(&mut self.reset_ltbw_flag)
    }

    /// Step 1 — pre-empty snapshot
    ///
    /// `loss_advanced` is whether the transport's cumulative loss counter grew
    /// relative to the prior sample.
    pub(crate) fn on_pre_empty_sample(
        &mut self,
        now: Timestamp,
        delivered: u64,
        lost: u64,
        loss_advanced: bool,
    ) {
        if !loss_advanced {
            self.before_loss_delivered = delivered;
            self.before_loss_time = Some(now);
            self.before_loss_lost = lost;
        } else if self.loss_start_time.is_none() {
            self.loss_start_time = Some(now);
        }
    }

    /// Step 2 — arm on sustained loss
    ///
    /// Returns `true` iff this call armed `high_loss_flag` and (re)seeded the
    /// candidate grid.
    pub(crate) fn try_arm(
        &mut self,
        now: Timestamp,
        cur_delivered: u64,
        cur_lost: u64,
        min_rtt: Duration,
    ) -> bool {
        let Some(loss_start) = self.loss_start_time else {
            return false;
        };

        if now.saturating_duration_since(loss_start) < min_rtt * ARM_DELAY_MIN_RTTS {
            return false;
        }

        let d = cur_delivered.saturating_sub(self.before_loss_delivered);
        let l = cur_lost.saturating_sub(self.before_loss_lost);
        if d + l == 0 || Ratio::new(l, d + l) < HIGH_LOSS_THRESHOLD {
            self.loss_start_time = None;
            return false;
        }

        self.high_loss_flag = true;
        let before_loss_elapsed = self
            .before_loss_time
            .map(|t| t.saturating_duration_since(self.bbr_start))
            .unwrap_or_default();
        self.bef_empty_goodput = Bandwidth::new(self.before_loss_delivered, before_loss_elapsed);

        self.grid = Grid::new(self.before_loss_delivered);
        self.grid.refine(self.before_loss_delivered, before_loss_elapsed);
        true
    }

    /// Step 3 — per-sample refinement, once armed
    pub(crate) fn refine(&mut self, now: Timestamp, cur_delivered: u64) {
        if self.high_loss_flag {
            self.grid
                .refine(cur_delivered, now.saturating_duration_since(self.bbr_start));
        }
    }

    /// Step 4 + step 5 — best-candidate selection and classification
    pub(crate) fn classify(
        &mut self,
        now: Timestamp,
        min_rtt: Duration,
        flow_len: Duration,
        delivered_bytes: u64,
        disclassify_reason: u32,
    ) -> Classification {
        if !self.high_loss_flag {
            return self.classify;
        }

        let best_index = self.grid.select_best(flow_len);
        let (best_b, best_r) = self.grid.candidate(best_index);

        let abrupt_decrease = best_r.bits_per_second() * ABRUPT_DECREASE_THRESH_DEN
            <= ABRUPT_DECREASE_THRESH_NUM * self.bef_empty_goodput.bits_per_second();

        match self.classify {
            Classification::RateLimited if !abrupt_decrease => {
                self.classify = Classification::Disclassified;
                self.last_reset_reason = Some(disclassify_reason);
            }
            Classification::Unclassified if abrupt_decrease => {
                if (best_b, best_r) == self.mem {
                    match self.best_stable_since {
                        Some(since)
                            if now.saturating_duration_since(since)
                                > min_rtt * STABILITY_MIN_RTTS =>
                        {
                            self.classify = Classification::RateLimited;
                            self.cap.activate();
                            self.detected_time = Some(now);
                            self.detected_bytes_acked = delivered_bytes;
                            self.reset_ltbw_flag = true;
                        }
                        Some(_) => {}
                        None => self.best_stable_since = Some(now),
                    }
                } else {
                    self.mem = (best_b, best_r);
                    self.best_stable_since = Some(now);
                }
            }
            _ => {}
        }

        self.classify
    }

    /// The pacing rate BBR would otherwise use, ceilinged by the cap
    /// controller while `classify = RateLimited` and the master enable is on
    pub(crate) fn cap_pacing_rate(&self, bbr_rate: Bandwidth, config: &Config) -> Bandwidth {
        if self.classify != Classification::RateLimited || !config.optimize_flag() {
            return bbr_rate;
        }

        let (_, best_r) = self.grid.best();
        bbr_rate.min(self.cap.cap_rate(best_r, config))
    }

    /// Called once per round while in PROBE_BW; returns `true` if a probe
    /// just started and the gain cycle should be forced back to phase 0
    pub(crate) fn on_round_start(&mut self, config: &Config) -> bool {
        if self.classify != Classification::RateLimited {
            return false;
        }

        let best = self.grid.best();
        self.cap.on_round_start(best, &mut self.mem, config)
    }

    pub(crate) fn upper_bound(&self) -> UpperBound {
        self.cap.upper_bound()
    }

    /// Called on idle-restart (TX-start while app-limited): rebases the
    /// detection epoch without touching the classification already reached
    pub(crate) fn on_idle_restart(&mut self, now: Timestamp, delivered: u64, lost: u64) {
        self.bbr_start = now;
        self.transfer_start_delivered = delivered;
        self.transfer_start_lost = lost;
    }

    /// Resets for a brand-new detection epoch (loss-entry / spurious-loss
    /// undo / the `exclude_*` config triggers), dropping back to
    /// `Unclassified` with no memory of the prior verdict's reason
    pub(crate) fn reset(&mut self, now: Timestamp, delivered: u64, lost: u64) {
        *self = Self::new(now, delivered, lost);
    }

    #[cfg(test)]
    pub(crate) fn transfer_start(&self) -> (u64, u64) {
        (self.transfer_start_delivered, self.transfer_start_lost)
    }

    /// Reason code (5-10) recorded on the last forced disclassification, if any
    pub(crate) fn last_reset_reason(&self) -> Option<u32> {
        self.last_reset_reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(ms: u64) -> Timestamp {
        Timestamp::from_duration(Duration::from_millis(ms))
    }

    #[test]
    fn classify_never_reverts_from_rate_limited_to_unclassified() {
        let config = Config::default();
        let min_rtt = Duration::from_millis(50);
        let mut detector = Detector::new(ts(0), 0, 0);

        // Drive the detector into RateLimited by holding the same candidate
        // stable for longer than the stability window.
        detector.on_pre_empty_sample(ts(10), 1_000, 0, false);
        detector.on_pre_empty_sample(ts(20), 1_000, 1, true);
        assert!(detector.try_arm(ts(400), 1_300, 300, min_rtt));

        let mut now = ts(400);
        let mut classification = Classification::Unclassified;
        for _ in 0..20 {
            now = now + Duration::from_millis(100);
            classification = detector.classify(now, min_rtt, Duration::from_secs(5), 1_300, 2);
        }

        assert_eq!(classification, Classification::RateLimited);

        // The only legal transition out of RateLimited is to Disclassified;
        // a weakened abrupt-decrease signal must never fall back to
        // Unclassified.
        detector.classify = Classification::RateLimited;
        let weak = detector.classify(
            now + Duration::from_secs(1),
            min_rtt,
            Duration::from_secs(5),
            1_300,
            2,
        );
        assert!(matches!(
            weak,
            Classification::RateLimited | Classification::Disclassified
        ));
    }

    #[test]
    fn idle_restart_rebases_epoch_without_losing_classification() {
        let mut detector = Detector::new(ts(0), 0, 0);
        detector.classify = Classification::RateLimited;

        detector.on_idle_restart(ts(1_000), 5_000, 10);

        assert_eq!(detector.transfer_start(), (5_000, 10));
        assert_eq!(detector.classification(), Classification::RateLimited);
    }

    #[test]
    fn reset_drops_to_unclassified_and_preserves_no_reason() {
        let mut detector = Detector::new(ts(0), 0, 0);
        detector.classify = Classification::Disclassified;
        detector.last_reset_reason = Some(6);

        detector.reset(ts(1_000), 0, 0);

        assert_eq!(detector.classification(), Classification::Unclassified);
        assert_eq!(detector.last_reset_reason(), None);
    }
}
