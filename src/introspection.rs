// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Read-only introspection into the policer detector's current verdict.

use crate::{
    bandwidth::Bandwidth,
    recovery::{bbr::BbrCongestionController, pmodrl::Classification},
    time::Timestamp,
};

/// A point-in-time view of the detector, meant for operator tooling and
/// diagnostics. Carries no decision-making weight of its own; the control
/// loop consults the detector directly, never this struct.
#[derive(Clone, Copy, Debug, PartialEq)]
#[non_exhaustive]
pub struct Snapshot {
    /// Whether a token-bucket policer has been locked onto
    pub classification: Classification,
    /// When `classification` last became [`Classification::RateLimited`]
    pub detected_time: Option<Timestamp>,
    /// Cumulative delivered bytes at the moment of detection
    pub detected_bytes_acked: u64,
    /// The winning candidate's bucket size, in bytes
    pub bucket_size: u64,
    /// The winning candidate's sustained rate
    pub sustained_rate: Bandwidth,
    /// The reason code recorded on the last forced disclassification, if any.
    /// Diagnostic only: no decision branch in the detector reads this back.
    pub last_reset_reason: Option<u32>,
}

impl BbrCongestionController {
    /// Takes a read-only snapshot of the detector's current verdict
    pub fn snapshot(&self) -> Snapshot {
        let detector = self.pmodrl();
        let (bucket_size, sustained_rate) = detector.best();

        Snapshot {
            classification: detector.classification(),
            detected_time: detector.detected_time(),
            detected_bytes_acked: detector.detected_bytes_acked(),
            bucket_size,
            sustained_rate,
            last_reset_reason: detector.last_reset_reason(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        recovery::congestion_controller::PathInfo,
        time::clock::{testing::Clock, Clock as _},
    };
    use alloc::sync::Arc;

    #[test]
    fn starts_unclassified() {
        let now = Clock::default().get_time();
        let bbr = BbrCongestionController::new(
            PathInfo {
                max_datagram_size: 1200,
            },
            Arc::new(Config::default()),
            now,
        );

        let snapshot = bbr.snapshot();
        assert_eq!(snapshot.classification, Classification::Unclassified);
        assert_eq!(snapshot.detected_time, None);
        assert_eq!(snapshot.detected_bytes_acked, 0);
        assert_eq!(snapshot.last_reset_reason, None);
    }
}
