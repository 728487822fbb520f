// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Bandwidth and delivery-rate sampling
//!
//! `Bandwidth` centralizes every bits-per-second conversion the control loop needs
//! so scale factors (bytes vs bits, micros vs seconds) are handled once, at this
//! boundary, rather than by each caller shifting raw integers.

use crate::time::Timestamp;
use core::time::Duration;
use num_rational::Ratio;
use num_traits::{CheckedMul, One};

const MICRO_BITS_PER_BYTE: u64 = 8_000_000;

/// A rate of data transfer, represented as bits per second
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bandwidth(u64);

impl Bandwidth {
    pub const ZERO: Bandwidth = Bandwidth(0);
    pub const INFINITE: Bandwidth = Bandwidth(u64::MAX);

    /// Constructs a `Bandwidth` from a byte count delivered over `interval`
    ///
    /// Returns `Bandwidth::ZERO` if `interval` is zero, rather than dividing by
    /// zero or panicking: an instantaneous "sample" over no elapsed time carries
    /// no rate information.
    #[inline]
    pub fn new(bytes: u64, interval: Duration) -> Self {
        if interval.is_zero() {
            return Bandwidth::ZERO;
        }

        let micros = interval.as_micros() as u64;

        bytes
            .checked_mul(MICRO_BITS_PER_BYTE)
            .map(|bits| Bandwidth(bits / micros))
            .unwrap_or(Bandwidth::INFINITE)
    }

    /// Constructs a `Bandwidth` directly from a bits-per-second value
    #[inline]
    pub const fn from_bits_per_second(bits_per_second: u64) -> Self {
        Bandwidth(bits_per_second)
    }

    #[inline]
    pub const fn bits_per_second(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl core::ops::Mul<Ratio<u64>> for Bandwidth {
    type Output = Bandwidth;

    #[inline]
    fn mul(self, rhs: Ratio<u64>) -> Self::Output {
        Ratio::from_integer(self.0)
            .checked_mul(&rhs)
            .map(|result| Bandwidth(result.to_integer()))
            .unwrap_or(Bandwidth::INFINITE)
    }
}

impl core::ops::Mul<Duration> for Bandwidth {
    type Output = Ratio<u64>;

    /// Multiplying a `Bandwidth` by a `Duration` yields a byte count (still as a
    /// `Ratio` so the caller can choose how to round)
    #[inline]
    fn mul(self, rhs: Duration) -> Self::Output {
        let micros = rhs.as_micros() as u64;
        Ratio::new_raw(self.0, MICRO_BITS_PER_BYTE) * Ratio::from_integer(micros)
    }
}

impl From<Ratio<u64>> for Bandwidth {
    #[inline]
    fn from(ratio: Ratio<u64>) -> Self {
        Bandwidth(ratio.to_integer())
    }
}

pub(crate) fn one() -> Ratio<u64> {
    Ratio::one()
}

/// The inputs needed to compute one delivery-rate sample, mirroring the fields a
/// transport-level ACK handler would already be tracking per in-flight packet
#[derive(Clone, Copy, Debug)]
pub struct PacketInfo {
    /// Total bytes delivered by the connection as of when this packet was sent
    pub delivered_bytes: u64,
    /// The time the `delivered_bytes` count was last updated
    pub delivered_time: Timestamp,
    /// Total bytes declared lost by the connection as of when this packet was sent
    pub lost_bytes: u64,
    /// The time this packet was sent
    pub first_sent_time: Timestamp,
    /// Bytes in flight at the time this packet was sent
    pub bytes_in_flight: u32,
    /// Whether the sender was application-limited when this packet was sent
    pub is_app_limited: bool,
}

/// One delivery-rate sample, produced when an acknowledgement is processed
#[derive(Clone, Copy, Debug, Default)]
pub struct RateSample {
    /// The delivery rate observed during the sample interval
    pub delivery_rate: Bandwidth,
    /// Whether the sample is valid (at least one newly-acked packet contributed)
    pub is_app_limited: bool,
    /// Round-trip time measured for the newly-acked packet with the largest
    /// `delivered_bytes` count
    pub interval: Duration,
    /// Bytes acknowledged during this sample
    pub delivered_bytes: u64,
    /// Bytes lost during this sample
    pub lost_bytes: u64,
    /// Bytes still in flight after this sample was taken
    pub bytes_in_flight: u32,
    /// Congestion-marked bytes observed during this sample
    pub ecn_ce_count: u64,
    /// True if this sample was taken while prior losses had not yet recovered
    pub is_cwnd_limited: bool,
}

impl RateSample {
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.interval > Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bandwidth_from_bytes() {
        let bw = Bandwidth::new(125_000, Duration::from_secs(1));
        assert_eq!(bw.bits_per_second(), 1_000_000_000);
    }

    #[test]
    fn bandwidth_zero_interval() {
        assert_eq!(Bandwidth::new(100, Duration::ZERO), Bandwidth::ZERO);
    }

    #[test]
    fn bandwidth_gain_multiply() {
        let bw = Bandwidth::new(125_000, Duration::from_secs(1));
        let doubled = bw * Ratio::new_raw(2, 1);
        assert_eq!(doubled.bits_per_second(), 2_000_000_000);
    }

    #[test]
    fn bandwidth_times_duration() {
        let bw = Bandwidth::new(125_000, Duration::from_secs(1));
        let bytes = (bw * Duration::from_secs(2)).to_integer();
        assert_eq!(bytes, 250_000);
    }
}
