// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    bandwidth::{Bandwidth, PacketInfo, RateSample},
    random,
    time::Timestamp,
};
use core::fmt::Debug;
use num_rational::Ratio;

/// Scalars the transport hands the controller at construction time
///
/// Everything the controller needs beyond this (MSS, current cwnd clamp, the
/// active congestion-avoidance state) arrives per-sample instead, since those
/// values can change over the life of the connection while this does not.
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct PathInfo {
    pub max_datagram_size: u16,
}

/// The collaborator's congestion-avoidance state, reported alongside a sample.
///
/// Mirrors a standard TCP sender's CA state machine; the controller only acts on
/// transitions into and out of `Recovery` and `Loss`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CongestionAvoidanceState {
    Open,
    Disorder,
    Cwr,
    Recovery,
    Loss,
}

/// The read-only event-callback surface: introspection and diagnostic logging,
/// never a decision point for the control loop itself.
pub trait Publisher {
    /// Invoked when the BBR state machine transitions
    fn on_bbr_state_changed(&mut self, state: crate::recovery::bbr::State);
    /// Invoked when a new delivery-rate sample has been processed
    fn on_delivery_rate_sampled(&mut self, rate_sample: RateSample);
    /// Invoked when the pacing rate changes
    fn on_pacing_rate_updated(&mut self, pacing_rate: Bandwidth, pacing_gain: Ratio<u64>);
    /// Invoked when the detector's classification changes
    fn on_detector_classified(&mut self, classification: crate::recovery::pmodrl::Classification);
}

/// A `Publisher` that discards every event
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    fn on_bbr_state_changed(&mut self, _state: crate::recovery::bbr::State) {}
    fn on_delivery_rate_sampled(&mut self, _rate_sample: RateSample) {}
    fn on_pacing_rate_updated(&mut self, _pacing_rate: Bandwidth, _pacing_gain: Ratio<u64>) {}
    fn on_detector_classified(&mut self, _classification: crate::recovery::pmodrl::Classification) {
    }
}

/// A `Publisher` that emits `tracing` debug events, gated at runtime by
/// `Config::enable_printk`
#[derive(Clone, Copy, Debug)]
pub struct TracingPublisher<'a> {
    pub config: &'a crate::config::Config,
}

impl<'a> Publisher for TracingPublisher<'a> {
    fn on_bbr_state_changed(&mut self, state: crate::recovery::bbr::State) {
        crate::printk!(self.config, "bbr state changed: {state:?}");
    }

    fn on_delivery_rate_sampled(&mut self, rate_sample: RateSample) {
        crate::printk!(self.config, "delivery rate sampled: {rate_sample:?}");
    }

    fn on_pacing_rate_updated(&mut self, pacing_rate: Bandwidth, pacing_gain: Ratio<u64>) {
        crate::printk!(
            self.config,
            "pacing rate updated: {pacing_rate:?} gain={pacing_gain:?}"
        );
    }

    fn on_detector_classified(&mut self, classification: crate::recovery::pmodrl::Classification) {
        crate::printk!(self.config, "detector classified: {classification:?}");
    }
}

/// An algorithm for controlling congestion.
pub trait CongestionController: Debug {
    /// Returns the size of the current congestion window in bytes
    fn congestion_window(&self) -> u32;

    /// Returns the current pacing rate
    fn pacing_rate(&self) -> Bandwidth;

    /// Returns the TSO/GSO send-quantum target, in bytes
    fn send_quantum(&self) -> usize;

    /// Returns `true` if the current state of the congestion controller requires
    /// a packet to be transmitted without respecting the available congestion
    /// window
    fn requires_fast_retransmission(&self) -> bool;

    /// Invoked when a packet is sent
    fn on_packet_sent<Pub: Publisher>(
        &mut self,
        time_sent: Timestamp,
        sent_bytes: usize,
        app_limited: Option<bool>,
        publisher: &mut Pub,
    ) -> PacketInfo;

    /// Invoked each time a round-trip-time sample becomes available
    fn on_rtt_sample(&mut self, rtt: core::time::Duration, now: Timestamp);

    /// Invoked when an acknowledgement of one or more previously unacknowledged
    /// packets is received
    fn on_ack<Pub: Publisher>(
        &mut self,
        newest_acked_packet_info: PacketInfo,
        sample: AckSample,
        random_generator: &mut dyn random::Generator,
        ack_receive_time: Timestamp,
        publisher: &mut Pub,
    );

    /// Invoked when a packet is declared lost
    fn on_packet_lost<Pub: Publisher>(
        &mut self,
        lost_bytes: u32,
        new_loss_burst: bool,
        timestamp: Timestamp,
        publisher: &mut Pub,
    );

    /// Invoked when the collaborator's congestion-avoidance state changes
    fn on_congestion_event<Pub: Publisher>(
        &mut self,
        state: CongestionAvoidanceState,
        now: Timestamp,
        publisher: &mut Pub,
    ) -> u32;

    /// Invoked for each packet discarded when a packet number space is discarded
    fn on_packet_discarded(&mut self, bytes_sent: usize);
}

/// Per-sample scalars the control loop folds into a [`crate::bandwidth::RateSample`]
///
/// These are the counters the spec lists as "consumed from transport per sample":
/// everything needed to compute a delivery-rate sample plus the loss accounting
/// the detector needs.
#[derive(Clone, Copy, Debug)]
pub struct AckSample {
    pub delivered_bytes: u64,
    pub lost_bytes: u64,
    pub newly_lost_bytes: u64,
    pub bytes_in_flight: u32,
    pub is_app_limited: bool,
    pub is_ack_delayed: bool,
    pub rtt: core::time::Duration,
    /// Highest acknowledged send sequence number, in bytes
    ///
    /// Forward progress only: unlike `delivered_bytes`, this never double-counts
    /// a retransmission's redelivery. Used in place of `delivered_bytes` as the
    /// detector's delivery counter when [`crate::config::Config::use_goodput`]
    /// is set.
    pub snd_una: u64,
    /// Whether this sample's send was limited by the receiver's advertised
    /// window rather than the congestion window or application data
    pub is_rwnd_limited: bool,
}
