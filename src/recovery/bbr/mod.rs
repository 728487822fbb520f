// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! BBRv1 sender-side congestion control, overlaid with a policer-aware pacing cap
//!
//! The control loop lives in [`BbrCongestionController`]'s [`CongestionController`]
//! impl below; everything else in this module tree is a piece of the model it
//! drives (the bottleneck-bandwidth/min-RTT path model, the four-mode state
//! machine, the long-term policed-bandwidth estimator) or a submodule's own
//! bookkeeping (round counting, recovery, the pacer).

mod cwnd;
mod data_rate;
mod data_volume;
mod drain;
mod full_pipe;
mod lt_bw;
mod pacing;
mod probe_bw;
mod probe_rtt;
mod recovery;
mod round;
mod startup;

use crate::{
    bandwidth::{Bandwidth, PacketInfo, RateSample},
    config::Config,
    counter::Counter,
    random,
    recovery::{
        congestion_controller::{
            AckSample, CongestionAvoidanceState, CongestionController, PathInfo, Publisher,
        },
        pmodrl,
    },
    time::Timestamp,
};
use alloc::sync::Arc;
use core::time::Duration;
use num_rational::Ratio;
use num_traits::One;
use pacing::Pacer;
use probe_bw::ProbeBwCycle;
use probe_rtt::ProbeRttState;

/// The four BBR operating modes
///
/// `ProbeBw` carries its gain-cycle phase inline since that's per-mode state
/// with no meaning outside it; `ProbeRtt`'s companion bookkeeping
/// ([`ProbeRttState`]) instead lives on [`BbrCongestionController`], since it
/// needs to survive a `transition_to` that doesn't otherwise touch it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Startup,
    Drain,
    ProbeBw(ProbeBwCycle),
    ProbeRtt,
}

impl State {
    #[inline]
    pub(crate) fn pacing_gain(self) -> Ratio<u64> {
        match self {
            State::Startup => startup::PACING_GAIN,
            State::Drain => drain::PACING_GAIN,
            State::ProbeBw(cycle) => cycle.pacing_gain(),
            State::ProbeRtt => Ratio::one(),
        }
    }

    #[inline]
    pub(crate) fn cwnd_gain(self) -> Ratio<u64> {
        match self {
            State::Startup => startup::CWND_GAIN,
            State::Drain => drain::CWND_GAIN,
            State::ProbeBw(_) => probe_bw::CWND_GAIN,
            State::ProbeRtt => Ratio::one(),
        }
    }

    #[inline]
    pub(crate) fn is_startup(self) -> bool {
        matches!(self, State::Startup)
    }

    #[inline]
    pub(crate) fn is_drain(self) -> bool {
        matches!(self, State::Drain)
    }

    #[inline]
    pub(crate) fn is_probing_bw(self) -> bool {
        matches!(self, State::ProbeBw(_))
    }

    #[inline]
    pub(crate) fn is_probing_rtt(self) -> bool {
        matches!(self, State::ProbeRtt)
    }

    #[inline]
    pub(crate) fn transition_to(&mut self, new_state: State) {
        *self = new_state;
    }
}

/// Tracks per-connection BBR state plus the bucket/rate detector that rides
/// alongside it
#[derive(Debug)]
pub struct BbrCongestionController {
    state: State,
    round_counter: round::Counter,
    full_pipe_estimator: full_pipe::Estimator,
    bytes_in_flight: Counter<u32>,
    cwnd: u32,
    prior_cwnd: u32,
    packet_conservation: bool,
    recovery_state: recovery::State,
    data_rate_model: data_rate::Model,
    data_volume_model: data_volume::Model,
    lt_bw_estimator: lt_bw::Estimator,
    pmodrl: pmodrl::Detector,
    max_datagram_size: u16,
    idle_restart: bool,
    pacer: Pacer,
    probe_rtt_state: ProbeRttState,
    /// Cumulative bytes delivered, mirrored from the newest [`AckSample`]
    delivered_bytes: u64,
    /// Time [`Self::delivered_bytes`] was last updated
    delivered_time: Timestamp,
    /// Cumulative bytes declared lost, mirrored from the newest [`AckSample`]
    lost_bytes: u64,
    config: Arc<Config>,
}

impl BbrCongestionController {
    /// Creates a new BBR congestion controller for a connection starting at `now`
    pub fn new(path_info: PathInfo, config: Arc<Config>, now: Timestamp) -> Self {
        let max_datagram_size = path_info.max_datagram_size;
        let initial_cwnd = Self::initial_window(max_datagram_size);

        Self {
            state: State::Startup,
            round_counter: round::Counter::default(),
            full_pipe_estimator: full_pipe::Estimator::default(),
            bytes_in_flight: Counter::default(),
            cwnd: initial_cwnd,
            prior_cwnd: 0,
            packet_conservation: false,
            recovery_state: recovery::State::default(),
            data_rate_model: data_rate::Model::default(),
            data_volume_model: data_volume::Model::default(),
            lt_bw_estimator: lt_bw::Estimator::default(),
            pmodrl: pmodrl::Detector::new(now, 0, 0),
            max_datagram_size,
            idle_restart: false,
            pacer: Pacer::new(max_datagram_size, initial_cwnd, startup::PACING_GAIN),
            probe_rtt_state: ProbeRttState::default(),
            delivered_bytes: 0,
            delivered_time: now,
            lost_bytes: 0,
            config,
        }
    }

    /// The detector's internal state, for introspection
    pub(crate) fn pmodrl(&self) -> &pmodrl::Detector {
        &self.pmodrl
    }

    /// The pacing gain to apply on top of [`Self::data_rate_model`]'s bandwidth
    ///
    /// Forced to 1.0 while the long-term policed-bandwidth estimate is in use:
    /// once `lt_bw` has been committed, the gain cycle's job of probing for
    /// more bandwidth no longer applies, and PROBE_BW's own phase gain would
    /// otherwise be layered on top of the already-conservative committed rate.
    #[inline]
    fn pacing_gain(&self) -> Ratio<u64> {
        if self.lt_bw_estimator.use_bw() {
            Ratio::one()
        } else {
            self.state.pacing_gain()
        }
    }

    /// The delivery counter fed into the bucket/rate detector: `snd_una/MSS`
    /// (forward-progress only, never inflated by a retransmission's redelivery)
    /// when `use_goodput` is set, else the raw `delivered_bytes` counter BBR's
    /// own bandwidth model uses.
    #[inline]
    fn detector_delivery_counter(&self, sample: &AckSample) -> u64 {
        if self.config.use_goodput() {
            sample.snd_una / u64::from(self.max_datagram_size.max(1))
        } else {
            sample.delivered_bytes
        }
    }

    /// Runs the idle-restart hook deferred from [`Self::on_packet_sent`] once a
    /// random generator and publisher are available again
    fn handle_deferred_idle_restart<Pub: Publisher>(
        &mut self,
        random_generator: &mut dyn random::Generator,
        now: Timestamp,
        publisher: &mut Pub,
    ) {
        if !self.idle_restart {
            return;
        }
        self.idle_restart = false;

        if self.state.is_probing_bw() {
            self.pacer
                .set_pacing_rate(self.data_rate_model.bw(), Ratio::one(), true, publisher);
        } else if self.state.is_probing_rtt() {
            self.restore_cwnd();
            self.exit_probe_rtt(random_generator, now);
        }
    }
}

impl CongestionController for BbrCongestionController {
    fn congestion_window(&self) -> u32 {
        self.cwnd
    }

    fn pacing_rate(&self) -> Bandwidth {
        self.pmodrl
            .cap_pacing_rate(self.pacer.pacing_rate(), &self.config)
    }

    fn send_quantum(&self) -> usize {
        self.pacer.send_quantum()
    }

    fn requires_fast_retransmission(&self) -> bool {
        self.recovery_state.requires_fast_retransmission()
    }

    fn on_packet_sent<Pub: Publisher>(
        &mut self,
        time_sent: Timestamp,
        sent_bytes: usize,
        app_limited: Option<bool>,
        _publisher: &mut Pub,
    ) -> PacketInfo {
        self.recovery_state.on_packet_sent();

        // Restarting from idle while app-limited; the rest of the hook (repacing,
        // finalizing a PROBE_RTT exit) needs a random generator, so it's deferred
        // to the next `on_ack`.
        if *self.bytes_in_flight == 0 && app_limited.unwrap_or(false) {
            self.idle_restart = true;
            self.data_volume_model.restart_ack_epoch(time_sent);
            self.pmodrl
                .on_idle_restart(time_sent, self.delivered_bytes, self.lost_bytes);
        }

        self.bytes_in_flight += sent_bytes as u32;

        PacketInfo {
            delivered_bytes: self.delivered_bytes,
            delivered_time: self.delivered_time,
            lost_bytes: self.lost_bytes,
            first_sent_time: time_sent,
            bytes_in_flight: *self.bytes_in_flight,
            is_app_limited: app_limited.unwrap_or(false),
        }
    }

    fn on_rtt_sample(&mut self, rtt: Duration, now: Timestamp) {
        self.data_volume_model.update_min_rtt(rtt, now, false);
    }

    fn on_ack<Pub: Publisher>(
        &mut self,
        newest_acked_packet_info: PacketInfo,
        sample: AckSample,
        random_generator: &mut dyn random::Generator,
        ack_receive_time: Timestamp,
        publisher: &mut Pub,
    ) {
        let interval =
            ack_receive_time.saturating_duration_since(newest_acked_packet_info.delivered_time);
        if interval.is_zero() {
            // invalid sample: no elapsed time to derive a rate from
            return;
        }

        self.handle_deferred_idle_restart(random_generator, ack_receive_time, publisher);

        let newly_acked = sample
            .delivered_bytes
            .saturating_sub(self.delivered_bytes);
        let rate_sample = RateSample {
            delivery_rate: Bandwidth::new(
                sample
                    .delivered_bytes
                    .saturating_sub(newest_acked_packet_info.delivered_bytes),
                interval,
            ),
            is_app_limited: sample.is_app_limited,
            interval,
            delivered_bytes: sample.delivered_bytes,
            lost_bytes: sample.lost_bytes,
            bytes_in_flight: sample.bytes_in_flight,
            ecn_ce_count: 0,
            is_cwnd_limited: false,
        };
        publisher.on_delivery_rate_sampled(rate_sample);

        let loss_advanced = sample.newly_lost_bytes > 0;

        self.round_counter
            .on_ack(newest_acked_packet_info, sample.delivered_bytes);
        if self.round_counter.round_start() {
            self.packet_conservation = false;
        }

        let was_rto_recovery = self.recovery_state.is_rto();
        if self
            .recovery_state
            .on_ack(newest_acked_packet_info.first_sent_time)
        {
            self.on_exit_recovery();
            if was_rto_recovery && self.config.exclude_rto() {
                self.pmodrl
                    .reset(ack_receive_time, sample.delivered_bytes, sample.lost_bytes);
            }
        }

        if sample.is_rwnd_limited && self.config.exclude_rwnd() {
            self.pmodrl
                .reset(ack_receive_time, sample.delivered_bytes, sample.lost_bytes);
        }
        if sample.is_app_limited && self.config.exclude_applimited() {
            self.pmodrl
                .reset(ack_receive_time, sample.delivered_bytes, sample.lost_bytes);
        }

        self.lt_bw_estimator.on_ack(
            ack_receive_time,
            sample.delivered_bytes,
            sample.lost_bytes,
            sample.newly_lost_bytes,
            sample.is_app_limited,
            self.round_counter.round_start(),
            self.state.is_probing_bw(),
        );

        self.data_rate_model
            .update_max_bw(rate_sample, self.round_counter.round_count());
        self.data_rate_model.update_bw(self.lt_bw_estimator.lt_bw());

        self.data_volume_model
            .update_min_rtt(sample.rtt, ack_receive_time, sample.is_ack_delayed);
        self.data_volume_model.update_ack_aggregation(
            self.data_rate_model.bw(),
            newly_acked,
            self.cwnd,
            self.round_counter.round_count(),
            ack_receive_time,
        );

        self.bytes_in_flight.set(sample.bytes_in_flight);
        self.delivered_bytes = sample.delivered_bytes;
        self.delivered_time = ack_receive_time;
        self.lost_bytes = sample.lost_bytes;

        let delivered_for_detector = self.detector_delivery_counter(&sample);

        self.pmodrl.on_pre_empty_sample(
            ack_receive_time,
            delivered_for_detector,
            sample.lost_bytes,
            loss_advanced,
        );
        let min_rtt = self.data_volume_model.min_rtt().unwrap_or_default();
        self.pmodrl
            .try_arm(ack_receive_time, delivered_for_detector, sample.lost_bytes, min_rtt);
        self.pmodrl.refine(ack_receive_time, delivered_for_detector);

        let flow_len = self.pmodrl.flow_len(ack_receive_time);
        let prior_classification = self.pmodrl.classification();
        let classification = self.pmodrl.classify(
            ack_receive_time,
            min_rtt,
            flow_len,
            delivered_for_detector,
            self.config.high_loss_disclassify(),
        );
        if classification != prior_classification {
            publisher.on_detector_classified(classification);
        }
        if self.pmodrl.take_reset_ltbw_flag() {
            self.lt_bw_estimator.reset();
        }

        let prior_state = self.state;

        self.check_startup_done(rate_sample);
        self.check_drain_done(random_generator, ack_receive_time);
        self.check_probe_bw_cycle_phase(sample.newly_lost_bytes, ack_receive_time);
        self.check_probe_rtt(random_generator, ack_receive_time);

        if self.state.is_probing_bw()
            && self.round_counter.round_start()
            && self.pmodrl.on_round_start(&self.config)
        {
            self.state = State::ProbeBw(ProbeBwCycle::restart(ack_receive_time));
        }

        self.set_cwnd(newly_acked as usize);

        self.pacer.set_pacing_rate(
            self.data_rate_model.bw(),
            self.pacing_gain(),
            self.full_pipe_estimator.full_bw_reached(),
            publisher,
        );
        self.pacer.set_send_quantum(self.max_datagram_size);

        if self.state != prior_state {
            publisher.on_bbr_state_changed(self.state);
        }
    }

    fn on_packet_lost<Pub: Publisher>(
        &mut self,
        lost_bytes: u32,
        _new_loss_burst: bool,
        _timestamp: Timestamp,
        _publisher: &mut Pub,
    ) {
        self.bytes_in_flight -= lost_bytes;
    }

    fn on_congestion_event<Pub: Publisher>(
        &mut self,
        state: CongestionAvoidanceState,
        now: Timestamp,
        publisher: &mut Pub,
    ) -> u32 {
        let prior_state = self.state;

        if self.recovery_state.on_congestion_event(state, now) {
            self.full_pipe_estimator.reset();
            self.round_counter.start(self.delivered_bytes);
            self.lt_bw_estimator.on_ack(
                now,
                self.delivered_bytes,
                self.lost_bytes.saturating_add(1),
                1,
                false,
                true,
                self.state.is_probing_bw(),
            );
            self.on_enter_recovery(0);
        }

        if self.state != prior_state {
            publisher.on_bbr_state_changed(self.state);
        }

        self.prior_cwnd.max(self.minimum_window())
    }

    fn on_packet_discarded(&mut self, bytes_sent: usize) {
        self.bytes_in_flight -= bytes_sent as u32;
        self.recovery_state.on_packet_discarded();
    }
}
