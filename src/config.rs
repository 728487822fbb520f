// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Process-wide, lock-free tunables.
//!
//! These are read from the ACK-processing hot path without synchronization: every
//! field is a word-sized atomic loaded with `Ordering::Relaxed`, so a concurrent
//! write from the operator can only ever be observed no earlier or later than one
//! sample boundary. There is no cross-field consistency guarantee, which matches
//! the fact that every field here is read and used independently.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Detector/cap tunables, mutable at runtime by the operator.
///
/// Field names and defaults mirror the configuration surface table; this struct
/// owns no allocation and can be embedded by value or shared behind any pointer
/// type the caller prefers (`&'static`, `Arc`, ...).
#[derive(Debug)]
pub struct Config {
    probe_interval: AtomicU32,
    probe_per: AtomicU32,
    optimize_flag: AtomicBool,
    high_loss_disclassify: AtomicU32,
    monitor_peroid: AtomicU32,
    use_goodput: AtomicBool,
    exclude_rto: AtomicBool,
    exclude_rwnd: AtomicBool,
    exclude_applimited: AtomicBool,
    enable_printk: AtomicBool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probe_interval: AtomicU32::new(20),
            probe_per: AtomicU32::new(24),
            optimize_flag: AtomicBool::new(true),
            high_loss_disclassify: AtomicU32::new(2),
            monitor_peroid: AtomicU32::new(3),
            use_goodput: AtomicBool::new(true),
            exclude_rto: AtomicBool::new(false),
            exclude_rwnd: AtomicBool::new(false),
            exclude_applimited: AtomicBool::new(false),
            enable_printk: AtomicBool::new(true),
        }
    }
}

macro_rules! u32_field {
    ($get:ident, $set:ident, $field:ident) => {
        #[inline]
        pub fn $get(&self) -> u32 {
            self.$field.load(Ordering::Relaxed)
        }

        #[inline]
        pub fn $set(&self, value: u32) {
            self.$field.store(value, Ordering::Relaxed);
        }
    };
}

macro_rules! bool_field {
    ($get:ident, $set:ident, $field:ident) => {
        #[inline]
        pub fn $get(&self) -> bool {
            self.$field.load(Ordering::Relaxed)
        }

        #[inline]
        pub fn $set(&self, value: bool) {
            self.$field.store(value, Ordering::Relaxed);
        }
    };
}

impl Config {
    /// Rounds between upward probes while capped (η)
    u32_field!(probe_interval, set_probe_interval, probe_interval);
    /// Probe gain; effective γ = `probe_per·5 − 100` %
    u32_field!(probe_per, set_probe_per, probe_per);
    /// Master enable for cap & probe
    bool_field!(optimize_flag, set_optimize_flag, optimize_flag);
    /// Reserved reason code surfaced on forced disclassification
    u32_field!(
        high_loss_disclassify,
        set_high_loss_disclassify,
        high_loss_disclassify
    );
    /// Rounds to confirm a probe yielded nothing
    u32_field!(monitor_peroid, set_monitor_peroid, monitor_peroid);
    /// Use `snd_una/MSS` instead of `delivered` as the delivery metric
    bool_field!(use_goodput, set_use_goodput, use_goodput);
    /// Reset the detector on RTO-recovery exit
    bool_field!(exclude_rto, set_exclude_rto, exclude_rto);
    /// Reset the detector on a rwnd-limited chrono
    bool_field!(exclude_rwnd, set_exclude_rwnd, exclude_rwnd);
    /// Reset the detector on an app-limited sample
    bool_field!(
        exclude_applimited,
        set_exclude_applimited,
        exclude_applimited
    );
    /// Emit diagnostic log lines
    bool_field!(enable_printk, set_enable_printk, enable_printk);
}
