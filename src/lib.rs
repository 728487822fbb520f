#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod bandwidth;
pub mod config;
pub mod counter;
pub mod introspection;
pub mod log;
pub mod number;
pub mod random;
pub mod recovery;
pub mod time;
mod windowed_filter;

pub use config::Config;
pub use introspection::Snapshot;
pub use recovery::{BbrCongestionController, CongestionController};
