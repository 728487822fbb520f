// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

pub use bbr::BbrCongestionController;
pub use congestion_controller::CongestionController;

pub mod bbr;
pub mod congestion_controller;
pub mod pmodrl;
