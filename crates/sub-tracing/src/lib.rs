// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

pub mod builder;
pub mod factory;
pub mod subsystem;

pub use builder::{LogFormat, TracingBuilder};
pub use factory::TracingSubsystemFactory;
pub use subsystem::{TracingSubsystem, init_test_tracing};
