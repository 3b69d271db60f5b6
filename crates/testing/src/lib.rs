// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

pub mod container;
pub mod flaky;
pub mod util;

pub use container::{InMemoryContainer, Operation};
pub use flaky::FlakyContainer;
