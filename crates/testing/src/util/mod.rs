// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

pub mod drain;
pub mod wait;

pub use drain::{Drained, document_ids, drain_until_not_modified, drain_with_continuations};
pub use wait::{wait_for, wait_for_condition};
