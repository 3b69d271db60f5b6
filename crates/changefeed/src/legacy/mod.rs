// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Version 1 composite continuation tokens and the reader built on them.

mod iterator;
mod token;

pub use iterator::LegacyChangeFeedIterator;
pub(crate) use token::state_from_entries;
pub use token::{CompositeContinuationEntry, CompositeContinuationToken, ReadOutcome};
