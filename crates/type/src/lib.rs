// SPDX-License-Identifier: MIT
// Copyright (c) 2025 ReifyDB

pub mod error;
pub mod range;

pub use error::{Error, diagnostic::Diagnostic};
pub use range::{EpkRange, FeedRange, PartitionKeyRange};

pub type Result<T> = std::result::Result<T, Error>;
