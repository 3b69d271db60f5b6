// SPDX-License-Identifier: MIT
// Copyright (c) 2025 ReifyDB

//! Feed ranges.
//!
//! The key space of a container is the set of effective partition keys (EPKs),
//! upper-case hex strings ordered lexicographically between `MIN_EPK` and
//! `MAX_EPK`. A feed range is either a half-open span `[min, max)` of that
//! space or a single logical partition.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::{Result, error::diagnostic::range, return_error};

pub mod hash;

pub use hash::effective_partition_key;

pub const MIN_EPK: &str = "";
pub const MAX_EPK: &str = "FF";

/// Half-open span `[min, max)` of the effective partition key space
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EpkRange {
	min: String,
	max: String,
}

impl EpkRange {
	pub fn new(min: impl Into<String>, max: impl Into<String>) -> Result<Self> {
		let min = min.into();
		let max = max.into();

		for bound in [&min, &max] {
			if !bound.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)) {
				return_error!(range::invalid_bound(bound));
			}
			if bound.as_str() > MAX_EPK {
				return_error!(range::out_of_key_space(bound));
			}
		}

		if min >= max {
			return_error!(range::empty_range(&min, &max));
		}

		Ok(Self {
			min,
			max,
		})
	}

	pub fn full() -> Self {
		Self {
			min: MIN_EPK.to_string(),
			max: MAX_EPK.to_string(),
		}
	}

	pub fn min(&self) -> &str {
		&self.min
	}

	pub fn max(&self) -> &str {
		&self.max
	}

	pub fn is_full(&self) -> bool {
		self.min == MIN_EPK && self.max == MAX_EPK
	}

	pub fn contains_point(&self, epk: &str) -> bool {
		self.min.as_str() <= epk && epk < self.max.as_str()
	}

	/// True if `other` lies entirely within `self`
	pub fn contains(&self, other: &EpkRange) -> bool {
		self.min <= other.min && other.max <= self.max
	}

	pub fn overlaps(&self, other: &EpkRange) -> bool {
		self.min < other.max && other.min < self.max
	}

	/// The overlap of two spans, if any
	pub fn intersect(&self, other: &EpkRange) -> Option<EpkRange> {
		if !self.overlaps(other) {
			return None;
		}

		Some(EpkRange {
			min: self.min.clone().max(other.min.clone()),
			max: self.max.clone().min(other.max.clone()),
		})
	}

	/// Smallest span covering both
	pub fn span(&self, other: &EpkRange) -> EpkRange {
		EpkRange {
			min: self.min.clone().min(other.min.clone()),
			max: self.max.clone().max(other.max.clone()),
		}
	}
}

impl Display for EpkRange {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "[{:?}, {:?})", self.min, self.max)
	}
}

/// A unit of the key space that a change feed can be read over independently
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum FeedRange {
	Epk(EpkRange),
	PartitionKey(String),
}

impl FeedRange {
	pub fn full() -> Self {
		FeedRange::Epk(EpkRange::full())
	}

	pub fn epk(min: impl Into<String>, max: impl Into<String>) -> Result<Self> {
		Ok(FeedRange::Epk(EpkRange::new(min, max)?))
	}

	pub fn partition_key(key: impl Into<String>) -> Self {
		FeedRange::PartitionKey(key.into())
	}

	pub fn is_full(&self) -> bool {
		matches!(self, FeedRange::Epk(range) if range.is_full())
	}

	pub fn as_epk(&self) -> Option<&EpkRange> {
		match self {
			FeedRange::Epk(range) => Some(range),
			FeedRange::PartitionKey(_) => None,
		}
	}

	pub fn overlaps(&self, other: &FeedRange) -> bool {
		match (self, other) {
			(FeedRange::Epk(left), FeedRange::Epk(right)) => left.overlaps(right),
			(FeedRange::Epk(range), FeedRange::PartitionKey(key))
			| (FeedRange::PartitionKey(key), FeedRange::Epk(range)) => {
				range.contains_point(&effective_partition_key(key))
			}
			(FeedRange::PartitionKey(left), FeedRange::PartitionKey(right)) => left == right,
		}
	}

	/// True if this range has any key in common with the partition span
	pub fn overlaps_span(&self, span: &EpkRange) -> bool {
		match self {
			FeedRange::Epk(range) => range.overlaps(span),
			FeedRange::PartitionKey(key) => span.contains_point(&effective_partition_key(key)),
		}
	}
}

impl Display for FeedRange {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			FeedRange::Epk(range) => Display::fmt(range, f),
			FeedRange::PartitionKey(key) => write!(f, "pk({:?})", key),
		}
	}
}

impl From<EpkRange> for FeedRange {
	fn from(range: EpkRange) -> Self {
		FeedRange::Epk(range)
	}
}

/// One physical partition as reported by the partition map
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PartitionKeyRange {
	pub id: String,
	pub range: EpkRange,
}

impl PartitionKeyRange {
	pub fn new(id: impl Into<String>, range: EpkRange) -> Self {
		Self {
			id: id.into(),
			range,
		}
	}
}
