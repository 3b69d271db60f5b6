// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! The position of a change feed reader across feed ranges.

use chrono::{DateTime, Utc};
use shardfeed_type::{EpkRange, FeedRange};

use crate::{
	codec,
	error::{ChangeFeedError, Result},
	position::{ChangeFeedPosition, FeedRangeState},
};

mod split;

pub use split::{find_overlap, merge, split};

/// Ordered, non-empty list of feed range states with pairwise disjoint ranges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossFeedRangeState {
	ranges: Vec<FeedRangeState>,
}

impl CrossFeedRangeState {
	pub fn new(ranges: Vec<FeedRangeState>) -> Result<Self> {
		if ranges.is_empty() {
			return Err(ChangeFeedError::invalid_argument("a state needs at least one feed range"));
		}
		if let Some((first, second)) = find_overlap(&ranges) {
			return Err(ChangeFeedError::Overlap {
				first: first.clone(),
				second: second.clone(),
			});
		}
		Ok(Self {
			ranges,
		})
	}

	/// Callers guarantee the list is non-empty and disjoint
	pub(crate) fn new_unchecked(ranges: Vec<FeedRangeState>) -> Self {
		debug_assert!(!ranges.is_empty());
		Self {
			ranges,
		}
	}

	pub fn single(range: FeedRange, position: ChangeFeedPosition) -> Self {
		Self::new_unchecked(vec![FeedRangeState::new(range, position)])
	}

	pub fn from_beginning() -> Self {
		Self::from_beginning_of(FeedRange::full())
	}

	pub fn from_beginning_of(range: FeedRange) -> Self {
		Self::single(range, ChangeFeedPosition::Beginning)
	}

	pub fn from_now() -> Self {
		Self::from_now_of(FeedRange::full())
	}

	pub fn from_now_of(range: FeedRange) -> Self {
		Self::single(range, ChangeFeedPosition::Now)
	}

	pub fn from_time(timestamp: DateTime<Utc>) -> Self {
		Self::from_time_of(timestamp, FeedRange::full())
	}

	pub fn from_time_of(timestamp: DateTime<Utc>, range: FeedRange) -> Self {
		Self::single(range, ChangeFeedPosition::Time(timestamp))
	}

	/// Restores a state from text produced by [`CrossFeedRangeState::serialize`]
	pub fn from_continuation(text: &str) -> Result<Self> {
		Self::parse(text)
	}

	pub fn parse(text: &str) -> Result<Self> {
		codec::from_portable(text)
	}

	pub fn serialize(&self) -> String {
		codec::to_portable(self)
	}

	pub fn ranges(&self) -> &[FeedRangeState] {
		&self.ranges
	}

	pub fn into_ranges(self) -> Vec<FeedRangeState> {
		self.ranges
	}

	pub fn len(&self) -> usize {
		self.ranges.len()
	}

	/// Always false, a state holds at least one range
	pub fn is_empty(&self) -> bool {
		self.ranges.is_empty()
	}

	pub fn iter(&self) -> std::slice::Iter<'_, FeedRangeState> {
		self.ranges.iter()
	}

	pub fn feed_ranges(&self) -> impl Iterator<Item = &FeedRange> {
		self.ranges.iter().map(|state| &state.range)
	}

	/// Exactly `n` disjoint states, contiguous in order
	pub fn split(&self, n: usize) -> Result<Vec<CrossFeedRangeState>> {
		split(self, n)
	}

	/// Like [`CrossFeedRangeState::split`] but yields `None` when there are
	/// fewer ranges than groups
	pub fn try_split(&self, n: usize) -> Option<Vec<CrossFeedRangeState>> {
		if n == 0 || n > self.len() {
			return None;
		}
		split(self, n).ok()
	}

	pub fn try_split_two(&self) -> Option<(CrossFeedRangeState, CrossFeedRangeState)> {
		let mut parts = self.try_split(2)?.into_iter();
		Some((parts.next()?, parts.next()?))
	}

	pub fn try_split_three(&self) -> Option<(CrossFeedRangeState, CrossFeedRangeState, CrossFeedRangeState)> {
		let mut parts = self.try_split(3)?.into_iter();
		Some((parts.next()?, parts.next()?, parts.next()?))
	}

	/// Concatenation of `self` followed by `others`
	pub fn merge(&self, others: &[CrossFeedRangeState]) -> Result<CrossFeedRangeState> {
		merge(std::iter::once(self).chain(others.iter()))
	}

	/// True if the ranges tile `span` exactly, in key order
	pub fn covers(&self, span: &EpkRange) -> bool {
		let mut ranges: Vec<&EpkRange> = Vec::with_capacity(self.len());
		for range in self.feed_ranges() {
			match range.as_epk() {
				Some(epk) => ranges.push(epk),
				None => return false,
			}
		}
		ranges.sort_by(|l, r| l.min().cmp(r.min()));

		let mut expected = span.min();
		for range in ranges {
			if range.min() != expected {
				return false;
			}
			expected = range.max();
		}
		expected == span.max()
	}
}

impl<'a> IntoIterator for &'a CrossFeedRangeState {
	type Item = &'a FeedRangeState;
	type IntoIter = std::slice::Iter<'a, FeedRangeState>;

	fn into_iter(self) -> Self::IntoIter {
		self.ranges.iter()
	}
}
