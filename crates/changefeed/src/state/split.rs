// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use shardfeed_type::FeedRange;

use crate::{
	error::{ChangeFeedError, Result},
	position::FeedRangeState,
	state::CrossFeedRangeState,
};

/// Divides a state into `n` contiguous groups whose sizes differ by at most one
pub fn split(state: &CrossFeedRangeState, n: usize) -> Result<Vec<CrossFeedRangeState>> {
	if n == 0 {
		return Err(ChangeFeedError::invalid_argument("cannot split into zero groups"));
	}
	let available = state.len();
	if n > available {
		return Err(ChangeFeedError::InsufficientRanges {
			requested: n,
			available,
		});
	}

	let base = available / n;
	let extra = available % n;

	let mut result = Vec::with_capacity(n);
	let mut ranges = state.ranges().iter();
	for group in 0..n {
		let size = if group < extra {
			base + 1
		} else {
			base
		};
		let chunk: Vec<FeedRangeState> = ranges.by_ref().take(size).cloned().collect();
		result.push(CrossFeedRangeState::new_unchecked(chunk));
	}

	Ok(result)
}

/// Concatenates states, rejecting any pair of overlapping ranges
pub fn merge<'a>(states: impl IntoIterator<Item = &'a CrossFeedRangeState>) -> Result<CrossFeedRangeState> {
	let ranges: Vec<FeedRangeState> = states.into_iter().flat_map(|state| state.ranges().iter().cloned()).collect();
	CrossFeedRangeState::new(ranges)
}

/// First pair of overlapping ranges, in list order
pub fn find_overlap(ranges: &[FeedRangeState]) -> Option<(&FeedRange, &FeedRange)> {
	for (idx, left) in ranges.iter().enumerate() {
		for right in &ranges[idx + 1..] {
			if left.range.overlaps(&right.range) {
				return Some((&left.range, &right.range));
			}
		}
	}
	None
}
