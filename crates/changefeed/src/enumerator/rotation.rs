// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use crate::{
	position::{ChangeFeedPosition, FeedRangeState},
	state::CrossFeedRangeState,
};

/// Breadth-first walk over the ranges of a state. Values are never mutated;
/// every step returns a new rotation so a failed read leaves the committed
/// one untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
	ranges: Vec<FeedRangeState>,
	cursor: usize,
}

impl Rotation {
	pub fn new(state: CrossFeedRangeState) -> Self {
		Self {
			ranges: state.into_ranges(),
			cursor: 0,
		}
	}

	/// The range read next
	pub fn current(&self) -> &FeedRangeState {
		&self.ranges[self.cursor]
	}

	pub fn cursor(&self) -> usize {
		self.cursor
	}

	pub fn len(&self) -> usize {
		self.ranges.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ranges.is_empty()
	}

	/// Records the new position of the current range and moves to the next
	pub fn advance(&self, position: ChangeFeedPosition) -> Self {
		let mut ranges = self.ranges.clone();
		ranges[self.cursor].position = position;
		Self {
			cursor: (self.cursor + 1) % ranges.len(),
			ranges,
		}
	}

	/// Replaces the current range in place. The cursor stays on the first
	/// replacement. An empty replacement is ignored.
	pub fn replace_current(&self, replacements: Vec<FeedRangeState>) -> Self {
		if replacements.is_empty() {
			return self.clone();
		}
		let mut ranges = self.ranges.clone();
		ranges.splice(self.cursor..=self.cursor, replacements);
		Self {
			ranges,
			cursor: self.cursor,
		}
	}

	/// State with the range read next in front
	pub fn to_state(&self) -> CrossFeedRangeState {
		let mut ranges = self.ranges.clone();
		ranges.rotate_left(self.cursor);
		CrossFeedRangeState::new_unchecked(ranges)
	}
}

#[cfg(test)]
mod tests {
	use shardfeed_type::FeedRange;

	use super::*;

	fn rotation(bounds: &[(&str, &str)]) -> Rotation {
		Rotation::new(
			CrossFeedRangeState::new(
				bounds.iter()
					.map(|(min, max)| {
						FeedRangeState::new(
							FeedRange::epk(*min, *max).unwrap(),
							ChangeFeedPosition::Beginning,
						)
					})
					.collect(),
			)
			.unwrap(),
		)
	}

	#[test]
	fn test_advance_wraps() {
		let r = rotation(&[("", "40"), ("40", "80"), ("80", "FF")]);
		let r = r.advance(ChangeFeedPosition::continuation("a"));
		assert_eq!(r.cursor(), 1);
		let r = r.advance(ChangeFeedPosition::continuation("b")).advance(ChangeFeedPosition::continuation("c"));
		assert_eq!(r.cursor(), 0);
		assert_eq!(r.current().position, ChangeFeedPosition::continuation("a"));
	}

	#[test]
	fn test_advance_does_not_mutate() {
		let original = rotation(&[("", "80"), ("80", "FF")]);
		let _ = original.advance(ChangeFeedPosition::Now);
		assert_eq!(original.cursor(), 0);
		assert_eq!(original.current().position, ChangeFeedPosition::Beginning);
	}

	#[test]
	fn test_state_leads_with_next_range() {
		let r = rotation(&[("", "40"), ("40", "80"), ("80", "FF")]).advance(ChangeFeedPosition::Now);
		let state = r.to_state();
		let mins: Vec<&str> = state.feed_ranges().map(|range| range.as_epk().unwrap().min()).collect();
		assert_eq!(mins, vec!["40", "80", ""]);
		assert_eq!(state.ranges()[2].position, ChangeFeedPosition::Now);
	}

	#[test]
	fn test_replace_current_keeps_cursor_on_first_child() {
		let r = rotation(&[("", "80"), ("80", "FF")]).advance(ChangeFeedPosition::Now);
		let children = vec![
			FeedRangeState::new(FeedRange::epk("80", "C0").unwrap(), ChangeFeedPosition::Beginning),
			FeedRangeState::new(FeedRange::epk("C0", "FF").unwrap(), ChangeFeedPosition::Beginning),
		];
		let r = r.replace_current(children.clone());
		assert_eq!(r.len(), 3);
		assert_eq!(r.cursor(), 1);
		assert_eq!(r.current(), &children[0]);
	}
}
