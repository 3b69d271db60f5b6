// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Offset, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use shardfeed_type::FeedRange;

use crate::error::{ChangeFeedError, Result};

/// Earliest representable instant. A `Time` position at this instant reads
/// the feed from the beginning.
pub const MIN_UTC: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

/// Where reading resumes within one feed range
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeFeedPosition {
	Beginning,
	Now,
	Time(DateTime<Utc>),
	/// Opaque server token, never interpreted by the engine
	Continuation(String),
}

impl ChangeFeedPosition {
	/// Start at a point in time. Fails for timestamps not expressed in UTC.
	pub fn time<Tz: TimeZone>(timestamp: DateTime<Tz>) -> Result<Self> {
		let offset = timestamp.offset().fix().local_minus_utc();
		if offset != 0 {
			return Err(ChangeFeedError::invalid_argument(format!(
				"start time must be expressed in UTC, got offset of {} seconds",
				offset
			)));
		}
		Ok(ChangeFeedPosition::Time(timestamp.with_timezone(&Utc)))
	}

	pub fn continuation(token: impl Into<String>) -> Self {
		ChangeFeedPosition::Continuation(token.into())
	}

	pub fn kind(&self) -> PositionKind {
		match self {
			ChangeFeedPosition::Beginning => PositionKind::Beginning,
			ChangeFeedPosition::Now => PositionKind::Now,
			ChangeFeedPosition::Time(_) => PositionKind::Time,
			ChangeFeedPosition::Continuation(_) => PositionKind::Continuation,
		}
	}

	pub fn is_min_time(&self) -> bool {
		matches!(self, ChangeFeedPosition::Time(ts) if *ts == MIN_UTC)
	}

	pub fn as_continuation(&self) -> Option<&str> {
		match self {
			ChangeFeedPosition::Continuation(token) => Some(token),
			_ => None,
		}
	}
}

impl Display for ChangeFeedPosition {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			ChangeFeedPosition::Beginning => f.write_str("beginning"),
			ChangeFeedPosition::Now => f.write_str("now"),
			ChangeFeedPosition::Time(ts) => write!(f, "time({})", ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
			ChangeFeedPosition::Continuation(token) => write!(f, "continuation({:?})", token),
		}
	}
}

/// Discriminant of a position, used as the `kind` field of portable records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionKind {
	Beginning,
	Now,
	Time,
	Continuation,
}

impl PositionKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			PositionKind::Beginning => "beginning",
			PositionKind::Now => "now",
			PositionKind::Time => "time",
			PositionKind::Continuation => "continuation",
		}
	}
}

/// A feed range paired with the position to resume from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedRangeState {
	pub range: FeedRange,
	pub position: ChangeFeedPosition,
}

impl FeedRangeState {
	pub fn new(range: FeedRange, position: ChangeFeedPosition) -> Self {
		Self {
			range,
			position,
		}
	}

	pub fn with_position(&self, position: ChangeFeedPosition) -> Self {
		Self {
			range: self.range.clone(),
			position,
		}
	}
}

impl Display for FeedRangeState {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} @ {}", self.range, self.position)
	}
}
