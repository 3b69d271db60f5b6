// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use serde::{Deserialize, Serialize};
use shardfeed_type::FeedRange;

use crate::{
	config::ChangeFeedOptions,
	error::{ChangeFeedError, Result},
	page::Headers,
	position::{ChangeFeedPosition, FeedRangeState},
	state::CrossFeedRangeState,
	transport::ChangeFeedRequest,
};

pub mod headers {
	pub const A_IM: &str = "A-IM";
	pub const IF_NONE_MATCH: &str = "If-None-Match";
	pub const IF_MODIFIED_SINCE: &str = "If-Modified-Since";
	pub const MAX_ITEM_COUNT: &str = "x-ms-max-item-count";
	pub const PARTITION_KEY: &str = "x-ms-documentdb-partitionkey";
	pub const START_EPK: &str = "x-ms-start-epk";
	pub const END_EPK: &str = "x-ms-end-epk";
	pub const WIRE_FORMAT_VERSION: &str = "x-ms-cosmos-changefeed-wire-format-version";
	pub const ACTIVITY_ID: &str = "x-ms-activity-id";
	pub const ITEM_COUNT: &str = "x-ms-item-count";
	pub const ETAG: &str = "etag";

	pub const INCREMENTAL_FEED: &str = "Incremental Feed";
	pub const FULL_FIDELITY_FEED: &str = "Full-Fidelity Feed";
	pub const FULL_FIDELITY_WIRE_FORMAT: &str = "2021-09-15";
	pub const MATCH_ANY: &str = "*";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeFeedMode {
	/// Latest version of each changed item, deletes are not reported
	#[default]
	Incremental,
	/// Every create, replace and delete, with metadata
	#[serde(alias = "all_versions_and_deletes")]
	FullFidelity,
}

/// How a state is divided between parallel readers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitStrategy {
	/// Exactly the requested number of groups
	Balanced,
	/// One group per resolved feed range
	PerRange,
}

impl ChangeFeedMode {
	pub fn split_strategy(&self) -> SplitStrategy {
		match self {
			ChangeFeedMode::Incremental => SplitStrategy::Balanced,
			ChangeFeedMode::FullFidelity => SplitStrategy::PerRange,
		}
	}

	/// Full fidelity feeds retain history only for a bounded window and can
	/// only start from now or from a continuation
	pub fn validate_start(&self, position: &ChangeFeedPosition) -> Result<()> {
		match (self, position) {
			(ChangeFeedMode::Incremental, _) => Ok(()),
			(ChangeFeedMode::FullFidelity, ChangeFeedPosition::Now | ChangeFeedPosition::Continuation(_)) => {
				Ok(())
			}
			(ChangeFeedMode::FullFidelity, position) => Err(ChangeFeedError::invalid_argument(format!(
				"full fidelity change feed cannot start from {}",
				position
			))),
		}
	}

	pub fn validate_state(&self, state: &CrossFeedRangeState) -> Result<()> {
		state.iter().try_for_each(|range_state| self.validate_start(&range_state.position))
	}

	/// Builds the request reading `state` with this mode
	pub fn shape(&self, state: &FeedRangeState, options: &ChangeFeedOptions) -> ChangeFeedRequest {
		let mut headers = Headers::new();

		match self {
			ChangeFeedMode::Incremental => {
				headers.insert(headers::A_IM.to_string(), headers::INCREMENTAL_FEED.to_string());
			}
			ChangeFeedMode::FullFidelity => {
				headers.insert(headers::A_IM.to_string(), headers::FULL_FIDELITY_FEED.to_string());
				headers.insert(
					headers::WIRE_FORMAT_VERSION.to_string(),
					headers::FULL_FIDELITY_WIRE_FORMAT.to_string(),
				);
			}
		}

		match &state.position {
			ChangeFeedPosition::Beginning => {}
			ChangeFeedPosition::Now => {
				headers.insert(headers::IF_NONE_MATCH.to_string(), headers::MATCH_ANY.to_string());
			}
			ChangeFeedPosition::Time(_) if state.position.is_min_time() => {}
			ChangeFeedPosition::Time(ts) => {
				headers.insert(
					headers::IF_MODIFIED_SINCE.to_string(),
					ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
				);
			}
			ChangeFeedPosition::Continuation(token) => {
				headers.insert(headers::IF_NONE_MATCH.to_string(), token.clone());
			}
		}

		if let Some(limit) = options.page_size_limit {
			headers.insert(headers::MAX_ITEM_COUNT.to_string(), limit.to_string());
		}

		match &state.range {
			FeedRange::PartitionKey(key) => {
				headers.insert(headers::PARTITION_KEY.to_string(), key.clone());
			}
			FeedRange::Epk(range) => {
				headers.insert(headers::START_EPK.to_string(), range.min().to_string());
				headers.insert(headers::END_EPK.to_string(), range.max().to_string());
			}
		}

		ChangeFeedRequest {
			range: state.range.clone(),
			position: state.position.clone(),
			page_size_limit: options.page_size_limit,
			headers,
		}
	}
}

#[cfg(test)]
mod tests {
	use chrono::{TimeZone, Utc};

	use super::*;
	use crate::position::MIN_UTC;

	fn shape(mode: ChangeFeedMode, position: ChangeFeedPosition) -> ChangeFeedRequest {
		let state = FeedRangeState::new(FeedRange::epk("", "80").unwrap(), position);
		mode.shape(&state, &ChangeFeedOptions::default().with_page_size_limit(25))
	}

	#[test]
	fn test_incremental_from_beginning() {
		let request = shape(ChangeFeedMode::Incremental, ChangeFeedPosition::Beginning);
		assert_eq!(request.header(headers::A_IM), Some(headers::INCREMENTAL_FEED));
		assert_eq!(request.header(headers::IF_NONE_MATCH), None);
		assert_eq!(request.header(headers::IF_MODIFIED_SINCE), None);
		assert_eq!(request.header(headers::MAX_ITEM_COUNT), Some("25"));
		assert_eq!(request.header(headers::START_EPK), Some(""));
		assert_eq!(request.header(headers::END_EPK), Some("80"));
		assert_eq!(request.header(headers::WIRE_FORMAT_VERSION), None);
	}

	#[test]
	fn test_now_matches_any() {
		let request = shape(ChangeFeedMode::Incremental, ChangeFeedPosition::Now);
		assert_eq!(request.header(headers::IF_NONE_MATCH), Some("*"));
	}

	#[test]
	fn test_time_is_rfc1123() {
		let ts = Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();
		let request = shape(ChangeFeedMode::Incremental, ChangeFeedPosition::Time(ts));
		assert_eq!(request.header(headers::IF_MODIFIED_SINCE), Some("Wed, 21 Oct 2015 07:28:00 GMT"));

		let request = shape(ChangeFeedMode::Incremental, ChangeFeedPosition::Time(MIN_UTC));
		assert_eq!(request.header(headers::IF_MODIFIED_SINCE), None);
	}

	#[test]
	fn test_continuation_and_full_fidelity() {
		let request = shape(ChangeFeedMode::FullFidelity, ChangeFeedPosition::continuation("\"9\""));
		assert_eq!(request.header(headers::A_IM), Some(headers::FULL_FIDELITY_FEED));
		assert_eq!(request.header(headers::WIRE_FORMAT_VERSION), Some(headers::FULL_FIDELITY_WIRE_FORMAT));
		assert_eq!(request.header(headers::IF_NONE_MATCH), Some("\"9\""));
	}

	#[test]
	fn test_partition_key_scope() {
		let state = FeedRangeState::new(FeedRange::partition_key("tenant"), ChangeFeedPosition::Beginning);
		let request = ChangeFeedMode::Incremental.shape(&state, &ChangeFeedOptions::default());
		assert_eq!(request.header(headers::PARTITION_KEY), Some("tenant"));
		assert_eq!(request.header(headers::START_EPK), None);
		assert_eq!(request.header(headers::MAX_ITEM_COUNT), None);
	}

	#[test]
	fn test_full_fidelity_start_positions() {
		let mode = ChangeFeedMode::FullFidelity;
		assert!(mode.validate_start(&ChangeFeedPosition::Now).is_ok());
		assert!(mode.validate_start(&ChangeFeedPosition::continuation("\"1\"")).is_ok());
		assert!(matches!(
			mode.validate_start(&ChangeFeedPosition::Beginning),
			Err(ChangeFeedError::InvalidArgument(_))
		));
		assert!(mode.validate_start(&ChangeFeedPosition::Time(Utc::now())).is_err());
		assert!(ChangeFeedMode::Incremental.validate_start(&ChangeFeedPosition::Beginning).is_ok());
	}

	#[test]
	fn test_split_strategies() {
		assert_eq!(ChangeFeedMode::Incremental.split_strategy(), SplitStrategy::Balanced);
		assert_eq!(ChangeFeedMode::FullFidelity.split_strategy(), SplitStrategy::PerRange);
	}
}
