// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use shardfeed_type::FeedRange;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::{
	config::ChangeFeedOptions,
	enumerator::CrossPartitionEnumerator,
	error::{ChangeFeedError, Result},
	legacy::CompositeContinuationToken,
	page::{ChangeFeedPage, Headers},
	routing::PartitionMapProvider,
	state::CrossFeedRangeState,
	token,
	transport::{FeedTransport, status},
};

/// Where a new iterator starts reading
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeFeedStartFrom {
	Beginning(FeedRange),
	Now(FeedRange),
	Time(DateTime<Utc>, FeedRange),
	/// Continuation returned by an earlier response
	Continuation(String),
}

impl ChangeFeedStartFrom {
	pub fn beginning() -> Self {
		ChangeFeedStartFrom::Beginning(FeedRange::full())
	}

	pub fn now() -> Self {
		ChangeFeedStartFrom::Now(FeedRange::full())
	}

	pub fn time(timestamp: DateTime<Utc>) -> Self {
		ChangeFeedStartFrom::Time(timestamp, FeedRange::full())
	}

	pub fn continuation(text: impl Into<String>) -> Self {
		ChangeFeedStartFrom::Continuation(text.into())
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeFeedResponse {
	/// 200 with documents or 304 when nothing changed
	pub status: u16,
	pub documents: Vec<Value>,
	pub continuation: String,
	pub request_charge: f64,
	pub activity_id: String,
	pub headers: Headers,
}

impl ChangeFeedResponse {
	pub fn is_not_modified(&self) -> bool {
		self.status == status::NOT_MODIFIED
	}
}

/// Change feed reader returning responses with text continuations
pub struct ChangeFeedIterator {
	transport: Arc<dyn FeedTransport>,
	partitions: Arc<dyn PartitionMapProvider>,
	options: ChangeFeedOptions,
	start: ChangeFeedStartFrom,
	enumerator: Option<CrossPartitionEnumerator>,
	rid: Option<String>,
	has_more_results: bool,
}

impl ChangeFeedIterator {
	pub fn new(
		transport: Arc<dyn FeedTransport>,
		partitions: Arc<dyn PartitionMapProvider>,
		start: ChangeFeedStartFrom,
		options: ChangeFeedOptions,
	) -> Self {
		Self {
			transport,
			partitions,
			options,
			start,
			enumerator: None,
			rid: None,
			has_more_results: true,
		}
	}

	pub fn has_more_results(&self) -> bool {
		self.has_more_results
	}

	#[instrument(name = "changefeed::iterator::read_next", level = "debug", skip(self, cancel))]
	pub async fn read_next(&mut self, cancel: &CancellationToken) -> shardfeed_type::Result<ChangeFeedResponse> {
		match self.try_read_next(cancel).await {
			Ok(response) => Ok(response),
			Err(err) => {
				if err.is_fatal() {
					self.has_more_results = false;
				}
				Err(err.into())
			}
		}
	}

	async fn try_read_next(&mut self, cancel: &CancellationToken) -> Result<ChangeFeedResponse> {
		let rid = self.rid(cancel).await?;

		if self.enumerator.is_none() {
			let state = start_state(&self.start, &rid)?;
			if self.options.emit_legacy_token {
				if let Some(range) = state.feed_ranges().find(|range| range.as_epk().is_none()) {
					self.has_more_results = false;
					return Err(ChangeFeedError::invalid_argument(format!(
						"legacy continuations cannot address {}",
						range
					)));
				}
			}
			debug!(ranges = state.len(), "starting change feed iterator");
			self.enumerator = Some(CrossPartitionEnumerator::new(
				self.transport.clone(),
				self.partitions.clone(),
				state,
				self.options.clone(),
			));
		}
		let Some(enumerator) = self.enumerator.as_mut() else {
			return Err(ChangeFeedError::Closed {
				reason: "iterator was not started".to_string(),
			});
		};

		let result = enumerator.next_page(cancel).await;
		self.has_more_results = enumerator.has_more_results();
		let page = result?;

		let continuation = if self.options.emit_legacy_token {
			CompositeContinuationToken::from_state(rid.as_str(), page.state())?.to_string()
		} else {
			token::encode(page.state(), &rid)
		};

		Ok(match page {
			ChangeFeedPage::Success {
				documents,
				request_charge,
				activity_id,
				headers,
				..
			} => ChangeFeedResponse {
				status: status::OK,
				documents,
				continuation,
				request_charge,
				activity_id,
				headers,
			},
			ChangeFeedPage::NotModified {
				request_charge,
				activity_id,
				headers,
				..
			} => ChangeFeedResponse {
				status: status::NOT_MODIFIED,
				documents: Vec::new(),
				continuation,
				request_charge,
				activity_id,
				headers,
			},
		})
	}

	async fn rid(&mut self, cancel: &CancellationToken) -> Result<String> {
		if let Some(rid) = &self.rid {
			return Ok(rid.clone());
		}
		let rid = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(ChangeFeedError::Cancelled),
			rid = self.partitions.container_rid() => rid?,
		};
		self.rid = Some(rid.clone());
		Ok(rid)
	}
}

fn start_state(start: &ChangeFeedStartFrom, rid: &str) -> Result<CrossFeedRangeState> {
	Ok(match start {
		ChangeFeedStartFrom::Beginning(range) => CrossFeedRangeState::from_beginning_of(range.clone()),
		ChangeFeedStartFrom::Now(range) => CrossFeedRangeState::from_now_of(range.clone()),
		ChangeFeedStartFrom::Time(timestamp, range) => CrossFeedRangeState::from_time_of(*timestamp, range.clone()),
		ChangeFeedStartFrom::Continuation(text) => {
			let decoded = token::decode(text)?;
			decoded.check_rid(rid)?;
			decoded.state
		}
	})
}
