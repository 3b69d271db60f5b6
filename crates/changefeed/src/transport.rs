// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::Arc;

use async_trait::async_trait;
use shardfeed_type::FeedRange;

use crate::{
	page::{FeedRangePage, Headers},
	position::ChangeFeedPosition,
};

pub mod status {
	pub const OK: u16 = 200;
	pub const NOT_MODIFIED: u16 = 304;
	pub const BAD_REQUEST: u16 = 400;
	pub const NOT_FOUND: u16 = 404;
	pub const REQUEST_TIMEOUT: u16 = 408;
	pub const GONE: u16 = 410;
	pub const TOO_MANY_REQUESTS: u16 = 429;
	pub const RETRY_WITH: u16 = 449;
	pub const INTERNAL_SERVER_ERROR: u16 = 500;
	pub const SERVICE_UNAVAILABLE: u16 = 503;
}

pub mod sub_status {
	pub const NONE: u32 = 0;
	pub const NAME_CACHE_IS_STALE: u32 = 1000;
	pub const PARTITION_KEY_RANGE_GONE: u32 = 1002;
	pub const COMPLETING_SPLIT: u32 = 1007;
	pub const COMPLETING_PARTITION_MIGRATION: u32 = 1008;
}

/// Failure reported by the server for a single read
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("request failed with status {status}.{sub_status}: {message}")]
pub struct TransportError {
	pub status: u16,
	pub sub_status: u32,
	pub message: String,
	pub activity_id: String,
	pub request_charge: f64,
}

impl TransportError {
	pub fn new(status: u16, message: impl Into<String>) -> Self {
		Self {
			status,
			sub_status: sub_status::NONE,
			message: message.into(),
			activity_id: String::new(),
			request_charge: 0.0,
		}
	}

	/// The range addressed by the request no longer maps to one partition
	pub fn gone(message: impl Into<String>) -> Self {
		Self::new(status::GONE, message).with_sub_status(sub_status::PARTITION_KEY_RANGE_GONE)
	}

	pub fn with_sub_status(mut self, sub_status: u32) -> Self {
		self.sub_status = sub_status;
		self
	}

	pub fn with_activity_id(mut self, activity_id: impl Into<String>) -> Self {
		self.activity_id = activity_id.into();
		self
	}

	pub fn with_request_charge(mut self, request_charge: f64) -> Self {
		self.request_charge = request_charge;
		self
	}

	/// Split or merge signal: the partition map must be refreshed
	pub fn is_partition_gone(&self) -> bool {
		self.status == status::GONE
			&& matches!(
				self.sub_status,
				sub_status::PARTITION_KEY_RANGE_GONE
					| sub_status::COMPLETING_SPLIT | sub_status::COMPLETING_PARTITION_MIGRATION
			)
	}

	pub fn is_retriable(&self) -> bool {
		match self.status {
			status::REQUEST_TIMEOUT
			| status::TOO_MANY_REQUESTS
			| status::RETRY_WITH
			| status::SERVICE_UNAVAILABLE => true,
			status::GONE => !self.is_partition_gone(),
			_ => false,
		}
	}
}

/// One change feed read against a single feed range
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeFeedRequest {
	pub range: FeedRange,
	pub position: ChangeFeedPosition,
	pub page_size_limit: Option<usize>,
	pub headers: Headers,
}

impl ChangeFeedRequest {
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).map(String::as_str)
	}
}

/// Performs single range change feed reads against the server
#[async_trait]
pub trait FeedTransport: Send + Sync {
	async fn read_range(&self, request: &ChangeFeedRequest) -> Result<FeedRangePage, TransportError>;
}

#[async_trait]
impl<T: FeedTransport + ?Sized> FeedTransport for Arc<T> {
	async fn read_range(&self, request: &ChangeFeedRequest) -> Result<FeedRangePage, TransportError> {
		(**self).read_range(request).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_partition_gone_sub_statuses() {
		assert!(TransportError::gone("split").is_partition_gone());
		for sub in [sub_status::COMPLETING_SPLIT, sub_status::COMPLETING_PARTITION_MIGRATION] {
			assert!(TransportError::new(status::GONE, "gone").with_sub_status(sub).is_partition_gone());
		}
		assert!(!TransportError::new(status::GONE, "gone").is_partition_gone());
		assert!(
			!TransportError::new(status::NOT_FOUND, "gone")
				.with_sub_status(sub_status::PARTITION_KEY_RANGE_GONE)
				.is_partition_gone()
		);
	}

	#[test]
	fn test_retriable_statuses() {
		for status in [408, 429, 449, 503] {
			assert!(TransportError::new(status, "retry").is_retriable(), "{status} should be retriable");
		}
		assert!(TransportError::new(status::GONE, "plain gone").is_retriable());
		assert!(!TransportError::gone("split").is_retriable());
		for status in [400, 401, 403, 404, 500] {
			assert!(!TransportError::new(status, "fail").is_retriable(), "{status} should not be retriable");
		}
	}
}
