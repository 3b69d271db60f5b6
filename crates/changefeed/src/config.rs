// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::mode::ChangeFeedMode;

/// Per reader options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeFeedOptions {
	pub mode: ChangeFeedMode,
	/// Maximum number of documents per page, server default when unset
	pub page_size_limit: Option<usize>,
	/// Skip not modified ranges until a full sweep found nothing
	pub coalesce_not_modified: bool,
	/// Emit continuations in the version 1 composite token format
	pub emit_legacy_token: bool,
}

impl ChangeFeedOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_mode(mut self, mode: ChangeFeedMode) -> Self {
		self.mode = mode;
		self
	}

	pub fn with_page_size_limit(mut self, limit: usize) -> Self {
		self.page_size_limit = Some(limit);
		self
	}

	pub fn with_coalesce_not_modified(mut self, coalesce: bool) -> Self {
		self.coalesce_not_modified = coalesce;
		self
	}

	pub fn with_emit_legacy_token(mut self, emit: bool) -> Self {
		self.emit_legacy_token = emit;
		self
	}

	pub fn from_json(text: &str) -> shardfeed_type::Result<Self> {
		Ok(serde_json::from_str(text)?)
	}
}

impl Default for ChangeFeedOptions {
	fn default() -> Self {
		Self {
			mode: ChangeFeedMode::Incremental,
			page_size_limit: None,
			coalesce_not_modified: false,
			emit_legacy_token: false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PartitionMapCacheConfig {
	/// Age after which a cached partition map is fetched again. Without a ttl
	/// the map is only refreshed when forced.
	pub ttl: Option<Duration>,
}

impl PartitionMapCacheConfig {
	pub fn new(ttl: Option<Duration>) -> Self {
		Self {
			ttl,
		}
	}
}
