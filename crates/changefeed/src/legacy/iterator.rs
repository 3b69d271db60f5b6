// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::Arc;

use shardfeed_type::FeedRange;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::{
	config::ChangeFeedOptions,
	error::{ChangeFeedError, Result},
	iterator::ChangeFeedResponse,
	legacy::{CompositeContinuationToken, ReadOutcome},
	page::FeedRangePage,
	position::{ChangeFeedPosition, FeedRangeState},
	routing::PartitionMapProvider,
	transport::{FeedTransport, status},
};

/// Change feed reader driven by a composite continuation token. Every call
/// reads ranges of the token until one has changes or all of them answered
/// not modified.
pub struct LegacyChangeFeedIterator {
	transport: Arc<dyn FeedTransport>,
	partitions: Arc<dyn PartitionMapProvider>,
	options: ChangeFeedOptions,
	/// Position of entries that were never read
	start: ChangeFeedPosition,
	token: Option<CompositeContinuationToken>,
}

impl LegacyChangeFeedIterator {
	pub fn new(
		transport: Arc<dyn FeedTransport>,
		partitions: Arc<dyn PartitionMapProvider>,
		start: ChangeFeedPosition,
		options: ChangeFeedOptions,
	) -> Self {
		Self {
			transport,
			partitions,
			options,
			start,
			token: None,
		}
	}

	/// Resumes from a token produced by an earlier reader
	pub fn from_token(
		transport: Arc<dyn FeedTransport>,
		partitions: Arc<dyn PartitionMapProvider>,
		token: CompositeContinuationToken,
		options: ChangeFeedOptions,
	) -> Self {
		Self {
			transport,
			partitions,
			options,
			start: ChangeFeedPosition::Beginning,
			token: Some(token),
		}
	}

	pub fn token(&self) -> Option<&CompositeContinuationToken> {
		self.token.as_ref()
	}

	pub fn has_more_results(&self) -> bool {
		self.token.as_ref().is_none_or(|token| !token.is_done())
	}

	#[instrument(name = "changefeed::legacy::read_next", level = "debug", skip(self, cancel))]
	pub async fn read_next(&mut self, cancel: &CancellationToken) -> Result<ChangeFeedResponse> {
		let mut token = match &self.token {
			Some(token) => token.clone(),
			None => self.initial_token(cancel).await?,
		};
		let mut request_charge = 0.0;
		let mut gone_in_a_row = 0usize;

		loop {
			let Some(entry) = token.current().cloned() else {
				return Err(ChangeFeedError::Closed {
					reason: "every range of the continuation is complete".to_string(),
				});
			};
			let position = match &entry.token {
				Some(continuation) => ChangeFeedPosition::continuation(continuation.clone()),
				None => self.start.clone(),
			};
			let state = FeedRangeState::new(FeedRange::Epk(entry.range.clone()), position);
			let request = self.options.mode.shape(&state, &self.options);

			let result = tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(ChangeFeedError::Cancelled),
				result = self.transport.read_range(&request) => result,
			};

			let page = match result {
				Ok(page) => page,
				Err(err) if err.is_partition_gone() => {
					gone_in_a_row += 1;
					if gone_in_a_row > 1 {
						return Err(ChangeFeedError::SplitRecoveryFailed {
							range: state.range,
						});
					}
					warn!(range = %entry.range, "partition key range is gone, splitting token entry");
					let outcome = ReadOutcome::Failed(err);
					tokio::select! {
						biased;
						_ = cancel.cancelled() => return Err(ChangeFeedError::Cancelled),
						retry = token.should_retry(&outcome, self.partitions.as_ref()) => retry?,
					};
					continue;
				}
				Err(err) => return Err(ChangeFeedError::Transport(err)),
			};
			gone_in_a_row = 0;
			request_charge += page.request_charge();

			let outcome = if page.is_not_modified() {
				ReadOutcome::NotModified
			} else {
				ReadOutcome::Success
			};
			let retry = token.should_retry(&outcome, self.partitions.as_ref()).await?;

			match page.position() {
				ChangeFeedPosition::Continuation(continuation) => {
					token.update_continuation(Some(continuation.clone()))
				}
				_ => token.move_to_next(),
			}

			if retry {
				continue;
			}

			debug!(range = %entry.range, not_modified = page.is_not_modified(), "legacy change feed page");
			let continuation = token.to_string();
			self.token = Some(token);
			return Ok(into_response(page, continuation, request_charge));
		}
	}

	async fn initial_token(&self, cancel: &CancellationToken) -> Result<CompositeContinuationToken> {
		self.options.mode.validate_start(&self.start)?;

		let (rid, partitions) = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(ChangeFeedError::Cancelled),
			resolved = async {
				let rid = self.partitions.container_rid().await?;
				let partitions = self.partitions.resolve_ranges(false).await?;
				Ok::<_, ChangeFeedError>((rid, partitions))
			} => resolved?,
		};
		CompositeContinuationToken::new(rid, &partitions)
	}
}

fn into_response(page: FeedRangePage, continuation: String, request_charge: f64) -> ChangeFeedResponse {
	match page {
		FeedRangePage::Success {
			documents,
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
		FeedRangePage::NotModified {
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
	}
}
