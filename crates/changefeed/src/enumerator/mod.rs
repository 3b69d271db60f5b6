// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Pull based reader over every feed range of a state.
//!
//! Each call to [`CrossPartitionEnumerator::next_page`] reads one range, the
//! one under the rotation cursor, and moves the cursor on so every range is
//! visited once before any is visited again. When the server answers that
//! a range is gone the partition map is refreshed and the range is replaced
//! by its children, all resuming from the position of the parent.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::{
	config::ChangeFeedOptions,
	error::{ChangeFeedError, Result},
	page::ChangeFeedPage,
	position::FeedRangeState,
	routing::{self, PartitionMapProvider},
	state::CrossFeedRangeState,
	transport::{FeedTransport, TransportError},
};

mod rotation;

pub use rotation::Rotation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumeratorStatus {
	Uninitialized,
	Active,
	/// A non retriable error ended the feed
	Exhausted,
	/// The state can no longer be read
	Faulted,
}

#[derive(Debug, Clone)]
enum Lifecycle {
	Uninitialized(CrossFeedRangeState),
	Active(Rotation),
	Exhausted {
		rotation: Rotation,
		reason: String,
	},
	Faulted {
		state: CrossFeedRangeState,
		error: ChangeFeedError,
	},
}

pub struct CrossPartitionEnumerator {
	transport: Arc<dyn FeedTransport>,
	partitions: Arc<dyn PartitionMapProvider>,
	options: ChangeFeedOptions,
	lifecycle: Lifecycle,
}

impl CrossPartitionEnumerator {
	pub fn new(
		transport: Arc<dyn FeedTransport>,
		partitions: Arc<dyn PartitionMapProvider>,
		state: CrossFeedRangeState,
		options: ChangeFeedOptions,
	) -> Self {
		Self {
			transport,
			partitions,
			options,
			lifecycle: Lifecycle::Uninitialized(state),
		}
	}

	pub fn options(&self) -> &ChangeFeedOptions {
		&self.options
	}

	pub fn status(&self) -> EnumeratorStatus {
		match self.lifecycle {
			Lifecycle::Uninitialized(_) => EnumeratorStatus::Uninitialized,
			Lifecycle::Active(_) => EnumeratorStatus::Active,
			Lifecycle::Exhausted {
				..
			} => EnumeratorStatus::Exhausted,
			Lifecycle::Faulted {
				..
			} => EnumeratorStatus::Faulted,
		}
	}

	pub fn has_more_results(&self) -> bool {
		matches!(self.status(), EnumeratorStatus::Uninitialized | EnumeratorStatus::Active)
	}

	/// The last committed state. Reading resumes from here after a failure.
	pub fn state(&self) -> CrossFeedRangeState {
		match &self.lifecycle {
			Lifecycle::Uninitialized(state) => state.clone(),
			Lifecycle::Active(rotation) => rotation.to_state(),
			Lifecycle::Exhausted {
				rotation,
				..
			} => rotation.to_state(),
			Lifecycle::Faulted {
				state,
				..
			} => state.clone(),
		}
	}

	/// Resolves the state against the partition map. Called implicitly by the
	/// first [`CrossPartitionEnumerator::next_page`].
	#[instrument(name = "changefeed::enumerator::initialize", level = "debug", skip(self, cancel))]
	pub async fn initialize(&mut self, cancel: &CancellationToken) -> Result<()> {
		let Lifecycle::Uninitialized(state) = &self.lifecycle else {
			return Ok(());
		};
		let state = state.clone();

		if let Err(err) = self.options.mode.validate_state(&state) {
			return Err(self.fault(state, err));
		}

		let resolved = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(ChangeFeedError::Cancelled),
			resolved = routing::resolve_state(self.partitions.as_ref(), &state, false) => resolved,
		};

		match resolved {
			Ok(resolved) => {
				debug!(ranges = resolved.len(), "change feed enumerator initialized");
				self.lifecycle = Lifecycle::Active(Rotation::new(resolved));
				Ok(())
			}
			// the partition map could not be fetched, initialization is retried on the next call
			Err(err @ ChangeFeedError::Transport(_)) => Err(err),
			Err(err) => Err(self.fault(state, err)),
		}
	}

	/// Reads the next page. The state attached to the page is the state to
	/// persist; nothing is committed when the call fails or is cancelled.
	#[instrument(name = "changefeed::enumerator::next_page", level = "debug", skip(self, cancel))]
	pub async fn next_page(&mut self, cancel: &CancellationToken) -> Result<ChangeFeedPage> {
		if matches!(self.lifecycle, Lifecycle::Uninitialized(_)) {
			self.initialize(cancel).await?;
		}

		let mut rotation = match &self.lifecycle {
			Lifecycle::Active(rotation) => rotation.clone(),
			Lifecycle::Exhausted {
				reason,
				..
			} => {
				return Err(ChangeFeedError::Closed {
					reason: reason.clone(),
				});
			}
			Lifecycle::Faulted {
				error,
				..
			} => {
				return Err(ChangeFeedError::Closed {
					reason: error.to_string(),
				});
			}
			Lifecycle::Uninitialized(_) => {
				return Err(ChangeFeedError::Closed {
					reason: "enumerator is not initialized".to_string(),
				});
			}
		};

		let mut visited = 0usize;
		let mut request_charge = 0.0;
		let mut recovering: Option<FeedRangeState> = None;

		loop {
			let current = rotation.current().clone();
			let request = self.options.mode.shape(&current, &self.options);
			trace!(range = %current.range, position = %current.position, "reading feed range");

			let result = tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(ChangeFeedError::Cancelled),
				result = self.transport.read_range(&request) => result,
			};

			match result {
				Ok(page) => {
					request_charge += page.request_charge();
					visited += 1;
					rotation = rotation.advance(page.position().clone());
					recovering = None;

					if page.is_not_modified() && self.options.coalesce_not_modified && visited < rotation.len() {
						continue;
					}

					let state = rotation.to_state();
					self.lifecycle = Lifecycle::Active(rotation);
					return Ok(ChangeFeedPage::from_range_page(page, state, request_charge));
				}
				Err(err) if err.is_partition_gone() => {
					request_charge += err.request_charge;

					if recovering.as_ref() == Some(&current) {
						error!(range = %current.range, "feed range still gone after partition map refresh");
						let err = ChangeFeedError::SplitRecoveryFailed {
							range: current.range,
						};
						return Err(self.fault(self.state(), err));
					}

					warn!(range = %current.range, "feed range is gone, refreshing partition map");
					let children = match self.resolve_children(&current, cancel).await {
						Ok(children) => children,
						Err(err @ (ChangeFeedError::Cancelled | ChangeFeedError::Transport(_))) => {
							return Err(err);
						}
						Err(err) => return Err(self.fault(self.state(), err)),
					};
					debug!(range = %current.range, children = children.len(), "replacing gone feed range");

					rotation = rotation.replace_current(children);
					recovering = Some(rotation.current().clone());
				}
				Err(err) => {
					let committed = rotation_of(&self.lifecycle);
					return Err(self.surface(committed, err));
				}
			}
		}
	}

	async fn resolve_children(
		&self,
		gone: &FeedRangeState,
		cancel: &CancellationToken,
	) -> Result<Vec<FeedRangeState>> {
		let partitions = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(ChangeFeedError::Cancelled),
			partitions = self.partitions.resolve_ranges(true) => partitions?,
		};

		let children: Vec<FeedRangeState> = routing::overlapping_ranges(&gone.range, &partitions)
			.into_iter()
			.map(|child| FeedRangeState::new(child.range, gone.position.clone()))
			.collect();

		if children.is_empty() {
			return Err(ChangeFeedError::SplitRecoveryFailed {
				range: gone.range.clone(),
			});
		}
		Ok(children)
	}

	fn fault(&mut self, state: CrossFeedRangeState, err: ChangeFeedError) -> ChangeFeedError {
		self.lifecycle = Lifecycle::Faulted {
			state,
			error: err.clone(),
		};
		err
	}

	/// Non retriable transport errors end the feed, the committed state stays
	/// available for a restart
	fn surface(&mut self, committed: Option<Rotation>, err: TransportError) -> ChangeFeedError {
		if !err.is_retriable() {
			if let Some(rotation) = committed {
				warn!(status = err.status, sub_status = err.sub_status, "change feed exhausted");
				self.lifecycle = Lifecycle::Exhausted {
					rotation,
					reason: err.to_string(),
				};
			}
		}
		ChangeFeedError::Transport(err)
	}
}

fn rotation_of(lifecycle: &Lifecycle) -> Option<Rotation> {
	match lifecycle {
		Lifecycle::Active(rotation) => Some(rotation.clone()),
		_ => None,
	}
}
