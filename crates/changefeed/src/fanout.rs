// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use tracing::debug;

use crate::{
	error::{ChangeFeedError, Result},
	mode::{ChangeFeedMode, SplitStrategy},
	routing::{self, PartitionMapProvider},
	state::CrossFeedRangeState,
};

/// Divides `state` between at most `workers` independent readers. The state
/// is resolved against the partition map first so a single full range state
/// can be spread over every partition.
pub async fn fan_out(
	partitions: &dyn PartitionMapProvider,
	state: &CrossFeedRangeState,
	workers: usize,
	mode: ChangeFeedMode,
) -> Result<Vec<CrossFeedRangeState>> {
	if workers == 0 {
		return Err(ChangeFeedError::invalid_argument("fan out needs at least one worker"));
	}

	let resolved = routing::resolve_state(partitions, state, false).await?;
	let groups = match mode.split_strategy() {
		SplitStrategy::Balanced => resolved.split(workers.min(resolved.len()))?,
		SplitStrategy::PerRange => resolved.split(resolved.len())?,
	};

	debug!(ranges = resolved.len(), groups = groups.len(), ?mode, "fanned out change feed state");
	Ok(groups)
}
