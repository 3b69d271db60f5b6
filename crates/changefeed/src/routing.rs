// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Mapping feed ranges onto the physical partitions of a container.

use std::{
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
	time::Instant,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use shardfeed_type::{FeedRange, PartitionKeyRange, range::effective_partition_key};
use tracing::{debug, instrument};

use crate::{
	config::PartitionMapCacheConfig,
	error::{ChangeFeedError, Result},
	position::FeedRangeState,
	state::CrossFeedRangeState,
	transport::TransportError,
};

/// Source of the container's partition map
#[async_trait]
pub trait PartitionMapProvider: Send + Sync {
	/// Current partitions. With `force_refresh` cached answers must not be used.
	async fn resolve_ranges(&self, force_refresh: bool) -> std::result::Result<Vec<PartitionKeyRange>, TransportError>;

	/// Resource id of the container the partitions belong to
	async fn container_rid(&self) -> std::result::Result<String, TransportError>;
}

#[async_trait]
impl<T: PartitionMapProvider + ?Sized> PartitionMapProvider for Arc<T> {
	async fn resolve_ranges(&self, force_refresh: bool) -> std::result::Result<Vec<PartitionKeyRange>, TransportError> {
		(**self).resolve_ranges(force_refresh).await
	}

	async fn container_rid(&self) -> std::result::Result<String, TransportError> {
		(**self).container_rid().await
	}
}

struct CachedRanges {
	ranges: Vec<PartitionKeyRange>,
	fetched_at: Instant,
}

/// Partition map shared by every reader of a container. Lookups are served
/// from memory until a refresh is forced or the ttl expires.
pub struct CachedPartitionMap<P> {
	source: P,
	config: PartitionMapCacheConfig,
	ranges: RwLock<Option<CachedRanges>>,
	rid: RwLock<Option<String>>,
	fetches: AtomicU64,
}

impl<P: PartitionMapProvider> CachedPartitionMap<P> {
	pub fn new(source: P) -> Self {
		Self::with_config(source, PartitionMapCacheConfig::default())
	}

	pub fn with_config(source: P, config: PartitionMapCacheConfig) -> Self {
		Self {
			source,
			config,
			ranges: RwLock::new(None),
			rid: RwLock::new(None),
			fetches: AtomicU64::new(0),
		}
	}

	/// Drops the cached map, the next lookup fetches it again
	pub fn invalidate(&self) {
		*self.ranges.write() = None;
	}

	/// Number of times the map was fetched from the source
	pub fn fetch_count(&self) -> u64 {
		self.fetches.load(Ordering::Relaxed)
	}

	fn cached(&self) -> Option<Vec<PartitionKeyRange>> {
		let guard = self.ranges.read();
		let cached = guard.as_ref()?;
		if let Some(ttl) = self.config.ttl {
			if cached.fetched_at.elapsed() >= ttl {
				return None;
			}
		}
		Some(cached.ranges.clone())
	}
}

#[async_trait]
impl<P: PartitionMapProvider> PartitionMapProvider for CachedPartitionMap<P> {
	#[instrument(name = "changefeed::routing::resolve", level = "debug", skip(self))]
	async fn resolve_ranges(&self, force_refresh: bool) -> std::result::Result<Vec<PartitionKeyRange>, TransportError> {
		if !force_refresh {
			if let Some(ranges) = self.cached() {
				return Ok(ranges);
			}
		}

		let mut ranges = self.source.resolve_ranges(true).await?;
		ranges.sort_by(|l, r| l.range.min().cmp(r.range.min()));
		self.fetches.fetch_add(1, Ordering::Relaxed);
		debug!(partitions = ranges.len(), "partition map refreshed");

		*self.ranges.write() = Some(CachedRanges {
			ranges: ranges.clone(),
			fetched_at: Instant::now(),
		});
		Ok(ranges)
	}

	async fn container_rid(&self) -> std::result::Result<String, TransportError> {
		if let Some(rid) = self.rid.read().clone() {
			return Ok(rid);
		}
		let rid = self.source.container_rid().await?;
		*self.rid.write() = Some(rid.clone());
		Ok(rid)
	}
}

/// A part of a feed range that lies within a single partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRange {
	pub partition_id: String,
	pub range: FeedRange,
}

/// Clips `range` against every partition it overlaps, in key order. A
/// logical partition resolves to itself within the partition holding it.
pub fn overlapping_ranges(range: &FeedRange, partitions: &[PartitionKeyRange]) -> Vec<ResolvedRange> {
	let mut sorted: Vec<&PartitionKeyRange> = partitions.iter().collect();
	sorted.sort_by(|l, r| l.range.min().cmp(r.range.min()));

	match range {
		FeedRange::Epk(epk) => sorted
			.into_iter()
			.filter_map(|partition| {
				epk.intersect(&partition.range).map(|clipped| ResolvedRange {
					partition_id: partition.id.clone(),
					range: FeedRange::Epk(clipped),
				})
			})
			.collect(),
		FeedRange::PartitionKey(key) => {
			let point = effective_partition_key(key);
			sorted.into_iter()
				.find(|partition| partition.range.contains_point(&point))
				.map(|partition| ResolvedRange {
					partition_id: partition.id.clone(),
					range: range.clone(),
				})
				.into_iter()
				.collect()
		}
	}
}

/// Expands every range of `state` into its per partition parts, keeping the
/// position of the range it came from
pub async fn resolve_state(
	partitions: &dyn PartitionMapProvider,
	state: &CrossFeedRangeState,
	force_refresh: bool,
) -> Result<CrossFeedRangeState> {
	let map = partitions.resolve_ranges(force_refresh).await?;

	let mut resolved = Vec::with_capacity(state.len());
	for range_state in state {
		let parts = overlapping_ranges(&range_state.range, &map);
		if parts.is_empty() {
			return Err(ChangeFeedError::malformed(format!(
				"feed range {} does not map to any partition",
				range_state.range
			)));
		}
		resolved.extend(parts.into_iter().map(|part| FeedRangeState::new(part.range, range_state.position.clone())));
	}

	CrossFeedRangeState::new(resolved).map_err(|err| ChangeFeedError::malformed(err.to_string()))
}
