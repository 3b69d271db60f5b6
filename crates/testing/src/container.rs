// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! A container that keeps its change log in memory.
//!
//! Every write appends a change with a container wide log sequence number.
//! Partitions only decide routing: a read addressing a range that is not
//! inside exactly one live partition is answered with 410/1002, the way a
//! server answers a client holding a stale partition map. Splits and merges
//! therefore never move data and never lose or repeat changes.

use std::{
	collections::HashMap,
	sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use shardfeed_changefeed::{
	ChangeFeedPosition, ChangeFeedRequest, FeedRange, FeedRangePage, FeedTransport, Headers, PartitionMapProvider,
	TransportError,
	mode::headers,
	transport::status,
};
use shardfeed_type::{
	EpkRange, PartitionKeyRange,
	range::{
		MAX_EPK, MIN_EPK,
		hash::{HASH_SPACE_END, encode_point, partition_key_hash},
	},
};
use tracing::debug;
use uuid::Uuid;

pub const SUCCESS_CHARGE: f64 = 5.0;
pub const NOT_MODIFIED_CHARGE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
	Create,
	Replace,
	Delete,
}

impl Operation {
	fn as_str(&self) -> &'static str {
		match self {
			Operation::Create => "create",
			Operation::Replace => "replace",
			Operation::Delete => "delete",
		}
	}
}

#[derive(Debug, Clone)]
struct Change {
	lsn: u64,
	partition_key: String,
	point: u64,
	id: String,
	timestamp: DateTime<Utc>,
	operation: Operation,
	document: Value,
}

#[derive(Debug, Clone)]
struct Partition {
	id: String,
	lo: u64,
	hi: u64,
}

impl Partition {
	fn range(&self) -> EpkRange {
		let bound = |point: u64| match point {
			0 => MIN_EPK.to_string(),
			HASH_SPACE_END => MAX_EPK.to_string(),
			point => encode_point(point),
		};
		EpkRange::new(bound(self.lo), bound(self.hi)).expect("partition bounds are ordered")
	}

	fn key_range(&self) -> PartitionKeyRange {
		PartitionKeyRange::new(self.id.clone(), self.range())
	}
}

struct Inner {
	partitions: Vec<Partition>,
	next_partition_id: u64,
	changes: Vec<Change>,
	lsn: u64,
	clock: DateTime<Utc>,
}

pub struct InMemoryContainer {
	rid: String,
	inner: RwLock<Inner>,
	reads: Mutex<HashMap<FeedRange, usize>>,
	map_lookups: AtomicUsize,
}

impl Default for InMemoryContainer {
	fn default() -> Self {
		Self::new()
	}
}

impl InMemoryContainer {
	pub fn new() -> Self {
		Self::with_partitions(1)
	}

	/// A container whose key space is divided into `count` equal partitions
	pub fn with_partitions(count: u64) -> Self {
		let count = count.max(1);
		let width = HASH_SPACE_END / count;
		let partitions = (0..count)
			.map(|idx| Partition {
				id: idx.to_string(),
				lo: idx * width,
				hi: if idx + 1 == count {
					HASH_SPACE_END
				} else {
					(idx + 1) * width
				},
			})
			.collect();

		Self {
			rid: Uuid::new_v4().simple().to_string(),
			inner: RwLock::new(Inner {
				partitions,
				next_partition_id: count,
				changes: Vec::new(),
				lsn: 0,
				clock: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
			}),
			reads: Mutex::new(HashMap::new()),
			map_lookups: AtomicUsize::new(0),
		}
	}

	pub fn with_rid(mut self, rid: impl Into<String>) -> Self {
		self.rid = rid.into();
		self
	}

	pub fn rid(&self) -> &str {
		&self.rid
	}

	/// Timestamp the next write receives. Every write moves the clock one
	/// second forward.
	pub fn now(&self) -> DateTime<Utc> {
		self.inner.read().clock
	}

	/// Current log sequence number
	pub fn lsn(&self) -> u64 {
		self.inner.read().lsn
	}

	pub fn create_item(&self, partition_key: &str, document: Value) -> u64 {
		self.write(partition_key, document, Operation::Create)
	}

	pub fn replace_item(&self, partition_key: &str, document: Value) -> u64 {
		self.write(partition_key, document, Operation::Replace)
	}

	pub fn delete_item(&self, partition_key: &str, id: &str) -> u64 {
		self.write(partition_key, json!({ "id": id }), Operation::Delete)
	}

	fn write(&self, partition_key: &str, document: Value, operation: Operation) -> u64 {
		let id = match document.get("id").and_then(Value::as_str) {
			Some(id) => id.to_string(),
			None => Uuid::now_v7().to_string(),
		};
		let mut document = document;
		if let Value::Object(fields) = &mut document {
			fields.insert("id".to_string(), Value::String(id.clone()));
			fields.insert("pk".to_string(), Value::String(partition_key.to_string()));
		}

		let mut inner = self.inner.write();
		inner.lsn += 1;
		let lsn = inner.lsn;
		let timestamp = inner.clock;
		inner.clock += Duration::seconds(1);
		inner.changes.push(Change {
			lsn,
			partition_key: partition_key.to_string(),
			point: partition_key_hash(partition_key),
			id,
			timestamp,
			operation,
			document,
		});
		lsn
	}

	pub fn partitions(&self) -> Vec<PartitionKeyRange> {
		self.inner.read().partitions.iter().map(Partition::key_range).collect()
	}

	/// Splits a partition at its midpoint into two new partitions
	pub fn split(&self, partition_id: &str) -> Result<(PartitionKeyRange, PartitionKeyRange), TransportError> {
		let mut inner = self.inner.write();
		let idx = inner
			.partitions
			.iter()
			.position(|partition| partition.id == partition_id)
			.ok_or_else(|| TransportError::new(status::NOT_FOUND, format!("no partition {}", partition_id)))?;

		let parent = inner.partitions[idx].clone();
		if parent.hi - parent.lo < 2 {
			return Err(TransportError::new(status::BAD_REQUEST, format!("partition {} is too small", partition_id)));
		}
		let mid = parent.lo + (parent.hi - parent.lo) / 2;

		let left = Partition {
			id: inner.next_partition_id.to_string(),
			lo: parent.lo,
			hi: mid,
		};
		let right = Partition {
			id: (inner.next_partition_id + 1).to_string(),
			lo: mid,
			hi: parent.hi,
		};
		inner.next_partition_id += 2;
		inner.partitions.splice(idx..=idx, [left.clone(), right.clone()]);

		debug!(parent = %parent.id, left = %left.id, right = %right.id, "split partition");
		Ok((left.key_range(), right.key_range()))
	}

	/// Merges two adjacent partitions into a new one
	pub fn merge(&self, left_id: &str, right_id: &str) -> Result<PartitionKeyRange, TransportError> {
		let mut inner = self.inner.write();
		let find = |id: &str| inner.partitions.iter().position(|partition| partition.id == id);
		let (Some(left), Some(right)) = (find(left_id), find(right_id)) else {
			return Err(TransportError::new(status::NOT_FOUND, "unknown partition"));
		};
		if inner.partitions[left].hi != inner.partitions[right].lo {
			return Err(TransportError::new(status::BAD_REQUEST, "partitions are not adjacent"));
		}

		let merged = Partition {
			id: inner.next_partition_id.to_string(),
			lo: inner.partitions[left].lo,
			hi: inner.partitions[right].hi,
		};
		inner.next_partition_id += 1;
		inner.partitions[left] = merged.clone();
		inner.partitions.remove(right);

		debug!(left = left_id, right = right_id, merged = %merged.id, "merged partitions");
		Ok(merged.key_range())
	}

	/// Number of reads addressed at exactly `range`
	pub fn read_count(&self, range: &FeedRange) -> usize {
		self.reads.lock().get(range).copied().unwrap_or(0)
	}

	pub fn total_reads(&self) -> usize {
		self.reads.lock().values().sum()
	}

	/// Number of partition map lookups served
	pub fn map_lookups(&self) -> usize {
		self.map_lookups.load(Ordering::SeqCst)
	}

	fn read(&self, request: &ChangeFeedRequest) -> Result<FeedRangePage, TransportError> {
		*self.reads.lock().entry(request.range.clone()).or_default() += 1;
		let activity_id = Uuid::new_v4().to_string();

		let inner = self.inner.read();

		let routed = match &request.range {
			FeedRange::Epk(range) => inner.partitions.iter().any(|partition| partition.range().contains(range)),
			FeedRange::PartitionKey(_) => true,
		};
		if !routed {
			return Err(TransportError::gone(format!("{} does not map to a single partition", request.range))
				.with_activity_id(activity_id)
				.with_request_charge(NOT_MODIFIED_CHARGE));
		}

		let after_lsn = match &request.position {
			ChangeFeedPosition::Continuation(token) => Some(parse_token(token).ok_or_else(|| {
				TransportError::new(status::BAD_REQUEST, format!("invalid continuation {:?}", token))
					.with_activity_id(activity_id.clone())
			})?),
			_ => None,
		};

		let full_fidelity = request.header(headers::A_IM) == Some(headers::FULL_FIDELITY_FEED);

		let latest: HashMap<(&str, &str), u64> =
			inner.changes.iter().map(|change| ((change.partition_key.as_str(), change.id.as_str()), change.lsn)).collect();

		let candidates = inner.changes.iter().filter(|change| {
			let in_range = match &request.range {
				FeedRange::Epk(range) => range.contains_point(&encode_point(change.point)),
				FeedRange::PartitionKey(key) => &change.partition_key == key,
			};
			let in_window = match &request.position {
				ChangeFeedPosition::Beginning => true,
				ChangeFeedPosition::Now => false,
				ChangeFeedPosition::Time(ts) => change.timestamp >= *ts,
				ChangeFeedPosition::Continuation(_) => after_lsn.is_some_and(|lsn| change.lsn > lsn),
			};
			in_range && in_window
		});

		let limit = request.page_size_limit.unwrap_or(usize::MAX).max(1);
		let mut documents = Vec::new();
		let mut last_lsn = None;
		for change in candidates {
			last_lsn = Some(change.lsn);
			if full_fidelity {
				let current = match change.operation {
					Operation::Delete => Value::Null,
					_ => change.document.clone(),
				};
				documents.push(json!({
					"current": current,
					"metadata": {
						"operationType": change.operation.as_str(),
						"lsn": change.lsn,
						"crts": change.timestamp.timestamp(),
						"id": change.id,
						"partitionKey": change.partition_key,
					},
				}));
			} else {
				let key = (change.partition_key.as_str(), change.id.as_str());
				let superseded = latest.get(&key).is_some_and(|lsn| *lsn != change.lsn);
				if change.operation != Operation::Delete && !superseded {
					documents.push(change.document.clone());
				}
			}
			if documents.len() >= limit {
				break;
			}
		}

		let position = match last_lsn {
			Some(lsn) => ChangeFeedPosition::Continuation(format_token(lsn)),
			None => match &request.position {
				ChangeFeedPosition::Now => ChangeFeedPosition::Continuation(format_token(inner.lsn)),
				position => position.clone(),
			},
		};

		let mut response_headers = Headers::new();
		response_headers.insert(headers::ACTIVITY_ID.to_string(), activity_id.clone());
		response_headers.insert(headers::ITEM_COUNT.to_string(), documents.len().to_string());
		if let Some(token) = position.as_continuation() {
			response_headers.insert(headers::ETAG.to_string(), token.to_string());
		}

		if documents.is_empty() {
			return Ok(FeedRangePage::NotModified {
				request_charge: NOT_MODIFIED_CHARGE,
				activity_id,
				headers: response_headers,
				position,
			});
		}

		Ok(FeedRangePage::Success {
			documents,
			request_charge: SUCCESS_CHARGE,
			activity_id,
			headers: response_headers,
			position,
		})
	}
}

fn format_token(lsn: u64) -> String {
	format!("\"{}\"", lsn)
}

fn parse_token(token: &str) -> Option<u64> {
	token.strip_prefix('"')?.strip_suffix('"')?.parse().ok()
}

#[async_trait]
impl FeedTransport for InMemoryContainer {
	async fn read_range(&self, request: &ChangeFeedRequest) -> Result<FeedRangePage, TransportError> {
		self.read(request)
	}
}

#[async_trait]
impl PartitionMapProvider for InMemoryContainer {
	async fn resolve_ranges(&self, _force_refresh: bool) -> Result<Vec<PartitionKeyRange>, TransportError> {
		self.map_lookups.fetch_add(1, Ordering::SeqCst);
		Ok(self.partitions())
	}

	async fn container_rid(&self) -> Result<String, TransportError> {
		Ok(self.rid.clone())
	}
}

#[cfg(test)]
mod tests {
	use shardfeed_changefeed::{ChangeFeedMode, ChangeFeedOptions, FeedRangeState};

	use super::*;

	fn request(range: FeedRange, position: ChangeFeedPosition) -> ChangeFeedRequest {
		ChangeFeedMode::Incremental.shape(&FeedRangeState::new(range, position), &ChangeFeedOptions::default())
	}

	#[test]
	fn test_partitions_tile_key_space() {
		let container = InMemoryContainer::with_partitions(3);
		let partitions = container.partitions();
		assert_eq!(partitions.len(), 3);
		assert_eq!(partitions[0].range.min(), MIN_EPK);
		assert_eq!(partitions[2].range.max(), MAX_EPK);
		assert_eq!(partitions[0].range.max(), partitions[1].range.min());
	}

	#[test]
	fn test_split_and_merge() {
		let container = InMemoryContainer::new();
		let (left, right) = container.split("0").unwrap();
		assert_eq!(left.range.min(), MIN_EPK);
		assert_eq!(left.range.max(), right.range.min());
		assert_eq!(right.range.max(), MAX_EPK);
		assert_eq!(container.partitions().len(), 2);

		let merged = container.merge(&left.id, &right.id).unwrap();
		assert!(merged.range.is_full());
		assert_eq!(container.partitions(), vec![merged]);
	}

	#[test]
	fn test_stale_range_is_gone() {
		let container = InMemoryContainer::new();
		container.create_item("a", json!({"id": "1"}));
		container.split("0").unwrap();

		let err = container.read(&request(FeedRange::full(), ChangeFeedPosition::Beginning)).unwrap_err();
		assert!(err.is_partition_gone());
	}

	#[test]
	fn test_continuation_skips_seen_changes() {
		let container = InMemoryContainer::new();
		container.create_item("a", json!({"id": "1"}));
		let page = container.read(&request(FeedRange::full(), ChangeFeedPosition::Beginning)).unwrap();
		assert!(!page.is_not_modified());

		let next = container.read(&request(FeedRange::full(), page.position().clone())).unwrap();
		assert!(next.is_not_modified());
		assert_eq!(next.position(), page.position());
	}

	#[test]
	fn test_now_returns_current_lsn() {
		let container = InMemoryContainer::new();
		container.create_item("a", json!({"id": "1"}));
		let page = container.read(&request(FeedRange::full(), ChangeFeedPosition::Now)).unwrap();
		assert!(page.is_not_modified());
		assert_eq!(page.position(), &ChangeFeedPosition::Continuation("\"1\"".to_string()));
	}

	#[test]
	fn test_incremental_hides_deletes_and_old_versions() {
		let container = InMemoryContainer::new();
		container.create_item("a", json!({"id": "1", "v": 1}));
		container.replace_item("a", json!({"id": "1", "v": 2}));
		container.create_item("a", json!({"id": "2"}));
		container.delete_item("a", "2");

		let page = container.read(&request(FeedRange::full(), ChangeFeedPosition::Beginning)).unwrap();
		let FeedRangePage::Success {
			documents,
			position,
			..
		} = page
		else {
			panic!("expected changes");
		};
		assert_eq!(documents.len(), 1);
		assert_eq!(documents[0]["v"], 2);
		assert_eq!(position, ChangeFeedPosition::Continuation("\"4\"".to_string()));
	}

	#[test]
	fn test_bad_continuation_is_rejected() {
		let container = InMemoryContainer::new();
		let err = container
			.read(&request(FeedRange::full(), ChangeFeedPosition::continuation("not-a-token")))
			.unwrap_err();
		assert_eq!(err.status, status::BAD_REQUEST);
	}
}
