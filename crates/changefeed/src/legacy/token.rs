// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{
	fmt::{Display, Formatter},
	str::FromStr,
};

use serde::Deserialize;
use serde_json::{Map, Value, json};
use shardfeed_type::{EpkRange, FeedRange, PartitionKeyRange};
use tracing::{debug, warn};

use crate::{
	error::{ChangeFeedError, Result},
	position::{ChangeFeedPosition, FeedRangeState},
	routing::{self, PartitionMapProvider},
	state::{CrossFeedRangeState, find_overlap},
	token::LEGACY_VERSION,
	transport::TransportError,
};

/// Resume point of one partition key range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeContinuationEntry {
	pub partition_key_range_id: String,
	/// `None` until the range has been read once
	pub token: Option<String>,
	pub range: EpkRange,
}

impl CompositeContinuationEntry {
	pub fn new(partition_key_range_id: impl Into<String>, token: Option<String>, range: EpkRange) -> Self {
		Self {
			partition_key_range_id: partition_key_range_id.into(),
			token,
			range,
		}
	}
}

#[derive(Debug, Deserialize)]
struct EntryRecord {
	#[serde(default, rename = "pkRangeId")]
	partition_key_range_id: Option<String>,
	#[serde(default)]
	token: Option<String>,
	range: RangeRecord,
}

#[derive(Debug, Deserialize)]
struct RangeRecord {
	min: String,
	max: String,
}

/// What the last read of the current entry returned
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
	Success,
	NotModified,
	Failed(TransportError),
}

/// Continuation of a reader that walks partition key ranges in a queue. The
/// entry under `current` is read next; entries rotate breadth-first.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeContinuationToken {
	container_rid: String,
	entries: Vec<CompositeContinuationEntry>,
	current: usize,
	/// First range that answered not modified in the running sweep
	not_modified_marker: Option<EpkRange>,
}

impl CompositeContinuationToken {
	/// One entry per partition, none of them read yet
	pub fn new(container_rid: impl Into<String>, partitions: &[PartitionKeyRange]) -> Result<Self> {
		let entries = partitions
			.iter()
			.map(|partition| CompositeContinuationEntry::new(partition.id.clone(), None, partition.range.clone()))
			.collect();
		Self::from_entries(container_rid, entries)
	}

	pub fn from_entries(container_rid: impl Into<String>, entries: Vec<CompositeContinuationEntry>) -> Result<Self> {
		if entries.is_empty() {
			return Err(ChangeFeedError::invalid_argument("a composite token needs at least one range"));
		}
		for (idx, left) in entries.iter().enumerate() {
			if let Some(right) = entries[idx + 1..].iter().find(|right| right.range.overlaps(&left.range)) {
				return Err(ChangeFeedError::Overlap {
					first: FeedRange::Epk(left.range.clone()),
					second: FeedRange::Epk(right.range.clone()),
				});
			}
		}
		Ok(Self {
			container_rid: container_rid.into(),
			entries,
			current: 0,
			not_modified_marker: None,
		})
	}

	/// Converts a cross range state. Ranges must be spans of the key space;
	/// positions other than a continuation are written as unread entries.
	pub fn from_state(container_rid: impl Into<String>, state: &CrossFeedRangeState) -> Result<Self> {
		let mut entries = Vec::with_capacity(state.len());
		for range_state in state {
			let range = range_state.range.as_epk().ok_or_else(|| {
				ChangeFeedError::invalid_argument(format!(
					"{} cannot be expressed in a composite continuation token",
					range_state.range
				))
			})?;
			entries.push(CompositeContinuationEntry::new(
				"",
				range_state.position.as_continuation().map(str::to_string),
				range.clone(),
			));
		}
		Self::from_entries(container_rid, entries)
	}

	pub fn container_rid(&self) -> &str {
		&self.container_rid
	}

	pub fn entries(&self) -> &[CompositeContinuationEntry] {
		&self.entries
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// The entry read next, `None` once every entry was retired
	pub fn current(&self) -> Option<&CompositeContinuationEntry> {
		self.entries.get(self.current)
	}

	pub fn is_done(&self) -> bool {
		self.entries.is_empty()
	}

	/// Smallest span covering every entry
	pub fn complete_range(&self) -> Option<EpkRange> {
		let mut ranges = self.entries.iter().map(|entry| &entry.range);
		let first = ranges.next()?.clone();
		Some(ranges.fold(first, |span, range| span.span(range)))
	}

	pub fn move_to_next(&mut self) {
		if !self.entries.is_empty() {
			self.current = (self.current + 1) % self.entries.len();
		}
	}

	/// Stores the token of the current entry and moves on. `None` retires
	/// the entry, the feed of that range is complete.
	pub fn update_continuation(&mut self, token: Option<String>) {
		if self.entries.is_empty() {
			return;
		}
		match token {
			Some(token) => {
				self.entries[self.current].token = Some(token);
				self.move_to_next();
			}
			None => {
				self.entries.remove(self.current);
				if self.current >= self.entries.len() {
					self.current = 0;
				}
			}
		}
	}

	/// One token per entry, each covering a single range. Empty when there
	/// is nothing to divide.
	pub fn scale(&self) -> Vec<CompositeContinuationToken> {
		if self.entries.len() <= 1 {
			return Vec::new();
		}
		self.rotated_entries()
			.map(|entry| CompositeContinuationToken {
				container_rid: self.container_rid.clone(),
				entries: vec![entry.clone()],
				current: 0,
				not_modified_marker: None,
			})
			.collect()
	}

	/// Decides whether the reader should read the next entry before
	/// returning to its caller. Not modified answers keep the sweep going
	/// until every entry was asked once; a gone range is split first.
	pub async fn should_retry(&mut self, outcome: &ReadOutcome, partitions: &dyn PartitionMapProvider) -> Result<bool> {
		match outcome {
			ReadOutcome::Success => {
				self.not_modified_marker = None;
				Ok(false)
			}
			ReadOutcome::NotModified => {
				let Some(current) = self.current() else {
					return Ok(false);
				};
				match &self.not_modified_marker {
					None => {
						self.not_modified_marker = Some(current.range.clone());
						Ok(self.entries.len() > 1)
					}
					Some(marker) => {
						let cycled = *marker == current.range;
						if cycled {
							self.not_modified_marker = None;
						}
						Ok(!cycled)
					}
				}
			}
			ReadOutcome::Failed(err) if err.is_partition_gone() => {
				self.handle_split(partitions).await?;
				Ok(true)
			}
			ReadOutcome::Failed(_) => Ok(false),
		}
	}

	/// Replaces the current entry with the partitions now covering it. The
	/// first child takes its place, the others join the back of the queue.
	pub async fn handle_split(&mut self, partitions: &dyn PartitionMapProvider) -> Result<()> {
		let Some(current) = self.current().cloned() else {
			return Ok(());
		};

		let map = partitions.resolve_ranges(true).await?;
		let children = routing::overlapping_ranges(&FeedRange::Epk(current.range.clone()), &map);

		let mut children = children.into_iter().filter_map(|child| {
			child.range.as_epk().cloned().map(|range| {
				CompositeContinuationEntry::new(child.partition_id, current.token.clone(), range)
			})
		});

		let Some(first) = children.next() else {
			warn!(range = %current.range, "no partition covers the gone range");
			return Err(ChangeFeedError::SplitRecoveryFailed {
				range: FeedRange::Epk(current.range),
			});
		};

		self.entries[self.current] = first;
		let before = self.entries.len();
		self.entries.extend(children);
		debug!(range = %current.range, children = self.entries.len() - before + 1, "split composite token entry");

		self.not_modified_marker = None;
		Ok(())
	}

	/// Entries starting at the one read next
	fn rotated_entries(&self) -> impl Iterator<Item = &CompositeContinuationEntry> {
		self.entries[self.current..].iter().chain(self.entries[..self.current].iter())
	}

	/// Cross range state starting at the entry read next. Unread entries
	/// resume from `unread`.
	pub fn to_state_with(&self, unread: &ChangeFeedPosition) -> Result<CrossFeedRangeState> {
		let ranges = self
			.rotated_entries()
			.map(|entry| {
				let position = match &entry.token {
					Some(token) => ChangeFeedPosition::continuation(token.clone()),
					None => unread.clone(),
				};
				FeedRangeState::new(FeedRange::Epk(entry.range.clone()), position)
			})
			.collect();
		CrossFeedRangeState::new(ranges)
	}

	pub fn to_state(&self) -> Result<CrossFeedRangeState> {
		self.to_state_with(&ChangeFeedPosition::Beginning)
	}

	fn to_value(&self) -> Value {
		let entries: Vec<Value> = self
			.rotated_entries()
			.map(|entry| {
				let mut record = Map::new();
				if !entry.partition_key_range_id.is_empty() {
					record.insert("pkRangeId".to_string(), Value::String(entry.partition_key_range_id.clone()));
				}
				record.insert(
					"token".to_string(),
					entry.token.clone().map(Value::String).unwrap_or(Value::Null),
				);
				record.insert("range".to_string(), json!({ "min": entry.range.min(), "max": entry.range.max() }));
				Value::Object(record)
			})
			.collect();

		json!({
			"V": LEGACY_VERSION,
			"Rid": self.container_rid,
			"Continuation": entries,
		})
	}
}

impl Display for CompositeContinuationToken {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.to_value())
	}
}

impl FromStr for CompositeContinuationToken {
	type Err = ChangeFeedError;

	fn from_str(text: &str) -> Result<Self> {
		#[derive(Deserialize)]
		struct Envelope {
			#[serde(rename = "V")]
			version: u64,
			#[serde(rename = "Rid")]
			rid: String,
			#[serde(rename = "Continuation")]
			continuation: Value,
		}

		let envelope: Envelope = serde_json::from_str(text)
			.map_err(|err| ChangeFeedError::malformed(format!("not a composite continuation token: {}", err)))?;
		if envelope.version != LEGACY_VERSION {
			return Err(ChangeFeedError::malformed(format!(
				"composite continuation tokens have version {}, got {}",
				LEGACY_VERSION, envelope.version
			)));
		}

		let entries = parse_entries(envelope.continuation)?;
		Self::from_entries(envelope.rid, entries).map_err(|err| ChangeFeedError::malformed(err.to_string()))
	}
}

fn parse_entries(value: Value) -> Result<Vec<CompositeContinuationEntry>> {
	let records: Vec<EntryRecord> = serde_json::from_value(value)
		.map_err(|err| ChangeFeedError::malformed(format!("composite continuation entries: {}", err)))?;
	if records.is_empty() {
		return Err(ChangeFeedError::malformed("composite continuation has no ranges"));
	}

	records.into_iter()
		.map(|record| {
			let range = EpkRange::new(record.range.min, record.range.max)
				.map_err(|err| ChangeFeedError::malformed(err.message.clone()))?;
			Ok(CompositeContinuationEntry::new(
				record.partition_key_range_id.unwrap_or_default(),
				record.token,
				range,
			))
		})
		.collect()
}

/// Migrates the continuation array of a version 1 token into a state
pub(crate) fn state_from_entries(value: Value) -> Result<CrossFeedRangeState> {
	let ranges: Vec<FeedRangeState> = parse_entries(value)?
		.into_iter()
		.map(|entry| {
			let position = match entry.token {
				Some(token) => ChangeFeedPosition::Continuation(token),
				None => ChangeFeedPosition::Beginning,
			};
			FeedRangeState::new(FeedRange::Epk(entry.range), position)
		})
		.collect();

	if let Some((first, second)) = find_overlap(&ranges) {
		return Err(ChangeFeedError::malformed(format!("feed ranges {} and {} overlap", first, second)));
	}
	CrossFeedRangeState::new(ranges).map_err(|err| ChangeFeedError::malformed(err.to_string()))
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex;

	use async_trait::async_trait;

	use super::*;
	use crate::transport::status;

	struct Map {
		ranges: Mutex<Vec<PartitionKeyRange>>,
	}

	impl Map {
		fn new(ranges: Vec<PartitionKeyRange>) -> Self {
			Self {
				ranges: Mutex::new(ranges),
			}
		}

		fn set(&self, ranges: Vec<PartitionKeyRange>) {
			*self.ranges.lock().unwrap() = ranges;
		}
	}

	#[async_trait]
	impl PartitionMapProvider for Map {
		async fn resolve_ranges(&self, _force_refresh: bool) -> std::result::Result<Vec<PartitionKeyRange>, TransportError> {
			Ok(self.ranges.lock().unwrap().clone())
		}

		async fn container_rid(&self) -> std::result::Result<String, TransportError> {
			Ok("rid".to_string())
		}
	}

	fn epk(min: &str, max: &str) -> EpkRange {
		EpkRange::new(min, max).unwrap()
	}

	fn pkr(id: &str, min: &str, max: &str) -> PartitionKeyRange {
		PartitionKeyRange::new(id, epk(min, max))
	}

	fn two_ranges() -> CompositeContinuationToken {
		CompositeContinuationToken::new("rid", &[pkr("0", "A", "C"), pkr("1", "C", "F")]).unwrap()
	}

	#[tokio::test]
	async fn test_should_retry_sweeps_not_modified_once() {
		let map = Map::new(vec![]);
		let mut token = two_ranges();

		// first not modified: the other range has not been asked yet
		assert!(token.should_retry(&ReadOutcome::NotModified, &map).await.unwrap());
		token.update_continuation(Some("\"1\"".to_string()));
		assert_eq!(token.current().unwrap().range, epk("C", "F"));

		assert!(token.should_retry(&ReadOutcome::NotModified, &map).await.unwrap());
		token.update_continuation(Some("\"2\"".to_string()));

		// back at the marker
		assert!(!token.should_retry(&ReadOutcome::NotModified, &map).await.unwrap());
	}

	#[tokio::test]
	async fn test_should_retry_single_range() {
		let map = Map::new(vec![]);
		let mut token = CompositeContinuationToken::new("rid", &[pkr("0", "", "FF")]).unwrap();
		assert!(!token.should_retry(&ReadOutcome::NotModified, &map).await.unwrap());
	}

	#[tokio::test]
	async fn test_success_clears_marker() {
		let map = Map::new(vec![]);
		let mut token = two_ranges();

		assert!(token.should_retry(&ReadOutcome::NotModified, &map).await.unwrap());
		token.update_continuation(Some("\"1\"".to_string()));
		assert!(!token.should_retry(&ReadOutcome::Success, &map).await.unwrap());
		token.update_continuation(Some("\"2\"".to_string()));

		// a fresh sweep starts at "A"
		assert!(token.should_retry(&ReadOutcome::NotModified, &map).await.unwrap());
	}

	#[tokio::test]
	async fn test_non_gone_failure_does_not_retry() {
		let map = Map::new(vec![]);
		let mut token = two_ranges();
		let outcome = ReadOutcome::Failed(TransportError::new(status::TOO_MANY_REQUESTS, "throttled"));
		assert!(!token.should_retry(&outcome, &map).await.unwrap());
		assert_eq!(token.len(), 2);
	}

	#[tokio::test]
	async fn test_split_replaces_in_place_and_appends() {
		let map = Map::new(vec![pkr("1", "C", "F"), pkr("2", "A", "B"), pkr("3", "B", "C")]);
		let mut token = two_ranges();
		token.update_continuation(Some("\"5\"".to_string()));
		token.update_continuation(Some("\"9\"".to_string()));
		assert_eq!(token.current().unwrap().range, epk("A", "C"));

		assert!(token.should_retry(&ReadOutcome::Failed(TransportError::gone("split")), &map).await.unwrap());

		let entries = token.entries();
		assert_eq!(entries.len(), 3);
		assert_eq!(entries[0], CompositeContinuationEntry::new("2", Some("\"5\"".to_string()), epk("A", "B")));
		assert_eq!(entries[1].range, epk("C", "F"));
		assert_eq!(entries[2], CompositeContinuationEntry::new("3", Some("\"5\"".to_string()), epk("B", "C")));
		assert_eq!(token.current().unwrap().range, epk("A", "B"));
	}

	#[tokio::test]
	async fn test_split_resets_sweep_marker() {
		let map = Map::new(vec![pkr("0", "A", "C"), pkr("1", "C", "F")]);
		let mut token = two_ranges();

		assert!(token.should_retry(&ReadOutcome::NotModified, &map).await.unwrap());
		token.update_continuation(Some("\"1\"".to_string()));
		token.update_continuation(Some("\"2\"".to_string()));

		map.set(vec![pkr("2", "A", "B"), pkr("3", "B", "C"), pkr("1", "C", "F")]);
		assert!(token.should_retry(&ReadOutcome::Failed(TransportError::gone("split")), &map).await.unwrap());

		// the first not modified after the split starts a new sweep
		assert!(token.should_retry(&ReadOutcome::NotModified, &map).await.unwrap());
		assert_eq!(token.not_modified_marker, Some(epk("A", "B")));
	}

	#[tokio::test]
	async fn test_split_without_children_fails() {
		let map = Map::new(vec![pkr("1", "C", "F")]);
		let mut token = two_ranges();
		let err = token.should_retry(&ReadOutcome::Failed(TransportError::gone("split")), &map).await.unwrap_err();
		assert!(matches!(err, ChangeFeedError::SplitRecoveryFailed { .. }));
	}

	#[test]
	fn test_retire_entries_until_done() {
		let mut token = two_ranges();
		token.update_continuation(None);
		assert_eq!(token.len(), 1);
		assert_eq!(token.current().unwrap().range, epk("C", "F"));
		token.update_continuation(None);
		assert!(token.is_done());
		assert!(token.current().is_none());
		assert!(token.complete_range().is_none());
	}

	#[test]
	fn test_scale() {
		let token = two_ranges();
		let scaled = token.scale();
		assert_eq!(scaled.len(), 2);
		assert_eq!(scaled[0].entries()[0].range, epk("A", "C"));
		assert_eq!(scaled[1].entries()[0].range, epk("C", "F"));

		let single = CompositeContinuationToken::new("rid", &[pkr("0", "", "FF")]).unwrap();
		assert!(single.scale().is_empty());
	}

	#[test]
	fn test_complete_range() {
		assert_eq!(two_ranges().complete_range(), Some(epk("A", "F")));
	}

	#[test]
	fn test_text_round_trip_keeps_rotation() {
		let mut token = two_ranges();
		token.update_continuation(Some("\"3\"".to_string()));

		let text = token.to_string();
		let parsed: CompositeContinuationToken = text.parse().unwrap();
		assert_eq!(parsed.container_rid(), "rid");
		assert_eq!(parsed.current().unwrap().range, epk("C", "F"));
		assert_eq!(parsed.entries()[1].token.as_deref(), Some("\"3\""));
		assert_eq!(parsed.to_string(), text);
	}

	#[test]
	fn test_parse_rejects_bad_tokens() {
		for text in [
			"",
			"[]",
			r#"{"V":2,"Rid":"r","Continuation":[]}"#,
			r#"{"V":1,"Rid":"r","Continuation":[]}"#,
			r#"{"V":1,"Rid":"r","Continuation":[{"token":null,"range":{"min":"C","max":"A"}}]}"#,
			r#"{"V":1,"Rid":"r","Continuation":[{"token":null,"range":{"min":"","max":"C"}},{"token":null,"range":{"min":"B","max":"FF"}}]}"#,
		] {
			let err = text.parse::<CompositeContinuationToken>().unwrap_err();
			assert!(matches!(err, ChangeFeedError::MalformedContinuation { .. }), "{text}");
		}
	}

	#[test]
	fn test_state_conversion() {
		let mut token = two_ranges();
		token.update_continuation(Some("\"3\"".to_string()));

		let state = token.to_state().unwrap();
		assert_eq!(state.ranges()[0].position, ChangeFeedPosition::Beginning);
		assert_eq!(state.ranges()[1].position, ChangeFeedPosition::continuation("\"3\""));

		let back = CompositeContinuationToken::from_state("rid", &state).unwrap();
		assert_eq!(back.to_state().unwrap(), state);

		let pk = CrossFeedRangeState::from_beginning_of(FeedRange::partition_key("k"));
		assert!(CompositeContinuationToken::from_state("rid", &pk).is_err());
	}
}
