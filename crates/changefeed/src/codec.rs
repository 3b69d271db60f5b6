// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Portable text form of a [`CrossFeedRangeState`].
//!
//! A state is written as a JSON array with one record per feed range:
//!
//! ```text
//! [{"kind":"continuation","max":"80","min":"","payload":"\"42\""},
//!  {"kind":"beginning","max":"FF","min":"80"}]
//! ```
//!
//! Logical partitions use `pk` instead of `min`/`max`. Time positions carry
//! `<unix seconds>.<nanoseconds>` as payload.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use shardfeed_type::{EpkRange, FeedRange};

use crate::{
	error::{ChangeFeedError, Result},
	position::{ChangeFeedPosition, FeedRangeState, PositionKind},
	state::{CrossFeedRangeState, find_overlap},
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PortableRecord {
	#[serde(default)]
	min: Option<String>,
	#[serde(default)]
	max: Option<String>,
	#[serde(default)]
	pk: Option<String>,
	kind: PositionKind,
	#[serde(default)]
	payload: Option<String>,
}

pub fn to_portable(state: &CrossFeedRangeState) -> String {
	Value::Array(state.iter().map(encode_range_state).collect()).to_string()
}

pub fn from_portable(text: &str) -> Result<CrossFeedRangeState> {
	let records: Vec<PortableRecord> = serde_json::from_str(text)
		.map_err(|err| ChangeFeedError::malformed(format!("continuation is not a list of feed ranges: {}", err)))?;
	decode_records(records)
}

/// Decodes an already parsed JSON value, as found inside token envelopes
pub(crate) fn from_value(value: Value) -> Result<CrossFeedRangeState> {
	let records: Vec<PortableRecord> = serde_json::from_value(value)
		.map_err(|err| ChangeFeedError::malformed(format!("continuation is not a list of feed ranges: {}", err)))?;
	decode_records(records)
}

pub(crate) fn to_value(state: &CrossFeedRangeState) -> Value {
	Value::Array(state.iter().map(encode_range_state).collect())
}

fn decode_records(records: Vec<PortableRecord>) -> Result<CrossFeedRangeState> {
	if records.is_empty() {
		return Err(ChangeFeedError::malformed("continuation references no feed ranges"));
	}

	let ranges = records.into_iter().map(decode_record).collect::<Result<Vec<_>>>()?;

	if let Some((first, second)) = find_overlap(&ranges) {
		return Err(ChangeFeedError::malformed(format!("feed ranges {} and {} overlap", first, second)));
	}

	Ok(CrossFeedRangeState::new_unchecked(ranges))
}

fn encode_range_state(state: &FeedRangeState) -> Value {
	let mut record = Map::new();

	match &state.range {
		FeedRange::Epk(range) => {
			record.insert("min".to_string(), Value::String(range.min().to_string()));
			record.insert("max".to_string(), Value::String(range.max().to_string()));
		}
		FeedRange::PartitionKey(key) => {
			record.insert("pk".to_string(), Value::String(key.clone()));
		}
	}

	record.insert("kind".to_string(), Value::String(state.position.kind().as_str().to_string()));

	match &state.position {
		ChangeFeedPosition::Beginning | ChangeFeedPosition::Now => {}
		ChangeFeedPosition::Time(ts) => {
			record.insert("payload".to_string(), Value::String(encode_time(ts)));
		}
		ChangeFeedPosition::Continuation(token) => {
			record.insert("payload".to_string(), Value::String(token.clone()));
		}
	}

	Value::Object(record)
}

fn decode_record(record: PortableRecord) -> Result<FeedRangeState> {
	let range = match (record.min, record.max, record.pk) {
		(Some(min), Some(max), None) => EpkRange::new(min, max)
			.map(FeedRange::Epk)
			.map_err(|err| ChangeFeedError::malformed(err.message.clone()))?,
		(None, None, Some(key)) => FeedRange::PartitionKey(key),
		_ => {
			return Err(ChangeFeedError::malformed(
				"a feed range needs either both min and max or a partition key",
			));
		}
	};

	let position = match (record.kind, record.payload) {
		(PositionKind::Beginning, None) => ChangeFeedPosition::Beginning,
		(PositionKind::Now, None) => ChangeFeedPosition::Now,
		(PositionKind::Time, Some(payload)) => ChangeFeedPosition::Time(decode_time(&payload)?),
		(PositionKind::Continuation, Some(payload)) => ChangeFeedPosition::Continuation(payload),
		(kind, payload) => {
			return Err(ChangeFeedError::malformed(format!(
				"position {} {} a payload",
				kind.as_str(),
				if payload.is_some() {
					"must not carry"
				} else {
					"requires"
				}
			)));
		}
	};

	Ok(FeedRangeState::new(range, position))
}

fn encode_time(ts: &DateTime<Utc>) -> String {
	format!("{}.{:09}", ts.timestamp(), ts.timestamp_subsec_nanos())
}

fn decode_time(payload: &str) -> Result<DateTime<Utc>> {
	let invalid = || ChangeFeedError::malformed(format!("{:?} is not a timestamp", payload));

	let (secs, nanos) = payload.split_once('.').ok_or_else(invalid)?;
	let digits = secs.strip_prefix('-').unwrap_or(secs);
	if nanos.len() != 9 || !is_digits(nanos) || !is_digits(digits) {
		return Err(invalid());
	}
	let secs: i64 = secs.parse().map_err(|_| invalid())?;
	let nanos: u32 = nanos.parse().map_err(|_| invalid())?;

	DateTime::from_timestamp(secs, nanos).ok_or_else(invalid)
}

fn is_digits(text: &str) -> bool {
	!text.is_empty() && text.bytes().all(|byte| byte.is_ascii_digit())
}
