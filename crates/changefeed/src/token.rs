// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Versioned continuation envelopes bound to a container.
//!
//! ```text
//! {"V":2,"Rid":"<container rid>","Continuation":[<portable records>]}
//! ```
//!
//! Version 1 envelopes carry composite continuation entries and are migrated
//! when read. A bare portable array is accepted as well and is not bound to
//! any container.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
	codec,
	error::{ChangeFeedError, Result},
	legacy,
	state::CrossFeedRangeState,
};

pub const LEGACY_VERSION: u64 = 1;
pub const CURRENT_VERSION: u64 = 2;

#[derive(Debug, Deserialize)]
struct Envelope {
	#[serde(rename = "V")]
	version: u64,
	#[serde(rename = "Rid")]
	rid: String,
	#[serde(rename = "Continuation")]
	continuation: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
	/// Container the token was issued for, `None` for bare states
	pub rid: Option<String>,
	pub state: CrossFeedRangeState,
}

impl DecodedToken {
	/// Fails unless the token was issued for `rid` or is not bound to a container
	pub fn check_rid(&self, rid: &str) -> Result<()> {
		match &self.rid {
			Some(expected) if expected != rid => Err(ChangeFeedError::malformed(format!(
				"continuation was issued for container {:?}, not {:?}",
				expected, rid
			))),
			_ => Ok(()),
		}
	}
}

pub fn encode(state: &CrossFeedRangeState, rid: &str) -> String {
	json!({
		"V": CURRENT_VERSION,
		"Rid": rid,
		"Continuation": codec::to_value(state),
	})
	.to_string()
}

pub fn decode(text: &str) -> Result<DecodedToken> {
	let value: Value = serde_json::from_str(text)
		.map_err(|err| ChangeFeedError::malformed(format!("continuation is not valid JSON: {}", err)))?;

	match value {
		Value::Array(_) => Ok(DecodedToken {
			rid: None,
			state: codec::from_value(value)?,
		}),
		Value::Object(_) => {
			let envelope: Envelope = serde_json::from_value(value).map_err(|err| {
				ChangeFeedError::malformed(format!("continuation envelope is incomplete: {}", err))
			})?;
			let state = match envelope.version {
				CURRENT_VERSION => codec::from_value(envelope.continuation)?,
				LEGACY_VERSION => legacy::state_from_entries(envelope.continuation)?,
				version => {
					return Err(ChangeFeedError::malformed(format!(
						"unsupported continuation version {}",
						version
					)));
				}
			};
			Ok(DecodedToken {
				rid: Some(envelope.rid),
				state,
			})
		}
		_ => Err(ChangeFeedError::malformed("continuation must be an object or an array")),
	}
}
