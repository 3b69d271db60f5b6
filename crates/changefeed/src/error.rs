// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Change feed error types and diagnostics.

use shardfeed_type::{
	FeedRange,
	error::{Diagnostic, Error, IntoDiagnostic},
};

use crate::transport::TransportError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChangeFeedError {
	#[error("malformed continuation: {reason}")]
	MalformedContinuation {
		reason: String,
	},

	#[error("cannot split {available} feed ranges into {requested} groups")]
	InsufficientRanges {
		requested: usize,
		available: usize,
	},

	#[error("feed ranges {first} and {second} overlap")]
	Overlap {
		first: FeedRange,
		second: FeedRange,
	},

	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	#[error("feed range {range} is still gone after refreshing the partition map")]
	SplitRecoveryFailed {
		range: FeedRange,
	},

	#[error(transparent)]
	Transport(#[from] TransportError),

	#[error("operation was cancelled")]
	Cancelled,

	#[error("change feed is closed: {reason}")]
	Closed {
		reason: String,
	},
}

impl ChangeFeedError {
	pub fn malformed(reason: impl Into<String>) -> Self {
		ChangeFeedError::MalformedContinuation {
			reason: reason.into(),
		}
	}

	pub fn invalid_argument(reason: impl Into<String>) -> Self {
		ChangeFeedError::InvalidArgument(reason.into())
	}

	/// True for errors after which the reader cannot make progress
	pub fn is_fatal(&self) -> bool {
		matches!(self, ChangeFeedError::MalformedContinuation { .. } | ChangeFeedError::SplitRecoveryFailed { .. })
	}
}

pub type Result<T> = std::result::Result<T, ChangeFeedError>;

impl IntoDiagnostic for ChangeFeedError {
	fn into_diagnostic(self) -> Diagnostic {
		match self {
			ChangeFeedError::MalformedContinuation {
				reason,
			} => diagnostic::malformed_continuation(reason),
			ChangeFeedError::InsufficientRanges {
				requested,
				available,
			} => diagnostic::insufficient_ranges(requested, available),
			ChangeFeedError::Overlap {
				first,
				second,
			} => diagnostic::overlap(&first, &second),
			ChangeFeedError::InvalidArgument(reason) => diagnostic::invalid_argument(reason),
			ChangeFeedError::SplitRecoveryFailed {
				range,
			} => diagnostic::split_recovery_failed(&range),
			ChangeFeedError::Transport(err) => diagnostic::transport(&err),
			ChangeFeedError::Cancelled => diagnostic::cancelled(),
			ChangeFeedError::Closed {
				reason,
			} => diagnostic::closed(reason),
		}
	}
}

impl From<ChangeFeedError> for Error {
	fn from(err: ChangeFeedError) -> Self {
		shardfeed_type::error!(err.into_diagnostic())
	}
}

pub mod diagnostic {
	use shardfeed_type::{FeedRange, error::Diagnostic};

	use crate::transport::TransportError;

	/// Continuation text could not be decoded into a state
	pub fn malformed_continuation(reason: impl Into<String>) -> Diagnostic {
		Diagnostic {
			code: "CHANGEFEED_001".to_string(),
			message: format!("Malformed continuation: {}", reason.into()),
			label: None,
			help: Some("Pass the continuation exactly as it was returned by a previous page".to_string()),
			notes: vec![],
			cause: None,
		}
	}

	/// Splitter asked for more groups than ranges
	pub fn insufficient_ranges(requested: usize, available: usize) -> Diagnostic {
		Diagnostic {
			code: "CHANGEFEED_002".to_string(),
			message: format!("Cannot split {} feed ranges into {} groups", available, requested),
			label: None,
			help: Some("Use try_split to probe whether a state can be divided".to_string()),
			notes: vec![],
			cause: None,
		}
	}

	pub fn overlap(first: &FeedRange, second: &FeedRange) -> Diagnostic {
		Diagnostic {
			code: "CHANGEFEED_003".to_string(),
			message: format!("Feed ranges {} and {} overlap", first, second),
			label: Some("merged states must cover disjoint parts of the key space".to_string()),
			help: None,
			notes: vec![],
			cause: None,
		}
	}

	pub fn invalid_argument(reason: impl Into<String>) -> Diagnostic {
		Diagnostic {
			code: "CHANGEFEED_004".to_string(),
			message: format!("Invalid argument: {}", reason.into()),
			label: None,
			help: None,
			notes: vec![],
			cause: None,
		}
	}

	/// Range stayed gone after a forced partition map refresh
	pub fn split_recovery_failed(range: &FeedRange) -> Diagnostic {
		Diagnostic {
			code: "CHANGEFEED_005".to_string(),
			message: format!("Feed range {} is still gone after refreshing the partition map", range),
			label: None,
			help: Some("Restart from the last committed continuation".to_string()),
			notes: vec![],
			cause: None,
		}
	}

	pub fn transport(err: &TransportError) -> Diagnostic {
		let mut notes = vec![format!("Request charge: {}", err.request_charge)];
		if !err.activity_id.is_empty() {
			notes.push(format!("Activity id: {}", err.activity_id));
		}

		Diagnostic {
			code: "CHANGEFEED_006".to_string(),
			message: format!("Change feed request failed with status {}.{}: {}", err.status, err.sub_status, err.message),
			label: None,
			help: if err.is_retriable() {
				Some("The request may be retried".to_string())
			} else {
				None
			},
			notes,
			cause: None,
		}
	}

	pub fn cancelled() -> Diagnostic {
		Diagnostic {
			code: "CHANGEFEED_007".to_string(),
			message: "Change feed operation was cancelled".to_string(),
			label: None,
			help: None,
			notes: vec!["No progress was recorded".to_string()],
			cause: None,
		}
	}

	pub fn closed(reason: impl Into<String>) -> Diagnostic {
		Diagnostic {
			code: "CHANGEFEED_008".to_string(),
			message: format!("Change feed is closed: {}", reason.into()),
			label: None,
			help: Some("Create a new iterator from the last continuation".to_string()),
			notes: vec![],
			cause: None,
		}
	}
}
