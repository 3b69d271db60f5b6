// SPDX-License-Identifier: MIT
// Copyright (c) 2025 ReifyDB

use crate::error::diagnostic::Diagnostic;

/// Range bounds are empty or reversed
pub fn empty_range(min: &str, max: &str) -> Diagnostic {
	Diagnostic {
		code: "RANGE_001".to_string(),
		message: format!("Feed range [{:?}, {:?}) is empty", min, max),
		label: Some("min must be strictly smaller than max".to_string()),
		help: Some("Use EpkRange::full() to address the whole key space".to_string()),
		notes: vec![],
		cause: None,
	}
}

/// Range bound is not an effective partition key
pub fn invalid_bound(bound: &str) -> Diagnostic {
	Diagnostic {
		code: "RANGE_002".to_string(),
		message: format!("{:?} is not a valid effective partition key", bound),
		label: None,
		help: Some("Effective partition keys are upper-case hexadecimal strings".to_string()),
		notes: vec![format!("Valid keys lie between \"\" and \"{}\"", crate::range::MAX_EPK)],
		cause: None,
	}
}

/// Range bound lies past the end of the key space
pub fn out_of_key_space(bound: &str) -> Diagnostic {
	Diagnostic {
		code: "RANGE_003".to_string(),
		message: format!("Bound {:?} lies outside the key space", bound),
		label: None,
		help: Some(format!("The largest upper bound is \"{}\"", crate::range::MAX_EPK)),
		notes: vec![],
		cause: None,
	}
}
