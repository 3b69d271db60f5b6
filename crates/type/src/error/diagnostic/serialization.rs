// SPDX-License-Identifier: MIT
// Copyright (c) 2025 ReifyDB

use crate::error::diagnostic::Diagnostic;

/// JSON encoding or decoding failed
pub fn json_error(err: serde_json::Error) -> Diagnostic {
	Diagnostic {
		code: "SERIALIZATION_001".to_string(),
		message: format!("JSON error: {}", err),
		label: None,
		help: Some("Check that the input is well-formed JSON".to_string()),
		notes: vec![format!("line {}, column {}", err.line(), err.column())],
		cause: None,
	}
}
