// SPDX-License-Identifier: MIT
// Copyright (c) 2025 ReifyDB

use std::fmt::Write;

use crate::error::diagnostic::Diagnostic;

pub struct DefaultRenderer;

impl DefaultRenderer {
	pub fn render_string(diagnostic: &Diagnostic) -> String {
		let mut out = String::new();
		Self::render(&mut out, diagnostic, 0);
		out
	}

	fn render(out: &mut String, diagnostic: &Diagnostic, depth: usize) {
		let indent = "  ".repeat(depth);
		let _ = writeln!(out, "{}[{}] {}", indent, diagnostic.code, diagnostic.message);
		if let Some(label) = &diagnostic.label {
			let _ = writeln!(out, "{}  = {}", indent, label);
		}
		for note in &diagnostic.notes {
			let _ = writeln!(out, "{}  note: {}", indent, note);
		}
		if let Some(help) = &diagnostic.help {
			let _ = writeln!(out, "{}  help: {}", indent, help);
		}
		if let Some(cause) = &diagnostic.cause {
			let _ = writeln!(out, "{}  caused by:", indent);
			Self::render(out, cause, depth + 1);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::diagnostic::range;

	#[test]
	fn test_render_includes_code_and_help() {
		let rendered = DefaultRenderer::render_string(&range::empty_range("AA", "AA"));
		assert!(rendered.starts_with("[RANGE_001]"));
		assert!(rendered.contains("help: Use EpkRange::full()"));
	}

	#[test]
	fn test_render_nests_cause() {
		let diagnostic = range::invalid_bound("zz").with_cause(range::out_of_key_space("FFF"));
		let rendered = DefaultRenderer::render_string(&diagnostic);
		assert!(rendered.contains("caused by:"));
		assert!(rendered.contains("  [RANGE_003]"));
	}
}
