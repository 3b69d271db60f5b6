// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use tracing::Level;

use crate::subsystem::TracingSubsystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
	#[default]
	Pretty,
	Json,
}

/// Configuration of the tracing subscriber
#[derive(Debug, Clone)]
pub struct TracingBuilder {
	pub(crate) level: Level,
	pub(crate) directives: Vec<String>,
	pub(crate) format: LogFormat,
	pub(crate) ansi: bool,
	pub(crate) with_target: bool,
	pub(crate) test_writer: bool,
}

impl TracingBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Level used when `RUST_LOG` is not set
	pub fn with_level(mut self, level: Level) -> Self {
		self.level = level;
		self
	}

	/// Adds a filter directive such as `shardfeed_changefeed=trace`
	pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
		self.directives.push(directive.into());
		self
	}

	pub fn with_format(mut self, format: LogFormat) -> Self {
		self.format = format;
		self
	}

	pub fn with_ansi(mut self, ansi: bool) -> Self {
		self.ansi = ansi;
		self
	}

	pub fn with_target(mut self, with_target: bool) -> Self {
		self.with_target = with_target;
		self
	}

	/// Writes through the test harness so output is captured per test
	pub fn with_test_writer(mut self) -> Self {
		self.test_writer = true;
		self
	}

	pub fn build(self) -> TracingSubsystem {
		TracingSubsystem::new(self)
	}
}

impl Default for TracingBuilder {
	fn default() -> Self {
		Self {
			level: Level::INFO,
			directives: Vec::new(),
			format: LogFormat::Pretty,
			ansi: true,
			with_target: true,
			test_writer: false,
		}
	}
}
