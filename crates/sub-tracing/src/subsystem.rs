// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use shardfeed_type::{Diagnostic, Result, return_error};
use tracing_subscriber::{
	EnvFilter, Layer,
	fmt::{self, TestWriter, writer::BoxMakeWriter},
	layer::SubscriberExt,
	util::SubscriberInitExt,
};

use crate::builder::{LogFormat, TracingBuilder};

/// Installs the global tracing subscriber
pub struct TracingSubsystem {
	config: TracingBuilder,
	running: bool,
}

impl TracingSubsystem {
	pub(crate) fn new(config: TracingBuilder) -> Self {
		Self {
			config,
			running: false,
		}
	}

	pub fn config(&self) -> &TracingBuilder {
		&self.config
	}

	/// True once this subsystem installed the global subscriber
	pub fn is_running(&self) -> bool {
		self.running
	}

	/// Installs the subscriber. Returns `false` when another subscriber was
	/// installed first, which is expected when tests share a process.
	pub fn start(&mut self) -> Result<bool> {
		if self.running {
			return Ok(true);
		}

		let filter = self.filter()?;
		let writer = || {
			if self.config.test_writer {
				BoxMakeWriter::new(TestWriter::default())
			} else {
				BoxMakeWriter::new(std::io::stderr)
			}
		};

		let layer = match self.config.format {
			LogFormat::Pretty => fmt::layer()
				.with_ansi(self.config.ansi)
				.with_target(self.config.with_target)
				.with_writer(writer())
				.boxed(),
			LogFormat::Json => fmt::layer().json().with_target(self.config.with_target).with_writer(writer()).boxed(),
		};

		self.running = tracing_subscriber::registry().with(filter).with(layer).try_init().is_ok();
		Ok(self.running)
	}

	fn filter(&self) -> Result<EnvFilter> {
		let mut filter = EnvFilter::try_from_default_env()
			.unwrap_or_else(|_| EnvFilter::new(self.config.level.to_string().to_lowercase()));

		for directive in &self.config.directives {
			match directive.parse() {
				Ok(directive) => filter = filter.add_directive(directive),
				Err(err) => return_error!(invalid_directive(directive, &err.to_string())),
			}
		}
		Ok(filter)
	}
}

fn invalid_directive(directive: &str, reason: &str) -> Diagnostic {
	Diagnostic {
		code: "TRACING_001".to_string(),
		message: format!("Invalid log filter directive {:?}: {}", directive, reason),
		label: None,
		help: Some("Directives look like `target=level`, for example `shardfeed_changefeed=debug`".to_string()),
		notes: vec![],
		cause: None,
	}
}

/// Routes log output of a test through the test harness. Safe to call from
/// every test.
pub fn init_test_tracing() {
	let _ = TracingBuilder::new().with_level(tracing::Level::DEBUG).with_test_writer().build().start();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_invalid_directive_is_reported() {
		let mut subsystem = TracingBuilder::new().with_directive("shardfeed_changefeed=loud").build();
		let err = subsystem.start().unwrap_err();
		assert_eq!(err.code, "TRACING_001");
		assert!(!subsystem.is_running());
	}

	#[test]
	fn test_init_test_tracing_is_idempotent() {
		init_test_tracing();
		init_test_tracing();
		tracing::debug!("tracing installed for tests");
	}
}
