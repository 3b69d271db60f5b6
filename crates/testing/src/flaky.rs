// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Fault injection in front of an [`InMemoryContainer`].

use std::{
	collections::VecDeque,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use shardfeed_changefeed::{
	ChangeFeedRequest, FeedRange, FeedRangePage, FeedTransport, PartitionMapProvider, TransportError,
};
use shardfeed_type::PartitionKeyRange;
use tracing::debug;

use crate::container::InMemoryContainer;

struct Fault {
	/// Only reads of this range fail, any read when unset
	range: Option<FeedRange>,
	error: TransportError,
	remaining: usize,
}

pub struct FlakyContainer {
	inner: Arc<InMemoryContainer>,
	faults: Mutex<VecDeque<Fault>>,
	read_delay: Option<Duration>,
	reads_started: AtomicUsize,
}

impl FlakyContainer {
	pub fn new(inner: Arc<InMemoryContainer>) -> Self {
		Self {
			inner,
			faults: Mutex::new(VecDeque::new()),
			read_delay: None,
			reads_started: AtomicUsize::new(0),
		}
	}

	/// Every read sleeps before it is served
	pub fn with_read_delay(mut self, delay: Duration) -> Self {
		self.read_delay = Some(delay);
		self
	}

	pub fn container(&self) -> &Arc<InMemoryContainer> {
		&self.inner
	}

	/// The next read fails with `error`
	pub fn fail_next(&self, error: TransportError) {
		self.faults.lock().push_back(Fault {
			range: None,
			error,
			remaining: 1,
		});
	}

	/// The next `times` reads of `range` fail with `error`
	pub fn fail_range(&self, range: FeedRange, error: TransportError, times: usize) {
		self.faults.lock().push_back(Fault {
			range: Some(range),
			error,
			remaining: times,
		});
	}

	/// Number of reads that reached this container, served or not
	pub fn reads_started(&self) -> usize {
		self.reads_started.load(Ordering::SeqCst)
	}

	fn take_fault(&self, range: &FeedRange) -> Option<TransportError> {
		let mut faults = self.faults.lock();
		let idx = faults.iter().position(|fault| fault.range.as_ref().is_none_or(|r| r == range))?;

		let fault = &mut faults[idx];
		fault.remaining = fault.remaining.saturating_sub(1);
		let error = fault.error.clone();
		if fault.remaining == 0 {
			faults.remove(idx);
		}
		Some(error)
	}
}

#[async_trait]
impl FeedTransport for FlakyContainer {
	async fn read_range(&self, request: &ChangeFeedRequest) -> Result<FeedRangePage, TransportError> {
		self.reads_started.fetch_add(1, Ordering::SeqCst);
		if let Some(delay) = self.read_delay {
			tokio::time::sleep(delay).await;
		}

		if let Some(error) = self.take_fault(&request.range) {
			debug!(range = %request.range, status = error.status, "injected read failure");
			return Err(error);
		}
		self.inner.read_range(request).await
	}
}

#[async_trait]
impl PartitionMapProvider for FlakyContainer {
	async fn resolve_ranges(&self, force_refresh: bool) -> Result<Vec<PartitionKeyRange>, TransportError> {
		self.inner.resolve_ranges(force_refresh).await
	}

	async fn container_rid(&self) -> Result<String, TransportError> {
		self.inner.container_rid().await
	}
}
