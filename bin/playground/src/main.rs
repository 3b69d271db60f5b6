// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

#![cfg_attr(not(debug_assertions), deny(warnings))]

use std::sync::Arc;

use serde_json::json;
use shardfeed_changefeed::{
	CachedPartitionMap, CancellationToken, ChangeFeedIterator, ChangeFeedMode, ChangeFeedOptions,
	ChangeFeedStartFrom, CrossFeedRangeState, CrossPartitionEnumerator, FeedTransport, PartitionMapProvider,
	fan_out,
};
use shardfeed_sub_tracing::TracingSubsystemFactory;
use shardfeed_testing::{InMemoryContainer, util::drain_until_not_modified};
use tokio::task::JoinSet;
use tracing::{Level, info};

#[tokio::main]
async fn main() {
	let mut subsystem = TracingSubsystemFactory::with_configurator(|builder| {
		builder.with_level(Level::INFO).with_directive("shardfeed_changefeed=debug")
	})
	.create();
	subsystem.start().unwrap();

	let container = Arc::new(InMemoryContainer::with_partitions(2).with_rid("playground"));
	let transport: Arc<dyn FeedTransport> = container.clone();
	let partitions: Arc<dyn PartitionMapProvider> = Arc::new(CachedPartitionMap::new(container.clone()));
	let cancel = CancellationToken::new();

	for idx in 0..20 {
		container.create_item(&format!("tenant-{}", idx % 7), json!({ "id": format!("order-{idx}"), "total": idx }));
	}

	info!("=== Reading the change feed page by page ===");
	let options = ChangeFeedOptions::default().with_page_size_limit(5).with_coalesce_not_modified(true);
	let mut iterator =
		ChangeFeedIterator::new(transport.clone(), partitions.clone(), ChangeFeedStartFrom::beginning(), options.clone());

	let mut continuation = String::new();
	let mut read = 0;
	for _ in 0..4 {
		let response = iterator.read_next(&cancel).await.unwrap();
		read += response.documents.len();
		info!(status = response.status, documents = response.documents.len(), charge = response.request_charge, "page");
		continuation = response.continuation;
	}
	info!(read, "stopping, continuation is {}", continuation);

	info!("=== Splitting partition 0 while the reader is away ===");
	let (left, right) = container.split("0").unwrap();
	info!(left = %left.range, right = %right.range, "partition split");
	for idx in 20..25 {
		container.create_item(&format!("tenant-{}", idx % 7), json!({ "id": format!("order-{idx}"), "total": idx }));
	}

	let mut resumed = ChangeFeedIterator::new(
		transport.clone(),
		partitions.clone(),
		ChangeFeedStartFrom::continuation(continuation),
		options,
	);
	loop {
		let response = resumed.read_next(&cancel).await.unwrap();
		if response.is_not_modified() {
			info!("caught up");
			break;
		}
		read += response.documents.len();
		info!(documents = response.documents.len(), "page after resume");
	}
	info!(read, written = container.lsn(), "documents read in total");

	info!("=== Fanning out over three workers ===");
	let groups = fan_out(partitions.as_ref(), &CrossFeedRangeState::from_beginning(), 3, ChangeFeedMode::Incremental)
		.await
		.unwrap();

	let mut workers = JoinSet::new();
	for (worker, state) in groups.into_iter().enumerate() {
		let transport = transport.clone();
		let partitions = partitions.clone();
		workers.spawn(async move {
			let mut enumerator = CrossPartitionEnumerator::new(transport, partitions, state, ChangeFeedOptions::default());
			let drained = drain_until_not_modified(&mut enumerator).await.unwrap();
			(worker, drained.documents.len())
		});
	}
	while let Some(result) = workers.join_next().await {
		let (worker, documents) = result.unwrap();
		info!(worker, documents, "worker finished");
	}
}
