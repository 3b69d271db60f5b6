// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Text continuations handed out by the change feed iterator

use std::sync::Arc;

use serde_json::{Value, json};
use shardfeed_changefeed::{
	CancellationToken, ChangeFeedIterator, ChangeFeedOptions, ChangeFeedStartFrom, CompositeContinuationToken, FeedRange,
	transport::status,
};
use shardfeed_testing::{InMemoryContainer, util::document_ids};
use shardfeed_type::Result;

fn write(container: &InMemoryContainer, prefix: &str, count: usize) -> Vec<String> {
	let mut ids: Vec<String> = (0..count)
		.map(|idx| {
			let id = format!("{prefix}-{idx}");
			container.create_item(&format!("tenant-{}", idx % 5), json!({ "id": id }));
			id
		})
		.collect();
	ids.sort();
	ids
}

fn iterator(container: &Arc<InMemoryContainer>, start: ChangeFeedStartFrom, options: ChangeFeedOptions) -> ChangeFeedIterator {
	ChangeFeedIterator::new(container.clone(), container.clone(), start, options)
}

fn options() -> ChangeFeedOptions {
	ChangeFeedOptions::default().with_coalesce_not_modified(true).with_page_size_limit(3)
}

/// Reads until the whole feed answered not modified, returns the documents
/// and the last continuation
async fn read_all(iterator: &mut ChangeFeedIterator) -> Result<(Vec<Value>, String)> {
	let cancel = CancellationToken::new();
	let mut documents = Vec::new();
	loop {
		let response = iterator.read_next(&cancel).await?;
		if response.is_not_modified() {
			return Ok((documents, response.continuation));
		}
		documents.extend(response.documents);
	}
}

#[tokio::test]
async fn test_resume_from_continuation() -> Result<()> {
	let container = Arc::new(InMemoryContainer::with_partitions(2));
	let written = write(&container, "doc", 9);
	let cancel = CancellationToken::new();

	let mut first = iterator(&container, ChangeFeedStartFrom::beginning(), options());
	let response = first.read_next(&cancel).await?;
	assert_eq!(response.status, status::OK);
	let mut documents = response.documents;

	let mut second = iterator(&container, ChangeFeedStartFrom::continuation(response.continuation), options());
	let (rest, _) = read_all(&mut second).await?;
	documents.extend(rest);

	assert_eq!(document_ids(&documents), written);
	Ok(())
}

#[tokio::test]
async fn test_quiet_feed_answers_not_modified() -> Result<()> {
	let container = Arc::new(InMemoryContainer::with_partitions(3));
	let mut iterator = iterator(&container, ChangeFeedStartFrom::now(), options());

	let response = iterator.read_next(&CancellationToken::new()).await?;
	assert_eq!(response.status, status::NOT_MODIFIED);
	assert!(response.documents.is_empty());
	assert!(iterator.has_more_results(), "a quiet feed is not finished");
	Ok(())
}

#[tokio::test]
async fn test_continuation_from_another_container_is_rejected() -> Result<()> {
	let alpha = Arc::new(InMemoryContainer::new().with_rid("alpha"));
	let beta = Arc::new(InMemoryContainer::new().with_rid("beta"));
	write(&alpha, "doc", 3);

	let (_, continuation) = read_all(&mut iterator(&alpha, ChangeFeedStartFrom::beginning(), options())).await?;

	let mut other = iterator(&beta, ChangeFeedStartFrom::continuation(continuation), options());
	let err = other.read_next(&CancellationToken::new()).await.unwrap_err();

	assert_eq!(err.code, "CHANGEFEED_001");
	assert!(!other.has_more_results());
	Ok(())
}

#[tokio::test]
async fn test_garbage_continuation_is_rejected() -> Result<()> {
	let container = Arc::new(InMemoryContainer::new());
	let mut iterator = iterator(&container, ChangeFeedStartFrom::continuation("not a continuation"), options());

	let err = iterator.read_next(&CancellationToken::new()).await.unwrap_err();
	assert_eq!(err.code, "CHANGEFEED_001");
	assert!(!iterator.has_more_results());
	Ok(())
}

#[tokio::test]
async fn test_legacy_continuation_is_migrated() -> Result<()> {
	let container = Arc::new(InMemoryContainer::new().with_rid("orders"));
	let written = write(&container, "doc", 7);

	let legacy = json!({
		"V": 1,
		"Rid": "orders",
		"Continuation": [
			{ "token": null, "range": { "min": "", "max": "FF" } }
		]
	})
	.to_string();

	let (documents, continuation) =
		read_all(&mut iterator(&container, ChangeFeedStartFrom::continuation(legacy), options())).await?;
	assert_eq!(document_ids(&documents), written);

	let envelope: Value = serde_json::from_str(&continuation).unwrap();
	assert_eq!(envelope["V"], 2, "continuations are handed out in the current format");
	assert_eq!(envelope["Rid"], "orders");
	Ok(())
}

#[tokio::test]
async fn test_emitted_legacy_token_resumes() -> Result<()> {
	let container = Arc::new(InMemoryContainer::with_partitions(2));
	let written = write(&container, "doc", 10);
	let cancel = CancellationToken::new();

	let mut first = iterator(&container, ChangeFeedStartFrom::beginning(), options().with_emit_legacy_token(true));
	let response = first.read_next(&cancel).await?;
	let token: CompositeContinuationToken = response.continuation.parse()?;
	assert_eq!(token.container_rid(), container.rid());
	assert_eq!(token.len(), 2);

	let mut documents = response.documents;
	let (rest, _) =
		read_all(&mut iterator(&container, ChangeFeedStartFrom::continuation(response.continuation), options())).await?;
	documents.extend(rest);

	assert_eq!(document_ids(&documents), written);
	Ok(())
}

#[tokio::test]
async fn test_legacy_token_for_a_partition_key_is_refused_before_reading() -> Result<()> {
	let container = Arc::new(InMemoryContainer::new());
	container.create_item("alpha", json!({ "id": "a-1" }));
	container.create_item("alpha", json!({ "id": "a-2" }));
	let start = ChangeFeedStartFrom::Beginning(FeedRange::partition_key("alpha"));
	let cancel = CancellationToken::new();

	let mut legacy = iterator(&container, start.clone(), options().with_emit_legacy_token(true));
	let err = legacy.read_next(&cancel).await.unwrap_err();
	assert_eq!(err.code, "CHANGEFEED_004");
	assert!(!legacy.has_more_results(), "the iterator can never emit a token for this range");
	assert_eq!(container.total_reads(), 0, "nothing was read and then dropped");

	let (documents, _) = read_all(&mut iterator(&container, start, options())).await?;
	assert_eq!(document_ids(&documents), vec!["a-1", "a-2"]);
	Ok(())
}

#[tokio::test]
async fn test_start_from_time_within_a_partition_key() -> Result<()> {
	let container = Arc::new(InMemoryContainer::with_partitions(2));
	container.create_item("alpha", json!({ "id": "early" }));
	let start = container.now();
	container.create_item("alpha", json!({ "id": "late" }));
	container.create_item("beta", json!({ "id": "other" }));

	let from = ChangeFeedStartFrom::Time(start, FeedRange::partition_key("alpha"));
	let (documents, _) = read_all(&mut iterator(&container, from, options())).await?;

	assert_eq!(document_ids(&documents), vec!["late"]);
	Ok(())
}

#[tokio::test]
async fn test_iterator_follows_a_split() -> Result<()> {
	let container = Arc::new(InMemoryContainer::new());
	let mut written = write(&container, "first", 9);
	let cancel = CancellationToken::new();

	let mut iterator = iterator(&container, ChangeFeedStartFrom::beginning(), options());
	let mut documents = iterator.read_next(&cancel).await?.documents;

	container.split("0").unwrap();
	written.extend(write(&container, "second", 4));
	written.sort();

	let (rest, continuation) = read_all(&mut iterator).await?;
	documents.extend(rest);
	assert_eq!(document_ids(&documents), written);

	let envelope: Value = serde_json::from_str(&continuation).unwrap();
	assert_eq!(envelope["Continuation"].as_array().map(Vec::len), Some(2));
	Ok(())
}
