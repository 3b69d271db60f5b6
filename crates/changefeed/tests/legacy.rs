// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Reading with composite continuation tokens

use std::sync::Arc;

use serde_json::{Value, json};
use shardfeed_changefeed::{
	CancellationToken, ChangeFeedError, ChangeFeedMode, ChangeFeedOptions, ChangeFeedPosition,
	CompositeContinuationToken, FeedRange, LegacyChangeFeedIterator, Result, TransportError, transport::status,
};
use shardfeed_testing::{FlakyContainer, InMemoryContainer, container::NOT_MODIFIED_CHARGE, util::document_ids};

fn write(container: &InMemoryContainer, prefix: &str, count: usize) -> Vec<String> {
	let mut ids: Vec<String> = (0..count)
		.map(|idx| {
			let id = format!("{prefix}-{idx}");
			container.create_item(&format!("tenant-{}", idx % 9), json!({ "id": id }));
			id
		})
		.collect();
	ids.sort();
	ids
}

fn legacy(container: &Arc<InMemoryContainer>, options: ChangeFeedOptions) -> LegacyChangeFeedIterator {
	LegacyChangeFeedIterator::new(container.clone(), container.clone(), ChangeFeedPosition::Beginning, options)
}

async fn read_all(iterator: &mut LegacyChangeFeedIterator) -> Result<Vec<Value>> {
	let cancel = CancellationToken::new();
	let mut documents = Vec::new();
	loop {
		let response = iterator.read_next(&cancel).await?;
		if response.is_not_modified() {
			return Ok(documents);
		}
		documents.extend(response.documents);
	}
}

#[tokio::test]
async fn test_reads_every_partition() -> Result<()> {
	let container = Arc::new(InMemoryContainer::with_partitions(3));
	let written = write(&container, "doc", 15);

	let mut iterator = legacy(&container, ChangeFeedOptions::default());
	let documents = read_all(&mut iterator).await?;

	assert_eq!(document_ids(&documents), written);
	assert!(iterator.has_more_results());
	assert_eq!(iterator.token().map(CompositeContinuationToken::len), Some(3));
	Ok(())
}

#[tokio::test]
async fn test_quiet_feed_sweeps_every_range() -> Result<()> {
	let container = Arc::new(InMemoryContainer::with_partitions(3));
	let mut iterator = legacy(&container, ChangeFeedOptions::default());

	let response = iterator.read_next(&CancellationToken::new()).await?;

	assert_eq!(response.status, status::NOT_MODIFIED);
	assert!(response.request_charge >= 3.0 * NOT_MODIFIED_CHARGE);
	for partition in container.partitions() {
		assert!(
			container.read_count(&FeedRange::Epk(partition.range.clone())) >= 1,
			"partition {} was not asked",
			partition.id
		);
	}
	Ok(())
}

#[tokio::test]
async fn test_split_is_handled_inside_the_token() -> Result<()> {
	let container = Arc::new(InMemoryContainer::new());
	let mut written = write(&container, "first", 12);
	let options = ChangeFeedOptions::default().with_page_size_limit(4);

	let mut iterator = legacy(&container, options);
	let mut documents = iterator.read_next(&CancellationToken::new()).await?.documents;
	assert_eq!(documents.len(), 4);

	let (left, right) = container.split("0")?;
	written.extend(write(&container, "second", 5));
	written.sort();

	documents.extend(read_all(&mut iterator).await?);
	assert_eq!(document_ids(&documents), written);

	let token = iterator.token().unwrap();
	let mut ids: Vec<&str> = token.entries().iter().map(|entry| entry.partition_key_range_id.as_str()).collect();
	ids.sort();
	let mut expected = vec![left.id.as_str(), right.id.as_str()];
	expected.sort();
	assert_eq!(ids, expected);
	Ok(())
}

#[tokio::test]
async fn test_resume_from_token_text() -> Result<()> {
	let container = Arc::new(InMemoryContainer::with_partitions(2));
	let written = write(&container, "doc", 8);

	let mut first = legacy(&container, ChangeFeedOptions::default().with_page_size_limit(2));
	let response = first.read_next(&CancellationToken::new()).await?;
	let mut documents = response.documents;

	let token: CompositeContinuationToken = response.continuation.parse()?;
	let mut second =
		LegacyChangeFeedIterator::from_token(container.clone(), container.clone(), token, ChangeFeedOptions::default());
	documents.extend(read_all(&mut second).await?);

	assert_eq!(document_ids(&documents), written);
	Ok(())
}

#[tokio::test]
async fn test_range_gone_twice_fails_without_committing() -> Result<()> {
	let container = Arc::new(InMemoryContainer::new());
	write(&container, "doc", 3);
	let flaky = Arc::new(FlakyContainer::new(container.clone()));
	let cancel = CancellationToken::new();

	let mut iterator =
		LegacyChangeFeedIterator::new(flaky.clone(), flaky.clone(), ChangeFeedPosition::Beginning, ChangeFeedOptions::default());
	iterator.read_next(&cancel).await?;
	let before = iterator.token().cloned();

	let (left, _) = container.split("0")?;
	flaky.fail_range(FeedRange::Epk(left.range), TransportError::gone("still splitting"), 1);

	let err = iterator.read_next(&cancel).await.unwrap_err();
	assert!(matches!(err, ChangeFeedError::SplitRecoveryFailed { .. }), "unexpected error {:?}", err);
	assert_eq!(iterator.token().cloned(), before);
	Ok(())
}

#[tokio::test]
async fn test_full_fidelity_needs_a_continuation_or_now() -> Result<()> {
	let container = Arc::new(InMemoryContainer::new());
	let options = ChangeFeedOptions::default().with_mode(ChangeFeedMode::FullFidelity);

	let mut iterator = legacy(&container, options.clone());
	let err = iterator.read_next(&CancellationToken::new()).await.unwrap_err();
	assert!(matches!(err, ChangeFeedError::InvalidArgument(_)));

	let mut iterator = LegacyChangeFeedIterator::new(container.clone(), container.clone(), ChangeFeedPosition::Now, options);
	let response = iterator.read_next(&CancellationToken::new()).await?;
	assert!(response.is_not_modified());
	Ok(())
}
