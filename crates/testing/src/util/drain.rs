// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::Arc;

use serde_json::Value;
use shardfeed_changefeed::{
	CancellationToken, ChangeFeedError, ChangeFeedOptions, ChangeFeedPage, CrossFeedRangeState,
	CrossPartitionEnumerator, FeedTransport, PartitionMapProvider, Result,
};

/// Upper bound on pages read by one drain, guards tests against livelock
pub const MAX_PAGES: usize = 10_000;

#[derive(Debug, Clone)]
pub struct Drained {
	pub documents: Vec<Value>,
	/// State of the last page
	pub state: CrossFeedRangeState,
	pub pages: usize,
	pub request_charge: f64,
}

/// Reads pages until a whole sweep over the state answered not modified
pub async fn drain_until_not_modified(enumerator: &mut CrossPartitionEnumerator) -> Result<Drained> {
	let cancel = CancellationToken::new();
	let coalesced = enumerator.options().coalesce_not_modified;

	let mut documents = Vec::new();
	let mut pages = 0;
	let mut request_charge = 0.0;
	let mut quiet = 0;

	while pages < MAX_PAGES {
		let page = enumerator.next_page(&cancel).await?;
		pages += 1;
		request_charge += page.request_charge();

		match &page {
			ChangeFeedPage::Success {
				documents: batch,
				..
			} => {
				documents.extend(batch.iter().cloned());
				quiet = 0;
			}
			ChangeFeedPage::NotModified {
				..
			} => quiet += 1,
		}

		if page.is_not_modified() && (coalesced || quiet >= page.state().len()) {
			return Ok(Drained {
				documents,
				state: page.into_state(),
				pages,
				request_charge,
			});
		}
	}

	Err(ChangeFeedError::Closed {
		reason: format!("feed did not settle within {} pages", MAX_PAGES),
	})
}

/// Like [`drain_until_not_modified`], but every page is read by a fresh
/// enumerator restored from the serialized state of the previous page
pub async fn drain_with_continuations(
	transport: Arc<dyn FeedTransport>,
	partitions: Arc<dyn PartitionMapProvider>,
	start: CrossFeedRangeState,
	options: ChangeFeedOptions,
) -> Result<Drained> {
	let cancel = CancellationToken::new();

	let mut continuation = start.serialize();
	let mut documents = Vec::new();
	let mut pages = 0;
	let mut request_charge = 0.0;
	let mut quiet = 0;

	while pages < MAX_PAGES {
		let state = CrossFeedRangeState::parse(&continuation)?;
		let mut enumerator =
			CrossPartitionEnumerator::new(transport.clone(), partitions.clone(), state, options.clone());

		let page = enumerator.next_page(&cancel).await?;
		pages += 1;
		request_charge += page.request_charge();
		continuation = page.state().serialize();

		if page.is_not_modified() {
			quiet += 1;
			if options.coalesce_not_modified || quiet >= page.state().len() {
				return Ok(Drained {
					documents,
					state: page.into_state(),
					pages,
					request_charge,
				});
			}
		} else {
			quiet = 0;
			documents.extend(page.documents().iter().cloned());
		}
	}

	Err(ChangeFeedError::Closed {
		reason: format!("feed did not settle within {} pages", MAX_PAGES),
	})
}

/// The `id` of every document, sorted
pub fn document_ids(documents: &[Value]) -> Vec<String> {
	let mut ids: Vec<String> = documents
		.iter()
		.filter_map(|document| {
			document.get("id").or_else(|| document.get("current").and_then(|current| current.get("id")))
		})
		.filter_map(Value::as_str)
		.map(str::to_string)
		.collect();
	ids.sort();
	ids
}
