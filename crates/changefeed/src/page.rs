// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::collections::BTreeMap;

use serde_json::Value;

use crate::{position::ChangeFeedPosition, state::CrossFeedRangeState};

pub type Headers = BTreeMap<String, String>;

/// Outcome of a read against a single feed range
#[derive(Debug, Clone, PartialEq)]
pub enum FeedRangePage {
	Success {
		documents: Vec<Value>,
		request_charge: f64,
		activity_id: String,
		headers: Headers,
		position: ChangeFeedPosition,
	},
	NotModified {
		request_charge: f64,
		activity_id: String,
		headers: Headers,
		position: ChangeFeedPosition,
	},
}

impl FeedRangePage {
	/// The position reading resumes from after this page
	pub fn position(&self) -> &ChangeFeedPosition {
		match self {
			FeedRangePage::Success {
				position,
				..
			}
			| FeedRangePage::NotModified {
				position,
				..
			} => position,
		}
	}

	pub fn request_charge(&self) -> f64 {
		match self {
			FeedRangePage::Success {
				request_charge,
				..
			}
			| FeedRangePage::NotModified {
				request_charge,
				..
			} => *request_charge,
		}
	}

	pub fn is_not_modified(&self) -> bool {
		matches!(self, FeedRangePage::NotModified { .. })
	}
}

/// One page of the cross partition change feed
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeFeedPage {
	Success {
		documents: Vec<Value>,
		request_charge: f64,
		activity_id: String,
		state: CrossFeedRangeState,
		headers: Headers,
	},
	NotModified {
		request_charge: f64,
		activity_id: String,
		state: CrossFeedRangeState,
		headers: Headers,
	},
}

impl ChangeFeedPage {
	/// Lifts a single range page, attaching the cross range state and the
	/// total charge of every read made to produce it
	pub(crate) fn from_range_page(page: FeedRangePage, state: CrossFeedRangeState, request_charge: f64) -> Self {
		match page {
			FeedRangePage::Success {
				documents,
				activity_id,
				headers,
				..
			} => ChangeFeedPage::Success {
				documents,
				request_charge,
				activity_id,
				state,
				headers,
			},
			FeedRangePage::NotModified {
				activity_id,
				headers,
				..
			} => ChangeFeedPage::NotModified {
				request_charge,
				activity_id,
				state,
				headers,
			},
		}
	}

	pub fn state(&self) -> &CrossFeedRangeState {
		match self {
			ChangeFeedPage::Success {
				state,
				..
			}
			| ChangeFeedPage::NotModified {
				state,
				..
			} => state,
		}
	}

	pub fn into_state(self) -> CrossFeedRangeState {
		match self {
			ChangeFeedPage::Success {
				state,
				..
			}
			| ChangeFeedPage::NotModified {
				state,
				..
			} => state,
		}
	}

	pub fn documents(&self) -> &[Value] {
		match self {
			ChangeFeedPage::Success {
				documents,
				..
			} => documents,
			ChangeFeedPage::NotModified {
				..
			} => &[],
		}
	}

	pub fn request_charge(&self) -> f64 {
		match self {
			ChangeFeedPage::Success {
				request_charge,
				..
			}
			| ChangeFeedPage::NotModified {
				request_charge,
				..
			} => *request_charge,
		}
	}

	pub fn activity_id(&self) -> &str {
		match self {
			ChangeFeedPage::Success {
				activity_id,
				..
			}
			| ChangeFeedPage::NotModified {
				activity_id,
				..
			} => activity_id,
		}
	}

	pub fn headers(&self) -> &Headers {
		match self {
			ChangeFeedPage::Success {
				headers,
				..
			}
			| ChangeFeedPage::NotModified {
				headers,
				..
			} => headers,
		}
	}

	pub fn is_not_modified(&self) -> bool {
		matches!(self, ChangeFeedPage::NotModified { .. })
	}
}
