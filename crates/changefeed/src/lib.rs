// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Cross-partition change feed consumption.
//!
//! A change feed is read as one logical stream while the container behind it
//! is sharded into feed ranges that split and merge independently. The
//! position of a reader is a [`CrossFeedRangeState`]: one
//! [`ChangeFeedPosition`] per feed range. The [`CrossPartitionEnumerator`]
//! walks those ranges breadth-first, one server round trip per page, and
//! repairs the state when the server reports that a range is gone.

pub mod codec;
pub mod config;
pub mod enumerator;
pub mod error;
pub mod fanout;
pub mod iterator;
pub mod legacy;
pub mod mode;
pub mod page;
pub mod position;
pub mod routing;
pub mod state;
pub mod token;
pub mod transport;

pub use config::{ChangeFeedOptions, PartitionMapCacheConfig};
pub use enumerator::{CrossPartitionEnumerator, EnumeratorStatus};
pub use error::{ChangeFeedError, Result};
pub use fanout::fan_out;
pub use iterator::{ChangeFeedIterator, ChangeFeedResponse, ChangeFeedStartFrom};
pub use legacy::{CompositeContinuationEntry, CompositeContinuationToken, LegacyChangeFeedIterator};
pub use mode::{ChangeFeedMode, SplitStrategy};
pub use page::{ChangeFeedPage, FeedRangePage, Headers};
pub use position::{ChangeFeedPosition, FeedRangeState, PositionKind};
pub use routing::{CachedPartitionMap, PartitionMapProvider};
pub use shardfeed_type::{EpkRange, FeedRange, PartitionKeyRange};
pub use state::CrossFeedRangeState;
pub use tokio_util::sync::CancellationToken;
pub use transport::{ChangeFeedRequest, FeedTransport, TransportError};
