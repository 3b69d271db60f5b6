// SPDX-License-Identifier: MIT
// Copyright (c) 2025 ReifyDB

//! Effective partition key hashing.
//!
//! A logical partition key is mapped onto a single point of the effective
//! partition key space. Points are 16 upper-case hex digits; the two most
//! significant bits of the hash are cleared so that every point sorts below
//! `MAX_EPK`.

use xxhash_rust::xxh3::xxh3_64;

/// Exclusive upper end of the hashed point space
pub const HASH_SPACE_END: u64 = 1 << 62;

/// Hash of a logical partition key, in `[0, HASH_SPACE_END)`
pub fn partition_key_hash(partition_key: &str) -> u64 {
	xxh3_64(partition_key.as_bytes()) >> 2
}

/// The effective partition key of a logical partition key
pub fn effective_partition_key(partition_key: &str) -> String {
	encode_point(partition_key_hash(partition_key))
}

/// Encodes a point of the hashed space as an effective partition key
pub fn encode_point(point: u64) -> String {
	format!("{:016X}", point)
}
