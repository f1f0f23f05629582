// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Input hashing for the sketch.
//!
//! The sketch itself consumes pre-hashed byte strings of at least 10 bytes:
//! the leading 8 bytes feed the position-of-first-one scan and the trailing
//! 2 bytes select the bucket. These helpers produce a 16-byte murmur3
//! x64-128 digest in that layout for callers that start from raw values.

use std::hash::Hash;
use std::hash::Hasher;

const DEFAULT_SEED: u32 = 9001;

/// Hash a raw byte string to a 16-byte digest suitable for
/// [`HllSketch::add_hashed`](crate::HllSketch::add_hashed).
pub fn hash_bytes(bytes: &[u8]) -> [u8; 16] {
    let mut hasher = mur3::Hasher128::with_seed(DEFAULT_SEED);
    hasher.write(bytes);
    digest(&hasher)
}

/// Hash any `Hash` value to a 16-byte digest.
pub fn hash_of<T: Hash + ?Sized>(value: &T) -> [u8; 16] {
    let mut hasher = mur3::Hasher128::with_seed(DEFAULT_SEED);
    value.hash(&mut hasher);
    digest(&hasher)
}

fn digest(hasher: &mur3::Hasher128) -> [u8; 16] {
    let (h1, h2) = hasher.finish128();
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&h1.to_be_bytes());
    out[8..].copy_from_slice(&h2.to_be_bytes());
    out
}
