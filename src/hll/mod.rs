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

//! Offset-biased HyperLogLog sketch for distinct-count aggregation.
//!
//! This module implements the HyperLogLog cardinality estimator described
//! in Flajolet et al., "HyperLogLog: the analysis of a near-optimal
//! cardinality estimation algorithm" (2007), specialized for columnar
//! analytics workloads where sketches are stored per row group and merged
//! at query time.
//!
//! # Register encoding
//!
//! A sketch holds 2048 registers packed two to a byte, 4 bits each. Stored
//! values are biased by a moving `register_offset`: once every register is
//! non-zero the offset advances and every nibble is decremented, so the
//! common case stays representable in 4 bits as cardinality grows. A
//! single out-of-band overflow slot carries the one register allowed to
//! exceed the representable window.
//!
//! # Wire forms
//!
//! Low-occupancy sketches serialize sparsely as `(position, byte)` triples;
//! at 128 or more non-zero registers the full 1024-byte payload is written
//! instead. Two header revisions exist and both parse; see [`Version`].
//!
//! # Threading
//!
//! A sketch is single-writer. It can be moved between threads, but
//! concurrent mutation is not supported.

mod estimator;
mod layout;
mod lookup;
mod serialization;
mod sketch;

pub use layout::Version;
pub use sketch::estimate_bytes;
pub use sketch::HllSketch;

/// Number of bucket-index bits taken from the hashed value.
pub const BITS_FOR_BUCKETS: u32 = 11;

/// Number of registers in a sketch.
pub const NUM_BUCKETS: usize = 1 << BITS_FOR_BUCKETS;

/// Dense payload size: two 4-bit registers per byte.
pub const NUM_BYTES_FOR_BUCKETS: usize = NUM_BUCKETS / 2;

/// Serialization keeps the dense form at this many non-zero registers.
pub const DENSE_THRESHOLD: u16 = 128;

/// Minimum length of a hashed value accepted by the update path.
pub const MIN_BYTES_REQUIRED: usize = 10;

pub(crate) const BUCKET_MASK: u16 = (NUM_BUCKETS - 1) as u16;
pub(crate) const BITS_PER_BUCKET: u32 = 4;

/// Widest value storable in one register nibble.
pub(crate) const RANGE: u8 = (1 << BITS_PER_BUCKET) - 1;
