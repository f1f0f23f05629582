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

//! Offset-biased HyperLogLog distinct-count sketch.
//!
//! `hyperunique` estimates the number of distinct elements in a multiset
//! within a small, fixed footprint: 2048 registers packed into 4-bit
//! nibbles behind a moving baseline, with sparse and dense wire forms and
//! a destructive merge (`fold`) for combining per-segment sketches at
//! query time.
//!
//! # Usage
//!
//! ```rust
//! use hyperunique::HllSketch;
//!
//! let mut sketch = HllSketch::new();
//! for user in 0..100u32 {
//!     sketch.add(&user);
//! }
//!
//! let estimate = sketch.estimate();
//! assert!((estimate - 100.0).abs() < 8.0);
//!
//! // Sketches round-trip through an opaque byte form.
//! let bytes = sketch.to_bytes();
//! let parsed = HllSketch::from_bytes(&bytes).unwrap();
//! assert_eq!(parsed.estimate(), estimate);
//! ```
//!
//! # Merging
//!
//! ```rust
//! use hyperunique::HllSketch;
//!
//! let mut total = HllSketch::new();
//! for segment in 0..4u32 {
//!     let mut per_segment = HllSketch::new();
//!     for row in 0..250u32 {
//!         per_segment.add(&(segment * 250 + row));
//!     }
//!     total.fold_bytes(&per_segment.to_bytes()).unwrap();
//! }
//! assert!((total.estimate() - 1000.0).abs() / 1000.0 < 0.05);
//! ```

pub mod error;
pub mod hash;
pub mod hll;

pub(crate) mod codec;

pub use hll::estimate_bytes;
pub use hll::HllSketch;
pub use hll::Version;
