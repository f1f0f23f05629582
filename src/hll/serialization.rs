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

//! Binary serialization format constants for the HLL sketch.
//!
//! Two header layouts exist over an identical payload. The current layout
//! (V1) starts with a version byte; the legacy layout (V0) does not, so
//! parsing dispatches on buffer length: a length divisible by 3 (sparse
//! triples behind a 3-byte header) or exactly 1027 (legacy dense) is V0,
//! anything else is V1.

use crate::hll::NUM_BYTES_FOR_BUCKETS;

/// Version byte of the current layout.
pub(crate) const VERSION_V1: u8 = 1;

// V1 header: 7 bytes.
pub(crate) const V1_HEADER_NUM_BYTES: usize = 7;
pub(crate) const V1_VERSION_BYTE: usize = 0;
pub(crate) const V1_REGISTER_OFFSET_BYTE: usize = 1;
pub(crate) const V1_NUM_NON_ZERO_BYTE: usize = 2;
pub(crate) const V1_MAX_OVERFLOW_VALUE_BYTE: usize = 4;
pub(crate) const V1_MAX_OVERFLOW_REGISTER_BYTE: usize = 5;

// V0 legacy header: 3 bytes, no version byte and no overflow slot.
pub(crate) const V0_HEADER_NUM_BYTES: usize = 3;
pub(crate) const V0_REGISTER_OFFSET_BYTE: usize = 0;
pub(crate) const V0_NUM_NON_ZERO_BYTE: usize = 1;

/// Total length of a dense V1 sketch.
pub(crate) const V1_NUM_BYTES_FOR_DENSE_STORAGE: usize =
    V1_HEADER_NUM_BYTES + NUM_BYTES_FOR_BUCKETS;

/// Total length of a dense V0 sketch.
pub(crate) const V0_NUM_BYTES_FOR_DENSE_STORAGE: usize =
    V0_HEADER_NUM_BYTES + NUM_BYTES_FOR_BUCKETS;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_storage_sizes() {
        assert_eq!(V1_NUM_BYTES_FOR_DENSE_STORAGE, 1031);
        assert_eq!(V0_NUM_BYTES_FOR_DENSE_STORAGE, 1027);
    }

    #[test]
    fn test_length_dispatch_is_unambiguous() {
        // V1 sparse lengths are 7 + 3n, which is never divisible by 3, and
        // the V1 dense length is not the legacy dense length.
        for triples in 0..128usize {
            assert_ne!((V1_HEADER_NUM_BYTES + 3 * triples) % 3, 0);
        }
        assert_ne!(V1_NUM_BYTES_FOR_DENSE_STORAGE % 3, 0);
        assert_ne!(V1_NUM_BYTES_FOR_DENSE_STORAGE, V0_NUM_BYTES_FOR_DENSE_STORAGE);
    }
}
