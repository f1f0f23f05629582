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

//! Cardinality estimation over the packed register payload.
//!
//! The raw harmonic-mean estimate is corrected piecewise: linear counting
//! below `5m/2` when zero registers remain, and a `-2^64 ln(1 - E/2^64)`
//! correction near the 64-bit ceiling.

use crate::hll::lookup::exp2_neg;
use crate::hll::lookup::register_sum;
use crate::hll::lookup::NUM_ZERO_NIBBLES;
use crate::hll::NUM_BUCKETS;

const ALPHA: f64 = 0.7213 / (1.0 + 1.079 / NUM_BUCKETS as f64);

const TWO_TO_THE_SIXTY_FOUR: f64 = 18_446_744_073_709_551_616.0;

pub(crate) const LOW_CORRECTION_THRESHOLD: f64 = (5 * NUM_BUCKETS) as f64 / 2.0;
pub(crate) const HIGH_CORRECTION_THRESHOLD: f64 = TWO_TO_THE_SIXTY_FOUR / 30.0;
pub(crate) const CORRECTION_PARAMETER: f64 = ALPHA * (NUM_BUCKETS * NUM_BUCKETS) as f64;

/// The single register allowed to exceed the 4-bit window, located by its
/// payload byte and nibble half.
pub(crate) struct OverflowSlot {
    pub value: u8,
    pub byte_position: u16,
    pub is_upper_nibble: bool,
}

pub(crate) fn apply_correction(e: f64, zero_count: u32) -> f64 {
    let e = CORRECTION_PARAMETER / e;

    if e <= LOW_CORRECTION_THRESHOLD {
        return if zero_count == 0 {
            e
        } else {
            NUM_BUCKETS as f64 * (NUM_BUCKETS as f64 / zero_count as f64).ln()
        };
    }

    if e > HIGH_CORRECTION_THRESHOLD {
        let ratio = e / TWO_TO_THE_SIXTY_FOUR;
        if ratio >= 1.0 {
            // handle very unlikely case that value is > 2^64
            return f64::MAX;
        }
        return -TWO_TO_THE_SIXTY_FOUR * (1.0 - ratio).ln();
    }

    e
}

pub(crate) fn estimate_dense(payload: &[u8], register_offset: u8, overflow: &OverflowSlot) -> f64 {
    let mut e = 0.0f64;
    let mut zero_count = 0u32;
    for (position, &register) in payload.iter().enumerate() {
        if overflow.value != 0 && position == overflow.byte_position as usize {
            let (sum, zeros) = overflow_byte_terms(register, register_offset, overflow);
            e += sum;
            zero_count += zeros;
        } else {
            e += register_sum(register_offset, register);
            zero_count += u32::from(NUM_ZERO_NIBBLES[register as usize]);
        }
    }
    apply_correction(e, zero_count)
}

/// Sparse payloads enumerate only non-zero bytes; every register in an
/// absent byte contributes `2^-offset`, the same term the dense walk would
/// produce for a stored zero nibble.
pub(crate) fn estimate_sparse(
    payload: &[u8],
    header_num_bytes: usize,
    register_offset: u8,
    overflow: &OverflowSlot,
) -> f64 {
    let untouched = (NUM_BUCKETS - 2 * (payload.len() / 3)) as u32;
    let mut e = untouched as f64 * exp2_neg(register_offset as u32);
    let mut zero_count = untouched;
    let mut overflow_byte_seen = overflow.value == 0;
    for triple in payload.chunks_exact(3) {
        let position = u16::from_be_bytes([triple[0], triple[1]]) as usize;
        let register = triple[2];
        let payload_index = position - header_num_bytes;
        if !overflow_byte_seen && payload_index == overflow.byte_position as usize {
            overflow_byte_seen = true;
            let (sum, zeros) = overflow_byte_terms(register, register_offset, overflow);
            e += sum;
            zero_count += zeros;
        } else {
            e += register_sum(register_offset, register);
            zero_count += u32::from(NUM_ZERO_NIBBLES[register as usize]);
        }
    }
    if !overflow_byte_seen {
        // The overflow register's byte is all zero and absent from the
        // triples; replace its untouched-byte terms with the substituted
        // ones, as the dense walk would.
        e -= 2.0 * exp2_neg(register_offset as u32);
        zero_count = zero_count.saturating_sub(2);
        let (sum, zeros) = overflow_byte_terms(0, register_offset, overflow);
        e += sum;
        zero_count += zeros;
    }
    apply_correction(e, zero_count)
}

fn overflow_byte_terms(register: u8, register_offset: u8, overflow: &OverflowSlot) -> (f64, u32) {
    let mut upper = (register >> 4) as u32 + register_offset as u32;
    let mut lower = (register & 0x0f) as u32 + register_offset as u32;
    if overflow.is_upper_nibble {
        upper = upper.max(overflow.value as u32);
    } else {
        lower = lower.max(overflow.value as u32);
    }
    let sum = exp2_neg(upper) + exp2_neg(lower);
    let zeros = (upper == 0) as u32 + (lower == 0) as u32;
    (sum, zeros)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_OVERFLOW: OverflowSlot = OverflowSlot {
        value: 0,
        byte_position: 0,
        is_upper_nibble: true,
    };

    #[test]
    fn test_all_zero_registers_estimate_zero() {
        let payload = vec![0u8; crate::hll::NUM_BYTES_FOR_BUCKETS];
        assert_eq!(estimate_dense(&payload, 0, &NO_OVERFLOW), 0.0);
    }

    #[test]
    fn test_low_correction_without_zero_registers_returns_raw() {
        // All 4096 nibble values at 1: Z = 2048 / 2, raw estimate
        // CORRECTION_PARAMETER / 1024 stays below the low threshold and
        // there are no zero registers to linear-count.
        let payload = vec![0x11u8; crate::hll::NUM_BYTES_FOR_BUCKETS];
        let estimate = estimate_dense(&payload, 0, &NO_OVERFLOW);
        assert_eq!(estimate, CORRECTION_PARAMETER / 1024.0);
        assert!(estimate <= LOW_CORRECTION_THRESHOLD);
    }

    #[test]
    fn test_high_range_correction_saturates() {
        assert_eq!(apply_correction(f64::MIN_POSITIVE, 0), f64::MAX);
    }

    #[test]
    fn test_mid_range_passes_through() {
        // Pick Z so the raw estimate lands between the two thresholds.
        let z = CORRECTION_PARAMETER / 1.0e6;
        let estimate = apply_correction(z, 0);
        assert!((estimate - 1.0e6).abs() < 1.0e-6);
    }

    #[test]
    fn test_sparse_and_dense_agree_on_identical_registers() {
        // One byte at payload index 2 with nibbles (3, 0).
        let mut dense = vec![0u8; crate::hll::NUM_BYTES_FOR_BUCKETS];
        dense[2] = 0x30;
        let header = 7usize;
        let mut sparse = Vec::new();
        sparse.extend_from_slice(&(header as u16 + 2).to_be_bytes());
        sparse.push(0x30);

        let from_dense = estimate_dense(&dense, 0, &NO_OVERFLOW);
        let from_sparse = estimate_sparse(&sparse, header, 0, &NO_OVERFLOW);
        assert_eq!(from_dense, from_sparse);
    }

    #[test]
    fn test_sparse_overflow_byte_absent_from_triples() {
        // The overflowed register's nibble stays zero, so its byte is not
        // serialized; the sparse walk must still substitute the overflow.
        let overflow = OverflowSlot {
            value: 40,
            byte_position: 5,
            is_upper_nibble: false,
        };
        let dense = vec![0u8; crate::hll::NUM_BYTES_FOR_BUCKETS];
        let from_dense = estimate_dense(&dense, 0, &overflow);
        let from_sparse = estimate_sparse(&[], 7, 0, &overflow);
        assert_eq!(from_dense, from_sparse);
    }

    #[test]
    fn test_overflow_register_dominates_nibble() {
        // No zero registers, so both walks stay on the raw estimate.
        let payload = vec![0x11u8; crate::hll::NUM_BYTES_FOR_BUCKETS];
        let overflow = OverflowSlot {
            value: 40,
            byte_position: 1,
            is_upper_nibble: false,
        };
        let plain = estimate_dense(&payload, 0, &NO_OVERFLOW);
        let dominated = estimate_dense(&payload, 0, &overflow);
        // Substituting 40 for 1 shrinks that register's contribution, so
        // the estimate grows.
        assert!(dominated > plain);
    }
}
