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

//! The HLL sketch proper: register updates, folding, estimation, and the
//! sparse/dense wire codec.

use std::borrow::Cow;
use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;

use crate::codec::SketchBytes;
use crate::error::Error;
use crate::error::ErrorKind;
use crate::hash;
use crate::hll::estimator;
use crate::hll::estimator::OverflowSlot;
use crate::hll::layout::Version;
use crate::hll::lookup::POSITION_OF_FIRST_ONE;
use crate::hll::serialization::V0_NUM_BYTES_FOR_DENSE_STORAGE;
use crate::hll::serialization::V1_VERSION_BYTE;
use crate::hll::serialization::VERSION_V1;
use crate::hll::BITS_PER_BUCKET;
use crate::hll::BUCKET_MASK;
use crate::hll::DENSE_THRESHOLD;
use crate::hll::MIN_BYTES_REQUIRED;
use crate::hll::NUM_BUCKETS;
use crate::hll::NUM_BYTES_FOR_BUCKETS;
use crate::hll::RANGE;

/// HyperLogLog sketch with 2048 offset-biased 4-bit registers.
///
/// The backing storage is the wire form itself: a versioned header followed
/// by either the full 1024-byte register payload or sparse
/// `(position, byte)` triples. A sketch parsed with [`HllSketch::from_bytes`]
/// borrows the caller's buffer and clones it on first mutation.
///
/// # Examples
///
/// ```
/// use hyperunique::HllSketch;
///
/// let mut visitors = HllSketch::new();
/// for user in 0..100u32 {
///     visitors.add(&user);
/// }
/// let estimate = visitors.estimate();
/// assert!((estimate - 100.0).abs() < 8.0);
/// ```
#[derive(Clone)]
pub struct HllSketch<'a> {
    version: Version,
    data: Cow<'a, [u8]>,
    cached_estimate: Cell<Option<f64>>,
}

impl HllSketch<'static> {
    /// Create an empty sketch in the current dense layout.
    pub fn new() -> Self {
        let mut data = vec![0u8; Version::V1.num_bytes_for_dense_storage()];
        Version::V1.write_version(&mut data);
        HllSketch {
            version: Version::V1,
            data: Cow::Owned(data),
            cached_estimate: Cell::new(None),
        }
    }

    /// The byte image of an empty dense sketch, as preallocated by columnar
    /// aggregators: 1031 bytes, version byte first, everything else zero.
    pub fn empty_dense_bytes() -> Vec<u8> {
        let mut bytes = vec![0u8; Version::V1.num_bytes_for_dense_storage()];
        bytes[V1_VERSION_BYTE] = VERSION_V1;
        bytes
    }
}

impl Default for HllSketch<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> HllSketch<'a> {
    /// Parse a sketch from its serialized form without copying.
    ///
    /// The layout version is decided by length: a buffer whose length is
    /// divisible by 3, or exactly the legacy dense length 1027, is legacy
    /// V0; anything else is V1. The returned sketch borrows `bytes` and
    /// clones them on first mutation.
    ///
    /// # Examples
    ///
    /// ```
    /// use hyperunique::HllSketch;
    ///
    /// let mut sketch = HllSketch::new();
    /// sketch.add(&"apple");
    /// let bytes = sketch.to_bytes();
    ///
    /// let parsed = HllSketch::from_bytes(&bytes).unwrap();
    /// assert_eq!(parsed.estimate(), sketch.estimate());
    /// ```
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, Error> {
        let version = if bytes.len() % 3 == 0 || bytes.len() == V0_NUM_BYTES_FOR_DENSE_STORAGE {
            Version::V0
        } else {
            Version::V1
        };
        Self::validate(version, bytes)?;
        Ok(HllSketch {
            version,
            data: Cow::Borrowed(bytes),
            cached_estimate: Cell::new(None),
        })
    }

    fn validate(version: Version, bytes: &[u8]) -> Result<(), Error> {
        let header = version.header_num_bytes();
        if bytes.len() < header {
            return Err(
                Error::new(ErrorKind::InvalidState, "buffer shorter than the sketch header")
                    .with_context("length", bytes.len())
                    .with_context("header", header),
            );
        }
        if let Version::V1 = version {
            if bytes[V1_VERSION_BYTE] != VERSION_V1 {
                return Err(
                    Error::new(ErrorKind::InvalidState, "unrecognized version byte")
                        .with_context("version", bytes[V1_VERSION_BYTE]),
                );
            }
        }
        let payload = &bytes[header..];
        if payload.len() == NUM_BYTES_FOR_BUCKETS {
            return Ok(());
        }
        if payload.len() % 3 != 0 {
            return Err(
                Error::new(ErrorKind::InvalidState, "impossible sketch length")
                    .with_context("length", bytes.len()),
            );
        }
        for triple in payload.chunks_exact(3) {
            let position = u16::from_be_bytes([triple[0], triple[1]]) as usize;
            if position < header || position >= version.num_bytes_for_dense_storage() {
                return Err(
                    Error::new(ErrorKind::InvalidState, "sparse register position out of range")
                        .with_context("position", position),
                );
            }
        }
        Ok(())
    }

    /// Detach the sketch from any borrowed buffer.
    pub fn into_owned(self) -> HllSketch<'static> {
        HllSketch {
            version: self.version,
            data: Cow::Owned(self.data.into_owned()),
            cached_estimate: self.cached_estimate,
        }
    }

    /// Wire layout version of this sketch.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Baseline added to every stored register nibble.
    pub fn register_offset(&self) -> u8 {
        self.version.register_offset(&self.data)
    }

    /// Count of registers whose stored nibble is non-zero.
    pub fn num_non_zero_registers(&self) -> u16 {
        self.version.num_non_zero_registers(&self.data)
    }

    /// Largest observed position-of-one beyond the representable window,
    /// or 0 when no register has overflowed.
    pub fn max_overflow_value(&self) -> u8 {
        self.version.max_overflow_value(&self.data)
    }

    /// Bucket that produced [`max_overflow_value`](Self::max_overflow_value).
    /// Meaningless while the overflow value is 0.
    pub fn max_overflow_register(&self) -> u16 {
        self.version.max_overflow_register(&self.data)
    }

    /// Whether the backing storage is the full dense payload.
    pub fn is_dense(&self) -> bool {
        self.data.len() == self.version.num_bytes_for_dense_storage()
    }

    fn payload_byte_position(&self) -> usize {
        self.version.payload_byte_position()
    }

    fn invalidate_cached_estimate(&self) {
        self.cached_estimate.set(None);
    }

    /// Hash `value` and feed it to the sketch.
    pub fn add<T: Hash + ?Sized>(&mut self, value: &T) {
        self.add_hashed_unchecked(&hash::hash_of(value));
    }

    /// Feed a pre-hashed value to the sketch.
    ///
    /// The leading 8 bytes drive the position-of-first-one scan and the
    /// trailing 2 bytes select the bucket, so at least
    /// [`MIN_BYTES_REQUIRED`](crate::hll::MIN_BYTES_REQUIRED) bytes are
    /// needed.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `hashed` is shorter than 10 bytes.
    pub fn add_hashed(&mut self, hashed: &[u8]) -> Result<(), Error> {
        if hashed.len() < MIN_BYTES_REQUIRED {
            return Err(
                Error::new(ErrorKind::InvalidArgument, "hashed value too short")
                    .with_context("required", MIN_BYTES_REQUIRED)
                    .with_context("got", hashed.len()),
            );
        }
        self.add_hashed_unchecked(hashed);
        Ok(())
    }

    fn add_hashed_unchecked(&mut self, hashed: &[u8]) {
        let bucket =
            u16::from_be_bytes([hashed[hashed.len() - 2], hashed[hashed.len() - 1]]) & BUCKET_MASK;

        let mut position_of_1 = 0u8;
        for &byte in &hashed[..8] {
            match POSITION_OF_FIRST_ONE[byte as usize] {
                0 => position_of_1 += 8,
                position => {
                    position_of_1 += position;
                    break;
                }
            }
        }

        self.add_register(bucket, position_of_1);
    }

    /// Record `position_of_1` for `bucket` directly. `bucket` is taken
    /// modulo the bucket count.
    ///
    /// Values at or below the register offset are discarded; values beyond
    /// the representable window go to the overflow slot when strictly
    /// larger than its current occupant.
    pub fn add_register(&mut self, bucket: u16, position_of_1: u8) {
        let bucket = bucket & BUCKET_MASK;
        self.invalidate_cached_estimate();

        let register_offset = self.register_offset();
        if position_of_1 <= register_offset {
            return;
        }
        if u16::from(position_of_1) > u16::from(register_offset) + u16::from(RANGE) {
            if position_of_1 > self.max_overflow_value() {
                let version = self.version;
                let data = self.data.to_mut();
                version.set_max_overflow_value(data, position_of_1);
                version.set_max_overflow_register(data, bucket);
            }
            return;
        }

        // The clamped value fits in 4 bits.
        let num_non_zero = self.add_nibble_register(bucket, position_of_1 - register_offset);
        self.set_num_non_zero_registers(num_non_zero);
        if num_non_zero == NUM_BUCKETS as u16 {
            self.set_register_offset(register_offset + 1);
            let recount = self.decrement_buckets();
            self.set_num_non_zero_registers(recount);
        }
    }

    fn set_register_offset(&mut self, offset: u8) {
        let version = self.version;
        version.set_register_offset(self.data.to_mut(), offset);
    }

    fn set_num_non_zero_registers(&mut self, count: u16) {
        let version = self.version;
        version.set_num_non_zero_registers(self.data.to_mut(), count);
    }

    /// Store `max(existing, value)` into the bucket's nibble and return the
    /// updated non-zero register count.
    fn add_nibble_register(&mut self, bucket: u16, value: u8) -> u16 {
        if !self.is_dense() {
            self.convert_to_dense_storage();
        }

        let mut num_non_zero = self.num_non_zero_registers();
        let position = self.payload_byte_position() + (bucket >> 1) as usize;
        let is_upper_nibble = bucket & 1 == 0;
        let shifted = if is_upper_nibble {
            value << BITS_PER_BUCKET
        } else {
            value
        };
        let mask: u8 = if is_upper_nibble { 0xf0 } else { 0x0f };

        let data = self.data.to_mut();
        let original = data[position];
        if original & mask == 0 && shifted != 0 {
            num_non_zero += 1;
        }
        data[position] = (original & mask).max(shifted) | (original & !mask);
        num_non_zero
    }

    /// Subtract one from every register nibble and return the non-zero
    /// register count of the result.
    fn decrement_buckets(&mut self) -> u16 {
        let start = self.payload_byte_position();
        let mut count = 0u16;
        let data = self.data.to_mut();
        for byte in &mut data[start..start + NUM_BYTES_FOR_BUCKETS] {
            let value = byte.wrapping_sub(0x11);
            count += u16::from(value & 0xf0 != 0) + u16::from(value & 0x0f != 0);
            *byte = value;
        }
        count
    }

    /// Rebuild the backing storage as a dense buffer of the same version.
    fn convert_to_dense_storage(&mut self) {
        let version = self.version;
        let mut dense = vec![0u8; version.num_bytes_for_dense_storage()];
        version.write_version(&mut dense);
        version.set_register_offset(&mut dense, self.register_offset());
        version.set_num_non_zero_registers(&mut dense, self.num_non_zero_registers());
        version.set_max_overflow_value(&mut dense, self.max_overflow_value());
        version.set_max_overflow_register(&mut dense, self.max_overflow_register());

        // Sparse positions are buffer-absolute, so they index the dense
        // image directly.
        for triple in self.data[version.payload_byte_position()..].chunks_exact(3) {
            let position = u16::from_be_bytes([triple[0], triple[1]]) as usize;
            dense[position] = triple[2];
        }
        self.data = Cow::Owned(dense);
    }

    /// Merge `other` into this sketch and return it for chaining.
    ///
    /// Folding is a union: afterwards this sketch estimates the number of
    /// distinct values seen by either input. An empty `other` is a no-op.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the offset invariant breaks mid-merge; this
    /// signals a corrupted sketch.
    ///
    /// # Examples
    ///
    /// ```
    /// use hyperunique::HllSketch;
    ///
    /// let mut morning = HllSketch::new();
    /// let mut evening = HllSketch::new();
    /// for user in 0..500u32 {
    ///     morning.add(&user);
    /// }
    /// for user in 400..900u32 {
    ///     evening.add(&user);
    /// }
    /// morning.fold(&evening).unwrap();
    /// let estimate = morning.estimate();
    /// assert!((estimate - 900.0).abs() / 900.0 < 0.05);
    /// ```
    pub fn fold(&mut self, other: &HllSketch<'_>) -> Result<&mut Self, Error> {
        if other.data.is_empty() {
            return Ok(self);
        }
        self.invalidate_cached_estimate();

        if self.register_offset() < other.register_offset() {
            // Fold into the sketch with the higher offset so the source
            // side never needs its registers decremented.
            let replacement = HllSketch {
                version: other.version,
                data: Cow::Owned(other.data.to_vec()),
                cached_estimate: Cell::new(None),
            };
            let lower = std::mem::replace(self, replacement);
            self.fold_registers(&lower)?;
            return Ok(self);
        }

        self.fold_registers(other)?;
        Ok(self)
    }

    /// Parse `bytes` and fold the resulting sketch in. An empty buffer is
    /// a no-op.
    pub fn fold_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self, Error> {
        if bytes.is_empty() {
            return Ok(self);
        }
        let other = HllSketch::from_bytes(bytes)?;
        self.fold(&other)
    }

    fn fold_registers(&mut self, other: &HllSketch<'_>) -> Result<(), Error> {
        if !self.is_dense() {
            self.convert_to_dense_storage();
        }

        // Merge the source overflow slot first: it can slide this sketch's
        // offset, so the merge counters are read afterwards.
        self.add_register(other.max_overflow_register(), other.max_overflow_value());

        let other_offset = other.register_offset();
        let mut my_offset = self.register_offset();
        let mut num_non_zero = self.num_non_zero_registers();
        let mut offset_diff = i32::from(my_offset) - i32::from(other_offset);
        if offset_diff < 0 {
            return Err(Error::new(
                ErrorKind::InvalidState,
                "fold source has a higher register offset than the destination",
            )
            .with_context("offset_diff", offset_diff));
        }

        let my_payload_start = self.payload_byte_position();
        let other_payload_start = other.payload_byte_position();

        if other.is_dense() {
            for index in 0..NUM_BYTES_FOR_BUCKETS {
                let byte_to_add = other.data[other_payload_start + index];
                num_non_zero += self.merge_and_store_byte_register(
                    my_payload_start + index,
                    offset_diff,
                    byte_to_add,
                );
                if num_non_zero == NUM_BUCKETS as u16 {
                    my_offset += 1;
                    num_non_zero = self.decrement_buckets();
                    self.set_register_offset(my_offset);
                    self.set_num_non_zero_registers(num_non_zero);
                    offset_diff = i32::from(my_offset) - i32::from(other_offset);
                }
            }
        } else {
            let other_header = other.version.header_num_bytes();
            for triple in other.data[other_payload_start..].chunks_exact(3) {
                let position = u16::from_be_bytes([triple[0], triple[1]]) as usize;
                num_non_zero += self.merge_and_store_byte_register(
                    my_payload_start + (position - other_header),
                    offset_diff,
                    triple[2],
                );
                if num_non_zero == NUM_BUCKETS as u16 {
                    my_offset += 1;
                    num_non_zero = self.decrement_buckets();
                    self.set_register_offset(my_offset);
                    self.set_num_non_zero_registers(num_non_zero);
                    offset_diff = i32::from(my_offset) - i32::from(other_offset);
                }
            }
        }

        self.set_register_offset(my_offset);
        self.set_num_non_zero_registers(num_non_zero);
        Ok(())
    }

    /// Merge one source payload byte into the destination byte at
    /// `position`, returning how many of its two registers left zero.
    fn merge_and_store_byte_register(
        &mut self,
        position: usize,
        offset_diff: i32,
        byte_to_add: u8,
    ) -> u16 {
        if byte_to_add == 0 {
            return 0;
        }

        let data = self.data.to_mut();
        let current = data[position];
        let upper = i32::from(current & 0xf0);
        let lower = i32::from(current & 0x0f);

        // Sliding the source nibbles down by the offset difference can go
        // negative; max() against the non-negative destination nibble
        // discards those without a branch.
        let other_upper = i32::from(byte_to_add & 0xf0) - (offset_diff << BITS_PER_BUCKET);
        let other_lower = i32::from(byte_to_add & 0x0f) - offset_diff;

        let new_upper = upper.max(other_upper);
        let new_lower = lower.max(other_lower);

        let mut no_longer_zero = 0u16;
        if upper == 0 && new_upper > 0 {
            no_longer_zero += 1;
        }
        if lower == 0 && new_lower > 0 {
            no_longer_zero += 1;
        }

        data[position] = ((new_upper | new_lower) & 0xff) as u8;
        no_longer_zero
    }

    /// Estimate the number of distinct values fed to the sketch.
    ///
    /// The result is cached until the next mutation.
    pub fn estimate(&self) -> f64 {
        if let Some(cached) = self.cached_estimate.get() {
            return cached;
        }

        let overflow_register = self.max_overflow_register();
        let overflow = OverflowSlot {
            value: self.max_overflow_value(),
            byte_position: overflow_register >> 1,
            is_upper_nibble: overflow_register & 1 == 0,
        };
        let payload = &self.data[self.payload_byte_position()..];
        let estimate = if self.is_dense() {
            estimator::estimate_dense(payload, self.register_offset(), &overflow)
        } else {
            estimator::estimate_sparse(
                payload,
                self.version.header_num_bytes(),
                self.register_offset(),
                &overflow,
            )
        };
        self.cached_estimate.set(Some(estimate));
        estimate
    }

    /// Serialize the sketch.
    ///
    /// A dense sketch with fewer than
    /// [`DENSE_THRESHOLD`](crate::hll::DENSE_THRESHOLD) non-zero registers
    /// is downgraded to the sparse form; everything else is emitted as-is.
    pub fn to_bytes(&self) -> Vec<u8> {
        let num_non_zero = self.num_non_zero_registers();
        if self.is_dense() && num_non_zero < DENSE_THRESHOLD {
            let version = self.version;
            let header = version.header_num_bytes();
            let mut out = SketchBytes::with_capacity(header + usize::from(num_non_zero) * 3);
            version.write_header(
                &mut out,
                self.register_offset(),
                num_non_zero,
                self.max_overflow_value(),
                self.max_overflow_register(),
            );
            for (index, &byte) in self.data[header..].iter().enumerate() {
                if byte != 0 {
                    out.write_u16_be((header + index) as u16);
                    out.write_u8(byte);
                }
            }
            return out.into_bytes();
        }
        self.data.to_vec()
    }

    /// Order sketches by register offset, then non-zero register count,
    /// then estimate. Used to break ties among sketches during rollup.
    pub fn compare_to(&self, other: &HllSketch<'_>) -> Ordering {
        match self.register_offset().cmp(&other.register_offset()) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        match self
            .num_non_zero_registers()
            .cmp(&other.num_non_zero_registers())
        {
            Ordering::Equal => self.estimate().total_cmp(&other.estimate()),
            unequal => unequal,
        }
    }
}

/// Parse `bytes` and estimate in one step.
pub fn estimate_bytes(bytes: &[u8]) -> Result<f64, Error> {
    Ok(HllSketch::from_bytes(bytes)?.estimate())
}

impl PartialEq for HllSketch<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for HllSketch<'_> {}

impl fmt::Debug for HllSketch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HllSketch")
            .field("version", &self.version)
            .field("register_offset", &self.register_offset())
            .field("num_non_zero_registers", &self.num_non_zero_registers())
            .field("max_overflow_value", &self.max_overflow_value())
            .field("max_overflow_register", &self.max_overflow_register())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nibble_addressing() {
        let mut sketch = HllSketch::new();
        // Even bucket lands in the upper nibble, odd in the lower.
        sketch.add_register(4, 3);
        sketch.add_register(5, 2);
        let bytes = sketch.to_bytes();
        // Sparse form: header, then one triple for payload byte 2.
        assert_eq!(bytes.len(), 7 + 3);
        assert_eq!(u16::from_be_bytes([bytes[7], bytes[8]]), 7 + 2);
        assert_eq!(bytes[9], 0x32);
    }

    #[test]
    fn test_add_register_keeps_maximum() {
        let mut sketch = HllSketch::new();
        sketch.add_register(4, 3);
        sketch.add_register(4, 2);
        assert_eq!(sketch.num_non_zero_registers(), 1);
        let bytes = sketch.to_bytes();
        assert_eq!(bytes[9], 0x30);
    }

    #[test]
    fn test_values_below_window_are_discarded() {
        let mut sketch = HllSketch::new();
        for bucket in 0..NUM_BUCKETS as u16 {
            sketch.add_register(bucket, 1);
        }
        assert_eq!(sketch.register_offset(), 1);
        // Below or at the new offset: no effect.
        sketch.add_register(0, 1);
        assert_eq!(sketch.num_non_zero_registers(), 0);
    }

    #[test]
    fn test_merge_discards_negative_nibbles() {
        let mut destination = HllSketch::new();
        for bucket in 0..NUM_BUCKETS as u16 {
            destination.add_register(bucket, 1);
        }
        assert_eq!(destination.register_offset(), 1);

        // A source register at value 1 sits below the destination offset,
        // so the slid nibble goes negative and must lose to max().
        let mut source = HllSketch::new();
        source.add_register(0, 1);
        destination.fold(&source).unwrap();
        assert_eq!(destination.num_non_zero_registers(), 0);
        assert_eq!(destination.register_offset(), 1);
    }

    #[test]
    fn test_debug_summarizes_header() {
        let sketch = HllSketch::new();
        let rendered = format!("{sketch:?}");
        assert!(rendered.contains("register_offset: 0"));
        assert!(rendered.contains("V1"));
    }
}
