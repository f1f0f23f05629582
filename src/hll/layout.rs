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

//! Header layouts for the two wire versions.
//!
//! Each variant knows its header size and field offsets; the accessors
//! read and write the backing bytes directly. The payload that follows the
//! header is identical across versions.

use crate::codec::SketchBytes;
use crate::hll::serialization::V0_HEADER_NUM_BYTES;
use crate::hll::serialization::V0_NUM_BYTES_FOR_DENSE_STORAGE;
use crate::hll::serialization::V0_NUM_NON_ZERO_BYTE;
use crate::hll::serialization::V0_REGISTER_OFFSET_BYTE;
use crate::hll::serialization::V1_HEADER_NUM_BYTES;
use crate::hll::serialization::V1_MAX_OVERFLOW_REGISTER_BYTE;
use crate::hll::serialization::V1_MAX_OVERFLOW_VALUE_BYTE;
use crate::hll::serialization::V1_NUM_BYTES_FOR_DENSE_STORAGE;
use crate::hll::serialization::V1_NUM_NON_ZERO_BYTE;
use crate::hll::serialization::V1_REGISTER_OFFSET_BYTE;
use crate::hll::serialization::V1_VERSION_BYTE;
use crate::hll::serialization::VERSION_V1;

/// Wire layout version of a sketch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// Legacy 3-byte header: register offset, then the 16-bit non-zero
    /// register count. No version byte and no overflow slot; overflow
    /// reads return zero and overflow writes are dropped.
    V0,
    /// Current 7-byte header: version byte, register offset, non-zero
    /// register count, overflow value, overflow register.
    V1,
}

impl Version {
    pub(crate) fn header_num_bytes(self) -> usize {
        match self {
            Version::V0 => V0_HEADER_NUM_BYTES,
            Version::V1 => V1_HEADER_NUM_BYTES,
        }
    }

    pub(crate) fn num_bytes_for_dense_storage(self) -> usize {
        match self {
            Version::V0 => V0_NUM_BYTES_FOR_DENSE_STORAGE,
            Version::V1 => V1_NUM_BYTES_FOR_DENSE_STORAGE,
        }
    }

    /// Index where the register payload begins.
    pub(crate) fn payload_byte_position(self) -> usize {
        self.header_num_bytes()
    }

    pub(crate) fn write_version(self, data: &mut [u8]) {
        if let Version::V1 = self {
            data[V1_VERSION_BYTE] = VERSION_V1;
        }
    }

    pub(crate) fn register_offset(self, data: &[u8]) -> u8 {
        match self {
            Version::V0 => data[V0_REGISTER_OFFSET_BYTE],
            Version::V1 => data[V1_REGISTER_OFFSET_BYTE],
        }
    }

    pub(crate) fn set_register_offset(self, data: &mut [u8], offset: u8) {
        match self {
            Version::V0 => data[V0_REGISTER_OFFSET_BYTE] = offset,
            Version::V1 => data[V1_REGISTER_OFFSET_BYTE] = offset,
        }
    }

    pub(crate) fn num_non_zero_registers(self, data: &[u8]) -> u16 {
        let at = match self {
            Version::V0 => V0_NUM_NON_ZERO_BYTE,
            Version::V1 => V1_NUM_NON_ZERO_BYTE,
        };
        u16::from_be_bytes([data[at], data[at + 1]])
    }

    pub(crate) fn set_num_non_zero_registers(self, data: &mut [u8], count: u16) {
        let at = match self {
            Version::V0 => V0_NUM_NON_ZERO_BYTE,
            Version::V1 => V1_NUM_NON_ZERO_BYTE,
        };
        data[at..at + 2].copy_from_slice(&count.to_be_bytes());
    }

    pub(crate) fn max_overflow_value(self, data: &[u8]) -> u8 {
        match self {
            Version::V0 => 0,
            Version::V1 => data[V1_MAX_OVERFLOW_VALUE_BYTE],
        }
    }

    pub(crate) fn set_max_overflow_value(self, data: &mut [u8], value: u8) {
        if let Version::V1 = self {
            data[V1_MAX_OVERFLOW_VALUE_BYTE] = value;
        }
    }

    pub(crate) fn max_overflow_register(self, data: &[u8]) -> u16 {
        match self {
            Version::V0 => 0,
            Version::V1 => u16::from_be_bytes([
                data[V1_MAX_OVERFLOW_REGISTER_BYTE],
                data[V1_MAX_OVERFLOW_REGISTER_BYTE + 1],
            ]),
        }
    }

    pub(crate) fn set_max_overflow_register(self, data: &mut [u8], register: u16) {
        if let Version::V1 = self {
            data[V1_MAX_OVERFLOW_REGISTER_BYTE..V1_MAX_OVERFLOW_REGISTER_BYTE + 2]
                .copy_from_slice(&register.to_be_bytes());
        }
    }

    /// Append a complete header to `out` in this version's field order.
    pub(crate) fn write_header(
        self,
        out: &mut SketchBytes,
        register_offset: u8,
        num_non_zero_registers: u16,
        max_overflow_value: u8,
        max_overflow_register: u16,
    ) {
        match self {
            Version::V0 => {
                out.write_u8(register_offset);
                out.write_u16_be(num_non_zero_registers);
            }
            Version::V1 => {
                out.write_u8(VERSION_V1);
                out.write_u8(register_offset);
                out.write_u16_be(num_non_zero_registers);
                out.write_u8(max_overflow_value);
                out.write_u16_be(max_overflow_register);
            }
        }
    }
}
