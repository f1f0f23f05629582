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

//! Per-byte lookup tables for register updates and estimation.

use std::sync::LazyLock;

/// 1-based position of the most significant set bit of a byte; 0 for a
/// zero byte, meaning "contribute 8 and keep scanning".
pub(crate) const POSITION_OF_FIRST_ONE: [u8; 256] = build_position_table();

const fn build_position_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut byte: usize = 1;
    while byte < 256 {
        let mut position = 1u8;
        let mut mask: usize = 0x80;
        while byte & mask == 0 {
            mask >>= 1;
            position += 1;
        }
        table[byte] = position;
        byte += 1;
    }
    table
}

/// How many of a byte's two register nibbles are zero (0, 1, or 2).
pub(crate) const NUM_ZERO_NIBBLES: [u8; 256] = build_zero_table();

const fn build_zero_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut byte: usize = 0;
    while byte < 256 {
        table[byte] = ((byte & 0xf0 == 0) as u8) + ((byte & 0x0f == 0) as u8);
        byte += 1;
    }
    table
}

/// `2^-(upper + offset) + 2^-(lower + offset)` for every (offset, byte)
/// pair, so the estimator sums one table hit per payload byte.
static REGISTER_SUM_LOOKUP: LazyLock<Box<[[f64; 256]; 64]>> = LazyLock::new(|| {
    let mut table = Box::new([[0.0f64; 256]; 64]);
    for offset in 0..64 {
        for byte in 0..256 {
            let upper = (byte >> 4) as u32 + offset as u32;
            let lower = (byte & 0x0f) as u32 + offset as u32;
            table[offset][byte] = exp2_neg(upper) + exp2_neg(lower);
        }
    }
    table
});

pub(crate) fn register_sum(register_offset: u8, register: u8) -> f64 {
    // Offsets past the table would contribute nothing measurable.
    REGISTER_SUM_LOOKUP[(register_offset as usize).min(63)][register as usize]
}

pub(crate) fn exp2_neg(n: u32) -> f64 {
    1.0 / 2.0f64.powi(n as i32)
}
