// Copyright 2026 foyer Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fmt::{Debug, Display},
    ops::{Add, BitAnd, Not, Sub},
};

/// An unsigned trait that used by the utils.
pub trait Unsigned:
    Add<Output = Self>
    + Sub<Output = Self>
    + BitAnd<Output = Self>
    + Not<Output = Self>
    + Sized
    + From<u8>
    + Eq
    + Debug
    + Display
    + Clone
    + Copy
{
}

impl<
        U: Add<Output = Self>
            + Sub<Output = Self>
            + BitAnd<Output = Self>
            + Not<Output = Self>
            + Sized
            + From<u8>
            + Eq
            + Debug
            + Display
            + Clone
            + Copy,
    > Unsigned for U
{
}

/// Check if the given value is a power of 2.
///
/// Note: `0` is not a power of 2.
#[inline(always)]
pub fn is_pow2<U: Unsigned>(v: U) -> bool {
    v != U::from(0) && v & (v - U::from(1)) == U::from(0)
}

/// Assert that the given value is a power of 2.
#[inline(always)]
pub fn assert_pow2<U: Unsigned>(v: U) {
    assert!(is_pow2(v), "v: {}", v);
}

/// Check if the given value is aligned with the given align.
///
/// Note: The given align must be a power of 2.
#[inline(always)]
pub fn is_aligned<U: Unsigned>(align: U, v: U) -> bool {
    debug_assert!(is_pow2(align), "align: {}", align);
    v & (align - U::from(1)) == U::from(0)
}

/// Round up the given value to the next power of 2.
///
/// `0` and `1` are both rounded up to `1`.
#[inline(always)]
pub fn round_up_pow2(v: u64) -> u64 {
    v.max(1).next_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pow2() {
        assert!(!is_pow2(0u64));
        assert!(is_pow2(1u64));
        assert!(is_pow2(4096u64));
        assert!(!is_pow2(4097u64));

        assert_eq!(round_up_pow2(0), 1);
        assert_eq!(round_up_pow2(1), 1);
        assert_eq!(round_up_pow2(3), 4);
        assert_eq!(round_up_pow2(4096), 4096);
        assert_eq!(round_up_pow2(4097), 8192);
    }

    #[test]
    fn test_aligned() {
        assert!(is_aligned(4096u64, 0));
        assert!(is_aligned(4096u64, 8192));
        assert!(!is_aligned(4096u64, 4095));
    }
}
