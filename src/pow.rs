//! Proof of work: 256-bit target arithmetic, compact bits, block work and the retarget schedule

use crate::block_index::{BlockIndex, BlockNode};
use crate::chain_params::ChainParams;
use crate::error::{reject, ChainError, Result, RuleKind};
use crate::types::{BlockHash, BlockHeader};
use std::cmp::Ordering;

/// Unsigned 256-bit integer, little-endian 64-bit words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct U256(pub [u64; 4]);

impl U256 {
    pub const ZERO: U256 = U256([0; 4]);
    pub const MAX: U256 = U256([u64::MAX; 4]);

    pub fn from_u64(value: u64) -> Self {
        U256([value, 0, 0, 0])
    }

    /// Interpret a hash as a little-endian number, the way block hashes are compared to targets
    pub fn from_le_bytes(bytes: &[u8; 32]) -> Self {
        let mut words = [0u64; 4];
        for (i, word) in words.iter_mut().enumerate() {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
            *word = u64::from_le_bytes(buf);
        }
        U256(words)
    }

    pub fn to_le_bytes(self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (i, word) in self.0.iter().enumerate() {
            bytes[i * 8..(i + 1) * 8].copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    fn low_u64(&self) -> u64 {
        self.0[0]
    }

    /// Value narrowed to u128, saturating
    pub fn saturating_to_u128(&self) -> u128 {
        if self.0[2] != 0 || self.0[3] != 0 {
            u128::MAX
        } else {
            (self.0[1] as u128) << 64 | self.0[0] as u128
        }
    }

    /// Number of significant bits (0 for zero)
    pub fn bits(&self) -> u32 {
        for i in (0..4).rev() {
            if self.0[i] != 0 {
                return 64 * i as u32 + (64 - self.0[i].leading_zeros());
            }
        }
        0
    }

    fn bit(&self, n: u32) -> bool {
        (self.0[(n / 64) as usize] >> (n % 64)) & 1 == 1
    }

    pub fn shl(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::ZERO;
        }
        let mut result = U256::ZERO;
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;
        for i in 0..4 - word_shift {
            result.0[i + word_shift] |= self.0[i] << bit_shift;
            if bit_shift > 0 && i + word_shift + 1 < 4 {
                result.0[i + word_shift + 1] |= self.0[i] >> (64 - bit_shift);
            }
        }
        result
    }

    pub fn shr(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::ZERO;
        }
        let mut result = U256::ZERO;
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;
        for i in word_shift..4 {
            result.0[i - word_shift] |= self.0[i] >> bit_shift;
            if bit_shift > 0 && i > word_shift {
                result.0[i - word_shift - 1] |= self.0[i] << (64 - bit_shift);
            }
        }
        result
    }

    pub fn not(&self) -> Self {
        U256([!self.0[0], !self.0[1], !self.0[2], !self.0[3]])
    }

    pub fn overflowing_add(&self, rhs: &U256) -> (U256, bool) {
        let mut out = [0u64; 4];
        let mut carry = false;
        for (i, slot) in out.iter_mut().enumerate() {
            let (sum, c1) = self.0[i].overflowing_add(rhs.0[i]);
            let (sum, c2) = sum.overflowing_add(carry as u64);
            *slot = sum;
            carry = c1 || c2;
        }
        (U256(out), carry)
    }

    pub fn wrapping_sub(&self, rhs: &U256) -> U256 {
        let mut out = [0u64; 4];
        let mut borrow = false;
        for (i, slot) in out.iter_mut().enumerate() {
            let (diff, b1) = self.0[i].overflowing_sub(rhs.0[i]);
            let (diff, b2) = diff.overflowing_sub(borrow as u64);
            *slot = diff;
            borrow = b1 || b2;
        }
        U256(out)
    }

    /// Long division; `None` on a zero divisor
    pub fn checked_div(&self, divisor: &U256) -> Option<U256> {
        if divisor.is_zero() {
            return None;
        }
        let mut quotient = U256::ZERO;
        let mut remainder = U256::ZERO;
        for n in (0..self.bits()).rev() {
            let carry = remainder.0[3] >> 63 == 1;
            remainder = remainder.shl(1);
            if self.bit(n) {
                remainder.0[0] |= 1;
            }
            if carry || remainder >= *divisor {
                remainder = remainder.wrapping_sub(divisor);
                quotient.0[(n / 64) as usize] |= 1 << (n % 64);
            }
        }
        Some(quotient)
    }

    /// `self * mul / div` with a 320-bit intermediate; `None` if the result
    /// does not fit in 256 bits or `div` is zero
    pub fn mul_div_u64(&self, mul: u64, div: u64) -> Option<U256> {
        if div == 0 {
            return None;
        }
        let mut wide = [0u64; 5];
        let mut carry = 0u128;
        for i in 0..4 {
            let product = self.0[i] as u128 * mul as u128 + carry;
            wide[i] = product as u64;
            carry = product >> 64;
        }
        wide[4] = carry as u64;

        let mut remainder = 0u128;
        for word in wide.iter_mut().rev() {
            let dividend = (remainder << 64) | *word as u128;
            *word = (dividend / div as u128) as u64;
            remainder = dividend % div as u128;
        }
        if wide[4] != 0 {
            return None;
        }
        Some(U256([wide[0], wide[1], wide[2], wide[3]]))
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().rev().zip(other.0.iter().rev()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

/// A decoded compact target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactTarget {
    pub target: U256,
    pub negative: bool,
    pub overflow: bool,
}

/// Expand compact bits (`0x1d00ffff` = exponent 0x1d, mantissa 0x00ffff)
///
/// Mantissa is 23 bits; bit 0x00800000 is a sign bit. Follows the reference
/// SetCompact exactly, including the negative and overflow flags.
pub fn expand_target(bits: u32) -> CompactTarget {
    let size = bits >> 24;
    let mut word = bits & 0x007f_ffff;
    let target = if size <= 3 {
        word >>= 8 * (3 - size);
        U256::from_u64(word as u64)
    } else {
        U256::from_u64(word as u64).shl(8 * (size - 3))
    };
    CompactTarget {
        target,
        negative: word != 0 && bits & 0x0080_0000 != 0,
        overflow: word != 0
            && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32)),
    }
}

/// Compress a target back to compact bits (reference GetCompact)
pub fn compress_target(target: &U256) -> u32 {
    let mut size = (target.bits() + 7) / 8;
    let mut compact = if size <= 3 {
        (target.low_u64() << (8 * (3 - size))) as u32
    } else {
        target.shr(8 * (size - 3)).low_u64() as u32
    };
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | (size << 24)
}

/// Target from bits, rejecting negative, zero, overflowing or above-limit values
pub fn target_from_bits(bits: u32, pow_limit: &U256) -> Result<U256> {
    let decoded = expand_target(bits);
    if decoded.negative || decoded.overflow || decoded.target.is_zero() {
        return reject(
            RuleKind::BadTargetRange,
            format!("bits {bits:#010x} do not encode a positive target"),
        );
    }
    if decoded.target > *pow_limit {
        return reject(
            RuleKind::BadTargetRange,
            format!("bits {bits:#010x} are easier than the proof-of-work limit"),
        );
    }
    Ok(decoded.target)
}

/// Context-free proof-of-work check: the header hash must not exceed its own target
pub fn check_proof_of_work(header: &BlockHeader, hash: &BlockHash, pow_limit: &U256) -> Result<()> {
    let target = target_from_bits(header.bits, pow_limit)?;
    if U256::from_le_bytes(&hash.0) > target {
        return reject(
            RuleKind::HighHash,
            format!("block hash {hash} is above target {:#010x}", header.bits),
        );
    }
    Ok(())
}

/// Expected number of hashes to find a block at `bits`: 2^256 / (target + 1)
///
/// Computed as `!target / (target + 1) + 1` to stay within 256 bits and
/// saturated to u128, which is ample for cumulative chain work.
pub fn block_work(bits: u32) -> u128 {
    let decoded = expand_target(bits);
    if decoded.negative || decoded.overflow || decoded.target.is_zero() {
        return 0;
    }
    let (denominator, overflowed) = decoded.target.overflowing_add(&U256::from_u64(1));
    if overflowed {
        return 1;
    }
    decoded
        .target
        .not()
        .checked_div(&denominator)
        .map(|q| q.saturating_to_u128().saturating_add(1))
        .unwrap_or(0)
}

/// Compact bits required for the child of `parent` with timestamp `new_timestamp`
///
/// Heights that are not a retarget boundary inherit the parent's bits, except
/// on networks with `reduce_min_difficulty` where a block arriving more than
/// `min_diff_reduction_time` after its parent may use the limit, and other
/// blocks must use the last non-limit bits of the period. At a boundary the
/// target scales by the clamped timespan of the previous interval.
pub fn next_required_bits(
    index: &BlockIndex,
    parent: &BlockNode,
    new_timestamp: u32,
    params: &ChainParams,
) -> Result<u32> {
    let interval = params.blocks_per_retarget();
    let next_height = parent.height + 1;

    if interval == 0 || next_height % interval != 0 {
        if params.reduce_min_difficulty {
            let allow_min = parent.header.timestamp as u64 + params.min_diff_reduction_time;
            if new_timestamp as u64 > allow_min {
                return Ok(params.pow_limit_bits);
            }
            return Ok(last_non_min_bits(index, parent, params));
        }
        return Ok(parent.header.bits);
    }

    let first = index
        .ancestor_at(&parent.hash, parent.height + 1 - interval)
        .ok_or_else(|| {
            ChainError::Corrupt(
                format!("missing retarget ancestor of {} at interval start", parent.hash).into(),
            )
        })?;

    let actual = (parent.header.timestamp as i64 - first.header.timestamp as i64).max(0) as u64;
    let min_span = params.target_timespan / params.retarget_adjustment_factor;
    let max_span = params.target_timespan * params.retarget_adjustment_factor;
    let adjusted = actual.clamp(min_span, max_span);

    let pow_limit = params.pow_limit();
    let old_target = expand_target(parent.header.bits).target;
    let new_target = old_target
        .mul_div_u64(adjusted, params.target_timespan)
        .filter(|t| *t <= pow_limit)
        .unwrap_or(pow_limit);

    Ok(compress_target(&new_target))
}

fn last_non_min_bits(index: &BlockIndex, start: &BlockNode, params: &ChainParams) -> u32 {
    let interval = params.blocks_per_retarget();
    let mut node = Some(start);
    while let Some(current) = node {
        if (interval != 0 && current.height % interval == 0)
            || current.header.bits != params.pow_limit_bits
        {
            return current.header.bits;
        }
        node = current.parent.and_then(|p| index.lookup(&p));
    }
    params.pow_limit_bits
}
