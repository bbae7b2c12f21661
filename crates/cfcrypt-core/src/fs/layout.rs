//! Block layout arithmetic and the block plan for a byte range.
//!
//! The backing object is laid out as
//!
//! ```text
//! [Header][Block 0][Block 1]...[Block N-1]
//! ```
//!
//! Every block except possibly the last holds exactly `plain_block_size`
//! plaintext bytes and occupies `plain_block_size + overhead` bytes on disk,
//! so the offset of block `i` is `HEADER_SIZE + i * encrypted_block_size`
//! and any block can be read without touching the ones before it.

use std::ops::Range;

use crate::error::{CryptError, Result};
use crate::fs::header::HEADER_SIZE;

/// Largest addressable logical file size (1 PiB).
///
/// Keeps every encrypted offset representable in a `u64` for any supported
/// block size.
pub const MAX_FILE_SIZE: u64 = 1 << 50;

/// Pure block arithmetic for one (block size, overhead) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    plain_block_size: usize,
    overhead: usize,
}

/// One block touched by a byte-range operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOp {
    /// Block index within the file
    pub index: u64,
    /// First affected byte within the block
    pub start: usize,
    /// One past the last affected byte within the block
    pub end: usize,
    /// Position of `start` within the caller's buffer
    pub buf_offset: usize,
    /// Whether the operation covers the whole block
    pub full: bool,
}

impl BlockOp {
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Range within the caller's buffer that maps onto this block.
    #[inline]
    pub fn buf_range(&self) -> Range<usize> {
        self.buf_offset..self.buf_offset + self.len()
    }
}

impl BlockLayout {
    /// Create a layout. `plain_block_size` must be non-zero; configurations
    /// are validated before a layout is built from them.
    pub const fn new(plain_block_size: usize, overhead: usize) -> Self {
        assert!(plain_block_size > 0, "plain block size must be positive");
        Self {
            plain_block_size,
            overhead,
        }
    }

    #[inline]
    pub fn plain_block_size(&self) -> usize {
        self.plain_block_size
    }

    #[inline]
    pub fn overhead(&self) -> usize {
        self.overhead
    }

    #[inline]
    pub fn encrypted_block_size(&self) -> usize {
        self.plain_block_size + self.overhead
    }

    /// Block containing the given plaintext offset.
    #[inline]
    pub fn block_index(&self, offset: u64) -> u64 {
        offset / self.plain_block_size as u64
    }

    /// Offset of a plaintext byte within its block.
    #[inline]
    pub fn block_offset(&self, offset: u64) -> usize {
        // Always below plain_block_size, which is a usize.
        #[allow(clippy::cast_possible_truncation)]
        let within = (offset % self.plain_block_size as u64) as usize;
        within
    }

    /// Plaintext offset of the first byte of a block.
    #[inline]
    pub fn block_start(&self, index: u64) -> u64 {
        index * self.plain_block_size as u64
    }

    /// Backing-store offset of a block.
    #[inline]
    pub fn encrypted_offset(&self, index: u64) -> u64 {
        HEADER_SIZE as u64 + index * self.encrypted_block_size() as u64
    }

    /// Number of blocks holding data for a file of the given size.
    #[inline]
    pub fn block_count(&self, size: u64) -> u64 {
        size.div_ceil(self.plain_block_size as u64)
    }

    /// Plaintext length of block `index` in a file of `size` bytes
    /// (0 for blocks past the end).
    pub fn block_len(&self, index: u64, size: u64) -> usize {
        let start = self.block_start(index);
        if start >= size {
            return 0;
        }
        let remaining = size - start;
        if remaining >= self.plain_block_size as u64 {
            self.plain_block_size
        } else {
            // remaining < plain_block_size
            #[allow(clippy::cast_possible_truncation)]
            let len = remaining as usize;
            len
        }
    }

    /// Logical size for a backing object of `encrypted_len` bytes.
    ///
    /// Returns `None` if no plaintext size maps to that length: a partial
    /// header, or a trailing block too short to hold nonce, tag and at least
    /// one byte.
    pub fn plaintext_size(&self, encrypted_len: u64) -> Option<u64> {
        if encrypted_len == 0 {
            return Some(0);
        }
        if encrypted_len < HEADER_SIZE as u64 {
            return None;
        }

        let content = encrypted_len - HEADER_SIZE as u64;
        let ebs = self.encrypted_block_size() as u64;
        let full_blocks = content / ebs;
        let remainder = content % ebs;

        let mut size = full_blocks * self.plain_block_size as u64;
        if remainder > 0 {
            if remainder <= self.overhead as u64 {
                return None;
            }
            size += remainder - self.overhead as u64;
        }
        Some(size)
    }

    /// Backing-object length for a file of `plaintext_size` bytes.
    ///
    /// An empty file has no header and no blocks.
    pub fn encrypted_size(&self, plaintext_size: u64) -> u64 {
        if plaintext_size == 0 {
            return 0;
        }
        let full_blocks = plaintext_size / self.plain_block_size as u64;
        let remainder = plaintext_size % self.plain_block_size as u64;

        let mut size = HEADER_SIZE as u64 + full_blocks * self.encrypted_block_size() as u64;
        if remainder > 0 {
            size += remainder + self.overhead as u64;
        }
        size
    }

    /// Split `[offset, offset + len)` into per-block operations, in order.
    ///
    /// A zero-length range yields an empty plan.
    pub fn plan(&self, offset: u64, len: usize) -> Result<Vec<BlockOp>> {
        let end = offset
            .checked_add(len as u64)
            .filter(|end| *end <= MAX_FILE_SIZE)
            .ok_or(CryptError::InvalidRange {
                offset: i128::from(offset),
                len: len as u64,
                reason: "range exceeds maximum file size",
            })?;

        if len == 0 {
            return Ok(Vec::new());
        }

        let first = self.block_index(offset);
        let last = self.block_index(end - 1);
        // Bounded by MAX_FILE_SIZE / 1.
        #[allow(clippy::cast_possible_truncation)]
        let mut ops = Vec::with_capacity((last - first + 1) as usize);

        let mut pos = offset;
        let mut buf_offset = 0usize;
        for index in first..=last {
            let start = self.block_offset(pos);
            let block_end = self.block_start(index) + self.plain_block_size as u64;
            let stop = end.min(block_end);
            // stop - pos fits in one block
            #[allow(clippy::cast_possible_truncation)]
            let span = (stop - pos) as usize;
            let op_end = start + span;

            ops.push(BlockOp {
                index,
                start,
                end: op_end,
                buf_offset,
                full: start == 0 && op_end == self.plain_block_size,
            });

            pos = stop;
            buf_offset += span;
        }

        Ok(ops)
    }
}

/// Convert a signed offset from the dispatch layer, rejecting negatives.
pub fn checked_offset(offset: i64, len: usize) -> Result<u64> {
    u64::try_from(offset).map_err(|_| CryptError::InvalidRange {
        offset: i128::from(offset),
        len: len as u64,
        reason: "negative offset",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const LAYOUT: BlockLayout = BlockLayout::new(4096, 28);

    #[test]
    fn test_block_math() {
        assert_eq!(LAYOUT.block_index(0), 0);
        assert_eq!(LAYOUT.block_index(4095), 0);
        assert_eq!(LAYOUT.block_index(4096), 1);
        assert_eq!(LAYOUT.block_offset(4097), 1);
        assert_eq!(LAYOUT.encrypted_offset(0), 18);
        assert_eq!(LAYOUT.encrypted_offset(2), 18 + 2 * 4124);
        assert_eq!(LAYOUT.block_count(0), 0);
        assert_eq!(LAYOUT.block_count(1), 1);
        assert_eq!(LAYOUT.block_count(4096), 1);
        assert_eq!(LAYOUT.block_count(4097), 2);
    }

    #[test]
    fn test_block_len() {
        assert_eq!(LAYOUT.block_len(0, 10_760), 4096);
        assert_eq!(LAYOUT.block_len(2, 10_760), 10_760 - 8192);
        assert_eq!(LAYOUT.block_len(3, 10_760), 0);
        assert_eq!(LAYOUT.block_len(0, 0), 0);
    }

    #[test]
    fn test_size_conversion() {
        assert_eq!(LAYOUT.plaintext_size(0), Some(0));
        assert_eq!(LAYOUT.plaintext_size(17), None);
        assert_eq!(LAYOUT.plaintext_size(18), Some(0));
        // Trailing block with only nonce and tag is never written.
        assert_eq!(LAYOUT.plaintext_size(18 + 28), None);
        assert_eq!(LAYOUT.plaintext_size(18 + 29), Some(1));
        assert_eq!(LAYOUT.plaintext_size(18 + 4124), Some(4096));
        assert_eq!(LAYOUT.plaintext_size(18 + 4124 + 128), Some(4196));

        assert_eq!(LAYOUT.encrypted_size(0), 0);
        assert_eq!(LAYOUT.encrypted_size(1), 18 + 29);
        assert_eq!(LAYOUT.encrypted_size(4096), 18 + 4124);
        assert_eq!(LAYOUT.encrypted_size(2176), 18 + 2176 + 28);
    }

    #[test]
    fn test_plan_empty_range() {
        assert!(LAYOUT.plan(12345, 0).unwrap().is_empty());
    }

    #[test]
    fn test_plan_within_one_block() {
        let plan = LAYOUT.plan(500, 100).unwrap();
        assert_eq!(
            plan,
            vec![BlockOp {
                index: 0,
                start: 500,
                end: 600,
                buf_offset: 0,
                full: false
            }]
        );
    }

    #[test]
    fn test_plan_spanning_blocks() {
        let plan = LAYOUT.plan(4000, 8300).unwrap();
        assert_eq!(plan.len(), 4);
        assert_eq!((plan[0].index, plan[0].start, plan[0].end), (0, 4000, 4096));
        assert!(!plan[0].full);
        assert_eq!((plan[1].index, plan[1].start, plan[1].end), (1, 0, 4096));
        assert!(plan[1].full);
        assert!(plan[2].full);
        assert_eq!((plan[3].index, plan[3].start, plan[3].end), (3, 0, 12_300 - 12_288));
        assert_eq!(plan[3].buf_range(), 8288..8300);
    }

    #[test]
    fn test_plan_rejects_overflow() {
        let err = LAYOUT.plan(MAX_FILE_SIZE, 1).unwrap_err();
        assert!(matches!(err, CryptError::InvalidRange { .. }));
        assert!(LAYOUT.plan(u64::MAX, 2).is_err());
        assert!(LAYOUT.plan(MAX_FILE_SIZE - 1, 1).is_ok());
    }

    #[test]
    fn test_checked_offset() {
        assert_eq!(checked_offset(7, 1).unwrap(), 7);
        let err = checked_offset(-1, 10).unwrap_err();
        assert!(matches!(
            err,
            CryptError::InvalidRange {
                offset: -1,
                len: 10,
                ..
            }
        ));
    }

    proptest! {
        #[test]
        fn prop_plan_tiles_range(
            block_size in 1usize..5000,
            offset in 0u64..100_000,
            len in 0usize..50_000,
        ) {
            let layout = BlockLayout::new(block_size, 28);
            let plan = layout.plan(offset, len).unwrap();

            let covered: usize = plan.iter().map(BlockOp::len).sum();
            prop_assert_eq!(covered, len);

            let mut expected_buf = 0usize;
            for (i, op) in plan.iter().enumerate() {
                prop_assert!(op.start < op.end);
                prop_assert!(op.end <= block_size);
                prop_assert_eq!(op.buf_offset, expected_buf);
                prop_assert_eq!(op.full, op.start == 0 && op.end == block_size);
                prop_assert_eq!(
                    layout.block_start(op.index) + op.start as u64,
                    offset + op.buf_offset as u64
                );
                if i > 0 {
                    prop_assert_eq!(op.index, plan[i - 1].index + 1);
                    prop_assert_eq!(op.start, 0);
                }
                if i + 1 < plan.len() {
                    prop_assert_eq!(op.end, block_size);
                }
                expected_buf += op.len();
            }
        }

        #[test]
        fn prop_size_conversion_inverts(block_size in 1usize..5000, size in 0u64..10_000_000) {
            let layout = BlockLayout::new(block_size, 40);
            prop_assert_eq!(layout.plaintext_size(layout.encrypted_size(size)), Some(size));
        }
    }
}
