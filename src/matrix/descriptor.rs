//! Per-block descriptor table
//!
//! One record per (K-block, C-block) pair, row-major by K-block. A record
//! gives the number of A entries in the block and the wide word at which
//! they start in the entry stream.

use bytemuck::{Pod, Zeroable};

use crate::error::{SpmvError, SpmvResult};

/// Fixed-width descriptor record as laid out in device memory
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct BlockDescriptor {
    /// Entries of A in this block, padding included
    pub nonzero_count: u32,
    /// First wide word of the block in the entry stream
    pub stream_offset: u32,
}

impl BlockDescriptor {
    pub fn new(nonzero_count: u32, stream_offset: u32) -> Self {
        Self {
            nonzero_count,
            stream_offset,
        }
    }
}

/// Fixed-capacity table of block descriptors
#[derive(Debug, Clone)]
pub struct DescriptorTable {
    entries: Vec<BlockDescriptor>,
    capacity: usize,
    c_blocks: usize,
}

impl DescriptorTable {
    /// Empty table holding at most `capacity` records
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            c_blocks: 0,
        }
    }

    /// Load `k_blocks * c_blocks` records from a raw word image
    ///
    /// # Arguments
    ///
    /// * `words` - Two `u32` words per record: count then offset
    /// * `k_blocks` - Blocks along K
    /// * `c_blocks` - Blocks along M
    pub fn load(&mut self, words: &[u32], k_blocks: usize, c_blocks: usize) -> SpmvResult<()> {
        let needed = k_blocks * c_blocks;
        if needed > self.capacity {
            return Err(SpmvError::DescriptorOverflow {
                needed,
                capacity: self.capacity,
            });
        }

        let record_words = std::mem::size_of::<BlockDescriptor>() / std::mem::size_of::<u32>();
        if words.len() < needed * record_words {
            return Err(SpmvError::DimensionMismatch {
                what: "descriptor words",
                actual: words.len(),
                expected: needed * record_words,
            });
        }

        let records: &[BlockDescriptor] = bytemuck::try_cast_slice(&words[..needed * record_words])
            .map_err(|e| SpmvError::InvalidConfig(format!("descriptor image: {:?}", e)))?;

        self.entries.clear();
        self.entries.extend_from_slice(records);
        self.c_blocks = c_blocks;
        Ok(())
    }

    /// Descriptor of block (`k_block`, `c_block`)
    pub fn get(&self, k_block: usize, c_block: usize) -> BlockDescriptor {
        assert!(
            c_block < self.c_blocks,
            "C-block {} out of range ({} loaded)",
            c_block,
            self.c_blocks
        );
        self.entries[k_block * self.c_blocks + c_block]
    }

    /// Loaded records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockDescriptor> {
        self.entries.iter()
    }
}

/// Flatten records into the raw word image `DescriptorTable::load` reads
pub fn descriptors_to_words(descriptors: &[BlockDescriptor]) -> Vec<u32> {
    bytemuck::cast_slice(descriptors).to_vec()
}
