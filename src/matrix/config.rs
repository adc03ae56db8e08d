//! Configuration and block geometry for the banked SpMV engine

use crate::error::{SpmvError, SpmvResult};
use crate::stream::codec::MAX_INDEX;

/// Layout of one A entry inside a wide transport word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireLayout {
    /// Two words per entry: `[value, bits(row << 16 | col)]`
    Compact,
    /// Four words per entry: `[value, 0, bits(col), bits(row)]`
    Padded,
}

impl WireLayout {
    /// Number of float-sized words one entry occupies
    pub fn words_per_entry(&self) -> usize {
        match self {
            WireLayout::Compact => 2,
            WireLayout::Padded => 4,
        }
    }
}

impl Default for WireLayout {
    /// The build picks the layout; streams never announce it
    fn default() -> Self {
        if cfg!(feature = "padded-entries") {
            WireLayout::Padded
        } else {
            WireLayout::Compact
        }
    }
}

/// Host-side parameters used while building entry streams
#[derive(Debug, Clone)]
pub struct HostParameters {
    /// Threads used to sort and pack blocks
    pub n_threads: usize,
}

impl Default for HostParameters {
    fn default() -> Self {
        Self {
            n_threads: num_cpus::get(), // Use all available cores
        }
    }
}

/// Configuration for the SpMV engine
///
/// The bank layout mirrors the memories the engine models: B is split over
/// `width` banks of `k_bank_capacity` entries, C over `width * mac_groups`
/// banks of `m_bank_capacity` entries.
#[derive(Debug, Clone)]
pub struct SpmvConfig {
    /// Entries decoded, multiplied and routed in parallel (`SpmvWidth`)
    pub width: usize,

    /// Accumulation groups per row bank (`MacGroups`)
    pub mac_groups: usize,

    /// Entries held by each B bank
    pub k_bank_capacity: usize,

    /// Entries held by each (bank, group) C bank
    pub m_bank_capacity: usize,

    /// Capacity of the descriptor table in (K-block, C-block) pairs
    pub max_blocks: usize,

    /// Depth of the split queues between routers
    pub fifo_depth_deep: usize,

    /// Depth of the lane-to-lane queues
    pub fifo_depth_shallow: usize,

    /// Wire layout of the A stream
    pub layout: WireLayout,

    /// Host-side parameters for the stream builder
    pub host_params: HostParameters,
}

impl Default for SpmvConfig {
    fn default() -> Self {
        Self::for_geometry(4, 2, 1024, 512)
    }
}

impl SpmvConfig {
    /// Create a config for a given bank geometry with default queue depths
    pub fn for_geometry(
        width: usize,
        mac_groups: usize,
        k_bank_capacity: usize,
        m_bank_capacity: usize,
    ) -> Self {
        Self {
            width,
            mac_groups,
            k_bank_capacity,
            m_bank_capacity,
            max_blocks: 4096,
            fifo_depth_deep: 16,
            fifo_depth_shallow: 1,
            layout: WireLayout::default(),
            host_params: HostParameters::default(),
        }
    }

    /// Same config with another wire layout
    pub fn with_layout(mut self, layout: WireLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Same config with another descriptor table capacity
    pub fn with_max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = max_blocks;
        self
    }

    /// Number of (bank, group) accumulation lanes
    pub fn lanes(&self) -> usize {
        self.width * self.mac_groups
    }

    /// Rows covered by one C-block
    pub fn rows_per_cblock(&self) -> usize {
        self.lanes() * self.m_bank_capacity
    }

    /// Columns covered by one K-block
    pub fn entries_per_kblock(&self) -> usize {
        self.width * self.k_bank_capacity
    }

    /// Floats in one wide transport word
    pub fn word_len(&self) -> usize {
        self.width * self.layout.words_per_entry()
    }

    /// Block decomposition of an `m x k` operand
    pub fn geometry(&self, m: usize, k: usize) -> BlockGeometry {
        BlockGeometry {
            m,
            k,
            rows_per_cblock: self.rows_per_cblock(),
            entries_per_kblock: self.entries_per_kblock(),
            lane_rows: self.lanes(),
        }
    }

    /// Check that the geometry is usable
    ///
    /// Block-local row and column indices travel as 16-bit fields, so neither
    /// block dimension may exceed 65536.
    pub fn validate(&self) -> SpmvResult<()> {
        let positive = [
            ("width", self.width),
            ("mac_groups", self.mac_groups),
            ("k_bank_capacity", self.k_bank_capacity),
            ("m_bank_capacity", self.m_bank_capacity),
            ("max_blocks", self.max_blocks),
            ("fifo_depth_shallow", self.fifo_depth_shallow),
            ("fifo_depth_deep", self.fifo_depth_deep),
            ("host n_threads", self.host_params.n_threads),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(SpmvError::InvalidConfig(format!("{} must be > 0", name)));
            }
        }

        if self.rows_per_cblock() > MAX_INDEX {
            return Err(SpmvError::InvalidConfig(format!(
                "C-block of {} rows exceeds the {}-entry row index range",
                self.rows_per_cblock(),
                MAX_INDEX
            )));
        }
        if self.entries_per_kblock() > MAX_INDEX {
            return Err(SpmvError::InvalidConfig(format!(
                "K-block of {} columns exceeds the {}-entry column index range",
                self.entries_per_kblock(),
                MAX_INDEX
            )));
        }

        Ok(())
    }
}

/// Decomposition of the M (row) and K (column) dimensions into blocks
///
/// Every block is full except possibly the last one in each dimension, which
/// holds the residue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGeometry {
    /// Rows of A and C
    pub m: usize,
    /// Columns of A, length of B
    pub k: usize,
    /// Rows in a full C-block
    pub rows_per_cblock: usize,
    /// Columns in a full K-block
    pub entries_per_kblock: usize,
    /// Rows covered by one offset across all (bank, group) lanes
    pub lane_rows: usize,
}

impl BlockGeometry {
    /// Number of K-blocks
    pub fn k_blocks(&self) -> usize {
        self.k.div_ceil(self.entries_per_kblock)
    }

    /// Number of C-blocks
    pub fn c_blocks(&self) -> usize {
        self.m.div_ceil(self.rows_per_cblock)
    }

    /// Columns in K-block `k_block`
    pub fn kblock_len(&self, k_block: usize) -> usize {
        residual_len(k_block, self.k_blocks(), self.k, self.entries_per_kblock)
    }

    /// Rows in C-block `c_block`
    pub fn cblock_rows(&self, c_block: usize) -> usize {
        residual_len(c_block, self.c_blocks(), self.m, self.rows_per_cblock)
    }

    /// Offsets per (bank, group) lane that C-block `c_block` occupies
    ///
    /// A final partial block that does not fill its last bank/group unit is
    /// rounded up; the padding rows are never stored.
    pub fn cblock_offsets(&self, c_block: usize) -> usize {
        self.cblock_rows(c_block).div_ceil(self.lane_rows)
    }

    /// First column of K-block `k_block`
    pub fn kblock_start(&self, k_block: usize) -> usize {
        k_block * self.entries_per_kblock
    }

    /// First row of C-block `c_block`
    pub fn cblock_start(&self, c_block: usize) -> usize {
        c_block * self.rows_per_cblock
    }
}

fn residual_len(block: usize, n_blocks: usize, total: usize, full: usize) -> usize {
    assert!(block < n_blocks, "block {} out of range ({} blocks)", block, n_blocks);
    if block + 1 < n_blocks || total % full == 0 {
        full
    } else {
        total % full
    }
}
