//! Block driver: loads B and C block by block and runs the pipeline
//!
//! ```text
//! load descriptors for k_blocks x c_blocks
//! for each K-block:
//!     load B banks
//!     for each C-block:
//!         load C (bias) or start from zero
//!         run the pipeline over the block's entries
//!         store C, clamping negatives if relu is set
//! ```
//!
//! C carries the partial sums of earlier K-blocks into later ones, which is
//! how a K dimension wider than the B banks still yields one accumulated C.

use std::time::Instant;

use tracing::{debug, info};

use crate::error::{SpmvError, SpmvResult};
use crate::matrix::banks::{ResidentVector, ResultBlock};
use crate::matrix::config::SpmvConfig;
use crate::matrix::descriptor::DescriptorTable;
use crate::matrix::reference::relu_in_place;
use crate::pipeline::{run_block, BlockReport};
use crate::scalar::SpmvScalar;
use crate::stream::codec::EntryStream;

/// Per-run operands of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpmvArgs {
    /// Rows of A and C
    pub m: usize,
    /// Columns of A, length of B
    pub k: usize,
    /// Blocks along K, must match the configured decomposition
    pub k_blocks: usize,
    /// Blocks along M, must match the configured decomposition
    pub c_blocks: usize,
    /// Clamp negative results to zero on the final store
    pub relu: bool,
    /// Add into the existing C; otherwise the first K-block starts from zero
    pub accumulate: bool,
}

impl SpmvArgs {
    /// Arguments for an `m x k` problem with block counts taken from `config`
    pub fn new(m: usize, k: usize, config: &SpmvConfig) -> Self {
        let geometry = config.geometry(m, k);
        Self {
            m,
            k,
            k_blocks: geometry.k_blocks(),
            c_blocks: geometry.c_blocks(),
            relu: false,
            accumulate: true,
        }
    }

    pub fn with_relu(mut self, relu: bool) -> Self {
        self.relu = relu;
        self
    }

    /// Compute `C = A·B` instead of `C += A·B`
    pub fn overwrite(mut self) -> Self {
        self.accumulate = false;
        self
    }
}

/// Totals for one engine run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// (K-block, C-block) pairs processed
    pub blocks: usize,
    /// Lane counters summed over all blocks
    pub totals: BlockReport,
}

/// The SpMV engine with its resident banks
///
/// Banks are allocated once at construction and reused for every block of
/// every run.
pub struct SpmvEngine<T> {
    config: SpmvConfig,
    descriptors: DescriptorTable,
    b_banks: ResidentVector<T>,
    c_banks: ResultBlock<T>,
}

impl<T: SpmvScalar> SpmvEngine<T> {
    /// Create an engine for the given geometry
    pub fn new(config: SpmvConfig) -> SpmvResult<Self> {
        config.validate()?;
        Ok(Self {
            descriptors: DescriptorTable::with_capacity(config.max_blocks),
            b_banks: ResidentVector::new(config.width, config.k_bank_capacity),
            c_banks: ResultBlock::new(config.width, config.mac_groups, config.m_bank_capacity),
            config,
        })
    }

    pub fn config(&self) -> &SpmvConfig {
        &self.config
    }

    /// Compute `C += A·B` (or `C = A·B`) over a pre-blocked A
    ///
    /// Every shape check happens before the first block runs, so an error
    /// leaves `c` untouched.
    ///
    /// # Arguments
    ///
    /// * `args` - Problem size, block counts and store flags
    /// * `descriptor_words` - Raw descriptor table, two `u32` per block
    /// * `stream` - Packed A entries
    /// * `b` - Dense B of length `args.k`
    /// * `c` - Dense C of length `args.m`, read as bias and written back
    pub fn run(
        &mut self,
        args: &SpmvArgs,
        descriptor_words: &[u32],
        stream: &EntryStream<T>,
        b: &[T],
        c: &mut [T],
    ) -> SpmvResult<RunStats> {
        let start = Instant::now();
        let width = self.config.width;

        if stream.width() != width {
            return Err(SpmvError::DimensionMismatch {
                what: "stream width",
                actual: stream.width(),
                expected: width,
            });
        }
        if stream.layout() != self.config.layout {
            return Err(SpmvError::InvalidConfig(format!(
                "stream is packed {:?}, engine expects {:?}",
                stream.layout(),
                self.config.layout
            )));
        }
        if b.len() != args.k {
            return Err(SpmvError::DimensionMismatch {
                what: "B",
                actual: b.len(),
                expected: args.k,
            });
        }
        if c.len() != args.m {
            return Err(SpmvError::DimensionMismatch {
                what: "C",
                actual: c.len(),
                expected: args.m,
            });
        }

        let geometry = self.config.geometry(args.m, args.k);
        if args.k_blocks != geometry.k_blocks() {
            return Err(SpmvError::BlockSize {
                what: "k_blocks",
                actual: args.k_blocks,
                expected: geometry.k_blocks(),
            });
        }
        if args.c_blocks != geometry.c_blocks() {
            return Err(SpmvError::BlockSize {
                what: "c_blocks",
                actual: args.c_blocks,
                expected: geometry.c_blocks(),
            });
        }

        self.descriptors
            .load(descriptor_words, args.k_blocks, args.c_blocks)?;

        for k_block in 0..args.k_blocks {
            for c_block in 0..args.c_blocks {
                let desc = self.descriptors.get(k_block, c_block);
                let count = desc.nonzero_count as usize;
                if count % width != 0 {
                    return Err(SpmvError::Misaligned {
                        what: "nonzero count",
                        value: count,
                        unit: width,
                    });
                }
                let first = desc.stream_offset as usize;
                let end = first + count / width;
                if end > stream.len_words() {
                    return Err(SpmvError::StreamOutOfRange {
                        k_block,
                        c_block,
                        start: first,
                        end,
                        len: stream.len_words(),
                    });
                }
            }
        }

        if args.k_blocks == 0 {
            // No columns: A·B is zero
            if !args.accumulate {
                c.fill(T::zero());
            }
            if args.relu {
                relu_in_place(c);
            }
        }

        let mut stats = RunStats::default();
        for k_block in 0..args.k_blocks {
            let k_start = geometry.kblock_start(k_block);
            self.b_banks
                .load(&b[k_start..k_start + geometry.kblock_len(k_block)]);

            for c_block in 0..args.c_blocks {
                let desc = self.descriptors.get(k_block, c_block);
                let c_start = geometry.cblock_start(c_block);
                let c_slice = &mut c[c_start..c_start + geometry.cblock_rows(c_block)];

                if k_block == 0 && !args.accumulate {
                    self.c_banks.clear(c_slice.len());
                } else {
                    self.c_banks.load(c_slice);
                }

                let n_words = desc.nonzero_count as usize / width;
                let words = stream.words(desc.stream_offset as usize, n_words);
                let report = run_block(&self.config, &self.b_banks, &mut self.c_banks, words)?;
                debug_assert_eq!(
                    report.entries,
                    desc.nonzero_count as usize,
                    "bank counts must sum to the descriptor count"
                );

                // The clamped block is the bias of the next K-block
                self.c_banks.store(c_slice, args.relu);
                debug!(
                    k_block,
                    c_block,
                    entries = report.entries,
                    row_flushes = report.row_flushes,
                    "block stored"
                );

                stats.blocks += 1;
                stats.totals += report;
            }
        }

        info!(
            m = args.m,
            k = args.k,
            blocks = stats.blocks,
            entries = stats.totals.entries,
            elapsed_us = start.elapsed().as_micros() as u64,
            "spmv run complete"
        );
        Ok(stats)
    }
}
