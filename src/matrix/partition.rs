//! Host-side stream builder
//!
//! Splits a sparse A into (K-block, C-block) buckets, orders each bucket by
//! row so accumulation lanes see row runs, and packs everything into one
//! wide-word stream plus its descriptor table.

use rayon::prelude::*;
use sprs::CsMat;
use tracing::debug;

use crate::driver::SpmvArgs;
use crate::error::{SpmvError, SpmvResult};
use crate::matrix::config::{BlockGeometry, SpmvConfig, WireLayout};
use crate::matrix::descriptor::{descriptors_to_words, BlockDescriptor};
use crate::scalar::SpmvScalar;
use crate::stream::codec::{encode_entries, EntryStream};
use crate::stream::Entry;
use crate::utils::exclusive_scan;

/// A sparse matrix laid out for the engine
#[derive(Debug, Clone)]
pub struct BlockedMatrix<T> {
    geometry: BlockGeometry,
    descriptors: Vec<BlockDescriptor>,
    stream: EntryStream<T>,
    nnz: usize,
}

impl<T: SpmvScalar> BlockedMatrix<T> {
    /// Build from coordinate triplets
    ///
    /// Duplicate coordinates are kept; the engine sums them.
    ///
    /// # Arguments
    ///
    /// * `m` - Rows of A
    /// * `k` - Columns of A
    /// * `rows`, `cols`, `vals` - Triplets, all the same length
    /// * `config` - Engine geometry the stream is laid out for
    pub fn from_triplets(
        m: usize,
        k: usize,
        rows: &[usize],
        cols: &[usize],
        vals: &[T],
        config: &SpmvConfig,
    ) -> SpmvResult<Self> {
        config.validate()?;
        if cols.len() != rows.len() || vals.len() != rows.len() {
            return Err(SpmvError::DimensionMismatch {
                what: "triplet arrays",
                actual: cols.len().min(vals.len()),
                expected: rows.len(),
            });
        }

        let geometry = config.geometry(m, k);
        let (k_blocks, c_blocks) = (geometry.k_blocks(), geometry.c_blocks());
        let n_buckets = k_blocks * c_blocks;
        if n_buckets > config.max_blocks {
            return Err(SpmvError::DescriptorOverflow {
                needed: n_buckets,
                capacity: config.max_blocks,
            });
        }

        let mut buckets: Vec<Vec<Entry<T>>> = vec![Vec::new(); n_buckets];
        for ((&row, &col), &value) in rows.iter().zip(cols).zip(vals) {
            if row >= m || col >= k {
                return Err(SpmvError::EntryOutOfBounds { row, col, m, k });
            }
            let k_block = col / geometry.entries_per_kblock;
            let c_block = row / geometry.rows_per_cblock;
            let local_row = row - geometry.cblock_start(c_block);
            let local_col = col - geometry.kblock_start(k_block);
            buckets[k_block * c_blocks + c_block].push(Entry::new(
                value,
                local_row as u32,
                local_col as u32,
            ));
        }

        let width = config.width;
        let layout = config.layout;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.host_params.n_threads)
            .build()
            .map_err(|e| SpmvError::ThreadPool(e.to_string()))?;

        let packed: Vec<Vec<T>> = pool.install(|| {
            buckets
                .par_iter_mut()
                .map(|bucket| {
                    sort_and_pad(bucket, width);
                    encode_entries(layout, width, bucket)
                })
                .collect()
        });

        let counts: Vec<usize> = buckets.iter().map(Vec::len).collect();
        let word_counts: Vec<usize> = counts.iter().map(|&n| n / width).collect();
        let offsets = exclusive_scan(&word_counts);

        let descriptors = counts
            .iter()
            .zip(&offsets)
            .map(|(&count, &offset)| {
                Ok(BlockDescriptor::new(to_u32("nonzero count", count)?, to_u32("stream offset", offset)?))
            })
            .collect::<SpmvResult<Vec<_>>>()?;

        let stream = EntryStream::from_words(width, layout, packed.concat())?;

        debug!(
            m,
            k,
            nnz = rows.len(),
            padded = counts.iter().sum::<usize>(),
            k_blocks,
            c_blocks,
            "built blocked entry stream"
        );

        Ok(Self {
            geometry,
            descriptors,
            stream,
            nnz: rows.len(),
        })
    }

    /// Build from an `sprs` matrix in either storage order
    pub fn from_csmat(a: &CsMat<T>, config: &SpmvConfig) -> SpmvResult<Self> {
        let nnz = a.nnz();
        let mut rows = Vec::with_capacity(nnz);
        let mut cols = Vec::with_capacity(nnz);
        let mut vals = Vec::with_capacity(nnz);
        for (&value, (row, col)) in a.iter() {
            rows.push(row);
            cols.push(col);
            vals.push(value);
        }
        Self::from_triplets(a.rows(), a.cols(), &rows, &cols, &vals, config)
    }

    /// Arguments for one engine run over this matrix
    pub fn args(&self) -> SpmvArgs {
        SpmvArgs {
            m: self.geometry.m,
            k: self.geometry.k,
            k_blocks: self.geometry.k_blocks(),
            c_blocks: self.geometry.c_blocks(),
            relu: false,
            accumulate: true,
        }
    }

    /// Descriptor table as the raw word image the engine loads
    pub fn descriptor_words(&self) -> Vec<u32> {
        descriptors_to_words(&self.descriptors)
    }

    pub fn descriptors(&self) -> &[BlockDescriptor] {
        &self.descriptors
    }

    pub fn stream(&self) -> &EntryStream<T> {
        &self.stream
    }

    pub fn layout(&self) -> WireLayout {
        self.stream.layout()
    }

    pub fn geometry(&self) -> BlockGeometry {
        self.geometry
    }

    pub fn m(&self) -> usize {
        self.geometry.m
    }

    pub fn k(&self) -> usize {
        self.geometry.k
    }

    /// Nonzeros supplied, padding excluded
    pub fn nnz(&self) -> usize {
        self.nnz
    }
}

/// Order a bucket by (row, col) and pad it to whole wide words
///
/// Padding repeats the last row with a zero value, so it extends the final
/// run instead of opening a new one. The multiply lane turns zero entries
/// into zero products whatever B holds at column 0.
fn sort_and_pad<T: SpmvScalar>(bucket: &mut Vec<Entry<T>>, width: usize) {
    bucket.sort_by_key(|e| (e.row, e.col));
    if let Some(last) = bucket.last().copied() {
        let padded = bucket.len().div_ceil(width) * width;
        bucket.resize(padded, Entry::new(T::zero(), last.row, 0));
    }
}

fn to_u32(what: &'static str, value: usize) -> SpmvResult<u32> {
    u32::try_from(value).map_err(|_| SpmvError::InvalidConfig(format!("{} {} exceeds 32 bits", what, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SpmvConfig {
        // 2 banks x 1 group x 2 offsets = 4 rows per C-block, 2 x 2 = 4 columns per K-block
        let mut config = SpmvConfig::for_geometry(2, 1, 2, 2).with_layout(WireLayout::Compact);
        config.host_params.n_threads = 2;
        config
    }

    #[test]
    fn test_buckets_and_offsets() {
        // 6x6: C-blocks of 4 rows, K-blocks of 4 columns -> 2 x 2 buckets
        let rows = [0, 5, 1, 4, 4];
        let cols = [0, 0, 5, 4, 5];
        let vals = [1.0f64, 2.0, 3.0, 4.0, 5.0];
        let a = BlockedMatrix::from_triplets(6, 6, &rows, &cols, &vals, &config()).unwrap();

        assert_eq!(a.args().k_blocks, 2);
        assert_eq!(a.args().c_blocks, 2);
        assert_eq!(a.nnz(), 5);

        // (kb0, cb0): 1 entry -> padded to 2; (kb0, cb1): 1 -> 2;
        // (kb1, cb0): 1 -> 2; (kb1, cb1): 2 entries
        let counts: Vec<u32> = a.descriptors().iter().map(|d| d.nonzero_count).collect();
        let offsets: Vec<u32> = a.descriptors().iter().map(|d| d.stream_offset).collect();
        assert_eq!(counts, vec![2, 2, 2, 2]);
        assert_eq!(offsets, vec![0, 1, 2, 3]);
        assert_eq!(a.stream().len_words(), 4);

        // Bucket (kb1, cb1) holds rows 4,4 -> local row 0, cols 4,5 -> local 0,1
        let last: Vec<_> = a.stream().decode(3, 1).collect();
        assert_eq!(last, vec![Entry::new(4.0, 0, 0), Entry::new(5.0, 0, 1)]);
    }

    #[test]
    fn test_padding_repeats_last_row() {
        let mut bucket = vec![Entry::new(1.0f32, 3, 1), Entry::new(2.0, 1, 0), Entry::new(3.0, 3, 0)];
        sort_and_pad(&mut bucket, 2);
        assert_eq!(
            bucket,
            vec![
                Entry::new(2.0, 1, 0),
                Entry::new(3.0, 3, 0),
                Entry::new(1.0, 3, 1),
                Entry::new(0.0, 3, 0),
            ]
        );
    }

    #[test]
    fn test_out_of_bounds_entry_rejected() {
        let err = BlockedMatrix::from_triplets(2, 2, &[2], &[0], &[1.0f32], &config()).unwrap_err();
        assert_eq!(err, SpmvError::EntryOutOfBounds { row: 2, col: 0, m: 2, k: 2 });
    }

    #[test]
    fn test_too_many_blocks_rejected() {
        let config = config().with_max_blocks(3);
        let err = BlockedMatrix::<f64>::from_triplets(8, 8, &[], &[], &[], &config).unwrap_err();
        assert_eq!(err, SpmvError::DescriptorOverflow { needed: 4, capacity: 3 });
    }
}
