//! # banked-spmv: blocked streaming sparse matrix-vector multiply
//!
//! Computes `C += A·B` for a sparse `A` and dense `B` and `C`, the way a
//! banked accelerator does it: `B` and `C` sit in banked resident memories,
//! `A` arrives as a packed stream of `(value, row, col)` entries, and a
//! network of concurrent lanes routes every entry to the bank holding its
//! `B` value and every product to the bank holding its `C` row.
//!
//! ## Pipeline
//!
//! 1. **Decode**: unpack `width` entries per wide word
//! 2. **Column router**: split/merge by `col % width`
//! 3. **Multiply**: one lane per `B` bank
//! 4. **Row router**: split/merge by `row % width`
//! 5. **Row interleave**: fan out over `mac_groups` accumulation groups
//! 6. **Row accumulate**: run-length sums per row
//! 7. **Aggregate**: add sums into the owning `C` bank
//!
//! The **block driver** feeds the pipeline one (K-block, C-block) pair at a
//! time, carrying partial `C` sums from one K-block into the next.
//!
//! ## Usage
//!
//! ```
//! use banked_spmv::{blocked_spmv, dense_to_csmat, SpmvConfig};
//! use ndarray::array;
//!
//! let a = dense_to_csmat(&array![[1.0f64, 0.0], [0.0, 2.0]]);
//! let mut c = vec![0.0; 2];
//!
//! let config = SpmvConfig::for_geometry(2, 1, 8, 8);
//! blocked_spmv(&a, &[3.0, 4.0], &mut c, false, &config).unwrap();
//! assert_eq!(c, vec![3.0, 8.0]);
//! ```
//!
//! For explicit control over the stream and descriptors, build a
//! [`BlockedMatrix`] and drive an [`SpmvEngine`] directly.

pub mod driver;
pub mod error;
pub mod matrix;
pub mod pipeline;
pub mod scalar;
pub mod stream;
pub mod utils;

use sprs::CsMat;

// Re-export primary components
pub use driver::{RunStats, SpmvArgs, SpmvEngine};
pub use error::{SpmvError, SpmvResult};
pub use matrix::config::{BlockGeometry, HostParameters, SpmvConfig, WireLayout};
pub use matrix::{
    dense_reference, dense_to_csmat, reference_spmv, BlockDescriptor, BlockedMatrix, DescriptorTable,
};
pub use pipeline::BlockReport;
pub use scalar::SpmvScalar;
pub use stream::codec::EntryStream;
pub use stream::Entry;

/// Computes `C += A·B` with the blocked streaming engine
///
/// This is the main entry point for the library. It lays `A` out for the
/// configured geometry and runs every block.
///
/// # Arguments
///
/// * `a` - Sparse matrix, `m x k`
/// * `b` - Dense vector of length `k`
/// * `c` - Dense vector of length `m`, accumulated in place
/// * `relu` - Clamp negative results to zero
/// * `config` - Bank geometry
pub fn blocked_spmv<T: SpmvScalar>(
    a: &CsMat<T>,
    b: &[T],
    c: &mut [T],
    relu: bool,
    config: &SpmvConfig,
) -> SpmvResult<RunStats> {
    let blocked = BlockedMatrix::from_csmat(a, config)?;
    let mut engine = SpmvEngine::new(config.clone())?;
    let args = blocked.args().with_relu(relu);
    engine.run(&args, &blocked.descriptor_words(), blocked.stream(), b, c)
}

/// Version information for the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
