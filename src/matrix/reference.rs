//! Reference implementations of C += A·B
//!
//! These provide a baseline for correctness testing and benchmark comparison.
//! They run on the host in one thread with no blocking.

use ndarray::{Array1, Array2, LinalgScalar};
use sprs::{CsMat, TriMat};

use crate::scalar::SpmvScalar;

/// Sparse reference: `c[i] += sum_j a[i][j] * b[j]`
///
/// # Arguments
///
/// * `a` - Sparse matrix in either storage order
/// * `b` - Dense vector of length `a.cols()`
/// * `c` - Dense vector of length `a.rows()`, updated in place
pub fn reference_spmv<T: SpmvScalar>(a: &CsMat<T>, b: &[T], c: &mut [T]) {
    assert_eq!(a.cols(), b.len(), "B length must match the columns of A");
    assert_eq!(a.rows(), c.len(), "C length must match the rows of A");

    for (&value, (row, col)) in a.iter() {
        c[row] += value * b[col];
    }
}

/// Dense reference `c + a.dot(b)` via ndarray
pub fn dense_reference<T>(a: &Array2<T>, b: &Array1<T>, c: &Array1<T>) -> Array1<T>
where
    T: LinalgScalar,
{
    c + &a.dot(b)
}

/// Convert a dense matrix to CSR, dropping exact zeros
pub fn dense_to_csmat<T: SpmvScalar>(a: &Array2<T>) -> CsMat<T> {
    let mut triplets = TriMat::new(a.dim());
    for ((row, col), &value) in a.indexed_iter() {
        if value != T::zero() {
            triplets.add_triplet(row, col, value);
        }
    }
    triplets.to_csr()
}

/// Apply the activation clamp used on the final store
pub fn relu_in_place<T: SpmvScalar>(c: &mut [T]) {
    for value in c.iter_mut() {
        if *value < T::zero() {
            *value = T::zero();
        }
    }
}
