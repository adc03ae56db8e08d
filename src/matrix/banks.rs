//! Banked resident storage for B and C
//!
//! B is split over `width` banks: column `j` lives in bank `j % width` at
//! offset `j / width`. C is split over `width * mac_groups` banks: row `r` of
//! a C-block lives in bank `r % width`, group `(r / width) % mac_groups`, at
//! offset `r / (width * mac_groups)`. Both are stored as one `Array2` with a
//! row per bank so that lanes can borrow disjoint rows.

use ndarray::{s, Array2, ArrayView1, ArrayViewMut1};

use crate::scalar::SpmvScalar;

/// The B block currently loaded for the K-block being processed
#[derive(Debug, Clone)]
pub struct ResidentVector<T> {
    banks: Array2<T>,
    len: usize,
}

impl<T: SpmvScalar> ResidentVector<T> {
    pub fn new(width: usize, bank_capacity: usize) -> Self {
        Self {
            banks: Array2::zeros((width, bank_capacity)),
            len: 0,
        }
    }

    /// Overwrite the banks with one K-block of B
    ///
    /// A short final block leaves the tail of each bank zeroed.
    pub fn load(&mut self, values: &[T]) {
        let width = self.width();
        assert!(
            values.len() <= self.banks.len(),
            "K-block of {} entries exceeds {} banks x {}",
            values.len(),
            width,
            self.banks.ncols()
        );
        self.banks.fill(T::zero());
        for (j, &value) in values.iter().enumerate() {
            self.banks[[j % width, j / width]] = value;
        }
        self.len = values.len();
    }

    /// Read-only view of one bank, shared by its multiply lane
    pub fn bank(&self, bank: usize) -> ArrayView1<'_, T> {
        self.banks.row(bank)
    }

    /// Value of block-local column `col`
    pub fn get(&self, col: usize) -> T {
        let width = self.width();
        self.banks[[col % width, col / width]]
    }

    pub fn width(&self) -> usize {
        self.banks.nrows()
    }

    /// Entries of the currently loaded block
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The C block currently being accumulated
#[derive(Debug, Clone)]
pub struct ResultBlock<T> {
    /// One row per (bank, group) lane, lane index `bank * mac_groups + group`
    banks: Array2<T>,
    width: usize,
    mac_groups: usize,
    rows: usize,
    active_offsets: usize,
}

impl<T: SpmvScalar> ResultBlock<T> {
    pub fn new(width: usize, mac_groups: usize, bank_capacity: usize) -> Self {
        Self {
            banks: Array2::zeros((width * mac_groups, bank_capacity)),
            width,
            mac_groups,
            rows: 0,
            active_offsets: 0,
        }
    }

    /// `(bank, group, offset)` of block-local row `row`
    pub fn locate(&self, row: usize) -> (usize, usize, usize) {
        (
            row % self.width,
            (row / self.width) % self.mac_groups,
            row / (self.width * self.mac_groups),
        )
    }

    fn resize(&mut self, rows: usize) {
        let lanes = self.width * self.mac_groups;
        let offsets = rows.div_ceil(lanes);
        assert!(
            offsets <= self.banks.ncols(),
            "C-block of {} rows needs {} offsets per lane, banks hold {}",
            rows,
            offsets,
            self.banks.ncols()
        );
        self.banks.fill(T::zero());
        self.rows = rows;
        self.active_offsets = offsets;
    }

    /// Load existing C values as the starting sums of this block
    pub fn load(&mut self, bias: &[T]) {
        self.resize(bias.len());
        for (row, &value) in bias.iter().enumerate() {
            let (bank, group, offset) = self.locate(row);
            self.banks[[bank * self.mac_groups + group, offset]] = value;
        }
    }

    /// Start a block of `rows` rows from zero
    pub fn clear(&mut self, rows: usize) {
        self.resize(rows);
    }

    /// Write the block back, clamping negatives to zero when `relu` is set
    ///
    /// Padding rows of a partial block are never written.
    pub fn store(&self, out: &mut [T], relu: bool) {
        assert_eq!(out.len(), self.rows, "store target does not match block rows");
        for (row, slot) in out.iter_mut().enumerate() {
            let value = self.get_row(row);
            *slot = if relu && value < T::zero() { T::zero() } else { value };
        }
    }

    /// Value at a (bank, group, offset) address
    pub fn get(&self, bank: usize, group: usize, offset: usize) -> T {
        self.banks[[bank * self.mac_groups + group, offset]]
    }

    /// Value of block-local row `row`
    pub fn get_row(&self, row: usize) -> T {
        let (bank, group, offset) = self.locate(row);
        self.get(bank, group, offset)
    }

    /// Rows of the current block
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Offsets per lane the current block occupies
    pub fn active_offsets(&self) -> usize {
        self.active_offsets
    }

    /// Disjoint mutable views, one per (bank, group) lane
    ///
    /// Views are indexed `bank * mac_groups + group` and cut to the active
    /// offsets, so an aggregator cannot reach past the current block.
    pub fn lanes_mut(&mut self) -> Vec<ArrayViewMut1<'_, T>> {
        let offsets = self.active_offsets;
        self.banks
            .outer_iter_mut()
            .map(|lane| lane.slice_move(s![..offsets]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resident_vector_banking() {
        let mut b = ResidentVector::new(3, 4);
        let values: Vec<f64> = (0..10).map(|i| i as f64).collect();
        b.load(&values);

        assert_eq!(b.len(), 10);
        assert_eq!(b.bank(1).to_vec(), vec![1.0, 4.0, 7.0, 0.0]);
        for j in 0..10 {
            assert_eq!(b.get(j), j as f64);
        }

        // A shorter reload clears the previous block's tail
        b.load(&values[..2]);
        assert_eq!(b.bank(1).to_vec(), vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_result_block_layout() {
        let mut c = ResultBlock::new(2, 2, 3);
        let bias: Vec<f32> = (0..10).map(|i| i as f32).collect();
        c.load(&bias);

        assert_eq!(c.active_offsets(), 3);
        // row 6 -> bank 0, group 1, offset 1
        assert_eq!(c.locate(6), (0, 1, 1));
        assert_eq!(c.get(0, 1, 1), 6.0);
        assert_eq!(c.get(1, 0, 2), 9.0);

        let mut out = vec![0.0f32; 10];
        c.store(&mut out, false);
        assert_eq!(out, bias);
    }

    #[test]
    fn test_lanes_are_cut_to_partial_block() {
        let mut c = ResultBlock::<f64>::new(2, 1, 4);
        c.clear(3);
        let lanes = c.lanes_mut();
        assert_eq!(lanes.len(), 2);
        assert!(lanes.iter().all(|lane| lane.len() == 2));
    }

    #[test]
    fn test_store_clamps_only_negatives() {
        let mut c = ResultBlock::new(2, 1, 2);
        c.load(&[-1.5f64, 2.0, 0.0, -0.25]);
        let mut out = vec![9.0; 4];
        c.store(&mut out, true);
        assert_eq!(out, vec![0.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    #[should_panic(expected = "needs 3 offsets per lane")]
    fn test_oversized_block_panics() {
        let mut c = ResultBlock::<f32>::new(2, 1, 2);
        c.clear(5);
    }
}
