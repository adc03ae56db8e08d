//! Multiply lanes, one per column bank

use crossbeam_channel::{Receiver, Sender};
use ndarray::ArrayView1;
use tracing::trace;

use crate::error::SpmvResult;
use crate::scalar::SpmvScalar;
use crate::stream::queue::forward;
use crate::stream::{Entry, PartialProduct};

/// Multiply one entry by the resident B value of its column
///
/// `b_bank` is the B bank this lane owns; the entry's column must belong to it.
/// A zero entry contributes an exact zero without reading B, so padding and
/// stored zeros stay zero next to non-finite B values.
pub fn multiply_entry<T: SpmvScalar>(
    bank: usize,
    width: usize,
    b_bank: &ArrayView1<'_, T>,
    entry: Entry<T>,
) -> PartialProduct<T> {
    let col = entry.col as usize;
    assert_eq!(col % width, bank, "column {} routed to bank {}", col, bank);
    let offset = col / width;
    assert!(
        offset < b_bank.len(),
        "column {} is past the {} resident entries of bank {}",
        col,
        b_bank.len(),
        bank
    );

    let value = if entry.value == T::zero() {
        T::zero()
    } else {
        entry.value * b_bank[offset]
    };
    PartialProduct { value, row: entry.row }
}

/// Run a multiply lane until its input is quiescent
///
/// Returns the number of products emitted.
pub fn multiply_lane<T: SpmvScalar>(
    bank: usize,
    width: usize,
    b_bank: ArrayView1<'_, T>,
    input: Receiver<Entry<T>>,
    output: Sender<PartialProduct<T>>,
) -> SpmvResult<usize> {
    let mut products = 0;
    for entry in input.iter() {
        forward(&output, multiply_entry(bank, width, &b_bank, entry), "multiply", bank)?;
        products += 1;
    }
    trace!(bank, products, "multiply lane quiescent");
    Ok(products)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_multiply_uses_column_offset() {
        // Bank 1 of width 2 holds B[1], B[3], B[5]
        let b_bank = array![10.0f64, 30.0, 50.0];
        let product = multiply_entry(1, 2, &b_bank.view(), Entry::new(2.0, 7, 5));
        assert_eq!(product, PartialProduct { value: 100.0, row: 7 });
    }

    #[test]
    fn test_zero_entry_ignores_non_finite_b() {
        let b_bank = array![f64::INFINITY, f64::NAN];
        for col in [0, 2] {
            let product = multiply_entry(0, 2, &b_bank.view(), Entry::new(0.0, 3, col));
            assert_eq!(product, PartialProduct { value: 0.0, row: 3 });
        }
        assert!(multiply_entry(0, 2, &b_bank.view(), Entry::new(1.0, 3, 0)).value.is_infinite());
    }

    #[test]
    #[should_panic(expected = "routed to bank")]
    fn test_wrong_bank_panics() {
        let b_bank = array![1.0f32, 2.0];
        multiply_entry(0, 2, &b_bank.view(), Entry::new(1.0, 0, 3));
    }

    #[test]
    fn test_lane_counts_products() {
        let b_bank = array![2.0f32, 4.0];
        let (in_tx, in_rx) = crossbeam_channel::bounded(4);
        let (out_tx, out_rx) = crossbeam_channel::bounded(4);
        in_tx.send(Entry::new(1.0, 0, 0)).unwrap();
        in_tx.send(Entry::new(3.0, 1, 1)).unwrap();
        drop(in_tx);

        let products = multiply_lane(0, 1, b_bank.view(), in_rx, out_tx).unwrap();
        assert_eq!(products, 2);
        let values: Vec<f32> = out_rx.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![2.0, 12.0]);
    }
}
