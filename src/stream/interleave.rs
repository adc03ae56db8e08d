//! Row interleavers, one per row bank
//!
//! A row bank fans its products out over `mac_groups` accumulation groups.
//! Row `r` of a C-block lives at bank `r % width`, group
//! `(r / width) % mac_groups`, offset `r / (width * mac_groups)`; the
//! interleaver picks the group and rewrites the row to that offset.

use crossbeam_channel::{Receiver, Sender};
use tracing::trace;

use crate::error::SpmvResult;
use crate::scalar::SpmvScalar;
use crate::stream::queue::forward;
use crate::stream::PartialProduct;

/// Group selection and offset rewrite for one row bank
#[derive(Debug, Clone, Copy)]
pub struct RowInterleaver {
    bank: usize,
    width: usize,
    mac_groups: usize,
    active_offsets: usize,
}

impl RowInterleaver {
    /// `active_offsets` is how many offsets per lane the current C-block uses
    pub fn new(bank: usize, width: usize, mac_groups: usize, active_offsets: usize) -> Self {
        assert!(bank < width, "bank {} out of range for width {}", bank, width);
        Self {
            bank,
            width,
            mac_groups,
            active_offsets,
        }
    }

    /// Pick the group for a product and rewrite its row to the in-bank offset
    pub fn route<T: SpmvScalar>(&self, product: PartialProduct<T>) -> (usize, PartialProduct<T>) {
        let row = product.row as usize;
        assert_eq!(row % self.width, self.bank, "row {} routed to bank {}", row, self.bank);

        let group = (row / self.width) % self.mac_groups;
        let offset = row / (self.width * self.mac_groups);
        assert!(
            offset < self.active_offsets,
            "row {} maps to offset {} outside the {} active offsets of bank {}",
            row,
            offset,
            self.active_offsets,
            self.bank
        );

        (
            group,
            PartialProduct {
                value: product.value,
                row: offset as u32,
            },
        )
    }

    /// Run until the input is quiescent, one output queue per group
    pub fn run<T: SpmvScalar>(
        &self,
        input: Receiver<PartialProduct<T>>,
        outputs: Vec<Sender<PartialProduct<T>>>,
    ) -> SpmvResult<usize> {
        assert_eq!(outputs.len(), self.mac_groups, "one output per group");
        let mut routed = 0;
        for product in input.iter() {
            let (group, product) = self.route(product);
            forward(&outputs[group], product, "row interleave", self.bank)?;
            routed += 1;
        }
        trace!(bank = self.bank, routed, "row interleaver quiescent");
        Ok(routed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_group_and_offset() {
        // width 2, 3 groups: row 13 -> bank 1, group (13/2)%3 = 0, offset 13/6 = 2
        let interleaver = RowInterleaver::new(1, 2, 3, 4);
        let (group, product) = interleaver.route(PartialProduct { value: 1.5f64, row: 13 });
        assert_eq!(group, 0);
        assert_eq!(product, PartialProduct { value: 1.5, row: 2 });

        // row 9 -> group (9/2)%3 = 1, offset 1
        let (group, product) = interleaver.route(PartialProduct { value: 2.0f64, row: 9 });
        assert_eq!((group, product.row), (1, 1));
    }

    #[test]
    #[should_panic(expected = "outside the 1 active offsets")]
    fn test_row_past_partial_block_panics() {
        let interleaver = RowInterleaver::new(0, 2, 1, 1);
        interleaver.route(PartialProduct { value: 1.0f32, row: 2 });
    }
}
