//! Wide-word packing of A entries
//!
//! A wide word holds `width` entries back to back. Each entry occupies
//! `layout.words_per_entry()` float-sized slots:
//!
//! ```text
//! Compact: | value | bits(row << 16 | col) |
//! Padded:  | value | 0 | bits(col) | bits(row) |
//! ```
//!
//! Indices are block-local and limited to 16 bits.

use aligned_vec::AVec;
use crossbeam_channel::Sender;
use tracing::trace;

use crate::error::{SpmvError, SpmvResult};
use crate::matrix::config::WireLayout;
use crate::scalar::SpmvScalar;
use crate::stream::queue::forward;
use crate::stream::Entry;

/// Bits of a row or column index on the wire
pub const INDEX_BITS: u32 = 16;

/// Mask selecting one wire index
pub const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// Number of distinct block-local indices
pub const MAX_INDEX: usize = 1 << INDEX_BITS;

/// Alignment of the packed stream in bytes
pub const STREAM_ALIGN: usize = 64;

/// Write one entry into its `words_per_entry` slots
pub fn encode_entry<T: SpmvScalar>(layout: WireLayout, entry: &Entry<T>, slot: &mut [T]) {
    assert_eq!(slot.len(), layout.words_per_entry(), "slot size does not match layout");
    assert!(
        entry.row <= INDEX_MASK && entry.col <= INDEX_MASK,
        "entry ({}, {}) does not fit 16-bit indices",
        entry.row,
        entry.col
    );

    slot[0] = entry.value;
    match layout {
        WireLayout::Compact => {
            slot[1] = T::from_index_bits((entry.row << INDEX_BITS) | entry.col);
        }
        WireLayout::Padded => {
            slot[1] = T::zero();
            slot[2] = T::from_index_bits(entry.col);
            slot[3] = T::from_index_bits(entry.row);
        }
    }
}

/// Read one entry back from its slots
pub fn decode_entry<T: SpmvScalar>(layout: WireLayout, slot: &[T]) -> Entry<T> {
    match layout {
        WireLayout::Compact => {
            let row_col = slot[1].to_index_bits();
            Entry::new(slot[0], row_col >> INDEX_BITS, row_col & INDEX_MASK)
        }
        WireLayout::Padded => {
            let col = slot[2].to_index_bits() & INDEX_MASK;
            let row = slot[3].to_index_bits() & INDEX_MASK;
            Entry::new(slot[0], row, col)
        }
    }
}

/// Pack entries into wide words, `width` entries per word
pub fn encode_entries<T: SpmvScalar>(layout: WireLayout, width: usize, entries: &[Entry<T>]) -> Vec<T> {
    assert_eq!(
        entries.len() % width,
        0,
        "{} entries do not fill whole words of {}",
        entries.len(),
        width
    );
    let per_entry = layout.words_per_entry();
    let mut words = vec![T::zero(); entries.len() * per_entry];
    for (entry, slot) in entries.iter().zip(words.chunks_exact_mut(per_entry)) {
        encode_entry(layout, entry, slot);
    }
    words
}

/// Lazy decoder over a run of wide words
///
/// Yields `width * n_words` entries in arrival order. The entry at position
/// `i` came from source lane `i % width` of its word.
pub struct EntryDecoder<'a, T> {
    words: &'a [T],
    layout: WireLayout,
    pos: usize,
}

impl<'a, T: SpmvScalar> EntryDecoder<'a, T> {
    /// Decode a flat slice of whole wide words
    pub fn new(words: &'a [T], layout: WireLayout) -> Self {
        assert_eq!(
            words.len() % layout.words_per_entry(),
            0,
            "word slice ends inside an entry"
        );
        Self { words, layout, pos: 0 }
    }
}

impl<'a, T: SpmvScalar> Iterator for EntryDecoder<'a, T> {
    type Item = Entry<T>;

    fn next(&mut self) -> Option<Entry<T>> {
        let per_entry = self.layout.words_per_entry();
        let start = self.pos * per_entry;
        if start >= self.words.len() {
            return None;
        }
        self.pos += 1;
        Some(decode_entry(self.layout, &self.words[start..start + per_entry]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.words.len() / self.layout.words_per_entry() - self.pos;
        (remaining, Some(remaining))
    }
}

impl<'a, T: SpmvScalar> ExactSizeIterator for EntryDecoder<'a, T> {}

/// Decoder lane: unpack wide words and deal entries to the source lanes
///
/// Slot `i` of every word goes to `outputs[i]`, so each source lane sees its
/// entries in stream order. Returns the number of entries decoded.
pub fn decoder_lane<T: SpmvScalar>(
    words: &[T],
    layout: WireLayout,
    outputs: Vec<Sender<Entry<T>>>,
) -> SpmvResult<usize> {
    let width = outputs.len();
    let mut decoded = 0;
    for (i, entry) in EntryDecoder::new(words, layout).enumerate() {
        forward(&outputs[i % width], entry, "decode", i % width)?;
        decoded += 1;
    }
    trace!(decoded, "decoder quiescent");
    Ok(decoded)
}

/// The packed A operand as it sits in device memory
#[derive(Debug, Clone)]
pub struct EntryStream<T> {
    words: AVec<T>,
    width: usize,
    layout: WireLayout,
}

impl<T: SpmvScalar> EntryStream<T> {
    /// Wrap already packed floats
    ///
    /// The float count must be a whole number of wide words.
    pub fn from_words(width: usize, layout: WireLayout, words: Vec<T>) -> SpmvResult<Self> {
        let word_len = width * layout.words_per_entry();
        if word_len == 0 || words.len() % word_len != 0 {
            return Err(SpmvError::Misaligned {
                what: "stream length",
                value: words.len(),
                unit: word_len,
            });
        }
        Ok(Self {
            words: AVec::from_iter(STREAM_ALIGN, words),
            width,
            layout,
        })
    }

    /// Pack entries into a new stream
    pub fn from_entries(width: usize, layout: WireLayout, entries: &[Entry<T>]) -> SpmvResult<Self> {
        if width == 0 || entries.len() % width != 0 {
            return Err(SpmvError::Misaligned {
                what: "entry count",
                value: entries.len(),
                unit: width,
            });
        }
        Self::from_words(width, layout, encode_entries(layout, width, entries))
    }

    /// Entries per wide word
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn layout(&self) -> WireLayout {
        self.layout
    }

    /// Floats per wide word
    pub fn word_len(&self) -> usize {
        self.width * self.layout.words_per_entry()
    }

    /// Number of wide words
    pub fn len_words(&self) -> usize {
        self.words.len() / self.word_len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Flat floats of `n_words` wide words starting at word `start`
    pub fn words(&self, start: usize, n_words: usize) -> &[T] {
        let word_len = self.word_len();
        &self.words[start * word_len..(start + n_words) * word_len]
    }

    /// Decode `n_words` wide words starting at word `start`
    pub fn decode(&self, start: usize, n_words: usize) -> EntryDecoder<'_, T> {
        EntryDecoder::new(self.words(start, n_words), self.layout)
    }

    /// The whole stream as flat floats
    pub fn as_slice(&self) -> &[T] {
        &self.words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_packs_row_high_col_low() {
        let mut slot = [0.0f32; 2];
        encode_entry(WireLayout::Compact, &Entry::new(1.5f32, 0x0002, 0x0003), &mut slot);
        assert_eq!(slot[0], 1.5);
        assert_eq!(slot[1].to_bits(), 0x0002_0003);
    }

    #[test]
    fn test_padded_masks_high_bits() {
        // Only the low 16 bits of the index words are meaningful
        let slot = [2.0f32, 0.0, f32::from_bits(0xDEAD_0007), f32::from_bits(0xBEEF_0009)];
        let entry = decode_entry(WireLayout::Padded, &slot);
        assert_eq!(entry, Entry::new(2.0, 9, 7));
    }

    #[test]
    fn test_decoder_yields_arrival_order() {
        let entries: Vec<Entry<f64>> = (0..6)
            .map(|i| Entry::new(i as f64, i as u32 * 3, 100 + i as u32))
            .collect();
        let stream = EntryStream::from_entries(2, WireLayout::Compact, &entries).unwrap();

        assert_eq!(stream.len_words(), 3);
        let decoded: Vec<_> = stream.decode(0, 3).collect();
        assert_eq!(decoded, entries);

        let tail: Vec<_> = stream.decode(2, 1).collect();
        assert_eq!(tail, entries[4..].to_vec());
    }

    #[test]
    fn test_misaligned_entry_count_rejected() {
        let entries = vec![Entry::new(1.0f32, 0, 0); 3];
        let err = EntryStream::from_entries(2, WireLayout::Compact, &entries).unwrap_err();
        assert_eq!(
            err,
            SpmvError::Misaligned { what: "entry count", value: 3, unit: 2 }
        );
    }

    #[test]
    fn test_decoder_lane_deals_slots_to_sources() {
        let entries: Vec<Entry<f32>> = (0..4).map(|i| Entry::new(i as f32, i, 0)).collect();
        let words = encode_entries(WireLayout::Padded, 2, &entries);
        let (tx, rx) = crate::stream::queue::lane_queues(2, 4);

        assert_eq!(decoder_lane(&words, WireLayout::Padded, tx).unwrap(), 4);
        let lane1: Vec<u32> = rx[1].iter().map(|e| e.row).collect();
        assert_eq!(lane1, vec![1, 3]);
    }

    #[test]
    #[should_panic(expected = "does not fit 16-bit indices")]
    fn test_wide_index_panics() {
        let mut slot = [0.0f32; 2];
        encode_entry(WireLayout::Compact, &Entry::new(1.0f32, 1 << 16, 0), &mut slot);
    }
}
