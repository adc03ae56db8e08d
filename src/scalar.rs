//! Element types carried through the engine

use num_traits::Float;
use std::fmt::Debug;
use std::ops::AddAssign;

/// Floating point element type of A, B and C.
///
/// Besides plain arithmetic the wire format stores 16-bit row and column
/// indices inside float-sized words, so a scalar has to carry 32 raw bits
/// through a reinterpreting cast and back.
pub trait SpmvScalar: Float + AddAssign + Default + Debug + Send + Sync + 'static {
    /// Reinterpret the low 32 bits of this value as an integer
    fn to_index_bits(self) -> u32;

    /// Build a value whose low 32 bits are `bits`
    fn from_index_bits(bits: u32) -> Self;
}

impl SpmvScalar for f32 {
    fn to_index_bits(self) -> u32 {
        self.to_bits()
    }

    fn from_index_bits(bits: u32) -> Self {
        f32::from_bits(bits)
    }
}

impl SpmvScalar for f64 {
    fn to_index_bits(self) -> u32 {
        self.to_bits() as u32
    }

    fn from_index_bits(bits: u32) -> Self {
        f64::from_bits(bits as u64)
    }
}
