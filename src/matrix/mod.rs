// Matrix layout: configuration, banked storage, descriptors and the host-side stream builder

pub mod banks;
pub mod config;
pub mod descriptor;
pub mod partition;
pub mod reference;

pub use banks::{ResidentVector, ResultBlock};
pub use config::{BlockGeometry, HostParameters, SpmvConfig, WireLayout};
pub use descriptor::{descriptors_to_words, BlockDescriptor, DescriptorTable};
pub use partition::BlockedMatrix;
pub use reference::{dense_reference, dense_to_csmat, reference_spmv, relu_in_place};
