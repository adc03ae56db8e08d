//! Tests for quiescence on empty input and for rejected configurations

use banked_spmv::matrix::descriptor::{descriptors_to_words, BlockDescriptor};
use banked_spmv::{
    BlockedMatrix, Entry, EntryStream, SpmvArgs, SpmvConfig, SpmvEngine, SpmvError, WireLayout,
};

fn config() -> SpmvConfig {
    // 4 rows per C-block, 4 columns per K-block
    SpmvConfig::for_geometry(2, 1, 2, 2).with_layout(WireLayout::Compact)
}

fn empty_matrix(m: usize, k: usize) -> BlockedMatrix<f64> {
    BlockedMatrix::from_triplets(m, k, &[], &[], &[], &config()).unwrap()
}

#[test]
fn test_empty_stream_terminates_without_adds() {
    let a = empty_matrix(8, 8);
    assert!(a.descriptors().iter().all(|d| d.nonzero_count == 0));
    assert!(a.stream().is_empty());

    let mut engine = SpmvEngine::new(config()).unwrap();
    let mut c = vec![1.5; 8];
    let stats = engine
        .run(&a.args(), &a.descriptor_words(), a.stream(), &[1.0; 8], &mut c)
        .unwrap();

    assert_eq!(stats.blocks, 4);
    assert_eq!(stats.totals.entries, 0);
    assert_eq!(stats.totals.aggregator_adds, 0);
    assert_eq!(c, vec![1.5; 8]);
}

#[test]
fn test_empty_stream_with_overwrite_zeroes_c() {
    let a = empty_matrix(5, 3);
    let mut engine = SpmvEngine::new(config()).unwrap();
    let mut c = vec![7.0; 5];
    engine
        .run(&a.args().overwrite(), &a.descriptor_words(), a.stream(), &[1.0; 3], &mut c)
        .unwrap();
    assert_eq!(c, vec![0.0; 5]);
}

#[test]
fn test_zero_columns() {
    let a = empty_matrix(3, 0);
    assert_eq!(a.args().k_blocks, 0);

    let mut engine = SpmvEngine::new(config()).unwrap();
    let mut c = vec![-2.0, 4.0, 1.0];
    engine
        .run(&a.args().with_relu(true), &a.descriptor_words(), a.stream(), &[], &mut c)
        .unwrap();
    assert_eq!(c, vec![0.0, 4.0, 1.0]);
}

#[test]
fn test_descriptor_overflow() {
    let a = empty_matrix(8, 8);
    let mut engine = SpmvEngine::new(config().with_max_blocks(3)).unwrap();
    let err = engine
        .run(&a.args(), &a.descriptor_words(), a.stream(), &[0.0; 8], &mut [0.0; 8])
        .unwrap_err();
    assert_eq!(err, SpmvError::DescriptorOverflow { needed: 4, capacity: 3 });
}

#[test]
fn test_block_count_mismatch() {
    let a = empty_matrix(8, 8);
    let mut engine = SpmvEngine::new(config()).unwrap();
    let mut args = a.args();
    args.c_blocks = 3;

    let err = engine
        .run(&args, &[0; 12], a.stream(), &[0.0; 8], &mut [0.0; 8])
        .unwrap_err();
    assert_eq!(err, SpmvError::BlockSize { what: "c_blocks", actual: 3, expected: 2 });
}

#[test]
fn test_misaligned_nonzero_count() {
    let stream = EntryStream::from_entries(2, WireLayout::Compact, &[Entry::new(1.0f64, 0, 0), Entry::new(1.0, 1, 1)])
        .unwrap();
    let descriptors = descriptors_to_words(&[BlockDescriptor::new(3, 0)]);
    let mut engine = SpmvEngine::new(config()).unwrap();
    let args = SpmvArgs::new(2, 2, engine.config());

    let err = engine
        .run(&args, &descriptors, &stream, &[1.0; 2], &mut [0.0; 2])
        .unwrap_err();
    assert_eq!(err, SpmvError::Misaligned { what: "nonzero count", value: 3, unit: 2 });
}

#[test]
fn test_vector_lengths_checked() {
    let a = empty_matrix(4, 4);
    let mut engine = SpmvEngine::new(config()).unwrap();

    let err = engine
        .run(&a.args(), &a.descriptor_words(), a.stream(), &[0.0; 3], &mut [0.0; 4])
        .unwrap_err();
    assert_eq!(err, SpmvError::DimensionMismatch { what: "B", actual: 3, expected: 4 });

    let err = engine
        .run(&a.args(), &a.descriptor_words(), a.stream(), &[0.0; 4], &mut [0.0; 5])
        .unwrap_err();
    assert_eq!(err, SpmvError::DimensionMismatch { what: "C", actual: 5, expected: 4 });
}

#[test]
fn test_stream_width_checked() {
    let stream = EntryStream::<f64>::from_words(4, WireLayout::Compact, vec![]).unwrap();
    let mut engine = SpmvEngine::new(config()).unwrap();
    let args = SpmvArgs::new(2, 2, engine.config());

    let err = engine.run(&args, &[0, 0], &stream, &[0.0; 2], &mut [0.0; 2]).unwrap_err();
    assert_eq!(err, SpmvError::DimensionMismatch { what: "stream width", actual: 4, expected: 2 });
}

#[test]
fn test_invalid_configs_rejected() {
    let mut zero_groups = config();
    zero_groups.mac_groups = 0;
    assert!(matches!(SpmvEngine::<f64>::new(zero_groups), Err(SpmvError::InvalidConfig(_))));

    let mut no_threads = config();
    no_threads.host_params.n_threads = 0;
    assert!(matches!(
        BlockedMatrix::<f64>::from_triplets(2, 2, &[], &[], &[], &no_threads),
        Err(SpmvError::InvalidConfig(_))
    ));

    // 2 x 65536 columns per K-block overflow the 16-bit column index
    let wide = SpmvConfig::for_geometry(2, 1, 1 << 16, 2);
    assert!(matches!(SpmvEngine::<f32>::new(wide), Err(SpmvError::InvalidConfig(_))));
}

#[test]
fn test_triplet_lengths_checked() {
    let err = BlockedMatrix::from_triplets(2, 2, &[0, 1], &[0], &[1.0f64, 2.0], &config()).unwrap_err();
    assert!(matches!(err, SpmvError::DimensionMismatch { what: "triplet arrays", .. }));
}
