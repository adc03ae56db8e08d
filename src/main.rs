use banked_spmv::{reference_spmv, BlockedMatrix, SpmvConfig, SpmvEngine, SpmvResult};
use sprs::TriMat;
use tracing_subscriber::EnvFilter;

fn main() -> SpmvResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("banked-spmv {}", banked_spmv::VERSION);

    // Small geometry so the demo spans several blocks in both dimensions
    let config = SpmvConfig::for_geometry(4, 2, 8, 4);
    println!("\nConfiguration:");
    println!("  Width: {}", config.width);
    println!("  MAC groups: {}", config.mac_groups);
    println!("  Rows per C-block: {}", config.rows_per_cblock());
    println!("  Columns per K-block: {}", config.entries_per_kblock());
    println!("  Wire layout: {:?}", config.layout);
    println!("  Host threads: {}", config.host_params.n_threads);

    // Banded 70 x 90 matrix with a few negative entries
    let (m, k) = (70, 90);
    let mut triplets = TriMat::new((m, k));
    for row in 0..m {
        for offset in 0..4 {
            let col = (row + offset * 7) % k;
            let value = if (row + offset) % 5 == 0 { -1.5 } else { 0.25 * (offset + 1) as f64 };
            triplets.add_triplet(row, col, value);
        }
    }
    let a = triplets.to_csr();
    let b: Vec<f64> = (0..k).map(|j| 1.0 + (j % 3) as f64).collect();

    let blocked = BlockedMatrix::from_csmat(&a, &config)?;
    let args = blocked.args();
    println!("\nMatrix A: {} x {}, {} nonzeros", m, k, blocked.nnz());
    println!("  K-blocks: {}, C-blocks: {}", args.k_blocks, args.c_blocks);
    println!("  Stream words: {}", blocked.stream().len_words());

    let mut engine = SpmvEngine::new(config)?;
    let mut c = vec![0.5; m];
    let stats = engine.run(&args, &blocked.descriptor_words(), blocked.stream(), &b, &mut c)?;

    let mut expected = vec![0.5; m];
    reference_spmv(&a, &b, &mut expected);
    let max_err = c
        .iter()
        .zip(&expected)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max);

    println!("\nRun statistics:");
    println!("  Blocks: {}", stats.blocks);
    println!("  Entries streamed: {}", stats.totals.entries);
    println!("  Row flushes: {}", stats.totals.row_flushes);
    println!("  Aggregator adds: {}", stats.totals.aggregator_adds);
    println!("  Max abs error vs reference: {:e}", max_err);
    println!("\nC[0..8] = {:?}", &c[..8]);

    Ok(())
}
