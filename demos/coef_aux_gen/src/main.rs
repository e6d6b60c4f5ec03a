use anyhow::{Context, Result};
use clap::Parser;
use polyreg_core::coef_aux_path;
use polyreg_hpc::CoefAuxTable;
use polyreg_math::{Dimension, D1, D2, D3, MAX_EDGE};
use std::path::Path;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Output directory
    #[arg(long, env = "POLYREG_COEF_AUX_DIR", default_value = ".")]
    out_dir: std::path::PathBuf,

    /// Largest block edge to generate records for
    #[arg(long, default_value_t = MAX_EDGE)]
    max_edge: usize,

    /// Only generate this dimensionality (1, 2 or 3)
    #[arg(long)]
    dims: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    if args.max_edge == 0 || args.max_edge > MAX_EDGE {
        anyhow::bail!("--max-edge must be in 1..={}", MAX_EDGE);
    }
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create {}", args.out_dir.display()))?;

    match args.dims {
        Some(1) => generate::<D1>(&args.out_dir, args.max_edge)?,
        Some(2) => generate::<D2>(&args.out_dir, args.max_edge)?,
        Some(3) => generate::<D3>(&args.out_dir, args.max_edge)?,
        Some(n) => anyhow::bail!("unsupported dimensionality {}", n),
        None => {
            generate::<D1>(&args.out_dir, args.max_edge)?;
            generate::<D2>(&args.out_dir, args.max_edge)?;
            generate::<D3>(&args.out_dir, args.max_edge)?;
        }
    }
    Ok(())
}

fn generate<D: Dimension>(dir: &Path, max_edge: usize) -> Result<()> {
    let start = Instant::now();
    let table = CoefAuxTable::<D>::generate(max_edge)
        .with_context(|| format!("solve {}D shapes", D::N))?;
    let path = coef_aux_path::<D>(dir);
    table
        .write_file(&path)
        .with_context(|| format!("write {}", path.display()))?;
    println!(
        "✓ {}D: {} records → {} ({:.2?})",
        D::N,
        table.record_count(),
        path.display(),
        start.elapsed()
    );
    Ok(())
}
