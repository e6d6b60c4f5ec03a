use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use clap::Parser;
use polyreg_core::Grid;
use polyreg_hpc::compressor::read_header;
use polyreg_hpc::{BlockwiseCompressor, CoefAuxTable};
use polyreg_math::{Dimension, D1, D2, D3};
use rand::Rng;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Raw little-endian f32 field (optional). If omitted, generates synthetic data.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Field dimensions, slowest axis first (1 to 3 values)
    #[arg(long, value_delimiter = ',', default_value = "64,64,64")]
    dims: Vec<usize>,

    /// Output compressed file
    #[arg(long, default_value = "compressed.prg")]
    output: PathBuf,

    /// Decompress `output` instead of compressing
    #[arg(long)]
    decompress: bool,

    /// Where to write the decompressed field as raw f32
    #[arg(long)]
    restored: Option<PathBuf>,

    /// Absolute error bound
    #[arg(long, default_value_t = 1e-3)]
    error_bound: f64,

    /// Block edge length (at most 17)
    #[arg(long, default_value_t = 6)]
    block_size: usize,

    /// Directory with PolyRegressionCoefAux{N}D.f32. Tables are generated in
    /// memory when not given.
    #[arg(long, env = "POLYREG_COEF_AUX_DIR")]
    coef_aux_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    if args.decompress {
        let bytes = std::fs::read(&args.output)
            .with_context(|| format!("read {}", args.output.display()))?;
        let header = read_header(&mut bytes.as_slice()).context("parse header")?;
        let values = match header.dims.len() {
            1 => decompress::<D1>(&args, &bytes, header.block_size)?,
            2 => decompress::<D2>(&args, &bytes, header.block_size)?,
            3 => decompress::<D3>(&args, &bytes, header.block_size)?,
            n => bail!("unsupported dimensionality {}", n),
        };
        println!("Decompressed {} values", values.len());
        if let Some(path) = args.restored.as_ref() {
            write_raw(path, &values)?;
            println!("✓ Wrote {}", path.display());
        }
        return Ok(());
    }

    match args.dims.len() {
        1 => compress::<D1>(&args),
        2 => compress::<D2>(&args),
        3 => compress::<D3>(&args),
        n => bail!("--dims takes 1 to 3 values, got {}", n),
    }
}

fn load_table<D: Dimension>(args: &Args, block_size: usize) -> Result<Arc<CoefAuxTable<D>>> {
    let table = match args.coef_aux_dir.as_ref() {
        Some(dir) => CoefAuxTable::<D>::load_from_dir(dir)
            .with_context(|| format!("load coefficient table from {}", dir.display()))?,
        None => {
            info!(dims = D::N, block_size, "Generating coefficient table in memory");
            CoefAuxTable::<D>::generate(block_size).context("generate coefficient table")?
        }
    };
    Ok(Arc::new(table))
}

fn compress<D: Dimension>(args: &Args) -> Result<()> {
    let mut dims = D::Coord::default();
    dims.as_mut().copy_from_slice(&args.dims);
    let len: usize = args.dims.iter().product();

    let data = if let Some(path) = args.input.as_ref() {
        println!("Reading raw field: {}", path.display());
        read_raw(path, len)?
    } else {
        generate_synthetic::<D>(&dims)
    };
    let grid = Grid::<f32, D>::from_vec(dims, data).context("build grid")?;

    let table = load_table::<D>(args, args.block_size)?;
    let compressor = BlockwiseCompressor::new(table, args.block_size, args.error_bound);
    println!(
        "Codec: PolyRegression {}D, block {} (ε = {:.3e})",
        D::N,
        args.block_size,
        args.error_bound
    );
    let (bytes, stats) = compressor
        .compress_with_stats(&grid)
        .context("compress")?;
    std::fs::write(&args.output, &bytes)
        .with_context(|| format!("write {}", args.output.display()))?;

    // Verify the bound on the way out.
    let restored: Grid<f32, D> = compressor.decompress(&bytes).context("verify")?;
    let max_abs_err = grid
        .data()
        .iter()
        .zip(restored.data())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f32, f32::max);

    println!(
        "DONE  blocks={}  unpredictable={}  compressed={:.2} MB  raw={:.2} MB  ratio={:.2}×  max_err={:.6}",
        stats.blocks,
        stats.unpredictable,
        stats.compressed_bytes as f64 / 1e6,
        stats.raw_bytes as f64 / 1e6,
        stats.ratio(),
        max_abs_err,
    );
    Ok(())
}

fn decompress<D: Dimension>(args: &Args, bytes: &[u8], block_size: usize) -> Result<Vec<f32>> {
    let table = load_table::<D>(args, block_size)?;
    let compressor = BlockwiseCompressor::new(table, block_size, args.error_bound);
    let grid: Grid<f32, D> = compressor.decompress(bytes).context("decompress")?;
    Ok(grid.into_vec())
}

fn read_raw(path: &Path, len: usize) -> Result<Vec<f32>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut rdr = BufReader::new(f);
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        out.push(
            rdr.read_f32::<LittleEndian>()
                .with_context(|| format!("read value {} of {}", i, len))?,
        );
    }
    let mut rest = [0u8; 1];
    if rdr.read(&mut rest)? != 0 {
        bail!("{} holds more than {} values", path.display(), len);
    }
    Ok(out)
}

fn write_raw(path: &Path, values: &[f32]) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    for &v in values {
        w.write_f32::<LittleEndian>(v).context("write value")?;
    }
    w.flush().context("flush")?;
    Ok(())
}

/// Smooth waves with a little noise.
fn generate_synthetic<D: Dimension>(dims: &D::Coord) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    let len: usize = dims.as_ref().iter().product();
    let mut out = Vec::with_capacity(len);
    let mut coord = vec![0usize; D::N];
    for _ in 0..len {
        let phase: f32 = coord
            .iter()
            .enumerate()
            .map(|(axis, &c)| c as f32 * 0.05 * (axis + 1) as f32)
            .sum();
        out.push(phase.sin() * 10.0 + rng.gen_range(-1e-3..1e-3));
        // Row-major increment.
        for axis in (0..D::N).rev() {
            coord[axis] += 1;
            if coord[axis] < dims.as_ref()[axis] {
                break;
            }
            coord[axis] = 0;
        }
    }
    out
}
