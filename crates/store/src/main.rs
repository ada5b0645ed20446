use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use lumen_engine::world::{BasicLightSource, BlockPos, LightSource};
use lumen_store::backend::{FixedBackend, RegionBackend, copy_region};
use lumen_store::config::StoreConfig;
use lumen_store::container;
use lumen_store::nls::{FixedRegionStore, NLS_EXTENSION, NLS_MAGIC};
use lumen_store::vldb::{VLDB_EXTENSION, VariableRegionStore, codec};

#[derive(Parser)]
#[command(name = "lumen", about = "Inspect and convert custom light region files")]
struct Cli {
    /// JSON store config; flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the region, chunk count and per-chunk layout of a region file
    Inspect { file: PathBuf },
    /// Print every light source as one JSON object per line
    Dump { file: PathBuf },
    /// Convert between the .vldb2 and .nls formats
    Convert {
        file: PathBuf,
        /// Output directory (defaults to the configured root)
        out_dir: Option<PathBuf>,
        /// Gzip the output file (defaults to the configured setting)
        #[arg(long)]
        deflate: Option<bool>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Variable,
    Fixed,
}

#[derive(Serialize)]
struct DumpLine<'a> {
    x: i32,
    y: i32,
    z: i32,
    luminance: u8,
    migrated: bool,
    material: &'a str,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => StoreConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => StoreConfig::default(),
    };

    match cli.command {
        Command::Inspect { file } => inspect(&file),
        Command::Dump { file } => dump(&file),
        Command::Convert { file, out_dir, deflate } => {
            let out_dir = out_dir.unwrap_or_else(|| config.root.clone());
            convert(&file, &out_dir, deflate.unwrap_or(config.deflate))
        }
    }
}

fn sniff(path: &Path) -> Result<Format> {
    let bytes = container::read_file(path).with_context(|| format!("reading {}", path.display()))?;
    if codec::is_vldb(&bytes) {
        Ok(Format::Variable)
    } else if bytes.starts_with(&NLS_MAGIC.to_be_bytes()) {
        Ok(Format::Fixed)
    } else {
        bail!("{} is not a light region file", path.display())
    }
}

fn open_variable(path: &Path) -> Result<VariableRegionStore<BasicLightSource>> {
    VariableRegionStore::open(path, false, BasicLightSource::create)
        .with_context(|| format!("opening {}", path.display()))
}

fn open_fixed(path: &Path) -> Result<FixedRegionStore> {
    FixedRegionStore::open(path, false).with_context(|| format!("opening {}", path.display()))
}

// ── inspect ─────────────────────────────────────────────────────────────────

fn inspect(path: &Path) -> Result<()> {
    match sniff(path)? {
        Format::Variable => {
            let store = open_variable(path)?;
            let mut offsets: Vec<_> = store.offset_table().into_iter().collect();
            offsets.sort_by_key(|(_, offset)| *offset);
            println!("format:  vldb");
            println!("region:  {}", store.region());
            println!("chunks:  {}", offsets.len());
            println!("bytes:   {}", store.byte_len());
            for (chunk, offset) in offsets {
                println!("  chunk {:<12} offset {}", chunk.to_string(), offset);
            }
        }
        Format::Fixed => {
            let store = open_fixed(path)?;
            println!("format:  nls");
            println!("region:  {}", store.region());
            println!("chunks:  {}", store.non_empty_chunks());
            for chunk in store.affected_chunks() {
                println!("  chunk {:<12} mask {:016b}", chunk.to_string(), store.mask(chunk)?);
            }
        }
    }
    Ok(())
}

// ── dump ────────────────────────────────────────────────────────────────────

fn print_line(pos: BlockPos, luminance: u8, migrated: bool, material: &str) -> Result<()> {
    let line = DumpLine {
        x: pos.x,
        y: pos.y,
        z: pos.z,
        luminance,
        migrated,
        material,
    };
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}

fn dump(path: &Path) -> Result<()> {
    match sniff(path)? {
        Format::Variable => {
            for source in open_variable(path)?.read_all()? {
                print_line(source.position(), source.luminance(), source.is_migrated(), source.material())?;
            }
        }
        Format::Fixed => {
            for (pos, luminance) in open_fixed(path)?.all_light_sources() {
                print_line(pos, luminance, false, "")?;
            }
        }
    }
    Ok(())
}

// ── convert ─────────────────────────────────────────────────────────────────

fn convert(path: &Path, out_dir: &Path, deflate: bool) -> Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let (copied, written) = match sniff(path)? {
        Format::Variable => {
            let src = open_variable(path)?;
            let out = out_dir.join(src.region().file_name(NLS_EXTENSION));
            let fixed = FixedRegionStore::create(&out, src.region(), deflate)
                .with_context(|| format!("creating {}", out.display()))?;
            let mut dst = FixedBackend::new(fixed, BasicLightSource::create);
            let copied = copy_region(&src, &mut dst)?;
            dst.save()?;
            (copied, out)
        }
        Format::Fixed => {
            let src = FixedBackend::new(open_fixed(path)?, BasicLightSource::create);
            let region = src.store().region();
            let out = out_dir.join(region.file_name(VLDB_EXTENSION));
            if out.exists() {
                bail!("{} already exists", out.display());
            }
            let mut dst = VariableRegionStore::create(&out, region, deflate, BasicLightSource::create)?;
            let copied = copy_region(&src, &mut dst)?;
            dst.save()?;
            (copied, out)
        }
    };

    tracing::info!("Converted {} chunks from {} to {}", copied, path.display(), written.display());
    Ok(())
}
