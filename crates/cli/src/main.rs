//! CLI for vt-slicer - slice GeoJSON into a tile pyramid
//!
//! This is a thin wrapper around the vt-slicer-core library.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use vt_slicer_core::{Options, StreamedTile, TileIndex, TileStream};

#[derive(Parser, Debug)]
#[command(
    name = "vt-slicer",
    about = "Slice GeoJSON into a quadtree tile pyramid",
    version
)]
struct Args {
    /// Input GeoJSON file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Tiles to fetch, as z/x/y (repeatable); omit to print a summary
    #[arg(long = "tile", value_name = "Z/X/Y")]
    tiles: Vec<String>,

    /// Maximum zoom to preserve detail on
    #[arg(long, default_value = "14")]
    max_zoom: u8,

    /// Maximum zoom in the eagerly built index
    #[arg(long, default_value = "5")]
    index_max_zoom: u8,

    /// Maximum points per indexed tile
    #[arg(long, default_value = "100000")]
    index_max_points: usize,

    /// Simplification tolerance
    #[arg(long, default_value = "3.0")]
    tolerance: f64,

    /// Tile extent
    #[arg(long, default_value = "4096")]
    extent: u32,

    /// Tile buffer on each side
    #[arg(long, default_value = "64")]
    buffer: u32,

    /// Track per-slice line metrics
    #[arg(long)]
    line_metrics: bool,

    /// Property to promote to feature id
    #[arg(long, conflicts_with = "generate_id")]
    promote_id: Option<String>,

    /// Generate feature ids from collection indices
    #[arg(long)]
    generate_id: bool,

    /// Stream the whole pyramid as JSON lines instead of indexing
    #[arg(long)]
    stream: bool,

    /// Force-clear the stream cache after this many tiles
    #[arg(long, default_value = "1000")]
    stream_cache_limit: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn options(&self) -> Options {
        Options {
            max_zoom: self.max_zoom,
            index_max_zoom: self.index_max_zoom,
            index_max_points: self.index_max_points,
            tolerance: self.tolerance,
            extent: self.extent,
            buffer: self.buffer,
            line_metrics: self.line_metrics,
            promote_id: self.promote_id.clone(),
            generate_id: self.generate_id,
            debug: if self.verbose { 2 } else { 0 },
            use_stream: self.stream,
            stream_object: false,
            stream_cache_limit: self.stream_cache_limit,
        }
    }
}

fn parse_tile_coord(spec: &str) -> Result<(u8, i64, i64)> {
    let parts: Vec<&str> = spec.split('/').collect();
    if parts.len() != 3 {
        anyhow::bail!("expected z/x/y, got: {spec}");
    }
    Ok((
        parts[0].parse().with_context(|| format!("invalid zoom in {spec}"))?,
        parts[1].parse().with_context(|| format!("invalid x in {spec}"))?,
        parts[2].parse().with_context(|| format!("invalid y in {spec}"))?,
    ))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let data = text
        .parse()
        .with_context(|| format!("failed to parse {} as GeoJSON", args.input.display()))?;

    if args.stream {
        let stream = TileStream::new(&data, args.options())
            .context("failed to set up the tile stream")?;

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let mut count = 0usize;
        for tile in stream {
            match tile {
                StreamedTile::Text(line) => writeln!(out, "{line}")?,
                StreamedTile::Tile(tile) => {
                    writeln!(out, "{}", serde_json::to_string(&tile)?)?;
                }
            }
            count += 1;
        }
        log::info!("streamed {count} tiles");
        return Ok(());
    }

    let mut index =
        TileIndex::new(&data, args.options()).context("failed to build the tile index")?;

    if args.tiles.is_empty() {
        println!(
            "indexed {} tiles down to zoom {}",
            index.tile_count(),
            args.index_max_zoom
        );
        return Ok(());
    }

    for spec in &args.tiles {
        let (z, x, y) = parse_tile_coord(spec)?;
        match index.get_tile(z, x, y) {
            Some(tile) => println!("{}", serde_json::to_string(&tile)?),
            None => println!("null"),
        }
    }

    Ok(())
}
