use crate::config::load_config;
use crate::dump::write_placement_dump;
use crate::geo::{LatLng, TileCoord};
use crate::map::{MapView, MeshMap};
use crate::model::Dataset;
use crate::text_metrics::FixedAdvanceMeasurer;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "meshmap", version, about = "Render mesh network map overlays (labels, client clouds, markers)")]
pub struct Args {
    /// Dataset JSON file or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file (svg/png). Defaults to stdout for SVG if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum, default_value = "png")]
    pub output_format: OutputFormat,

    /// Config file (.json or .json5)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Render a single tile, given as z/x/y
    #[arg(long = "tile", value_parser = parse_tile, conflicts_with = "center")]
    pub tile: Option<TileCoord>,

    /// Render a view centred on lat,lng
    #[arg(long = "center", value_parser = parse_lat_lng, requires = "zoom")]
    pub center: Option<LatLng>,

    /// Zoom of the rendered view
    #[arg(long = "zoom")]
    pub zoom: Option<u8>,

    /// View width
    #[arg(short = 'w', long = "width", default_value_t = 1200)]
    pub width: u32,

    /// View height
    #[arg(short = 'H', long = "height", default_value_t = 800)]
    pub height: u32,

    /// Write the label placement as JSON
    #[arg(long = "dump-labels")]
    pub dump_labels: Option<PathBuf>,

    /// Measure labels with a fixed advance (in em) instead of system fonts
    #[arg(long = "fixed-advance")]
    pub fixed_advance: Option<f32>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Svg,
    Png,
}

fn parse_tile(text: &str) -> Result<TileCoord, String> {
    TileCoord::parse(text).ok_or_else(|| format!("expected z/x/y, got '{text}'"))
}

fn parse_lat_lng(text: &str) -> Result<LatLng, String> {
    let (lat, lng) = text
        .split_once(',')
        .ok_or_else(|| format!("expected lat,lng, got '{text}'"))?;
    let lat: f64 = lat.trim().parse().map_err(|err| format!("bad latitude: {err}"))?;
    let lng: f64 = lng.trim().parse().map_err(|err| format!("bad longitude: {err}"))?;
    Ok(LatLng::new(lat, lng))
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let config = load_config(args.config.as_deref())?;
    let input = read_input(args.input.as_deref())?;
    let dataset = Dataset::from_json(&input).context("failed to read dataset")?;

    let mut map = match args.fixed_advance {
        Some(advance) => MeshMap::with_measurer(config, Box::new(FixedAdvanceMeasurer::new(advance)))?,
        None => MeshMap::new(config)?,
    };
    map.set_data(&dataset);

    if let Some(path) = args.dump_labels.as_deref()
        && let Some(placement) = map.placement()
    {
        write_placement_dump(path, placement)?;
    }

    if let Some(tile) = args.tile {
        return render_tile(&map, tile, &args);
    }
    if let (Some(center), Some(zoom)) = (args.center, args.zoom) {
        let view = map.view(args.width, args.height, center, zoom)?;
        return render_view(&map, &view, &args);
    }
    if args.dump_labels.is_none() {
        return Err(anyhow::anyhow!("Nothing to do: pass --tile, --center/--zoom or --dump-labels"));
    }
    Ok(())
}

fn render_tile(map: &MeshMap, tile: TileCoord, args: &Args) -> Result<()> {
    let canvas = map.tile_canvas(tile);
    match args.output_format {
        OutputFormat::Svg => write_output_svg(&canvas.to_svg(), args.output.as_deref()),
        OutputFormat::Png => {
            let output = ensure_output(&args.output, "png")?;
            write_tile_png(map, tile, &output)
        }
    }
}

#[cfg(feature = "png")]
fn write_tile_png(map: &MeshMap, tile: TileCoord, output: &Path) -> Result<()> {
    let rasterizer = crate::raster::Rasterizer::new(&map.config().theme.font_family);
    map.render_tile(&rasterizer, tile).save_png(output)?;
    Ok(())
}

#[cfg(not(feature = "png"))]
fn write_tile_png(_map: &MeshMap, _tile: TileCoord, _output: &Path) -> Result<()> {
    Err(anyhow::anyhow!("PNG output requires the 'png' feature"))
}

#[cfg(feature = "png")]
fn render_view(map: &MeshMap, view: &MapView, args: &Args) -> Result<()> {
    if args.output_format == OutputFormat::Svg {
        return Err(anyhow::anyhow!("Views are rendered as PNG only; use --tile for SVG"));
    }
    let output = ensure_output(&args.output, "png")?;
    let rasterizer = crate::raster::Rasterizer::new(&map.config().theme.font_family);
    let pixmap = map.render_view(&rasterizer, view)?;
    pixmap.save_png(&output)?;
    Ok(())
}

#[cfg(not(feature = "png"))]
fn render_view(_map: &MeshMap, _view: &MapView, _args: &Args) -> Result<()> {
    Err(anyhow::anyhow!("View rendering requires the 'png' feature"))
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return Ok(std::fs::read_to_string(path)?);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn write_output_svg(svg: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, svg)?;
        }
        None => {
            print!("{}", svg);
        }
    }
    Ok(())
}

fn ensure_output(output: &Option<PathBuf>, ext: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path.clone());
    }
    Err(anyhow::anyhow!(
        "Output path required for {} output",
        ext
    ))
}
