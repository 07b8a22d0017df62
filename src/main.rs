//! device-to-pov: CLI tool for rendering photonic devices and field isosurfaces with POV-Ray

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pov_export::{
    assemble_gif, device_scene, isosurface_scene, load_field_array, process_field_array, render_pov,
    write_pov_file, DeviceSceneConfig, DeviceStore, GifConfig, IsosurfaceSceneConfig, Quantity,
};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "device-to-pov")]
#[command(about = "Generate POV-Ray scenes for photonic devices and field isosurfaces")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a device from a document store
    Device(DeviceArgs),
    /// Render isosurfaces of a simulated field
    Isosurface(IsosurfaceArgs),
    /// Assemble rendered PNG frames into an animated GIF
    Gif(GifArgs),
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Output .pov file
    #[arg(short, long)]
    output: PathBuf,

    /// Rendered image (default: output with .png extension)
    #[arg(long)]
    image: Option<String>,

    /// JSON parameter block overriding the defaults
    #[arg(long)]
    params: Option<PathBuf>,

    /// Image height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Image width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Camera rotation about the z axis in degrees
    #[arg(long)]
    camera_rotate: Option<f64>,

    /// Only write the .pov and .ini files
    #[arg(long)]
    no_render: bool,

    /// Do not open the rendered image
    #[arg(long)]
    no_open: bool,
}

#[derive(Args, Debug)]
struct DeviceArgs {
    /// Device store (JSON array or JSON lines, optionally gzipped)
    #[arg(short, long)]
    store: PathBuf,

    /// Device `_id` in the store
    #[arg(long, required_unless_present = "list")]
    id: Option<String>,

    /// List the device ids in the store and exit
    #[arg(long)]
    list: bool,

    /// Unit cells along the first lattice vector
    #[arg(long)]
    num_uc_x: Option<usize>,

    /// Unit cells along the second lattice vector
    #[arg(long)]
    num_uc_y: Option<usize>,

    /// Outline feature edges
    #[arg(long)]
    lines: bool,

    #[command(flatten)]
    render: RenderArgs,
}

#[derive(Args, Debug)]
struct IsosurfaceArgs {
    /// Field array (.npy, [z, y, x, E/H, component])
    #[arg(short, long)]
    field: PathBuf,

    /// Simulation to use when the array holds a stack of them
    #[arg(long, default_value = "0")]
    sim: usize,

    /// Quantity to mesh: e, h, energy, ex, ey, ez, hx, hy, hz
    #[arg(long, default_value = "e")]
    quantity: String,

    /// Uniform permittivity for the energy density
    #[arg(long, default_value = "1.0")]
    eps: f64,

    /// Isosurface levels
    #[arg(long, value_delimiter = ',', default_values_t = [0.15, 0.5, 1.0, 1.5, 2.0, 2.5])]
    cutoffs: Vec<f64>,

    /// Colormap name
    #[arg(long)]
    colormap: Option<String>,

    /// Transmit channel of the isosurfaces
    #[arg(long)]
    transmit: Option<f64>,

    /// Keep the field origin at the grid corner
    #[arg(long)]
    no_center: bool,

    /// Device store for the unit cell drawn over the field
    #[arg(long, requires = "id")]
    store: Option<PathBuf>,

    /// Device `_id` in the store
    #[arg(long, requires = "store")]
    id: Option<String>,

    #[command(flatten)]
    render: RenderArgs,
}

#[derive(Args, Debug)]
struct GifArgs {
    /// Directory holding the rendered frames
    #[arg(short, long)]
    dir: PathBuf,

    /// JSON parameter block overriding the defaults
    #[arg(long)]
    params: Option<PathBuf>,

    /// Pause between frames in hundredths of a second (default 40)
    #[arg(long)]
    delay: Option<u32>,

    /// Times to loop, 0 loops forever (default 0)
    #[arg(long)]
    loops: Option<u32>,

    /// Negate the colours
    #[arg(long)]
    negate: bool,

    /// Output file name inside the frame directory (default devices.gif)
    #[arg(long)]
    name: Option<String>,

    /// Do not open the GIF
    #[arg(long)]
    no_open: bool,
}

fn load_params<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read parameter file: {:?}", path))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid parameter file: {:?}", path))
}

fn open_store(path: &Path) -> Result<DeviceStore> {
    DeviceStore::open(path).with_context(|| format!("Failed to read device store: {:?}", path))
}

/// Write the scene, then write the .ini and render it
fn finish_scene(text: &str, args: &RenderArgs, options: &pov_export::RenderOptions) -> Result<()> {
    write_pov_file(&args.output, text)
        .with_context(|| format!("Failed to write output file: {:?}", args.output))?;
    eprintln!("Generated POV-Ray scene: {:?}", args.output);

    let image = args
        .image
        .clone()
        .unwrap_or_else(|| args.output.with_extension("png").to_string_lossy().into_owned());
    let run = render_pov(&args.output, &image, options).context("Rendering failed")?;
    eprintln!("Render with: {}", run.command);
    Ok(())
}

fn apply_render_args(args: &RenderArgs, options: &mut pov_export::RenderOptions) {
    if let Some(height) = args.height {
        options.height = height;
    }
    if let Some(width) = args.width {
        options.width = width;
    }
    if args.no_render {
        options.render = false;
    }
    if args.no_open {
        options.open_image = false;
    }
}

fn run_device(args: DeviceArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    if args.list {
        for id in store.ids() {
            println!("{}", id);
        }
        return Ok(());
    }
    let id = args.id.as_deref().context("--id is required")?;
    let device = store.find(id)?;

    let mut config: DeviceSceneConfig = load_params(args.render.params.as_deref())?;
    if let Some(n) = args.num_uc_x {
        config.device.num_uc_x = n;
    }
    if let Some(n) = args.num_uc_y {
        config.device.num_uc_y = n;
    }
    if args.lines {
        config.device.add_lines = true;
    }
    if let Some(rotate) = args.render.camera_rotate {
        config.header.camera_rotate = rotate;
    }
    apply_render_args(&args.render, &mut config.render);

    let text = device_scene(&device, &config).context("Scene generation failed")?;
    finish_scene(&text, &args.render, &config.render)
}

fn run_isosurface(args: IsosurfaceArgs) -> Result<()> {
    let mut config: IsosurfaceSceneConfig = load_params(args.render.params.as_deref())?;
    if let Some(colormap) = &args.colormap {
        config.isosurface.colormap = colormap.clone();
    }
    if let Some(transmit) = args.transmit {
        config.isosurface.transmit = transmit;
    }
    if let Some(rotate) = args.render.camera_rotate {
        config.header.camera_rotate = rotate;
    }
    apply_render_args(&args.render, &mut config.render);

    let quantity: Quantity = args.quantity.parse()?;
    let raw = load_field_array(&args.field, args.sim)
        .with_context(|| format!("Failed to read field array: {:?}", args.field))?;
    let processed = process_field_array(raw, !args.no_center)?;
    eprintln!("Field grid: {} x {} x {}", processed.nx, processed.ny, processed.nz);
    let field = quantity.reduce(&processed, args.eps)?;

    let device = match (&args.store, &args.id) {
        (Some(store), Some(id)) => Some(open_store(store)?.find(id)?),
        _ => None,
    };

    let text = isosurface_scene(&field, &args.cutoffs, device.as_ref(), &config)
        .context("Scene generation failed")?;
    finish_scene(&text, &args.render, &config.render)
}

fn run_gif(args: GifArgs) -> Result<()> {
    let mut config: GifConfig = load_params(args.params.as_deref())?;
    if let Some(delay) = args.delay {
        config.delay = delay;
    }
    if let Some(loops) = args.loops {
        config.loops = loops;
    }
    if let Some(name) = args.name {
        config.gif_name = name;
    }
    if args.negate {
        config.negate = true;
    }
    if args.no_open {
        config.open = false;
    }
    let gif = assemble_gif(&args.dir, &config)
        .with_context(|| format!("Failed to assemble frames in {:?}", args.dir))?;
    eprintln!("Generated GIF: {:?}", gif);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Device(args) => run_device(args),
        Command::Isosurface(args) => run_isosurface(args),
        Command::Gif(args) => run_gif(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_isosurface_id_needs_store() {
        let parsed = Cli::try_parse_from(["device-to-pov", "isosurface", "-f", "e.npy", "-o", "e.pov", "--id", "a1"]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from([
            "device-to-pov", "isosurface", "-f", "e.npy", "-o", "e.pov", "--id", "a1", "--store", "s.json",
        ]);
        assert!(parsed.is_ok());
    }

    #[test]
    fn test_gif_params_with_flag_overrides() {
        let mut params = tempfile::NamedTempFile::new().unwrap();
        write!(params, r#"{{"delay": 10, "loops": 3, "negate": true}}"#).unwrap();
        let path = params.path().to_str().unwrap();
        let cli =
            Cli::try_parse_from(["device-to-pov", "gif", "-d", "frames", "--params", path, "--loops", "1"]).unwrap();
        let Command::Gif(args) = cli.command else {
            panic!("Expected gif subcommand");
        };

        let config: GifConfig = load_params(args.params.as_deref()).unwrap();
        assert_eq!(config.delay, 10);
        assert_eq!(config.loops, 3);
        assert!(config.negate);
        assert_eq!(config.gif_name, "devices.gif");
        assert_eq!(args.loops, Some(1));
        assert_eq!(args.delay, None);
    }
}
