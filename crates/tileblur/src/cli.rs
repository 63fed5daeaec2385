use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use renderer::{GpuPowerPreference, KernelRadiusSource};

#[derive(Parser, Debug)]
#[command(
    name = "tileblur",
    author,
    version,
    about = "Tiled GPU Gaussian blur for very large images"
)]
pub struct Cli {
    /// Configuration file; defaults to `config.toml` in the user config directory.
    #[arg(long, global = true, value_name = "FILE", env = "TILEBLUR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Blur an image tile by tile and write the cropped result.
    Render(RenderArgs),
    /// Blur an image in a single two-pass draw without tiling.
    Single(SingleArgs),
    /// Print the tile grid for the given settings without touching the GPU.
    Plan(GridArgs),
    /// Print the resolved configuration directory and file.
    Where,
}

/// Grid inputs shared by every subcommand; unset values come from the config.
#[derive(Args, Debug, Clone, Default)]
pub struct GridArgs {
    /// Output width and height in pixels.
    #[arg(long, value_name = "PIXELS", value_parser = parse_resolution)]
    pub resolution: Option<u32>,

    /// Blur strength between 0.0 and 1.0.
    #[arg(long, value_name = "STRENGTH", value_parser = parse_blur_strength)]
    pub blur_strength: Option<f32>,

    /// Upper bound for the unpadded tile edge.
    #[arg(long, value_name = "PIXELS", value_parser = parse_max_tile_size)]
    pub max_tile_size: Option<u32>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ImageArgs {
    /// Image to blur.
    #[arg(long, value_name = "PATH")]
    pub source: Option<PathBuf>,

    /// Influence mask; its red channel blends between sharp and blurred.
    #[arg(long, value_name = "PATH")]
    pub mask: Option<PathBuf>,

    /// Where to write the blurred PNG.
    #[arg(long, short, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Ignore the mask and blur every pixel fully.
    #[arg(long)]
    pub no_mask: bool,

    /// Prefer the integrated GPU when several adapters are present.
    #[arg(long)]
    pub low_power: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RenderArgs {
    #[command(flatten)]
    pub grid: GridArgs,

    #[command(flatten)]
    pub images: ImageArgs,

    /// Gaussian kernel radius source: `padding` or `blur-strength`.
    #[arg(long, value_name = "SOURCE", value_parser = parse_kernel_radius_source)]
    pub kernel_radius_source: Option<KernelRadiusSource>,

    /// Also write the padded stitched canvas to this path.
    #[arg(long, value_name = "PATH")]
    pub stitched_output: Option<PathBuf>,

    /// Outline tile seams and crop rectangles on progress frames and the stitched
    /// canvas. The cropped output is unaffected.
    #[arg(long)]
    pub mark_seams: bool,

    /// Pause between tiles (e.g. `50ms`).
    #[arg(long, value_name = "DURATION", value_parser = parse_delay)]
    pub delay: Option<Duration>,

    /// Write a numbered PNG of the stitched canvas after every tile.
    #[arg(long, value_name = "DIR")]
    pub progress_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SingleArgs {
    #[command(flatten)]
    pub grid: GridArgs,

    #[command(flatten)]
    pub images: ImageArgs,
}

impl ImageArgs {
    pub fn power_preference(&self) -> GpuPowerPreference {
        if self.low_power {
            GpuPowerPreference::Low
        } else {
            GpuPowerPreference::High
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_resolution(value: &str) -> Result<u32, String> {
    let resolution: u32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid resolution '{value}'; expected a positive integer"))?;
    if resolution == 0 {
        return Err("resolution must be greater than zero".to_string());
    }
    if resolution > blurconfig::MAX_RESOLUTION {
        return Err(format!(
            "resolution {resolution} exceeds the supported maximum of {}",
            blurconfig::MAX_RESOLUTION
        ));
    }
    Ok(resolution)
}

pub fn parse_blur_strength(value: &str) -> Result<f32, String> {
    let trimmed = value.trim();
    let strength = match trimmed.strip_suffix('%') {
        Some(percent) => percent
            .trim()
            .parse::<f32>()
            .map(|p| p / 100.0)
            .map_err(|_| format!("invalid blur strength '{value}'"))?,
        None => trimmed
            .parse::<f32>()
            .map_err(|_| format!("invalid blur strength '{value}'"))?,
    };
    if !(0.0..=1.0).contains(&strength) {
        return Err(format!(
            "blur strength must be between 0.0 and 1.0 (or 0%-100%), got '{value}'"
        ));
    }
    Ok(strength)
}

pub fn parse_max_tile_size(value: &str) -> Result<u32, String> {
    let size: u32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid max tile size '{value}'"))?;
    if size < scheduler::MIN_TILE_SIZE {
        return Err(format!(
            "max tile size must be at least {}",
            scheduler::MIN_TILE_SIZE
        ));
    }
    Ok(size)
}

pub fn parse_kernel_radius_source(value: &str) -> Result<KernelRadiusSource, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("kernel radius source must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase().replace('_', "-");
    match normalized.as_str() {
        "padding" => Ok(KernelRadiusSource::Padding),
        "blur-strength" | "strength" => Ok(KernelRadiusSource::BlurStrength),
        _ => Err(format!(
            "unknown kernel radius source '{trimmed}' (expected padding or blur-strength)"
        )),
    }
}

pub fn parse_delay(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if let Ok(millis) = trimmed.parse::<u64>() {
        return Ok(Duration::from_millis(millis));
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid delay '{value}': {err}"))
}
