use std::env;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use blurconfig::{BlurConfig, KernelRadiusSetting};
use image::{Rgba, RgbaImage};
use renderer::{
    load_square, render_single_pass, single_pass_radius, CancellationToken, DisplaySink,
    FileImageSource, Frame, GpuSurface, KernelRadiusSource, RenderOptions, TiledRenderer,
    TiledRendererConfig, WgpuSurface, WHITE_TEXEL,
};
use scheduler::TileGrid;
use tracing_subscriber::EnvFilter;

use crate::cli::{GridArgs, ImageArgs, RenderArgs, SingleArgs};
use crate::paths::AppPaths;
use crate::snapshots::{ProgressLog, SnapshotSink};

/// Parsed configuration plus the directory its relative paths resolve against.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: BlurConfig,
    pub base_dir: PathBuf,
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Reads `explicit` if given, otherwise the user config file when present.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let candidate = AppPaths::discover()?.config_file();
            if !candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "no config file; using defaults");
                return Ok(LoadedConfig {
                    config: BlurConfig::default(),
                    base_dir: env::current_dir().context("failed to read working directory")?,
                });
            }
            candidate
        }
    };

    let config = BlurConfig::load(&path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded config");
    let base_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => env::current_dir().context("failed to read working directory")?,
    };
    Ok(LoadedConfig { config, base_dir })
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct GridSettings {
    resolution: u32,
    blur_strength: f32,
    max_tile_size: u32,
}

impl GridSettings {
    fn resolve(config: &BlurConfig, args: &GridArgs) -> Self {
        Self {
            resolution: args.resolution.unwrap_or(config.render.resolution),
            blur_strength: args.blur_strength.unwrap_or(config.render.blur_strength),
            max_tile_size: args.max_tile_size.unwrap_or(config.render.max_tile_size),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ImagePaths {
    source: PathBuf,
    mask: Option<PathBuf>,
    output: PathBuf,
    with_mask: bool,
}

impl ImagePaths {
    fn resolve(loaded: &LoadedConfig, args: &ImageArgs) -> Result<Self> {
        let config = &loaded.config;
        let from_config = |path: &Option<PathBuf>| path.as_ref().map(|p| loaded.base_dir.join(p));

        let source = args
            .source
            .clone()
            .or_else(|| from_config(&config.images.source))
            .ok_or_else(|| anyhow!("no source image given (use --source or images.source)"))?;
        let mask = args.mask.clone().or_else(|| from_config(&config.images.mask));
        let output = args
            .output
            .clone()
            .or_else(|| from_config(&config.output.path))
            .ok_or_else(|| anyhow!("no output path given (use --output or output.path)"))?;
        let with_mask = mask.is_some() && config.output.with_mask && !args.no_mask;

        Ok(Self {
            source,
            mask,
            output,
            with_mask,
        })
    }

    fn load(&self, resolution: u32) -> Result<(RgbaImage, RgbaImage)> {
        let images = FileImageSource::new(
            env::current_dir().context("failed to read working directory")?,
        );
        let source = load_square(&images, &path_id(&self.source)?, resolution)
            .with_context(|| format!("failed to load source image {}", self.source.display()))?;
        let mask = match &self.mask {
            Some(path) if self.with_mask => load_square(&images, &path_id(path)?, resolution)
                .with_context(|| format!("failed to load mask image {}", path.display()))?,
            _ => RgbaImage::from_pixel(resolution, resolution, Rgba(WHITE_TEXEL)),
        };
        Ok((source, mask))
    }
}

fn path_id(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("path {} is not valid UTF-8", path.display()))
}

fn kernel_radius_source(setting: KernelRadiusSetting) -> KernelRadiusSource {
    match setting {
        KernelRadiusSetting::Padding => KernelRadiusSource::Padding,
        KernelRadiusSetting::BlurStrength => KernelRadiusSource::BlurStrength,
    }
}

pub fn render(loaded: LoadedConfig, args: RenderArgs) -> Result<()> {
    let config = &loaded.config;
    let grid = GridSettings::resolve(config, &args.grid);
    let images = ImagePaths::resolve(&loaded, &args.images)?;
    let radius_source = args
        .kernel_radius_source
        .unwrap_or_else(|| kernel_radius_source(config.render.kernel_radius_source));
    let options = RenderOptions {
        with_mask: images.with_mask,
        mark_seams: args.mark_seams || config.output.mark_seams,
        inter_tile_delay: args.delay.unwrap_or(config.output.inter_tile_delay),
    };
    let stitched_output = args
        .stitched_output
        .clone()
        .or_else(|| config.output.stitched_path.as_ref().map(|p| loaded.base_dir.join(p)));
    let progress_dir = args
        .progress_dir
        .clone()
        .or_else(|| config.output.progress_dir.as_ref().map(|p| loaded.base_dir.join(p)));

    let plan = TileGrid::plan(grid.resolution, grid.blur_strength, grid.max_tile_size)?;
    let total = plan.total_tile_size();
    let surface = WgpuSurface::with_power_preference(
        total,
        total,
        args.images.power_preference(),
    )
    .context("failed to create GPU surface")?;
    let renderer_config = TiledRendererConfig::new(grid.resolution, grid.blur_strength)
        .with_max_tile_size(grid.max_tile_size)
        .with_kernel_radius_source(radius_source);
    let mut renderer = TiledRenderer::new(surface, renderer_config)?;

    let (source, mask) = images.load(grid.resolution)?;
    renderer.initialize_with_images(&source, &mask)?;

    let mut display: Box<dyn DisplaySink> = match &progress_dir {
        Some(dir) => Box::new(SnapshotSink::create(dir)?),
        None => Box::new(ProgressLog),
    };
    tracing::info!(
        resolution = grid.resolution,
        padding = plan.padding(),
        tile_size = plan.tile_size(),
        tiles = plan.tile_count(),
        with_mask = options.with_mask,
        "starting tiled blur"
    );

    let started = Instant::now();
    let outcome = renderer.render_all(&options, &CancellationToken::new(), display.as_mut())?;

    if let Some(path) = &stitched_output {
        save_png(outcome.display_canvas(), path)?;
    }
    let output = renderer.crop_and_stitch()?;
    display.present(Frame::Final, &output);
    save_png(&output, &images.output)?;
    renderer.dispose();

    tracing::info!(
        output = %images.output.display(),
        width = output.width(),
        height = output.height(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "tiled blur written"
    );
    Ok(())
}

pub fn single(loaded: LoadedConfig, args: SingleArgs) -> Result<()> {
    let grid = GridSettings::resolve(&loaded.config, &args.grid);
    let images = ImagePaths::resolve(&loaded, &args.images)?;
    let (source, mask) = images.load(grid.resolution)?;

    let mut surface = WgpuSurface::with_power_preference(
        grid.resolution,
        grid.resolution,
        args.images.power_preference(),
    )
    .context("failed to create GPU surface")?;
    tracing::info!(
        resolution = grid.resolution,
        radius = single_pass_radius(grid.resolution, grid.blur_strength),
        "starting single-pass blur"
    );

    let started = Instant::now();
    let result = render_single_pass(
        &mut surface,
        &source,
        &mask,
        grid.blur_strength,
        images.with_mask,
    );
    surface.dispose();
    let output = result?;
    save_png(&output, &images.output)?;

    tracing::info!(
        output = %images.output.display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "single-pass blur written"
    );
    Ok(())
}

pub fn plan(loaded: LoadedConfig, args: GridArgs) -> Result<()> {
    let grid = GridSettings::resolve(&loaded.config, &args);
    let plan = TileGrid::plan(grid.resolution, grid.blur_strength, grid.max_tile_size)?;
    print!("{}", describe_plan(&plan));
    Ok(())
}

fn describe_plan(plan: &TileGrid) -> String {
    let output_side = plan.tile_size() * plan.tiles_per_side();
    format!(
        "resolution:      {}\n\
         padding:         {}\n\
         tile size:       {}\n\
         padded tile:     {}\n\
         tiles per side:  {}\n\
         tile count:      {}\n\
         exact fit:       {}\n\
         packed output:   {}x{}\n",
        plan.resolution(),
        plan.padding(),
        plan.tile_size(),
        plan.total_tile_size(),
        plan.tiles_per_side(),
        plan.tile_count(),
        if plan.is_exact() { "yes" } else { "no" },
        output_side.min(plan.resolution()),
        output_side.min(plan.resolution()),
    )
}

pub fn describe_paths() -> Result<()> {
    let paths = AppPaths::discover()?;
    let file = paths.config_file();
    println!("Configuration:");
    println!("  dir:   {}", paths.config_dir().display());
    println!(
        "  file:  {} ({})",
        file.display(),
        if file.is_file() { "present" } else { "missing" }
    );
    Ok(())
}

fn save_png(image: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), "saved image");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(config: BlurConfig) -> LoadedConfig {
        LoadedConfig {
            config,
            base_dir: PathBuf::from("/configs"),
        }
    }

    #[test]
    fn cli_values_override_config() {
        let mut config = BlurConfig::default();
        config.render.resolution = 4096;
        config.render.blur_strength = 0.5;
        let args = GridArgs {
            resolution: Some(512),
            blur_strength: None,
            max_tile_size: Some(256),
        };

        let grid = GridSettings::resolve(&config, &args);

        assert_eq!(
            grid,
            GridSettings {
                resolution: 512,
                blur_strength: 0.5,
                max_tile_size: 256,
            }
        );
    }

    #[test]
    fn config_paths_resolve_against_config_dir() {
        let mut config = BlurConfig::default();
        config.images.source = Some(PathBuf::from("in/photo.jpg"));
        config.images.mask = Some(PathBuf::from("mask.png"));
        config.output.path = Some(PathBuf::from("out.png"));

        let paths = ImagePaths::resolve(&loaded(config), &ImageArgs::default()).unwrap();

        assert_eq!(paths.source, Path::new("/configs/in/photo.jpg"));
        assert_eq!(paths.mask.as_deref(), Some(Path::new("/configs/mask.png")));
        assert_eq!(paths.output, Path::new("/configs/out.png"));
        assert!(paths.with_mask);
    }

    #[test]
    fn masking_needs_a_mask_and_no_opt_out() {
        let mut config = BlurConfig::default();
        config.images.source = Some(PathBuf::from("in.png"));
        config.output.path = Some(PathBuf::from("out.png"));

        let without_mask = ImagePaths::resolve(&loaded(config.clone()), &ImageArgs::default())
            .unwrap();
        assert!(!without_mask.with_mask);

        let opted_out = ImagePaths::resolve(
            &loaded(config),
            &ImageArgs {
                mask: Some(PathBuf::from("mask.png")),
                no_mask: true,
                ..ImageArgs::default()
            },
        )
        .unwrap();
        assert!(!opted_out.with_mask);
    }

    #[test]
    fn missing_source_is_reported() {
        let err = ImagePaths::resolve(&loaded(BlurConfig::default()), &ImageArgs::default())
            .unwrap_err();
        assert!(err.to_string().contains("--source"));
    }

    #[test]
    fn plan_description_lists_grid() {
        let plan = TileGrid::plan(512, 0.2, 256).unwrap();
        let text = describe_plan(&plan);
        assert!(text.contains("padding:         10\n"));
        assert!(text.contains("tile size:       246\n"));
        assert!(text.contains("padded tile:     256\n"));
        assert!(text.contains("tile count:      4\n"));
        assert!(text.contains("packed output:   492x492\n"));
    }

    #[test]
    fn maps_kernel_radius_setting() {
        assert_eq!(
            kernel_radius_source(KernelRadiusSetting::Padding),
            KernelRadiusSource::Padding
        );
        assert_eq!(
            kernel_radius_source(KernelRadiusSetting::BlurStrength),
            KernelRadiusSource::BlurStrength
        );
    }
}
