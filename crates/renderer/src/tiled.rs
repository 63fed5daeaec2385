//! Tile-by-tile render orchestration.
//!
//! ```text
//!   Uninitialized ──initialize──▶ Initialized ──render_all──▶ Rendering
//!                                     ▲   ▲                    │   │
//!                                     │   └── cancel / error ──┘   ▼
//!                                     └──── set_resolution ──── Rendered
//!   any state ──dispose──▶ Disposed
//! ```

use std::fmt;
use std::thread;

use image::RgbaImage;
use scheduler::{TileGrid, TileScheduler};

use crate::blur::{BlurParams, BlurPipeline, TileWindow};
use crate::cancel::CancellationToken;
use crate::canvas::{self, OVERLAY_THICKNESS, SEAM_COLOR};
use crate::cropper::{CropCommand, Cropper};
use crate::display::{DisplaySink, Frame};
use crate::error::RenderError;
use crate::source::{load_square, ImageSource};
use crate::surface::GpuSurface;
use crate::types::{KernelRadiusSource, RenderOptions, TiledRendererConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RendererState {
    Uninitialized,
    Initialized,
    Rendering,
    Rendered,
    Disposed,
}

impl fmt::Display for RendererState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RendererState::Uninitialized => "uninitialized",
            RendererState::Initialized => "initialized",
            RendererState::Rendering => "rendering",
            RendererState::Rendered => "rendered",
            RendererState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Result of [`TiledRenderer::render_all`].
#[derive(Clone, Debug)]
pub struct RenderOutcome {
    /// Stitched canvas with every tile composited so far.
    pub canvas: RgbaImage,
    /// Copy of `canvas` with seam and crop outlines, when `mark_seams` was set.
    /// Only this copy is shown to the display sink; `canvas` stays clean.
    pub annotated: Option<RgbaImage>,
    pub tiles_rendered: usize,
    /// False when the render stopped early on cancellation.
    pub completed: bool,
}

impl RenderOutcome {
    /// The canvas a viewer should see: annotated when outlines were drawn.
    pub fn display_canvas(&self) -> &RgbaImage {
        self.annotated.as_ref().unwrap_or(&self.canvas)
    }
}

/// Blurs a large square image one padded tile at a time on a [`GpuSurface`].
pub struct TiledRenderer<S: GpuSurface> {
    surface: S,
    scheduler: TileScheduler,
    kernel_radius_source: KernelRadiusSource,
    params: BlurParams,
    pipeline: BlurPipeline,
    cropper: Cropper,
    stitched: Option<RgbaImage>,
    state: RendererState,
}

impl<S: GpuSurface> TiledRenderer<S> {
    /// Plans the tile grid and sizes the surface's render targets to one
    /// padded tile.
    pub fn new(mut surface: S, config: TiledRendererConfig) -> Result<Self, RenderError> {
        let scheduler = TileScheduler::new(
            config.resolution,
            config.blur_strength,
            config.max_tile_size,
        )?;
        let total = scheduler.grid().total_tile_size();
        surface.resize(total, total)?;
        let params = blur_params(&scheduler, config.kernel_radius_source);
        tracing::info!(
            resolution = config.resolution,
            padding = params.radius,
            tile_size = scheduler.grid().tile_size(),
            tiles = scheduler.tile_count(),
            "planned tiled blur"
        );
        Ok(Self {
            surface,
            scheduler,
            kernel_radius_source: config.kernel_radius_source,
            params,
            pipeline: BlurPipeline::new(),
            cropper: Cropper::new(),
            stitched: None,
            state: RendererState::Uninitialized,
        })
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn grid(&self) -> &TileGrid {
        self.scheduler.grid()
    }

    pub fn blur_params(&self) -> &BlurParams {
        &self.params
    }

    pub fn cropper(&self) -> &Cropper {
        &self.cropper
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Canvas holding the padded tiles of the last render.
    pub fn stitched_canvas(&self) -> Option<&RgbaImage> {
        self.stitched.as_ref()
    }

    /// Loads `source_id` and `mask_id`, resized to the render resolution, and
    /// prepares the blur program.
    pub fn initialize(
        &mut self,
        images: &dyn ImageSource,
        source_id: &str,
        mask_id: &str,
    ) -> Result<(), RenderError> {
        self.require(&[RendererState::Uninitialized], "initialize")?;
        let resolution = self.grid().resolution();
        let source = load_square(images, source_id, resolution)?;
        let mask = load_square(images, mask_id, resolution)?;
        self.initialize_with_images(&source, &mask)
    }

    /// Like [`initialize`](Self::initialize) for images already in memory.
    pub fn initialize_with_images(
        &mut self,
        source: &RgbaImage,
        mask: &RgbaImage,
    ) -> Result<(), RenderError> {
        self.require(&[RendererState::Uninitialized], "initialize")?;
        self.pipeline.load(&mut self.surface, source, mask)?;
        self.state = RendererState::Initialized;
        tracing::debug!(
            width = source.width(),
            height = source.height(),
            "renderer initialized"
        );
        Ok(())
    }

    /// Renders every tile in schedule order onto a fresh stitched canvas.
    ///
    /// `cancel` is checked before each tile; a cancelled run returns the
    /// partial canvas with `completed == false` and leaves the renderer ready
    /// for another run. `display` sees the canvas after every tile and once
    /// more when all tiles are done.
    pub fn render_all(
        &mut self,
        options: &RenderOptions,
        cancel: &CancellationToken,
        display: &mut dyn DisplaySink,
    ) -> Result<RenderOutcome, RenderError> {
        self.require(
            &[RendererState::Initialized, RendererState::Rendered],
            "render",
        )?;
        self.state = RendererState::Rendering;
        self.cropper.clear();
        self.stitched = None;

        match self.render_tiles(options, cancel, display) {
            Ok(outcome) => {
                if outcome.completed {
                    self.stitched = Some(outcome.canvas.clone());
                    self.state = RendererState::Rendered;
                    display.present(Frame::Stitched, outcome.display_canvas());
                } else {
                    self.cropper.clear();
                    self.state = RendererState::Initialized;
                }
                Ok(outcome)
            }
            Err(err) => {
                self.cropper.clear();
                self.state = RendererState::Initialized;
                Err(err)
            }
        }
    }

    fn render_tiles(
        &mut self,
        options: &RenderOptions,
        cancel: &CancellationToken,
        display: &mut dyn DisplaySink,
    ) -> Result<RenderOutcome, RenderError> {
        let grid = self.scheduler.grid().clone();
        let total = grid.tile_count();
        let window_size = grid.bleed_factor();
        let mut stitched = canvas::blank_canvas(grid.resolution());
        let mut annotated = options.mark_seams.then(|| stitched.clone());

        for (index, tile) in grid.tiles().iter().copied().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(rendered = index, total, "tiled render cancelled");
                return Ok(RenderOutcome {
                    canvas: stitched,
                    annotated,
                    tiles_rendered: index,
                    completed: false,
                });
            }

            let window = TileWindow {
                offset: grid.normalized_offset(tile),
                footprint: window_size,
            };
            let rendered =
                self.pipeline
                    .render_tile(&mut self.surface, &self.params, window, options.with_mask)?;

            let origin = grid.canvas_origin(tile);
            canvas::composite(&mut stitched, &rendered, origin.0, origin.1);

            let command = CropCommand::new(tile, grid.tile_size(), grid.padding());
            self.cropper.enqueue(command);
            if let Some(overlay) = annotated.as_mut() {
                let total_size = grid.total_tile_size();
                canvas::composite(overlay, &rendered, origin.0, origin.1);
                canvas::stroke_rect(
                    overlay,
                    origin,
                    (total_size, total_size),
                    OVERLAY_THICKNESS,
                    SEAM_COLOR,
                );
                self.cropper.visualize(overlay, &command);
            }

            tracing::debug!(x = tile.x, y = tile.y, index, total, "rendered tile");
            display.present(
                Frame::Progress {
                    completed: index + 1,
                    total,
                },
                annotated.as_ref().unwrap_or(&stitched),
            );

            if !options.inter_tile_delay.is_zero() && index + 1 < total {
                thread::sleep(options.inter_tile_delay);
            }
        }

        tracing::info!(tiles = total, "tiled render finished");
        Ok(RenderOutcome {
            canvas: stitched,
            annotated,
            tiles_rendered: total,
            completed: true,
        })
    }

    /// Crops the padding off every tile of the last completed render and
    /// packs the tiles into the final image.
    pub fn crop_and_stitch(&self) -> Result<RgbaImage, RenderError> {
        self.require(&[RendererState::Rendered], "crop and stitch")?;
        let stitched = self
            .stitched
            .as_ref()
            .ok_or(RenderError::Precondition("no stitched canvas to crop"))?;
        if self.cropper.len() != self.grid().tile_count() {
            return Err(RenderError::Precondition(
                "crop queue does not cover every tile",
            ));
        }
        Ok(self.cropper.stitch(stitched, self.grid().resolution()))
    }

    /// Replans the grid for a new resolution and resizes the render targets.
    ///
    /// Loaded images are kept; the previous render and crop queue are
    /// discarded. On error the renderer keeps its previous grid.
    pub fn set_resolution(&mut self, resolution: u32) -> Result<(), RenderError> {
        self.require(
            &[
                RendererState::Uninitialized,
                RendererState::Initialized,
                RendererState::Rendered,
            ],
            "change resolution",
        )?;
        let planned = TileGrid::plan(
            resolution,
            self.scheduler.blur_strength(),
            self.scheduler.max_tile_size(),
        )?;
        let total = planned.total_tile_size();
        self.surface.resize(total, total)?;
        self.scheduler.recompute(resolution)?;
        self.params = blur_params(&self.scheduler, self.kernel_radius_source);
        self.cropper.clear();
        self.stitched = None;
        if self.state == RendererState::Rendered {
            self.state = RendererState::Initialized;
        }
        tracing::info!(
            resolution,
            padding = self.params.radius,
            tiles = self.scheduler.tile_count(),
            "replanned tiled blur"
        );
        Ok(())
    }

    /// Releases GPU resources. Calling it again does nothing.
    pub fn dispose(&mut self) {
        if self.state == RendererState::Disposed {
            return;
        }
        self.pipeline.release(&mut self.surface);
        self.surface.dispose();
        self.cropper.clear();
        self.stitched = None;
        self.state = RendererState::Disposed;
        tracing::debug!("renderer disposed");
    }

    fn require(&self, allowed: &[RendererState], operation: &'static str) -> Result<(), RenderError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(RenderError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}

fn blur_params(scheduler: &TileScheduler, source: KernelRadiusSource) -> BlurParams {
    BlurParams::new(scheduler.grid().padding(), scheduler.blur_strength(), source)
}
