//! Removes the blur padding from each rendered tile and packs the tiles into
//! a seamless image.

use image::RgbaImage;
use scheduler::Tile;

use crate::canvas::{self, CROP_COLOR, OVERLAY_THICKNESS};

/// Where one tile's kept region lives on the stitched and final canvases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropCommand {
    pub tile: Tile,
    pub tile_size: u32,
    pub blur_padding: u32,
}

impl CropCommand {
    pub fn new(tile: Tile, tile_size: u32, blur_padding: u32) -> Self {
        Self {
            tile,
            tile_size,
            blur_padding,
        }
    }

    /// Top-left of the kept region on the stitched canvas. Half the padding is
    /// dropped from the leading edge; the trailing half falls outside the
    /// region.
    pub fn source_origin(&self) -> (u32, u32) {
        let stride = self.tile_size + self.blur_padding;
        let inset = self.blur_padding / 2;
        (
            self.tile.x * stride + inset,
            self.tile.y * stride + inset,
        )
    }

    /// Top-left of the region on the packed output.
    pub fn destination_origin(&self) -> (u32, u32) {
        (self.tile.x * self.tile_size, self.tile.y * self.tile_size)
    }
}

/// Queue of crop commands recorded while tiles render.
#[derive(Clone, Debug, Default)]
pub struct Cropper {
    commands: Vec<CropCommand>,
}

impl Cropper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, command: CropCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[CropCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Copies every queued region from `stitched` onto a fresh
    /// `resolution`-square transparent canvas, then trims the transparent
    /// margin left where the grid does not fill the resolution exactly.
    pub fn stitch(&self, stitched: &RgbaImage, resolution: u32) -> RgbaImage {
        let mut packed = canvas::blank_canvas(resolution);
        for command in &self.commands {
            let (source_x, source_y) = command.source_origin();
            let (target_x, target_y) = command.destination_origin();
            canvas::copy_region(
                &mut packed,
                stitched,
                source_x,
                source_y,
                command.tile_size,
                command.tile_size,
                target_x,
                target_y,
            );
        }
        canvas::trim_transparent(&packed)
    }

    /// Outlines the region `command` keeps.
    pub fn visualize(&self, canvas: &mut RgbaImage, command: &CropCommand) {
        canvas::stroke_rect(
            canvas,
            command.source_origin(),
            (command.tile_size, command.tile_size),
            OVERLAY_THICKNESS,
            CROP_COLOR,
        );
    }
}
