//! Tile partitioning for the tiled blur renderer.
//!
//! A blur with a large radius over a very large image cannot be drawn in a
//! single pass, so the image is cut into square tiles. Every tile is rendered
//! with `padding` extra pixels so the blur has real input at the tile edges:
//!
//! ```text
//!   ┌──────────── total_tile_size ────────────┐
//!   │ pad/2 ┌──────── tile_size ────────┐      │
//!   │       │   real pixels, kept after  │      │
//!   │       │   cropping                 │      │
//!   │       └────────────────────────────┘      │
//!   └──────────────────────────────────────────┘
//! ```
//!
//! The scheduler picks a tile size whose padded stride divides the resolution
//! so the grid has no partial edge tile.

use tracing::{debug, warn};

/// Absolute ceiling for the blur support radius, bounding per-tile GPU cost.
pub const MAX_BLUR_RADIUS: u32 = 320;

/// Largest tile edge used when the caller does not pick one.
pub const DEFAULT_MAX_TILE_SIZE: u32 = 2048;

/// Smallest tile edge the search will consider.
pub const MIN_TILE_SIZE: u32 = 2;

/// Largest number of tiles a single grid may hold.
pub const MAX_TILE_COUNT: u64 = 1 << 24;

/// Fraction of the resolution that a blur strength of `1.0` spends on padding.
const PADDING_RATIO: f64 = 0.10;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchedulerError {
    #[error("resolution must be greater than zero")]
    ZeroResolution,
    #[error("blur strength {0} is outside the supported range [0, 1]")]
    BlurStrengthOutOfRange(f32),
    #[error("max tile size {0} is below the minimum of {MIN_TILE_SIZE}")]
    MaxTileSizeTooSmall(u32),
    #[error("{tiles_per_side}x{tiles_per_side} tiles exceed the limit of {MAX_TILE_COUNT}")]
    TooManyTiles { tiles_per_side: u32 },
}

/// Grid coordinate of one tile. Owns nothing; it only locates the tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
}

impl Tile {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Computes the blur support radius in whole pixels.
///
/// `min(floor(strength * resolution * 0.1), max_tile_size * strength)`, capped
/// at [`MAX_BLUR_RADIUS`] and kept strictly below `max_tile_size`.
pub fn blur_padding(resolution: u32, blur_strength: f32, max_tile_size: u32) -> u32 {
    let strength = f64::from(blur_strength);
    let relative = (strength * f64::from(resolution) * PADDING_RATIO).floor();
    let tile_bound = f64::from(max_tile_size) * strength;
    let padding = relative.min(tile_bound).min(f64::from(MAX_BLUR_RADIUS)).max(0.0);

    (padding.floor() as u32).min(max_tile_size.saturating_sub(1))
}

/// Finds the largest tile size whose padded stride divides `resolution`.
///
/// Candidates run from [`MIN_TILE_SIZE`] up to (excluding)
/// `min(max_tile_size, resolution)`. Without an exact divisor the search falls
/// back to `max_tile_size`.
pub fn optimal_tile_size(resolution: u32, padding: u32, max_tile_size: u32) -> u32 {
    let upper = max_tile_size.min(resolution);
    (MIN_TILE_SIZE..upper)
        .rev()
        .find(|candidate| resolution % (padding + candidate) == 0)
        .unwrap_or(max_tile_size)
}

/// Immutable result of one scheduling pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid {
    resolution: u32,
    padding: u32,
    tile_size: u32,
    tiles_per_side: u32,
    tiles: Vec<Tile>,
}

impl TileGrid {
    /// Plans the grid for the given inputs.
    pub fn plan(
        resolution: u32,
        blur_strength: f32,
        max_tile_size: u32,
    ) -> Result<Self, SchedulerError> {
        validate(resolution, blur_strength, max_tile_size)?;

        let padding = blur_padding(resolution, blur_strength, max_tile_size);
        let tile_size = optimal_tile_size(resolution, padding, max_tile_size);
        let total = tile_size + padding;
        let tiles_per_side = resolution.div_ceil(total);

        if resolution % total != 0 {
            warn!(
                resolution,
                padding,
                tile_size,
                "no padded tile stride divides the resolution; the last row and column will not line up"
            );
        }

        let tile_count = u64::from(tiles_per_side) * u64::from(tiles_per_side);
        if tile_count > MAX_TILE_COUNT {
            return Err(SchedulerError::TooManyTiles { tiles_per_side });
        }

        // Rows are emitted bottom row first (decreasing y), left to right.
        let mut tiles = Vec::with_capacity(tile_count as usize);
        for y in (0..tiles_per_side).rev() {
            for x in 0..tiles_per_side {
                tiles.push(Tile::new(x, y));
            }
        }

        debug!(
            resolution,
            padding,
            tile_size,
            total_tile_size = total,
            tiles_per_side,
            "planned tile grid"
        );

        Ok(Self {
            resolution,
            padding,
            tile_size,
            tiles_per_side,
            tiles,
        })
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Blur support radius in pixels.
    pub fn padding(&self) -> u32 {
        self.padding
    }

    /// Edge length of the real (kept) part of a tile.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Edge length of a padded tile render.
    pub fn total_tile_size(&self) -> u32 {
        self.tile_size + self.padding
    }

    pub fn tiles_per_side(&self) -> u32 {
        self.tiles_per_side
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Tiles in render order.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Whether the padded stride divides the resolution exactly.
    pub fn is_exact(&self) -> bool {
        self.resolution % self.total_tile_size() == 0
    }

    /// One tile's extent in normalized texture space.
    pub fn normalized_tile_size(&self) -> f32 {
        1.0 / self.tiles_per_side as f32
    }

    /// Offset of `tile` into the source texture, in normalized coordinates.
    pub fn normalized_offset(&self, tile: Tile) -> [f32; 2] {
        let step = self.normalized_tile_size();
        [tile.x as f32 * step, tile.y as f32 * step]
    }

    /// Normalized tile size grown by the padding share of a padded tile,
    /// telling the shader how much of the source one tile samples.
    pub fn bleed_factor(&self) -> f32 {
        let step = self.normalized_tile_size();
        let bleed = step * (self.padding as f32 / self.total_tile_size() as f32);
        (step + bleed).min(1.0)
    }

    /// Top-left pixel of the padded tile render on the stitched canvas.
    pub fn canvas_origin(&self, tile: Tile) -> (u32, u32) {
        let total = self.total_tile_size();
        (tile.x * total, tile.y * total)
    }
}

fn validate(resolution: u32, blur_strength: f32, max_tile_size: u32) -> Result<(), SchedulerError> {
    if resolution == 0 {
        return Err(SchedulerError::ZeroResolution);
    }
    if !(0.0..=1.0).contains(&blur_strength) {
        return Err(SchedulerError::BlurStrengthOutOfRange(blur_strength));
    }
    if max_tile_size < MIN_TILE_SIZE {
        return Err(SchedulerError::MaxTileSizeTooSmall(max_tile_size));
    }
    Ok(())
}

/// Owns the current [`TileGrid`] and replans it when the resolution changes.
#[derive(Debug, Clone)]
pub struct TileScheduler {
    blur_strength: f32,
    max_tile_size: u32,
    grid: TileGrid,
}

impl TileScheduler {
    pub fn new(
        resolution: u32,
        blur_strength: f32,
        max_tile_size: u32,
    ) -> Result<Self, SchedulerError> {
        let grid = TileGrid::plan(resolution, blur_strength, max_tile_size)?;
        Ok(Self {
            blur_strength,
            max_tile_size,
            grid,
        })
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn blur_strength(&self) -> f32 {
        self.blur_strength
    }

    pub fn max_tile_size(&self) -> u32 {
        self.max_tile_size
    }

    pub fn tile_count(&self) -> usize {
        self.grid.tile_count()
    }

    /// Replans for a new resolution. The new grid is built completely before
    /// it replaces the old one; on error the old grid stays in place.
    pub fn recompute(&mut self, resolution: u32) -> Result<&TileGrid, SchedulerError> {
        let grid = TileGrid::plan(resolution, self.blur_strength, self.max_tile_size)?;
        self.grid = grid;
        Ok(&self.grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_matches_reference_scenario() {
        assert_eq!(blur_padding(512, 0.2, 256), 10);
    }

    #[test]
    fn padding_is_capped_by_max_radius() {
        assert_eq!(blur_padding(16384, 1.0, 4096), MAX_BLUR_RADIUS);
    }

    #[test]
    fn padding_stays_below_max_tile_size() {
        // strength 1.0 makes the tile bound equal to the max tile size.
        let padding = blur_padding(1000, 1.0, 64);
        assert_eq!(padding, 63);
    }

    #[test]
    fn zero_strength_has_no_padding() {
        assert_eq!(blur_padding(4096, 0.0, 2048), 0);
    }

    #[test]
    fn picks_largest_divisor_not_first() {
        // 512 % (10 + k) == 0 for k in {6, 22, 54, 118, 246}.
        assert_eq!(optimal_tile_size(512, 10, 256), 246);
    }

    #[test]
    fn falls_back_to_max_tile_size_without_divisor() {
        // 257 is prime and every candidate stride is below it.
        assert_eq!(optimal_tile_size(257, 3, 64), 64);
    }

    #[test]
    fn reference_scenario_grid() {
        let grid = TileGrid::plan(512, 0.2, 256).unwrap();
        assert_eq!(grid.padding(), 10);
        assert_eq!(grid.tile_size(), 246);
        assert_eq!(grid.total_tile_size(), 256);
        assert_eq!(grid.tiles_per_side(), 2);
        assert_eq!(grid.tile_count(), (512 / 256) * (512 / 256));
        assert!(grid.is_exact());
    }

    #[test]
    fn tiles_are_emitted_bottom_row_first() {
        let grid = TileGrid::plan(512, 0.2, 256).unwrap();
        assert_eq!(
            grid.tiles(),
            &[
                Tile::new(0, 1),
                Tile::new(1, 1),
                Tile::new(0, 0),
                Tile::new(1, 0),
            ]
        );
    }

    #[test]
    fn tile_size_bounds_hold_across_inputs() {
        for resolution in [1u32, 2, 3, 17, 100, 257, 512, 1000, 1024, 3000] {
            for strength in [0.0f32, 0.05, 0.2, 0.5, 1.0] {
                for max_tile in [2u32, 3, 64, 256, 2048] {
                    let grid = TileGrid::plan(resolution, strength, max_tile).unwrap();
                    assert!(grid.tile_size() >= MIN_TILE_SIZE);
                    assert!(grid.padding() < max_tile);
                    assert!(grid.total_tile_size() <= max_tile + grid.padding());
                }
            }
        }
    }

    #[test]
    fn grid_covers_every_pixel() {
        for resolution in [5u32, 99, 257, 512, 1000] {
            let grid = TileGrid::plan(resolution, 0.3, 128).unwrap();
            let total = grid.total_tile_size();
            assert!(total * grid.tiles_per_side() >= resolution);

            let mut covered = vec![false; resolution as usize];
            for tile in grid.tiles().iter().filter(|tile| tile.y == 0) {
                let (x0, _) = grid.canvas_origin(*tile);
                for px in x0..(x0 + total).min(resolution) {
                    covered[px as usize] = true;
                }
            }
            assert!(covered.iter().all(|hit| *hit), "resolution {resolution}");
        }
    }

    #[test]
    fn normalized_offsets_follow_grid() {
        let grid = TileGrid::plan(512, 0.2, 256).unwrap();
        assert_eq!(grid.normalized_tile_size(), 0.5);
        assert_eq!(grid.normalized_offset(Tile::new(1, 0)), [0.5, 0.0]);
        let expected = (0.5f32 + 0.5 * (10.0 / 256.0)).min(1.0);
        assert!((grid.bleed_factor() - expected).abs() < 1e-6);
    }

    #[test]
    fn bleed_factor_is_clamped_to_one() {
        let grid = TileGrid::plan(300, 1.0, 4096).unwrap();
        assert_eq!(grid.tiles_per_side(), 1);
        assert_eq!(grid.bleed_factor(), 1.0);
    }

    #[test]
    fn rejects_invalid_inputs() {
        assert_eq!(
            TileGrid::plan(0, 0.2, 256).unwrap_err(),
            SchedulerError::ZeroResolution
        );
        assert_eq!(
            TileGrid::plan(512, 1.5, 256).unwrap_err(),
            SchedulerError::BlurStrengthOutOfRange(1.5)
        );
        assert_eq!(
            TileGrid::plan(512, 0.2, 1).unwrap_err(),
            SchedulerError::MaxTileSizeTooSmall(1)
        );
    }

    #[test]
    fn oversized_grid_is_rejected_instead_of_overflowing() {
        // 200_000 / 2 = 100_000 tiles per side, 10^10 tiles in total.
        assert_eq!(
            TileGrid::plan(200_000, 0.0, 2).unwrap_err(),
            SchedulerError::TooManyTiles {
                tiles_per_side: 100_000
            }
        );
        // 4097 tiles per side is one row past the limit.
        assert_eq!(
            TileGrid::plan(8194, 0.0, 2).unwrap_err(),
            SchedulerError::TooManyTiles {
                tiles_per_side: 4097
            }
        );

        let mut scheduler = TileScheduler::new(512, 0.2, 256).unwrap();
        assert!(matches!(
            scheduler.recompute(200_000),
            Err(SchedulerError::TooManyTiles { .. })
        ));
        assert_eq!(scheduler.grid().resolution(), 512);
    }

    #[test]
    fn recompute_replaces_grid_and_keeps_old_one_on_error() {
        let mut scheduler = TileScheduler::new(512, 0.2, 256).unwrap();
        let before = scheduler.grid().clone();

        assert!(scheduler.recompute(0).is_err());
        assert_eq!(scheduler.grid(), &before);

        let grid = scheduler.recompute(1024).unwrap().clone();
        assert_eq!(grid.resolution(), 1024);
        assert_eq!(scheduler.grid(), &grid);
        assert_ne!(scheduler.grid(), &before);
        assert_eq!(scheduler.tile_count(), grid.tiles().len());
    }
}
