use image::{Rgba, RgbaImage};
use renderer::canvas;
use renderer::{CropCommand, Cropper, TileGrid};

fn colour_for(index: usize) -> Rgba<u8> {
    Rgba([(index * 40) as u8 + 20, 255 - (index * 30) as u8, 7, 255])
}

#[test]
fn packed_output_tiles_every_interior_once() {
    // Reference layout: padding 10, tile 246, stride 256, 2x2 tiles.
    let grid = TileGrid::plan(512, 0.2, 256).unwrap();
    assert_eq!(grid.padding(), 10);
    assert_eq!(grid.tile_size(), 246);

    let mut stitched = canvas::blank_canvas(grid.resolution());
    let mut cropper = Cropper::new();
    for (index, tile) in grid.tiles().iter().enumerate() {
        let total = grid.total_tile_size();
        let rendered = RgbaImage::from_pixel(total, total, colour_for(index));
        let (x, y) = grid.canvas_origin(*tile);
        canvas::composite(&mut stitched, &rendered, x, y);
        cropper.enqueue(CropCommand::new(*tile, grid.tile_size(), grid.padding()));
    }

    let packed = cropper.stitch(&stitched, grid.resolution());
    assert_eq!(packed.dimensions(), (492, 492));
    for (index, tile) in grid.tiles().iter().enumerate() {
        let x0 = tile.x * grid.tile_size();
        let y0 = tile.y * grid.tile_size();
        for (x, y) in [(x0, y0), (x0 + 245, y0 + 245), (x0 + 123, y0 + 7)] {
            assert_eq!(*packed.get_pixel(x, y), colour_for(index), "tile {tile:?}");
        }
    }
}

#[test]
fn crop_outline_stays_inside_padded_tile() {
    let grid = TileGrid::plan(512, 0.2, 256).unwrap();
    let command = CropCommand::new(grid.tiles()[0], grid.tile_size(), grid.padding());
    let (x, y) = command.source_origin();
    let (ox, oy) = grid.canvas_origin(command.tile);
    let total = grid.total_tile_size();
    assert!(x >= ox && x + command.tile_size <= ox + total);
    assert!(y >= oy && y + command.tile_size <= oy + total);
}
