// THEORY:
// The `tiler` performs the crucial first transformation of a canonical image
// into a spatially organized sequence of `Tile`s. This slicing operation is
// the bridge between raw image data and the engine's tile-based analysis
// paradigm.
//
// Key architectural principles:
// 1.  **Exact Partition**: The grid must cover the image exactly — no partial
//     tiles at the edges. The caller is responsible for preprocessing images
//     to a resolution the tile size divides; the tiler enforces that
//     precondition and refuses anything else.
// 2.  **Deterministic Ordering**: Tiles are produced in row-major order,
//     left-to-right then top-to-bottom, zero-based. Every later stage (the
//     differencer's index pairing, artifact naming, verdict reporting) leans
//     on this ordering being stable.
// 3.  **Stateless Utility**: Pure function of its input. No side effects, no
//     retained state between calls.

use crate::core_modules::tile::tile::Tile;
use crate::error::InspectError;
use image::GrayImage;

/// The shape of a tile grid: (columns, rows).
pub type GridShape = (u32, u32);

/// Computes the grid shape a canonical image yields for a given tile size,
/// verifying that the tile size partitions the image exactly.
pub fn grid_shape(
    image_width: u32,
    image_height: u32,
    tile_width: u32,
    tile_height: u32,
) -> Result<GridShape, InspectError> {
    if tile_width == 0 || tile_height == 0 {
        return Err(InspectError::Geometry(format!(
            "tile size {tile_width}x{tile_height} must be non-zero"
        )));
    }
    if image_width % tile_width != 0 || image_height % tile_height != 0 {
        return Err(InspectError::Geometry(format!(
            "image {image_width}x{image_height} is not an exact multiple of the \
             {tile_width}x{tile_height} tile size"
        )));
    }
    Ok((image_width / tile_width, image_height / tile_height))
}

/// Partitions a canonical image into a row-major sequence of tiles, one per
/// grid cell, each of exact size `tile_width` x `tile_height`.
pub fn split_into_tiles(
    image: &GrayImage,
    tile_width: u32,
    tile_height: u32,
) -> Result<Vec<Tile>, InspectError> {
    let (image_width, image_height) = image.dimensions();
    let (columns, rows) = grid_shape(image_width, image_height, tile_width, tile_height)?;

    let buffer = image.as_raw();
    let mut tiles = Vec::with_capacity((columns * rows) as usize);

    for tile_index in 0..columns * rows {
        let row = tile_index / columns;
        let col = tile_index % columns;
        let start_pixel_x = col * tile_width;
        let start_pixel_y = row * tile_height;

        // Copy the tile's rows out of the flat image buffer.
        let mut pixels = Vec::with_capacity((tile_width * tile_height) as usize);
        for y_offset in 0..tile_height {
            let row_start = ((start_pixel_y + y_offset) * image_width + start_pixel_x) as usize;
            pixels.extend_from_slice(&buffer[row_start..row_start + tile_width as usize]);
        }

        tiles.push(Tile::new(col, row, tile_width, tile_height, pixels));
    }

    Ok(tiles)
}
