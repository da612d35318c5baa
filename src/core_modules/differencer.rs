// THEORY:
// The `differencer` combines a source tile and its mask tile into a single
// difference tile: the source content restricted to the region the mask
// highlights, with everything else flattened to background white.
//
// With masks binarized to highlighted=0 / background=255, the restriction is a
// per-pixel `max`: wherever the mask is background (255) the result saturates
// to white, wherever the mask is highlighted (0) the source value wins. An
// all-background difference tile is therefore pure white, which is exactly
// what the relevance filter later discards.

use crate::core_modules::preprocess::BACKGROUND;
use crate::core_modules::tile::tile::Tile;
use crate::error::InspectError;

/// Produces one difference tile per (source, mask) tile pair, preserving tile
/// ordering and count.
///
/// Fails with `ShapeMismatch` when the two sequences disagree about length,
/// and with `Geometry` when paired tiles disagree about their size.
pub fn difference_tiles(
    image_tiles: &[Tile],
    mask_tiles: &[Tile],
) -> Result<Vec<Tile>, InspectError> {
    if image_tiles.len() != mask_tiles.len() {
        return Err(InspectError::ShapeMismatch {
            image_tiles: image_tiles.len(),
            mask_tiles: mask_tiles.len(),
        });
    }

    image_tiles
        .iter()
        .zip(mask_tiles)
        .map(|(image_tile, mask_tile)| difference_tile(image_tile, mask_tile))
        .collect()
}

fn difference_tile(image_tile: &Tile, mask_tile: &Tile) -> Result<Tile, InspectError> {
    if (image_tile.width, image_tile.height) != (mask_tile.width, mask_tile.height) {
        return Err(InspectError::Geometry(format!(
            "tile ({}, {}) is {}x{} in the image but {}x{} in the mask",
            image_tile.col,
            image_tile.row,
            image_tile.width,
            image_tile.height,
            mask_tile.width,
            mask_tile.height
        )));
    }

    let pixels = image_tile
        .pixels
        .iter()
        .zip(&mask_tile.pixels)
        .map(|(&source, &mask)| source.max(mask))
        .collect();

    Ok(Tile::new(
        image_tile.col,
        image_tile.row,
        image_tile.width,
        image_tile.height,
        pixels,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(col: u32, row: u32, pixels: Vec<u8>) -> Tile {
        Tile::new(col, row, 2, 2, pixels)
    }

    #[test]
    fn unequal_lengths_are_a_shape_mismatch() {
        let image_tiles = vec![tile(0, 0, vec![0; 4]), tile(1, 0, vec![0; 4])];
        let mask_tiles = vec![tile(0, 0, vec![0; 4])];
        let result = difference_tiles(&image_tiles, &mask_tiles);
        assert!(matches!(
            result,
            Err(InspectError::ShapeMismatch {
                image_tiles: 2,
                mask_tiles: 1
            })
        ));
    }

    #[test]
    fn output_length_matches_input_length() {
        let image_tiles: Vec<Tile> = (0..8).map(|i| tile(i, 0, vec![50; 4])).collect();
        let mask_tiles: Vec<Tile> = (0..8).map(|i| tile(i, 0, vec![0; 4])).collect();
        let diffs = difference_tiles(&image_tiles, &mask_tiles).unwrap();
        assert_eq!(diffs.len(), image_tiles.len());
    }

    #[test]
    fn highlighted_mask_keeps_source_and_background_blanks_it() {
        // Mask highlights the left column (0) and backgrounds the right (255).
        let image_tiles = vec![tile(0, 0, vec![10, 20, 30, 40])];
        let mask_tiles = vec![tile(0, 0, vec![0, 255, 0, 255])];
        let diffs = difference_tiles(&image_tiles, &mask_tiles).unwrap();
        assert_eq!(diffs[0].pixels, vec![10, BACKGROUND, 30, BACKGROUND]);
    }

    #[test]
    fn difference_preserves_grid_positions() {
        let image_tiles = vec![tile(7, 3, vec![1, 2, 3, 4])];
        let mask_tiles = vec![tile(7, 3, vec![0; 4])];
        let diffs = difference_tiles(&image_tiles, &mask_tiles).unwrap();
        assert_eq!((diffs[0].col, diffs[0].row), (7, 3));
    }

    #[test]
    fn mismatched_tile_sizes_are_a_geometry_error() {
        let image_tiles = vec![Tile::new(0, 0, 2, 2, vec![0; 4])];
        let mask_tiles = vec![Tile::new(0, 0, 4, 1, vec![0; 4])];
        assert!(matches!(
            difference_tiles(&image_tiles, &mask_tiles),
            Err(InspectError::Geometry(_))
        ));
    }
}
