// An all-background difference tile is pure white and carries no signal worth
// persisting or classifying. The relevance filter gates on mean intensity:
// anything whose mean sits above the near-white threshold is discarded.

use crate::core_modules::tile::tile::Tile;

/// Whether a tile carries enough signal to be worth keeping.
///
/// Returns `false` when the tile's mean luma strictly exceeds `threshold`
/// (typically all-background white). The rejection diagnostic is
/// observability only, not part of the contract.
pub fn tile_is_relevant(tile: &Tile, threshold: f64) -> bool {
    let mean = tile.mean_intensity();
    if mean > threshold {
        log::debug!(
            "mean at {mean:.2}, ignoring tile ({}, {})",
            tile.col,
            tile.row
        );
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_tile(value: u8) -> Tile {
        Tile::new(0, 0, 4, 4, vec![value; 16])
    }

    #[test]
    fn relevance_is_monotone_in_uniform_intensity() {
        // A uniform tile of intensity V is relevant exactly when V <= threshold.
        for value in [0u8, 100, 249, 250, 251, 255] {
            let expected = f64::from(value) <= 250.0;
            assert_eq!(
                tile_is_relevant(&uniform_tile(value), 250.0),
                expected,
                "uniform intensity {value} against threshold 250"
            );
        }
    }

    #[test]
    fn threshold_255_keeps_everything() {
        assert!(tile_is_relevant(&uniform_tile(255), 255.0));
    }
}
