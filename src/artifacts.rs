// Artifact persistence: evidence snapshots for flagged images and the
// dataset-export utilities used to prepare training material. Everything here
// is a side effect at the edge of the engine; the deterministic naming scheme
// (`chunk-<imageIndex>-<col>-<row>.<ext>`, `image-<index>-<kind>.<ext>`) is
// the only contract.

use crate::core_modules::preprocess::{preprocess_image, preprocess_mask};
use crate::core_modules::relevance::tile_is_relevant;
use crate::core_modules::tile::tile::Tile;
use crate::core_modules::tiler::split_into_tiles;
use crate::error::InspectError;
use crate::pipeline::{PipelineConfig, difference_tiles_for_file};
use image::{DynamicImage, GrayImage};
use std::fs;
use std::path::{Path, PathBuf};

/// Writes tiles and whole-image snapshots under a fixed output directory.
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    /// Creates the output directory if needed.
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Result<Self, InspectError> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    /// The path a tile is saved under: `chunk-<imageIndex>-<col>-<row>.<ext>`.
    pub fn tile_path(&self, image_index: usize, col: u32, row: u32, extension: &str) -> PathBuf {
        self.output_dir
            .join(format!("chunk-{image_index}-{col}-{row}.{extension}"))
    }

    /// Saves one tile under the deterministic tile naming scheme.
    pub fn save_tile(
        &self,
        tile: &Tile,
        image_index: usize,
        extension: &str,
    ) -> Result<PathBuf, InspectError> {
        let path = self.tile_path(image_index, tile.col, tile.row, extension);
        tile.to_image()
            .save(&path)
            .map_err(|source| InspectError::Format {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Saves a whole-image snapshot: `image-<index>-<kind>.<ext>`.
    pub fn save_snapshot(
        &self,
        image: &DynamicImage,
        image_index: usize,
        kind: &str,
        extension: &str,
    ) -> Result<PathBuf, InspectError> {
        let path = self
            .output_dir
            .join(format!("image-{image_index}-{kind}.{extension}"));
        image.save(&path).map_err(|source| InspectError::Format {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Grayscale variant of `save_snapshot`, for preprocessed images.
    pub fn save_gray_snapshot(
        &self,
        image: &GrayImage,
        image_index: usize,
        kind: &str,
        extension: &str,
    ) -> Result<PathBuf, InspectError> {
        let path = self
            .output_dir
            .join(format!("image-{image_index}-{kind}.{extension}"));
        image.save(&path).map_err(|source| InspectError::Format {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(wanted))
}

/// Exports the relevant tiles of every image in `input_dir` to `output_dir`.
///
/// Source photos (`.jpg`) are preprocessed and tiled; masks (`.png`) are
/// binarized and tiled. Tiles the relevance filter rejects are skipped.
/// Returns the number of tile files written.
pub fn export_tiles(
    input_dir: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
) -> Result<usize, InspectError> {
    log::info!(
        "exporting tiles from {} to {}",
        input_dir.display(),
        output_dir.display()
    );
    let writer = ArtifactWriter::new(output_dir)?;

    let mut written = 0usize;
    let mut image_index = 0usize;
    for path in sorted_entries(input_dir)? {
        let (canonical, extension) = if has_extension(&path, "png") {
            let mask = open_image(&path)?;
            (preprocess_mask(&mask, config.mask_threshold), "png")
        } else if has_extension(&path, "jpg") || has_extension(&path, "jpeg") {
            let image = open_image(&path)?;
            (preprocess_image(&image, config.image_threshold), "jpg")
        } else {
            continue;
        };

        image_index += 1;
        let tiles = split_into_tiles(&canonical, config.tile_width, config.tile_height)?;
        for tile in &tiles {
            if tile_is_relevant(tile, config.relevance_threshold) {
                writer.save_tile(tile, image_index, extension)?;
                written += 1;
            }
        }
    }

    log::info!("tile export finished, {written} tiles written");
    Ok(written)
}

/// Exports the relevant difference tiles of every (source, mask) pair in
/// `input_dir` to `output_dir`. With `also_export_tiles`, the raw tiles are
/// additionally exported to a `chunks` subdirectory of `input_dir`.
/// Returns the number of difference-tile files written.
pub fn export_difference_tiles(
    input_dir: &Path,
    output_dir: &Path,
    also_export_tiles: bool,
    config: &PipelineConfig,
) -> Result<usize, InspectError> {
    log::info!(
        "exporting difference tiles from {} to {}",
        input_dir.display(),
        output_dir.display()
    );
    if also_export_tiles {
        export_tiles(input_dir, &input_dir.join("chunks"), config)?;
    }

    let writer = ArtifactWriter::new(output_dir)?;

    let mut written = 0usize;
    let mut image_index = 0usize;
    for path in sorted_entries(input_dir)? {
        if !(has_extension(&path, "jpg") || has_extension(&path, "jpeg")) {
            continue;
        }

        image_index += 1;
        let diff_tiles = difference_tiles_for_file(&path, config)?;
        for tile in &diff_tiles {
            if tile_is_relevant(tile, config.relevance_threshold) {
                writer.save_tile(tile, image_index, "jpg")?;
                written += 1;
            }
        }
    }

    log::info!("difference-tile export finished, {written} tiles written");
    Ok(written)
}

fn open_image(path: &Path) -> Result<DynamicImage, InspectError> {
    image::open(path).map_err(|source| InspectError::Format {
        path: path.to_path_buf(),
        source,
    })
}

/// Plain files of `dir`, sorted for deterministic image indexing.
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, InspectError> {
    if !dir.is_dir() {
        return Err(InspectError::NotFound(dir.to_path_buf()));
    }
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::preprocess::{CANONICAL_HEIGHT, CANONICAL_WIDTH};
    use image::{GrayImage, Luma};
    use tempfile::tempdir;

    #[test]
    fn tile_naming_encodes_grid_position() {
        let dir = tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path()).unwrap();
        let tile = Tile::new(4, 17, 8, 8, vec![0; 64]);

        let path = writer.save_tile(&tile, 3, "png").unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "chunk-3-4-17.png"
        );
        assert!(path.is_file());
    }

    #[test]
    fn snapshot_naming_encodes_index_and_kind() {
        let dir = tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path()).unwrap();
        let gray = GrayImage::from_pixel(16, 16, Luma([128]));

        let path = writer
            .save_gray_snapshot(&gray, 2, "elab-mask", "png")
            .unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "image-2-elab-mask.png"
        );
        assert!(path.is_file());
    }

    #[test]
    fn mask_export_writes_only_relevant_tiles() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();

        // All-background mask except one tile-sized highlighted region at
        // grid position (5, 4).
        let mut mask = GrayImage::from_pixel(CANONICAL_WIDTH, CANONICAL_HEIGHT, Luma([255]));
        for y in (4 * 36)..(5 * 36) {
            for x in (5 * 64)..(6 * 64) {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        mask.save(input.path().join("sample.png")).unwrap();

        let written = export_tiles(
            input.path(),
            output.path(),
            &PipelineConfig::default(),
        )
        .unwrap();

        assert_eq!(written, 1);
        assert!(output.path().join("chunk-1-5-4.png").is_file());
    }

    #[test]
    fn missing_input_dir_is_not_found() {
        let output = tempdir().unwrap();
        let result = export_tiles(
            Path::new("/definitely/not/here"),
            output.path(),
            &PipelineConfig::default(),
        );
        assert!(matches!(result, Err(InspectError::NotFound(_))));
    }
}
