// THEORY:
// The `pipeline` module is the top-level per-image API for the inspection
// engine. It encapsulates the full stack — preprocessing, tiling,
// differencing, relevance gating, classification — into a single, easy-to-use
// interface that takes a source image path and returns a high-level,
// actionable report about defects.

use crate::artifacts::ArtifactWriter;
use crate::core_modules::classifier::{ClassScores, Classifier, flatten_tile};
use crate::core_modules::differencer::difference_tiles;
use crate::core_modules::preprocess::{preprocess_image, preprocess_mask};
use crate::core_modules::relevance::tile_is_relevant;
use crate::core_modules::tile::tile::Tile;
use crate::core_modules::tiler::split_into_tiles;
use crate::error::InspectError;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration for the `InspectionPipeline`, allowing for tunable behavior.
///
/// The defaults are the calibrated values the shipped network was trained
/// against; the thresholds in particular are dataset-specific and are not
/// assumed to generalize.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The width of a grid tile in pixels.
    pub tile_width: u32,
    /// The height of a grid tile in pixels.
    pub tile_height: u32,
    /// Luma cutoff above which a source pixel counts as background noise.
    pub image_threshold: u8,
    /// Luma cutoff for binarizing masks; lower than `image_threshold` because
    /// masks are synthetic high-contrast images, not photographs.
    pub mask_threshold: u8,
    /// Mean-intensity cutoff for the relevance filter (near-white).
    pub relevance_threshold: f64,
    /// A tile whose probability-OK score falls below this is flagged Not-OK.
    pub decision_threshold: f32,
    /// Stop scanning an image at the first flagged tile (fast short-circuit)
    /// instead of enumerating every flagged tile (exhaustive policy).
    pub break_on_first_error: bool,
    /// Skip classification of tiles the relevance filter rejects.
    pub gate_on_relevance: bool,
    /// Persist every flagged difference tile of a flagged image.
    pub save_wrong_tiles: bool,
    /// Persist original + preprocessed snapshots of a flagged image.
    pub save_wrong_images: bool,
    /// Where artifact side effects are written.
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tile_width: 64,
            tile_height: 36,
            image_threshold: 240,
            mask_threshold: 210,
            relevance_threshold: 250.0,
            decision_threshold: 0.7,
            break_on_first_error: true,
            gate_on_relevance: false,
            save_wrong_tiles: false,
            save_wrong_images: true,
            output_dir: PathBuf::from("output"),
        }
    }
}

/// The verdict for a single flagged tile, carrying its structured grid
/// position alongside the raw class scores.
#[derive(Debug, Clone, PartialEq)]
pub struct TileVerdict {
    pub col: u32,
    pub row: u32,
    pub prob_ok: f32,
    pub prob_not_ok: f32,
}

/// The detailed data package for a flagged image.
#[derive(Debug, Clone, PartialEq)]
pub struct DefectData {
    /// Every tile flagged Not-OK, in scan order. Under the short-circuit
    /// policy this holds exactly the first flagged tile.
    pub flagged_tiles: Vec<TileVerdict>,
    /// How many tiles were actually classified before the scan ended.
    pub tiles_scanned: usize,
}

/// The primary output of the inspection pipeline for a single image.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// No tile was flagged: the image is OK.
    Clean,
    /// At least one tile was flagged Not-OK.
    Flagged(DefectData),
}

impl Report {
    pub fn is_flagged(&self) -> bool {
        matches!(self, Report::Flagged(_))
    }
}

/// The companion mask path for a source image: same name, `.png` extension.
pub fn mask_path_for(image_path: &Path) -> PathBuf {
    image_path.with_extension("png")
}

/// Loads a source image and its companion mask, surfacing missing files as
/// `NotFound` and undecodable ones as `Format`.
pub fn load_image_and_mask(
    image_path: &Path,
) -> Result<(DynamicImage, DynamicImage), InspectError> {
    let mask_path = mask_path_for(image_path);
    if !image_path.is_file() {
        return Err(InspectError::NotFound(image_path.to_path_buf()));
    }
    if !mask_path.is_file() {
        return Err(InspectError::NotFound(mask_path));
    }

    let image = open_image(image_path)?;
    let mask = open_image(&mask_path)?;
    Ok((image, mask))
}

fn open_image(path: &Path) -> Result<DynamicImage, InspectError> {
    image::open(path).map_err(|source| InspectError::Format {
        path: path.to_path_buf(),
        source,
    })
}

/// Preprocesses a (source, mask) pair and reduces it to difference tiles.
///
/// The geometry precondition is checked up front: the raw source and mask
/// must agree about their resolution before either is canonicalized, so a
/// mismatched pair never reaches the differencer.
pub fn difference_tiles_for_pair(
    image: &DynamicImage,
    mask: &DynamicImage,
    config: &PipelineConfig,
) -> Result<Vec<Tile>, InspectError> {
    if (image.width(), image.height()) != (mask.width(), mask.height()) {
        return Err(InspectError::Geometry(format!(
            "source is {}x{} but mask is {}x{}",
            image.width(),
            image.height(),
            mask.width(),
            mask.height()
        )));
    }

    let canonical_image = preprocess_image(image, config.image_threshold);
    let canonical_mask = preprocess_mask(mask, config.mask_threshold);

    let image_tiles = split_into_tiles(&canonical_image, config.tile_width, config.tile_height)?;
    let mask_tiles = split_into_tiles(&canonical_mask, config.tile_width, config.tile_height)?;

    difference_tiles(&image_tiles, &mask_tiles)
}

/// File-path convenience over `difference_tiles_for_pair`.
pub fn difference_tiles_for_file(
    image_path: &Path,
    config: &PipelineConfig,
) -> Result<Vec<Tile>, InspectError> {
    let (image, mask) = load_image_and_mask(image_path)?;
    difference_tiles_for_pair(&image, &mask, config)
}

/// The main, top-level struct for the per-image inspection flow.
pub struct InspectionPipeline {
    config: PipelineConfig,
    classifier: Arc<dyn Classifier>,
}

impl InspectionPipeline {
    pub fn new(config: PipelineConfig, classifier: Arc<dyn Classifier>) -> Self {
        Self { config, classifier }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Flattens one difference tile and runs the classifier over it.
    pub fn classify_tile(&self, tile: &Tile) -> Result<ClassScores, InspectError> {
        self.classifier.activate(&flatten_tile(tile))
    }

    /// Scans difference tiles into a per-image report.
    ///
    /// The scan starts out `Scanning`, moves to `Flagged` at the first tile
    /// whose probability-OK score falls below the decision threshold, and
    /// ends `Clean` if no tile ever does. Under `break_on_first_error` the
    /// scan stops at that first flagged tile; otherwise every flagged tile is
    /// enumerated.
    pub fn scan_tiles(&self, tiles: &[Tile]) -> Result<Report, InspectError> {
        let mut flagged_tiles = Vec::new();
        let mut tiles_scanned = 0usize;

        for tile in tiles {
            if self.config.gate_on_relevance
                && !tile_is_relevant(tile, self.config.relevance_threshold)
            {
                continue;
            }

            tiles_scanned += 1;
            let (prob_ok, prob_not_ok) = self.classify_tile(tile)?;
            if prob_ok < self.config.decision_threshold {
                flagged_tiles.push(TileVerdict {
                    col: tile.col,
                    row: tile.row,
                    prob_ok,
                    prob_not_ok,
                });
                if self.config.break_on_first_error {
                    break;
                }
            }
        }

        if flagged_tiles.is_empty() {
            Ok(Report::Clean)
        } else {
            Ok(Report::Flagged(DefectData {
                flagged_tiles,
                tiles_scanned,
            }))
        }
    }

    /// The full per-image flow: load, difference, scan, and — when the image
    /// is flagged and the config asks for evidence — persist artifacts.
    ///
    /// `image_index` identifies the image within its batch and only feeds the
    /// deterministic artifact naming scheme.
    pub fn inspect_image(
        &self,
        image_path: &Path,
        image_index: usize,
    ) -> Result<Report, InspectError> {
        let (image, mask) = load_image_and_mask(image_path)?;
        let diff_tiles = difference_tiles_for_pair(&image, &mask, &self.config)?;
        let report = self.scan_tiles(&diff_tiles)?;

        if let Report::Flagged(data) = &report {
            let file_name = image_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| image_path.display().to_string());
            for verdict in &data.flagged_tiles {
                log::info!(
                    "estimated defect on {} at tile ({}, {}). probability OK/KO: {:.3}/{:.3}",
                    file_name,
                    verdict.col,
                    verdict.row,
                    verdict.prob_ok,
                    verdict.prob_not_ok
                );
            }
            self.persist_evidence(&image, &mask, &diff_tiles, data, image_index)?;
        }

        Ok(report)
    }

    fn persist_evidence(
        &self,
        image: &DynamicImage,
        mask: &DynamicImage,
        diff_tiles: &[Tile],
        data: &DefectData,
        image_index: usize,
    ) -> Result<(), InspectError> {
        if !self.config.save_wrong_tiles && !self.config.save_wrong_images {
            return Ok(());
        }
        let writer = ArtifactWriter::new(&self.config.output_dir)?;

        if self.config.save_wrong_tiles {
            for verdict in &data.flagged_tiles {
                if let Some(tile) = diff_tiles
                    .iter()
                    .find(|t| t.col == verdict.col && t.row == verdict.row)
                {
                    writer.save_tile(tile, image_index, "jpg")?;
                }
            }
        }

        if self.config.save_wrong_images {
            writer.save_snapshot(image, image_index, "original-image", "jpg")?;
            writer.save_snapshot(mask, image_index, "original-mask", "png")?;
            let elab_image = preprocess_image(image, self.config.image_threshold);
            let elab_mask = preprocess_mask(mask, self.config.mask_threshold);
            writer.save_gray_snapshot(&elab_image, image_index, "elab-image", "jpg")?;
            writer.save_gray_snapshot(&elab_mask, image_index, "elab-mask", "png")?;
        }

        Ok(())
    }
}
