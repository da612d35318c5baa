use crate::error::InspectError;
use crate::pipeline::{InspectionPipeline, Report};
use futures::future::join_all;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// One unit of batch work: a source image plus its position in the batch.
struct ImageTask {
    image_index: usize,
    path: PathBuf,
    result_sender: oneshot::Sender<(PathBuf, Result<Report, InspectError>)>,
}

/// Aggregated outcome of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    /// Images that completed the pipeline (clean or flagged).
    pub images_processed: usize,
    /// Images flagged with at least one Not-OK tile.
    pub images_flagged: usize,
    /// Images skipped because of a recoverable per-image error.
    pub images_skipped: usize,
    /// Every flagged image with its flagged-tile count, in no particular order.
    pub flagged: Vec<(PathBuf, usize)>,
}

/// Runs the inspection pipeline over every source image under a folder using
/// a pool of independent workers.
///
/// Images are embarrassingly parallel: each unit of work is stateless with
/// respect to the others, and the only shared resource is the loaded
/// classifier, which workers share read-only through the pipeline `Arc`.
/// No cross-image ordering is guaranteed.
pub struct BatchRunner {
    pipeline: Arc<InspectionPipeline>,
    workers: usize,
}

impl BatchRunner {
    /// A runner sized to the machine's logical CPU count.
    pub fn new(pipeline: Arc<InspectionPipeline>) -> Self {
        Self::with_workers(pipeline, num_cpus::get().max(1))
    }

    pub fn with_workers(pipeline: Arc<InspectionPipeline>, workers: usize) -> Self {
        Self {
            pipeline,
            workers: workers.max(1),
        }
    }

    /// Recursively collects the source images (`.jpg`/`.jpeg`) under
    /// `folder`, sorted so batch indices are deterministic across runs.
    pub fn collect_source_images(folder: &Path) -> Result<Vec<PathBuf>, InspectError> {
        if !folder.is_dir() {
            return Err(InspectError::NotFound(folder.to_path_buf()));
        }

        let mut images = Vec::new();
        collect_into(folder, &mut images)?;
        images.sort();
        Ok(images)
    }

    /// Inspects every source image under `folder`.
    ///
    /// Recoverable per-image errors are logged and counted as skipped; a
    /// fatal error (classifier calibration bug) aborts the whole batch.
    pub async fn run(&self, folder: &Path) -> Result<BatchSummary, InspectError> {
        let images = Self::collect_source_images(folder)?;
        let policy = if self.pipeline.config().break_on_first_error {
            "short-circuit"
        } else {
            "exhaustive"
        };
        log::info!(
            "inspecting {} images under {} with {} workers ({} scan policy)",
            images.len(),
            folder.display(),
            self.workers,
            policy
        );

        // One channel per worker; tasks are dealt round-robin. Each worker
        // owns its receiver and reports back through the task's oneshot.
        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..self.workers)
            .map(|_| mpsc::unbounded_channel::<ImageTask>())
            .unzip();

        let mut worker_handles = Vec::with_capacity(self.workers);
        for mut receiver in worker_receivers {
            let pipeline = Arc::clone(&self.pipeline);
            worker_handles.push(tokio::spawn(async move {
                while let Some(task) = receiver.recv().await {
                    let result = pipeline.inspect_image(&task.path, task.image_index);
                    let _ = task.result_sender.send((task.path, result));
                }
            }));
        }

        let mut result_receivers = Vec::with_capacity(images.len());
        for (image_index, path) in images.into_iter().enumerate() {
            let (result_sender, result_receiver) = oneshot::channel();
            let task = ImageTask {
                // Batch indices are 1-based in artifact names.
                image_index: image_index + 1,
                path,
                result_sender,
            };
            let _ = worker_senders[image_index % self.workers].send(task);
            result_receivers.push(result_receiver);
        }
        // Dropping the senders lets the workers drain and exit.
        drop(worker_senders);

        let mut summary = BatchSummary::default();
        for outcome in join_all(result_receivers).await {
            let Ok((path, result)) = outcome else {
                continue;
            };
            match result {
                Ok(Report::Clean) => summary.images_processed += 1,
                Ok(Report::Flagged(data)) => {
                    summary.images_processed += 1;
                    summary.images_flagged += 1;
                    summary.flagged.push((path, data.flagged_tiles.len()));
                }
                Err(error) if error.is_fatal() => {
                    log::error!("aborting batch on {}: {error}", path.display());
                    return Err(error);
                }
                Err(error) => {
                    log::warn!("skipping {}: {error}", path.display());
                    summary.images_skipped += 1;
                }
            }
        }

        join_all(worker_handles).await;
        Ok(summary)
    }
}

fn collect_into(dir: &Path, images: &mut Vec<PathBuf>) -> Result<(), InspectError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_into(&path, images)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
        {
            images.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::classifier::{ClassScores, Classifier};
    use crate::core_modules::preprocess::{CANONICAL_HEIGHT, CANONICAL_WIDTH};
    use crate::pipeline::PipelineConfig;
    use image::{GrayImage, Luma};
    use tempfile::tempdir;

    struct ConstClassifier(f32, f32);

    impl Classifier for ConstClassifier {
        fn activate(&self, _features: &[f32]) -> Result<ClassScores, InspectError> {
            Ok((self.0, self.1))
        }
    }

    struct FatalClassifier;

    impl Classifier for FatalClassifier {
        fn activate(&self, features: &[f32]) -> Result<ClassScores, InspectError> {
            Err(InspectError::ClassifierInput {
                expected: 1,
                actual: features.len(),
            })
        }
    }

    fn write_pair(dir: &Path, stem: &str) {
        let image = GrayImage::from_pixel(CANONICAL_WIDTH, CANONICAL_HEIGHT, Luma([100]));
        image.save(dir.join(format!("{stem}.jpg"))).unwrap();
        let mask = GrayImage::from_pixel(CANONICAL_WIDTH, CANONICAL_HEIGHT, Luma([255]));
        mask.save(dir.join(format!("{stem}.png"))).unwrap();
    }

    fn test_pipeline(classifier: Arc<dyn Classifier>) -> Arc<InspectionPipeline> {
        let config = PipelineConfig {
            save_wrong_images: false,
            ..PipelineConfig::default()
        };
        Arc::new(InspectionPipeline::new(config, classifier))
    }

    #[test]
    fn collection_recurses_and_sorts() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.jpg"), b"x").unwrap();
        fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        fs::write(dir.path().join("nested/c.jpg"), b"x").unwrap();
        fs::write(dir.path().join("ignored.txt"), b"x").unwrap();
        fs::write(dir.path().join("mask.png"), b"x").unwrap();

        let images = BatchRunner::collect_source_images(dir.path()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.jpg"),
                PathBuf::from("b.jpg"),
                PathBuf::from("nested/c.jpg"),
            ]
        );
    }

    #[test]
    fn missing_folder_is_not_found() {
        let result = BatchRunner::collect_source_images(Path::new("/no/such/folder"));
        assert!(matches!(result, Err(InspectError::NotFound(_))));
    }

    #[tokio::test]
    async fn batch_counts_clean_and_flagged_images() {
        let dir = tempdir().unwrap();
        write_pair(dir.path(), "first");
        write_pair(dir.path(), "second");

        let runner = BatchRunner::with_workers(test_pipeline(Arc::new(ConstClassifier(0.5, 0.5))), 2);
        let summary = runner.run(dir.path()).await.unwrap();

        assert_eq!(summary.images_processed, 2);
        assert_eq!(summary.images_flagged, 2);
        assert_eq!(summary.images_skipped, 0);
        assert_eq!(summary.flagged.len(), 2);
    }

    #[tokio::test]
    async fn missing_mask_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        write_pair(dir.path(), "good");
        // A source image with no companion mask.
        let orphan = GrayImage::from_pixel(CANONICAL_WIDTH, CANONICAL_HEIGHT, Luma([100]));
        orphan.save(dir.path().join("orphan.jpg")).unwrap();

        let runner = BatchRunner::with_workers(test_pipeline(Arc::new(ConstClassifier(0.9, 0.1))), 2);
        let summary = runner.run(dir.path()).await.unwrap();

        assert_eq!(summary.images_processed, 1);
        assert_eq!(summary.images_flagged, 0);
        assert_eq!(summary.images_skipped, 1);
    }

    #[tokio::test]
    async fn calibration_bug_aborts_the_batch() {
        let dir = tempdir().unwrap();
        write_pair(dir.path(), "sample");

        let runner = BatchRunner::with_workers(test_pipeline(Arc::new(FatalClassifier)), 1);
        let result = runner.run(dir.path()).await;
        assert!(matches!(
            result,
            Err(InspectError::ClassifierInput { .. })
        ));
    }
}
