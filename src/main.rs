use clap::{ArgGroup, Parser};
use defect_vision::artifacts::{export_difference_tiles, export_tiles};
use defect_vision::core_modules::classifier::FeedForwardNetwork;
use defect_vision::parallel_pipeline::BatchRunner;
use defect_vision::pipeline::{InspectionPipeline, PipelineConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Grid-tiling defect inspection over photographed parts and their masks.
#[derive(Parser)]
#[command(
    version,
    about,
    group(ArgGroup::new("action").required(true).args(["check", "save_chunks", "save_diffs"]))
)]
struct Cli {
    /// Batch-classify every source image under this folder (recursive).
    #[arg(short = 'c', long = "check", value_name = "FOLDER")]
    check: Option<PathBuf>,

    /// Export the relevant tiles of every image in <IN> to <OUT>.
    #[arg(long = "save-chunks", num_args = 2, value_names = ["IN", "OUT"])]
    save_chunks: Option<Vec<PathBuf>>,

    /// Export the relevant difference tiles of every image/mask pair in <IN>
    /// to <OUT>.
    #[arg(long = "save-diffs", num_args = 2, value_names = ["IN", "OUT"])]
    save_diffs: Option<Vec<PathBuf>>,

    /// Also export the raw tiles when exporting difference tiles.
    #[arg(long, requires = "save_diffs")]
    with_chunks: bool,

    /// Serialized feed-forward network definition.
    #[arg(long, value_name = "FILE", default_value = "network.json")]
    network: PathBuf,

    /// Directory for evidence artifacts of flagged images.
    #[arg(long, value_name = "DIR", default_value = "output")]
    output: PathBuf,

    /// Enumerate every flagged tile instead of stopping at the first.
    #[arg(long)]
    exhaustive: bool,

    /// Persist the flagged difference tiles of flagged images.
    #[arg(long)]
    save_wrong_tiles: bool,

    /// Do not persist snapshots of flagged images.
    #[arg(long)]
    no_save_wrong_images: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = PipelineConfig {
        break_on_first_error: !cli.exhaustive,
        save_wrong_tiles: cli.save_wrong_tiles,
        save_wrong_images: !cli.no_save_wrong_images,
        output_dir: cli.output.clone(),
        ..PipelineConfig::default()
    };

    if let Some(paths) = &cli.save_chunks {
        return match export_tiles(&paths[0], &paths[1], &config) {
            Ok(written) => {
                println!("{written} tiles written to {}", paths[1].display());
                ExitCode::SUCCESS
            }
            Err(error) => {
                log::error!("tile export failed: {error}");
                ExitCode::FAILURE
            }
        };
    }

    if let Some(paths) = &cli.save_diffs {
        return match export_difference_tiles(&paths[0], &paths[1], cli.with_chunks, &config) {
            Ok(written) => {
                println!("{written} difference tiles written to {}", paths[1].display());
                ExitCode::SUCCESS
            }
            Err(error) => {
                log::error!("difference-tile export failed: {error}");
                ExitCode::FAILURE
            }
        };
    }

    // clap's required action group guarantees --check is present here.
    let folder = cli.check.expect("action group enforces a command");

    let network = match FeedForwardNetwork::from_file(&cli.network) {
        Ok(network) => network,
        Err(error) => {
            log::error!("cannot load network {}: {error}", cli.network.display());
            return ExitCode::FAILURE;
        }
    };

    let pipeline = Arc::new(InspectionPipeline::new(config, Arc::new(network)));
    match BatchRunner::new(pipeline).run(&folder).await {
        Ok(summary) => {
            println!(
                "{} images processed, {} flagged, {} skipped",
                summary.images_processed, summary.images_flagged, summary.images_skipped
            );
            for (path, flagged_tiles) in &summary.flagged {
                println!("  {} ({} flagged tiles)", path.display(), flagged_tiles);
            }
            ExitCode::SUCCESS
        }
        Err(error) => {
            log::error!("batch failed: {error}");
            ExitCode::FAILURE
        }
    }
}
