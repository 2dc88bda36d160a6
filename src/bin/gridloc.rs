//! gridloc - locate a robot on the floor grid from an overhead camera.
//!
//! Subcommands:
//! - `serve`: subscribe to the camera feed and answer JSON tool calls, one per
//!   line, on stdin/stdout
//! - `locate`: map a normalized bounding box to a grid cell
//! - `detect`: run the detection service on an image file and locate the result
//! - `grid`: print the grid cell centroids

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use grid_locator::tools::{parse_box_values, BoxValue};
use grid_locator::{
    BoxDetector, FeedSubscriber, Frame, FrameStore, GridLocalizer, HttpDetector, LocateError,
    LocatorConfig, LocatorTools, ToolCall, ToolResponse,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Locate a robot on a floor grid from an overhead camera"
)]
struct Args {
    /// Path to a JSON or TOML config file.
    #[arg(long, global = true, env = "GRIDLOC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to the camera feed and serve tool calls on stdin/stdout.
    Serve {
        /// Print the tool descriptions as JSON and exit.
        #[arg(long)]
        describe: bool,
    },
    /// Map a normalized bounding box to a grid cell.
    Locate {
        /// Bounding box as xmin ymin xmax ymax.
        #[arg(required = true, num_args = 4, value_names = ["XMIN", "YMIN", "XMAX", "YMAX"], allow_negative_numbers = true)]
        bbox: Vec<String>,
    },
    /// Detect the robot in an image file and locate it.
    Detect {
        /// Image to send to the detection service.
        image: PathBuf,
        /// Skip cropping; the image is already the grid region.
        #[arg(long)]
        no_crop: bool,
    },
    /// Print the grid cell centroids.
    Grid,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(path) = &args.config {
        std::env::set_var("GRIDLOC_CONFIG", path);
    }
    let cfg = LocatorConfig::load()?;
    let localizer = Arc::new(GridLocalizer::new(cfg.grid)?);

    match args.command {
        Command::Serve { describe } => serve(&cfg, localizer, describe),
        Command::Locate { bbox } => {
            let values: Vec<BoxValue> = bbox.into_iter().map(BoxValue::Text).collect();
            let cell = localizer.locate_normalized(parse_box_values(&values)?)?;
            println!("{}", cell);
            Ok(())
        }
        Command::Detect { image, no_crop } => detect_file(&cfg, &localizer, &image, no_crop),
        Command::Grid => {
            for (index, centroid) in localizer.centroids().iter().enumerate() {
                println!(
                    "{} centroid=({}, {})",
                    localizer.cell_at(index),
                    centroid.x,
                    centroid.y
                );
            }
            Ok(())
        }
    }
}

fn serve(cfg: &LocatorConfig, localizer: Arc<GridLocalizer>, describe: bool) -> Result<()> {
    let store = FrameStore::spawn(cfg.crop);
    let subscriber = if describe {
        None
    } else {
        Some(FeedSubscriber::spawn(&cfg.feed, store.feed())?)
    };
    let mut tools = LocatorTools::new(store, HttpDetector::new(cfg.detector.clone()), localizer);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if describe {
        serde_json::to_writer_pretty(&mut out, &tools.describe())?;
        writeln!(out)?;
        return Ok(());
    }

    log::info!(
        "gridloc serving tool calls on stdin (detector: {})",
        cfg.detector.endpoint
    );
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let result = serde_json::from_str::<ToolCall>(trimmed)
            .map_err(|e| LocateError::InvalidCall(e.to_string()))
            .and_then(|call| tools.invoke(&call));
        if let Err(err) = &result {
            log::warn!("tool call failed: {}", err);
        }
        serde_json::to_writer(&mut out, &ToolResponse::from_result(result))?;
        writeln!(out)?;
        out.flush()?;
    }

    log::info!("stdin closed, shutting down");
    if let Some(mut subscriber) = subscriber {
        subscriber.stop();
    }
    Ok(())
}

fn detect_file(
    cfg: &LocatorConfig,
    localizer: &GridLocalizer,
    path: &Path,
    no_crop: bool,
) -> Result<()> {
    let image = image::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?
        .into_rgb8();
    let image = if no_crop {
        image
    } else {
        cfg.crop.apply(&image)?
    };
    let frame = Frame::from_image(image);
    let mut detector = HttpDetector::new(cfg.detector.clone());
    let bbox = detector.detect(&frame)?;
    let cell = localizer.locate_normalized(bbox)?;
    println!("bbox={:?} cell={}", bbox.to_array(), cell);
    Ok(())
}
