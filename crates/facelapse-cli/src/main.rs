use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use facelapse_core::catalog::{DateRange, PhotoCatalog};
use facelapse_core::encoder::FfmpegEncoder;
use facelapse_core::timelapse::{QualityTier, TimelapseAssembler, TimelapseRequest, DEFAULT_FRAME_RATE};
use facelapse_hw::Camera;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod live;
mod worker;

use config::Config;
use live::Session;

#[derive(Parser)]
#[command(name = "facelapse", about = "Daily face photos, consistently framed, assembled into a timelapse")]
struct Cli {
    /// Camera device (overrides FACELAPSE_CAMERA_DEVICE)
    #[arg(long, global = true)]
    device: Option<String>,
    /// Data directory for photos, videos and the reference profile
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Live positioning guide with interactive commands
    Live,
    /// Measure your face and store it as the distance reference
    Calibrate,
    /// Evaluate one frame and capture today's photo if positioned
    Capture,
    /// List photos, newest first
    List,
    /// Show capture statistics
    Stats,
    /// Delete a photo by file name
    Delete {
        /// File name inside the photo directory, e.g. face_31122024_235959.jpg
        file: String,
    },
    /// Assemble photos into a timelapse video
    Timelapse {
        /// First day, DD/MM/YYYY (requires --to)
        #[arg(long)]
        from: Option<String>,
        /// Last day, DD/MM/YYYY (requires --from)
        #[arg(long)]
        to: Option<String>,
        /// Frames per second
        #[arg(long, default_value_t = DEFAULT_FRAME_RATE)]
        fps: u32,
        /// Output quality: low, medium or high
        #[arg(long, default_value = "high")]
        quality: QualityTier,
    },
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(data_dir) = cli.data_dir {
        config = config.with_data_dir(data_dir);
    }
    if let Some(device) = cli.device {
        config.camera_device = device;
    }

    match cli.command {
        Commands::Live => {
            let session = Session::open(&config)?;
            let handle = worker::spawn_worker(assembler(&config))?;
            live::run(&config, session, handle).await?;
        }
        Commands::Calibrate => {
            let mut session = Session::open(&config)?;
            let profile = session.calibrate()?;
            println!("Reference face size set to {} px²", profile.face_area);
        }
        Commands::Capture => {
            let mut session = Session::open(&config)?;
            let verdict = *session.tick()?;
            println!("{verdict}");
            if session.reference().is_none() {
                println!("Tip: run `facelapse calibrate` to enable distance guidance");
            }
            let photo = session.capture()?;
            println!("Photo saved: {}", photo.path.display());
        }
        Commands::List => {
            let snapshot = PhotoCatalog::new(config.photos_dir()).snapshot()?;
            for photo in snapshot.newest_first() {
                println!(
                    "{}  {}",
                    photo.captured_at.format("%d/%m/%Y %H:%M:%S"),
                    photo.path.display()
                );
            }
            for path in snapshot.unparsed() {
                println!("??/??/????           {}", path.display());
            }
            if snapshot.photos().is_empty() && snapshot.unparsed().is_empty() {
                println!("No photos in {}", config.photos_dir().display());
            }
        }
        Commands::Stats => {
            let snapshot = PhotoCatalog::new(config.photos_dir()).snapshot()?;
            live::print_stats(&snapshot.stats());
            for (day, count) in snapshot.histogram() {
                println!("  {}  {count}", day.format("%d/%m/%Y"));
            }
        }
        Commands::Delete { file } => {
            let path = PhotoCatalog::new(config.photos_dir()).delete(&file)?;
            println!("Deleted {}", path.display());
        }
        Commands::Timelapse {
            from,
            to,
            fps,
            quality,
        } => {
            if fps == 0 {
                bail!("--fps must be positive");
            }
            let range = DateRange::from_inputs(from.as_deref(), to.as_deref())?;
            if range.is_none() {
                let snapshot = PhotoCatalog::new(config.photos_dir()).snapshot()?;
                if let Some(all) = snapshot.default_range() {
                    println!(
                        "No range given; using every photo ({} to {})",
                        all.from().format("%d/%m/%Y"),
                        all.to().format("%d/%m/%Y")
                    );
                }
            }
            let request = TimelapseRequest {
                range,
                frame_rate: fps,
                quality,
            };
            let handle = worker::spawn_worker(assembler(&config))?;
            println!("Creating timelapse ({quality})...");
            let artifact = handle.timelapse(request).await?;
            println!(
                "Timelapse saved: {} ({} photos, {} to {})",
                artifact.path.display(),
                artifact.frames,
                artifact.covered.from().format("%d/%m/%Y"),
                artifact.covered.to().format("%d/%m/%Y")
            );
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
    }

    Ok(())
}

fn assembler(config: &Config) -> TimelapseAssembler {
    TimelapseAssembler::new(
        PhotoCatalog::new(config.photos_dir()),
        config.videos_dir(),
        Box::new(FfmpegEncoder::new(config.ffmpeg.clone())),
    )
}
