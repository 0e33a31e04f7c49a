//! Camera session and the interactive live loop.

use crate::config::Config;
use crate::worker::{JobReply, WorkerHandle};
use anyhow::{Context, Result};
use chrono::Local;
use facelapse_core::capture::CaptureService;
use facelapse_core::catalog::{CatalogStats, DateRange, PhotoCatalog};
use facelapse_core::detector::{FaceLocator, ScrfdLocator};
use facelapse_core::normalize::{self, NormalizedFrame};
use facelapse_core::overlay;
use facelapse_core::profile::{Calibration, JsonProfileStore, ProfileStore};
use facelapse_core::timelapse::{AssemblyError, TimelapseArtifact, TimelapseRequest};
use facelapse_core::{CapturedPhoto, FaceBox, PositioningEvaluator, PositioningVerdict, ReferenceProfile};
use facelapse_hw::Camera;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot::error::RecvError;

/// Latest evaluated frame.
struct Observation {
    frame: NormalizedFrame,
    faces: Vec<FaceBox>,
    verdict: PositioningVerdict,
}

/// Camera, detector and reference profile wired together.
pub struct Session {
    camera: Camera,
    locator: ScrfdLocator,
    evaluator: PositioningEvaluator,
    store: JsonProfileStore,
    capture: CaptureService,
    last: Option<Observation>,
}

impl Session {
    /// Open the camera, load the detector and the stored reference profile.
    pub fn open(config: &Config) -> Result<Self> {
        let camera = Camera::open(&config.camera_device, config.mirror)
            .with_context(|| format!("cannot open camera {}", config.camera_device))?;
        tracing::info!(
            device = %config.camera_device,
            width = camera.width,
            height = camera.height,
            "camera opened"
        );

        let model_path = config.scrfd_model_path();
        let locator = ScrfdLocator::load(&model_path)?;

        let store = JsonProfileStore::new(&config.profile_path);
        let reference = match store.load() {
            Ok(reference) => reference,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable reference profile");
                None
            }
        };
        if reference.is_none() {
            tracing::info!("no reference profile; distance guidance disabled until calibration");
        }

        if config.warmup_frames > 0 {
            tracing::info!(count = config.warmup_frames, "discarding warmup frames");
            if let Err(e) = camera.warm_up(config.warmup_frames) {
                tracing::warn!(error = %e, "warmup failed");
            }
        }

        let capture = CaptureService::new(config.photos_dir())
            .with_capture_policy(config.capture_policy)
            .with_collision_policy(config.collision_policy);

        Ok(Self {
            camera,
            locator,
            evaluator: PositioningEvaluator::new(reference),
            store,
            capture,
            last: None,
        })
    }

    pub fn reference(&self) -> Option<ReferenceProfile> {
        self.evaluator.reference()
    }

    /// One pass of normalize → locate → evaluate. No file I/O.
    pub fn tick(&mut self) -> Result<&PositioningVerdict> {
        let frame = self.camera.capture_frame()?;
        let frame = normalize::normalize(frame.image)?;
        let faces = self.locator.locate(frame.image())?;
        let verdict = self.evaluator.evaluate(frame.width(), frame.height(), &faces);
        tracing::debug!(faces = faces.len(), verdict = %verdict, "tick");

        let observation = self.last.insert(Observation {
            frame,
            faces,
            verdict,
        });
        Ok(&observation.verdict)
    }

    pub fn last_verdict(&self) -> PositioningVerdict {
        self.last
            .as_ref()
            .map(|o| o.verdict)
            .unwrap_or(PositioningVerdict::NoFace)
    }

    /// Capture a fresh frame, gated on the most recent verdict.
    pub fn capture(&mut self) -> Result<CapturedPhoto> {
        let verdict = self.last_verdict();
        let frame = self.camera.capture_frame()?;
        Ok(self
            .capture
            .capture(frame.image, &verdict, Local::now().naive_local())?)
    }

    /// Measure the visible face on a fresh frame and make it the reference.
    pub fn calibrate(&mut self) -> Result<ReferenceProfile> {
        let frame = self.camera.capture_frame()?;
        let profile = Calibration::new(&self.store).run(frame.image, &mut self.locator)?;
        self.evaluator.set_reference(profile);
        Ok(profile)
    }

    /// Render the guide overlay for the last observation and save it as PNG.
    pub fn save_preview(&self, config: &Config) -> Result<std::path::PathBuf> {
        let last = self
            .last
            .as_ref()
            .context("no frame captured yet")?;
        let image = overlay::render_overlay(
            &last.frame,
            &last.faces,
            &last.verdict,
            Local::now().naive_local(),
        );
        let path = config.preview_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        image
            .save(&path)
            .with_context(|| format!("cannot save preview {}", path.display()))?;
        Ok(path)
    }
}

/// A parsed line of live-loop input.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Capture,
    Calibrate,
    Timelapse(Option<DateRange>),
    Preview,
    Stats,
    Quit,
    Help,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Ok(Command::Help);
    };
    match head {
        "c" => Ok(Command::Capture),
        "r" => Ok(Command::Calibrate),
        "t" => {
            let from = parts.next();
            let to = parts.next();
            DateRange::from_inputs(from, to)
                .map(Command::Timelapse)
                .map_err(|e| e.to_string())
        }
        "p" => Ok(Command::Preview),
        "s" => Ok(Command::Stats),
        "q" => Ok(Command::Quit),
        "h" | "?" => Ok(Command::Help),
        other => Err(format!("unknown command {other:?}")),
    }
}

const HELP: &str = "commands: c capture | r set reference | t [DD/MM/YYYY DD/MM/YYYY] timelapse | p preview | s stats | q quit";

async fn wait_job(pending: &mut Option<JobReply>) -> Result<Result<TimelapseArtifact, AssemblyError>, RecvError> {
    match pending {
        Some(reply) => reply.await,
        None => std::future::pending().await,
    }
}

/// Interactive loop: re-evaluate the camera every tick, handle stdin commands,
/// and report timelapse jobs as they finish.
pub async fn run(config: &Config, mut session: Session, worker: WorkerHandle) -> Result<()> {
    let catalog = PhotoCatalog::new(config.photos_dir());
    let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending: Option<JobReply> = None;
    let mut shown: Option<String> = None;

    println!("{HELP}");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match session.tick() {
                    Ok(verdict) => {
                        let message = verdict.to_string();
                        if shown.as_deref() != Some(message.as_str()) {
                            println!("{message}");
                            shown = Some(message);
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "frame skipped"),
                }
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed");
                        break;
                    }
                };
                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => handle(command, config, &mut session, &catalog, &worker, &mut pending),
                    Err(message) => println!("{message}\n{HELP}"),
                }
            }
            result = wait_job(&mut pending) => {
                pending = None;
                match result {
                    Ok(Ok(artifact)) => println!(
                        "Timelapse saved: {} ({} photos)",
                        artifact.path.display(),
                        artifact.frames
                    ),
                    Ok(Err(e)) => println!("Timelapse failed: {e}"),
                    Err(_) => println!("Timelapse worker stopped"),
                }
            }
        }
    }

    if pending.is_some() {
        println!("Waiting for the running timelapse to finish...");
        if let Ok(result) = wait_job(&mut pending).await {
            match result {
                Ok(artifact) => println!("Timelapse saved: {}", artifact.path.display()),
                Err(e) => println!("Timelapse failed: {e}"),
            }
        }
    }
    Ok(())
}

fn handle(
    command: Command,
    config: &Config,
    session: &mut Session,
    catalog: &PhotoCatalog,
    worker: &WorkerHandle,
    pending: &mut Option<JobReply>,
) {
    match command {
        Command::Capture => match session.capture() {
            Ok(photo) => println!("Photo saved: {}", photo.path.display()),
            Err(e) => println!("Capture failed: {e}"),
        },
        Command::Calibrate => match session.calibrate() {
            Ok(profile) => println!("Reference face size set to {} px²", profile.face_area),
            Err(e) => println!("Calibration failed: {e}"),
        },
        Command::Timelapse(range) => {
            if pending.is_some() {
                println!("A timelapse is already being created");
                return;
            }
            let request = TimelapseRequest {
                range,
                ..TimelapseRequest::default()
            };
            match worker.submit(request) {
                Ok(reply) => {
                    println!("Creating timelapse ({})...", request.quality);
                    *pending = Some(reply);
                }
                Err(e) => println!("Timelapse failed: {e}"),
            }
        }
        Command::Preview => match session.save_preview(config) {
            Ok(path) => println!("Preview saved: {}", path.display()),
            Err(e) => println!("Preview failed: {e}"),
        },
        Command::Stats => match catalog.snapshot() {
            Ok(snapshot) => print_stats(&snapshot.stats()),
            Err(e) => println!("Cannot read photos: {e}"),
        },
        Command::Quit | Command::Help => println!("{HELP}"),
    }
}

pub fn print_stats(stats: &CatalogStats) {
    println!("Total photos:     {}", stats.total);
    println!("Days captured:    {}", stats.distinct_days);
    println!("Span (days):      {}", stats.span_days);
    println!("Consistency:      {:.0}%", stats.consistency * 100.0);
    if let Some(day) = stats.latest_day {
        println!("Latest photo:     {}", day.format("%d/%m/%Y"));
    }
    println!(
        "Timelapse ready:  {}",
        if stats.ready_for_timelapse { "yes" } else { "no (need at least 2 photos)" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("c"), Ok(Command::Capture));
        assert_eq!(parse_command(" r "), Ok(Command::Calibrate));
        assert_eq!(parse_command("q"), Ok(Command::Quit));
        assert_eq!(parse_command(""), Ok(Command::Help));
        assert!(parse_command("x").is_err());
    }

    #[test]
    fn test_parse_timelapse_range() {
        assert_eq!(parse_command("t"), Ok(Command::Timelapse(None)));

        let from = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(
            parse_command("t 05/01/2024 31/01/2024"),
            Ok(Command::Timelapse(Some(DateRange::new(from, to).unwrap())))
        );

        assert!(parse_command("t 05/01/2024").is_err());
        assert!(parse_command("t 31/01/2024 05/01/2024").is_err());
    }
}
