//! Timelapse assembly: select, validate, order and encode photos.
//!
//! A job moves `Idle → Validating → Encoding → {Succeeded | Failed}`. The
//! catalog is read once during validation; the video is encoded into a hidden
//! sibling file and renamed into place only after the encoder finished.

use crate::catalog::{CapturedPhoto, CatalogError, DateRange, DateRangeError, PhotoCatalog, MIN_TIMELAPSE_PHOTOS};
use crate::encoder::{EncodeError, EncoderSettings, VideoEncoder};
use crate::naming;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_FRAME_RATE: u32 = 5;

/// Named bundle of output resolution and bitrate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QualityTier {
    Low,
    Medium,
    #[default]
    High,
}

impl QualityTier {
    /// Output `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            QualityTier::Low => (640, 480),
            QualityTier::Medium => (1280, 720),
            QualityTier::High => (1920, 1080),
        }
    }

    pub fn bitrate_kbps(&self) -> u32 {
        match self {
            QualityTier::Low => 500,
            QualityTier::Medium => 2000,
            QualityTier::High => 5000,
        }
    }

    pub fn settings(&self, frame_rate: u32) -> EncoderSettings {
        let (width, height) = self.dimensions();
        EncoderSettings {
            width,
            height,
            frame_rate,
            bitrate_kbps: self.bitrate_kbps(),
        }
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown quality {other:?} (expected low|medium|high)")),
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.dimensions();
        let name = match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        };
        write!(f, "{name} ({w}x{h} @ {} kb/s)", self.bitrate_kbps())
    }
}

/// Parameters for one assembly job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelapseRequest {
    /// Inclusive day range; `None` keeps every parseable photo.
    pub range: Option<DateRange>,
    pub frame_rate: u32,
    pub quality: QualityTier,
}

impl Default for TimelapseRequest {
    fn default() -> Self {
        Self {
            range: None,
            frame_rate: DEFAULT_FRAME_RATE,
            quality: QualityTier::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    Idle,
    Validating,
    Encoding,
    Succeeded,
    Failed,
}

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("frame rate must be positive")]
    InvalidFrameRate,
    #[error("need at least 2 photos for a timelapse, found {found}")]
    InsufficientPhotos { found: usize },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Range(#[from] DateRangeError),
    #[error("cannot read photo {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("output I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("encoder produced an empty file")]
    EmptyOutput,
}

/// A finished video and the days it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelapseArtifact {
    pub path: PathBuf,
    pub covered: DateRange,
    pub frames: usize,
}

pub struct TimelapseAssembler {
    catalog: PhotoCatalog,
    output_dir: PathBuf,
    encoder: Box<dyn VideoEncoder>,
    state: AssemblyState,
}

impl TimelapseAssembler {
    pub fn new(catalog: PhotoCatalog, output_dir: impl Into<PathBuf>, encoder: Box<dyn VideoEncoder>) -> Self {
        Self {
            catalog,
            output_dir: output_dir.into(),
            encoder,
            state: AssemblyState::Idle,
        }
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    fn transition(&mut self, next: AssemblyState) {
        tracing::info!(from = ?self.state, to = ?next, "timelapse state");
        self.state = next;
    }

    /// Run one job to completion. No retry; a failed job leaves no output.
    pub fn assemble(&mut self, request: &TimelapseRequest) -> Result<TimelapseArtifact, AssemblyError> {
        self.transition(AssemblyState::Validating);
        let result = self.validate(request).and_then(|photos| {
            self.transition(AssemblyState::Encoding);
            self.encode(photos, request)
        });

        match &result {
            Ok(artifact) => {
                self.transition(AssemblyState::Succeeded);
                tracing::info!(
                    path = %artifact.path.display(),
                    frames = artifact.frames,
                    days = artifact.covered.days(),
                    "timelapse written"
                );
            }
            Err(e) => {
                self.transition(AssemblyState::Failed);
                tracing::warn!(error = %e, "timelapse failed");
            }
        }
        result
    }

    /// Retained set: range-filtered photos, ascending by day. Same-day photos
    /// keep filename order.
    fn validate(&self, request: &TimelapseRequest) -> Result<Vec<CapturedPhoto>, AssemblyError> {
        if request.frame_rate == 0 {
            return Err(AssemblyError::InvalidFrameRate);
        }

        let snapshot = self.catalog.snapshot()?;
        let mut photos = snapshot.select(request.range.as_ref());
        if photos.len() < MIN_TIMELAPSE_PHOTOS {
            return Err(AssemblyError::InsufficientPhotos {
                found: photos.len(),
            });
        }

        photos.sort_by_key(CapturedPhoto::date);
        tracing::debug!(count = photos.len(), range = ?request.range, "retained set selected");
        Ok(photos)
    }

    fn encode(&self, photos: Vec<CapturedPhoto>, request: &TimelapseRequest) -> Result<TimelapseArtifact, AssemblyError> {
        let (first, last) = match (photos.first(), photos.last()) {
            (Some(first), Some(last)) => (first.date(), last.date()),
            _ => return Err(AssemblyError::InsufficientPhotos { found: 0 }),
        };
        let covered = DateRange::new(first, last)?;

        std::fs::create_dir_all(&self.output_dir).map_err(|source| AssemblyError::Io {
            path: self.output_dir.clone(),
            source,
        })?;

        let name = naming::timelapse_file_name(first, last);
        let final_path = self.output_dir.join(&name);
        let partial_path = self.output_dir.join(format!(".{name}.partial"));
        let settings = request.quality.settings(request.frame_rate);

        if let Err(e) = self.write_video(&photos, &partial_path, &settings) {
            remove_partial(&partial_path);
            return Err(e);
        }

        std::fs::rename(&partial_path, &final_path).map_err(|source| {
            remove_partial(&partial_path);
            AssemblyError::Io {
                path: final_path.clone(),
                source,
            }
        })?;

        Ok(TimelapseArtifact {
            path: final_path,
            covered,
            frames: photos.len(),
        })
    }

    fn write_video(&self, photos: &[CapturedPhoto], path: &Path, settings: &EncoderSettings) -> Result<(), AssemblyError> {
        let mut sink = self.encoder.open(path, settings)?;

        for photo in photos {
            let image = read_photo(&photo.path).map_err(|source| AssemblyError::Read {
                path: photo.path.clone(),
                source,
            })?;
            let frame = image
                .resize_to_fill(settings.width, settings.height, FilterType::Triangle)
                .to_rgb8();
            sink.write_frame(&frame)?;
            tracing::trace!(path = %photo.path.display(), "frame written");
        }
        sink.finish()?;

        let len = std::fs::metadata(path)
            .map_err(|source| AssemblyError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        if len == 0 {
            return Err(AssemblyError::EmptyOutput);
        }
        Ok(())
    }
}

/// Decode by content, falling back to the extension.
fn read_photo(path: &Path) -> Result<DynamicImage, image::ImageError> {
    ImageReader::open(path)?.with_guessed_format()?.decode()
}

fn remove_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "partial output removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove partial output"),
    }
}
