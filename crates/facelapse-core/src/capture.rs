//! Photo capture: readiness gate, normalization, date watermark, JPEG write.

use crate::catalog::CapturedPhoto;
use crate::naming;
use crate::normalize::{self, NormalizeError};
use crate::overlay;
use crate::types::PositioningVerdict;
use chrono::NaiveDateTime;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

const JPEG_QUALITY: u8 = 95;

/// Which verdicts allow a capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CapturePolicy {
    /// Only `Ready`.
    #[default]
    RequireReady,
    /// Anything except `NoFace`.
    FacePresent,
}

impl CapturePolicy {
    pub fn permits(&self, verdict: &PositioningVerdict) -> bool {
        match self {
            CapturePolicy::RequireReady => verdict.is_ready(),
            CapturePolicy::FacePresent => verdict.face_present(),
        }
    }
}

impl FromStr for CapturePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ready" | "require-ready" => Ok(Self::RequireReady),
            "face-present" | "face" => Ok(Self::FacePresent),
            other => Err(format!("unknown capture policy {other:?} (expected ready|face-present)")),
        }
    }
}

/// What happens when a photo for the same second already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollisionPolicy {
    #[default]
    Reject,
    Overwrite,
}

impl FromStr for CollisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(format!("unknown collision policy {other:?} (expected reject|overwrite)")),
        }
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture not allowed: {0}")]
    NotReady(PositioningVerdict),
    #[error("a photo already exists for this second: {0}")]
    Collision(PathBuf),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Persists watermarked photos into the photo directory.
#[derive(Debug, Clone)]
pub struct CaptureService {
    photos_dir: PathBuf,
    capture_policy: CapturePolicy,
    collision_policy: CollisionPolicy,
}

impl CaptureService {
    pub fn new(photos_dir: impl Into<PathBuf>) -> Self {
        Self {
            photos_dir: photos_dir.into(),
            capture_policy: CapturePolicy::default(),
            collision_policy: CollisionPolicy::default(),
        }
    }

    pub fn with_capture_policy(mut self, policy: CapturePolicy) -> Self {
        self.capture_policy = policy;
        self
    }

    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    pub fn photos_dir(&self) -> &Path {
        &self.photos_dir
    }

    /// Capture `frame` as the photo for `now`.
    ///
    /// `last_verdict` is the verdict of the most recent live tick; the frame
    /// itself is a fresh sample and is not re-evaluated.
    pub fn capture(
        &self,
        frame: RgbImage,
        last_verdict: &PositioningVerdict,
        now: NaiveDateTime,
    ) -> Result<CapturedPhoto, CaptureError> {
        if !self.capture_policy.permits(last_verdict) {
            tracing::warn!(verdict = %last_verdict, policy = ?self.capture_policy, "capture rejected");
            return Err(CaptureError::NotReady(*last_verdict));
        }

        let mut image = normalize::normalize(frame)?.into_image();
        overlay::stamp_date(&mut image, now.date());

        std::fs::create_dir_all(&self.photos_dir).map_err(|source| CaptureError::Io {
            path: self.photos_dir.clone(),
            source,
        })?;

        let path = self.photos_dir.join(naming::photo_file_name(now));
        match self.collision_policy {
            CollisionPolicy::Reject => {
                let file = create_exclusive(&path)?;
                write_or_discard(file, &image, &path)?;
            }
            CollisionPolicy::Overwrite => {
                // The existing photo stays intact until the new one is complete.
                let tmp = path.with_extension("jpg.tmp");
                let file = File::create(&tmp).map_err(|source| CaptureError::Io {
                    path: tmp.clone(),
                    source,
                })?;
                write_or_discard(file, &image, &tmp)?;
                std::fs::rename(&tmp, &path).map_err(|source| {
                    discard(&tmp);
                    CaptureError::Io {
                        path: path.clone(),
                        source,
                    }
                })?;
            }
        }

        tracing::info!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "photo captured"
        );
        Ok(CapturedPhoto {
            captured_at: now,
            path,
        })
    }
}

fn create_exclusive(path: &Path) -> Result<File, CaptureError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|source| {
            if source.kind() == io::ErrorKind::AlreadyExists {
                tracing::warn!(path = %path.display(), "photo for this second already exists");
                CaptureError::Collision(path.to_path_buf())
            } else {
                CaptureError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
}

/// Never leave a truncated JPEG behind for the catalog to pick up.
fn write_or_discard(file: File, image: &RgbImage, path: &Path) -> Result<(), CaptureError> {
    write_jpeg(file, image, path).map_err(|e| {
        discard(path);
        e
    })
}

fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove partial photo");
    }
}

fn write_jpeg(file: File, image: &RgbImage, path: &Path) -> Result<(), CaptureError> {
    let mut writer = BufWriter::new(file);
    image
        .write_with_encoder(JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY))
        .map_err(|source| CaptureError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    writer.flush().map_err(|source| CaptureError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::watermark_layout;
    use crate::types::{Corrections, Distance};
    use chrono::NaiveDate;
    use image::Rgb;

    fn at(hh: u32, mm: u32, ss: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 31)
            .unwrap()
            .and_hms_opt(hh, mm, ss)
            .unwrap()
    }

    fn raw_frame() -> RgbImage {
        // 4:3 input so normalization has to crop.
        RgbImage::from_pixel(640, 480, Rgb([180, 180, 180]))
    }

    fn misaligned() -> PositioningVerdict {
        PositioningVerdict::Misaligned(Corrections {
            distance: Some(Distance::MoveCloser),
            ..Corrections::default()
        })
    }

    #[test]
    fn test_capture_writes_normalized_watermarked_jpeg() {
        let tmp = tempfile::tempdir().unwrap();
        let service = CaptureService::new(tmp.path().join("face_photos"));

        let photo = service
            .capture(raw_frame(), &PositioningVerdict::Ready, at(23, 59, 59))
            .unwrap();
        assert!(photo.path.ends_with("face_photos/face_31122024_235959.jpg"));
        assert_eq!(photo.captured_at, at(23, 59, 59));

        let written = image::open(&photo.path).unwrap().to_rgb8();
        assert_eq!(written.dimensions(), (640, 360));

        // Backing corner is dark even after JPEG compression.
        let layout = watermark_layout(640, 360, "31/12/2024");
        let corner = written.get_pixel(layout.backing_x as u32 + 2, layout.backing_y as u32 + 2);
        assert!(corner.0.iter().all(|&c| c < 60), "backing pixel {corner:?}");
        let top_left = written.get_pixel(5, 5);
        assert!(top_left.0.iter().all(|&c| c > 140), "untouched pixel {top_left:?}");
    }

    #[test]
    fn test_require_ready_rejects_other_verdicts() {
        let tmp = tempfile::tempdir().unwrap();
        let service = CaptureService::new(tmp.path());

        for verdict in [
            PositioningVerdict::NoFace,
            PositioningVerdict::MultipleFaces { count: 2 },
            misaligned(),
        ] {
            assert!(matches!(
                service.capture(raw_frame(), &verdict, at(8, 0, 0)),
                Err(CaptureError::NotReady(_))
            ));
        }
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_face_present_policy_accepts_misaligned() {
        let tmp = tempfile::tempdir().unwrap();
        let service =
            CaptureService::new(tmp.path()).with_capture_policy(CapturePolicy::FacePresent);

        assert!(service.capture(raw_frame(), &misaligned(), at(8, 0, 0)).is_ok());
        assert!(matches!(
            service.capture(raw_frame(), &PositioningVerdict::NoFace, at(8, 0, 1)),
            Err(CaptureError::NotReady(PositioningVerdict::NoFace))
        ));
    }

    #[test]
    fn test_same_second_collision_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let service = CaptureService::new(tmp.path());

        let first = service
            .capture(raw_frame(), &PositioningVerdict::Ready, at(9, 30, 0))
            .unwrap();
        let before = std::fs::read(&first.path).unwrap();

        let dark = RgbImage::from_pixel(640, 480, Rgb([10, 10, 10]));
        match service.capture(dark, &PositioningVerdict::Ready, at(9, 30, 0)) {
            Err(CaptureError::Collision(path)) => assert_eq!(path, first.path),
            other => panic!("expected collision, got {other:?}"),
        }
        assert_eq!(std::fs::read(&first.path).unwrap(), before);
    }

    #[test]
    fn test_overwrite_policy_replaces_photo() {
        let tmp = tempfile::tempdir().unwrap();
        let service =
            CaptureService::new(tmp.path()).with_collision_policy(CollisionPolicy::Overwrite);

        service
            .capture(raw_frame(), &PositioningVerdict::Ready, at(9, 30, 0))
            .unwrap();
        let dark = RgbImage::from_pixel(640, 480, Rgb([10, 10, 10]));
        let second = service
            .capture(dark, &PositioningVerdict::Ready, at(9, 30, 0))
            .unwrap();

        let written = image::open(&second.path).unwrap().to_rgb8();
        assert!(written.get_pixel(5, 5).0.iter().all(|&c| c < 40));
        assert!(!second.path.with_extension("jpg.tmp").exists());
    }

    #[test]
    fn test_failed_overwrite_keeps_existing_photo() {
        let tmp = tempfile::tempdir().unwrap();
        let service =
            CaptureService::new(tmp.path()).with_collision_policy(CollisionPolicy::Overwrite);

        let first = service
            .capture(raw_frame(), &PositioningVerdict::Ready, at(9, 30, 0))
            .unwrap();
        let before = std::fs::read(&first.path).unwrap();

        // A directory in the staging slot makes the replacement write fail.
        std::fs::create_dir(first.path.with_extension("jpg.tmp")).unwrap();
        let dark = RgbImage::from_pixel(640, 480, Rgb([10, 10, 10]));
        assert!(matches!(
            service.capture(dark, &PositioningVerdict::Ready, at(9, 30, 0)),
            Err(CaptureError::Io { .. })
        ));
        assert_eq!(std::fs::read(&first.path).unwrap(), before);
    }

    #[test]
    fn test_frame_too_small_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let service = CaptureService::new(tmp.path());
        assert!(matches!(
            service.capture(RgbImage::new(8, 8), &PositioningVerdict::Ready, at(7, 0, 0)),
            Err(CaptureError::Normalize(_))
        ));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("ready".parse(), Ok(CapturePolicy::RequireReady));
        assert_eq!("Face-Present".parse(), Ok(CapturePolicy::FacePresent));
        assert!("maybe".parse::<CapturePolicy>().is_err());
        assert_eq!("overwrite".parse(), Ok(CollisionPolicy::Overwrite));
        assert_eq!(" reject ".parse(), Ok(CollisionPolicy::Reject));
    }
}
