//! Reference profile persistence and the calibration action that sets it.

use crate::detector::{DetectorError, FaceLocator};
use crate::normalize::{self, NormalizeError};
use crate::types::ReferenceProfile;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("profile I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed profile {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Load/save collaborator for the reference profile.
pub trait ProfileStore {
    fn load(&self) -> Result<Option<ReferenceProfile>, ProfileError>;
    fn save(&self, profile: &ReferenceProfile) -> Result<(), ProfileError>;
}

/// On-disk record: `{"reference_face_size": <int or null>}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfileRecord {
    #[serde(default)]
    reference_face_size: Option<u64>,
}

/// JSON file store. Saves replace the file atomically via a sibling temp file.
#[derive(Debug, Clone)]
pub struct JsonProfileStore {
    path: PathBuf,
}

impl JsonProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> ProfileError {
        ProfileError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ProfileStore for JsonProfileStore {
    fn load(&self) -> Result<Option<ReferenceProfile>, ProfileError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        let record: ProfileRecord =
            serde_json::from_str(&raw).map_err(|source| ProfileError::Malformed {
                path: self.path.clone(),
                source,
            })?;

        // A stored zero is treated like an absent profile.
        Ok(record.reference_face_size.and_then(ReferenceProfile::new))
    }

    fn save(&self, profile: &ReferenceProfile) -> Result<(), ProfileError> {
        let record = ProfileRecord {
            reference_face_size: Some(profile.face_area),
        };
        let body = serde_json::to_string(&record).map_err(|source| ProfileError::Malformed {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|e| self.io_err(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;

        tracing::debug!(path = %self.path.display(), area = profile.face_area, "reference profile saved");
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("no face detected; position yourself in front of the camera")]
    NoFace,
    #[error("{0} faces detected; ensure exactly one face is visible")]
    AmbiguousFace(usize),
    #[error("detected face has zero area")]
    DegenerateFace,
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Store(#[from] ProfileError),
}

/// Calibration action: measure the single visible face on a fresh frame and
/// persist its area as the new reference.
pub struct Calibration<'a, S: ProfileStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ProfileStore + ?Sized> Calibration<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Nothing is written unless exactly one face is found.
    pub fn run(
        &self,
        frame: RgbImage,
        locator: &mut dyn FaceLocator,
    ) -> Result<ReferenceProfile, CalibrationError> {
        let frame = normalize::normalize(frame)?;
        let faces = locator.locate(frame.image())?;

        let face = match faces.as_slice() {
            [] => return Err(CalibrationError::NoFace),
            [face] => *face,
            many => return Err(CalibrationError::AmbiguousFace(many.len())),
        };

        let profile = ReferenceProfile::new(face.area()).ok_or(CalibrationError::DegenerateFace)?;
        self.store.save(&profile)?;

        tracing::info!(
            area = profile.face_area,
            width = face.width,
            height = face.height,
            "reference profile calibrated"
        );
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::StaticLocator;
    use crate::types::FaceBox;

    fn frame() -> RgbImage {
        RgbImage::new(1280, 720)
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonProfileStore::new(tmp.path().join("app_config.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonProfileStore::new(tmp.path().join("nested/app_config.json"));
        store.save(&ReferenceProfile { face_area: 40_000 }).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, r#"{"reference_face_size":40000}"#);
        assert_eq!(store.load().unwrap(), Some(ReferenceProfile { face_area: 40_000 }));
        assert!(!tmp.path().join("nested/app_config.json.tmp").exists());
    }

    #[test]
    fn test_load_null_and_zero_are_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("app_config.json");
        let store = JsonProfileStore::new(&path);

        std::fs::write(&path, r#"{"reference_face_size": null}"#).unwrap();
        assert_eq!(store.load().unwrap(), None);
        std::fs::write(&path, r#"{"reference_face_size": 0}"#).unwrap();
        assert_eq!(store.load().unwrap(), None);
        std::fs::write(&path, "{}").unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_load_malformed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("app_config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            JsonProfileStore::new(&path).load(),
            Err(ProfileError::Malformed { .. })
        ));
    }

    #[test]
    fn test_calibration_saves_single_face_area() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonProfileStore::new(tmp.path().join("app_config.json"));
        let mut locator = StaticLocator::new(vec![FaceBox::new(540, 260, 200, 180)]);

        let profile = Calibration::new(&store).run(frame(), &mut locator).unwrap();
        assert_eq!(profile.face_area, 36_000);
        assert_eq!(store.load().unwrap(), Some(profile));
    }

    #[test]
    fn test_calibration_rejects_zero_or_many_faces() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonProfileStore::new(tmp.path().join("app_config.json"));

        let mut none = StaticLocator::new(vec![]);
        assert!(matches!(
            Calibration::new(&store).run(frame(), &mut none),
            Err(CalibrationError::NoFace)
        ));

        let mut two = StaticLocator::new(vec![FaceBox::new(0, 0, 10, 10); 2]);
        assert!(matches!(
            Calibration::new(&store).run(frame(), &mut two),
            Err(CalibrationError::AmbiguousFace(2))
        ));

        assert!(!store.path().exists());
    }
}
