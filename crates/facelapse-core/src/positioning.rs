//! Positioning guidance: classify one frame's detections into a verdict.
//!
//! Stateless across frames. Consecutive frames may flicker between verdicts.

use crate::types::{
    Corrections, Distance, FaceBox, Horizontal, PositioningVerdict, ReferenceProfile, Vertical,
};

/// Maximum distance (exclusive) between face center and frame center, per axis.
pub const CENTER_TOLERANCE_PX: u32 = 50;
/// Maximum relative deviation (inclusive) of face area from the reference.
pub const SIZE_TOLERANCE: f64 = 0.20;

/// Evaluates face placement against the frame center and an optional
/// calibrated reference profile.
#[derive(Debug, Clone, Default)]
pub struct PositioningEvaluator {
    reference: Option<ReferenceProfile>,
}

impl PositioningEvaluator {
    pub fn new(reference: Option<ReferenceProfile>) -> Self {
        Self { reference }
    }

    pub fn reference(&self) -> Option<ReferenceProfile> {
        self.reference
    }

    /// Install a freshly calibrated profile.
    pub fn set_reference(&mut self, reference: ReferenceProfile) {
        self.reference = Some(reference);
    }

    /// Classify a frame of `width` x `height` given its detected faces.
    pub fn evaluate(&self, width: u32, height: u32, faces: &[FaceBox]) -> PositioningVerdict {
        let face = match faces {
            [] => return PositioningVerdict::NoFace,
            [face] => face,
            _ => return PositioningVerdict::MultipleFaces { count: faces.len() },
        };

        let (fx, fy) = face.center();
        let (cx, cy) = (width / 2, height / 2);

        let centered_x = fx.abs_diff(cx) < CENTER_TOLERANCE_PX;
        let centered_y = fy.abs_diff(cy) < CENTER_TOLERANCE_PX;

        let corrections = Corrections {
            horizontal: (!centered_x).then(|| {
                if fx > cx {
                    Horizontal::MoveLeft
                } else {
                    Horizontal::MoveRight
                }
            }),
            vertical: (!centered_y).then(|| {
                if fy > cy {
                    Vertical::MoveDown
                } else {
                    Vertical::MoveUp
                }
            }),
            distance: self.reference.and_then(|r| size_correction(face.area(), r)),
        };

        if corrections.is_empty() {
            PositioningVerdict::Ready
        } else {
            PositioningVerdict::Misaligned(corrections)
        }
    }
}

/// Distance correction when `area` deviates from the reference by more than
/// [`SIZE_TOLERANCE`].
fn size_correction(area: u64, reference: ReferenceProfile) -> Option<Distance> {
    let ref_area = reference.face_area;
    let size_diff = area.abs_diff(ref_area) as f64 / ref_area as f64;
    if size_diff <= SIZE_TOLERANCE {
        return None;
    }
    Some(if area < ref_area {
        Distance::MoveCloser
    } else {
        Distance::MoveFurther
    })
}
