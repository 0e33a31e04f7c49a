use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned bounding box of a detected face, in pixel coordinates of a
/// normalized frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Box center, rounded down.
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Box area in pixels.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Calibrated baseline face area used to judge distance from the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceProfile {
    /// Face area in pixels. Always positive.
    pub face_area: u64,
}

impl ReferenceProfile {
    /// Returns `None` for a zero area, which cannot serve as a baseline.
    pub fn new(face_area: u64) -> Option<Self> {
        (face_area > 0).then_some(Self { face_area })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizontal {
    MoveLeft,
    MoveRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vertical {
    MoveUp,
    MoveDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    MoveCloser,
    MoveFurther,
}

/// Every correction that applies to a misaligned face. At least one is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Corrections {
    pub horizontal: Option<Horizontal>,
    pub vertical: Option<Vertical>,
    pub distance: Option<Distance>,
}

impl Corrections {
    pub fn is_empty(&self) -> bool {
        self.horizontal.is_none() && self.vertical.is_none() && self.distance.is_none()
    }
}

/// Capture-readiness classification of one evaluated frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositioningVerdict {
    NoFace,
    MultipleFaces { count: usize },
    Misaligned(Corrections),
    Ready,
}

impl PositioningVerdict {
    /// True when at least one face was seen in the frame.
    pub fn face_present(&self) -> bool {
        !matches!(self, PositioningVerdict::NoFace)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, PositioningVerdict::Ready)
    }
}

impl fmt::Display for Horizontal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Horizontal::MoveLeft => f.write_str("Move left."),
            Horizontal::MoveRight => f.write_str("Move right."),
        }
    }
}

impl fmt::Display for Vertical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vertical::MoveUp => f.write_str("Move up."),
            Vertical::MoveDown => f.write_str("Move down."),
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distance::MoveCloser => f.write_str("Move closer to camera."),
            Distance::MoveFurther => f.write_str("Move further from camera."),
        }
    }
}

impl fmt::Display for PositioningVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositioningVerdict::NoFace => {
                f.write_str("No face detected. Please position yourself in front of the camera.")
            }
            PositioningVerdict::MultipleFaces { .. } => {
                f.write_str("Multiple faces detected. Please ensure only your face is visible.")
            }
            PositioningVerdict::Ready => f.write_str("Perfect position! Ready to capture."),
            PositioningVerdict::Misaligned(c) => {
                f.write_str("Adjust position:")?;
                if let Some(h) = c.horizontal {
                    write!(f, " {h}")?;
                }
                if let Some(v) = c.vertical {
                    write!(f, " {v}")?;
                }
                if let Some(d) = c.distance {
                    write!(f, " {d}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_box_center_rounds_down() {
        let face = FaceBox::new(10, 20, 101, 51);
        assert_eq!(face.center(), (60, 45));
    }

    #[test]
    fn test_face_box_area_no_overflow() {
        let face = FaceBox::new(0, 0, u32::MAX, 2);
        assert_eq!(face.area(), u64::from(u32::MAX) * 2);
    }

    #[test]
    fn test_reference_profile_rejects_zero() {
        assert!(ReferenceProfile::new(0).is_none());
        assert_eq!(ReferenceProfile::new(400).map(|p| p.face_area), Some(400));
    }

    #[test]
    fn test_face_present() {
        assert!(!PositioningVerdict::NoFace.face_present());
        assert!(PositioningVerdict::MultipleFaces { count: 2 }.face_present());
        assert!(PositioningVerdict::Ready.face_present());
        assert!(PositioningVerdict::Misaligned(Corrections::default()).face_present());
    }

    #[test]
    fn test_misaligned_message_lists_all_corrections() {
        let verdict = PositioningVerdict::Misaligned(Corrections {
            horizontal: Some(Horizontal::MoveLeft),
            vertical: Some(Vertical::MoveUp),
            distance: Some(Distance::MoveCloser),
        });
        assert_eq!(
            verdict.to_string(),
            "Adjust position: Move left. Move up. Move closer to camera."
        );
    }

    #[test]
    fn test_misaligned_message_only_distance() {
        let verdict = PositioningVerdict::Misaligned(Corrections {
            distance: Some(Distance::MoveFurther),
            ..Default::default()
        });
        assert_eq!(verdict.to_string(), "Adjust position: Move further from camera.");
    }
}
