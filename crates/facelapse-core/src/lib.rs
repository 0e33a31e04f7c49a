//! facelapse-core — Daily face photo guidance and timelapse assembly.
//!
//! The live pipeline runs normalize → locate → evaluate → overlay on every
//! camera frame. Captures are watermarked JPEGs named by timestamp; the
//! catalog reads them back and the assembler encodes a date range of them
//! into a video.

pub mod capture;
pub mod catalog;
pub mod detector;
pub mod encoder;
pub mod glyphs;
pub mod naming;
pub mod normalize;
pub mod overlay;
pub mod positioning;
pub mod profile;
pub mod timelapse;
pub mod types;

pub use capture::{CapturePolicy, CaptureService, CollisionPolicy};
pub use catalog::{CapturedPhoto, DateRange, PhotoCatalog};
pub use detector::{FaceLocator, ScrfdLocator};
pub use normalize::NormalizedFrame;
pub use positioning::PositioningEvaluator;
pub use timelapse::{QualityTier, TimelapseAssembler, TimelapseRequest};
pub use types::{FaceBox, PositioningVerdict, ReferenceProfile};
