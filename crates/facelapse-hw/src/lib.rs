//! facelapse-hw — Camera access for the daily capture loop.
//!
//! Opens a V4L2 webcam at a 16:9 resolution where the driver allows it and
//! delivers mirrored RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo};
pub use frame::Frame;
