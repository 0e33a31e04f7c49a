//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// 16:9 sizes to request, best first.
pub const PREFERRED_RESOLUTIONS: [(u32, u32); 4] = [(1920, 1080), (1280, 720), (854, 480), (640, 360)];

/// How far (per axis) the driver's answer may stray from a request.
const RESOLUTION_TOLERANCE_PX: u32 = 50;

/// Fraction of near-black pixels that marks a frame as still settling.
const DARK_FRAME_THRESHOLD: f32 = 0.95;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("video capture not supported")]
    CaptureNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, converted with BT.601.
    Yuyv,
    /// Motion-JPEG, one JPEG per buffer.
    Mjpg,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"YUYV") {
            Some(Self::Yuyv)
        } else if fourcc == FourCC::new(b"MJPG") {
            Some(Self::Mjpg)
        } else {
            None
        }
    }
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pixel_format: PixelFormat,
    mirror: bool,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    ///
    /// With `mirror` set, frames are flipped horizontally like a selfie view.
    pub fn open(device_path: &str, mirror: bool) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::CaptureNotSupported);
        }

        let (width, height, pixel_format) = negotiate(&device)?;

        tracing::info!(width, height, format = ?pixel_format, mirror, "negotiated format");

        Ok(Self {
            device,
            width,
            height,
            device_path: device_path.to_string(),
            pixel_format,
            mirror,
        })
    }

    /// Capture a single RGB frame.
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        let mut stream = self.stream()?;
        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        self.to_frame(buf, meta.sequence)
    }

    /// Discard up to `count` frames while exposure settles. Stops early on
    /// the first frame that is not dark.
    pub fn warm_up(&self, count: usize) -> Result<usize, CameraError> {
        if count == 0 {
            return Ok(0);
        }
        let mut stream = self.stream()?;

        let mut discarded = 0;
        let mut brightness = 0.0;
        while discarded < count {
            let (buf, meta) = stream.next().map_err(|e| {
                CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}"))
            })?;
            discarded += 1;

            let frame = self.to_frame(buf, meta.sequence)?;
            brightness = frame.avg_brightness();
            if !frame.is_dark(DARK_FRAME_THRESHOLD) {
                break;
            }
            tracing::debug!(seq = frame.sequence, brightness, "discarding dark warmup frame");
        }

        tracing::debug!(discarded, brightness, "camera warmed up");
        Ok(discarded)
    }

    fn stream(&self) -> Result<MmapStream<'_>, CameraError> {
        MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4).map_err(|e| {
            CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
        })
    }

    fn to_frame(&self, buf: &[u8], sequence: u32) -> Result<Frame, CameraError> {
        let mut image = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height)
                .map_err(|e| CameraError::CaptureFailed(format!("YUYV conversion failed: {e}")))?,
            PixelFormat::Mjpg => frame::mjpg_to_rgb(buf)
                .map_err(|e| CameraError::CaptureFailed(e.to_string()))?,
        };

        if self.mirror {
            frame::mirror(&mut image);
        }

        Ok(Frame { image, sequence })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

/// Walk the preferred sizes until the driver answers close enough to one.
/// Falls back to whatever the driver answered last; the normalizer crops
/// non-16:9 frames later.
fn negotiate(device: &Device) -> Result<(u32, u32, PixelFormat), CameraError> {
    let mut fmt = device.format().map_err(|e| {
        CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
    })?;

    let mut last = None;
    for (width, height) in PREFERRED_RESOLUTIONS {
        for fourcc in [FourCC::new(b"YUYV"), FourCC::new(b"MJPG")] {
            fmt.fourcc = fourcc;
            fmt.width = width;
            fmt.height = height;

            let negotiated = match device.set_format(&fmt) {
                Ok(negotiated) => negotiated,
                Err(e) => {
                    tracing::debug!(width, height, ?fourcc, error = %e, "format rejected");
                    continue;
                }
            };
            let Some(pixel_format) = PixelFormat::from_fourcc(negotiated.fourcc) else {
                continue;
            };

            let answer = (negotiated.width, negotiated.height, pixel_format);
            if accepts((width, height), (negotiated.width, negotiated.height)) {
                return Ok(answer);
            }
            tracing::debug!(
                requested_width = width,
                requested_height = height,
                width = negotiated.width,
                height = negotiated.height,
                "driver picked a different size"
            );
            last = Some(answer);
        }
    }

    last.ok_or_else(|| {
        CameraError::FormatNegotiationFailed("driver offers neither YUYV nor MJPG".to_string())
    })
}

fn accepts(requested: (u32, u32), answered: (u32, u32)) -> bool {
    requested.0.abs_diff(answered.0) <= RESOLUTION_TOLERANCE_PX
        && requested.1.abs_diff(answered.1) <= RESOLUTION_TOLERANCE_PX
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_within_tolerance() {
        assert!(accepts((1920, 1080), (1920, 1080)));
        assert!(accepts((854, 480), (848, 480)));
        assert!(accepts((1280, 720), (1280, 768)));
    }

    #[test]
    fn test_rejects_outside_tolerance() {
        assert!(!accepts((1920, 1080), (1280, 720)));
        assert!(!accepts((1280, 720), (1280, 960)));
    }

    #[test]
    fn test_preferred_resolutions_are_16_9() {
        for (w, h) in PREFERRED_RESOLUTIONS {
            let ratio = w as f32 / h as f32;
            assert!((ratio - 16.0 / 9.0).abs() < 0.01, "{w}x{h}");
        }
    }

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), Some(PixelFormat::Mjpg));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), None);
    }

    #[test]
    fn test_open_missing_device() {
        assert!(matches!(
            Camera::open("/dev/definitely-not-a-camera", true),
            Err(CameraError::DeviceNotFound(_))
        ));
    }
}
