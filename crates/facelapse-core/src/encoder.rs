//! Video encoding collaborator: `open → write_frame* → finish`.
//!
//! The ffmpeg implementation streams raw RGB24 frames over stdin.

use image::RgbImage;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use thiserror::Error;

const VIDEO_CODEC: &str = "mpeg4";

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("encoder binary not found: {0}")]
    EncoderNotFound(String),
    #[error("failed to start encoder: {0}")]
    Spawn(#[source] io::Error),
    #[error("frame is {actual_width}x{actual_height}, encoder expects {width}x{height}")]
    FrameSize {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("failed to stream frame to encoder: {0}")]
    Write(#[source] io::Error),
    #[error("encoder exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Output geometry and rate for one video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub bitrate_kbps: u32,
}

/// Opens encoding sessions.
pub trait VideoEncoder: Send {
    fn open(&self, path: &Path, settings: &EncoderSettings) -> Result<Box<dyn VideoSink>, EncodeError>;
}

/// One open encoding session. Every frame must match the opened dimensions.
pub trait VideoSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), EncodeError>;
    /// Flush and close. The output file is complete only after this returns `Ok`.
    fn finish(self: Box<Self>) -> Result<(), EncodeError>;
}

/// Encoder backed by an `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: String,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Resolve the binary on `PATH` (or as given, if it is a path).
    pub fn locate(&self) -> Result<PathBuf, EncodeError> {
        which::which(&self.binary).map_err(|_| EncodeError::EncoderNotFound(self.binary.clone()))
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn open(&self, path: &Path, settings: &EncoderSettings) -> Result<Box<dyn VideoSink>, EncodeError> {
        let binary = self.locate()?;
        let args = build_args(path, settings);
        tracing::debug!(binary = %binary.display(), ?args, "starting ffmpeg");

        let mut child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(EncodeError::Spawn)?;

        let stdin = child.stdin.take();
        Ok(Box::new(FfmpegSink {
            child: Some(child),
            stdin,
            settings: *settings,
            frames: 0,
        }))
    }
}

/// ffmpeg argument list for raw RGB24 frames on stdin.
pub fn build_args(output: &Path, settings: &EncoderSettings) -> Vec<String> {
    vec![
        "-y".into(),
        "-v".into(),
        "error".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-s".into(),
        format!("{}x{}", settings.width, settings.height),
        "-r".into(),
        settings.frame_rate.to_string(),
        "-i".into(),
        "-".into(),
        "-c:v".into(),
        VIDEO_CODEC.into(),
        "-b:v".into(),
        format!("{}k", settings.bitrate_kbps),
        "-pix_fmt".into(),
        "yuv420p".into(),
        // Output container is chosen explicitly; the temp name has no .mp4 suffix.
        "-f".into(),
        "mp4".into(),
        output.to_string_lossy().into_owned(),
    ]
}

struct FfmpegSink {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    settings: EncoderSettings,
    frames: u64,
}

impl VideoSink for FfmpegSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), EncodeError> {
        let (w, h) = frame.dimensions();
        if (w, h) != (self.settings.width, self.settings.height) {
            return Err(EncodeError::FrameSize {
                width: self.settings.width,
                height: self.settings.height,
                actual_width: w,
                actual_height: h,
            });
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| EncodeError::Write(io::Error::from(io::ErrorKind::BrokenPipe)))?;
        stdin.write_all(frame.as_raw()).map_err(EncodeError::Write)?;
        self.frames += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), EncodeError> {
        // Closing stdin signals end of stream.
        drop(self.stdin.take());

        let Some(child) = self.child.take() else {
            return Ok(());
        };
        let output = child.wait_with_output().map_err(EncodeError::Write)?;
        if !output.status.success() {
            return Err(EncodeError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tracing::debug!(frames = self.frames, "ffmpeg finished");
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            // Abandoned session: do not leave ffmpeg running.
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
