use facelapse_core::{CapturePolicy, CollisionPolicy};
use std::path::PathBuf;
use std::str::FromStr;

/// Application configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing the SCRFD ONNX model.
    pub model_dir: PathBuf,
    /// Root for photos, videos and the profile.
    pub data_dir: PathBuf,
    /// Reference profile JSON file.
    pub profile_path: PathBuf,
    /// Live loop tick period.
    pub poll_interval_ms: u64,
    /// Frames to discard at startup while auto-exposure settles.
    pub warmup_frames: usize,
    pub capture_policy: CapturePolicy,
    pub collision_policy: CollisionPolicy,
    /// ffmpeg executable, looked up on PATH unless it is a path.
    pub ffmpeg: String,
    /// Flip frames horizontally (selfie view).
    pub mirror: bool,
}

impl Config {
    /// Load configuration from `FACELAPSE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("FACELAPSE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        let model_dir = std::env::var("FACELAPSE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));

        let profile_path = std::env::var("FACELAPSE_PROFILE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("app_config.json"));

        Self {
            camera_device: std::env::var("FACELAPSE_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir,
            data_dir,
            profile_path,
            poll_interval_ms: env_parse("FACELAPSE_POLL_INTERVAL_MS", 30u64).max(1),
            warmup_frames: env_parse("FACELAPSE_WARMUP_FRAMES", 4),
            capture_policy: env_parse("FACELAPSE_CAPTURE_POLICY", CapturePolicy::RequireReady),
            collision_policy: env_parse("FACELAPSE_COLLISION_POLICY", CollisionPolicy::Reject),
            ffmpeg: std::env::var("FACELAPSE_FFMPEG").unwrap_or_else(|_| "ffmpeg".to_string()),
            mirror: std::env::var("FACELAPSE_MIRROR")
                .map(|v| v != "0")
                .unwrap_or(true),
        }
    }

    /// Re-root every path derived from the data directory. Explicit
    /// `FACELAPSE_MODEL_DIR` / `FACELAPSE_PROFILE_PATH` still win.
    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        if std::env::var_os("FACELAPSE_MODEL_DIR").is_none() {
            self.model_dir = data_dir.join("models");
        }
        if std::env::var_os("FACELAPSE_PROFILE_PATH").is_none() {
            self.profile_path = data_dir.join("app_config.json");
        }
        self.data_dir = data_dir;
        self
    }

    pub fn photos_dir(&self) -> PathBuf {
        self.data_dir.join("face_photos")
    }

    /// Timelapse videos land next to the photo directory.
    pub fn videos_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    /// Where the live loop's `p` command saves the overlay preview.
    pub fn preview_path(&self) -> PathBuf {
        self.data_dir.join("preview.png")
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facelapse")
}

/// Parse `key` or fall back to `default`. Unparseable values are logged and ignored.
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring invalid configuration value");
            default
        }),
        Err(_) => default,
    }
}
