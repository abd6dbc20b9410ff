//! Offline session render job and metadata.
//!
//! A session job replays a scripted sequence of navigation gestures against a
//! manifest and renders every frame to disk.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::navigator::NavDirection;

/// Default FPS for rendering.
fn default_fps() -> f32 {
    60.0
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

/// Seconds between scripted gestures.
fn default_gesture_interval() -> f32 {
    1.5
}

/// Seconds rendered after the last gesture.
fn default_tail() -> f32 {
    1.5
}

/// Specification for one offline session render.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionJobSpec {
    /// Catalog manifest (JSON). Scene paths resolve relative to its directory.
    pub manifest_path: PathBuf,

    /// Optional viewer config (JSON).
    #[serde(default)]
    pub config_path: Option<PathBuf>,

    /// Output directory for frames.
    pub output_dir: PathBuf,

    #[serde(default = "default_fps")]
    pub fps: f32,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Gestures fired in order, one per interval.
    #[serde(default)]
    pub gestures: Vec<NavDirection>,

    #[serde(default = "default_gesture_interval")]
    pub gesture_interval_secs: f32,

    #[serde(default = "default_tail")]
    pub tail_secs: f32,
}

impl SessionJobSpec {
    /// Create a job with required fields only.
    pub fn new(manifest_path: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            manifest_path,
            config_path: None,
            output_dir,
            fps: default_fps(),
            width: default_width(),
            height: default_height(),
            gestures: Vec::new(),
            gesture_interval_secs: default_gesture_interval(),
            tail_secs: default_tail(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.manifest_path.exists() {
            return Err(format!("Manifest not found: {:?}", self.manifest_path));
        }
        if let Some(config) = &self.config_path {
            if !config.exists() {
                return Err(format!("Config file not found: {:?}", config));
            }
        }
        if self.fps <= 0.0 {
            return Err("FPS must be positive".to_string());
        }
        if self.width == 0 || self.height == 0 {
            return Err("Width and height must be positive".to_string());
        }
        if self.gesture_interval_secs <= 0.0 {
            return Err("Gesture interval must be positive".to_string());
        }
        if self.tail_secs < 0.0 {
            return Err("Tail must not be negative".to_string());
        }
        Ok(())
    }

    /// Directory scene files are resolved against.
    pub fn asset_root(&self) -> PathBuf {
        self.manifest_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default()
    }

    /// Frame at which gesture `index` fires.
    pub fn gesture_frame(&self, index: usize) -> usize {
        (((index + 1) as f32 * self.gesture_interval_secs) * self.fps).round() as usize
    }

    pub fn total_frames(&self) -> usize {
        let secs = self.gestures.len() as f32 * self.gesture_interval_secs + self.tail_secs;
        ((secs * self.fps).ceil() as usize).max(1)
    }

    pub fn frame_duration_ms(&self) -> f64 {
        1000.0 / self.fps as f64
    }
}

/// One gesture fired during a session render.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub frame: usize,
    pub direction: NavDirection,
    /// Debug rendering of the outcome, or the error message.
    pub outcome: String,
    /// Entry id resident after the gesture.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
}

/// Metadata for a completed render.
/// Written as metadata.json alongside rendered frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderMetadata {
    pub job: SessionJobSpec,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    pub render_duration_secs: f64,

    pub frame_count: usize,

    /// Frames rendered per wall-clock second.
    pub average_render_fps: f64,

    /// SHA-256 of the manifest.
    pub manifest_hash: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,

    pub splatfeed_version: String,

    pub gpu_adapter: String,

    pub transitions: Vec<TransitionRecord>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl RenderMetadata {
    /// Compute SHA-256 hash of file content.
    pub fn hash_file(path: &std::path::Path) -> Result<String, std::io::Error> {
        use std::io::Read;

        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn save(&self, path: &std::path::Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize metadata: {}", e))?;
        std::fs::write(path, json).map_err(|e| format!("Failed to write metadata: {}", e))
    }
}

/// Render phase for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Initialization,
    CatalogLoading,
    GpuSetup,
    FrameRender,
    FrameSave,
    MetadataSave,
}

impl std::fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderPhase::Initialization => write!(f, "Initialization"),
            RenderPhase::CatalogLoading => write!(f, "Catalog Loading"),
            RenderPhase::GpuSetup => write!(f, "GPU Setup"),
            RenderPhase::FrameRender => write!(f, "Frame Render"),
            RenderPhase::FrameSave => write!(f, "Frame Save"),
            RenderPhase::MetadataSave => write!(f, "Metadata Save"),
        }
    }
}

/// Structured error for render failures.
#[derive(Debug)]
pub struct RenderError {
    pub phase: RenderPhase,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.phase, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl RenderError {
    pub fn new(phase: RenderPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        phase: RenderPhase,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            phase,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wrap an `anyhow` error, keeping its full context chain in the message.
    pub fn from_anyhow(phase: RenderPhase, err: anyhow::Error) -> Self {
        Self::new(phase, format!("{:#}", err))
    }
}

/// Progress information for render callbacks.
#[derive(Debug, Clone)]
pub struct RenderProgress {
    /// Current frame number (1-indexed).
    pub current_frame: usize,
    pub total_frames: usize,
    pub elapsed_secs: f64,
    pub eta_secs: Option<f64>,
}

impl RenderProgress {
    /// Progress after `frames_done` frames, with the ETA projected from the
    /// average frame time so far.
    pub fn measure(frames_done: usize, total_frames: usize, elapsed_secs: f64) -> Self {
        let eta_secs = (frames_done > 0).then(|| {
            let remaining = total_frames.saturating_sub(frames_done);
            elapsed_secs / frames_done as f64 * remaining as f64
        });
        Self {
            current_frame: frames_done,
            total_frames,
            elapsed_secs,
            eta_secs,
        }
    }

    /// Get progress as a percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f64 {
        if self.total_frames == 0 {
            100.0
        } else {
            (self.current_frame as f64 / self.total_frames as f64) * 100.0
        }
    }
}
