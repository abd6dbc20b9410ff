//! Scene catalog loaded from a manifest.
//!
//! The catalog is an ordered, read-only list of [`SplatEntry`] records. Entry
//! order is navigation order; navigation wraps around at both ends.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

fn default_up() -> [f32; 3] {
    [0.0, 1.0, 0.0]
}

fn default_fov() -> f32 {
    50.0
}

/// A stored camera viewpoint for an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraPose {
    pub position: [f32; 3],
    pub look_at: [f32; 3],
    #[serde(default = "default_up")]
    pub up: [f32; 3],
    /// Vertical field of view in degrees.
    #[serde(default = "default_fov")]
    pub fov: f32,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 4.0],
            look_at: [0.0, 0.0, 0.0],
            up: default_up(),
            fov: default_fov(),
        }
    }
}

/// One navigable scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplatEntry {
    pub id: String,
    pub name: String,
    /// Source path of the splat file, relative to the asset root.
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub camera_poses: Vec<CameraPose>,
}

impl SplatEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            file: file.into(),
            poster: None,
            camera_poses: Vec::new(),
        }
    }

    /// The pose to frame this entry with, falling back to the default pose.
    pub fn primary_pose(&self) -> CameraPose {
        self.camera_poses.first().cloned().unwrap_or_default()
    }
}

/// Manifest files come either as a bare array or wrapped in an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum Manifest {
    List(Vec<SplatEntry>),
    Wrapped { splats: Vec<SplatEntry> },
}

/// Ordered list of entries for a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    entries: Vec<SplatEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<SplatEntry>) -> Self {
        Self { entries }
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let manifest: Manifest =
            serde_json::from_str(json).context("Failed to parse splat manifest")?;
        let entries = match manifest {
            Manifest::List(entries) => entries,
            Manifest::Wrapped { splats } => splats,
        };
        let catalog = Self { entries };
        catalog.validate().map_err(anyhow::Error::msg)?;
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {:?}", path))?;
        Self::from_json(&json)
    }

    /// Best-effort manifest load. Any failure yields `fallback`.
    pub fn load_or_fallback(path: &Path, fallback: Catalog) -> Self {
        match Self::from_file(path) {
            Ok(catalog) => {
                log::info!("Loaded {} splat entries from {:?}", catalog.len(), path);
                catalog
            }
            Err(e) => {
                log::warn!("Using fallback catalog ({} entries): {:#}", fallback.len(), e);
                fallback
            }
        }
    }

    /// Reject duplicate ids and entries without a source file.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if entry.file.trim().is_empty() {
                return Err(format!("Entry '{}' has no file", entry.id));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(format!("Duplicate entry id '{}'", entry.id));
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> &[SplatEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&SplatEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index one step forward, wrapping to 0 after the last entry.
    pub fn next_index(&self, index: usize) -> usize {
        if self.entries.is_empty() {
            return 0;
        }
        (index + 1) % self.entries.len()
    }

    /// Index one step back, wrapping to the last entry before 0.
    pub fn prev_index(&self, index: usize) -> usize {
        let len = self.entries.len();
        if len == 0 {
            return 0;
        }
        (index + len - 1) % len
    }
}
