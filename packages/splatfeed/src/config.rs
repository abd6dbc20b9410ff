//! Viewer configuration.
//!
//! All fields have defaults, so a config file only needs the values it
//! overrides.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::easing::EasingFunction;

fn default_wheel_threshold() -> f32 {
    40.0
}

fn default_swipe_threshold() -> f32 {
    50.0
}

fn default_burst_duration_ms() -> f64 {
    1200.0
}

fn default_burst_sample_count() -> usize {
    6000
}

fn default_base_size() -> f32 {
    0.02
}

fn default_base_opacity() -> f32 {
    1.0
}

fn default_particle_color() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn default_motion_scale() -> f32 {
    1.0
}

fn default_size_growth() -> f32 {
    0.6
}

fn default_alpha_removal_threshold() -> u8 {
    5
}

fn default_true() -> bool {
    true
}

/// Gesture thresholds and burst parameters used by the navigator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatorConfig {
    /// Minimum |deltaY| of a wheel event that counts as navigation.
    #[serde(default = "default_wheel_threshold")]
    pub wheel_threshold: f32,
    /// Minimum vertical travel of a single-finger swipe.
    #[serde(default = "default_swipe_threshold")]
    pub swipe_threshold: f32,
    #[serde(default = "default_burst_duration_ms")]
    pub burst_duration_ms: f64,
    #[serde(default = "default_burst_sample_count")]
    pub burst_sample_count: usize,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            wheel_threshold: default_wheel_threshold(),
            swipe_threshold: default_swipe_threshold(),
            burst_duration_ms: default_burst_duration_ms(),
            burst_sample_count: default_burst_sample_count(),
        }
    }
}

/// Look and motion of a particle burst.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticleConfig {
    #[serde(default = "default_base_size")]
    pub base_size: f32,
    #[serde(default = "default_base_opacity")]
    pub base_opacity: f32,
    #[serde(default = "default_particle_color")]
    pub color: [f32; 3],
    /// World units per second per unit of velocity.
    #[serde(default = "default_motion_scale")]
    pub motion_scale: f32,
    /// Fractional size increase reached at the end of a burst.
    #[serde(default = "default_size_growth")]
    pub size_growth: f32,
    #[serde(default)]
    pub easing: EasingFunction,
    /// Seed for velocity jitter. 0 selects a fixed non-zero default.
    #[serde(default)]
    pub seed: u64,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            base_size: default_base_size(),
            base_opacity: default_base_opacity(),
            color: default_particle_color(),
            motion_scale: default_motion_scale(),
            size_growth: default_size_growth(),
            easing: EasingFunction::QuadraticInOut,
            seed: 0,
        }
    }
}

/// Options forwarded to the scene host when a scene is added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneLoadConfig {
    /// Stream the first scene in progressively on cold start.
    #[serde(default = "default_true")]
    pub progressive_load: bool,
    #[serde(default = "default_alpha_removal_threshold")]
    pub splat_alpha_removal_threshold: u8,
    #[serde(default)]
    pub show_loading_ui: bool,
}

impl Default for SceneLoadConfig {
    fn default() -> Self {
        Self {
            progressive_load: true,
            splat_alpha_removal_threshold: default_alpha_removal_threshold(),
            show_loading_ui: false,
        }
    }
}

/// Top-level viewer configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerConfig {
    #[serde(default)]
    pub navigator: NavigatorConfig,
    #[serde(default)]
    pub particles: ParticleConfig,
    #[serde(default)]
    pub scene_load: SceneLoadConfig,
}

impl ViewerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config: ViewerConfig =
            serde_json::from_str(&json).context("Failed to parse viewer config")?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.navigator.wheel_threshold <= 0.0 {
            return Err("Wheel threshold must be positive".to_string());
        }
        if self.navigator.swipe_threshold <= 0.0 {
            return Err("Swipe threshold must be positive".to_string());
        }
        if self.navigator.burst_duration_ms <= 0.0 {
            return Err("Burst duration must be positive".to_string());
        }
        if self.particles.base_size <= 0.0 {
            return Err("Particle size must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ViewerConfig::default();
        assert_eq!(config.navigator.wheel_threshold, 40.0);
        assert_eq!(config.navigator.swipe_threshold, 50.0);
        assert_eq!(config.navigator.burst_sample_count, 6000);
        assert_eq!(config.particles.size_growth, 0.6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_override() {
        let json = r#"{"navigator": {"wheelThreshold": 80}, "sceneLoad": {"showLoadingUi": true}}"#;
        let config: ViewerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.navigator.wheel_threshold, 80.0);
        assert_eq!(config.navigator.swipe_threshold, 50.0);
        assert!(config.scene_load.show_loading_ui);
        assert!(config.scene_load.progressive_load);
        assert_eq!(config.particles, ParticleConfig::default());
    }

    #[test]
    fn test_validation() {
        let mut config = ViewerConfig::default();
        config.navigator.burst_duration_ms = 0.0;
        assert!(config.validate().is_err());
    }
}
