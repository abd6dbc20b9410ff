//! Read-only view of a loaded splat scene.

use glam::Vec3;

/// Accessor over the splats of the scene currently held by a renderer.
///
/// Only centers are exposed; covariance, color and opacity stay opaque.
pub trait SplatMesh {
    fn splat_count(&self) -> usize;

    /// World-space center of splat `index`. `index` must be below `splat_count()`.
    fn splat_center(&self, index: usize) -> Vec3;
}

/// Decoded splat centers with optional per-splat colors.
#[derive(Debug, Clone, Default)]
pub struct SplatCloud {
    pub centers: Vec<Vec3>,
    /// RGBA in 0..1. Either empty or the same length as `centers`.
    pub colors: Vec<[f32; 4]>,
}

impl SplatCloud {
    pub fn new(centers: Vec<Vec3>) -> Self {
        Self {
            centers,
            colors: Vec::new(),
        }
    }

    pub fn with_colors(centers: Vec<Vec3>, colors: Vec<[f32; 4]>) -> Self {
        debug_assert!(colors.is_empty() || colors.len() == centers.len());
        Self { centers, colors }
    }

    pub fn color(&self, index: usize) -> Option<[f32; 4]> {
        self.colors.get(index).copied()
    }

    /// Midpoint of the axis-aligned bounds, or the origin when empty.
    pub fn center_of_bounds(&self) -> Vec3 {
        if self.centers.is_empty() {
            return Vec3::ZERO;
        }
        let (min, max) = self.centers.iter().fold(
            (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
            |(min, max), c| (min.min(*c), max.max(*c)),
        );
        (min + max) * 0.5
    }

    /// Copy without splats whose alpha (as 0-255) is below `threshold`.
    /// Clouds without colors are returned unchanged.
    pub fn without_transparent(self, threshold: u8) -> Self {
        if self.colors.is_empty() || threshold == 0 {
            return self;
        }
        let (centers, colors) = self
            .centers
            .into_iter()
            .zip(self.colors)
            .filter(|(_, color)| (color[3] * 255.0).round() >= threshold as f32)
            .unzip();
        Self { centers, colors }
    }
}

impl SplatMesh for SplatCloud {
    fn splat_count(&self) -> usize {
        self.centers.len()
    }

    fn splat_center(&self, index: usize) -> Vec3 {
        self.centers[index]
    }
}
