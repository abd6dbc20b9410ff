//! Disintegration bursts sampled from a live splat scene.
//!
//! A burst takes a uniform, deterministic subsample of splat centers, gives
//! each point a jittered velocity biased up or down, and animates the cloud
//! outward while it fades and grows. At most one burst is alive at a time;
//! starting a new one tears down the previous one first.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec3;

use crate::config::ParticleConfig;
use crate::scene_graph::{EntityId, PointCloud, SceneEntity, SceneGraph};
use crate::splat_mesh::SplatMesh;

/// Half-width of the horizontal velocity jitter.
const HORIZONTAL_JITTER: f32 = 0.35;
/// Vertical speed range before the direction sign is applied.
const VERTICAL_MIN: f32 = 0.4;
const VERTICAL_RANGE: f32 = 0.8;

/// Which way the outgoing content leaves the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstDirection {
    Up,
    Down,
}

impl BurstDirection {
    /// Sign applied to the vertical velocity magnitude.
    pub fn scatter(self) -> f32 {
        match self {
            BurstDirection::Up => 1.0,
            BurstDirection::Down => -1.0,
        }
    }
}

/// Sample count and stride for a mesh of `total` splats.
///
/// `count = min(requested, total)`, `stride = max(1, total / count)`.
pub fn sampling_plan(total: usize, requested: usize) -> (usize, usize) {
    let count = requested.min(total);
    let stride = if count == 0 { 1 } else { (total / count).max(1) };
    (count, stride)
}

/// State of the live burst.
#[derive(Debug)]
struct Burst {
    entity: EntityId,
    sampled: Vec<usize>,
    velocities: Vec<Vec3>,
    start_ms: f64,
    last_update_ms: f64,
    duration_ms: f64,
    progress: f32,
}

/// Owner of at most one particle burst in a shared scene graph.
pub struct SplatParticles {
    scene: Rc<RefCell<SceneGraph>>,
    config: ParticleConfig,
    burst: Option<Burst>,
    /// Deterministic RNG state.
    rng_state: u64,
}

impl SplatParticles {
    pub fn new(scene: Rc<RefCell<SceneGraph>>, config: ParticleConfig) -> Self {
        let rng_state = config.seed;
        Self {
            scene,
            config,
            burst: None,
            rng_state,
        }
    }

    pub fn config(&self) -> &ParticleConfig {
        &self.config
    }

    /// Start a burst from the splats of `mesh`, replacing any live burst.
    pub fn start_from_splat(
        &mut self,
        mesh: &dyn SplatMesh,
        direction: BurstDirection,
        duration_ms: f64,
        sample_count: usize,
        now_ms: f64,
    ) {
        self.stop();

        let total = mesh.splat_count();
        let (count, stride) = sampling_plan(total, sample_count);
        let scatter = direction.scatter();

        let mut sampled = Vec::with_capacity(count);
        let mut positions = Vec::with_capacity(count);
        let mut velocities = Vec::with_capacity(count);
        for i in 0..count {
            let index = i * stride;
            sampled.push(index);
            positions.push(mesh.splat_center(index));

            let vx = (self.next_f32() - 0.5) * HORIZONTAL_JITTER * 2.0;
            let vy = (VERTICAL_MIN + self.next_f32() * VERTICAL_RANGE) * scatter;
            let vz = (self.next_f32() - 0.5) * HORIZONTAL_JITTER * 2.0;
            velocities.push(Vec3::new(vx, vy, vz));
        }

        let cloud = PointCloud::new(
            positions,
            self.config.color,
            self.config.base_size,
            self.config.base_opacity,
        );
        let entity = self.scene.borrow_mut().attach(SceneEntity::Points(cloud));

        log::debug!(
            "Burst started: {} of {} splats (stride {}), {:?}, {} ms",
            count,
            total,
            stride,
            direction,
            duration_ms
        );

        self.burst = Some(Burst {
            entity,
            sampled,
            velocities,
            start_ms: now_ms,
            last_update_ms: now_ms,
            duration_ms,
            progress: 0.0,
        });
    }

    /// Advance the burst to `now_ms`.
    ///
    /// Returns true while the burst is still animating. The call that reaches
    /// the end releases the burst and returns false; with no burst this is a
    /// no-op returning false.
    pub fn update(&mut self, now_ms: f64) -> bool {
        let Some(burst) = self.burst.as_mut() else {
            return false;
        };

        let elapsed = (now_ms - burst.start_ms).max(0.0);
        let t = if burst.duration_ms > 0.0 {
            (elapsed / burst.duration_ms).clamp(0.0, 1.0) as f32
        } else {
            1.0
        };
        burst.progress = burst.progress.max(t);
        let eased = self.config.easing.apply(burst.progress);

        // Displacement follows real elapsed time, not frame count.
        let dt_secs = ((now_ms - burst.last_update_ms).max(0.0) / 1000.0) as f32;
        burst.last_update_ms = burst.last_update_ms.max(now_ms);
        let step = self.config.motion_scale * dt_secs;

        if let Some(points) = self.scene.borrow_mut().points_mut(burst.entity) {
            for (position, velocity) in points.positions.iter_mut().zip(&burst.velocities) {
                *position += *velocity * step;
            }
            points.opacity = self.config.base_opacity * (1.0 - eased);
            points.size = self.config.base_size * (1.0 + self.config.size_growth * eased);
        }

        if burst.progress >= 1.0 {
            self.stop();
            return false;
        }
        true
    }

    /// Detach and release the live burst, if any.
    pub fn stop(&mut self) {
        if let Some(burst) = self.burst.take() {
            self.scene.borrow_mut().destroy(burst.entity);
            log::debug!("Burst stopped at t={:.2}", burst.progress);
        }
    }

    pub fn is_active(&self) -> bool {
        self.burst.is_some()
    }

    /// Linear progress of the live burst in [0, 1].
    pub fn progress(&self) -> Option<f32> {
        self.burst.as_ref().map(|b| b.progress)
    }

    /// Scene entity of the live burst's point cloud.
    pub fn entity(&self) -> Option<EntityId> {
        self.burst.as_ref().map(|b| b.entity)
    }

    pub fn particle_count(&self) -> usize {
        self.burst.as_ref().map_or(0, |b| b.sampled.len())
    }

    /// Splat indices the live burst was sampled from.
    pub fn sampled_indices(&self) -> Option<&[usize]> {
        self.burst.as_ref().map(|b| b.sampled.as_slice())
    }

    pub fn velocities(&self) -> Option<&[Vec3]> {
        self.burst.as_ref().map(|b| b.velocities.as_slice())
    }

    /// Next value in [0, 1) from the xorshift64 generator.
    fn next_f32(&mut self) -> f32 {
        // Seed 0 is a fixed point of xorshift.
        if self.rng_state == 0 {
            self.rng_state = 0x5DEECE66D;
        }
        self.rng_state ^= self.rng_state << 13;
        self.rng_state ^= self.rng_state >> 7;
        self.rng_state ^= self.rng_state << 17;
        ((self.rng_state >> 40) as f32) / ((1u64 << 24) as f32)
    }
}

impl Drop for SplatParticles {
    fn drop(&mut self) {
        if let Some(burst) = self.burst.take() {
            if let Ok(mut scene) = self.scene.try_borrow_mut() {
                scene.destroy(burst.entity);
            }
        }
    }
}
