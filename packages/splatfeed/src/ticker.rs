//! Clocks and the per-frame driver for particle bursts.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

use crate::particles::SplatParticles;

/// Monotonic time source in milliseconds.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// Wall-clock time measured from construction.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Externally advanced clock for offline rendering and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now: Cell::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: f64) {
        self.now.set(now_ms);
    }

    pub fn advance(&self, delta_ms: f64) {
        self.now.set(self.now.get() + delta_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

/// Drives a particle system once per display frame.
///
/// The ticker is owned by whatever runs the frame loop; dropping it stops
/// nothing by itself, the burst still ends when its duration elapses or
/// `stop()` is called on the particles.
pub struct FrameTicker {
    particles: Rc<RefCell<SplatParticles>>,
    clock: Rc<dyn Clock>,
    frames: u64,
}

impl FrameTicker {
    pub fn new(particles: Rc<RefCell<SplatParticles>>, clock: Rc<dyn Clock>) -> Self {
        Self {
            particles,
            clock,
            frames: 0,
        }
    }

    /// Advance one frame. Returns true while a burst is still animating.
    pub fn tick(&mut self) -> bool {
        self.frames += 1;
        let now = self.clock.now_ms();
        self.particles.borrow_mut().update(now)
    }

    /// Frames ticked so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_animating(&self) -> bool {
        self.particles.borrow().is_active()
    }
}
