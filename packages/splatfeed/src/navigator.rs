//! Gesture handling and transition sequencing.
//!
//! The navigator has two states, idle and transitioning. While a transition
//! is in flight every gesture is dropped, so at most one call into
//! [`SplatManager::transition_to`] is ever outstanding. The particle burst is
//! started synchronously and animates on its own frame driver; only the
//! scene swap is awaited.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::config::NavigatorConfig;
use crate::host::{ResourceFetcher, SceneHost};
use crate::manager::SplatManager;
use crate::particles::{BurstDirection, SplatParticles};
use crate::ticker::Clock;

/// Transition lifecycle listener.
pub type Listener = Rc<dyn Fn()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavDirection {
    Next,
    Prev,
}

impl std::str::FromStr for NavDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "next" => Ok(NavDirection::Next),
            "prev" => Ok(NavDirection::Prev),
            other => Err(format!("Unknown direction '{}' (expected next or prev)", other)),
        }
    }
}

impl NavDirection {
    /// Outgoing content leaves upward when moving forward.
    pub fn burst_direction(self) -> BurstDirection {
        match self {
            NavDirection::Next => BurstDirection::Up,
            NavDirection::Prev => BurstDirection::Down,
        }
    }
}

/// What a gesture or trigger call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The scene at `to` is now resident.
    Completed { from: usize, to: usize },
    /// Dropped because another transition is in flight.
    Busy,
    /// Dropped because the catalog has fewer than two entries.
    NotEnoughEntries,
    /// The input did not map to a navigation gesture.
    Ignored,
}

/// One active touch, in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub client_y: f32,
}

/// Map a wheel delta to a direction. The threshold is inclusive.
pub fn wheel_direction(delta_y: f32, threshold: f32) -> Option<NavDirection> {
    if delta_y.abs() < threshold {
        None
    } else if delta_y > 0.0 {
        Some(NavDirection::Next)
    } else {
        Some(NavDirection::Prev)
    }
}

/// Map a vertical swipe to a direction. Finger moving up means next.
pub fn swipe_direction(anchor_y: f32, end_y: f32, threshold: f32) -> Option<NavDirection> {
    let travel = anchor_y - end_y;
    if travel >= threshold {
        Some(NavDirection::Next)
    } else if travel <= -threshold {
        Some(NavDirection::Prev)
    } else {
        None
    }
}

fn notify(listeners: &RefCell<Vec<Listener>>) {
    // Snapshot so a listener may register further listeners.
    let snapshot: Vec<Listener> = listeners.borrow().clone();
    for listener in snapshot {
        listener();
    }
}

/// Holds the transitioning flag for the lifetime of one transition.
///
/// Dropping the guard fires the end listeners and clears the flag, on success,
/// on error and when the transition future itself is dropped.
struct TransitionGuard<'a> {
    flag: &'a Cell<bool>,
    on_end: &'a RefCell<Vec<Listener>>,
}

impl<'a> TransitionGuard<'a> {
    fn acquire(flag: &'a Cell<bool>, on_start: &RefCell<Vec<Listener>>, on_end: &'a RefCell<Vec<Listener>>) -> Self {
        flag.set(true);
        // Guard exists before listeners run, so a panicking listener still releases the flag.
        let guard = Self { flag, on_end };
        notify(on_start);
        guard
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        notify(self.on_end);
        self.flag.set(false);
    }
}

pub struct SplatNavigator<H: SceneHost, F: ResourceFetcher> {
    manager: SplatManager<H, F>,
    particles: Rc<RefCell<SplatParticles>>,
    clock: Rc<dyn Clock>,
    config: NavigatorConfig,
    transitioning: Cell<bool>,
    touch_anchor_y: Cell<Option<f32>>,
    on_start: RefCell<Vec<Listener>>,
    on_end: RefCell<Vec<Listener>>,
}

impl<H: SceneHost, F: ResourceFetcher> SplatNavigator<H, F> {
    pub fn new(
        manager: SplatManager<H, F>,
        particles: Rc<RefCell<SplatParticles>>,
        clock: Rc<dyn Clock>,
        config: NavigatorConfig,
    ) -> Self {
        Self {
            manager,
            particles,
            clock,
            config,
            transitioning: Cell::new(false),
            touch_anchor_y: Cell::new(None),
            on_start: RefCell::new(Vec::new()),
            on_end: RefCell::new(Vec::new()),
        }
    }

    pub fn manager(&self) -> &SplatManager<H, F> {
        &self.manager
    }

    pub fn particles(&self) -> &Rc<RefCell<SplatParticles>> {
        &self.particles
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    pub fn is_transitioning(&self) -> bool {
        self.transitioning.get()
    }

    /// Called synchronously when a transition begins.
    pub fn on_transition_start(&self, listener: impl Fn() + 'static) {
        self.on_start.borrow_mut().push(Rc::new(listener));
    }

    /// Called synchronously when a transition ends, successfully or not.
    pub fn on_transition_end(&self, listener: impl Fn() + 'static) {
        self.on_end.borrow_mut().push(Rc::new(listener));
    }

    /// Move one entry forward or back, wrapping at both ends.
    ///
    /// Starts a burst from the currently displayed mesh (when the host has
    /// one) and awaits the scene swap. A swap failure is returned as `Err`
    /// after the navigator is back to idle.
    pub async fn trigger_transition(&self, direction: NavDirection) -> anyhow::Result<TransitionOutcome> {
        if self.transitioning.get() {
            log::debug!("Transition in flight, dropping {:?}", direction);
            return Ok(TransitionOutcome::Busy);
        }
        let catalog = self.manager.catalog();
        if catalog.len() < 2 {
            return Ok(TransitionOutcome::NotEnoughEntries);
        }

        let _guard = TransitionGuard::acquire(&self.transitioning, &self.on_start, &self.on_end);

        let from = self.manager.current_index();
        let to = match direction {
            NavDirection::Next => catalog.next_index(from),
            NavDirection::Prev => catalog.prev_index(from),
        };

        match self.manager.host().splat_mesh() {
            Some(mesh) => self.particles.borrow_mut().start_from_splat(
                mesh.as_ref(),
                direction.burst_direction(),
                self.config.burst_duration_ms,
                self.config.burst_sample_count,
                self.clock.now_ms(),
            ),
            None => log::debug!("No live splat mesh, skipping burst"),
        }

        log::info!("Transition {:?}: {} -> {}", direction, from, to);
        self.manager.transition_to(to).await?;
        Ok(TransitionOutcome::Completed { from, to })
    }

    pub async fn on_wheel(&self, delta_y: f32) -> anyhow::Result<TransitionOutcome> {
        if self.transitioning.get() {
            return Ok(TransitionOutcome::Busy);
        }
        match wheel_direction(delta_y, self.config.wheel_threshold) {
            Some(direction) => self.trigger_transition(direction).await,
            None => Ok(TransitionOutcome::Ignored),
        }
    }

    /// Record a swipe anchor. Only single-finger touches while idle count.
    pub fn on_touch_start(&self, touches: &[TouchPoint]) {
        let anchor = match touches {
            [touch] if !self.transitioning.get() => Some(touch.client_y),
            _ => None,
        };
        self.touch_anchor_y.set(anchor);
    }

    /// Resolve the swipe started by [`on_touch_start`](Self::on_touch_start).
    pub async fn on_touch_end(&self, changed_touches: &[TouchPoint]) -> anyhow::Result<TransitionOutcome> {
        let Some(anchor_y) = self.touch_anchor_y.take() else {
            return Ok(TransitionOutcome::Ignored);
        };
        let Some(end) = changed_touches.first() else {
            return Ok(TransitionOutcome::Ignored);
        };
        match swipe_direction(anchor_y, end.client_y, self.config.swipe_threshold) {
            Some(direction) => self.trigger_transition(direction).await,
            None => Ok(TransitionOutcome::Ignored),
        }
    }
}
