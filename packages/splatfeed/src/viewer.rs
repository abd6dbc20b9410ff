//! A complete viewer session over local files.
//!
//! Owns the shared scene graph and wires the host, manager, particles,
//! navigator and frame ticker together the way a page would.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use crate::catalog::{Catalog, SplatEntry};
use crate::config::ViewerConfig;
use crate::host::{FsFetcher, LocalSceneHost};
use crate::manager::SplatManager;
use crate::navigator::{NavDirection, SplatNavigator, TransitionOutcome};
use crate::particles::SplatParticles;
use crate::scene_graph::SceneGraph;
use crate::ticker::{Clock, FrameTicker};

pub type LocalNavigator = SplatNavigator<LocalSceneHost<FsFetcher>, FsFetcher>;

pub struct ViewerSession {
    scene: Rc<RefCell<SceneGraph>>,
    navigator: LocalNavigator,
    ticker: FrameTicker,
}

impl ViewerSession {
    /// Build a session whose scene paths resolve against `asset_root`.
    pub fn new(catalog: Catalog, asset_root: impl Into<PathBuf>, config: &ViewerConfig, clock: Rc<dyn Clock>) -> Self {
        let asset_root = asset_root.into();
        let scene = Rc::new(RefCell::new(SceneGraph::new()));

        let host = LocalSceneHost::new(scene.clone(), FsFetcher::new(asset_root.clone()));
        let manager = SplatManager::new(catalog, host, FsFetcher::new(asset_root), config.scene_load.clone());
        let particles = Rc::new(RefCell::new(SplatParticles::new(scene.clone(), config.particles.clone())));
        let ticker = FrameTicker::new(particles.clone(), clock.clone());
        let navigator = SplatNavigator::new(manager, particles, clock, config.navigator.clone());

        Self {
            scene,
            navigator,
            ticker,
        }
    }

    /// Load the first entry and warm the cache for the second.
    pub async fn start(&self) -> anyhow::Result<()> {
        self.navigator.manager().load_initial().await?;
        self.navigator.manager().run_pending_preloads().await;
        Ok(())
    }

    /// Navigate one step, then run any preload the swap queued.
    pub async fn navigate(&self, direction: NavDirection) -> anyhow::Result<TransitionOutcome> {
        let outcome = self.navigator.trigger_transition(direction).await;
        self.navigator.manager().run_pending_preloads().await;
        outcome
    }

    /// Advance the particle driver by one frame.
    pub fn frame(&mut self) -> bool {
        self.ticker.tick()
    }

    pub fn scene(&self) -> &Rc<RefCell<SceneGraph>> {
        &self.scene
    }

    pub fn navigator(&self) -> &LocalNavigator {
        &self.navigator
    }

    pub fn current_entry(&self) -> Option<&SplatEntry> {
        self.navigator.manager().current_entry()
    }

    pub fn frames(&self) -> u64 {
        self.ticker.frames()
    }
}
