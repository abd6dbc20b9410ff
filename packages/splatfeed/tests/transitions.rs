//! Navigation behavior against a scripted scene host.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use anyhow::bail;
use glam::Vec3;

use splatfeed::catalog::{Catalog, SplatEntry};
use splatfeed::config::{NavigatorConfig, ParticleConfig, SceneLoadConfig};
use splatfeed::host::{ResourceFetcher, SceneHost, SceneLoadOptions, SceneSource};
use splatfeed::manager::SplatManager;
use splatfeed::navigator::{NavDirection, SplatNavigator, TouchPoint, TransitionOutcome};
use splatfeed::particles::SplatParticles;
use splatfeed::scene_graph::SceneGraph;
use splatfeed::splat_mesh::{SplatCloud, SplatMesh};
use splatfeed::ticker::ManualClock;

struct NoopWake;

impl Wake for NoopWake {
    fn wake(self: Arc<Self>) {}
}

fn poll_once<F: Future>(future: Pin<&mut F>) -> Poll<F::Output> {
    let waker = Waker::from(Arc::new(NoopWake));
    let mut cx = Context::from_waker(&waker);
    future.poll(&mut cx)
}

/// Resolves once the gate is open.
struct GateWait(Rc<Cell<bool>>);

impl Future for GateWait {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.0.get() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

#[derive(Default)]
struct HostState {
    gate_open: Rc<Cell<bool>>,
    adds: Cell<usize>,
    removes: Cell<usize>,
    fail_next_add: Cell<bool>,
    no_mesh: Cell<bool>,
    sources: RefCell<Vec<String>>,
    mesh: RefCell<Option<Rc<SplatCloud>>>,
}

struct ScriptedHost(Rc<HostState>);

impl SceneHost for ScriptedHost {
    async fn add_splat_scene(&self, source: SceneSource, _options: &SceneLoadOptions) -> anyhow::Result<()> {
        let state = &self.0;
        state.adds.set(state.adds.get() + 1);
        state.sources.borrow_mut().push(source.label().to_string());
        GateWait(state.gate_open.clone()).await;
        if state.fail_next_add.replace(false) {
            bail!("simulated load failure");
        }
        if !state.no_mesh.get() {
            let centers = (0..100).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect();
            *state.mesh.borrow_mut() = Some(Rc::new(SplatCloud::new(centers)));
        }
        Ok(())
    }

    async fn remove_splat_scene(&self, _index: usize, _show_loading_ui: bool) -> anyhow::Result<()> {
        self.0.removes.set(self.0.removes.get() + 1);
        *self.0.mesh.borrow_mut() = None;
        Ok(())
    }

    fn splat_mesh(&self) -> Option<Rc<dyn SplatMesh>> {
        self.0
            .mesh
            .borrow()
            .clone()
            .map(|cloud| cloud as Rc<dyn SplatMesh>)
    }
}

struct CountingFetcher(Rc<RefCell<Vec<String>>>);

impl ResourceFetcher for CountingFetcher {
    async fn fetch(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        self.0.borrow_mut().push(path.to_string());
        Ok(vec![0; 32])
    }
}

struct Fixture {
    host: Rc<HostState>,
    fetches: Rc<RefCell<Vec<String>>>,
    scene: Rc<RefCell<SceneGraph>>,
    navigator: SplatNavigator<ScriptedHost, CountingFetcher>,
}

fn catalog(len: usize) -> Catalog {
    Catalog::new(
        (0..len)
            .map(|i| {
                let id = format!("s{}", i);
                SplatEntry::new(id.clone(), id.to_uppercase(), format!("{}.splat", id))
            })
            .collect(),
    )
}

fn fixture(len: usize) -> Fixture {
    let host = Rc::new(HostState::default());
    host.gate_open.set(true);
    let fetches = Rc::new(RefCell::new(Vec::new()));
    let scene = Rc::new(RefCell::new(SceneGraph::new()));

    let manager = SplatManager::new(
        catalog(len),
        ScriptedHost(host.clone()),
        CountingFetcher(fetches.clone()),
        SceneLoadConfig::default(),
    );
    let particles = Rc::new(RefCell::new(SplatParticles::new(scene.clone(), ParticleConfig::default())));
    let navigator = SplatNavigator::new(
        manager,
        particles,
        Rc::new(ManualClock::new(0.0)),
        NavigatorConfig::default(),
    );
    pollster::block_on(navigator.manager().load_initial()).unwrap();

    Fixture {
        host,
        fetches,
        scene,
        navigator,
    }
}

#[test]
fn test_gestures_during_transition_are_dropped() {
    let f = fixture(3);
    assert_eq!(f.host.adds.get(), 1);
    f.host.gate_open.set(false);

    let mut in_flight = Box::pin(f.navigator.on_wheel(120.0));
    assert!(poll_once(in_flight.as_mut()).is_pending());
    assert!(f.navigator.is_transitioning());

    for _ in 0..10 {
        let outcome = pollster::block_on(f.navigator.on_wheel(120.0)).unwrap();
        assert_eq!(outcome, TransitionOutcome::Busy);
        let outcome = pollster::block_on(f.navigator.trigger_transition(NavDirection::Prev)).unwrap();
        assert_eq!(outcome, TransitionOutcome::Busy);
    }
    assert_eq!(f.host.adds.get(), 2);
    assert_eq!(f.host.removes.get(), 1);

    f.host.gate_open.set(true);
    let outcome = pollster::block_on(in_flight).unwrap();
    assert_eq!(outcome, TransitionOutcome::Completed { from: 0, to: 1 });
    assert!(!f.navigator.is_transitioning());
    assert_eq!(f.host.adds.get(), 2);
}

#[test]
fn test_navigation_wraps_both_ways() {
    let f = fixture(3);

    let prev = pollster::block_on(f.navigator.trigger_transition(NavDirection::Prev)).unwrap();
    assert_eq!(prev, TransitionOutcome::Completed { from: 0, to: 2 });
    assert_eq!(f.navigator.manager().current_entry().unwrap().id, "s2");

    let next = pollster::block_on(f.navigator.trigger_transition(NavDirection::Next)).unwrap();
    assert_eq!(next, TransitionOutcome::Completed { from: 2, to: 0 });
}

#[test]
fn test_next_from_last_entry_goes_to_first() {
    let f = fixture(4);
    pollster::block_on(f.navigator.manager().transition_to(3)).unwrap();

    let outcome = pollster::block_on(f.navigator.trigger_transition(NavDirection::Next)).unwrap();
    assert_eq!(outcome, TransitionOutcome::Completed { from: 3, to: 0 });
}

#[test]
fn test_preloaded_handle_is_single_use() {
    let f = fixture(3);
    let manager = f.navigator.manager();

    pollster::block_on(manager.preload(1));
    assert!(manager.is_preloaded("s1"));
    assert_eq!(*f.fetches.borrow(), vec!["s1.splat"]);

    pollster::block_on(manager.transition_to(1)).unwrap();
    assert!(!manager.is_preloaded("s1"));
    assert_eq!(f.host.sources.borrow().last().unwrap(), "mem://splat/s1");

    pollster::block_on(manager.preload(1));
    assert_eq!(f.fetches.borrow().len(), 2);
}

#[test]
fn test_queued_preload_is_used_by_next_transition() {
    let f = fixture(3);
    let manager = f.navigator.manager();
    assert_eq!(pollster::block_on(manager.run_pending_preloads()), 1);

    let outcome = pollster::block_on(f.navigator.on_wheel(40.0)).unwrap();
    assert_eq!(outcome, TransitionOutcome::Completed { from: 0, to: 1 });
    assert_eq!(f.host.sources.borrow().last().unwrap(), "mem://splat/s1");
    assert_eq!(manager.pending_preloads(), vec![2]);
}

#[test]
fn test_wheel_noise_floor() {
    let f = fixture(3);

    let outcome = pollster::block_on(f.navigator.on_wheel(39.0)).unwrap();
    assert_eq!(outcome, TransitionOutcome::Ignored);
    let outcome = pollster::block_on(f.navigator.on_wheel(-39.0)).unwrap();
    assert_eq!(outcome, TransitionOutcome::Ignored);
    assert_eq!(f.host.adds.get(), 1);

    let outcome = pollster::block_on(f.navigator.on_wheel(40.0)).unwrap();
    assert_eq!(outcome, TransitionOutcome::Completed { from: 0, to: 1 });
    let outcome = pollster::block_on(f.navigator.on_wheel(-40.0)).unwrap();
    assert_eq!(outcome, TransitionOutcome::Completed { from: 1, to: 0 });
}

#[test]
fn test_failed_swap_releases_navigator() {
    let f = fixture(3);
    let ended = Rc::new(Cell::new(0));
    let counter = ended.clone();
    f.navigator.on_transition_end(move || counter.set(counter.get() + 1));

    f.host.fail_next_add.set(true);
    let result = pollster::block_on(f.navigator.trigger_transition(NavDirection::Next));
    assert!(result.is_err());
    assert!(!f.navigator.is_transitioning());
    assert_eq!(ended.get(), 1);
    assert!(!f.navigator.manager().is_resident());

    let outcome = pollster::block_on(f.navigator.trigger_transition(NavDirection::Next)).unwrap();
    assert_eq!(outcome, TransitionOutcome::Completed { from: 0, to: 1 });
    assert_eq!(ended.get(), 2);
    // Nothing was resident, so no second remove.
    assert_eq!(f.host.removes.get(), 1);
}

#[test]
fn test_dropped_transition_releases_navigator() {
    let f = fixture(2);
    f.host.gate_open.set(false);

    let mut in_flight = Box::pin(f.navigator.trigger_transition(NavDirection::Next));
    assert!(poll_once(in_flight.as_mut()).is_pending());
    assert!(f.navigator.is_transitioning());

    drop(in_flight);
    assert!(!f.navigator.is_transitioning());
}

#[test]
fn test_panicking_start_listener_releases_navigator() {
    let f = fixture(3);
    let armed = Rc::new(Cell::new(true));
    let trip = armed.clone();
    f.navigator.on_transition_start(move || {
        if trip.replace(false) {
            panic!("start listener failed");
        }
    });
    let ended = Rc::new(Cell::new(0));
    let counter = ended.clone();
    f.navigator.on_transition_end(move || counter.set(counter.get() + 1));

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pollster::block_on(f.navigator.trigger_transition(NavDirection::Next))
    }));
    assert!(result.is_err());
    assert!(!f.navigator.is_transitioning());
    assert_eq!(ended.get(), 1);
    assert_eq!(f.host.adds.get(), 1);

    let outcome = pollster::block_on(f.navigator.trigger_transition(NavDirection::Next)).unwrap();
    assert_eq!(outcome, TransitionOutcome::Completed { from: 0, to: 1 });
}

#[test]
fn test_burst_samples_outgoing_scene() {
    let f = fixture(2);

    pollster::block_on(f.navigator.trigger_transition(NavDirection::Next)).unwrap();
    let particles = f.navigator.particles().borrow();
    assert!(particles.is_active());
    assert_eq!(particles.particle_count(), 100);
    assert!(particles.velocities().unwrap().iter().all(|v| v.y > 0.0));
    assert_eq!(f.scene.borrow().point_clouds().count(), 1);
}

#[test]
fn test_prev_burst_falls_downward() {
    let f = fixture(2);

    pollster::block_on(f.navigator.trigger_transition(NavDirection::Prev)).unwrap();
    let particles = f.navigator.particles().borrow();
    assert!(particles.velocities().unwrap().iter().all(|v| v.y < 0.0));
}

#[test]
fn test_missing_mesh_skips_burst() {
    let f = fixture(2);
    *f.host.mesh.borrow_mut() = None;
    f.host.no_mesh.set(true);

    let outcome = pollster::block_on(f.navigator.trigger_transition(NavDirection::Next)).unwrap();
    assert_eq!(outcome, TransitionOutcome::Completed { from: 0, to: 1 });
    assert!(!f.navigator.particles().borrow().is_active());
    assert!(f.scene.borrow().is_empty());
}

#[test]
fn test_single_entry_catalog_is_a_noop() {
    let f = fixture(1);
    let started = Rc::new(Cell::new(false));
    let flag = started.clone();
    f.navigator.on_transition_start(move || flag.set(true));

    let outcome = pollster::block_on(f.navigator.on_wheel(200.0)).unwrap();
    assert_eq!(outcome, TransitionOutcome::NotEnoughEntries);
    assert!(!started.get());
    assert_eq!(f.host.adds.get(), 1);
}

#[test]
fn test_lifecycle_listeners_bracket_transition() {
    let f = Rc::new(fixture(3));
    let events = Rc::new(RefCell::new(Vec::new()));

    let log = events.clone();
    let observer = f.clone();
    f.navigator.on_transition_start(move || {
        log.borrow_mut().push(format!("start:{}", observer.navigator.is_transitioning()));
    });
    let log = events.clone();
    f.navigator.on_transition_end(move || log.borrow_mut().push("end".to_string()));

    pollster::block_on(f.navigator.trigger_transition(NavDirection::Next)).unwrap();
    assert_eq!(*events.borrow(), vec!["start:true", "end"]);
}

#[test]
fn test_touch_swipes() {
    let f = fixture(3);

    f.navigator.on_touch_start(&[TouchPoint { client_y: 500.0 }]);
    let outcome = pollster::block_on(f.navigator.on_touch_end(&[TouchPoint { client_y: 450.0 }])).unwrap();
    assert_eq!(outcome, TransitionOutcome::Completed { from: 0, to: 1 });

    f.navigator.on_touch_start(&[TouchPoint { client_y: 300.0 }]);
    let outcome = pollster::block_on(f.navigator.on_touch_end(&[TouchPoint { client_y: 380.0 }])).unwrap();
    assert_eq!(outcome, TransitionOutcome::Completed { from: 1, to: 0 });

    // Tap.
    f.navigator.on_touch_start(&[TouchPoint { client_y: 300.0 }]);
    let outcome = pollster::block_on(f.navigator.on_touch_end(&[TouchPoint { client_y: 290.0 }])).unwrap();
    assert_eq!(outcome, TransitionOutcome::Ignored);

    // Pinch.
    f.navigator.on_touch_start(&[TouchPoint { client_y: 500.0 }, TouchPoint { client_y: 200.0 }]);
    let outcome = pollster::block_on(f.navigator.on_touch_end(&[TouchPoint { client_y: 100.0 }])).unwrap();
    assert_eq!(outcome, TransitionOutcome::Ignored);

    // An end without a start does nothing.
    let outcome = pollster::block_on(f.navigator.on_touch_end(&[TouchPoint { client_y: 100.0 }])).unwrap();
    assert_eq!(outcome, TransitionOutcome::Ignored);
    assert_eq!(f.navigator.manager().current_index(), 0);
}
