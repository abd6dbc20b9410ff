//! Core of a vertical-swipe Gaussian splat viewer.
//!
//! [`navigator::SplatNavigator`] turns wheel and touch gestures into
//! serialized transitions, [`manager::SplatManager`] swaps scenes in and out
//! of a [`host::SceneHost`] and prefetches the next one, and
//! [`particles::SplatParticles`] plays a disintegration burst sampled from the
//! outgoing scene.

pub mod camera;
pub mod catalog;
pub mod config;
pub mod easing;
pub mod formats;
pub mod gpu;
pub mod host;
pub mod manager;
pub mod navigator;
pub mod particles;
pub mod preload;
pub mod render_job;
pub mod scene_graph;
pub mod splat_mesh;
pub mod ticker;
pub mod viewer;

pub mod cli;
