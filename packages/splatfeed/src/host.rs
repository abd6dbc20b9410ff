//! Renderer-facing seams: scene host and resource fetcher.
//!
//! [`SceneHost`] is the narrow surface the scene manager drives (add, remove,
//! mesh access). [`LocalSceneHost`] implements it over the shared
//! [`SceneGraph`] by decoding splat files; [`FsFetcher`] reads them from disk.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context};

use crate::config::SceneLoadConfig;
use crate::formats;
use crate::preload::PreloadedResource;
use crate::scene_graph::{EntityId, SceneEntity, SceneGraph, SplatSceneNode};
use crate::splat_mesh::{SplatCloud, SplatMesh};

/// Load progress callback, called with values in [0, 1].
pub type ProgressCallback = Rc<dyn Fn(f32)>;

/// Per-load options passed to [`SceneHost::add_splat_scene`].
#[derive(Clone)]
pub struct SceneLoadOptions {
    pub progressive_load: bool,
    /// Splats with alpha (0-255) below this are dropped at load time.
    pub splat_alpha_removal_threshold: u8,
    pub show_loading_ui: bool,
    pub on_progress: Option<ProgressCallback>,
}

impl SceneLoadOptions {
    pub fn from_config(config: &SceneLoadConfig) -> Self {
        Self {
            progressive_load: config.progressive_load,
            splat_alpha_removal_threshold: config.splat_alpha_removal_threshold,
            show_loading_ui: config.show_loading_ui,
            on_progress: None,
        }
    }

    pub fn report_progress(&self, progress: f32) {
        if let Some(callback) = &self.on_progress {
            callback(progress.clamp(0.0, 1.0));
        }
    }
}

impl Default for SceneLoadOptions {
    fn default() -> Self {
        Self::from_config(&SceneLoadConfig::default())
    }
}

impl std::fmt::Debug for SceneLoadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneLoadOptions")
            .field("progressive_load", &self.progressive_load)
            .field("splat_alpha_removal_threshold", &self.splat_alpha_removal_threshold)
            .field("show_loading_ui", &self.show_loading_ui)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Where a scene's bytes come from.
#[derive(Debug, Clone)]
pub enum SceneSource {
    /// Load directly from the entry's path.
    Path(String),
    /// Bytes already fetched by a preload.
    Preloaded(PreloadedResource),
}

impl SceneSource {
    /// Path or local URL, for logging and scene labels.
    pub fn label(&self) -> &str {
        match self {
            SceneSource::Path(path) => path,
            SceneSource::Preloaded(resource) => resource.url(),
        }
    }

    pub fn is_preloaded(&self) -> bool {
        matches!(self, SceneSource::Preloaded(_))
    }
}

/// The renderer's scene surface.
#[allow(async_fn_in_trait)]
pub trait SceneHost {
    async fn add_splat_scene(&self, source: SceneSource, options: &SceneLoadOptions) -> anyhow::Result<()>;

    /// Remove the scene in slot `index` (slot 0 is the oldest resident scene).
    async fn remove_splat_scene(&self, index: usize, show_loading_ui: bool) -> anyhow::Result<()>;

    /// Accessor for the scene currently displayed, if any.
    fn splat_mesh(&self) -> Option<Rc<dyn SplatMesh>>;
}

/// Fetches the raw bytes behind an entry path.
#[allow(async_fn_in_trait)]
pub trait ResourceFetcher {
    async fn fetch(&self, path: &str) -> anyhow::Result<Vec<u8>>;
}

/// Reads resources relative to a root directory.
#[derive(Debug, Clone)]
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

impl ResourceFetcher for FsFetcher {
    async fn fetch(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let full = self.root.join(path);
        std::fs::read(&full).with_context(|| format!("Failed to read {:?}", full))
    }
}

/// Scene host that decodes splat files into the shared scene graph.
pub struct LocalSceneHost<F: ResourceFetcher> {
    scene: Rc<RefCell<SceneGraph>>,
    fetcher: F,
    /// Resident scenes in slot order.
    resident: RefCell<Vec<(EntityId, Rc<SplatCloud>)>>,
}

impl<F: ResourceFetcher> LocalSceneHost<F> {
    pub fn new(scene: Rc<RefCell<SceneGraph>>, fetcher: F) -> Self {
        Self {
            scene,
            fetcher,
            resident: RefCell::new(Vec::new()),
        }
    }

    pub fn resident_count(&self) -> usize {
        self.resident.borrow().len()
    }

    /// The cloud of the most recently added scene.
    pub fn current_cloud(&self) -> Option<Rc<SplatCloud>> {
        self.resident.borrow().last().map(|(_, cloud)| cloud.clone())
    }
}

impl<F: ResourceFetcher> SceneHost for LocalSceneHost<F> {
    async fn add_splat_scene(&self, source: SceneSource, options: &SceneLoadOptions) -> anyhow::Result<()> {
        options.report_progress(0.0);
        if options.show_loading_ui {
            log::info!("Loading {}...", source.label());
        }

        let cloud = match &source {
            SceneSource::Path(path) => {
                let bytes = self.fetcher.fetch(path).await?;
                options.report_progress(0.5);
                formats::decode(path, &bytes)?
            }
            SceneSource::Preloaded(resource) => {
                options.report_progress(0.5);
                formats::decode(resource.source_path(), resource.bytes())?
            }
        };

        let before = cloud.centers.len();
        let cloud = cloud.without_transparent(options.splat_alpha_removal_threshold);
        log::debug!(
            "Decoded {} splats from {} ({} below alpha threshold, progressive={})",
            cloud.centers.len(),
            source.label(),
            before - cloud.centers.len(),
            options.progressive_load
        );

        let cloud = Rc::new(cloud);
        let entity = self.scene.borrow_mut().attach(SceneEntity::Splat(SplatSceneNode {
            source: source.label().to_string(),
            cloud: cloud.clone(),
            visible: true,
        }));
        self.resident.borrow_mut().push((entity, cloud));
        options.report_progress(1.0);
        Ok(())
    }

    async fn remove_splat_scene(&self, index: usize, show_loading_ui: bool) -> anyhow::Result<()> {
        let removed = {
            let mut resident = self.resident.borrow_mut();
            if index >= resident.len() {
                bail!("No splat scene in slot {} ({} resident)", index, resident.len());
            }
            resident.remove(index)
        };
        self.scene.borrow_mut().destroy(removed.0);
        if show_loading_ui {
            log::info!("Removed splat scene in slot {}", index);
        }
        Ok(())
    }

    fn splat_mesh(&self) -> Option<Rc<dyn SplatMesh>> {
        self.current_cloud().map(|cloud| cloud as Rc<dyn SplatMesh>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splat_bytes(points: &[[f32; 3]], alpha: u8) -> Vec<u8> {
        let mut out = Vec::new();
        for p in points {
            for v in p {
                out.extend_from_slice(&v.to_le_bytes());
            }
            out.extend_from_slice(&[0u8; 12]);
            out.extend_from_slice(&[255, 255, 255, alpha]);
            out.extend_from_slice(&[128; 4]);
        }
        out
    }

    fn write_asset(dir: &std::path::Path, name: &str, bytes: &[u8]) {
        std::fs::write(dir.join(name), bytes).unwrap();
    }

    #[test]
    fn test_add_and_remove_from_path() {
        let dir = tempfile::tempdir().unwrap();
        write_asset(dir.path(), "a.splat", &splat_bytes(&[[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]], 255));

        let scene = Rc::new(RefCell::new(SceneGraph::new()));
        let host = LocalSceneHost::new(scene.clone(), FsFetcher::new(dir.path()));

        let progress = Rc::new(RefCell::new(Vec::new()));
        let sink = progress.clone();
        let options = SceneLoadOptions {
            on_progress: Some(Rc::new(move |p| sink.borrow_mut().push(p))),
            ..SceneLoadOptions::default()
        };

        pollster::block_on(host.add_splat_scene(SceneSource::Path("a.splat".to_string()), &options)).unwrap();
        assert_eq!(*progress.borrow(), vec![0.0, 0.5, 1.0]);
        assert_eq!(host.resident_count(), 1);
        assert_eq!(host.splat_mesh().unwrap().splat_count(), 2);
        assert_eq!(scene.borrow().splat_scenes().count(), 1);

        pollster::block_on(host.remove_splat_scene(0, false)).unwrap();
        assert!(host.splat_mesh().is_none());
        assert!(scene.borrow().is_empty());
    }

    #[test]
    fn test_add_from_preloaded_bytes() {
        let scene = Rc::new(RefCell::new(SceneGraph::new()));
        let host = LocalSceneHost::new(scene.clone(), FsFetcher::new("/nonexistent"));
        let resource = PreloadedResource::new("a", "a.splat", splat_bytes(&[[1.0, 1.0, 1.0]], 255));

        pollster::block_on(host.add_splat_scene(SceneSource::Preloaded(resource), &SceneLoadOptions::default())).unwrap();
        let scene = scene.borrow();
        let (_, node) = scene.splat_scenes().next().unwrap();
        assert_eq!(node.source, "mem://splat/a");
        assert_eq!(node.cloud.splat_count(), 1);
    }

    #[test]
    fn test_alpha_threshold_drops_transparent_splats() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = splat_bytes(&[[0.0, 0.0, 0.0]], 2);
        bytes.extend(splat_bytes(&[[1.0, 0.0, 0.0]], 200));
        write_asset(dir.path(), "a.splat", &bytes);

        let scene = Rc::new(RefCell::new(SceneGraph::new()));
        let host = LocalSceneHost::new(scene, FsFetcher::new(dir.path()));
        pollster::block_on(host.add_splat_scene(SceneSource::Path("a.splat".to_string()), &SceneLoadOptions::default())).unwrap();

        let mesh = host.splat_mesh().unwrap();
        assert_eq!(mesh.splat_count(), 1);
        assert_eq!(mesh.splat_center(0).x, 1.0);
    }

    #[test]
    fn test_missing_file_and_empty_remove_fail() {
        let scene = Rc::new(RefCell::new(SceneGraph::new()));
        let host = LocalSceneHost::new(scene.clone(), FsFetcher::new("/nonexistent"));

        assert!(pollster::block_on(host.add_splat_scene(SceneSource::Path("missing.splat".to_string()), &SceneLoadOptions::default())).is_err());
        assert!(pollster::block_on(host.remove_splat_scene(0, false)).is_err());
        assert!(scene.borrow().is_empty());
    }
}
