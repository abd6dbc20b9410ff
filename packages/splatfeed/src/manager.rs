//! Scene identity, ordering and load/unload against the scene host.
//!
//! The manager keeps exactly one catalog entry resident. Swaps are strictly
//! remove-then-add; the entry after the resident one is prefetched into a
//! [`PreloadCache`] so the next forward navigation can skip the fetch.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use anyhow::{anyhow, bail, Context};

use crate::catalog::{Catalog, SplatEntry};
use crate::config::SceneLoadConfig;
use crate::host::{ProgressCallback, ResourceFetcher, SceneHost, SceneLoadOptions, SceneSource};
use crate::preload::{PreloadCache, PreloadedResource};

pub struct SplatManager<H: SceneHost, F: ResourceFetcher> {
    catalog: Catalog,
    host: H,
    fetcher: F,
    load_config: SceneLoadConfig,
    current_index: Cell<usize>,
    /// Whether the entry at `current_index` is loaded in the host.
    resident: Cell<bool>,
    cache: PreloadCache,
    pending_preloads: RefCell<VecDeque<usize>>,
    on_progress: RefCell<Option<ProgressCallback>>,
}

impl<H: SceneHost, F: ResourceFetcher> SplatManager<H, F> {
    pub fn new(catalog: Catalog, host: H, fetcher: F, load_config: SceneLoadConfig) -> Self {
        Self {
            catalog,
            host,
            fetcher,
            load_config,
            current_index: Cell::new(0),
            resident: Cell::new(false),
            cache: PreloadCache::new(),
            pending_preloads: RefCell::new(VecDeque::new()),
            on_progress: RefCell::new(None),
        }
    }

    /// Callback forwarded to every scene load.
    pub fn set_progress_callback(&self, callback: Option<ProgressCallback>) {
        *self.on_progress.borrow_mut() = callback;
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn current_index(&self) -> usize {
        self.current_index.get()
    }

    pub fn current_entry(&self) -> Option<&SplatEntry> {
        self.catalog.get(self.current_index.get())
    }

    pub fn is_resident(&self) -> bool {
        self.resident.get()
    }

    pub fn is_preloaded(&self, entry_id: &str) -> bool {
        self.cache.contains(entry_id)
    }

    pub fn cache(&self) -> &PreloadCache {
        &self.cache
    }

    /// Indices waiting for [`run_pending_preloads`](Self::run_pending_preloads).
    pub fn pending_preloads(&self) -> Vec<usize> {
        self.pending_preloads.borrow().iter().copied().collect()
    }

    /// Fetch entry `index` into the preload cache.
    ///
    /// Best effort: an out-of-range index, an already cached entry or a failed
    /// fetch all leave the cache as it was.
    pub async fn preload(&self, index: usize) {
        let Some(entry) = self.catalog.get(index) else {
            return;
        };
        if self.cache.contains(&entry.id) {
            return;
        }

        match self.fetcher.fetch(&entry.file).await {
            Ok(bytes) => {
                if self.resident.get() && index == self.current_index.get() {
                    log::debug!("Discarding preload of resident entry '{}'", entry.id);
                    return;
                }
                log::debug!("Preloaded '{}' ({} bytes)", entry.id, bytes.len());
                self.cache
                    .insert(PreloadedResource::new(entry.id.clone(), entry.file.clone(), bytes));
            }
            Err(err) => {
                log::warn!("Preload of '{}' failed, will load from path: {:#}", entry.id, err);
            }
        }
    }

    /// Drain the preload queue. Returns how many preloads were attempted.
    pub async fn run_pending_preloads(&self) -> usize {
        let mut attempted = 0;
        loop {
            let next = self.pending_preloads.borrow_mut().pop_front();
            let Some(index) = next else {
                break;
            };
            self.preload(index).await;
            attempted += 1;
        }
        attempted
    }

    /// Cached handle for `entry` if one exists, otherwise its path.
    ///
    /// Taking the handle removes it from the cache.
    pub fn resolve_source(&self, entry: &SplatEntry) -> SceneSource {
        match self.cache.take(&entry.id) {
            Some(resource) => SceneSource::Preloaded(resource),
            None => SceneSource::Path(entry.file.clone()),
        }
    }

    /// Load the first catalog entry and queue a preload of the second.
    pub async fn load_initial(&self) -> anyhow::Result<()> {
        if self.catalog.is_empty() {
            log::warn!("Catalog is empty, nothing to load");
            return Ok(());
        }

        self.load_entry(0, self.load_config.progressive_load).await?;
        self.current_index.set(0);
        self.resident.set(true);
        if self.catalog.len() > 1 {
            self.schedule_preload(1);
        }
        Ok(())
    }

    /// Replace the resident scene with entry `target`.
    ///
    /// Resolves once the new scene is fully added. On error the manager is
    /// left with no resident scene only if the remove succeeded and the add
    /// failed; `current_index` still names the last entry that loaded.
    pub async fn transition_to(&self, target: usize) -> anyhow::Result<()> {
        if target == self.current_index.get() && self.resident.get() {
            return Ok(());
        }
        if target >= self.catalog.len() {
            bail!(
                "Transition target {} out of range ({} entries)",
                target,
                self.catalog.len()
            );
        }

        if self.resident.get() {
            self.host
                .remove_splat_scene(0, self.load_config.show_loading_ui)
                .await
                .context("Failed to remove resident scene")?;
            self.resident.set(false);
        }

        self.load_entry(target, false).await?;
        self.current_index.set(target);
        self.resident.set(true);
        self.schedule_preload(self.catalog.next_index(target));
        Ok(())
    }

    /// Add entry `index` to the host, then revoke every preloaded handle left
    /// in the cache.
    ///
    /// Only the cold start loads progressively (`load_initial` passes the
    /// configured flag): there is nothing on screen yet, so partial frames are
    /// better than a blank canvas. Swaps always pass `false`, because the
    /// burst is covering the gap and a half-drawn scene under it would flicker.
    async fn load_entry(&self, index: usize, progressive_load: bool) -> anyhow::Result<()> {
        let entry = self
            .catalog
            .get(index)
            .ok_or_else(|| anyhow!("No catalog entry at index {}", index))?;
        let source = self.resolve_source(entry);

        let mut options = SceneLoadOptions::from_config(&self.load_config);
        options.progressive_load = progressive_load;
        options.on_progress = self.on_progress.borrow().clone();

        log::info!("Loading '{}' from {}", entry.id, source.label());
        self.host
            .add_splat_scene(source, &options)
            .await
            .with_context(|| format!("Failed to load scene '{}'", entry.id))?;

        let stale = self.cache.revoke_all();
        if stale > 0 {
            log::debug!("Revoked {} stale preload(s)", stale);
        }
        Ok(())
    }

    fn schedule_preload(&self, index: usize) {
        if self.resident.get() && index == self.current_index.get() {
            return;
        }
        let mut queue = self.pending_preloads.borrow_mut();
        if !queue.contains(&index) {
            queue.push_back(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{FsFetcher, LocalSceneHost};
    use crate::scene_graph::SceneGraph;
    use std::path::Path;
    use std::rc::Rc;

    fn write_splat(dir: &Path, name: &str, count: usize) {
        let mut bytes = Vec::new();
        for i in 0..count {
            for v in [i as f32, 0.0, 0.0] {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
            bytes.extend_from_slice(&[0u8; 12]);
            bytes.extend_from_slice(&[255; 4]);
            bytes.extend_from_slice(&[128; 4]);
        }
        std::fs::write(dir.join(name), bytes).unwrap();
    }

    fn catalog(ids: &[&str]) -> Catalog {
        Catalog::new(
            ids.iter()
                .map(|id| SplatEntry::new(*id, id.to_uppercase(), format!("{}.splat", id)))
                .collect(),
        )
    }

    fn manager(
        dir: &Path,
        ids: &[&str],
    ) -> (Rc<RefCell<SceneGraph>>, SplatManager<LocalSceneHost<FsFetcher>, FsFetcher>) {
        let scene = Rc::new(RefCell::new(SceneGraph::new()));
        let host = LocalSceneHost::new(scene.clone(), FsFetcher::new(dir));
        let manager = SplatManager::new(catalog(ids), host, FsFetcher::new(dir), SceneLoadConfig::default());
        (scene, manager)
    }

    #[test]
    fn test_load_initial_queues_next() {
        let dir = tempfile::tempdir().unwrap();
        write_splat(dir.path(), "a.splat", 3);
        write_splat(dir.path(), "b.splat", 4);
        let (scene, manager) = manager(dir.path(), &["a", "b"]);

        pollster::block_on(manager.load_initial()).unwrap();
        assert!(manager.is_resident());
        assert_eq!(manager.current_index(), 0);
        assert_eq!(manager.pending_preloads(), vec![1]);
        assert_eq!(scene.borrow().splat_scenes().count(), 1);

        assert_eq!(pollster::block_on(manager.run_pending_preloads()), 1);
        assert!(manager.is_preloaded("b"));
        assert!(manager.pending_preloads().is_empty());
    }

    #[test]
    fn test_single_entry_has_no_preload() {
        let dir = tempfile::tempdir().unwrap();
        write_splat(dir.path(), "a.splat", 1);
        let (_, manager) = manager(dir.path(), &["a"]);
        pollster::block_on(manager.load_initial()).unwrap();
        assert!(manager.pending_preloads().is_empty());
    }

    #[test]
    fn test_empty_catalog_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (scene, manager) = manager(dir.path(), &[]);
        pollster::block_on(manager.load_initial()).unwrap();
        assert!(!manager.is_resident());
        assert!(scene.borrow().is_empty());
    }

    #[test]
    fn test_transition_keeps_one_scene_resident() {
        let dir = tempfile::tempdir().unwrap();
        for (name, count) in [("a.splat", 1), ("b.splat", 2), ("c.splat", 3)] {
            write_splat(dir.path(), name, count);
        }
        let (scene, manager) = manager(dir.path(), &["a", "b", "c"]);
        pollster::block_on(manager.load_initial()).unwrap();

        for target in [2, 1, 0, 1] {
            pollster::block_on(manager.transition_to(target)).unwrap();
            assert_eq!(manager.current_index(), target);
            assert_eq!(scene.borrow().splat_scenes().count(), 1);
            assert_eq!(manager.host().splat_mesh().unwrap().splat_count(), target + 1);
        }
        assert_eq!(manager.pending_preloads(), vec![1, 0, 2]);
    }

    #[test]
    fn test_transition_to_current_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        write_splat(dir.path(), "a.splat", 1);
        write_splat(dir.path(), "b.splat", 1);
        let (_, manager) = manager(dir.path(), &["a", "b"]);
        pollster::block_on(manager.load_initial()).unwrap();

        pollster::block_on(manager.transition_to(0)).unwrap();
        assert_eq!(manager.pending_preloads(), vec![1]);
        assert!(pollster::block_on(manager.transition_to(5)).is_err());
        assert!(manager.is_resident());
    }

    #[test]
    fn test_preloaded_handle_is_consumed() {
        let dir = tempfile::tempdir().unwrap();
        write_splat(dir.path(), "a.splat", 1);
        write_splat(dir.path(), "b.splat", 2);
        let (scene, manager) = manager(dir.path(), &["a", "b"]);
        pollster::block_on(manager.load_initial()).unwrap();
        pollster::block_on(manager.preload(1));
        assert!(manager.is_preloaded("b"));

        pollster::block_on(manager.transition_to(1)).unwrap();
        assert!(!manager.is_preloaded("b"));
        let scene = scene.borrow();
        let (_, node) = scene.splat_scenes().next().unwrap();
        assert_eq!(node.source, "mem://splat/b");
    }

    #[test]
    fn test_jump_revokes_stale_preload() {
        let dir = tempfile::tempdir().unwrap();
        let ids = ["s0", "s1", "s2", "s3", "s4"];
        for id in ids {
            write_splat(dir.path(), &format!("{}.splat", id), 1);
        }
        let (_, manager) = manager(dir.path(), &ids);
        pollster::block_on(manager.load_initial()).unwrap();

        pollster::block_on(manager.preload(1));
        assert!(manager.is_preloaded("s1"));

        pollster::block_on(manager.transition_to(3)).unwrap();
        assert!(!manager.is_preloaded("s1"));
        assert_eq!(manager.cache().revoked_count(), 1);

        // The resident entry never lands in the cache.
        pollster::block_on(manager.preload(3));
        assert!(!manager.is_preloaded("s3"));
        assert!(manager.cache().is_empty());
    }

    #[test]
    fn test_failed_preload_falls_back_to_path() {
        let dir = tempfile::tempdir().unwrap();
        write_splat(dir.path(), "a.splat", 1);
        let (_, manager) = manager(dir.path(), &["a", "b"]);
        pollster::block_on(manager.load_initial()).unwrap();

        pollster::block_on(manager.run_pending_preloads());
        assert!(!manager.is_preloaded("b"));

        write_splat(dir.path(), "b.splat", 2);
        pollster::block_on(manager.transition_to(1)).unwrap();
        assert_eq!(manager.current_index(), 1);
    }

    #[test]
    fn test_failed_add_leaves_nothing_resident() {
        let dir = tempfile::tempdir().unwrap();
        write_splat(dir.path(), "a.splat", 1);
        write_splat(dir.path(), "b.splat", 1);
        let (scene, manager) = manager(dir.path(), &["a", "b", "c"]);
        pollster::block_on(manager.load_initial()).unwrap();

        assert!(pollster::block_on(manager.transition_to(2)).is_err());
        assert!(!manager.is_resident());
        assert_eq!(manager.current_index(), 0);
        assert!(scene.borrow().is_empty());

        // Nothing to remove on the next attempt.
        pollster::block_on(manager.transition_to(1)).unwrap();
        assert_eq!(manager.current_index(), 1);
        assert_eq!(scene.borrow().splat_scenes().count(), 1);
    }
}
