//! Single-use cache of preloaded scene bytes.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Scene bytes fetched ahead of navigation, addressable by a local URL.
#[derive(Clone)]
pub struct PreloadedResource {
    entry_id: String,
    source_path: String,
    url: String,
    bytes: Rc<[u8]>,
}

impl PreloadedResource {
    pub fn new(entry_id: impl Into<String>, source_path: impl Into<String>, bytes: Vec<u8>) -> Self {
        let entry_id = entry_id.into();
        let url = format!("mem://splat/{}", entry_id);
        Self {
            entry_id,
            source_path: source_path.into(),
            url,
            bytes: bytes.into(),
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    /// Original path the bytes were fetched from. Used to pick a decoder.
    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for PreloadedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreloadedResource")
            .field("entry_id", &self.entry_id)
            .field("url", &self.url)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Preloaded resources keyed by entry id.
///
/// A handle leaves the cache exactly once, either through [`take`](Self::take)
/// (consumed by a load) or through revocation.
#[derive(Debug, Default)]
pub struct PreloadCache {
    handles: RefCell<HashMap<String, PreloadedResource>>,
    revoked: Cell<usize>,
}

impl PreloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, entry_id: &str) -> bool {
        self.handles.borrow().contains_key(entry_id)
    }

    /// Register a resource. A previous handle for the same id is revoked.
    pub fn insert(&self, resource: PreloadedResource) {
        let previous = self
            .handles
            .borrow_mut()
            .insert(resource.entry_id.clone(), resource);
        if let Some(previous) = previous {
            self.release(previous);
        }
    }

    /// Remove and return the handle for `entry_id`.
    pub fn take(&self, entry_id: &str) -> Option<PreloadedResource> {
        self.handles.borrow_mut().remove(entry_id)
    }

    /// Revoke the handle for `entry_id`. Returns true if one was cached.
    pub fn revoke(&self, entry_id: &str) -> bool {
        let removed = self.handles.borrow_mut().remove(entry_id);
        match removed {
            Some(resource) => {
                self.release(resource);
                true
            }
            None => false,
        }
    }

    /// Revoke every cached handle. Returns how many were revoked.
    pub fn revoke_all(&self) -> usize {
        let drained: Vec<PreloadedResource> =
            self.handles.borrow_mut().drain().map(|(_, r)| r).collect();
        let count = drained.len();
        for resource in drained {
            self.release(resource);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.handles.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.borrow().is_empty()
    }

    /// Total handles revoked over the cache's lifetime.
    pub fn revoked_count(&self) -> usize {
        self.revoked.get()
    }

    fn release(&self, resource: PreloadedResource) {
        log::debug!("Revoked preload {} ({} bytes)", resource.url, resource.bytes.len());
        self.revoked.set(self.revoked.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_is_single_use() {
        let cache = PreloadCache::new();
        cache.insert(PreloadedResource::new("a", "a.splat", vec![1, 2, 3]));
        assert!(cache.contains("a"));

        let taken = cache.take("a").unwrap();
        assert_eq!(taken.bytes(), &[1, 2, 3]);
        assert_eq!(taken.url(), "mem://splat/a");
        assert!(!cache.contains("a"));
        assert!(cache.take("a").is_none());
        assert_eq!(cache.revoked_count(), 0);
    }

    #[test]
    fn test_replacing_revokes_previous() {
        let cache = PreloadCache::new();
        cache.insert(PreloadedResource::new("a", "a.splat", vec![1]));
        cache.insert(PreloadedResource::new("a", "a.splat", vec![2]));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.revoked_count(), 1);
    }

    #[test]
    fn test_revoke_all() {
        let cache = PreloadCache::new();
        cache.insert(PreloadedResource::new("a", "a.splat", vec![]));
        cache.insert(PreloadedResource::new("b", "b.splat", vec![]));
        assert!(!cache.revoke("missing"));
        assert_eq!(cache.revoke_all(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.revoked_count(), 2);
    }
}
