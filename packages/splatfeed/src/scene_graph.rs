//! Scene graph shared by the scene host and the particle system.
//!
//! The host owns `Splat` entities (at most one resident scene) and
//! [`SplatParticles`](crate::particles::SplatParticles) owns the `Points`
//! entity of its live burst. The two never touch each other's entities.

use std::collections::HashMap;
use std::rc::Rc;

use glam::Vec3;

use crate::splat_mesh::SplatCloud;

/// Unique identifier for scene entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

/// A loaded splat scene.
#[derive(Debug, Clone)]
pub struct SplatSceneNode {
    /// Where the scene was loaded from (path or preload URL).
    pub source: String,
    pub cloud: Rc<SplatCloud>,
    pub visible: bool,
}

/// A renderable set of points with shared material parameters.
#[derive(Debug, Clone)]
pub struct PointCloud {
    pub positions: Vec<Vec3>,
    pub color: [f32; 3],
    pub opacity: f32,
    /// Point size in world units.
    pub size: f32,
    pub visible: bool,
}

impl PointCloud {
    pub fn new(positions: Vec<Vec3>, color: [f32; 3], size: f32, opacity: f32) -> Self {
        Self {
            positions,
            color,
            opacity,
            size,
            visible: true,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// A scene entity - either a splat scene or a point cloud.
#[derive(Debug, Clone)]
pub enum SceneEntity {
    Splat(SplatSceneNode),
    Points(PointCloud),
}

/// The scene graph - owns every entity that can be rendered.
#[derive(Debug)]
pub struct SceneGraph {
    entities: HashMap<EntityId, SceneEntity>,
    /// Entities that have been added to the scene (will be rendered), in draw order.
    scene_entities: Vec<EntityId>,
    next_id: u64,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            scene_entities: Vec::new(),
            next_id: 1,
        }
    }

    fn new_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Create an entity and add it to the scene in one step.
    pub fn attach(&mut self, entity: SceneEntity) -> EntityId {
        let id = self.new_id();
        self.entities.insert(id, entity);
        self.scene_entities.push(id);
        id
    }

    /// Remove an entity from the scene (stop rendering it).
    /// Returns true if the entity was removed, false if not in scene.
    pub fn remove_from_scene(&mut self, id: EntityId) -> bool {
        if let Some(pos) = self.scene_entities.iter().position(|&e| e == id) {
            self.scene_entities.remove(pos);
            true
        } else {
            false
        }
    }

    /// Destroy an entity completely (removes from scene and deletes).
    pub fn destroy(&mut self, id: EntityId) -> bool {
        self.remove_from_scene(id);
        self.entities.remove(&id).is_some()
    }

    pub fn get(&self, id: EntityId) -> Option<&SceneEntity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut SceneEntity> {
        self.entities.get_mut(&id)
    }

    /// Mutable access to a point cloud entity.
    pub fn points_mut(&mut self, id: EntityId) -> Option<&mut PointCloud> {
        match self.entities.get_mut(&id) {
            Some(SceneEntity::Points(points)) => Some(points),
            _ => None,
        }
    }

    /// Get all entities currently in the scene (for rendering).
    pub fn scene_entities(&self) -> impl Iterator<Item = (EntityId, &SceneEntity)> {
        self.scene_entities
            .iter()
            .filter_map(|&id| self.entities.get(&id).map(|e| (id, e)))
    }

    /// Splat scenes in the scene, in the order they were added.
    pub fn splat_scenes(&self) -> impl Iterator<Item = (EntityId, &SplatSceneNode)> {
        self.scene_entities().filter_map(|(id, entity)| match entity {
            SceneEntity::Splat(splat) => Some((id, splat)),
            _ => None,
        })
    }

    /// Point clouds in the scene.
    pub fn point_clouds(&self) -> impl Iterator<Item = (EntityId, &PointCloud)> {
        self.scene_entities().filter_map(|(id, entity)| match entity {
            SceneEntity::Points(points) => Some((id, points)),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.scene_entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scene_entities.is_empty()
    }

    /// Check if an entity exists.
    pub fn exists(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Check if an entity is in the scene.
    pub fn is_in_scene(&self, id: EntityId) -> bool {
        self.scene_entities.contains(&id)
    }

    /// Clear all entities and the scene.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.scene_entities.clear();
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}
