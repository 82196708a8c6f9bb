// SPDX-License-Identifier: GPL-3.0-only

//! Scene graph manager
//!
//! Each scene keeps its items in render order: index 0 is the bottom of the
//! stack and new items go on top. Item ids are scene-local, allocated from a
//! counter that never goes backwards, so an id is never reused even after the
//! item is removed.
//!
//! Items are addressed as `(scene_uuid, item_id)`. No native handle crosses
//! the command surface.

use crate::engine::{EngineContext, NativeHandle};
use crate::errors::{BridgeError, BridgeResult};
use crate::registry::HandleRegistry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Pixels trimmed from each edge of the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Crop {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

/// Transform and visibility of one scene item
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneItemInfo {
    pub pos: Vec2,
    /// Rotation in degrees
    pub rot: f32,
    pub scale: Vec2,
    /// Alignment flags of the anchor point
    pub alignment: u32,
    /// Bounding box size; zero means unbounded
    pub bounds: Vec2,
    pub crop: Crop,
    pub visible: bool,
    /// Position in the render stack, 0 = bottom
    pub order: usize,
}

impl Default for SceneItemInfo {
    fn default() -> Self {
        Self {
            pos: Vec2::default(),
            rot: 0.0,
            scale: Vec2::new(1.0, 1.0),
            alignment: 0,
            bounds: Vec2::default(),
            crop: Crop::default(),
            visible: true,
            order: 0,
        }
    }
}

/// Partial update of a [`SceneItemInfo`]; absent fields are left unchanged
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneItemUpdate {
    pub pos: Option<Vec2>,
    pub rot: Option<f32>,
    pub scale: Option<Vec2>,
    pub alignment: Option<u32>,
    pub bounds: Option<Vec2>,
    pub crop: Option<Crop>,
    pub visible: Option<bool>,
    pub order: Option<usize>,
}

impl SceneItemUpdate {
    /// Overlay the supplied fields onto `info`
    pub fn merge_into(&self, info: &mut SceneItemInfo) {
        if let Some(pos) = self.pos {
            info.pos = pos;
        }
        if let Some(rot) = self.rot {
            info.rot = rot;
        }
        if let Some(scale) = self.scale {
            info.scale = scale;
        }
        if let Some(alignment) = self.alignment {
            info.alignment = alignment;
        }
        if let Some(bounds) = self.bounds {
            info.bounds = bounds;
        }
        if let Some(crop) = self.crop {
            info.crop = crop;
        }
        if let Some(visible) = self.visible {
            info.visible = visible;
        }
        if let Some(order) = self.order {
            info.order = order;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<SceneItemInfo> for SceneItemUpdate {
    fn from(info: SceneItemInfo) -> Self {
        Self {
            pos: Some(info.pos),
            rot: Some(info.rot),
            scale: Some(info.scale),
            alignment: Some(info.alignment),
            bounds: Some(info.bounds),
            crop: Some(info.crop),
            visible: Some(info.visible),
            order: Some(info.order),
        }
    }
}

#[derive(Debug, Clone)]
struct SceneItem {
    id: i64,
    source_uuid: String,
    handle: NativeHandle,
    info: SceneItemInfo,
}

#[derive(Debug, Default)]
struct Scene {
    /// Render order, last on top
    items: Vec<SceneItem>,
    next_item_id: i64,
}

impl Scene {
    fn position(&self, item_id: i64) -> Option<usize> {
        self.items.iter().position(|item| item.id == item_id)
    }

    /// Keep every `info.order` equal to the item's index
    fn renumber(&mut self) {
        for (index, item) in self.items.iter_mut().enumerate() {
            item.info.order = index;
        }
    }
}

/// Scene graph manager
///
/// The scene table lock is a `RwLock`: `get_item_info` reads observe either
/// the state before or after a mutation, never a partial one.
pub struct SceneGraph {
    engine: EngineContext,
    registry: Arc<HandleRegistry>,
    scenes: RwLock<HashMap<String, Scene>>,
}

impl SceneGraph {
    pub fn new(engine: EngineContext, registry: Arc<HandleRegistry>) -> Self {
        Self {
            engine,
            registry,
            scenes: RwLock::new(HashMap::new()),
        }
    }

    /// Create an empty scene
    pub fn create_scene(&self, uuid: &str, name: &str) -> BridgeResult<NativeHandle> {
        let handle = self.registry.create_scene(uuid, name)?;
        self.scenes.write().insert(uuid.to_string(), Scene::default());
        Ok(handle)
    }

    /// Release a scene and every item it owns
    pub fn release_scene(&self, uuid: &str) -> BridgeResult<()> {
        self.registry.release_scene(uuid, |_| {
            if let Some(scene) = self.scenes.write().remove(uuid) {
                for item in &scene.items {
                    self.engine.scene_item_remove(item.handle);
                }
                debug!(uuid = %uuid, items = scene.items.len(), "Scene items destroyed");
            }
        })?;
        Ok(())
    }

    /// Place `source_uuid` on top of `scene_uuid`
    ///
    /// The same source may be added several times; each placement gets its own id.
    pub fn add_source(&self, scene_uuid: &str, source_uuid: &str) -> BridgeResult<i64> {
        let scene_handle = self.registry.lookup_scene(scene_uuid)?;
        let (source_handle, _) = self.registry.lookup_source(source_uuid)?;

        let item_handle = self.engine.scene_add(scene_handle, source_handle)?;

        let mut scenes = self.scenes.write();
        let Some(scene) = scenes.get_mut(scene_uuid) else {
            // Released while the engine call was in flight
            drop(scenes);
            self.engine.scene_item_remove(item_handle);
            return Err(BridgeError::not_found(format!("scene {}", scene_uuid)));
        };

        let id = scene.next_item_id;
        scene.next_item_id += 1;
        let info = SceneItemInfo {
            order: scene.items.len(),
            ..SceneItemInfo::default()
        };
        scene.items.push(SceneItem {
            id,
            source_uuid: source_uuid.to_string(),
            handle: item_handle,
            info,
        });

        info!(scene = %scene_uuid, source = %source_uuid, item_id = id, "Added source to scene");
        Ok(id)
    }

    pub fn get_item_info(&self, scene_uuid: &str, item_id: i64) -> BridgeResult<SceneItemInfo> {
        let scenes = self.scenes.read();
        let scene = scenes
            .get(scene_uuid)
            .ok_or_else(|| BridgeError::not_found(format!("scene {}", scene_uuid)))?;
        scene
            .items
            .iter()
            .find(|item| item.id == item_id)
            .map(|item| item.info)
            .ok_or_else(|| item_not_found(scene_uuid, item_id))
    }

    /// Merge `update` into an item's record and push it to the engine
    ///
    /// Setting `order` moves the item within the stack (clamped to the top).
    /// Returns the merged record.
    pub fn set_item_info(
        &self,
        scene_uuid: &str,
        item_id: i64,
        update: &SceneItemUpdate,
    ) -> BridgeResult<SceneItemInfo> {
        let mut scenes = self.scenes.write();
        let scene = scenes
            .get_mut(scene_uuid)
            .ok_or_else(|| BridgeError::not_found(format!("scene {}", scene_uuid)))?;
        let index = scene
            .position(item_id)
            .ok_or_else(|| item_not_found(scene_uuid, item_id))?;

        let mut info = scene.items[index].info;
        update.merge_into(&mut info);
        info.order = info.order.min(scene.items.len() - 1);

        // Engine applies first so a rejected update leaves the record untouched
        let handle = scene.items[index].handle;
        self.engine.scene_item_apply(handle, &info)?;

        let mut item = scene.items.remove(index);
        item.info = info;
        scene.items.insert(info.order, item);
        scene.renumber();

        debug!(scene = %scene_uuid, item_id, order = info.order, "Scene item updated");
        Ok(info)
    }

    /// Remove one placement
    pub fn remove_item(&self, scene_uuid: &str, item_id: i64) -> BridgeResult<()> {
        let item = {
            let mut scenes = self.scenes.write();
            let scene = scenes
                .get_mut(scene_uuid)
                .ok_or_else(|| BridgeError::not_found(format!("scene {}", scene_uuid)))?;
            let index = scene
                .position(item_id)
                .ok_or_else(|| item_not_found(scene_uuid, item_id))?;
            let item = scene.items.remove(index);
            scene.renumber();
            item
        };
        self.engine.scene_item_remove(item.handle);
        info!(scene = %scene_uuid, item_id, "Removed scene item");
        Ok(())
    }

    /// Remove every placement of a source from every scene
    ///
    /// Returns the number of items removed.
    pub fn remove_source(&self, source_uuid: &str) -> usize {
        let removed: Vec<NativeHandle> = {
            let mut scenes = self.scenes.write();
            let mut removed = Vec::new();
            for scene in scenes.values_mut() {
                let before = scene.items.len();
                scene.items.retain(|item| {
                    if item.source_uuid == source_uuid {
                        removed.push(item.handle);
                        false
                    } else {
                        true
                    }
                });
                if scene.items.len() != before {
                    scene.renumber();
                }
            }
            removed
        };
        for handle in &removed {
            self.engine.scene_item_remove(*handle);
        }
        if !removed.is_empty() {
            debug!(source = %source_uuid, count = removed.len(), "Removed source from scenes");
        }
        removed.len()
    }

    /// Item ids of a scene in render order
    pub fn item_ids(&self, scene_uuid: &str) -> BridgeResult<Vec<i64>> {
        self.scenes
            .read()
            .get(scene_uuid)
            .map(|scene| scene.items.iter().map(|item| item.id).collect())
            .ok_or_else(|| BridgeError::not_found(format!("scene {}", scene_uuid)))
    }

    /// Source placed by an item
    pub fn item_source(&self, scene_uuid: &str, item_id: i64) -> BridgeResult<String> {
        let scenes = self.scenes.read();
        let scene = scenes
            .get(scene_uuid)
            .ok_or_else(|| BridgeError::not_found(format!("scene {}", scene_uuid)))?;
        scene
            .items
            .iter()
            .find(|item| item.id == item_id)
            .map(|item| item.source_uuid.clone())
            .ok_or_else(|| item_not_found(scene_uuid, item_id))
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.read().len()
    }
}

fn item_not_found(scene_uuid: &str, item_id: i64) -> BridgeError {
    BridgeError::not_found(format!("item {} in scene {}", item_id, scene_uuid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::{Engine, SoftwareEngine, SourceKind};

    fn graph() -> SceneGraph {
        let engine: EngineContext = Arc::new(SoftwareEngine::new(Config::default()));
        engine.startup(&Config::default().video).unwrap();
        let registry = Arc::new(HandleRegistry::new(engine.clone()));
        let kind = SourceKind::Generic {
            source_id: "color_source".into(),
        };
        registry.create_source("src1", &kind, "Color", None).unwrap();
        registry.create_source("src2", &kind, "Color 2", None).unwrap();
        SceneGraph::new(engine, registry)
    }

    #[test]
    fn test_item_ids_increase_and_are_not_reused() {
        let graph = graph();
        graph.create_scene("t1", "Scene A").unwrap();

        assert_eq!(graph.add_source("t1", "src1").unwrap(), 0);
        assert_eq!(graph.add_source("t1", "src1").unwrap(), 1);
        graph.remove_item("t1", 1).unwrap();
        assert_eq!(graph.add_source("t1", "src2").unwrap(), 2);
        assert_eq!(graph.item_ids("t1").unwrap(), vec![0, 2]);
    }

    #[test]
    fn test_partial_update_merges() {
        let graph = graph();
        graph.create_scene("t1", "Scene A").unwrap();
        let id = graph.add_source("t1", "src1").unwrap();

        let update = SceneItemUpdate {
            pos: Some(Vec2::new(10.0, 20.0)),
            ..Default::default()
        };
        graph.set_item_info("t1", id, &update).unwrap();
        let update = SceneItemUpdate {
            visible: Some(false),
            ..Default::default()
        };
        graph.set_item_info("t1", id, &update).unwrap();

        let info = graph.get_item_info("t1", id).unwrap();
        assert_eq!(info.pos, Vec2::new(10.0, 20.0));
        assert!(!info.visible);
        assert_eq!(info.scale, Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_order_moves_item() {
        let graph = graph();
        graph.create_scene("t1", "Scene A").unwrap();
        let a = graph.add_source("t1", "src1").unwrap();
        let b = graph.add_source("t1", "src2").unwrap();
        let c = graph.add_source("t1", "src1").unwrap();

        let update = SceneItemUpdate {
            order: Some(99),
            ..Default::default()
        };
        let info = graph.set_item_info("t1", a, &update).unwrap();
        assert_eq!(info.order, 2);
        assert_eq!(graph.item_ids("t1").unwrap(), vec![b, c, a]);
        assert_eq!(graph.get_item_info("t1", b).unwrap().order, 0);
    }

    #[test]
    fn test_remove_source_from_all_scenes() {
        let graph = graph();
        graph.create_scene("t1", "A").unwrap();
        graph.create_scene("t2", "B").unwrap();
        graph.add_source("t1", "src1").unwrap();
        graph.add_source("t1", "src2").unwrap();
        graph.add_source("t2", "src1").unwrap();

        assert_eq!(graph.remove_source("src1"), 2);
        assert_eq!(graph.item_ids("t1").unwrap(), vec![1]);
        assert!(graph.item_ids("t2").unwrap().is_empty());
        assert_eq!(graph.get_item_info("t1", 1).unwrap().order, 0);
    }

    #[test]
    fn test_unknown_references() {
        let graph = graph();
        graph.create_scene("t1", "A").unwrap();

        assert!(matches!(
            graph.add_source("t1", "missing"),
            Err(BridgeError::NotFound(_))
        ));
        assert!(matches!(
            graph.add_source("missing", "src1"),
            Err(BridgeError::NotFound(_))
        ));
        assert!(matches!(
            graph.get_item_info("t1", 0),
            Err(BridgeError::NotFound(_))
        ));
        assert!(matches!(
            graph.create_scene("t1", "again"),
            Err(BridgeError::DuplicateUuid(_))
        ));
    }

    #[test]
    fn test_release_scene() {
        let graph = graph();
        graph.create_scene("t1", "A").unwrap();
        graph.add_source("t1", "src1").unwrap();

        graph.release_scene("t1").unwrap();
        assert!(graph.get_item_info("t1", 0).is_err());
        assert!(matches!(
            graph.release_scene("t1"),
            Err(BridgeError::NotFound(_))
        ));
        assert_eq!(graph.scene_count(), 0);
    }
}
