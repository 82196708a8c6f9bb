// SPDX-License-Identifier: GPL-3.0-only

//! Handle registry
//!
//! One identity map for every uuid-addressed engine object: sources, scenes and
//! video mixes share the uuid namespace, so a uuid can never name two live
//! objects at once.
//!
//! The registry lock is never held across an engine call. Creation checks for
//! a duplicate, creates the native object, then re-checks before inserting;
//! release removes the entry first so no other command can resolve the uuid
//! while it is being torn down.

use crate::engine::{EngineContext, FrameCallback, NativeHandle, SourceKind};
use crate::errors::{BridgeError, BridgeResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// What a registry entry refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisteredObject {
    Source {
        kind: SourceKind,
        name: String,
        /// Source has a frame output attached
        frame_source: bool,
    },
    Scene {
        name: String,
    },
    VideoMix,
}

impl RegisteredObject {
    fn label(&self) -> &'static str {
        match self {
            RegisteredObject::Source { .. } => "source",
            RegisteredObject::Scene { .. } => "scene",
            RegisteredObject::VideoMix => "video mix",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub uuid: String,
    pub handle: NativeHandle,
    pub object: RegisteredObject,
}

/// uuid → native handle map
pub struct HandleRegistry {
    engine: EngineContext,
    entries: Mutex<HashMap<String, RegistryEntry>>,
}

impl HandleRegistry {
    pub fn new(engine: EngineContext) -> Self {
        Self {
            engine,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn ensure_vacant(&self, uuid: &str) -> BridgeResult<()> {
        if self.entries.lock().contains_key(uuid) {
            return Err(BridgeError::DuplicateUuid(uuid.to_string()));
        }
        Ok(())
    }

    /// Insert a freshly created native object, releasing it if `uuid` was
    /// taken in the meantime
    fn insert(
        &self,
        entry: RegistryEntry,
        release: impl FnOnce(NativeHandle),
    ) -> BridgeResult<NativeHandle> {
        let handle = entry.handle;
        let mut entries = self.entries.lock();
        if entries.contains_key(&entry.uuid) {
            drop(entries);
            release(handle);
            return Err(BridgeError::DuplicateUuid(entry.uuid));
        }
        info!(
            uuid = %entry.uuid,
            handle = %handle,
            object = entry.object.label(),
            "Registered"
        );
        entries.insert(entry.uuid.clone(), entry);
        Ok(handle)
    }

    /// Create a source
    ///
    /// With `frame_output` set, the engine starts delivering frames to it
    /// right away.
    pub fn create_source(
        &self,
        uuid: &str,
        kind: &SourceKind,
        name: &str,
        frame_output: Option<FrameCallback>,
    ) -> BridgeResult<NativeHandle> {
        self.ensure_vacant(uuid)?;

        let handle = self.engine.create_source(kind, name)?;
        let frame_source = frame_output.is_some();
        if let Some(output) = frame_output
            && let Err(e) = self.engine.set_frame_output(handle, Some(output))
        {
            warn!(uuid = %uuid, error = %e, "Failed to attach frame output");
            self.engine.release_source(handle);
            return Err(e);
        }

        let entry = RegistryEntry {
            uuid: uuid.to_string(),
            handle,
            object: RegisteredObject::Source {
                kind: kind.clone(),
                name: name.to_string(),
                frame_source,
            },
        };
        self.insert(entry, |h| self.engine.release_source(h))
    }

    /// Attach (or detach with `None`) the frame output of an existing source
    pub fn set_frame_output(&self, uuid: &str, output: Option<FrameCallback>) -> BridgeResult<()> {
        let (handle, _) = self.lookup_source(uuid)?;
        let attached = output.is_some();
        self.engine.set_frame_output(handle, output)?;

        let mut entries = self.entries.lock();
        match entries.get_mut(uuid) {
            Some(RegistryEntry {
                handle: current,
                object: RegisteredObject::Source { frame_source, .. },
                ..
            }) if *current == handle => {
                *frame_source = attached;
                debug!(uuid = %uuid, attached, "Frame output changed");
                Ok(())
            }
            // Released while the engine call ran
            _ => Err(BridgeError::not_found(format!("source {}", uuid))),
        }
    }

    pub fn create_scene(&self, uuid: &str, name: &str) -> BridgeResult<NativeHandle> {
        self.ensure_vacant(uuid)?;
        let handle = self.engine.create_scene(name)?;
        let entry = RegistryEntry {
            uuid: uuid.to_string(),
            handle,
            object: RegisteredObject::Scene {
                name: name.to_string(),
            },
        };
        self.insert(entry, |h| self.engine.release_scene(h))
    }

    pub fn create_video_mix(&self, uuid: &str, output: FrameCallback) -> BridgeResult<NativeHandle> {
        self.ensure_vacant(uuid)?;
        let handle = self.engine.add_video_mix(output)?;
        let entry = RegistryEntry {
            uuid: uuid.to_string(),
            handle,
            object: RegisteredObject::VideoMix,
        };
        self.insert(entry, |h| self.engine.remove_video_mix(h))
    }

    /// Remove an entry of the expected kind, run `detach`, then destroy the
    /// native object
    fn release(
        &self,
        uuid: &str,
        expected: fn(&RegisteredObject) -> bool,
        detach: impl FnOnce(&RegistryEntry),
    ) -> BridgeResult<RegistryEntry> {
        let entry = {
            let mut entries = self.entries.lock();
            match entries.get(uuid) {
                Some(entry) if expected(&entry.object) => entries.remove(uuid),
                _ => None,
            }
        }
        .ok_or_else(|| BridgeError::not_found(uuid))?;

        detach(&entry);

        match entry.object {
            RegisteredObject::Source { .. } => self.engine.release_source(entry.handle),
            RegisteredObject::Scene { .. } => self.engine.release_scene(entry.handle),
            RegisteredObject::VideoMix => self.engine.remove_video_mix(entry.handle),
        }
        info!(uuid = %uuid, object = entry.object.label(), "Released");
        Ok(entry)
    }

    /// Release a source. `detach` runs after the uuid stops resolving and
    /// before the native source is destroyed.
    pub fn release_source(
        &self,
        uuid: &str,
        detach: impl FnOnce(&RegistryEntry),
    ) -> BridgeResult<RegistryEntry> {
        self.release(
            uuid,
            |o| matches!(o, RegisteredObject::Source { .. }),
            detach,
        )
    }

    pub fn release_scene(
        &self,
        uuid: &str,
        detach: impl FnOnce(&RegistryEntry),
    ) -> BridgeResult<RegistryEntry> {
        self.release(uuid, |o| matches!(o, RegisteredObject::Scene { .. }), detach)
    }

    pub fn release_video_mix(
        &self,
        uuid: &str,
        detach: impl FnOnce(&RegistryEntry),
    ) -> BridgeResult<RegistryEntry> {
        self.release(uuid, |o| matches!(o, RegisteredObject::VideoMix), detach)
    }

    pub fn lookup(&self, uuid: &str) -> BridgeResult<NativeHandle> {
        self.entries
            .lock()
            .get(uuid)
            .map(|e| e.handle)
            .ok_or_else(|| BridgeError::not_found(uuid))
    }

    pub fn lookup_source(&self, uuid: &str) -> BridgeResult<(NativeHandle, SourceKind)> {
        match self.entries.lock().get(uuid) {
            Some(RegistryEntry {
                handle,
                object: RegisteredObject::Source { kind, .. },
                ..
            }) => Ok((*handle, kind.clone())),
            _ => Err(BridgeError::not_found(format!("source {}", uuid))),
        }
    }

    pub fn lookup_scene(&self, uuid: &str) -> BridgeResult<NativeHandle> {
        match self.entries.lock().get(uuid) {
            Some(RegistryEntry {
                handle,
                object: RegisteredObject::Scene { .. },
                ..
            }) => Ok(*handle),
            _ => Err(BridgeError::not_found(format!("scene {}", uuid))),
        }
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.entries.lock().contains_key(uuid)
    }

    /// Point `uuid` at a new native handle (video mixes re-created after a reset)
    pub fn rebind(&self, uuid: &str, handle: NativeHandle) -> BridgeResult<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(uuid)
            .ok_or_else(|| BridgeError::not_found(uuid))?;
        debug!(uuid = %uuid, old = %entry.handle, new = %handle, "Rebound handle");
        entry.handle = handle;
        Ok(())
    }

    /// uuids and handles of every live video mix
    pub fn video_mixes(&self) -> Vec<(String, NativeHandle)> {
        let mut mixes: Vec<_> = self
            .entries
            .lock()
            .values()
            .filter(|e| matches!(e.object, RegisteredObject::VideoMix))
            .map(|e| (e.uuid.clone(), e.handle))
            .collect();
        mixes.sort();
        mixes
    }

    /// Snapshot of every live entry, ordered by uuid
    pub fn entries(&self) -> Vec<RegistryEntry> {
        let mut entries: Vec<_> = self.entries.lock().values().cloned().collect();
        entries.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::{Engine, SoftwareEngine};
    use std::sync::Arc;

    fn registry() -> HandleRegistry {
        let engine = SoftwareEngine::new(Config::default());
        engine.startup(&Config::default().video).unwrap();
        HandleRegistry::new(Arc::new(engine))
    }

    fn color() -> SourceKind {
        SourceKind::Generic {
            source_id: "color_source".into(),
        }
    }

    #[test]
    fn test_release_then_lookup_fails() {
        let registry = registry();
        registry.create_source("src1", &color(), "Color", None).unwrap();
        assert!(registry.lookup("src1").is_ok());

        registry.release_source("src1", |_| {}).unwrap();
        assert!(matches!(registry.lookup("src1"), Err(BridgeError::NotFound(_))));
        assert!(matches!(
            registry.release_source("src1", |_| {}),
            Err(BridgeError::NotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let registry = registry();
        let first = registry.create_source("src1", &color(), "A", None).unwrap();
        assert!(matches!(
            registry.create_source("src1", &color(), "B", None),
            Err(BridgeError::DuplicateUuid(_))
        ));
        assert_eq!(registry.lookup("src1").unwrap(), first);
        assert_eq!(registry.len(), 1);
    }

    fn frame_source(registry: &HandleRegistry, uuid: &str) -> Option<bool> {
        registry
            .entries()
            .into_iter()
            .find(|e| e.uuid == uuid)
            .and_then(|e| match e.object {
                RegisteredObject::Source { frame_source, .. } => Some(frame_source),
                _ => None,
            })
    }

    #[test]
    fn test_frame_output_toggles_on_existing_source() {
        let registry = registry();
        registry.create_source("src1", &color(), "Color", None).unwrap();
        assert_eq!(frame_source(&registry, "src1"), Some(false));

        registry
            .set_frame_output("src1", Some(Arc::new(|_| {})))
            .unwrap();
        assert_eq!(frame_source(&registry, "src1"), Some(true));

        registry.set_frame_output("src1", None).unwrap();
        assert_eq!(frame_source(&registry, "src1"), Some(false));

        registry.create_scene("t1", "Scene A").unwrap();
        assert!(matches!(
            registry.set_frame_output("t1", None),
            Err(BridgeError::NotFound(_))
        ));
    }

    #[test]
    fn test_namespace_is_shared() {
        let registry = registry();
        registry.create_scene("t1", "Scene A").unwrap();
        assert!(matches!(
            registry.create_source("t1", &color(), "A", None),
            Err(BridgeError::DuplicateUuid(_))
        ));
        // A scene is not released through the source path
        assert!(registry.release_source("t1", |_| {}).is_err());
        assert!(registry.lookup_scene("t1").is_ok());
        assert!(registry.lookup_source("t1").is_err());
    }

    #[test]
    fn test_detach_runs_after_uuid_stops_resolving() {
        let registry = registry();
        registry.create_source("src1", &color(), "A", None).unwrap();

        let mut seen = None;
        registry
            .release_source("src1", |entry| {
                seen = Some(entry.uuid.clone());
                assert!(!registry.contains("src1"));
            })
            .unwrap();
        assert_eq!(seen.as_deref(), Some("src1"));
    }

    #[test]
    fn test_failed_create_leaves_no_entry() {
        let registry = registry();
        let missing = SourceKind::Image {
            file: "/nonexistent/image.png".into(),
        };
        assert!(registry.create_source("img", &missing, "Image", None).is_err());
        assert!(!registry.contains("img"));
    }
}
