//! pose_store.rs
//! Double-buffered capture state: one writer lock, readers never wait on it.
//!
//! The receiver thread mutates a private write buffer under a mutex (one
//! decoded datagram = one batch). At the end of each batch the buffer is
//! deep-copied into a fresh immutable [`BoneSnapshot`] and swapped into the
//! published slot. Readers load the published `Arc` without taking any lock,
//! so they always see a whole commit and never wait on the writer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use nalgebra::{Quaternion, Vector3};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use crate::capture::bones::canonical_bone_name;
use crate::capture::pose::{BoneSnapshot, Pose};

#[derive(Default)]
struct WriteBuffer {
    root: Pose,
    bones: HashMap<String, Pose>,
    blends: HashMap<String, f32>,
    pending_blends: HashMap<String, f32>,
    updated_at: Option<Instant>,
    commits: u64,
}

/// Mutation handle valid for the duration of one [`PoseStore::write`] batch.
pub struct StoreWriter<'a> {
    buf: &'a mut WriteBuffer,
}

impl StoreWriter<'_> {
    pub fn set_root(&mut self, position: Vector3<f32>, rotation: Quaternion<f32>) {
        self.buf.root = Pose::from_raw(position, rotation);
        self.buf.updated_at = Some(Instant::now());
    }

    /// Stores under the canonical (first char lower-cased) name, creating
    /// the entry on first sight.
    pub fn set_bone(&mut self, name: &str, position: Vector3<f32>, rotation: Quaternion<f32>) {
        let key = canonical_bone_name(name);
        self.buf.bones.insert(key, Pose::from_raw(position, rotation));
        self.buf.updated_at = Some(Instant::now());
    }

    /// Buffered until [`StoreWriter::apply_blends`].
    pub fn set_blend(&mut self, name: &str, value: f32) {
        self.buf.pending_blends.insert(name.to_owned(), value);
    }

    pub fn apply_blends(&mut self) {
        if self.buf.pending_blends.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.buf.pending_blends);
        self.buf.blends.extend(pending);
        self.buf.updated_at = Some(Instant::now());
    }

    pub fn pending_blend_count(&self) -> usize {
        self.buf.pending_blends.len()
    }

    pub fn bone_count(&self) -> usize {
        self.buf.bones.len()
    }
}

pub struct PoseStore {
    write: Mutex<WriteBuffer>,
    published: ArcSwapOption<BoneSnapshot>,
}

impl Default for PoseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseStore {
    pub fn new() -> Self {
        Self {
            write: Mutex::new(WriteBuffer::default()),
            published: ArcSwapOption::empty(),
        }
    }

    /// Runs `batch` against the write buffer, then commits one snapshot.
    pub fn write<R>(&self, batch: impl FnOnce(&mut StoreWriter<'_>) -> R) -> R {
        let mut buf = self.write.lock();
        let result = {
            let mut writer = StoreWriter { buf: &mut buf };
            batch(&mut writer)
        };
        buf.commits += 1;
        let snapshot = BoneSnapshot {
            bones: buf.bones.clone(),
            root: buf.root,
            blend_shapes: buf.blends.clone(),
            updated_at: buf.updated_at,
            sequence: buf.commits,
        };
        self.publish(snapshot);
        result
    }

    /// Latest committed snapshot; `None` before the first commit.
    pub fn read(&self) -> Option<Arc<BoneSnapshot>> {
        self.published.load_full()
    }

    /// Drops bones, blends (pending too) and resets root to identity, then
    /// commits the empty state.
    pub fn clear(&self) {
        self.write(|w| {
            w.buf.bones.clear();
            w.buf.blends.clear();
            w.buf.pending_blends.clear();
            w.buf.root = Pose::identity();
            w.buf.updated_at = None;
        });
    }

    fn publish(&self, snapshot: BoneSnapshot) {
        self.published.store(Some(Arc::new(snapshot)));
    }
}
