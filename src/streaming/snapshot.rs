//! Scene snapshots: every block (device and host) with its address,
//! serialized with rkyv and compressed with LZ4.

use std::path::Path;

use rkyv::{Archive, Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::{IVec3, Result};
use crate::voxel::{Allocation, EntryPtr, Scene, VoxelBlock};
use super::host_cache::HostCache;

/// Bumped whenever the archived layout changes
pub const SNAPSHOT_VERSION: u32 = 1;

/// One block of a snapshot
#[derive(Archive, Deserialize, Serialize)]
pub struct SnapshotBlock {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// Block was device resident when captured
    pub on_device: bool,
    pub block: VoxelBlock,
}

impl SnapshotBlock {
    pub fn address(&self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }
}

/// Serializable scene content
#[derive(Archive, Deserialize, Serialize)]
pub struct SceneSnapshot {
    pub version: u32,
    pub voxel_size: f32,
    pub mu: f32,
    pub max_w: u8,
    pub blocks: Vec<SnapshotBlock>,
}

/// Copy every live block out of the scene and the host archive
pub fn capture(scene: &Scene, host: Option<&HostCache>) -> SceneSnapshot {
    let params = scene.params();
    let mut blocks = Vec::new();
    for (id, entry) in scene.hash().iter_live() {
        let (block, on_device) = match entry.ptr {
            EntryPtr::Slot(slot) => (*scene.block(slot), true),
            EntryPtr::Archived => match host.and_then(|h| h.load(id)) {
                Some(block) => (*block, false),
                None => {
                    log::warn!("Archived block {} has no host copy, not captured", entry.pos);
                    continue;
                }
            },
            EntryPtr::Empty => continue,
        };
        blocks.push(SnapshotBlock {
            x: entry.pos.x,
            y: entry.pos.y,
            z: entry.pos.z,
            on_device,
            block,
        });
    }
    SceneSnapshot {
        version: SNAPSHOT_VERSION,
        voxel_size: params.voxel_size,
        mu: params.mu,
        max_w: params.max_w,
        blocks,
    }
}

/// Load snapshot content into an empty scene.
///
/// Blocks captured on device go to device slots while they fit; the rest
/// go to the host archive when one is available.
pub fn restore(snapshot: &SceneSnapshot, scene: &mut Scene, mut host: Option<&mut HostCache>) -> Result<()> {
    let params = scene.params();
    if snapshot.voxel_size != params.voxel_size || snapshot.mu != params.mu {
        return Err(Error::Snapshot(format!(
            "snapshot voxel {} / mu {} does not match scene voxel {} / mu {}",
            snapshot.voxel_size, snapshot.mu, params.voxel_size, params.mu
        )));
    }

    for b in &snapshot.blocks {
        let addr = b.address();
        if b.on_device || host.is_none() {
            if let Allocation::Resident { slot, .. } = scene.allocate(addr) {
                *scene.block_mut(slot) = b.block;
                continue;
            }
        }
        let Some(host) = host.as_deref_mut() else {
            return Err(Error::Snapshot(format!("no room for block {} and no host archive", addr)));
        };
        let entry = scene
            .insert_archived(addr)
            .ok_or_else(|| Error::Snapshot(format!("hash table full at block {}", addr)))?;
        host.store(entry, &b.block)?;
    }

    log::info!("Restored {} blocks from snapshot", snapshot.blocks.len());
    Ok(())
}

/// Serialize a snapshot to bytes (uncompressed)
pub fn serialize_snapshot(snapshot: &SceneSnapshot) -> Result<Vec<u8>> {
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(snapshot)
        .map_err(|e| Error::Snapshot(e.to_string()))?;
    Ok(bytes.to_vec())
}

/// Deserialize a snapshot from bytes (uncompressed)
pub fn deserialize_snapshot(data: &[u8]) -> Result<SceneSnapshot> {
    let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(data.len());
    aligned.extend_from_slice(data);
    let archived = rkyv::access::<ArchivedSceneSnapshot, rkyv::rancor::Error>(&aligned)
        .map_err(|e| Error::Snapshot(e.to_string()))?;
    let snapshot: SceneSnapshot = rkyv::deserialize::<SceneSnapshot, rkyv::rancor::Error>(archived)
        .map_err(|e| Error::Snapshot(e.to_string()))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(Error::Snapshot(format!(
            "snapshot version {} (expected {})",
            snapshot.version, SNAPSHOT_VERSION
        )));
    }
    Ok(snapshot)
}

/// Compress a serialized snapshot using LZ4
pub fn compress_snapshot(snapshot: &SceneSnapshot) -> Result<Vec<u8>> {
    let serialized = serialize_snapshot(snapshot)?;
    Ok(lz4_flex::compress_prepend_size(&serialized))
}

/// Decompress and deserialize a snapshot
pub fn decompress_snapshot(data: &[u8]) -> Result<SceneSnapshot> {
    let decompressed = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| Error::Snapshot(format!("LZ4 decompression failed: {}", e)))?;
    deserialize_snapshot(&decompressed)
}

/// Save a snapshot to disk (compressed)
pub fn save_snapshot(path: impl AsRef<Path>, snapshot: &SceneSnapshot) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, compress_snapshot(snapshot)?)?;
    Ok(())
}

/// Load a snapshot from disk
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<SceneSnapshot> {
    let data = std::fs::read(path.as_ref())?;
    decompress_snapshot(&data)
}
