//! Voxel-hashed TSDF scene: hash index + block pool

use serde::Serialize;

use crate::core::config::{HashParams, SceneParams};
use crate::core::types::{IVec3, Vec3};
use super::block::{split_voxel_coord, VoxelBlock, BLOCK_SIZE};
use super::block_pool::BlockPool;
use super::hash_table::{EntryPtr, HashEntry, HashTable};
use super::voxel::Voxel;

/// Outcome of an allocation request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Allocation {
    /// Address is device resident in `slot`
    Resident { entry: u32, slot: u32, fresh: bool },
    /// Address exists but lives on host storage
    Archived { entry: u32 },
    /// Pool or excess list exhausted; skipped this frame
    Dropped,
}

/// Occupancy summary
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SceneStats {
    pub pool_capacity: u32,
    pub used_slots: u32,
    pub device_entries: u32,
    pub archived_entries: u32,
    pub excess_used: u32,
}

/// Hashed voxel-block scene
pub struct Scene {
    params: SceneParams,
    hash: HashTable,
    pool: BlockPool,
}

impl Scene {
    pub fn new(params: SceneParams, hash_params: &HashParams) -> Self {
        log::info!(
            "Scene: voxel {}m, mu {}m, {} buckets + {} excess",
            params.voxel_size,
            params.mu,
            hash_params.bucket_count,
            hash_params.excess_list_size
        );
        Self {
            params,
            hash: HashTable::new(hash_params.bucket_count, hash_params.excess_list_size),
            pool: BlockPool::new(hash_params.local_block_count),
        }
    }

    pub fn params(&self) -> &SceneParams {
        &self.params
    }

    #[inline]
    pub fn voxel_size(&self) -> f32 {
        self.params.voxel_size
    }

    /// Block address containing a world point
    #[inline]
    pub fn block_address(&self, world: Vec3) -> IVec3 {
        (world / self.params.block_size_meters()).floor().as_ivec3()
    }

    /// Allocate a block for `addr` unless it already exists
    pub fn allocate(&mut self, addr: IVec3) -> Allocation {
        if let Some(entry) = self.hash.find(addr) {
            return match self.hash.entry(entry).ptr {
                EntryPtr::Slot(slot) => Allocation::Resident { entry, slot, fresh: false },
                _ => Allocation::Archived { entry },
            };
        }

        if self.pool.free_count() == 0 || !self.hash.can_insert(addr) {
            log::trace!("Dropped allocation of block {}", addr);
            return Allocation::Dropped;
        }
        let Some(slot) = self.pool.allocate(addr) else {
            return Allocation::Dropped;
        };
        match self.hash.insert(addr, EntryPtr::Slot(slot)) {
            Some(entry) => Allocation::Resident { entry, slot, fresh: true },
            None => {
                self.pool.release(slot);
                Allocation::Dropped
            }
        }
    }

    /// Slot for `addr`, allocating a fresh block if absent. `None` when the
    /// address is archived or capacity is exhausted.
    pub fn allocate_if_absent(&mut self, addr: IVec3) -> Option<u32> {
        match self.allocate(addr) {
            Allocation::Resident { slot, .. } => Some(slot),
            _ => None,
        }
    }

    /// Device slot currently holding `addr`
    #[inline]
    pub fn lookup(&self, addr: IVec3) -> Option<u32> {
        let entry = self.hash.find(addr)?;
        self.hash.entry(entry).ptr.slot()
    }

    /// Hash entry id for `addr`
    #[inline]
    pub fn find_entry(&self, addr: IVec3) -> Option<u32> {
        self.hash.find(addr)
    }

    #[inline]
    pub fn entry(&self, id: u32) -> &HashEntry {
        self.hash.entry(id)
    }

    /// Drop the mapping for a device slot and return it to the pool.
    /// Content stays in the slot.
    pub fn free(&mut self, slot: u32) {
        if !self.pool.is_in_use(slot) {
            return;
        }
        if let Some(addr) = self.pool.address(slot) {
            if let Some(entry) = self.hash.find(addr) {
                if self.hash.entry(entry).ptr == EntryPtr::Slot(slot) {
                    self.hash.remove(entry);
                }
            }
        }
        self.pool.release(slot);
    }

    /// Mark a device-resident entry host-only and release its slot.
    /// Returns the released slot.
    pub fn archive(&mut self, entry: u32) -> Option<u32> {
        let slot = self.hash.entry(entry).ptr.slot()?;
        self.hash.set_ptr(entry, EntryPtr::Archived);
        self.pool.release(slot);
        Some(slot)
    }

    /// Bring an archived entry back into a device slot with `content`.
    /// Returns `None` when the pool is exhausted.
    pub fn restore(&mut self, entry: u32, content: &VoxelBlock) -> Option<u32> {
        let e = *self.hash.entry(entry);
        if e.ptr != EntryPtr::Archived {
            return e.ptr.slot();
        }
        let slot = self.pool.allocate(e.pos)?;
        *self.pool.block_mut(slot) = *content;
        self.hash.set_ptr(entry, EntryPtr::Slot(slot));
        Some(slot)
    }

    /// Re-create an archived entry at `addr` (snapshot loading)
    pub fn insert_archived(&mut self, addr: IVec3) -> Option<u32> {
        match self.hash.find(addr) {
            Some(entry) => Some(entry),
            None => self.hash.insert(addr, EntryPtr::Archived),
        }
    }

    #[inline]
    pub fn block(&self, slot: u32) -> &VoxelBlock {
        self.pool.block(slot)
    }

    #[inline]
    pub fn block_mut(&mut self, slot: u32) -> &mut VoxelBlock {
        self.pool.block_mut(slot)
    }

    pub fn pool(&self) -> &BlockPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut BlockPool {
        &mut self.pool
    }

    pub fn hash(&self) -> &HashTable {
        &self.hash
    }

    /// Voxel at a global voxel coordinate, if its block is device resident
    pub fn read_voxel(&self, voxel: IVec3) -> Option<Voxel> {
        let (addr, idx) = split_voxel_coord(voxel);
        let slot = self.lookup(addr)?;
        Some(self.pool.block(slot).voxels[idx])
    }

    /// Reader with a one-block lookup cache
    pub fn reader(&self) -> VoxelReader<'_> {
        VoxelReader {
            scene: self,
            cached: None,
        }
    }

    /// Trilinear sdf at a world point
    pub fn sdf_interpolated(&self, world: Vec3) -> Option<f32> {
        self.reader().sdf_interpolated(world / self.params.voxel_size)
    }

    /// Trilinear color at a world point
    pub fn color_interpolated(&self, world: Vec3) -> Option<Vec3> {
        self.reader().color_interpolated(world / self.params.voxel_size)
    }

    pub fn stats(&self) -> SceneStats {
        let mut stats = SceneStats {
            pool_capacity: self.pool.capacity(),
            used_slots: self.pool.used_count(),
            excess_used: self.hash.excess_used(),
            ..Default::default()
        };
        for (_, e) in self.hash.iter_live() {
            match e.ptr {
                EntryPtr::Slot(_) => stats.device_entries += 1,
                EntryPtr::Archived => stats.archived_entries += 1,
                EntryPtr::Empty => {}
            }
        }
        stats
    }
}

/// Read-only voxel access that remembers the last block it resolved.
///
/// Positions are in voxel units (world / voxel_size).
pub struct VoxelReader<'a> {
    scene: &'a Scene,
    cached: Option<(IVec3, Option<u32>)>,
}

impl VoxelReader<'_> {
    fn slot_for(&mut self, addr: IVec3) -> Option<u32> {
        if let Some((cached_addr, slot)) = self.cached {
            if cached_addr == addr {
                return slot;
            }
        }
        let slot = self.scene.lookup(addr);
        self.cached = Some((addr, slot));
        slot
    }

    /// Voxel at a global voxel coordinate
    pub fn read(&mut self, voxel: IVec3) -> Option<Voxel> {
        let (addr, idx) = split_voxel_coord(voxel);
        let slot = self.slot_for(addr)?;
        Some(self.scene.pool.block(slot).voxels[idx])
    }

    /// Check if the block containing a voxel-space point is allocated at all
    pub fn is_allocated(&mut self, pos: Vec3) -> bool {
        let addr = pos.floor().as_ivec3().div_euclid(IVec3::splat(BLOCK_SIZE));
        self.slot_for(addr).is_some()
    }

    /// The 8 voxels around `pos` with their trilinear weights. `None` when the
    /// base voxel's block is not resident; other missing corners read as empty.
    fn corners(&mut self, pos: Vec3) -> Option<[(Voxel, f32); 8]> {
        let base = pos.floor();
        let frac = pos - base;
        let base = base.as_ivec3();
        let first = self.read(base)?;
        let mut out = [(first, 0.0); 8];
        for (i, corner) in out.iter_mut().enumerate() {
            let offset = IVec3::new((i & 1) as i32, ((i >> 1) & 1) as i32, ((i >> 2) & 1) as i32);
            let wx = if offset.x == 1 { frac.x } else { 1.0 - frac.x };
            let wy = if offset.y == 1 { frac.y } else { 1.0 - frac.y };
            let wz = if offset.z == 1 { frac.z } else { 1.0 - frac.z };
            let voxel = if i == 0 {
                first
            } else {
                self.read(base + offset).unwrap_or(Voxel::EMPTY)
            };
            *corner = (voxel, wx * wy * wz);
        }
        Some(out)
    }

    /// Trilinear signed distance in band units
    pub fn sdf_interpolated(&mut self, pos: Vec3) -> Option<f32> {
        let corners = self.corners(pos)?;
        Some(corners.iter().map(|(v, w)| v.sdf() * w).sum())
    }

    /// Trilinear color in [0, 255]
    pub fn color_interpolated(&mut self, pos: Vec3) -> Option<Vec3> {
        let corners = self.corners(pos)?;
        Some(corners.iter().map(|(v, w)| v.color() * *w).sum())
    }

    /// Unnormalized sdf gradient by central differences
    pub fn gradient(&mut self, pos: Vec3) -> Option<Vec3> {
        let mut g = Vec3::ZERO;
        for axis in 0..3 {
            let mut step = Vec3::ZERO;
            step[axis] = 1.0;
            let hi = self.sdf_interpolated(pos + step)?;
            let lo = self.sdf_interpolated(pos - step)?;
            g[axis] = hi - lo;
        }
        Some(g)
    }
}
