//! Host/device swap manager
//!
//! Each frame: blocks that became visible while archived are swapped in,
//! and when device occupancy is above the low-water mark the blocks that
//! have been out of view the longest are swapped out. Transfers are staged
//! in a [`TransferBatch`] and applied by [`SwapManager::commit`], which must
//! succeed before fusion touches the scene.

use serde::Serialize;

use crate::core::config::SwapParams;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::fusion::{VisibilityList, VisibleKind};
use crate::voxel::{Scene, VoxelBlock};
use super::budget::{MemoryBudget, BLOCK_BYTES};
use super::host_cache::HostCache;

/// Swap counters for one frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SwapStats {
    pub swapped_in: u32,
    pub swapped_out: u32,
    /// Swap-ins postponed because no device slot was free
    pub deferred_swap_in: u32,
}

/// Transfers staged for one frame
#[derive(Debug, Default)]
pub struct TransferBatch {
    /// Device content copied out, by entry
    swap_out: Vec<(u32, Box<VoxelBlock>)>,
    /// Entries to bring back from host
    swap_in: Vec<u32>,
}

impl TransferBatch {
    pub fn is_empty(&self) -> bool {
        self.swap_out.is_empty() && self.swap_in.is_empty()
    }

    pub fn swap_out_entries(&self) -> impl Iterator<Item = u32> + '_ {
        self.swap_out.iter().map(|(e, _)| *e)
    }

    pub fn swap_in_entries(&self) -> &[u32] {
        &self.swap_in
    }

    pub fn contains(&self, entry: u32) -> bool {
        self.swap_in.contains(&entry) || self.swap_out.iter().any(|(e, _)| *e == entry)
    }
}

/// Moves blocks between the device pool and the host archive
pub struct SwapManager {
    params: SwapParams,
    host: HostCache,
    budget: MemoryBudget,
    /// Frame each hash entry was last visible, indexed by entry id
    last_visible: Vec<u64>,
    frame: u64,
    pending: Option<TransferBatch>,
}

impl SwapManager {
    pub fn new(params: SwapParams, hash_entries: u32, pool_capacity: u32) -> Self {
        let host_capacity = if params.host_block_capacity == 0 {
            hash_entries
        } else {
            params.host_block_capacity
        };
        log::info!(
            "Swap manager: low water {:.0}%, host archive {} blocks",
            params.low_water * 100.0,
            host_capacity
        );
        Self {
            params,
            host: HostCache::new(host_capacity as usize),
            budget: MemoryBudget::from_blocks(pool_capacity, host_capacity),
            last_visible: vec![0; hash_entries as usize],
            frame: 0,
            pending: None,
        }
    }

    /// Start a new frame and record what is visible in it
    pub fn begin_frame(&mut self, visible: &VisibilityList) {
        self.frame += 1;
        for entry in visible.entries() {
            self.last_visible[*entry as usize] = self.frame;
        }
    }

    /// Decide and stage this frame's transfers
    pub fn plan(&mut self, scene: &Scene, visible: &VisibilityList) -> &TransferBatch {
        let swap_in: Vec<u32> = visible
            .of_kind(VisibleKind::NeedsSwapIn)
            .take(self.params.max_swap_in_per_frame)
            .collect();

        self.budget.set_device_blocks(scene.pool().used_count());
        let room_needed = swap_in.len().saturating_sub(scene.pool().free_count() as usize);
        let evict = self
            .budget
            .blocks_over(self.params.low_water, swap_in.len())
            .max(room_needed)
            .min(self.params.max_swap_out_per_frame);

        let mut swap_out = Vec::new();
        if evict > 0 {
            // Oldest visibility first; entry id breaks ties
            let mut candidates: Vec<(u64, u32, u32)> = scene
                .hash()
                .iter_live()
                .filter_map(|(id, e)| e.ptr.slot().map(|slot| (id, slot)))
                .filter(|(id, _)| !visible.contains(*id))
                .map(|(id, slot)| (self.last_visible[id as usize], id, slot))
                .collect();
            candidates.sort_unstable();
            swap_out = candidates
                .into_iter()
                .take(evict)
                .map(|(_, id, slot)| (id, Box::new(*scene.block(slot))))
                .collect();
        }

        self.pending.insert(TransferBatch { swap_out, swap_in })
    }

    /// Apply the staged batch. Nothing is applied if the batch cannot
    /// complete.
    pub fn commit(&mut self, scene: &mut Scene) -> Result<SwapStats> {
        let Some(batch) = self.pending.take() else {
            return Ok(SwapStats::default());
        };

        let fresh = batch.swap_out_entries().filter(|e| !self.host.contains(*e)).count();
        if !self.budget.can_archive(fresh) {
            log::error!("Swap-out of {} new blocks does not fit the host archive", fresh);
            return Err(Error::Transfer("host archive full".into()));
        }
        if let Some(missing) = batch.swap_in.iter().find(|e| !self.host.contains(**e)) {
            log::error!("Archived entry {} has no host copy", missing);
            return Err(Error::Transfer(format!("no host copy for entry {}", missing)));
        }

        let mut stats = SwapStats::default();
        for (entry, content) in &batch.swap_out {
            let was_stored = self.host.contains(*entry);
            self.host.store(*entry, content)?;
            if !was_stored {
                self.budget.add_host(BLOCK_BYTES);
            }
            scene.archive(*entry);
            stats.swapped_out += 1;
        }
        for entry in &batch.swap_in {
            let Some(content) = self.host.load(*entry) else {
                continue;
            };
            if scene.restore(*entry, content).is_some() {
                stats.swapped_in += 1;
            } else {
                stats.deferred_swap_in += 1;
            }
        }

        self.budget.set_device_blocks(scene.pool().used_count());
        if stats != SwapStats::default() {
            log::debug!(
                "Swap: {} in, {} out, {} deferred, device {:.0}%",
                stats.swapped_in,
                stats.swapped_out,
                stats.deferred_swap_in,
                self.budget.device_pressure() * 100.0
            );
        }
        Ok(stats)
    }

    /// Plan and commit in one step
    pub fn swap(&mut self, scene: &mut Scene, visible: &VisibilityList) -> Result<SwapStats> {
        self.plan(scene, visible);
        self.commit(scene)
    }

    /// Recompute device and host usage after the scene or archive was
    /// filled outside of [`SwapManager::commit`], e.g. from a snapshot
    pub fn sync_budget(&mut self, scene: &Scene) {
        self.budget.set_device_blocks(scene.pool().used_count());
        self.budget.set_host_blocks(self.host.len());
    }

    /// Check if an entry is part of a staged, uncommitted batch
    pub fn is_in_transit(&self, entry: u32) -> bool {
        self.pending.as_ref().is_some_and(|b| b.contains(entry))
    }

    pub fn host(&self) -> &HostCache {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut HostCache {
        &mut self.host
    }

    pub fn budget(&self) -> &MemoryBudget {
        &self.budget
    }

    pub fn params(&self) -> &SwapParams {
        &self.params
    }
}
