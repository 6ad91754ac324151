//! Block Pool - Fixed-capacity arena of voxel blocks
//!
//! - Fixed capacity so device memory stays bounded
//! - LIFO free stack of slot ids
//! - Released slots keep their content; reuse for the same address
//!   picks it back up, reuse for a different address resets it

use crate::core::types::IVec3;
use super::block::VoxelBlock;

/// Arena of voxel blocks indexed by slot id
pub struct BlockPool {
    /// Block storage
    blocks: Vec<VoxelBlock>,
    /// Address each slot's content belongs to
    last_address: Vec<Option<IVec3>>,
    /// Whether the slot is currently handed out
    in_use: Vec<bool>,
    /// Stack of free slot indices
    free_slots: Vec<u32>,
    /// Number of slots currently in use
    used_count: u32,
}

impl BlockPool {
    /// Create a new pool with `capacity` blocks, all unseen
    pub fn new(capacity: u32) -> Self {
        let blocks = vec![VoxelBlock::EMPTY; capacity as usize];
        // Reversed so slot 0 is handed out first
        let free_slots: Vec<u32> = (0..capacity).rev().collect();

        log::info!(
            "Created block pool: {} slots, {}MB",
            capacity,
            capacity as usize * std::mem::size_of::<VoxelBlock>() / 1024 / 1024
        );

        Self {
            blocks,
            last_address: vec![None; capacity as usize],
            in_use: vec![false; capacity as usize],
            free_slots,
            used_count: 0,
        }
    }

    /// Pop a slot for the block at `addr`.
    ///
    /// Returns `None` when the pool is exhausted.
    pub fn allocate(&mut self, addr: IVec3) -> Option<u32> {
        let slot = self.free_slots.pop()?;
        let idx = slot as usize;
        if self.last_address[idx] != Some(addr) {
            self.blocks[idx].clear();
            self.last_address[idx] = Some(addr);
        }
        self.in_use[idx] = true;
        self.used_count += 1;
        Some(slot)
    }

    /// Return a slot to the free stack. Content is left in place.
    pub fn release(&mut self, slot: u32) {
        let idx = slot as usize;
        if !self.in_use[idx] {
            log::warn!("Released slot {} twice", slot);
            return;
        }
        self.in_use[idx] = false;
        self.used_count -= 1;
        self.free_slots.push(slot);
    }

    /// Block content of a slot
    #[inline]
    pub fn block(&self, slot: u32) -> &VoxelBlock {
        &self.blocks[slot as usize]
    }

    /// Mutable block content of a slot
    #[inline]
    pub fn block_mut(&mut self, slot: u32) -> &mut VoxelBlock {
        &mut self.blocks[slot as usize]
    }

    /// All blocks, indexed by slot
    pub fn blocks(&self) -> &[VoxelBlock] {
        &self.blocks
    }

    /// All blocks, mutable, indexed by slot
    pub fn blocks_mut(&mut self) -> &mut [VoxelBlock] {
        &mut self.blocks
    }

    /// Address the slot's content belongs to
    pub fn address(&self, slot: u32) -> Option<IVec3> {
        self.last_address[slot as usize]
    }

    /// Check if a slot is handed out
    pub fn is_in_use(&self, slot: u32) -> bool {
        self.in_use[slot as usize]
    }

    /// Get capacity
    pub fn capacity(&self) -> u32 {
        self.blocks.len() as u32
    }

    /// Get number of slots in use
    pub fn used_count(&self) -> u32 {
        self.used_count
    }

    /// Get number of free slots
    pub fn free_count(&self) -> u32 {
        self.free_slots.len() as u32
    }

    /// Get pool utilization as a fraction in [0, 1]
    pub fn utilization(&self) -> f32 {
        if self.blocks.is_empty() {
            return 0.0;
        }
        self.used_count as f32 / self.blocks.len() as f32
    }
}
