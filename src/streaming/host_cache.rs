//! Host-side archive of voxel blocks
//!
//! Keyed by hash entry id. A stored copy is never discarded; swapping the
//! block out again overwrites it with the newer content.

use std::collections::HashMap;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::voxel::VoxelBlock;

/// Archive of swapped-out blocks
pub struct HostCache {
    blocks: HashMap<u32, Box<VoxelBlock>>,
    /// Maximum number of distinct entries
    capacity: usize,
}

impl HostCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: HashMap::new(),
            capacity,
        }
    }

    /// Store (or overwrite) the host copy of an entry
    pub fn store(&mut self, entry: u32, block: &VoxelBlock) -> Result<()> {
        if let Some(existing) = self.blocks.get_mut(&entry) {
            **existing = *block;
            return Ok(());
        }
        if self.blocks.len() >= self.capacity {
            return Err(Error::Transfer(format!(
                "host archive full ({} blocks), cannot store entry {}",
                self.capacity, entry
            )));
        }
        self.blocks.insert(entry, Box::new(*block));
        Ok(())
    }

    /// Host copy of an entry
    pub fn load(&self, entry: u32) -> Option<&VoxelBlock> {
        self.blocks.get(&entry).map(|b| b.as_ref())
    }

    pub fn contains(&self, entry: u32) -> bool {
        self.blocks.contains_key(&entry)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
