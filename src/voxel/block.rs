//! 8x8x8 voxel block, the unit of allocation and residency

use bytemuck::{Pod, Zeroable};
use rkyv::{Archive, Deserialize, Serialize};

use crate::core::types::IVec3;
use super::voxel::Voxel;

/// Voxels per block edge
pub const BLOCK_SIZE: i32 = 8;
/// Voxels per block
pub const BLOCK_VOXELS: usize = (BLOCK_SIZE * BLOCK_SIZE * BLOCK_SIZE) as usize;

/// Linear index of a voxel inside its block, x fastest
#[inline]
pub fn voxel_index(local: IVec3) -> usize {
    debug_assert!(local.cmpge(IVec3::ZERO).all() && local.cmplt(IVec3::splat(BLOCK_SIZE)).all());
    (local.x + local.y * BLOCK_SIZE + local.z * BLOCK_SIZE * BLOCK_SIZE) as usize
}

/// Inverse of [`voxel_index`]
#[inline]
pub fn local_from_index(index: usize) -> IVec3 {
    let i = index as i32;
    IVec3::new(i % BLOCK_SIZE, (i / BLOCK_SIZE) % BLOCK_SIZE, i / (BLOCK_SIZE * BLOCK_SIZE))
}

/// Split a global voxel coordinate into (block address, index in block)
#[inline]
pub fn split_voxel_coord(voxel: IVec3) -> (IVec3, usize) {
    let block = voxel.div_euclid(IVec3::splat(BLOCK_SIZE));
    let local = voxel.rem_euclid(IVec3::splat(BLOCK_SIZE));
    (block, voxel_index(local))
}

/// 512 voxels - 4 KiB
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable, Archive, Deserialize, Serialize)]
pub struct VoxelBlock {
    pub voxels: [Voxel; BLOCK_VOXELS],
}

impl VoxelBlock {
    /// Block with every voxel unseen
    pub const EMPTY: VoxelBlock = VoxelBlock {
        voxels: [Voxel::EMPTY; BLOCK_VOXELS],
    };

    /// Get voxel at local coordinates (0-7 each axis)
    #[inline]
    pub fn get(&self, local: IVec3) -> &Voxel {
        &self.voxels[voxel_index(local)]
    }

    /// Get mutable voxel at local coordinates
    #[inline]
    pub fn get_mut(&mut self, local: IVec3) -> &mut Voxel {
        &mut self.voxels[voxel_index(local)]
    }

    /// Reset every voxel to unseen
    pub fn clear(&mut self) {
        self.voxels.fill(Voxel::EMPTY);
    }

    /// Check if any voxel has been observed
    pub fn is_observed(&self) -> bool {
        self.voxels.iter().any(|v| v.is_observed())
    }
}

impl Default for VoxelBlock {
    fn default() -> Self {
        Self::EMPTY
    }
}
