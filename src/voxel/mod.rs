//! Voxel block store: TSDF voxels, blocks, pool and spatial hash

pub mod voxel;
pub mod block;
pub mod block_pool;
pub mod hash_table;
pub mod scene;

pub use voxel::Voxel;
pub use block::{VoxelBlock, BLOCK_SIZE, BLOCK_VOXELS};
pub use block_pool::BlockPool;
pub use hash_table::{EntryPtr, HashEntry, HashTable};
pub use scene::{Allocation, Scene, SceneStats, VoxelReader};
