//! Fusion: visibility, block allocation and TSDF integration

pub mod visibility;
pub mod allocation;
pub mod integrate;

pub use visibility::{find_visible_blocks, ViewFrustum, VisibilityList, VisibleKind};
pub use allocation::{allocate_and_find_visible, AllocationParams, AllocationStats};
pub use integrate::{integrate, integrate_block};
