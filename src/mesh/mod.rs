//! Triangle mesh extraction from the TSDF and STL export

pub mod marching;
pub mod stl;

pub use marching::{extract_block, extract_mesh, triangle_normal, BlockSource, Mesh};
pub use stl::{stl_bytes, write_stl, write_stl_to};
