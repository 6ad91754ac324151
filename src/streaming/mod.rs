//! Host/device residency, block swapping and scene snapshots

pub mod budget;
pub mod host_cache;
pub mod residency;
pub mod swap;
pub mod snapshot;

pub use budget::{MemoryBudget, BLOCK_BYTES};
pub use host_cache::HostCache;
pub use residency::{residency, Residency};
pub use swap::{SwapManager, SwapStats, TransferBatch};
pub use snapshot::{
    SceneSnapshot, SnapshotBlock, SNAPSHOT_VERSION,
    capture, restore,
    compress_snapshot, decompress_snapshot,
    serialize_snapshot, deserialize_snapshot,
    save_snapshot, load_snapshot,
};
