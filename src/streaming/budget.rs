//! Memory budget for device and host block storage
//!
//! Tracks bytes held by device-resident blocks and by the host archive.
//! Provides pressure metrics that drive swap-out decisions.

use crate::voxel::VoxelBlock;

/// Bytes of one voxel block
pub const BLOCK_BYTES: usize = std::mem::size_of::<VoxelBlock>();

/// Memory budget manager
///
/// Device usage is the pool occupancy; host usage is the archive size.
pub struct MemoryBudget {
    /// Maximum device memory (bytes)
    device_budget_bytes: usize,
    /// Maximum host memory (bytes)
    host_budget_bytes: usize,
    /// Currently used device memory (bytes)
    device_used_bytes: usize,
    /// Currently used host memory (bytes)
    host_used_bytes: usize,
}

impl MemoryBudget {
    /// Create a budget sized in blocks
    pub fn from_blocks(device_blocks: u32, host_blocks: u32) -> Self {
        Self {
            device_budget_bytes: device_blocks as usize * BLOCK_BYTES,
            host_budget_bytes: host_blocks as usize * BLOCK_BYTES,
            device_used_bytes: 0,
            host_used_bytes: 0,
        }
    }

    // --- Tracking methods ---

    /// Set device usage from the pool's occupied slot count
    pub fn set_device_blocks(&mut self, blocks: u32) {
        self.device_used_bytes = blocks as usize * BLOCK_BYTES;
    }

    /// Set host usage from the archive's block count
    pub fn set_host_blocks(&mut self, blocks: usize) {
        self.host_used_bytes = blocks * BLOCK_BYTES;
    }

    /// Add host memory usage
    pub fn add_host(&mut self, bytes: usize) {
        self.host_used_bytes = self.host_used_bytes.saturating_add(bytes);
    }

    /// Remove host memory usage
    pub fn remove_host(&mut self, bytes: usize) {
        self.host_used_bytes = self.host_used_bytes.saturating_sub(bytes);
    }

    // --- Query methods ---

    pub fn device_used(&self) -> usize {
        self.device_used_bytes
    }

    pub fn host_used(&self) -> usize {
        self.host_used_bytes
    }

    pub fn host_available(&self) -> usize {
        self.host_budget_bytes.saturating_sub(self.host_used_bytes)
    }

    /// Get device memory pressure (0.0 to 1.0)
    pub fn device_pressure(&self) -> f32 {
        if self.device_budget_bytes == 0 {
            return 0.0;
        }
        self.device_used_bytes as f32 / self.device_budget_bytes as f32
    }

    /// Get host memory pressure (0.0 to 1.0)
    pub fn host_pressure(&self) -> f32 {
        if self.host_budget_bytes == 0 {
            return 0.0;
        }
        self.host_used_bytes as f32 / self.host_budget_bytes as f32
    }

    // --- Decision methods ---

    /// Check if device occupancy is above the low-water fraction
    pub fn should_evict(&self, low_water: f32) -> bool {
        self.device_pressure() > low_water
    }

    /// Number of blocks to move off the device to get back to `low_water`
    /// while making room for `incoming` blocks
    pub fn blocks_over(&self, low_water: f32, incoming: usize) -> usize {
        let target = (self.device_budget_bytes as f32 * low_water) as usize;
        (self.device_used_bytes + incoming * BLOCK_BYTES)
            .saturating_sub(target)
            .div_ceil(BLOCK_BYTES)
    }

    /// Check if the host can take `blocks` more archived blocks
    pub fn can_archive(&self, blocks: usize) -> bool {
        self.host_available() >= blocks * BLOCK_BYTES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_new() {
        let budget = MemoryBudget::from_blocks(100, 200);
        assert_eq!(budget.device_used(), 0);
        assert_eq!(budget.host_used(), 0);
        assert_eq!(budget.host_available(), 200 * BLOCK_BYTES);
    }

    #[test]
    fn test_device_pressure() {
        let mut budget = MemoryBudget::from_blocks(100, 100);
        assert_eq!(budget.device_pressure(), 0.0);

        budget.set_device_blocks(50);
        assert!((budget.device_pressure() - 0.5).abs() < 0.01);
        assert!(!budget.should_evict(0.75));

        budget.set_device_blocks(80);
        assert!(budget.should_evict(0.75));
    }

    #[test]
    fn test_blocks_over_low_water() {
        let mut budget = MemoryBudget::from_blocks(100, 100);
        budget.set_device_blocks(80);
        assert_eq!(budget.blocks_over(0.75, 0), 5);
        assert_eq!(budget.blocks_over(0.75, 10), 15);
        budget.set_device_blocks(10);
        assert_eq!(budget.blocks_over(0.75, 10), 0);
    }

    #[test]
    fn test_host_saturating_ops() {
        let mut budget = MemoryBudget::from_blocks(10, 10);
        budget.remove_host(1000);
        assert_eq!(budget.host_used(), 0);

        budget.add_host(9 * BLOCK_BYTES);
        assert!(budget.can_archive(1));
        assert!(!budget.can_archive(2));
        assert!((budget.host_pressure() - 0.9).abs() < 0.01);
    }

    #[test]
    fn test_zero_budget_pressure() {
        let budget = MemoryBudget::from_blocks(0, 0);
        assert_eq!(budget.device_pressure(), 0.0);
        assert_eq!(budget.host_pressure(), 0.0);
    }
}
