//! Row-major image container for internal per-pixel maps
//!
//! Input and display images use the `image` crate types; everything the
//! pipeline computes per pixel (metric depth, raycast points, normals,
//! expected-depth ranges) lives in an [`ImageMap`].

use crate::core::types::UVec2;

/// Dense row-major 2D map of `T`
#[derive(Clone, Debug, PartialEq)]
pub struct ImageMap<T> {
    width: u32,
    height: u32,
    data: Vec<T>,
}

impl<T: Clone> ImageMap<T> {
    /// Create a map filled with `value`
    pub fn new(width: u32, height: u32, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Resize in place and refill with `value`, reusing the allocation
    pub fn reset(&mut self, width: u32, height: u32, value: T) {
        self.width = width;
        self.height = height;
        self.data.clear();
        self.data.resize(width as usize * height as usize, value);
    }

    /// Fill every pixel with `value`
    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|p| *p = value.clone());
    }
}

impl<T> ImageMap<T> {
    /// Build from an existing buffer. Returns `None` on size mismatch.
    pub fn from_vec(width: u32, height: u32, data: Vec<T>) -> Option<Self> {
        (data.len() == width as usize * height as usize).then_some(Self { width, height, data })
    }

    /// Build by evaluating `f(x, y)` for every pixel
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> T) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dims(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> &T {
        &self.data[self.index(x, y)]
    }

    #[inline]
    pub fn get_mut(&mut self, x: u32, y: u32) -> &mut T {
        let idx = self.index(x, y);
        &mut self.data[idx]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: T) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    /// Bounds-checked access with signed coordinates
    #[inline]
    pub fn try_get(&self, x: i32, y: i32) -> Option<&T> {
        self.in_bounds(x, y).then(|| self.get(x as u32, y as u32))
    }

    pub fn row(&self, y: u32) -> &[T] {
        let start = self.index(0, y);
        &self.data[start..start + self.width as usize]
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Mutable rows, for row-parallel kernels
    pub fn rows_mut(&mut self) -> std::slice::ChunksExactMut<'_, T> {
        let w = (self.width as usize).max(1);
        self.data.chunks_exact_mut(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexing_is_row_major() {
        let map = ImageMap::from_fn(3, 2, |x, y| x + 10 * y);
        assert_eq!(*map.get(2, 1), 12);
        assert_eq!(map.row(1), &[10, 11, 12]);
        assert_eq!(map.data()[4], 11);
    }

    #[test]
    fn test_try_get_bounds() {
        let map = ImageMap::new(4, 4, 1.0f32);
        assert!(map.try_get(-1, 0).is_none());
        assert!(map.try_get(4, 0).is_none());
        assert_eq!(map.try_get(3, 3), Some(&1.0));
    }

    #[test]
    fn test_reset_reuses() {
        let mut map = ImageMap::new(2, 2, 0u8);
        map.set(1, 1, 9);
        map.reset(3, 1, 5);
        assert_eq!(map.dims(), UVec2::new(3, 1));
        assert!(map.data().iter().all(|&v| v == 5));
    }

    #[test]
    fn test_from_vec_size_check() {
        assert!(ImageMap::from_vec(2, 2, vec![0u8; 3]).is_none());
        assert!(ImageMap::from_vec(2, 2, vec![0u8; 4]).is_some());
    }
}
