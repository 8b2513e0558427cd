//! Reusable tile bitmaps.

use pdf_engine::{RgbaImage, PAPER};

/// Default number of released bitmaps kept for reuse.
pub const DEFAULT_POOL_CAPACITY: usize = 32;

/// Bounded free list of pixel buffers.
///
/// Released buffers beyond the capacity are dropped, so the pool never holds
/// more than `capacity` idle bitmaps.
#[derive(Debug)]
pub struct BufferPool {
    free: Vec<Vec<u8>>,
    capacity: usize,
    reused: u64,
    allocated: u64,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self { free: Vec::new(), capacity, reused: 0, allocated: 0 }
    }

    /// Bitmap of the requested size filled with paper white.
    pub fn acquire(&mut self, width: u32, height: u32) -> RgbaImage {
        let len = width as usize * height as usize * 4;

        let position = self.free.iter().position(|buffer| buffer.capacity() >= len);
        let mut buffer = match position {
            Some(index) => {
                self.reused += 1;
                self.free.swap_remove(index)
            }
            None => {
                self.allocated += 1;
                Vec::with_capacity(len)
            }
        };

        buffer.clear();
        buffer.extend(std::iter::repeat(PAPER.0).take(len / 4).flatten());

        RgbaImage::from_raw(width, height, buffer)
            .unwrap_or_else(|| RgbaImage::from_pixel(width, height, PAPER))
    }

    pub fn release(&mut self, image: RgbaImage) {
        if self.free.len() < self.capacity {
            self.free.push(image.into_raw());
        }
    }

    pub fn idle(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// (reused, freshly allocated) acquisitions so far.
    pub fn counts(&self) -> (u64, u64) {
        (self.reused, self.allocated)
    }

    pub fn clear(&mut self) {
        self.free.clear();
    }
}
