#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;
use zeroize::Zeroize;

use flashdev_core::{FlashError, FlashResult, Geometry, ERASED_BYTE};
use flashdev_hal::BlockBackend;

/// RAM-backed medium.
///
/// Starts fully erased. Used for tests, for ephemeral filesystems and as the
/// reference the disk backends are compared against. The image is wiped when
/// the backend is dropped; its length never changes while it is alive.
pub struct MemoryBackend {
    image: Vec<u8>,
}

impl MemoryBackend {
    /// Erased image of exactly `cfg.total_bytes()` bytes.
    pub fn new(cfg: &Geometry) -> Self {
        Self::with_capacity(cfg.total_bytes() as usize)
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self { image: vec![ERASED_BYTE; bytes] }
    }

    /// Adopt an existing image, e.g. one loaded from a file.
    pub fn from_image(image: Vec<u8>) -> Self {
        Self { image }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.image
    }

    pub fn into_image(mut self) -> Vec<u8> {
        core::mem::take(&mut self.image)
    }

    fn span(&self, start: u64, len: usize) -> FlashResult<core::ops::Range<usize>> {
        let limit = self.image.len() as u64;
        let end = start + len as u64;
        if end > limit {
            return Err(FlashError::OutOfBounds { offset: start, len: len as u64, limit });
        }
        Ok(start as usize..end as usize)
    }
}

impl BlockBackend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "mem"
    }

    fn capacity(&self) -> Option<u64> {
        Some(self.image.len() as u64)
    }

    fn read_into(&mut self, cfg: &Geometry, block: u32, off: u32, buf: &mut [u8]) -> FlashResult<()> {
        let range = self.span(cfg.addr(block, off), buf.len())?;
        buf.copy_from_slice(&self.image[range]);
        Ok(())
    }

    fn prog(&mut self, cfg: &Geometry, block: u32, off: u32, data: &[u8]) -> FlashResult<()> {
        let range = self.span(cfg.addr(block, off), data.len())?;
        self.image[range].copy_from_slice(data);
        Ok(())
    }

    fn erase(&mut self, cfg: &Geometry, block: u32) -> FlashResult<()> {
        let range = self.span(cfg.addr(block, 0), cfg.block_size as usize)?;
        self.image[range].fill(ERASED_BYTE);
        Ok(())
    }

    fn sync(&mut self, _cfg: &Geometry) -> FlashResult<()> {
        Ok(())
    }
}

impl Drop for MemoryBackend {
    fn drop(&mut self) {
        self.image.zeroize();
    }
}
