#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;

use flashdev_core::{FlashResult, Geometry, ERASED_BYTE};

/// The medium contract the filesystem engine drives (read / prog / erase / sync).
///
/// Every method takes the engine's geometry and maps `(block, off)` to
/// `block * block_size + off`. Calls are blocking and the engine serializes
/// them; `&mut self` keeps one caller per instance.
pub trait BlockBackend: Send {
    /// Short name for logs ("mem", "linux-disk", ...).
    fn kind(&self) -> &'static str;

    /// Size of the medium in bytes, if the backend can tell.
    fn capacity(&self) -> Option<u64>;

    /// Fill `buf` from `(block, off)`. Either the whole buffer is filled or an error comes back.
    fn read_into(&mut self, cfg: &Geometry, block: u32, off: u32, buf: &mut [u8]) -> FlashResult<()>;

    /// Program `data` at `(block, off)`. The region must have been erased
    /// since it was last programmed; that is not checked here.
    fn prog(&mut self, cfg: &Geometry, block: u32, off: u32, data: &[u8]) -> FlashResult<()>;

    /// Flush anything buffered to durable storage.
    fn sync(&mut self, cfg: &Geometry) -> FlashResult<()>;

    /// Read `size` bytes starting at `(block, off)`.
    fn read(&mut self, cfg: &Geometry, block: u32, off: u32, size: usize) -> FlashResult<Vec<u8>> {
        let mut buf = vec![0u8; size];
        self.read_into(cfg, block, off, &mut buf)?;
        Ok(buf)
    }

    // Default erase: overwrite the whole block with the erased-state byte.
    // None of the media here has a native erase that guarantees 0xFF readback.
    fn erase(&mut self, cfg: &Geometry, block: u32) -> FlashResult<()> {
        let blank = vec![ERASED_BYTE; cfg.block_size as usize];
        self.prog(cfg, block, 0, &blank)
    }
}

impl<B: BlockBackend + ?Sized> BlockBackend for alloc::boxed::Box<B> {
    fn kind(&self) -> &'static str {
        (**self).kind()
    }
    fn capacity(&self) -> Option<u64> {
        (**self).capacity()
    }
    fn read_into(&mut self, cfg: &Geometry, block: u32, off: u32, buf: &mut [u8]) -> FlashResult<()> {
        (**self).read_into(cfg, block, off, buf)
    }
    fn prog(&mut self, cfg: &Geometry, block: u32, off: u32, data: &[u8]) -> FlashResult<()> {
        (**self).prog(cfg, block, off, data)
    }
    fn sync(&mut self, cfg: &Geometry) -> FlashResult<()> {
        (**self).sync(cfg)
    }
    fn read(&mut self, cfg: &Geometry, block: u32, off: u32, size: usize) -> FlashResult<Vec<u8>> {
        (**self).read(cfg, block, off, size)
    }
    fn erase(&mut self, cfg: &Geometry, block: u32) -> FlashResult<()> {
        (**self).erase(cfg, block)
    }
}
