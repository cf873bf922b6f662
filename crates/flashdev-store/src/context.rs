//! Engine-facing adapter.
//!
//! The filesystem engine only understands `0` for success and negative codes
//! for failure. `BlockContext` binds one geometry to one backend, rejects
//! addresses outside the geometry before they reach the medium, and
//! translates results into that convention.

use log::{debug, error};

use flashdev_core::{status_of, FlashResult, Geometry};
use flashdev_hal::BlockBackend;

/// Running counters for one context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStats {
    pub reads: u64,
    pub progs: u64,
    pub erases: u64,
    pub syncs: u64,
    pub bytes_read: u64,
    pub bytes_programmed: u64,
    pub failures: u64,
}

pub struct BlockContext {
    geometry: Geometry,
    backend: Box<dyn BlockBackend>,
    stats: IoStats,
}

impl BlockContext {
    pub fn new(geometry: Geometry, backend: Box<dyn BlockBackend>) -> Self {
        Self { geometry, backend, stats: IoStats::default() }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    pub fn capacity(&self) -> Option<u64> {
        self.backend.capacity()
    }

    pub fn stats(&self) -> IoStats {
        self.stats
    }

    /// Give the backend back. Dropping it releases the medium.
    pub fn into_backend(self) -> Box<dyn BlockBackend> {
        self.backend
    }

    /// Read `size` bytes at `(block, off)`; failures propagate as errors.
    pub fn read(&mut self, block: u32, off: u32, size: usize) -> FlashResult<Vec<u8>> {
        let mut buf = vec![0u8; size];
        self.try_read(block, off, &mut buf)?;
        Ok(buf)
    }

    /// Status-code form of [`read`](Self::read) that fills a caller buffer.
    pub fn read_into(&mut self, block: u32, off: u32, buf: &mut [u8]) -> i32 {
        status_of(self.try_read(block, off, buf))
    }

    pub fn prog(&mut self, block: u32, off: u32, data: &[u8]) -> i32 {
        debug!("prog block={} off={} size={}", block, off, data.len());
        let res = self.check(block, off, data.len()).and_then(|_| {
            self.backend.prog(&self.geometry, block, off, data)
        });
        if res.is_ok() {
            self.stats.progs += 1;
            self.stats.bytes_programmed += data.len() as u64;
        }
        self.finish(res)
    }

    pub fn erase(&mut self, block: u32) -> i32 {
        debug!("erase block={}", block);
        let size = self.geometry.block_size as usize;
        let res = self.check(block, 0, size).and_then(|_| self.backend.erase(&self.geometry, block));
        if res.is_ok() {
            self.stats.erases += 1;
        }
        self.finish(res)
    }

    pub fn sync(&mut self) -> i32 {
        debug!("sync");
        let res = self.backend.sync(&self.geometry);
        if res.is_ok() {
            self.stats.syncs += 1;
        }
        self.finish(res)
    }

    fn try_read(&mut self, block: u32, off: u32, buf: &mut [u8]) -> FlashResult<()> {
        debug!("read block={} off={} size={}", block, off, buf.len());
        let res = self
            .check(block, off, buf.len())
            .and_then(|_| self.backend.read_into(&self.geometry, block, off, buf));
        match &res {
            Ok(()) => {
                self.stats.reads += 1;
                self.stats.bytes_read += buf.len() as u64;
            }
            Err(_) => self.stats.failures += 1,
        }
        res
    }

    fn check(&self, block: u32, off: u32, len: usize) -> FlashResult<()> {
        self.geometry.locate(block, off, len).map(|_| ()).map_err(|e| {
            error!("Rejected access block={} off={} len={}: {}", block, off, len, e);
            e
        })
    }

    fn finish(&mut self, res: FlashResult<()>) -> i32 {
        if res.is_err() {
            self.stats.failures += 1;
        }
        status_of(res)
    }
}
