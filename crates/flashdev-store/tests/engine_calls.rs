use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flashdev_core::{
    FlashError, FlashResult, Geometry, IoOp, ERASED_BYTE, LFS_ERR_INVAL, LFS_ERR_IO, LFS_ERR_OK,
};
use flashdev_hal::BlockBackend;
use flashdev_mem::MemoryBackend;
use flashdev_store::{open_backend, BackendKind, BlockContext, IoStats};

fn mem_context(block_size: u32, block_count: u32) -> BlockContext {
    let g = Geometry::new(block_size, block_count).unwrap();
    let backend = open_backend(&BackendKind::Memory, &g).unwrap();
    BlockContext::new(g, backend)
}

#[test]
fn test_hello_scenario() {
    let mut ctx = mem_context(512, 16);

    assert_eq!(ctx.prog(2, 10, b"hello"), LFS_ERR_OK);
    assert_eq!(ctx.read(2, 10, 5).unwrap(), b"hello");

    assert_eq!(ctx.erase(2), LFS_ERR_OK);
    assert_eq!(ctx.read(2, 0, 512).unwrap(), vec![ERASED_BYTE; 512]);
}

#[test]
fn test_sync_on_memory_is_always_ok() {
    let mut ctx = mem_context(512, 16);
    assert_eq!(ctx.sync(), LFS_ERR_OK);
    ctx.prog(0, 0, b"x");
    ctx.erase(15);
    let _ = ctx.read(99, 0, 1);
    assert_eq!(ctx.sync(), LFS_ERR_OK);
}

#[test]
fn test_read_into_status() {
    let mut ctx = mem_context(64, 4);
    let mut buf = [0u8; 8];
    assert_eq!(ctx.read_into(1, 0, &mut buf), LFS_ERR_OK);
    assert_eq!(buf, [ERASED_BYTE; 8]);
    assert_eq!(ctx.read_into(1, 60, &mut buf), LFS_ERR_INVAL);
}

#[test]
fn test_out_of_range_is_rejected_without_touching_the_medium() {
    let mut ctx = mem_context(64, 4);

    // Would spill into block 2.
    assert_eq!(ctx.prog(1, 60, b"overflow"), LFS_ERR_INVAL);
    assert_eq!(ctx.prog(4, 0, b"x"), LFS_ERR_INVAL);
    assert_eq!(ctx.erase(4), LFS_ERR_INVAL);
    assert!(matches!(ctx.read(0, 0, 65), Err(FlashError::OutOfBounds { .. })));
    assert_eq!(ctx.stats().failures, 4);

    let g = *ctx.geometry();
    let mut backend = ctx.into_backend();
    assert_eq!(backend.read(&g, 0, 0, 256).unwrap(), vec![ERASED_BYTE; 256]);
}

#[test]
fn test_stats_count_successful_calls() {
    let mut ctx = mem_context(64, 4);
    ctx.erase(0);
    ctx.prog(0, 0, &[1, 2, 3, 4]);
    ctx.read(0, 0, 4).unwrap();
    ctx.sync();

    assert_eq!(
        ctx.stats(),
        IoStats {
            reads: 1,
            progs: 1,
            erases: 1,
            syncs: 1,
            bytes_read: 4,
            bytes_programmed: 4,
            failures: 0,
        }
    );
}

/// Tracks how often the medium was opened and released, and can fail on demand.
struct Counted {
    closes: Arc<AtomicUsize>,
    fail_writes: bool,
    inner: MemoryBackend,
}

impl Counted {
    fn open(opens: &Arc<AtomicUsize>, closes: &Arc<AtomicUsize>, g: &Geometry, fail_writes: bool) -> Self {
        opens.fetch_add(1, Ordering::SeqCst);
        Counted {
            closes: closes.clone(),
            fail_writes,
            inner: MemoryBackend::new(g),
        }
    }
}

impl BlockBackend for Counted {
    fn kind(&self) -> &'static str { "counted" }
    fn capacity(&self) -> Option<u64> { self.inner.capacity() }

    fn read_into(&mut self, cfg: &Geometry, block: u32, off: u32, buf: &mut [u8]) -> FlashResult<()> {
        self.inner.read_into(cfg, block, off, buf)
    }

    fn prog(&mut self, cfg: &Geometry, block: u32, off: u32, data: &[u8]) -> FlashResult<()> {
        if self.fail_writes {
            return Err(FlashError::Io { op: IoOp::Prog, code: Some(5) });
        }
        self.inner.prog(cfg, block, off, data)
    }

    fn sync(&mut self, _cfg: &Geometry) -> FlashResult<()> {
        if self.fail_writes {
            return Err(FlashError::Io { op: IoOp::Sync, code: None });
        }
        Ok(())
    }
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_handle_released_exactly_once_after_failures() {
    let opens = Arc::new(AtomicUsize::new(0));
    let closes = Arc::new(AtomicUsize::new(0));
    let g = Geometry::new(128, 4).unwrap();

    {
        let mut ctx = BlockContext::new(g, Box::new(Counted::open(&opens, &closes, &g, true)));
        assert_eq!(ctx.prog(0, 0, b"data"), LFS_ERR_IO);
        assert_eq!(ctx.erase(1), LFS_ERR_IO);
        assert_eq!(ctx.sync(), LFS_ERR_IO);
        assert!(ctx.read(0, 0, 4).is_ok());
        assert_eq!(ctx.stats().failures, 3);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_io_failure_propagates_from_read() {
    struct Dead;
    impl BlockBackend for Dead {
        fn kind(&self) -> &'static str { "dead" }
        fn capacity(&self) -> Option<u64> { None }
        fn read_into(&mut self, _: &Geometry, _: u32, _: u32, _: &mut [u8]) -> FlashResult<()> {
            Err(FlashError::Io { op: IoOp::Read, code: Some(5) })
        }
        fn prog(&mut self, _: &Geometry, _: u32, _: u32, _: &[u8]) -> FlashResult<()> { Ok(()) }
        fn sync(&mut self, _: &Geometry) -> FlashResult<()> { Ok(()) }
    }

    let g = Geometry::new(64, 2).unwrap();
    let mut ctx = BlockContext::new(g, Box::new(Dead));
    assert_eq!(ctx.read(0, 0, 4), Err(FlashError::Io { op: IoOp::Read, code: Some(5) }));
    let mut buf = [0u8; 4];
    assert_eq!(ctx.read_into(0, 0, &mut buf), LFS_ERR_IO);
}

#[test]
fn test_zero_geometry_is_refused() {
    let g = Geometry { block_size: 0, block_count: 16 };
    assert!(matches!(open_backend(&BackendKind::Memory, &g), Err(FlashError::InvalidGeometry)));
}

#[cfg(not(windows))]
#[test]
fn test_windows_backend_is_a_capability_error_here() {
    let g = Geometry::new(512, 16).unwrap();
    let kind = BackendKind::WinDisk { path: r"\\.\D:".into() };
    assert!(matches!(open_backend(&kind, &g), Err(FlashError::Capability(_))));
}

#[cfg(unix)]
mod disk {
    use super::*;
    use rand::{Rng, RngCore};
    use std::fs;
    use std::path::PathBuf;

    fn scratch(name: &str, bytes: usize) -> PathBuf {
        let path = std::env::temp_dir()
            .join(format!("flashdev-store-{}-{}.img", std::process::id(), name));
        fs::write(&path, vec![ERASED_BYTE; bytes]).unwrap();
        path
    }

    #[test]
    fn test_native_disk_selects_posix_backend() {
        let path = scratch("native", 4096);
        let g = Geometry::new(512, 8).unwrap();
        let backend = open_backend(&BackendKind::native_disk(&path), &g).unwrap();
        assert_eq!(backend.kind(), "linux-disk");
        drop(backend);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_geometry_larger_than_medium_is_refused() {
        let path = scratch("small", 4096);
        let g = Geometry::new(512, 16).unwrap();
        let res = open_backend(&BackendKind::native_disk(&path), &g);
        assert!(matches!(
            res,
            Err(FlashError::OutOfBounds { len: 8192, limit: 4096, .. })
        ));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_disk_and_memory_contexts_agree() {
        let g = Geometry::new(128, 8).unwrap();
        let path = scratch("agree", 1024);
        let mut disk = BlockContext::new(g, open_backend(&BackendKind::native_disk(&path), &g).unwrap());
        let mut mem = BlockContext::new(g, open_backend(&BackendKind::Memory, &g).unwrap());
        let mut rng = rand::thread_rng();

        for _ in 0..64 {
            let block = rng.gen_range(0..g.block_count);
            let off = rng.gen_range(0..g.block_size);
            let mut data = vec![0u8; rng.gen_range(0..=(g.block_size - off)) as usize];
            rng.fill_bytes(&mut data);

            assert_eq!(disk.erase(block), mem.erase(block));
            assert_eq!(disk.prog(block, off, &data), mem.prog(block, off, &data));
        }
        assert_eq!(disk.sync(), LFS_ERR_OK);

        for block in 0..g.block_count {
            assert_eq!(
                disk.read(block, 0, g.block_size as usize).unwrap(),
                mem.read(block, 0, g.block_size as usize).unwrap()
            );
        }
        drop(disk);
        let _ = fs::remove_file(&path);
    }
}
