#![cfg_attr(not(unix), allow(dead_code, unused_imports))]

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use log::{debug, error, info, warn};

use flashdev_core::{transfer, FlashError, FlashResult, Geometry, IoOp};
use flashdev_hal::BlockBackend;

/// Raw block device (or disk image) accessed through a POSIX file descriptor.
///
/// The descriptor is opened `O_RDWR` in the constructor and closed when the
/// backend is dropped. Every call seeks to `block * block_size + off` and
/// then reads or writes; erase is an overwrite with 0xFF.
pub struct LinuxDiskBackend {
    file: File,
    path: PathBuf,
    capacity: Option<u64>,
}

impl LinuxDiskBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> FlashResult<Self> {
        Self::open_with(path.as_ref(), false)
    }

    /// Like [`open`](Self::open) but with `O_EXCL`: Linux refuses the open
    /// while the block device is mounted or held exclusively by someone else.
    pub fn open_exclusive<P: AsRef<Path>>(path: P) -> FlashResult<Self> {
        Self::open_with(path.as_ref(), true)
    }

    #[cfg(unix)]
    fn open_with(path: &Path, exclusive: bool) -> FlashResult<Self> {
        let mut opts = OpenOptions::new();
        opts.read(true).write(true);

        #[cfg(target_os = "linux")]
        if exclusive {
            use std::os::unix::fs::OpenOptionsExt;
            opts.custom_flags(libc::O_EXCL);
        }
        #[cfg(not(target_os = "linux"))]
        if exclusive {
            warn!("Exclusive open is Linux-only; opening {} shared", path.display());
        }

        let file = opts.open(path).map_err(|e| {
            error!("Could not open disk {}: {}", path.display(), e);
            FlashError::device_open(&e)
        })?;

        let capacity = medium_capacity(&file);
        match capacity {
            Some(bytes) => info!("Opened {} ({} bytes)", path.display(), bytes),
            None => info!("Opened {} (size unknown)", path.display()),
        }

        Ok(Self { file, path: path.to_path_buf(), capacity })
    }

    #[cfg(not(unix))]
    fn open_with(path: &Path, _exclusive: bool) -> FlashResult<Self> {
        error!("Refusing {}: POSIX raw device access needs a unix host", path.display());
        Err(FlashError::Capability("POSIX file-descriptor I/O"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes must stay inside a known medium; a regular image file would
    /// otherwise grow.
    fn within(&self, offset: u64, len: usize) -> FlashResult<()> {
        match self.capacity {
            Some(limit) if offset + len as u64 > limit => Err(FlashError::OutOfBounds {
                offset,
                len: len as u64,
                limit,
            }),
            _ => Ok(()),
        }
    }

    fn fail(&self, what: &str, block: u32, err: FlashError) -> FlashError {
        error!("{} block {} on {}: {}", what, block, self.path.display(), err);
        err
    }
}

#[cfg(unix)]
fn medium_capacity(file: &File) -> Option<u64> {
    let meta = file.metadata().ok()?;
    if meta.file_type().is_file() {
        return Some(meta.len());
    }

    #[cfg(target_os = "linux")]
    {
        use std::os::unix::fs::FileTypeExt;
        use std::os::unix::io::AsRawFd;

        if meta.file_type().is_block_device() {
            let mut bytes: u64 = 0;
            let rc = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64 as _, &mut bytes as *mut u64) };
            if rc == 0 {
                return Some(bytes);
            }
            warn!("BLKGETSIZE64 failed: {}", std::io::Error::last_os_error());
        }
    }
    None
}

// _IOR(0x12, 114, size_t), generic ioctl encoding (x86, arm, riscv).
#[cfg(target_os = "linux")]
const BLKGETSIZE64: u64 =
    (2 << 30) | ((std::mem::size_of::<libc::size_t>() as u64) << 16) | (0x12 << 8) | 114;

impl BlockBackend for LinuxDiskBackend {
    fn kind(&self) -> &'static str {
        "linux-disk"
    }

    fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    fn read_into(&mut self, cfg: &Geometry, block: u32, off: u32, buf: &mut [u8]) -> FlashResult<()> {
        debug!("LFS Read : Block: {}, Offset: {}, Size={}", block, off, buf.len());
        transfer::read_at(&mut self.file, cfg.addr(block, off), buf)
            .map_err(|e| self.fail("read", block, e))
    }

    fn prog(&mut self, cfg: &Geometry, block: u32, off: u32, data: &[u8]) -> FlashResult<()> {
        debug!("LFS Prog : Block: {}, Offset: {}, Size={}", block, off, data.len());
        let at = cfg.addr(block, off);
        self.within(at, data.len())
            .and_then(|_| transfer::write_at(&mut self.file, at, data, IoOp::Prog))
            .map_err(|e| self.fail("prog", block, e))
    }

    fn erase(&mut self, cfg: &Geometry, block: u32) -> FlashResult<()> {
        debug!("LFS Erase: Block: {}", block);
        let blank = vec![flashdev_core::ERASED_BYTE; cfg.block_size as usize];
        let at = cfg.addr(block, 0);
        self.within(at, blank.len())
            .and_then(|_| transfer::write_at(&mut self.file, at, &blank, IoOp::Erase))
            .map_err(|e| self.fail("erase", block, e))
    }

    fn sync(&mut self, _cfg: &Geometry) -> FlashResult<()> {
        // File::sync_all is fsync(2) on unix.
        self.file.sync_all().map_err(|e| {
            error!("fsync on {} failed: {}", self.path.display(), e);
            FlashError::io(IoOp::Sync, &e)
        })
    }
}

impl Drop for LinuxDiskBackend {
    fn drop(&mut self) {
        debug!("Closing {}", self.path.display());
    }
}
