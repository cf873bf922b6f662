#![cfg_attr(not(windows), allow(dead_code, unused_imports))]

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use log::{debug, error, info};

use flashdev_core::{transfer, FlashError, FlashResult, Geometry, IoOp, ERASED_BYTE};
use flashdev_hal::BlockBackend;

#[cfg(windows)]
const FILE_SHARE_READ: u32 = 0x0000_0001;

/// Windows raw volume (`\\.\D:`) or image file.
///
/// Opened with GENERIC_READ | GENERIC_WRITE, FILE_SHARE_READ and
/// OPEN_EXISTING; the handle is closed (CloseHandle) when the backend drops.
/// Raw volumes only accept sector-aligned transfers, so geometry and
/// offsets chosen by the engine must respect the volume's sector size.
pub struct WinDiskBackend {
    file: File,
    path: PathBuf,
    capacity: Option<u64>,
}

impl WinDiskBackend {
    #[cfg(windows)]
    pub fn open<P: AsRef<Path>>(path: P) -> FlashResult<Self> {
        use std::os::windows::fs::OpenOptionsExt;

        let path = path.as_ref();
        // No create flags: OPEN_EXISTING.
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .share_mode(FILE_SHARE_READ)
            .open(path)
            .map_err(|e| {
                error!("Could not open disk {}: {}", path.display(), e);
                FlashError::device_open(&e)
            })?;

        // Volumes report no length through metadata; only image files do.
        let capacity = file.metadata().ok().filter(|m| m.is_file()).map(|m| m.len());
        info!("Opened {} (capacity {:?})", path.display(), capacity);

        Ok(Self { file, path: path.to_path_buf(), capacity })
    }

    #[cfg(not(windows))]
    pub fn open<P: AsRef<Path>>(path: P) -> FlashResult<Self> {
        error!(
            "Refusing {}: raw volume access requires Windows",
            path.as_ref().display()
        );
        Err(FlashError::Capability("Win32 raw volume access"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Image files must not grow past their size. Volumes have no known
    /// capacity here and are left to the adapter's geometry check.
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
}

impl BlockBackend for WinDiskBackend {
    fn kind(&self) -> &'static str {
        "win-disk"
    }

    fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    fn read_into(&mut self, cfg: &Geometry, block: u32, off: u32, buf: &mut [u8]) -> FlashResult<()> {
        debug!("LFS Read : Block: {}, Offset: {}, Size={}", block, off, buf.len());
        let res = transfer::read_at(&mut self.file, cfg.addr(block, off), buf);
        if let Err(e) = &res {
            error!("ReadFile block {} on {}: {}", block, self.path.display(), e);
        }
        res
    }

    fn prog(&mut self, cfg: &Geometry, block: u32, off: u32, data: &[u8]) -> FlashResult<()> {
        debug!("LFS Prog : Block: {}, Offset: {}, Size={}", block, off, data.len());
        let at = cfg.addr(block, off);
        let res = self
            .within(at, data.len())
            .and_then(|_| transfer::write_at(&mut self.file, at, data, IoOp::Prog));
        if let Err(e) = &res {
            error!("WriteFile block {} on {}: {}", block, self.path.display(), e);
        }
        res
    }

    fn erase(&mut self, cfg: &Geometry, block: u32) -> FlashResult<()> {
        debug!("LFS Erase: Block: {}", block);
        let blank = vec![ERASED_BYTE; cfg.block_size as usize];
        let at = cfg.addr(block, 0);
        let res = self
            .within(at, blank.len())
            .and_then(|_| transfer::write_at(&mut self.file, at, &blank, IoOp::Erase));
        if let Err(e) = &res {
            error!("Erase block {} on {}: {}", block, self.path.display(), e);
        }
        res
    }

    fn sync(&mut self, _cfg: &Geometry) -> FlashResult<()> {
        // FlushFileBuffers
        self.file.sync_all().map_err(|e| {
            error!("FlushFileBuffers on {} failed: {}", self.path.display(), e);
            FlashError::io(IoOp::Sync, &e)
        })
    }
}

impl Drop for WinDiskBackend {
    fn drop(&mut self) {
        debug!("Closing {}", self.path.display());
    }
}
