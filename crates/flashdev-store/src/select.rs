use std::path::PathBuf;
use log::{error, info};

use flashdev_core::{FlashError, FlashResult, Geometry};
use flashdev_hal::BlockBackend;
use flashdev_linux::LinuxDiskBackend;
use flashdev_mem::MemoryBackend;
use flashdev_win::WinDiskBackend;

/// Which medium a filesystem instance runs on. Chosen once, before mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    LinuxDisk { path: PathBuf, exclusive: bool },
    WinDisk { path: PathBuf },
}

impl BackendKind {
    /// Raw-disk variant for the host this was compiled for.
    pub fn native_disk<P: Into<PathBuf>>(path: P) -> Self {
        #[cfg(windows)]
        {
            BackendKind::WinDisk { path: path.into() }
        }
        #[cfg(not(windows))]
        {
            BackendKind::LinuxDisk { path: path.into(), exclusive: false }
        }
    }
}

/// Construct the selected backend and check it can hold `geometry`.
///
/// Capability and device-open errors come straight from the backend
/// constructor; nothing partially built escapes.
pub fn open_backend(kind: &BackendKind, geometry: &Geometry) -> FlashResult<Box<dyn BlockBackend>> {
    // Fields are public, so a literal may skip the checks in `Geometry::new`.
    Geometry::new(geometry.block_size, geometry.block_count)?;

    let backend: Box<dyn BlockBackend> = match kind {
        BackendKind::Memory => Box::new(MemoryBackend::new(geometry)),
        BackendKind::LinuxDisk { path, exclusive: false } => Box::new(LinuxDiskBackend::open(path)?),
        BackendKind::LinuxDisk { path, exclusive: true } => {
            Box::new(LinuxDiskBackend::open_exclusive(path)?)
        }
        BackendKind::WinDisk { path } => Box::new(WinDiskBackend::open(path)?),
    };

    if let Some(capacity) = backend.capacity() {
        if capacity < geometry.total_bytes() {
            error!(
                "{} holds {} bytes, geometry {}x{} needs {}",
                backend.kind(),
                capacity,
                geometry.block_size,
                geometry.block_count,
                geometry.total_bytes()
            );
            return Err(FlashError::OutOfBounds {
                offset: 0,
                len: geometry.total_bytes(),
                limit: capacity,
            });
        }
    }

    info!(
        "Backend {} ready: {} blocks of {} bytes",
        backend.kind(),
        geometry.block_count,
        geometry.block_size
    );
    Ok(backend)
}
