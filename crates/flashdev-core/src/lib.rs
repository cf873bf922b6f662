#![no_std]
#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "std")]
pub mod transfer;

/// Value every byte of a block holds right after an erase.
pub const ERASED_BYTE: u8 = 0xFF;

// Status codes handed back to the filesystem engine (littlefs numbering).
pub const LFS_ERR_OK: i32 = 0;
pub const LFS_ERR_IO: i32 = -5;
pub const LFS_ERR_NODEV: i32 = -19;
pub const LFS_ERR_INVAL: i32 = -22;

/// Block geometry supplied by the engine on every call.
///
/// Backends only ever read it. `block_size` is the erasable unit in bytes,
/// `block_count` the number of such units on the medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub block_size: u32,
    pub block_count: u32,
}

impl Geometry {
    /// Rejects zero sizes and media whose total size does not fit in `usize`
    /// (only reachable on 32-bit hosts).
    pub fn new(block_size: u32, block_count: u32) -> FlashResult<Self> {
        let g = Self { block_size, block_count };
        if block_size == 0 || block_count == 0 || usize::try_from(g.total_bytes()).is_err() {
            return Err(FlashError::InvalidGeometry);
        }
        Ok(g)
    }

    /// Size of the whole medium in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.block_size as u64 * self.block_count as u64
    }

    /// Absolute byte offset of `(block, off)`.
    ///
    /// This is the one mapping every backend shares. It is linear and does
    /// not look at `block_count`; use [`Geometry::locate`] for a checked form.
    #[inline]
    pub fn addr(&self, block: u32, off: u32) -> u64 {
        block as u64 * self.block_size as u64 + off as u64
    }

    /// Checked address mapping for an access of `len` bytes.
    ///
    /// Requires `block < block_count` and `off + len <= block_size`.
    pub fn locate(&self, block: u32, off: u32, len: usize) -> FlashResult<u64> {
        let end = off as u64 + len as u64;
        if block >= self.block_count || end > self.block_size as u64 {
            return Err(FlashError::OutOfBounds {
                offset: self.addr(block, off),
                len: len as u64,
                limit: self.total_bytes(),
            });
        }
        Ok(self.addr(block, off))
    }
}

/// Which primitive was running when the medium failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Seek,
    Read,
    Prog,
    Erase,
    Sync,
}

pub type FlashResult<T> = Result<T, FlashError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashError {
    /// The platform access facility for this backend does not exist on this host.
    Capability(&'static str),
    /// The device path could not be opened for read/write.
    DeviceOpen { code: Option<i32> },
    /// Medium-level failure. `code` is the raw OS error when one was reported.
    Io { op: IoOp, code: Option<i32> },
    ShortRead { expected: usize, actual: usize },
    ShortWrite { expected: usize, actual: usize },
    OutOfBounds { offset: u64, len: u64, limit: u64 },
    InvalidGeometry,
}

impl FlashError {
    /// Negative status the engine expects in place of this error.
    pub fn status(&self) -> i32 {
        match self {
            FlashError::Io { .. }
            | FlashError::ShortRead { .. }
            | FlashError::ShortWrite { .. } => LFS_ERR_IO,
            FlashError::OutOfBounds { .. } | FlashError::InvalidGeometry => LFS_ERR_INVAL,
            FlashError::Capability(_) | FlashError::DeviceOpen { .. } => LFS_ERR_NODEV,
        }
    }

    #[cfg(feature = "std")]
    pub fn io(op: IoOp, err: &std::io::Error) -> Self {
        FlashError::Io { op, code: err.raw_os_error() }
    }

    #[cfg(feature = "std")]
    pub fn device_open(err: &std::io::Error) -> Self {
        FlashError::DeviceOpen { code: err.raw_os_error() }
    }
}

/// Collapse a call result into the engine's status convention.
pub fn status_of(res: FlashResult<()>) -> i32 {
    match res {
        Ok(()) => LFS_ERR_OK,
        Err(e) => e.status(),
    }
}

impl core::fmt::Display for FlashError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FlashError::Capability(what) => write!(f, "platform facility unavailable: {}", what),
            FlashError::DeviceOpen { code: Some(c) } => write!(f, "could not open device (os error {})", c),
            FlashError::DeviceOpen { code: None } => write!(f, "could not open device"),
            FlashError::Io { op, code: Some(c) } => write!(f, "{:?} failed (os error {})", op, c),
            FlashError::Io { op, code: None } => write!(f, "{:?} failed", op),
            FlashError::ShortRead { expected, actual } => {
                write!(f, "short read: {} of {} bytes", actual, expected)
            }
            FlashError::ShortWrite { expected, actual } => {
                write!(f, "short write: {} of {} bytes", actual, expected)
            }
            FlashError::OutOfBounds { offset, len, limit } => {
                write!(f, "access of {} bytes at {:#x} outside medium of {} bytes", len, offset, limit)
            }
            FlashError::InvalidGeometry => write!(f, "invalid block geometry"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FlashError {}
