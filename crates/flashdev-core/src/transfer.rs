//! Positioned transfers over a seekable handle.
//!
//! A single `read`/`write` on a raw volume may move fewer bytes than asked.
//! These helpers keep going until the request is satisfied and report a
//! short transfer when the medium stops producing (or accepting) bytes.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use crate::{FlashError, FlashResult, IoOp};

fn seek_to<D: Seek>(dev: &mut D, offset: u64) -> FlashResult<()> {
    let pos = dev
        .seek(SeekFrom::Start(offset))
        .map_err(|e| FlashError::io(IoOp::Seek, &e))?;
    if pos != offset {
        return Err(FlashError::Io { op: IoOp::Seek, code: None });
    }
    Ok(())
}

/// Seek to `offset` and fill `buf` completely.
pub fn read_at<D: Read + Seek>(dev: &mut D, offset: u64, buf: &mut [u8]) -> FlashResult<()> {
    seek_to(dev, offset)?;
    let mut done = 0;
    while done < buf.len() {
        match dev.read(&mut buf[done..]) {
            Ok(0) => {
                return Err(FlashError::ShortRead { expected: buf.len(), actual: done });
            }
            Ok(n) => done += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(FlashError::io(IoOp::Read, &e)),
        }
    }
    Ok(())
}

/// Seek to `offset` and write all of `data`. `op` tags failures (prog vs erase).
pub fn write_at<D: Write + Seek>(dev: &mut D, offset: u64, data: &[u8], op: IoOp) -> FlashResult<()> {
    seek_to(dev, offset)?;
    let mut done = 0;
    while done < data.len() {
        match dev.write(&data[done..]) {
            Ok(0) => {
                return Err(FlashError::ShortWrite { expected: data.len(), actual: done });
            }
            Ok(n) => done += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(FlashError::io(op, &e)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};
    use std::vec;
    use std::vec::Vec;

    /// Hands out at most `chunk` bytes per call and fails once with Interrupted.
    /// Writes stop being accepted at `end`.
    struct Trickle {
        inner: Cursor<Vec<u8>>,
        chunk: usize,
        interrupted: bool,
        end: u64,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(io::Error::from(ErrorKind::Interrupted));
            }
            let n = buf.len().min(self.chunk);
            self.inner.read(&mut buf[..n])
        }
    }

    impl Write for Trickle {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            let room = self.end.saturating_sub(self.inner.position()) as usize;
            let n = data.len().min(self.chunk).min(room);
            self.inner.write(&data[..n])
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for Trickle {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    fn trickle(bytes: Vec<u8>) -> Trickle {
        let end = bytes.len() as u64;
        Trickle { inner: Cursor::new(bytes), chunk: 3, interrupted: false, end }
    }

    #[test]
    fn partial_reads_are_stitched_together() {
        let mut dev = trickle((0u8..32).collect());
        let mut buf = [0u8; 10];
        read_at(&mut dev, 20, &mut buf).unwrap();
        assert_eq!(buf, [20, 21, 22, 23, 24, 25, 26, 27, 28, 29]);
    }

    #[test]
    fn end_of_medium_is_a_short_read() {
        let mut dev = trickle(vec![0u8; 16]);
        let mut buf = [0u8; 8];
        let err = read_at(&mut dev, 12, &mut buf).unwrap_err();
        assert_eq!(err, FlashError::ShortRead { expected: 8, actual: 4 });
    }

    #[test]
    fn partial_writes_are_retried() {
        let mut dev = trickle(vec![0u8; 16]);
        write_at(&mut dev, 4, b"abcdefgh", IoOp::Prog).unwrap();
        assert_eq!(&dev.inner.get_ref()[4..12], b"abcdefgh");
    }

    #[test]
    fn full_medium_is_a_short_write() {
        let mut dev = trickle(vec![0u8; 16]);
        let err = write_at(&mut dev, 12, b"abcdefgh", IoOp::Prog).unwrap_err();
        assert_eq!(err, FlashError::ShortWrite { expected: 8, actual: 4 });
        assert_eq!(dev.inner.get_ref().len(), 16);
        assert_eq!(&dev.inner.get_ref()[12..], b"abcd");
    }
}
