//! Positional byte sources backing indexes and packfiles.
//!
//! Every read names its own offset, so a single source can be shared between
//! any number of chains and threads without a cursor or a lock.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Random-access, read-only byte source.
pub trait ReadAt: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read; `0` means `offset` is at or past the
    /// end of the source.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Release the underlying handle.
    fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Shared handle to a source.
pub type SharedSource = Arc<dyn ReadAt>;

impl ReadAt for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }
}

/// A file read with positional reads (`pread` on unix, `seek_read` on
/// windows).
#[derive(Debug)]
pub struct FileSource {
    file: File,
    path: PathBuf,
    closed: AtomicBool,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(FileSource {
            file,
            path,
            closed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn pread(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(&self.file, buf, offset)
    }

    #[cfg(windows)]
    fn pread(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(&self.file, buf, offset)
    }
}

impl ReadAt for FileSource {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(io::Error::other(format!(
                "read from closed file {}",
                self.path.display()
            )));
        }
        loop {
            match self.pread(buf, offset) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn close(&self) -> io::Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Fill `buf` from `offset`, failing with `UnexpectedEof` if the source ends
/// first.
pub(crate) fn read_exact_at(source: &dyn ReadAt, buf: &mut [u8], offset: u64) -> io::Result<()> {
    let filled = read_up_to(source, buf, offset)?;
    if filled < buf.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "wanted {} bytes at offset {}, source ended after {}",
                buf.len(),
                offset,
                filled
            ),
        ));
    }
    Ok(())
}

/// Read as many bytes as are available into `buf`, stopping early only at
/// the end of the source.
pub(crate) fn read_up_to(source: &dyn ReadAt, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read_at(&mut buf[filled..], offset + filled as u64)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Sequential `Read` view of a source starting at a fixed offset.
pub(crate) struct OffsetReader<'a> {
    source: &'a dyn ReadAt,
    offset: u64,
}

impl<'a> OffsetReader<'a> {
    pub(crate) fn new(source: &'a dyn ReadAt, offset: u64) -> Self {
        OffsetReader { source, offset }
    }
}

impl Read for OffsetReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.source.read_at(buf, self.offset)?;
        self.offset += n as u64;
        Ok(n)
    }
}
