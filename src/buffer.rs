//! Byte-buffer layer: owns the file descriptor and the raw byte storage.
//!
//! Two backends:
//!
//! - *Paged*: a heap window of configurable size (page-rounded, ≥ 4096).
//!   Reads pull at least one window at a time; writes flush when the put
//!   area fills.
//! - *Memory-mapped* (`memmap2`): available for read streams on regular
//!   files.  The mapped region is exposed as the get area directly, with no
//!   intermediate copy.  The mapping is read-only, so mutating filters are
//!   refused; write streams always decline the mmap hint.
//!
//! The buffer drives the filter chain: each time bytes cross the boundary
//! (get area exhausted, put area flushed, or an explicit
//! [`FrameBuffer::sync_filters`]), the consumed-but-unfiltered window is
//! delivered to the chain.  Any repositioning of a stream with installed
//! filters breaks the contiguous-window guarantee, after which the chain is
//! marked invalid and receives nothing further (whole-file checksum
//! verification is only meaningful for sequential scans).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::{FrameError, FrameResult};
use crate::filter::{FilterChain, StreamFilter};
use crate::prefs::StreamPrefs;

/// Direction of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

enum Backend {
    Paged {
        window: Vec<u8>,
        /// Absolute offset of `window[0]`.
        window_start: u64,
        /// Valid bytes in the window.
        len: usize,
    },
    Mapped(Mmap),
}

pub struct FrameBuffer {
    file: File,
    path: PathBuf,
    mode: OpenMode,
    backend: Backend,
    /// Logical stream position.
    pos: u64,
    /// File size (read mode); bytes written so far (write mode).
    size: u64,
    filters: FilterChain,
    /// High-water mark of bytes already delivered to the chain.
    filtered_to: u64,
    /// Cleared by any reposition while filters are installed.
    filters_valid: bool,
}

impl FrameBuffer {
    // ─────────────────────────────────────────────────────────────────────
    // Construction
    // ─────────────────────────────────────────────────────────────────────

    /// Open `path` for reading.  The mmap hint in `prefs` is honoured only
    /// for regular files; otherwise the paged backend is used.
    pub fn open_read(path: &Path, prefs: &StreamPrefs) -> FrameResult<Self> {
        let file = File::open(path)?;
        let meta = file.metadata()?;
        let size = meta.len();
        let backend = if prefs.memory_mapped_io && meta.is_file() {
            // SAFETY: the mapping is read-only and lives no longer than the
            // owning buffer; concurrent truncation of the underlying file is
            // outside the single-writer discipline this crate documents.
            let map = unsafe { Mmap::map(&file)? };
            Backend::Mapped(map)
        } else {
            let cap = prefs.effective_buffer_size();
            Backend::Paged {
                window: vec![0u8; cap],
                window_start: 0,
                len: 0,
            }
        };
        Ok(FrameBuffer {
            file,
            path: path.to_path_buf(),
            mode: OpenMode::Read,
            backend,
            pos: 0,
            size,
            filters: FilterChain::new(),
            filtered_to: 0,
            filters_valid: true,
        })
    }

    /// Create (truncate) `path` for writing.  Memory-mapped output is not
    /// supported; the hint is ignored.
    pub fn create_write(path: &Path, prefs: &StreamPrefs) -> FrameResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let cap = prefs.effective_buffer_size();
        Ok(FrameBuffer {
            file,
            path: path.to_path_buf(),
            mode: OpenMode::Write,
            backend: Backend::Paged {
                window: Vec::with_capacity(cap),
                window_start: 0,
                len: 0,
            },
            pos: 0,
            size: 0,
            filters: FilterChain::new(),
            filtered_to: 0,
            filters_valid: true,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.backend, Backend::Mapped(_))
    }

    /// File size in bytes (read mode) or bytes written so far (write mode).
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn tell(&self) -> u64 {
        self.pos
    }

    pub fn bytes_filtered(&self) -> u64 {
        self.filters.bytes_filtered()
    }

    /// False once a reposition has broken the sequential-window guarantee.
    pub fn filters_valid(&self) -> bool {
        self.filters_valid
    }

    // ─────────────────────────────────────────────────────────────────────
    // Filters
    // ─────────────────────────────────────────────────────────────────────

    /// Install a filter at the current position.
    pub fn add_filter(&mut self, filter: Box<dyn StreamFilter>) -> FrameResult<()> {
        if self.is_mapped() && filter.is_mutating() {
            return Err(FrameError::domain(
                "mutating filters cannot be installed on a memory-mapped stream",
            ));
        }
        self.filters.add(filter, self.pos);
        Ok(())
    }

    /// Uninstall a filter, flushing it with the pending tail window first.
    pub fn remove_filter(&mut self, name: &str) -> Option<Box<dyn StreamFilter>> {
        self.sync_filters();
        self.filters.remove(name, self.pos, &[])
    }

    /// Deliver consumed-but-unfiltered bytes `[filtered_to, pos)` to the
    /// chain.  Called at every window boundary and before any checksum
    /// snapshot.
    pub fn sync_filters(&mut self) {
        if self.filters.is_empty() || !self.filters_valid || self.filtered_to >= self.pos {
            self.filtered_to = self.pos;
            return;
        }
        let begin = self.filtered_to;
        let end = self.pos;
        match &self.backend {
            Backend::Mapped(map) => {
                let window = &map[begin as usize..end as usize];
                self.filters.run(begin, window);
            }
            Backend::Paged {
                window,
                window_start,
                len,
            } => {
                // The unfiltered region always lies inside the current
                // window: delivery happens before the window is replaced.
                debug_assert!(begin >= *window_start);
                debug_assert!(end <= window_start + *len as u64);
                let lo = (begin - window_start) as usize;
                let hi = (end - window_start) as usize;
                let slice = &window[lo..hi];
                // Work around the split borrow of self.filters vs window.
                let mut chain = std::mem::take(&mut self.filters);
                chain.run(begin, slice);
                self.filters = chain;
            }
        }
        self.filtered_to = end;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Positioning
    // ─────────────────────────────────────────────────────────────────────

    /// Reposition a read buffer to an absolute offset.
    ///
    /// Write buffers are append-only: any seek away from the current
    /// position is a Domain error.
    pub fn seek(&mut self, target: u64) -> FrameResult<()> {
        if self.mode == OpenMode::Write {
            if target != self.pos {
                return Err(FrameError::domain(
                    "write streams refuse non-forward seeks once emission has begun",
                ));
            }
            return Ok(());
        }
        if target == self.pos {
            return Ok(());
        }
        self.sync_filters();
        if !self.filters.is_empty() {
            self.filters_valid = false;
        }
        if target > self.size {
            return Err(FrameError::format(
                target,
                format!("seek beyond end of file (size {})", self.size),
            ));
        }
        self.pos = target;
        self.filtered_to = target;
        Ok(())
    }

    /// Reposition to `delta` bytes before end of file.
    pub fn seek_from_end(&mut self, delta: u64) -> FrameResult<()> {
        let size = self.size;
        let target = size.checked_sub(delta).ok_or_else(|| {
            FrameError::format(0, format!("seek {} bytes before a {}-byte file", delta, size))
        })?;
        self.seek(target)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reading
    // ─────────────────────────────────────────────────────────────────────

    /// Fill `out` from the current position, advancing past it.
    pub fn read_exact(&mut self, out: &mut [u8]) -> FrameResult<()> {
        match &mut self.backend {
            Backend::Mapped(map) => {
                let end = self.pos + out.len() as u64;
                if end > map.len() as u64 {
                    return Err(FrameError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "read past end of mapped file",
                    )));
                }
                out.copy_from_slice(&map[self.pos as usize..end as usize]);
                self.pos = end;
                Ok(())
            }
            Backend::Paged { .. } => self.read_exact_paged(out),
        }
    }

    fn read_exact_paged(&mut self, out: &mut [u8]) -> FrameResult<()> {
        let mut copied = 0usize;
        while copied < out.len() {
            let (window_start, len) = match &self.backend {
                Backend::Paged {
                    window_start, len, ..
                } => (*window_start, *len),
                Backend::Mapped(_) => unreachable!(),
            };
            let window_end = window_start + len as u64;
            if self.pos >= window_start && self.pos < window_end {
                let lo = (self.pos - window_start) as usize;
                let take = (len - lo).min(out.len() - copied);
                if let Backend::Paged { window, .. } = &self.backend {
                    out[copied..copied + take].copy_from_slice(&window[lo..lo + take]);
                }
                copied += take;
                self.pos += take as u64;
            } else {
                self.refill()?;
            }
        }
        Ok(())
    }

    /// Load the next window at the current position, delivering the old
    /// window's unfiltered tail to the chain first.
    fn refill(&mut self) -> FrameResult<()> {
        self.sync_filters();
        let pos = self.pos;
        self.file.seek(SeekFrom::Start(pos))?;
        if let Backend::Paged {
            window,
            window_start,
            len,
        } = &mut self.backend
        {
            *window_start = pos;
            *len = 0;
            while *len < window.len() {
                let n = self.file.read(&mut window[*len..])?;
                if n == 0 {
                    break;
                }
                *len += n;
            }
            if *len == 0 {
                return Err(FrameError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "read past end of file",
                )));
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writing
    // ─────────────────────────────────────────────────────────────────────

    /// Append `bytes` at the current position.
    pub fn write_all(&mut self, bytes: &[u8]) -> FrameResult<()> {
        debug_assert_eq!(self.mode, OpenMode::Write);
        let cap = match &self.backend {
            Backend::Paged { window, .. } => window.capacity(),
            Backend::Mapped(_) => unreachable!("mapped write buffers are never constructed"),
        };
        if let Backend::Paged { window, len, .. } = &mut self.backend {
            window.extend_from_slice(bytes);
            *len = window.len();
        }
        self.pos += bytes.len() as u64;
        self.size = self.pos;
        let should_flush = match &self.backend {
            Backend::Paged { window, .. } => window.len() >= cap,
            Backend::Mapped(_) => false,
        };
        if should_flush {
            self.flush()?;
        }
        Ok(())
    }

    /// Flush the put area: deliver it to the filter chain, then write it to
    /// the file.
    pub fn flush(&mut self) -> FrameResult<()> {
        if self.mode != OpenMode::Write {
            return Ok(());
        }
        self.sync_filters();
        if let Backend::Paged {
            window,
            window_start,
            len,
        } = &mut self.backend
        {
            if !window.is_empty() {
                self.file.write_all(window)?;
                *window_start += window.len() as u64;
                window.clear();
                *len = 0;
            }
        }
        self.file.flush()?;
        Ok(())
    }

    /// Flush and release the buffer.
    pub fn close(mut self) -> FrameResult<()> {
        if self.mode == OpenMode::Write {
            self.flush()?;
        } else {
            self.sync_filters();
        }
        Ok(())
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        // Best effort: a stream dropped on an error path must not panic.
        if self.mode == OpenMode::Write {
            let _ = self.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{crc32, Crc32Filter, FILE_CRC_FILTER};

    fn prefs_with_buffer(n: usize) -> StreamPrefs {
        let mut p = StreamPrefs::default();
        p.buffer_size = n;
        p
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn paged_read_crosses_window_boundaries() {
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let f = write_temp(&data);
        // Smallest window (rounded to 4096) forces many refills.
        let mut buf = FrameBuffer::open_read(f.path(), &prefs_with_buffer(1)).unwrap();
        let mut out = vec![0u8; data.len()];
        buf.read_exact(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(buf.tell(), data.len() as u64);
    }

    #[test]
    fn mapped_read_matches_paged_read() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 256) as u8).collect();
        let f = write_temp(&data);
        let mut prefs = StreamPrefs::default();
        prefs.memory_mapped_io = true;
        let mut buf = FrameBuffer::open_read(f.path(), &prefs).unwrap();
        assert!(buf.is_mapped());
        let mut out = vec![0u8; data.len()];
        buf.read_exact(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn file_crc_filter_sees_every_byte_once() {
        let data: Vec<u8> = (0..30_000u32).map(|i| (i % 256) as u8).collect();
        let f = write_temp(&data);
        let mut buf = FrameBuffer::open_read(f.path(), &prefs_with_buffer(4096)).unwrap();
        let (filter, handle) = Crc32Filter::new(FILE_CRC_FILTER);
        buf.add_filter(Box::new(filter)).unwrap();
        let mut out = vec![0u8; data.len()];
        buf.read_exact(&mut out).unwrap();
        buf.sync_filters();
        assert_eq!(handle.value(), crc32(&data));
        assert_eq!(buf.bytes_filtered(), data.len() as u64);
    }

    #[test]
    fn seek_invalidates_filters() {
        let data = vec![0xAAu8; 8192];
        let f = write_temp(&data);
        let mut buf = FrameBuffer::open_read(f.path(), &prefs_with_buffer(4096)).unwrap();
        let (filter, _handle) = Crc32Filter::new(FILE_CRC_FILTER);
        buf.add_filter(Box::new(filter)).unwrap();
        assert!(buf.filters_valid());
        buf.seek(100).unwrap();
        assert!(!buf.filters_valid());
    }

    #[test]
    fn write_roundtrip_with_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 253) as u8).collect();
        {
            let mut buf =
                FrameBuffer::create_write(&path, &prefs_with_buffer(4096)).unwrap();
            let (filter, handle) = Crc32Filter::new(FILE_CRC_FILTER);
            buf.add_filter(Box::new(filter)).unwrap();
            buf.write_all(&data).unwrap();
            buf.sync_filters();
            assert_eq!(handle.value(), crc32(&data));
            buf.close().unwrap();
        }
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[test]
    fn write_stream_refuses_backward_seek() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut buf = FrameBuffer::create_write(&path, &StreamPrefs::default()).unwrap();
        buf.write_all(b"abcdef").unwrap();
        let err = buf.seek(0).unwrap_err();
        assert_eq!(err.error_name(), "ERROR_domain");
    }

    #[test]
    fn seek_from_end() {
        let data = vec![7u8; 1000];
        let f = write_temp(&data);
        let mut buf = FrameBuffer::open_read(f.path(), &StreamPrefs::default()).unwrap();
        buf.seek_from_end(4).unwrap();
        assert_eq!(buf.tell(), 996);
        let mut out = [0u8; 4];
        buf.read_exact(&mut out).unwrap();
        assert_eq!(out, [7u8; 4]);
    }
}
