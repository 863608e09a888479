//! Fixed-capacity byte slab holding undecoded transport input.
//!
//! Bytes are appended at the tail with [`Slab::fill`], read from the head
//! with [`Slab::consume`], and [`Slab::compact`] slides the unread remainder
//! back to the front so the tail has room for the next receive.

use super::error::DownloadError;

/// Bounded input buffer owned by a single transport session.
#[derive(Debug)]
pub(crate) struct Slab {
    buf: Box<[u8]>,
    start: usize,
    end: usize,
}

impl Slab {
    /// Allocates a zeroed slab, reporting allocation failure instead of aborting.
    pub(crate) fn with_capacity(capacity: usize) -> Result<Self, DownloadError> {
        let buf = alloc_zeroed(capacity)?;
        Ok(Self {
            buf: buf.into_boxed_slice(),
            start: 0,
            end: 0,
        })
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of unread bytes.
    pub(crate) fn len(&self) -> usize {
        self.end - self.start
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Unread bytes, oldest first.
    pub(crate) fn filled(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    /// Free space after the filled region, where the next receive lands.
    pub(crate) fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.end..]
    }

    /// Marks `count` bytes written into [`Slab::spare_mut`] as filled.
    ///
    /// Clamped to the available space.
    pub(crate) fn fill(&mut self, count: usize) {
        self.end = (self.end + count).min(self.buf.len());
    }

    /// Drops `count` bytes from the head of the filled region.
    pub(crate) fn consume(&mut self, count: usize) {
        self.start = (self.start + count).min(self.end);
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }

    /// Moves the unread bytes to the front of the slab.
    pub(crate) fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        self.buf.copy_within(self.start..self.end, 0);
        self.end -= self.start;
        self.start = 0;
    }
}

/// Allocates `size` zeroed bytes, mapping allocation failure to `OutOfMemory`.
pub(crate) fn alloc_zeroed(size: usize) -> Result<Vec<u8>, DownloadError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| DownloadError::OutOfMemory { requested: size })?;
    buf.resize(size, 0);
    Ok(buf)
}
