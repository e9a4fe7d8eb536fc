// Carillon
// Copyright (c) 2025 The Project Carillon Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp;
use std::io;
use std::io::Seek;

use crate::errors::Result;

use super::{MediaSource, ReadBytes};

#[inline(always)]
fn end_of_stream_error<T>() -> Result<T> {
    Err(io::Error::new(io::ErrorKind::UnexpectedEof, "end of stream").into())
}

/// `MediaSourceStreamOptions` specifies the buffering behaviour of a `MediaSourceStream`.
pub struct MediaSourceStreamOptions {
    /// The maximum buffer size. Must be a power of 2. Must be > 32kB.
    pub buffer_len: usize,
}

impl Default for MediaSourceStreamOptions {
    fn default() -> Self {
        MediaSourceStreamOptions { buffer_len: 64 * 1024 }
    }
}

/// A `MediaSourceStream` is a buffered reader over a [`MediaSource`].
///
/// To minimize system call overhead on the inner reader, and to amortize that overhead over many
/// bytes, `MediaSourceStream` implements an exponentially growing read-ahead buffer. The
/// read-ahead length starts at 1kB, and doubles in length as more sequential reads are performed
/// until it reaches 32kB.
///
/// The stream also retains recently read data in a ring buffer, allowing the reader to seek
/// backwards by a bounded number of bytes without touching the inner source. The frame
/// synchronization and seek logic depend on this to rescan from one byte past a rejected sync
/// candidate.
pub struct MediaSourceStream {
    /// The source reader.
    inner: Box<dyn MediaSource>,
    /// The ring buffer.
    ring: Box<[u8]>,
    /// The ring buffer's wrap-around mask.
    ring_mask: usize,
    /// The read position.
    read_pos: usize,
    /// The write position.
    write_pos: usize,
    /// The current block size for a new read.
    read_block_len: usize,
    /// Absolute position of the inner stream.
    abs_pos: u64,
    /// Number of bytes read from the inner reader since instantiation or the last seek.
    rel_pos: u64,
}

impl MediaSourceStream {
    const MIN_BLOCK_LEN: usize = 1024;
    const MAX_BLOCK_LEN: usize = 32 * 1024;

    pub fn new(source: Box<dyn MediaSource>, options: MediaSourceStreamOptions) -> Self {
        // The buffer length must be a power of 2, and > the maximum read block length.
        assert!(options.buffer_len.count_ones() == 1);
        assert!(options.buffer_len > Self::MAX_BLOCK_LEN);

        MediaSourceStream {
            inner: source,
            ring: vec![0; options.buffer_len].into_boxed_slice(),
            ring_mask: options.buffer_len - 1,
            read_pos: 0,
            write_pos: 0,
            read_block_len: Self::MIN_BLOCK_LEN,
            abs_pos: 0,
            rel_pos: 0,
        }
    }

    /// Returns if the inner source is seekable.
    pub fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }

    /// Returns the byte length of the inner source, if available.
    pub fn byte_len(&self) -> Option<u64> {
        self.inner.byte_len()
    }

    /// Get the number of bytes buffered but not yet read.
    pub fn unread_buffer_len(&self) -> usize {
        if self.write_pos >= self.read_pos {
            self.write_pos - self.read_pos
        }
        else {
            self.write_pos + (self.ring.len() - self.read_pos)
        }
    }

    /// Gets the number of bytes buffered and read.
    ///
    /// Note: this is the maximum number of bytes that can be seeked backwards within the buffer.
    pub fn read_buffer_len(&self) -> usize {
        let unread_len = self.unread_buffer_len();

        cmp::min(self.ring.len(), self.rel_pos as usize) - unread_len
    }

    /// Seek within the buffered data to an absolute position in the stream. Returns the
    /// position seeked to.
    pub fn seek_buffered(&mut self, pos: u64) -> u64 {
        let old_pos = self.pos();

        let delta = if pos > old_pos {
            assert!(pos - old_pos < isize::MAX as u64);
            (pos - old_pos) as isize
        }
        else if pos < old_pos {
            assert!(old_pos - pos < isize::MAX as u64);
            -((old_pos - pos) as isize)
        }
        else {
            0
        };

        self.seek_buffered_rel(delta)
    }

    /// Seek within the buffered data relative to the current position. The seekable range is
    /// the inclusive range `[-read_buffer_len(), unread_buffer_len()]`.
    pub fn seek_buffered_rel(&mut self, delta: isize) -> u64 {
        if delta < 0 {
            let abs_delta = cmp::min((-delta) as usize, self.read_buffer_len());
            self.read_pos = (self.read_pos + self.ring.len() - abs_delta) & self.ring_mask;
        }
        else if delta > 0 {
            let abs_delta = cmp::min(delta as usize, self.unread_buffer_len());
            self.read_pos = (self.read_pos + abs_delta) & self.ring_mask;
        }

        self.pos()
    }

    /// Seek backwards within the buffered data.
    pub fn seek_buffered_rev(&mut self, delta: usize) {
        assert!(delta < isize::MAX as usize);
        self.seek_buffered_rel(-(delta as isize));
    }

    /// Seek the inner source to an absolute position, discarding the buffer.
    pub fn seek(&mut self, pos: io::SeekFrom) -> Result<u64> {
        let pos = match pos {
            io::SeekFrom::Current(0) => return Ok(self.pos()),
            io::SeekFrom::Current(delta_pos) => {
                // The inner reader is ahead of the stream position by the number of unread
                // buffered bytes.
                let delta = delta_pos - self.unread_buffer_len() as i64;
                self.inner.seek(io::SeekFrom::Current(delta))?
            }
            _ => self.inner.seek(pos)?,
        };

        self.reset(pos);

        Ok(pos)
    }

    #[inline(always)]
    fn is_buffer_exhausted(&self) -> bool {
        self.read_pos == self.write_pos
    }

    /// If the buffer has been exhausted, fetch a new block of data to replenish the buffer.
    fn fetch(&mut self) -> Result<()> {
        if self.is_buffer_exhausted() {
            // The contiguous region of the ring buffer starting at the write position.
            let write_pos = self.write_pos;
            let end = cmp::min(write_pos + self.read_block_len, self.ring.len());

            let actual_read_len = self.inner.read(&mut self.ring[write_pos..end])?;

            self.write_pos = (self.write_pos + actual_read_len) & self.ring_mask;

            self.abs_pos += actual_read_len as u64;
            self.rel_pos += actual_read_len as u64;

            // Grow the read block length exponentially to reduce the overhead of buffering on
            // consecutive reads.
            self.read_block_len = cmp::min(self.read_block_len << 1, Self::MAX_BLOCK_LEN);
        }

        Ok(())
    }

    /// Fetch a new block of data, returning an end-of-stream error if no more data could be
    /// fetched.
    fn fetch_or_eof(&mut self) -> Result<()> {
        self.fetch()?;

        if self.is_buffer_exhausted() {
            return end_of_stream_error();
        }

        Ok(())
    }

    /// Advances the read position by `len` bytes, taking into account wrap-around.
    #[inline(always)]
    fn consume(&mut self, len: usize) {
        self.read_pos = (self.read_pos + len) & self.ring_mask;
    }

    /// Gets the largest contiguous slice of buffered data starting from the read position.
    #[inline(always)]
    fn contiguous_buf(&self) -> &[u8] {
        if self.write_pos >= self.read_pos {
            &self.ring[self.read_pos..self.write_pos]
        }
        else {
            &self.ring[self.read_pos..]
        }
    }

    /// Resets the read-ahead buffer, and sets the absolute stream position to `pos`.
    fn reset(&mut self, pos: u64) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.read_block_len = Self::MIN_BLOCK_LEN;
        self.abs_pos = pos;
        self.rel_pos = 0;
    }
}

impl ReadBytes for MediaSourceStream {
    #[inline(always)]
    fn read_u8(&mut self) -> Result<u8> {
        // Single byte reads are the decoder's hottest path, so override the derived method
        // with one that serves straight out of the ring. The read-ahead buffer replenishment
        // lives in a separate function to keep this one small.
        if self.is_buffer_exhausted() {
            self.fetch_or_eof()?;
        }

        let value = self.ring[self.read_pos];
        self.consume(1);

        Ok(value)
    }

    fn read_buf(&mut self, buf: &mut [u8]) -> Result<usize> {
        let total_len = buf.len();
        let mut rem = &mut buf[..];

        while !rem.is_empty() {
            self.fetch()?;

            let src = self.contiguous_buf();

            if src.is_empty() {
                break;
            }

            let count = cmp::min(src.len(), rem.len());
            rem[..count].copy_from_slice(&src[..count]);
            self.consume(count);

            rem = &mut rem[count..];
        }

        let read = total_len - rem.len();

        // Unlike io::Read, ReadBytes returns an end-of-stream error when no more data can be
        // read and a non-zero read was requested.
        if total_len != 0 && read == 0 {
            end_of_stream_error()
        }
        else {
            Ok(read)
        }
    }

    fn read_buf_exact(&mut self, mut buf: &mut [u8]) -> Result<()> {
        while !buf.is_empty() {
            self.fetch()?;

            let src = self.contiguous_buf();

            if src.is_empty() {
                return end_of_stream_error();
            }

            let count = cmp::min(src.len(), buf.len());
            buf[..count].copy_from_slice(&src[..count]);
            self.consume(count);

            buf = &mut buf[count..];
        }

        Ok(())
    }

    fn ignore_bytes(&mut self, mut count: u64) -> Result<()> {
        // If the stream is seekable and the number of bytes to ignore is large, perform a seek
        // first. Note that ignored bytes are rewindable. Therefore, ensure the ring-buffer is
        // full after the seek just like if bytes were ignored by consuming them instead.
        let ring_len = self.ring.len() as u64;

        while count >= 2 * ring_len && self.is_seekable() {
            let delta = count.clamp(0, i64::MAX as u64) - ring_len;
            self.seek(io::SeekFrom::Current(delta as i64))?;
            count -= delta;
        }

        while count > 0 {
            self.fetch_or_eof()?;
            let discard_count = cmp::min(self.unread_buffer_len() as u64, count);
            self.consume(discard_count as usize);
            count -= discard_count;
        }

        Ok(())
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.abs_pos - self.unread_buffer_len() as u64
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{MediaSourceStream, ReadBytes};

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn generate_random_bytes(len: usize) -> Box<[u8]> {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        (0..len).map(|_| rng.gen::<u8>()).collect()
    }

    #[test]
    fn verify_mss_read() {
        let data = generate_random_bytes(5 * 96 * 1024);

        let ms = Cursor::new(data.clone());
        let mut mss = MediaSourceStream::new(Box::new(ms), Default::default());

        // Each of the following scenarios should exercise read-ahead and wrap-around of the
        // stream's internal ring buffer, meaning reading > 64kB per scenario. Between each
        // scenario, ignore an odd number of bytes.
        let mut buf = &data[..];

        for byte in &buf[..96 * 1024] {
            assert_eq!(*byte, mss.read_u8().unwrap());
        }

        mss.ignore_bytes(11).unwrap();

        buf = &buf[11 + (96 * 1024)..];

        for bytes in buf[..2 * 48 * 1024].chunks_exact(2) {
            assert_eq!(u16::from_be_bytes([bytes[0], bytes[1]]), mss.read_be_u16().unwrap());
        }

        mss.ignore_bytes(33).unwrap();

        buf = &buf[33 + (2 * 48 * 1024)..];

        for bytes in buf[..4 * 24 * 1024].chunks_exact(4) {
            assert_eq!(bytes, &mss.read_quad_bytes().unwrap());
        }
    }

    #[test]
    fn verify_mss_seek_buffered() {
        let data = generate_random_bytes(1024 * 1024);

        let ms = Cursor::new(data.clone());
        let mut mss = MediaSourceStream::new(Box::new(ms), Default::default());

        assert_eq!(mss.read_buffer_len(), 0);
        assert_eq!(mss.unread_buffer_len(), 0);

        mss.ignore_bytes(5122).unwrap();

        assert_eq!(5122, mss.pos());
        assert_eq!(mss.read_buffer_len(), 5122);

        let upper = mss.read_u8().unwrap();

        // Seek backwards.
        assert_eq!(mss.seek_buffered_rel(-1000), 4123);
        assert_eq!(mss.pos(), 4123);

        // Seek forwards.
        assert_eq!(mss.seek_buffered_rel(999), 5122);
        assert_eq!(mss.pos(), 5122);

        assert_eq!(upper, mss.read_u8().unwrap());
    }
}
